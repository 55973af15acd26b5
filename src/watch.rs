//! Rebuilds the site while its sources change. Edits to existing posts and
//! pages are recompiled one by one through [`Builder::recompile`]; anything
//! else (new or removed files, category metadata, assets) triggers a full
//! build.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;

use crate::build::{self, Builder, SiteState};
use crate::fs::FileManager;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// What to do about a batch of changed paths.
#[derive(Debug, PartialEq, Eq)]
pub enum Plan {
    /// Nothing relevant changed.
    Ignore,

    /// Only existing posts and pages changed.
    Recompile(Vec<PathBuf>),

    /// Something a single-document recompile can't handle changed.
    Rebuild,
}

/// Decides how to react to `paths` changing. Paths outside the site
/// directory, inside the build directory, or under a dot-directory are
/// ignored.
pub fn plan(files: &FileManager, paths: &BTreeSet<PathBuf>) -> Plan {
    let relevant: Vec<&PathBuf> = paths
        .iter()
        .filter(|path| !path.starts_with(files.build_dir()))
        .filter(|path| match path.strip_prefix(files.site_dir()) {
            Ok(relative) => !relative.components().any(|component| match component {
                Component::Normal(name) => name.to_string_lossy().starts_with('.'),
                _ => false,
            }),
            Err(_) => false,
        })
        .collect();
    if relevant.is_empty() {
        return Plan::Ignore;
    }

    let documents = relevant.iter().all(|path| {
        path.is_file() && (files.is_page(path) || files.category_of(path).is_some())
    });
    match documents {
        true => Plan::Recompile(relevant.into_iter().cloned().collect()),
        false => Plan::Rebuild,
    }
}

/// Builds the site, then watches its source directory and keeps the build
/// up to date until the watcher's channel closes.
pub fn watch(builder: &Builder) -> Result<()> {
    let files = builder.files();
    let state = RwLock::new(rebuild(builder)?);

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                tx.send(event.paths).unwrap_or_else(|e| {
                    error!("Error sending file event: {}", e);
                });
            }
            _ => {}
        },
        Err(e) => error!("Watch error: {}", e),
    })?;
    watcher.watch(files.site_dir(), RecursiveMode::Recursive)?;
    info!(
        "Watching {} for changes. Press Ctrl+C to stop.",
        files.site_dir().display()
    );

    loop {
        let mut changed: BTreeSet<PathBuf> = match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(paths) => paths.into_iter().collect(),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        // Editors tend to emit several events per save.
        std::thread::sleep(DEBOUNCE);
        while let Ok(paths) = rx.try_recv() {
            changed.extend(paths);
        }
        debug!("changed: {:?}", changed);

        match plan(&files, &changed) {
            Plan::Ignore => {}
            Plan::Recompile(paths) => {
                let failed = paths.iter().any(|path| match builder.recompile(path, &state) {
                    Ok(()) => false,
                    Err(err) => {
                        warn!("recompiling {}: {}; rebuilding", path.display(), err);
                        true
                    }
                });
                if failed {
                    rebuild_into(builder, &state);
                }
            }
            Plan::Rebuild => {
                info!("File change detected, rebuilding site...");
                rebuild_into(builder, &state);
            }
        }
    }
    Ok(())
}

fn rebuild(builder: &Builder) -> Result<SiteState> {
    let (state, report) = builder.build()?;
    if !report.is_clean() {
        warn!("{} sources failed to compile", report.failures.len());
    }
    Ok(state)
}

fn rebuild_into(builder: &Builder, state: &RwLock<SiteState>) {
    match rebuild(builder) {
        Ok(new_state) => *state.write() = new_state,
        Err(err) => error!("Error rebuilding site: {}", err),
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents an error starting the watcher or running the initial build.
#[derive(Debug)]
pub enum Error {
    Notify(notify::Error),
    Build(build::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Notify(err) => write!(f, "watching for changes: {}", err),
            Error::Build(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Notify(err) => Some(err),
            Error::Build(err) => Some(err),
        }
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Error {
        Error::Notify(err)
    }
}

impl From<build::Error> for Error {
    fn from(err: build::Error) -> Error {
        Error::Build(err)
    }
}
