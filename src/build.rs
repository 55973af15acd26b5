//! Exports [`Builder`], which stitches together the high-level steps of
//! building the output site: compiling categories, posts and pages
//! ([`crate::document`]), rendering single and index pages
//! ([`crate::write`]), writing the JSON artifacts, feeds and search index,
//! and copying static files.
//!
//! A full build is written into a staging directory next to the build
//! directory and only swapped into place once every step has succeeded, so a
//! failed build leaves the previous one untouched. [`Builder::recompile`]
//! updates a single document in place for the watcher.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gtmpl::Value;
use log::{debug, error, info};
use parking_lot::{RwLock, RwLockWriteGuard};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::Config;
use crate::document::{self, compile_category, compile_page, compile_post, Category, Document};
use crate::feed::{self, write_rss, FeedConfig, FEED_LENGTH};
use crate::fs::{self as site_fs, FileManager, ASSETS_DIR};
use crate::search::{self, SearchIndex};
use crate::template::{self, Renderer};
use crate::write::{self, site_data, Writer};

const THEME_STATIC_DIRS: &[&str] = &["css", "js"];
const FAVICON: &str = "favicon.ico";

/// The compiled site held in memory between builds. Posts are kept per
/// category, newest first.
#[derive(Clone, Debug, Default)]
pub struct SiteState {
    /// In slug order.
    pub categories: Vec<Category>,

    pub posts_by_category: BTreeMap<String, Vec<Document>>,

    /// In file name order.
    pub pages: Vec<Document>,
}

impl SiteState {
    pub fn category(&self, slug: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.slug == slug)
    }

    /// A category's posts, newest first, drafts included.
    pub fn category_posts(&self, slug: &str) -> Vec<&Document> {
        self.posts_by_category
            .get(slug)
            .map(|posts| posts.iter().collect())
            .unwrap_or_default()
    }

    /// Every post, newest first. Posts published at the same instant keep
    /// their category order.
    pub fn posts(&self) -> Vec<&Document> {
        let mut posts: Vec<&Document> = self.posts_by_category.values().flatten().collect();
        posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        posts
    }

    pub fn find_post(&self, category: &str, slug: &str) -> Option<&Document> {
        self.posts_by_category
            .get(category)?
            .iter()
            .find(|post| post.slug == slug)
    }

    pub fn find_page(&self, slug: &str) -> Option<&Document> {
        self.pages.iter().find(|page| page.slug == slug)
    }

    /// Inserts `post` into its category, replacing the post with the same
    /// slug, and re-sorts the category. Returns the replaced post.
    pub fn replace_post(&mut self, post: Document) -> Option<Document> {
        let category = post.category.clone().unwrap_or_default();
        let posts = self.posts_by_category.entry(category).or_default();
        let previous = match posts.iter().position(|p| p.slug == post.slug) {
            Some(i) => Some(std::mem::replace(&mut posts[i], post)),
            None => {
                posts.push(post);
                None
            }
        };
        sort_newest_first(posts);
        previous
    }

    /// Inserts `page`, replacing the page with the same slug. Returns the
    /// replaced page.
    pub fn replace_page(&mut self, page: Document) -> Option<Document> {
        match self.pages.iter().position(|p| p.slug == page.slug) {
            Some(i) => Some(std::mem::replace(&mut self.pages[i], page)),
            None => {
                self.pages.push(page);
                self.pages.sort_by(|a, b| a.slug.cmp(&b.slug));
                None
            }
        }
    }
}

/// A source that failed to compile. The rest of the site is still built.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub error: document::Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// What a full build produced.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub categories: usize,
    pub posts: usize,
    pub pages: usize,
    pub failures: Vec<Failure>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: PathBuf, error: document::Error) {
        error!("{}: {}", path.display(), error);
        self.failures.push(Failure { path, error });
    }
}

/// Builds a site from a [`Config`], rendering through `renderer`.
pub struct Builder<'a> {
    config: &'a Config,
    renderer: &'a dyn Renderer,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a Config, renderer: &'a dyn Renderer) -> Builder<'a> {
        Builder { config, renderer }
    }

    /// The [`FileManager`] for the live build directory.
    pub fn files(&self) -> FileManager {
        FileManager::new(&self.config.site_dir, &self.config.build_dir)
    }

    /// Compiles the whole site and writes it to the build directory.
    /// Documents and category metadata that fail to compile are reported in
    /// the [`BuildReport`]; any other failure aborts the build and leaves the
    /// existing build directory as it was.
    pub fn build(&self) -> Result<(SiteState, BuildReport)> {
        let now = Utc::now();
        let files = self.files();
        let (state, report) = self.compile(&files, now)?;
        info!(
            "compiled {} posts in {} categories and {} pages",
            report.posts, report.categories, report.pages
        );

        let staging = sibling(&self.config.build_dir, "staging");
        rmdir(&staging)?;
        fs::create_dir_all(&staging)?;
        let staged = files.with_build_dir(&staging);
        if let Err(err) = self.write_site(&staged, &state, now) {
            if let Err(cleanup) = rmdir(&staging) {
                error!("{}", cleanup);
            }
            return Err(err);
        }
        swap(&staging, &self.config.build_dir)?;
        info!("built site in {}", self.config.build_dir.display());
        Ok((state, report))
    }

    fn compile(&self, files: &FileManager, now: DateTime<Utc>) -> Result<(SiteState, BuildReport)> {
        let mut state = SiteState::default();
        let mut report = BuildReport::default();

        for slug in files.categories()? {
            let meta_path = files.category_metadata(&slug);
            let category = match compile_category(&slug, meta_path.as_deref()) {
                Ok(category) => category,
                Err(err) => {
                    report.fail(meta_path.unwrap_or_else(|| files.category_source_dir(&slug)), err);
                    continue;
                }
            };
            let (mut posts, failures) =
                compile_all(&files.documents_in(&slug)?, |path| compile_post(path, &slug, now));
            sort_newest_first(&mut posts);
            debug!("compiled {} posts in `{}`", posts.len(), slug);
            for failure in failures {
                report.fail(failure.path, failure.error);
            }
            report.categories += 1;
            report.posts += posts.len();
            state.categories.push(category);
            state.posts_by_category.insert(slug, posts);
        }

        let (pages, failures) = compile_all(&files.pages()?, |path| compile_page(path, now));
        for failure in failures {
            report.fail(failure.path, failure.error);
        }
        report.pages = pages.len();
        state.pages = pages;
        Ok((state, report))
    }

    fn writer<'w>(&'w self, files: &'w FileManager, site: &'w Value) -> Writer<'w> {
        Writer {
            renderer: self.renderer,
            output_directory: files.build_dir(),
            site_data: site,
        }
    }

    fn write_site(&self, files: &FileManager, state: &SiteState, now: DateTime<Utc>) -> Result<()> {
        let site = site_data(self.config, &state.categories, &state.pages);
        let writer = self.writer(files, &site);
        writer.write_error_pages()?;

        for category in &state.categories {
            write_json(&files.compiled_category_meta(&category.slug), category)?;
            let posts = state.category_posts(&category.slug);
            for post in &posts {
                write_json(&files.artifact_path(&post.sort_key()), post)?;
                writer.write_document(post, Some(category))?;
            }
            writer.write_index(&posts, Some(category), category.per_page(self.config.per_page))?;
            self.write_feed(files, Some(category), posts, now)?;
        }

        for page in &state.pages {
            write_json(&files.artifact_path(&page.sort_key()), page)?;
            writer.write_document(page, None)?;
        }

        let posts = state.posts();
        writer.write_index(&posts, None, self.config.per_page)?;
        self.write_feed(files, None, posts, now)?;

        if self.config.search {
            self.write_search_index(files, state)?;
        }
        self.copy_static(files)
    }

    /// Writes the feed for `category`, or the site-wide feed for `None`,
    /// from the newest published posts.
    fn write_feed(
        &self,
        files: &FileManager,
        category: Option<&Category>,
        posts: Vec<&Document>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let title = match category {
            Some(category) => format!("{}: {}", self.config.site_name, category.name),
            None => self.config.site_name.clone(),
        };
        let config = FeedConfig {
            title: &title,
            base_url: self.config.base_url(),
            description: &self.config.site_desc,
        };
        let published: Vec<&Document> = posts
            .into_iter()
            .filter(|post| !post.draft)
            .take(FEED_LENGTH)
            .collect();

        let path = files.rss_path(category.map(|category| category.slug.as_str()));
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        write_rss(&config, &published, now, BufWriter::new(File::create(&path)?))?;
        debug!("wrote {}", path.display());
        Ok(())
    }

    fn write_search_index(&self, files: &FileManager, state: &SiteState) -> Result<()> {
        let index = SearchIndex::build(state.posts().into_iter().chain(state.pages.iter()));
        index.write(&files.search_index_dir())?;
        debug!("indexed {} documents", index.documents.len());
        Ok(())
    }

    /// Copies `assets/`, the theme's `css/` and `js/`, and `favicon.ico`.
    fn copy_static(&self, files: &FileManager) -> Result<()> {
        copy_dir(&files.assets_dir(), &files.build_dir().join(ASSETS_DIR))?;
        for dir in THEME_STATIC_DIRS {
            copy_dir(&self.config.theme_dir.join(dir), &files.build_dir().join(dir))?;
        }
        let favicon = files.site_dir().join(FAVICON);
        if favicon.is_file() {
            fs::copy(&favicon, files.build_dir().join(FAVICON))?;
        }
        Ok(())
    }

    /// Recompiles the post or page at `path` and rewrites the outputs that
    /// depend on it: its single page, its JSON artifact, its category index
    /// and feed, the site-wide index and feed, and the search index. Pages
    /// appear in every template's `site_data`, so when a page's title or
    /// draft flag changes (or the page is new) every HTML page is rewritten
    /// from the in-memory state.
    ///
    /// The state is updated under the write lock, then downgraded so readers
    /// can proceed while the outputs are written.
    pub fn recompile(&self, path: &Path, state: &RwLock<SiteState>) -> Result<()> {
        let now = Utc::now();
        let files = self.files();

        if files.is_page(path) {
            let page = compile_page(path, now)?;
            let mut guard = state.write();
            let previous = guard.replace_page(page.clone());
            let guard = RwLockWriteGuard::downgrade(guard);
            remove_stale_artifact(&files, previous.as_ref(), &page)?;

            let nav_changed = previous
                .as_ref()
                .map_or(true, |prev| prev.title != page.title || prev.draft != page.draft);
            if nav_changed {
                self.write_site(&files, &guard, now)?;
                info!("recompiled page {} and rewrote the site", page.url);
                return Ok(());
            }

            let site = site_data(self.config, &guard.categories, &guard.pages);
            let writer = self.writer(&files, &site);
            write_json(&files.artifact_path(&page.sort_key()), &page)?;
            writer.write_document(&page, None)?;
            writer.write_index(&guard.posts(), None, self.config.per_page)?;
            if self.config.search {
                self.write_search_index(&files, &guard)?;
            }
            info!("recompiled page {}", page.url);
            return Ok(());
        }

        let slug = files
            .category_of(path)
            .ok_or_else(|| Error::NotADocument(path.to_owned()))?;
        if state.read().category(&slug).is_none() {
            return Err(Error::UnknownCategory(slug));
        }
        let post = compile_post(path, &slug, now)?;
        let mut guard = state.write();
        let previous = guard.replace_post(post.clone());
        let guard = RwLockWriteGuard::downgrade(guard);
        remove_stale_artifact(&files, previous.as_ref(), &post)?;

        let category = guard
            .category(&slug)
            .ok_or_else(|| Error::UnknownCategory(slug.clone()))?;
        let site = site_data(self.config, &guard.categories, &guard.pages);
        let writer = self.writer(&files, &site);
        write_json(&files.artifact_path(&post.sort_key()), &post)?;
        writer.write_document(&post, Some(category))?;

        let posts = guard.category_posts(&slug);
        writer.write_index(&posts, Some(category), category.per_page(self.config.per_page))?;
        self.write_feed(&files, Some(category), posts, now)?;

        let posts = guard.posts();
        writer.write_index(&posts, None, self.config.per_page)?;
        self.write_feed(&files, None, posts, now)?;

        if self.config.search {
            self.write_search_index(&files, &guard)?;
        }
        info!("recompiled post {}", post.url);
        Ok(())
    }
}

/// Compiles `paths` in parallel. Documents come back in the order of
/// `paths`.
fn compile_all<F>(paths: &[PathBuf], compile: F) -> (Vec<Document>, Vec<Failure>)
where
    F: Fn(&Path) -> document::Result<Document> + Sync,
{
    let results: Vec<(&PathBuf, document::Result<Document>)> = paths
        .par_iter()
        .map(|path| (path, compile(path.as_path())))
        .collect();

    let mut documents = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (path, result) in results {
        match result {
            Ok(doc) => documents.push(doc),
            Err(error) => failures.push(Failure {
                path: path.clone(),
                error,
            }),
        }
    }
    (documents, failures)
}

/// Stable, so posts published at the same instant keep their file order.
fn sort_newest_first(posts: &mut [Document]) {
    posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), value)?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Removes the artifact of `previous` when its sort key differs from
/// `current`'s (e.g. the publish date or draft flag changed).
fn remove_stale_artifact(
    files: &FileManager,
    previous: Option<&Document>,
    current: &Document,
) -> Result<()> {
    let previous = match previous {
        Some(previous) if previous.sort_key() != current.sort_key() => previous,
        _ => return Ok(()),
    };
    match fs::remove_file(files.artifact_path(&previous.sort_key())) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(Error::Io(err)),
        _ => Ok(()),
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = match entry.path().strip_prefix(src) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// A dot-prefixed sibling of `dir`, e.g. `.build.staging` for `.build`.
/// Dot directories are never mistaken for categories.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.with_file_name(format!(".{}.{}", name.trim_start_matches('.'), suffix))
}

/// Moves `staging` into `live`. The old build is moved aside first and only
/// deleted once the new one is in place; if the second rename fails, the old
/// build is restored.
fn swap(staging: &Path, live: &Path) -> Result<()> {
    let retired = sibling(live, "old");
    rmdir(&retired)?;
    let had_live = live.exists();
    if had_live {
        fs::rename(live, &retired).map_err(|err| Error::Swap {
            path: live.to_owned(),
            err,
        })?;
    }
    if let Err(err) = fs::rename(staging, live) {
        if had_live {
            fs::rename(&retired, live)?;
        }
        return Err(Error::Swap {
            path: staging.to_owned(),
            err,
        });
    }
    if had_live {
        rmdir(&retired)?;
    }
    Ok(())
}

fn rmdir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Per-document compile failures during
/// a full build are collected in [`BuildReport`] instead; they only surface
/// here from [`Builder::recompile`].
#[derive(Debug)]
pub enum Error {
    /// Returned when a single recompiled document fails to compile.
    Compile(document::Error),

    /// Returned for errors reading the source tree.
    Files(site_fs::Error),

    /// Returned for errors loading the theme.
    Template(template::Error),

    /// Returned for errors rendering or writing HTML pages.
    Write(write::Error),

    /// Returned for errors writing a feed.
    Feed(feed::Error),

    /// Returned for errors writing the search index.
    Search(search::Error),

    /// Returned for errors serializing JSON artifacts.
    Json(serde_json::Error),

    /// Returned for I/O problems while cleaning staging directories.
    Clean { path: PathBuf, err: io::Error },

    /// Returned when the new build can't be moved into place.
    Swap { path: PathBuf, err: io::Error },

    /// Returned when a recompiled path is neither a post nor a page.
    NotADocument(PathBuf),

    /// Returned when a recompiled post belongs to a category the last full
    /// build didn't see.
    UnknownCategory(String),

    /// Returned for other I/O errors.
    Io(io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Compile(err) => err.fmt(f),
            Error::Files(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::Search(err) => write!(f, "writing search index: {}", err),
            Error::Json(err) => write!(f, "writing artifact: {}", err),
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::Swap { path, err } => {
                write!(f, "Moving '{}' into place: {}", path.display(), err)
            }
            Error::NotADocument(path) => {
                write!(f, "'{}' is not a post or page", path.display())
            }
            Error::UnknownCategory(slug) => write!(f, "unknown category `{}`", slug),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Compile(err) => Some(err),
            Error::Files(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::Search(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::Swap { path: _, err } => Some(err),
            Error::NotADocument(_) => None,
            Error::UnknownCategory(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    /// Converts [`io::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<document::Error> for Error {
    /// Converts [`document::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: document::Error) -> Error {
        Error::Compile(err)
    }
}

impl From<site_fs::Error> for Error {
    /// Converts [`site_fs::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: site_fs::Error) -> Error {
        Error::Files(err)
    }
}

impl From<template::Error> for Error {
    /// Converts [`template::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: template::Error) -> Error {
        Error::Template(err)
    }
}

impl From<write::Error> for Error {
    /// Converts [`write::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: write::Error) -> Error {
        Error::Write(err)
    }
}

impl From<feed::Error> for Error {
    /// Converts [`feed::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: feed::Error) -> Error {
        Error::Feed(err)
    }
}

impl From<search::Error> for Error {
    /// Converts [`search::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: search::Error) -> Error {
        Error::Search(err)
    }
}

impl From<serde_json::Error> for Error {
    /// Converts [`serde_json::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn post(category: &str, slug: &str, ts: i64) -> Document {
        let published_at = Utc.timestamp_opt(ts, 0).unwrap();
        Document {
            slug: slug.to_owned(),
            category: Some(category.to_owned()),
            title: slug.to_owned(),
            title_html: None,
            published_at,
            published_ts: ts,
            draft: false,
            body_raw: String::new(),
            body_html: String::new(),
            body_text: String::new(),
            description: String::new(),
            lead_image: None,
            url: format!("/{}/{}", category, slug),
            template: None,
            source: PathBuf::from(slug),
            extra: BTreeMap::new(),
        }
    }

    fn slugs(posts: &[&Document]) -> Vec<String> {
        posts.iter().map(|post| post.slug.clone()).collect()
    }

    #[test]
    fn test_posts_merge_is_stable() {
        let mut state = SiteState::default();
        state.replace_post(post("a", "a1", 100));
        state.replace_post(post("a", "a2", 300));
        state.replace_post(post("b", "b1", 200));
        state.replace_post(post("b", "b2", 300));
        assert_eq!(vec!["a2", "b2", "b1", "a1"], slugs(&state.posts()));
        assert_eq!(vec!["b2", "b1"], slugs(&state.category_posts("b")));
    }

    #[test]
    fn test_replace_post_resorts() {
        let mut state = SiteState::default();
        state.replace_post(post("a", "one", 100));
        state.replace_post(post("a", "two", 200));
        let previous = state.replace_post(post("a", "one", 300));
        assert_eq!(Some(100), previous.map(|p| p.published_ts));
        assert_eq!(vec!["one", "two"], slugs(&state.category_posts("a")));
        assert_eq!(Some(300), state.find_post("a", "one").map(|p| p.published_ts));
        assert!(state.find_post("a", "three").is_none());
    }

    #[test]
    fn test_sibling() {
        assert_eq!(
            PathBuf::from("/srv/site/.build.staging"),
            sibling(Path::new("/srv/site/.build"), "staging")
        );
        assert_eq!(
            PathBuf::from("/srv/.public.old"),
            sibling(Path::new("/srv/public"), "old")
        );
    }

    #[test]
    fn test_swap_replaces_live_directory() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let live = dir.path().join("live");
        let staging = dir.path().join("staging");
        fs::create_dir_all(&live)?;
        fs::write(live.join("stale.html"), "old")?;
        fs::create_dir_all(&staging)?;
        fs::write(staging.join("index.html"), "new")?;

        swap(&staging, &live)?;
        assert!(!staging.exists());
        assert!(!live.join("stale.html").exists());
        assert_eq!("new", fs::read_to_string(live.join("index.html"))?);
        assert!(!sibling(&live, "old").exists());
        Ok(())
    }
}
