//! Defines [`FileManager`], which keeps the source and build-output layouts
//! in one place.
//!
//! Source layout:
//!
//! ```text
//! <site>/assets/...            copied verbatim
//! <site>/pages/*.md            site pages
//! <site>/<category>/*.md       posts
//! <site>/<category>/meta.yaml  optional category metadata
//! ```
//!
//! Build layout (besides the rendered HTML):
//!
//! ```text
//! <build>/<category>/meta.json
//! <build>/<category>/<sort key>.json
//! <build>/pages/<sort key>.json
//! <build>/rss/<category>.xml
//! <build>/rss/rss.xml
//! <build>/.searchindex/index.json
//! ```

use std::fmt;
use std::fs::{self, read_dir};
use std::io;
use std::path::{Path, PathBuf};

use crate::sort_key::SortKey;

pub const ASSETS_DIR: &str = "assets";
pub const PAGES_DIR: &str = "pages";
pub const THEMES_DIR: &str = "themes";
pub const RSS_DIR: &str = "rss";
pub const SEARCH_INDEX_DIR: &str = ".searchindex";

/// The optional per-category metadata file in the source tree.
pub const CATEGORY_META: &str = "meta.yaml";

/// The compiled category metadata in the build tree.
pub const COMPILED_CATEGORY_META: &str = "meta.json";

/// The feed covering every category.
pub const SITE_FEED: &str = "rss";

const MARKDOWN_EXTENSION: &str = "md";
const JSON_EXTENSION: &str = "json";
const RESERVED_DIRS: &[&str] = &[ASSETS_DIR, PAGES_DIR, THEMES_DIR];

/// Resolves paths for a site's source directory and its build directory. It
/// holds no state beyond the two roots; every query goes to the file system.
#[derive(Clone, Debug)]
pub struct FileManager {
    site_dir: PathBuf,
    build_dir: PathBuf,
}

impl FileManager {
    pub fn new(site_dir: &Path, build_dir: &Path) -> FileManager {
        FileManager {
            site_dir: site_dir.to_owned(),
            build_dir: build_dir.to_owned(),
        }
    }

    /// A copy of this manager that writes to a different build directory.
    pub fn with_build_dir(&self, build_dir: &Path) -> FileManager {
        FileManager::new(&self.site_dir, build_dir)
    }

    pub fn site_dir(&self) -> &Path {
        &self.site_dir
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.site_dir.join(ASSETS_DIR)
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.site_dir.join(PAGES_DIR)
    }

    /// Category slugs: every directory directly under the site root except
    /// `assets`, `pages`, `themes`, dot-directories and the build directory,
    /// in name order.
    pub fn categories(&self) -> Result<Vec<String>> {
        let mut categories = Vec::new();
        for result in read_dir(&self.site_dir)? {
            let entry = result?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.')
                || RESERVED_DIRS.contains(&name.as_str())
                || entry.path() == self.build_dir
            {
                continue;
            }
            categories.push(name);
        }
        categories.sort();
        Ok(categories)
    }

    pub fn category_source_dir(&self, category: &str) -> PathBuf {
        self.site_dir.join(category)
    }

    /// The markdown files directly inside a category directory, in name
    /// order.
    pub fn documents_in(&self, category: &str) -> Result<Vec<PathBuf>> {
        let dir = self.category_source_dir(category);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("category `{}`", category)));
        }
        markdown_files(&dir)
    }

    /// The category's `meta.yaml`, if it has one.
    pub fn category_metadata(&self, category: &str) -> Option<PathBuf> {
        let path = self.category_source_dir(category).join(CATEGORY_META);
        match path.is_file() {
            true => Some(path),
            false => None,
        }
    }

    /// The markdown files in the pages directory. A site without one has no
    /// pages.
    pub fn pages(&self) -> Result<Vec<PathBuf>> {
        let dir = self.pages_dir();
        match dir.is_dir() {
            true => markdown_files(&dir),
            false => Ok(Vec::new()),
        }
    }

    /// Whether `path` is a site page source.
    pub fn is_page(&self, path: &Path) -> bool {
        is_markdown(path) && path.parent() == Some(self.pages_dir().as_path())
    }

    /// The category a post source belongs to, or `None` if `path` isn't a
    /// markdown file directly inside a category directory.
    pub fn category_of(&self, path: &Path) -> Option<String> {
        if !is_markdown(path) {
            return None;
        }
        let parent = path.parent()?;
        if parent.parent()? != self.site_dir {
            return None;
        }
        let name = parent.file_name()?.to_str()?;
        match name.starts_with('.') || RESERVED_DIRS.contains(&name) {
            true => None,
            false => Some(name.to_owned()),
        }
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.build_dir.join(category)
    }

    pub fn compiled_pages_dir(&self) -> PathBuf {
        self.build_dir.join(PAGES_DIR)
    }

    pub fn compiled_category_meta(&self, category: &str) -> PathBuf {
        self.category_dir(category).join(COMPILED_CATEGORY_META)
    }

    /// Where the JSON artifact for a document is stored.
    pub fn artifact_path(&self, key: &SortKey) -> PathBuf {
        let dir = match &key.category {
            Some(category) => self.category_dir(category),
            None => self.compiled_pages_dir(),
        };
        dir.join(format!("{}.{}", key.encode(), JSON_EXTENSION))
    }

    /// Compiled category slugs: build directories holding a `meta.json`, in
    /// name order.
    pub fn compiled_categories(&self) -> Result<Vec<String>> {
        let mut categories = Vec::new();
        for result in read_dir(&self.build_dir)? {
            let entry = result?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir()
                && !name.starts_with('.')
                && entry.path().join(COMPILED_CATEGORY_META).is_file()
            {
                categories.push(name);
            }
        }
        categories.sort();
        Ok(categories)
    }

    /// A category's compiled documents, newest first. Drafts are skipped
    /// unless `include_drafts` is set.
    pub fn compiled_documents(&self, category: &str, include_drafts: bool) -> Result<Vec<PathBuf>> {
        let dir = self.category_dir(category);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("category `{}`", category)));
        }
        artifacts(&dir, include_drafts)
    }

    /// The compiled pages, newest first.
    pub fn compiled_pages(&self, include_drafts: bool) -> Result<Vec<PathBuf>> {
        let dir = self.compiled_pages_dir();
        match dir.is_dir() {
            true => artifacts(&dir, include_drafts),
            false => Ok(Vec::new()),
        }
    }

    /// Finds the compiled post for `category` and `slug`. This scans the
    /// category's build directory.
    pub fn find_document(&self, category: &str, slug: &str) -> Result<PathBuf> {
        let dir = self.category_dir(category);
        find_artifact(&dir, Some(category), slug)
            .ok_or_else(|| Error::NotFound(format!("post `{}/{}`", category, slug)))
    }

    /// Finds the compiled page for `slug`.
    pub fn find_page(&self, slug: &str) -> Result<PathBuf> {
        find_artifact(&self.compiled_pages_dir(), None, slug)
            .ok_or_else(|| Error::NotFound(format!("page `{}`", slug)))
    }

    pub fn rss_dir(&self) -> PathBuf {
        self.build_dir.join(RSS_DIR)
    }

    /// The feed for `category`, or the site-wide feed for `None`.
    pub fn rss_path(&self, category: Option<&str>) -> PathBuf {
        let name = category.unwrap_or(SITE_FEED).replace('/', ".");
        self.rss_dir().join(format!("{}.xml", name))
    }

    pub fn search_index_dir(&self) -> PathBuf {
        self.build_dir.join(SEARCH_INDEX_DIR)
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION)
}

fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for result in read_dir(dir)? {
        let entry = result?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_markdown(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn artifacts(dir: &Path, include_drafts: bool) -> Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    for result in read_dir(dir)? {
        let entry = result?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(JSON_EXTENSION) || name == COMPILED_CATEGORY_META {
            continue;
        }
        if !include_drafts && SortKey::is_draft_name(&name) {
            continue;
        }
        names.push(name);
    }
    names.sort_by(|a, b| b.cmp(a));
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

fn find_artifact(dir: &Path, category: Option<&str>, slug: &str) -> Option<PathBuf> {
    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != JSON_EXTENSION) {
            continue;
        }
        let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem,
            None => continue,
        };
        if let Some(key) = SortKey::parse(stem, category) {
            if key.slug == slug {
                return Some(path);
            }
        }
    }
    None
}

/// The result of a [`FileManager`] query.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error resolving site paths.
#[derive(Debug)]
pub enum Error {
    /// Returned when a requested category, post, or page doesn't exist.
    NotFound(String),

    /// Returned for other I/O errors.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "{} not found", what),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    /// Converts a [`io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for IO operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
