//! Defines the [`Document`] and [`Category`] records and the compilers that
//! produce them from source files.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::markdown;
use crate::metadata::{self, extract_metadata, Scalar};
use crate::sort_key::SortKey;

/// The template used for post pages.
pub const POST_TEMPLATE: &str = "single.html";

/// The default template for site pages.
pub const PAGE_TEMPLATE: &str = "page.html";

/// The default template for category index pages.
pub const CATEGORY_TEMPLATE: &str = "category.html";

/// A compiled post or page. Posts have a category; pages don't.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The source file stem.
    pub slug: String,

    /// The category (parent directory) for posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    pub title: String,

    /// The title as inline HTML, when it came from a leading heading.
    #[serde(default)]
    pub title_html: Option<String>,

    pub published_at: DateTime<Utc>,

    /// `published_at` as Unix-epoch seconds.
    pub published_ts: i64,

    pub draft: bool,

    /// The markdown body, without front matter or title heading.
    pub body_raw: String,

    pub body_html: String,

    /// The text nodes of `body_html`.
    pub body_text: String,

    /// A short excerpt of `body_text`. See [`markdown::description`].
    pub description: String,

    /// The first image referenced in the body.
    #[serde(default)]
    pub lead_image: Option<String>,

    /// `/{category}/{slug}` for posts and `/{slug}` for pages.
    pub url: String,

    /// An explicit template from front matter.
    #[serde(default)]
    pub template: Option<String>,

    /// The source file this document was compiled from.
    pub source: PathBuf,

    /// Unknown front-matter keys.
    #[serde(default)]
    pub extra: BTreeMap<String, Scalar>,
}

impl Document {
    /// The artifact name for this document.
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            draft: self.draft,
            published_ts: self.published_ts,
            category: self.category.clone(),
            slug: self.slug.clone(),
        }
    }

    pub fn is_page(&self) -> bool {
        self.category.is_none()
    }

    /// The template this document renders with.
    pub fn template_name(&self) -> &str {
        match (&self.template, self.is_page()) {
            (Some(template), _) => template,
            (None, true) => PAGE_TEMPLATE,
            (None, false) => POST_TEMPLATE,
        }
    }
}

/// A directory-backed group of posts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The directory name.
    pub slug: String,

    /// The display name.
    pub name: String,

    /// `/{slug}`
    pub url: String,

    /// Overrides the site-wide page size. `Some(0)` disables pagination.
    #[serde(default)]
    pub per_page: Option<usize>,

    /// Overrides [`CATEGORY_TEMPLATE`].
    #[serde(default)]
    pub template: Option<String>,

    /// Unknown metadata keys.
    #[serde(default)]
    pub extra: BTreeMap<String, Scalar>,
}

impl Category {
    /// Creates a category with no metadata overrides.
    pub fn new(slug: &str) -> Category {
        Category {
            slug: slug.to_owned(),
            name: slug.replace(|c: char| c == '_' || c == '-', " "),
            url: format!("/{}", slug),
            per_page: None,
            template: None,
            extra: BTreeMap::new(),
        }
    }

    /// The page size for this category's index, falling back to the site's.
    pub fn per_page(&self, site_per_page: usize) -> usize {
        self.per_page.unwrap_or(site_per_page)
    }

    pub fn template_name(&self) -> &str {
        self.template.as_deref().unwrap_or(CATEGORY_TEMPLATE)
    }
}

#[derive(Deserialize, Default)]
struct CategoryMeta {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    per_page: Option<usize>,

    #[serde(default)]
    template: Option<String>,

    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

/// Builds a [`Category`] from its slug and optional `meta.yaml` sidecar.
pub fn compile_category(slug: &str, meta_path: Option<&Path>) -> Result<Category> {
    let mut category = Category::new(slug);
    let path = match meta_path {
        None => return Ok(category),
        Some(path) => path,
    };

    let contents = read_source(path)?;
    let meta: CategoryMeta = match contents.trim().is_empty() {
        true => CategoryMeta::default(),
        false => serde_yaml::from_str(&contents)?,
    };
    if let Some(name) = meta.name {
        category.name = name;
    }
    category.per_page = meta.per_page;
    category.template = meta.template;
    category.extra = meta
        .extra
        .iter()
        .filter_map(|(k, v)| Scalar::from_yaml(v).map(|v| (k.clone(), v)))
        .collect();
    Ok(category)
}

/// Compiles a post. `category` is the directory the post lives in.
pub fn compile_post(path: &Path, category: &str, now: DateTime<Utc>) -> Result<Document> {
    compile(path, Some(category), now)
}

/// Compiles a site page.
pub fn compile_page(path: &Path, now: DateTime<Utc>) -> Result<Document> {
    compile(path, None, now)
}

fn compile(path: &Path, category: Option<&str>, now: DateTime<Utc>) -> Result<Document> {
    let raw = read_source(path)?;
    let slug = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| Error::InvalidFileName(path.to_owned()))?;

    let (body_raw, meta) = extract_metadata(&raw, now)?;
    let body_html = markdown::to_html(&body_raw)?;
    let body_text = markdown::html_to_text(&body_html)?;

    Ok(Document {
        slug: slug.to_owned(),
        category: category.map(str::to_owned),
        title: meta.title,
        title_html: meta.title_html,
        published_at: meta.published_at,
        published_ts: meta.published_ts,
        draft: meta.draft,
        description: markdown::description(&body_text),
        lead_image: markdown::lead_image(&body_raw),
        url: match category {
            Some(category) => format!("/{}/{}", category, slug),
            None => format!("/{}", slug),
        },
        template: meta.template,
        source: path.to_owned(),
        extra: meta.extra,
        body_raw,
        body_html,
        body_text,
    })
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => Error::NotFound(path.to_owned()),
        _ => Error::Io(err),
    })
}

/// The result of compiling a document or category.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error compiling a single source file.
#[derive(Debug)]
pub enum Error {
    /// Returned when the source file doesn't exist.
    NotFound(PathBuf),

    /// Returned when the file stem isn't valid UTF-8.
    InvalidFileName(PathBuf),

    /// Returned when front matter holds a value that can't be coerced.
    Parse(metadata::Error),

    /// Returned when category metadata isn't valid YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when the markdown can't be rendered.
    Render(markdown::Error),

    /// Returned for other I/O errors.
    Io(io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(path) => write!(f, "no such file: {}", path.display()),
            Error::InvalidFileName(path) => write!(f, "invalid file name: {:?}", path),
            Error::Parse(err) => err.fmt(f),
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Render(err) => write!(f, "rendering markdown: {}", err),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) | Error::InvalidFileName(_) => None,
            Error::Parse(err) => Some(err),
            Error::DeserializeYaml(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<metadata::Error> for Error {
    fn from(err: metadata::Error) -> Error {
        Error::Parse(err)
    }
}

impl From<markdown::Error> for Error {
    fn from(err: markdown::Error) -> Error {
        Error::Render(err)
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, contents: &str) -> PathBuf {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_compile_post() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write(
            dir.path(),
            "foo/bar.md",
            "---\ndraft: \"false\"\npublished_at: \"2020-01-01 10:00:00\"\n---\n# Hello\nworld",
        );
        let doc = compile_post(&path, "foo", Utc::now())?;
        assert_eq!("bar", doc.slug);
        assert_eq!(Some("foo".to_owned()), doc.category);
        assert_eq!("Hello", doc.title);
        assert!(!doc.draft);
        assert!(doc.body_html.contains("<p>world</p>"));
        assert_eq!("/foo/bar", doc.url);
        assert_eq!(
            Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap(),
            doc.published_at
        );
        assert_eq!("001577872800_foo_bar", doc.sort_key().encode());
        assert_eq!(POST_TEMPLATE, doc.template_name());
        Ok(())
    }

    #[test]
    fn test_compile_page() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write(
            dir.path(),
            "pages/about.md",
            "# About\n\n![me](/assets/me.jpg)\n\nHi there.",
        );
        let doc = compile_page(&path, Utc::now())?;
        assert_eq!(None, doc.category);
        assert_eq!("/about", doc.url);
        assert_eq!(Some("/assets/me.jpg".to_owned()), doc.lead_image);
        assert_eq!(PAGE_TEMPLATE, doc.template_name());
        assert!(doc.body_text.contains("Hi there."));
        assert!(!doc.body_text.contains('<'));
        Ok(())
    }

    #[test]
    fn test_compile_is_deterministic() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write(
            dir.path(),
            "foo/a.md",
            "---\npublished_at: 2018-02-03 04:05:06\ndraft: yes\n---\nbody",
        );
        let first = compile_post(&path, "foo", Utc::now())?;
        let second = compile_post(&path, "foo", Utc::now())?;
        assert_eq!(first.sort_key(), second.sort_key());
        assert_eq!(first.published_ts, second.published_ts);
        assert!(first.draft && second.draft);
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        match compile_post(Path::new("/nonexistent/x.md"), "x", Utc::now()) {
            Err(Error::NotFound(path)) => assert_eq!(Path::new("/nonexistent/x.md"), path),
            other => panic!("wanted NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_draft() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write(dir.path(), "foo/a.md", "---\ndraft: \"maybe\"\n---\nbody");
        assert!(matches!(
            compile_post(&path, "foo", Utc::now()),
            Err(Error::Parse(metadata::Error::InvalidDraft(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_category_defaults() -> Result<()> {
        let category = compile_category("long_reads", None)?;
        assert_eq!("long reads", category.name);
        assert_eq!("/long_reads", category.url);
        assert_eq!(None, category.per_page);
        assert_eq!(7, category.per_page(7));
        assert_eq!(CATEGORY_TEMPLATE, category.template_name());
        Ok(())
    }

    #[test]
    fn test_category_meta() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write(
            dir.path(),
            "notes/meta.yaml",
            "name: Field Notes\nper_page: 0\ntemplate: notes.html\ncolor: blue\n",
        );
        let category = compile_category("notes", Some(&path))?;
        assert_eq!("Field Notes", category.name);
        assert_eq!(0, category.per_page(10));
        assert_eq!("notes.html", category.template_name());
        assert_eq!(
            Some(&Scalar::String("blue".to_owned())),
            category.extra.get("color")
        );
        Ok(())
    }
}
