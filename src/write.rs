//! Renders documents and indexes through a [`Renderer`] and writes the
//! resulting HTML pages to disk.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gtmpl::Value;
use log::debug;

use crate::config::Config;
use crate::document::{Category, Document};
use crate::paginate::{paginate, PageInfo};
use crate::template::{self, escaped, object, Renderer};

/// The template for the site-wide index.
pub const INDEX_TEMPLATE: &str = "index.html";

pub const NOT_FOUND_TEMPLATE: &str = "404.html";
pub const INTERNAL_ERROR_TEMPLATE: &str = "500.html";

const PAGINATION_DIR: &str = "p";
const INDEX_FILE: &str = "index.html";

/// Builds the `site_data` value shared by every template: the site settings,
/// the categories and the published pages. [`Writer`] adds `current_url`
/// per page.
pub fn site_data(config: &Config, categories: &[Category], pages: &[Document]) -> Value {
    object(vec![
        ("site_name", escaped(&config.site_name)),
        ("site_url", Value::String(config.base_url().to_owned())),
        ("site_desc", escaped(&config.site_desc)),
        ("per_page", Value::from(config.per_page as u64)),
        ("theme", Value::String(config.theme.clone())),
        (
            "categories",
            Value::Array(categories.iter().map(Value::from).collect()),
        ),
        (
            "pages",
            Value::Array(
                pages
                    .iter()
                    .filter(|page| !page.draft)
                    .map(Value::from)
                    .collect(),
            ),
        ),
    ])
}

/// Responsible for templating and writing HTML pages into the output
/// directory.
pub struct Writer<'a> {
    pub renderer: &'a dyn Renderer,

    /// The root of the rendered site. A page with URL `/a/b` is written to
    /// `{output_directory}/a/b/index.html`.
    pub output_directory: &'a Path,

    /// See [`site_data`].
    pub site_data: &'a Value,
}

impl Writer<'_> {
    /// Renders `template` with `fields` plus `site_data` and writes the
    /// result to `file_path`, creating parent directories as needed.
    fn write_page(
        &self,
        template: &str,
        fields: Vec<(&'static str, Value)>,
        current_url: &str,
        file_path: &Path,
    ) -> Result<()> {
        let mut site_data = self.site_data.clone();
        if let Value::Object(obj) = &mut site_data {
            obj.insert(
                "current_url".to_owned(),
                Value::String(current_url.to_owned()),
            );
        }
        let mut data: HashMap<String, Value> = fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        data.insert("site_data".to_owned(), site_data);

        let html = self.renderer.render(template, &Value::Object(data))?;
        if let Some(dir) = file_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(file_path, html)?;
        debug!("wrote {}", file_path.display());
        Ok(())
    }

    /// The file for a root-relative URL.
    fn file_for(&self, url: &str) -> PathBuf {
        let mut path = self.output_directory.to_owned();
        path.extend(url.split('/').filter(|part| !part.is_empty()));
        path.join(INDEX_FILE)
    }

    /// Writes the single page for a post or site page. Drafts get a page too;
    /// they are only left out of indexes and feeds.
    pub fn write_document(&self, doc: &Document, category: Option<&Category>) -> Result<()> {
        let fields = match doc.is_page() {
            true => vec![("page", Value::from(doc))],
            false => vec![
                ("post", Value::from(doc)),
                ("category", category.map_or(Value::Nil, Value::from)),
            ],
        };
        self.write_page(doc.template_name(), fields, &doc.url, &self.file_for(&doc.url))
    }

    /// Writes the paginated index for `category`, or the site-wide index for
    /// `None`. `posts` must already be in display order; drafts are skipped.
    ///
    /// Page 1 is written both to the index root and to `p/1/`; page `n` to
    /// `p/n/`. An index with no published posts still gets an empty first
    /// page. Pagination pages from a previous render are removed first so a
    /// shrinking index leaves no stale pages behind.
    pub fn write_index(
        &self,
        posts: &[&Document],
        category: Option<&Category>,
        per_page: usize,
    ) -> Result<()> {
        let published: Vec<&Document> = posts.iter().copied().filter(|doc| !doc.draft).collect();
        let (base, template) = match category {
            Some(category) => (category.url.as_str(), category.template_name()),
            None => ("", INDEX_TEMPLATE),
        };
        let root = self.file_for(base);
        let root_dir = root.parent().unwrap_or(self.output_directory);
        rmdir(&root_dir.join(PAGINATION_DIR))?;

        let mut pages: Vec<(&[&Document], PageInfo)> =
            paginate(&published, per_page, base).collect();
        if pages.is_empty() {
            pages.push((
                &[],
                PageInfo {
                    current: 1,
                    last: 1,
                    next: None,
                    prev: None,
                },
            ));
        }

        let current_url = match base {
            "" => "/",
            base => base,
        };
        for (items, info) in pages {
            let fields = || {
                vec![
                    ("posts", Value::Array(items.iter().map(|doc| Value::from(*doc)).collect())),
                    ("page", Value::from(&info)),
                    ("category", category.map_or(Value::Nil, Value::from)),
                ]
            };
            if info.current == 1 {
                self.write_page(template, fields(), current_url, &root)?;
            }
            let page_file = root_dir
                .join(PAGINATION_DIR)
                .join(info.current.to_string())
                .join(INDEX_FILE);
            self.write_page(template, fields(), current_url, &page_file)?;
        }
        Ok(())
    }

    /// Writes `404.html` and `500.html` at the root of the output directory.
    pub fn write_error_pages(&self) -> Result<()> {
        for (template, status) in [(NOT_FOUND_TEMPLATE, 404u64), (INTERNAL_ERROR_TEMPLATE, 500)] {
            self.write_page(
                template,
                vec![("status", Value::from(status))],
                "",
                &self.output_directory.join(template),
            )?;
        }
        Ok(())
    }
}

fn rmdir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::Io(err)),
    }
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error during templating.
    Template(template::Error),

    /// An error writing the output files.
    Io(io::Error),
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<template::Error> for Error {
    /// Converts a [`template::Error`] into an [`Error`]. This allows us to
    /// use the `?` operator for fallible template operations.
    fn from(err: template::Error) -> Error {
        Error::Template(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Renders the template name followed by the URLs of the listed posts
    /// and the page links.
    struct Echo;

    impl Renderer for Echo {
        fn render(&self, template: &str, data: &Value) -> template::Result<String> {
            let mut out = template.to_owned();
            if let Value::Object(obj) = data {
                if let Some(Value::Array(posts)) = obj.get("posts") {
                    for post in posts {
                        if let Value::Object(post) = post {
                            if let Some(Value::String(url)) = post.get("url") {
                                out.push(' ');
                                out.push_str(url);
                            }
                        }
                    }
                }
                if let Some(Value::Object(page)) = obj.get("page") {
                    for key in ["prev", "next"] {
                        if let Some(Value::String(url)) = page.get(key) {
                            out.push_str(&format!(" {}={}", key, url));
                        }
                    }
                }
            }
            Ok(out)
        }
    }

    fn doc(category: Option<&str>, slug: &str, day: u32, draft: bool) -> Document {
        let published_at = Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap();
        Document {
            slug: slug.to_owned(),
            category: category.map(str::to_owned),
            title: slug.to_owned(),
            title_html: None,
            published_at,
            published_ts: published_at.timestamp(),
            draft,
            body_raw: String::new(),
            body_html: String::new(),
            body_text: String::new(),
            description: String::new(),
            lead_image: None,
            url: match category {
                Some(category) => format!("/{}/{}", category, slug),
                None => format!("/{}", slug),
            },
            template: None,
            source: PathBuf::from(slug),
            extra: BTreeMap::new(),
        }
    }

    fn read(dir: &Path, path: &str) -> String {
        fs::read_to_string(dir.join(path)).unwrap()
    }

    #[test]
    fn test_write_index_paginates() -> Result<()> {
        let dir = TempDir::new()?;
        let site_data = object(vec![]);
        let writer = Writer {
            renderer: &Echo,
            output_directory: dir.path(),
            site_data: &site_data,
        };
        let docs: Vec<Document> = vec![
            doc(Some("c"), "e", 5, false),
            doc(Some("c"), "d", 4, false),
            doc(Some("c"), "x", 3, true),
            doc(Some("c"), "c", 3, false),
            doc(Some("c"), "b", 2, false),
            doc(Some("c"), "a", 1, false),
        ];
        let posts: Vec<&Document> = docs.iter().collect();
        let category = Category::new("c");
        writer.write_index(&posts, Some(&category), 2)?;

        let root = dir.path();
        assert_eq!("category.html /c/e /c/d next=/c/p/2", read(root, "c/index.html"));
        assert_eq!(read(root, "c/index.html"), read(root, "c/p/1/index.html"));
        assert_eq!(
            "category.html /c/c /c/b prev=/c/p/1 next=/c/p/3",
            read(root, "c/p/2/index.html")
        );
        assert_eq!("category.html /c/a prev=/c/p/2", read(root, "c/p/3/index.html"));
        assert!(!root.join("c/p/4").exists());

        // A shorter list removes the old pagination pages.
        writer.write_index(&posts[..2], Some(&category), 2)?;
        assert!(!root.join("c/p/2").exists());
        Ok(())
    }

    #[test]
    fn test_write_index_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let site_data = object(vec![]);
        let writer = Writer {
            renderer: &Echo,
            output_directory: dir.path(),
            site_data: &site_data,
        };
        let draft = doc(Some("c"), "x", 1, true);
        writer.write_index(&[&draft], None, 10)?;
        assert_eq!("index.html", read(dir.path(), "index.html"));
        assert_eq!("index.html", read(dir.path(), "p/1/index.html"));
        Ok(())
    }

    #[test]
    fn test_write_document_and_error_pages() -> Result<()> {
        let dir = TempDir::new()?;
        let site_data = object(vec![]);
        let writer = Writer {
            renderer: &Echo,
            output_directory: dir.path(),
            site_data: &site_data,
        };
        writer.write_document(&doc(Some("c"), "draft", 1, true), None)?;
        writer.write_document(&doc(None, "about", 1, false), None)?;
        writer.write_error_pages()?;
        assert_eq!("single.html", read(dir.path(), "c/draft/index.html"));
        assert_eq!("page.html", read(dir.path(), "about/index.html"));
        assert_eq!("404.html", read(dir.path(), "404.html"));
        assert_eq!("500.html", read(dir.path(), "500.html"));
        Ok(())
    }
}
