//! The boundary with the template engine. Builders only see the [`Renderer`]
//! trait; [`Theme`] implements it with `gtmpl` (Go template syntax) over a
//! directory of `*.html` templates. This module also converts documents,
//! categories and page descriptors into template [`Value`]s.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gtmpl::{Context, Template, Value};

use crate::document::{Category, Document};
use crate::metadata::Scalar;
use crate::paginate::PageInfo;

/// Renders a named template with some data.
pub trait Renderer {
    fn render(&self, template: &str, data: &Value) -> Result<String>;
}

/// A set of parsed templates loaded from a theme directory. Each `*.html`
/// file is a template named after its file name (e.g. `index.html`).
pub struct Theme {
    dir: PathBuf,
    templates: HashMap<String, Template>,
}

impl Theme {
    /// Parses every `*.html` file in `dir`.
    pub fn load(dir: &Path) -> Result<Theme> {
        let entries = fs::read_dir(dir).map_err(|err| Error::OpenTheme {
            path: dir.to_owned(),
            err,
        })?;
        let mut templates = HashMap::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "html") {
                continue;
            }
            let name = match path.file_name().and_then(|name| name.to_str()) {
                Some(name) => name.to_owned(),
                None => continue,
            };
            let contents = fs::read_to_string(&path)?;
            let mut template = Template::default();
            template
                .parse(&contents)
                .map_err(|err| Error::Parse {
                    name: name.clone(),
                    err: err.to_string(),
                })?;
            templates.insert(name, template);
        }
        Ok(Theme {
            dir: dir.to_owned(),
            templates,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

impl Renderer for Theme {
    fn render(&self, name: &str, data: &Value) -> Result<String> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| Error::Missing(name.to_owned()))?;
        let context = Context::from(data.clone()).map_err(|err| Error::Execute {
            name: name.to_owned(),
            err: err.to_string(),
        })?;
        let mut out = Vec::new();
        template
            .execute(&mut out, &context)
            .map_err(|err| Error::Execute {
                name: name.to_owned(),
                err: err.to_string(),
            })?;
        String::from_utf8(out).map_err(|err| Error::Execute {
            name: name.to_owned(),
            err: err.to_string(),
        })
    }
}

/// Builds a [`Value::Object`] from key/value pairs.
pub fn object<I>(fields: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect(),
    )
}

fn string(s: &str) -> Value {
    Value::String(s.to_owned())
}

/// A string value escaped for use in HTML text and double-quoted attributes.
/// gtmpl doesn't escape on output.
pub fn escaped(s: &str) -> Value {
    Value::String(html_escape::encode_double_quoted_attribute(s).into_owned())
}

fn optional(s: &Option<String>) -> Value {
    match s {
        Some(s) => Value::String(s.clone()),
        None => Value::Nil,
    }
}

impl From<&Scalar> for Value {
    fn from(scalar: &Scalar) -> Value {
        match scalar {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(x) => Value::from(*x),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&Document> for Value {
    /// Converts a [`Document`] into a template value. The published date is
    /// available both as `published_at` (RFC 3339) and as a display string,
    /// `date`. `title` and `description` are HTML-escaped; `html` and
    /// `title_html` are markup already.
    fn from(doc: &Document) -> Value {
        let extra: HashMap<String, Value> = doc
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect();
        object(vec![
            ("slug", string(&doc.slug)),
            ("category", optional(&doc.category)),
            ("title", escaped(&doc.title)),
            (
                "title_html",
                match &doc.title_html {
                    Some(html) => string(html),
                    None => escaped(&doc.title),
                },
            ),
            ("published_at", Value::String(doc.published_at.to_rfc3339())),
            (
                "date",
                Value::String(doc.published_at.format("%B %-d, %Y").to_string()),
            ),
            ("published_ts", Value::from(doc.published_ts)),
            ("draft", Value::Bool(doc.draft)),
            ("plain", string(&doc.body_raw)),
            ("html", string(&doc.body_html)),
            ("text", string(&doc.body_text)),
            ("description", escaped(&doc.description)),
            ("image", optional(&doc.lead_image)),
            ("url", string(&doc.url)),
            ("extra", Value::Object(extra)),
        ])
    }
}

impl From<&Category> for Value {
    /// Converts a [`Category`] into a template value.
    fn from(category: &Category) -> Value {
        let extra: HashMap<String, Value> = category
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect();
        object(vec![
            ("slug", string(&category.slug)),
            ("name", escaped(&category.name)),
            ("url", string(&category.url)),
            ("template", string(category.template_name())),
            ("extra", Value::Object(extra)),
        ])
    }
}

impl From<&PageInfo> for Value {
    /// Converts a [`PageInfo`] into a value with `current`, `last`, `next`
    /// and `prev` fields.
    fn from(page: &PageInfo) -> Value {
        object(vec![
            ("current", Value::from(page.current as u64)),
            ("last", Value::from(page.last as u64)),
            ("next", optional(&page.next)),
            ("prev", optional(&page.prev)),
        ])
    }
}

/// The result of a rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading or rendering templates.
#[derive(Debug)]
pub enum Error {
    /// Returned when the theme directory can't be read.
    OpenTheme { path: PathBuf, err: io::Error },

    /// Returned when a template file doesn't parse.
    Parse { name: String, err: String },

    /// Returned when rendering asks for a template the theme doesn't have.
    Missing(String),

    /// Returned when executing a template fails.
    Execute { name: String, err: String },

    /// Returned for other I/O errors.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenTheme { path, err } => {
                write!(f, "opening theme directory '{}': {}", path.display(), err)
            }
            Error::Parse { name, err } => write!(f, "parsing template `{}`: {}", name, err),
            Error::Missing(name) => write!(f, "no such template: `{}`", name),
            Error::Execute { name, err } => write!(f, "rendering template `{}`: {}", name, err),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenTheme { path: _, err } => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
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
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
        match value {
            Value::Object(obj) => &obj[key],
            _ => panic!("not an object: {:?}", value),
        }
    }

    #[test]
    fn test_theme_render() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(
            dir.path().join("index.html"),
            "<h1>{{.site_data.site_name}}</h1>{{range .posts}}<a href=\"{{.url}}\">{{.title}}</a>{{end}}{{if .page.next}}<a href=\"{{.page.next}}\">next</a>{{end}}",
        )?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;

        let theme = Theme::load(dir.path())?;
        assert!(theme.has_template("index.html"));
        assert!(!theme.has_template("notes.txt"));

        let data = object(vec![
            ("site_data", object(vec![("site_name", string("Blog"))])),
            (
                "posts",
                Value::Array(vec![object(vec![
                    ("url", string("/a/b")),
                    ("title", string("B")),
                ])]),
            ),
            (
                "page",
                Value::from(&PageInfo {
                    current: 1,
                    last: 2,
                    next: Some("/p/2".to_owned()),
                    prev: None,
                }),
            ),
        ]);
        assert_eq!(
            "<h1>Blog</h1><a href=\"/a/b\">B</a><a href=\"/p/2\">next</a>",
            theme.render("index.html", &data)?
        );
        Ok(())
    }

    #[test]
    fn test_missing_template() -> Result<()> {
        let dir = TempDir::new()?;
        let theme = Theme::load(dir.path())?;
        assert!(matches!(
            theme.render("single.html", &Value::Nil),
            Err(Error::Missing(_))
        ));
        Ok(())
    }

    #[test]
    fn test_document_text_is_escaped() {
        let doc = Document {
            slug: "q".to_owned(),
            category: None,
            title: "Fish & <Chips>".to_owned(),
            title_html: None,
            published_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            published_ts: 1577836800,
            draft: false,
            body_raw: String::new(),
            body_html: "<p>x</p>".to_owned(),
            body_text: String::new(),
            description: "Say \"hi\" <now>".to_owned(),
            lead_image: None,
            url: "/q".to_owned(),
            template: None,
            source: PathBuf::from("q.md"),
            extra: BTreeMap::new(),
        };
        let value = Value::from(&doc);
        let text = |key| match field(&value, key) {
            Value::String(s) => s.clone(),
            other => panic!("{}: {:?}", key, other),
        };
        assert_eq!("Fish &amp; &lt;Chips&gt;", text("title"));
        assert_eq!(text("title"), text("title_html"));
        assert_eq!("Say &quot;hi&quot; &lt;now&gt;", text("description"));
        assert_eq!("<p>x</p>", text("html"));
    }
}
