//! Extracts front matter and the leading title heading from raw Markdown
//! source. See [`extract_metadata`] for the recognized format.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;

use crate::markdown;

/// A scalar value from front matter or category metadata that doesn't map
/// onto a known field. Unknown keys are kept so templates can still use
/// them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Converts a YAML scalar into a [`Scalar`]. Returns `None` for nulls,
    /// sequences and mappings.
    pub fn from_yaml(value: &Yaml) -> Option<Scalar> {
        match value {
            Yaml::Bool(b) => Some(Scalar::Bool(*b)),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            Yaml::String(s) => Some(Scalar::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Bool(b) => b.fmt(f),
            Scalar::Int(i) => i.fmt(f),
            Scalar::Float(x) => x.fmt(f),
            Scalar::String(s) => s.fmt(f),
        }
    }
}

/// The metadata for a single source document, after defaults have been
/// applied and string values have been coerced.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    /// The document title. Empty unless set by front matter or a leading
    /// `# Heading`.
    pub title: String,

    /// The title rendered as inline HTML. Only present when the title came
    /// from a leading heading.
    pub title_html: Option<String>,

    /// When the document was published. Defaults to the compile time.
    pub published_at: DateTime<Utc>,

    /// `published_at` as Unix-epoch seconds.
    pub published_ts: i64,

    /// Whether the document is a draft.
    pub draft: bool,

    /// An explicit template name, if one was given.
    pub template: Option<String>,

    /// Any other front-matter keys with scalar values.
    pub extra: BTreeMap<String, Scalar>,
}

impl Metadata {
    fn defaults(now: DateTime<Utc>) -> Metadata {
        Metadata {
            title: String::new(),
            title_html: None,
            published_at: now,
            published_ts: now.timestamp(),
            draft: false,
            template: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Splits `raw` into a body and its [`Metadata`].
///
/// Front matter is a YAML mapping fenced by `---` lines at the very start of
/// the input:
///
/// ```md
/// ---
/// published_at: 2020-01-01 10:00:00
/// draft: false
/// ---
/// # Hello
///
/// World
/// ```
///
/// A payload that isn't valid YAML (or isn't a mapping) is dropped with a
/// warning and the defaults are used instead. A leading `# Heading` in the
/// remaining body overrides any front-matter title and is removed from the
/// returned body. `now` is the fallback for `published_at`.
///
/// Explicit but malformed `draft` or `published_at` values are errors.
pub fn extract_metadata(raw: &str, now: DateTime<Utc>) -> Result<(String, Metadata)> {
    let mut meta = Metadata::defaults(now);

    let body = match frontmatter_indices(raw) {
        None => raw,
        Some((yaml_start, yaml_stop, body_start)) => {
            match parse_frontmatter(&raw[yaml_start..yaml_stop]) {
                Some(fields) => apply_fields(&mut meta, fields)?,
                None => warn!("ignoring malformed front matter"),
            }
            &raw[body_start..]
        }
    };

    let body = body.trim();
    let body = match leading_title(body) {
        None => body,
        Some((title, rest)) => {
            meta.title_html = markdown::inline_html(title).ok();
            meta.title = title.to_owned();
            rest.trim()
        }
    };

    Ok((body.to_owned(), meta))
}

// Returns `(yaml_start, yaml_stop, body_start)` when `input` opens with a
// fenced front matter block.
fn frontmatter_indices(input: &str) -> Option<(usize, usize, usize)> {
    const FENCE: &str = "---";
    let rest = input.strip_prefix(FENCE)?;
    let newline = rest.find('\n')?;
    if !rest[..newline].trim().is_empty() {
        return None;
    }

    // The closing fence is a line holding only `---`.
    let yaml_start = FENCE.len() + newline + 1;
    let mut line_start = yaml_start;
    loop {
        let line_end = input[line_start..].find('\n').map(|i| line_start + i);
        let line = &input[line_start..line_end.unwrap_or(input.len())];
        if line.starts_with(FENCE) && line[FENCE.len()..].trim().is_empty() {
            let yaml_stop = line_start.saturating_sub(1).max(yaml_start);
            let body_start = line_end.map_or(input.len(), |end| end + 1);
            return Some((yaml_start, yaml_stop, body_start));
        }
        line_start = line_end? + 1;
    }
}

fn parse_frontmatter(yaml: &str) -> Option<BTreeMap<String, Yaml>> {
    if yaml.trim().is_empty() {
        return Some(BTreeMap::new());
    }
    match serde_yaml::from_str::<Yaml>(yaml) {
        Ok(Yaml::Mapping(mapping)) => Some(
            mapping
                .into_iter()
                .filter_map(|(k, v)| match k {
                    Yaml::String(k) => Some((k, v)),
                    Yaml::Bool(_) | Yaml::Number(_) => {
                        Scalar::from_yaml(&k).map(|k| (k.to_string(), v))
                    }
                    _ => None,
                })
                .collect(),
        ),
        Ok(Yaml::Null) => Some(BTreeMap::new()),
        _ => None,
    }
}

fn apply_fields(meta: &mut Metadata, fields: BTreeMap<String, Yaml>) -> Result<()> {
    for (key, value) in fields {
        match key.as_str() {
            "title" => {
                if let Some(title) = Scalar::from_yaml(&value) {
                    meta.title = title.to_string();
                }
            }
            "draft" => meta.draft = coerce_draft(&value)?,
            "published_at" => {
                if let Some(published_at) = coerce_published_at(&value)? {
                    meta.published_at = published_at;
                }
            }
            "template" => meta.template = Scalar::from_yaml(&value).map(|t| t.to_string()),
            _ => {
                if let Some(scalar) = Scalar::from_yaml(&value) {
                    meta.extra.insert(key, scalar);
                }
            }
        }
    }
    meta.published_ts = meta.published_at.timestamp();
    Ok(())
}

fn coerce_draft(value: &Yaml) -> Result<bool> {
    match value {
        Yaml::Null => Ok(false),
        Yaml::Bool(b) => Ok(*b),
        Yaml::String(s) => parse_bool(s),
        Yaml::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(Error::InvalidDraft(n.to_string())),
        },
        other => Err(Error::InvalidDraft(format!("{:?}", other))),
    }
}

fn coerce_published_at(value: &Yaml) -> Result<Option<DateTime<Utc>>> {
    match value {
        Yaml::Null => Ok(None),
        Yaml::String(s) => parse_datetime(s).map(Some),
        Yaml::Number(n) => match n.as_i64().and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
            Some(published_at) => Ok(Some(published_at)),
            None => Err(Error::InvalidDate(n.to_string())),
        },
        other => Err(Error::InvalidDate(format!("{:?}", other))),
    }
}

/// Parses conventional truthy and falsy strings (`yes`/`no`, `true`/`false`,
/// `on`/`off`, `1`/`0`, ...), ignoring case.
pub fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(Error::InvalidDraft(s.to_owned())),
    }
}

const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M %z",
    "%Y-%m-%dT%H:%M%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m.%d.%Y %H:%M",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m.%d.%Y",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%d %B %Y",
];

/// Parses a date or date-time string. Strings with a UTC offset (RFC 3339,
/// RFC 2822 or ISO-like forms such as `2020-01-01 10:00:00 +0200`) are
/// converted from that offset; everything else is read as UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }
    }
    Err(Error::InvalidDate(s.to_owned()))
}

// Finds a `# Title` line at the very top of `body`. Returns the title and
// the remainder of the body.
fn leading_title(body: &str) -> Option<(&str, &str)> {
    let rest = body.strip_prefix('#')?;
    if rest.starts_with('#') {
        return None;
    }
    let (line, remainder) = match rest.find('\n') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };
    let title = line.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        return None;
    }
    Some((title, remainder))
}

/// The result of a metadata operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an explicitly supplied front-matter value that couldn't be
/// coerced.
#[derive(Debug)]
pub enum Error {
    /// Returned when `draft` isn't a recognizable boolean.
    InvalidDraft(String),

    /// Returned when `published_at` isn't a recognizable date or date-time.
    InvalidDate(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidDraft(value) => {
                write!(f, "invalid value for `draft`: `{}`", value)
            }
            Error::InvalidDate(value) => {
                write!(f, "invalid value for `published_at`: `{}`", value)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_frontmatter() -> Result<()> {
        let (body, meta) = extract_metadata("just some text\n", now())?;
        assert_eq!("just some text", body);
        assert_eq!("", meta.title);
        assert_eq!(now(), meta.published_at);
        assert_eq!(now().timestamp(), meta.published_ts);
        assert!(!meta.draft);
        Ok(())
    }

    #[test]
    fn test_frontmatter_and_title() -> Result<()> {
        let raw = "---\ndraft: \"false\"\npublished_at: \"2020-01-01 10:00:00\"\n---\n# Hello\nworld";
        let (body, meta) = extract_metadata(raw, now())?;
        assert_eq!("world", body);
        assert_eq!("Hello", meta.title);
        assert_eq!(Some("Hello".to_owned()), meta.title_html);
        assert!(!meta.draft);
        assert_eq!(
            Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap(),
            meta.published_at
        );
        assert_eq!(1577872800, meta.published_ts);
        Ok(())
    }

    #[test]
    fn test_heading_overrides_frontmatter_title() -> Result<()> {
        let raw = "---\ntitle: From yaml\n---\n\n# From heading\n\nbody";
        let (body, meta) = extract_metadata(raw, now())?;
        assert_eq!("From heading", meta.title);
        assert_eq!("body", body);
        Ok(())
    }

    #[test]
    fn test_frontmatter_title_without_heading() -> Result<()> {
        let raw = "---\ntitle: From yaml\n---\nbody\n\n## not a title";
        let (body, meta) = extract_metadata(raw, now())?;
        assert_eq!("From yaml", meta.title);
        assert_eq!(None, meta.title_html);
        assert_eq!("body\n\n## not a title", body);
        Ok(())
    }

    #[test]
    fn test_malformed_yaml_falls_back_to_defaults() -> Result<()> {
        let raw = "---\ntitle: [unclosed\n---\nbody";
        let (body, meta) = extract_metadata(raw, now())?;
        assert_eq!("body", body);
        assert_eq!("", meta.title);
        assert_eq!(now(), meta.published_at);
        assert!(!meta.draft);
        Ok(())
    }

    #[test]
    fn test_unterminated_frontmatter_is_body() -> Result<()> {
        let raw = "---\ntitle: x\nbody";
        let (body, meta) = extract_metadata(raw, now())?;
        assert_eq!(raw, body);
        assert_eq!("", meta.title);
        Ok(())
    }

    #[test]
    fn test_closing_fence_must_stand_alone() -> Result<()> {
        let unclosed = &[
            "---\ndraft: true\n----\n# T\nbody",
            "---\ndraft: true\n---more\nbody",
        ];
        for raw in unclosed {
            let (body, meta) = extract_metadata(raw, now())?;
            assert_eq!(raw.trim(), body);
            assert!(!meta.draft, "{:?}", raw);
        }

        let (body, meta) = extract_metadata("---\ndraft: true\n---  \nbody", now())?;
        assert_eq!("body", body);
        assert!(meta.draft);
        Ok(())
    }

    #[test]
    fn test_empty_frontmatter() -> Result<()> {
        let (body, meta) = extract_metadata("---\n---\nbody", now())?;
        assert_eq!("body", body);
        assert!(!meta.draft);
        Ok(())
    }

    #[test]
    fn test_draft_coercion() -> Result<()> {
        let cases = &[
            ("true", true),
            ("yes", true),
            ("\"1\"", true),
            ("off", false),
            ("\"No\"", false),
        ];
        for (input, wanted) in cases {
            let raw = format!("---\ndraft: {}\n---\nbody", input);
            let (_, meta) = extract_metadata(&raw, now())?;
            assert_eq!(*wanted, meta.draft, "draft: {}", input);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_draft_is_an_error() {
        let raw = "---\ndraft: \"maybe\"\n---\nbody";
        match extract_metadata(raw, now()) {
            Err(Error::InvalidDraft(value)) => assert_eq!("maybe", value),
            other => panic!("wanted InvalidDraft, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_date_is_an_error() {
        let raw = "---\npublished_at: last tuesday\n---\nbody";
        assert!(matches!(
            extract_metadata(raw, now()),
            Err(Error::InvalidDate(_))
        ));
    }

    #[test]
    fn test_date_formats() -> Result<()> {
        let wanted = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 0).unwrap();
        assert_eq!(wanted, parse_datetime("2021-03-04T05:06:00Z")?);
        assert_eq!(wanted, parse_datetime("2021-03-04 05:06")?);
        assert_eq!(wanted, parse_datetime("03.04.2021 05:06")?);
        assert_eq!(wanted, parse_datetime("2021-03-04T07:06:00+02:00")?);
        assert_eq!(wanted, parse_datetime("2021-03-04 07:06:00 +0200")?);
        assert_eq!(wanted, parse_datetime("2021-03-04 07:06:00+02:00")?);
        assert_eq!(wanted, parse_datetime("2021-03-04T07:06:00+0200")?);
        assert_eq!(wanted, parse_datetime("2021-03-04 02:06:00.000 -0300")?);
        assert_eq!(wanted, parse_datetime("2021-03-04 07:06 +0200")?);
        assert_eq!(
            Utc.with_ymd_and_hms(2021, 3, 4, 0, 0, 0).unwrap(),
            parse_datetime("2021-03-04")?
        );
        Ok(())
    }

    #[test]
    fn test_extra_fields_are_kept() -> Result<()> {
        let raw = "---\nauthor: Jo\nrating: 4\ntags: [a, b]\n---\nbody";
        let (_, meta) = extract_metadata(raw, now())?;
        assert_eq!(Some(&Scalar::String("Jo".to_owned())), meta.extra.get("author"));
        assert_eq!(Some(&Scalar::Int(4)), meta.extra.get("rating"));
        assert_eq!(None, meta.extra.get("tags"));
        Ok(())
    }

    #[test]
    fn test_extraction_is_deterministic() -> Result<()> {
        let raw = "---\ndraft: yes\npublished_at: 2019-06-01\n---\n# T\nb";
        let (_, first) = extract_metadata(raw, now())?;
        let (_, second) = extract_metadata(raw, Utc::now())?;
        assert_eq!(first.published_ts, second.published_ts);
        assert_eq!(first.draft, second.draft);
        Ok(())
    }
}
