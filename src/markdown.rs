//! Markdown rendering and the plain-text derivations built on top of it:
//! [`to_html`], [`html_to_text`], [`description`] and [`lead_image`].

use std::fmt;
use std::io;
use std::string::FromUtf8Error;
use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};
use regex::Regex;

/// The maximum length, in characters, of a document description.
pub const DESCRIPTION_LENGTH: usize = 140;

const ELLIPSIS: char = '…';

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Converts markdown to HTML.
pub fn to_html(markdown: &str) -> Result<String> {
    let mut out = Vec::with_capacity(markdown.len() * 3 / 2);
    html::write_html(&mut out, Parser::new_ext(markdown, options()))?;
    Ok(String::from_utf8(out)?)
}

/// Converts a single line of markdown to HTML without the wrapping
/// paragraph, for places like titles where block markup doesn't belong.
pub fn inline_html(markdown: &str) -> Result<String> {
    let html = to_html(markdown)?;
    let trimmed = html.trim_end();
    Ok(match trimmed
        .strip_prefix("<p>")
        .and_then(|s| s.strip_suffix("</p>"))
    {
        Some(inner) => inner.to_owned(),
        None => trimmed.to_owned(),
    })
}

/// Drops all markup from `html`, keeping the text nodes in document order.
/// Character references are decoded.
pub fn html_to_text(html: &str) -> Result<String> {
    let dom = tl::parse(html, tl::ParserOptions::default())
        .map_err(|e| Error::Html(format!("{:?}", e)))?;
    let parser = dom.parser();
    let mut text = String::with_capacity(html.len());
    for handle in dom.children() {
        push_text(*handle, parser, &mut text);
    }
    Ok(text)
}

fn push_text(handle: tl::NodeHandle, parser: &tl::Parser, out: &mut String) {
    match handle.get(parser) {
        Some(tl::Node::Tag(tag)) => {
            for child in tag.children().top().iter() {
                push_text(*child, parser, out);
            }
        }
        Some(tl::Node::Raw(bytes)) => {
            let raw = bytes.as_utf8_str();
            out.push_str(&html_escape::decode_html_entities(&*raw));
        }
        _ => {}
    }
}

/// Truncates `text` to [`DESCRIPTION_LENGTH`] characters. Truncated text
/// ends in a single ellipsis character, which counts towards the limit.
pub fn description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_LENGTH {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(DESCRIPTION_LENGTH - 1).collect();
    truncated.push(ELLIPSIS);
    truncated
}

/// Returns the URL of the first image referenced as `![alt](url)` in
/// `markdown`. The URL may be wrapped in backticks.
pub fn lead_image(markdown: &str) -> Option<String> {
    static IMAGE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[.*?\]\(`?([^`()]+)`?\)").unwrap());
    IMAGE
        .captures(markdown)
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str().trim().to_owned())
}

/// The result of a markdown operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error rendering markdown or reading back the rendered HTML.
#[derive(Debug)]
pub enum Error {
    /// Returned when writing the rendered HTML fails.
    Io(io::Error),

    /// Returned when the rendered HTML isn't valid UTF-8.
    Utf8(FromUtf8Error),

    /// Returned when the rendered HTML can't be parsed back for text
    /// extraction.
    Html(String),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Utf8(err) => err.fmt(f),
            Error::Html(err) => write!(f, "parsing rendered HTML: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Utf8(err) => Some(err),
            Error::Html(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::Utf8(err)
    }
}
