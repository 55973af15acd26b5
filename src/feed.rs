//! Support for creating RSS 2.0 feeds from a list of documents.

use std::fmt;
use std::io::Write;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use rss::{Channel, ChannelBuilder, Error as RssError, GuidBuilder, Item, ItemBuilder};

use crate::document::Document;

/// The number of items in each feed.
pub const FEED_LENGTH: usize = 20;

/// Bundled configuration for creating a feed.
pub struct FeedConfig<'a> {
    pub title: &'a str,

    /// The site URL, without a trailing slash.
    pub base_url: &'a str,

    pub description: &'a str,
}

/// Creates a feed from `documents` and writes it to `w`. The documents are
/// emitted as given: callers pick, filter and order them.
pub fn write_rss<W: Write>(
    config: &FeedConfig,
    documents: &[&Document],
    now: DateTime<Utc>,
    w: W,
) -> Result<()> {
    channel(config, documents, now).write_to(w)?;
    Ok(())
}

/// Like [`write_rss`] but returns the XML as a string.
pub fn compile_rss(config: &FeedConfig, documents: &[&Document], now: DateTime<Utc>) -> String {
    channel(config, documents, now).to_string()
}

fn channel(config: &FeedConfig, documents: &[&Document], now: DateTime<Utc>) -> Channel {
    ChannelBuilder::default()
        .title(config.title)
        .link(format!("{}/", config.base_url))
        .description(config.description)
        .last_build_date(now.to_rfc2822())
        .items(
            documents
                .iter()
                .map(|doc| item(config, doc))
                .collect::<Vec<Item>>(),
        )
        .build()
}

fn item(config: &FeedConfig, doc: &Document) -> Item {
    let link = format!("{}{}", config.base_url, doc.url);
    ItemBuilder::default()
        .title(doc.title.clone())
        .link(link.clone())
        .guid(GuidBuilder::default().permalink(true).value(link).build())
        .description(absolutize_urls(&doc.body_html, config.base_url))
        .pub_date(doc.published_at.to_rfc2822())
        .build()
}

/// Rewrites root-relative `src` and `href` attributes in `html` so they point
/// at `base_url`. Protocol-relative URLs (`//host/...`) are left alone.
pub fn absolutize_urls(html: &str, base_url: &str) -> String {
    static ROOT_RELATIVE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\b(src|href)="/([^/"]|")"#).unwrap());
    ROOT_RELATIVE
        .replace_all(html, |caps: &Captures| {
            format!(r#"{}="{}/{}"#, &caps[1], base_url, &caps[2])
        })
        .into_owned()
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem writing a feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when serializing or writing the feed fails.
    Rss(RssError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Rss(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Rss(err) => Some(err),
        }
    }
}

impl From<RssError> for Error {
    /// Converts [`RssError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: RssError) -> Error {
        Error::Rss(err)
    }
}
