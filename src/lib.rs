//! The library code for the `portico` static site generator. A site is a
//! directory of Markdown posts grouped into category directories, plus flat
//! pages and static assets. Building it is broken down into three steps:
//!
//! 1. Compiling sources into [`document::Document`]s and
//!    [`document::Category`]s. This extracts front matter
//!    ([`metadata`]), renders Markdown ([`markdown`]) and derives the plain
//!    text, description and lead image of each document.
//! 2. Ordering and grouping: posts are sorted newest first per category and
//!    merged into a site-wide list, then split into index pages
//!    ([`paginate`]).
//! 3. Writing the output ([`build`]): rendered HTML through a
//!    [`template::Renderer`] ([`write`]), one JSON artifact per document
//!    named by its [`sort_key::SortKey`], RSS feeds ([`feed`]), an optional
//!    search index ([`search`]) and copies of static files.
//!
//! [`fs::FileManager`] knows where everything lives in the source and build
//! trees. [`watch`] keeps a build current while sources change and
//! [`scaffold`] creates new sites, posts and categories.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod document;
pub mod feed;
pub mod fs;
pub mod markdown;
pub mod metadata;
pub mod paginate;
pub mod scaffold;
pub mod search;
pub mod sort_key;
pub mod template;
pub mod watch;
pub mod write;
