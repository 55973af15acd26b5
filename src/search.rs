//! A small full-text index over published documents, written next to the
//! build output so a client-side or server-side search can load it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::Document;

const INDEX_FILE: &str = "index.json";

/// One searchable document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub published_ts: i64,
}

/// The documents plus an inverted index from term to document positions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub documents: Vec<Entry>,
    pub terms: BTreeMap<String, Vec<usize>>,
}

impl SearchIndex {
    /// Indexes the title and body text of every non-draft document, in the
    /// order given.
    pub fn build<'a, I>(documents: I) -> SearchIndex
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut index = SearchIndex::default();
        for doc in documents.into_iter().filter(|doc| !doc.draft) {
            let position = index.documents.len();
            index.documents.push(Entry {
                url: doc.url.clone(),
                title: doc.title.clone(),
                description: doc.description.clone(),
                category: doc.category.clone(),
                published_ts: doc.published_ts,
            });
            let terms: BTreeSet<String> = tokenize(&doc.title)
                .chain(tokenize(&doc.body_text))
                .collect();
            for term in terms {
                index.terms.entry(term).or_default().push(position);
            }
        }
        index
    }

    /// Returns the documents containing every term in `query`, in index
    /// order. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<&Entry> {
        let mut matches: Option<BTreeSet<usize>> = None;
        for term in tokenize(query) {
            let positions: BTreeSet<usize> = match self.terms.get(&term) {
                Some(positions) => positions.iter().copied().collect(),
                None => return Vec::new(),
            };
            matches = Some(match matches {
                None => positions,
                Some(previous) => previous.intersection(&positions).copied().collect(),
            });
        }
        matches
            .unwrap_or_default()
            .into_iter()
            .filter_map(|position| self.documents.get(position))
            .collect()
    }

    /// Writes the index into `dir`, creating it if needed.
    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let file = BufWriter::new(File::create(dir.join(INDEX_FILE))?);
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    /// Loads an index previously written to `dir`.
    pub fn load(dir: &Path) -> Result<SearchIndex> {
        let file = BufReader::new(File::open(dir.join(INDEX_FILE))?);
        Ok(serde_json::from_reader(file)?)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

type Result<T> = std::result::Result<T, Error>;

/// Represents an error writing or loading the search index.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Json(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn doc(slug: &str, title: &str, text: &str, draft: bool) -> Document {
        let now = Utc::now();
        Document {
            slug: slug.to_owned(),
            category: Some("c".to_owned()),
            title: title.to_owned(),
            title_html: None,
            published_at: now,
            published_ts: now.timestamp(),
            draft,
            body_raw: text.to_owned(),
            body_html: String::new(),
            body_text: text.to_owned(),
            description: text.to_owned(),
            lead_image: None,
            url: format!("/c/{}", slug),
            template: None,
            source: PathBuf::from(slug),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_build_and_search() {
        let docs = vec![
            doc("rust", "Learning Rust", "Ownership and borrowing.", false),
            doc("go", "Learning Go", "Goroutines and channels.", false),
            doc("secret", "Rust secrets", "Unpublished borrowing notes.", true),
        ];
        let index = SearchIndex::build(&docs);
        assert_eq!(2, index.documents.len());

        let urls = |query| -> Vec<String> {
            index.search(query).into_iter().map(|e| e.url.clone()).collect()
        };
        assert_eq!(vec!["/c/rust", "/c/go"], urls("learning"));
        assert_eq!(vec!["/c/rust"], urls("RUST borrowing"));
        assert!(urls("unpublished").is_empty());
        assert!(urls("").is_empty());
    }

    #[test]
    fn test_write_and_load() -> Result<()> {
        let dir = TempDir::new()?;
        let docs = vec![doc("a", "Alpha", "first", false)];
        let index = SearchIndex::build(&docs);
        index.write(&dir.path().join(".searchindex"))?;
        assert_eq!(index, SearchIndex::load(&dir.path().join(".searchindex"))?);
        Ok(())
    }
}
