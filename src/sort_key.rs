//! The artifact naming convention for compiled documents.
//!
//! Every compiled document is stored as `<sort key>.json`, where the sort key
//! is `[D]<published ts>_<category>_<slug>` for posts and
//! `[D]<published ts>_<slug>` for pages. The `D` prefix marks drafts and the
//! timestamp is zero-padded, so sorting a directory listing in descending
//! order yields newest-first and drafts can be skipped by looking at the
//! first character alone. The admin tooling and the file watcher depend on
//! this layout; [`SortKey`] is the only place it is produced or parsed.

use std::fmt;

/// Prefix marking a draft artifact.
pub const DRAFT_MARKER: char = 'D';

/// Digits in the zero-padded timestamp.
pub const TIMESTAMP_WIDTH: usize = 12;

/// The decoded form of an artifact name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub draft: bool,

    /// Publish time as Unix-epoch seconds. Pre-epoch times are stored as 0.
    pub published_ts: i64,

    /// The category for posts; `None` for pages.
    pub category: Option<String>,

    pub slug: String,
}

impl SortKey {
    /// Encodes the key as an artifact file stem.
    pub fn encode(&self) -> String {
        let mut s = String::with_capacity(TIMESTAMP_WIDTH + self.slug.len() + 16);
        if self.draft {
            s.push(DRAFT_MARKER);
        }
        s.push_str(&format!(
            "{:0width$}",
            self.published_ts.max(0),
            width = TIMESTAMP_WIDTH
        ));
        s.push('_');
        if let Some(category) = &self.category {
            s.push_str(category);
            s.push('_');
        }
        s.push_str(&self.slug);
        s
    }

    /// Parses an artifact file stem. `category` is the category directory the
    /// artifact was found in, or `None` for pages. Returns `None` when `stem`
    /// doesn't follow the convention.
    pub fn parse(stem: &str, category: Option<&str>) -> Option<SortKey> {
        let (draft, rest) = match stem.strip_prefix(DRAFT_MARKER) {
            Some(rest) => (true, rest),
            None => (false, stem),
        };
        let (ts, rest) = rest.split_once('_')?;
        if ts.len() != TIMESTAMP_WIDTH || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let slug = match category {
            Some(category) => rest.strip_prefix(category)?.strip_prefix('_')?,
            None => rest,
        };
        if slug.is_empty() {
            return None;
        }
        Some(SortKey {
            draft,
            published_ts: ts.parse().ok()?,
            category: category.map(str::to_owned),
            slug: slug.to_owned(),
        })
    }

    /// Whether an artifact file name belongs to a draft.
    pub fn is_draft_name(name: &str) -> bool {
        name.starts_with(DRAFT_MARKER)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn post(draft: bool, ts: i64) -> SortKey {
        SortKey {
            draft,
            published_ts: ts,
            category: Some("foo".to_owned()),
            slug: "my_post".to_owned(),
        }
    }

    #[test]
    fn test_encode() {
        assert_eq!("001577872800_foo_my_post", post(false, 1577872800).encode());
        assert_eq!("D001577872800_foo_my_post", post(true, 1577872800).encode());
        let page = SortKey {
            draft: false,
            published_ts: 5,
            category: None,
            slug: "about".to_owned(),
        };
        assert_eq!("000000000005_about", page.encode());
    }

    #[test]
    fn test_parse() {
        let key = post(true, 1577872800);
        assert_eq!(Some(key.clone()), SortKey::parse(&key.encode(), Some("foo")));
        assert_eq!(None, SortKey::parse(&key.encode(), Some("bar")));
        assert_eq!(None, SortKey::parse("meta", None));
        assert_eq!(None, SortKey::parse("12_short", None));
    }

    #[test]
    fn test_lexical_order_is_chronological() {
        let mut names = vec![
            post(false, 99).encode(),
            post(false, 1_600_000_000).encode(),
            post(false, 1_000_000).encode(),
        ];
        names.sort();
        names.reverse();
        assert_eq!(
            vec![
                post(false, 1_600_000_000).encode(),
                post(false, 1_000_000).encode(),
                post(false, 99).encode(),
            ],
            names
        );
    }

    #[test]
    fn test_negative_timestamps_clamp() {
        assert_eq!("000000000000_foo_my_post", post(false, -50).encode());
    }

    #[test]
    fn test_is_draft_name() {
        assert!(SortKey::is_draft_name("D000000000001_a.json"));
        assert!(!SortKey::is_draft_name("000000000001_a.json"));
    }
}
