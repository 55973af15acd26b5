//! Splits an ordered list into index pages. See [`paginate`] and
//! [`resolve_page`].

use std::fmt;

/// Bookkeeping for one page of a paginated list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageInfo {
    /// The 1-based page number.
    pub current: usize,

    /// The number of pages.
    pub last: usize,

    /// The URL of the next page, if any.
    pub next: Option<String>,

    /// The URL of the previous page, if any.
    pub prev: Option<String>,
}

/// The URL of page `n` of the index rooted at `base`: `{base}/p/{n}`. The
/// site-wide index has an empty `base`.
pub fn page_url(base: &str, n: usize) -> String {
    format!("{}/p/{}", base.trim_end_matches('/'), n)
}

/// The number of pages needed for `total` items. A page size of 0 means
/// everything goes on a single page.
pub fn page_count(total: usize, per_page: usize) -> usize {
    match per_page {
        0 => 1,
        n => (total + n - 1) / n,
    }
}

/// Lazily splits `items` into pages of `per_page` items, with `prev`/`next`
/// links built by [`page_url`] from `base`.
///
/// A `per_page` of 0 yields exactly one page holding every item and no
/// links. Otherwise there are `ceil(items.len() / per_page)` pages and the
/// last one may be short. Every item lands on exactly one page, in order.
pub fn paginate<'a, T>(items: &'a [T], per_page: usize, base: &'a str) -> Pages<'a, T> {
    Pages {
        items,
        per_page,
        base,
        current: 0,
        last: page_count(items.len(), per_page),
    }
}

/// The iterator returned by [`paginate`].
pub struct Pages<'a, T> {
    items: &'a [T],
    per_page: usize,
    base: &'a str,
    current: usize,
    last: usize,
}

impl<'a, T> Iterator for Pages<'a, T> {
    type Item = (&'a [T], PageInfo);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.last {
            return None;
        }
        let index = self.current;
        self.current += 1;

        if self.per_page == 0 {
            return Some((
                self.items,
                PageInfo {
                    current: 1,
                    last: 1,
                    next: None,
                    prev: None,
                },
            ));
        }

        let start = index * self.per_page;
        let stop = (start + self.per_page).min(self.items.len());
        let current = index + 1;
        Some((
            &self.items[start..stop],
            PageInfo {
                current,
                last: self.last,
                next: match current < self.last {
                    true => Some(page_url(self.base, current + 1)),
                    false => None,
                },
                prev: match current > 1 {
                    true => Some(page_url(self.base, current - 1)),
                    false => None,
                },
            },
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.last - self.current;
        (remaining, Some(remaining))
    }
}

/// Validates a requested 1-based page number (e.g. from a `?p=` query)
/// against a list of `total` items. A list always has at least one page,
/// even when it is empty.
pub fn resolve_page(requested: i64, total: usize, per_page: usize) -> Result<usize, NotFound> {
    let last = page_count(total, per_page).max(1);
    match requested {
        n if n >= 1 && (n as u64) <= last as u64 => Ok(n as usize),
        _ => Err(NotFound { requested, last }),
    }
}

/// Returned by [`resolve_page`] for page numbers outside `1..=last`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub requested: i64,
    pub last: usize,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "page {} not found (last page is {})", self.requested, self.last)
    }
}

impl std::error::Error for NotFound {}
