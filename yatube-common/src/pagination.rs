//! Splitting ordered collections into fixed-size pages.
//!
//! Page numbers start at 1. A requested page that is missing or not an integer
//! resolves to the first page; numbers outside `1..=num_pages` clamp to the
//! nearest end. Lookups never fail.

use serde::Serialize;
use std::num::{IntErrorKind, NonZeroU32};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Paginator {
    count: u64,
    per_page: NonZeroU32,
}

/// Position of one page inside the full collection.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<u64>,
    pub previous_page_number: Option<u64>,
}

impl Paginator {
    #[must_use]
    pub fn new(count: u64, per_page: NonZeroU32) -> Self {
        Self { count, per_page }
    }

    #[must_use]
    pub fn count(self) -> u64 {
        self.count
    }

    /// An empty collection still has one (empty) page.
    #[must_use]
    pub fn num_pages(self) -> u64 {
        self.count.div_ceil(self.per_page.get().into()).max(1)
    }

    #[must_use]
    pub fn get_page(self, requested: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages();
        let number = match requested.map(str::trim).map(str::parse::<i64>) {
            Some(Ok(number)) => number.clamp(1, i64::try_from(num_pages).unwrap_or(i64::MAX)),
            Some(Err(err)) if *err.kind() == IntErrorKind::PosOverflow => {
                i64::try_from(num_pages).unwrap_or(i64::MAX)
            }
            Some(Err(_)) | None => 1,
        }
        .unsigned_abs();

        let per_page = u64::from(self.per_page.get());
        let offset = (number - 1) * per_page;

        PageWindow {
            number,
            num_pages,
            count: self.count,
            offset,
            limit: per_page.min(self.count.saturating_sub(offset)),
        }
    }
}

impl PageWindow {
    #[must_use]
    pub fn into_page<T>(self, items: Vec<T>) -> Page<T> {
        let has_next = self.number < self.num_pages;
        let has_previous = self.number > 1;

        Page {
            items,
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            has_next,
            has_previous,
            next_page_number: has_next.then(|| self.number + 1),
            previous_page_number: has_previous.then(|| self.number - 1),
        }
    }

    /// The window's slice of an in-memory collection.
    #[must_use]
    pub fn slice<T>(self, items: &[T]) -> &[T] {
        let start = usize::try_from(self.offset)
            .unwrap_or(usize::MAX)
            .min(items.len());
        let end = usize::try_from(self.offset + self.limit)
            .unwrap_or(usize::MAX)
            .min(items.len());

        &items[start..end]
    }
}

/// Selects the requested page of `items`, returning it with the total item count.
#[must_use]
pub fn paginate<T: Clone>(
    items: &[T],
    per_page: NonZeroU32,
    requested: Option<&str>,
) -> (Page<T>, u64) {
    let paginator = Paginator::new(items.len() as u64, per_page);
    let window = paginator.get_page(requested);

    (window.into_page(window.slice(items).to_vec()), paginator.count())
}
