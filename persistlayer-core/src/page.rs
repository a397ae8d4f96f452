//! Paging parameters and result pages.
//!
//! This module provides [`PagingParams`] to request a window of a result set and
//! [`Page`] to return it, optionally with the total number of matches.

use serde::{Deserialize, Serialize};

/// A single page of results.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// use persistlayer::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_total(100)
///     .build();
///
/// assert_eq!(page.data.len(), 1);
/// assert_eq!(page.total, Some(100));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub data: Vec<T>,
    /// Total count of matching items, only present when it was requested.
    pub total: Option<u64>,
}

impl<T> Page<T> {
    /// Creates a page without a total.
    pub fn new(data: Vec<T>) -> Self {
        Self { data, total: None }
    }

    /// Creates a new builder for constructing a page.
    pub fn builder(data: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self { data: Vec::new(), total: None }
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    data: Vec<T>,
    total: Option<u64>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(data: Vec<T>) -> Self {
        Self { data, total: None }
    }

    /// Sets the total count of matching items.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Sets or clears the total count.
    pub fn with_total_opt(mut self, total: Option<u64>) -> Self {
        self.total = total;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            data: self.data,
            total: self.total,
        }
    }
}

/// Window requested from a result set.
///
/// `skip` is the number of items to skip, `take` the number of items to return
/// and `total` asks the store to count all matches as well.
///
/// # Example
///
/// ```ignore
/// use persistlayer::page::PagingParams;
///
/// let paging = PagingParams::builder().with_skip(20).with_take(500).with_total(true).build();
///
/// // take is clamped to the store's max page size
/// assert_eq!(paging.get_take(100), 100);
/// assert_eq!(paging.get_skip(), Some(20));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingParams {
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub total: bool,
}

impl PagingParams {
    /// Creates paging parameters.
    ///
    /// # Arguments
    ///
    /// * `skip` - Number of items to skip, `None` to start from the beginning
    /// * `take` - Number of items to return, `None` for the store maximum
    /// * `total` - Whether the total number of matches should be counted
    pub fn new(skip: Option<u64>, take: Option<u64>, total: bool) -> Self {
        Self { skip, take, total }
    }

    /// Creates a new builder for constructing paging parameters.
    pub fn builder() -> PagingParamsBuilder {
        PagingParamsBuilder::new()
    }

    /// Returns the number of items to skip, if any was requested.
    pub fn get_skip(&self) -> Option<u64> {
        self.skip
    }

    /// Returns the number of items to take, never more than `max_take`.
    ///
    /// A missing or zero `take` yields `max_take`.
    pub fn get_take(&self, max_take: u64) -> u64 {
        match self.take {
            Some(take) if take > 0 => take.min(max_take),
            _ => max_take,
        }
    }

    pub fn has_total(&self) -> bool {
        self.total
    }
}

/// Builder for constructing [`PagingParams`] instances.
#[derive(Default)]
pub struct PagingParamsBuilder {
    skip: Option<u64>,
    take: Option<u64>,
    total: bool,
}

impl PagingParamsBuilder {
    /// Creates a new builder with no parameters set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn with_total(mut self, total: bool) -> Self {
        self.total = total;
        self
    }

    /// Builds and returns the [`PagingParams`].
    pub fn build(self) -> PagingParams {
        PagingParams {
            skip: self.skip,
            take: self.take,
            total: self.total,
        }
    }
}
