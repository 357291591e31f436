//! Paginated, sortable list controller
//!
//! [`PagedList`] owns the page/sort state of one list resource. Every
//! page-changing action takes a new generation number; a response is only
//! committed if its generation is still the latest one issued, so a slow
//! stale fetch can never overwrite the result of a newer request.

use crate::backend::BackendError;
use crate::lock;
use crate::model::{CarId, Listed, Page, PageQuery, Sort, SortColumn};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, warn};

/// A list resource that can be fetched one page at a time
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Listed + Clone + Send + Sync + 'static;
    type SortKey: SortColumn;

    async fn fetch(&self, query: &PageQuery<Self::SortKey>)
        -> Result<Page<Self::Item>, BackendError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListStatus {
    NotLoaded,
    Ready,
    /// The last fetch failed; the list shows empty
    Failed(String),
}

/// What an operation did to the list state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChange {
    /// Fresh page data was committed
    Applied,
    /// An item was dropped locally without a refetch
    Removed,
    /// Nothing to do, or the backend did not confirm the page
    Unchanged,
    /// A newer request superseded this one
    Stale,
    /// The fetch failed and the failure state was committed
    Failed,
}

impl ListChange {
    /// True when the rendered items were replaced
    pub fn reloaded(&self) -> bool {
        matches!(self, ListChange::Applied | ListChange::Failed)
    }
}

/// Render-ready copy of the list state
#[derive(Debug, Clone, PartialEq)]
pub struct ListSnapshot<T, K> {
    pub page: u32,
    pub page_size: u32,
    pub total: usize,
    pub sort: Option<Sort<K>>,
    pub items: Vec<T>,
    pub status: ListStatus,
}

impl<T, K> ListSnapshot<T, K> {
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Whether [`PagedList::next_page`] would move forward
    pub fn has_next(&self) -> bool {
        next_page_fits(self.page + 1, self.page_size, self.total)
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as usize) as u32
    }
}

/// A page is reachable when all of its slots are covered by the total
fn next_page_fits(page: u32, page_size: u32, total: usize) -> bool {
    (page as usize) * (page_size as usize) <= total
}

struct ListState<T, K> {
    page: u32,
    page_size: u32,
    total: usize,
    sort: Option<Sort<K>>,
    items: Vec<T>,
    status: ListStatus,
    generation: u64,
}

impl<T, K: SortColumn> ListState<T, K> {
    /// Issue a new request for `page`, superseding all in-flight ones
    fn issue(&mut self, page: u32) -> (u64, PageQuery<K>) {
        self.generation += 1;
        let query = PageQuery::new(page, self.page_size).sorted(self.sort);
        (self.generation, query)
    }
}

pub struct PagedList<S: PageSource> {
    source: S,
    state: Mutex<ListState<S::Item, S::SortKey>>,
}

impl<S: PageSource> PagedList<S> {
    pub fn new(source: S, page_size: u32) -> Self {
        Self {
            source,
            state: Mutex::new(ListState {
                page: 1,
                page_size: page_size.max(1),
                total: 0,
                sort: None,
                items: Vec::new(),
                status: ListStatus::NotLoaded,
                generation: 0,
            }),
        }
    }

    pub fn with_sort(self, sort: Sort<S::SortKey>) -> Self {
        lock(&self.state).sort = Some(sort);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn snapshot(&self) -> ListSnapshot<S::Item, S::SortKey> {
        let state = lock(&self.state);
        ListSnapshot {
            page: state.page,
            page_size: state.page_size,
            total: state.total,
            sort: state.sort,
            items: state.items.clone(),
            status: state.status.clone(),
        }
    }

    pub fn current_page(&self) -> u32 {
        lock(&self.state).page
    }

    pub fn total(&self) -> usize {
        lock(&self.state).total
    }

    pub fn sort(&self) -> Option<Sort<S::SortKey>> {
        lock(&self.state).sort
    }

    /// Refetch the current page
    pub async fn load(&self) -> ListChange {
        let (generation, query) = {
            let mut state = lock(&self.state);
            let page = state.page;
            state.issue(page)
        };
        self.fetch_and_replace(generation, query).await
    }

    /// Advance one page if the backend confirms it lies within the total
    ///
    /// A failed fetch keeps the current page and items and only records
    /// the failure.
    pub async fn next_page(&self) -> ListChange {
        let (generation, query) = {
            let mut state = lock(&self.state);
            let target = state.page + 1;
            state.issue(target)
        };
        let result = self.source.fetch(&query).await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            debug!("Dropping stale response for page {}", query.page);
            return ListChange::Stale;
        }

        match result {
            Ok(page) if next_page_fits(query.page, state.page_size, page.total) => {
                state.page = query.page;
                state.items = page.items;
                state.total = page.total;
                state.status = ListStatus::Ready;
                ListChange::Applied
            }
            Ok(page) => {
                debug!(
                    "Page {} is beyond the total of {}, staying on page {}",
                    query.page, page.total, state.page
                );
                ListChange::Unchanged
            }
            Err(e) => {
                warn!("Failed to load page {}: {}", query.page, e);
                state.status = ListStatus::Failed(e.to_string());
                ListChange::Failed
            }
        }
    }

    /// Go back one page; a no-op on the first page
    pub async fn prev_page(&self) -> ListChange {
        let (generation, query) = {
            let mut state = lock(&self.state);
            if state.page <= 1 {
                return ListChange::Unchanged;
            }
            state.page -= 1;
            let page = state.page;
            state.issue(page)
        };
        self.fetch_and_replace(generation, query).await
    }

    /// Sort by `column`, flipping the order if it is already the sort column
    pub async fn set_sort(&self, column: S::SortKey) -> ListChange {
        let (generation, query) = {
            let mut state = lock(&self.state);
            state.sort = Some(Sort::toggle(state.sort, column));
            let page = state.page;
            state.issue(page)
        };
        self.fetch_and_replace(generation, query).await
    }

    /// Drop an item deleted elsewhere
    ///
    /// Only refetches when the current page ran empty, stepping back a page
    /// unless already on the first.
    pub async fn remove_local(&self, id: CarId) -> ListChange {
        let (generation, query) = {
            let mut state = lock(&self.state);
            let Some(index) = state.items.iter().position(|item| item.list_id() == id) else {
                return ListChange::Unchanged;
            };
            state.items.remove(index);
            state.total = state.total.saturating_sub(1);

            if !state.items.is_empty() {
                return ListChange::Removed;
            }
            if state.page > 1 {
                state.page -= 1;
            }
            let page = state.page;
            state.issue(page)
        };
        self.fetch_and_replace(generation, query).await
    }

    async fn fetch_and_replace(
        &self,
        generation: u64,
        query: PageQuery<S::SortKey>,
    ) -> ListChange {
        let result = self.source.fetch(&query).await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            debug!("Dropping stale response for page {}", query.page);
            return ListChange::Stale;
        }

        match result {
            Ok(page) => {
                state.items = page.items;
                state.total = page.total;
                state.status = ListStatus::Ready;
                ListChange::Applied
            }
            Err(e) => {
                warn!("Failed to load page {}, showing it empty: {}", query.page, e);
                state.items.clear();
                state.total = 0;
                state.status = ListStatus::Failed(e.to_string());
                ListChange::Failed
            }
        }
    }
}
