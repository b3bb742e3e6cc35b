//! Pagination cursor engine for the availability listing
//!
//! Pages are read in ascending price order. Forward pages start strictly
//! after the last row of the current page; backward pages are the last
//! `page_size` rows strictly before its first row, read in descending order
//! and flipped back. A navigation stays pending until its first snapshot
//! arrives: only a non-empty one moves the cursor.
//!
//! A backward page that reaches the start of the listing is re-anchored on
//! the first-page query, so rows later inserted ahead of it still land on
//! page 1.

use serde::Serialize;

use crate::store::{Bound, Cursor, Document, Filter, Query, SortOrder};

use super::ViewError;

pub const DEFAULT_PAGE_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageDirection {
    Forward,
    Backward,
}

/// Boundary rows of the visible page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageCursor {
    pub first: Cursor,
    pub last: Cursor,
    pub page_index: usize,
}

/// Query for one page, and whether its rows come back reversed
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub query: Query,
    reversed: bool,
}

impl PageQuery {
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Rows in ascending price order
    pub fn normalize(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if self.reversed {
            docs.reverse();
        }
        docs
    }
}

/// What an accepted snapshot did to the page
#[derive(Debug, PartialEq)]
pub enum PageOutcome {
    /// Live update of the current page
    Updated(Vec<Document>),
    /// A navigation landed on a new page
    Moved {
        direction: PageDirection,
        docs: Vec<Document>,
    },
    /// A backward navigation reached the start of the listing: the rows are
    /// page 1 and the first-page query must replace the backward one
    Realigned {
        docs: Vec<Document>,
        query: PageQuery,
    },
    /// A navigation came back empty; the committed page must be resubscribed
    Reverted(PageQuery),
    /// The current page (past page 1) emptied; the first page must be reopened
    Reset(PageQuery),
}

#[derive(Debug, Clone)]
struct Pending {
    direction: PageDirection,
    query: PageQuery,
}

/// Owns the page index, boundary rows and page queries of one listing
#[derive(Debug, Clone)]
pub struct Paginator {
    collection: String,
    filter: Filter,
    sort_field: String,
    page_size: usize,
    page_index: usize,
    cursor: Option<PageCursor>,
    committed: PageQuery,
    pending: Option<Pending>,
}

impl Paginator {
    /// Start at page 1: `page_size` rows ordered by `sort_field` ascending
    pub fn open_first_page(
        collection: &str,
        filter: Filter,
        sort_field: &str,
        page_size: usize,
    ) -> (Self, PageQuery) {
        let page_size = page_size.max(1);
        let first = first_page_query(collection, &filter, sort_field, page_size);
        let paginator = Self {
            collection: collection.to_string(),
            filter,
            sort_field: sort_field.to_string(),
            page_size,
            page_index: 1,
            cursor: None,
            committed: first.clone(),
            pending: None,
        };
        (paginator, first)
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Query of the page currently in flight, or of the visible page
    pub fn active_query(&self) -> &PageQuery {
        self.pending
            .as_ref()
            .map(|p| &p.query)
            .unwrap_or(&self.committed)
    }

    /// Forward is disabled once `page_index * page_size >= total`, and while
    /// the total is still unknown
    pub fn can_page_forward(&self, total: Option<u64>) -> bool {
        let shown = (self.page_index * self.page_size) as u64;
        self.pending.is_none() && total.is_some_and(|total| shown < total)
    }

    pub fn can_page_backward(&self) -> bool {
        self.pending.is_none() && self.page_index > 1
    }

    /// Query for the page after the visible one
    pub fn page_forward(&mut self, total: Option<u64>) -> Result<PageQuery, ViewError> {
        self.ensure_idle()?;
        let last = match &self.cursor {
            Some(cursor) if self.can_page_forward(total) => cursor.last.clone(),
            _ => return Err(self.out_of_bounds(PageDirection::Forward)),
        };

        let query = PageQuery {
            query: self.page(SortOrder::Ascending, Bound::After(last)),
            reversed: false,
        };
        self.pending = Some(Pending {
            direction: PageDirection::Forward,
            query: query.clone(),
        });
        Ok(query)
    }

    /// Query for the page before the visible one
    pub fn page_backward(&mut self) -> Result<PageQuery, ViewError> {
        self.ensure_idle()?;
        let first = match &self.cursor {
            Some(cursor) if self.can_page_backward() => cursor.first.clone(),
            _ => return Err(self.out_of_bounds(PageDirection::Backward)),
        };

        let query = PageQuery {
            query: self.page(SortOrder::Descending, Bound::Before(first)),
            reversed: true,
        };
        self.pending = Some(Pending {
            direction: PageDirection::Backward,
            query: query.clone(),
        });
        Ok(query)
    }

    /// Drop an in-flight navigation that failed to establish; the returned
    /// query restores the visible page's live feed
    pub fn abandon_pending(&mut self) -> Option<PageQuery> {
        self.pending.take().map(|_| self.committed.clone())
    }

    /// Fold an accepted snapshot of the active query into the page state
    pub fn apply(&mut self, docs: Vec<Document>) -> PageOutcome {
        if let Some(pending) = self.pending.take() {
            let docs = pending.query.normalize(docs);
            if docs.is_empty() {
                return PageOutcome::Reverted(self.committed.clone());
            }
            if pending.direction == PageDirection::Backward
                && (self.page_index <= 2 || docs.len() < self.page_size)
            {
                // Nothing precedes these rows
                let first = self.first_page();
                self.page_index = 1;
                self.committed = first.clone();
                self.cursor = self.bounds_of(&docs);
                return PageOutcome::Realigned { docs, query: first };
            }
            self.page_index = match pending.direction {
                PageDirection::Forward => self.page_index + 1,
                PageDirection::Backward => self.page_index - 1,
            };
            self.committed = pending.query;
            self.cursor = self.bounds_of(&docs);
            return PageOutcome::Moved {
                direction: pending.direction,
                docs,
            };
        }

        let docs = self.committed.normalize(docs);
        if docs.is_empty() && self.page_index > 1 {
            let first = self.first_page();
            self.page_index = 1;
            self.cursor = None;
            self.committed = first.clone();
            return PageOutcome::Reset(first);
        }

        self.cursor = self.bounds_of(&docs);
        PageOutcome::Updated(docs)
    }

    fn ensure_idle(&self) -> Result<(), ViewError> {
        if self.pending.is_some() {
            return Err(ViewError::NavigationInFlight);
        }
        Ok(())
    }

    fn out_of_bounds(&self, direction: PageDirection) -> ViewError {
        ViewError::NavigationBounds {
            direction,
            page_index: self.page_index,
        }
    }

    fn first_page(&self) -> PageQuery {
        first_page_query(
            &self.collection,
            &self.filter,
            &self.sort_field,
            self.page_size,
        )
    }

    fn page(&self, order: SortOrder, bound: Bound) -> Query {
        Query::new(self.collection.clone(), self.filter.clone())
            .order_by(self.sort_field.clone(), order)
            .bounded(bound)
            .limit(self.page_size)
    }

    fn bounds_of(&self, docs: &[Document]) -> Option<PageCursor> {
        let first = docs.first()?;
        let last = docs.last()?;
        Some(PageCursor {
            first: Cursor::at(first, &self.sort_field),
            last: Cursor::at(last, &self.sort_field),
            page_index: self.page_index,
        })
    }
}

fn first_page_query(
    collection: &str,
    filter: &Filter,
    sort_field: &str,
    page_size: usize,
) -> PageQuery {
    PageQuery {
        query: Query::new(collection, filter.clone())
            .order_by(sort_field, SortOrder::Ascending)
            .limit(page_size),
        reversed: false,
    }
}
