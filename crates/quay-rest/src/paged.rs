//! Paginated collection fetching.
//!
//! A [`PagedFetcher`] materializes every item of a server-paginated
//! collection as one ordered sequence, issuing offset/limit-bounded
//! requests through a [`RestSession`] and using the server-reported
//! `totalCount` as the stopping condition.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use quay_core::error::PageError;
use quay_core::{DEFAULT_COLLECTION_LIMIT, Page, PageRequest, Result};

use crate::request::ApiRequest;
use crate::session::RestSession;

/// Fetches pages of `T` from one logical collection endpoint.
pub struct PagedFetcher<T> {
    session: RestSession,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> PagedFetcher<T> {
    /// A fetcher for the collection at `path` under the session's base
    /// URL.
    pub fn new(session: RestSession, path: impl Into<String>) -> Self {
        Self {
            session,
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Fetch one page.
    #[instrument(skip(self, page), fields(path = %self.path, offset = page.offset, limit = page.limit))]
    pub async fn fetch_page(&self, page: &PageRequest) -> Result<Page<T>> {
        debug!("fetching page");
        let request = ApiRequest::get(&self.path).with_page(page);
        let response = self.session.execute(&request).await?;
        let body: serde_json::Value = response.json().await?;

        let total_count = body
            .get("totalCount")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| PageError::MissingField {
                name: "totalCount".to_string(),
            })?;
        let items = body
            .get("items")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| PageError::MissingField {
                name: "items".to_string(),
            })?;

        let items = items
            .iter()
            .map(|item| {
                serde_json::from_value(item.clone()).map_err(|e| {
                    PageError::InvalidItem {
                        reason: e.to_string(),
                    }
                    .into()
                })
            })
            .collect::<Result<Vec<T>>>()?;

        Ok(Page { total_count, items })
    }

    /// Fetch every item of the collection, in server order.
    ///
    /// The offset advances by the number of items actually received on
    /// each page (tolerating a final short page) until the accumulated
    /// count reaches the total reported by the first page. A page with
    /// zero items before that point fails with
    /// [`PageError::Stalled`] rather than looping forever. If the
    /// server-side collection mutates mid-fetch, termination is still
    /// keyed to the originally-reported total.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn fetch_all(&self, page: PageRequest) -> Result<Vec<T>> {
        let mut page = page;
        let start = page.offset;
        let first = self.fetch_page(&page).await?;
        let total = first.total_count;
        let mut items = first.items;
        debug!(total, received = items.len(), "first page fetched");

        while (items.len() as u64) < total {
            if items.is_empty() {
                return Err(PageError::Stalled {
                    received: 0,
                    expected: total,
                }
                .into());
            }
            page.offset = start + items.len() as u64;

            let next = self.fetch_page(&page).await?;
            if next.items.is_empty() {
                return Err(PageError::Stalled {
                    received: items.len() as u64,
                    expected: total,
                }
                .into());
            }
            items.extend(next.items);
        }

        debug!(total = items.len(), "collection fully fetched");
        Ok(items)
    }

    /// Fetch every item using the factory default page size of 100.
    pub async fn fetch_all_default(&self) -> Result<Vec<T>> {
        self.fetch_all(PageRequest::new().with_limit(DEFAULT_COLLECTION_LIMIT))
            .await
    }

    /// Fetch every item matching a free-text filter, using the factory
    /// default page size.
    pub async fn fetch_all_filtered(&self, q: impl Into<String>) -> Result<Vec<T>> {
        self.fetch_all(
            PageRequest::new()
                .with_limit(DEFAULT_COLLECTION_LIMIT)
                .with_query(q),
        )
        .await
    }
}

impl<T> std::fmt::Debug for PagedFetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFetcher")
            .field("path", &self.path)
            .finish()
    }
}
