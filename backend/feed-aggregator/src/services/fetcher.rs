//! Chunked post fetching for a following set.
//!
//! The document store caps membership filters at 10 values, so a following
//! set is split into ordered chunks and queried chunk by chunk. Each chunk is
//! bounded by the page size on its own; a failing chunk contributes nothing
//! and the rest of the fetch carries on.

use resilience::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::{PostQuery, PostStore};
use crate::error::StoreError;
use crate::models::{FeedCursor, FollowingSet, RawDocument, MAX_MEMBERSHIP_VALUES};
use crate::services::normalize;

/// Raw output of one chunked fetch, before assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    /// Documents from every successful chunk, in chunk order, unsorted
    pub raw_records: Vec<RawDocument>,
    /// Last document of the last chunk that returned any
    pub last_cursor: Option<FeedCursor>,
    /// At least one chunk filled its whole `page_size` budget and yielded a cursor
    pub may_have_more: bool,
    pub chunks_queried: usize,
    pub chunks_failed: usize,
}

impl FetchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all_chunks_failed(&self) -> bool {
        self.chunks_queried > 0 && self.chunks_failed == self.chunks_queried
    }
}

pub struct ChunkedFeedFetcher {
    store: Arc<dyn PostStore>,
    retry: RetryPolicy<StoreError>,
    chunk_size: usize,
}

impl ChunkedFeedFetcher {
    pub fn new(store: Arc<dyn PostStore>, retry: RetryPolicy<StoreError>) -> Self {
        Self::with_chunk_size(store, retry, MAX_MEMBERSHIP_VALUES)
    }

    /// `chunk_size` is clamped to the store's membership cap.
    pub fn with_chunk_size(
        store: Arc<dyn PostStore>,
        retry: RetryPolicy<StoreError>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            retry,
            chunk_size: chunk_size.clamp(1, MAX_MEMBERSHIP_VALUES),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fetch up to `page_size` documents per chunk of `following`, starting
    /// strictly after `cursor` when one is given.
    ///
    /// `following` is a snapshot: it is read once, up front.
    pub async fn fetch_page(
        &self,
        following: &FollowingSet,
        cursor: Option<&FeedCursor>,
        page_size: usize,
    ) -> FetchResult {
        if following.is_empty() || page_size == 0 {
            debug!("Empty following set or page size, skipping post queries");
            return FetchResult::empty();
        }

        let chunks = following.chunks(self.chunk_size);
        let mut result = FetchResult::default();

        for (index, author_ids) in chunks.into_iter().enumerate() {
            result.chunks_queried += 1;

            let query = PostQuery {
                author_ids,
                limit: page_size,
                start_after: cursor.cloned(),
            };

            let mut docs = match self
                .retry
                .run("query_posts", || self.store.query_posts(&query))
                .await
            {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(
                        chunk = index,
                        authors = query.author_ids.len(),
                        error = %e,
                        "Chunk query failed, continuing without it"
                    );
                    result.chunks_failed += 1;
                    continue;
                }
            };

            // Never trust the backend to honor the limit
            docs.truncate(page_size);
            let returned = docs.len();

            let mut chunk_cursor = None;
            for doc in docs {
                match normalize::created_at(&doc) {
                    Some(created_at) => {
                        chunk_cursor = Some(FeedCursor::new(created_at, doc.id.clone()));
                        result.raw_records.push(doc);
                    }
                    None => {
                        debug!(post_id = %doc.id, chunk = index, "Discarding post without createdAt");
                    }
                }
            }

            // A full batch only promises more if there is a position to continue from
            if let Some(chunk_cursor) = chunk_cursor {
                if returned == page_size {
                    result.may_have_more = true;
                }
                result.last_cursor = Some(chunk_cursor);
            }

            debug!(chunk = index, returned, "Chunk query complete");
        }

        if result.all_chunks_failed() {
            error!(
                chunks = result.chunks_queried,
                "Every chunk query failed, returning an empty fetch"
            );
            return FetchResult {
                chunks_queried: result.chunks_queried,
                chunks_failed: result.chunks_failed,
                ..FetchResult::default()
            };
        }

        info!(
            following = following.len(),
            chunks = result.chunks_queried,
            failed_chunks = result.chunks_failed,
            records = result.raw_records.len(),
            may_have_more = result.may_have_more,
            "Fetched feed candidates"
        );

        result
    }
}
