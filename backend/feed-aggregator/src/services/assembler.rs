//! Feed assembly: normalize → filter → dedup → sort → truncate.
//!
//! Input may come from several chunk queries or several fetches, so it can be
//! duplicated, unordered and partly malformed. Output is always a clean,
//! duplicate-free, newest-first page; bad documents are dropped and logged,
//! never propagated.

use std::collections::HashMap;
use tracing::{debug, warn};

use super::fetcher::FetchResult;
use super::normalize::{self, NormalizeError};
use crate::models::{FeedCursor, FeedPage, PostRecord, RawDocument};

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedAssembler;

impl FeedAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Build a page from raw documents alone.
    ///
    /// The continuation cursor, when more data exists, points at the last
    /// item kept on the page.
    pub fn assemble(&self, raw: Vec<RawDocument>, page_size: usize) -> FeedPage {
        self.build(raw, page_size, false, None)
    }

    /// Build a page from a chunked fetch, carrying over its "may have more"
    /// signal and continuation cursor.
    pub fn assemble_fetch(&self, fetched: FetchResult, page_size: usize) -> FeedPage {
        self.build(
            fetched.raw_records,
            page_size,
            fetched.may_have_more,
            fetched.last_cursor,
        )
    }

    /// Normalize and filter: every surviving record has a usable `created_at`.
    pub fn normalize_all(&self, raw: Vec<RawDocument>) -> Vec<PostRecord> {
        let mut dropped = 0usize;
        let records: Vec<PostRecord> = raw
            .iter()
            .filter_map(|doc| match normalize::normalize(doc) {
                Ok(record) => Some(record),
                Err(NormalizeError::MissingCreatedAt) => {
                    debug!(post_id = %doc.id, "Dropping post without createdAt");
                    dropped += 1;
                    None
                }
                Err(e) => {
                    warn!(post_id = %doc.id, error = %e, "Dropping malformed post");
                    dropped += 1;
                    None
                }
            })
            .collect();

        if dropped > 0 {
            debug!(dropped, kept = records.len(), "Normalization dropped documents");
        }
        records
    }

    /// Keep one record per id; the last occurrence wins.
    pub fn dedup(&self, records: Vec<PostRecord>) -> Vec<PostRecord> {
        let mut by_id: HashMap<String, PostRecord> = HashMap::with_capacity(records.len());
        for record in records {
            by_id.insert(record.id.clone(), record);
        }
        by_id.into_values().collect()
    }

    /// Newest first; equal timestamps fall back to id, descending.
    pub fn sort(&self, records: &mut [PostRecord]) {
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
    }

    /// Concatenate a new page after already-loaded items and re-run dedup and ordering.
    pub fn merge(&self, existing: Vec<PostRecord>, incoming: Vec<PostRecord>) -> Vec<PostRecord> {
        let mut merged = existing;
        merged.extend(incoming);
        let mut merged = self.dedup(merged);
        self.sort(&mut merged);
        merged
    }

    fn build(
        &self,
        raw: Vec<RawDocument>,
        page_size: usize,
        upstream_has_more: bool,
        upstream_cursor: Option<FeedCursor>,
    ) -> FeedPage {
        let records = self.normalize_all(raw);
        let mut records = self.dedup(records);
        self.sort(&mut records);

        let overflowed = records.len() > page_size;
        records.truncate(page_size);

        let continuation_cursor = if overflowed || upstream_has_more {
            upstream_cursor.or_else(|| records.last().map(PostRecord::cursor))
        } else {
            None
        };

        // "More" without a position to resume from is not actionable
        FeedPage {
            has_more: continuation_cursor.is_some(),
            items: records,
            continuation_cursor,
        }
    }
}
