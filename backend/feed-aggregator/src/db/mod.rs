//! Store interfaces consumed by the feed pipeline.
//!
//! Concrete persistence lives behind these traits; handles are injected by
//! the composition root as `Arc<dyn ...>`.

pub mod memory;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::StoreError;
use crate::models::{EdgeChange, FeedCursor, FollowEdge, RawDocument, MAX_MEMBERSHIP_VALUES};

pub use memory::{InMemoryPostStore, InMemoryRelationStore};

/// Live stream of follow-edge changes for one follower.
pub type EdgeChangeStream = Pin<Box<dyn Stream<Item = EdgeChange> + Send>>;

/// Follow relations keyed by `follower_followee`.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// All edges where `follower_id` is the follower.
    async fn following_edges(&self, follower_id: &str) -> Result<Vec<FollowEdge>, StoreError>;

    /// Live variant of [`following_edges`](Self::following_edges): yields on
    /// every insert or delete of an edge owned by `follower_id`.
    async fn watch_following(&self, follower_id: &str) -> Result<EdgeChangeStream, StoreError>;
}

/// "author in (...), order by created_at desc, limit N, start after cursor"
#[derive(Debug, Clone, PartialEq)]
pub struct PostQuery {
    pub author_ids: Vec<String>,
    pub limit: usize,
    pub start_after: Option<FeedCursor>,
}

impl PostQuery {
    pub fn new(
        author_ids: Vec<String>,
        limit: usize,
        start_after: Option<FeedCursor>,
    ) -> Result<Self, StoreError> {
        let query = Self {
            author_ids,
            limit,
            start_after,
        };
        query.validate()?;
        Ok(query)
    }

    /// Membership filters must be non-empty and carry at most 10 values.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.author_ids.is_empty() {
            return Err(StoreError::InvalidQuery(
                "membership filter requires at least one value".to_string(),
            ));
        }
        if self.author_ids.len() > MAX_MEMBERSHIP_VALUES {
            return Err(StoreError::InvalidQuery(format!(
                "membership filter supports at most {} values, got {}",
                MAX_MEMBERSHIP_VALUES,
                self.author_ids.len()
            )));
        }
        Ok(())
    }
}

/// Posts collection ordered by creation time.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<RawDocument>, StoreError>;
}
