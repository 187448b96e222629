//! Following-set resolution for a viewer.

use futures::stream;
use resilience::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{EdgeChangeStream, RelationStore};
use crate::error::StoreError;
use crate::models::{EdgeChange, FollowingSet};

pub struct FollowSetResolver {
    store: Arc<dyn RelationStore>,
    retry: RetryPolicy<StoreError>,
}

impl FollowSetResolver {
    pub fn new(store: Arc<dyn RelationStore>, retry: RetryPolicy<StoreError>) -> Self {
        Self { store, retry }
    }

    /// Identities `viewer_id` currently follows.
    ///
    /// An empty viewer id or a store failure both resolve to an empty set,
    /// which callers treat as "no feed".
    pub async fn resolve(&self, viewer_id: &str) -> FollowingSet {
        if viewer_id.trim().is_empty() {
            debug!("Empty viewer id, following set is empty");
            return FollowingSet::new();
        }

        match self
            .retry
            .run("following_edges", || self.store.following_edges(viewer_id))
            .await
        {
            Ok(edges) => {
                let following: FollowingSet = edges
                    .into_iter()
                    .filter(|edge| edge.follower_id == viewer_id)
                    .map(|edge| edge.followee_id)
                    .collect();
                debug!(viewer_id, following = following.len(), "Resolved following set");
                following
            }
            Err(e) => {
                warn!(
                    viewer_id,
                    error = %e,
                    "Failed to resolve following set, treating as empty"
                );
                FollowingSet::new()
            }
        }
    }

    /// Stream that yields whenever the viewer's following set changes.
    ///
    /// An empty viewer id never changes, so it gets a stream that ends immediately.
    pub async fn watch(&self, viewer_id: &str) -> Result<EdgeChangeStream, StoreError> {
        if viewer_id.trim().is_empty() {
            return Ok(Box::pin(stream::empty::<EdgeChange>()));
        }

        self.retry
            .run("watch_following", || self.store.watch_following(viewer_id))
            .await
            .map_err(StoreError::from)
    }
}
