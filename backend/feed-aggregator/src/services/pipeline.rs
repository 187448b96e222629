//! Wires the stores, retry policy and pipeline stages together.

use resilience::{presets, RetryPolicy};
use std::sync::Arc;
use tracing::debug;

use super::assembler::FeedAssembler;
use super::fetcher::ChunkedFeedFetcher;
use super::follow_set::FollowSetResolver;
use super::session::FeedSession;
use crate::config::FeedConfig;
use crate::db::{PostStore, RelationStore};
use crate::error::{Result, StoreError};
use crate::models::{FeedCursor, FeedPage};

pub struct FeedPipeline {
    resolver: Arc<FollowSetResolver>,
    fetcher: Arc<ChunkedFeedFetcher>,
    assembler: FeedAssembler,
    config: FeedConfig,
}

impl FeedPipeline {
    /// One retry policy, built from `config`, shared by both stores.
    pub fn new(
        relations: Arc<dyn RelationStore>,
        posts: Arc<dyn PostStore>,
        config: FeedConfig,
    ) -> Self {
        let retry = RetryPolicy::new(config.retry_config(), StoreError::is_retryable);
        let resolver = FollowSetResolver::new(relations, retry.clone());
        let fetcher = ChunkedFeedFetcher::with_chunk_size(posts, retry, config.chunk_size);
        Self::from_parts(resolver, fetcher, config)
    }

    /// Per-store preset retry policies with default feed settings.
    pub fn with_presets(relations: Arc<dyn RelationStore>, posts: Arc<dyn PostStore>) -> Self {
        let resolver = FollowSetResolver::new(
            relations,
            RetryPolicy::new(presets::relation_store_config(), StoreError::is_retryable),
        );
        let fetcher = ChunkedFeedFetcher::new(
            posts,
            RetryPolicy::new(presets::document_store_config(), StoreError::is_retryable),
        );
        Self::from_parts(resolver, fetcher, FeedConfig::default())
    }

    pub fn from_parts(
        resolver: FollowSetResolver,
        fetcher: ChunkedFeedFetcher,
        config: FeedConfig,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            fetcher: Arc::new(fetcher),
            assembler: FeedAssembler::new(),
            config,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Resolve → fetch → assemble, once, with no session state.
    pub async fn fetch_feed(&self, viewer_id: &str, cursor: Option<&FeedCursor>) -> FeedPage {
        let page_size = self.config.page_size;
        let following = self.resolver.resolve(viewer_id).await;
        if following.is_empty() {
            debug!(viewer_id, "Viewer follows nobody, empty feed");
            return FeedPage::empty();
        }

        let fetched = self.fetcher.fetch_page(&following, cursor, page_size).await;
        self.assembler.assemble_fetch(fetched, page_size)
    }

    /// [`fetch_feed`](Self::fetch_feed) with an opaque cursor string as handed
    /// out to clients.
    pub async fn fetch_feed_encoded(&self, viewer_id: &str, cursor: Option<&str>) -> Result<FeedPage> {
        let cursor = cursor
            .filter(|c| !c.is_empty())
            .map(FeedCursor::decode)
            .transpose()?;
        Ok(self.fetch_feed(viewer_id, cursor.as_ref()).await)
    }

    pub fn session(&self, viewer_id: impl Into<String>) -> Arc<FeedSession> {
        Arc::new(FeedSession::new(
            viewer_id,
            self.resolver.clone(),
            self.fetcher.clone(),
            self.config.page_size,
            self.config.max_restarts,
        ))
    }
}
