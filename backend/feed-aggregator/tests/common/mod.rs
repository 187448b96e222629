//! Shared fixtures for feed-aggregator integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use feed_aggregator::db::{InMemoryPostStore, PostQuery, PostStore};
use feed_aggregator::{FeedConfig, RawDocument, StoreError};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Install a test-scoped subscriber once; `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// No retries, no jitter: failures surface on the first attempt.
pub fn test_config(page_size: usize) -> FeedConfig {
    FeedConfig {
        page_size,
        retry_max_attempts: 1,
        retry_jitter: false,
        ..FeedConfig::default()
    }
}

pub fn followee(i: usize) -> String {
    format!("u{:02}", i)
}

/// `count` posts by `author` with ids `{author}-p{i}`, the newest at `base + count - 1`.
pub fn seed_posts(store: &InMemoryPostStore, author: &str, count: usize, base: i64) {
    for i in 0..count {
        store.insert(RawDocument::new(
            format!("{}-p{}", author, i),
            json!({ "authorId": author, "createdAt": base + i as i64 }),
        ));
    }
}

/// Post store whose queries park until released, so tests can act while a
/// load is in flight.
pub struct GatedPostStore {
    inner: Arc<InMemoryPostStore>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedPostStore {
    pub fn new(inner: Arc<InMemoryPostStore>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl PostStore for GatedPostStore {
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<RawDocument>, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.query_posts(query).await
    }
}

type Hook = Box<dyn Fn(usize) + Send + Sync>;

/// Post store that runs a hook before each query with the zero-based query
/// number, to mutate the world while a fetch is in flight.
pub struct HookedPostStore {
    inner: Arc<InMemoryPostStore>,
    hook: Mutex<Option<Hook>>,
    calls: AtomicUsize,
}

impl HookedPostStore {
    pub fn new(inner: Arc<InMemoryPostStore>) -> Self {
        Self {
            inner,
            hook: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_hook(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }
}

#[async_trait]
impl PostStore for HookedPostStore {
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<RawDocument>, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let hook = self.hook.lock();
            if let Some(hook) = hook.as_ref() {
                hook(call);
            }
        }
        self.inner.query_posts(query).await
    }
}
