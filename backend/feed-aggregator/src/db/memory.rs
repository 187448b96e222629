//! In-memory store implementations.
//!
//! Used as the reference backend in tests and local tooling. Both stores
//! honor the same contracts as a hosted document database: the post store
//! rejects membership filters above 10 values, orders by
//! `(created_at desc, id desc)` and, like any ordered index, never returns a
//! document that lacks a usable `createdAt`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

use super::{EdgeChangeStream, PostQuery, PostStore, RelationStore};
use crate::error::StoreError;
use crate::models::{EdgeChange, FollowEdge, RawDocument};
use crate::services::normalize;

const CHANGE_BUFFER: usize = 256;

/// Follow edges keyed by `follower_followee`, with change fan-out for watchers.
pub struct InMemoryRelationStore {
    edges: RwLock<HashMap<String, FollowEdge>>,
    changes: broadcast::Sender<EdgeChange>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl InMemoryRelationStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            edges: RwLock::new(HashMap::new()),
            changes,
            unavailable: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    /// Idempotent follow; returns true if a new edge was created.
    pub fn follow(&self, follower_id: &str, followee_id: &str) -> bool {
        if follower_id.is_empty() || followee_id.is_empty() {
            return false;
        }

        let edge = FollowEdge::new(follower_id, followee_id);
        {
            let mut edges = self.edges.write();
            let key = edge.edge_key();
            if edges.contains_key(&key) {
                return false;
            }
            edges.insert(key, edge.clone());
        }

        // No receivers is not an error
        let _ = self.changes.send(EdgeChange::Followed(edge));
        true
    }

    /// Idempotent unfollow; returns true if an edge was removed.
    pub fn unfollow(&self, follower_id: &str, followee_id: &str) -> bool {
        let removed = self
            .edges
            .write()
            .remove(&FollowEdge::key_for(follower_id, followee_id));

        match removed {
            Some(edge) => {
                let _ = self.changes.send(EdgeChange::Unfollowed(edge));
                true
            }
            None => false,
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Number of `following_edges` calls served or refused.
    pub fn read_count(&self) -> usize {
        self.reads.load(AtomicOrdering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("relation store offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryRelationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationStore for InMemoryRelationStore {
    async fn following_edges(&self, follower_id: &str) -> Result<Vec<FollowEdge>, StoreError> {
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_available()?;

        let mut edges: Vec<FollowEdge> = self
            .edges
            .read()
            .values()
            .filter(|edge| edge.follower_id == follower_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.followee_id.cmp(&b.followee_id))
        });

        Ok(edges)
    }

    async fn watch_following(&self, follower_id: &str) -> Result<EdgeChangeStream, StoreError> {
        self.check_available()?;

        let follower_id = follower_id.to_string();
        debug!(follower = %follower_id, "Watching following edges");

        let stream = BroadcastStream::new(self.changes.subscribe()).filter_map(move |item| {
            let change = match item {
                Ok(change) => change,
                Err(_) => EdgeChange::Resync,
            };
            let relevant = change
                .follower_id()
                .map_or(true, |id| id == follower_id.as_str());
            futures::future::ready(relevant.then_some(change))
        });

        Ok(Box::pin(stream))
    }
}

/// Posts collection with query logging and failure injection.
pub struct InMemoryPostStore {
    posts: RwLock<HashMap<String, RawDocument>>,
    queries: Mutex<Vec<PostQuery>>,
    failing_authors: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            failing_authors: RwLock::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Insert or replace a document under its own id.
    pub fn insert(&self, doc: RawDocument) {
        self.posts.write().insert(doc.id.clone(), doc);
    }

    /// Insert a document with a store-generated id.
    pub fn insert_post(&self, data: Value) -> String {
        let id = Uuid::new_v4().to_string();
        self.insert(RawDocument::new(id.clone(), data));
        id
    }

    pub fn remove(&self, id: &str) -> bool {
        self.posts.write().remove(id).is_some()
    }

    /// Make every query whose membership filter includes `author_id` fail
    /// the way a backend without the composite index does.
    pub fn fail_queries_for(&self, author_id: &str) {
        self.failing_authors.write().insert(author_id.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Every query received, in arrival order.
    pub fn queries(&self) -> Vec<PostQuery> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }
}

impl Default for InMemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

fn feed_order(a: &(DateTime<Utc>, RawDocument), b: &(DateTime<Utc>, RawDocument)) -> Ordering {
    b.0.cmp(&a.0).then_with(|| b.1.id.cmp(&a.1.id))
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<RawDocument>, StoreError> {
        self.queries.lock().push(query.clone());
        query.validate()?;

        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("post store offline".to_string()));
        }

        {
            let failing = self.failing_authors.read();
            if let Some(author) = query.author_ids.iter().find(|a| failing.contains(*a)) {
                return Err(StoreError::MissingIndex(format!(
                    "posts(authorId in [..], createdAt desc) for chunk containing {}",
                    author
                )));
            }
        }

        let authors: HashSet<&str> = query.author_ids.iter().map(String::as_str).collect();

        // Legacy documents are matched under any recognized author alias
        let mut matches: Vec<(DateTime<Utc>, RawDocument)> = self
            .posts
            .read()
            .values()
            .filter(|doc| {
                normalize::author_id(doc)
                    .map(|author| authors.contains(author.as_str()))
                    .unwrap_or(false)
            })
            .filter_map(|doc| normalize::created_at(doc).map(|ts| (ts, doc.clone())))
            .collect();
        matches.sort_by(feed_order);

        let page = matches
            .into_iter()
            .filter(|(ts, doc)| {
                query
                    .start_after
                    .as_ref()
                    .map_or(true, |cursor| cursor.precedes(*ts, &doc.id))
            })
            .take(query.limit)
            .map(|(_, doc)| doc)
            .collect();

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedCursor;
    use chrono::TimeZone;
    use serde_json::json;

    fn post(id: &str, author: &str, millis: i64) -> RawDocument {
        RawDocument::new(id, json!({ "authorId": author, "createdAt": millis }))
    }

    #[tokio::test]
    async fn test_follow_is_idempotent() {
        let store = InMemoryRelationStore::new();

        assert!(store.follow("viewer", "u1"));
        assert!(!store.follow("viewer", "u1"));
        assert!(store.follow("u1", "viewer"));

        let edges = store.following_edges("viewer").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].followee_id, "u1");
    }

    #[tokio::test]
    async fn test_unfollow_removes_only_that_pair() {
        let store = InMemoryRelationStore::new();
        store.follow("viewer", "u1");
        store.follow("viewer", "u2");

        assert!(store.unfollow("viewer", "u1"));
        assert!(!store.unfollow("viewer", "u1"));

        let edges = store.following_edges("viewer").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].followee_id, "u2");
    }

    #[tokio::test]
    async fn test_watch_only_sees_own_edges() {
        let store = InMemoryRelationStore::new();
        let mut changes = store.watch_following("viewer").await.unwrap();

        store.follow("someone-else", "u9");
        store.follow("viewer", "u1");

        let change = changes.next().await.unwrap();
        assert!(matches!(change, EdgeChange::Followed(ref e) if e.followee_id == "u1"));
    }

    #[tokio::test]
    async fn test_post_store_rejects_oversized_membership_filter() {
        let store = InMemoryPostStore::new();
        let query = PostQuery {
            author_ids: (0..11).map(|i| format!("u{}", i)).collect(),
            limit: 20,
            start_after: None,
        };

        let result = store.query_posts(&query).await;
        assert!(matches!(result, Err(StoreError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_post_store_orders_and_pages() {
        let store = InMemoryPostStore::new();
        store.insert(post("a", "u1", 1_000));
        store.insert(post("b", "u2", 3_000));
        store.insert(post("c", "u1", 2_000));
        store.insert(post("d", "u3", 4_000));
        store.insert(RawDocument::new("e", json!({ "authorId": "u1" })));

        let first = PostQuery::new(vec!["u1".into(), "u2".into()], 2, None).unwrap();
        let page: Vec<String> = store
            .query_posts(&first)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(page, vec!["b", "c"]);

        let cursor = FeedCursor::new(Utc.timestamp_millis_opt(2_000).unwrap(), "c");
        let next = PostQuery::new(vec!["u1".into(), "u2".into()], 5, Some(cursor)).unwrap();
        let page: Vec<String> = store
            .query_posts(&next)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(page, vec!["a"]);
    }

    #[tokio::test]
    async fn test_post_store_never_returns_untimestamped_documents() {
        let store = InMemoryPostStore::new();
        store.insert(post("timed", "u1", 100));
        store.insert(RawDocument::new("absent", json!({ "authorId": "u1" })));
        store.insert(RawDocument::new("garbage", json!({ "authorId": "u1", "createdAt": "soon" })));

        let first = PostQuery::new(vec!["u1".into()], 10, None).unwrap();
        let page = store.query_posts(&first).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "timed");

        let cursor = FeedCursor::new(Utc.timestamp_millis_opt(100).unwrap(), "timed");
        let next = PostQuery::new(vec!["u1".into()], 10, Some(cursor)).unwrap();
        assert!(store.query_posts(&next).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removed_post_no_longer_matches() {
        let store = InMemoryPostStore::new();
        store.insert(post("a", "u1", 100));
        store.insert(post("b", "u1", 200));

        assert!(store.remove("b"));
        assert!(!store.remove("b"));

        let query = PostQuery::new(vec!["u1".into()], 10, None).unwrap();
        let ids: Vec<String> = store
            .query_posts(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_post_store_matches_legacy_author_field() {
        let store = InMemoryPostStore::new();
        store.insert(RawDocument::new("p1", json!({ "userId": "u9", "createdAt": 10 })));

        let query = PostQuery::new(vec!["u9".into()], 10, None).unwrap();
        assert_eq!(store.query_posts(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection_records_query() {
        let store = InMemoryPostStore::new();
        store.fail_queries_for("u2");

        let query = PostQuery::new(vec!["u1".into(), "u2".into()], 10, None).unwrap();
        let result = store.query_posts(&query).await;

        assert!(matches!(result, Err(StoreError::MissingIndex(_))));
        assert_eq!(store.query_count(), 1);
    }
}
