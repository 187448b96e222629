use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::FeedError;

/// Upper bound on values in a single "author in (...)" filter.
pub const MAX_MEMBERSHIP_VALUES: usize = 10;

/// "follower follows followee"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEdge {
    pub follower_id: String,
    pub followee_id: String,
    pub created_at: DateTime<Utc>,
}

impl FollowEdge {
    pub fn new(follower_id: impl Into<String>, followee_id: impl Into<String>) -> Self {
        Self {
            follower_id: follower_id.into(),
            followee_id: followee_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Order-sensitive identity key; at most one edge exists per key.
    pub fn edge_key(&self) -> String {
        Self::key_for(&self.follower_id, &self.followee_id)
    }

    pub fn key_for(follower_id: &str, followee_id: &str) -> String {
        format!("{}_{}", follower_id, followee_id)
    }
}

/// Notification that a viewer's following set changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    Followed(FollowEdge),
    Unfollowed(FollowEdge),
    /// The subscription missed events; any held snapshot must be treated as stale.
    Resync,
}

impl EdgeChange {
    pub fn follower_id(&self) -> Option<&str> {
        match self {
            EdgeChange::Followed(edge) | EdgeChange::Unfollowed(edge) => Some(&edge.follower_id),
            EdgeChange::Resync => None,
        }
    }
}

/// A post document exactly as the store returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl RawDocument {
    /// Build from a JSON value; anything but an object yields an empty field map.
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// Normalized feed post (matches the client's FeedPost shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl PostRecord {
    pub fn cursor(&self) -> FeedCursor {
        FeedCursor::new(self.created_at, self.id.clone())
    }
}

/// Canonical document shape of a normalized post, so feed output can be fed
/// back through assembly (for example when merging cached pages).
impl From<&PostRecord> for RawDocument {
    fn from(post: &PostRecord) -> Self {
        let mut data = Map::new();
        data.insert("authorId".to_string(), Value::from(post.author_id.clone()));
        data.insert(
            "createdAt".to_string(),
            Value::from(post.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        data.insert("mediaUrls".to_string(), Value::from(post.media_urls.clone()));
        data.insert("likeCount".to_string(), Value::from(post.like_count));
        data.insert("commentCount".to_string(), Value::from(post.comment_count));
        if let Some(caption) = &post.caption {
            data.insert("caption".to_string(), Value::from(caption.clone()));
        }
        if let Some(location) = &post.location {
            data.insert("location".to_string(), Value::from(location.clone()));
        }

        Self {
            id: post.id.clone(),
            data,
        }
    }
}

/// Cursor format for timestamp-based pagination: base64("millis:post_id")
///
/// Feed order is `(created_at desc, post_id desc)`; a cursor points at the
/// last document a query returned and the next query starts strictly after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub post_id: String,
}

impl FeedCursor {
    pub fn new(created_at: DateTime<Utc>, post_id: impl Into<String>) -> Self {
        Self {
            created_at,
            post_id: post_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        let cursor_str = format!("{}:{}", self.created_at.timestamp_millis(), self.post_id);
        general_purpose::STANDARD.encode(cursor_str)
    }

    pub fn decode(cursor: &str) -> Result<Self, FeedError> {
        let decoded = general_purpose::STANDARD
            .decode(cursor)
            .map_err(|_| FeedError::InvalidCursor("Invalid cursor format".to_string()))?;
        let cursor_str = String::from_utf8(decoded)
            .map_err(|_| FeedError::InvalidCursor("Invalid cursor encoding".to_string()))?;

        let (ts_str, post_id) = cursor_str
            .split_once(':')
            .ok_or_else(|| FeedError::InvalidCursor("Missing cursor separator".to_string()))?;
        if post_id.is_empty() {
            return Err(FeedError::InvalidCursor("Empty cursor post id".to_string()));
        }
        let millis = ts_str
            .parse::<i64>()
            .map_err(|_| FeedError::InvalidCursor("Invalid cursor timestamp".to_string()))?;
        let created_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| FeedError::InvalidCursor("Cursor timestamp out of range".to_string()))?;

        Ok(Self::new(created_at, post_id))
    }

    /// Whether a document at `(created_at, post_id)` sorts strictly after this cursor.
    pub fn precedes(&self, created_at: DateTime<Utc>, post_id: &str) -> bool {
        created_at < self.created_at || (created_at == self.created_at && post_id < self.post_id.as_str())
    }
}

impl From<FeedCursor> for String {
    fn from(cursor: FeedCursor) -> Self {
        cursor.encode()
    }
}

impl TryFrom<String> for FeedCursor {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FeedCursor::decode(&value)
    }
}

/// One computed page of the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<PostRecord>,
    pub continuation_cursor: Option<FeedCursor>,
    pub has_more: bool,
}

impl FeedPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Snapshot of the identities a viewer follows, kept in a stable order so
/// chunking is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowingSet(BTreeSet<String>);

impl FollowingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Ordered partitions of at most `size` identities (`size` is clamped to 1..=10).
    pub fn chunks(&self, size: usize) -> Vec<Vec<String>> {
        let size = size.clamp(1, MAX_MEMBERSHIP_VALUES);
        let ids: Vec<String> = self.0.iter().cloned().collect();
        ids.chunks(size).map(|chunk| chunk.to_vec()).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for FollowingSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .filter(|id: &String| !id.is_empty())
                .collect(),
        )
    }
}
