//! Raw document → [`PostRecord`] normalization.
//!
//! Post documents were written by several generations of clients, so the
//! same fact may live under different field names or shapes:
//!
//! - author: `authorId`, `userId`, `uid`, `ownerId`, `creatorId`
//! - media, first non-empty source wins (never merged):
//!   1. `mediaUrls`: list of strings
//!   2. `finalMediaUrl`: string
//!   3. `mediaItems` / `media`: list of `{ url | uri | downloadUrl }` objects or strings
//!   4. `imageUrl` / `image`: string
//! - `createdAt`: epoch millis, RFC 3339 string, or `{ seconds, nanoseconds }`
//!   (also `_seconds` / `_nanoseconds`). Whatever the shape, a time at or
//!   before the Unix epoch is treated as unset.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::{PostRecord, RawDocument};

pub const AUTHOR_ID_FIELDS: &[&str] = &["authorId", "userId", "uid", "ownerId", "creatorId"];

const MEDIA_URL_LIST_FIELD: &str = "mediaUrls";
const FINAL_MEDIA_URL_FIELD: &str = "finalMediaUrl";
const MEDIA_ITEM_FIELDS: &[&str] = &["mediaItems", "media"];
const LEGACY_IMAGE_FIELDS: &[&str] = &["imageUrl", "image"];
const MEDIA_ITEM_URL_KEYS: &[&str] = &["url", "uri", "downloadUrl"];

const LIKE_COUNT_FIELDS: &[&str] = &["likeCount", "likesCount"];
const COMMENT_COUNT_FIELDS: &[&str] = &["commentCount", "commentsCount"];
const CAPTION_FIELDS: &[&str] = &["caption", "text"];

/// Why a raw document could not become a feed post.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("document has no id")]
    MissingId,

    #[error("document has no usable createdAt")]
    MissingCreatedAt,

    #[error("document has no author id under any known field")]
    MissingAuthor,

    #[error("unrecognized media shape in field {0}")]
    UnrecognizedMedia(&'static str),
}

/// Normalize one raw document.
pub fn normalize(doc: &RawDocument) -> Result<PostRecord, NormalizeError> {
    if doc.id.trim().is_empty() {
        return Err(NormalizeError::MissingId);
    }
    let created_at = created_at(doc).ok_or(NormalizeError::MissingCreatedAt)?;
    let author_id = author_id(doc).ok_or(NormalizeError::MissingAuthor)?;
    let media_urls = media_urls(doc)?;

    Ok(PostRecord {
        id: doc.id.clone(),
        author_id,
        created_at,
        media_urls,
        like_count: count(doc, LIKE_COUNT_FIELDS),
        comment_count: count(doc, COMMENT_COUNT_FIELDS),
        caption: first_string(doc, CAPTION_FIELDS),
        location: location(doc),
    })
}

/// Creation time, truncated to millisecond precision so it survives a cursor round trip.
pub fn created_at(doc: &RawDocument) -> Option<DateTime<Utc>> {
    let millis = parse_timestamp(doc.get("createdAt")?)?.timestamp_millis();
    if millis <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

/// First non-empty author id among the recognized aliases.
pub fn author_id(doc: &RawDocument) -> Option<String> {
    AUTHOR_ID_FIELDS
        .iter()
        .filter_map(|field| doc.get(field))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Canonical ordered media list.
pub fn media_urls(doc: &RawDocument) -> Result<Vec<String>, NormalizeError> {
    let urls = url_list(doc, MEDIA_URL_LIST_FIELD)?;
    if !urls.is_empty() {
        return Ok(urls);
    }

    if let Some(url) = single_url(doc, FINAL_MEDIA_URL_FIELD)? {
        return Ok(vec![url]);
    }

    for field in MEDIA_ITEM_FIELDS {
        let urls = media_item_list(doc, field)?;
        if !urls.is_empty() {
            return Ok(urls);
        }
    }

    for field in LEGACY_IMAGE_FIELDS {
        if let Some(url) = single_url(doc, field)? {
            return Ok(vec![url]);
        }
    }

    Ok(Vec::new())
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

fn url_list(doc: &RawDocument, field: &'static str) -> Result<Vec<String>, NormalizeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(Ok(s.clone())),
                _ => Some(Err(NormalizeError::UnrecognizedMedia(field))),
            })
            .collect(),
        Some(_) => Err(NormalizeError::UnrecognizedMedia(field)),
    }
}

fn single_url(doc: &RawDocument, field: &'static str) -> Result<Option<String>, NormalizeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(NormalizeError::UnrecognizedMedia(field)),
    }
}

fn media_item_list(doc: &RawDocument, field: &'static str) -> Result<Vec<String>, NormalizeError> {
    let items = match doc.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(NormalizeError::UnrecognizedMedia(field)),
    };

    let mut urls = Vec::with_capacity(items.len());
    for item in items {
        let url = match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => MEDIA_ITEM_URL_KEYS
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str)),
            _ => None,
        };
        match url {
            Some(url) if !url.trim().is_empty() => urls.push(url.to_string()),
            _ => return Err(NormalizeError::UnrecognizedMedia(field)),
        }
    }
    Ok(urls)
}

fn count(doc: &RawDocument, fields: &[&str]) -> u64 {
    fields
        .iter()
        .filter_map(|field| doc.get(field))
        .find_map(|value| {
            value
                .as_u64()
                .or_else(|| value.as_i64().map(|n| n.max(0) as u64))
                .or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
        })
        .unwrap_or(0)
}

fn first_string(doc: &RawDocument, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| doc.get(field).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn location(doc: &RawDocument) -> Option<String> {
    match doc.get("location")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(data: Value) -> RawDocument {
        RawDocument::new("p1", data)
    }

    #[test]
    fn test_legacy_user_id_becomes_author_id() {
        let record = normalize(&doc(json!({ "userId": "u9", "createdAt": 1_000 }))).unwrap();
        assert_eq!(record.author_id, "u9");
    }

    #[test]
    fn test_canonical_author_id_wins() {
        let record = normalize(&doc(json!({
            "authorId": "u1",
            "userId": "u9",
            "createdAt": 1_000
        })))
        .unwrap();
        assert_eq!(record.author_id, "u1");
    }

    #[test]
    fn test_missing_author_is_rejected() {
        let result = normalize(&doc(json!({ "createdAt": 1_000 })));
        assert_eq!(result, Err(NormalizeError::MissingAuthor));
    }

    #[test]
    fn test_missing_created_at_is_rejected() {
        let result = normalize(&doc(json!({ "authorId": "u1" })));
        assert_eq!(result, Err(NormalizeError::MissingCreatedAt));

        let result = normalize(&doc(json!({ "authorId": "u1", "createdAt": null })));
        assert_eq!(result, Err(NormalizeError::MissingCreatedAt));
    }

    #[test]
    fn test_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let millis = expected.timestamp_millis();

        let shapes = [
            json!(millis),
            json!("2024-05-01T08:30:00Z"),
            json!("2024-05-01T10:30:00+02:00"),
            json!({ "seconds": expected.timestamp(), "nanoseconds": 0 }),
            json!({ "_seconds": expected.timestamp(), "_nanoseconds": 0 }),
        ];

        for shape in shapes {
            let parsed = created_at(&doc(json!({ "createdAt": shape.clone() })));
            assert_eq!(parsed, Some(expected), "shape {}", shape);
        }
    }

    #[test]
    fn test_unusable_timestamps() {
        for shape in [json!("last tuesday"), json!(true), json!(-5), json!({ "nanos": 3 })] {
            assert_eq!(created_at(&doc(json!({ "createdAt": shape }))), None);
        }
    }

    #[test]
    fn test_epoch_and_earlier_unusable_in_every_shape() {
        let shapes = [
            json!(0),
            json!(-5),
            json!("1970-01-01T00:00:00Z"),
            json!("1969-07-20T20:17:40Z"),
            json!({ "seconds": -1, "nanoseconds": 0 }),
            json!({ "_seconds": 0, "_nanoseconds": 0 }),
        ];

        for shape in shapes {
            let parsed = created_at(&doc(json!({ "createdAt": shape.clone() })));
            assert_eq!(parsed, None, "shape {}", shape);
        }

        let just_after = created_at(&doc(json!({ "createdAt": "1970-01-01T00:00:00.001Z" })));
        assert_eq!(just_after.map(|t| t.timestamp_millis()), Some(1));
    }

    #[test]
    fn test_timestamp_truncated_to_millis() {
        let parsed = created_at(&doc(json!({ "createdAt": "2024-05-01T08:30:00.123456789Z" })))
            .unwrap();
        assert_eq!(parsed.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_media_priority_first_source_wins() {
        let record = normalize(&doc(json!({
            "authorId": "u1",
            "createdAt": 1_000,
            "mediaUrls": ["https://cdn/a.jpg", "https://cdn/b.jpg"],
            "finalMediaUrl": "https://cdn/final.jpg",
            "imageUrl": "https://cdn/legacy.jpg"
        })))
        .unwrap();
        assert_eq!(record.media_urls, vec!["https://cdn/a.jpg", "https://cdn/b.jpg"]);
    }

    #[test]
    fn test_media_falls_through_empty_sources() {
        let urls = media_urls(&doc(json!({
            "mediaUrls": [],
            "finalMediaUrl": "",
            "mediaItems": [{ "url": "https://cdn/1.jpg", "type": "image" }, { "uri": "https://cdn/2.mp4" }],
            "imageUrl": "https://cdn/legacy.jpg"
        })))
        .unwrap();
        assert_eq!(urls, vec!["https://cdn/1.jpg", "https://cdn/2.mp4"]);

        let urls = media_urls(&doc(json!({ "image": "https://cdn/old.jpg" }))).unwrap();
        assert_eq!(urls, vec!["https://cdn/old.jpg"]);

        let urls = media_urls(&doc(json!({ "finalMediaUrl": "https://cdn/final.jpg" }))).unwrap();
        assert_eq!(urls, vec!["https://cdn/final.jpg"]);
    }

    #[test]
    fn test_no_media_is_empty_list() {
        assert!(media_urls(&doc(json!({}))).unwrap().is_empty());
    }

    #[test]
    fn test_unrecognized_media_shape() {
        assert_eq!(
            media_urls(&doc(json!({ "mediaUrls": "https://cdn/a.jpg" }))),
            Err(NormalizeError::UnrecognizedMedia("mediaUrls"))
        );
        assert_eq!(
            media_urls(&doc(json!({ "media": [{ "width": 10 }] }))),
            Err(NormalizeError::UnrecognizedMedia("media"))
        );
        assert_eq!(
            media_urls(&doc(json!({ "imageUrl": 42 }))),
            Err(NormalizeError::UnrecognizedMedia("imageUrl"))
        );
    }

    #[test]
    fn test_counts_and_display_fields() {
        let record = normalize(&doc(json!({
            "uid": "u3",
            "createdAt": 1_000,
            "likesCount": 7,
            "commentCount": -2,
            "text": "hello",
            "location": { "name": "Lisbon" }
        })))
        .unwrap();

        assert_eq!(record.like_count, 7);
        assert_eq!(record.comment_count, 0);
        assert_eq!(record.caption.as_deref(), Some("hello"));
        assert_eq!(record.location.as_deref(), Some("Lisbon"));
    }
}
