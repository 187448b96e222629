//! Following-feed aggregation.
//!
//! Builds a viewer's chronological feed from the posts of everyone they
//! follow, working around a document store that caps membership filters at
//! ten values: the following set is chunked, each chunk is queried on its
//! own, and the results are normalized, deduplicated and merged newest-first.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::FeedConfig;
pub use error::{FeedError, Result, StoreError};
pub use models::{EdgeChange, FeedCursor, FeedPage, FollowEdge, FollowingSet, PostRecord, RawDocument};
pub use services::{FeedPipeline, FeedSession, LoadOutcome, LoadPhase, SubscriptionHandle};
