//! Feed pipeline stages
//!
//! follow_set → fetcher → assembler, composed by [`FeedPipeline`] and driven
//! per viewer by [`FeedSession`].

pub mod assembler;
pub mod fetcher;
pub mod follow_set;
pub mod normalize;
pub mod pipeline;
pub mod session;

pub use assembler::FeedAssembler;
pub use fetcher::{ChunkedFeedFetcher, FetchResult};
pub use follow_set::FollowSetResolver;
pub use normalize::NormalizeError;
pub use pipeline::FeedPipeline;
pub use session::{FeedSession, LoadOutcome, LoadPhase, SubscriptionHandle};
