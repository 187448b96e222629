//! Per-viewer feed session: the pagination state machine around the pipeline.
//!
//! ```text
//! idle ──load_initial──▶ loading-initial ──▶ ready
//! ready ──load_more────▶ loading-more ─────▶ ready
//! ready ──refresh──────▶ refreshing ───────▶ ready
//! ```
//!
//! Only one load runs at a time; a load requested while another is in flight
//! is ignored, never queued. When the following set changes mid-flight the
//! fetched page is discarded and the load restarts from the new set.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::assembler::FeedAssembler;
use super::fetcher::ChunkedFeedFetcher;
use super::follow_set::FollowSetResolver;
use crate::error::Result;
use crate::models::{FeedCursor, FeedPage, FollowingSet, PostRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    LoadingInitial,
    Ready,
    LoadingMore,
    Refreshing,
}

impl LoadPhase {
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            LoadPhase::LoadingInitial | LoadPhase::LoadingMore | LoadPhase::Refreshing
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The session now holds this feed (all loaded items, newest first).
    Updated(FeedPage),
    /// Another load was in flight, or the request is not valid in the current phase.
    Ignored,
    /// `load_more` with nothing left to load.
    Exhausted,
    /// The following set kept changing and every restart was discarded.
    Superseded,
}

struct SessionState {
    phase: LoadPhase,
    items: Vec<PostRecord>,
    cursor: Option<FeedCursor>,
    has_more: bool,
}

impl SessionState {
    fn snapshot(&self) -> FeedPage {
        FeedPage {
            items: self.items.clone(),
            continuation_cursor: self.cursor.clone(),
            has_more: self.has_more,
        }
    }
}

struct CachedFollowing {
    generation: u64,
    following: FollowingSet,
}

/// Restores the previous phase if a load ends without committing, including
/// when its future is dropped mid-flight.
struct PhaseGuard<'a> {
    session: &'a FeedSession,
    restore: LoadPhase,
    committed: bool,
}

impl PhaseGuard<'_> {
    fn commit(mut self, update: impl FnOnce(&mut SessionState)) -> FeedPage {
        let mut state = self.session.state.lock();
        update(&mut state);
        state.phase = LoadPhase::Ready;
        self.committed = true;
        state.snapshot()
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.session.state.lock().phase = self.restore;
        }
    }
}

pub struct FeedSession {
    viewer_id: String,
    resolver: Arc<FollowSetResolver>,
    fetcher: Arc<ChunkedFeedFetcher>,
    assembler: FeedAssembler,
    page_size: usize,
    max_restarts: u32,
    state: Mutex<SessionState>,
    generation: AtomicU64,
    following: Mutex<Option<CachedFollowing>>,
}

impl FeedSession {
    pub fn new(
        viewer_id: impl Into<String>,
        resolver: Arc<FollowSetResolver>,
        fetcher: Arc<ChunkedFeedFetcher>,
        page_size: usize,
        max_restarts: u32,
    ) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            resolver,
            fetcher,
            assembler: FeedAssembler::new(),
            page_size: page_size.max(1),
            max_restarts,
            state: Mutex::new(SessionState {
                phase: LoadPhase::Idle,
                items: Vec::new(),
                cursor: None,
                has_more: false,
            }),
            generation: AtomicU64::new(0),
            following: Mutex::new(None),
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn phase(&self) -> LoadPhase {
        self.state.lock().phase
    }

    pub fn snapshot(&self) -> FeedPage {
        self.state.lock().snapshot()
    }

    /// Bumped every time the following set is known to have changed.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Mark the held following set stale. Any load in flight will discard its
    /// result and restart.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.following.lock().take();
        debug!(viewer_id = %self.viewer_id, generation, "Following set invalidated");
    }

    /// `idle → loading-initial → ready`
    pub async fn load_initial(&self) -> LoadOutcome {
        let Some(guard) = self.transition(LoadPhase::Idle, LoadPhase::LoadingInitial) else {
            return LoadOutcome::Ignored;
        };

        match self.compute_page(None).await {
            Some((page, _)) => LoadOutcome::Updated(guard.commit(|state| replace(state, page))),
            None => LoadOutcome::Superseded,
        }
    }

    /// `ready → loading-more → ready`; new items are appended after the
    /// existing ones and the whole list is re-deduplicated.
    pub async fn load_more(&self) -> LoadOutcome {
        let (guard, cursor) = {
            let mut state = self.state.lock();
            if state.phase != LoadPhase::Ready {
                debug!(viewer_id = %self.viewer_id, phase = ?state.phase, "Ignoring load_more");
                return LoadOutcome::Ignored;
            }
            let cursor = match (&state.cursor, state.has_more) {
                (Some(cursor), true) => cursor.clone(),
                _ => return LoadOutcome::Exhausted,
            };
            state.phase = LoadPhase::LoadingMore;
            (
                PhaseGuard {
                    session: self,
                    restore: LoadPhase::Ready,
                    committed: false,
                },
                cursor,
            )
        };

        match self.compute_page(Some(cursor)).await {
            // The following set changed underneath us; the old cursor means nothing now
            Some((page, true)) => LoadOutcome::Updated(guard.commit(|state| replace(state, page))),
            Some((page, false)) => {
                let assembler = self.assembler;
                LoadOutcome::Updated(guard.commit(|state| {
                    let existing = std::mem::take(&mut state.items);
                    state.items = assembler.merge(existing, page.items);
                    state.cursor = page.continuation_cursor;
                    state.has_more = page.has_more;
                }))
            }
            None => LoadOutcome::Superseded,
        }
    }

    /// `ready → refreshing → ready`; re-resolves the following set and
    /// replaces everything loaded so far.
    pub async fn refresh(&self) -> LoadOutcome {
        let Some(guard) = self.transition(LoadPhase::Ready, LoadPhase::Refreshing) else {
            return LoadOutcome::Ignored;
        };

        self.following.lock().take();
        match self.compute_page(None).await {
            Some((page, _)) => LoadOutcome::Updated(guard.commit(|state| replace(state, page))),
            None => LoadOutcome::Superseded,
        }
    }

    /// Subscribe to following-set changes; every change invalidates this
    /// session. The subscription ends when the handle is cancelled or
    /// dropped, or when the session itself is dropped.
    pub async fn watch(self: &Arc<Self>) -> Result<SubscriptionHandle> {
        let mut changes = self.resolver.watch(&self.viewer_id).await?;
        let session = Arc::downgrade(self);
        let viewer_id = self.viewer_id.clone();

        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                debug!(viewer_id = %viewer_id, ?change, "Following set changed");
                session.invalidate();
            }
            debug!(viewer_id = %viewer_id, "Following watch ended");
        });

        Ok(SubscriptionHandle { task })
    }

    fn transition(&self, from: LoadPhase, to: LoadPhase) -> Option<PhaseGuard<'_>> {
        let mut state = self.state.lock();
        if state.phase != from {
            debug!(
                viewer_id = %self.viewer_id,
                phase = ?state.phase,
                requested = ?to,
                "Ignoring load request"
            );
            return None;
        }
        state.phase = to;
        Some(PhaseGuard {
            session: self,
            restore: from,
            committed: false,
        })
    }

    /// Resolve → fetch → assemble, restarting whenever the following set
    /// changes before the fetch completes. The flag reports whether a
    /// restart happened.
    async fn compute_page(&self, cursor: Option<FeedCursor>) -> Option<(FeedPage, bool)> {
        let mut cursor = cursor;
        let mut restarted = false;

        for attempt in 0..=self.max_restarts {
            let generation = self.generation();
            let following = self.following_snapshot(generation).await;
            let fetched = self
                .fetcher
                .fetch_page(&following, cursor.as_ref(), self.page_size)
                .await;

            if self.generation() != generation {
                info!(
                    viewer_id = %self.viewer_id,
                    attempt,
                    "Following set changed mid-flight, discarding fetched page"
                );
                cursor = None;
                restarted = true;
                continue;
            }

            return Some((self.assembler.assemble_fetch(fetched, self.page_size), restarted));
        }

        warn!(
            viewer_id = %self.viewer_id,
            restarts = self.max_restarts,
            "Following set kept changing, giving up on this load"
        );
        None
    }

    async fn following_snapshot(&self, generation: u64) -> FollowingSet {
        let cached = self
            .following
            .lock()
            .as_ref()
            .filter(|cached| cached.generation == generation)
            .map(|cached| cached.following.clone());
        if let Some(following) = cached {
            return following;
        }

        let following = self.resolver.resolve(&self.viewer_id).await;
        *self.following.lock() = Some(CachedFollowing {
            generation,
            following: following.clone(),
        });
        following
    }
}

fn replace(state: &mut SessionState, page: FeedPage) {
    state.items = page.items;
    state.cursor = page.continuation_cursor;
    state.has_more = page.has_more;
}

/// Cancellation handle for [`FeedSession::watch`].
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
