//! Background prefetch scheduler.
//!
//! Fire-and-forget: the caller hands over a queue list and moves on. The
//! spawned task paces itself rather than looping forever: it walks the
//! given ids once, then ends.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ytm_resolver::{
//!     config::ResolverConfig,
//!     format::Quality,
//!     kv::{InMemoryKv, InMemoryStreamStore, UnimplementedBrowser},
//!     prefetch::Prefetcher,
//!     resolver::StreamResolver,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = Arc::new(StreamResolver::new(
//!     ResolverConfig::default(),
//!     Arc::new(InMemoryKv::default()),
//!     Arc::new(InMemoryStreamStore::default()),
//!     Arc::new(UnimplementedBrowser),
//! )?);
//! let prefetcher = Prefetcher::new(resolver);
//! prefetcher.prefetch(vec!["dQw4w9WgXcQ".to_owned()], Quality::High, false);
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use crate::{format::Quality, resolver::StreamResolver};

/// Resolves are paced 50ms apart for the first few queue entries, then
/// 150ms apart, so a long queue scroll doesn't saturate the throttle the
/// foreground resolve is also waiting on.
const FAST_LANE_COUNT: usize = 3;
const FAST_LANE_DELAY: Duration = Duration::from_millis(50);
const SLOW_LANE_DELAY: Duration = Duration::from_millis(150);

/// Schedules low-priority background resolves for a queue of upcoming
/// videos, so playback advances into an already-warm cache.
pub struct Prefetcher {
    resolver: Arc<StreamResolver>,
}

impl Prefetcher {
    /// Builds a prefetcher over a shared resolver.
    #[must_use]
    pub fn new(resolver: Arc<StreamResolver>) -> Self {
        Self { resolver }
    }

    /// Spawns a background task that resolves `video_ids` in order, skipping
    /// any already cached, and swallowing every failure: prefetching is
    /// advisory and must never surface an error to the caller.
    pub fn prefetch(&self, video_ids: Vec<String>, quality: Quality, metered: bool) {
        let resolver = Arc::clone(&self.resolver);
        tokio::spawn(async move {
            run(&resolver, &video_ids, quality, metered).await;
        });
    }
}

async fn run(resolver: &StreamResolver, video_ids: &[String], quality: Quality, metered: bool) {
    if video_ids.is_empty() {
        return;
    }

    // Yield once up front so prefetch never delays the task that spawned it.
    tokio::task::yield_now().await;
    resolver.warm_tokens().await;

    for (index, video_id) in video_ids.iter().enumerate() {
        match resolver.is_cached(video_id).await {
            Ok(true) => {
                debug!("prefetch: {video_id} already cached, skipping");
                continue;
            }
            Ok(false) => {}
            Err(e) => debug!("prefetch: cache lookup failed for {video_id}: {e}"),
        }

        if let Err(e) = resolver.resolve_stream(video_id, None, quality, metered).await {
            debug!("prefetch: resolve failed for {video_id}: {e}");
        }

        tokio::time::sleep(lane_delay(index)).await;
    }
}

/// 50ms for the first few queue entries, 150ms after.
fn lane_delay(index: usize) -> Duration {
    if index < FAST_LANE_COUNT {
        FAST_LANE_DELAY
    } else {
        SLOW_LANE_DELAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ResolverConfig,
        kv::{InMemoryKv, InMemoryStreamStore, UnimplementedBrowser},
    };

    fn test_resolver() -> Arc<StreamResolver> {
        Arc::new(
            StreamResolver::new(
                ResolverConfig::default(),
                Arc::new(InMemoryKv::default()),
                Arc::new(InMemoryStreamStore::default()),
                Arc::new(UnimplementedBrowser),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn empty_queue_resolves_nothing_and_returns_immediately() {
        let resolver = test_resolver();
        run(&resolver, &[], Quality::High, false).await;
    }

    #[test]
    fn lane_delay_switches_after_fast_lane_count() {
        assert_eq!(lane_delay(0), FAST_LANE_DELAY);
        assert_eq!(lane_delay(FAST_LANE_COUNT - 1), FAST_LANE_DELAY);
        assert_eq!(lane_delay(FAST_LANE_COUNT), SLOW_LANE_DELAY);
        assert_eq!(lane_delay(FAST_LANE_COUNT + 5), SLOW_LANE_DELAY);
    }

    #[tokio::test]
    async fn uncached_video_is_reported_as_not_cached() {
        let resolver = test_resolver();
        assert!(!resolver.is_cached("unseen-video").await.unwrap());
    }
}
