//! Audio stream and lyrics resolution core for a YouTube Music client.
//!
//! **ytm-resolver** is the hard part of a mobile music client: given an
//! opaque video id, it produces a short-lived, directly playable audio
//! stream URL, fighting the remote service's anti-automation defenses along
//! the way. It also resolves synced/plain lyrics from a pair of external
//! providers. Everything else a client needs — playback, UI, library
//! browsing, queue persistence — lives outside this crate.
//!
//! # Architecture
//!
//! * **Identity & transport**
//!   - [`profile`]: the impersonated client personalities
//!   - [`http`]: rate-limited HTTPS transport to the player endpoint
//! * **Anti-automation**
//!   - [`cipher`]: signature cipher extraction and decoding
//!   - [`token`]: origin ("PoToken") lifecycle management
//! * **Selection & caching**
//!   - [`format`]: audio-only variant ranking
//!   - [`cache`]: memory + persistent stream cache with analytics
//!   - [`throttle`]: per-profile spacing, backoff, and circuit-open
//! * **Orchestration**
//!   - [`resolver`]: the stream resolution pipeline
//!   - [`prefetch`]: background prefetch scheduler
//!   - [`lyrics`]: lyrics provider race, scoring, and cache
//! * **Foundations**
//!   - [`error`]: error types
//!   - [`config`]: resolver configuration
//!   - [`kv`]: host-provided storage interfaces
//!   - [`protocol`]: wire types for the player RPC
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ytm_resolver::{
//!     config::ResolverConfig,
//!     format::Quality,
//!     kv::{InMemoryKv, InMemoryStreamStore, UnimplementedBrowser},
//!     resolver::StreamResolver,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ResolverConfig::default();
//! let resolver = StreamResolver::new(
//!     config,
//!     Arc::new(InMemoryKv::default()),
//!     Arc::new(InMemoryStreamStore::default()),
//!     Arc::new(UnimplementedBrowser),
//! )?;
//! let record = resolver.resolve_stream("dQw4w9WgXcQ", None, Quality::High, false).await?;
//! println!("resolved: {}", record.video_id);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod cache;
pub mod cipher;
pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod kv;
pub mod lyrics;
pub mod prefetch;
pub mod profile;
pub mod protocol;
pub mod resolver;
pub mod throttle;
pub mod token;
pub mod types;

pub use config::ResolverConfig;
pub use error::Failure;
pub use lyrics::LyricsResolver;
pub use prefetch::Prefetcher;
pub use resolver::StreamResolver;
pub use types::{CacheAnalyticsSnapshot, LyricsRecord, StreamRecord};

/// Commit hash and date this build was built from, stamped by `build.rs`.
///
/// Both are `None` when building outside a Git checkout (e.g. from a
/// packaged crates.io tarball), so a host app logging this at startup can
/// fall back to the crate version alone.
#[must_use]
pub fn build_info() -> (Option<&'static str>, Option<&'static str>) {
    (option_env!("YTM_RESOLVER_COMMIT_HASH"), option_env!("YTM_RESOLVER_COMMIT_DATE"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_does_not_panic_without_a_git_checkout() {
        let (hash, date) = build_info();
        assert!(hash.is_none() || !hash.unwrap().is_empty());
        assert!(date.is_none() || !date.unwrap().is_empty());
    }
}
