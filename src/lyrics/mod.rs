//! Lyrics provider race, scoring, and cache.
//!
//! Two providers only — `LRCLib` and `Genius` — so this models them as a
//! small trait with two concrete types rather than a registry. Both are
//! queried with [`tokio::join!`] on a cache miss, then reconciled once
//! both complete.

mod genius;
mod lrc;
mod lrclib;

use std::{sync::Arc, time::SystemTime};

use async_trait::async_trait;

pub use genius::GeniusProvider;
pub use lrclib::LrcLibProvider;

use crate::{
    config::ResolverConfig,
    error::{Error, Result},
    http::Transport,
    kv::KvStore,
    types::{LyricsRecord, SyncedLine},
};

/// A lyrics search request: the fields a provider needs to find and score
/// candidates.
#[derive(Clone, Debug)]
pub struct LyricsQuery {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: u64,
}

/// What one provider found for a [`LyricsQuery`], before scoring.
#[derive(Clone, Debug, Default)]
pub struct ProviderLyrics {
    pub synced: Option<Vec<SyncedLine>>,
    pub plain_text: Option<String>,
}

impl ProviderLyrics {
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.synced.as_ref().is_some_and(|lines| !lines.is_empty())
    }

    #[must_use]
    pub fn has_plain(&self) -> bool {
        self.plain_text.as_ref().is_some_and(|text| !text.is_empty())
    }
}

/// A lyrics source queryable by [`LyricsQuery`] (, §9: "closed
/// variant or a small trait with two concrete types").
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Name recorded on [`LyricsRecord::provider`] and used in scoring.
    fn name(&self) -> &'static str;

    /// Finds the best matching lyrics for `query`, or `Ok(None)` if nothing
    /// suitable was found (not an error: a clean miss is routine).
    async fn search(&self, transport: &Transport, query: &LyricsQuery) -> Result<Option<ProviderLyrics>>;
}

/// Lifecycle state a provider's search is in, for scoring purposes:
/// `done`/`fetching`/`error`/unknown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderStatus {
    Fetching,
    Done,
    Error,
    Unknown,
}

impl ProviderStatus {
    fn weight(self) -> i32 {
        match self {
            Self::Done => 1,
            Self::Fetching => -1,
            Self::Error => -2,
            Self::Unknown => -10,
        }
    }
}

/// One provider's offering, as the auto-selector sees it.
#[derive(Clone, Debug)]
pub struct ProviderResult {
    pub provider: &'static str,
    pub status: ProviderStatus,
    pub lyrics: Option<ProviderLyrics>,
}

/// Scores a candidate 's bias table: provider lifecycle state,
/// plus bonuses for having synced lyrics, plain lyrics, or being LRCLib with
/// synced lyrics.
#[must_use]
fn score(candidate: &ProviderResult) -> i32 {
    let mut total = candidate.status.weight();
    if let Some(lyrics) = &candidate.lyrics {
        if lyrics.has_synced() {
            total += 3;
            if candidate.provider == LrcLibProvider::NAME {
                total += 1;
            }
        } else if lyrics.has_plain() {
            total += 1;
        }
    }
    total
}

/// Tracks the active lyrics selection across provider completions for one
/// track, re-scoring as results arrive unless the user has pinned one.
#[derive(Default)]
pub struct LyricsSelector {
    active: Option<ProviderResult>,
    pinned: bool,
}

impl LyricsSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a fresh result for re-evaluation. A no-op once [`Self::pin`]
    /// has been called for this track.
    pub fn offer(&mut self, candidate: ProviderResult) {
        if self.pinned {
            return;
        }
        let replace = match &self.active {
            None => true,
            Some(current) => score(&candidate) > score(current),
        };
        if replace {
            self.active = Some(candidate);
        }
    }

    /// Records a manual switch, making it sticky: no later [`Self::offer`]
    /// will override it ("unless the user has manually
    /// switched").
    pub fn pin(&mut self, provider: ProviderResult) {
        self.active = Some(provider);
        self.pinned = true;
    }

    #[must_use]
    pub fn active(&self) -> Option<&ProviderResult> {
        self.active.as_ref()
    }
}

/// Resolves and caches lyrics, racing [`LrcLibProvider`] and
/// [`GeniusProvider`] on every cache miss.
pub struct LyricsResolver {
    transport: Transport,
    cache: Arc<dyn KvStore>,
    lrclib: LrcLibProvider,
    genius: GeniusProvider,
}

/// Prefix namespacing lyrics entries within the shared [`KvStore`], away
/// from [`crate::token`]'s own keys.
const CACHE_KEY_PREFIX: &str = "lyrics:";

impl LyricsResolver {
    /// Builds a resolver backed by a host-provided [`KvStore`] for the
    /// 7-day lyrics cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ResolverConfig, cache: Arc<dyn KvStore>) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(config)?,
            cache,
            lrclib: LrcLibProvider::new(),
            genius: GeniusProvider::new(),
        })
    }

    /// Resolves lyrics for one track, serving a fresh cache entry directly
    /// and otherwise racing both providers.
    ///
    /// # Errors
    ///
    /// Returns an error if neither provider found anything suitable.
    pub async fn resolve_lyrics(
        &self,
        track_id: &str,
        title: &str,
        artist: &str,
        album: Option<&str>,
        duration_seconds: u64,
    ) -> Result<LyricsRecord> {
        if let Some(cached) = self.cache_get(track_id).await? {
            if cached.is_valid_at(SystemTime::now()) {
                return Ok(cached);
            }
        }

        let query = LyricsQuery {
            title: title.to_owned(),
            artist: artist.to_owned(),
            album: album.map(str::to_owned),
            duration_seconds,
        };

        let (lrclib_result, genius_result) =
            tokio::join!(self.lrclib.search(&self.transport, &query), self.genius.search(&self.transport, &query));

        let mut selector = LyricsSelector::new();
        selector.offer(to_provider_result(self.lrclib.name(), lrclib_result));
        selector.offer(to_provider_result(self.genius.name(), genius_result));

        let Some(active) = selector.active().cloned() else {
            return Err(Error::not_found("no lyrics provider returned a candidate"));
        };
        let Some(lyrics) = active.lyrics else {
            return Err(Error::not_found("no provider found matching lyrics"));
        };

        let record = LyricsRecord {
            track_id: track_id.to_owned(),
            title: title.to_owned(),
            artist: artist.to_owned(),
            synced: lyrics.synced,
            plain_text: lyrics.plain_text,
            provider: active.provider.to_owned(),
            fetched_at: SystemTime::now(),
        };

        self.cache_put(&record).await?;
        Ok(record)
    }

    async fn cache_get(&self, track_id: &str) -> Result<Option<LyricsRecord>> {
        let Some(raw) = self.cache.get(&cache_key(track_id)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_slice(&raw).ok())
    }

    async fn cache_put(&self, record: &LyricsRecord) -> Result<()> {
        let encoded = serde_json::to_vec(record)?;
        self.cache.set(&cache_key(record.track_id.as_str()), encoded).await
    }
}

fn cache_key(track_id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{track_id}")
}

/// Converts one provider's outcome into a scoreable [`ProviderResult`]. A
/// clean miss (`Ok(None)`) and an actual error are both treated as `Error`
/// for scoring purposes: neither contributes a usable candidate.
fn to_provider_result(name: &'static str, outcome: Result<Option<ProviderLyrics>>) -> ProviderResult {
    match outcome {
        Ok(Some(lyrics)) => ProviderResult { provider: name, status: ProviderStatus::Done, lyrics: Some(lyrics) },
        Ok(None) => ProviderResult { provider: name, status: ProviderStatus::Error, lyrics: None },
        Err(e) => {
            debug!("lyrics provider {name} failed: {e}");
            ProviderResult { provider: name, status: ProviderStatus::Error, lyrics: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done_with(provider: &'static str, lyrics: ProviderLyrics) -> ProviderResult {
        ProviderResult { provider, status: ProviderStatus::Done, lyrics: Some(lyrics) }
    }

    #[test]
    fn synced_candidate_outscores_plain_only() {
        let synced = ProviderLyrics { synced: Some(vec![SyncedLine { time_ms: 0, text: "a".into() }]), plain_text: None };
        let plain = ProviderLyrics { synced: None, plain_text: Some("a".into()) };
        assert!(score(&done_with("LRCLib", synced)) > score(&done_with("Genius", plain)));
    }

    #[test]
    fn lrclib_synced_scores_higher_than_genius_synced() {
        let lyrics = || ProviderLyrics { synced: Some(vec![SyncedLine { time_ms: 0, text: "a".into() }]), plain_text: None };
        assert!(score(&done_with("LRCLib", lyrics())) > score(&done_with("Genius", lyrics())));
    }

    #[test]
    fn selector_switches_when_a_better_result_completes() {
        let mut selector = LyricsSelector::new();
        let plain = ProviderLyrics { synced: None, plain_text: Some("a".into()) };
        selector.offer(done_with("Genius", plain));
        assert_eq!(selector.active().unwrap().provider, "Genius");

        let synced = ProviderLyrics { synced: Some(vec![SyncedLine { time_ms: 0, text: "a".into() }]), plain_text: None };
        selector.offer(done_with("LRCLib", synced));
        assert_eq!(selector.active().unwrap().provider, "LRCLib");
    }

    #[test]
    fn pinned_selection_ignores_later_offers() {
        let mut selector = LyricsSelector::new();
        let plain = ProviderLyrics { synced: None, plain_text: Some("a".into()) };
        selector.pin(done_with("Genius", plain));

        let synced = ProviderLyrics { synced: Some(vec![SyncedLine { time_ms: 0, text: "a".into() }]), plain_text: None };
        selector.offer(done_with("LRCLib", synced));
        assert_eq!(selector.active().unwrap().provider, "Genius");
    }

    #[test]
    fn fetching_result_loses_to_an_already_done_one() {
        let mut selector = LyricsSelector::new();
        let plain = ProviderLyrics { synced: None, plain_text: Some("a".into()) };
        selector.offer(done_with("Genius", plain));
        selector.offer(ProviderResult { provider: "LRCLib", status: ProviderStatus::Fetching, lyrics: None });
        assert_eq!(selector.active().unwrap().provider, "Genius");
    }
}
