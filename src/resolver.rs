//! The stream resolution pipeline: the orchestrator tying every other
//! component together behind one public entry point, rotating across
//! client profiles on failure.
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
//! let resolver = StreamResolver::new(
//!     ResolverConfig::default(),
//!     Arc::new(InMemoryKv::default()),
//!     Arc::new(InMemoryStreamStore::default()),
//!     Arc::new(UnimplementedBrowser),
//! )?;
//! let record = resolver.resolve_stream("dQw4w9WgXcQ", None, Quality::High, false).await?;
//! println!("resolved: {}", record.video_id);
//! # Ok(())
//! # }
//! ```

use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    cache::StreamCache,
    cipher::Cipher,
    config::ResolverConfig,
    error::{Error, Failure, ResolveResult},
    format::{self, Quality},
    http::Transport,
    kv::{BrowserContext, KvStore, StreamStore},
    profile::{self, ClientProfile},
    protocol::player::{self as wire, PlayabilityStatus},
    throttle::ProfileThrottle,
    token::{OriginTokens, TokenManager},
    types::{AudioVariant, StreamRecord, Thumbnail, VideoDetails},
};

/// Fallback when neither the response nor the resolved URL carries an
/// expiry.
const DEFAULT_EXPIRES_IN_SECONDS: u64 = 21_600;

/// Substrings in a non-`OK` playability reason that indicate bot suspicion
/// rather than an intrinsic refusal.
const BOT_MARKERS: [&str; 4] = ["bot", "verification", "sign in", "confirm"];

/// Delay before retrying a profile once fresh tokens are generated
/// mid-resolve.
const BOT_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(1500);

/// Orchestrates audio stream resolution: cache, token lifecycle, client
/// profile fallback, signature decryption, and URL validation.
pub struct StreamResolver {
    config: ResolverConfig,
    transport: Transport,
    cipher: Cipher,
    tokens: TokenManager,
    cache: StreamCache,
    throttle: ProfileThrottle,
}

impl StreamResolver {
    /// Builds a resolver from configuration plus the host-provided storage
    /// and browser interfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        config: ResolverConfig,
        kv: std::sync::Arc<dyn KvStore>,
        stream_store: std::sync::Arc<dyn StreamStore>,
        browser: std::sync::Arc<dyn BrowserContext>,
    ) -> crate::error::Result<Self> {
        let transport = Transport::new(&config)?;
        Ok(Self {
            transport,
            cipher: Cipher::new(),
            tokens: TokenManager::new(kv, browser),
            cache: StreamCache::new(stream_store),
            throttle: ProfileThrottle::new(),
            config,
        })
    }

    /// Current cache analytics snapshot.
    #[must_use]
    pub fn cache_analytics(&self) -> crate::types::CacheAnalyticsSnapshot {
        self.cache.analytics_snapshot()
    }

    /// Removes every cached stream record.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent store clear fails.
    pub async fn clear_stream_cache(&self) -> crate::error::Result<()> {
        self.cache.clear_all().await
    }

    /// Removes one cached stream record.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent store delete fails.
    pub async fn clear_stream_cache_one(&self, video_id: &str) -> crate::error::Result<()> {
        self.cache.clear_one(video_id).await
    }

    /// Drops cached origin tokens, forcing regeneration on next use.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV deletes fail.
    pub async fn invalidate_tokens(&self) -> crate::error::Result<()> {
        self.tokens.invalidate().await
    }

    /// Resolves a playable audio stream for `video_id`, not
    /// cancelable. See [`Self::resolve_stream_cancelable`] for a version
    /// that is.
    ///
    /// # Errors
    ///
    /// Returns a [`Failure`] describing why no profile could serve the
    /// video.
    pub async fn resolve_stream(
        &self,
        video_id: &str,
        playlist_id: Option<&str>,
        quality: Quality,
        metered: bool,
    ) -> ResolveResult<StreamRecord> {
        self.resolve_stream_cancelable(video_id, playlist_id, quality, metered, &CancellationToken::new())
            .await
    }

    /// Resolves a playable audio stream, honoring `cancel` at every
    /// suspension point.
    ///
    /// A cache hit (memory or persistent) returns immediately without a
    /// fresh HEAD validation ("MUST NOT have been freshly
    /// HEAD-validated").
    ///
    /// # Errors
    ///
    /// Returns a [`Failure`] describing why no profile could serve the
    /// video.
    pub async fn resolve_stream_cancelable(
        &self,
        video_id: &str,
        playlist_id: Option<&str>,
        quality: Quality,
        metered: bool,
        cancel: &CancellationToken,
    ) -> ResolveResult<StreamRecord> {
        if let Some(record) = self.cache.get(video_id).await.map_err(cache_failure)? {
            return Ok(record);
        }
        self.cache.analytics().record_network_call();

        let record = self
            .resolve_network(video_id, playlist_id, quality, metered, false, cancel)
            .await?;
        self.cache.put(record.clone()).await.map_err(cache_failure)?;
        Ok(record)
    }

    /// Resolves a download-quality stream, bypassing the cache entirely and
    /// preferring Opus regardless of `metered`.
    ///
    /// # Errors
    ///
    /// Returns a [`Failure`] describing why no profile could serve the
    /// video.
    pub async fn resolve_download_stream(&self, video_id: &str, quality: Quality) -> ResolveResult<StreamRecord> {
        self.resolve_network(video_id, None, quality, false, true, &CancellationToken::new())
            .await
    }

    /// The profile fallback loop shared by playback and download resolution.
    async fn resolve_network(
        &self,
        video_id: &str,
        playlist_id: Option<&str>,
        quality: Quality,
        metered: bool,
        download: bool,
        cancel: &CancellationToken,
    ) -> ResolveResult<StreamRecord> {
        let mut tokens = self.ensure_tokens_ready().await?;

        let mut first_content_refused: Option<Failure> = None;
        let mut last_failure: Option<Failure> = None;

        'profiles: for &profile in profile::PLAYBACK_ORDER.iter() {
            if self.throttle.is_circuit_open(profile.name).await {
                continue;
            }

            self.throttle
                .wait(profile.name, cancel)
                .await
                .map_err(|e| Failure::Transient { profile: profile.name.as_str(), source: e })?;

            let (cipher_blob, sts) = if profile.supports_signature_cipher {
                match self.cipher.embed_info(&self.transport, &self.config.embed_probe_video_id).await {
                    Ok((blob_url, sts)) => (Some(blob_url), Some(sts)),
                    Err(e) => {
                        self.throttle.record_failure(profile.name).await;
                        note_failure(
                            Failure::Transient { profile: profile.name.as_str(), source: e },
                            &mut first_content_refused,
                            &mut last_failure,
                        );
                        continue 'profiles;
                    }
                }
            } else {
                (None, None)
            };

            let mut streaming_token = tokens.as_ref().and_then(|t| t.streaming_token.clone());
            let mut visitor_id = tokens.as_ref().and_then(|t| t.visitor_id.clone());

            let mut response = match self
                .transport
                .player(profile, video_id, playlist_id, sts, streaming_token.as_deref(), visitor_id.as_deref())
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    self.throttle.record_failure(profile.name).await;
                    note_failure(
                        Failure::Transient { profile: profile.name.as_str(), source: e },
                        &mut first_content_refused,
                        &mut last_failure,
                    );
                    continue 'profiles;
                }
            };
            match classify_playability(&response.playability_status) {
                PlayabilityOutcome::Ok => {}
                PlayabilityOutcome::NeedsOriginToken(_) if tokens.is_none() => {
                    let fresh = match self.tokens.generate().await {
                        Ok(fresh) => fresh,
                        Err(_) => {
                            self.throttle.record_failure(profile.name).await;
                            note_failure(
                                Failure::NeedsOriginToken { profile: profile.name.as_str() },
                                &mut first_content_refused,
                                &mut last_failure,
                            );
                            continue 'profiles;
                        }
                    };
                    streaming_token = fresh.streaming_token.clone();
                    visitor_id = fresh.visitor_id.clone();
                    tokens = Some(fresh);

                    if sleep_cancelable(BOT_RETRY_DELAY, cancel).await.is_err() {
                        return Err(Failure::Transient {
                            profile: profile.name.as_str(),
                            source: Error::cancelled("resolve cancelled during bot-retry wait"),
                        });
                    }

                    let retried = self
                        .transport
                        .player(profile, video_id, playlist_id, sts, streaming_token.as_deref(), visitor_id.as_deref())
                        .await;
                    match retried {
                        Ok(retried) if matches!(classify_playability(&retried.playability_status), PlayabilityOutcome::Ok) => {
                            response = retried;
                        }
                        Ok(retried) => {
                            self.throttle.record_failure(profile.name).await;
                            let reason = match classify_playability(&retried.playability_status) {
                                PlayabilityOutcome::Refused(reason) => Failure::ContentRefused {
                                    profile: profile.name.as_str(),
                                    reason,
                                },
                                _ => Failure::NeedsOriginToken { profile: profile.name.as_str() },
                            };
                            note_failure(reason, &mut first_content_refused, &mut last_failure);
                            continue 'profiles;
                        }
                        Err(e) => {
                            self.throttle.record_failure(profile.name).await;
                            note_failure(
                                Failure::Transient { profile: profile.name.as_str(), source: e },
                                &mut first_content_refused,
                                &mut last_failure,
                            );
                            continue 'profiles;
                        }
                    }
                }
                PlayabilityOutcome::NeedsOriginToken(_) => {
                    self.throttle.record_failure(profile.name).await;
                    note_failure(
                        Failure::NeedsOriginToken { profile: profile.name.as_str() },
                        &mut first_content_refused,
                        &mut last_failure,
                    );
                    continue 'profiles;
                }
                PlayabilityOutcome::Refused(reason) => {
                    self.throttle.record_failure(profile.name).await;
                    note_failure(
                        Failure::ContentRefused { profile: profile.name.as_str(), reason },
                        &mut first_content_refused,
                        &mut last_failure,
                    );
                    continue 'profiles;
                }
            }

            let Some(streaming_data) = response.streaming_data.as_ref() else {
                self.throttle.record_failure(profile.name).await;
                note_failure(
                    Failure::Transient {
                        profile: profile.name.as_str(),
                        source: Error::not_found("OK response carried no streamingData"),
                    },
                    &mut first_content_refused,
                    &mut last_failure,
                );
                continue 'profiles;
            };

            let selected = if download {
                format::select_download(&streaming_data.adaptive_formats, quality)
            } else {
                format::select(&streaming_data.adaptive_formats, quality, metered)
            };
            let Some(variant) = selected else {
                self.throttle.record_failure(profile.name).await;
                note_failure(
                    Failure::NoSuitableFormat { profile: profile.name.as_str() },
                    &mut first_content_refused,
                    &mut last_failure,
                );
                continue 'profiles;
            };

            let final_url = match self.finalize_url(profile, &variant, cipher_blob.as_ref(), streaming_token.as_deref()).await {
                Ok(url) => url,
                Err(e) => {
                    self.throttle.record_failure(profile.name).await;
                    note_failure(
                        Failure::Transient { profile: profile.name.as_str(), source: e },
                        &mut first_content_refused,
                        &mut last_failure,
                    );
                    continue 'profiles;
                }
            };

            match self.transport.validate_stream_url(&final_url, visitor_id.as_deref()).await {
                Ok(true) => {}
                Ok(false) => {
                    self.throttle.record_failure(profile.name).await;
                    note_failure(
                        Failure::Transient { profile: profile.name.as_str(), source: Error::unavailable("HEAD probe refused") },
                        &mut first_content_refused,
                        &mut last_failure,
                    );
                    continue 'profiles;
                }
                Err(e) => {
                    self.throttle.record_failure(profile.name).await;
                    note_failure(
                        Failure::Transient { profile: profile.name.as_str(), source: e },
                        &mut first_content_refused,
                        &mut last_failure,
                    );
                    continue 'profiles;
                }
            }

            self.throttle.record_success(profile.name).await;

            let record = StreamRecord {
                video_id: video_id.to_owned(),
                expires_in_seconds: expires_in_from_url(&final_url),
                fetched_at: SystemTime::now(),
                variant: AudioVariant {
                    url: final_url.clone(),
                    signature: None,
                    signature_param: None,
                    ..variant
                },
                url: final_url,
                loudness_db: loudness_db(response.player_config.as_ref()),
                video_details: response.video_details.as_ref().map(map_video_details),
                telemetry_urls: telemetry_urls(response.playback_tracking.as_ref()),
            };
            return Ok(record);
        }

        Err(first_content_refused.or(last_failure).unwrap_or_else(|| Failure::ContentRefused {
            profile: "none",
            reason: "Could not get playback URL".to_owned(),
        }))
    }

    /// Resolves `variant`'s final, directly fetchable URL: decrypting the
    /// signature cipher if present, then appending the origin token if
    /// `profile` requires one.
    async fn finalize_url(
        &self,
        profile: &ClientProfile,
        variant: &AudioVariant,
        cipher_blob: Option<&Url>,
        streaming_token: Option<&str>,
    ) -> crate::error::Result<Url> {
        let mut url = variant.url.clone();

        if let Some(signature) = &variant.signature {
            let blob_url = cipher_blob.ok_or_else(|| Error::internal("ciphered variant with no player blob"))?;
            let steps = self.cipher.steps_for(&self.transport, blob_url).await?;
            let decoded = steps.apply(signature);
            let param = variant.signature_param.as_deref().unwrap_or("sig");
            url.query_pairs_mut().append_pair(param, &decoded);
        }

        if profile.needs_origin_token {
            if let Some(token) = streaming_token {
                url.query_pairs_mut().append_pair("pot", token);
            }
        }

        Ok(url)
    }

    /// Loads persisted tokens, or generates them upfront if none are valid
    ///. Generation failure is swallowed: "proceeding
    /// without tokens is permitted".
    async fn ensure_tokens_ready(&self) -> ResolveResult<Option<OriginTokens>> {
        self.tokens.ensure_loaded().await.map_err(token_failure)?;
        match self.tokens.snapshot().await.map_err(token_failure)? {
            Some(tokens) => Ok(Some(tokens)),
            None => Ok(self.tokens.generate().await.ok()),
        }
    }

    /// Whether a valid record is already cached for `video_id`, without
    /// counting towards the hit/miss analytics (used by [`crate::prefetch`]
    /// to decide whether a video needs resolving at all).
    pub(crate) async fn is_cached(&self, video_id: &str) -> crate::error::Result<bool> {
        self.cache.contains_valid(video_id).await
    }

    /// Ensures origin tokens are loaded or generated, swallowing failure
    /// (used by [`crate::prefetch`] to warm tokens before the first resolve).
    pub(crate) async fn warm_tokens(&self) {
        let _ = self.ensure_tokens_ready().await;
    }
}

fn cache_failure(e: Error) -> Failure {
    Failure::Transient { profile: "cache", source: e }
}

fn token_failure(e: Error) -> Failure {
    Failure::Transient { profile: "tokens", source: e }
}

/// Sleeps for `duration`, aborting early if `cancel` fires.
async fn sleep_cancelable(duration: std::time::Duration, cancel: &CancellationToken) -> Result<(), ()> {
    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = cancel.cancelled() => Err(()),
    }
}

/// The three outcomes a non-cache-hit playability status reduces to.
enum PlayabilityOutcome {
    Ok,
    NeedsOriginToken(String),
    Refused(String),
}

fn classify_playability(status: &PlayabilityStatus) -> PlayabilityOutcome {
    if status.status == "OK" {
        return PlayabilityOutcome::Ok;
    }
    let reason = status.reason.clone().unwrap_or_else(|| status.status.clone());
    let haystack = reason.to_lowercase();
    if status.requires_login || BOT_MARKERS.iter().any(|marker| haystack.contains(marker)) {
        PlayabilityOutcome::NeedsOriginToken(reason)
    } else {
        PlayabilityOutcome::Refused(reason)
    }
}

/// Records `failure` as the most recent one seen, and — if it's the first
/// `ContentRefused` this call has produced — also as the one that will
/// ultimately be surfaced.
fn note_failure(failure: Failure, first_content_refused: &mut Option<Failure>, last_failure: &mut Option<Failure>) {
    if let Failure::ContentRefused { profile, reason } = &failure {
        if first_content_refused.is_none() {
            *first_content_refused = Some(Failure::ContentRefused { profile: *profile, reason: reason.clone() });
        }
    }
    *last_failure = Some(failure);
}

/// Computes the stream's real expiry from its `expire` query parameter,
/// falling back to [`DEFAULT_EXPIRES_IN_SECONDS`] when absent (/// step i).
fn expires_in_from_url(url: &Url) -> u64 {
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
    url.query_pairs()
        .find(|(key, _)| key == "expire")
        .and_then(|(_, value)| value.parse::<u64>().ok())
        .map(|expire| expire.saturating_sub(now))
        .unwrap_or(DEFAULT_EXPIRES_IN_SECONDS)
}

fn loudness_db(config: Option<&wire::PlayerConfig>) -> Option<f64> {
    config.and_then(|c| c.audio_config.as_ref()).and_then(|a| a.loudness_db)
}

fn map_video_details(details: &wire::VideoDetails) -> VideoDetails {
    VideoDetails {
        title: details.title.clone(),
        author: details.author.clone(),
        length_seconds: details.length_seconds,
        thumbnails: details
            .thumbnail
            .as_ref()
            .map(|container| {
                container
                    .thumbnails
                    .iter()
                    .map(|t| Thumbnail { url: t.url.clone(), width: t.width, height: t.height })
                    .collect()
            })
            .unwrap_or_default(),
        is_live: details.is_live_content,
    }
}

fn telemetry_urls(tracking: Option<&wire::PlaybackTracking>) -> Vec<String> {
    let Some(tracking) = tracking else { return Vec::new() };
    [&tracking.videostats_playback_url, &tracking.videostats_watchtime_url]
        .into_iter()
        .filter_map(|holder| holder.as_ref().map(|h| h.base_url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_ok_status_is_ok() {
        let status = PlayabilityStatus { status: "OK".into(), reason: None, requires_login: false };
        assert!(matches!(classify_playability(&status), PlayabilityOutcome::Ok));
    }

    #[test]
    fn classify_bot_reason_needs_origin_token() {
        let status = PlayabilityStatus {
            status: "LOGIN_REQUIRED".into(),
            reason: Some("Sign in to confirm you're not a bot".into()),
            requires_login: true,
        };
        assert!(matches!(classify_playability(&status), PlayabilityOutcome::NeedsOriginToken(_)));
    }

    #[test]
    fn classify_live_offline_is_refused() {
        let status = PlayabilityStatus {
            status: "LIVE_STREAM_OFFLINE".into(),
            reason: Some("This live stream has ended".into()),
            requires_login: false,
        };
        assert!(matches!(classify_playability(&status), PlayabilityOutcome::Refused(_)));
    }

    #[test]
    fn expires_in_from_url_reads_expire_param() {
        let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        let url = Url::parse(&format!("https://host/v?expire={}", now + 3600)).unwrap();
        let seconds = expires_in_from_url(&url);
        assert!((3500..=3600).contains(&seconds));
    }

    #[test]
    fn expires_in_from_url_defaults_when_absent() {
        let url = Url::parse("https://host/v?x=1").unwrap();
        assert_eq!(expires_in_from_url(&url), DEFAULT_EXPIRES_IN_SECONDS);
    }

    #[test]
    fn note_failure_keeps_first_content_refused() {
        let mut first = None;
        let mut last = None;
        note_failure(Failure::ContentRefused { profile: "AndroidVR", reason: "AgeRestricted".into() }, &mut first, &mut last);
        note_failure(Failure::ContentRefused { profile: "iOS", reason: "LiveOffline".into() }, &mut first, &mut last);
        assert!(matches!(first, Some(Failure::ContentRefused { profile: "AndroidVR", .. })));
        assert!(matches!(last, Some(Failure::ContentRefused { profile: "iOS", .. })));
    }

    #[test]
    fn note_failure_overwrites_last_for_transient() {
        let mut first = None;
        let mut last = None;
        note_failure(
            Failure::Transient { profile: "AndroidVR", source: Error::unavailable("boom") },
            &mut first,
            &mut last,
        );
        note_failure(Failure::NoSuitableFormat { profile: "iOS" }, &mut first, &mut last);
        assert!(first.is_none());
        assert!(matches!(last, Some(Failure::NoSuitableFormat { profile: "iOS" })));
    }
}
