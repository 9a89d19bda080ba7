//! Shared domain types: the values that flow between components
//! rather than belonging to any single one.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use url::Url;
use veil::Redact;

/// An audio-only streamable variant, selected by [`crate::format`].
#[derive(Clone, Redact, Serialize, Deserialize)]
pub struct AudioVariant {
    /// e.g. `"audio/webm; codecs=\"opus\""`.
    pub mime_type: String,
    /// Bits per second.
    pub bitrate: u64,
    /// Sample rate in Hz, when reported.
    pub sample_rate: Option<u32>,
    /// Channel count, when reported.
    pub channel_count: Option<u32>,
    /// Codec string parsed out of `mime_type`, when present.
    pub codec: Option<String>,
    /// Payload size in bytes, when reported.
    pub content_length: Option<u64>,
    /// The base URL. Directly fetchable as-is unless `signature` is present,
    /// in which case it is still missing its signature query parameter.
    #[redact(partial)]
    pub url: Url,
    /// The still-ciphered signature, when this variant came from a
    /// `signatureCipher` envelope rather than a plain `url` field.
    #[redact(partial)]
    pub signature: Option<String>,
    /// Name of the query parameter the decoded signature must be appended
    /// under. Only meaningful when `signature` is present.
    pub signature_param: Option<String>,
}

impl AudioVariant {
    /// `true` if `mime_type` suggests an Opus/WebM payload.
    #[must_use]
    pub fn is_opus(&self) -> bool {
        self.mime_type.contains("webm") || self.mime_type.contains("opus")
    }

    /// `true` if `mime_type` suggests an AAC/M4A payload.
    #[must_use]
    pub fn is_aac(&self) -> bool {
        self.mime_type.contains("mp4") || self.mime_type.contains("m4a")
    }
}

/// Video metadata carried alongside a resolved stream, when available.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VideoDetails {
    pub title: String,
    pub author: String,
    pub length_seconds: Option<u64>,
    pub thumbnails: Vec<Thumbnail>,
    pub is_live: bool,
}

/// A single thumbnail image reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// The cache value produced by a successful [`crate::resolver::StreamResolver`] resolution.
#[derive(Clone, Redact, Serialize, Deserialize)]
pub struct StreamRecord {
    pub video_id: String,
    #[redact(partial)]
    pub url: Url,
    pub expires_in_seconds: u64,
    pub fetched_at: SystemTime,
    pub variant: AudioVariant,
    pub loudness_db: Option<f64>,
    pub video_details: Option<VideoDetails>,
    pub telemetry_urls: Vec<String>,
}

impl StreamRecord {
    /// Guard window: a record that would expire within this long of "now" is
    /// treated as already expired.
    pub const EXPIRY_GUARD_SECONDS: u64 = 30;

    /// `true` iff `now < fetched_at + expires_in_seconds - EXPIRY_GUARD_SECONDS`.
    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        let Some(expiry) = self
            .fetched_at
            .checked_add(std::time::Duration::from_secs(self.expires_in_seconds))
        else {
            return false;
        };
        let Some(guarded) =
            expiry.checked_sub(std::time::Duration::from_secs(Self::EXPIRY_GUARD_SECONDS))
        else {
            return false;
        };
        now < guarded
    }
}

/// The server's verdict on whether a video may be streamed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PlayabilityVerdict {
    Ok,
    NeedsOriginToken,
    AgeRestricted,
    LoginRequired,
    LiveNotSupported,
    Unavailable(String),
}

/// A time-synced lyric line.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncedLine {
    pub time_ms: u32,
    pub text: String,
}

/// A resolved lyrics result, cached with a 7-day TTL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LyricsRecord {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub synced: Option<Vec<SyncedLine>>,
    pub plain_text: Option<String>,
    pub provider: String,
    pub fetched_at: SystemTime,
}

impl LyricsRecord {
    /// Cache TTL for lyrics records.
    pub const TTL: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 60 * 60);

    /// `true` iff still within [`Self::TTL`] of `fetched_at`.
    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        match now.duration_since(self.fetched_at) {
            Ok(age) => age < Self::TTL,
            Err(_) => true,
        }
    }

    /// `true` if this record carries a synced lyric track.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.synced.as_ref().is_some_and(|lines| !lines.is_empty())
    }

    /// `true` if this record carries plain-text lyrics.
    #[must_use]
    pub fn has_plain(&self) -> bool {
        self.plain_text.as_ref().is_some_and(|text| !text.is_empty())
    }
}

/// Cache analytics counters: monotonically non-decreasing.
#[derive(Debug, Default)]
pub struct CacheAnalytics {
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    network_calls: std::sync::atomic::AtomicU64,
}

impl CacheAnalytics {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn record_network_call(&self) {
        self.network_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Snapshot of the current counters, plus the derived hit rate.
    #[must_use]
    pub fn snapshot(&self) -> CacheAnalyticsSnapshot {
        let hits = self.hits.load(std::sync::atomic::Ordering::Relaxed);
        let misses = self.misses.load(std::sync::atomic::Ordering::Relaxed);
        let network_calls = self.network_calls.load(std::sync::atomic::Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        CacheAnalyticsSnapshot {
            hits,
            misses,
            network_calls,
            hit_rate,
        }
    }
}

/// A point-in-time read of [`CacheAnalytics`].
#[derive(Clone, Copy, Debug)]
pub struct CacheAnalyticsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub network_calls: u64,
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_record_valid_before_guard_window() {
        let now = SystemTime::now();
        let record = StreamRecord {
            video_id: "v".into(),
            url: Url::parse("https://example.com/stream").unwrap(),
            expires_in_seconds: 3600,
            fetched_at: now,
            variant: AudioVariant {
                mime_type: "audio/webm".into(),
                bitrate: 160_000,
                sample_rate: None,
                channel_count: None,
                codec: None,
                content_length: None,
                url: Url::parse("https://example.com/stream").unwrap(),
                signature: None,
                signature_param: None,
            },
            loudness_db: None,
            video_details: None,
            telemetry_urls: Vec::new(),
        };
        assert!(record.is_valid_at(now));
        assert!(!record.is_valid_at(now + std::time::Duration::from_secs(3600)));
    }

    #[test]
    fn lyrics_record_expires_after_ttl() {
        let now = SystemTime::now();
        let record = LyricsRecord {
            track_id: "t".into(),
            title: String::new(),
            artist: String::new(),
            synced: None,
            plain_text: Some("la la".into()),
            provider: "LRCLib".into(),
            fetched_at: now,
        };
        assert!(record.is_valid_at(now));
        assert!(!record.is_valid_at(now + LyricsRecord::TTL + std::time::Duration::from_secs(1)));
    }

    #[test]
    fn analytics_counters_are_monotonic() {
        let analytics = CacheAnalytics::default();
        analytics.record_hit();
        analytics.record_miss();
        analytics.record_network_call();
        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.network_calls, 1);
        assert!((snapshot.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}
