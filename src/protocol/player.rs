//! Request/response types for the InnerTube `player` RPC.
//!
//! The response is a deeply nested, weakly-typed JSON tree in practice. Per
//! ("Dynamic JSON typing"), only the fields this crate actually
//! consumes are given strict types; everything else is silently ignored by
//! `serde`'s default "unknown fields are dropped" behavior. Missing fields
//! that matter (no adaptive formats, no playability status) surface as
//! explicit failures in [`crate::resolver`], not panics here.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "playabilityStatus": { "status": "OK" },
//!     "streamingData": {
//!         "expiresInSeconds": "21060",
//!         "adaptiveFormats": [{
//!             "mimeType": "audio/webm; codecs=\"opus\"",
//!             "bitrate": 160000,
//!             "url": "https://...",
//!             "contentLength": "4238291"
//!         }]
//!     },
//!     "videoDetails": { "videoId": "...", "title": "...", "lengthSeconds": "212" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

/// Request body for `POST /youtubei/v1/player`.
#[derive(Clone, Debug, Serialize)]
pub struct PlayerRequest {
    /// Client identity and device context, merged from the chosen profile.
    pub context: Context,
    /// The video to resolve.
    #[serde(rename = "videoId")]
    pub video_id: String,
    /// Playlist the video was opened from, if any.
    #[serde(rename = "playlistId", skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    /// Always `true`: ask the server not to refuse racy content client-side.
    #[serde(rename = "racyCheckOk")]
    pub racy_check_ok: bool,
    /// Always `true`: ask the server not to refuse mature content client-side.
    #[serde(rename = "contentCheckOk")]
    pub content_check_ok: bool,
    /// Signature-timestamp-carrying playback context, present for profiles
    /// that support the signature cipher.
    #[serde(rename = "playbackContext", skip_serializing_if = "Option::is_none")]
    pub playback_context: Option<PlaybackContext>,
    /// Origin-token envelope, present only for profiles with
    /// `needs_origin_token`.
    #[serde(
        rename = "serviceIntegrityDimensions",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_integrity_dimensions: Option<ServiceIntegrityDimensions>,
}

/// Client identity block, merged from [`crate::profile::ClientProfile`].
#[derive(Clone, Debug, Serialize)]
pub struct Context {
    /// Per-profile client identity and capabilities.
    pub client: serde_json::Value,
    /// Opaque session id, once known.
    #[serde(rename = "visitorData", skip_serializing_if = "Option::is_none")]
    pub visitor_data: Option<String>,
}

/// Carries the signature timestamp used by cipher-capable profiles.
#[derive(Clone, Debug, Serialize)]
pub struct PlaybackContext {
    /// Nested one level deeper, matching the request body's wire shape.
    #[serde(rename = "contentPlaybackContext")]
    pub content_playback_context: ContentPlaybackContext,
}

/// Signature timestamp payload.
#[derive(Clone, Debug, Serialize)]
pub struct ContentPlaybackContext {
    /// The `sts` value scraped from the embed page by [`crate::cipher`].
    #[serde(rename = "signatureTimestamp", skip_serializing_if = "Option::is_none")]
    pub signature_timestamp: Option<u32>,
}

/// Origin-token envelope.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceIntegrityDimensions {
    /// The streaming origin token, when present.
    #[serde(rename = "poToken", skip_serializing_if = "Option::is_none")]
    pub po_token: Option<String>,
}

/// Top-level player response.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    /// The server's verdict on whether this video may be streamed.
    pub playability_status: PlayabilityStatus,
    /// Present when `playability_status` allows playback.
    pub streaming_data: Option<StreamingData>,
    /// Present for normal (non-error) responses.
    pub video_details: Option<VideoDetails>,
    /// Telemetry ping endpoints, if the server returned them.
    pub playback_tracking: Option<PlaybackTracking>,
    /// Loudness/normalization metadata.
    pub player_config: Option<PlayerConfig>,
}

/// The server's playability verdict, as returned on the wire.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayabilityStatus {
    /// e.g. `"OK"`, `"LOGIN_REQUIRED"`, `"UNPLAYABLE"`, `"ERROR"`, `"LIVE_STREAM_OFFLINE"`.
    pub status: String,
    /// Human-readable reason, when the status isn't `"OK"`.
    pub reason: Option<String>,
    /// Whether the server requires sign-in for this request.
    #[serde(default)]
    pub requires_login: bool,
}

/// Streaming variants and their shared expiry.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingData {
    /// Seconds from response time until every URL in this response expires.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub expires_in_seconds: Option<u64>,
    /// Progressive (muxed) formats; not used by this crate (only audio-only
    /// variants are selected) but kept for completeness of the response shape.
    #[serde(default)]
    pub formats: Vec<RawFormat>,
    /// Adaptive (single-stream) formats, the pool audio-only variants are
    /// selected from.
    #[serde(default)]
    pub adaptive_formats: Vec<RawFormat>,
}

/// A single adaptive or progressive format entry, as returned on the wire.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFormat {
    /// e.g. `"audio/webm; codecs=\"opus\""`.
    pub mime_type: String,
    /// Bits per second.
    pub bitrate: u64,
    /// Present only for formats that carry video; its absence is how
    /// audio-only variants are identified.
    pub width: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    /// Direct URL, present when the server didn't cipher it.
    pub url: Option<String>,
    /// URL-encoded cipher envelope, present when `url` is absent.
    pub signature_cipher: Option<String>,
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub approx_duration_ms: Option<u64>,
    pub loudness_db: Option<f64>,
}

/// Video metadata, present on successful responses.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub video_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub length_seconds: Option<u64>,
    #[serde(default)]
    pub is_live_content: bool,
    pub thumbnail: Option<ThumbnailContainer>,
}

/// Wrapper the wire format uses around the thumbnail list.
#[derive(Clone, Debug, Deserialize)]
pub struct ThumbnailContainer {
    pub thumbnails: Vec<Thumbnail>,
}

/// A single thumbnail image.
#[derive(Clone, Debug, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Telemetry ping endpoints.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackTracking {
    pub videostats_playback_url: Option<UrlHolder>,
    pub videostats_watchtime_url: Option<UrlHolder>,
}

/// Wrapper the wire format uses around a bare tracking URL.
#[derive(Clone, Debug, Deserialize)]
pub struct UrlHolder {
    pub base_url: String,
}

/// Player configuration, carrying loudness normalization data.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    pub audio_config: Option<AudioConfig>,
}

/// Loudness normalization metadata.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub loudness_db: Option<f64>,
}
