//! Audio-only variant selection.
//!
//! Ranks candidate variants with a continuous `bitrate * factor +
//! opus_bias` score rather than a fixed quality ladder, so a missing codec
//! or bitrate tier degrades gracefully instead of falling through to
//! nothing.

use crate::{cipher::SignatureCipher, protocol::player::RawFormat, types::AudioVariant};

/// User-visible quality knob.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Quality {
    Low,
    Medium,
    High,
    Max,
    Auto,
}

impl Quality {
    /// Base ranking factor before any metered override.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::Low => 0.3,
            Self::Medium => 0.6,
            Self::High => 1.0,
            Self::Max => 1.5,
            Self::Auto => 1.0,
        }
    }
}

/// Hard-coded Opus ranking bias, worth 10 kbps of bitrate.
const OPUS_BIAS: f64 = 10240.0;

/// Override factor applied on a metered connection, regardless of `quality`.
const METERED_FACTOR: f64 = 0.5;

/// Filters `raw` down to audio-only candidates (`isAudioOnly` iff
/// `width` is absent) and converts surviving entries to [`AudioVariant`].
fn audio_only_variants(raw: &[RawFormat]) -> Vec<(&RawFormat, AudioVariant)> {
    raw.iter()
        .filter(|f| f.mime_type.starts_with("audio/") && f.width.is_none())
        .filter_map(|f| variant_from_raw(f).map(|v| (f, v)))
        .collect()
}

/// Converts one raw format into an [`AudioVariant`], requiring a usable URL
/// (either a direct `url` or a `signature_cipher` envelope, the latter left
/// undecrypted here — that's [`crate::resolver`]'s job, once a client
/// profile is committed to).
fn variant_from_raw(raw: &RawFormat) -> Option<AudioVariant> {
    let (url, signature, signature_param) = if let Some(direct) = raw.url.as_deref() {
        (url::Url::parse(direct).ok()?, None, None)
    } else {
        let envelope = SignatureCipher::parse(raw.signature_cipher.as_deref()?).ok()?;
        (
            url::Url::parse(&envelope.url).ok()?,
            Some(envelope.s),
            Some(envelope.sp),
        )
    };

    let codec = raw
        .mime_type
        .split("codecs=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .map(str::to_owned);

    Some(AudioVariant {
        mime_type: raw.mime_type.clone(),
        bitrate: raw.bitrate,
        sample_rate: raw.audio_sample_rate,
        channel_count: raw.audio_channels,
        codec,
        content_length: raw.content_length,
        url,
        signature,
        signature_param,
    })
}

/// Selects the best audio-only variant for playback.
///
/// Ranks surviving candidates by `bitrate * quality_factor + opus_bias` and
/// returns the highest-scoring one. Deterministic for a given input (/// property 9): ties are broken by declaration order, since sort is stable.
#[must_use]
pub fn select(raw: &[RawFormat], quality: Quality, metered: bool) -> Option<AudioVariant> {
    let factor = if metered { METERED_FACTOR } else { quality.factor() };

    audio_only_variants(raw)
        .into_iter()
        .max_by(|(_, a), (_, b)| score(a, factor).total_cmp(&score(b, factor)))
        .map(|(_, variant)| variant)
}

/// Opus/WebM-first selector for downloads: no `metered`
/// parameter by design (Open Question 2 / SPEC_FULL §9.2).
#[must_use]
pub fn select_download(raw: &[RawFormat], quality: Quality) -> Option<AudioVariant> {
    let factor = quality.factor();
    let candidates = audio_only_variants(raw);

    let opus_first = candidates
        .iter()
        .filter(|(_, v)| v.is_opus())
        .max_by(|(_, a), (_, b)| score(a, factor).total_cmp(&score(b, factor)));

    if let Some((_, variant)) = opus_first {
        return Some(variant.clone());
    }

    candidates
        .into_iter()
        .filter(|(_, v)| v.is_aac())
        .max_by(|(_, a), (_, b)| score(a, factor).total_cmp(&score(b, factor)))
        .map(|(_, variant)| variant)
}

#[allow(clippy::cast_precision_loss)]
fn score(variant: &AudioVariant, factor: f64) -> f64 {
    let bias = if variant.is_opus() { OPUS_BIAS } else { 0.0 };
    variant.bitrate as f64 * factor + bias
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(mime: &str, bitrate: u64, width: Option<u32>) -> RawFormat {
        RawFormat {
            mime_type: mime.to_owned(),
            bitrate,
            width,
            audio_sample_rate: None,
            audio_channels: None,
            url: Some(format!("https://example.com/{mime}/{bitrate}")),
            signature_cipher: None,
            content_length: None,
            approx_duration_ms: None,
            loudness_db: None,
        }
    }

    #[test]
    fn selects_audio_only_and_excludes_video() {
        let formats = vec![
            raw("video/mp4", 500_000, Some(1280)),
            raw("audio/webm; codecs=\"opus\"", 160_000, None),
        ];
        let chosen = select(&formats, Quality::High, false).unwrap();
        assert!(chosen.mime_type.starts_with("audio/"));
    }

    #[test]
    fn opus_bias_breaks_close_ties() {
        let formats = vec![
            raw("audio/mp4; codecs=\"mp4a.40.2\"", 128_000, None),
            raw("audio/webm; codecs=\"opus\"", 128_000, None),
        ];
        let chosen = select(&formats, Quality::High, false).unwrap();
        assert!(chosen.is_opus());
    }

    #[test]
    fn metered_overrides_quality_factor() {
        let formats = vec![raw("audio/webm; codecs=\"opus\"", 160_000, None)];
        let unmetered = select(&formats, Quality::Max, false).unwrap();
        let metered = select(&formats, Quality::Max, true).unwrap();
        assert_eq!(unmetered.bitrate, metered.bitrate);
    }

    #[test]
    fn download_falls_back_to_aac_when_no_opus() {
        let formats = vec![raw("audio/mp4; codecs=\"mp4a.40.2\"", 128_000, None)];
        let chosen = select_download(&formats, Quality::High).unwrap();
        assert!(chosen.is_aac());
    }

    #[test]
    fn download_prefers_opus_when_present() {
        let formats = vec![
            raw("audio/mp4; codecs=\"mp4a.40.2\"", 256_000, None),
            raw("audio/webm; codecs=\"opus\"", 96_000, None),
        ];
        let chosen = select_download(&formats, Quality::High).unwrap();
        assert!(chosen.is_opus());
    }

    #[test]
    fn selection_is_deterministic() {
        let formats = vec![
            raw("audio/webm; codecs=\"opus\"", 160_000, None),
            raw("audio/mp4; codecs=\"mp4a.40.2\"", 256_000, None),
        ];
        let first = select(&formats, Quality::High, false);
        let second = select(&formats, Quality::High, false);
        assert_eq!(first.map(|v| v.bitrate), second.map(|v| v.bitrate));
    }

    #[test]
    fn quality_factors_match_the_documented_table() {
        assert!((Quality::Low.factor() - 0.3).abs() < f64::EPSILON);
        assert!((Quality::Medium.factor() - 0.6).abs() < f64::EPSILON);
        assert!((Quality::High.factor() - 1.0).abs() < f64::EPSILON);
        assert!((Quality::Max.factor() - 1.5).abs() < f64::EPSILON);
        assert!((Quality::Auto.factor() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_candidates_returns_none() {
        let formats = vec![raw("video/mp4", 500_000, Some(1280))];
        assert!(select(&formats, Quality::High, false).is_none());
    }
}
