//! `LRCLib` provider: free API offering synced and plain lyrics.

use serde::Deserialize;
use url::Url;

use super::{lrc, LyricsProvider, LyricsQuery, ProviderLyrics};
use crate::{error::Result, http::Transport};

const SEARCH_URL: &str = "https://lrclib.net/api/search";

/// How far a candidate's reported duration may drift from the requested
/// duration before it's rejected.
const MAX_DURATION_DELTA_SECONDS: f64 = 15.0;

#[derive(Debug, Deserialize)]
struct Track {
    #[serde(rename = "trackName")]
    track_name: String,
    #[serde(rename = "artistName")]
    artist_name: String,
    #[serde(rename = "albumName")]
    #[allow(dead_code)]
    album_name: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    instrumental: bool,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
}

/// Searches lrclib.net: exact metadata first, falling back to a fuzzy
/// free-text query when that comes back empty.
pub struct LrcLibProvider;

impl LrcLibProvider {
    pub const NAME: &'static str = "LRCLib";

    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn exact_search_url(query: &LyricsQuery) -> Result<Url> {
        let mut url = Url::parse(SEARCH_URL)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("artist_name", &query.artist);
            pairs.append_pair("track_name", &query.title);
            if let Some(album) = &query.album {
                pairs.append_pair("album_name", album);
            }
        }
        Ok(url)
    }

    fn fuzzy_search_url(query: &LyricsQuery) -> Result<Url> {
        let mut url = Url::parse(SEARCH_URL)?;
        url.query_pairs_mut().append_pair("q", &format!("{} {}", query.artist, query.title));
        Ok(url)
    }
}

impl Default for LrcLibProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LyricsProvider for LrcLibProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn search(&self, transport: &Transport, query: &LyricsQuery) -> Result<Option<ProviderLyrics>> {
        let mut tracks: Vec<Track> = transport.get_json(&Self::exact_search_url(query)?, Transport::BLOB_TIMEOUT).await?;
        if tracks.is_empty() {
            tracks = transport.get_json(&Self::fuzzy_search_url(query)?, Transport::BLOB_TIMEOUT).await?;
        }

        let Some(best) = select_best(tracks, query) else {
            return Ok(None);
        };

        Ok(Some(ProviderLyrics {
            synced: best.synced_lyrics.as_deref().map(lrc::parse),
            plain_text: best.plain_lyrics,
        }))
    }
}

/// Filters out instrumentals and artist mismatches, rejects anything more
/// than [`MAX_DURATION_DELTA_SECONDS`] off the requested duration, then
/// picks the closest remaining match.
fn select_best(tracks: Vec<Track>, query: &LyricsQuery) -> Option<Track> {
    let requested = query.duration_seconds as f64;

    let mut candidates: Vec<(f64, Track)> = tracks
        .into_iter()
        .filter(|t| !t.instrumental)
        .filter(|t| artist_matches(&query.artist, &t.artist_name))
        .filter_map(|t| {
            let duration = t.duration?;
            let delta = (duration - requested).abs();
            (delta <= MAX_DURATION_DELTA_SECONDS).then_some((delta, t))
        })
        .collect();

    candidates.sort_by(|(a, _), (b, _)| a.total_cmp(b));
    candidates.into_iter().next().map(|(_, track)| track)
}

/// `true` if any comma/ampersand-split part of `query_artist` appears as a
/// substring of `candidate_artist`, case-insensitively.
fn artist_matches(query_artist: &str, candidate_artist: &str) -> bool {
    let candidate = candidate_artist.to_lowercase();
    query_artist
        .split(['&', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .any(|part| candidate.contains(&part.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(artist: &str, duration: Option<f64>, instrumental: bool) -> Track {
        Track {
            track_name: "Title".into(),
            artist_name: artist.into(),
            album_name: None,
            duration,
            instrumental,
            plain_lyrics: Some("la la".into()),
            synced_lyrics: None,
        }
    }

    fn query() -> LyricsQuery {
        LyricsQuery { title: "Title".into(), artist: "Artist A & Artist B".into(), album: None, duration_seconds: 200 }
    }

    #[test]
    fn picks_closest_duration_among_matches() {
        let tracks = vec![track("Artist A", Some(190.0), false), track("Artist A", Some(199.0), false)];
        let best = select_best(tracks, &query()).unwrap();
        assert!((best.duration.unwrap() - 199.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_duration_outside_tolerance() {
        let tracks = vec![track("Artist A", Some(100.0), false)];
        assert!(select_best(tracks, &query()).is_none());
    }

    #[test]
    fn rejects_instrumental_tracks() {
        let tracks = vec![track("Artist A", Some(200.0), true)];
        assert!(select_best(tracks, &query()).is_none());
    }

    #[test]
    fn rejects_non_matching_artist() {
        let tracks = vec![track("Someone Else", Some(200.0), false)];
        assert!(select_best(tracks, &query()).is_none());
    }

    #[test]
    fn matches_either_half_of_a_split_artist_query() {
        let tracks = vec![track("Artist B (feat. nobody)", Some(200.0), false)];
        assert!(select_best(tracks, &query()).is_some());
    }

    #[test]
    fn tracks_with_no_duration_are_skipped() {
        let tracks = vec![track("Artist A", None, false)];
        assert!(select_best(tracks, &query()).is_none());
    }
}
