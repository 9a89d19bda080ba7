//! Genius provider: HTML scrape, plain lyrics only.
//!
//! HTML extraction uses `scraper`, the same crate the LyricRs reference
//! example reaches for to pull content out of a lyrics-container `<div>`.

use regex_lite::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{LyricsProvider, LyricsQuery, ProviderLyrics};
use crate::{
    error::{Error, Result},
    http::Transport,
};

const SEARCH_URL: &str = "https://genius.com/api/search/song";

#[derive(Debug, Serialize)]
struct SearchBody {
    q: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchResponseBody,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    result: Song,
}

#[derive(Debug, Deserialize)]
struct Song {
    title: String,
    url: String,
    #[serde(rename = "primary_artist")]
    primary_artist: Artist,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

/// Scrapes genius.com: search, score hits, fetch the top one's page, and
/// extract its lyrics containers.
pub struct GeniusProvider {
    br_re: Regex,
    preloaded_state_re: Regex,
}

impl GeniusProvider {
    pub const NAME: &'static str = "Genius";

    #[must_use]
    pub fn new() -> Self {
        Self {
            br_re: Regex::new(r"(?i)<br\s*/?>").expect("static regex"),
            preloaded_state_re: Regex::new(r#"__PRELOADED_STATE__\s*=\s*JSON\.parse\((".*?")\)\s*;"#)
                .expect("static regex"),
        }
    }

    fn score(query: &LyricsQuery, song: &Song) -> i32 {
        let mut score = 0;
        if song.title.eq_ignore_ascii_case(&query.title) {
            score += 1;
        }
        if song.primary_artist.name.to_lowercase().contains(&query.artist.to_lowercase()) {
            score += 1;
        }
        score
    }

    fn extract_text(&self, html: &str) -> String {
        let container_selector =
            Selector::parse(r#"[data-lyrics-container="true"]"#).expect("static selector");
        let document = Html::parse_document(html);

        let mut combined = String::new();
        for container in document.select(&container_selector) {
            combined.push_str(&self.container_to_text(&container.inner_html()));
            combined.push('\n');
        }

        let combined = combined.trim().to_owned();
        if !combined.is_empty() {
            return combined;
        }

        self.extract_from_preloaded_state(html).unwrap_or_default()
    }

    fn container_to_text(&self, inner_html: &str) -> String {
        let with_newlines = self.br_re.replace_all(inner_html, "\n");
        let fragment = Html::parse_fragment(&with_newlines);
        fragment.root_element().text().collect::<String>()
    }

    /// Fallback for pages that don't render lyrics containers server-side:
    /// the same HTML sits escaped inside a `__PRELOADED_STATE__` blob.
    fn extract_from_preloaded_state(&self, body: &str) -> Option<String> {
        let literal = self.preloaded_state_re.captures(body)?.get(1)?.as_str();
        let unescaped: String = serde_json::from_str(literal).ok()?;
        let container_selector = Selector::parse(r#"[data-lyrics-container="true"]"#).ok()?;
        let document = Html::parse_document(&unescaped);

        let mut combined = String::new();
        for container in document.select(&container_selector) {
            combined.push_str(&self.container_to_text(&container.inner_html()));
            combined.push('\n');
        }

        let combined = combined.trim().to_owned();
        (!combined.is_empty()).then_some(combined)
    }
}

impl Default for GeniusProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LyricsProvider for GeniusProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn search(&self, transport: &Transport, query: &LyricsQuery) -> Result<Option<ProviderLyrics>> {
        let search_url = Url::parse(SEARCH_URL)?;
        let body = SearchBody { q: format!("{} {}", query.artist, query.title) };
        let raw = transport.post_json(&search_url, &body, Transport::BLOB_TIMEOUT).await?;
        let parsed: SearchResponse = crate::protocol::json(&raw, "genius-search")?;

        let Some(best) = parsed.response.hits.into_iter().map(|hit| hit.result).max_by_key(|song| Self::score(query, song))
        else {
            return Ok(None);
        };
        if Self::score(query, &best) == 0 {
            return Ok(None);
        }

        let song_url = Url::parse(&best.url).map_err(|e| Error::invalid_argument(e.to_string()))?;
        let page = transport.fetch_text(&song_url).await?;
        let text = self.extract_text(&page);

        if text.is_empty() || is_instrumental_sentinel(&text) {
            return Ok(None);
        }

        Ok(Some(ProviderLyrics { synced: None, plain_text: Some(text) }))
    }
}

/// `true` if `text` is nothing but the sentinel "instrumental" marker,
/// ignoring case and surrounding brackets.
fn is_instrumental_sentinel(text: &str) -> bool {
    let normalized: String = text.chars().filter(|c| !"[](){}".contains(*c)).collect();
    normalized.trim().eq_ignore_ascii_case("instrumental")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> LyricsQuery {
        LyricsQuery { title: "Song Title".into(), artist: "Some Artist".into(), album: None, duration_seconds: 200 }
    }

    fn song(title: &str, artist: &str) -> Song {
        Song { title: title.into(), url: "https://genius.com/x".into(), primary_artist: Artist { name: artist.into() } }
    }

    #[test]
    fn scores_exact_title_and_artist_match_highest() {
        let exact = song("Song Title", "Some Artist");
        let partial = song("Song Title (Remix)", "Someone Else");
        assert!(GeniusProvider::score(&query(), &exact) > GeniusProvider::score(&query(), &partial));
    }

    #[test]
    fn container_markup_converts_br_to_newline() {
        let provider = GeniusProvider::new();
        let text = provider.container_to_text("Line one<br>Line two<br/>Line three");
        assert_eq!(text, "Line one\nLine two\nLine three");
    }

    #[test]
    fn extract_text_reads_lyrics_container() {
        let provider = GeniusProvider::new();
        let html = r#"<html><body><div data-lyrics-container="true">Verse one<br>Verse two</div></body></html>"#;
        assert_eq!(provider.extract_text(html), "Verse one\nVerse two");
    }

    #[test]
    fn instrumental_sentinel_is_recognized_with_brackets_and_case() {
        assert!(is_instrumental_sentinel("[Instrumental]"));
        assert!(is_instrumental_sentinel("INSTRUMENTAL"));
        assert!(!is_instrumental_sentinel("Some actual lyrics"));
    }
}
