//! Origin ("PoToken") lifecycle management.
//!
//! A TTL value type (`expires_at`, `is_expired`, `time_to_live`) plus a
//! load/refresh state machine. Concurrent callers must serialize onto a
//! single in-flight generation — the idiomatic way to do that in Tokio is
//! to hold the state behind a `tokio::sync::Mutex` and perform the
//! generation work itself while holding the lock: a second caller simply
//! awaits the same lock instead of racing a separate completion signal.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde::Deserialize;

use crate::{
    error::{Error, ErrorKind, Result},
    kv::{BrowserContext, KvStore},
};

/// A snapshot of the origin tokens.
#[derive(Clone, Debug)]
pub struct OriginTokens {
    pub streaming_token: Option<String>,
    pub player_token: Option<String>,
    pub visitor_id: Option<String>,
    pub fetched_at: SystemTime,
}

impl OriginTokens {
    /// Tokens are only adopted/kept while younger than this.
    pub const TTL: Duration = Duration::from_secs(4 * 60 * 60);

    /// `true` iff `now - fetched_at < TTL`.
    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        match now.duration_since(self.fetched_at) {
            Ok(age) => age < Self::TTL,
            Err(_) => true,
        }
    }
}

/// Minimum wait after "page finished" before evaluating the extractor
/// script, to let challenge JS complete.
const CHALLENGE_SETTLE: Duration = Duration::from_millis(1500);

/// Overall generation timeout.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(20);

const KEY_STREAMING_TOKEN: &str = "ytm_resolver.origin_tokens.streaming_token";
const KEY_PLAYER_TOKEN: &str = "ytm_resolver.origin_tokens.player_token";
const KEY_VISITOR_ID: &str = "ytm_resolver.origin_tokens.visitor_id";
const KEY_FETCHED_AT_MS: &str = "ytm_resolver.origin_tokens.fetched_at_ms";

/// The extractor script evaluated in the browser context once the challenge
/// has had time to settle. Sourced from `ytcfg.get` plus a
/// handful of inline-script regexes for the Po tokens.
const EXTRACTOR_SCRIPT: &str = r#"
(function() {
    var visitorData = null;
    try { visitorData = ytcfg.get('VISITOR_DATA'); } catch (e) {}

    var scripts = Array.prototype.map.call(document.scripts, function(s) { return s.textContent || ''; }).join('\n');
    var playerMatch = scripts.match(/"playerPoToken"\s*:\s*"([^"]+)"/) || scripts.match(/"attestationToken"\s*:\s*"([^"]+)"/);
    var streamingMatch = scripts.match(/botguardData[^"]*"token"\s*:\s*"([^"]+)"/);

    return JSON.stringify({
        visitorData: visitorData,
        playerPoToken: playerMatch ? playerMatch[1] : null,
        streamingPoToken: streamingMatch ? streamingMatch[1] : visitorData
    });
})();
"#;

#[derive(Debug, Deserialize)]
struct ExtractedTokens {
    #[serde(rename = "visitorData")]
    visitor_data: Option<String>,
    #[serde(rename = "playerPoToken")]
    player_po_token: Option<String>,
    #[serde(rename = "streamingPoToken")]
    streaming_po_token: Option<String>,
}

/// Manager state ('s `Uninitialized | Empty | Ready` reduced to
/// what's observable after the `Loading`/`Generating` transition completes —
/// those two are represented by "we're holding the lock", not a separate
/// enum variant).
enum State {
    Uninitialized,
    Empty,
    Ready(OriginTokens),
}

/// Drives origin token acquisition, caching, and refresh.
pub struct TokenManager {
    kv: Arc<dyn KvStore>,
    browser: Arc<dyn BrowserContext>,
    state: tokio::sync::Mutex<State>,
}

impl TokenManager {
    /// Builds a manager backed by the given KV store and browser context.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, browser: Arc<dyn BrowserContext>) -> Self {
        Self {
            kv,
            browser,
            state: tokio::sync::Mutex::new(State::Uninitialized),
        }
    }

    /// Ensures tokens are loaded (from disk, if persisted), generating
    /// nothing. Cheap to call repeatedly; only the first call does I/O.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV store read fails.
    pub async fn ensure_loaded(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !matches!(*state, State::Uninitialized) {
            return Ok(());
        }
        *state = self.load_from_kv().await?;
        Ok(())
    }

    /// Returns a snapshot of the current tokens, if any are loaded and
    /// valid. Does not trigger generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load from the KV store fails.
    pub async fn snapshot(&self) -> Result<Option<OriginTokens>> {
        self.ensure_loaded().await?;
        let state = self.state.lock().await;
        Ok(match &*state {
            State::Ready(tokens) if tokens.is_valid_at(SystemTime::now()) => Some(tokens.clone()),
            _ => None,
        })
    }

    /// Drives the browser challenge and persists the result.
    ///
    /// Concurrent callers serialize on the same lock this method holds for
    /// its whole duration, which is exactly 's "exactly one
    /// underlying operation runs at a time" requirement: a second caller's
    /// `generate()` simply waits for the first to finish and then observes
    /// whatever state it left behind, without performing its own browser
    /// round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser navigation/evaluation fails, times
    /// out after 20 s, or the extractor script returns no visitor data.
    pub async fn generate(&self) -> Result<OriginTokens> {
        let mut state = self.state.lock().await;

        // A caller that lost the race to the lock may find a teammate's
        // generation already produced fresh tokens; reuse them.
        if let State::Ready(tokens) = &*state {
            if tokens.is_valid_at(SystemTime::now()) {
                return Ok(tokens.clone());
            }
        }

        let result = tokio::time::timeout(GENERATION_TIMEOUT, self.run_challenge()).await;
        match result {
            Ok(Ok(tokens)) => {
                self.persist(&tokens).await?;
                *state = State::Ready(tokens.clone());
                Ok(tokens)
            }
            Ok(Err(e)) => {
                *state = State::Empty;
                Err(e)
            }
            Err(elapsed) => {
                *state = State::Empty;
                Err(elapsed.into())
            }
        }
    }

    /// Drops any cached tokens, in memory and on disk, and requests
    /// regeneration on next use ("on bot-detection the snapshot
    /// is dropped").
    ///
    /// # Errors
    ///
    /// Returns an error if the KV deletes fail.
    pub async fn invalidate(&self) -> Result<()> {
        self.kv.delete(KEY_STREAMING_TOKEN).await?;
        self.kv.delete(KEY_PLAYER_TOKEN).await?;
        self.kv.delete(KEY_VISITOR_ID).await?;
        self.kv.delete(KEY_FETCHED_AT_MS).await?;
        *self.state.lock().await = State::Empty;
        Ok(())
    }

    async fn load_from_kv(&self) -> Result<State> {
        let fetched_at_ms = self.kv.get(KEY_FETCHED_AT_MS).await?;
        let Some(fetched_at_ms) = fetched_at_ms else {
            return Ok(State::Empty);
        };
        let fetched_at_ms: u64 = String::from_utf8_lossy(&fetched_at_ms)
            .parse()
            .map_err(|_| Error::internal("corrupt fetched_at_ms"))?;
        let fetched_at = SystemTime::UNIX_EPOCH + Duration::from_millis(fetched_at_ms);

        let tokens = OriginTokens {
            streaming_token: self.read_string(KEY_STREAMING_TOKEN).await?,
            player_token: self.read_string(KEY_PLAYER_TOKEN).await?,
            visitor_id: self.read_string(KEY_VISITOR_ID).await?,
            fetched_at,
        };

        if tokens.is_valid_at(SystemTime::now()) {
            Ok(State::Ready(tokens))
        } else {
            Ok(State::Empty)
        }
    }

    async fn read_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .kv
            .get(key)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn persist(&self, tokens: &OriginTokens) -> Result<()> {
        if let Some(ref token) = tokens.streaming_token {
            self.kv.set(KEY_STREAMING_TOKEN, token.clone().into_bytes()).await?;
        }
        if let Some(ref token) = tokens.player_token {
            self.kv.set(KEY_PLAYER_TOKEN, token.clone().into_bytes()).await?;
        }
        if let Some(ref id) = tokens.visitor_id {
            self.kv.set(KEY_VISITOR_ID, id.clone().into_bytes()).await?;
        }
        let fetched_at_ms = tokens
            .fetched_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.kv
            .set(KEY_FETCHED_AT_MS, fetched_at_ms.to_string().into_bytes())
            .await?;
        Ok(())
    }

    async fn run_challenge(&self) -> Result<OriginTokens> {
        self.browser.load_url("https://music.youtube.com/").await?;
        tokio::time::sleep(CHALLENGE_SETTLE).await;

        let raw = self.browser.eval_javascript(EXTRACTOR_SCRIPT).await?;
        let extracted: ExtractedTokens =
            serde_json::from_str(&raw).map_err(|e| Error::new(ErrorKind::Internal, e))?;

        let Some(visitor_data) = extracted.visitor_data else {
            return Err(Error::not_found("extractor returned no visitorData"));
        };

        Ok(OriginTokens {
            streaming_token: extracted.streaming_po_token.or_else(|| Some(visitor_data.clone())),
            player_token: extracted.player_po_token,
            visitor_id: Some(visitor_data),
            fetched_at: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, sync::Mutex as StdMutex};

    use async_trait::async_trait;

    #[derive(Default)]
    struct MemoryKv {
        data: StdMutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }
        async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
            self.data.lock().unwrap().insert(key.to_owned(), value);
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }

    struct StubBrowser;

    #[async_trait]
    impl BrowserContext for StubBrowser {
        async fn load_url(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn eval_javascript(&self, _script: &str) -> Result<String> {
            Ok(r#"{"visitorData":"visitor-1","playerPoToken":"player-1","streamingPoToken":"stream-1"}"#.to_owned())
        }
    }

    #[tokio::test]
    async fn generation_persists_and_is_readable_back() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::default());
        let manager = TokenManager::new(Arc::clone(&kv), Arc::new(StubBrowser));

        let tokens = manager.generate().await.unwrap();
        assert_eq!(tokens.visitor_id.as_deref(), Some("visitor-1"));
        assert_eq!(tokens.streaming_token.as_deref(), Some("stream-1"));

        let reloaded = TokenManager::new(kv, Arc::new(StubBrowser));
        let snapshot = reloaded.snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.visitor_id, tokens.visitor_id);
    }

    #[tokio::test]
    async fn invalidate_clears_state() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::default());
        let manager = TokenManager::new(kv, Arc::new(StubBrowser));
        manager.generate().await.unwrap();
        manager.invalidate().await.unwrap();
        assert!(manager.snapshot().await.unwrap().is_none());
    }

    #[test]
    fn tokens_expire_after_ttl() {
        let tokens = OriginTokens {
            streaming_token: Some("s".into()),
            player_token: None,
            visitor_id: Some("v".into()),
            fetched_at: SystemTime::now(),
        };
        assert!(tokens.is_valid_at(SystemTime::now()));
        assert!(!tokens.is_valid_at(SystemTime::now() + OriginTokens::TTL + Duration::from_secs(1)));
    }
}
