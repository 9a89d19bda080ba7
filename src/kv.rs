//! Host-provided storage and browser interfaces.
//!
//! This crate never touches a filesystem or embeds a JavaScript engine; the
//! host application supplies these through narrow trait objects instead.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Small-value key/value store, used for origin tokens and lyric records.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a value, or `Ok(None)` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Writes a value, replacing any existing one.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    /// Removes a key. A no-op if it was already absent.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Persistent tier of the stream cache.
///
/// Distinct from [`KvStore`] because the stream cache needs iteration to
/// enforce its 100-entry LRU cap; a plain KV store does not.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Reads a raw, still-encoded record plus the Unix-epoch seconds it was
    /// written at, or `Ok(None)` if absent.
    async fn get(&self, video_id: &str) -> Result<Option<(Vec<u8>, u64)>>;
    /// Writes a raw, encoded record, tagged with the current time.
    async fn set(&self, video_id: &str, value: Vec<u8>, written_at: u64) -> Result<()>;
    /// Removes one entry. A no-op if it was already absent.
    async fn delete(&self, video_id: &str) -> Result<()>;
    /// Removes every entry.
    async fn clear(&self) -> Result<()>;
    /// Lists every stored video id, oldest-written first, for LRU trimming.
    async fn keys_oldest_first(&self) -> Result<Vec<String>>;
}

/// A JavaScript-capable browser context, used by [`crate::token`] to run the
/// origin-token challenge.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Navigates to `url` and waits for the page-finished signal.
    async fn load_url(&self, url: &str) -> Result<()>;
    /// Evaluates `script` in the page and returns its string result.
    async fn eval_javascript(&self, script: &str) -> Result<String>;
}

/// A process-local, non-persistent [`KvStore`]. Useful for tests and as a
/// starter implementation; anything stored here does not survive a restart.
#[derive(Default)]
pub struct InMemoryKv {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), value);
        Ok(())
    }
    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
        Ok(())
    }
}

/// A process-local, non-persistent [`StreamStore`]. Useful for tests and as
/// a starter implementation.
#[derive(Default)]
pub struct InMemoryStreamStore {
    data: Mutex<HashMap<String, (Vec<u8>, u64)>>,
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn get(&self, video_id: &str) -> Result<Option<(Vec<u8>, u64)>> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(video_id)
            .cloned())
    }
    async fn set(&self, video_id: &str, value: Vec<u8>, written_at: u64) -> Result<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(video_id.to_owned(), (value, written_at));
        Ok(())
    }
    async fn delete(&self, video_id: &str) -> Result<()> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).remove(video_id);
        Ok(())
    }
    async fn clear(&self) -> Result<()> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
    async fn keys_oldest_first(&self) -> Result<Vec<String>> {
        let mut entries: Vec<_> = self
            .data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, (_, written_at))| (k.clone(), *written_at))
            .collect();
        entries.sort_by_key(|(_, written_at)| *written_at);
        Ok(entries.into_iter().map(|(k, _)| k).collect())
    }
}

/// A [`BrowserContext`] that cannot actually run anything. Lets the resolver
/// be constructed and used for non-token-gated profiles without a real
/// browser; any origin-token generation attempt fails with
/// [`crate::error::ErrorKind::Unimplemented`].
pub struct UnimplementedBrowser;

#[async_trait]
impl BrowserContext for UnimplementedBrowser {
    async fn load_url(&self, _url: &str) -> Result<()> {
        Err(Error::unimplemented("no browser context configured"))
    }
    async fn eval_javascript(&self, _script: &str) -> Result<String> {
        Err(Error::unimplemented("no browser context configured"))
    }
}
