//! Wire types and JSON parsing helpers for the InnerTube player RPC.
//!
//! # Submodules
//!
//! * [`player`] - request/response types for the `/youtubei/v1/player` RPC
//!
//! # Shared Functionality
//!
//! JSON decoding here always goes through [`json`] for consistent error
//! handling and trace logging, and through [`json_off_thread`] when the
//! caller must not block its own task (player responses can
//! exceed 100 KB and must be decoded off the hot path).

pub mod player;

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::{Error, ErrorKind, Result};

/// Parses and logs a JSON response body.
///
/// # Errors
///
/// Returns an error if the body isn't valid JSON or doesn't match `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}

/// Parses a JSON response body on the blocking thread pool.
///
/// Player responses routinely exceed 100 KB; decoding them inline would
/// stall whatever task called the resolver (on a mobile client, often the
/// UI thread via a bridged future). This offloads the decode and reports a
/// worker failure as [`ErrorKind::Internal`].
///
/// # Errors
///
/// Returns an error if the body isn't valid JSON, doesn't match `T`, or the
/// blocking task itself panics.
pub async fn json_off_thread<T>(body: String, origin: &'static str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug + Send + 'static,
{
    tokio::task::spawn_blocking(move || json(&body, origin))
        .await
        .map_err(|e| Error::new(ErrorKind::Internal, e))?
}
