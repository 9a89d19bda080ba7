//! Client profiles: the impersonated InnerTube personalities.
//!
//! A static, compile-time table — profile identities are facts about the
//! protocol, not runtime configuration, so they live as associated `const`s
//! rather than config fields.
//!
//! # Example
//!
//! ```rust
//! use ytm_resolver::profile::{self, ProfileName};
//!
//! let android_vr = profile::find(ProfileName::AndroidVr).unwrap();
//! assert!(!android_vr.needs_origin_token);
//! assert_eq!(profile::PLAYBACK_ORDER[0].name, ProfileName::AndroidVr);
//! ```

use std::fmt;
use std::sync::LazyLock;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use serde_json::json;

use crate::error::Result;

/// Identifies one of the static client profiles.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProfileName {
    /// Primary playback profile: Android running inside a VR/headset shell.
    AndroidVr,
    /// First playback fallback.
    Ios,
    /// Last-resort playback fallback.
    AndroidMusic,
    /// Metadata-only web profile; also a rare playback fallback.
    WebRemix,
    /// Alternative web profile, same capability flags as `WebRemix`.
    Web,
    /// Embed-path fallback.
    TvEmbedded,
}

impl ProfileName {
    /// The profile's name as a `'static` string, for use in logging and the
    /// resolver-facing [`crate::error::Failure`] taxonomy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AndroidVr => "AndroidVR",
            Self::Ios => "iOS",
            Self::AndroidMusic => "AndroidMusic",
            Self::WebRemix => "WebRemix",
            Self::Web => "Web",
            Self::TvEmbedded => "TvEmbedded",
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An impersonated InnerTube client identity.
///
/// Immutable and process-lifetime: constructed once in
/// [`REGISTRY`] and never mutated.
#[derive(Clone, Debug)]
pub struct ClientProfile {
    /// Identity used for logging, throttle bookkeeping, and error reporting.
    pub name: ProfileName,
    /// Numeric `X-YouTube-Client-Name` header value.
    client_name_header: &'static str,
    /// `X-YouTube-Client-Version` header value.
    client_version: &'static str,
    /// `User-Agent` header value.
    user_agent: &'static str,
    /// Origin/Referer pair, present only for web-shaped profiles.
    origin: Option<&'static str>,
    /// The `context.client` object merged into every player RPC body.
    pub context: serde_json::Value,
    /// Whether this profile must present an origin (Po) token to be served.
    pub needs_origin_token: bool,
    /// Whether this profile's URLs come back signature-ciphered.
    pub supports_signature_cipher: bool,
}

impl ClientProfile {
    /// Builds this profile's fixed header set.
    ///
    /// # Errors
    ///
    /// Returns an error if any header value contains invalid bytes (never
    /// happens for the built-in registry; kept fallible because the values
    /// pass through `HeaderValue::from_static`-equivalent parsing).
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(self.user_agent)?);
        headers.insert(
            "X-YouTube-Client-Name",
            HeaderValue::from_str(self.client_name_header)?,
        );
        headers.insert(
            "X-YouTube-Client-Version",
            HeaderValue::from_str(self.client_version)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

        if let Some(origin) = self.origin {
            headers.insert(ORIGIN, HeaderValue::from_str(origin)?);
            headers.insert(REFERER, HeaderValue::from_str(origin)?);
        }

        Ok(headers)
    }
}

/// The full static registry, in no particular order. Use [`find`] or the
/// ordered slices below instead of indexing this directly.
static REGISTRY: LazyLock<Vec<ClientProfile>> = LazyLock::new(|| {
    vec![
    ClientProfile {
        name: ProfileName::AndroidVr,
        client_name_header: "28",
        client_version: "1.57.33",
        user_agent: "com.google.android.apps.youtube.vr.oculus/1.57.33 (Linux; U; Android 12; en_US) gzip",
        origin: None,
        context: json_client("ANDROID_VR", "1.57.33"),
        needs_origin_token: false,
        supports_signature_cipher: false,
    },
    ClientProfile {
        name: ProfileName::Ios,
        client_name_header: "5",
        client_version: "19.45.4",
        user_agent: "com.google.ios.youtube/19.45.4 (iPhone16,2; U; CPU iOS 17_5_1 like Mac OS X;)",
        origin: None,
        context: json_client("IOS", "19.45.4"),
        needs_origin_token: false,
        supports_signature_cipher: false,
    },
    ClientProfile {
        name: ProfileName::AndroidMusic,
        client_name_header: "21",
        client_version: "7.16.53",
        user_agent: "com.google.android.apps.youtube.music/7.16.53 (Linux; U; Android 12) gzip",
        origin: None,
        context: json_client("ANDROID_MUSIC", "7.16.53"),
        needs_origin_token: false,
        supports_signature_cipher: false,
    },
    ClientProfile {
        name: ProfileName::WebRemix,
        client_name_header: "67",
        client_version: "1.20240101.01.00",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        origin: Some("https://music.youtube.com"),
        context: json_client("WEB_REMIX", "1.20240101.01.00"),
        needs_origin_token: true,
        supports_signature_cipher: true,
    },
    ClientProfile {
        name: ProfileName::Web,
        client_name_header: "1",
        client_version: "2.20240101.01.00",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        origin: Some("https://www.youtube.com"),
        context: json_client("WEB", "2.20240101.01.00"),
        needs_origin_token: true,
        supports_signature_cipher: true,
    },
    ClientProfile {
        name: ProfileName::TvEmbedded,
        client_name_header: "85",
        client_version: "2.0",
        user_agent: "Mozilla/5.0 (PlayStation; PlayStation 4/12.00) AppleWebKit/605.1.15 (KHTML, like Gecko)",
        origin: Some("https://www.youtube.com"),
        context: json_client("TVHTML5_SIMPLY_EMBEDDED_PLAYER", "2.0"),
        needs_origin_token: false,
        supports_signature_cipher: true,
    },
    ]
});

/// Builds the `context.client` body fragment for a profile.
fn json_client(name: &str, version: &str) -> serde_json::Value {
    json!({
        "clientName": name,
        "clientVersion": version,
        "hl": "en",
        "gl": "US",
    })
}

/// Playback order, exactly as mandates: AndroidVR, iOS,
/// AndroidMusic. `WebRemix`/`Web`/`TvEmbedded` are deliberately excluded
/// from this slice so the playback fingerprinting surface stays small.
pub static PLAYBACK_ORDER: LazyLock<Vec<&'static ClientProfile>> =
    LazyLock::new(|| vec![&REGISTRY[0], &REGISTRY[1], &REGISTRY[2]]);

/// The metadata profile.
pub static METADATA: LazyLock<&'static ClientProfile> = LazyLock::new(|| &REGISTRY[3]);

/// Looks up a profile by name.
#[must_use]
pub fn find(name: ProfileName) -> Option<&'static ClientProfile> {
    REGISTRY.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_order_is_exact() {
        let names: Vec<_> = PLAYBACK_ORDER.iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![ProfileName::AndroidVr, ProfileName::Ios, ProfileName::AndroidMusic]
        );
    }

    #[test]
    fn playback_profiles_have_no_origin_token_requirement() {
        for profile in PLAYBACK_ORDER.iter() {
            assert!(!profile.needs_origin_token);
        }
    }

    #[test]
    fn metadata_profile_is_token_bound_and_cipher_capable() {
        assert!(METADATA.needs_origin_token);
        assert!(METADATA.supports_signature_cipher);
    }

    #[test]
    fn headers_build_without_error() {
        for profile in REGISTRY.iter() {
            profile.headers().expect("profile headers must be valid");
        }
    }
}
