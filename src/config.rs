//! Resolver configuration.
//!
//! A handful of knobs with sane defaults, most callers never touch
//! directly, rather than a sprawling options builder.
//!
//! # Example
//!
//! ```rust
//! use ytm_resolver::{config::ResolverConfig, format::Quality};
//!
//! let config = ResolverConfig {
//!     default_quality: Quality::High,
//!     ..ResolverConfig::default()
//! };
//! assert_eq!(config.app_lang, "en");
//! ```

use crate::format::Quality;

/// Resolver-wide configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolverConfig {
    /// `User-Agent` sent on transport-level requests that aren't
    /// profile-specific (embed page, player blob, lyrics providers). Player
    /// RPCs use the profile's own `User-Agent` instead.
    pub user_agent: String,

    /// ISO 639-1 language code, used for `context.client.hl` defaults and
    /// the lyrics providers' query locale.
    pub app_lang: String,

    /// Default quality policy when a caller doesn't specify one.
    pub default_quality: Quality,

    /// A video id known to resolve to a valid embed page, used to scrape the
    /// signature timestamp and player blob URL when no
    /// more specific id is already in flight.
    pub embed_probe_video_id: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!(
                "ytm-resolver/",
                env!("CARGO_PKG_VERSION")
            )
            .to_owned(),
            app_lang: "en".to_owned(),
            default_quality: Quality::High,
            embed_probe_video_id: "jNQXAC9IVRw".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let config = ResolverConfig::default();
        assert_eq!(config.app_lang, "en");
        assert_eq!(config.default_quality, Quality::High);
        assert!(!config.embed_probe_video_id.is_empty());
    }
}
