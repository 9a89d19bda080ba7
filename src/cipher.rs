//! Signature cipher extraction and decoding.
//!
//! Fetches the player page, regexes out the player script URL, fetches that,
//! regexes out the cipher function fragments, assembles a derived value, and
//! caches it: an ordered list of string transforms.
//!
//! The regex suite is deliberately treated as versioned configuration: when
//! YouTube's player blob format changes, the fix is a new pattern here, not
//! a rewrite of this module.

use std::collections::HashMap;

use regex_lite::Regex;
use tokio::sync::RwLock;
use url::Url;

use crate::{
    error::{Error, Result},
    http::Transport,
};

/// One step in a signature transform.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CipherStep {
    /// Reverse the character array.
    Reverse,
    /// Drop the first `k` characters. No-op if `k >= len`.
    Splice(usize),
    /// Swap index 0 with index `k mod len`.
    Swap(usize),
}

/// An ordered, memoized transform derived from one player blob.
#[derive(Clone, Debug)]
pub struct CipherSteps {
    /// The blob this sequence was derived from.
    pub player_blob_url: Url,
    /// Steps to apply, in order.
    pub steps: Vec<CipherStep>,
}

impl CipherSteps {
    /// Applies every step in order and returns the transformed string.
    #[must_use]
    pub fn apply(&self, signature: &str) -> String {
        let mut chars: Vec<char> = signature.chars().collect();
        for step in &self.steps {
            match *step {
                CipherStep::Reverse => chars.reverse(),
                CipherStep::Splice(k) => {
                    let k = k.min(chars.len());
                    chars.drain(..k);
                }
                CipherStep::Swap(k) => {
                    if !chars.is_empty() {
                        let k = k % chars.len();
                        chars.swap(0, k);
                    }
                }
            }
        }
        chars.into_iter().collect()
    }
}

/// The decoded pieces of a `signatureCipher` query string.
#[derive(Clone, Debug)]
pub struct SignatureCipher {
    /// The base URL, still missing its signature query parameter.
    pub url: String,
    /// The ciphered signature.
    pub s: String,
    /// Name of the query parameter the decoded signature is appended under.
    pub sp: String,
}

impl SignatureCipher {
    /// Parses a `signatureCipher` envelope (`url=...&s=...&sp=...`).
    ///
    /// # Errors
    ///
    /// Returns an error if any of `url`, `s`, or `sp` is missing.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut url = None;
        let mut s = None;
        let mut sp = None;
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "url" => url = Some(value.into_owned()),
                "s" => s = Some(value.into_owned()),
                "sp" => sp = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(Self {
            url: url.ok_or_else(|| Error::invalid_argument("signatureCipher missing url"))?,
            s: s.ok_or_else(|| Error::invalid_argument("signatureCipher missing s"))?,
            sp: sp.unwrap_or_else(|| "sig".to_owned()),
        })
    }
}

/// Conservative fallback signature timestamp.
const DEFAULT_SIGNATURE_TIMESTAMP: u32 = 20073;

/// Extracts and memoizes per-blob cipher steps, and scrapes the signature
/// timestamp off the embed page.
pub struct Cipher {
    memo: RwLock<HashMap<String, CipherSteps>>,
    blob_url_re: Regex,
    sts_re: Regex,
    outer_fn_set_re: Regex,
    outer_fn_split_re: Regex,
    helper_callee_re: Regex,
    swap_body_re: Regex,
}

impl Cipher {
    /// Builds a new, empty cipher cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            memo: RwLock::new(HashMap::new()),
            blob_url_re: Regex::new(r#"(?:"jsUrl":"([^"]+)")|(/s/player/[\w.]+/base\.js)"#)
                .expect("static regex"),
            sts_re: Regex::new(r#""sts"\s*:\s*(\d+)"#).expect("static regex"),
            outer_fn_set_re: Regex::new(
                r#"\.set\s*\(\s*"[^"]+"\s*,\s*encodeURIComponent\s*\(\s*([a-zA-Z0-9$]+)\("#,
            )
            .expect("static regex"),
            outer_fn_split_re: Regex::new(
                r#"([a-zA-Z0-9$]+)\s*=\s*function\s*\(\s*[a-zA-Z0-9$]+\s*\)\s*\{\s*[a-zA-Z0-9$]+\s*=\s*[a-zA-Z0-9$]+\.split\(""\)"#,
            )
            .expect("static regex"),
            helper_callee_re: Regex::new(r#";\s*([a-zA-Z0-9$]+)\.[a-zA-Z0-9$]+\("#)
                .expect("static regex"),
            swap_body_re: Regex::new(r#"\[0\]\s*="#).expect("static regex"),
        }
    }

    /// Fetches the embed page and returns the player blob URL and signature
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the embed page fetch fails or no blob URL can be
    /// located in it.
    pub async fn embed_info(&self, transport: &Transport, any_video_id: &str) -> Result<(Url, u32)> {
        let embed_url = Url::parse(&format!("https://www.youtube.com/embed/{any_video_id}"))?;
        let body = transport.fetch_text(&embed_url).await?;

        let captures = self
            .blob_url_re
            .captures(&body)
            .ok_or_else(|| Error::not_found("player blob URL not found on embed page"))?;
        let raw = captures
            .get(1)
            .or_else(|| captures.get(2))
            .ok_or_else(|| Error::not_found("player blob URL capture empty"))?
            .as_str();
        let blob_url = Url::parse("https://www.youtube.com")?.join(raw)?;

        let sts = self
            .sts_re
            .captures(&body)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(DEFAULT_SIGNATURE_TIMESTAMP);

        Ok((blob_url, sts))
    }

    /// Returns the cipher steps for `blob_url`, deriving and memoizing them
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob can't be fetched or its structure
    /// doesn't match any known pattern.
    pub async fn steps_for(&self, transport: &Transport, blob_url: &Url) -> Result<CipherSteps> {
        if let Some(steps) = self.memo.read().await.get(blob_url.as_str()) {
            return Ok(steps.clone());
        }

        let body = transport.fetch_text(blob_url).await?;
        let steps = self.derive_steps(blob_url, &body)?;

        self.memo
            .write()
            .await
            .insert(blob_url.as_str().to_owned(), steps.clone());
        Ok(steps)
    }

    /// Parses the decryption function and helper object out of a player
    /// blob's source text.
    fn derive_steps(&self, blob_url: &Url, body: &str) -> Result<CipherSteps> {
        let fn_name = self
            .outer_fn_set_re
            .captures(body)
            .or_else(|| self.outer_fn_split_re.captures(body))
            .and_then(|c| c.get(1))
            .ok_or_else(|| Error::not_found("decryption function not found in player blob"))?
            .as_str();

        let fn_start = body
            .find(&format!("{fn_name}=function"))
            .or_else(|| body.find(&format!("function {fn_name}(")))
            .ok_or_else(|| Error::not_found("decryption function body not found"))?;
        let fn_body = balanced_braces(body, fn_start)
            .ok_or_else(|| Error::internal("unbalanced braces in decryption function"))?;

        let helper_name = self
            .helper_callee_re
            .captures(fn_body)
            .and_then(|c| c.get(1))
            .ok_or_else(|| Error::not_found("helper object callee not found"))?
            .as_str();

        let helper_start = body
            .find(&format!("var {helper_name}="))
            .or_else(|| body.find(&format!("{helper_name}=")))
            .ok_or_else(|| Error::not_found("helper object literal not found"))?;
        let helper_body = balanced_braces(body, helper_start)
            .ok_or_else(|| Error::internal("unbalanced braces in helper object"))?;

        let kinds = self.classify_methods(helper_body);

        let call_re = Regex::new(&format!(
            r#"{}\.([a-zA-Z0-9$]+)\(\s*[a-zA-Z0-9$]+(?:\s*,\s*(\d+))?\s*\)"#,
            regex_lite::escape(helper_name)
        ))
        .map_err(|e| Error::internal(e.to_string()))?;

        let mut steps = Vec::new();
        for captures in call_re.captures_iter(fn_body) {
            let method = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let Some(kind) = kinds.get(method) else {
                continue;
            };
            let param: usize = captures
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            steps.push(match kind {
                MethodKind::Reverse => CipherStep::Reverse,
                MethodKind::Splice => CipherStep::Splice(param),
                MethodKind::Swap => CipherStep::Swap(param),
            });
        }

        if steps.is_empty() {
            return Err(Error::not_found("no cipher steps parsed from player blob"));
        }

        Ok(CipherSteps {
            player_blob_url: blob_url.clone(),
            steps,
        })
    }

    /// Classifies each `name:function(a,b){...}` entry in a helper object
    /// literal's body by the operation its body performs.
    fn classify_methods(&self, helper_body: &str) -> HashMap<String, MethodKind> {
        let entry_re = Regex::new(r#"([a-zA-Z0-9$]+)\s*:\s*function\s*\([^)]*\)\s*\{([^}]*)\}"#)
            .expect("static regex");
        let mut kinds = HashMap::new();
        for captures in entry_re.captures_iter(helper_body) {
            let Some(name) = captures.get(1) else { continue };
            let Some(body) = captures.get(2) else { continue };
            let body = body.as_str();
            let kind = if body.contains(".reverse") {
                MethodKind::Reverse
            } else if body.contains(".splice") {
                MethodKind::Splice
            } else if self.swap_body_re.is_match(body) {
                MethodKind::Swap
            } else {
                continue;
            };
            kinds.insert(name.as_str().to_owned(), kind);
        }
        kinds
    }
}

impl Default for Cipher {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of a helper-object method body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MethodKind {
    Reverse,
    Splice,
    Swap,
}

/// Returns the `{ ... }` slice starting at the first `{` at or after
/// `start`, using balanced-brace matching (step 4: "balanced-brace
/// match suffices in practice").
fn balanced_braces(text: &str, start: usize) -> Option<&str> {
    let open = text[start..].find('{')? + start;
    let mut depth = 0usize;
    for (offset, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_BLOB: &str = r#"
        var abc={
            XY:function(a){a.reverse()},
            QR:function(a,b){a.splice(0,b)},
            ST:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c}
        };
        function decrypt(a){a=a.split("");abc.XY(a);abc.ST(a,3);abc.QR(a,1);return a.join("")}
        ["signature"].set("alr", encodeURIComponent(decrypt(
    "#;

    #[test]
    fn derives_steps_from_fixture_blob() {
        let cipher = Cipher::new();
        let blob_url = Url::parse("https://www.youtube.com/s/player/abc123/base.js").unwrap();
        let steps = cipher.derive_steps(&blob_url, FIXTURE_BLOB).unwrap();
        assert_eq!(
            steps.steps,
            vec![CipherStep::Reverse, CipherStep::Swap(3), CipherStep::Splice(1)]
        );
    }

    #[test]
    fn transform_produces_the_fixtures_expected_signature() {
        let cipher = Cipher::new();
        let blob_url = Url::parse("https://www.youtube.com/s/player/abc123/base.js").unwrap();
        let steps = cipher.derive_steps(&blob_url, FIXTURE_BLOB).unwrap();
        // "abcdefg" -> reverse -> "gfedcba" -> swap(0, 3) -> "dfegcba" -> splice(1) -> "fegcba"
        let once = steps.apply("abcdefg");
        let twice = steps.apply("abcdefg");
        assert_eq!(once, "fegcba");
        assert_eq!(once, twice);
    }

    #[test]
    fn splice_beyond_length_is_a_no_op() {
        let steps = CipherSteps {
            player_blob_url: Url::parse("https://example.com").unwrap(),
            steps: vec![CipherStep::Splice(100)],
        };
        assert_eq!(steps.apply("abc"), "abc");
    }

    #[test]
    fn swap_uses_modular_index() {
        let steps = CipherSteps {
            player_blob_url: Url::parse("https://example.com").unwrap(),
            steps: vec![CipherStep::Swap(5)],
        };
        // len=3, 5 % 3 == 2
        assert_eq!(steps.apply("abc"), "cba");
    }

    #[test]
    fn parses_signature_cipher_envelope() {
        let raw = "s=abcdefg&sp=sig&url=https%3A%2F%2Fhost%2Fv%3Fx%3D1";
        let parsed = SignatureCipher::parse(raw).unwrap();
        assert_eq!(parsed.s, "abcdefg");
        assert_eq!(parsed.sp, "sig");
        assert_eq!(parsed.url, "https://host/v?x=1");
    }
}
