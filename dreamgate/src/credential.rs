//! Credential parsing and session identity.
//!
//! The upstream authenticates with an opaque refresh token. Clients pass it
//! as a bearer token; an optional region prefix (`US:`, `HK:`) selects the
//! upstream deployment, with CN as the default. A stable session identifier
//! is derived from the token by hashing, and is what the quota ledger keys
//! its daily counters on.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hex characters of the MD5 digest used in session identifiers.
const SESSION_ID_HEX_LEN: usize = 16;

/// Upstream deployment region.
///
/// The region selects endpoint hosts, the SigV4 signing region, the
/// referring origin sent to the blob store, and per-region model
/// availability. HK also covers the SG/JP points of presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Mainland deployment ("Jimeng").
    Cn,
    /// US deployment ("Dreamina").
    Us,
    /// Hong Kong / Singapore / Japan deployment ("Dreamina").
    Hk,
}

impl Region {
    /// Returns the short name used in logs and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cn => "cn",
            Self::Us => "us",
            Self::Hk => "hk",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed client credential.
///
/// Wraps the raw refresh token together with the region encoded in its
/// prefix. The token itself is opaque; it is forwarded verbatim to the
/// upstream session endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    region: Region,
    token: String,
}

impl Credential {
    /// Parses a raw credential string.
    ///
    /// A `US:` or `HK:` prefix (case-insensitive) selects the region and is
    /// stripped from the token; anything else is treated as a CN token.
    /// Whitespace around the input is trimmed.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let upper = raw.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("US:") {
            let _ = rest;
            return Self {
                region: Region::Us,
                token: raw[3..].to_string(),
            };
        }
        if upper.starts_with("HK:") || upper.starts_with("SG:") || upper.starts_with("JP:") {
            return Self {
                region: Region::Hk,
                token: raw[3..].to_string(),
            };
        }
        Self {
            region: Region::Cn,
            token: raw.to_string(),
        }
    }

    /// Returns the deployment region encoded in the credential.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Returns the refresh token with any region prefix stripped.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Derives the stable session identifier for quota accounting.
    ///
    /// Format: `session_` followed by the first 16 hex characters of the
    /// MD5 digest of the full original credential (prefix included, so the
    /// same token used against two regions counts separately).
    pub fn session_id(&self) -> String {
        let mut hasher = Md5::new();
        match self.region {
            Region::Cn => hasher.update(self.token.as_bytes()),
            Region::Us => {
                hasher.update(b"US:");
                hasher.update(self.token.as_bytes());
            }
            Region::Hk => {
                hasher.update(b"HK:");
                hasher.update(self.token.as_bytes());
            }
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        format!("session_{}", &hex[..SESSION_ID_HEX_LEN])
    }

    /// Returns true if the token is empty after prefix stripping.
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the raw token.
        f.debug_struct("Credential")
            .field("region", &self.region)
            .field("token_len", &self.token.len())
            .field("session", &self.session_id())
            .finish()
    }
}
