//! Signed Capability Links
//!
//! A link carries `hash=<unix-seconds>.<hex hmac>` as its last query
//! parameter. The MAC covers everything up to and including `hash=` plus the
//! timestamp, so validity is recomputed on every check and nothing is stored.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AuthError, Result};

type HmacSha256 = Hmac<Sha256>;

const HASH_PARAM: &str = "hash=";

/// Outcome of checking a presented link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Valid,
    /// Signature holds but the link is older than the allowed age
    Expired,
    Invalid,
}

/// HMAC signer for capability links
#[derive(Clone)]
pub struct LinkSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSigner")
            .field("secret", &"***redacted***")
            .finish()
    }
}

struct SignedParts<'a> {
    /// URL up to and including `hash=`
    prefix: &'a str,
    timestamp: &'a str,
    signature: &'a str,
}

fn split_signed(url: &str) -> Option<SignedParts<'_>> {
    let idx = url.rfind(HASH_PARAM)?;
    if !matches!(url[..idx].chars().last(), Some('?' | '&')) {
        return None;
    }
    let (prefix, token) = url.split_at(idx + HASH_PARAM.len());
    let (timestamp, signature) = token.split_once('.')?;
    Some(SignedParts {
        prefix,
        timestamp,
        signature,
    })
}

impl LinkSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::Config("link signing secret is empty".into()));
        }
        Ok(Self { secret })
    }

    fn mac(&self, prefix: &str, timestamp: &str) -> Result<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|_| AuthError::Config("invalid HMAC key".into()))?;
        mac.update(prefix.as_bytes());
        mac.update(timestamp.as_bytes());
        Ok(mac)
    }

    /// Sign `url`, stamping it with the current time
    pub fn sign(&self, url: &str) -> Result<String> {
        self.sign_at(url, Utc::now())
    }

    pub fn sign_at(&self, url: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let separator = if url.contains('?') { '&' } else { '?' };
        let prefix = format!("{url}{separator}{HASH_PARAM}");
        let timestamp = issued_at.timestamp().to_string();
        let signature = hex::encode(self.mac(&prefix, &timestamp)?.finalize().into_bytes());
        Ok(format!("{prefix}{timestamp}.{signature}"))
    }

    /// Whether the signature over `url` and its embedded timestamp holds
    pub fn verify(&self, url: &str) -> bool {
        let Some(parts) = split_signed(url) else {
            return false;
        };
        let Ok(signature) = hex::decode(parts.signature) else {
            return false;
        };
        self.mac(parts.prefix, parts.timestamp)
            .is_ok_and(|mac| mac.verify_slice(&signature).is_ok())
    }

    /// Whether the embedded timestamp is older than `max_age`
    ///
    /// Says nothing about the signature. A link with no readable timestamp
    /// counts as expired.
    pub fn is_expired(&self, url: &str, max_age: Duration) -> bool {
        self.is_expired_at(url, max_age, Utc::now())
    }

    pub fn is_expired_at(&self, url: &str, max_age: Duration, now: DateTime<Utc>) -> bool {
        let issued_at = split_signed(url)
            .and_then(|parts| parts.timestamp.parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        issued_at.is_none_or(|issued_at| now - issued_at > max_age)
    }

    /// Signature and age check combined
    pub fn check(&self, url: &str, max_age: Duration) -> LinkStatus {
        self.check_at(url, max_age, Utc::now())
    }

    pub fn check_at(&self, url: &str, max_age: Duration, now: DateTime<Utc>) -> LinkStatus {
        if !self.verify(url) {
            LinkStatus::Invalid
        } else if self.is_expired_at(url, max_age, now) {
            LinkStatus::Expired
        } else {
            LinkStatus::Valid
        }
    }
}
