//! Bearer Tokens
//!
//! Opaque API credentials. The plaintext is handed to the caller exactly
//! once; storage only ever sees `SHA-256(plaintext)`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE32_NOPAD;
use rand::{RngCore, rngs::OsRng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use widget_core::{StoreError, StoredToken, TokenStore, User};

use crate::error::{AuthError, Result};

/// Random bytes per token
const TOKEN_BYTES: usize = 16;

/// Encoded length of a token (16 bytes, base32, no padding)
pub const TOKEN_LENGTH: usize = 26;

pub const SCOPE_AUTHENTICATION: &str = "authentication";

/// Token returned to the caller once
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"***redacted***")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// SHA-256 of a presented token
pub fn hash_token(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_from_header(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

fn generate(user_id: i64, ttl: Duration, scope: &str, now: DateTime<Utc>) -> (IssuedToken, StoredToken) {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = BASE32_NOPAD.encode(&bytes);
    let expiry = now + ttl;

    let stored = StoredToken {
        hash: hash_token(&plaintext),
        user_id,
        expiry,
        scope: scope.to_string(),
    };
    (
        IssuedToken {
            token: plaintext,
            expiry,
        },
        stored,
    )
}

/// Issues and verifies bearer tokens against a token store
#[derive(Clone)]
pub struct BearerTokens {
    store: Arc<dyn TokenStore>,
    ttl: Duration,
    timeout: StdDuration,
}

impl BearerTokens {
    pub fn new(store: Arc<dyn TokenStore>, ttl: Duration, timeout: StdDuration) -> Self {
        Self {
            store,
            ttl,
            timeout,
        }
    }

    /// Issue a new token for `user_id`, replacing any previous one
    pub async fn issue(&self, user_id: i64) -> Result<IssuedToken> {
        self.issue_at(user_id, Utc::now()).await
    }

    pub async fn issue_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<IssuedToken> {
        let (issued, stored) = generate(user_id, self.ttl, SCOPE_AUTHENTICATION, now);
        tokio::time::timeout(self.timeout, self.store.insert_token(stored))
            .await
            .map_err(|_| StoreError::Timeout)??;

        tracing::debug!(user_id, expiry = %issued.expiry, "Issued bearer token");
        Ok(issued)
    }

    /// Resolve the user behind an Authorization header value
    pub async fn verify(&self, header: Option<&str>) -> Result<User> {
        self.verify_at(header, Utc::now()).await
    }

    pub async fn verify_at(&self, header: Option<&str>, now: DateTime<Utc>) -> Result<User> {
        let token = bearer_from_header(header)?;
        if token.len() != TOKEN_LENGTH {
            return Err(AuthError::MalformedToken);
        }

        let hash = hash_token(token);
        tokio::time::timeout(self.timeout, self.store.get_user_for_token(&hash, now))
            .await
            .map_err(|_| StoreError::Timeout)??
            .ok_or(AuthError::UnknownToken)
    }
}
