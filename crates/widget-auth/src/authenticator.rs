//! Login and password-reset flows

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use sha2::{Digest, Sha256};
use widget_core::{StoreError, TokenStore, User, UserStore};

use crate::cipher::EmailCipher;
use crate::error::{AuthError, Result};
use crate::password::{hash_password, verify_password};
use crate::signer::{LinkSigner, LinkStatus};
use crate::token::{BearerTokens, IssuedToken};

/// Authenticator configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared secret for link signatures and the email cipher
    pub secret: String,

    /// Base URL of the front-end that serves `/reset-password`
    pub frontend_url: String,

    pub token_ttl: Duration,

    pub reset_link_max_age: Duration,

    /// Bound on each storage call
    pub timeout: StdDuration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"***redacted***")
            .field("frontend_url", &self.frontend_url)
            .field("token_ttl", &self.token_ttl)
            .field("reset_link_max_age", &self.reset_link_max_age)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            frontend_url: "http://localhost:4000".into(),
            token_ttl: Duration::hours(24),
            reset_link_max_age: Duration::minutes(60),
            timeout: StdDuration::from_secs(5),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("SIGNING_SECRET")
            .map_err(|_| AuthError::Config("SIGNING_SECRET not set".into()))?;
        let mut config = Self::new(secret);

        if let Ok(url) = std::env::var("FRONTEND_URL") {
            config.frontend_url = url;
        }
        if let Some(hours) = env_number("TOKEN_TTL_HOURS") {
            config.token_ttl = Duration::hours(hours);
        }
        if let Some(minutes) = env_number("RESET_LINK_MAX_AGE_MINUTES") {
            config.reset_link_max_age = Duration::minutes(minutes);
        }
        if let Some(secs) = env_number("EXTERNAL_TIMEOUT_SECS") {
            config.timeout = StdDuration::from_secs(secs.unsigned_abs());
        }
        Ok(config)
    }
}

fn env_number(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Independent key for one use of the shared secret
fn subkey(purpose: &str, secret: &str) -> [u8; 32] {
    Sha256::new()
        .chain_update(purpose.as_bytes())
        .chain_update(b":")
        .chain_update(secret.as_bytes())
        .finalize()
        .into()
}

fn email_from_link(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("email="))
        .and_then(|raw| urlencoding::decode(raw).ok())
        .map(|email| email.into_owned())
}

/// Credential flows over the user and token stores
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    tokens: BearerTokens,
    signer: LinkSigner,
    cipher: EmailCipher,
    frontend_url: String,
    reset_link_max_age: Duration,
    timeout: StdDuration,
}

impl Authenticator {
    pub fn new(
        users: Arc<dyn UserStore>,
        token_store: Arc<dyn TokenStore>,
        config: AuthConfig,
    ) -> Result<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::Config("signing secret is empty".into()));
        }
        Ok(Self {
            users,
            tokens: BearerTokens::new(token_store, config.token_ttl, config.timeout),
            signer: LinkSigner::new(subkey("link", &config.secret))?,
            cipher: EmailCipher::from_secret(&subkey("cipher", &config.secret))?,
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            reset_link_max_age: config.reset_link_max_age,
            timeout: config.timeout,
        })
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = widget_core::Result<T>>,
    ) -> Result<T> {
        Ok(tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)??)
    }

    async fn user_by_email(&self, email: &str) -> Result<User> {
        match self.bounded(self.users.get_user_by_email(email)).await {
            Err(AuthError::Store(e)) if e.is_not_found() => Err(AuthError::UnknownUser),
            other => other,
        }
    }

    /// Exchange email + password for a fresh bearer token
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<IssuedToken> {
        let user = self.user_by_email(email).await?;
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::PasswordMismatch);
        }

        let issued = self.tokens.issue(user.id).await?;
        tracing::info!(user_id = user.id, "Issued authentication token");
        Ok(issued)
    }

    /// Resolve an Authorization header value to its user
    pub async fn verify_bearer(&self, header: Option<&str>) -> Result<User> {
        self.tokens.verify(header).await
    }

    /// Signed `/reset-password` link for `email`, without checking the user exists
    pub fn sign_reset_link(&self, email: &str) -> Result<String> {
        let link = format!(
            "{}/reset-password?email={}",
            self.frontend_url,
            urlencoding::encode(email)
        );
        self.signer.sign(&link)
    }

    /// Signed reset link for a registered user
    pub async fn reset_link_for(&self, email: &str) -> Result<String> {
        let user = self.user_by_email(email).await?;
        self.sign_reset_link(&user.email)
    }

    pub fn verify_reset_link(&self, url: &str) -> LinkStatus {
        self.signer.check(url, self.reset_link_max_age)
    }

    /// Validate a reset link and return its email encrypted for the reset form
    pub fn open_reset_link(&self, url: &str) -> Result<String> {
        match self.verify_reset_link(url) {
            LinkStatus::Invalid => Err(AuthError::InvalidLink),
            LinkStatus::Expired => Err(AuthError::ExpiredLink),
            LinkStatus::Valid => {
                let email = email_from_link(url).ok_or(AuthError::InvalidLink)?;
                self.cipher.encrypt(&email)
            }
        }
    }

    /// Set a new password for the user behind an encrypted email
    pub async fn reset_password(&self, encrypted_email: &str, password: &str) -> Result<()> {
        let email = self.cipher.decrypt(encrypted_email)?;
        let user = self.user_by_email(&email).await?;
        let hash = hash_password(password)?;
        self.bounded(self.users.update_password(user.id, &hash)).await?;

        tracing::info!(user_id = user.id, "Password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use widget_core::{MemoryStore, NewUser};

    use super::*;

    const SECRET: &str = "abcdefghijklmnopqrstuvwxyz012345";

    async fn setup() -> (Authenticator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .add_user(
                NewUser {
                    first_name: "Ada".into(),
                    last_name: "Admin".into(),
                    email: "admin@example.com".into(),
                },
                &hash_password("password").unwrap(),
            )
            .await
            .unwrap();
        let auth = Authenticator::new(store.clone(), store.clone(), AuthConfig::new(SECRET)).unwrap();
        (auth, store)
    }

    #[tokio::test]
    async fn test_authenticate_and_verify() {
        let (auth, _) = setup().await;
        let issued = auth.authenticate("admin@example.com", "password").await.unwrap();
        let header = format!("Bearer {}", issued.token);
        let user = auth.verify_bearer(Some(&header)).await.unwrap();
        assert_eq!(user.email, "admin@example.com");
    }

    #[tokio::test]
    async fn test_bad_credentials_look_identical() {
        let (auth, _) = setup().await;
        let wrong_password = auth.authenticate("admin@example.com", "nope").await.unwrap_err();
        let unknown = auth.authenticate("ghost@example.com", "password").await.unwrap_err();
        assert!(matches!(wrong_password, AuthError::PasswordMismatch));
        assert!(matches!(unknown, AuthError::UnknownUser));
        assert_eq!(wrong_password.user_message(), unknown.user_message());
    }

    #[tokio::test]
    async fn test_reset_flow() {
        let (auth, store) = setup().await;
        let link = auth.reset_link_for("admin@example.com").await.unwrap();
        assert!(link.starts_with("http://localhost:4000/reset-password?email=admin%40example.com&hash="));
        assert_eq!(auth.verify_reset_link(&link), LinkStatus::Valid);

        let encrypted = auth.open_reset_link(&link).unwrap();
        assert!(!encrypted.contains("admin"));

        auth.reset_password(&encrypted, "new-password").await.unwrap();
        let user = store.get_user_by_email("admin@example.com").await.unwrap();
        assert!(verify_password("new-password", &user.password_hash));
        assert!(auth.authenticate("admin@example.com", "new-password").await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_link_for_unknown_email() {
        let (auth, _) = setup().await;
        assert!(matches!(
            auth.reset_link_for("ghost@example.com").await,
            Err(AuthError::UnknownUser)
        ));
    }

    #[tokio::test]
    async fn test_tampered_reset_link_rejected() {
        let (auth, _) = setup().await;
        let link = auth.sign_reset_link("admin@example.com").unwrap();
        let forged = link.replace("admin%40", "root%40");
        assert_eq!(auth.verify_reset_link(&forged), LinkStatus::Invalid);
        assert!(matches!(auth.open_reset_link(&forged), Err(AuthError::InvalidLink)));
        assert!(auth.reset_password("garbage", "pw").await.is_err());
    }

    #[tokio::test]
    async fn test_link_and_cipher_keys_are_separate() {
        let (auth, _) = setup().await;
        let link = auth.sign_reset_link("admin@example.com").unwrap();
        let encrypted = auth.open_reset_link(&link).unwrap();

        assert_ne!(subkey("link", SECRET), subkey("cipher", SECRET));
        assert!(!LinkSigner::new(SECRET).unwrap().verify(&link));
        assert!(LinkSigner::new(subkey("link", SECRET)).unwrap().verify(&link));
        assert!(EmailCipher::from_secret(SECRET.as_bytes()).unwrap().decrypt(&encrypted).is_err());
        assert!(
            EmailCipher::from_secret(&subkey("link", SECRET))
                .unwrap()
                .decrypt(&encrypted)
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_empty_secret_rejected() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            Authenticator::new(store.clone(), store, AuthConfig::new("")),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_email_from_link() {
        assert_eq!(
            email_from_link("http://x/reset-password?email=a%2Bb%40c.com&hash=1.ab").as_deref(),
            Some("a+b@c.com")
        );
        assert_eq!(email_from_link("http://x/reset-password?hash=1.ab"), None);
    }
}
