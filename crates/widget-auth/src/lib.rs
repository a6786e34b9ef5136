//! # widget-auth
//!
//! Trust primitives for the widget store:
//!
//! - **Bearer tokens**: 16 random bytes, base32 encoded, returned once.
//!   Only the SHA-256 hash is stored.
//! - **Signed links**: HMAC-SHA256 over a URL plus its issuance timestamp,
//!   appended as a `hash` query parameter. Signature and age are checked
//!   independently.
//! - **Email cipher**: AES-256-GCM with a random nonce prepended, URL-safe
//!   base64, for carrying an address through a reset form.
//!
//! [`Authenticator`] composes them with the user store into the login and
//! password-reset flows.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use widget_auth::{Authenticator, AuthConfig};
//!
//! let auth = Authenticator::new(users, tokens, AuthConfig::from_env()?)?;
//! let issued = auth.authenticate("admin@example.com", "password").await?;
//! let header = format!("Bearer {}", issued.token);
//! let user = auth.verify_bearer(Some(&header)).await?;
//! ```

mod authenticator;
mod cipher;
mod error;
mod password;
mod signer;
mod token;

pub use authenticator::{AuthConfig, Authenticator};
pub use cipher::EmailCipher;
pub use error::{AuthError, Result};
pub use password::{hash_password, verify_password};
pub use signer::{LinkSigner, LinkStatus};
pub use token::{
    BearerTokens, IssuedToken, SCOPE_AUTHENTICATION, TOKEN_LENGTH, bearer_from_header, hash_token,
};
