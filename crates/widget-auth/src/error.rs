//! Authentication Error Types

use thiserror::Error;
use widget_core::StoreError;

/// Result type alias
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication and capability errors
///
/// The variants exist for logs. Callers only ever see [`AuthError::user_message`].
#[derive(Error, Debug)]
pub enum AuthError {
    /// No Authorization header was sent
    #[error("Missing authorization header")]
    MissingHeader,

    /// Header present but not `Bearer <token>`
    #[error("Malformed authorization header")]
    MalformedHeader,

    /// Token has the wrong length; rejected before any lookup
    #[error("Malformed token")]
    MalformedToken,

    /// No unexpired token with this hash
    #[error("Unknown or expired token")]
    UnknownToken,

    /// Login with an email that is not registered
    #[error("Unknown user")]
    UnknownUser,

    /// Password did not match
    #[error("Password mismatch")]
    PasswordMismatch,

    /// Signed link failed verification
    #[error("Invalid signed link")]
    InvalidLink,

    /// Signed link is authentic but too old
    #[error("Signed link expired")]
    ExpiredLink,

    /// Cipher input could not be decoded or authenticated
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Password hashing failed
    #[error("Password hash error: {0}")]
    PasswordHash(String),

    /// Rejected input (e.g. empty password)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether this is a credential failure (as opposed to an internal fault)
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingHeader
                | Self::MalformedHeader
                | Self::MalformedToken
                | Self::UnknownToken
                | Self::UnknownUser
                | Self::PasswordMismatch
                | Self::InvalidLink
                | Self::ExpiredLink
                | Self::Cipher(_)
        )
    }

    /// Get user-friendly message
    ///
    /// Every credential failure reads the same so callers cannot tell a
    /// forged token from an expired one.
    pub fn user_message(&self) -> &'static str {
        if self.is_credential_failure() {
            return "invalid credentials";
        }
        match self {
            Self::InvalidInput(_) => "invalid input",
            _ => "An error occurred processing your request.",
        }
    }
}
