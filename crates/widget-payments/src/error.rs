//! Payment Error Types

use thiserror::Error;

use crate::gateway::DeclineReason;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Card rejected by the gateway
    #[error("Card declined: {0:?}")]
    Declined(DeclineReason),

    /// Network failure or 5xx from the gateway
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Gateway call exceeded the configured bound
    #[error("Gateway timed out")]
    Timeout,

    /// Gateway answered with something we cannot use
    #[error("Unexpected gateway response: {0}")]
    UnexpectedResponse(String),

    /// Malformed gateway identifier or currency
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_) | Self::Timeout)
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            Self::Declined(reason) => reason.message(),
            Self::GatewayUnavailable(_) | Self::Timeout => {
                "Payment processing failed. Please try again."
            }
            Self::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_never_leaks_raw_error() {
        let err = PaymentError::GatewayUnavailable("connection reset by 10.0.0.7".into());
        assert!(!err.user_message().contains("10.0.0.7"));
        assert!(err.is_retryable());

        let declined = PaymentError::Declined(DeclineReason::ExpiredCard);
        assert_eq!(declined.user_message(), "Your Card is expired");
        assert!(!declined.is_retryable());
    }
}
