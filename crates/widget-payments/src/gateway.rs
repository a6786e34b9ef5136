//! Payment Gateway Port
//!
//! The pipeline talks to the card processor only through [`PaymentGateway`].
//! Implementations map processor error codes onto [`DeclineReason`] so that
//! customer-facing text never depends on the processor's wording.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Why a card was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    CardDeclined,
    ExpiredCard,
    IncorrectCvc,
    IncorrectZip,
    AmountTooLarge,
    AmountTooSmall,
    BalanceInsufficient,
    PostalCodeInvalid,
    /// Any code without a dedicated message
    Other,
}

impl DeclineReason {
    /// Map a processor error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "card_declined" => Self::CardDeclined,
            "expired_card" => Self::ExpiredCard,
            "incorrect_cvc" => Self::IncorrectCvc,
            "incorrect_zip" => Self::IncorrectZip,
            "amount_too_large" => Self::AmountTooLarge,
            "amount_too_small" => Self::AmountTooSmall,
            "balance_insufficient" => Self::BalanceInsufficient,
            "postal_code_invalid" => Self::PostalCodeInvalid,
            _ => Self::Other,
        }
    }

    /// Customer-facing message
    pub const fn message(self) -> &'static str {
        match self {
            Self::CardDeclined | Self::Other => "Your Card was declined",
            Self::ExpiredCard => "Your Card is expired",
            Self::IncorrectCvc => "Incorrect CVC code",
            Self::IncorrectZip => "Incorrect Zip/Postal code",
            Self::AmountTooLarge => "Amount too large to charge to your card",
            Self::AmountTooSmall => "Amount too small to charge to your card",
            Self::BalanceInsufficient => "Insufficient balance",
            Self::PostalCodeInvalid => "Your postal code is invalid",
        }
    }
}

/// Payment intent as handed back to the browser
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentSummary {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

/// Authoritative view of a payment intent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentIntentDetails {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    /// Charge id, recorded as the bank return code
    pub latest_charge: Option<String>,
}

impl PaymentIntentDetails {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

/// Card facts attached to a payment method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardDetails {
    pub payment_method: String,
    pub last_four: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub brand: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayCustomer {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewaySubscription {
    pub id: String,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefundReceipt {
    pub id: String,
}

/// Card processor operations
///
/// Every call is a single request carrying its own credentials. Callers
/// bound each call with a timeout.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for `amount` minor units of `currency`
    async fn create_payment_intent(&self, currency: &str, amount: i64)
        -> Result<PaymentIntentSummary>;

    async fn payment_intent(&self, id: &str) -> Result<PaymentIntentDetails>;

    async fn payment_method(&self, id: &str) -> Result<CardDetails>;

    async fn create_customer(&self, payment_method: &str, email: &str) -> Result<GatewayCustomer>;

    async fn subscribe(
        &self,
        customer: &GatewayCustomer,
        plan: &str,
        payment_method: &str,
        last_four: &str,
    ) -> Result<GatewaySubscription>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()>;

    /// Refund `amount` minor units of a payment intent
    async fn refund(&self, payment_intent: &str, amount: i64) -> Result<RefundReceipt>;
}
