//! Stripe Gateway
//!
//! [`PaymentGateway`] over the Stripe API. Each call is one request with
//! the client's own secret key; no process-wide credential is touched.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    CancelSubscription, Client, CreateCustomer, CreatePaymentIntent, CreateRefund,
    CreateSubscription, CreateSubscriptionItems, Currency, Customer, CustomerId, ErrorCode,
    ErrorType, PaymentIntent, PaymentIntentId, PaymentMethod, PaymentMethodId, Refund,
    StripeError, Subscription, SubscriptionId,
};

use crate::error::{PaymentError, Result};
use crate::gateway::{
    CardDetails, DeclineReason, GatewayCustomer, GatewaySubscription, PaymentGateway,
    PaymentIntentDetails, PaymentIntentSummary, RefundReceipt,
};

/// Stripe client wrapper
pub struct StripeGateway {
    client: Client,
    publishable_key: String,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("secret_key", &"***redacted***")
            .field("publishable_key", &self.publishable_key)
            .finish()
    }
}

impl StripeGateway {
    pub fn new(secret_key: &str, publishable_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            publishable_key: publishable_key.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let publishable_key = std::env::var("STRIPE_PUBLISHABLE_KEY").unwrap_or_default();

        Ok(Self::new(&secret_key, &publishable_key))
    }

    /// Key the browser needs to confirm payment intents
    pub fn publishable_key(&self) -> &str {
        &self.publishable_key
    }
}

fn parse_id<T: std::str::FromStr>(kind: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| PaymentError::InvalidReference(format!("{kind} {raw:?}")))
}

fn parse_currency(raw: &str) -> Result<Currency> {
    raw.to_ascii_lowercase()
        .parse()
        .map_err(|_| PaymentError::InvalidReference(format!("currency {raw:?}")))
}

const fn decline_reason(code: &ErrorCode) -> DeclineReason {
    match code {
        ErrorCode::CardDeclined => DeclineReason::CardDeclined,
        ErrorCode::ExpiredCard => DeclineReason::ExpiredCard,
        ErrorCode::IncorrectCvc => DeclineReason::IncorrectCvc,
        ErrorCode::IncorrectZip => DeclineReason::IncorrectZip,
        ErrorCode::AmountTooLarge => DeclineReason::AmountTooLarge,
        ErrorCode::AmountTooSmall => DeclineReason::AmountTooSmall,
        ErrorCode::BalanceInsufficient => DeclineReason::BalanceInsufficient,
        ErrorCode::PostalCodeInvalid => DeclineReason::PostalCodeInvalid,
        _ => DeclineReason::Other,
    }
}

fn map_stripe_error(err: StripeError) -> PaymentError {
    match err {
        StripeError::Stripe(req)
            if req.http_status >= 500 || matches!(req.error_type, ErrorType::RateLimit) =>
        {
            PaymentError::GatewayUnavailable(format!("stripe returned {}", req.http_status))
        }
        StripeError::Stripe(req) => {
            tracing::debug!(
                http_status = req.http_status,
                code = ?req.code,
                decline_code = ?req.decline_code,
                "Stripe rejected request"
            );
            PaymentError::Declined(req.code.as_ref().map_or(DeclineReason::Other, decline_reason))
        }
        StripeError::Timeout => PaymentError::Timeout,
        other => PaymentError::GatewayUnavailable(other.to_string()),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(
        &self,
        currency: &str,
        amount: i64,
    ) -> Result<PaymentIntentSummary> {
        let params = CreatePaymentIntent::new(amount, parse_currency(currency)?);
        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(PaymentIntentSummary {
            id: intent.id.to_string(),
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency.to_string(),
            status: intent.status.as_str().to_string(),
        })
    }

    async fn payment_intent(&self, id: &str) -> Result<PaymentIntentDetails> {
        let id: PaymentIntentId = parse_id("payment intent", id)?;
        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(map_stripe_error)?;

        Ok(PaymentIntentDetails {
            id: intent.id.to_string(),
            amount: intent.amount,
            currency: intent.currency.to_string(),
            status: intent.status.as_str().to_string(),
            latest_charge: intent.latest_charge.map(|charge| charge.id().to_string()),
        })
    }

    async fn payment_method(&self, id: &str) -> Result<CardDetails> {
        let id: PaymentMethodId = parse_id("payment method", id)?;
        let method = PaymentMethod::retrieve(&self.client, &id, &[])
            .await
            .map_err(map_stripe_error)?;

        let card = method.card.ok_or_else(|| {
            PaymentError::UnexpectedResponse("payment method has no card".into())
        })?;

        Ok(CardDetails {
            payment_method: method.id.to_string(),
            last_four: card.last4,
            expiry_month: i32::try_from(card.exp_month).unwrap_or_default(),
            expiry_year: i32::try_from(card.exp_year).unwrap_or_default(),
            brand: card.brand,
        })
    }

    async fn create_customer(&self, payment_method: &str, email: &str) -> Result<GatewayCustomer> {
        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.payment_method = Some(parse_id("payment method", payment_method)?);

        let customer = Customer::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(GatewayCustomer {
            id: customer.id.to_string(),
        })
    }

    async fn subscribe(
        &self,
        customer: &GatewayCustomer,
        plan: &str,
        payment_method: &str,
        last_four: &str,
    ) -> Result<GatewaySubscription> {
        let customer_id: CustomerId = parse_id("customer", &customer.id)?;

        let mut params = CreateSubscription::new(customer_id);
        params.items = Some(vec![CreateSubscriptionItems {
            price: Some(plan.to_string()),
            ..Default::default()
        }]);
        params.default_payment_method = Some(payment_method);

        let mut metadata = HashMap::new();
        metadata.insert("last_four".to_string(), last_four.to_string());
        params.metadata = Some(metadata);

        let subscription = Subscription::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(GatewaySubscription {
            id: subscription.id.to_string(),
            status: subscription.status.as_str().to_string(),
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        let id: SubscriptionId = parse_id("subscription", subscription_id)?;
        Subscription::cancel(&self.client, &id, CancelSubscription::new())
            .await
            .map_err(map_stripe_error)?;
        Ok(())
    }

    async fn refund(&self, payment_intent: &str, amount: i64) -> Result<RefundReceipt> {
        let mut params = CreateRefund::new();
        params.payment_intent = Some(parse_id("payment intent", payment_intent)?);
        params.amount = Some(amount);

        let refund = Refund::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(RefundReceipt {
            id: refund.id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_codes_map_to_messages() {
        assert_eq!(
            decline_reason(&ErrorCode::ExpiredCard).message(),
            "Your Card is expired"
        );
        assert_eq!(
            decline_reason(&ErrorCode::BalanceInsufficient).message(),
            "Insufficient balance"
        );
        assert_eq!(
            decline_reason(&ErrorCode::ResourceMissing).message(),
            "Your Card was declined"
        );
    }

    #[test]
    fn test_bad_identifiers_fail_before_any_request() {
        assert!(parse_id::<PaymentIntentId>("payment intent", "ch_123").is_err());
        assert!(parse_id::<PaymentIntentId>("payment intent", "pi_123").is_ok());
        assert!(parse_currency("USD").is_ok());
        assert!(parse_currency("dollars").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let gateway = StripeGateway::new("sk_test_secret", "pk_test_public");
        let debug = format!("{gateway:?}");
        assert!(!debug.contains("sk_test_secret"));
        assert!(debug.contains("pk_test_public"));
    }
}
