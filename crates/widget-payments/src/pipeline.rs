//! Payment Commit Pipeline
//!
//! Gateway first, local writes second. A local write is only attempted after
//! the gateway has confirmed the money movement, and a local write that fails
//! after that point is reported as [`CommitOutcome::ReconciliationRequired`]
//! rather than as an ordinary failure.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use widget_core::{
    NewCustomer, NewOrder, NewTransaction, OrderDetail, OrderStatus, OrderStore, StoreError,
    TransactionStatus, Widget,
};

use crate::error::PaymentError;
use crate::gateway::{CardDetails, PaymentGateway, PaymentIntentSummary};
use crate::invoice::{Invoice, InvoiceSink};

pub const MSG_SUCCESS: &str = "Transaction successful";
pub const MSG_SUBSCRIPTION_FAILED: &str = "Error subscribing customer";
pub const MSG_RECONCILIATION: &str = "Something went wrong";
pub const MSG_INVALID_INPUT: &str = "Invalid input";
pub const MSG_REFUNDED: &str = "Charge refunded";
pub const MSG_CANCELLED: &str = "Subscription cancelled";
const MSG_NOT_COMPLETED: &str = "Payment has not been completed";
const MSG_UNAVAILABLE: &str = "Payment processing failed. Please try again.";

/// Accepts `1999` or `"1999"`; browsers post form values as strings
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

const fn one() -> i32 {
    1
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct ChargeRequest {
    pub currency: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: i64,
}

/// Create a gateway customer and subscribe them to a recurring widget's plan
#[derive(Clone, Debug, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(deserialize_with = "lenient_i64")]
    pub product_id: i64,
    pub plan: String,
    pub payment_method: String,
    pub currency: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A one-off widget purchase whose intent was confirmed in the browser
#[derive(Clone, Debug, Deserialize)]
pub struct PurchaseRequest {
    #[serde(alias = "product_id", deserialize_with = "lenient_i64")]
    pub widget_id: i64,
    pub payment_intent: String,
    pub payment_method: String,
    #[serde(default = "one")]
    pub quantity: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// An operator-keyed charge with no widget or customer attached
#[derive(Clone, Debug, Deserialize)]
pub struct TerminalPaymentRequest {
    pub payment_intent: String,
    pub payment_method: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RefundRequest {
    #[serde(alias = "id", deserialize_with = "lenient_i64")]
    pub order_id: i64,
    #[serde(alias = "pi")]
    pub payment_intent: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(alias = "id", deserialize_with = "lenient_i64")]
    pub order_id: i64,
    /// Subscription id as recorded on the order's transaction
    #[serde(alias = "pi")]
    pub payment_intent: String,
}

// ============================================================================
// Validation
// ============================================================================

/// Every violated field with its message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.fields
                .entry(field.to_string())
                .or_insert_with(|| message.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    fn identity(&mut self, first_name: &str, last_name: &str, email: &str) {
        self.check(first_name.trim().chars().count() >= 2, "first_name", "must be at least 2 characters");
        self.check(last_name.trim().chars().count() >= 2, "last_name", "must be at least 2 characters");
        self.check(is_email(email), "email", "must be a valid email address");
    }

    fn money(&mut self, currency: &str, amount: i64) {
        self.check(
            currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()),
            "currency",
            "must be a three-letter currency code",
        );
        self.check(amount > 0, "amount", "must be greater than zero");
    }

    fn required(&mut self, value: &str, field: &str) {
        self.check(!value.trim().is_empty(), field, "is required");
    }
}

fn is_email(email: &str) -> bool {
    email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}

// ============================================================================
// Outcomes
// ============================================================================

/// Ids of the records written by a commit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommitIds {
    pub customer_id: Option<i64>,
    pub transaction_id: i64,
    pub order_id: Option<i64>,
}

/// Local write that failed after the gateway had already moved money
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStep {
    Customer,
    Transaction,
    Order,
    OrderStatus,
}

/// Everything an operator needs to repair a charge with no local record
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconciliationContext {
    pub step: PersistStep,
    /// Payment intent or subscription id on the gateway
    pub gateway_reference: String,
    pub amount: i64,
    pub currency: String,
    pub email: Option<String>,
    pub customer_id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub order_id: Option<i64>,
    pub error: String,
}

impl ReconciliationContext {
    fn log(&self) {
        tracing::error!(
            target: "reconciliation",
            step = ?self.step,
            gateway_reference = %self.gateway_reference,
            amount = self.amount,
            currency = %self.currency,
            email = self.email.as_deref().unwrap_or(""),
            customer_id = ?self.customer_id,
            transaction_id = ?self.transaction_id,
            order_id = ?self.order_id,
            error = %self.error,
            "Gateway succeeded but local write failed; manual reconciliation required"
        );
    }
}

/// Result of a purchase or subscription commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitIds),
    /// Nothing was sent to the gateway
    ValidationFailed(ValidationErrors),
    /// Gateway refused; carries the caller-safe message
    GatewayDeclined(String),
    /// Gateway unreachable before any local write; safe to retry
    GatewayUnavailable,
    /// Catalogue lookup failed before the gateway was called; safe to retry
    StorageUnavailable,
    /// Money moved but the local record is incomplete
    ReconciliationRequired(ReconciliationContext),
}

/// `{ok, message, id?, errors?}` body returned to callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitResponse {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl CommitResponse {
    fn ok(message: &str, id: Option<i64>) -> Self {
        Self {
            ok: true,
            message: message.to_string(),
            id,
            errors: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            id: None,
            errors: None,
        }
    }
}

impl CommitOutcome {
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn response(&self) -> CommitResponse {
        match self {
            Self::Committed(ids) => {
                CommitResponse::ok(MSG_SUCCESS, ids.order_id.or(Some(ids.transaction_id)))
            }
            Self::ValidationFailed(errors) => CommitResponse {
                errors: Some(errors.clone()),
                ..CommitResponse::failed(MSG_INVALID_INPUT)
            },
            Self::GatewayDeclined(message) => CommitResponse::failed(message.clone()),
            Self::GatewayUnavailable | Self::StorageUnavailable => {
                CommitResponse::failed(MSG_UNAVAILABLE)
            }
            Self::ReconciliationRequired(_) => CommitResponse::failed(MSG_RECONCILIATION),
        }
    }
}

/// Result of creating a payment intent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChargeOutcome {
    Created(PaymentIntentSummary),
    Invalid(ValidationErrors),
    Declined(String),
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChargeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub intent: Option<PaymentIntentSummary>,
}

impl ChargeOutcome {
    pub fn response(&self) -> ChargeResponse {
        let failed = |message: &str| ChargeResponse {
            ok: false,
            message: Some(message.to_string()),
            intent: None,
        };
        match self {
            Self::Created(intent) => ChargeResponse {
                ok: true,
                message: None,
                intent: Some(intent.clone()),
            },
            Self::Invalid(_) => failed(MSG_INVALID_INPUT),
            Self::Declined(message) => failed(message),
            Self::Unavailable => failed(MSG_UNAVAILABLE),
        }
    }
}

/// Result of a refund or cancellation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReversalOutcome {
    Completed,
    /// Refused before the gateway was called
    Rejected(String),
    GatewayFailed(String),
    ReconciliationRequired(ReconciliationContext),
}

impl ReversalOutcome {
    pub fn response(&self, success: &str) -> CommitResponse {
        match self {
            Self::Completed => CommitResponse::ok(success, None),
            Self::Rejected(message) | Self::GatewayFailed(message) => {
                CommitResponse::failed(message.clone())
            }
            Self::ReconciliationRequired(_) => CommitResponse::failed(MSG_RECONCILIATION),
        }
    }
}

/// A timed-out call may still have been carried out by the gateway
fn log_if_uncertain(operation: &str, gateway_reference: &str, err: &PaymentError) {
    if matches!(err, PaymentError::Timeout) {
        tracing::error!(
            target: "reconciliation",
            operation,
            gateway_reference,
            "Gateway call timed out; outcome unknown, check the gateway before retrying"
        );
    }
}

fn gateway_failure(err: &PaymentError) -> CommitOutcome {
    tracing::warn!(error = %err, "Gateway call failed");
    if err.is_retryable() {
        CommitOutcome::GatewayUnavailable
    } else {
        CommitOutcome::GatewayDeclined(err.user_message().to_string())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Records one sale: customer, transaction, order
struct Sale {
    customer: NewCustomer,
    transaction: NewTransaction,
    widget_id: i64,
    /// Widget name for the invoice
    product: String,
    quantity: i32,
}

impl Sale {
    fn reconciliation(&self, step: PersistStep, ids: CommitIds, error: &StoreError) -> ReconciliationContext {
        ReconciliationContext {
            step,
            gateway_reference: self.transaction.payment_intent.clone(),
            amount: self.transaction.amount,
            currency: self.transaction.currency.clone(),
            email: Some(self.customer.email.clone()),
            customer_id: ids.customer_id,
            transaction_id: (ids.transaction_id != 0).then_some(ids.transaction_id),
            order_id: ids.order_id,
            error: error.to_string(),
        }
    }
}

/// Sequences gateway calls and local writes for every money-moving request
#[derive(Clone)]
pub struct CommitPipeline {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderStore>,
    invoices: Arc<dyn InvoiceSink>,
    timeout: Duration,
}

impl CommitPipeline {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderStore>,
        invoices: Arc<dyn InvoiceSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            orders,
            invoices,
            timeout,
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = crate::Result<T>>) -> crate::Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(PaymentError::Timeout))
    }

    async fn persist<T>(&self, fut: impl Future<Output = widget_core::Result<T>>) -> widget_core::Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    /// Catalogue entry a sale is for
    ///
    /// An unknown widget is recorded against `field` and yields `Ok(None)`.
    async fn sale_widget(
        &self,
        id: i64,
        field: &str,
        errors: &mut ValidationErrors,
    ) -> std::result::Result<Option<Widget>, CommitOutcome> {
        match self.persist(self.orders.get_widget(id)).await {
            Ok(widget) => Ok(Some(widget)),
            Err(e) if e.is_not_found() => {
                errors.check(false, field, "is not a known product");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(widget_id = id, error = %e, "Catalogue lookup failed");
                Err(CommitOutcome::StorageUnavailable)
            }
        }
    }

    /// Create a payment intent for the browser to confirm
    pub async fn charge(&self, request: &ChargeRequest) -> ChargeOutcome {
        let mut errors = ValidationErrors::default();
        errors.money(&request.currency, request.amount);
        if let Err(errors) = errors.into_result() {
            return ChargeOutcome::Invalid(errors);
        }

        match self
            .call(self.gateway.create_payment_intent(&request.currency, request.amount))
            .await
        {
            Ok(intent) => {
                tracing::info!(payment_intent = %intent.id, amount = request.amount, "Created payment intent");
                ChargeOutcome::Created(intent)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "Payment intent creation failed");
                ChargeOutcome::Unavailable
            }
            Err(e) => {
                tracing::info!(error = %e, "Payment intent declined");
                ChargeOutcome::Declined(e.user_message().to_string())
            }
        }
    }

    /// Customer, subscription, then Customer → Transaction → Order
    pub async fn subscribe(&self, request: &SubscriptionRequest) -> CommitOutcome {
        let mut errors = ValidationErrors::default();
        errors.identity(&request.first_name, &request.last_name, &request.email);
        errors.money(&request.currency, request.amount);
        errors.required(&request.plan, "plan");
        errors.required(&request.payment_method, "payment_method");
        let widget = match self.sale_widget(request.product_id, "product_id", &mut errors).await {
            Ok(widget) => widget,
            Err(outcome) => return outcome,
        };
        if let Some(widget) = &widget {
            errors.check(widget.is_recurring, "product_id", "is not a subscription product");
            errors.check(widget.plan_id == request.plan, "plan", "does not match the product");
        }
        if let Err(errors) = errors.into_result() {
            return CommitOutcome::ValidationFailed(errors);
        }

        let card = match self.call(self.gateway.payment_method(&request.payment_method)).await {
            Ok(card) => card,
            Err(e) => return gateway_failure(&e),
        };

        let customer = match self
            .call(self.gateway.create_customer(&request.payment_method, &request.email))
            .await
        {
            Ok(customer) => customer,
            Err(e) => return gateway_failure(&e),
        };

        let subscription = match self
            .call(self.gateway.subscribe(&customer, &request.plan, &request.payment_method, &card.last_four))
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(
                    customer = %customer.id,
                    plan = %request.plan,
                    error = %e,
                    "Subscription failed; gateway customer left without a plan"
                );
                log_if_uncertain("subscribe", &customer.id, &e);
                return CommitOutcome::GatewayDeclined(MSG_SUBSCRIPTION_FAILED.into());
            }
        };
        tracing::info!(subscription = %subscription.id, plan = %request.plan, "Subscribed customer");

        let sale = Sale {
            customer: NewCustomer {
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                email: request.email.clone(),
            },
            transaction: transaction_for(&card, &subscription.id, request.amount, &request.currency, String::new()),
            widget_id: request.product_id,
            product: widget.map(|w| w.name).unwrap_or_default(),
            quantity: 1,
        };
        self.commit_sale(sale).await
    }

    /// Record a one-off purchase confirmed client-side
    ///
    /// Amount, currency and card facts come from the gateway, never from the
    /// request.
    pub async fn record_purchase(&self, request: &PurchaseRequest) -> CommitOutcome {
        let mut errors = ValidationErrors::default();
        errors.identity(&request.first_name, &request.last_name, &request.email);
        errors.required(&request.payment_intent, "payment_intent");
        errors.required(&request.payment_method, "payment_method");
        errors.check(request.quantity >= 1, "quantity", "must be at least 1");
        let widget = match self.sale_widget(request.widget_id, "widget_id", &mut errors).await {
            Ok(widget) => widget,
            Err(outcome) => return outcome,
        };
        if let Some(widget) = &widget {
            errors.check(!widget.is_recurring, "widget_id", "is sold as a subscription");
        }
        if let Err(errors) = errors.into_result() {
            return CommitOutcome::ValidationFailed(errors);
        }

        let (intent, card) = match self
            .confirmed_payment(&request.payment_intent, &request.payment_method)
            .await
        {
            Ok(found) => found,
            Err(outcome) => return outcome,
        };

        let sale = Sale {
            customer: NewCustomer {
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                email: request.email.clone(),
            },
            transaction: transaction_for(
                &card,
                &intent.id,
                intent.amount,
                &intent.currency,
                intent.latest_charge.clone().unwrap_or_default(),
            ),
            widget_id: request.widget_id,
            product: widget.map(|w| w.name).unwrap_or_default(),
            quantity: request.quantity,
        };
        self.commit_sale(sale).await
    }

    /// Record an operator-keyed payment as a lone cleared transaction
    pub async fn record_terminal_payment(&self, request: &TerminalPaymentRequest) -> CommitOutcome {
        let mut errors = ValidationErrors::default();
        errors.required(&request.payment_intent, "payment_intent");
        errors.required(&request.payment_method, "payment_method");
        if let Err(errors) = errors.into_result() {
            return CommitOutcome::ValidationFailed(errors);
        }

        let (intent, card) = match self
            .confirmed_payment(&request.payment_intent, &request.payment_method)
            .await
        {
            Ok(found) => found,
            Err(outcome) => return outcome,
        };

        let transaction = transaction_for(
            &card,
            &intent.id,
            intent.amount,
            &intent.currency,
            intent.latest_charge.clone().unwrap_or_default(),
        );
        match self.persist(self.orders.insert_transaction(transaction)).await {
            Ok(transaction_id) => {
                tracing::info!(transaction_id, payment_intent = %intent.id, "Recorded terminal payment");
                CommitOutcome::Committed(CommitIds {
                    transaction_id,
                    ..CommitIds::default()
                })
            }
            Err(e) => {
                let context = ReconciliationContext {
                    step: PersistStep::Transaction,
                    gateway_reference: intent.id,
                    amount: intent.amount,
                    currency: intent.currency,
                    email: None,
                    customer_id: None,
                    transaction_id: None,
                    order_id: None,
                    error: e.to_string(),
                };
                context.log();
                CommitOutcome::ReconciliationRequired(context)
            }
        }
    }

    /// Refund through the gateway, then mark the order refunded
    pub async fn refund(&self, request: &RefundRequest) -> ReversalOutcome {
        let order = match self.reversible_order(request.order_id, &request.payment_intent).await {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };
        if request.amount <= 0 || request.amount > order.order.amount {
            return ReversalOutcome::Rejected("Refund amount does not match the order".into());
        }

        if let Err(e) = self
            .call(self.gateway.refund(&request.payment_intent, request.amount))
            .await
        {
            tracing::warn!(order_id = request.order_id, error = %e, "Refund failed at gateway");
            log_if_uncertain("refund", &request.payment_intent, &e);
            return ReversalOutcome::GatewayFailed(e.user_message().to_string());
        }

        self.mark(&order, OrderStatus::Refunded, request.amount).await
    }

    /// Cancel through the gateway, then mark the order cancelled
    pub async fn cancel_subscription(&self, request: &CancelRequest) -> ReversalOutcome {
        let order = match self.reversible_order(request.order_id, &request.payment_intent).await {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };

        if let Err(e) = self
            .call(self.gateway.cancel_subscription(&request.payment_intent))
            .await
        {
            tracing::warn!(order_id = request.order_id, error = %e, "Cancellation failed at gateway");
            log_if_uncertain("cancel_subscription", &request.payment_intent, &e);
            return ReversalOutcome::GatewayFailed(e.user_message().to_string());
        }

        self.mark(&order, OrderStatus::Cancelled, order.order.amount).await
    }

    async fn confirmed_payment(
        &self,
        payment_intent: &str,
        payment_method: &str,
    ) -> std::result::Result<(crate::gateway::PaymentIntentDetails, CardDetails), CommitOutcome> {
        let intent = self
            .call(self.gateway.payment_intent(payment_intent))
            .await
            .map_err(|e| gateway_failure(&e))?;
        if !intent.succeeded() {
            tracing::warn!(payment_intent = %intent.id, status = %intent.status, "Payment intent not settled");
            return Err(CommitOutcome::GatewayDeclined(MSG_NOT_COMPLETED.into()));
        }

        let card = self
            .call(self.gateway.payment_method(payment_method))
            .await
            .map_err(|e| gateway_failure(&e))?;
        Ok((intent, card))
    }

    async fn commit_sale(&self, sale: Sale) -> CommitOutcome {
        let mut ids = CommitIds::default();

        match self.persist(self.orders.insert_customer(sale.customer.clone())).await {
            Ok(id) => ids.customer_id = Some(id),
            Err(e) => return reconcile(sale.reconciliation(PersistStep::Customer, ids, &e)),
        }

        match self.persist(self.orders.insert_transaction(sale.transaction.clone())).await {
            Ok(id) => ids.transaction_id = id,
            Err(e) => return reconcile(sale.reconciliation(PersistStep::Transaction, ids, &e)),
        }

        let order = NewOrder {
            widget_id: sale.widget_id,
            transaction_id: ids.transaction_id,
            customer_id: ids.customer_id.unwrap_or_default(),
            status: OrderStatus::Cleared,
            quantity: sale.quantity,
            amount: sale.transaction.amount,
        };
        match self.persist(self.orders.insert_order(order)).await {
            Ok(id) => ids.order_id = Some(id),
            Err(e) => return reconcile(sale.reconciliation(PersistStep::Order, ids, &e)),
        }

        tracing::info!(
            order_id = ?ids.order_id,
            transaction_id = ids.transaction_id,
            gateway_reference = %sale.transaction.payment_intent,
            "Committed sale"
        );
        self.send_invoice(&sale, ids);
        CommitOutcome::Committed(ids)
    }

    fn send_invoice(&self, sale: &Sale, ids: CommitIds) {
        let Some(order_id) = ids.order_id else {
            return;
        };

        self.invoices.dispatch(Invoice {
            id: order_id,
            quantity: sale.quantity,
            amount: sale.transaction.amount,
            product: sale.product.clone(),
            first_name: sale.customer.first_name.clone(),
            last_name: sale.customer.last_name.clone(),
            email: sale.customer.email.clone(),
            created_at: chrono::Utc::now(),
        });
    }

    async fn reversible_order(
        &self,
        order_id: i64,
        payment_intent: &str,
    ) -> std::result::Result<OrderDetail, ReversalOutcome> {
        let order = match self.persist(self.orders.get_order(order_id)).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => {
                return Err(ReversalOutcome::Rejected("Order not found".into()));
            }
            Err(e) => {
                tracing::warn!(order_id, error = %e, "Could not load order");
                return Err(ReversalOutcome::Rejected(MSG_RECONCILIATION.into()));
            }
        };

        if order.order.status != OrderStatus::Cleared {
            return Err(ReversalOutcome::Rejected(
                "Order has already been refunded or cancelled".into(),
            ));
        }
        if order.transaction.payment_intent != payment_intent {
            return Err(ReversalOutcome::Rejected(
                "Payment reference does not match the order".into(),
            ));
        }
        Ok(order)
    }

    async fn mark(&self, order: &OrderDetail, status: OrderStatus, amount: i64) -> ReversalOutcome {
        let order_id = order.order.id;
        match self.persist(self.orders.update_order_status(order_id, status)).await {
            Ok(()) => {
                tracing::info!(order_id, status = ?status, amount, "Order reversed");
                ReversalOutcome::Completed
            }
            Err(e) => {
                let context = ReconciliationContext {
                    step: PersistStep::OrderStatus,
                    gateway_reference: order.transaction.payment_intent.clone(),
                    amount,
                    currency: order.transaction.currency.clone(),
                    email: Some(order.customer.email.clone()),
                    customer_id: Some(order.customer.id),
                    transaction_id: Some(order.transaction.id),
                    order_id: Some(order_id),
                    error: e.to_string(),
                };
                context.log();
                ReversalOutcome::ReconciliationRequired(context)
            }
        }
    }
}

fn reconcile(context: ReconciliationContext) -> CommitOutcome {
    context.log();
    CommitOutcome::ReconciliationRequired(context)
}

fn transaction_for(
    card: &CardDetails,
    gateway_reference: &str,
    amount: i64,
    currency: &str,
    bank_return_code: String,
) -> NewTransaction {
    NewTransaction {
        amount,
        currency: currency.to_string(),
        last_four: card.last_four.clone(),
        expiry_month: card.expiry_month,
        expiry_year: card.expiry_year,
        payment_intent: gateway_reference.to_string(),
        payment_method: card.payment_method.clone(),
        bank_return_code,
        status: TransactionStatus::Cleared,
    }
}
