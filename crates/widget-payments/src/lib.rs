//! # widget-payments
//!
//! Card processing for the widget store.
//!
//! ## Commit Ordering
//!
//! Every money-moving request runs the gateway call first and the local
//! writes second:
//!
//! ```text
//! ┌────────────┐    ┌──────────────────┐    ┌─────────────────────────┐    ┌──────────┐
//! │  validate  │───▶│  PaymentGateway  │───▶│  Customer → Transaction │───▶│ invoice  │
//! │  (all      │    │  (customer,      │    │  → Order  (OrderStore)  │    │ (best    │
//! │   fields)  │    │   subscription)  │    │                         │    │  effort) │
//! └────────────┘    └──────────────────┘    └─────────────────────────┘    └──────────┘
//!       │                    │                           │
//!       ▼                    ▼                           ▼
//!  ValidationFailed   GatewayDeclined /        ReconciliationRequired
//!  (no side effects)  GatewayUnavailable       (money moved, record
//!                     (no local writes)         incomplete; logged on
//!                                               the `reconciliation`
//!                                               target)
//! ```
//!
//! Refunds and cancellations follow the same rule: the order status only
//! changes after the gateway confirms.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use widget_payments::{CommitPipeline, InvoiceConfig, InvoiceDispatcher, StripeGateway};
//!
//! let (invoices, worker) = InvoiceDispatcher::new(InvoiceConfig::from_env());
//! tokio::spawn(worker.run());
//!
//! let pipeline = CommitPipeline::new(
//!     Arc::new(StripeGateway::from_env()?),
//!     store,
//!     Arc::new(invoices),
//!     Duration::from_secs(5),
//! );
//! let outcome = pipeline.subscribe(&request).await;
//! ```

mod error;
mod gateway;
mod invoice;
mod pipeline;
mod stripe_gateway;

pub use error::{PaymentError, Result};
pub use gateway::{
    CardDetails, DeclineReason, GatewayCustomer, GatewaySubscription, PaymentGateway,
    PaymentIntentDetails, PaymentIntentSummary, RefundReceipt,
};
pub use invoice::{
    DEFAULT_QUEUE_CAPACITY, Invoice, InvoiceConfig, InvoiceDispatcher, InvoiceSink, InvoiceWorker,
};
pub use pipeline::{
    CancelRequest, ChargeOutcome, ChargeRequest, ChargeResponse, CommitIds, CommitOutcome,
    CommitPipeline, CommitResponse, MSG_CANCELLED, MSG_RECONCILIATION, MSG_REFUNDED,
    MSG_SUBSCRIPTION_FAILED, MSG_SUCCESS, PersistStep, PurchaseRequest, ReconciliationContext,
    RefundRequest, ReversalOutcome, SubscriptionRequest, TerminalPaymentRequest, ValidationErrors,
};
pub use stripe_gateway::StripeGateway;
