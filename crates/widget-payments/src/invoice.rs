//! Invoice Dispatch
//!
//! Invoicing is best-effort. [`InvoiceSink::dispatch`] never blocks and never
//! fails from the caller's point of view; every failure ends in a log line.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Default queue depth between the pipeline and the worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

const DEFAULT_INVOICE_URL: &str = "http://localhost:5000/invoice/create-and-send";

/// Order summary sent to the invoicing service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Order id
    pub id: i64,
    pub quantity: i32,
    pub amount: i64,
    pub product: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Fire-and-forget invoice hand-off
pub trait InvoiceSink: Send + Sync {
    fn dispatch(&self, invoice: Invoice);
}

/// Invoice service configuration
#[derive(Clone, Debug)]
pub struct InvoiceConfig {
    pub url: String,
    pub timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INVOICE_URL.into(),
            timeout: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl InvoiceConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("INVOICE_URL") {
            config.url = url;
        }
        if let Some(secs) = std::env::var("EXTERNAL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// Queue side of the dispatcher; cheap to clone
#[derive(Clone, Debug)]
pub struct InvoiceDispatcher {
    tx: mpsc::Sender<Invoice>,
}

impl InvoiceDispatcher {
    /// Create the dispatcher and the worker that drains it
    pub fn new(config: InvoiceConfig) -> (Self, InvoiceWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default invoice HTTP client");
                reqwest::Client::new()
            });

        let worker = InvoiceWorker {
            rx,
            client,
            url: config.url,
        };
        (Self { tx }, worker)
    }
}

impl InvoiceSink for InvoiceDispatcher {
    fn dispatch(&self, invoice: Invoice) {
        let order_id = invoice.id;
        match self.tx.try_send(invoice) {
            Ok(()) => tracing::debug!(order_id, "Queued invoice"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(order_id, "Invoice queue full, invoice dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(order_id, "Invoice worker gone, invoice dropped");
            }
        }
    }
}

/// Drains the queue and POSTs each invoice
#[derive(Debug)]
pub struct InvoiceWorker {
    rx: mpsc::Receiver<Invoice>,
    client: reqwest::Client,
    url: String,
}

impl InvoiceWorker {
    /// Run until every dispatcher handle is dropped
    pub async fn run(mut self) {
        tracing::info!(url = %self.url, "Invoice worker started");
        while let Some(invoice) = self.rx.recv().await {
            self.deliver(&invoice).await;
        }
        tracing::info!("Invoice worker stopped");
    }

    async fn deliver(&self, invoice: &Invoice) {
        let result = self
            .client
            .post(&self.url)
            .json(invoice)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(response) => {
                tracing::info!(order_id = invoice.id, status = %response.status(), "Invoice sent");
            }
            Err(e) => {
                tracing::warn!(order_id = invoice.id, email = %invoice.email, error = %e, "Invoice dispatch failed");
            }
        }
    }
}
