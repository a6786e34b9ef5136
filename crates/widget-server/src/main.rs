//! Widget Store HTTP Server
//!
//! Axum server exposing the storefront API, the admin API and the
//! notification websocket.

mod admin;
mod config;
mod handlers;
mod mailer;
mod routes;
mod state;
mod ws;

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use widget_auth::{AuthConfig, Authenticator, hash_password};
use widget_core::{MemoryStore, NewUser, UserStore, Widget};
use widget_hub::{DEFAULT_EVENT_CAPACITY, Hub};
use widget_payments::{CommitPipeline, InvoiceConfig, InvoiceDispatcher, StripeGateway};

use crate::config::ServerConfig;
use crate::mailer::LogMailer;
use crate::state::AppState;

fn catalogue() -> Vec<Widget> {
    vec![
        Widget {
            id: 1,
            name: "Triplex Widget".into(),
            description: "A very nice widget.".into(),
            inventory_level: 10,
            price: 1000,
            image: "widget.png".into(),
            ..Widget::default()
        },
        Widget {
            id: 2,
            name: "Bronze Plan".into(),
            description: "Get three widgets for the price of two every month".into(),
            inventory_level: 100_000,
            price: 2000,
            is_recurring: true,
            plan_id: std::env::var("BRONZE_PLAN_ID").unwrap_or_else(|_| "price_bronze".into()),
            ..Widget::default()
        },
    ]
}

/// Seed an operator account from `ADMIN_EMAIL` / `ADMIN_PASSWORD`
async fn seed_admin(store: &MemoryStore) -> anyhow::Result<()> {
    let (Ok(email), Ok(password)) = (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD"))
    else {
        tracing::warn!("⚠ No ADMIN_EMAIL/ADMIN_PASSWORD - admin API has no users");
        return Ok(());
    };

    let hash = hash_password(&password)?;
    let user = NewUser {
        first_name: "Admin".into(),
        last_name: "User".into(),
        email: email.clone(),
    };
    store.add_user(user, &hash).await?;
    tracing::info!("✓ Seeded admin user {}", email);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(ServerConfig::from_env());

    // Storage
    let store = Arc::new(MemoryStore::with_widgets(catalogue()));
    seed_admin(&store).await?;

    // Credentials
    let auth = Authenticator::new(store.clone(), store.clone(), AuthConfig::from_env()?)?;

    // Invoicing
    let (invoices, invoice_worker) = InvoiceDispatcher::new(InvoiceConfig::from_env());
    tokio::spawn(invoice_worker.run());

    // Payments
    let (payments, publishable_key) = match StripeGateway::from_env() {
        Ok(gateway) => {
            tracing::info!("✓ Stripe configured");
            let key = Some(gateway.publishable_key().to_string()).filter(|k| !k.is_empty());
            let pipeline = CommitPipeline::new(
                Arc::new(gateway),
                store.clone(),
                Arc::new(invoices),
                config.timeout,
            );
            (Some(Arc::new(pipeline)), key)
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
            (None, None)
        }
    };

    // Notifications
    let (hub, hub_worker) = Hub::with_write_timeout(DEFAULT_EVENT_CAPACITY, config.timeout);
    tokio::spawn(hub_worker.run());

    // Build application state
    let state = AppState {
        orders: store.clone(),
        users: store,
        auth: Arc::new(auth),
        payments,
        publishable_key,
        hub,
        mailer: Arc::new(LogMailer),
        config: config.clone(),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 widget-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                  - Health check");
    tracing::info!("  POST /api/payment-intent      - Create payment intent");
    tracing::info!("  POST /api/authenticate        - Issue bearer token");
    tracing::info!("  POST /api/admin/...           - Admin API (bearer token)");
    tracing::info!("  GET  /ws                      - Admin notifications");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
