//! Application State

use std::sync::Arc;

use widget_auth::Authenticator;
use widget_core::{OrderStore, UserStore};
use widget_hub::Hub;
use widget_payments::CommitPipeline;

use crate::config::ServerConfig;
use crate::mailer::Mailer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,

    pub users: Arc<dyn UserStore>,

    /// Login, bearer verification and password reset
    pub auth: Arc<Authenticator>,

    /// Payment pipeline (None if Stripe is not configured)
    pub payments: Option<Arc<CommitPipeline>>,

    /// Key handed to browsers for confirming intents
    pub publishable_key: Option<String>,

    pub hub: Arc<Hub>,

    pub mailer: Arc<dyn Mailer>,

    pub config: Arc<ServerConfig>,
}
