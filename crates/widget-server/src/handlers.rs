//! HTTP Handlers

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};
use serde::{Deserialize, Serialize};

use widget_auth::{AuthError, IssuedToken};
use widget_core::{StoreError, Widget};
use widget_payments::{
    ChargeOutcome, ChargeRequest, ChargeResponse, CommitOutcome, CommitPipeline, CommitResponse,
    PurchaseRequest, ReversalOutcome, SubscriptionRequest,
};

use crate::mailer::{Mail, Template};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishable_key: Option<String>,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// `{error, message}` body used by the account endpoints
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub error: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: false,
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub error: bool,
    pub message: String,
    pub authentication_token: IssuedToken,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetLinkRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ResetLinkResponse {
    pub error: bool,
    /// Encrypted address for the reset form
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    /// Encrypted address from [`ResetLinkResponse`]
    pub email: String,
    pub password: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Error Mapping
// ============================================================================

pub fn auth_error(err: &AuthError) -> ApiError {
    if err.is_credential_failure() {
        tracing::info!(reason = %err, "Credential check failed");
        return api_error(StatusCode::UNAUTHORIZED, err.user_message(), "INVALID_CREDENTIALS");
    }
    match err {
        AuthError::InvalidInput(_) => {
            api_error(StatusCode::BAD_REQUEST, err.user_message(), "INVALID_INPUT")
        }
        AuthError::Store(e) => store_error(e),
        _ => {
            tracing::error!(error = %err, "Authentication fault");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.user_message(), "AUTH_ERROR")
        }
    }
}

pub fn store_error(err: &StoreError) -> ApiError {
    match err {
        StoreError::NotFound { entity, .. } => {
            api_error(StatusCode::NOT_FOUND, format!("{entity} not found"), "NOT_FOUND")
        }
        StoreError::Conflict(_) => api_error(StatusCode::CONFLICT, "already exists", "CONFLICT"),
        StoreError::InvalidReference(_) => {
            api_error(StatusCode::BAD_REQUEST, "invalid reference", "INVALID_REFERENCE")
        }
        StoreError::Timeout | StoreError::Backend(_) => {
            tracing::error!(error = %err, "Storage failure");
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Storage temporarily unavailable",
                "STORAGE_UNAVAILABLE",
            )
        }
    }
}

/// Run a storage call under the configured timeout
pub async fn bounded<T>(
    state: &AppState,
    fut: impl Future<Output = widget_core::Result<T>>,
) -> Result<T, ApiError> {
    tokio::time::timeout(state.config.timeout, fut)
        .await
        .unwrap_or(Err(StoreError::Timeout))
        .map_err(|e| store_error(&e))
}

pub fn payments(state: &AppState) -> Result<&Arc<CommitPipeline>, ApiError> {
    state.payments.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })
}

pub const fn commit_status(outcome: &CommitOutcome) -> StatusCode {
    match outcome {
        CommitOutcome::Committed(_) => StatusCode::OK,
        CommitOutcome::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        CommitOutcome::GatewayDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        CommitOutcome::GatewayUnavailable | CommitOutcome::StorageUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CommitOutcome::ReconciliationRequired(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub const fn reversal_status(outcome: &ReversalOutcome) -> StatusCode {
    match outcome {
        ReversalOutcome::Completed => StatusCode::OK,
        ReversalOutcome::Rejected(_) => StatusCode::BAD_REQUEST,
        ReversalOutcome::GatewayFailed(_) => StatusCode::BAD_GATEWAY,
        ReversalOutcome::ReconciliationRequired(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.payments.is_some(),
        publishable_key: state.publishable_key.clone(),
        connections: state.hub.connection_count().await,
    })
}

/// Create a payment intent for the browser to confirm
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(payload): Json<ChargeRequest>,
) -> Result<(StatusCode, Json<ChargeResponse>), ApiError> {
    let outcome = payments(&state)?.charge(&payload).await;
    let status = match &outcome {
        ChargeOutcome::Created(_) => StatusCode::OK,
        ChargeOutcome::Invalid(_) => StatusCode::BAD_REQUEST,
        ChargeOutcome::Declined(_) => StatusCode::PAYMENT_REQUIRED,
        ChargeOutcome::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((status, Json(outcome.response())))
}

pub async fn get_widget(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Widget>, ApiError> {
    let widget = bounded(&state, state.orders.get_widget(id)).await?;
    Ok(Json(widget))
}

/// Create a gateway customer and subscribe them to a plan
pub async fn create_customer_and_subscribe(
    State(state): State<AppState>,
    Json(payload): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    let outcome = payments(&state)?.subscribe(&payload).await;
    Ok((commit_status(&outcome), Json(outcome.response())))
}

/// Record a widget purchase confirmed in the browser
pub async fn payment_succeeded(
    State(state): State<AppState>,
    Json(payload): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    let outcome = payments(&state)?.record_purchase(&payload).await;
    Ok((commit_status(&outcome), Json(outcome.response())))
}

/// Exchange credentials for a bearer token
pub async fn authenticate(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let issued = state
        .auth
        .authenticate(&payload.email, &payload.password)
        .await
        .map_err(|e| auth_error(&e))?;

    Ok(Json(TokenResponse {
        error: false,
        message: format!("token for {} created", payload.email),
        authentication_token: issued,
    }))
}

pub async fn is_authenticated(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let user = state
        .auth
        .verify_bearer(header)
        .await
        .map_err(|e| auth_error(&e))?;

    Ok(MessageResponse::ok(format!("authenticated user {}", user.email)))
}

/// Mail a signed reset link to a registered address
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let link = match state.auth.reset_link_for(&payload.email).await {
        Ok(link) => link,
        Err(AuthError::UnknownUser) => {
            return Ok((
                StatusCode::ACCEPTED,
                Json(MessageResponse {
                    error: true,
                    message: "Email is not registered".into(),
                }),
            ));
        }
        Err(e) => return Err(auth_error(&e)),
    };

    let mail = Mail {
        from: state.config.mail_from.clone(),
        to: payload.email,
        subject: "Password Reset Request".into(),
        template: Template::PasswordReset { link },
    };
    state.mailer.send(mail).await.map_err(|e| {
        tracing::error!(error = %e, "Reset mail failed");
        api_error(StatusCode::BAD_GATEWAY, "Could not send email", "MAIL_ERROR")
    })?;

    Ok((StatusCode::CREATED, MessageResponse::ok("")))
}

/// Check a reset link and hand back the encrypted address
pub async fn verify_reset_link(
    State(state): State<AppState>,
    Json(payload): Json<ResetLinkRequest>,
) -> Result<Json<ResetLinkResponse>, ApiError> {
    let email = state
        .auth
        .open_reset_link(&payload.url)
        .map_err(|e| auth_error(&e))?;

    Ok(Json(ResetLinkResponse {
        error: false,
        email,
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state
        .auth
        .reset_password(&payload.email, &payload.password)
        .await
        .map_err(|e| auth_error(&e))?;

    Ok((StatusCode::CREATED, MessageResponse::ok("Password successfully changed")))
}
