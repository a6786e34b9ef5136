//! Admin Handlers
//!
//! Everything here sits behind [`require_admin`].

use axum::{
    Extension, Json,
    extract::{Path, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use widget_auth::hash_password;
use widget_core::{NewUser, OrderDetail, Page, PageRequest, User, UserUpdate};
use widget_hub::HubEvent;
use widget_payments::{
    CancelRequest, CommitResponse, MSG_CANCELLED, MSG_REFUNDED, RefundRequest,
    TerminalPaymentRequest,
};

use crate::handlers::{
    ApiError, MessageResponse, api_error, auth_error, bounded, commit_status, payments,
    reversal_status,
};
use crate::state::AppState;

/// Reject requests without a valid bearer token; attach the user otherwise
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let user = state
        .auth
        .verify_bearer(header.as_deref())
        .await
        .map_err(|e| auth_error(&e))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct UserForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Empty leaves the password unchanged on edit
    #[serde(default)]
    pub password: String,
}

/// Record a payment keyed in by an operator
pub async fn virtual_terminal_succeeded(
    State(state): State<AppState>,
    Extension(operator): Extension<User>,
    Json(payload): Json<TerminalPaymentRequest>,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    tracing::info!(operator = operator.id, payment_intent = %payload.payment_intent, "Virtual terminal payment");
    let outcome = payments(&state)?.record_terminal_payment(&payload).await;
    Ok((commit_status(&outcome), Json(outcome.response())))
}

pub async fn all_sales(
    State(state): State<AppState>,
    Json(page): Json<PageRequest>,
) -> Result<Json<Page<OrderDetail>>, ApiError> {
    let page = bounded(&state, state.orders.all_orders(page)).await?;
    Ok(Json(page))
}

pub async fn all_subscriptions(
    State(state): State<AppState>,
    Json(page): Json<PageRequest>,
) -> Result<Json<Page<OrderDetail>>, ApiError> {
    let page = bounded(&state, state.orders.all_subscriptions(page)).await?;
    Ok(Json(page))
}

pub async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order = bounded(&state, state.orders.get_order(id)).await?;
    Ok(Json(order))
}

pub async fn refund(
    State(state): State<AppState>,
    Json(payload): Json<RefundRequest>,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    let outcome = payments(&state)?.refund(&payload).await;
    Ok((reversal_status(&outcome), Json(outcome.response(MSG_REFUNDED))))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Json(payload): Json<CancelRequest>,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    let outcome = payments(&state)?.cancel_subscription(&payload).await;
    Ok((reversal_status(&outcome), Json(outcome.response(MSG_CANCELLED))))
}

pub async fn all_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = bounded(&state, state.users.all_users()).await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let user = bounded(&state, state.users.get_user(id)).await?;
    Ok(Json(user))
}

/// Edit user `id`, or create a user when `id` is 0
pub async fn edit_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<UserForm>,
) -> Result<Json<MessageResponse>, ApiError> {
    if form.email.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "email is required", "INVALID_INPUT"));
    }

    if id > 0 {
        let update = UserUpdate {
            id,
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
        };
        bounded(&state, state.users.edit_user(update)).await?;

        if !form.password.is_empty() {
            let hash = hash_password(&form.password).map_err(|e| auth_error(&e))?;
            bounded(&state, state.users.update_password(id, &hash)).await?;
        }
        tracing::info!(user_id = id, "User updated");
    } else {
        let hash = hash_password(&form.password).map_err(|e| auth_error(&e))?;
        let user = NewUser {
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
        };
        let new_id = bounded(&state, state.users.add_user(user, &hash)).await?;
        tracing::info!(user_id = new_id, "User created");
    }

    Ok(MessageResponse::ok(""))
}

/// Delete a user and log out their open sessions
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    bounded(&state, state.users.delete_user(id)).await?;
    tracing::info!(user_id = id, "User deleted");

    if let Err(e) = state.hub.publish(HubEvent::UserDeleted { user_id: id }) {
        tracing::warn!(user_id = id, error = %e, "Logout notice not published");
    }
    Ok(MessageResponse::ok(""))
}
