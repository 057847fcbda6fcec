use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{field, LoginRequest, MessageResponse, PublicUser, RegisterRequest, ResetRequest},
        error::AuthError,
        repo_types::AccountSummary,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/reset", post(reset_password))
}

pub fn account_routes() -> Router<AppState> {
    Router::new().route("/users", get(list_users))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    let user = state
        .auth
        .register(field(&payload.username), field(&payload.password))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("User {} registered successfully", user.username),
            user: Some(PublicUser::from(user)),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let user = state
        .auth
        .login(field(&payload.username), field(&payload.password))
        .await?;

    Ok(Json(MessageResponse {
        message: "Login successful".into(),
        user: Some(PublicUser::from(user)),
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state
        .auth
        .reset_password(
            field(&payload.username),
            field(&payload.old_password),
            field(&payload.new_password),
        )
        .await?;

    Ok(Json(MessageResponse {
        message: "Password reset successful".into(),
        user: None,
    }))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountSummary>>, AuthError> {
    Ok(Json(state.auth.list_accounts().await?))
}
