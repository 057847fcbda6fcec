use crate::state::AppState;
use axum::Router;

pub mod clock;
mod dto;
pub mod error;
pub mod handlers;
pub mod lockout;
pub mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::account_routes())
}
