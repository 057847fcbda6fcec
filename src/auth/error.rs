use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::error;

/// Failures reported by the user store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already exists")]
    Duplicate,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

/// Typed outcome of every authenticator operation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Username already exists")]
    Conflict,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account locked. Try again later.")]
    Locked { until: OffsetDateTime },
    #[error(transparent)]
    Store(StoreError),
    #[error("password hashing failed: {0}")]
    Hashing(anyhow::Error),
    #[error("lockout deadline out of range")]
    DeadlineOutOfRange,
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e)
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Locked { .. } => StatusCode::FORBIDDEN,
            AuthError::Store(_) | AuthError::Hashing(_) | AuthError::DeadlineOutOfRange => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    locked_until: Option<OffsetDateTime>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AuthError::Store(_) | AuthError::Hashing(_) | AuthError::DeadlineOutOfRange => {
                error!(error = %self, "request failed");
                ErrorBody {
                    error: "Internal server error".into(),
                    locked_until: None,
                }
            }
            AuthError::Locked { until } => ErrorBody {
                error: self.to_string(),
                locked_until: Some(*until),
            },
            _ => ErrorBody {
                error: self.to_string(),
                locked_until: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
