use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                     // assigned by the store
    pub username: String,             // unique, immutable
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 PHC string, not exposed in JSON
    pub failed_login_attempts: i32,   // consecutive failures since last success
    #[serde(with = "time::serde::rfc3339::option")]
    pub lockout_until: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields supplied by the caller when creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

/// Outcome of a username lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(User),
    NotFound,
}

/// Row of the account listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub username: String,
    pub failed_attempts: i32,
    pub locked_out: bool,
}
