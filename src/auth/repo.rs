use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::auth::error::StoreError;
use crate::auth::repo_types::{Lookup, NewUser, User};

/// Persistent user storage.
///
/// Updates go through [`UserTx`] so that each read-modify-write runs under the
/// store's locking and either commits whole or leaves no trace.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with [`StoreError::Duplicate`] if the username is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// All users ordered by username.
    async fn list(&self) -> Result<Vec<User>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError>;
}

/// A unit of work over one or more user rows. Dropping it without
/// [`UserTx::commit`] discards every staged write.
#[async_trait]
pub trait UserTx: Send {
    /// Look up a user and hold it exclusively until the transaction ends.
    async fn find_by_username(&mut self, username: &str) -> Result<Lookup, StoreError>;

    async fn save(&mut self, user: &User) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, username, password_hash, failed_login_attempts, lockout_until, created_at
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(new_user.created_at)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, failed_login_attempts, lockout_until, created_at
            FROM users
            ORDER BY username ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgUserTx { tx }))
    }
}

pub struct PgUserTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UserTx for PgUserTx {
    async fn find_by_username(&mut self, username: &str) -> Result<Lookup, StoreError> {
        // Row lock: a concurrent attempt on the same username waits here and
        // then reads the committed counter.
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, failed_login_attempts, lockout_until, created_at
            FROM users
            WHERE username = $1
            FOR UPDATE
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(match user {
            Some(u) => Lookup::Found(u),
            None => Lookup::NotFound,
        })
    }

    async fn save(&mut self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   failed_login_attempts = $3,
                   lockout_until = $4
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(user.failed_login_attempts)
        .bind(user.lockout_until)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Unavailable(format!(
                "user {} vanished during update",
                user.id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
