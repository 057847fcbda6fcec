use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::auth::clock::Clock;
use crate::auth::error::{AuthError, StoreError};
use crate::auth::lockout::LockoutPolicy;
use crate::auth::password::CredentialHasher;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{AccountSummary, Lookup, NewUser, User};

/// Registration, login with progressive lockout, and password reset.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

fn require(field: &str, value: &str) -> Result<(), AuthError> {
    if value.is_empty() {
        warn!(field, "missing required field");
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
        clock: Arc<dyn Clock>,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            store,
            hasher,
            clock,
            policy,
        }
    }

    fn hash(&self, plain: &str) -> Result<String, AuthError> {
        self.hasher.hash(plain).map_err(|e| {
            error!(error = %e, "hash failed");
            AuthError::Hashing(e)
        })
    }

    fn verify(&self, plain: &str, user: &User) -> Result<bool, AuthError> {
        self.hasher.verify(plain, &user.password_hash).map_err(|e| {
            error!(error = %e, user_id = %user.id, "verify failed");
            AuthError::Hashing(e)
        })
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        require("username", username)?;
        require("password", password)?;

        let password_hash = self.hash(password)?;
        let user = self
            .store
            .create(NewUser {
                username: username.to_owned(),
                password_hash,
                created_at: self.clock.now(),
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => {
                    warn!("username already registered");
                    AuthError::Conflict
                }
                other => {
                    error!(error = %other, "create user failed");
                    AuthError::Store(other)
                }
            })?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        require("username", username)?;
        require("password", password)?;

        let mut tx = self.store.begin().await?;
        let mut user = match tx.find_by_username(username).await? {
            Lookup::Found(user) => user,
            Lookup::NotFound => {
                // Nothing to count against; the response matches a wrong password.
                warn!("login unknown username");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let now = self.clock.now();
        if let Some(until) = user.active_lockout(now) {
            warn!(user_id = %user.id, %until, "login while locked");
            return Err(AuthError::Locked { until });
        }

        if self.verify(password, &user)? {
            user.clear_failures();
            tx.save(&user).await?;
            tx.commit().await?;
            info!(user_id = %user.id, "user logged in");
            return Ok(user);
        }

        let locked = user.record_failure(&self.policy, now).map_err(|e| {
            error!(user_id = %user.id, error = %e, "lockout deadline overflow");
            e
        })?;
        tx.save(&user).await?;
        tx.commit().await?;

        match locked {
            Some(until) => {
                warn!(
                    user_id = %user.id,
                    attempts = user.failed_login_attempts,
                    %until,
                    "account locked"
                );
                Err(AuthError::Locked { until })
            }
            None => {
                warn!(
                    user_id = %user.id,
                    attempts = user.failed_login_attempts,
                    "login invalid password"
                );
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn reset_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        require("username", username)?;
        require("old_password", old_password)?;
        require("new_password", new_password)?;

        let mut tx = self.store.begin().await?;
        let mut user = match tx.find_by_username(username).await? {
            Lookup::Found(user) => user,
            Lookup::NotFound => {
                warn!("reset unknown username");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify(old_password, &user)? {
            warn!(user_id = %user.id, "reset with wrong old password");
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(until) = user.active_lockout(self.clock.now()) {
            warn!(user_id = %user.id, %until, "reset while locked");
            return Err(AuthError::Locked { until });
        }

        user.password_hash = self.hash(new_password)?;
        user.clear_failures();
        tx.save(&user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountSummary>, AuthError> {
        let users = self.store.list().await?;
        let now = self.clock.now();
        Ok(users.iter().map(|u| u.summary(now)).collect())
    }
}
