//! Process-local user store.
//!
//! Used when no database is configured, and by the tests. Looking a user up
//! inside a transaction takes that username's row lock and holds it until the
//! transaction is committed or dropped, so read-modify-write sequences on one
//! account never interleave while other accounts proceed. Writes are staged
//! and applied on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::auth::error::StoreError;
use crate::auth::repo::{UserStore, UserTx};
use crate::auth::repo_types::{Lookup, NewUser, User};

type Users = BTreeMap<String, User>;
type RowLock = Arc<Mutex<()>>;

#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<Users>>,
    rows: Arc<Mutex<HashMap<String, RowLock>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, as if the backing store were down.
    #[cfg(test)]
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    /// Row lock for an existing user. Unknown names get none, so lookups of
    /// arbitrary usernames do not grow the lock table.
    async fn row_lock(&self, username: &str) -> Option<RowLock> {
        let users = self.users.lock().await;
        if !users.contains_key(username) {
            return None;
        }
        let mut rows = self.rows.lock().await;
        Some(rows.entry(username.to_owned()).or_default().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.check_available()?;
        let mut users = self.users.lock().await;
        if users.contains_key(&new_user.username) {
            return Err(StoreError::Duplicate);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            password_hash: new_user.password_hash,
            failed_login_attempts: 0,
            lockout_until: None,
            created_at: new_user.created_at,
        };
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.values().cloned().collect())
    }

    async fn begin(&self) -> Result<Box<dyn UserTx>, StoreError> {
        Ok(Box::new(MemoryUserTx {
            store: self.clone(),
            held: HashMap::new(),
            staged: Vec::new(),
        }))
    }
}

pub struct MemoryUserTx {
    store: MemoryUserStore,
    held: HashMap<String, OwnedMutexGuard<()>>,
    staged: Vec<User>,
}

#[async_trait]
impl UserTx for MemoryUserTx {
    async fn find_by_username(&mut self, username: &str) -> Result<Lookup, StoreError> {
        if let Some(u) = self.staged.iter().rev().find(|u| u.username == username) {
            return Ok(Lookup::Found(u.clone()));
        }

        if !self.held.contains_key(username) {
            let Some(row) = self.store.row_lock(username).await else {
                return Ok(Lookup::NotFound);
            };
            // Waits for any other transaction on this username to finish.
            let guard = row.lock_owned().await;
            self.held.insert(username.to_owned(), guard);
        }

        let users = self.store.users.lock().await;
        Ok(match users.get(username) {
            Some(u) => Lookup::Found(u.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn save(&mut self, user: &User) -> Result<(), StoreError> {
        if !self.held.contains_key(&user.username) {
            return Err(StoreError::Unavailable(format!(
                "user {} was not locked by this transaction",
                user.id
            )));
        }
        self.staged.push(user.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUserTx {
            store,
            held,
            staged,
        } = *self;
        store.check_available()?;

        let mut users = store.users.lock().await;
        for user in &staged {
            match users.get(&user.username) {
                Some(existing) if existing.id == user.id => {}
                _ => {
                    return Err(StoreError::Unavailable(format!(
                        "user {} vanished during update",
                        user.id
                    )))
                }
            }
        }
        for user in staged {
            users.insert(user.username.clone(), user);
        }
        drop(users);
        drop(held);
        Ok(())
    }
}
