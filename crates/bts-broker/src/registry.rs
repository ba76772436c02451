//! Process-wide account registry.
//!
//! One map `token → Arc<Account>` behind a single `RwLock`; the lock is held
//! only for map access (never across IO), so lookups stay cheap while
//! insert/delete serialize.  Token and name are both unique; the admin token
//! is reserved and authorizes cross-account operations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bts_feed::Feed;
use bts_schemas::BrokerError;
use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountMeta, TradePolicy};

/// Listing entry for the admin accounts view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountBrief {
    pub name: String,
    pub token: String,
    pub principal_micros: i64,
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

pub struct Registry {
    admin_token: String,
    accounts: RwLock<HashMap<String, Arc<Account>>>,
}

impl Registry {
    pub fn new(admin_token: impl Into<String>) -> Self {
        Self {
            admin_token: admin_token.into(),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_admin(&self, token: &str) -> bool {
        !self.admin_token.is_empty() && token == self.admin_token
    }

    /// Resolve a bearer token to its account.
    pub fn get(&self, token: &str) -> Option<Arc<Account>> {
        self.accounts
            .read()
            .expect("registry lock poisoned")
            .get(token)
            .cloned()
    }

    /// Create and register a new account.
    ///
    /// # Errors
    /// `ACCOUNT_EXISTS` when the token or name is already taken (the admin
    /// token counts as taken), `UNAUTHORIZED` on an empty token.
    pub fn create(
        &self,
        meta: AccountMeta,
        feed: Arc<dyn Feed>,
        policy: TradePolicy,
    ) -> Result<Arc<Account>, BrokerError> {
        if meta.token.is_empty() {
            return Err(BrokerError::Unauthorized);
        }
        if self.is_admin(&meta.token) {
            return Err(BrokerError::AccountExists {
                name: meta.name.clone(),
            });
        }

        let mut map = self.accounts.write().expect("registry lock poisoned");
        if map.contains_key(&meta.token) || map.values().any(|a| a.name() == meta.name) {
            return Err(BrokerError::AccountExists { name: meta.name });
        }

        let name = meta.name.clone();
        let account = Arc::new(Account::new(meta, feed, policy));
        map.insert(account.token().to_string(), Arc::clone(&account));
        tracing::info!(account = %name, "account created");
        Ok(account)
    }

    /// Insert a restored account, replacing any existing entry with the same
    /// token (reloading over a live session is deliberate).
    pub fn insert_restored(&self, account: Arc<Account>) {
        let mut map = self.accounts.write().expect("registry lock poisoned");
        map.retain(|_, a| a.name() != account.name());
        map.insert(account.token().to_string(), account);
    }

    /// All registered accounts.
    pub fn list(&self) -> Vec<AccountBrief> {
        let map = self.accounts.read().expect("registry lock poisoned");
        let mut briefs: Vec<AccountBrief> = map
            .values()
            .map(|a| {
                let meta = a.meta();
                AccountBrief {
                    name: meta.name.clone(),
                    token: meta.token.clone(),
                    principal_micros: meta.principal_micros,
                    start: meta.start,
                    end: meta.end,
                }
            })
            .collect();
        briefs.sort_by(|a, b| a.name.cmp(&b.name));
        briefs
    }

    /// Delete accounts; returns how many remain.
    ///
    /// A regular token deletes its own account.  The admin token deletes the
    /// named account, or every account when no name is given.
    pub fn delete(&self, token: &str, name: Option<&str>) -> Result<usize, BrokerError> {
        let mut map = self.accounts.write().expect("registry lock poisoned");

        if self.is_admin(token) {
            match name {
                Some(name) => {
                    let before = map.len();
                    map.retain(|_, a| a.name() != name);
                    if map.len() == before {
                        return Err(BrokerError::NotFound {
                            name: name.to_string(),
                        });
                    }
                }
                None => map.clear(),
            }
            return Ok(map.len());
        }

        match map.remove(token) {
            Some(account) => {
                tracing::info!(account = %account.name(), "account deleted");
                Ok(map.len())
            }
            None => Err(BrokerError::Unauthorized),
        }
    }
}
