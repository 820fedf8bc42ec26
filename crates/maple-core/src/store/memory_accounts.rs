//! In-memory account store

use crate::{oid::Oid, store::AccountStore, types::Account, CoreError, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory account store
#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    accounts: Arc<RwLock<HashMap<Oid, Account>>>,
}

impl MemoryAccountStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert(&self, account: Account) -> Result<Account> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.id) {
            return Err(CoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        if accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(CoreError::Conflict(format!(
                "email {} is already registered",
                account.email
            )));
        }
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get(&self, id: Oid) -> Result<Account> {
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound("account".to_string()))
    }

    async fn get_by_email(&self, email: &str) -> Result<Account> {
        self.accounts
            .read()
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| CoreError::NotFound("account".to_string()))
    }

    async fn update(&self, mut account: Account) -> Result<Account> {
        let mut accounts = self.accounts.write();
        if !accounts.contains_key(&account.id) {
            return Err(CoreError::NotFound("account".to_string()));
        }
        account.modified_at = Utc::now();
        accounts.insert(account.id, account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_crypto::bundle::UserKeyBundle;

    fn account(email: &str) -> Account {
        let (bundle, _) = UserKeyBundle::generate("pw").unwrap();
        Account::new(Oid::new(), email, None, bundle)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryAccountStore::new();
        let a = store.insert(account("a@example.com")).await.unwrap();

        assert_eq!(store.get(a.id).await.unwrap().email, "a@example.com");
        assert_eq!(store.get_by_email("A@Example.COM").await.unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryAccountStore::new();
        store.insert(account("a@example.com")).await.unwrap();

        let result = store.insert(account("a@example.com")).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_unknown_account() {
        let store = MemoryAccountStore::new();
        let result = store.update(account("ghost@example.com")).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
