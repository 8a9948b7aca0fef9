// src/ingest/accounts.rs
use std::collections::BTreeSet;

use anyhow::{bail, Result};
use parking_lot::RwLock;

use super::types::{is_valid_handle, normalize_handle, AccountRegistry};

/// Fixed account list handed over at startup. Mutations are rejected.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    accounts: Vec<String>,
}

impl StaticAccounts {
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            accounts: clean_handles(accounts),
        }
    }
}

#[async_trait::async_trait]
impl AccountRegistry for StaticAccounts {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.accounts.clone())
    }

    async fn add(&self, _account: &str) -> Result<bool> {
        bail!("static account list is read-only")
    }

    async fn remove(&self, _account: &str) -> Result<bool> {
        bail!("static account list is read-only")
    }

    async fn contains(&self, account: &str) -> Result<bool> {
        let h = normalize_handle(account);
        Ok(self.accounts.iter().any(|a| *a == h))
    }
}

/// Mutable in-process set; membership changes are seen by the producer on its next pass.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    inner: RwLock<BTreeSet<String>>,
}

impl MemoryAccounts {
    pub fn new<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            inner: RwLock::new(clean_handles(initial).into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl AccountRegistry for MemoryAccounts {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().iter().cloned().collect())
    }

    async fn add(&self, account: &str) -> Result<bool> {
        let h = normalize_handle(account);
        if !is_valid_handle(&h) {
            bail!("invalid account handle {h:?}");
        }
        Ok(self.inner.write().insert(h))
    }

    async fn remove(&self, account: &str) -> Result<bool> {
        Ok(self.inner.write().remove(&normalize_handle(account)))
    }

    async fn contains(&self, account: &str) -> Result<bool> {
        Ok(self.inner.read().contains(&normalize_handle(account)))
    }
}

/// Normalize, drop empties, dedup (sorted).
pub fn clean_handles<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for it in items {
        let h = normalize_handle(it.as_ref());
        if is_valid_handle(&h) {
            set.insert(h);
        } else if !h.is_empty() {
            tracing::warn!(handle = %h, "skipping invalid account handle");
        }
    }
    set.into_iter().collect()
}
