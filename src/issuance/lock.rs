//! Per-username issuance lock.
//!
//! Two concurrent logins for the same principal would otherwise race each
//! other on the CSR name: the second create collides, deletes the first
//! request, and invalidates the in-flight issuance. Holding this lock across
//! submit, approve, poll and retrieve serializes them instead.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutex per key, created on demand
#[derive(Debug, Clone, Default)]
pub struct IssuanceLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held while a CSR for `key` is in flight
#[derive(Debug)]
pub struct IssuanceGuard {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl IssuanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other issuance for `key` is running
    pub async fn acquire(&self, key: &str) -> IssuanceGuard {
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        IssuanceGuard { key: key.to_string(), locks: self.locks.clone(), guard: Some(guard) }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for IssuanceGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Forget the entry once nobody else holds or waits on it
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
