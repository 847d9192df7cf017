//! Persistent key-value store collaborator.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::lock_ignoring_poison;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

/// Keys the wallet persists under.
pub mod keys {
    pub const SECURITY_STATE: &str = "wallet/security";
    pub const CREDENTIALS: &str = "wallet/credentials";
    pub const UTXO_CACHE: &str = "wallet/utxo_cache";
}

/// Backing mechanism is the embedder's concern; the wallet only needs
/// get/set/remove.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(lock_ignoring_poison(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        lock_ignoring_poison(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        lock_ignoring_poison(&self.entries).remove(key);
        Ok(())
    }
}
