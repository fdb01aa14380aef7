use crate::error::DashResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable string key-value storage used for caching
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    async fn get(&self, key: &str) -> DashResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: String) -> DashResult<()>;

    /// Remove a key if present
    async fn delete(&self, key: &str) -> DashResult<()>;
}

/// In-process store backed by a map.
///
/// Clones share the same map, so a store handed to one session can be
/// reopened by another to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> DashResult<Option<String>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> DashResult<()> {
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DashResult<()> {
        self.data.lock().await.remove(key);
        Ok(())
    }
}
