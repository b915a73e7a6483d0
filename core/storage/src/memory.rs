//! In-memory cache adapter.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::adapter::CacheAdapter;
use sidegate_common::Result;

/// In-memory cache adapter.
///
/// One map per instance; entries never expire and are lost on drop.
pub struct MemoryAdapter {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryAdapter {
    /// Create a new empty memory adapter.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value, _ttl: Option<Duration>) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get() {
        let adapter = MemoryAdapter::new();
        adapter
            .set("abis/0x01", &json!({"magic": 1}), None)
            .await
            .unwrap();

        assert_eq!(
            adapter.get("abis/0x01").await.unwrap(),
            Some(json!({"magic": 1}))
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_miss() {
        let adapter = MemoryAdapter::new();
        assert_eq!(adapter.get("nope").await.unwrap(), None);
        assert!(adapter.is_empty().await);
    }

    #[tokio::test]
    async fn test_ttl_is_ignored() {
        let adapter = MemoryAdapter::new();
        adapter
            .set("k", &json!("v"), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(adapter.get("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let adapter = MemoryAdapter::new();
        adapter.set("k", &json!(1), None).await.unwrap();
        adapter.set("k", &json!(2), None).await.unwrap();

        assert_eq!(adapter.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(adapter.len().await, 1);
    }
}
