//! In-process state store
//!
//! A single `RwLock`-guarded map. Expiry is lazy: reads treat an expired
//! entry as missing, and writes purge it before reuse. The lock makes every
//! operation atomic, which is all the pipeline requires of a store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{StateStore, StoreError};

enum Value {
    Blob(String),
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self { value, expires_at: None }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`StateStore`] implementation
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys, for diagnostics
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drop the entry at `key` if it has expired, so writers start fresh
fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        purge_expired(&mut entries, key, now);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(map) => {
                for (field, value) in fields {
                    map.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn hash_get_all(
        &self,
        key: &str,
    ) -> Result<Option<HashMap<String, String>>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => Ok(None),
            Some(entry) => match &entry.value {
                Value::Hash(map) => Ok(Some(map.clone())),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(None),
        }
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        purge_expired(&mut entries, key, now);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(map) => {
                let current = map
                    .get(field)
                    .map(|v| v.parse::<i64>())
                    .transpose()
                    .map_err(|_| StoreError::WrongType(format!("{key}:{field}")))?
                    .unwrap_or(0);
                let next = current + by;
                map.insert(field.to_string(), next.to_string());
                Ok(next)
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry::new(Value::Blob(value)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => Ok(None),
            Some(entry) => match &entry.value {
                Value::Blob(value) => Ok(Some(value.clone())),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(None),
        }
    }

    async fn list_push(&self, key: &str, value: String) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        purge_expired(&mut entries, key, now);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(Vec::new())));
        match &mut entry.value {
            Value::List(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn list_range(
        &self,
        key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::List(items) => {
                    Ok(items.iter().skip(offset).take(limit).cloned().collect())
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(items) => Ok(items.len()),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(0),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) => Ok(!entry.is_expired(now)),
            None => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_blob_round_trip() {
        let store = MemoryStore::new();
        store.put("k", "v".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_set_and_get() {
        let store = MemoryStore::new();
        store
            .hash_set("h", &[("a".to_string(), "1".to_string())])
            .await
            .unwrap();
        store
            .hash_set("h", &[("b".to_string(), "2".to_string())])
            .await
            .unwrap();

        let map = store.hash_get_all("h").await.unwrap().unwrap();
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.get("b").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_hash_incr_returns_new_value() {
        let store = MemoryStore::new();
        assert_eq!(store.hash_incr("h", "n", 1).await.unwrap(), 1);
        assert_eq!(store.hash_incr("h", "n", 1).await.unwrap(), 2);
        assert_eq!(store.hash_incr("h", "n", 5).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_hash_incr_is_atomic_under_contention() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.hash_incr("h", "n", 1).await.unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }

        // Every returned value is distinct: no two increments observed the
        // same intermediate count.
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let store = MemoryStore::new();
        store.put("k", "v".to_string()).await.unwrap();
        assert!(matches!(
            store.hash_incr("k", "n", 1).await,
            Err(StoreError::WrongType(_))
        ));
        assert!(matches!(
            store.list_push("k", "x".to_string()).await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_list_operations() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.list_push("l", i.to_string()).await.unwrap();
        }
        assert_eq!(store.list_len("l").await.unwrap(), 5);
        assert_eq!(
            store.list_range("l", 1, 2).await.unwrap(),
            vec!["1".to_string(), "2".to_string()]
        );
        assert_eq!(
            store.list_range("missing", 0, 10).await.unwrap(),
            Vec::<String>::new()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let store = MemoryStore::new();
        store.put("k", "v".to_string()).await.unwrap();
        store.expire("k", Duration::from_secs(10)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.scan_prefix("k").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_after_expiry_starts_fresh() {
        let store = MemoryStore::new();
        store.hash_incr("h", "n", 3).await.unwrap();
        store.expire("h", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        // The expired counter does not leak into the new window.
        assert_eq!(store.hash_incr("h", "n", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let store = MemoryStore::new();
        store.put("import:job:a", "1".to_string()).await.unwrap();
        store.put("import:job:b", "2".to_string()).await.unwrap();
        store.put("import:chunk:a:0", "3".to_string()).await.unwrap();

        let mut keys = store.scan_prefix("import:job:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["import:job:a", "import:job:b"]);
    }
}
