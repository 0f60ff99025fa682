//! Cached view over the persistent ID mapping table
//!
//! All mappings are loaded once; lookups are served from memory and new
//! entries are written through to SQLite in one transaction per batch. In
//! dry-run mode new entries stay in memory only.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};

use crate::config::repository::id_mappings;

pub struct IdMapStore {
    pool: SqlitePool,
    cache: HashMap<String, HashMap<String, String>>,
    persist: bool,
}

impl IdMapStore {
    /// Load all existing mappings from the pool
    pub async fn load(pool: SqlitePool) -> Result<Self> {
        let mut cache: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (object, old_id, new_id) in id_mappings::get_all_mappings(&pool).await? {
            cache.entry(object).or_default().insert(old_id, new_id);
        }

        let total: usize = cache.values().map(HashMap::len).sum();
        log::debug!("Loaded {} ID mappings for {} objects", total, cache.len());

        Ok(Self {
            pool,
            cache,
            persist: true,
        })
    }

    /// Stop writing new mappings to disk (dry run)
    pub fn memory_only(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.persist
    }

    pub fn get(&self, object: &str, old_id: &str) -> Option<&str> {
        self.cache
            .get(object)
            .and_then(|m| m.get(old_id))
            .map(String::as_str)
    }

    pub fn contains(&self, object: &str, old_id: &str) -> bool {
        self.get(object, old_id).is_some()
    }

    /// Record one mapping
    pub async fn insert(&mut self, object: &str, old_id: &str, new_id: &str) -> Result<()> {
        self.insert_batch(object, vec![(old_id.to_string(), new_id.to_string())])
            .await
    }

    /// Record a batch of (old_id, new_id) mappings for one object
    pub async fn insert_batch(&mut self, object: &str, mappings: Vec<(String, String)>) -> Result<()> {
        if mappings.is_empty() {
            return Ok(());
        }

        if self.persist {
            id_mappings::set_mappings(&self.pool, object, &mappings).await?;
        }

        let entry = self.cache.entry(object.to_string()).or_default();
        entry.extend(mappings);
        Ok(())
    }

    pub fn count(&self, object: &str) -> usize {
        self.cache.get(object).map_or(0, HashMap::len)
    }

    pub fn total(&self) -> usize {
        self.cache.values().map(HashMap::len).sum()
    }

    /// Mapping counts per object, sorted by name
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.cache
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(object, m)| (object.clone(), m.len()))
            .collect()
    }

    /// All remote IDs recorded for an object
    pub fn new_ids(&self, object: &str) -> Vec<String> {
        self.cache
            .get(object)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn clear_object(&mut self, object: &str) -> Result<u64> {
        let removed = self.cache.remove(object).map_or(0, |m| m.len() as u64);
        if self.persist {
            return id_mappings::delete_object_mappings(&self.pool, object).await;
        }
        Ok(removed)
    }

    pub async fn clear_all(&mut self) -> Result<u64> {
        let removed = self.total() as u64;
        self.cache.clear();
        if self.persist {
            return id_mappings::delete_all_mappings(&self.pool).await;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::open_memory_pool;

    #[tokio::test]
    async fn test_mappings_survive_reload() {
        let pool = open_memory_pool().await.unwrap();

        let mut store = IdMapStore::load(pool.clone()).await.unwrap();
        store
            .insert_batch(
                "Account",
                vec![("a1".into(), "001A".into()), ("a2".into(), "001B".into())],
            )
            .await
            .unwrap();

        let reloaded = IdMapStore::load(pool).await.unwrap();
        assert_eq!(reloaded.get("Account", "a2"), Some("001B"));
        assert_eq!(reloaded.count("Account"), 2);
        assert_eq!(reloaded.counts().get("Account"), Some(&2));
    }

    #[tokio::test]
    async fn test_memory_only_does_not_persist() {
        let pool = open_memory_pool().await.unwrap();

        let mut store = IdMapStore::load(pool.clone()).await.unwrap().memory_only();
        store.insert("Lead", "l1", "00QA").await.unwrap();
        assert!(store.contains("Lead", "l1"));

        let reloaded = IdMapStore::load(pool).await.unwrap();
        assert!(!reloaded.contains("Lead", "l1"));
    }

    #[tokio::test]
    async fn test_clear_object() {
        let pool = open_memory_pool().await.unwrap();
        let mut store = IdMapStore::load(pool).await.unwrap();
        store.insert("Case", "c1", "500A").await.unwrap();
        store.insert("Lead", "l1", "00QA").await.unwrap();

        assert_eq!(store.clear_object("Case").await.unwrap(), 1);
        assert_eq!(store.count("Case"), 0);
        assert_eq!(store.total(), 1);
        assert_eq!(store.clear_all().await.unwrap(), 1);
        assert_eq!(store.total(), 0);
    }
}
