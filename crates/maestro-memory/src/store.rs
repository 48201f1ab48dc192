//! In-memory implementation of the [`MemoryStore`] capability.
//!
//! Backs tests and the demo binary. Production deployments implement
//! [`MemoryStore`] over the platform's user records.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use maestro_core::{Error, Memory, MemoryStore, Result};

/// In-memory [`MemoryStore`], keyed by user id.
#[derive(Clone, Default)]
pub struct InMemoryMemoryStore {
    memories: Arc<RwLock<HashMap<String, Vec<Memory>>>>,
}

impl InMemoryMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memories held for a user.
    pub async fn count(&self, user_id: &str) -> usize {
        self.memories
            .read()
            .await
            .get(user_id)
            .map_or(0, |m| m.len())
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn load(&self, user_id: &str) -> Result<Vec<Memory>> {
        Ok(self
            .memories
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert(&self, user_id: &str, memory: Memory) -> Result<()> {
        self.memories
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(memory);
        Ok(())
    }

    async fn update(&self, user_id: &str, memory: Memory) -> Result<()> {
        let mut memories = self.memories.write().await;
        let user_memories = memories
            .get_mut(user_id)
            .ok_or_else(|| Error::Memory(format!("no memories for user {}", user_id)))?;
        let slot = user_memories
            .iter_mut()
            .find(|m| m.id == memory.id)
            .ok_or_else(|| Error::Memory(format!("memory not found: {}", memory.id)))?;
        *slot = memory;
        Ok(())
    }

    async fn touch(&self, user_id: &str, ids: &[Uuid]) -> Result<()> {
        let mut memories = self.memories.write().await;
        if let Some(user_memories) = memories.get_mut(user_id) {
            let now = Utc::now();
            for memory in user_memories.iter_mut() {
                if ids.contains(&memory.id) {
                    memory.access_count += 1;
                    memory.last_accessed_at = now;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::MemoryType;

    #[tokio::test]
    async fn test_insert_and_load() {
        let store = InMemoryMemoryStore::new();
        let memory = Memory::new(MemoryType::Preference, "prefers concise answers", 0.8);
        store.insert("user-1", memory.clone()).await.unwrap();

        let loaded = store.load("user-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "prefers concise answers");

        // Other users see nothing
        assert!(store.load("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_by_id() {
        let store = InMemoryMemoryStore::new();
        let mut memory = Memory::new(MemoryType::Fact, "uses Ableton", 0.5);
        store.insert("user-1", memory.clone()).await.unwrap();

        memory.content = "uses Ableton Live 12".to_string();
        memory.importance = 0.7;
        store.update("user-1", memory.clone()).await.unwrap();

        let loaded = store.load("user-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "uses Ableton Live 12");
    }

    #[tokio::test]
    async fn test_update_unknown_memory_errors() {
        let store = InMemoryMemoryStore::new();
        let memory = Memory::new(MemoryType::Fact, "x", 0.5);
        let result = store.update("user-1", memory).await;
        assert!(matches!(result, Err(Error::Memory(_))));
    }

    #[tokio::test]
    async fn test_touch_bumps_access_bookkeeping() {
        let store = InMemoryMemoryStore::new();
        let memory = Memory::new(MemoryType::Context, "working on an EP", 0.5);
        let id = memory.id;
        store.insert("user-1", memory).await.unwrap();

        store.touch("user-1", &[id]).await.unwrap();
        store.touch("user-1", &[id]).await.unwrap();

        let loaded = store.load("user-1").await.unwrap();
        assert_eq!(loaded[0].access_count, 2);
    }

    #[tokio::test]
    async fn test_touch_unknown_user_is_noop() {
        let store = InMemoryMemoryStore::new();
        store.touch("ghost", &[Uuid::new_v4()]).await.unwrap();
    }
}
