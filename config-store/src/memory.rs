use crate::{ConfigBatch, ConfigStore, ConfigValue, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Keeps every user's settings in process memory.
#[derive(Default)]
pub struct MemoryConfigStore {
    data: RwLock<HashMap<String, HashMap<String, ConfigValue>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<ConfigValue>, StoreError> {
        let read_guard = self.data.read();
        Ok(read_guard
            .get(user_id)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn set_batch(&self, user_id: &str, batch: ConfigBatch) -> Result<(), StoreError> {
        // A single write guard covers the whole batch.
        let mut write_guard = self.data.write();
        write_guard
            .entry(user_id.to_string())
            .or_default()
            .extend(batch);
        Ok(())
    }
}
