//! Per-user key/value settings storage.
//!
//! Values are scoped by user id and addressed by flat string keys such as
//! `chevereto.domain`. Readers get typed access; writers submit a batch of
//! keys for one user that is applied all-or-nothing.
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod filesystem;
mod memory;

pub use filesystem::FilesystemConfigStore;
pub use memory::MemoryConfigStore;

/// A single stored setting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    String(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            ConfigValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(value) => Some(value),
            ConfigValue::Bool(_) => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

/// Keys written together by a single `set_batch` call, in write order.
pub type ConfigBatch = IndexMap<String, ConfigValue>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("could not acquire the write lock")]
    WriteLock(#[from] tokio::sync::AcquireError),

    #[error("settings write did not complete: {0}")]
    WriteTask(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the raw value stored under `key` for `user_id`.
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<ConfigValue>, StoreError>;

    /// Writes every entry of `batch` for `user_id`. Either all entries become
    /// visible or none do.
    async fn set_batch(&self, user_id: &str, batch: ConfigBatch) -> Result<(), StoreError>;

    /// A value stored with a different type counts as not found.
    async fn get_bool(&self, user_id: &str, key: &str) -> Result<Option<bool>, StoreError> {
        Ok(self
            .get(user_id, key)
            .await?
            .and_then(|value| value.as_bool()))
    }

    async fn get_string(&self, user_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .get(user_id, key)
            .await?
            .and_then(|value| value.as_str().map(String::from)))
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    #[default]
    Memory,
    Filesystem {
        path: PathBuf,
    },
}

/// Opens the store selected by `config`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn ConfigStore>, StoreError> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("Using the in-memory settings store, settings are lost on restart");
            Ok(Arc::new(MemoryConfigStore::new()))
        }
        StoreConfig::Filesystem { path } => Ok(Arc::new(FilesystemConfigStore::open(path)?)),
    }
}
