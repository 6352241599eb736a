//! Settings persisted as a single JSON document so they survive restarts.
use crate::{ConfigBatch, ConfigStore, ConfigValue, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

type Document = BTreeMap<String, BTreeMap<String, ConfigValue>>;

pub struct FilesystemConfigStore {
    path: PathBuf,
    data: Arc<RwLock<Document>>,
    // Only one batch may be written to disk at a time.
    update_lock: Arc<Semaphore>,
}

impl FilesystemConfigStore {
    /// Loads the document at `path`. A missing file is treated as an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let data: Document = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Document::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = ?path, users = data.len(), "Loaded settings store");

        Ok(FilesystemConfigStore {
            path,
            data: Arc::new(RwLock::new(data)),
            update_lock: Arc::new(Semaphore::new(1)),
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tmp.into()
    }
}

#[async_trait]
impl ConfigStore for FilesystemConfigStore {
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<ConfigValue>, StoreError> {
        let read_guard = self.data.read();
        Ok(read_guard
            .get(user_id)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn set_batch(&self, user_id: &str, batch: ConfigBatch) -> Result<(), StoreError> {
        // The permit moves into the write task and is released when it ends
        let permit = self.update_lock.clone().acquire_owned().await?;

        let mut updated = self.data.read().clone();
        updated
            .entry(user_id.to_string())
            .or_default()
            .extend(batch);

        let path = self.path.clone();
        let tmp_path = self.tmp_path();
        let data = self.data.clone();

        // Write next to the target and rename over it, so a failed write
        // leaves both the file and the in-memory copy untouched. The task
        // runs to completion even if the caller stops waiting, so the file
        // and memory never disagree.
        let write_task = tokio::spawn(async move {
            let _permit = permit;

            let encoded = serde_json::to_vec_pretty(&updated)?;
            tokio::fs::write(&tmp_path, &encoded).await?;
            tokio::fs::rename(&tmp_path, &path).await?;

            *data.write() = updated;

            tracing::debug!(path = ?path, bytes = encoded.len(), "Stored settings");
            Ok::<(), StoreError>(())
        });

        write_task.await?
    }
}
