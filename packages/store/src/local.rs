//! Directory-backed store.
//!
//! Keys map to paths under `{root}/{container}/`, with `/` as the
//! separator on every platform.

use std::path::{Path, PathBuf};

use crate::{ObjectStore, StoreError};

/// Object store backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    container: String,
    dir: PathBuf,
}

impl LocalObjectStore {
    /// Creates a store for `container` under `root`. The directory is
    /// created on first write.
    #[must_use]
    pub fn new(root: &Path, container: impl Into<String>) -> Self {
        let container = container.into();
        let dir = root.join(&container);
        Self { container, dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .fold(self.dir.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                container: self.container.clone(),
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::Get {
                container: self.container.clone(),
                key: key.to_string(),
                source: Box::new(e),
            }),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StoreError::Put {
                container: self.container.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;
        log::debug!("  wrote {}", path.display());
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![(self.dir.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = format!("{key_prefix}{name}");
                let ft = entry.file_type().await?;
                if ft.is_dir() {
                    pending.push((entry.path(), format!("{key}/")));
                } else if ft.is_file() && key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
