use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::state::GenerationState;
use super::store::{CacheStore, CacheStoreError};

type CacheFile = BTreeMap<String, GenerationState>;

/// Cache store backed by a single JSON file on the local file system.
pub struct LocalFileCacheStore {
    path: PathBuf,
    // serializes read-modify-write cycles on the file
    write_lock: Mutex<()>,
}

impl LocalFileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<CacheFile, CacheStoreError> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheFile::new()),
            Err(e) => {
                return Err(CacheStoreError::Io(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(CacheFile::new());
        }

        serde_json::from_slice(&contents).map_err(|e| {
            CacheStoreError::Deserialization(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn write_atomically(&self, data: &[u8]) -> Result<(), CacheStoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheStoreError::InvalidPath(format!("Failed to create directory: {}", e)))?;

        // Temp file lives next to the target so the rename stays on one file system
        let temp_file = NamedTempFile::new_in(&dir)
            .map_err(|e| CacheStoreError::Io(format!("Failed to create temporary file: {}", e)))?;
        let temp_path = temp_file.into_temp_path();

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| CacheStoreError::Io(format!("Failed to create file: {}", e)))?;
        file.write_all(data)
            .await
            .map_err(|e| CacheStoreError::Io(format!("Failed to write file: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| CacheStoreError::Io(format!("Failed to sync file: {}", e)))?;
        drop(file);

        temp_path
            .persist(&self.path)
            .map_err(|e| CacheStoreError::Io(format!("Failed to replace cache file: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for LocalFileCacheStore {
    async fn load(&self, key: &str) -> Result<Option<GenerationState>, CacheStoreError> {
        let mut all = self.read_all().await?;
        Ok(all.remove(key))
    }

    #[tracing::instrument(skip(self, state), fields(path = %self.path.display(), exchanges = state.len()))]
    async fn save(&self, key: &str, state: &GenerationState) -> Result<(), CacheStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut all = match self.read_all().await {
            Ok(all) => all,
            Err(CacheStoreError::Deserialization(e)) => {
                warn!("replacing unreadable generation cache: {}", e);
                CacheFile::new()
            }
            Err(e) => return Err(e),
        };
        all.insert(key.to_string(), state.clone());
        let data = serde_json::to_vec(&all)
            .map_err(|e| CacheStoreError::Serialization(e.to_string()))?;

        self.write_atomically(&data).await?;
        debug!("generation cache saved");
        Ok(())
    }
}
