use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::core::error::DocpackError;
use crate::platform::{NativePlatform, Platform};

/// Whole-value key/value persistence underneath the job store.
#[async_trait]
pub trait RecordSubstrate: Send + Sync {
    /// `Ok(None)` when nothing has been stored under `key` yet.
    async fn read(&self, key: &str) -> Result<Option<String>, DocpackError>;

    async fn write(&self, key: &str, value: &str) -> Result<(), DocpackError>;
}

/// Stores each key as `<dir>/<key>.json`, replacing the file atomically.
pub struct FileSubstrate {
    dir: PathBuf,
}

impl FileSubstrate {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl RecordSubstrate for FileSubstrate {
    async fn read(&self, key: &str) -> Result<Option<String>, DocpackError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), DocpackError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            NativePlatform::restrict_dir_permissions(&self.dir);
        }
        let target = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, value).await?;
        NativePlatform::restrict_file_permissions(&tmp);
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Process-local substrate; nothing survives a restart.
#[derive(Default)]
pub struct MemorySubstrate {
    entries: std::sync::Mutex<HashMap<String, String>>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn seeded(key: &str, value: &str) -> Self {
        let substrate = Self::new();
        substrate
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        substrate
    }
}

#[async_trait]
impl RecordSubstrate for MemorySubstrate {
    async fn read(&self, key: &str) -> Result<Option<String>, DocpackError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), DocpackError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_substrate_reports_missing_key_as_none() {
        let tmpdir = tempfile::tempdir().unwrap();
        let substrate = FileSubstrate::new(tmpdir.path());
        assert!(substrate.read("docpacks").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_substrate_overwrites_whole_value() {
        let tmpdir = tempfile::tempdir().unwrap();
        let substrate = FileSubstrate::new(tmpdir.path().join("state"));
        substrate.write("docpacks", "{\"a\":1}").await.unwrap();
        substrate.write("docpacks", "{\"b\":2}").await.unwrap();

        assert_eq!(
            substrate.read("docpacks").await.unwrap().as_deref(),
            Some("{\"b\":2}")
        );
        let leftovers: Vec<_> = std::fs::read_dir(tmpdir.path().join("state"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
