// # JSON Snapshot Files
//
// Shared persistence for the file-backed stores.
//
// - Atomic writes: content goes to `<file>.tmp`, then is renamed over the file
// - Backup: the previous file is copied to `<file>.backup` before each write
// - Recovery: a file that fails to parse is replaced by its backup; if the
//   backup is missing or unusable too, loading fails. Reservations are an
//   append-only ledger and must never silently restart empty.
// - Nothing is created on disk before the first write
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "data": { ... }
// }
// ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;

/// Snapshot format version
const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize)]
struct SnapshotFormat<T> {
    version: String,
    data: T,
}

enum LoadError {
    /// The file exists but does not parse
    Corrupt(Error),
    Io(Error),
}

/// A JSON document on disk holding one `T`
#[derive(Debug, Clone)]
pub(crate) struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Prepare a snapshot at `path`
    pub(crate) async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if path.is_dir() {
            return Err(Error::state_store(format!(
                "{} is a directory",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    async fn create_parent(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, recovering from the backup if the file is corrupted
    ///
    /// # Errors
    ///
    /// `Error::StateStore` if the file can't be read, or if it is corrupted
    /// and no usable backup exists.
    pub(crate) async fn load<T>(&self) -> Result<T, Error>
    where
        T: DeserializeOwned + Default,
    {
        match Self::load_file(&self.path).await {
            Ok(data) => Ok(data),
            Err(LoadError::Io(e)) => Err(e),
            Err(LoadError::Corrupt(e)) => {
                tracing::warn!(
                    "Snapshot {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    e
                );

                let backup_path = self.backup_path();
                if !backup_path.exists() {
                    return Err(Error::state_store(format!(
                        "{} is corrupted and has no backup; refusing to start empty: {}",
                        self.path.display(),
                        e
                    )));
                }

                match Self::load_file(&backup_path).await {
                    Ok(data) => {
                        if let Err(restore_err) = fs::copy(&backup_path, &self.path).await {
                            tracing::error!(
                                "Failed to restore {} from backup: {}",
                                self.path.display(),
                                restore_err
                            );
                        } else {
                            tracing::info!("Recovered {} from backup", self.path.display());
                        }
                        Ok(data)
                    }
                    Err(LoadError::Corrupt(backup_err)) | Err(LoadError::Io(backup_err)) => {
                        Err(Error::state_store(format!(
                            "{} is corrupted and its backup is unusable; refusing to start empty: {}",
                            self.path.display(),
                            backup_err
                        )))
                    }
                }
            }
        }
    }

    async fn load_file<T>(path: &Path) -> Result<T, LoadError>
    where
        T: DeserializeOwned + Default,
    {
        if !path.exists() {
            tracing::debug!("Snapshot does not exist yet: {}", path.display());
            return Ok(T::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Io(Error::state_store(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        })?;

        let snapshot: SnapshotFormat<T> = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::state_store(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            )))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                "Snapshot version mismatch: expected {}, got {}. Attempting to load anyway.",
                SNAPSHOT_VERSION,
                snapshot.version
            );
        }

        Ok(snapshot.data)
    }

    /// Write `data` atomically, keeping the previous file as backup
    pub(crate) async fn write<T: Serialize>(&self, data: &T) -> Result<(), Error> {
        let snapshot = SnapshotFormat {
            version: SNAPSHOT_VERSION.to_string(),
            data,
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::state_store(format!("Failed to serialize snapshot: {}", e)))?;

        self.create_parent().await?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, self.backup_path()).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Snapshot written: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    pub(crate) fn backup_path(&self) -> PathBuf {
        let mut backup = self.path.clone();
        backup.set_extension("backup");
        backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_default() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::open(dir.path().join("nested/state.json"))
            .await
            .unwrap();
        let data: BTreeMap<String, u32> = file.load().await.unwrap();
        assert!(data.is_empty());
        assert!(!dir.path().join("nested").exists());

        file.write(&data).await.unwrap();
        assert!(dir.path().join("nested/state.json").exists());
    }

    #[tokio::test]
    async fn test_corrupted_file_recovers_previous_write() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::open(dir.path().join("state.json"))
            .await
            .unwrap();

        file.write(&BTreeMap::from([("a".to_string(), 1u32)])).await.unwrap();
        file.write(&BTreeMap::from([("a".to_string(), 2u32)])).await.unwrap();
        assert!(file.backup_path().exists());

        fs::write(file.path(), b"corrupted json data").await.unwrap();

        let data: BTreeMap<String, u32> = file.load().await.unwrap();
        assert_eq!(data.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn test_corrupted_file_without_backup_fails() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::open(dir.path().join("state.json"))
            .await
            .unwrap();
        fs::write(file.path(), b"{\"version\": \"1.0\", \"da").await.unwrap();

        let result: Result<BTreeMap<String, u32>, Error> = file.load().await;
        assert!(matches!(result, Err(Error::StateStore(_))));
    }

    #[tokio::test]
    async fn test_corrupted_file_and_backup_fails() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::open(dir.path().join("state.json"))
            .await
            .unwrap();
        fs::write(file.path(), b"corrupted").await.unwrap();
        fs::write(file.backup_path(), b"also corrupted").await.unwrap();

        let result: Result<BTreeMap<String, u32>, Error> = file.load().await;
        assert!(result.is_err());
    }
}
