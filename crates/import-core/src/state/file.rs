// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// Reservations must survive the process so that a username is never handed
// out twice, even across runs. Every change is written through immediately
// (see `SnapshotFile` for the atomic write and backup scheme).
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "data": {
//     "reservations": {
//       "jdoe": { "source_uid": "TEST", "record_uid": "s-001" }
//     },
//     "missing": {
//       "TEST/t-042": {
//         "identity": { "source_uid": "TEST", "record_uid": "t-042" },
//         "since": "2024-01-01"
//       }
//     }
//   }
// }
// ```

use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::snapshot::SnapshotFile;
use crate::Error;
use crate::models::Identity;
use crate::traits::state_store::{StateSnapshot, StateStore};

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use school_import_core::state::FileStateStore;
/// use school_import_core::traits::StateStore;
/// use school_import_core::Identity;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/school-import/state.json").await?;
///
///     // Atomically written to disk
///     store.reserve_username("jdoe", &Identity::new("TEST", "s-001")).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    file: SnapshotFile,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    snapshot: StateSnapshot,
    dirty: bool,
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// A corrupted file is recovered from its backup.
    ///
    /// # Errors
    ///
    /// `Error::StateStore` if the file is corrupted and no usable backup
    /// exists. Starting empty would hand out reserved usernames again.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = SnapshotFile::open(path).await?;
        let snapshot: StateSnapshot = file.load().await?;
        tracing::debug!(
            "Loaded state: {} reservations, {} missing",
            snapshot.reservations.len(),
            snapshot.missing.len()
        );

        Ok(Self {
            file,
            state: Arc::new(RwLock::new(FileState {
                snapshot,
                dirty: false,
            })),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    async fn write_state(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;
        self.file.write(&guard.snapshot).await?;
        guard.dirty = false;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn reserve_username(&self, username: &str, identity: &Identity) -> Result<bool, Error> {
        let granted = {
            let mut guard = self.state.write().await;
            let known = guard.snapshot.reservations.contains_key(username);
            let granted = guard.snapshot.reserve(username, identity);
            if granted && !known {
                guard.dirty = true;
            }
            granted
        };

        // Immediate write for durability
        self.flush().await?;
        Ok(granted)
    }

    async fn username_owner(&self, username: &str) -> Result<Option<Identity>, Error> {
        let guard = self.state.read().await;
        Ok(guard.snapshot.reservations.get(username).cloned())
    }

    async fn missing_since(&self, identity: &Identity) -> Result<Option<NaiveDate>, Error> {
        let guard = self.state.read().await;
        Ok(guard.snapshot.missing.get(&identity.key()).map(|m| m.since))
    }

    async fn mark_missing(&self, identity: &Identity, today: NaiveDate) -> Result<NaiveDate, Error> {
        let since = {
            let mut guard = self.state.write().await;
            let known = guard.snapshot.missing.contains_key(&identity.key());
            let since = guard.snapshot.mark_missing(identity, today);
            if !known {
                guard.dirty = true;
            }
            since
        };

        self.flush().await?;
        Ok(since)
    }

    async fn clear_missing(&self, identity: &Identity) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if guard.snapshot.missing.remove(&identity.key()).is_some() {
                guard.dirty = true;
            }
        }

        self.flush().await
    }

    async fn list_reservations(&self) -> Result<Vec<(String, Identity)>, Error> {
        let guard = self.state.read().await;
        Ok(guard
            .snapshot
            .reservations
            .iter()
            .map(|(name, identity)| (name.clone(), identity.clone()))
            .collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reservations_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let jane = Identity::new("TEST", "1");

        let store = FileStateStore::new(&path).await.unwrap();
        assert!(store.reserve_username("jdoe", &jane).await.unwrap());
        assert!(path.exists());

        let reloaded = FileStateStore::new(&path).await.unwrap();
        assert_eq!(reloaded.username_owner("jdoe").await.unwrap(), Some(jane));
        assert!(
            !reloaded
                .reserve_username("jdoe", &Identity::new("TEST", "2"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_marks_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let identity = Identity::new("TEST", "1");
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let store = FileStateStore::new(&path).await.unwrap();
        store.mark_missing(&identity, day).await.unwrap();

        let reloaded = FileStateStore::new(&path).await.unwrap();
        assert_eq!(reloaded.missing_since(&identity).await.unwrap(), Some(day));

        reloaded.clear_missing(&identity).await.unwrap();
        let reloaded = FileStateStore::new(&path).await.unwrap();
        assert_eq!(reloaded.missing_since(&identity).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupted_state_recovers_from_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store
            .reserve_username("first", &Identity::new("TEST", "1"))
            .await
            .unwrap();
        store
            .reserve_username("second", &Identity::new("TEST", "2"))
            .await
            .unwrap();

        tokio::fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileStateStore::new(&path).await.unwrap();
        let names: Vec<String> = recovered
            .list_reservations()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupted_state_without_backup_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store
            .reserve_username("jdoe", &Identity::new("TEST", "deleted"))
            .await
            .unwrap();
        drop(store);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        tokio::fs::write(&path, &content[..content.len() / 2]).await.unwrap();
        let backup = path.with_extension("backup");
        if backup.exists() {
            tokio::fs::remove_file(&backup).await.unwrap();
        }

        let result = FileStateStore::new(&path).await;
        assert!(matches!(result, Err(Error::StateStore(_))));
    }
}
