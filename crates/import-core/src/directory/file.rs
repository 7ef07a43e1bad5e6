// # File Directory
//
// DirectoryBackend over a JSON snapshot on disk. Each write replaces the
// snapshot atomically, keeping the previous version as backup.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::RwLock;

use super::UserTable;
use crate::Error;
use crate::models::{DirectoryUserState, ExistingUser};
use crate::state::snapshot::SnapshotFile;
use crate::traits::DirectoryBackend;

/// File-backed directory
#[derive(Debug)]
pub struct FileDirectory {
    file: SnapshotFile,
    users: RwLock<UserTable>,
}

impl FileDirectory {
    /// Open the directory at `path`; an absent file is an empty directory
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = SnapshotFile::open(path)
            .await
            .map_err(|e| Error::directory(e.to_string()))?;
        let users: UserTable = file
            .load()
            .await
            .map_err(|e| Error::directory(e.to_string()))?;
        tracing::debug!(
            "Opened directory {} with {} users",
            file.path().display(),
            users.len()
        );

        Ok(Self {
            file,
            users: RwLock::new(users),
        })
    }

    /// Apply `change` to the table and persist it; on failure nothing changes
    async fn write<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut UserTable) -> Result<(), Error>,
    {
        let mut users = self.users.write().await;
        let mut updated = users.clone();
        change(&mut updated)?;
        self.file
            .write(&updated)
            .await
            .map_err(|e| Error::directory(e.to_string()))?;
        *users = updated;
        Ok(())
    }
}

#[async_trait]
impl DirectoryBackend for FileDirectory {
    async fn lookup(&self, source_uid: &str, record_uid: &str) -> Result<Option<ExistingUser>, Error> {
        let users = self.users.read().await;
        Ok(super::find_identity(&users, source_uid, record_uid).cloned())
    }

    async fn lookup_by_username(&self, username: &str) -> Result<Option<ExistingUser>, Error> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn create(&self, user: &DirectoryUserState) -> Result<(), Error> {
        self.write(|users| super::insert_user(users, user)).await
    }

    async fn modify(&self, user: &DirectoryUserState) -> Result<(), Error> {
        self.write(|users| super::update_user(users, user)).await
    }

    async fn move_user(&self, username: &str, new_school: &str) -> Result<(), Error> {
        self.write(|users| super::move_user(users, username, new_school))
            .await
    }

    async fn delete(&self, username: &str) -> Result<(), Error> {
        self.write(|users| super::remove_user(users, username)).await
    }

    async fn enumerate(&self, source_uid: &str, partition: Option<&str>) -> Result<Vec<ExistingUser>, Error> {
        let users = self.users.read().await;
        Ok(super::list_users(&users, source_uid, partition))
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn state(username: &str, record_uid: &str) -> DirectoryUserState {
        DirectoryUserState {
            username: username.to_string(),
            record_uid: record_uid.to_string(),
            source_uid: "TEST".to_string(),
            role: Role::Teacher,
            school: "gym1".to_string(),
            schools: vec!["gym1".to_string()],
            attributes: BTreeMap::from([("lastname".to_string(), "Doe".to_string())]),
            password: Some("secret".to_string()),
            disabled: false,
            expiration: None,
        }
    }

    #[tokio::test]
    async fn test_users_persist_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.json");

        let directory = FileDirectory::open(&path).await.unwrap();
        directory.create(&state("jdoe", "1")).await.unwrap();
        directory.create(&state("asmith", "2")).await.unwrap();
        directory.delete("asmith").await.unwrap();

        let reopened = FileDirectory::open(&path).await.unwrap();
        let users = reopened.enumerate("TEST", None).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "jdoe");
        assert_eq!(users[0].attributes.get("lastname").unwrap(), "Doe");

        // Passwords are never stored
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!content.contains("secret"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_table_unchanged() {
        let dir = tempdir().unwrap();
        let directory = FileDirectory::open(dir.path().join("directory.json"))
            .await
            .unwrap();

        assert!(directory.modify(&state("ghost", "9")).await.is_err());
        assert!(directory.enumerate("TEST", None).await.unwrap().is_empty());
    }
}
