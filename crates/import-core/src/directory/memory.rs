// # Memory Directory
//
// In-process DirectoryBackend. Every write is counted so tests can assert
// that a run did (or did not) touch the directory.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::UserTable;
use crate::Error;
use crate::models::{DirectoryUserState, ExistingUser};
use crate::traits::DirectoryBackend;

/// In-memory directory
///
/// Clones share the same users.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    users: Arc<RwLock<UserTable>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user without counting it as a write
    pub async fn insert(&self, user: ExistingUser) {
        self.users.write().await.insert(user.username.clone(), user);
    }

    /// Get a user by username
    pub async fn get(&self, username: &str) -> Option<ExistingUser> {
        self.users.read().await.get(username).cloned()
    }

    /// All users, ordered by username
    pub async fn users(&self) -> Vec<ExistingUser> {
        self.users.read().await.values().cloned().collect()
    }

    /// Number of successful write calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryBackend for MemoryDirectory {
    async fn lookup(&self, source_uid: &str, record_uid: &str) -> Result<Option<ExistingUser>, Error> {
        let users = self.users.read().await;
        Ok(super::find_identity(&users, source_uid, record_uid).cloned())
    }

    async fn lookup_by_username(&self, username: &str) -> Result<Option<ExistingUser>, Error> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn create(&self, user: &DirectoryUserState) -> Result<(), Error> {
        super::insert_user(&mut *self.users.write().await, user)?;
        self.count_write();
        Ok(())
    }

    async fn modify(&self, user: &DirectoryUserState) -> Result<(), Error> {
        super::update_user(&mut *self.users.write().await, user)?;
        self.count_write();
        Ok(())
    }

    async fn move_user(&self, username: &str, new_school: &str) -> Result<(), Error> {
        super::move_user(&mut *self.users.write().await, username, new_school)?;
        self.count_write();
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), Error> {
        super::remove_user(&mut *self.users.write().await, username)?;
        self.count_write();
        Ok(())
    }

    async fn enumerate(&self, source_uid: &str, partition: Option<&str>) -> Result<Vec<ExistingUser>, Error> {
        let users = self.users.read().await;
        Ok(super::list_users(&users, source_uid, partition))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
