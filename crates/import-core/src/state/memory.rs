// # Memory State Store
//
// In-memory implementation of StateStore.
//
// Nothing survives the process: reservations and missing marks start empty
// on every run. Use it for tests and for one-shot imports into a directory
// that is itself thrown away.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::models::Identity;
use crate::traits::state_store::{StateSnapshot, StateStore};

/// In-memory state store implementation
///
/// # Example
///
/// ```rust,no_run
/// use school_import_core::state::MemoryStateStore;
/// use school_import_core::traits::StateStore;
/// use school_import_core::Identity;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let identity = Identity::new("TEST", "s-001");
///
///     assert!(store.reserve_username("jdoe", &identity).await?);
///     assert_eq!(store.username_owner("jdoe").await?, Some(identity));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<StateSnapshot>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `snapshot`
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Copy of the current content
    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.read().await.clone()
    }

    /// Number of reserved usernames
    pub async fn len(&self) -> usize {
        self.inner.read().await.reservations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.reservations.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn reserve_username(&self, username: &str, identity: &Identity) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.reserve(username, identity))
    }

    async fn username_owner(&self, username: &str) -> Result<Option<Identity>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.reservations.get(username).cloned())
    }

    async fn missing_since(&self, identity: &Identity) -> Result<Option<NaiveDate>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.missing.get(&identity.key()).map(|m| m.since))
    }

    async fn mark_missing(&self, identity: &Identity, today: NaiveDate) -> Result<NaiveDate, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.mark_missing(identity, today))
    }

    async fn clear_missing(&self, identity: &Identity) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.missing.remove(&identity.key());
        Ok(())
    }

    async fn list_reservations(&self) -> Result<Vec<(String, Identity)>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .reservations
            .iter()
            .map(|(name, identity)| (name.clone(), identity.clone()))
            .collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }
}
