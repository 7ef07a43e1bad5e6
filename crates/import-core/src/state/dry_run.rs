// # Dry-Run State Store
//
// Overlay over a persistent store for dry runs. Reads fall through to the
// wrapped store, writes stay in memory and are dropped with the overlay, so
// a dry run sees the same reservations a real run would without claiming any.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::models::Identity;
use crate::traits::state_store::{StateSnapshot, StateStore};

#[derive(Debug, Default)]
struct Overlay {
    snapshot: StateSnapshot,
    /// Missing marks cleared in this run
    cleared: BTreeSet<String>,
}

/// Read-through, write-nowhere state store
pub struct DryRunStateStore {
    inner: Arc<dyn StateStore>,
    overlay: RwLock<Overlay>,
}

impl DryRunStateStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            overlay: RwLock::new(Overlay::default()),
        }
    }
}

#[async_trait]
impl StateStore for DryRunStateStore {
    async fn reserve_username(&self, username: &str, identity: &Identity) -> Result<bool, Error> {
        if let Some(owner) = self.inner.username_owner(username).await? {
            return Ok(&owner == identity);
        }
        let mut overlay = self.overlay.write().await;
        Ok(overlay.snapshot.reserve(username, identity))
    }

    async fn username_owner(&self, username: &str) -> Result<Option<Identity>, Error> {
        if let Some(owner) = self.overlay.read().await.snapshot.reservations.get(username) {
            return Ok(Some(owner.clone()));
        }
        self.inner.username_owner(username).await
    }

    async fn missing_since(&self, identity: &Identity) -> Result<Option<NaiveDate>, Error> {
        let key = identity.key();
        {
            let overlay = self.overlay.read().await;
            if let Some(record) = overlay.snapshot.missing.get(&key) {
                return Ok(Some(record.since));
            }
            if overlay.cleared.contains(&key) {
                return Ok(None);
            }
        }
        self.inner.missing_since(identity).await
    }

    async fn mark_missing(&self, identity: &Identity, today: NaiveDate) -> Result<NaiveDate, Error> {
        if let Some(since) = self.missing_since(identity).await? {
            return Ok(since);
        }
        let mut overlay = self.overlay.write().await;
        Ok(overlay.snapshot.mark_missing(identity, today))
    }

    async fn clear_missing(&self, identity: &Identity) -> Result<(), Error> {
        let key = identity.key();
        let mut overlay = self.overlay.write().await;
        overlay.snapshot.missing.remove(&key);
        overlay.cleared.insert(key);
        Ok(())
    }

    async fn list_reservations(&self) -> Result<Vec<(String, Identity)>, Error> {
        let mut reservations = self.inner.list_reservations().await?;
        let overlay = self.overlay.read().await;
        reservations.extend(
            overlay
                .snapshot
                .reservations
                .iter()
                .map(|(name, identity)| (name.clone(), identity.clone())),
        );
        reservations.sort();
        Ok(reservations)
    }

    async fn flush(&self) -> Result<(), Error> {
        tracing::debug!("Dry run: state changes discarded");
        Ok(())
    }
}
