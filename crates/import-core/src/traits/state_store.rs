// # State Store Trait
//
// Defines the interface for state that outlives a single import run.
//
// ## Purpose
//
// The state store tracks:
// - Username reservations: every username ever handed out, with the identity
//   that claimed it. Reservations are append-only, so the name of a deleted
//   user is never given to somebody else.
// - Missing marks: the date a known identity was first absent from the
//   input. Grace periods are measured from this date.
//
// ## Implementations
//
// - `MemoryStateStore`: not persistent, for tests
// - `FileStateStore`: JSON file with atomic writes
// - `DryRunStateStore`: overlay that never writes through
//
// ## Usage
//
// ```rust,ignore
// use school_import_core::{Identity, StateStore};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* StateStore implementation */;
//     let identity = Identity::new("TEST", "s-001");
//
//     if store.reserve_username("jdoe", &identity).await? {
//         // "jdoe" now belongs to TEST/s-001 for good
//     }
//
//     store.flush().await?;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Identity;

/// First-seen-missing bookkeeping for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRecord {
    pub identity: Identity,
    pub since: NaiveDate,
}

/// Serialisable content of a state store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Username to claiming identity
    #[serde(default)]
    pub reservations: BTreeMap<String, Identity>,
    /// Identity key to missing record
    #[serde(default)]
    pub missing: BTreeMap<String, MissingRecord>,
}

impl StateSnapshot {
    /// Reserve `username` for `identity`
    ///
    /// Returns `true` if the name was free or already belonged to `identity`.
    pub fn reserve(&mut self, username: &str, identity: &Identity) -> bool {
        match self.reservations.get(username) {
            Some(owner) => owner == identity,
            None => {
                self.reservations
                    .insert(username.to_string(), identity.clone());
                true
            }
        }
    }

    /// Record `today` as first-seen-missing unless a date is already recorded
    pub fn mark_missing(&mut self, identity: &Identity, today: NaiveDate) -> NaiveDate {
        self.missing
            .entry(identity.key())
            .or_insert_with(|| MissingRecord {
                identity: identity.clone(),
                since: today,
            })
            .since
    }
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks. The
/// engine itself calls them from a single task, so reservations are
/// serialised to one writer per run.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Cache state in memory (with explicit flush)
///
/// ## Forbidden Capabilities
/// - ❌ Release or reassign a reservation
/// - ❌ Decide grace period outcomes (owned by `ImportEngine`)
///
/// ## Implementation Guidelines
///
/// - **Explicit flush**: `flush()` must persist all pending changes
/// - **Append-only reservations**: a failed record does not roll back its reservation
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reserve a username for an identity
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The name was free (now reserved) or already owned by `identity`
    /// - `Ok(false)`: The name belongs to another identity
    /// - `Err(Error)`: Storage error
    async fn reserve_username(
        &self,
        username: &str,
        identity: &Identity,
    ) -> Result<bool, crate::Error>;

    /// Get the identity a username is reserved for
    async fn username_owner(&self, username: &str) -> Result<Option<Identity>, crate::Error>;

    /// Get the first-seen-missing date of an identity
    async fn missing_since(&self, identity: &Identity) -> Result<Option<NaiveDate>, crate::Error>;

    /// Mark an identity as missing
    ///
    /// Keeps an already recorded date.
    ///
    /// # Returns
    ///
    /// The effective first-seen-missing date
    async fn mark_missing(
        &self,
        identity: &Identity,
        today: NaiveDate,
    ) -> Result<NaiveDate, crate::Error>;

    /// Forget the missing mark of an identity that reappeared or was removed
    async fn clear_missing(&self, identity: &Identity) -> Result<(), crate::Error>;

    /// List all reservations
    async fn list_reservations(&self) -> Result<Vec<(String, Identity)>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
