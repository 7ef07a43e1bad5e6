// # Directory Backend Trait
//
// Defines the interface to the identity store the import synchronises
// against. The wire protocol lives behind this trait.
//
// ## Implementations
//
// - `MemoryDirectory`: in-process map, for tests and embedding
// - `FileDirectory`: JSON snapshot on disk
//
// ## Usage
//
// ```rust,ignore
// use school_import_core::DirectoryBackend;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let directory = /* DirectoryBackend implementation */;
//
//     if let Some(user) = directory.lookup("TEST", "s-001").await? {
//         directory.move_user(&user.username, "gym2").await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::models::{DirectoryUserState, ExistingUser};

/// Trait for directory backend implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// Directory backends are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O against their own store only
/// - ✅ Translate between the store's representation and the models
/// - ✅ Return success or failure for each call
///
/// ## Forbidden Capabilities
/// - ❌ Retry failed writes (a failed write is reported and the record skipped)
/// - ❌ Generate usernames or passwords (owned by the identity generator)
/// - ❌ Decide which action a record needs (owned by `ImportEngine`)
/// - ❌ Invoke hooks (owned by `HookPipeline`)
///
/// Every call is wrapped in a timeout by the engine; a timeout fails the
/// current record only.
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    /// Find a user by its cross-run identity
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ExistingUser))`: The user exists
    /// - `Ok(None)`: No user with this identity
    /// - `Err(Error)`: The lookup failed
    async fn lookup(
        &self,
        source_uid: &str,
        record_uid: &str,
    ) -> Result<Option<ExistingUser>, crate::Error>;

    /// Find a user by username, regardless of its identity
    async fn lookup_by_username(
        &self,
        username: &str,
    ) -> Result<Option<ExistingUser>, crate::Error>;

    /// Create a user
    ///
    /// Fails if the username is already taken.
    async fn create(&self, user: &DirectoryUserState) -> Result<(), crate::Error>;

    /// Replace the attributes, roles, schools and disabled flag of an existing user
    ///
    /// `user` is the complete desired state; attributes it does not carry
    /// are dropped. The password of an existing user is never changed.
    async fn modify(&self, user: &DirectoryUserState) -> Result<(), crate::Error>;

    /// Move a user to another primary school
    async fn move_user(&self, username: &str, new_school: &str) -> Result<(), crate::Error>;

    /// Delete a user
    async fn delete(&self, username: &str) -> Result<(), crate::Error>;

    /// List all users of a source, optionally restricted to one school
    ///
    /// # Parameters
    ///
    /// - `source_uid`: Only users imported from this source
    /// - `partition`: If set, only users whose primary school matches
    async fn enumerate(
        &self,
        source_uid: &str,
        partition: Option<&str>,
    ) -> Result<Vec<ExistingUser>, crate::Error>;

    /// Get the backend name (for logging/debugging)
    fn backend_name(&self) -> &'static str;
}
