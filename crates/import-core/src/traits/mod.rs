//! Core traits for the import engine
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DirectoryBackend`]: The identity store users are synchronised into
//! - [`ImportHook`]: Extension points around every mutation
//! - [`StateStore`]: Username reservations and grace period bookkeeping

pub mod directory;
pub mod hook;
pub mod state_store;

pub use directory::DirectoryBackend;
pub use hook::{EntryVerdict, HookFactory, HookPriorities, HookStage, ImportHook};
pub use state_store::{MissingRecord, StateSnapshot, StateStore};
