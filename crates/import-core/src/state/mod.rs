// # State Store Implementations
//
// This module provides implementations of the StateStore trait for
// different persistence strategies.

pub mod dry_run;
pub mod file;
pub mod memory;
pub(crate) mod snapshot;

pub use dry_run::DryRunStateStore;
pub use file::FileStateStore;
pub use memory::MemoryStateStore;
