// # school-import-core
//
// Core library of the school user import engine.
//
// ## Architecture Overview
//
// This library synchronises users from a delimited input file into a
// directory:
// - **Configuration**: Layered run configuration plus named startup checks
// - **CsvReader**: Decodes the input into a lazy sequence of raw records
// - **UsernameGenerator / PasswordGenerator**: Unique names and credentials
// - **HookPipeline**: Priority-ordered extension points around every write
// - **ImportEngine**: Decides and applies one action per record
// - **ImportReport**: Per-record outcomes, output files and statistics
//
// Collaborators are traits so backends can be swapped:
// - **DirectoryBackend**: The identity store users are written to
// - **StateStore**: Username reservations and first-seen-missing dates
// - **ImportHook**: Drop-in extensions, registered through the HookRegistry
//
// ## Design Principles
//
// 1. **Record isolation**: A failing record never takes the run down
// 2. **Never reuse a name**: Reservations outlive users and runs
// 3. **Plugin-Based**: Hooks are registered at startup, no discovery at runtime
// 4. **Library-First**: The binary only wires collaborators together
// 5. **Idempotency**: Re-running unchanged input changes nothing

pub mod checks;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod models;
pub mod reader;
pub mod registry;
pub mod state;
pub mod traits;
pub mod writer;

// Re-export core types for convenience
pub use checks::CheckRegistry;
pub use config::{Configuration, ImportConfig};
pub use directory::{FileDirectory, MemoryDirectory};
pub use engine::{ImportEngine, ImportEvent};
pub use error::{Error, RecordError, Result};
pub use hooks::HookPipeline;
pub use models::{
    ActionKind, CandidateUser, DirectoryUserState, ExistingUser, Identity, ImportAction,
    RawRecord, Role,
};
pub use reader::CsvReader;
pub use registry::HookRegistry;
pub use state::{DryRunStateStore, FileStateStore, MemoryStateStore};
pub use traits::{DirectoryBackend, HookFactory, HookPriorities, HookStage, ImportHook, StateStore};
pub use writer::{ImportReport, RecordOutcome, RunOutcome};
