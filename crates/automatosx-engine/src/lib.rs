//! Session Manager, Delegation Engine, Context Assembler, and Progress
//! Channel — the orchestration layer
//! sitting between the Provider Router / Memory Store / Workspace
//! below it and the Stage Execution Controller above it.

mod context;
mod delegation;
mod profile_loader;
mod progress;
mod session_manager;

pub use context::{AssembleOptions, ContextAssembler, ExecutionContext, DEFAULT_MEMORY_CHAR_BUDGET, DEFAULT_MEMORY_TOP_K};
pub use delegation::{DelegationEngine, DelegationEngineConfig, ExecutionOutcome, Executor};
pub use profile_loader::{AbilityLoader, FilesystemAbilityLoader, FilesystemProfileLoader, ProfileLoader};
pub use progress::{Listener, ProgressChannel};
pub use session_manager::{SessionManager, MAX_SESSIONS};
