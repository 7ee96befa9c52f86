//! Shared data model and structured error taxonomy for the AutomatosX
//! orchestration core. No crate in the workspace defines its own
//! error enum; every `Result` here and downstream is aliased to
//! [`error::Error`].

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod profile;
pub mod progress;
pub mod provider;
pub mod session;
pub mod shared;

pub use checkpoint::{Checkpoint, ExecutionMode, StageRecord, StageStatus};
pub use error::{Error, ErrorCode, ErrorFamily, ErrorKind, Result};
pub use memory::{
    GetAllFilter, MemoryEntry, MemoryEntryType, MemoryExport, MemoryMetadata, MemoryStats,
    OrderBy, SearchFilter, SortOrder,
};
pub use profile::{AgentProfile, OrchestrationConfig, Stage};
pub use progress::ProgressEvent;
pub use provider::{
    DetectionHints, ExecutionRequest, ExecutionResponse, ProviderCommand, ProviderDescriptor,
    ProviderHealth, RouterMetrics, TokenUsage,
};
pub use session::{
    DelegationChain, DelegationContext, DelegationOutputs, DelegationRequest, DelegationResult,
    DelegationStatus, Session, SessionStatus,
};
pub use shared::SharedData;
