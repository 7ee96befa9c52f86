//! Structured error taxonomy.
//!
//! A single base error carries a numeric `code`, the `family` it falls
//! into, a user-visible `message`, optional `suggestions`, optional
//! `context`, and an `is_operational` flag. Every crate in the
//! workspace returns `Result<T>` aliased to this error type so that
//! conversions compose cleanly across crate boundaries, the way the
//! teacher's per-crate `Error` enums convert from their dependencies'
//! errors via `From`.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad error-family grouping used to partition numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorFamily {
    Configuration,
    Path,
    Memory,
    Provider,
    Agent,
    Validation,
    Filesystem,
    Cli,
    Unknown,
}

impl ErrorFamily {
    fn base_code(self) -> u32 {
        match self {
            ErrorFamily::Configuration => 1000,
            ErrorFamily::Path => 1100,
            ErrorFamily::Memory => 1200,
            ErrorFamily::Provider => 1300,
            ErrorFamily::Agent => 1400,
            ErrorFamily::Validation => 1500,
            ErrorFamily::Filesystem => 1600,
            ErrorFamily::Cli => 1700,
            ErrorFamily::Unknown => 9999,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub family: ErrorFamily,
    pub message: String,
    pub suggestions: Vec<String>,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub is_operational: bool,
    kind: ErrorKind,
}

/// Identifies the specific condition without requiring callers to
/// match on `(family, code)` pairs by hand for conditions like cycle
/// detection or a depth bound being hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Provider family
    ProviderNotFound,
    ProviderUnavailable,
    ProviderTimeout,
    ProviderRateLimit,
    ProviderAuthError,
    ProviderExecError,
    NoAvailableProviders,
    // Agent family
    AgentNotFound,
    AbilityNotFound,
    DelegationNotConfigured,
    MaxDepthExceeded,
    CycleDetected,
    SessionNotFound,
    SessionNotActive,
    DelegationExecutionFailed,
    StageDependencyCycle,
    StageTimeout,
    StageFailed,
    // Memory family
    MemoryNotInitialized,
    MemoryDatabaseError,
    MemoryQueryError,
    MemoryImportError,
    MemoryExportError,
    // Path family
    PathTraversal,
    PathInvalid,
    FileTooLarge,
    // Validation family
    InvalidParams,
    // Configuration family
    ConfigInvalid,
    // Filesystem family
    Io,
    // CLI / RPC surface family
    ToolNotFound,
    MethodNotFound,
    ParseError,
    InternalError,
    // Fallback
    Other,
}

impl Error {
    pub fn new(family: ErrorFamily, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode(family.base_code()),
            family,
            message: message.into(),
            suggestions: Vec::new(),
            context: serde_json::Map::new(),
            is_operational: true,
            kind,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn non_operational(mut self) -> Self {
        self.is_operational = false;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Accretes context without rewriting the original message/stack,
    /// so an error can pick up detail as it bubbles through each layer.
    pub fn add_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    // --- Provider family constructors ---

    pub fn provider_not_found(name: &str) -> Self {
        Self::new(
            ErrorFamily::Provider,
            ErrorKind::ProviderNotFound,
            format!("Provider '{name}' is not configured"),
        )
        .with_context("provider", name)
    }

    pub fn provider_unavailable(name: &str) -> Self {
        Self::new(
            ErrorFamily::Provider,
            ErrorKind::ProviderUnavailable,
            format!("Provider '{name}' is currently unavailable"),
        )
        .with_context("provider", name)
    }

    pub fn provider_timeout(name: &str) -> Self {
        Self::new(
            ErrorFamily::Provider,
            ErrorKind::ProviderTimeout,
            format!("Provider '{name}' timed out"),
        )
        .with_context("provider", name)
    }

    pub fn provider_rate_limit(name: &str) -> Self {
        Self::new(
            ErrorFamily::Provider,
            ErrorKind::ProviderRateLimit,
            format!("Provider '{name}' rate limited the request"),
        )
        .with_context("provider", name)
    }

    pub fn provider_auth_error(name: &str, detail: &str) -> Self {
        Self::new(
            ErrorFamily::Provider,
            ErrorKind::ProviderAuthError,
            format!("Provider '{name}' rejected credentials: {detail}"),
        )
        .with_context("provider", name)
    }

    pub fn provider_exec_error(name: &str, detail: &str) -> Self {
        Self::new(
            ErrorFamily::Provider,
            ErrorKind::ProviderExecError,
            format!("Provider '{name}' execution failed: {detail}"),
        )
        .with_context("provider", name)
    }

    pub fn no_available_providers() -> Self {
        Self::new(
            ErrorFamily::Provider,
            ErrorKind::NoAvailableProviders,
            "No configured provider is currently available",
        )
    }

    // --- Agent / delegation / stage family ---

    pub fn agent_not_found(name: &str, suggestions: Vec<String>) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::AgentNotFound,
            format!("Agent '{name}' was not found"),
        )
        .with_context("agent", name)
        .with_suggestions(suggestions)
    }

    pub fn ability_not_found(name: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::AbilityNotFound,
            format!("Ability '{name}' was not found"),
        )
        .with_context("ability", name)
    }

    pub fn delegation_not_configured() -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::DelegationNotConfigured,
            "Delegation engine is missing a required collaborator (session manager, workspace, context assembler, or profile loader)",
        )
    }

    pub fn max_depth_exceeded(max_depth: usize) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::MaxDepthExceeded,
            format!("Delegation chain exceeded maximum depth of {max_depth}"),
        )
        .with_context("maxDepth", max_depth as u64)
    }

    pub fn cycle_detected(agent: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::CycleDetected,
            format!("'{agent}' already in delegation chain"),
        )
        .with_context("agent", agent)
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::SessionNotFound,
            format!("Session '{id}' was not found"),
        )
        .with_context("sessionId", id)
    }

    pub fn session_not_active(id: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::SessionNotActive,
            format!("Session '{id}' is not active"),
        )
        .with_context("sessionId", id)
    }

    pub fn delegation_execution_failed(detail: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::DelegationExecutionFailed,
            format!("Delegation execution failed: {detail}"),
        )
    }

    pub fn stage_dependency_cycle(stage: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::StageDependencyCycle,
            format!("Stage dependency graph has a cycle involving '{stage}'"),
        )
        .with_context("stage", stage)
    }

    pub fn stage_timeout(stage: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::StageTimeout,
            format!("Stage '{stage}' timed out"),
        )
        .with_context("stage", stage)
    }

    pub fn stage_failed(stage: &str, detail: &str) -> Self {
        Self::new(
            ErrorFamily::Agent,
            ErrorKind::StageFailed,
            format!("Stage '{stage}' failed: {detail}"),
        )
        .with_context("stage", stage)
    }

    // --- Memory family ---

    pub fn memory_not_initialized() -> Self {
        Self::new(
            ErrorFamily::Memory,
            ErrorKind::MemoryNotInitialized,
            "Memory store is not initialized",
        )
    }

    pub fn memory_database_error(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorFamily::Memory,
            ErrorKind::MemoryDatabaseError,
            format!("Memory database error: {detail}"),
        )
    }

    pub fn memory_query_error(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorFamily::Memory,
            ErrorKind::MemoryQueryError,
            format!("Memory query error: {detail}"),
        )
    }

    pub fn memory_import_error(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorFamily::Memory,
            ErrorKind::MemoryImportError,
            format!("Memory import error: {detail}"),
        )
    }

    pub fn memory_export_error(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorFamily::Memory,
            ErrorKind::MemoryExportError,
            format!("Memory export error: {detail}"),
        )
    }

    // --- Path / filesystem family ---

    pub fn path_traversal(path: &str) -> Self {
        Self::new(
            ErrorFamily::Path,
            ErrorKind::PathTraversal,
            format!("Path '{path}' escapes its namespace root"),
        )
        .with_context("path", path)
    }

    pub fn path_invalid(path: &str, reason: &str) -> Self {
        Self::new(
            ErrorFamily::Path,
            ErrorKind::PathInvalid,
            format!("Path '{path}' is invalid: {reason}"),
        )
        .with_context("path", path)
    }

    pub fn file_too_large(path: &str, limit_bytes: u64) -> Self {
        Self::new(
            ErrorFamily::Path,
            ErrorKind::FileTooLarge,
            format!("File '{path}' exceeds the {limit_bytes}-byte limit"),
        )
        .with_context("path", path)
    }

    // --- Validation family ---

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(ErrorFamily::Validation, ErrorKind::InvalidParams, detail)
    }

    // --- Configuration family ---

    pub fn config_invalid(detail: impl Into<String>) -> Self {
        Self::new(ErrorFamily::Configuration, ErrorKind::ConfigInvalid, detail)
    }

    // --- CLI / RPC surface family ---

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(
            ErrorFamily::Cli,
            ErrorKind::ToolNotFound,
            format!("Unknown tool '{name}'"),
        )
        .with_context("tool", name)
    }

    pub fn method_not_found(name: &str) -> Self {
        Self::new(
            ErrorFamily::Cli,
            ErrorKind::MethodNotFound,
            format!("Unknown method '{name}'"),
        )
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(ErrorFamily::Cli, ErrorKind::ParseError, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorFamily::Unknown, ErrorKind::InternalError, detail).non_operational()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorFamily::Filesystem, ErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorFamily::Validation, ErrorKind::ParseError, err.to_string())
    }
}
