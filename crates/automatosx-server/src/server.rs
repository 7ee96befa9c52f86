//! The JSON-RPC stdio server proper: lazy, race-safe
//! service construction on first `initialize`, the fixed tool
//! registry, and an async stdin read loop with signal-triggered
//! graceful shutdown — a SIGINT/SIGTERM listener races the next line
//! read so the process can drain in-flight work and exit cleanly.

use crate::jsonrpc::{to_protocol_error, tool_error, tool_success, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::tools::{self, *};
use automatosx_engine::{
    AbilityLoader, ContextAssembler, FilesystemAbilityLoader, FilesystemProfileLoader, ProfileLoader, ProgressChannel,
    SessionManager,
};
use automatosx_memory::MemoryStore;
use automatosx_providers::{Backend, MockBackend, ProcessBackend, RetryPolicy, Router};
use automatosx_runtime::{AutoConfirmHook, CheckpointStore, Config, ControllerConfig, StageExecutionController};
use automatosx_types::{Error, ProviderDescriptor, Result};
use automatosx_workspace::Workspace;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Everything a `tools/call` needs once the server has initialized.
/// Held behind `Arc` so concurrently dispatched tool calls share one
/// set of handles rather than each cloning the underlying services.
pub struct Services {
    pub sessions: Arc<SessionManager>,
    pub memory: Option<Arc<MemoryStore>>,
    pub workspace: Arc<Workspace>,
    pub assembler: Arc<ContextAssembler>,
    pub router: Arc<Router>,
    pub controller: Arc<StageExecutionController>,
    pub progress: Arc<ProgressChannel>,
    profiles: Arc<dyn ProfileLoader>,
}

impl Services {
    pub(crate) async fn profile_names(&self) -> Result<Vec<String>> {
        self.profiles.list_names().await
    }
}

/// The inputs needed to build [`Services`] the first time `initialize`
/// runs. Profile/ability discovery and provider descriptors are
/// supplied by the process entry point.
pub struct ServerDeps {
    pub config: Config,
    pub providers: Vec<ProviderDescriptor>,
    pub fallback_enabled: bool,
}

pub struct Server {
    deps: ServerDeps,
    services: OnceCell<Arc<Services>>,
}

impl Server {
    pub fn new(deps: ServerDeps) -> Self {
        Self { deps, services: OnceCell::new() }
    }

    /// Builds the service graph on the first call; concurrent callers
    /// await the same in-flight construction and observe the same
    /// result.
    async fn initialize(&self) -> Result<Arc<Services>> {
        self.services
            .get_or_try_init(|| async { build_services(&self.deps).await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    fn initialized(&self) -> Option<Arc<Services>> {
        self.services.get().cloned()
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or_else(|| Value::Number(0.into()));
        match request.method.as_str() {
            "initialize" => self.handle_initialize(id).await,
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(id, JsonRpcError::method_not_found(other)),
        }
    }

    async fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        match self.initialize().await {
            Ok(_) => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "automatosx", "version": env!("CARGO_PKG_VERSION") },
                    "instructions": "AutomatosX orchestration server. Use run_agent to execute an agent against a task, list_agents to discover available agents, and the session_*/memory_* tools to manage shared state.",
                }),
            ),
            Err(err) => {
                error!(error = %err, "service initialization failed");
                JsonRpcResponse::failure(id, to_protocol_error(&err))
            }
        }
    }

    fn handle_list_tools(&self, id: Value) -> JsonRpcResponse {
        if self.initialized().is_none() {
            return JsonRpcResponse::failure(id, JsonRpcError::uninitialized());
        }
        JsonRpcResponse::success(id, json!({ "tools": TOOL_DESCRIPTORS.clone() }))
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(services) = self.initialized() else {
            return JsonRpcResponse::failure(id, JsonRpcError::uninitialized());
        };

        let params = match params {
            Some(p) => p,
            None => return JsonRpcResponse::failure(id, JsonRpcError::invalid_params("Missing params")),
        };

        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::failure(id, JsonRpcError::invalid_params("Missing tool name"));
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match tools::dispatch(&services, tool_name, arguments).await {
            Ok(DispatchOutcome::Value(value)) => JsonRpcResponse::success(id, tool_success(&value)),
            Ok(DispatchOutcome::ToolError(err)) => JsonRpcResponse::success(id, tool_error(&err)),
            Err(protocol_err) => JsonRpcResponse::failure(id, to_protocol_error(&protocol_err)),
        }
    }
}

async fn build_services(deps: &ServerDeps) -> Result<Services> {
    let config = &deps.config;

    let workspace = Arc::new(Workspace::new(&config.project_root));

    let memory_db_path = config.memory_db_path();
    if let Some(parent) = memory_db_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let memory = match MemoryStore::open(&memory_db_path, config.memory_max_entries, config.memory_cleanup_batch) {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            warn!(error = %err, "memory store failed to initialize; continuing without memory");
            None
        }
    };

    let sessions = Arc::new(SessionManager::new(Some(config.sessions_path())).await);

    let agents_root = config.agents_root();
    let profiles: Arc<dyn ProfileLoader> = Arc::new(FilesystemProfileLoader::new(agents_root.clone()));
    let abilities: Arc<dyn AbilityLoader> = Arc::new(FilesystemAbilityLoader::new(agents_root));

    let assembler = Arc::new(
        ContextAssembler::new(profiles.clone(), abilities, memory.clone(), workspace.clone(), None)
            .with_memory_limits(config.memory_top_k, config.memory_char_budget),
    );

    let backends: Vec<Arc<dyn Backend>> = deps
        .providers
        .iter()
        .map(|descriptor| -> Arc<dyn Backend> {
            if config.mock_providers {
                Arc::new(MockBackend::new(descriptor.name.clone()))
            } else {
                Arc::new(ProcessBackend::new(descriptor.clone()))
            }
        })
        .collect();

    let router = Arc::new(
        Router::new(deps.providers.clone(), backends, deps.fallback_enabled, RetryPolicy::default()).await?,
    );

    let progress = Arc::new(ProgressChannel::with_throttle(config.throttle_ms));
    let checkpoints = CheckpointStore::new(config.checkpoints_dir());
    let controller_config = ControllerConfig {
        default_stage_timeout: config.stage_timeout,
        default_max_retries: config.max_retries,
        default_retry_delay: config.retry_delay,
        progress_update_interval: config.progress_update_interval,
        prompt_timeout: config.prompt_timeout,
    };
    let controller = Arc::new(StageExecutionController::new(
        assembler.clone(),
        router.clone(),
        checkpoints,
        progress.clone(),
        Arc::new(AutoConfirmHook),
        controller_config,
    ));

    info!("service graph initialized");
    Ok(Services { sessions, memory, workspace, assembler, router, controller, progress, profiles })
}

/// Static tool descriptors for `tools/list`. Hand-written rather than
/// `schemars`-generated: the tool surface here is a small, fixed list
/// rather than one that grows with new query view-models, so one
/// literal table is clearer than a derive macro per argument struct.
static TOOL_DESCRIPTORS: std::sync::LazyLock<Value> = std::sync::LazyLock::new(|| {
    json!([
        {
            "name": "run_agent",
            "description": "Run a named agent against a task, executing its stages if it has any",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "agent": {"type": "string"},
                    "task": {"type": "string"},
                    "provider": {"type": "string"},
                    "noMemory": {"type": "boolean"},
                    "sessionId": {"type": "string"},
                },
                "required": ["agent", "task"],
            },
        },
        {
            "name": "list_agents",
            "description": "List available agent profiles",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "search_memory",
            "description": "Full-text search over stored memory entries",
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}, "limit": {"type": "integer"}},
                "required": ["query"],
            },
        },
        {
            "name": "get_status",
            "description": "Provider health, router metrics, and active session count",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "session_create",
            "description": "Create a new session",
            "inputSchema": {
                "type": "object",
                "properties": {"task": {"type": "string"}, "initiator": {"type": "string"}},
                "required": ["task", "initiator"],
            },
        },
        {
            "name": "session_list",
            "description": "List active sessions",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "session_status",
            "description": "Get a session by id",
            "inputSchema": {
                "type": "object",
                "properties": {"sessionId": {"type": "string"}},
                "required": ["sessionId"],
            },
        },
        {
            "name": "session_complete",
            "description": "Mark a session completed",
            "inputSchema": {
                "type": "object",
                "properties": {"sessionId": {"type": "string"}},
                "required": ["sessionId"],
            },
        },
        {
            "name": "session_fail",
            "description": "Mark a session failed",
            "inputSchema": {
                "type": "object",
                "properties": {"sessionId": {"type": "string"}, "error": {"type": "string"}},
                "required": ["sessionId", "error"],
            },
        },
        {
            "name": "memory_add",
            "description": "Add a memory entry",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "type": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "source": {"type": "string"},
                },
                "required": ["content"],
            },
        },
        {
            "name": "memory_list",
            "description": "List memory entries with optional filters",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "memory_delete",
            "description": "Delete a memory entry by id",
            "inputSchema": {
                "type": "object",
                "properties": {"id": {"type": "integer"}},
                "required": ["id"],
            },
        },
        {
            "name": "memory_export",
            "description": "Export all memory entries as JSON",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "memory_import",
            "description": "Import memory entries from a prior export",
            "inputSchema": {"type": "object", "properties": {"export": {"type": "object"}}, "required": ["export"]},
        },
        {
            "name": "memory_stats",
            "description": "Memory store size and usage statistics",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "memory_clear",
            "description": "Delete all memory entries",
            "inputSchema": {"type": "object", "properties": {}},
        },
    ])
});

/// Reads newline-delimited JSON-RPC requests from `stdin` and writes
/// one response line per request to `stdout`, dispatching each
/// request's handling onto its own task so tool calls run
/// concurrently. SIGINT/SIGTERM stop new reads and then await
/// in-flight tasks before returning.
pub async fn run_server(server: Arc<Server>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
    let mut lines = BufReader::new(stdin).lines();
    let mut in_flight = JoinSet::new();

    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).map_err(Error::from)?;

    loop {
        #[cfg(unix)]
        let shutdown_requested = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => true,
            _ = sigterm.recv() => true,
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        dispatch_line(&server, &stdout, line, &mut in_flight);
                        false
                    }
                    Ok(None) => true,
                    Err(err) => return Err(err.into()),
                }
            }
        };
        #[cfg(not(unix))]
        let shutdown_requested = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => true,
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        dispatch_line(&server, &stdout, line, &mut in_flight);
                        false
                    }
                    Ok(None) => true,
                    Err(err) => return Err(err.into()),
                }
            }
        };

        if shutdown_requested {
            break;
        }
    }

    info!(pending = in_flight.len(), "shutting down: draining in-flight tool calls");
    while in_flight.join_next().await.is_some() {}
    Ok(())
}

fn dispatch_line(
    server: &Arc<Server>,
    stdout: &Arc<Mutex<tokio::io::Stdout>>,
    line: String,
    in_flight: &mut JoinSet<()>,
) {
    let trimmed = line.trim().to_string();
    if trimmed.is_empty() {
        return;
    }

    let server = server.clone();
    let stdout = stdout.clone();
    in_flight.spawn(async move {
        let response = match serde_json::from_str::<JsonRpcRequest>(&trimmed) {
            Ok(request) => server.handle_request(request).await,
            Err(err) => JsonRpcResponse::failure(Value::Null, JsonRpcError::parse_error(err)),
        };
        if let Err(err) = write_response(&stdout, &response).await {
            error!(error = %err, "failed writing JSON-RPC response");
        }
    });
}

async fn write_response(stdout: &Arc<Mutex<tokio::io::Stdout>>, response: &JsonRpcResponse) -> io::Result<()> {
    let mut line = serde_json::to_string(response).unwrap_or_else(|_| {
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"failed to serialize response"}}"#.to_string()
    });
    line.push('\n');
    let mut stdout = stdout.lock().await;
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await
}
