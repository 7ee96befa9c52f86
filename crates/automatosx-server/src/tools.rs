//! Tool handlers. Each handler takes the
//! already-initialized [`crate::server::Services`] and its
//! deserialized argument struct, and returns a JSON value or the
//! workspace's structured [`Error`] type, so a failure still carries a
//! `kind()`/context a caller can branch on.

use crate::server::Services;
use crate::validation::{reject_suspicious_characters, validate_agent_name};
use automatosx_engine::AssembleOptions;
use automatosx_memory::MemoryStore;
use automatosx_runtime::RunRequest;
use automatosx_types::checkpoint::ExecutionMode;
use automatosx_types::{
    Error, GetAllFilter, MemoryEntryType, MemoryExport, MemoryMetadata, Result, SearchFilter, SharedData,
};
use serde::Deserialize;
use serde_json::{json, Value};

fn require_nonempty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_params(format!("{field} must not be empty")));
    }
    reject_suspicious_characters(field, value)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentArgs {
    pub agent: String,
    pub task: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub no_memory: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn handle_run_agent(services: &Services, args: RunAgentArgs) -> Result<Value> {
    validate_agent_name(&args.agent)?;
    require_nonempty("task", &args.task)?;

    let profile = services.assembler.load_profile(&args.agent).await?;
    if !profile.has_stages() {
        let options = AssembleOptions {
            provider: args.provider.clone(),
            model: None,
            skip_memory: args.no_memory,
            session_id: args.session_id.clone(),
            delegation_chain: Vec::new(),
            shared_data: SharedData::new(),
        };
        let ctx = services.assembler.assemble(&args.agent, &args.task, options).await?;
        let request = automatosx_types::ExecutionRequest {
            prompt: ctx.prompt,
            system_prompt: None,
            model: ctx.model,
            provider: ctx.provider,
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        };
        let response = services.router.execute(&request, &automatosx_providers::Signal::never()).await?;
        return Ok(json!({ "agent": args.agent, "output": response.content, "model": response.model }));
    }

    let request = RunRequest {
        run_id: None,
        agent_name: args.agent.clone(),
        task: args.task,
        mode: vec![ExecutionMode::AutoConfirm],
        provider: args.provider,
        model: None,
        session_id: args.session_id,
        delegation_chain: Vec::new(),
        shared_data: SharedData::new(),
        continue_on_failure: false,
    };
    let result = services.controller.run(request, &automatosx_providers::Signal::never()).await?;
    Ok(json!({
        "agent": args.agent,
        "runId": result.run_id,
        "success": result.success,
        "output": result.output,
        "stages": result.stages,
    }))
}

pub async fn handle_list_agents(services: &Services) -> Result<Value> {
    let names = services.profile_names().await?;
    let mut agents = Vec::with_capacity(names.len());
    for name in names {
        match services.assembler.load_profile(&name).await {
            Ok(profile) => agents.push(json!({
                "name": profile.name,
                "displayName": profile.display_name,
                "team": profile.team,
                "role": profile.role,
                "description": profile.description,
                "hasStages": profile.has_stages(),
            })),
            Err(err) => {
                tracing::warn!(agent = %name, error = %err, "skipped unreadable profile while listing agents");
            }
        }
    }
    Ok(json!({ "agents": agents }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMemoryArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn handle_search_memory(services: &Services, args: SearchMemoryArgs) -> Result<Value> {
    require_nonempty("query", &args.query)?;
    let memory = services.memory()?;
    let filter = SearchFilter { text: Some(args.query), limit: args.limit, ..Default::default() };
    let entries = memory.search(&filter)?;
    Ok(json!({ "entries": entries }))
}

pub async fn handle_get_status(services: &Services) -> Result<Value> {
    let health = services.router.health_snapshot().await;
    let metrics = services.router.metrics();
    let active_sessions = services.sessions.get_active_sessions().await;
    Ok(json!({
        "providers": health,
        "metrics": metrics,
        "activeSessionCount": active_sessions.len(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateArgs {
    pub task: String,
    pub initiator: String,
}

pub async fn handle_session_create(services: &Services, args: SessionCreateArgs) -> Result<Value> {
    require_nonempty("task", &args.task)?;
    require_nonempty("initiator", &args.initiator)?;
    let session = services.sessions.create_session(&args.task, &args.initiator).await;
    Ok(serde_json::to_value(session)?)
}

pub async fn handle_session_list(services: &Services) -> Result<Value> {
    let sessions = services.sessions.get_active_sessions().await;
    Ok(json!({ "sessions": sessions }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdArgs {
    pub session_id: String,
}

pub async fn handle_session_status(services: &Services, args: SessionIdArgs) -> Result<Value> {
    match services.sessions.get_session(&args.session_id).await {
        Some(session) => Ok(serde_json::to_value(session)?),
        None => Err(Error::session_not_found(&args.session_id)),
    }
}

pub async fn handle_session_complete(services: &Services, args: SessionIdArgs) -> Result<Value> {
    services.sessions.complete_session(&args.session_id).await?;
    Ok(json!({ "sessionId": args.session_id, "status": "completed" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFailArgs {
    pub session_id: String,
    pub error: String,
}

pub async fn handle_session_fail(services: &Services, args: SessionFailArgs) -> Result<Value> {
    services.sessions.fail_session(&args.session_id, &args.error).await?;
    Ok(json!({ "sessionId": args.session_id, "status": "failed" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryAddArgs {
    pub content: String,
    #[serde(default)]
    pub r#type: Option<MemoryEntryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn handle_memory_add(services: &Services, args: MemoryAddArgs) -> Result<Value> {
    require_nonempty("content", &args.content)?;
    let memory = services.memory()?;
    let metadata = MemoryMetadata { r#type: args.r#type, source: args.source, tags: args.tags, ..Default::default() };
    let id = memory.add(&args.content, metadata)?;
    Ok(json!({ "id": id }))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryListArgs {
    #[serde(default)]
    pub r#type: Option<MemoryEntryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

pub async fn handle_memory_list(services: &Services, args: MemoryListArgs) -> Result<Value> {
    let memory = services.memory()?;
    let filter = GetAllFilter {
        r#type: args.r#type,
        tags: args.tags,
        limit: args.limit,
        offset: args.offset,
        ..Default::default()
    };
    let entries = memory.get_all(&filter)?;
    Ok(json!({ "entries": entries }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryIdArgs {
    pub id: i64,
}

pub async fn handle_memory_delete(services: &Services, args: MemoryIdArgs) -> Result<Value> {
    let memory = services.memory()?;
    let deleted = memory.delete(args.id)?;
    Ok(json!({ "id": args.id, "deleted": deleted }))
}

pub async fn handle_memory_export(services: &Services) -> Result<Value> {
    let memory = services.memory()?;
    let export = memory.export_to_json()?;
    Ok(serde_json::to_value(export)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryImportArgs {
    pub export: MemoryExport,
}

pub async fn handle_memory_import(services: &Services, args: MemoryImportArgs) -> Result<Value> {
    let memory = services.memory()?;
    let (imported, skipped) = memory.import_from_json(&args.export)?;
    Ok(json!({ "imported": imported, "skipped": skipped }))
}

pub async fn handle_memory_stats(services: &Services) -> Result<Value> {
    let memory = services.memory()?;
    Ok(serde_json::to_value(memory.get_stats()?)?)
}

pub async fn handle_memory_clear(services: &Services) -> Result<Value> {
    let memory = services.memory()?;
    let cleared = memory.clear()?;
    Ok(json!({ "cleared": cleared }))
}

impl Services {
    /// Memory initialization failures degrade gracefully; tool calls that
    /// specifically need the store surface a typed error instead of
    /// panicking on a missing handle.
    fn memory(&self) -> Result<&MemoryStore> {
        self.memory.as_deref().ok_or_else(Error::memory_not_initialized)
    }
}

/// Deserializes a tool's `arguments` object, turning a shape mismatch
/// into `InvalidParams` rather than the generic parse-error kind the
/// blanket `From<serde_json::Error>` conversion would produce — a bad
/// tool argument is a dispatch-level `-32602`, not a `-32700` reserved
/// for a malformed request line.
fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|err| Error::invalid_params(err.to_string()))
}

/// The result of dispatching one `tools/call`: either the tool ran
/// (successfully or not — `ToolError` still means the dispatch itself
/// succeeded) or the call never reached a handler at all, in which
/// case the caller returns a protocol-level error instead.
pub enum DispatchOutcome {
    Value(Value),
    ToolError(Error),
}

/// Routes a `tools/call` by name to its handler. Unknown tool names
/// and malformed argument shapes are returned as `Err` (protocol-level
/// failures); a handler's own `Err` is folded into `Ok(ToolError)` so
/// it surfaces as `result.isError = true` instead.
pub async fn dispatch(services: &Services, tool_name: &str, arguments: Value) -> Result<DispatchOutcome> {
    let outcome = match tool_name {
        "run_agent" => handle_run_agent(services, parse_args(arguments)?).await,
        "list_agents" => handle_list_agents(services).await,
        "search_memory" => handle_search_memory(services, parse_args(arguments)?).await,
        "get_status" => handle_get_status(services).await,
        "session_create" => handle_session_create(services, parse_args(arguments)?).await,
        "session_list" => handle_session_list(services).await,
        "session_status" => handle_session_status(services, parse_args(arguments)?).await,
        "session_complete" => handle_session_complete(services, parse_args(arguments)?).await,
        "session_fail" => handle_session_fail(services, parse_args(arguments)?).await,
        "memory_add" => handle_memory_add(services, parse_args(arguments)?).await,
        "memory_list" => handle_memory_list(services, parse_args(arguments)?).await,
        "memory_delete" => handle_memory_delete(services, parse_args(arguments)?).await,
        "memory_export" => handle_memory_export(services).await,
        "memory_import" => handle_memory_import(services, parse_args(arguments)?).await,
        "memory_stats" => handle_memory_stats(services).await,
        "memory_clear" => handle_memory_clear(services).await,
        other => return Err(Error::tool_not_found(other)),
    };
    match outcome {
        Ok(value) => Ok(DispatchOutcome::Value(value)),
        Err(err) => Ok(DispatchOutcome::ToolError(err)),
    }
}
