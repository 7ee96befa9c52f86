//! Delegation Engine: one agent calling another, with
//! depth/cycle guards and gather-all-results parallel fan-out — nested
//! delegations where a parent always waits for all of its children.

use crate::context::{AssembleOptions, ContextAssembler, ExecutionContext};
use crate::session_manager::SessionManager;
use async_trait::async_trait;
use automatosx_types::{
    DelegationContext, DelegationOutputs, DelegationRequest, DelegationResult, DelegationStatus, Error, Result,
};
use std::sync::Arc;
use uuid::Uuid;

/// The outcome of running an already-assembled context to completion.
/// Produced by whatever executes single-/multi-stage runs (the Stage
/// Execution Controller, in the full system); kept as a narrow trait
/// here so the delegation engine doesn't need to depend on it.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub response: String,
    pub outputs: DelegationOutputs,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionOutcome>;
}

pub struct DelegationEngineConfig {
    pub max_concurrent_agents: usize,
    pub continue_on_failure: bool,
}

impl Default for DelegationEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 4,
            continue_on_failure: false,
        }
    }
}

pub struct DelegationEngine {
    sessions: Arc<SessionManager>,
    assembler: Arc<ContextAssembler>,
    executor: Arc<dyn Executor>,
    config: DelegationEngineConfig,
}

impl DelegationEngine {
    pub fn new(
        sessions: Arc<SessionManager>,
        assembler: Arc<ContextAssembler>,
        executor: Arc<dyn Executor>,
        config: DelegationEngineConfig,
    ) -> Self {
        Self {
            sessions,
            assembler,
            executor,
            config,
        }
    }

    /// Runs each precondition check in order, then executes and
    /// composes a `DelegationResult`.
    pub async fn delegate(&self, request: DelegationRequest) -> Result<DelegationResult> {
        // Precondition 2: load fromAgent profile for maxDelegationDepth.
        let from_profile = self.assembler.load_profile(&request.from_agent).await?;
        let max_depth = from_profile.max_delegation_depth();

        // Precondition 3: depth check.
        let chain = &request.context.delegation_chain;
        if chain.len() >= max_depth {
            return Err(Error::max_depth_exceeded(max_depth));
        }

        // Precondition 4: cycle check.
        if chain.iter().any(|agent| agent == &request.to_agent) {
            return Err(Error::cycle_detected(&request.to_agent));
        }

        // Precondition 5: session resolution.
        let session_id = self.resolve_session(&request).await?;

        // Precondition 6: idempotent agent-list append.
        self.sessions.add_agent(&session_id, &request.to_agent).await?;

        self.execute_delegation(request, session_id).await
    }

    async fn resolve_session(&self, request: &DelegationRequest) -> Result<String> {
        match &request.context.session_id {
            Some(session_id) => {
                let session = self
                    .sessions
                    .get_session(session_id)
                    .await
                    .ok_or_else(|| Error::session_not_found(session_id))?;
                if !session.is_active() {
                    return Err(Error::session_not_active(session_id));
                }
                Ok(session.id)
            }
            None => {
                let session = self.sessions.create_session(&request.task, &request.from_agent).await;
                Ok(session.id)
            }
        }
    }

    async fn execute_delegation(&self, request: DelegationRequest, session_id: String) -> Result<DelegationResult> {
        let mut delegation_chain = request.context.delegation_chain.clone();
        delegation_chain.push(request.from_agent.clone());

        let options = AssembleOptions {
            session_id: Some(session_id),
            delegation_chain,
            shared_data: request.context.shared_data.clone(),
            ..Default::default()
        };

        let ctx = self.assembler.assemble(&request.to_agent, &request.task, options).await?;

        let start_time = chrono::Utc::now();
        let outcome = match self.executor.execute(&ctx).await {
            Ok(outcome) => outcome,
            // Pre-existing typed errors propagate unchanged; anything
            // else (panics caught upstream, third-party surprises) is
            // wrapped.
            Err(err) if is_delegation_typed_error(&err) => return Err(err),
            Err(err) => return Err(Error::delegation_execution_failed(&err.message)),
        };
        let end_time = chrono::Utc::now();

        Ok(DelegationResult {
            delegation_id: Uuid::new_v4().to_string(),
            from_agent: request.from_agent,
            to_agent: request.to_agent,
            status: DelegationStatus::Completed,
            response: outcome.response,
            duration_ms: (end_time - start_time).num_milliseconds(),
            outputs: outcome.outputs,
            start_time,
            end_time,
        })
    }

    /// Runs several independent delegations concurrently, gathering all results. Bounded by
    /// `maxConcurrentAgents`; with `continueDelegationsOnFailure` unset,
    /// the first failure's error is returned once every in-flight
    /// delegation has finished.
    pub async fn delegate_many(&self, requests: Vec<DelegationRequest>) -> Result<Vec<DelegationResult>> {
        use futures::stream::{self, StreamExt};

        let continue_on_failure = self.config.continue_on_failure;
        let results: Vec<Result<DelegationResult>> = stream::iter(requests)
            .map(|request| async move { self.delegate(request).await })
            .buffer_unordered(self.config.max_concurrent_agents.max(1))
            .collect()
            .await;

        if continue_on_failure {
            Ok(results.into_iter().filter_map(|r| r.ok()).collect())
        } else {
            results.into_iter().collect()
        }
    }
}

fn is_delegation_typed_error(err: &Error) -> bool {
    use automatosx_types::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::DelegationNotConfigured
            | ErrorKind::MaxDepthExceeded
            | ErrorKind::CycleDetected
            | ErrorKind::SessionNotFound
            | ErrorKind::SessionNotActive
            | ErrorKind::DelegationExecutionFailed
            | ErrorKind::AgentNotFound
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_loader::{FilesystemAbilityLoader, FilesystemProfileLoader};
    use automatosx_workspace::Workspace;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor for EchoExecutor {
        async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionOutcome {
                response: format!("handled: {}", ctx.prompt.lines().last().unwrap_or_default()),
                outputs: DelegationOutputs::default(),
            })
        }
    }

    async fn write_profile(dir: &std::path::Path, name: &str, max_depth: usize) {
        tokio::fs::create_dir_all(dir.join("agents")).await.unwrap();
        tokio::fs::write(
            dir.join("agents").join(format!("{name}.json")),
            format!(
                r#"{{"name": "{name}", "systemPrompt": "x", "orchestration": {{"maxDelegationDepth": {max_depth}}}}}"#
            ),
        )
        .await
        .unwrap();
    }

    async fn engine(dir: &std::path::Path, executor: Arc<dyn Executor>) -> DelegationEngine {
        let profiles = Arc::new(FilesystemProfileLoader::new(dir));
        let abilities = Arc::new(FilesystemAbilityLoader::new(dir));
        let workspace = Arc::new(Workspace::new(dir));
        let assembler = Arc::new(ContextAssembler::new(profiles, abilities, None, workspace, None));
        let sessions = Arc::new(SessionManager::in_memory().await);
        DelegationEngine::new(sessions, assembler, executor, DelegationEngineConfig::default())
    }

    #[tokio::test]
    async fn delegation_creates_session_and_appends_agent() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "planner", 2).await;
        write_profile(dir.path(), "writer", 2).await;
        let executor = Arc::new(EchoExecutor { calls: AtomicUsize::new(0) });
        let engine = engine(dir.path(), executor).await;

        let result = engine
            .delegate(DelegationRequest {
                from_agent: "planner".to_string(),
                to_agent: "writer".to_string(),
                task: "draft the memo".to_string(),
                context: DelegationContext::default(),
            })
            .await
            .unwrap();

        assert_eq!(result.to_agent, "writer");
        let active = engine.sessions.get_active_sessions_for_agent("writer").await;
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn depth_exceeded_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "planner", 1).await;
        write_profile(dir.path(), "writer", 1).await;
        let executor = Arc::new(EchoExecutor { calls: AtomicUsize::new(0) });
        let engine = engine(dir.path(), executor).await;

        let result = engine
            .delegate(DelegationRequest {
                from_agent: "planner".to_string(),
                to_agent: "writer".to_string(),
                task: "draft the memo".to_string(),
                context: DelegationContext {
                    delegation_chain: vec!["someone".to_string()],
                    ..Default::default()
                },
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), automatosx_types::ErrorKind::MaxDepthExceeded);
    }

    #[tokio::test]
    async fn cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "planner", 5).await;
        write_profile(dir.path(), "writer", 5).await;
        let executor = Arc::new(EchoExecutor { calls: AtomicUsize::new(0) });
        let engine = engine(dir.path(), executor).await;

        let result = engine
            .delegate(DelegationRequest {
                from_agent: "planner".to_string(),
                to_agent: "writer".to_string(),
                task: "draft the memo".to_string(),
                context: DelegationContext {
                    delegation_chain: vec!["writer".to_string()],
                    ..Default::default()
                },
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), automatosx_types::ErrorKind::CycleDetected);
    }

    #[tokio::test]
    async fn parallel_delegations_gather_all_results() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "planner", 5).await;
        write_profile(dir.path(), "writer", 5).await;
        write_profile(dir.path(), "reviewer", 5).await;
        let executor = Arc::new(EchoExecutor { calls: AtomicUsize::new(0) });
        let engine = engine(dir.path(), executor).await;

        let requests = vec![
            DelegationRequest {
                from_agent: "planner".to_string(),
                to_agent: "writer".to_string(),
                task: "draft".to_string(),
                context: DelegationContext::default(),
            },
            DelegationRequest {
                from_agent: "planner".to_string(),
                to_agent: "reviewer".to_string(),
                task: "review".to_string(),
                context: DelegationContext::default(),
            },
        ];

        let results = engine.delegate_many(requests).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
