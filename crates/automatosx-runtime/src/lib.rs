//! Top-level process configuration and the Stage Execution Controller
//! that sits above the engine,
//! provider, memory, and workspace crates.

pub mod checkpoint_store;
pub mod config;
pub mod controller;
pub mod plan;

pub use checkpoint_store::CheckpointStore;
pub use config::Config;
pub use controller::{
    AutoConfirmHook, ConfirmHook, ControllerConfig, RunRequest, RunResult, StageExecutionController,
};
pub use plan::{evaluate_condition, plan_waves, Wave};

use async_trait::async_trait;
use automatosx_engine::{ExecutionContext, ExecutionOutcome, Executor};
use automatosx_providers::{Router, Signal};
use automatosx_types::checkpoint::StageStatus;
use automatosx_types::{DelegationOutputs, Error, ExecutionRequest, Result};
use std::sync::Arc;

/// Bridges the Stage Execution Controller into the engine's narrow
/// `Executor` trait so the Delegation Engine can drive real stage
/// execution instead of the test-only echo executor.
///
/// The `Executor` contract only carries a resolved `ExecutionContext`,
/// not the original task string that named its sections — so a
/// delegation into a staged agent re-assembles per-stage context using
/// the already-built prompt as the task text. Unstaged agents (the
/// common case) skip that re-assembly entirely and run directly
/// against the already-resolved context.
pub struct CoreExecutor {
    controller: Arc<StageExecutionController>,
    router: Arc<Router>,
}

impl CoreExecutor {
    pub fn new(controller: Arc<StageExecutionController>, router: Arc<Router>) -> Self {
        Self { controller, router }
    }
}

#[async_trait]
impl Executor for CoreExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionOutcome> {
        if !ctx.profile.has_stages() {
            let exec_request = ExecutionRequest {
                prompt: ctx.prompt.clone(),
                system_prompt: None,
                model: ctx.model.clone(),
                provider: ctx.provider.clone(),
                temperature: ctx.profile.temperature,
                max_tokens: ctx.profile.max_tokens,
            };
            let response = self.router.execute(&exec_request, &Signal::never()).await?;
            return Ok(ExecutionOutcome {
                response: response.content,
                outputs: DelegationOutputs::default(),
            });
        }

        let request = RunRequest {
            run_id: None,
            agent_name: ctx.profile.name.clone(),
            task: ctx.prompt.clone(),
            mode: Vec::new(),
            provider: ctx.provider.clone(),
            model: ctx.model.clone(),
            session_id: ctx.session_id.clone(),
            delegation_chain: ctx.delegation_chain.clone(),
            shared_data: ctx.shared_data.clone(),
            continue_on_failure: false,
        };

        let result = self.controller.run(request, &Signal::never()).await?;
        if result.success {
            return Ok(ExecutionOutcome {
                response: result.output,
                outputs: DelegationOutputs::default(),
            });
        }

        match result.stages.iter().find(|s| s.status == StageStatus::Failed) {
            Some(stage) => Err(Error::stage_failed(
                &stage.name,
                stage.error.as_deref().unwrap_or("stage failed"),
            )),
            None => Err(Error::delegation_execution_failed("staged run did not complete successfully")),
        }
    }
}
