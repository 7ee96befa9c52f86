//! Stage Execution Controller: plans a profile's `stages`
//! into waves, runs each with retry/timeout, streams progress, persists
//! checkpoints, and resumes from them — its own retry/backoff loop
//! around each fallible unit of work, with signal-aware sleeps,
//! driving a DAG of stages instead of a single workload.

use crate::checkpoint_store::CheckpointStore;
use crate::plan::{self, plan_waves, Wave};
use async_trait::async_trait;
use automatosx_engine::{AssembleOptions, ContextAssembler, ProgressChannel};
use automatosx_providers::{Router, Signal};
use automatosx_types::checkpoint::{ExecutionMode, StageRecord, StageStatus};
use automatosx_types::profile::{AgentProfile, Stage};
use automatosx_types::{Checkpoint, DelegationChain, Error, ExecutionRequest, ProgressEvent, Result, SharedData};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Caller-supplied execution request for a (possibly staged) agent run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// `Some` to resume or continue a specific run; `None` starts a
    /// fresh run with a newly minted id.
    pub run_id: Option<String>,
    pub agent_name: String,
    pub task: String,
    pub mode: Vec<ExecutionMode>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub delegation_chain: DelegationChain,
    pub shared_data: SharedData,
    /// Mirrors the delegation engine's own flag:
    /// when false, a stage failure aborts subsequent waves.
    pub continue_on_failure: bool,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            run_id: None,
            agent_name: String::new(),
            task: String::new(),
            mode: Vec::new(),
            provider: None,
            model: None,
            session_id: None,
            delegation_chain: DelegationChain::new(),
            shared_data: SharedData::new(),
            continue_on_failure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: String,
    pub success: bool,
    pub output: String,
    pub stages: Vec<StageRecord>,
}

/// The interactive pre-wave checkpoint prompt. `true` means proceed with the upcoming wave.
#[async_trait]
pub trait ConfirmHook: Send + Sync {
    async fn confirm(&self, checkpoint: &Checkpoint, wave_index: usize) -> bool;
}

/// Used whenever `autoConfirm` is set, or by callers with no
/// interactive surface.
pub struct AutoConfirmHook;

#[async_trait]
impl ConfirmHook for AutoConfirmHook {
    async fn confirm(&self, _checkpoint: &Checkpoint, _wave_index: usize) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub default_stage_timeout: Duration,
    pub default_max_retries: u32,
    pub default_retry_delay: Duration,
    pub progress_update_interval: Duration,
    pub prompt_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_stage_timeout: Duration::from_secs(120),
            default_max_retries: 2,
            default_retry_delay: Duration::from_millis(500),
            progress_update_interval: Duration::from_millis(500),
            prompt_timeout: Duration::from_secs(300),
        }
    }
}

pub struct StageExecutionController {
    assembler: Arc<ContextAssembler>,
    router: Arc<Router>,
    checkpoints: CheckpointStore,
    progress: Arc<ProgressChannel>,
    confirm: Arc<dyn ConfirmHook>,
    config: ControllerConfig,
}

impl StageExecutionController {
    pub fn new(
        assembler: Arc<ContextAssembler>,
        router: Arc<Router>,
        checkpoints: CheckpointStore,
        progress: Arc<ProgressChannel>,
        confirm: Arc<dyn ConfirmHook>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            assembler,
            router,
            checkpoints,
            progress,
            confirm,
            config,
        }
    }

    /// Runs a profile end to end. Profiles with no `stages` are
    /// executed as a single prompt against the router, bypassing
    /// checkpointing entirely.
    pub async fn run(&self, request: RunRequest, signal: &Signal) -> Result<RunResult> {
        let profile = self.assembler.load_profile(&request.agent_name).await?;
        if !profile.has_stages() {
            return self.run_single(&profile, &request, signal).await;
        }
        self.run_staged(&profile, request, signal).await
    }

    /// Reloads a prior checkpoint and continues it in place.
    pub async fn resume(&self, run_id: &str, signal: &Signal) -> Result<RunResult> {
        let checkpoint = self
            .checkpoints
            .load(run_id)
            .await?
            .ok_or_else(|| Error::invalid_params(format!("no checkpoint found for run '{run_id}'")))?;

        let request = RunRequest {
            run_id: Some(checkpoint.run_id.clone()),
            agent_name: checkpoint.agent_name.clone(),
            task: checkpoint.task.clone(),
            mode: checkpoint.mode.clone(),
            delegation_chain: checkpoint.chain.clone(),
            ..RunRequest::default()
        };
        self.run(request, signal).await
    }

    async fn run_single(&self, profile: &AgentProfile, request: &RunRequest, signal: &Signal) -> Result<RunResult> {
        let run_id = request.run_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let options = AssembleOptions {
            provider: request.provider.clone(),
            model: request.model.clone(),
            skip_memory: false,
            session_id: request.session_id.clone(),
            delegation_chain: request.delegation_chain.clone(),
            shared_data: request.shared_data.clone(),
        };
        let ctx = self.assembler.assemble(&request.agent_name, &request.task, options).await?;
        let exec_request = ExecutionRequest {
            prompt: ctx.prompt,
            system_prompt: None,
            model: ctx.model,
            provider: ctx.provider,
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        };
        let response = self.router.execute(&exec_request, signal).await?;
        Ok(RunResult {
            run_id,
            success: true,
            output: response.content,
            stages: Vec::new(),
        })
    }

    async fn run_staged(&self, profile: &AgentProfile, request: RunRequest, signal: &Signal) -> Result<RunResult> {
        let run_id = request.run_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let resumable = request.mode.contains(&ExecutionMode::Resumable);
        let interactive = request.mode.contains(&ExecutionMode::Interactive);
        let auto_confirm = request.mode.contains(&ExecutionMode::AutoConfirm);

        let mut checkpoint = match self.checkpoints.load(&run_id).await? {
            Some(existing) => existing,
            None => fresh_checkpoint(&run_id, profile, &request),
        };

        let waves = plan_waves(&profile.stages)?;

        'waves: for (wave_index, wave) in waves.iter().enumerate() {
            if signal.is_cancelled() {
                break;
            }

            reevaluate_conditions(profile, wave, &mut checkpoint);
            if resumable {
                checkpoint.updated_at = Utc::now();
                self.checkpoints.save(&checkpoint).await?;
            }

            if interactive && !auto_confirm {
                self.progress
                    .emit(ProgressEvent::Checkpoint {
                        run_id: run_id.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
                let proceed = tokio::select! {
                    decision = self.confirm.confirm(&checkpoint, wave_index) => decision,
                    _ = tokio::time::sleep(self.config.prompt_timeout) => false,
                    _ = signal.cancelled() => false,
                };
                if !proceed {
                    break 'waves;
                }
            }

            let mut wave_failed = false;

            for &idx in &wave.serial {
                if signal.is_cancelled() {
                    break 'waves;
                }
                if self.skip_if_settled(profile, idx, &checkpoint) {
                    continue;
                }
                let record = self.run_stage_attempts(profile, idx, &request, signal).await;
                wave_failed |= record.status == StageStatus::Failed;
                *checkpoint.stage_mut(&profile.stages[idx].name).expect("seeded") = record;
                if resumable {
                    checkpoint.updated_at = Utc::now();
                    self.checkpoints.save(&checkpoint).await?;
                }
                if wave_failed && !request.continue_on_failure {
                    break 'waves;
                }
            }

            if !wave.parallel.is_empty() {
                let runnable: Vec<usize> = wave
                    .parallel
                    .iter()
                    .copied()
                    .filter(|&idx| !self.skip_if_settled(profile, idx, &checkpoint))
                    .collect();

                if !runnable.is_empty() {
                    use futures::stream::{self as fstream, StreamExt};
                    let concurrency = runnable.len().max(1);
                    let results: Vec<(usize, StageRecord)> = fstream::iter(runnable)
                        .map(|idx| async move { (idx, self.run_stage_attempts(profile, idx, &request, signal).await) })
                        .buffer_unordered(concurrency)
                        .collect()
                        .await;

                    for (idx, record) in results {
                        wave_failed |= record.status == StageStatus::Failed;
                        *checkpoint.stage_mut(&profile.stages[idx].name).expect("seeded") = record;
                    }
                    if resumable {
                        checkpoint.updated_at = Utc::now();
                        self.checkpoints.save(&checkpoint).await?;
                    }
                }
            }

            if wave_failed && !request.continue_on_failure {
                break 'waves;
            }
        }

        if resumable {
            checkpoint.updated_at = Utc::now();
            self.checkpoints.save(&checkpoint).await?;
        }

        let success = checkpoint.overall_success();
        let output = compose_output(&profile.stages, &waves, &checkpoint);

        Ok(RunResult {
            run_id,
            success,
            output,
            stages: checkpoint.stages,
        })
    }

    fn skip_if_settled(&self, profile: &AgentProfile, idx: usize, checkpoint: &Checkpoint) -> bool {
        let name = &profile.stages[idx].name;
        matches!(
            checkpoint.stages.iter().find(|r| &r.name == name).map(|r| r.status),
            Some(StageStatus::Completed) | Some(StageStatus::Skipped)
        )
    }

    /// Runs one stage to completion or terminal failure, emitting
    /// `stage-start`/`stage-progress`/`stage-complete`/`stage-error`
    /// along the way. Returns the finished record; does not mutate the
    /// checkpoint itself so parallel stages can run without sharing
    /// `&mut` access.
    async fn run_stage_attempts(
        &self,
        profile: &AgentProfile,
        idx: usize,
        request: &RunRequest,
        signal: &Signal,
    ) -> StageRecord {
        let stage = &profile.stages[idx];
        self.progress
            .emit(ProgressEvent::StageStart {
                stage_index: idx,
                stage_name: stage.name.clone(),
                timestamp: Utc::now(),
            })
            .await;

        let max_retries = stage.max_retries.unwrap_or(self.config.default_max_retries);
        let retry_delay = stage.retry_delay.unwrap_or(self.config.default_retry_delay);
        let stage_timeout = stage.timeout.unwrap_or(self.config.default_stage_timeout);

        let started_at = Utc::now();
        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;
        let mut completed = None;

        for attempt in 0..=max_retries {
            attempts += 1;
            if signal.is_cancelled() {
                last_error = Some("cancelled".to_string());
                break;
            }

            let ctx = match self.assemble_stage_context(profile, stage, request).await {
                Ok(ctx) => ctx,
                Err(err) => {
                    last_error = Some(err.message);
                    break;
                }
            };
            let exec_request = ExecutionRequest {
                prompt: ctx.prompt,
                system_prompt: None,
                model: stage.model.clone().or(ctx.model),
                provider: stage.provider.clone().or(ctx.provider),
                temperature: profile.temperature,
                max_tokens: profile.max_tokens,
            };

            let progress_task = self.spawn_synthetic_progress(idx, stage.name.clone());
            let attempt_result = tokio::select! {
                res = self.router.execute(&exec_request, signal) => res,
                _ = tokio::time::sleep(stage_timeout) => Err(Error::stage_timeout(&stage.name)),
            };
            progress_task.abort();

            match attempt_result {
                Ok(response) => {
                    completed = Some(response);
                    last_error = None;
                    break;
                }
                Err(err) => {
                    last_error = Some(err.message);
                    if attempt < max_retries {
                        tokio::select! {
                            _ = signal.cancelled() => break,
                            _ = tokio::time::sleep(retry_delay) => {}
                        }
                    }
                }
            }
        }

        let ended_at = Utc::now();
        let mut record = StageRecord::pending(&stage.name);
        record.attempts = attempts;
        record.started_at = Some(started_at);
        record.ended_at = Some(ended_at);
        record.duration_ms = Some((ended_at - started_at).num_milliseconds());

        match completed {
            Some(response) => {
                record.status = StageStatus::Completed;
                record.output = Some(response.content);
                record.tokens_used = Some(response.tokens_used.total);
                record.model = Some(response.model);
                self.progress
                    .emit(ProgressEvent::StageComplete {
                        stage_index: idx,
                        stage_name: stage.name.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
            }
            None => {
                let message = last_error.unwrap_or_else(|| "stage failed with no error detail".to_string());
                record.status = StageStatus::Failed;
                record.error = Some(message.clone());
                self.progress
                    .emit(ProgressEvent::StageError {
                        stage_index: idx,
                        stage_name: stage.name.clone(),
                        message,
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        }

        record
    }

    async fn assemble_stage_context(
        &self,
        _profile: &AgentProfile,
        stage: &Stage,
        request: &RunRequest,
    ) -> Result<automatosx_engine::ExecutionContext> {
        let stage_task = if stage.description.is_empty() {
            format!("{}\n\n## Stage: {}", request.task, stage.name)
        } else {
            format!("{}\n\n## Stage: {}\n{}", request.task, stage.name, stage.description)
        };
        let options = AssembleOptions {
            provider: stage.provider.clone().or_else(|| request.provider.clone()),
            model: stage.model.clone().or_else(|| request.model.clone()),
            skip_memory: false,
            session_id: request.session_id.clone(),
            delegation_chain: request.delegation_chain.clone(),
            shared_data: request.shared_data.clone(),
        };
        self.assembler.assemble(&request.agent_name, &stage_task, options).await
    }

    /// Emits a synthetic `stage-progress` tick at `progressUpdateInterval`
    /// while a non-streaming backend is executing,
    /// using an asymptotic curve that never reaches 100%.
    fn spawn_synthetic_progress(&self, stage_index: usize, stage_name: String) -> tokio::task::JoinHandle<()> {
        let progress = self.progress.clone();
        let interval = self.config.progress_update_interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            loop {
                tokio::time::sleep(interval).await;
                let elapsed = start.elapsed().as_secs_f64();
                let percentage = (100.0 * (1.0 - (-elapsed / 10.0).exp())).min(95.0) as f32;
                progress
                    .emit(ProgressEvent::StageProgress {
                        stage_index,
                        stage_name: stage_name.clone(),
                        percentage,
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        })
    }
}

fn fresh_checkpoint(run_id: &str, profile: &AgentProfile, request: &RunRequest) -> Checkpoint {
    let now = Utc::now();
    Checkpoint {
        run_id: run_id.to_string(),
        agent_name: request.agent_name.clone(),
        task: request.task.clone(),
        mode: request.mode.clone(),
        stages: profile.stages.iter().map(|s| StageRecord::pending(&s.name)).collect(),
        chain: request.delegation_chain.clone(),
        created_at: now,
        updated_at: now,
    }
}

/// Re-evaluates each stage's skip condition before it runs, so a
/// replayed run can un-skip a stage whose dependency now succeeded.
fn reevaluate_conditions(profile: &AgentProfile, wave: &Wave, checkpoint: &mut Checkpoint) {
    for &idx in wave.parallel.iter().chain(wave.serial.iter()) {
        let stage = &profile.stages[idx];
        let should_skip = !plan::evaluate_condition(stage.condition.as_deref(), &checkpoint.stages);
        let record = checkpoint.stage_mut(&stage.name).expect("checkpoint seeded from stages");
        if record.status == StageStatus::Completed {
            continue;
        }
        if should_skip {
            record.status = StageStatus::Skipped;
        } else if record.status == StageStatus::Skipped {
            *record = StageRecord::pending(&stage.name);
        }
    }
}

/// The last completed non-skipped stage's output, visited in
/// topological (wave) order.
fn compose_output(stages: &[Stage], waves: &[Wave], checkpoint: &Checkpoint) -> String {
    let mut output = String::new();
    for wave in waves {
        for &idx in wave.serial.iter().chain(wave.parallel.iter()) {
            let name = &stages[idx].name;
            if let Some(record) = checkpoint.stages.iter().find(|r| &r.name == name) {
                if record.status == StageStatus::Completed {
                    if let Some(stage_output) = &record.output {
                        output = stage_output.clone();
                    }
                }
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use automatosx_engine::{ContextAssembler, FilesystemAbilityLoader, FilesystemProfileLoader};
    use automatosx_providers::backend::{Backend, MockBackend};
    use automatosx_providers::retry::RetryPolicy;
    use automatosx_types::ProviderCommand;
    use automatosx_workspace::Workspace;
    use std::time::Duration as StdDuration;

    fn descriptor(name: &str) -> automatosx_types::ProviderDescriptor {
        automatosx_types::ProviderDescriptor {
            name: name.to_string(),
            priority: 0,
            timeout: StdDuration::from_secs(5),
            command: ProviderCommand {
                path: "true".to_string(),
                args: vec![],
            },
            detection: Default::default(),
            health_check_interval: StdDuration::from_secs(60),
        }
    }

    async fn controller(dir: &std::path::Path) -> (StageExecutionController, String) {
        let profiles = Arc::new(FilesystemProfileLoader::new(dir));
        let abilities = Arc::new(FilesystemAbilityLoader::new(dir));
        let workspace = Arc::new(Workspace::new(dir));
        let assembler = Arc::new(ContextAssembler::new(profiles, abilities, None, workspace, None));

        let backend = Arc::new(MockBackend::new("mock"));
        let backends: Vec<Arc<dyn Backend>> = vec![backend];
        let router = Arc::new(
            Router::new(vec![descriptor("mock")], backends, false, RetryPolicy::default())
                .await
                .unwrap(),
        );

        let checkpoints = CheckpointStore::new(dir.join("checkpoints"));
        let progress = Arc::new(ProgressChannel::new());
        let confirm = Arc::new(AutoConfirmHook);
        let controller = StageExecutionController::new(
            assembler,
            router,
            checkpoints,
            progress,
            confirm,
            ControllerConfig {
                default_stage_timeout: StdDuration::from_secs(2),
                default_max_retries: 0,
                default_retry_delay: StdDuration::from_millis(1),
                progress_update_interval: StdDuration::from_millis(50),
                prompt_timeout: StdDuration::from_secs(1),
            },
        );
        (controller, dir.to_string_lossy().to_string())
    }

    async fn write_profile(dir: &std::path::Path, json: &str) {
        tokio::fs::create_dir_all(dir.join("agents")).await.unwrap();
        tokio::fs::write(dir.join("agents/writer.json"), json).await.unwrap();
    }

    #[tokio::test]
    async fn unstaged_profile_runs_a_single_prompt() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), r#"{"name": "writer", "systemPrompt": "x"}"#).await;
        let (controller, _) = controller(dir.path()).await;

        let result = controller
            .run(
                RunRequest {
                    agent_name: "writer".to_string(),
                    task: "draft a memo".to_string(),
                    ..RunRequest::default()
                },
                &Signal::never(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.stages.is_empty());
    }

    #[tokio::test]
    async fn linear_stages_all_complete_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            r#"{
                "name": "writer",
                "systemPrompt": "x",
                "stages": [
                    {"name": "plan", "dependencies": []},
                    {"name": "impl", "dependencies": ["plan"]}
                ]
            }"#,
        )
        .await;
        let (controller, _) = controller(dir.path()).await;

        let result = controller
            .run(
                RunRequest {
                    agent_name: "writer".to_string(),
                    task: "ship the feature".to_string(),
                    ..RunRequest::default()
                },
                &Signal::never(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stages.len(), 2);
        assert!(result.stages.iter().all(|s| s.status == StageStatus::Completed));
    }

    #[tokio::test]
    async fn condition_false_marks_stage_skipped_and_preserves_success() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            r#"{
                "name": "writer",
                "systemPrompt": "x",
                "stages": [
                    {"name": "plan", "dependencies": []},
                    {"name": "docs", "dependencies": ["plan"], "condition": "plan.failure"}
                ]
            }"#,
        )
        .await;
        let (controller, _) = controller(dir.path()).await;

        let result = controller
            .run(
                RunRequest {
                    agent_name: "writer".to_string(),
                    task: "ship it".to_string(),
                    ..RunRequest::default()
                },
                &Signal::never(),
            )
            .await
            .unwrap();

        assert!(result.success);
        let docs = result.stages.iter().find(|s| s.name == "docs").unwrap();
        assert_eq!(docs.status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn resumable_run_checkpoints_and_can_be_resumed() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            r#"{
                "name": "writer",
                "systemPrompt": "x",
                "stages": [{"name": "plan", "dependencies": []}]
            }"#,
        )
        .await;
        let (controller, _) = controller(dir.path()).await;

        let run_id = Uuid::new_v4().to_string();
        let result = controller
            .run(
                RunRequest {
                    run_id: Some(run_id.clone()),
                    agent_name: "writer".to_string(),
                    task: "ship it".to_string(),
                    mode: vec![ExecutionMode::Resumable],
                    ..RunRequest::default()
                },
                &Signal::never(),
            )
            .await
            .unwrap();
        assert!(result.success);

        let resumed = controller.resume(&run_id, &Signal::never()).await.unwrap();
        assert!(resumed.success);
        assert_eq!(resumed.stages[0].status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn stage_failure_aborts_without_continue_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            r#"{
                "name": "writer",
                "systemPrompt": "x",
                "stages": [
                    {"name": "plan", "dependencies": [], "provider": "ghost"},
                    {"name": "impl", "dependencies": ["plan"]}
                ]
            }"#,
        )
        .await;
        let (controller, _) = controller(dir.path()).await;

        let result = controller
            .run(
                RunRequest {
                    agent_name: "writer".to_string(),
                    task: "ship it".to_string(),
                    ..RunRequest::default()
                },
                &Signal::never(),
            )
            .await
            .unwrap();

        assert!(!result.success);
        let plan_stage = result.stages.iter().find(|s| s.name == "plan").unwrap();
        assert_eq!(plan_stage.status, StageStatus::Failed);
        let impl_stage = result.stages.iter().find(|s| s.name == "impl").unwrap();
        assert_eq!(impl_stage.status, StageStatus::Pending);
    }
}
