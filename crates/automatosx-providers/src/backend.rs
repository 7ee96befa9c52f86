//! The `Backend` trait stands in for "opaque subprocess LLM program"
//!. Two implementations ship: a real
//! `ProcessBackend` that spawns `command` and pipes the prompt through
//! stdin/stdout, and a `MockBackend` used when
//! `AUTOMATOSX_MOCK_PROVIDERS` is set.

use crate::signal::Signal;
use async_trait::async_trait;
use automatosx_types::{Error, ExecutionRequest, ExecutionResponse, ProviderDescriptor, Result};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncWriteExt, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap availability probe.
    async fn is_available(&self) -> bool;

    async fn execute(&self, req: &ExecutionRequest, signal: &Signal) -> Result<ExecutionResponse>;
}

/// Spawns the configured subprocess, writes the assembled prompt to
/// its stdin, and reads the full stdout as the response content. Real
/// backends are expected to exit on EOF of stdin; timeouts and
/// cancellation both race the child process via `Command::kill`.
pub struct ProcessBackend {
    descriptor: ProviderDescriptor,
}

impl ProcessBackend {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    async fn is_available(&self) -> bool {
        let Ok(mut child) = Command::new(&self.descriptor.command.path)
            .arg(
                self.descriptor
                    .detection
                    .version_arg
                    .clone()
                    .unwrap_or_else(|| "--version".to_string()),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        else {
            return false;
        };
        matches!(
            timeout(self.descriptor.timeout, child.wait()).await,
            Ok(Ok(status)) if status.success()
        )
    }

    async fn execute(&self, req: &ExecutionRequest, signal: &Signal) -> Result<ExecutionResponse> {
        let start = Instant::now();
        let mut command = Command::new(&self.descriptor.command.path);
        command
            .args(&self.descriptor.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(model) = &req.model {
            command.arg("--model").arg(model);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::provider_exec_error(self.name(), &e.to_string()))?;

        let mut stdin = child.stdin.take().expect("piped stdin");
        let full_prompt = render_prompt(req);
        let write = stdin.write_all(full_prompt.as_bytes());
        let wait_and_read = async {
            drop(stdin);
            let mut stdout = child.stdout.take().expect("piped stdout");
            let mut out = String::new();
            stdout
                .read_to_string(&mut out)
                .await
                .map_err(|e| Error::provider_exec_error(self.name(), &e.to_string()))?;
            let status = child
                .wait()
                .await
                .map_err(|e| Error::provider_exec_error(self.name(), &e.to_string()))?;
            Ok::<_, Error>((status, out))
        };

        write
            .await
            .map_err(|e| Error::provider_exec_error(self.name(), &e.to_string()))?;

        let (status, content) = tokio::select! {
            biased;
            _ = signal.cancelled() => {
                return Err(Error::provider_exec_error(self.name(), "cancelled"));
            }
            res = timeout(self.descriptor.timeout, wait_and_read) => {
                match res {
                    Ok(inner) => inner?,
                    Err(_) => return Err(Error::provider_timeout(self.name())),
                }
            }
        };

        if !status.success() {
            return Err(Error::provider_exec_error(
                self.name(),
                &format!("exited with status {status}"),
            ));
        }

        Ok(ExecutionResponse {
            content,
            model: req.model.clone().unwrap_or_else(|| "default".to_string()),
            tokens_used: automatosx_types::TokenUsage {
                prompt: 0,
                completion: 0,
                total: 0,
            },
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            finish_reason: "stop".to_string(),
        })
    }
}

fn render_prompt(req: &ExecutionRequest) -> String {
    match &req.system_prompt {
        Some(system) => format!("{system}\n\n{}", req.prompt),
        None => req.prompt.clone(),
    }
}

/// Deterministic in-process stub activated by `AUTOMATOSX_MOCK_PROVIDERS`.
/// Never shells out; used in tests and CI so the full router/delegation/
/// stage pipeline is exercisable without real LLM CLIs installed.
pub struct MockBackend {
    name: String,
    available: std::sync::atomic::AtomicBool,
    fail_next: std::sync::atomic::AtomicUsize,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: std::sync::atomic::AtomicBool::new(true),
            fail_next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available
            .store(available, std::sync::atomic::Ordering::SeqCst);
    }

    /// Cause the next `n` `execute` calls to fail with a retryable error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        self.available.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn execute(&self, req: &ExecutionRequest, signal: &Signal) -> Result<ExecutionResponse> {
        if signal.is_cancelled() {
            return Err(Error::provider_exec_error(self.name(), "cancelled"));
        }
        let remaining = self.fail_next.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next
                .store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(Error::provider_rate_limit(self.name()));
        }

        Ok(ExecutionResponse {
            content: format!("[{}] {}", self.name, req.prompt),
            model: req
                .model
                .clone()
                .unwrap_or_else(|| format!("{}-mock", self.name)),
            tokens_used: automatosx_types::TokenUsage {
                prompt: req.prompt.len() as u32 / 4,
                completion: 16,
                total: req.prompt.len() as u32 / 4 + 16,
            },
            latency_ms: 1.0,
            finish_reason: "stop".to_string(),
        })
    }
}
