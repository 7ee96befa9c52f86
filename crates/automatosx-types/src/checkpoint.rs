//! Checkpoint data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl StageRecord {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            output: None,
            duration_ms: None,
            tokens_used: None,
            model: None,
            started_at: None,
            ended_at: None,
            attempts: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Interactive,
    Streaming,
    Resumable,
    AutoConfirm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub run_id: String,
    pub agent_name: String,
    pub task: String,
    #[serde(default)]
    pub mode: Vec<ExecutionMode>,
    pub stages: Vec<StageRecord>,
    #[serde(default)]
    pub chain: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn overall_success(&self) -> bool {
        self.stages
            .iter()
            .filter(|s| s.status != StageStatus::Skipped)
            .all(|s| s.status == StageStatus::Completed)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|s| s.name == name)
    }
}
