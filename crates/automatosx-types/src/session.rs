//! Session and delegation data model.

use crate::shared::SharedData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

/// A shared context binding multiple agents working on one overall
/// task. `agents` is unique and insertion-ordered with `initiator`
/// first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub initiator: String,
    pub task: String,
    pub agents: Vec<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SharedData,
}

impl Session {
    pub fn new(initiator: impl Into<String>, task: impl Into<String>) -> Self {
        let now = Utc::now();
        let initiator = initiator.into();
        Self {
            id: Uuid::new_v4().to_string(),
            agents: vec![initiator.clone()],
            initiator,
            task: task.into(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            metadata: SharedData::new(),
        }
    }

    /// Idempotent append; returns whether the agent was newly added.
    pub fn add_agent(&mut self, name: &str) -> bool {
        if self.agents.iter().any(|a| a == name) {
            false
        } else {
            self.agents.push(name.to_string());
            self.updated_at = Utc::now();
            true
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// The ordered list of in-flight callers at any point during a
/// delegation. No name appears twice.
pub type DelegationChain = Vec<String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationContext {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub delegation_chain: DelegationChain,
    #[serde(default)]
    pub shared_data: SharedData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRequest {
    pub from_agent: String,
    pub to_agent: String,
    pub task: String,
    #[serde(default)]
    pub context: DelegationContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationOutputs {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub memory_ids: Vec<i64>,
    #[serde(default)]
    pub workspace_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationResult {
    pub delegation_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub status: DelegationStatus,
    pub response: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub outputs: DelegationOutputs,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_contains_initiator() {
        let session = Session::new("planner", "ship it");
        assert_eq!(session.agents, vec!["planner".to_string()]);
        assert!(session.is_active());
    }

    #[test]
    fn add_agent_is_idempotent() {
        let mut session = Session::new("planner", "ship it");
        assert!(session.add_agent("writer"));
        assert!(!session.add_agent("writer"));
        assert_eq!(session.agents, vec!["planner".to_string(), "writer".to_string()]);
    }
}
