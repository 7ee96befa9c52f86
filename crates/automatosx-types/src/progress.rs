//! Progress Event data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    StageStart {
        stage_index: usize,
        stage_name: String,
        timestamp: DateTime<Utc>,
    },
    StageProgress {
        stage_index: usize,
        stage_name: String,
        percentage: f32,
        timestamp: DateTime<Utc>,
    },
    StageComplete {
        stage_index: usize,
        stage_name: String,
        timestamp: DateTime<Utc>,
    },
    StageError {
        stage_index: usize,
        stage_name: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    TokenStream {
        stage_index: usize,
        stage_name: String,
        token: String,
        timestamp: DateTime<Utc>,
    },
    Checkpoint {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    UserPrompt {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Critical events bypass throttling and are delivered immediately.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ProgressEvent::StageStart { .. }
                | ProgressEvent::StageComplete { .. }
                | ProgressEvent::StageError { .. }
                | ProgressEvent::Checkpoint { .. }
                | ProgressEvent::UserPrompt { .. }
        )
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProgressEvent::StageStart { timestamp, .. }
            | ProgressEvent::StageProgress { timestamp, .. }
            | ProgressEvent::StageComplete { timestamp, .. }
            | ProgressEvent::StageError { timestamp, .. }
            | ProgressEvent::TokenStream { timestamp, .. }
            | ProgressEvent::Checkpoint { timestamp, .. }
            | ProgressEvent::UserPrompt { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progress_is_not_critical() {
        let ev = ProgressEvent::StageProgress {
            stage_index: 0,
            stage_name: "plan".into(),
            percentage: 10.0,
            timestamp: Utc::now(),
        };
        assert!(!ev.is_critical());
    }

    #[test]
    fn stage_error_is_critical() {
        let ev = ProgressEvent::StageError {
            stage_index: 0,
            stage_name: "plan".into(),
            message: "boom".into(),
            timestamp: Utc::now(),
        };
        assert!(ev.is_critical());
    }
}
