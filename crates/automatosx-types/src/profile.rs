//! Agent Profile and Stage data model.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_delegation_depth() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationConfig {
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: default_max_delegation_depth(),
        }
    }
}

/// One step of a multi-stage agent workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
    /// Symbolic predicate over prior stage outputs, e.g. `"impl.success"`.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, with = "duration_secs_opt")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default, with = "duration_secs_opt")]
    pub retry_delay: Option<Duration>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

/// Immutable agent profile input. Loaded by an external
/// `ProfileLoader`; the core only consumes this value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub abilities: Vec<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// Legacy per-agent workspace permission flags. New profiles should leave these `false`.
    #[serde(default)]
    pub can_read_workspaces: bool,
    #[serde(default)]
    pub can_write_to_shared: bool,
}

impl AgentProfile {
    pub fn max_delegation_depth(&self) -> usize {
        self.orchestration.max_delegation_depth
    }

    pub fn has_stages(&self) -> bool {
        !self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_orchestration_depth_is_two() {
        let profile = AgentProfile {
            name: "writer".into(),
            display_name: None,
            team: None,
            role: None,
            description: None,
            system_prompt: String::new(),
            abilities: vec![],
            provider: None,
            model: None,
            temperature: None,
            max_tokens: None,
            orchestration: OrchestrationConfig::default(),
            stages: vec![],
            can_read_workspaces: false,
            can_write_to_shared: false,
        };
        assert_eq!(profile.max_delegation_depth(), 2);
        assert!(!profile.has_stages());
    }

    #[test]
    fn deserializes_minimal_json() {
        let json = r#"{"name": "writer", "systemPrompt": "You write things."}"#;
        let profile: AgentProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name, "writer");
        assert_eq!(profile.max_delegation_depth(), 2);
    }
}
