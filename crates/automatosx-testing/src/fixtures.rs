//! Temp-project and agent-profile fixtures: a temp dir holding a
//! project root, with fluent construction for the agent profiles
//! written into it.

use automatosx_runtime::Config;
use automatosx_types::{AgentProfile, OrchestrationConfig, Result, Stage};
use std::path::PathBuf;
use tempfile::TempDir;

/// An isolated `<tmp>/.automatosx/{agents,abilities}` project tree.
/// Dropped at the end of the test, taking the directory with it.
pub struct TestProject {
    _dir: TempDir,
    pub root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp project dir");
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join(".automatosx").join("agents")).expect("create agents dir");
        std::fs::create_dir_all(root.join(".automatosx").join("abilities")).expect("create abilities dir");
        Self { _dir: dir, root }
    }

    /// A `Config` rooted at this project, with mock providers enabled
    /// so tests never shell out to a real provider subprocess.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.project_root = self.root.clone();
        config.mock_providers = true;
        config
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join(".automatosx").join("agents")
    }

    pub fn abilities_dir(&self) -> PathBuf {
        self.root.join(".automatosx").join("abilities")
    }

    /// Writes `profile` as `<root>/.automatosx/agents/<name>.json`,
    /// the layout `FilesystemProfileLoader` reads.
    pub fn write_profile(&self, profile: &AgentProfile) -> Result<()> {
        let path = self.agents_dir().join(format!("{}.json", profile.name));
        let json = serde_json::to_string_pretty(profile)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Writes `<root>/.automatosx/abilities/<name>.md`.
    pub fn write_ability(&self, name: &str, content: &str) -> Result<()> {
        let path = self.abilities_dir().join(format!("{name}.md"));
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent `AgentProfile` construction for tests, mirroring the
/// teacher's `TestWorldBuilder` fluent-setter style.
pub struct ProfileBuilder {
    profile: AgentProfile,
}

impl ProfileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            profile: AgentProfile {
                name: name.into(),
                display_name: None,
                team: None,
                role: None,
                description: None,
                system_prompt: "You are a helpful agent.".to_string(),
                abilities: Vec::new(),
                provider: None,
                model: None,
                temperature: None,
                max_tokens: None,
                orchestration: OrchestrationConfig::default(),
                stages: Vec::new(),
                can_read_workspaces: false,
                can_write_to_shared: false,
            },
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.profile.system_prompt = prompt.into();
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.profile.provider = Some(provider.into());
        self
    }

    pub fn ability(mut self, name: impl Into<String>) -> Self {
        self.profile.abilities.push(name.into());
        self
    }

    pub fn max_delegation_depth(mut self, depth: usize) -> Self {
        self.profile.orchestration.max_delegation_depth = depth;
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.profile.stages.push(stage);
        self
    }

    pub fn build(self) -> AgentProfile {
        self.profile
    }
}

/// A minimal named stage with no dependencies, parallelism, or
/// retries — the common case callers override via struct-update
/// syntax (`Stage { dependencies: vec![...], ..simple_stage("x") }`).
pub fn simple_stage(name: impl Into<String>) -> Stage {
    Stage {
        name: name.into(),
        description: String::new(),
        dependencies: Vec::new(),
        parallel: false,
        condition: None,
        timeout: None,
        max_retries: None,
        retry_delay: None,
        provider: None,
        model: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_creates_agents_and_abilities_dirs() {
        let project = TestProject::new();
        assert!(project.agents_dir().is_dir());
        assert!(project.abilities_dir().is_dir());
    }

    #[test]
    fn write_profile_round_trips_through_the_filesystem_layout() {
        let project = TestProject::new();
        let profile = ProfileBuilder::new("writer").system_prompt("Write clearly.").build();
        project.write_profile(&profile).unwrap();

        let path = project.agents_dir().join("writer.json");
        let contents = std::fs::read_to_string(path).unwrap();
        let loaded: AgentProfile = serde_json::from_str(&contents).unwrap();
        assert_eq!(loaded.name, "writer");
        assert_eq!(loaded.system_prompt, "Write clearly.");
    }

    #[test]
    fn builder_accumulates_stages_in_order() {
        let profile = ProfileBuilder::new("pipeline")
            .stage(simple_stage("plan"))
            .stage(Stage { dependencies: vec!["plan".to_string()], ..simple_stage("implement") })
            .build();
        assert!(profile.has_stages());
        assert_eq!(profile.stages[1].dependencies, vec!["plan".to_string()]);
    }
}
