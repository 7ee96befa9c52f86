//! Read-only support for the older per-agent/per-session workspace
//! shape:
//! `.automatosx/workspaces/shared/sessions/<id>/outputs/<agent>/...`
//!
//! New writes never go here; this module only ever reads.

use automatosx_types::{AgentProfile, Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct LegacyWorkspace {
    root: PathBuf,
}

impl LegacyWorkspace {
    pub fn new(project_root: &Path) -> Self {
        Self {
            root: project_root.join(".automatosx/workspaces/shared/sessions"),
        }
    }

    fn agent_outputs_dir(&self, session_id: &str, agent: &str) -> PathBuf {
        self.root.join(session_id).join("outputs").join(agent)
    }

    /// Reads `rel_path` from a session's legacy output tree for
    /// `agent`, honoring the profile's legacy permission flags: an
    /// agent reading another agent's outputs needs
    /// `can_read_workspaces`; reading the shared session root (not a
    /// per-agent subtree) needs nothing beyond existing.
    pub async fn read_agent_output(
        &self,
        session_id: &str,
        requesting_agent: &AgentProfile,
        owning_agent: &str,
        rel_path: &str,
    ) -> Result<String> {
        if requesting_agent.name != owning_agent && !requesting_agent.can_read_workspaces {
            return Err(Error::path_invalid(
                rel_path,
                "agent is not permitted to read other agents' legacy workspace outputs",
            ));
        }

        let dir = self.agent_outputs_dir(session_id, owning_agent);
        let resolved = crate::path::resolve_in_namespace(&dir, rel_path)?;
        let bytes = fs::read(&resolved)
            .await
            .map_err(|_| Error::path_invalid(rel_path, "legacy output file does not exist"))?;
        String::from_utf8(bytes).map_err(|_| Error::path_invalid(rel_path, "file is not valid UTF-8"))
    }

    pub async fn list_agent_outputs(&self, session_id: &str, agent: &str) -> Result<Vec<String>> {
        let dir = self.agent_outputs_dir(session_id, agent);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            out.push(entry.file_name().to_string_lossy().to_string());
        }
        out.sort();
        Ok(out)
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automatosx_types::OrchestrationConfig;
    use tempfile::TempDir;

    fn profile(name: &str, can_read_workspaces: bool) -> AgentProfile {
        AgentProfile {
            name: name.to_string(),
            display_name: None,
            team: None,
            role: None,
            description: None,
            system_prompt: String::new(),
            abilities: Vec::new(),
            provider: None,
            model: None,
            temperature: None,
            max_tokens: None,
            orchestration: OrchestrationConfig::default(),
            stages: Vec::new(),
            can_read_workspaces,
            can_write_to_shared: false,
        }
    }

    #[tokio::test]
    async fn own_output_readable_without_permission_flag() {
        let root = TempDir::new().unwrap();
        let legacy = LegacyWorkspace::new(root.path());
        let dir = legacy.agent_outputs_dir("sess1", "alice");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("out.txt"), "result").await.unwrap();

        let alice = profile("alice", false);
        let content = legacy
            .read_agent_output("sess1", &alice, "alice", "out.txt")
            .await
            .unwrap();
        assert_eq!(content, "result");
    }

    #[tokio::test]
    async fn cross_agent_read_requires_permission_flag() {
        let root = TempDir::new().unwrap();
        let legacy = LegacyWorkspace::new(root.path());
        let dir = legacy.agent_outputs_dir("sess1", "alice");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("out.txt"), "result").await.unwrap();

        let bob = profile("bob", false);
        let err = legacy
            .read_agent_output("sess1", &bob, "alice", "out.txt")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), automatosx_types::ErrorKind::PathInvalid);

        let bob_with_access = profile("bob", true);
        let content = legacy
            .read_agent_output("sess1", &bob_with_access, "alice", "out.txt")
            .await
            .unwrap();
        assert_eq!(content, "result");
    }
}
