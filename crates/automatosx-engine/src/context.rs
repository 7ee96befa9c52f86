//! Context Assembler: turns an agent name and a task into
//! a fully-resolved `ExecutionContext`, via an incremental
//! accumulate-then-`build()` pattern that assembles prompt sections
//! in a fixed, deterministic order.

use crate::profile_loader::{AbilityLoader, ProfileLoader};
use automatosx_types::{
    AgentProfile, DelegationChain, Error, GetAllFilter, MemoryEntryType, Result, SearchFilter, SharedData,
};
use automatosx_memory::MemoryStore;
use automatosx_workspace::Workspace;
use std::sync::Arc;
use tracing::warn;

/// Default number of top-ranked memory entries injected into the
/// prompt.
pub const DEFAULT_MEMORY_TOP_K: usize = 5;

/// Default character budget for the injected memory section.
pub const DEFAULT_MEMORY_CHAR_BUDGET: usize = 4000;

#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub skip_memory: bool,
    pub session_id: Option<String>,
    pub delegation_chain: DelegationChain,
    pub shared_data: SharedData,
}

/// The fully-resolved context an executor or the delegation engine
/// consumes. `workspace` and `memory` are handles
/// shared across many contexts rather than owned copies.
#[derive(Clone)]
pub struct ExecutionContext {
    pub profile: AgentProfile,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub prompt: String,
    pub session_id: Option<String>,
    pub delegation_chain: DelegationChain,
    pub shared_data: SharedData,
    pub workspace: Arc<Workspace>,
}

pub struct ContextAssembler {
    profiles: Arc<dyn ProfileLoader>,
    abilities: Arc<dyn AbilityLoader>,
    memory: Option<Arc<MemoryStore>>,
    workspace: Arc<Workspace>,
    default_provider: Option<String>,
    memory_top_k: usize,
    memory_char_budget: usize,
}

impl ContextAssembler {
    pub fn new(
        profiles: Arc<dyn ProfileLoader>,
        abilities: Arc<dyn AbilityLoader>,
        memory: Option<Arc<MemoryStore>>,
        workspace: Arc<Workspace>,
        default_provider: Option<String>,
    ) -> Self {
        Self {
            profiles,
            abilities,
            memory,
            workspace,
            default_provider,
            memory_top_k: DEFAULT_MEMORY_TOP_K,
            memory_char_budget: DEFAULT_MEMORY_CHAR_BUDGET,
        }
    }

    pub fn with_memory_limits(mut self, top_k: usize, char_budget: usize) -> Self {
        self.memory_top_k = top_k;
        self.memory_char_budget = char_budget;
        self
    }

    /// Loads a bare profile without assembling a full context; used by
    /// the delegation engine's precondition checks.
    pub async fn load_profile(&self, agent_name: &str) -> Result<AgentProfile> {
        self.profiles.load(agent_name).await
    }

    pub async fn assemble(&self, agent_name: &str, task: &str, options: AssembleOptions) -> Result<ExecutionContext> {
        let profile = self.profiles.load(agent_name).await?;

        let abilities_section = self.load_abilities_section(&profile).await;
        let memory_section = if options.skip_memory {
            None
        } else {
            self.load_memory_section(&profile, task).await
        };

        let provider = options
            .provider
            .clone()
            .or_else(|| profile.provider.clone())
            .or_else(|| self.default_provider.clone());
        let model = options.model.clone().or_else(|| profile.model.clone());

        let prompt = build_prompt(&profile, abilities_section.as_deref(), memory_section.as_deref(), task);

        Ok(ExecutionContext {
            profile,
            provider,
            model,
            prompt,
            session_id: options.session_id,
            delegation_chain: options.delegation_chain,
            shared_data: options.shared_data,
            workspace: self.workspace.clone(),
        })
    }

    /// Step 2: unknown ability names warn, they don't fail.
    async fn load_abilities_section(&self, profile: &AgentProfile) -> Option<String> {
        if profile.abilities.is_empty() {
            return None;
        }
        let mut sections = Vec::new();
        for name in &profile.abilities {
            match self.abilities.load(name).await {
                Ok(Some(content)) => sections.push(content),
                Ok(None) => warn!(ability = name, "referenced ability not found; skipping"),
                Err(err) => warn!(ability = name, error = %err, "failed to load ability; skipping"),
            }
        }
        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }

    /// Step 3: top-k FTS results over `task`, filtered by the profile's
    /// declared memory type/tags if present, bounded by a character
    /// budget.
    async fn load_memory_section(&self, profile: &AgentProfile, task: &str) -> Option<String> {
        let memory = self.memory.as_ref()?;
        let filter = SearchFilter {
            text: Some(task.to_string()),
            vector: None,
            r#type: memory_type_for(profile),
            tags: Vec::new(),
            limit: Some(self.memory_top_k),
            threshold: None,
        };
        let entries = match memory.search(&filter) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "memory lookup failed during context assembly; continuing without it");
                return None;
            }
        };
        if entries.is_empty() {
            return None;
        }
        let mut section = String::new();
        for entry in entries {
            if section.len() + entry.content.len() > self.memory_char_budget {
                break;
            }
            if !section.is_empty() {
                section.push_str("\n---\n");
            }
            section.push_str(&entry.content);
        }
        if section.is_empty() {
            None
        } else {
            Some(section)
        }
    }
}

/// Profiles don't currently declare a memory-type filter; reserved for
/// when one is added to `AgentProfile`.
fn memory_type_for(_profile: &AgentProfile) -> Option<MemoryEntryType> {
    None
}

/// Concatenates the prompt in a fixed order: system prompt,
/// abilities, memory, task — each appearing exactly once.
fn build_prompt(profile: &AgentProfile, abilities: Option<&str>, memory: Option<&str>, task: &str) -> String {
    let mut prompt = String::new();
    if !profile.system_prompt.is_empty() {
        prompt.push_str(&profile.system_prompt);
    }
    if let Some(abilities) = abilities {
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str("## Abilities\n\n");
        prompt.push_str(abilities);
    }
    if let Some(memory) = memory {
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str("## Relevant memory\n\n");
        prompt.push_str(memory);
    }
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str("## Task\n\n");
    prompt.push_str(task);
    prompt
}

/// Allows `ContextAssembler::assemble` failures to surface the
/// `AgentNotFound` suggestions without the caller re-deriving them.
pub fn is_agent_not_found(err: &Error) -> bool {
    err.kind() == automatosx_types::ErrorKind::AgentNotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_loader::{FilesystemAbilityLoader, FilesystemProfileLoader};
    use automatosx_types::MemoryMetadata;

    async fn assembler(dir: &std::path::Path) -> ContextAssembler {
        let profiles = Arc::new(FilesystemProfileLoader::new(dir));
        let abilities = Arc::new(FilesystemAbilityLoader::new(dir));
        let workspace = Arc::new(Workspace::new(dir));
        ContextAssembler::new(profiles, abilities, None, workspace, None)
    }

    #[tokio::test]
    async fn missing_profile_surfaces_agent_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(dir.path()).await;
        let err = assembler
            .assemble("ghost", "do something", AssembleOptions::default())
            .await
            .unwrap_err();
        assert!(is_agent_not_found(&err));
    }

    #[tokio::test]
    async fn prompt_sections_appear_in_deterministic_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("agents")).await.unwrap();
        tokio::fs::create_dir_all(dir.path().join("abilities")).await.unwrap();
        tokio::fs::write(
            dir.path().join("agents/writer.json"),
            r#"{"name": "writer", "systemPrompt": "You write things.", "abilities": ["tone"]}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("abilities/tone.md"), "Be concise.")
            .await
            .unwrap();

        let assembler = assembler(dir.path()).await;
        let ctx = assembler
            .assemble("writer", "draft a memo", AssembleOptions::default())
            .await
            .unwrap();

        let system_pos = ctx.prompt.find("You write things.").unwrap();
        let abilities_pos = ctx.prompt.find("Be concise.").unwrap();
        let task_pos = ctx.prompt.find("draft a memo").unwrap();
        assert!(system_pos < abilities_pos);
        assert!(abilities_pos < task_pos);
    }

    #[tokio::test]
    async fn provider_precedence_is_explicit_then_profile_then_default() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("agents")).await.unwrap();
        tokio::fs::write(
            dir.path().join("agents/writer.json"),
            r#"{"name": "writer", "systemPrompt": "x", "provider": "profile-provider"}"#,
        )
        .await
        .unwrap();

        let profiles = Arc::new(FilesystemProfileLoader::new(dir.path()));
        let abilities = Arc::new(FilesystemAbilityLoader::new(dir.path()));
        let workspace = Arc::new(Workspace::new(dir.path()));
        let assembler = ContextAssembler::new(
            profiles,
            abilities,
            None,
            workspace,
            Some("default-provider".to_string()),
        );

        let ctx = assembler
            .assemble("writer", "task", AssembleOptions::default())
            .await
            .unwrap();
        assert_eq!(ctx.provider.as_deref(), Some("profile-provider"));

        let ctx = assembler
            .assemble(
                "writer",
                "task",
                AssembleOptions {
                    provider: Some("explicit-provider".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ctx.provider.as_deref(), Some("explicit-provider"));
    }

    #[tokio::test]
    async fn memory_injection_bumps_access_count() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("agents")).await.unwrap();
        tokio::fs::write(
            dir.path().join("agents/writer.json"),
            r#"{"name": "writer", "systemPrompt": "x"}"#,
        )
        .await
        .unwrap();

        let store = Arc::new(MemoryStore::open_in_memory(100, 10).unwrap());
        store.add("launch plan notes", MemoryMetadata::default()).unwrap();

        let profiles = Arc::new(FilesystemProfileLoader::new(dir.path()));
        let abilities = Arc::new(FilesystemAbilityLoader::new(dir.path()));
        let workspace = Arc::new(Workspace::new(dir.path()));
        let assembler = ContextAssembler::new(profiles, abilities, Some(store.clone()), workspace, None);

        let ctx = assembler
            .assemble("writer", "launch plan", AssembleOptions::default())
            .await
            .unwrap();
        assert!(ctx.prompt.contains("launch plan notes"));

        let all = store
            .get_all(&GetAllFilter::default())
            .unwrap();
        assert!(all[0].access_count >= 1);
    }
}
