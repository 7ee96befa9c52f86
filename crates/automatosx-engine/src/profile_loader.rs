//! `ProfileLoader`/`AbilityLoader` contracts and their default
//! filesystem implementations — the pluggable boundary the Context
//! Assembler and Delegation Engine both depend on, kept as a trait so
//! a non-filesystem backing store can be swapped in later.

use async_trait::async_trait;
use automatosx_types::{AgentProfile, Error, Result};
use std::path::{Path, PathBuf};

#[async_trait]
pub trait ProfileLoader: Send + Sync {
    async fn load(&self, name: &str) -> Result<AgentProfile>;
    async fn list_names(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait AbilityLoader: Send + Sync {
    /// Returns `None` (not an error) for an unknown ability; callers
    /// are expected to warn, not fail, on a miss.
    async fn load(&self, name: &str) -> Result<Option<String>>;
}

/// Reads `<root>/<name>.json` per agent and `<root>/abilities/<name>.md`
/// per ability — one file per named resource, directory as namespace.
pub struct FilesystemProfileLoader {
    root: PathBuf,
}

impl FilesystemProfileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.root.join("agents").join(format!("{name}.json"))
    }
}

#[async_trait]
impl ProfileLoader for FilesystemProfileLoader {
    async fn load(&self, name: &str) -> Result<AgentProfile> {
        let path = self.profile_path(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let profile: AgentProfile = serde_json::from_str(&contents)?;
                Ok(profile)
            }
            Err(_) => {
                let suggestions = self.suggest(name).await;
                Err(Error::agent_not_found(name, suggestions))
            }
        }
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let dir = self.root.join("agents");
        let mut names = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return Ok(names);
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl FilesystemProfileLoader {
    /// Nearest-neighbor agent-name suggestions within edit distance 3.
    async fn suggest(&self, name: &str) -> Vec<String> {
        let Ok(candidates) = self.list_names().await else {
            return Vec::new();
        };
        let mut scored: Vec<(usize, String)> = candidates
            .into_iter()
            .map(|c| (edit_distance(name, &c), c))
            .filter(|(d, _)| *d <= 3)
            .collect();
        scored.sort_by_key(|(d, _)| *d);
        scored.into_iter().map(|(_, name)| name).collect()
    }
}

pub struct FilesystemAbilityLoader {
    root: PathBuf,
}

impl FilesystemAbilityLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AbilityLoader for FilesystemAbilityLoader {
    async fn load(&self, name: &str) -> Result<Option<String>> {
        let path = self.root.join("abilities").join(format!("{name}.md"));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(_) => Ok(None),
        }
    }
}

/// Classic Levenshtein distance, used only for short agent-name
/// strings so the O(n*m) table is never a concern.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut row: Vec<usize> = (0..=m).collect();

    for i in 1..=n {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=m {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j - 1])
            };
            prev_diag = tmp;
        }
    }
    row[m]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_distance_counts_single_substitution() {
        assert_eq!(edit_distance("writer", "writar"), 1);
        assert_eq!(edit_distance("writer", "writer"), 0);
    }

    #[tokio::test]
    async fn missing_profile_suggests_near_misses() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("agents")).await.unwrap();
        tokio::fs::write(
            dir.path().join("agents/writer.json"),
            r#"{"name": "writer", "systemPrompt": "write"}"#,
        )
        .await
        .unwrap();

        let loader = FilesystemProfileLoader::new(dir.path());
        let err = loader.load("writar").await.unwrap_err();
        assert_eq!(err.kind(), automatosx_types::ErrorKind::AgentNotFound);
        assert_eq!(err.suggestions, vec!["writer".to_string()]);
    }

    #[tokio::test]
    async fn existing_profile_loads() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("agents")).await.unwrap();
        tokio::fs::write(
            dir.path().join("agents/writer.json"),
            r#"{"name": "writer", "systemPrompt": "write things"}"#,
        )
        .await
        .unwrap();

        let loader = FilesystemProfileLoader::new(dir.path());
        let profile = loader.load("writer").await.unwrap();
        assert_eq!(profile.system_prompt, "write things");
    }

    #[tokio::test]
    async fn unknown_ability_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FilesystemAbilityLoader::new(dir.path());
        assert!(loader.load("nonexistent").await.unwrap().is_none());
    }
}
