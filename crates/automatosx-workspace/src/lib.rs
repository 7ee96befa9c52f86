//! Scoped filesystem for agent-visible planning documents and scratch
//! space. Exposes `PRD/` (permanent, shared) and `tmp/`
//! (ephemeral) namespaces rooted under the project directory, plus
//! read-only support for the pre-existing per-session workspace shape.

mod legacy;
mod namespace;
mod path;

pub use legacy::LegacyWorkspace;
pub use namespace::{NamespaceStats, MAX_FILE_SIZE};

use automatosx_types::Result;
use namespace::Namespace;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkspaceStats {
    pub prd: NamespaceStats,
    pub tmp: NamespaceStats,
}

pub struct Workspace {
    prd: Namespace,
    tmp: Namespace,
    legacy: LegacyWorkspace,
}

impl Workspace {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        let project_root = project_root.as_ref();
        Self {
            prd: Namespace::new(project_root.join("PRD")),
            tmp: Namespace::new(project_root.join("tmp")),
            legacy: LegacyWorkspace::new(project_root),
        }
    }

    pub fn legacy(&self) -> &LegacyWorkspace {
        &self.legacy
    }

    pub async fn write_prd(&self, rel_path: &str, content: &str) -> Result<()> {
        self.prd.write(rel_path, content).await
    }

    pub async fn read_prd(&self, rel_path: &str) -> Result<String> {
        self.prd.read(rel_path).await
    }

    pub async fn list_prd(&self) -> Result<Vec<String>> {
        self.prd.list().await
    }

    pub async fn write_tmp(&self, rel_path: &str, content: &str) -> Result<()> {
        self.tmp.write(rel_path, content).await
    }

    pub async fn read_tmp(&self, rel_path: &str) -> Result<String> {
        self.tmp.read(rel_path).await
    }

    pub async fn list_tmp(&self) -> Result<Vec<String>> {
        self.tmp.list().await
    }

    pub async fn cleanup_tmp(&self, older_than_days: Option<f64>) -> Result<u64> {
        self.tmp.cleanup(older_than_days).await
    }

    pub async fn get_stats(&self) -> Result<WorkspaceStats> {
        Ok(WorkspaceStats {
            prd: self.prd.stats().await?,
            tmp: self.tmp.stats().await?,
        })
    }
}

/// Resolves the project data root: explicit path, then env var, then
/// the platform data directory, then a dotfile fallback.
pub fn resolve_project_root(explicit_path: Option<&str>) -> PathBuf {
    if let Some(path) = explicit_path {
        return expand_tilde(path);
    }
    if let Ok(env_path) = std::env::var("AUTOMATOSX_PROJECT_ROOT") {
        return expand_tilde(&env_path);
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn prd_and_tmp_are_isolated_namespaces() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::new(root.path());
        ws.write_prd("design.md", "permanent").await.unwrap();
        ws.write_tmp("scratch.md", "ephemeral").await.unwrap();

        assert_eq!(ws.read_prd("design.md").await.unwrap(), "permanent");
        assert_eq!(ws.read_tmp("scratch.md").await.unwrap(), "ephemeral");
        assert!(ws.read_prd("scratch.md").await.is_err());
    }

    #[tokio::test]
    async fn stats_report_both_namespaces() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::new(root.path());
        ws.write_prd("a.md", "12345").await.unwrap();
        ws.write_tmp("b.md", "123").await.unwrap();
        let stats = ws.get_stats().await.unwrap();
        assert_eq!(stats.prd.file_count, 1);
        assert_eq!(stats.prd.total_bytes, 5);
        assert_eq!(stats.tmp.file_count, 1);
        assert_eq!(stats.tmp.total_bytes, 3);
    }
}
