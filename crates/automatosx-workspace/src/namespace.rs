//! A single scoped namespace (`PRD/` or `tmp/`) rooted under the
//! project directory.

use crate::path::resolve_in_namespace;
use automatosx_types::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::Mutex;

/// Files are bounded at 10 MiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, serde::Serialize)]
pub struct NamespaceStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

pub struct Namespace {
    root: PathBuf,
    ensured: AtomicBool,
    // Serializes directory creation so concurrent writers observe
    // either the fully-ensured root or an error, never a half-created
    // tree.
    ensure_lock: Mutex<()>,
}

impl Namespace {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ensured: AtomicBool::new(false),
            ensure_lock: Mutex::new(()),
        }
    }

    async fn ensure_root(&self) -> Result<()> {
        if self.ensured.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.ensure_lock.lock().await;
        if self.ensured.load(Ordering::Acquire) {
            return Ok(());
        }
        create_dir_mode_755(&self.root).await?;
        self.ensured.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn write(&self, rel_path: &str, content: &str) -> Result<()> {
        if content.len() as u64 > MAX_FILE_SIZE {
            return Err(Error::file_too_large(rel_path, MAX_FILE_SIZE));
        }
        self.ensure_root().await?;
        let resolved = resolve_in_namespace(&self.root, rel_path)?;
        if let Some(parent) = resolved.parent() {
            create_dir_mode_755(parent).await?;
        }
        fs::write(&resolved, content.as_bytes()).await?;
        Ok(())
    }

    pub async fn read(&self, rel_path: &str) -> Result<String> {
        self.ensure_root().await?;
        let resolved = resolve_in_namespace(&self.root, rel_path)?;
        let metadata = fs::metadata(&resolved)
            .await
            .map_err(|_| Error::path_invalid(rel_path, "file does not exist"))?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(Error::file_too_large(rel_path, MAX_FILE_SIZE));
        }
        let bytes = fs::read(&resolved).await?;
        String::from_utf8(bytes).map_err(|_| Error::path_invalid(rel_path, "file is not valid UTF-8"))
    }

    /// Lists every file under the namespace root, relative to it.
    pub async fn list(&self) -> Result<Vec<String>> {
        self.ensure_root().await?;
        let mut out = Vec::new();
        walk(&self.root, &self.root, &mut out).await?;
        out.sort();
        Ok(out)
    }

    /// Deletes every file whose modification time is older than
    /// `older_than_days`; `None` means
    /// no age filter, i.e. clear everything.
    pub async fn cleanup(&self, older_than_days: Option<f64>) -> Result<u64> {
        self.ensure_root().await?;
        let cutoff = older_than_days.map(|days| Utc::now() - chrono::Duration::seconds((days * 86_400.0) as i64));
        let mut deleted = 0u64;
        delete_stale(&self.root, cutoff, &mut deleted).await?;
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<NamespaceStats> {
        self.ensure_root().await?;
        let mut stats = NamespaceStats {
            file_count: 0,
            total_bytes: 0,
        };
        accumulate_stats(&self.root, &mut stats).await?;
        Ok(stats)
    }
}

#[cfg(unix)]
async fn create_dir_mode_755(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(path).await?;
    let perms = std::fs::Permissions::from_mode(0o755);
    fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn create_dir_mode_755(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

fn walk<'a>(
    root: &'a Path,
    dir: &'a Path,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                walk(root, &path, out).await?;
            } else {
                let rel = path.strip_prefix(root).unwrap_or(&path);
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    })
}

fn delete_stale<'a>(
    dir: &'a Path,
    cutoff: Option<DateTime<Utc>>,
    deleted: &'a mut u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                delete_stale(&path, cutoff, deleted).await?;
                continue;
            }
            let stale = match cutoff {
                None => true,
                Some(cutoff) => {
                    let modified = entry.metadata().await?.modified().ok();
                    match modified {
                        Some(modified) => DateTime::<Utc>::from(modified) < cutoff,
                        None => false,
                    }
                }
            };
            if stale {
                fs::remove_file(&path).await?;
                *deleted += 1;
            }
        }
        Ok(())
    })
}

fn accumulate_stats<'a>(
    dir: &'a Path,
    stats: &'a mut NamespaceStats,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                accumulate_stats(&path, stats).await?;
            } else {
                stats.file_count += 1;
                stats.total_bytes += entry.metadata().await?.len();
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_read_roundtrip() {
        let root = TempDir::new().unwrap();
        let ns = Namespace::new(root.path().to_path_buf());
        ns.write("notes/plan.md", "hello").await.unwrap();
        let content = ns.read("notes/plan.md").await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn write_rejects_oversized_content() {
        let root = TempDir::new().unwrap();
        let ns = Namespace::new(root.path().to_path_buf());
        let big = "a".repeat((MAX_FILE_SIZE + 1) as usize);
        let err = ns.write("big.txt", &big).await.unwrap_err();
        assert_eq!(err.kind(), automatosx_types::ErrorKind::FileTooLarge);
    }

    #[tokio::test]
    async fn list_returns_all_files_sorted() {
        let root = TempDir::new().unwrap();
        let ns = Namespace::new(root.path().to_path_buf());
        ns.write("b.txt", "b").await.unwrap();
        ns.write("a/a.txt", "a").await.unwrap();
        let files = ns.list().await.unwrap();
        assert_eq!(files, vec!["a/a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn cleanup_without_age_filter_removes_everything() {
        let root = TempDir::new().unwrap();
        let ns = Namespace::new(root.path().to_path_buf());
        ns.write("x.txt", "x").await.unwrap();
        ns.write("y.txt", "y").await.unwrap();
        let deleted = ns.cleanup(None).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(ns.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_counts_files_and_bytes() {
        let root = TempDir::new().unwrap();
        let ns = Namespace::new(root.path().to_path_buf());
        ns.write("x.txt", "hello").await.unwrap();
        let stats = ns.stats().await.unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.total_bytes, 5);
    }
}
