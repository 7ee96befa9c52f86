//! Relative-path validation shared by the `PRD/` and `tmp/` namespaces:
//! resolve the candidate path, then compare it against its namespace
//! root to reject any escape via `..` or a symlink.

use automatosx_types::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Validates `rel_path` against `namespace_root` and returns the
/// resolved absolute path. Does not touch the filesystem beyond
/// `canonicalize`-style normalization of `namespace_root` itself.
pub fn resolve_in_namespace(namespace_root: &Path, rel_path: &str) -> Result<PathBuf> {
    if rel_path.is_empty() {
        return Err(Error::path_invalid(rel_path, "path must not be empty"));
    }
    if rel_path.contains('\0') {
        return Err(Error::path_invalid(rel_path, "path must not contain NUL bytes"));
    }

    let candidate = Path::new(rel_path);
    if candidate.is_absolute() {
        return Err(Error::path_invalid(rel_path, "path must be relative"));
    }

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(Error::path_traversal(rel_path)),
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::path_invalid(rel_path, "path must be relative"))
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::path_invalid(rel_path, "path must not resolve to the namespace root itself"));
    }

    let resolved = namespace_root.join(&normalized);

    // Symlinks must not escape the namespace: canonicalize whatever
    // already exists and confirm it is still rooted under the
    // namespace. Paths that don't exist yet (a pending write) can't be
    // canonicalized, so only existing ancestors are checked.
    if let Ok(canonical_root) = namespace_root.canonicalize() {
        let mut check = resolved.clone();
        while !check.exists() {
            match check.parent() {
                Some(parent) => check = parent.to_path_buf(),
                None => break,
            }
        }
        if let Ok(canonical_existing) = check.canonicalize() {
            if !canonical_existing.starts_with(&canonical_root) {
                return Err(Error::path_traversal(rel_path));
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_empty_and_absolute_paths() {
        let root = TempDir::new().unwrap();
        assert!(resolve_in_namespace(root.path(), "").is_err());
        assert!(resolve_in_namespace(root.path(), "/etc/passwd").is_err());
    }

    #[test]
    fn rejects_parent_dir_components() {
        let root = TempDir::new().unwrap();
        assert!(resolve_in_namespace(root.path(), "../outside").is_err());
        assert!(resolve_in_namespace(root.path(), "a/../../b").is_err());
    }

    #[test]
    fn rejects_current_dir_alone() {
        let root = TempDir::new().unwrap();
        assert!(resolve_in_namespace(root.path(), ".").is_err());
    }

    #[test]
    fn accepts_nested_relative_path() {
        let root = TempDir::new().unwrap();
        let resolved = resolve_in_namespace(root.path(), "a/b/c.md").unwrap();
        assert_eq!(resolved, root.path().join("a/b/c.md"));
    }

    #[test]
    fn rejects_symlink_escape() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"nope").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(outside.path(), root.path().join("escape")).unwrap();

        #[cfg(unix)]
        assert!(resolve_in_namespace(root.path(), "escape/secret.txt").is_err());
    }
}
