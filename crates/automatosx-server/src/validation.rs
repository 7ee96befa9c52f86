//! Tool-argument validation: standalone checks run before a tool
//! handler is invoked rather than folded into deserialization, so a
//! rejection always carries a clear, field-specific message.

use automatosx_types::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static AGENT_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,100}$").expect("valid regex"));

pub fn validate_agent_name(name: &str) -> Result<()> {
    if AGENT_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::invalid_params(format!(
            "agent name '{name}' does not match ^[A-Za-z0-9_-]{{1,100}}$"
        )))
    }
}

/// Rejects NUL bytes and other C0 control characters besides plain
/// whitespace.
pub fn reject_suspicious_characters(field: &str, value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(Error::invalid_params(format!("{field} must not contain NUL bytes")));
    }
    if value.chars().any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r') {
        return Err(Error::invalid_params(format!("{field} contains disallowed control characters")));
    }
    Ok(())
}

/// Rejects absolute paths and `..` traversal in a relative file
/// argument. No current tool in the surface takes a raw file path, but
/// the check is exposed here as the single place new tools (workspace
/// read/write, say) would route through.
pub fn reject_path_traversal(field: &str, value: &str) -> Result<()> {
    let path = std::path::Path::new(value);
    if path.is_absolute() {
        return Err(Error::path_invalid(value, &format!("{field} must be a relative path")));
    }
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(Error::path_traversal(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_name_accepts_typical_identifiers() {
        assert!(validate_agent_name("writer").is_ok());
        assert!(validate_agent_name("code-review_2").is_ok());
    }

    #[test]
    fn agent_name_rejects_empty_and_overlong_and_weird_chars() {
        assert!(validate_agent_name("").is_err());
        assert!(validate_agent_name("a b").is_err());
        assert!(validate_agent_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn rejects_nul_and_control_characters() {
        assert!(reject_suspicious_characters("task", "hello\0world").is_err());
        assert!(reject_suspicious_characters("task", "hello\x07world").is_err());
        assert!(reject_suspicious_characters("task", "hello\nworld").is_ok());
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(reject_path_traversal("path", "../escape").is_err());
        assert!(reject_path_traversal("path", "/etc/passwd").is_err());
        assert!(reject_path_traversal("path", "a/b.md").is_ok());
    }
}
