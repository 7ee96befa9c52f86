//! Process-wide configuration. Constructed once at the program entry
//! point and threaded through by value; no other function reads
//! environment variables directly.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
    pub mock_providers: bool,
    pub project_root: PathBuf,

    pub max_delegation_depth: usize,
    pub max_concurrent_agents: usize,
    pub continue_delegations_on_failure: bool,

    pub memory_max_entries: u64,
    pub memory_cleanup_batch: u64,
    pub memory_top_k: usize,
    pub memory_char_budget: usize,

    pub availability_ttl: Duration,
    pub throttle_ms: Duration,
    pub progress_update_interval: Duration,
    pub prompt_timeout: Duration,
    pub stage_timeout: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            quiet: false,
            config_path: None,
            mock_providers: false,
            project_root: PathBuf::from("."),

            max_delegation_depth: 2,
            max_concurrent_agents: 4,
            continue_delegations_on_failure: false,

            memory_max_entries: 10_000,
            memory_cleanup_batch: 1_000,
            memory_top_k: 5,
            memory_char_budget: 4000,

            availability_ttl: Duration::from_secs(60),
            throttle_ms: Duration::from_millis(100),
            progress_update_interval: Duration::from_millis(500),
            prompt_timeout: Duration::from_secs(300),
            stage_timeout: Duration::from_secs(120),
            retry_delay: Duration::from_millis(500),
            max_retries: 2,
        }
    }
}

impl Config {
    /// Reads `AUTOMATOSX_DEBUG`, `AUTOMATOSX_QUIET`,
    /// `AUTOMATOSX_CONFIG_PATH`, `AUTOMATOSX_MOCK_PROVIDERS`, and
    /// `AUTOMATOSX_PROJECT_ROOT`, applying the
    /// documented default for every other knob.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.debug = env_flag("AUTOMATOSX_DEBUG");
        config.quiet = env_flag("AUTOMATOSX_QUIET");
        config.mock_providers = env_flag("AUTOMATOSX_MOCK_PROVIDERS");
        config.config_path = std::env::var("AUTOMATOSX_CONFIG_PATH").ok().map(PathBuf::from);
        config.project_root = automatosx_workspace::resolve_project_root(
            std::env::var("AUTOMATOSX_PROJECT_ROOT").ok().as_deref(),
        );
        config
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.project_root.join(".automatosx").join("sessions").join("sessions.json")
    }

    pub fn memory_db_path(&self) -> PathBuf {
        self.project_root.join(".automatosx").join("memory").join("memory.db")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.project_root.join(".automatosx").join("checkpoints")
    }

    /// Root directory a `ProfileLoader`/`AbilityLoader` resolves
    /// `agents/<name>.json` and `abilities/<name>.md` against.
    pub fn agents_root(&self) -> PathBuf {
        self.project_root.join(".automatosx")
    }
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => !matches!(value.as_str(), "" | "0" | "false" | "FALSE" | "False"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let config = Config::default();
        assert_eq!(config.max_delegation_depth, 2);
        assert_eq!(config.memory_max_entries, 10_000);
        assert_eq!(config.memory_cleanup_batch, 1_000);
    }

    #[test]
    fn sessions_and_memory_paths_are_project_scoped() {
        let mut config = Config::default();
        config.project_root = PathBuf::from("/tmp/my-project");
        assert_eq!(
            config.sessions_path(),
            PathBuf::from("/tmp/my-project/.automatosx/sessions/sessions.json")
        );
        assert_eq!(
            config.memory_db_path(),
            PathBuf::from("/tmp/my-project/.automatosx/memory/memory.db")
        );
    }
}
