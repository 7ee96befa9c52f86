//! Process entry point library. Split from `main.rs` so the startup
//! sequence is unit-testable without spawning a process — reading
//! only the environment, with no argument-parsing surface.

use automatosx_runtime::Config;
use automatosx_server::{run_server, Server, ServerDeps};
use automatosx_types::{DetectionHints, ProviderCommand, ProviderDescriptor, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Installs a process-wide `tracing` subscriber writing to stderr —
/// stdout is reserved for the JSON-RPC response stream —
/// filtered by `RUST_LOG` when set, else by `AUTOMATOSX_DEBUG` /
/// `AUTOMATOSX_QUIET`.
pub fn init_logging(config: &Config) {
    let default_level = if config.quiet {
        "warn"
    } else if config.debug {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// The default provider set a fresh project starts with: the common
/// external agent CLIs AutomatosX wraps, each invoked as an opaque
/// subprocess. Provider-config *file* discovery is out of
/// scope, so this fixed table is what `Config` has to offer
/// the Router until a caller supplies its own descriptors.
pub fn default_providers() -> Vec<ProviderDescriptor> {
    [("claude", 0), ("gemini", 1), ("codex", 2)]
        .into_iter()
        .map(|(name, priority)| ProviderDescriptor {
            name: name.to_string(),
            priority,
            timeout: Duration::from_secs(120),
            command: ProviderCommand { path: name.to_string(), args: Vec::new() },
            detection: DetectionHints::default(),
            health_check_interval: Duration::from_secs(30),
        })
        .collect()
}

/// Builds `Config` and the default provider set from the environment,
/// installs logging, and runs the stdio server until SIGINT/SIGTERM.
pub async fn run() -> Result<()> {
    let config = Config::from_env();
    init_logging(&config);

    tracing::info!(
        project_root = %config.project_root.display(),
        mock_providers = config.mock_providers,
        "starting automatosx server"
    );

    let deps = ServerDeps { providers: default_providers(), fallback_enabled: true, config };
    let server = Arc::new(Server::new(deps));
    run_server(server).await
}
