//! Provider-descriptor fixtures: a builder function producing the
//! typed `ProviderDescriptor` the Router needs, for tests that don't
//! care about any particular provider's real configuration.

use automatosx_types::{DetectionHints, ProviderCommand, ProviderDescriptor};
use std::time::Duration;

/// A `ProviderDescriptor` naming `name` as both the provider id and
/// its (never actually invoked, since tests pair this with
/// `MockBackend`) subprocess path.
pub fn mock_provider_descriptor(name: &str, priority: i32) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        priority,
        timeout: Duration::from_secs(5),
        command: ProviderCommand { path: name.to_string(), args: Vec::new() },
        detection: DetectionHints::default(),
        health_check_interval: Duration::from_secs(60),
    }
}
