//! Provider Router data model.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCommand {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionHints {
    #[serde(default)]
    pub custom_path: Option<String>,
    #[serde(default)]
    pub version_arg: Option<String>,
    #[serde(default)]
    pub min_version: Option<String>,
}

/// Static configuration for a provider. `priority`: smaller
/// is preferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub name: String,
    pub priority: i32,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    pub command: ProviderCommand,
    #[serde(default)]
    pub detection: DetectionHints,
    /// Minimum interval between background health probes for this
    /// provider; the monitor's tick period is the minimum across all
    /// configured providers.
    #[serde(with = "duration_millis")]
    pub health_check_interval: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(v: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(v.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Derived health snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub consecutive_failures: u32,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            available: true,
            latency_ms: 0.0,
            error_rate: 0.0,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: TokenUsage,
    pub latency_ms: f64,
    pub finish_reason: String,
}

/// Aggregate, resettable router metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterMetrics {
    pub checks_performed: u64,
    pub ticks: u64,
    pub avg_tick_duration_ms: f64,
    pub running_success_rate: f64,
    pub uptime_percent: f64,
}
