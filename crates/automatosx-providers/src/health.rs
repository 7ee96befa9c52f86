//! Background health monitor.
//!
//! Probes every configured provider on a single shared tick — the
//! minimum of all providers' `health_check_interval` values — caching
//! each result under an availability TTL so the router's hot path never
//! blocks on a live probe. Owns a `JoinHandle` plus a cancellation
//! channel so the watcher task stops cleanly when the monitor drops.

use crate::backend::Backend;
use automatosx_types::ProviderHealth;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

struct CachedHealth {
    health: ProviderHealth,
    checked_at: Instant,
}

#[derive(Default)]
struct TickStats {
    ticks: AtomicU64,
    total_duration_micros: AtomicU64,
    available_samples: AtomicU64,
    total_samples: AtomicU64,
}

/// Aggregate tick counters surfaced through [`Router::metrics`].
pub struct HealthStats {
    pub ticks: u64,
    pub avg_tick_duration_ms: f64,
    pub uptime_percent: f64,
}

/// Shared health cache plus the background task that keeps it fresh.
pub struct HealthMonitor {
    cache: Arc<RwLock<HashMap<String, CachedHealth>>>,
    availability_ttl: Duration,
    handle: Option<JoinHandle<()>>,
    stats: Arc<TickStats>,
}

impl HealthMonitor {
    /// Probes every backend once (startup warmup), then spawns the
    /// recurring tick task. `tick_interval` should be the minimum of
    /// every provider's configured `health_check_interval`.
    pub async fn start(
        backends: Vec<Arc<dyn Backend>>,
        tick_interval: Duration,
        availability_ttl: Duration,
    ) -> Self {
        let cache: Arc<RwLock<HashMap<String, CachedHealth>>> = Arc::new(RwLock::new(HashMap::new()));
        let stats = Arc::new(TickStats::default());

        probe_all(&backends, &cache, &stats).await;

        let task_backends = backends.clone();
        let task_cache = cache.clone();
        let task_stats = stats.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.tick().await; // first tick fires immediately; warmup already covered it
            loop {
                interval.tick().await;
                probe_all(&task_backends, &task_cache, &task_stats).await;
            }
        });

        Self {
            cache,
            availability_ttl,
            handle: Some(handle),
            stats,
        }
    }

    /// Returns the cached health for `name`, or `None` if never probed
    /// or the cached entry is older than the availability TTL (in which
    /// case callers should treat the provider as unknown, not dead).
    pub async fn health(&self, name: &str) -> Option<ProviderHealth> {
        let cache = self.cache.read().await;
        let entry = cache.get(name)?;
        if entry.checked_at.elapsed() > self.availability_ttl {
            return None;
        }
        Some(entry.health)
    }

    pub async fn all(&self) -> HashMap<String, ProviderHealth> {
        self.cache
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.health))
            .collect()
    }

    /// Tick count, average tick duration, and availability rate across
    /// every probe run so far (warmup plus recurring ticks).
    pub fn stats(&self) -> HealthStats {
        let ticks = self.stats.ticks.load(Ordering::Relaxed);
        let total_micros = self.stats.total_duration_micros.load(Ordering::Relaxed);
        let avg_tick_duration_ms = if ticks == 0 {
            0.0
        } else {
            (total_micros as f64 / ticks as f64) / 1000.0
        };
        let available = self.stats.available_samples.load(Ordering::Relaxed);
        let samples = self.stats.total_samples.load(Ordering::Relaxed);
        let uptime_percent = if samples == 0 {
            100.0
        } else {
            (available as f64 / samples as f64) * 100.0
        };
        HealthStats {
            ticks,
            avg_tick_duration_ms,
            uptime_percent,
        }
    }

    /// Stops the background tick task. Individual probe failures never
    /// panic the task, so this is the only way the monitor stops short
    /// of process exit.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn probe_all(
    backends: &[Arc<dyn Backend>],
    cache: &Arc<RwLock<HashMap<String, CachedHealth>>>,
    stats: &Arc<TickStats>,
) {
    let tick_started = Instant::now();
    let probes = backends.iter().map(|backend| {
        let backend = backend.clone();
        async move {
            let start = Instant::now();
            let available = backend.is_available().await;
            (backend.name().to_string(), available, start.elapsed())
        }
    });
    let results = futures::future::join_all(probes).await;

    let mut guard = cache.write().await;
    let mut available_count = 0u64;
    for (name, available, elapsed) in &results {
        let previous_failures = guard.get(name).map(|c| c.health.consecutive_failures).unwrap_or(0);
        let consecutive_failures = if *available { 0 } else { previous_failures + 1 };
        if *available {
            available_count += 1;
        }
        guard.insert(
            name.clone(),
            CachedHealth {
                health: ProviderHealth {
                    available: *available,
                    latency_ms: elapsed.as_secs_f64() * 1000.0,
                    error_rate: if *available { 0.0 } else { 1.0 },
                    consecutive_failures,
                },
                checked_at: Instant::now(),
            },
        );
    }
    drop(guard);

    stats.ticks.fetch_add(1, Ordering::Relaxed);
    stats
        .total_duration_micros
        .fetch_add(tick_started.elapsed().as_micros() as u64, Ordering::Relaxed);
    stats.available_samples.fetch_add(available_count, Ordering::Relaxed);
    stats.total_samples.fetch_add(results.len() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    #[tokio::test]
    async fn warmup_probes_all_backends_before_returning() {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(MockBackend::new("p1")),
            Arc::new(MockBackend::new("p2")),
        ];
        let mut monitor = HealthMonitor::start(
            backends,
            Duration::from_secs(60),
            Duration::from_secs(30),
        )
        .await;

        assert!(monitor.health("p1").await.unwrap().available);
        assert!(monitor.health("p2").await.unwrap().available);
        monitor.destroy();
    }

    #[tokio::test]
    async fn unavailable_backend_is_reflected_in_cache() {
        let p1 = Arc::new(MockBackend::new("p1"));
        p1.set_available(false);
        let backends: Vec<Arc<dyn Backend>> = vec![p1];
        let mut monitor = HealthMonitor::start(
            backends,
            Duration::from_secs(60),
            Duration::from_secs(30),
        )
        .await;

        let health = monitor.health("p1").await.unwrap();
        assert!(!health.available);
        assert_eq!(health.consecutive_failures, 1);
        monitor.destroy();
    }

    #[tokio::test]
    async fn stale_entries_expire_past_ttl() {
        let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(MockBackend::new("p1"))];
        let mut monitor = HealthMonitor::start(
            backends,
            Duration::from_secs(60),
            Duration::from_millis(1),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(monitor.health("p1").await.is_none());
        monitor.destroy();
    }
}
