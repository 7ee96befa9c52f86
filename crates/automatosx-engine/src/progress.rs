//! Progress event fan-out with critical/throttled delivery: a
//! broadcast-style event bus (subscribe/unsubscribe over a shared
//! listener list) with an extra throttle lane for high-volume events.

use automatosx_types::ProgressEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

pub type Listener = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

struct ThrottleLane {
    last_sent: Option<tokio::time::Instant>,
    pending: Option<ProgressEvent>,
    flush_handle: Option<tokio::task::JoinHandle<()>>,
}

/// Delivers `ProgressEvent`s to subscribed listeners. Critical events
/// (`stage-start`, `stage-complete`, `stage-error`, `checkpoint`,
/// `user-prompt`) are delivered immediately; the rest
/// (`stage-progress`, `token-stream`) are throttled so that the first
/// event in a quiet period is immediate and later ones within
/// `throttle_ms` collapse to one delivery per interval.
pub struct ProgressChannel {
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
    throttle: Duration,
    lane: Arc<Mutex<ThrottleLane>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::with_throttle(DEFAULT_THROTTLE)
    }

    pub fn with_throttle(throttle: Duration) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            throttle,
            lane: Arc::new(Mutex::new(ThrottleLane {
                last_sent: None,
                pending: None,
                flush_handle: None,
            })),
        }
    }

    /// Returns a subscription id usable with [`unsubscribe`].
    pub async fn subscribe(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().await.push((id, listener));
        id
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.listeners.lock().await.retain(|(existing, _)| *existing != id);
    }

    /// Drops any pending throttled event without delivering it.
    pub async fn clear(&self) {
        let mut lane = self.lane.lock().await;
        if let Some(handle) = lane.flush_handle.take() {
            handle.abort();
        }
        lane.pending = None;
        lane.last_sent = None;
    }

    pub async fn emit(&self, event: ProgressEvent) {
        if event.is_critical() {
            self.deliver(&event).await;
            return;
        }
        self.emit_throttled(event).await;
    }

    async fn emit_throttled(&self, event: ProgressEvent) {
        let mut lane = self.lane.lock().await;
        let now = tokio::time::Instant::now();
        let due = lane.last_sent.map(|t| now.duration_since(t) >= self.throttle).unwrap_or(true);

        if due {
            lane.last_sent = Some(now);
            lane.pending = None;
            if let Some(handle) = lane.flush_handle.take() {
                handle.abort();
            }
            drop(lane);
            self.deliver(&event).await;
            return;
        }

        lane.pending = Some(event);
        if lane.flush_handle.is_none() {
            let listeners = self.listeners.clone();
            let lane_arc = self.lane.clone();
            let throttle = self.throttle;
            let remaining = lane
                .last_sent
                .map(|t| throttle.saturating_sub(now.duration_since(t)))
                .unwrap_or(Duration::ZERO);
            lane.flush_handle = Some(tokio::spawn(async move {
                tokio::time::sleep(remaining).await;
                let mut lane = lane_arc.lock().await;
                lane.flush_handle = None;
                let Some(event) = lane.pending.take() else {
                    return;
                };
                lane.last_sent = Some(tokio::time::Instant::now());
                drop(lane);
                deliver_to(&listeners, &event).await;
            }));
        }
    }

    async fn deliver(&self, event: &ProgressEvent) {
        deliver_to(&self.listeners, event).await;
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver_to(listeners: &Arc<Mutex<Vec<(u64, Listener)>>>, event: &ProgressEvent) {
    let snapshot: Vec<Listener> = listeners.lock().await.iter().map(|(_, l)| l.clone()).collect();
    for listener in snapshot {
        // Isolate listener panics/errors so one misbehaving subscriber
        // can't interrupt event delivery to the rest.
        let listener = listener.clone();
        let event = event.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&event)));
        if result.is_err() {
            warn!("progress listener panicked; continuing delivery to remaining listeners");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn stage_start() -> ProgressEvent {
        ProgressEvent::StageStart {
            stage_index: 0,
            stage_name: "plan".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn stage_progress(pct: f32) -> ProgressEvent {
        ProgressEvent::StageProgress {
            stage_index: 0,
            stage_name: "plan".to_string(),
            percentage: pct,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn critical_events_deliver_immediately() {
        let channel = ProgressChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        channel
            .subscribe(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        channel.emit(stage_start()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_throttled_event_in_quiet_period_is_immediate() {
        let channel = ProgressChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        channel
            .subscribe(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        channel.emit(stage_progress(1.0)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bursts_within_throttle_window_collapse_to_one_followup() {
        let channel = ProgressChannel::with_throttle(Duration::from_millis(50));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        channel
            .subscribe(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        channel.emit(stage_progress(1.0)).await; // immediate
        channel.emit(stage_progress(2.0)).await; // queued
        channel.emit(stage_progress(3.0)).await; // replaces queued
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_drops_pending_without_delivering() {
        let channel = ProgressChannel::with_throttle(Duration::from_millis(50));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        channel
            .subscribe(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        channel.emit(stage_progress(1.0)).await; // immediate
        channel.emit(stage_progress(2.0)).await; // queued
        channel.clear().await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let channel = ProgressChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = channel
            .subscribe(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        channel.unsubscribe(id).await;
        channel.emit(stage_start()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
