//! Minimal cooperative-cancellation primitive.
//!
//! Rather than adding `tokio-util` purely for `CancellationToken`, this
//! wraps `tokio::sync::watch<bool>`. Every long operation in the
//! router, delegation engine, and stage controller accepts a `Signal`
//! and checks/races it against its own work.

use tokio::sync::watch;

#[derive(Clone)]
pub struct Signal {
    rx: watch::Receiver<bool>,
}

pub struct SignalSource {
    tx: watch::Sender<bool>,
}

impl SignalSource {
    pub fn new() -> (Self, Signal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Signal { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Signal {
    /// A signal that never cancels, for call sites with no caller-supplied signal.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        rx.into()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is cancelled; intended for use in
    /// `tokio::select!` alongside the work being cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl From<watch::Receiver<bool>> for Signal {
    fn from(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (source, signal) = SignalSource::new();
        assert!(!signal.is_cancelled());
        source.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }
}
