//! Health-tracked provider router: priority dispatch, retry/fallback,
//! background health monitoring over opaque subprocess LLM backends.

pub mod backend;
pub mod health;
pub mod retry;
pub mod router;
pub mod signal;

pub use backend::{Backend, MockBackend, ProcessBackend};
pub use health::HealthMonitor;
pub use retry::{classify, Classification, RetryPolicy};
pub use router::Router;
pub use signal::{Signal, SignalSource};
