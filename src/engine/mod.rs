pub mod guards;
pub mod reporter;
pub mod signal_engine;
pub mod tracker;

pub use guards::{GuardPipeline, NewBarMemory};
pub use reporter::Reporter;
pub use signal_engine::SignalEngine;
pub use tracker::OrderLifecycleTracker;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-symbol root notification message id. Written by the engine at
/// signal creation, read by the tracker at closure; single writer per
/// field, so no further coordination is needed. Process-lifetime only.
pub type ThreadIndex = Arc<RwLock<HashMap<String, i64>>>;

pub fn new_thread_index() -> ThreadIndex {
    Arc::new(RwLock::new(HashMap::new()))
}
