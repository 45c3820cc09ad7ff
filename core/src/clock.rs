/// Network-adjusted clock used for envelope timestamps
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct NetworkClock {
    offset_ms: Arc<AtomicI64>,
}

impl NetworkClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the relays' clock against ours, as observed on the last response
    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Relaxed);
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    pub fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() + self.offset_ms()
    }
}
