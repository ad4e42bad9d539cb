use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide count of consumer invocations. Cloning shares the count.
#[derive(Debug, Clone, Default)]
pub struct DeliveryCounter {
    value: Arc<AtomicU64>,
}

impl DeliveryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the counter and return the new value.
    pub fn increment_and_get(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}
