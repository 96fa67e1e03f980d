use parley_rs_core::{RequestLog, StoreError, UsageRecorder};
use std::sync::atomic::{AtomicU32, Ordering};

/// Usage sink whose backend is always down.
#[derive(Debug, Default)]
pub struct FailingUsage {
    calls: AtomicU32,
}

impl FailingUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UsageRecorder for FailingUsage {
    fn log_request(&self, _entry: &RequestLog) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("billing backend down".to_string()))
    }
}
