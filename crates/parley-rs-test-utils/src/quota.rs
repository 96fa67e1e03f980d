use async_trait::async_trait;
use parley_rs_core::{QuotaSource, StoreError};
use parley_rs_protocol::{ProjectId, RateLimitStatus, UserId};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct StubQuota {
    status: RateLimitStatus,
    calls: AtomicU32,
}

impl StubQuota {
    pub fn new(status: RateLimitStatus) -> Self {
        Self {
            status,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaSource for StubQuota {
    async fn current_status(
        &self,
        _user_id: &UserId,
        _project_id: &ProjectId,
    ) -> Result<RateLimitStatus, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status)
    }
}

#[derive(Debug, Default)]
pub struct FailingQuota;

#[async_trait]
impl QuotaSource for FailingQuota {
    async fn current_status(
        &self,
        _user_id: &UserId,
        _project_id: &ProjectId,
    ) -> Result<RateLimitStatus, StoreError> {
        Err(StoreError::Unavailable("quota backend down".to_string()))
    }
}
