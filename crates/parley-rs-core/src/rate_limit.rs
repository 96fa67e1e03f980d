//! Rate limit gate.

use crate::error::GatewayError;
use crate::store::StoreError;
use async_trait::async_trait;
use parley_rs_protocol::{ProjectId, RateLimitStatus, UserId};

#[async_trait]
/// Quota collaborator computing a request's status once, upstream of the gate.
pub trait QuotaSource: Send + Sync {
    async fn current_status(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> Result<RateLimitStatus, StoreError>;
}

/// Pass or reject a request based on its precomputed quota status.
///
/// A missing status is treated like an unrecognized one.
pub fn check(status: Option<RateLimitStatus>) -> Result<(), GatewayError> {
    match status {
        Some(RateLimitStatus::Ok) => Ok(()),
        Some(RateLimitStatus::UserReached) => Err(GatewayError::RateLimitReached),
        Some(RateLimitStatus::ProjectReached) => Err(GatewayError::ProjectRateLimitReached),
        Some(RateLimitStatus::Unknown) => Err(GatewayError::UnknownError(
            "rate limit status unknown".to_string(),
        )),
        None => Err(GatewayError::UnknownError(
            "rate limit status not computed".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_rs_protocol::ErrorKind;
    use pretty_assertions::assert_eq;

    fn outcome(status: Option<RateLimitStatus>) -> Result<(), ErrorKind> {
        check(status).map_err(|err| err.kind())
    }

    #[test]
    fn gate_maps_every_status() {
        assert_eq!(outcome(Some(RateLimitStatus::Ok)), Ok(()));
        assert_eq!(
            outcome(Some(RateLimitStatus::UserReached)),
            Err(ErrorKind::RateLimitReached)
        );
        assert_eq!(
            outcome(Some(RateLimitStatus::ProjectReached)),
            Err(ErrorKind::ProjectRateLimitReached)
        );
        assert_eq!(
            outcome(Some(RateLimitStatus::Unknown)),
            Err(ErrorKind::UnknownError)
        );
        assert_eq!(outcome(None), Err(ErrorKind::UnknownError));
    }
}
