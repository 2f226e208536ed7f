//! Per-operation deadlines.
//!
//! `with_timeout` races a future against a timer owned by the caller, so the
//! deadline holds even if the transport ignores its own timeout. On expiry
//! the future is dropped; work already handed to the OS may still finish, but
//! its result is discarded. Each call has its own timer, so one expiry never
//! touches sibling operations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ApiError;

pub async fn with_timeout<T, F>(label: &str, deadline: Duration, operation: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation = label, deadline_ms = deadline.as_millis() as u64, "deadline exceeded");
            Err(ApiError::timeout(label, deadline))
        }
    }
}
