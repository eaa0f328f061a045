//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter. Only the startup
//! connection check retries; migration phases never do.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::cluster::ClusterError;

/// Backoff for waiting on the cluster at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Jitter enabled
pub fn connection_backoff(max_times: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(max_times)
        .with_jitter()
}

/// Determines if a cluster error may clear up by itself.
///
/// Retryable:
/// - connection refused / reset, request timeouts
/// - `429 Too Many Requests` and any 5xx status
///
/// Everything else (4xx, malformed responses) will fail the same way again.
pub fn is_retryable(error: &ClusterError) -> bool {
    match error {
        ClusterError::Http(e) => e.is_connect() || e.is_timeout(),
        ClusterError::Status { status, .. } => *status == 429 || (500..600).contains(status),
        ClusterError::Serialization(_)
        | ClusterError::UnexpectedResponse(_)
        | ClusterError::ScrollNotFound(_) => false,
    }
}
