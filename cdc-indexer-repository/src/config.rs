//! Configuration types for the SyncGateway.

use std::time::Duration;

/// Default upper bound on a single index call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the SyncGateway.
///
/// Every call through the gateway is bounded by `request_timeout`; an index
/// call that never returns would otherwise stall the partition it serves.
#[derive(Debug, Clone)]
pub struct SyncGatewayConfig {
    /// Maximum time to wait for the backend to answer one request.
    pub request_timeout: Duration,
}

impl Default for SyncGatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SyncGatewayConfig {
    /// Create a config with a custom request timeout.
    ///
    /// # Arguments
    ///
    /// * `request_timeout` - Maximum time to wait for a single index call
    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}
