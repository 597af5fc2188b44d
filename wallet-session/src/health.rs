// wallet-session/src/health.rs
use common::{HealthCheckConfig, HealthResponse};
use std::time::Duration;

use crate::api::ApiClient;
use crate::error::WalletError;

/// How hard to try before declaring the backend unavailable
#[derive(Debug, Clone)]
pub struct ProbePolicy {
    pub attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Duration,
}

impl From<&HealthCheckConfig> for ProbePolicy {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            backoff: config.backoff(),
        }
    }
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self::from(&HealthCheckConfig::default())
    }
}

impl ProbePolicy {
    /// Delay after failed attempt `n` (1-based) grows linearly
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Check the backend is up, retrying with back-off.
///
/// Each attempt is cut off after `attempt_timeout`; once every attempt has
/// failed the probe gives up with `BackendUnavailable`.
pub async fn probe_backend(api: &ApiClient, policy: &ProbePolicy) -> Result<HealthResponse, WalletError> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        tracing::debug!("Backend health check attempt {}/{}", attempt, attempts);

        match tokio::time::timeout(policy.attempt_timeout, api.health()).await {
            Ok(Ok(health)) => {
                tracing::info!("Backend reachable (status: {})", health.status);
                return Ok(health);
            },
            Ok(Err(e)) => {
                tracing::warn!("Backend health check attempt {} failed: {}", attempt, e);
            },
            Err(_) => {
                tracing::warn!(
                    "Backend health check attempt {} timed out after {:?}",
                    attempt,
                    policy.attempt_timeout
                );
            },
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    tracing::error!("Backend unreachable after {} attempts", attempts);
    Err(WalletError::BackendUnavailable)
}
