use std::time::Duration;

use cms_core::WebhookSettings;

/// Bounds for redelivering a webhook after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&WebhookSettings::default())
    }
}

impl From<&WebhookSettings> for RetryPolicy {
    fn from(settings: &WebhookSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_backoff: settings.base_backoff,
            max_backoff: settings.max_backoff,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before attempt `attempt + 1`, given `attempt` already failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_backoff.saturating_mul(factor), self.max_backoff)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
