//! Delivery gateway seam. The engine decides channel and timing; actual
//! delivery belongs to an external collaborator behind this trait. The
//! client is constructed once and injected, never looked up globally.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::DeliveryEnvConfig;
use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS, DEFAULT_DELIVERY_ATTEMPTS,
};
use crate::store::operations::reminders::{Channel, ChannelResult};

/// Payload handed to the gateway for one (task, offset, channel) dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderNotice {
    pub task_id: String,
    pub owner_id: String,
    pub offset_hours: i64,
    pub deadline: DateTime<Utc>,
    pub value_score: f64,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery timed out")]
    Timeout,
    #[error("channel {channel} rejected notice: {message}")]
    Rejected { channel: &'static str, message: String },
    #[error("delivery network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn deliver(&self, channel: Channel, notice: &ReminderNotice)
        -> Result<(), DeliveryError>;
}

/// Stand-in gateway that logs instead of delivering. Used while no real
/// provider is wired up.
#[derive(Debug, Default)]
pub struct LogGateway;

#[async_trait]
impl DeliveryGateway for LogGateway {
    async fn deliver(
        &self,
        channel: Channel,
        notice: &ReminderNotice,
    ) -> Result<(), DeliveryError> {
        tracing::info!(
            task_id = %notice.task_id,
            channel = channel.as_str(),
            offset_hours = notice.offset_hours,
            "Mock delivery"
        );
        Ok(())
    }
}

/// In-memory gateway for tests: records every delivery and fails the
/// channels it is told to fail.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    delivered: Mutex<Vec<(Channel, ReminderNotice)>>,
    failing: Mutex<HashSet<Channel>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_channel(&self, channel: Channel) {
        self.failing.lock().expect("failing lock").insert(channel);
    }

    pub fn heal_channel(&self, channel: Channel) {
        self.failing.lock().expect("failing lock").remove(&channel);
    }

    pub fn delivered(&self) -> Vec<(Channel, ReminderNotice)> {
        self.delivered.lock().expect("delivered lock").clone()
    }

    pub fn delivered_count(&self, channel: Channel) -> usize {
        self.delivered
            .lock()
            .expect("delivered lock")
            .iter()
            .filter(|(c, _)| *c == channel)
            .count()
    }
}

#[async_trait]
impl DeliveryGateway for MemoryGateway {
    async fn deliver(
        &self,
        channel: Channel,
        notice: &ReminderNotice,
    ) -> Result<(), DeliveryError> {
        if self.failing.lock().expect("failing lock").contains(&channel) {
            return Err(DeliveryError::Network(format!(
                "scripted failure for {}",
                channel.as_str()
            )));
        }
        self.delivered
            .lock()
            .expect("delivered lock")
            .push((channel, notice.clone()));
        Ok(())
    }
}

/// Validate delivery configuration at startup. Panics when `mock=false`
/// since no real provider integration exists yet.
pub fn validate_config(config: &DeliveryEnvConfig) {
    if !config.mock {
        panic!(
            "Invalid delivery configuration: mock=false, but no real delivery \
             provider is integrated. Set DELIVERY_MOCK=true."
        );
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_env(config: &DeliveryEnvConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_DELIVERY_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            timeout: Duration::from_secs(10),
        }
    }
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy
        .backoff_base_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(policy.backoff_cap_ms);
    let jitter = rand::thread_rng().gen_range(0..=policy.backoff_base_ms / 2);
    Duration::from_millis(exp + jitter)
}

/// Deliver on one channel with a timeout and a bounded retry budget.
/// Exhausting the budget marks this channel failed; it never blocks the
/// task's other channels or offsets.
pub async fn deliver_with_retry(
    gateway: &dyn DeliveryGateway,
    policy: &RetryPolicy,
    channel: Channel,
    notice: &ReminderNotice,
) -> ChannelResult {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        let result = tokio::time::timeout(policy.timeout, gateway.deliver(channel, notice)).await;

        match result {
            Ok(Ok(())) => {
                return ChannelResult {
                    channel,
                    success: true,
                    attempts: attempt,
                    error: None,
                };
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    task_id = %notice.task_id,
                    channel = channel.as_str(),
                    attempt,
                    error = %error,
                    "Delivery attempt failed"
                );
                last_error = Some(error.to_string());
            }
            Err(_) => {
                tracing::warn!(
                    task_id = %notice.task_id,
                    channel = channel.as_str(),
                    attempt,
                    timeout_secs = policy.timeout.as_secs(),
                    "Delivery attempt timed out"
                );
                last_error = Some(DeliveryError::Timeout.to_string());
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(backoff_delay(policy, attempt)).await;
        }
    }

    ChannelResult {
        channel,
        success: false,
        attempts: policy.max_attempts,
        error: last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_notice() -> ReminderNotice {
        ReminderNotice {
            task_id: "t1".to_string(),
            owner_id: "l1".to_string(),
            offset_hours: 2,
            deadline: Utc::now(),
            value_score: 12.0,
            body: "Task due in 2 hours".to_string(),
        }
    }

    #[tokio::test]
    async fn retry_succeeds_on_healthy_channel() {
        let gateway = MemoryGateway::new();
        let policy = RetryPolicy {
            backoff_base_ms: 1,
            backoff_cap_ms: 2,
            ..RetryPolicy::default()
        };

        let result = deliver_with_retry(&gateway, &policy, Channel::Push, &mock_notice()).await;
        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(gateway.delivered_count(Channel::Push), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let gateway = MemoryGateway::new();
        gateway.fail_channel(Channel::Email);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 2,
            ..RetryPolicy::default()
        };

        let result = deliver_with_retry(&gateway, &policy, Channel::Email, &mock_notice()).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert!(result.error.is_some());
        assert_eq!(gateway.delivered_count(Channel::Email), 0);
    }

    #[tokio::test]
    async fn log_gateway_always_succeeds() {
        let gateway = LogGateway;
        let result = gateway.deliver(Channel::Whatsapp, &mock_notice()).await;
        assert!(result.is_ok());
    }
}
