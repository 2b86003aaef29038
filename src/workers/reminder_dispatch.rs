//! Periodic reminder dispatch sweep. Each (task, offset) claim is exclusive,
//! so running this from several workers at once cannot duplicate a send.

use crate::dispatch::gateway::{DeliveryGateway, RetryPolicy};
use crate::dispatch::sweep;
use crate::store::Store;

pub async fn run(store: &Store, gateway: &dyn DeliveryGateway, retry_policy: &RetryPolicy) {
    tracing::info!("Reminder dispatch worker running");

    let now = chrono::Utc::now();
    match sweep::run_sweep(store, gateway, retry_policy, now).await {
        Ok(stats) => {
            tracing::info!(
                examined = stats.examined,
                dispatched = stats.dispatched,
                failed = stats.failed,
                expired = stats.expired,
                skipped_claimed = stats.skipped_claimed,
                "Reminder dispatch sweep complete"
            );
        }
        Err(e) => {
            // 可重试错误留到下一轮扫描；本轮不中断进程
            tracing::warn!(error = %e, retryable = e.is_retryable(), "Reminder dispatch sweep failed");
        }
    }
}
