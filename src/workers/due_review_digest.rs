//! Daily scan for learners with overdue review cards; writes one in-app
//! digest notification per learner, deduplicated over a rolling window.

use std::collections::HashMap;

use crate::constants::{DIGEST_DEDUP_WINDOW_HOURS, MILLIS_PER_HOUR};
use crate::store::operations::cards::ReviewCard;
use crate::store::operations::notifications::{Notification, NotificationKind};
use crate::store::Store;

pub async fn run(store: &Store) {
    tracing::info!("Due review digest worker running");

    let now = chrono::Utc::now();
    let now_ms = now.timestamp_millis().max(0);
    let cutoff_ms = now_ms - DIGEST_DEDUP_WINDOW_HOURS * MILLIS_PER_HOUR;

    let mut due_counts: HashMap<String, u64> = HashMap::new();
    for item in store.review_cards.iter() {
        let (_, raw) = match item {
            Ok(kv) => kv,
            Err(e) => {
                tracing::warn!(error = %e, "Error scanning review cards");
                continue;
            }
        };
        let card: ReviewCard = match serde_json::from_slice(&raw) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable review card");
                continue;
            }
        };
        if card.due_at <= now {
            *due_counts.entry(card.owner_id).or_insert(0) += 1;
        }
    }

    let mut notified = 0u32;
    let mut skipped_dedup = 0u32;

    for (learner_id, due_count) in &due_counts {
        let dedup_key = match crate::store::keys::digest_dedup_key(learner_id, "daily") {
            Ok(k) => k,
            Err(_) => continue,
        };

        if let Ok(Some(ts_bytes)) = store.digest_dedup.get(dedup_key.as_bytes()) {
            if let Ok(ts_str) = std::str::from_utf8(&ts_bytes) {
                if let Ok(prev_ms) = ts_str.parse::<i64>() {
                    if prev_ms >= cutoff_ms {
                        skipped_dedup += 1;
                        continue;
                    }
                }
            }
        }

        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: learner_id.clone(),
            kind: NotificationKind::DueReviewDigest,
            title: "Reviews waiting".to_string(),
            body: format!("{due_count} items are due for review"),
            read: false,
            created_at: now,
        };

        if let Err(e) = store.insert_notification(&notification) {
            tracing::warn!(error = %e, "Failed to insert due review digest");
            continue;
        }

        let _ = store
            .digest_dedup
            .insert(dedup_key.as_bytes(), now_ms.to_string().as_bytes());
        notified += 1;
    }

    if skipped_dedup > 0 {
        tracing::info!(skipped_dedup, "Due review digest: skipped duplicates");
    }
    tracing::info!(notified, "Due review digest: learners notified");
}
