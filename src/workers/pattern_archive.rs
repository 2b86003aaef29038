//! Daily mastery pass: patterns whose linked card has accumulated enough
//! successful repetitions stop resurfacing. The threshold is configuration,
//! not a constant.

use crate::review::engine::ReviewEngine;
use crate::store::operations::patterns::MistakePattern;
use crate::store::Store;

pub async fn run(store: &Store, engine: &ReviewEngine) {
    tracing::info!("Pattern archive worker running");

    let config = engine.get_config().await;
    let min_repetitions = config.archive.min_linked_repetitions;
    let mut archived = 0u32;

    for item in store.mistake_patterns.iter() {
        let (_, raw) = match item {
            Ok(kv) => kv,
            Err(e) => {
                tracing::warn!(error = %e, "Error scanning mistake patterns");
                continue;
            }
        };
        let pattern: MistakePattern = match serde_json::from_slice(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable mistake pattern");
                continue;
            }
        };

        if pattern.archived {
            continue;
        }
        let Some(card_id) = &pattern.linked_card_id else {
            continue;
        };

        let card = match store.get_review_card(&pattern.learner_id, card_id) {
            Ok(Some(card)) => card,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Pattern archive: failed to read linked card");
                continue;
            }
        };

        if card.repetitions >= min_repetitions {
            match store.archive_mistake_pattern(&pattern.learner_id, &pattern.topic, &pattern.subject)
            {
                Ok(()) => archived += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Pattern archive: failed to archive pattern");
                }
            }
        }
    }

    tracing::info!(archived, min_repetitions, "Pattern archive complete");
}
