//! Mistake clustering and re-practice wiring. Incorrect attempts aggregate
//! into patterns keyed by exact (learner, topic, subject); a qualifying
//! pattern is handed to the interval scheduler as a fresh failure so the
//! item resurfaces on the next due cycle instead of being forgotten.

use chrono::{DateTime, Utc};

use crate::review::config::EngineConfig;
use crate::review::sm2;
use crate::store::operations::attempts::AttemptRecord;
use crate::store::operations::cards::{CardOrigin, ReviewCard};
use crate::store::operations::patterns::MistakePattern;
use crate::store::{Store, StoreError};

/// Record an incorrect attempt against its pattern. Correct attempts are
/// ignored here (the difficulty selector sees them instead).
pub fn record(
    store: &Store,
    attempt: &AttemptRecord,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<Option<(MistakePattern, Option<ReviewCard>)>, StoreError> {
    if attempt.is_correct {
        return Ok(None);
    }

    let mut pattern = store.upsert_mistake_pattern(attempt, config.mistakes.sample_cap)?;

    let card = if pattern.frequency >= config.mistakes.repractice_threshold {
        let card = refresh_linked_card(store, &pattern, config, now)?;
        if pattern.linked_card_id.as_deref() != Some(card.id.as_str()) {
            store.link_pattern_card(
                &pattern.learner_id,
                &pattern.topic,
                &pattern.subject,
                &card.id,
            )?;
            pattern.linked_card_id = Some(card.id.clone());
        }
        Some(card)
    } else {
        None
    };

    Ok(Some((pattern, card)))
}

/// Create or refresh the card backing a pattern, treating the occurrence
/// as quality 0 (fresh failure): the card collapses to the initial cadence
/// and becomes due on the next cycle.
fn refresh_linked_card(
    store: &Store,
    pattern: &MistakePattern,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<ReviewCard, StoreError> {
    let mut card = match &pattern.linked_card_id {
        Some(card_id) => store
            .get_review_card(&pattern.learner_id, card_id)?
            .unwrap_or_else(|| {
                sm2::default_card(card_id, &pattern.learner_id, CardOrigin::Mistake, now, &config.sm2)
            }),
        None => {
            let card_id = uuid::Uuid::new_v4().to_string();
            sm2::default_card(&card_id, &pattern.learner_id, CardOrigin::Mistake, now, &config.sm2)
        }
    };

    sm2::apply(&mut card, 0, now, &config.sm2);
    store.set_review_card(&card)?;
    Ok(card)
}

/// Patterns whose linked card is due at or before `now`, ordered ascending
/// by due date; ties resolve to the higher frequency so the most persistent
/// mistakes resurface first.
pub fn due_for_review(
    store: &Store,
    learner_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<MistakePattern>, StoreError> {
    let patterns = store.list_mistake_patterns(learner_id, false)?;
    let mut due: Vec<(DateTime<Utc>, MistakePattern)> = Vec::new();

    for pattern in patterns {
        let Some(card_id) = &pattern.linked_card_id else {
            continue;
        };
        let Some(card) = store.get_review_card(learner_id, card_id)? else {
            continue;
        };
        if card.due_at <= now {
            due.push((card.due_at, pattern));
        }
    }

    due.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.frequency.cmp(&a.1.frequency)));
    Ok(due.into_iter().map(|(_, pattern)| pattern).collect())
}
