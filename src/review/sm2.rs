//! SM-2 interval scheduling. Pure functions over a card snapshot; the
//! caller persists the result.

use chrono::{DateTime, Duration, Utc};

use crate::review::config::Sm2Config;
use crate::store::operations::cards::{CardOrigin, ReviewCard};

/// Map a raw performance score onto the 0..=5 quality scale. Out-of-range
/// input is clamped and logged, never rejected.
pub fn quality_from_score(score: f64) -> u8 {
    if !(0.0..=5.0).contains(&score) || score.is_nan() {
        tracing::warn!(score, "Performance score out of range, clamping to [0,5]");
    }
    let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 5.0) };

    if score <= 0.0 {
        0
    } else if score <= 1.0 {
        1
    } else if score <= 2.0 {
        2
    } else if score <= 3.0 {
        3
    } else if score <= 4.0 {
        4
    } else {
        5
    }
}

/// EF' = EF + (0.1 − (5−q)·(0.08 + (5−q)·0.02)), floored at `min_ease`.
/// No upper bound: sustained perfect recall keeps widening intervals.
pub fn next_ease_factor(ease_factor: f64, quality: u8, config: &Sm2Config) -> f64 {
    let q = quality.min(5) as f64;
    let updated = ease_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02));
    round2(updated.max(config.min_ease))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fresh card state before its first quality update.
pub fn default_card(
    card_id: &str,
    owner_id: &str,
    origin: CardOrigin,
    now: DateTime<Utc>,
    config: &Sm2Config,
) -> ReviewCard {
    ReviewCard {
        id: card_id.to_string(),
        owner_id: owner_id.to_string(),
        ease_factor: config.initial_ease,
        interval_days: config.first_interval_days,
        repetitions: 0,
        due_at: now,
        last_reviewed_at: None,
        origin,
        updated_at: now,
    }
}

/// Apply one observed quality to a card.
///
/// q < 3 is a full regression: interval and repetitions reset to the
/// initial cadence. Recency of forgetting outweighs sunk progress.
pub fn apply(card: &mut ReviewCard, quality: u8, now: DateTime<Utc>, config: &Sm2Config) {
    let quality = quality.min(5);
    let new_ease = next_ease_factor(card.ease_factor, quality, config);

    if quality < 3 {
        card.interval_days = config.first_interval_days;
        card.repetitions = 0;
    } else {
        card.interval_days = if card.repetitions == 0 {
            config.first_interval_days
        } else if card.repetitions == 1 {
            config.second_interval_days
        } else {
            (card.interval_days as f64 * new_ease).round().max(1.0) as u32
        };
        card.repetitions += 1;
    }

    card.ease_factor = new_ease;
    card.due_at = now + Duration::days(card.interval_days as i64);
    card.last_reviewed_at = Some(now);
    card.updated_at = now;
}
