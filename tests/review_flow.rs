mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::fixtures::{attempt_event, setup_store};
use review_engine::review::config::EngineConfig;
use review_engine::review::engine::ReviewEngine;
use review_engine::review::sm2::next_ease_factor;
use review_engine::store::operations::cards::{CardOrigin, ReviewCard};
use review_engine::store::operations::difficulty::DifficultyLevel;

fn setup_engine(db_name: &str) -> (tempfile::TempDir, ReviewEngine) {
    let (dir, store) = setup_store(db_name);
    (dir, ReviewEngine::new(EngineConfig::default(), store))
}

#[tokio::test]
async fn perfect_reviews_walk_one_six_then_ease_product() {
    let (_dir, engine) = setup_engine("flow1.sled");
    let config = EngineConfig::default();

    let first = engine.review_item("l1", "card-1", 5.0, Utc::now()).await.unwrap();
    assert_eq!(first.interval_days, 1);

    let second = engine.review_item("l1", "card-1", 5.0, Utc::now()).await.unwrap();
    assert_eq!(second.interval_days, 6);

    let third = engine.review_item("l1", "card-1", 5.0, Utc::now()).await.unwrap();
    let expected = (6.0 * next_ease_factor(second.ease_factor, 5, &config.sm2)).round() as u32;
    assert_eq!(third.interval_days, expected);
    assert!(third.interval_days > 6);
    assert_eq!(third.repetitions, 3);
}

#[tokio::test]
async fn single_failure_collapses_a_seasoned_card() {
    let (_dir, engine) = setup_engine("flow2.sled");
    let now = Utc::now();

    let seasoned = ReviewCard {
        id: "card-1".to_string(),
        owner_id: "l1".to_string(),
        ease_factor: 2.0,
        interval_days: 10,
        repetitions: 3,
        due_at: now + Duration::days(10),
        last_reviewed_at: Some(now),
        origin: CardOrigin::Manual,
        updated_at: now,
    };
    engine.store().set_review_card(&seasoned).unwrap();

    let collapsed = engine.review_item("l1", "card-1", 1.0, now).await.unwrap();
    assert_eq!(collapsed.interval_days, 1);
    assert_eq!(collapsed.repetitions, 0);
    assert!(collapsed.ease_factor >= 1.3);
    assert_eq!(collapsed.due_at, now + Duration::days(1));
}

#[tokio::test]
async fn repeated_mistakes_accumulate_and_resurface_in_order() {
    let (_dir, engine) = setup_engine("flow3.sled");

    // 两个主题都答错；fractions 错得更频繁
    let mut last_frequency = 0;
    for i in 0..3 {
        let outcome = engine
            .process_attempt(attempt_event("l1", &format!("qf{i}"), "fractions", false))
            .await
            .unwrap();
        let pattern = outcome.pattern.unwrap();
        assert!(pattern.frequency > last_frequency);
        last_frequency = pattern.frequency;
    }
    engine
        .process_attempt(attempt_event("l1", "qa0", "algebra", false))
        .await
        .unwrap();

    let due = engine
        .due_for_review("l1", Utc::now() + Duration::days(2))
        .unwrap();
    assert_eq!(due.len(), 2);
    // fractions 最后一次刷新早于 algebra，到期更早，排前
    assert_eq!(due[0].topic, "fractions");
    assert_eq!(due[0].frequency, 3);
    assert_eq!(due[1].topic, "algebra");
}

#[tokio::test]
async fn due_cards_surface_through_the_engine() {
    let (_dir, engine) = setup_engine("flow4.sled");

    engine
        .process_attempt(attempt_event("l1", "q1", "fractions", false))
        .await
        .unwrap();

    assert!(engine.due_cards("l1", Utc::now(), 10).unwrap().is_empty());

    let due = engine
        .due_cards("l1", Utc::now() + Duration::days(2), 10)
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].origin, CardOrigin::Mistake);
}

#[tokio::test]
async fn difficulty_promotes_then_demotes() {
    let (_dir, engine) = setup_engine("flow5.sled");

    for i in 0..10 {
        engine
            .process_attempt(attempt_event("l1", &format!("q{i}"), "algebra", true))
            .await
            .unwrap();
    }
    let rec = engine.recommend_difficulty("l1", "algebra", "math").unwrap();
    assert_eq!(rec.level, DifficultyLevel::Hard);

    let mut last = rec.level;
    for i in 10..20 {
        let outcome = engine
            .process_attempt(attempt_event("l1", &format!("q{i}"), "algebra", false))
            .await
            .unwrap();
        last = outcome.recommended_level;
    }
    assert_eq!(last, DifficultyLevel::Easy);
}

#[tokio::test]
async fn attempts_are_recorded_immutably() {
    let (_dir, store) = setup_store("flow6.sled");
    let engine = Arc::new(ReviewEngine::new(EngineConfig::default(), store.clone()));

    for i in 0..4 {
        engine
            .process_attempt(attempt_event("l1", &format!("q{i}"), "algebra", i % 2 == 0))
            .await
            .unwrap();
    }

    let attempts = store.list_recent_attempts("l1", 10).unwrap();
    assert_eq!(attempts.len(), 4);
}
