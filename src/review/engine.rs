use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::review::config::EngineConfig;
use crate::review::difficulty;
use crate::review::mistakes;
use crate::review::sm2;
use crate::review::types::{AttemptEvent, AttemptOutcome, DifficultyRecommendation};
use crate::store::operations::cards::{CardOrigin, ReviewCard};
use crate::store::operations::difficulty::{DifficultyLevel, DifficultyState};
use crate::store::operations::patterns::MistakePattern;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// 可重试错误：调用方从最近的快照重新调用即可，引擎操作在重试下幂等。
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_retryable(),
        }
    }
}

/// Orchestrates the attempt pipeline: difficulty window update, mistake
/// clustering, and interval scheduling, all under a per-learner lock so two
/// rapid submissions for the same learner cannot race a card or pattern.
pub struct ReviewEngine {
    config: Arc<RwLock<EngineConfig>>,
    store: Arc<Store>,
    learner_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ReviewEngine {
    pub fn new(config: EngineConfig, store: Arc<Store>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            store,
            learner_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn reload_config(&self, new_config: EngineConfig) -> Result<(), String> {
        new_config.validate()?;
        let mut cfg = self.config.write().await;
        *cfg = new_config;
        tracing::info!("Engine config reloaded");
        Ok(())
    }

    pub async fn get_config(&self) -> EngineConfig {
        self.config.read().await.clone()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn acquire_learner_lock(&self, learner_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.learner_locks.lock().await;

        // Periodically prune entries that are no longer held by anyone.
        // Arc::strong_count == 1 means only the HashMap holds a reference,
        // so the lock is idle and can be safely removed.
        if locks.len() > 1000 {
            locks.retain(|_, v| Arc::strong_count(v) > 1);
        }

        locks
            .entry(learner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one attempt through the pipeline. The record is appended, the
    /// difficulty window advances, and an incorrect answer feeds the mistake
    /// tracker (which may create or refresh a linked review card).
    pub async fn process_attempt(&self, event: AttemptEvent) -> Result<AttemptOutcome, EngineError> {
        let learner_lock = self.acquire_learner_lock(&event.learner_id).await;
        let _guard = learner_lock.lock().await;

        let config = self.config.read().await.clone();
        let now = event.timestamp;

        let attempt_id = uuid::Uuid::new_v4().to_string();
        let record = event.into_record(attempt_id.clone());
        self.store.insert_attempt(&record)?;

        let mut difficulty_state = self
            .store
            .get_difficulty_state(&record.learner_id, &record.topic, &record.subject)?
            .unwrap_or_else(|| {
                DifficultyState::new(&record.learner_id, &record.topic, &record.subject)
            });
        difficulty_state.push_outcome(record.is_correct, config.difficulty.window_size);

        let recommended_level = difficulty::recommend(
            &difficulty_state.recent_window,
            Some(difficulty_state.current_level),
            &config.difficulty,
        );
        difficulty_state.current_level = recommended_level;
        difficulty_state.updated_at = now;
        self.store.set_difficulty_state(&difficulty_state)?;

        let (pattern, card) = match mistakes::record(&self.store, &record, &config, now)? {
            Some((pattern, card)) => (Some(pattern), card),
            None => (None, None),
        };

        Ok(AttemptOutcome {
            attempt_id,
            recommended_level,
            pattern,
            card,
        })
    }

    /// Apply a raw performance score to a card (manual or system review).
    /// A missing card is not an error: scheduling starts from the default
    /// snapshot.
    pub async fn review_item(
        &self,
        owner_id: &str,
        card_id: &str,
        score: f64,
        now: DateTime<Utc>,
    ) -> Result<ReviewCard, EngineError> {
        let learner_lock = self.acquire_learner_lock(owner_id).await;
        let _guard = learner_lock.lock().await;

        let config = self.config.read().await.clone();
        let quality = sm2::quality_from_score(score);

        let mut card = self
            .store
            .get_review_card(owner_id, card_id)?
            .unwrap_or_else(|| {
                sm2::default_card(card_id, owner_id, CardOrigin::Manual, now, &config.sm2)
            });

        sm2::apply(&mut card, quality, now, &config.sm2);
        self.store.set_review_card(&card)?;
        Ok(card)
    }

    /// Difficulty recommendation without side effects. No prior state means
    /// no evidence: the selector answers `medium`.
    pub fn recommend_difficulty(
        &self,
        learner_id: &str,
        topic: &str,
        subject: &str,
    ) -> Result<DifficultyRecommendation, EngineError> {
        let level = match self.store.get_difficulty_state(learner_id, topic, subject)? {
            Some(state) => state.current_level,
            None => DifficultyLevel::Medium,
        };
        Ok(DifficultyRecommendation { level })
    }

    pub fn due_cards(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewCard>, EngineError> {
        Ok(self.store.get_due_cards(owner_id, now, limit)?)
    }

    pub fn due_for_review(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MistakePattern>, EngineError> {
        Ok(mistakes::due_for_review(&self.store, learner_id, now)?)
    }
}
