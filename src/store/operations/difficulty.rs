use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub fn promote(self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            Self::Medium | Self::Hard => Self::Hard,
        }
    }

    pub fn demote(self) -> Self {
        match self {
            Self::Hard => Self::Medium,
            Self::Medium | Self::Easy => Self::Easy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// Recent correctness window for one (learner, topic, subject), newest
/// first, bounded by the difficulty window config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyState {
    pub learner_id: String,
    pub topic: String,
    pub subject: String,
    pub current_level: DifficultyLevel,
    pub recent_window: Vec<bool>,
    pub updated_at: DateTime<Utc>,
}

impl DifficultyState {
    pub fn new(learner_id: &str, topic: &str, subject: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            topic: topic.to_string(),
            subject: subject.to_string(),
            current_level: DifficultyLevel::Medium,
            recent_window: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Push the newest outcome at the front, truncating to `window_size`.
    pub fn push_outcome(&mut self, is_correct: bool, window_size: usize) {
        self.recent_window.insert(0, is_correct);
        self.recent_window.truncate(window_size);
    }
}

impl Store {
    pub fn get_difficulty_state(
        &self,
        learner_id: &str,
        topic: &str,
        subject: &str,
    ) -> Result<Option<DifficultyState>, StoreError> {
        let key = keys::difficulty_key(learner_id, topic, subject)?;
        match self.difficulty_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_difficulty_state(&self, state: &DifficultyState) -> Result<(), StoreError> {
        let key = keys::difficulty_key(&state.learner_id, &state.topic, &state.subject)?;
        self.difficulty_states
            .insert(key.as_bytes(), Self::serialize(state)?)?;
        Ok(())
    }
}
