use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::operations::attempts::AttemptRecord;
use crate::store::operations::cards::ReviewCard;
use crate::store::operations::difficulty::DifficultyLevel;
use crate::store::operations::patterns::MistakePattern;

/// An answered practice item as handed in by the practice collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEvent {
    pub question_id: String,
    pub learner_id: String,
    pub selected_index: u32,
    pub correct_index: u32,
    pub topic: String,
    pub subject: String,
    pub time_spent_seconds: u32,
    pub timestamp: DateTime<Utc>,
}

impl AttemptEvent {
    pub fn is_correct(&self) -> bool {
        self.selected_index == self.correct_index
    }

    pub fn into_record(self, attempt_id: String) -> AttemptRecord {
        let is_correct = self.is_correct();
        AttemptRecord {
            id: attempt_id,
            question_id: self.question_id,
            learner_id: self.learner_id,
            selected_answer: self.selected_index.to_string(),
            is_correct,
            time_spent_seconds: self.time_spent_seconds,
            topic: self.topic,
            subject: self.subject,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyRecommendation {
    pub level: DifficultyLevel,
}

/// Everything the attempt pipeline decided for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub attempt_id: String,
    pub recommended_level: DifficultyLevel,
    pub pattern: Option<MistakePattern>,
    pub card: Option<ReviewCard>,
}
