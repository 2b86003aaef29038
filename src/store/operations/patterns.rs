use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::operations::attempts::AttemptRecord;
use crate::store::{Store, StoreError};

/// Bounded excerpt of an incorrect attempt kept on its pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSample {
    pub attempt_id: String,
    pub question_id: String,
    pub selected_answer: String,
    pub occurred_at: DateTime<Utc>,
}

impl AttemptSample {
    pub fn from_attempt(attempt: &AttemptRecord) -> Self {
        Self {
            attempt_id: attempt.id.clone(),
            question_id: attempt.question_id.clone(),
            selected_answer: attempt.selected_answer.clone(),
            occurred_at: attempt.timestamp,
        }
    }
}

/// Aggregated record of repeated incorrect attempts on one exact
/// (learner, topic, subject) cluster. Frequency never decreases while the
/// pattern is active; archival flips a flag instead of deleting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakePattern {
    pub learner_id: String,
    pub topic: String,
    pub subject: String,
    pub frequency: u32,
    pub last_occurred: DateTime<Utc>,
    pub sample_attempts: Vec<AttemptSample>,
    pub linked_card_id: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn get_mistake_pattern(
        &self,
        learner_id: &str,
        topic: &str,
        subject: &str,
    ) -> Result<Option<MistakePattern>, StoreError> {
        let key = keys::pattern_key(learner_id, topic, subject)?;
        match self.mistake_patterns.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Create the pattern on first occurrence, otherwise increment its
    /// frequency and append a sample (oldest evicted beyond `sample_cap`).
    ///
    /// 频率递增必须是原子 read-modify-write：并发错误作答下的非原子自增
    /// 会丢失计数并破坏 due_for_review 的平局排序。
    pub fn upsert_mistake_pattern(
        &self,
        attempt: &AttemptRecord,
        sample_cap: usize,
    ) -> Result<MistakePattern, StoreError> {
        let key = keys::pattern_key(&attempt.learner_id, &attempt.topic, &attempt.subject)?;

        for _ in 0..MAX_CAS_RETRIES {
            let current_raw = self.mistake_patterns.get(key.as_bytes())?;

            let next = match &current_raw {
                None => MistakePattern {
                    learner_id: attempt.learner_id.clone(),
                    topic: attempt.topic.clone(),
                    subject: attempt.subject.clone(),
                    frequency: 1,
                    last_occurred: attempt.timestamp,
                    sample_attempts: vec![AttemptSample::from_attempt(attempt)],
                    linked_card_id: None,
                    archived: false,
                    created_at: attempt.timestamp,
                },
                Some(raw) => {
                    let mut pattern: MistakePattern = Self::deserialize(raw)?;
                    pattern.frequency = pattern.frequency.saturating_add(1);
                    pattern.last_occurred = attempt.timestamp;
                    pattern.archived = false;
                    pattern.sample_attempts.push(AttemptSample::from_attempt(attempt));
                    while pattern.sample_attempts.len() > sample_cap {
                        pattern.sample_attempts.remove(0);
                    }
                    pattern
                }
            };

            let next_bytes = Self::serialize(&next)?;
            let cas_result = self
                .mistake_patterns
                .compare_and_swap(
                    key.as_bytes(),
                    current_raw.as_ref().map(|ivec| ivec.as_ref()),
                    Some(next_bytes),
                )
                .map_err(StoreError::Sled)?;

            if cas_result.is_ok() {
                return Ok(next);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "mistake_pattern".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Attach (or refresh) the review card backing this pattern.
    pub fn link_pattern_card(
        &self,
        learner_id: &str,
        topic: &str,
        subject: &str,
        card_id: &str,
    ) -> Result<(), StoreError> {
        self.mutate_pattern(learner_id, topic, subject, |pattern| {
            pattern.linked_card_id = Some(card_id.to_string());
        })
    }

    /// Stop a mastered pattern from resurfacing. The record stays on disk.
    pub fn archive_mistake_pattern(
        &self,
        learner_id: &str,
        topic: &str,
        subject: &str,
    ) -> Result<(), StoreError> {
        self.mutate_pattern(learner_id, topic, subject, |pattern| {
            pattern.archived = true;
        })
    }

    fn mutate_pattern<F>(
        &self,
        learner_id: &str,
        topic: &str,
        subject: &str,
        mutate: F,
    ) -> Result<(), StoreError>
    where
        F: Fn(&mut MistakePattern),
    {
        let key = keys::pattern_key(learner_id, topic, subject)?;

        for _ in 0..MAX_CAS_RETRIES {
            let Some(current_raw) = self.mistake_patterns.get(key.as_bytes())? else {
                return Err(StoreError::NotFound {
                    entity: "mistake_pattern".to_string(),
                    key,
                });
            };

            let mut pattern: MistakePattern = Self::deserialize(&current_raw)?;
            mutate(&mut pattern);
            let next_bytes = Self::serialize(&pattern)?;

            let cas_result = self
                .mistake_patterns
                .compare_and_swap(
                    key.as_bytes(),
                    Some(current_raw.as_ref()),
                    Some(next_bytes),
                )
                .map_err(StoreError::Sled)?;

            if cas_result.is_ok() {
                return Ok(());
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "mistake_pattern".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    pub fn list_mistake_patterns(
        &self,
        learner_id: &str,
        include_archived: bool,
    ) -> Result<Vec<MistakePattern>, StoreError> {
        let prefix = keys::pattern_prefix(learner_id)?;
        let mut patterns = Vec::new();

        for item in self.mistake_patterns.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            let pattern: MistakePattern = Self::deserialize(&raw)?;
            if !include_archived && pattern.archived {
                continue;
            }
            patterns.push(pattern);
        }

        Ok(patterns)
    }
}
