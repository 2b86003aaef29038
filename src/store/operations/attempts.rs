use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// A single answered practice item. Append-only: records are never
/// rewritten after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: String,
    pub question_id: String,
    pub learner_id: String,
    pub selected_answer: String,
    pub is_correct: bool,
    pub time_spent_seconds: u32,
    pub topic: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

impl Store {
    pub fn insert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StoreError> {
        let key = keys::attempt_key(
            &attempt.learner_id,
            attempt.timestamp.timestamp_millis(),
            &attempt.id,
        )?;
        let bytes = Self::serialize(attempt)?;

        // Insert-if-absent: an existing record under the same key means a
        // duplicate id, which would silently rewrite an immutable record.
        let cas_result = self
            .attempts
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(bytes))
            .map_err(StoreError::Sled)?;

        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "attempt".to_string(),
                key: attempt.id.clone(),
            });
        }

        Ok(())
    }

    /// Most-recent-first attempts for a learner (the attempt key embeds a
    /// reverse timestamp, so a prefix scan is already newest-first).
    pub fn list_recent_attempts(
        &self,
        learner_id: &str,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>, StoreError> {
        let prefix = keys::attempt_prefix(learner_id)?;
        let mut records = Vec::with_capacity(limit.min(64));

        for item in self.attempts.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            records.push(Self::deserialize::<AttemptRecord>(&raw)?);
            if records.len() >= limit {
                break;
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    use super::*;

    fn mock_attempt(learner_id: &str, id: &str, minutes_ago: i64, is_correct: bool) -> AttemptRecord {
        AttemptRecord {
            id: id.to_string(),
            question_id: format!("q-{id}"),
            learner_id: learner_id.to_string(),
            selected_answer: "B".to_string(),
            is_correct,
            time_spent_seconds: 45,
            topic: "algebra".to_string(),
            subject: "math".to_string(),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn list_recent_is_newest_first() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        store.insert_attempt(&mock_attempt("l1", "a1", 30, true)).unwrap();
        store.insert_attempt(&mock_attempt("l1", "a2", 10, false)).unwrap();
        store.insert_attempt(&mock_attempt("l1", "a3", 20, true)).unwrap();

        let recent = store.list_recent_attempts("l1", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "a2");
        assert_eq!(recent[1].id, "a3");
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db-dup").to_str().unwrap()).unwrap();

        let attempt = mock_attempt("l1", "a1", 0, true);
        store.insert_attempt(&attempt).unwrap();
        let err = store.insert_attempt(&attempt).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn learners_are_isolated() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db-iso").to_str().unwrap()).unwrap();

        store.insert_attempt(&mock_attempt("l1", "a1", 5, true)).unwrap();
        store.insert_attempt(&mock_attempt("l2", "b1", 1, false)).unwrap();

        let l1 = store.list_recent_attempts("l1", 10).unwrap();
        assert_eq!(l1.len(), 1);
        assert_eq!(l1[0].id, "a1");
    }
}
