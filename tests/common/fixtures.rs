use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use review_engine::dispatch::value::TaskDescriptor;
use review_engine::review::types::AttemptEvent;
use review_engine::store::operations::reminders::Priority;
use review_engine::store::Store;

pub fn setup_store(db_name: &str) -> (tempfile::TempDir, Arc<Store>) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let db_path = temp_dir.path().join(db_name);
    let store = Arc::new(Store::open(db_path.to_str().expect("db path")).expect("open store"));
    store.run_migrations().expect("migrations");
    (temp_dir, store)
}

pub fn attempt_event(
    learner_id: &str,
    question_id: &str,
    topic: &str,
    is_correct: bool,
) -> AttemptEvent {
    AttemptEvent {
        question_id: question_id.to_string(),
        learner_id: learner_id.to_string(),
        selected_index: if is_correct { 1 } else { 3 },
        correct_index: 1,
        topic: topic.to_string(),
        subject: "math".to_string(),
        time_spent_seconds: 40,
        timestamp: Utc::now(),
    }
}

pub fn task_descriptor(
    task_id: &str,
    priority: Priority,
    estimated_hours: f64,
    deadline: DateTime<Utc>,
) -> TaskDescriptor {
    TaskDescriptor {
        task_id: task_id.to_string(),
        owner_id: "l1".to_string(),
        priority,
        estimated_hours,
        milestone_order: 1,
        total_milestones: 5,
        deadline,
    }
}

pub fn hours_from_now(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}
