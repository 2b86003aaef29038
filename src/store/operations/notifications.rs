use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskReminder,
    DueReviewDigest,
    System,
}

/// In-app outbox entry. The `in_app` channel and the due-review digest land
/// here; the UI collaborator reads and acknowledges them on next view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub learner_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        let key = keys::notification_key(&notification.learner_id, &notification.id)?;
        self.notifications
            .insert(key.as_bytes(), Self::serialize(notification)?)?;
        Ok(())
    }

    pub fn list_notifications(
        &self,
        learner_id: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        let prefix = keys::notification_prefix(learner_id)?;
        let mut notifications = Vec::new();

        for item in self.notifications.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = match item {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            if let Ok(notification) = Self::deserialize::<Notification>(&raw) {
                if unread_only && notification.read {
                    continue;
                }
                notifications.push(notification);
            }
        }

        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(limit);
        Ok(notifications)
    }

    pub fn mark_notification_read(
        &self,
        learner_id: &str,
        notification_id: &str,
    ) -> Result<Option<Notification>, StoreError> {
        let key = keys::notification_key(learner_id, notification_id)?;
        let Some(raw) = self.notifications.get(key.as_bytes())? else {
            return Ok(None);
        };

        let mut notification: Notification = Self::deserialize(&raw)?;
        notification.read = true;
        self.notifications
            .insert(key.as_bytes(), Self::serialize(&notification)?)?;
        Ok(Some(notification))
    }

    pub fn count_unread_notifications(&self, learner_id: &str) -> Result<u64, StoreError> {
        let prefix = keys::notification_prefix(learner_id)?;
        let mut unread_count = 0u64;

        for item in self.notifications.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = match item {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            if let Ok(notification) = Self::deserialize::<Notification>(&raw) {
                if !notification.read {
                    unread_count += 1;
                }
            }
        }

        Ok(unread_count)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn mock_notification(learner_id: &str, id: &str, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            learner_id: learner_id.to_string(),
            kind: NotificationKind::TaskReminder,
            title: "Reminder".to_string(),
            body: "Task due soon".to_string(),
            read,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unread_filter_and_count() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        store.insert_notification(&mock_notification("l1", "n1", false)).unwrap();
        store.insert_notification(&mock_notification("l1", "n2", true)).unwrap();
        store.insert_notification(&mock_notification("l1", "n3", false)).unwrap();

        assert_eq!(store.count_unread_notifications("l1").unwrap(), 2);
        assert_eq!(store.list_notifications("l1", 10, true).unwrap().len(), 2);
        assert_eq!(store.list_notifications("l1", 10, false).unwrap().len(), 3);
    }

    #[test]
    fn mark_read_round_trip() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db-read").to_str().unwrap()).unwrap();

        store.insert_notification(&mock_notification("l1", "n1", false)).unwrap();
        let updated = store.mark_notification_read("l1", "n1").unwrap().unwrap();
        assert!(updated.read);
        assert_eq!(store.count_unread_notifications("l1").unwrap(), 0);

        assert!(store.mark_notification_read("l1", "missing").unwrap().is_none());
    }
}
