use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn weight(self) -> f64 {
        match self {
            Self::Critical => 10.0,
            Self::High => 7.0,
            Self::Medium => 4.0,
            Self::Low => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Email,
    Whatsapp,
    InApp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
            Self::InApp => "in_app",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Scheduled,
    Sent,
    Acknowledged,
    Expired,
    Failed,
}

impl LifecycleState {
    /// 终态之后任务不再参与派发扫描。
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acknowledged | Self::Expired | Self::Failed)
    }
}

/// A registered task pending reminders. `scheduled_offsets` holds the
/// hour-offsets still eligible for dispatch; replacing the whole set in one
/// insert is what cancels not-yet-sent offsets atomically on deadline change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTask {
    pub id: String,
    pub owner_id: String,
    pub priority: Priority,
    pub estimated_hours: f64,
    pub milestone_order: u32,
    pub total_milestones: u32,
    pub deadline: DateTime<Utc>,
    pub value_score: f64,
    pub channels: BTreeSet<Channel>,
    pub scheduled_offsets: BTreeSet<i64>,
    pub lifecycle_state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Exclusive claim on one (task, offset) dispatch. Claims are created with
/// insert-if-absent CAS so concurrent sweep workers cannot both send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchClaim {
    pub task_id: String,
    pub offset_hours: i64,
    pub claimed_at: DateTime<Utc>,
    pub outcome: Option<DispatchOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub delivered: bool,
    pub channel_results: Vec<ChannelResult>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResult {
    pub channel: Channel,
    pub success: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

impl Store {
    pub fn put_reminder_task(&self, task: &ReminderTask) -> Result<(), StoreError> {
        let key = keys::reminder_task_key(&task.id)?;
        self.reminder_tasks
            .insert(key.as_bytes(), Self::serialize(task)?)?;
        Ok(())
    }

    pub fn get_reminder_task(&self, task_id: &str) -> Result<Option<ReminderTask>, StoreError> {
        let key = keys::reminder_task_key(task_id)?;
        match self.reminder_tasks.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// All non-terminal tasks; the sweep iterates these.
    pub fn list_open_reminder_tasks(&self) -> Result<Vec<ReminderTask>, StoreError> {
        let mut tasks = Vec::new();
        for item in self.reminder_tasks.iter() {
            let (_, raw) = item?;
            let task: ReminderTask = Self::deserialize(&raw)?;
            if !task.lifecycle_state.is_terminal() {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// CAS read-modify-write on a task; sweep and expiry workers may race on
    /// the same record.
    pub fn mutate_reminder_task<F>(&self, task_id: &str, mutate: F) -> Result<ReminderTask, StoreError>
    where
        F: Fn(&mut ReminderTask),
    {
        let key = keys::reminder_task_key(task_id)?;

        for _ in 0..MAX_CAS_RETRIES {
            let Some(current_raw) = self.reminder_tasks.get(key.as_bytes())? else {
                return Err(StoreError::NotFound {
                    entity: "reminder_task".to_string(),
                    key,
                });
            };

            let mut task: ReminderTask = Self::deserialize(&current_raw)?;
            mutate(&mut task);
            task.updated_at = Utc::now();
            let next_bytes = Self::serialize(&task)?;

            let cas_result = self
                .reminder_tasks
                .compare_and_swap(key.as_bytes(), Some(current_raw.as_ref()), Some(next_bytes))
                .map_err(StoreError::Sled)?;

            if cas_result.is_ok() {
                return Ok(task);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "reminder_task".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Try to take the exclusive claim for one (task, offset). Returns false
    /// when another worker (or an earlier sweep) already holds it.
    pub fn claim_dispatch(
        &self,
        task_id: &str,
        offset_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let key = keys::dispatch_claim_key(task_id, offset_hours)?;
        let claim = DispatchClaim {
            task_id: task_id.to_string(),
            offset_hours,
            claimed_at: now,
            outcome: None,
        };
        let bytes = Self::serialize(&claim)?;

        let cas_result = self
            .dispatch_claims
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(bytes))
            .map_err(StoreError::Sled)?;

        Ok(cas_result.is_ok())
    }

    /// Record the final outcome on a claim we hold.
    pub fn record_dispatch_outcome(
        &self,
        task_id: &str,
        offset_hours: i64,
        outcome: DispatchOutcome,
    ) -> Result<(), StoreError> {
        let key = keys::dispatch_claim_key(task_id, offset_hours)?;
        let Some(raw) = self.dispatch_claims.get(key.as_bytes())? else {
            return Err(StoreError::NotFound {
                entity: "dispatch_claim".to_string(),
                key,
            });
        };

        let mut claim: DispatchClaim = Self::deserialize(&raw)?;
        claim.outcome = Some(outcome);
        self.dispatch_claims
            .insert(key.as_bytes(), Self::serialize(&claim)?)?;
        Ok(())
    }

    pub fn get_dispatch_claim(
        &self,
        task_id: &str,
        offset_hours: i64,
    ) -> Result<Option<DispatchClaim>, StoreError> {
        let key = keys::dispatch_claim_key(task_id, offset_hours)?;
        match self.dispatch_claims.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}
