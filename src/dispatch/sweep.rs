//! Periodic reminder dispatch. Safe to run from several workers at once:
//! every (task, offset) pair is claimed exclusively before anything is sent.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::dispatch::gateway::{
    deliver_with_retry, DeliveryGateway, ReminderNotice, RetryPolicy,
};
use crate::dispatch::value::{self, TaskDescriptor};
use crate::store::operations::notifications::{Notification, NotificationKind};
use crate::store::operations::reminders::{
    Channel, DispatchOutcome, LifecycleState, ReminderTask,
};
use crate::store::{Store, StoreError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub expired: u64,
    pub skipped_claimed: u64,
}

/// Register a task (or re-register it after its descriptor changed) and
/// compute its schedule. A deadline change replaces `scheduled_offsets`
/// wholesale, which atomically cancels every not-yet-sent offset before the
/// new schedule takes effect.
pub fn register_task(
    store: &Store,
    descriptor: &TaskDescriptor,
    now: DateTime<Utc>,
) -> Result<ReminderTask, StoreError> {
    let schedule = value::build_schedule(descriptor, now);

    let existing = store.get_reminder_task(&descriptor.task_id)?;
    if let Some(task) = existing {
        if !task.lifecycle_state.is_terminal() {
            let deadline_changed = task.deadline != descriptor.deadline;
            if deadline_changed {
                tracing::info!(
                    task_id = %descriptor.task_id,
                    old_deadline = %task.deadline,
                    new_deadline = %descriptor.deadline,
                    "Deadline changed, cancelling pending offsets and rescheduling"
                );
            }
            let updated = store.mutate_reminder_task(&descriptor.task_id, |t| {
                t.priority = descriptor.priority;
                t.estimated_hours = descriptor.estimated_hours;
                t.milestone_order = descriptor.milestone_order;
                t.total_milestones = descriptor.total_milestones;
                t.deadline = descriptor.deadline;
                t.value_score = schedule.value_score;
                t.channels = schedule.channels.clone();
                t.scheduled_offsets = schedule.offsets.clone();
            })?;
            return Ok(updated);
        }
        // 终态任务重新注册视为新一轮任务：覆盖旧记录，清掉旧 claim，
        // 否则新一轮的同名 offset 会被上一轮的独占记录挡住
        let prefix = crate::store::keys::dispatch_claim_prefix(&descriptor.task_id)?;
        for item in store.dispatch_claims.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            store.dispatch_claims.remove(key)?;
        }
    }

    let task = ReminderTask {
        id: descriptor.task_id.clone(),
        owner_id: descriptor.owner_id.clone(),
        priority: descriptor.priority,
        estimated_hours: descriptor.estimated_hours,
        milestone_order: descriptor.milestone_order,
        total_milestones: descriptor.total_milestones,
        deadline: descriptor.deadline,
        value_score: schedule.value_score,
        channels: schedule.channels.clone(),
        scheduled_offsets: schedule.offsets.clone(),
        lifecycle_state: LifecycleState::Created,
        created_at: now,
        updated_at: now,
    };
    store.put_reminder_task(&task)?;

    // Sub-threshold tasks get no timed offsets; they surface in-app on the
    // learner's next view instead.
    if schedule.channels.contains(&Channel::InApp) {
        store.insert_notification(&Notification {
            id: Uuid::new_v4().to_string(),
            learner_id: task.owner_id.clone(),
            kind: NotificationKind::TaskReminder,
            title: "Task reminder".to_string(),
            body: format!(
                "Task {} is due {}",
                task.id,
                task.deadline.format("%Y-%m-%d %H:%M")
            ),
            read: false,
            created_at: now,
        })?;
    }

    store.mutate_reminder_task(&descriptor.task_id, |t| {
        t.lifecycle_state = LifecycleState::Scheduled;
    })
}

/// Completed or removed tasks stop here: the terminal state plus the
/// cleared offset set cancels anything the sweep has not claimed yet.
pub fn acknowledge_task(store: &Store, task_id: &str) -> Result<ReminderTask, StoreError> {
    store.mutate_reminder_task(task_id, |task| {
        task.lifecycle_state = LifecycleState::Acknowledged;
        task.scheduled_offsets.clear();
    })
}

/// One dispatch pass over all open tasks.
pub async fn run_sweep(
    store: &Store,
    gateway: &dyn DeliveryGateway,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Result<SweepStats, StoreError> {
    let mut stats = SweepStats::default();

    for task in store.list_open_reminder_tasks()? {
        stats.examined += 1;

        if now >= task.deadline {
            store.mutate_reminder_task(&task.id, |t| {
                t.lifecycle_state = LifecycleState::Expired;
            })?;
            stats.expired += 1;
            continue;
        }

        let open_offsets: Vec<i64> = task
            .scheduled_offsets
            .iter()
            .copied()
            .filter(|offset| now >= task.deadline - Duration::hours(*offset))
            .collect();

        for offset in open_offsets {
            if !store.claim_dispatch(&task.id, offset, now)? {
                stats.skipped_claimed += 1;
                continue;
            }

            let delivered = dispatch_offset(store, gateway, policy, &task, offset, now).await?;
            if delivered {
                stats.dispatched += 1;
                store.mutate_reminder_task(&task.id, |t| {
                    if t.lifecycle_state == LifecycleState::Scheduled {
                        t.lifecycle_state = LifecycleState::Sent;
                    }
                })?;
            } else {
                stats.failed += 1;
                // 单个 offset 失败只记录在 claim outcome 里；任务保持可调度，
                // 剩余 offset 在后续扫描中照常派发。只有全部 offset 都已
                // 派发过（无未 claim 的 offset）时才进入终态 failed。
                if !has_pending_offsets(store, &task)? {
                    store.mutate_reminder_task(&task.id, |t| {
                        t.lifecycle_state = LifecycleState::Failed;
                    })?;
                }
            }
        }
    }

    Ok(stats)
}

/// True while at least one scheduled offset has not been claimed yet.
fn has_pending_offsets(store: &Store, task: &ReminderTask) -> Result<bool, StoreError> {
    for offset in &task.scheduled_offsets {
        if store.get_dispatch_claim(&task.id, *offset)?.is_none() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Deliver one claimed offset across the task's channels. A failing channel
/// never blocks the others; the offset counts as delivered when at least one
/// channel went through.
async fn dispatch_offset(
    store: &Store,
    gateway: &dyn DeliveryGateway,
    policy: &RetryPolicy,
    task: &ReminderTask,
    offset_hours: i64,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let notice = ReminderNotice {
        task_id: task.id.clone(),
        owner_id: task.owner_id.clone(),
        offset_hours,
        deadline: task.deadline,
        value_score: task.value_score,
        body: reminder_body(task, offset_hours),
    };

    let mut channel_results = Vec::with_capacity(task.channels.len());
    for channel in &task.channels {
        let result = deliver_with_retry(gateway, policy, *channel, &notice).await;

        if !result.success {
            tracing::warn!(
                task_id = %task.id,
                channel = result.channel.as_str(),
                offset_hours,
                "Channel delivery failed after retries"
            );
        }
        channel_results.push(result);
    }

    let delivered = channel_results.iter().any(|r| r.success);
    store.record_dispatch_outcome(
        &task.id,
        offset_hours,
        DispatchOutcome {
            delivered,
            channel_results,
            completed_at: now,
        },
    )?;

    Ok(delivered)
}

fn reminder_body(task: &ReminderTask, offset_hours: i64) -> String {
    if offset_hours <= 2 {
        format!("Task {} is due in {} hours", task.id, offset_hours)
    } else if offset_hours <= 24 {
        format!("Reminder: task {} is due within a day", task.id)
    } else {
        format!(
            "Task {} is scheduled for {}",
            task.id,
            task.deadline.format("%Y-%m-%d")
        )
    }
}

