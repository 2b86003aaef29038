//! Task value scoring and the derived channel / offset policy. All pure;
//! the sweep applies the results.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::CANDIDATE_OFFSET_HOURS;
use crate::store::operations::reminders::{Channel, Priority};

/// value = priority_weight + 0.5·hours + 0.3·remaining_milestones + bonus
const HOURS_WEIGHT: f64 = 0.5;
const MILESTONE_WEIGHT: f64 = 0.3;
const VALUE_MAX: f64 = 20.0;

/// Channel tier thresholds on the clamped value score.
const ALL_CHANNELS_THRESHOLD: f64 = 10.0;
const PUSH_EMAIL_THRESHOLD: f64 = 7.0;
const PUSH_THRESHOLD: f64 = 4.0;

/// A task as registered by the planning collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub task_id: String,
    pub owner_id: String,
    pub priority: Priority,
    pub estimated_hours: f64,
    pub milestone_order: u32,
    pub total_milestones: u32,
    pub deadline: DateTime<Utc>,
}

/// The dispatch decision handed to the delivery gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSchedule {
    pub task_id: String,
    pub value_score: f64,
    pub channels: BTreeSet<Channel>,
    pub offsets: BTreeSet<i64>,
}

pub fn hours_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (deadline - now).num_milliseconds() as f64 / 3_600_000.0
}

fn deadline_bonus(hours_remaining: f64) -> f64 {
    if hours_remaining < 24.0 {
        5.0
    } else if hours_remaining < 72.0 {
        3.0
    } else {
        0.0
    }
}

/// Clamped to [0, 20] no matter how extreme the inputs are.
pub fn value_score(descriptor: &TaskDescriptor, now: DateTime<Utc>) -> f64 {
    let estimated_hours = if descriptor.estimated_hours.is_finite() && descriptor.estimated_hours >= 0.0
    {
        descriptor.estimated_hours
    } else {
        tracing::warn!(
            task_id = %descriptor.task_id,
            estimated_hours = descriptor.estimated_hours,
            "Invalid estimated_hours, treating as 0"
        );
        0.0
    };

    // milestone_order 超出 total 属于非法输入：按 0 个剩余里程碑处理
    let remaining_milestones = descriptor
        .total_milestones
        .saturating_sub(descriptor.milestone_order)
        .saturating_add(if descriptor.milestone_order <= descriptor.total_milestones {
            1
        } else {
            0
        });

    let score = descriptor.priority.weight()
        + HOURS_WEIGHT * estimated_hours
        + MILESTONE_WEIGHT * remaining_milestones as f64
        + deadline_bonus(hours_until(descriptor.deadline, now));

    score.clamp(0.0, VALUE_MAX)
}

pub fn channels_for(value: f64) -> BTreeSet<Channel> {
    if value >= ALL_CHANNELS_THRESHOLD {
        BTreeSet::from([Channel::Push, Channel::Email, Channel::Whatsapp])
    } else if value >= PUSH_EMAIL_THRESHOLD {
        BTreeSet::from([Channel::Push, Channel::Email])
    } else if value >= PUSH_THRESHOLD {
        BTreeSet::from([Channel::Push])
    } else {
        BTreeSet::from([Channel::InApp])
    }
}

/// Hour-offsets before the deadline at which reminders fire. The candidate
/// set itself is tier-gated by value, then each offset must still fit inside
/// the remaining time.
pub fn offsets_for(value: f64, hours_to_deadline: f64) -> BTreeSet<i64> {
    let candidates: &[i64] = if value >= ALL_CHANNELS_THRESHOLD {
        &CANDIDATE_OFFSET_HOURS
    } else if value >= PUSH_EMAIL_THRESHOLD {
        &CANDIDATE_OFFSET_HOURS[1..]
    } else if value >= PUSH_THRESHOLD {
        &CANDIDATE_OFFSET_HOURS[2..]
    } else {
        &[]
    };

    candidates
        .iter()
        .copied()
        .filter(|offset| (*offset as f64) < hours_to_deadline)
        .collect()
}

pub fn build_schedule(descriptor: &TaskDescriptor, now: DateTime<Utc>) -> ReminderSchedule {
    let value = value_score(descriptor, now);
    ReminderSchedule {
        task_id: descriptor.task_id.clone(),
        value_score: value,
        channels: channels_for(value),
        offsets: offsets_for(value, hours_until(descriptor.deadline, now)),
    }
}
