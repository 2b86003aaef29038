mod common;

use std::collections::BTreeSet;

use chrono::{Duration, Utc};

use common::fixtures::{hours_from_now, setup_store, task_descriptor};
use review_engine::dispatch::gateway::{MemoryGateway, RetryPolicy};
use review_engine::dispatch::sweep::{acknowledge_task, register_task, run_sweep};
use review_engine::store::operations::reminders::{Channel, LifecycleState, Priority};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_cap_ms: 2,
        ..RetryPolicy::default()
    }
}

#[tokio::test]
async fn critical_near_deadline_task_fires_all_channels_on_short_offset() {
    let (_dir, store) = setup_store("dispatch1.sled");
    let gateway = MemoryGateway::new();

    let mut descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(10));
    descriptor.milestone_order = 1;
    descriptor.total_milestones = 5;

    let task = register_task(&store, &descriptor, Utc::now()).unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Scheduled);
    assert_eq!(
        task.channels,
        BTreeSet::from([Channel::Push, Channel::Email, Channel::Whatsapp])
    );
    assert_eq!(task.scheduled_offsets, BTreeSet::from([2]));

    // 距截止 10h：2h 提前量窗口未开，不派发
    let stats = run_sweep(&store, &gateway, &fast_policy(), Utc::now()).await.unwrap();
    assert_eq!(stats.dispatched, 0);
    assert!(gateway.delivered().is_empty());

    // 进入 2h 窗口后派发到全部渠道
    let fire_at = descriptor.deadline - Duration::hours(1);
    let stats = run_sweep(&store, &gateway, &fast_policy(), fire_at).await.unwrap();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(gateway.delivered_count(Channel::Push), 1);
    assert_eq!(gateway.delivered_count(Channel::Email), 1);
    assert_eq!(gateway.delivered_count(Channel::Whatsapp), 1);

    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Sent);
}

#[tokio::test]
async fn repeated_sweeps_deliver_each_offset_exactly_once() {
    let (_dir, store) = setup_store("dispatch2.sled");
    let gateway = MemoryGateway::new();

    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(10));
    register_task(&store, &descriptor, Utc::now()).unwrap();

    let fire_at = descriptor.deadline - Duration::hours(1);
    run_sweep(&store, &gateway, &fast_policy(), fire_at).await.unwrap();
    let second = run_sweep(&store, &gateway, &fast_policy(), fire_at).await.unwrap();

    assert_eq!(second.dispatched, 0);
    assert_eq!(second.skipped_claimed, 1);
    assert_eq!(gateway.delivered_count(Channel::Push), 1);
    assert_eq!(gateway.delivered_count(Channel::Email), 1);
    assert_eq!(gateway.delivered_count(Channel::Whatsapp), 1);
}

#[tokio::test]
async fn one_failing_channel_does_not_block_the_others() {
    let (_dir, store) = setup_store("dispatch3.sled");
    let gateway = MemoryGateway::new();
    gateway.fail_channel(Channel::Email);

    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(10));
    register_task(&store, &descriptor, Utc::now()).unwrap();

    let fire_at = descriptor.deadline - Duration::hours(1);
    let stats = run_sweep(&store, &gateway, &fast_policy(), fire_at).await.unwrap();

    assert_eq!(stats.dispatched, 1);
    assert_eq!(gateway.delivered_count(Channel::Push), 1);
    assert_eq!(gateway.delivered_count(Channel::Whatsapp), 1);
    assert_eq!(gateway.delivered_count(Channel::Email), 0);

    // 部分渠道成功即视为已送达；失败渠道记录在 outcome 中
    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Sent);

    let claim = store.get_dispatch_claim("t1", 2).unwrap().unwrap();
    let outcome = claim.outcome.unwrap();
    assert!(outcome.delivered);
    let email = outcome
        .channel_results
        .iter()
        .find(|r| r.channel == Channel::Email)
        .unwrap();
    assert!(!email.success);
    assert_eq!(email.attempts, 3);
    assert!(email.error.is_some());
}

#[tokio::test]
async fn all_channels_failing_on_the_only_offset_marks_the_task_failed() {
    let (_dir, store) = setup_store("dispatch4.sled");
    let gateway = MemoryGateway::new();
    gateway.fail_channel(Channel::Push);
    gateway.fail_channel(Channel::Email);
    gateway.fail_channel(Channel::Whatsapp);

    // 距截止 10h：仅 2h 一个提前量，失败后再无可派发的 offset
    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(10));
    register_task(&store, &descriptor, Utc::now()).unwrap();

    let fire_at = descriptor.deadline - Duration::hours(1);
    let stats = run_sweep(&store, &gateway, &fast_policy(), fire_at).await.unwrap();

    assert_eq!(stats.failed, 1);
    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Failed);
}

#[tokio::test]
async fn failed_offset_leaves_remaining_offsets_schedulable() {
    let (_dir, store) = setup_store("dispatch4b.sled");
    let gateway = MemoryGateway::new();
    gateway.fail_channel(Channel::Push);
    gateway.fail_channel(Channel::Email);
    gateway.fail_channel(Channel::Whatsapp);

    // 远期截止：三个提前量全部入选
    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(100));
    register_task(&store, &descriptor, Utc::now()).unwrap();

    // 72h 窗口内全渠道故障：该 offset 记为失败，任务保持可调度
    let at_72h = descriptor.deadline - Duration::hours(71);
    let stats = run_sweep(&store, &gateway, &fast_policy(), at_72h).await.unwrap();
    assert_eq!(stats.failed, 1);

    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Scheduled);
    let claim = store.get_dispatch_claim("t1", 72).unwrap().unwrap();
    assert!(!claim.outcome.unwrap().delivered);

    // 渠道恢复后，剩余 offset 在后续扫描中照常派发
    gateway.heal_channel(Channel::Push);
    gateway.heal_channel(Channel::Email);
    gateway.heal_channel(Channel::Whatsapp);

    let at_24h = descriptor.deadline - Duration::hours(23);
    let stats = run_sweep(&store, &gateway, &fast_policy(), at_24h).await.unwrap();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(gateway.delivered_count(Channel::Push), 1);

    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Sent);
}

#[tokio::test]
async fn task_fails_only_after_its_last_offset_fails() {
    let (_dir, store) = setup_store("dispatch4c.sled");
    let gateway = MemoryGateway::new();
    gateway.fail_channel(Channel::Push);
    gateway.fail_channel(Channel::Email);
    gateway.fail_channel(Channel::Whatsapp);

    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(100));
    register_task(&store, &descriptor, Utc::now()).unwrap();

    let at_72h = descriptor.deadline - Duration::hours(71);
    run_sweep(&store, &gateway, &fast_policy(), at_72h).await.unwrap();
    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Scheduled);

    let at_24h = descriptor.deadline - Duration::hours(23);
    run_sweep(&store, &gateway, &fast_policy(), at_24h).await.unwrap();
    let task = store.get_reminder_task("t1").unwrap().unwrap();
    // 2h 提前量还未派发过，任务仍不进终态
    assert_eq!(task.lifecycle_state, LifecycleState::Scheduled);

    let at_2h = descriptor.deadline - Duration::hours(1);
    let stats = run_sweep(&store, &gateway, &fast_policy(), at_2h).await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped_claimed, 2);

    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Failed);
}

#[tokio::test]
async fn deadline_change_cancels_pending_offsets_and_recomputes() {
    let (_dir, store) = setup_store("dispatch5.sled");

    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(48));
    let task = register_task(&store, &descriptor, Utc::now()).unwrap();
    assert_eq!(task.scheduled_offsets, BTreeSet::from([24, 2]));

    // 截止时间提前：24h 提前量不再可行，旧的待发 offset 被整体替换
    let moved = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(10));
    let task = register_task(&store, &moved, Utc::now()).unwrap();
    assert_eq!(task.scheduled_offsets, BTreeSet::from([2]));
    assert_eq!(task.deadline, moved.deadline);
}

#[tokio::test]
async fn past_deadline_tasks_expire_instead_of_firing() {
    let (_dir, store) = setup_store("dispatch6.sled");
    let gateway = MemoryGateway::new();

    let descriptor = task_descriptor("t1", Priority::High, 2.0, hours_from_now(1));
    register_task(&store, &descriptor, Utc::now()).unwrap();

    let after_deadline = descriptor.deadline + Duration::hours(1);
    let stats = run_sweep(&store, &gateway, &fast_policy(), after_deadline).await.unwrap();

    assert_eq!(stats.expired, 1);
    assert_eq!(stats.dispatched, 0);
    assert!(gateway.delivered().is_empty());

    let task = store.get_reminder_task("t1").unwrap().unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Expired);
}

#[tokio::test]
async fn acknowledged_tasks_leave_the_sweep() {
    let (_dir, store) = setup_store("dispatch7.sled");
    let gateway = MemoryGateway::new();

    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(10));
    register_task(&store, &descriptor, Utc::now()).unwrap();

    let task = acknowledge_task(&store, "t1").unwrap();
    assert_eq!(task.lifecycle_state, LifecycleState::Acknowledged);
    assert!(task.scheduled_offsets.is_empty());

    let fire_at = descriptor.deadline - Duration::hours(1);
    let stats = run_sweep(&store, &gateway, &fast_policy(), fire_at).await.unwrap();
    assert_eq!(stats.examined, 0);
    assert!(gateway.delivered().is_empty());
}

#[tokio::test]
async fn low_value_tasks_surface_in_app_only() {
    let (_dir, store) = setup_store("dispatch8.sled");
    let gateway = MemoryGateway::new();

    // low + 远期截止：价值 < 4，无定时提醒，仅入站内通知
    let mut descriptor = task_descriptor("t1", Priority::Low, 1.0, hours_from_now(500));
    descriptor.milestone_order = 5;
    descriptor.total_milestones = 5;

    let task = register_task(&store, &descriptor, Utc::now()).unwrap();
    assert_eq!(task.channels, BTreeSet::from([Channel::InApp]));
    assert!(task.scheduled_offsets.is_empty());

    tokio_test::assert_ok!(store.count_unread_notifications("l1"));
    assert_eq!(store.count_unread_notifications("l1").unwrap(), 1);

    let stats = run_sweep(&store, &gateway, &fast_policy(), Utc::now()).await.unwrap();
    assert_eq!(stats.dispatched, 0);
    assert!(gateway.delivered().is_empty());
}

#[tokio::test]
async fn sent_offset_window_then_next_offset_fires_later() {
    let (_dir, store) = setup_store("dispatch9.sled");
    let gateway = MemoryGateway::new();

    // 价值 >= 10，远期截止：三个提前量全部入选
    let descriptor = task_descriptor("t1", Priority::Critical, 5.0, hours_from_now(100));
    let task = register_task(&store, &descriptor, Utc::now()).unwrap();
    assert_eq!(task.scheduled_offsets, BTreeSet::from([72, 24, 2]));

    let at_72h = descriptor.deadline - Duration::hours(71);
    let stats = run_sweep(&store, &gateway, &fast_policy(), at_72h).await.unwrap();
    assert_eq!(stats.dispatched, 1);

    let at_24h = descriptor.deadline - Duration::hours(23);
    let stats = run_sweep(&store, &gateway, &fast_policy(), at_24h).await.unwrap();
    // 24h 窗口新开，72h 的 claim 已存在
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.skipped_claimed, 1);

    assert_eq!(gateway.delivered_count(Channel::Push), 2);
}
