use crate::store::StoreError;

/// 自由文本键段（learner/topic/subject）长度上限
const MAX_COMPONENT_LEN: usize = 256;

/// Escape a key component so that user-supplied text (topics, subjects,
/// learner ids) cannot collide with the `:` separator.
fn escape_component(raw: &str) -> String {
    raw.replace('%', "%25").replace(':', "%3A")
}

fn component(raw: &str) -> Result<String, StoreError> {
    if raw.is_empty() {
        return Err(StoreError::Validation(
            "key component must not be empty".to_string(),
        ));
    }
    if raw.len() > MAX_COMPONENT_LEN {
        return Err(StoreError::Validation(format!(
            "key component exceeds {} bytes",
            MAX_COMPONENT_LEN
        )));
    }
    Ok(escape_component(raw))
}

pub fn attempt_key(
    learner_id: &str,
    timestamp_ms: i64,
    attempt_id: &str,
) -> Result<String, StoreError> {
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    Ok(format!(
        "{}:{:020}:{}",
        component(learner_id)?,
        reverse_ts,
        attempt_id
    ))
}

pub fn attempt_prefix(learner_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(learner_id)?))
}

pub fn review_card_key(owner_id: &str, card_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:{}", component(owner_id)?, component(card_id)?))
}

pub fn review_card_prefix(owner_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(owner_id)?))
}

pub fn card_due_index_key(
    owner_id: &str,
    due_ts_ms: i64,
    card_id: &str,
) -> Result<String, StoreError> {
    let ts = due_ts_ms.max(0) as u64;
    Ok(format!(
        "{}:{:020}:{}",
        component(owner_id)?,
        ts,
        component(card_id)?
    ))
}

pub fn card_due_index_prefix(owner_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(owner_id)?))
}

/// Parse `{owner}:{due_ms:020}:{card_id}` into (due_ts_ms, card_id).
pub fn parse_due_index_item_key(key: &[u8]) -> Option<(i64, String)> {
    let text = std::str::from_utf8(key).ok()?;
    let mut parts = text.splitn(3, ':');
    let _owner = parts.next()?;
    let due_ts_ms = parts.next()?.parse::<u64>().ok()?;
    let card_id = parts.next()?;
    Some((
        i64::try_from(due_ts_ms).ok()?,
        card_id.replace("%3A", ":").replace("%25", "%"),
    ))
}

pub fn pattern_key(learner_id: &str, topic: &str, subject: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        component(learner_id)?,
        component(topic)?,
        component(subject)?
    ))
}

pub fn pattern_prefix(learner_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(learner_id)?))
}

pub fn difficulty_key(learner_id: &str, topic: &str, subject: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        component(learner_id)?,
        component(topic)?,
        component(subject)?
    ))
}

pub fn reminder_task_key(task_id: &str) -> Result<String, StoreError> {
    component(task_id)
}

pub fn dispatch_claim_key(task_id: &str, offset_hours: i64) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{:03}",
        component(task_id)?,
        offset_hours.max(0)
    ))
}

pub fn dispatch_claim_prefix(task_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(task_id)?))
}

pub fn notification_key(learner_id: &str, notification_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        component(learner_id)?,
        component(notification_id)?
    ))
}

pub fn notification_prefix(learner_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(learner_id)?))
}

pub fn digest_dedup_key(learner_id: &str, card_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        component(learner_id)?,
        component(card_id)?
    ))
}
