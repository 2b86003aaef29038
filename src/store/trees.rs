pub const ATTEMPTS: &str = "attempts";
pub const REVIEW_CARDS: &str = "review_cards";
pub const CARD_DUE_INDEX: &str = "card_due_index";
pub const MISTAKE_PATTERNS: &str = "mistake_patterns";
pub const DIFFICULTY_STATES: &str = "difficulty_states";
pub const REMINDER_TASKS: &str = "reminder_tasks";
pub const DISPATCH_CLAIMS: &str = "dispatch_claims";
pub const NOTIFICATIONS: &str = "notifications";
pub const DIGEST_DEDUP: &str = "digest_dedup";
pub const META: &str = "meta";
