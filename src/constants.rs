/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// 难度窗口默认长度（最近 N 次作答）
pub const DEFAULT_DIFFICULTY_WINDOW: usize = 10;

/// 难度推荐所需的最小样本数
pub const DEFAULT_MIN_SAMPLES: usize = 3;

/// 错误模式样本列表上限（超出后淘汰最旧样本）
pub const DEFAULT_PATTERN_SAMPLE_CAP: usize = 5;

/// 提醒候选提前量（小时），按价值分层启用
pub const CANDIDATE_OFFSET_HOURS: [i64; 3] = [72, 24, 2];

/// 单渠道投递最大尝试次数（首次 + 重试）
pub const DEFAULT_DELIVERY_ATTEMPTS: u32 = 3;

/// 投递重试退避基数（毫秒）
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 200;

/// 投递重试退避上限（毫秒）
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 5_000;

/// 到期复习摘要的通知去重窗口（小时）
pub const DIGEST_DEDUP_WINDOW_HOURS: i64 = 24;

/// 每小时毫秒数
pub const MILLIS_PER_HOUR: i64 = 3_600_000;
