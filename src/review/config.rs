use serde::{Deserialize, Serialize};

use crate::config::EngineEnvConfig;
use crate::constants::{
    DEFAULT_DIFFICULTY_WINDOW, DEFAULT_MIN_SAMPLES, DEFAULT_PATTERN_SAMPLE_CAP,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sm2Config {
    pub initial_ease: f64,
    pub min_ease: f64,
    pub first_interval_days: u32,
    pub second_interval_days: u32,
}

impl Default for Sm2Config {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            min_ease: 1.3,
            first_interval_days: 1,
            second_interval_days: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyConfig {
    pub window_size: usize,
    pub min_samples: usize,
    /// 正确率高于此阈值 → 升一档
    pub promote_threshold: f64,
    /// 正确率低于此阈值 → 降一档
    pub demote_threshold: f64,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_DIFFICULTY_WINDOW,
            min_samples: DEFAULT_MIN_SAMPLES,
            promote_threshold: 0.8,
            demote_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeConfig {
    pub sample_cap: usize,
    /// 频次达到该值即触发再练习卡片（首个阈值为 1：首次错误就入队）
    pub repractice_threshold: u32,
}

impl Default for MistakeConfig {
    fn default() -> Self {
        Self {
            sample_cap: DEFAULT_PATTERN_SAMPLE_CAP,
            repractice_threshold: 1,
        }
    }
}

/// Mastery archival condition. Deliberately configurable: how much
/// demonstrated recall should retire a pattern is a product decision, not a
/// fixed constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveConfig {
    pub min_linked_repetitions: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            min_linked_repetitions: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub sm2: Sm2Config,
    pub difficulty: DifficultyConfig,
    pub mistakes: MistakeConfig,
    pub archive: ArchiveConfig,
}

impl EngineConfig {
    pub fn from_env(env_config: &EngineEnvConfig) -> Self {
        let mut config = Self::default();
        config.difficulty.window_size = env_config.difficulty_window;
        config.mistakes.repractice_threshold = env_config.repractice_threshold;
        config.archive.min_linked_repetitions = env_config.archive_min_repetitions;
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sm2.min_ease < 1.0 {
            return Err("sm2.min_ease must be >= 1.0".to_string());
        }
        if self.sm2.initial_ease < self.sm2.min_ease {
            return Err("sm2.initial_ease must be >= sm2.min_ease".to_string());
        }
        if self.sm2.first_interval_days == 0 {
            return Err("sm2.first_interval_days must be >= 1".to_string());
        }
        if self.sm2.second_interval_days < self.sm2.first_interval_days {
            return Err("sm2.second_interval_days must be >= first_interval_days".to_string());
        }

        if !(0.0..=1.0).contains(&self.difficulty.promote_threshold)
            || !(0.0..=1.0).contains(&self.difficulty.demote_threshold)
        {
            return Err("difficulty thresholds must be in [0,1]".to_string());
        }
        if self.difficulty.demote_threshold >= self.difficulty.promote_threshold {
            return Err("difficulty.demote_threshold must be < promote_threshold".to_string());
        }
        if self.difficulty.min_samples == 0 {
            return Err("difficulty.min_samples must be >= 1".to_string());
        }
        if self.difficulty.window_size < self.difficulty.min_samples {
            return Err("difficulty.window_size must be >= min_samples".to_string());
        }

        if self.mistakes.sample_cap == 0 {
            return Err("mistakes.sample_cap must be >= 1".to_string());
        }
        if self.mistakes.repractice_threshold == 0 {
            return Err("mistakes.repractice_threshold must be >= 1".to_string());
        }

        if self.archive.min_linked_repetitions == 0 {
            return Err("archive.min_linked_repetitions must be >= 1".to_string());
        }

        Ok(())
    }
}
