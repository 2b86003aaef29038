//! Performance-adaptive difficulty selection over a bounded window of
//! recent correctness. Promotion and demotion move exactly one tier; the
//! band between the thresholds is deliberately sticky so a single noisy
//! attempt cannot oscillate the level.

use crate::review::config::DifficultyConfig;
use crate::store::operations::difficulty::DifficultyLevel;

pub fn recommend(
    recent_window: &[bool],
    current_level: Option<DifficultyLevel>,
    config: &DifficultyConfig,
) -> DifficultyLevel {
    if recent_window.len() < config.min_samples {
        // 样本不足：沿用现有档位，没有则回到 medium
        return current_level.unwrap_or(DifficultyLevel::Medium);
    }

    let correct = recent_window.iter().filter(|c| **c).count();
    let ratio = correct as f64 / recent_window.len() as f64;
    let level = current_level.unwrap_or(DifficultyLevel::Medium);

    if ratio > config.promote_threshold {
        level.promote()
    } else if ratio < config.demote_threshold {
        level.demote()
    } else {
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(correct: usize, total: usize) -> Vec<bool> {
        let mut w = vec![true; correct];
        w.extend(vec![false; total - correct]);
        w
    }

    #[test]
    fn insufficient_samples_default_to_medium() {
        let config = DifficultyConfig::default();
        assert_eq!(recommend(&[], None, &config), DifficultyLevel::Medium);
        assert_eq!(
            recommend(&[true], Some(DifficultyLevel::Hard), &config),
            DifficultyLevel::Hard
        );
    }

    #[test]
    fn high_ratio_promotes_one_tier() {
        let config = DifficultyConfig::default();
        assert_eq!(
            recommend(&window(9, 10), Some(DifficultyLevel::Easy), &config),
            DifficultyLevel::Medium
        );
        assert_eq!(
            recommend(&window(10, 10), Some(DifficultyLevel::Medium), &config),
            DifficultyLevel::Hard
        );
    }

    #[test]
    fn promotion_saturates_at_hard() {
        let config = DifficultyConfig::default();
        assert_eq!(
            recommend(&window(10, 10), Some(DifficultyLevel::Hard), &config),
            DifficultyLevel::Hard
        );
    }

    #[test]
    fn low_ratio_demotes_and_saturates_at_easy() {
        let config = DifficultyConfig::default();
        assert_eq!(
            recommend(&window(3, 10), Some(DifficultyLevel::Hard), &config),
            DifficultyLevel::Medium
        );
        assert_eq!(
            recommend(&window(0, 10), Some(DifficultyLevel::Easy), &config),
            DifficultyLevel::Easy
        );
    }

    #[test]
    fn middle_band_keeps_current_level() {
        let config = DifficultyConfig::default();
        assert_eq!(
            recommend(&window(7, 10), Some(DifficultyLevel::Medium), &config),
            DifficultyLevel::Medium
        );
        assert_eq!(
            recommend(&window(7, 10), Some(DifficultyLevel::Hard), &config),
            DifficultyLevel::Hard
        );
    }
}
