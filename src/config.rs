use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub worker: WorkerConfig,
    pub delivery: DeliveryEnvConfig,
    pub engine: EngineEnvConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_due_digest: bool,
    pub enable_pattern_archive: bool,
}

#[derive(Debug, Clone)]
pub struct DeliveryEnvConfig {
    pub mock: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EngineEnvConfig {
    pub difficulty_window: usize,
    pub repractice_threshold: u32,
    pub archive_min_repetitions: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/review.sled"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_due_digest: env_or_bool("ENABLE_DUE_DIGEST_WORKER", true),
                enable_pattern_archive: env_or_bool("ENABLE_PATTERN_ARCHIVE_WORKER", true),
            },
            delivery: DeliveryEnvConfig {
                mock: env_or_bool("DELIVERY_MOCK", true),
                timeout_secs: env_or_parse("DELIVERY_TIMEOUT_SECS", 10_u64),
            },
            engine: EngineEnvConfig {
                difficulty_window: env_or_parse(
                    "DIFFICULTY_WINDOW",
                    crate::constants::DEFAULT_DIFFICULTY_WINDOW,
                ),
                repractice_threshold: env_or_parse("REPRACTICE_THRESHOLD", 1_u32),
                archive_min_repetitions: env_or_parse("ARCHIVE_MIN_REPETITIONS", 4_u32),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "RUST_LOG",
            "SLED_PATH",
            "WORKER_LEADER",
            "DELIVERY_MOCK",
            "DELIVERY_TIMEOUT_SECS",
            "DIFFICULTY_WINDOW",
            "REPRACTICE_THRESHOLD",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.worker.is_leader);
        assert!(cfg.delivery.mock);
        assert_eq!(cfg.engine.repractice_threshold, 1);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("DELIVERY_TIMEOUT_SECS", "42");
        env::set_var("DIFFICULTY_WINDOW", "20");

        let cfg = Config::from_env();
        assert_eq!(cfg.delivery.timeout_secs, 42);
        assert_eq!(cfg.engine.difficulty_window, 20);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("DELIVERY_TIMEOUT_SECS", "bad");
        env::set_var("REPRACTICE_THRESHOLD", "x");

        let cfg = Config::from_env();
        assert_eq!(cfg.delivery.timeout_secs, 10);
        assert_eq!(cfg.engine.repractice_threshold, 1);
    }

    #[test]
    fn bool_flags_accept_aliases() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("WORKER_LEADER", "off");
        env::set_var("DELIVERY_MOCK", "YES");

        let cfg = Config::from_env();
        assert!(!cfg.worker.is_leader);
        assert!(cfg.delivery.mock);
    }
}
