pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub attempts: sled::Tree,
    pub review_cards: sled::Tree,
    pub card_due_index: sled::Tree,
    pub mistake_patterns: sled::Tree,
    pub difficulty_states: sled::Tree,
    pub reminder_tasks: sled::Tree,
    pub dispatch_claims: sled::Tree,
    pub notifications: sled::Tree,
    pub digest_dedup: sled::Tree,
    pub meta: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    /// 冲突与存储不可用属于可重试错误；调用方应重读快照后重试。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Sled(_) | StoreError::Conflict { .. } | StoreError::CasRetryExhausted { .. }
        )
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let attempts = db.open_tree(trees::ATTEMPTS)?;
        let review_cards = db.open_tree(trees::REVIEW_CARDS)?;
        let card_due_index = db.open_tree(trees::CARD_DUE_INDEX)?;
        let mistake_patterns = db.open_tree(trees::MISTAKE_PATTERNS)?;
        let difficulty_states = db.open_tree(trees::DIFFICULTY_STATES)?;
        let reminder_tasks = db.open_tree(trees::REMINDER_TASKS)?;
        let dispatch_claims = db.open_tree(trees::DISPATCH_CLAIMS)?;
        let notifications = db.open_tree(trees::NOTIFICATIONS)?;
        let digest_dedup = db.open_tree(trees::DIGEST_DEDUP)?;
        let meta = db.open_tree(trees::META)?;

        Ok(Self {
            db,
            attempts,
            review_cards,
            card_due_index,
            mistake_patterns,
            difficulty_states,
            reminder_tasks,
            dispatch_claims,
            notifications,
            digest_dedup,
            meta,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
