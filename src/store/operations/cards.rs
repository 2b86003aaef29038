use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;
use std::collections::HashSet;

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardOrigin {
    Manual,
    Mistake,
    System,
}

/// Spaced-repetition state for one reviewable item. Cards are only ever
/// superseded by their next update, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCard {
    pub id: String,
    pub owner_id: String,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub origin: CardOrigin,
    pub updated_at: DateTime<Utc>,
}

impl ReviewCard {
    /// Mastery estimate in percent: base credit for having started, up to
    /// 50 from repetitions, up to 30 from ease above the floor.
    pub fn mastery_percent(&self) -> u32 {
        let repetition_bonus = (self.repetitions.saturating_mul(10)).min(50) as f64;
        let ease_bonus = ((self.ease_factor - 1.3) / (2.5 - 1.3) * 30.0).clamp(0.0, 30.0);
        (20.0 + repetition_bonus + ease_bonus).round().min(100.0) as u32
    }
}

fn due_index_key_for_card(card: &ReviewCard) -> Result<String, StoreError> {
    keys::card_due_index_key(&card.owner_id, card.due_at.timestamp_millis(), &card.id)
}

impl Store {
    pub fn get_review_card(
        &self,
        owner_id: &str,
        card_id: &str,
    ) -> Result<Option<ReviewCard>, StoreError> {
        let key = keys::review_card_key(owner_id, card_id)?;
        match self.review_cards.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Persist a card and keep the due index in step. The old index entry
    /// (if any) is removed and the new one inserted in one transaction so a
    /// card is never visible under two due dates.
    pub fn set_review_card(&self, card: &ReviewCard) -> Result<(), StoreError> {
        let key = keys::review_card_key(&card.owner_id, &card.id)?;
        let value = Self::serialize(card)?;
        let next_due_index_key = due_index_key_for_card(card)?;

        (&self.review_cards, &self.card_due_index)
            .transaction(|(tx_cards, tx_due_index)| {
                if let Some(old_raw) = tx_cards.get(key.as_bytes())? {
                    let old_card: ReviewCard =
                        serde_json::from_slice(&old_raw).map_err(|error| {
                            sled::transaction::ConflictableTransactionError::Abort(
                                StoreError::Serialization(error),
                            )
                        })?;
                    let old_due_index_key = due_index_key_for_card(&old_card)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    tx_due_index.remove(old_due_index_key.as_bytes())?;
                }

                tx_cards.insert(key.as_bytes(), value.as_slice())?;
                tx_due_index.insert(next_due_index_key.as_bytes(), &[])?;

                Ok(())
            })
            .map_err(
                |error: sled::transaction::TransactionError<StoreError>| match error {
                    sled::transaction::TransactionError::Abort(store_error) => store_error,
                    sled::transaction::TransactionError::Storage(storage_error) => {
                        StoreError::Sled(storage_error)
                    }
                },
            )?;

        Ok(())
    }

    /// Cards due at or before `now`, ascending by due date.
    pub fn get_due_cards(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewCard>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let prefix = keys::card_due_index_prefix(owner_id)?;
        let now_ms = now.timestamp_millis().max(0);
        let mut due = Vec::with_capacity(limit);
        let mut seen_card_ids = HashSet::new();

        for item in self.card_due_index.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let Some((due_ts_ms, card_id)) = keys::parse_due_index_item_key(&key) else {
                continue;
            };

            if due_ts_ms > now_ms {
                break;
            }

            if let Some(card) = self.get_review_card(owner_id, &card_id)? {
                let card_due_ts_ms = card.due_at.timestamp_millis().max(0);
                if card_due_ts_ms == due_ts_ms
                    && card_due_ts_ms <= now_ms
                    && seen_card_ids.insert(card_id)
                {
                    due.push(card);
                    if due.len() >= limit {
                        break;
                    }
                }
            }
        }

        Ok(due)
    }
}
