use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Reward,
}

/// Immutable ledger entry. Never edited once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTransaction {
    /// `0x`-prefixed BLAKE3 digest identifying this entry.
    pub reference: String,
    pub kind: TransactionKind,
    pub account_id: String,
    pub amount: u64,
    pub timestamp: DateTime<FixedOffset>,
}

impl RewardTransaction {
    /// Build a reward entry. `sequence` disambiguates entries with identical
    /// content; ledgers pass their running transaction count.
    pub fn reward(account_id: &str, amount: u64, timestamp: DateTime<FixedOffset>, sequence: u64) -> Self {
        Self {
            reference: transaction_reference(account_id, amount, &timestamp, sequence),
            kind: TransactionKind::Reward,
            account_id: account_id.to_owned(),
            amount,
            timestamp,
        }
    }
}

pub fn transaction_reference(
    account_id: &str,
    amount: u64,
    timestamp: &DateTime<FixedOffset>,
    sequence: u64,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"loya:reward:");
    hasher.update(account_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(&amount.to_le_bytes());
    hasher.update(&timestamp.timestamp_millis().to_le_bytes());
    hasher.update(&sequence.to_le_bytes());
    format!("0x{}", hasher.finalize().to_hex())
}

/// Per-account balance and transaction log, written as one value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBook {
    pub balance: u64,
    pub transactions: Vec<RewardTransaction>,
}
