//! Balance and transaction persistence for accepted rewards.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::errors::RewardError;
use crate::state::{AccountBook, RewardTransaction};
use crate::store::{KeyValueStore, MemoryStore};

/// Persistence collaborator of the claim guard.
///
/// `record_reward` must increase the balance and append the transaction as a
/// single unit: either both are visible afterwards or neither is.
pub trait RewardLedger: Send + Sync {
    /// Returns the appended transaction and the new balance.
    fn record_reward(
        &self,
        account_id: &str,
        amount: u64,
        at: DateTime<FixedOffset>,
    ) -> Result<(RewardTransaction, u64), RewardError>;

    fn book(&self, account_id: &str) -> Result<AccountBook, RewardError>;
}

impl<T: RewardLedger + ?Sized> RewardLedger for Arc<T> {
    fn record_reward(
        &self,
        account_id: &str,
        amount: u64,
        at: DateTime<FixedOffset>,
    ) -> Result<(RewardTransaction, u64), RewardError> {
        (**self).record_reward(account_id, amount, at)
    }

    fn book(&self, account_id: &str) -> Result<AccountBook, RewardError> {
        (**self).book(account_id)
    }
}

/// Ledger over any [`KeyValueStore`] of account books. Each reward is one
/// store `update`, so balance and history change together.
pub struct StoreLedger<S> {
    books: S,
}

pub type MemoryLedger = StoreLedger<MemoryStore<AccountBook>>;

impl MemoryLedger {
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: KeyValueStore<AccountBook>> StoreLedger<S> {
    pub fn new(books: S) -> Self {
        Self { books }
    }

    pub fn balance(&self, account_id: &str) -> Result<u64, RewardError> {
        Ok(self.book(account_id)?.balance)
    }
}

impl<S: KeyValueStore<AccountBook>> RewardLedger for StoreLedger<S> {
    fn record_reward(
        &self,
        account_id: &str,
        amount: u64,
        at: DateTime<FixedOffset>,
    ) -> Result<(RewardTransaction, u64), RewardError> {
        let mut recorded = None;
        self.books
            .update(account_id, |current| {
                let mut book = current.cloned().unwrap_or_default();
                let balance = book.balance.checked_add(amount)?;
                let tx = RewardTransaction::reward(account_id, amount, at, book.transactions.len() as u64);
                book.balance = balance;
                book.transactions.push(tx.clone());
                recorded = Some((tx, balance));
                Some(book)
            })
            .map_err(|e| RewardError::PersistenceFailure(e.to_string()))?;

        // Nothing recorded means the closure declined: the balance would overflow.
        recorded.ok_or_else(|| RewardError::PersistenceFailure(format!("balance overflow for {account_id}")))
    }

    fn book(&self, account_id: &str) -> Result<AccountBook, RewardError> {
        Ok(self.books.get(account_id)?.unwrap_or_default())
    }
}
