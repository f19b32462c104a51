use chrono::{DateTime, Duration, FixedOffset};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::time_until_next_reward;
use crate::clock::{local_date, Clock};
use crate::errors::RewardError;
use crate::ledger::RewardLedger;
use crate::state::{ClaimMarker, RewardTransaction};
use crate::store::KeyValueStore;

/// Result of a credit attempt that reached a decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The day's reward was credited. `transaction` is `None` for a zero
    /// reward, which still consumes the day.
    Accepted {
        amount: u64,
        balance: u64,
        transaction: Option<RewardTransaction>,
    },
    Rejected(RejectReason),
}

impl ClaimOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RejectReason {
    AlreadyClaimedToday { claimed_at: DateTime<FixedOffset> },
    /// Another credit for the same account has not finished yet.
    InFlight,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimState {
    Unclaimed,
    Claimed { claimed_at: DateTime<FixedOffset>, amount: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimStatus {
    pub state: ClaimState,
    pub next_reward_in: Duration,
}

impl ClaimStatus {
    pub fn claimed_today(&self) -> bool {
        matches!(self.state, ClaimState::Claimed { .. })
    }
}

/// Enforces one accepted daily reward per account per local calendar day.
///
/// A credit runs as: take the account's in-flight slot, check and write the
/// marker in one store update, record the reward in the ledger. If the ledger write
/// fails the previous marker is put back, so a retry the same day is
/// accepted. If putting it back also fails the account stays marked for the
/// day rather than risking a second credit.
pub struct RewardLedgerGuard<S, L, C> {
    markers: S,
    ledger: L,
    clock: C,
    in_flight: DashMap<String, ()>,
}

/// Releases an account's in-flight slot on every exit path.
struct InFlight<'a> {
    slots: &'a DashMap<String, ()>,
    account: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.slots.remove(self.account);
    }
}

impl<S, L, C> RewardLedgerGuard<S, L, C>
where
    S: KeyValueStore<ClaimMarker>,
    L: RewardLedger,
    C: Clock,
{
    pub fn new(markers: S, ledger: L, clock: C) -> Self {
        Self {
            markers,
            ledger,
            clock,
            in_flight: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn status(&self, account: &str) -> Result<ClaimStatus, RewardError> {
        let now = self.clock.now();
        let state = match self.markers.get(account)? {
            Some(marker) if is_same_day(&marker, &now) => ClaimState::Claimed {
                claimed_at: marker.claimed_at,
                amount: marker.amount,
            },
            _ => ClaimState::Unclaimed,
        };
        Ok(ClaimStatus {
            state,
            next_reward_in: time_until_next_reward(&now),
        })
    }

    /// Credit `amount` to `account` at the clock's current time.
    pub fn credit(&self, account: &str, amount: u64) -> Result<ClaimOutcome, RewardError> {
        self.credit_at(account, amount, self.clock.now())
    }

    pub fn credit_at(
        &self,
        account: &str,
        amount: u64,
        now: DateTime<FixedOffset>,
    ) -> Result<ClaimOutcome, RewardError> {
        let Some(_slot) = self.enter(account) else {
            tracing::debug!(account, "credit rejected: already in flight");
            return Ok(ClaimOutcome::Rejected(RejectReason::InFlight));
        };

        // Check and reserve in a single store update.
        let previous = self.markers.update(account, |current| match current {
            Some(marker) if is_same_day(marker, &now) => None,
            _ => Some(ClaimMarker {
                claimed_at: now,
                amount,
            }),
        })?;
        if let Some(marker) = previous.as_ref().filter(|m| is_same_day(m, &now)) {
            tracing::debug!(account, claimed_at = %marker.claimed_at, "credit rejected: already claimed today");
            return Ok(ClaimOutcome::Rejected(RejectReason::AlreadyClaimedToday {
                claimed_at: marker.claimed_at,
            }));
        }

        if amount == 0 {
            let balance = match self.ledger.book(account) {
                Ok(book) => book.balance,
                Err(e) => {
                    self.restore_marker(account, previous);
                    tracing::warn!(account, error = %e, "balance read failed after empty-segment claim");
                    return Err(e);
                }
            };
            tracing::info!(account, "daily reward claimed with empty segment");
            return Ok(ClaimOutcome::Accepted {
                amount,
                balance,
                transaction: None,
            });
        }

        match self.ledger.record_reward(account, amount, now) {
            Ok((transaction, balance)) => {
                tracing::info!(
                    account,
                    amount,
                    balance,
                    reference = %transaction.reference,
                    "daily reward credited"
                );
                Ok(ClaimOutcome::Accepted {
                    amount,
                    balance,
                    transaction: Some(transaction),
                })
            }
            Err(e) => {
                self.restore_marker(account, previous);
                tracing::warn!(account, amount, error = %e, "daily reward credit failed");
                Err(e)
            }
        }
    }

    fn enter<'a>(&'a self, account: &'a str) -> Option<InFlight<'a>> {
        match self.in_flight.entry(account.to_owned()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlight {
                    slots: &self.in_flight,
                    account,
                })
            }
        }
    }

    fn restore_marker(&self, account: &str, previous: Option<ClaimMarker>) {
        let restored = match previous {
            Some(marker) => self.markers.set(account, marker),
            None => self.markers.remove(account).map(|_| ()),
        };
        if let Err(e) = restored {
            tracing::error!(
                account,
                error = %e,
                "failed to roll back claim marker; account stays claimed for today"
            );
        }
    }
}

fn is_same_day(marker: &ClaimMarker, now: &DateTime<FixedOffset>) -> bool {
    local_date(&marker.claimed_at, now) == now.date_naive()
}
