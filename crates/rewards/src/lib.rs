//! Daily reward wheel and form throttling for the LOYA loyalty program.
//!
//! * [`OutcomeTable::spin`] / [`spin_wheel`] pick a wheel segment uniformly
//!   and derive the presentation angle from it.
//! * [`RewardLedgerGuard`] credits at most one reward per account per local
//!   calendar day.
//! * [`RateLimiter`] throttles form submissions per identifier with a fixed
//!   window.
//!
//! Storage, the reward ledger and the clock are injected, so hosts decide
//! where markers and balances live.

pub mod actions;
pub mod clock;
pub mod errors;
pub mod ledger;
pub mod state;
pub mod store;
pub mod validation;

pub use actions::*;
pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::{RewardError, StoreError};
pub use ledger::{MemoryLedger, RewardLedger, StoreLedger};
pub use state::*;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
