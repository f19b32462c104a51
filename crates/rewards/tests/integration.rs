use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use rand::rngs::StdRng;
use rand::SeedableRng;

use loya_rewards::{
    spin_wheel, AccountBook, ClaimMarker, ClaimOutcome, FixedClock, JsonFileStore, KeyValueStore,
    MemoryLedger, MemoryStore, OutcomeTable, RateLimiter, RateWindow, RejectReason, RewardError,
    RewardLedger, RewardLedgerGuard, RewardTransaction, StoreError, StoreLedger, DEFAULT_REWARDS,
};

const ONE_MS: i64 = 1;
const ONE_DAY_MS: i64 = 86_400_000;

fn day1() -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 9, 14, 10, 0, 0)
        .unwrap()
}

fn after_ms(base: DateTime<FixedOffset>, ms: i64) -> DateTime<FixedOffset> {
    base + Duration::milliseconds(ms)
}

// ---------------------------------------------------------------------------
// Test collaborators
// ---------------------------------------------------------------------------

/// Ledger that fails the first `failures` writes, then delegates.
struct FlakyLedger {
    inner: MemoryLedger,
    failures: AtomicUsize,
}

impl FlakyLedger {
    fn failing(times: usize) -> Self {
        Self {
            inner: MemoryLedger::in_memory(),
            failures: AtomicUsize::new(times),
        }
    }
}

impl RewardLedger for FlakyLedger {
    fn record_reward(
        &self,
        account_id: &str,
        amount: u64,
        at: DateTime<FixedOffset>,
    ) -> Result<(RewardTransaction, u64), RewardError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(RewardError::PersistenceFailure("backend unreachable".into()));
        }
        self.inner.record_reward(account_id, amount, at)
    }

    fn book(&self, account_id: &str) -> Result<AccountBook, RewardError> {
        self.inner.book(account_id)
    }
}

/// Ledger that parks inside `record_reward` until released.
struct ParkedLedger {
    inner: MemoryLedger,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl RewardLedger for ParkedLedger {
    fn record_reward(
        &self,
        account_id: &str,
        amount: u64,
        at: DateTime<FixedOffset>,
    ) -> Result<(RewardTransaction, u64), RewardError> {
        self.entered.lock().unwrap().send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        self.inner.record_reward(account_id, amount, at)
    }

    fn book(&self, account_id: &str) -> Result<AccountBook, RewardError> {
        self.inner.book(account_id)
    }
}

/// Marker store whose `set`/`remove` can be switched off.
struct BrittleStore {
    inner: MemoryStore<ClaimMarker>,
    writable: AtomicBool,
}

impl KeyValueStore<ClaimMarker> for BrittleStore {
    fn get(&self, key: &str) -> Result<Option<ClaimMarker>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: ClaimMarker) -> Result<(), StoreError> {
        if !self.writable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read-only".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<Option<ClaimMarker>, StoreError> {
        if !self.writable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read-only".into()));
        }
        self.inner.remove(key)
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

type MemoryGuard<L> = RewardLedgerGuard<Arc<MemoryStore<ClaimMarker>>, Arc<L>, Arc<FixedClock>>;

struct TestHarness<L> {
    guard: MemoryGuard<L>,
    markers: Arc<MemoryStore<ClaimMarker>>,
    ledger: Arc<L>,
    clock: Arc<FixedClock>,
}

fn setup_with<L: RewardLedger>(ledger: L) -> TestHarness<L> {
    let markers = Arc::new(MemoryStore::new());
    let ledger = Arc::new(ledger);
    let clock = Arc::new(FixedClock::new(day1()));
    TestHarness {
        guard: RewardLedgerGuard::new(markers.clone(), ledger.clone(), clock.clone()),
        markers,
        ledger,
        clock,
    }
}

fn setup() -> TestHarness<MemoryLedger> {
    setup_with(MemoryLedger::in_memory())
}

type FileGuard = RewardLedgerGuard<
    JsonFileStore<ClaimMarker>,
    StoreLedger<JsonFileStore<AccountBook>>,
    Arc<FixedClock>,
>;

fn temp_data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("loya-it-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

/// A guard over `claims.json` / `ledger.json` in `dir`, as one process would open it.
fn file_guard(dir: &Path, clock: Arc<FixedClock>) -> FileGuard {
    let markers = JsonFileStore::open(dir.join("claims.json")).unwrap();
    let books = JsonFileStore::open(dir.join("ledger.json")).unwrap();
    RewardLedgerGuard::new(markers, StoreLedger::new(books), clock)
}

fn accepted_amount(outcome: &ClaimOutcome) -> Option<u64> {
    match outcome {
        ClaimOutcome::Accepted { amount, .. } => Some(*amount),
        ClaimOutcome::Rejected(_) => None,
    }
}

// ===========================================================================
// Reward selector
// ===========================================================================

#[test]
fn test_reference_wheel_is_uniform() {
    let table = OutcomeTable::new(DEFAULT_REWARDS.to_vec()).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    let mut hits = vec![0u32; table.len()];
    for _ in 0..8000 {
        hits[spin_wheel(&table, &mut rng).index] += 1;
    }
    for (index, count) in hits.into_iter().enumerate() {
        let deviation = (count as f64 - 1000.0).abs() / 1000.0;
        assert!(deviation <= 0.15, "segment {index}: {count} hits");
    }
}

#[test]
fn test_spin_then_credit_flow() {
    let h = setup();
    let table = OutcomeTable::default();
    let mut rng = StdRng::seed_from_u64(7);
    let spin = spin_wheel(&table, &mut rng);

    let outcome = h.guard.credit("alice", spin.reward).unwrap();
    assert_eq!(accepted_amount(&outcome), Some(spin.reward));
    assert_eq!(h.ledger.balance("alice").unwrap(), spin.reward);
}

// ===========================================================================
// Daily claim guard
// ===========================================================================

#[test]
fn test_reference_claim_scenario() {
    let h = setup();
    let first = h.guard.credit_at("alice", 10, day1()).unwrap();
    assert_eq!(accepted_amount(&first), Some(10));

    let second = h.guard.credit_at("alice", 5, after_ms(day1(), ONE_MS)).unwrap();
    assert_eq!(
        second,
        ClaimOutcome::Rejected(RejectReason::AlreadyClaimedToday { claimed_at: day1() })
    );

    let next_day = h.guard.credit_at("alice", 5, after_ms(day1(), ONE_DAY_MS)).unwrap();
    assert_eq!(accepted_amount(&next_day), Some(5));

    assert_eq!(h.ledger.balance("alice").unwrap(), 15);
    assert_eq!(h.ledger.book("alice").unwrap().transactions.len(), 2);
}

#[test]
fn test_only_first_credit_of_day_mutates_marker() {
    let h = setup();
    h.guard.credit("alice", 3).unwrap();
    let marker = h.markers.get("alice").unwrap().unwrap();

    for minutes in [1, 30, 90, 600] {
        h.clock.set(day1() + Duration::minutes(minutes));
        assert!(!h.guard.credit("alice", 15).unwrap().is_accepted());
    }
    assert_eq!(h.markers.get("alice").unwrap(), Some(marker));
    assert_eq!(h.ledger.balance("alice").unwrap(), 3);
}

#[test]
fn test_later_days_reclaim_and_overwrite_marker() {
    let h = setup();
    h.guard.credit("alice", 2).unwrap();
    h.clock.advance(Duration::days(3));
    assert!(h.guard.credit("alice", 8).unwrap().is_accepted());

    let marker = h.markers.get("alice").unwrap().unwrap();
    assert_eq!(marker.claimed_at, day1() + Duration::days(3));
    assert_eq!(marker.amount, 8);
}

#[test]
fn test_accounts_claim_independently() {
    let h = setup();
    assert!(h.guard.credit("alice", 5).unwrap().is_accepted());
    assert!(h.guard.credit("bob", 5).unwrap().is_accepted());
    assert!(!h.guard.credit("alice", 5).unwrap().is_accepted());
}

#[test]
fn test_persistence_failure_rolls_back() {
    let h = setup_with(FlakyLedger::failing(1));

    let err = h.guard.credit("alice", 10).unwrap_err();
    assert!(matches!(err, RewardError::PersistenceFailure(_)));
    assert_eq!(h.markers.get("alice").unwrap(), None);
    assert!(!h.guard.status("alice").unwrap().claimed_today());

    // Retry the same day succeeds.
    h.clock.advance(Duration::minutes(1));
    let retry = h.guard.credit("alice", 10).unwrap();
    assert_eq!(accepted_amount(&retry), Some(10));
    assert_eq!(h.ledger.book("alice").unwrap().balance, 10);
}

#[test]
fn test_persistence_failure_restores_previous_marker() {
    let h = setup_with(FlakyLedger::failing(0));
    h.guard.credit("alice", 1).unwrap();
    let yesterday = h.markers.get("alice").unwrap().unwrap();

    h.ledger.failures.store(1, Ordering::SeqCst);
    h.clock.advance(Duration::days(1));
    assert!(h.guard.credit("alice", 10).is_err());
    assert_eq!(h.markers.get("alice").unwrap(), Some(yesterday));
}

#[test]
fn test_marker_write_failure_credits_nothing() {
    let markers = Arc::new(BrittleStore {
        inner: MemoryStore::new(),
        writable: AtomicBool::new(false),
    });
    let ledger = Arc::new(FlakyLedger::failing(0));
    let guard = RewardLedgerGuard::new(
        markers.clone(),
        ledger.clone(),
        Arc::new(FixedClock::new(day1())),
    );

    assert!(matches!(guard.credit("alice", 5), Err(RewardError::Store(_))));
    assert_eq!(ledger.book("alice").unwrap().balance, 0);

    markers.writable.store(true, Ordering::SeqCst);
    assert!(guard.credit("alice", 5).unwrap().is_accepted());
    assert_eq!(ledger.book("alice").unwrap().balance, 5);
}

#[test]
fn test_marker_stays_when_rollback_store_is_down() {
    struct DownAfterFirstSet {
        inner: MemoryStore<ClaimMarker>,
        sets: AtomicUsize,
    }

    impl KeyValueStore<ClaimMarker> for DownAfterFirstSet {
        fn get(&self, key: &str) -> Result<Option<ClaimMarker>, StoreError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: ClaimMarker) -> Result<(), StoreError> {
            if self.sets.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(StoreError::Unavailable("down".into()));
            }
            self.inner.set(key, value)
        }
        fn remove(&self, _key: &str) -> Result<Option<ClaimMarker>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    let markers = Arc::new(DownAfterFirstSet {
        inner: MemoryStore::new(),
        sets: AtomicUsize::new(0),
    });
    let guard = RewardLedgerGuard::new(
        markers.clone(),
        FlakyLedger::failing(1),
        Arc::new(FixedClock::new(day1())),
    );

    assert!(guard.credit("alice", 5).is_err());
    // The reservation could not be undone: the day is spent, no credit happened.
    assert!(guard.status("alice").unwrap().claimed_today());
    assert_eq!(guard.ledger().book("alice").unwrap().balance, 0);
    assert!(matches!(
        guard.credit("alice", 5).unwrap(),
        ClaimOutcome::Rejected(RejectReason::AlreadyClaimedToday { .. })
    ));
}

#[test]
fn test_reentrant_credit_rejected_while_in_flight() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let ledger = ParkedLedger {
        inner: MemoryLedger::in_memory(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };
    let h = setup_with(ledger);

    thread::scope(|s| {
        let first = s.spawn(|| h.guard.credit("alice", 10).unwrap());
        entered_rx.recv().unwrap();

        assert_eq!(
            h.guard.credit("alice", 10).unwrap(),
            ClaimOutcome::Rejected(RejectReason::InFlight)
        );
        // Other accounts are not blocked.
        assert!(matches!(h.guard.status("bob"), Ok(_)));

        release_tx.send(()).unwrap();
        assert!(first.join().unwrap().is_accepted());
    });

    assert_eq!(h.ledger.book("alice").unwrap().balance, 10);
}

#[test]
fn test_concurrent_credits_accept_exactly_one() {
    let h = setup();
    let threads = 16;
    let barrier = Barrier::new(threads);

    let accepted = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    h.guard.credit("alice", 5).unwrap().is_accepted()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|accepted| *accepted)
            .count()
    });

    assert_eq!(accepted, 1);
    assert_eq!(h.ledger.balance("alice").unwrap(), 5);
    assert_eq!(h.ledger.book("alice").unwrap().transactions.len(), 1);
}

#[test]
fn test_guards_sharing_a_data_dir_credit_once() {
    let dir = temp_data_dir("shared-guard");
    let clock = Arc::new(FixedClock::new(day1()));
    // Both opened before either claims, like a TUI left running while the CLI spins.
    let dashboard = file_guard(&dir, clock.clone());
    let oneshot = file_guard(&dir, clock.clone());

    assert_eq!(accepted_amount(&oneshot.credit("alice", 10).unwrap()), Some(10));
    assert!(matches!(
        dashboard.credit("alice", 15).unwrap(),
        ClaimOutcome::Rejected(RejectReason::AlreadyClaimedToday { .. })
    ));
    assert!(dashboard.status("alice").unwrap().claimed_today());

    let book = file_guard(&dir, clock.clone()).ledger().book("alice").unwrap();
    assert_eq!(book.balance, 10);
    assert_eq!(book.transactions.len(), 1);

    // Next day the other handle credits on top of the existing book.
    clock.advance(Duration::days(1));
    assert!(dashboard.credit("alice", 15).unwrap().is_accepted());
    assert_eq!(oneshot.ledger().book("alice").unwrap().balance, 25);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_file_guards_race_to_one_credit() {
    let dir = temp_data_dir("race-guard");
    let clock = Arc::new(FixedClock::new(day1()));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let guard = file_guard(&dir, clock.clone());
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                guard.credit("alice", 8).unwrap().is_accepted()
            })
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(file_guard(&dir, clock).ledger().book("alice").unwrap().balance, 8);
    let _ = fs::remove_dir_all(&dir);
}

// ===========================================================================
// Rate limiter
// ===========================================================================

#[test]
fn test_contact_form_throttle() {
    let clock = Arc::new(FixedClock::new(day1()));
    let limiter = RateLimiter::new(MemoryStore::<RateWindow>::new(), clock.clone());

    for _ in 0..3 {
        assert!(limiter.allow("ana@loya.com", 3, 60_000));
    }
    assert!(!limiter.allow("ana@loya.com", 3, 60_000));
    assert!(limiter.allow("anonymous", 3, 60_000));

    clock.advance(Duration::milliseconds(60_001));
    assert!(limiter.allow("ana@loya.com", 3, 60_000));
    assert_eq!(limiter.window("ana@loya.com").unwrap().unwrap().count, 1);
}

#[test]
fn test_rate_limiter_concurrent_admits_limit() {
    let clock = Arc::new(FixedClock::new(day1()));
    let limiter = RateLimiter::new(MemoryStore::<RateWindow>::new(), clock);
    let threads = 12;
    let barrier = Barrier::new(threads);

    let admitted = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    limiter.allow("login:ana@loya.com", 5, 60_000)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|admitted| *admitted)
            .count()
    });

    assert_eq!(admitted, 5);
}
