use std::fs;
use std::io;
use std::time::{Duration as StdDuration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ratatui::prelude::*;

use loya_rewards::validation::{is_valid_email, rate_limit_identifier};
use loya_rewards::{
    format_countdown, segment_at, spin_wheel, time_until_next_reward, AccountBook, ClaimMarker,
    ClaimOutcome, ClaimStatus, Clock, DailyPrompt, JsonFileStore, RateLimiter,
    RateWindow, RejectReason, RewardLedger, RewardLedgerGuard, RewardTransaction, StoreLedger,
    SystemClock, WheelSpin,
};

use crate::config::Config;
use crate::ui;

pub type Guard =
    RewardLedgerGuard<JsonFileStore<ClaimMarker>, StoreLedger<JsonFileStore<AccountBook>>, SystemClock>;
pub type FormLimiter = RateLimiter<JsonFileStore<RateWindow>, SystemClock>;

const TICK: StdDuration = StdDuration::from_millis(50);
pub const SPIN_DURATION: StdDuration = StdDuration::from_millis(2400);
const RECENT_TRANSACTIONS: usize = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Wheel,
    Form,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    SignIn,
    Contact,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WheelPhase {
    Idle,
    Spinning { spin: WheelSpin, started: Instant },
    /// Stopped but not yet credited. Kept across screens so leaving the wheel
    /// does not re-roll the result.
    Landed(WheelSpin),
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct App {
    pub config: Config,
    pub guard: Guard,
    pub limiter: FormLimiter,
    pub account: String,
    rng: StdRng,

    pub screen: Screen,
    pub should_quit: bool,
    pub message_log: Vec<String>,

    // Cached account state
    pub balance: u64,
    pub recent: Vec<RewardTransaction>,
    pub status: Option<ClaimStatus>,
    pub prompt: DailyPrompt,
    pub last_refresh: Option<Instant>,

    pub wheel: WheelPhase,

    // Form state
    pub form_kind: Option<FormKind>,
    pub form_fields: Vec<(String, String)>,
    pub input_field: usize,
    pub input_buf: String,

    // Result state
    pub last_outcome: Option<ClaimOutcome>,
    pub balance_before: u64,
}

impl App {
    pub fn new(config: Config, account: String) -> Result<Self, String> {
        fs::create_dir_all(&config.data_dir)
            .map_err(|e| format!("Failed to create {}: {}", config.data_dir.display(), e))?;
        let markers = JsonFileStore::open(config.claims_path()).map_err(|e| e.to_string())?;
        let books = JsonFileStore::open(config.ledger_path()).map_err(|e| e.to_string())?;
        let windows = JsonFileStore::open(config.limits_path()).map_err(|e| e.to_string())?;
        let guard = RewardLedgerGuard::new(markers, StoreLedger::new(books), SystemClock);
        let prompt = DailyPrompt::new(guard.clock().now());

        let mut app = Self {
            config,
            guard,
            limiter: RateLimiter::new(windows, SystemClock),
            account,
            rng: StdRng::from_entropy(),
            screen: Screen::Dashboard,
            should_quit: false,
            message_log: Vec::new(),
            balance: 0,
            recent: Vec::new(),
            status: None,
            prompt,
            last_refresh: None,
            wheel: WheelPhase::Idle,
            form_kind: None,
            form_fields: Vec::new(),
            input_field: 0,
            input_buf: String::new(),
            last_outcome: None,
            balance_before: 0,
        };
        app.refresh();
        Ok(app)
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(target: "loya_tui", "{}", msg);
        self.message_log.push(msg);
        if self.message_log.len() > 100 {
            self.message_log.remove(0);
        }
    }

    pub fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
        while !self.should_quit {
            self.tick();
            terminal.draw(|frame| ui::draw(frame, self))?;

            if !event::poll(TICK)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    self.should_quit = true;
                    continue;
                }
                match self.screen {
                    Screen::Dashboard => self.handle_dashboard(key.code),
                    Screen::Wheel => self.handle_wheel(key.code),
                    Screen::Form => self.handle_form(key.code),
                    Screen::Result => self.handle_result(key.code),
                }
            }
        }
        Ok(())
    }

    /// Advance timers: the midnight prompt reset and the wheel animation.
    pub fn tick(&mut self) {
        if self.prompt.poll(self.guard.clock().now()) {
            self.push_log("A new daily reward is available");
            self.refresh();
        }

        if let WheelPhase::Spinning { spin, started } = &self.wheel {
            if started.elapsed() >= SPIN_DURATION {
                let spin = spin.clone();
                self.push_log(format!(
                    "Wheel stopped on segment {}: {}",
                    spin.index + 1,
                    format_loya(spin.reward)
                ));
                self.wheel = WheelPhase::Landed(spin);
            }
        }

        if self.screen == Screen::Dashboard && !self.prompt.shown_today() && self.can_spin() {
            self.prompt.mark_shown();
            self.open_wheel();
        }
    }

    // -----------------------------------------------------------------------
    // Dashboard
    // -----------------------------------------------------------------------

    fn handle_dashboard(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('s') => self.open_wheel(),
            KeyCode::Char('a') => self.enter_sign_in(),
            KeyCode::Char('c') => self.enter_contact(),
            KeyCode::Char('r') => {
                self.refresh();
                self.push_log("Refreshed");
            }
            _ => {}
        }
    }

    pub fn claimed_today(&self) -> bool {
        self.status.as_ref().is_some_and(ClaimStatus::claimed_today)
    }

    /// Unknown status (store read failed) counts as not spinnable.
    pub fn can_spin(&self) -> bool {
        self.status.as_ref().is_some_and(|s| !s.claimed_today())
    }

    pub fn countdown(&self) -> String {
        format_countdown(time_until_next_reward(&self.guard.clock().now()))
    }

    // -----------------------------------------------------------------------
    // Wheel
    // -----------------------------------------------------------------------

    fn open_wheel(&mut self) {
        if !self.can_spin() && self.wheel == WheelPhase::Idle {
            self.push_log(format!(
                "Daily reward already claimed. Next reward in {}",
                self.countdown()
            ));
            return;
        }
        self.screen = Screen::Wheel;
    }

    fn handle_wheel(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => self.screen = Screen::Dashboard,
            KeyCode::Enter | KeyCode::Char(' ') => match &self.wheel {
                WheelPhase::Idle => self.start_spin(),
                WheelPhase::Spinning { .. } => {}
                WheelPhase::Landed(spin) => {
                    let spin = spin.clone();
                    self.claim(spin);
                }
            },
            _ => {}
        }
    }

    pub fn start_spin(&mut self) {
        if !self.can_spin() {
            return;
        }
        let spin = spin_wheel(&self.config.rewards, &mut self.rng);
        tracing::debug!(index = spin.index, rotation = spin.rotation_degrees, "wheel spin started");
        self.push_log("Spinning...");
        self.wheel = WheelPhase::Spinning {
            spin,
            started: Instant::now(),
        };
    }

    /// Segment under the pointer right now, if the wheel has been spun.
    pub fn highlighted_segment(&self) -> Option<usize> {
        match &self.wheel {
            WheelPhase::Idle => None,
            WheelPhase::Spinning { spin, started } => {
                let angle = wheel_angle(spin.rotation_degrees, started.elapsed());
                Some(segment_at(&self.config.rewards, angle).unwrap_or(spin.index))
            }
            WheelPhase::Landed(spin) => Some(spin.index),
        }
    }

    pub fn claim(&mut self, spin: WheelSpin) {
        let before = self.balance;
        let outcome = match self.guard.credit(&self.account, spin.reward) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.push_log(format!("Claim failed: {}. Press Enter to retry.", e));
                return;
            }
        };

        match &outcome {
            ClaimOutcome::Accepted {
                amount,
                transaction: Some(tx),
                ..
            } => {
                self.push_log(format!(
                    "Claimed {} ({})",
                    format_loya(*amount),
                    short_reference(&tx.reference)
                ));
            }
            ClaimOutcome::Accepted { .. } => {
                self.push_log("Empty segment. Better luck tomorrow");
            }
            ClaimOutcome::Rejected(RejectReason::AlreadyClaimedToday { claimed_at }) => {
                self.push_log(format!(
                    "Already claimed today at {}",
                    claimed_at.format("%H:%M")
                ));
            }
            ClaimOutcome::Rejected(RejectReason::InFlight) => {
                self.push_log("A claim for this account is still being processed");
                return;
            }
        }

        self.wheel = WheelPhase::Idle;
        self.balance_before = before;
        self.last_outcome = Some(outcome);
        self.refresh();
        self.screen = Screen::Result;
    }

    // -----------------------------------------------------------------------
    // Forms
    // -----------------------------------------------------------------------

    fn handle_form(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => {
                self.screen = Screen::Dashboard;
                self.form_fields.clear();
            }
            KeyCode::Tab => {
                if !self.form_fields.is_empty() {
                    self.form_fields[self.input_field].1 = self.input_buf.clone();
                    self.input_field = (self.input_field + 1) % self.form_fields.len();
                    self.input_buf = self.form_fields[self.input_field].1.clone();
                }
            }
            KeyCode::Enter => {
                if !self.form_fields.is_empty() {
                    self.form_fields[self.input_field].1 = self.input_buf.clone();
                }
                self.submit_form();
            }
            KeyCode::Backspace => {
                self.input_buf.pop();
            }
            KeyCode::Char(c) => {
                self.input_buf.push(c);
            }
            _ => {}
        }
    }

    fn enter_form(&mut self, kind: FormKind, fields: &[&str]) {
        self.form_kind = Some(kind);
        self.form_fields = fields.iter().map(|f| (f.to_string(), String::new())).collect();
        self.input_field = 0;
        self.input_buf.clear();
        self.screen = Screen::Form;
    }

    fn enter_sign_in(&mut self) {
        self.enter_form(FormKind::SignIn, &["Email"]);
    }

    fn enter_contact(&mut self) {
        self.enter_form(FormKind::Contact, &["Email (optional)", "Message"]);
    }

    fn find_field_value(&self, prefix: &str) -> Option<String> {
        self.form_fields
            .iter()
            .find(|(label, _)| label.starts_with(prefix))
            .map(|(_, value)| value.clone())
    }

    fn submit_form(&mut self) {
        let Some(kind) = self.form_kind else {
            return;
        };
        let email = self.find_field_value("Email").unwrap_or_default();
        let result = match kind {
            FormKind::SignIn => self.sign_in(&email),
            FormKind::Contact => {
                let message = self.find_field_value("Message").unwrap_or_default();
                self.submit_contact(Some(&email), &message)
            }
        };
        match result {
            Ok(msg) => {
                self.push_log(msg);
                self.form_fields.clear();
                self.form_kind = None;
                self.screen = Screen::Dashboard;
            }
            // Stay on the form so the user can correct it.
            Err(e) => self.push_log(e),
        }
    }

    /// Switch the active account. Throttled per address with the login policy.
    pub fn sign_in(&mut self, email: &str) -> Result<String, String> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(format!("Invalid e-mail address: '{}'", email));
        }
        if !self
            .limiter
            .allow(&format!("login:{}", email), self.config.login_limit, self.config.login_window_ms)
        {
            return Err(format!("Too many sign-in attempts for {}. Try again later", email));
        }
        self.account = email.to_string();
        self.wheel = WheelPhase::Idle;
        self.prompt = DailyPrompt::new(self.guard.clock().now());
        self.refresh();
        Ok(format!("Signed in as {}", email))
    }

    /// Accept a contact message. Validation runs before the limiter so a
    /// malformed submission does not use up the sender's quota.
    pub fn submit_contact(&self, email: Option<&str>, message: &str) -> Result<String, String> {
        if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
            if !is_valid_email(email) {
                return Err(format!("Invalid e-mail address: '{}'", email));
            }
        }
        if message.trim().is_empty() {
            return Err("Message is empty".into());
        }
        let identifier = rate_limit_identifier(email);
        if !self
            .limiter
            .allow(
                &format!("contact:{}", identifier),
                self.config.contact_limit,
                self.config.contact_window_ms,
            )
        {
            return Err(format!("Too many messages from {}. Try again later", identifier));
        }
        tracing::info!(identifier, chars = message.chars().count(), "contact message accepted");
        Ok(format!("Message from {} received", identifier))
    }

    // -----------------------------------------------------------------------
    // Result
    // -----------------------------------------------------------------------

    fn handle_result(&mut self, _key: KeyCode) {
        self.screen = Screen::Dashboard;
        self.last_outcome = None;
    }

    // -----------------------------------------------------------------------
    // State refresh
    // -----------------------------------------------------------------------

    pub fn refresh(&mut self) {
        match self.guard.status(&self.account) {
            Ok(status) => self.status = Some(status),
            Err(e) => {
                self.status = None;
                self.push_log(format!("Failed to read claim status: {}", e));
            }
        }
        match self.guard.ledger().book(&self.account) {
            Ok(book) => {
                self.balance = book.balance;
                self.recent = book
                    .transactions
                    .iter()
                    .rev()
                    .take(RECENT_TRANSACTIONS)
                    .cloned()
                    .collect();
            }
            Err(e) => self.push_log(format!("Failed to read ledger: {}", e)),
        }
        self.last_refresh = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Wheel angle `elapsed` into the animation, easing out towards `target`.
pub fn wheel_angle(target: f64, elapsed: StdDuration) -> f64 {
    let t = (elapsed.as_secs_f64() / SPIN_DURATION.as_secs_f64()).clamp(0.0, 1.0);
    target * (1.0 - (1.0 - t).powi(3))
}

pub fn short_reference(reference: &str) -> String {
    if reference.len() <= 12 {
        return reference.to_string();
    }
    format!("{}..{}", &reference[..6], &reference[reference.len() - 4..])
}

pub fn format_loya(amount: u64) -> String {
    format!("{} LOYA", amount)
}

pub fn format_delta(before: u64, after: u64) -> String {
    if after >= before {
        format!("+{}", after - before)
    } else {
        format!("-{}", before - after)
    }
}
