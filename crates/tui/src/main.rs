mod app;
mod config;
mod ui;

use std::io::{self, stdout};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use serde::Serialize;
use tracing::Level;

use loya_rewards::{
    format_countdown, spin_wheel, ClaimOutcome, ClaimState, RejectReason, RewardTransaction,
};

use config::Config;

#[derive(Parser)]
#[command(name = "loya-tui")]
#[command(about = "Daily reward wheel and account dashboard for the LOYA loyalty program")]
struct Cli {
    /// Account the rewards are credited to
    #[arg(long, global = true, default_value = "guest")]
    account: String,

    /// Directory for claim markers, the ledger and rate-limit windows (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand)]
enum Action {
    /// Balance, today's claim and the countdown to the next reward
    Status,
    /// Spin the wheel and claim today's reward
    Spin,
    /// Send a message through the rate-limited contact form
    Contact {
        /// Reply address; omitted senders share the anonymous quota
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        message: String,
    },
}

// ---------------------------------------------------------------------------
// JSON output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(tag = "type")]
enum CliOutput {
    #[serde(rename = "success")]
    Success {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    #[serde(rename = "noop")]
    Noop { action: String, message: String },
    #[serde(rename = "error")]
    Error { action: String, error: String },
    #[serde(rename = "status")]
    Status(AccountStatus),
}

#[derive(Serialize)]
struct AccountStatus {
    account: String,
    balance: u64,
    #[serde(flatten)]
    today: ClaimState,
    next_reward_in: String,
    transactions: Vec<RewardTransaction>,
}

fn print_output(output: &CliOutput) {
    match serde_json::to_string(output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_max_level(Level::DEBUG)
            .init();
    }

    let mut config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let app = app::App::new(config, cli.account).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    match cli.action {
        Some(action) => {
            run_oneshot(app, action);
            Ok(())
        }
        None => run_interactive(app),
    }
}

fn run_interactive(mut app: app::App) -> io::Result<()> {
    // Panic hook: always restore terminal.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;

    result
}

fn run_oneshot(mut app: app::App, action: Action) {
    let action_name = action_to_name(&action);
    let output = match action {
        Action::Status => build_status_output(&app),
        Action::Spin => spin_and_claim(&mut app),
        Action::Contact { email, message } => match app.submit_contact(email.as_deref(), &message) {
            Ok(msg) => CliOutput::Success {
                action: action_name.clone(),
                reference: None,
                details: Some(serde_json::json!({ "message": msg })),
            },
            Err(error) => CliOutput::Error {
                action: action_name.clone(),
                error,
            },
        },
    };

    print_output(&output);
    if matches!(output, CliOutput::Error { .. }) {
        std::process::exit(1);
    }
}

fn action_to_name(action: &Action) -> String {
    match action {
        Action::Status => "status",
        Action::Spin => "spin",
        Action::Contact { .. } => "contact",
    }
    .into()
}

fn spin_and_claim(app: &mut app::App) -> CliOutput {
    let action = "spin".to_string();
    if app.status.is_none() {
        return CliOutput::Error {
            action,
            error: "Claim status unavailable".into(),
        };
    }
    if !app.can_spin() {
        return CliOutput::Noop {
            action,
            message: format!("Already claimed today. Next reward in {}", app.countdown()),
        };
    }

    let spin = spin_wheel(&app.config.rewards, &mut rand::thread_rng());
    match app.guard.credit(&app.account, spin.reward) {
        Ok(ClaimOutcome::Accepted {
            amount,
            balance,
            transaction,
        }) => CliOutput::Success {
            action,
            reference: transaction.map(|tx| tx.reference),
            details: Some(serde_json::json!({
                "segment": spin.index,
                "rotation_degrees": spin.rotation_degrees,
                "amount": amount,
                "balance": balance,
            })),
        },
        Ok(ClaimOutcome::Rejected(RejectReason::AlreadyClaimedToday { claimed_at })) => CliOutput::Noop {
            action,
            message: format!("Already claimed today at {}", claimed_at.format("%H:%M")),
        },
        Ok(ClaimOutcome::Rejected(RejectReason::InFlight)) => CliOutput::Noop {
            action,
            message: "A claim for this account is still being processed".into(),
        },
        Err(e) => CliOutput::Error {
            action,
            error: e.to_string(),
        },
    }
}

fn build_status_output(app: &app::App) -> CliOutput {
    let Some(status) = &app.status else {
        return CliOutput::Error {
            action: "status".into(),
            error: "Claim status unavailable".into(),
        };
    };
    CliOutput::Status(AccountStatus {
        account: app.account.clone(),
        balance: app.balance,
        today: status.state.clone(),
        next_reward_in: format_countdown(status.next_reward_in),
        transactions: app.recent.clone(),
    })
}
