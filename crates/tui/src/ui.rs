use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};

use loya_rewards::{ClaimOutcome, ClaimState, Clock, RejectReason};

use crate::app::{self, App, FormKind, Screen, WheelPhase};

fn format_duration(secs: i64) -> String {
    if secs < 0 { return "0s".into(); }
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    if hours > 0 {
        if mins > 0 { format!("{}h {}m", hours, mins) } else { format!("{}h", hours) }
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs)
    }
}

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // title bar
            Constraint::Min(10),   // main content
            Constraint::Length(3),  // action bar
            Constraint::Length(6), // message log
        ])
        .split(frame.area());

    draw_title_bar(frame, app, chunks[0]);

    match app.screen {
        Screen::Dashboard => draw_dashboard(frame, app, chunks[1]),
        Screen::Wheel => draw_wheel(frame, app, chunks[1]),
        Screen::Form => draw_form(frame, app, chunks[1]),
        Screen::Result => draw_result(frame, app, chunks[1]),
    }

    draw_action_bar(frame, app, chunks[2]);
    draw_message_log(frame, app, chunks[3]);
}

fn draw_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let daily = match &app.status {
        Some(s) if s.claimed_today() => "Claimed",
        Some(_) => "Available",
        None => "Unknown",
    };
    let refresh_str = app
        .last_refresh
        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
        .unwrap_or_else(|| "never".into());

    let title = format!(
        " LOYA | {} | Balance: {} | Daily: {} | Last refresh: {} ",
        app.account,
        app::format_loya(app.balance),
        daily,
        refresh_str,
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(block, area);
}

fn draw_dashboard(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8), // daily reward panel
            Constraint::Min(5),   // transactions
        ])
        .split(area);

    draw_reward_panel(frame, app, chunks[0]);
    draw_transactions_panel(frame, app, chunks[1]);
}

fn draw_reward_panel(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Daily Reward ")
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(status) = &app.status else {
        let text = Paragraph::new("Claim status unavailable. Press [r] to retry.");
        frame.render_widget(text, inner);
        return;
    };

    let (state_span, claimed_line) = match &status.state {
        ClaimState::Unclaimed => (
            Span::styled("Available", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Line::from(Span::styled(
                "  Press [s] to spin the wheel.",
                Style::default().fg(Color::DarkGray),
            )),
        ),
        ClaimState::Claimed { claimed_at, amount } => {
            let ago = (app.guard.clock().now() - *claimed_at).num_seconds();
            (
                Span::styled("Claimed", Style::default().fg(Color::Yellow)),
                Line::from(vec![
                    Span::styled("  Won: ", Style::default().fg(Color::Gray)),
                    Span::raw(app::format_loya(*amount)),
                    Span::raw("    "),
                    Span::styled("At: ", Style::default().fg(Color::Gray)),
                    Span::raw(format!("{} ({} ago)", claimed_at.format("%H:%M"), format_duration(ago))),
                ]),
            )
        }
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("  Account: ", Style::default().fg(Color::Gray)),
            Span::raw(app.account.as_str()),
            Span::raw("    "),
            Span::styled("Balance: ", Style::default().fg(Color::Gray)),
            Span::styled(app::format_loya(app.balance), Style::default().fg(Color::Green)),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("  Today: ", Style::default().fg(Color::Gray)), state_span]),
        claimed_line,
        Line::from(vec![
            Span::styled("  Next reward in: ", Style::default().fg(Color::Gray)),
            Span::styled(app.countdown(), Style::default().fg(Color::Cyan)),
        ]),
    ];
    frame.render_widget(Paragraph::new(Text::from(lines)), inner);
}

fn draw_transactions_panel(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Recent Rewards ({}) ", app.recent.len()))
        .border_style(Style::default().fg(Color::Cyan));

    if app.recent.is_empty() {
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Paragraph::new("  No rewards yet."), inner);
        return;
    }

    let rows: Vec<Row> = app
        .recent
        .iter()
        .map(|tx| {
            Row::new(vec![
                Cell::from(tx.timestamp.format("%Y-%m-%d %H:%M").to_string()),
                Cell::from(format!("+{}", tx.amount)).style(Style::default().fg(Color::Green)),
                Cell::from(app::short_reference(&tx.reference)).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let header = Row::new(vec!["When", "Amount", "Reference"])
        .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));
    let widths = [Constraint::Length(18), Constraint::Length(10), Constraint::Min(14)];
    let table = Table::new(rows, widths).header(header).block(block);
    frame.render_widget(table, area);
}

fn draw_wheel(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(20)])
        .split(area);

    let highlighted = app.highlighted_segment();
    let rows: Vec<Row> = app
        .config
        .rewards
        .rewards()
        .iter()
        .enumerate()
        .map(|(i, reward)| {
            let active = highlighted == Some(i);
            let style = if active {
                Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(if active { "\u{25b6}" } else { " " }),
                Cell::from(format!("#{}", i + 1)),
                Cell::from(app::format_loya(*reward)),
            ])
            .style(style)
        })
        .collect();
    let widths = [Constraint::Length(2), Constraint::Length(4), Constraint::Min(8)];
    let table = Table::new(rows, widths).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Wheel ")
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(table, chunks[0]);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Spin ")
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(chunks[1]);
    frame.render_widget(block, chunks[1]);

    let lines = match &app.wheel {
        WheelPhase::Idle => vec![
            Line::from(""),
            Line::from("  One spin per day. Every segment is equally likely."),
            Line::from(""),
            Line::from(Span::styled(
                "  Press [Enter] to spin.",
                Style::default().fg(Color::Green),
            )),
        ],
        WheelPhase::Spinning { spin, started } => {
            let angle = app::wheel_angle(spin.rotation_degrees, started.elapsed());
            vec![
                Line::from(""),
                Line::from(Span::styled("  Spinning...", Style::default().fg(Color::Yellow))),
                Line::from(""),
                Line::from(vec![
                    Span::styled("  Rotation: ", Style::default().fg(Color::Gray)),
                    Span::raw(format!("{:.0}\u{b0}", angle)),
                ]),
            ]
        }
        WheelPhase::Landed(spin) => vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("  Landed on: ", Style::default().fg(Color::Gray)),
                Span::styled(
                    app::format_loya(spin.reward),
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(""),
            Line::from(Span::styled(
                "  Press [Enter] to claim.",
                Style::default().fg(Color::Green),
            )),
        ],
    };
    frame.render_widget(Paragraph::new(Text::from(lines)), inner);
}

fn draw_form(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.form_kind {
        Some(FormKind::SignIn) => " Sign In ",
        Some(FormKind::Contact) => " Contact Us ",
        None => " Form ",
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line> = Vec::new();

    for (i, (label, value)) in app.form_fields.iter().enumerate() {
        let is_active = i == app.input_field;
        let label_style = if is_active {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        let shown = if is_active {
            format!("{}_", app.input_buf)
        } else {
            value.clone()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {}: ", label), label_style),
            Span::raw(shown),
        ]));
        lines.push(Line::from(""));
    }

    lines.push(Line::from(Span::styled(
        "  [Enter] Submit  [Tab] Next field  [Esc] Cancel",
        Style::default().fg(Color::DarkGray),
    )));

    let para = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    frame.render_widget(para, inner);
}

fn draw_result(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Claim Result ")
        .border_style(Style::default().fg(Color::Green));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let headline = match &app.last_outcome {
        Some(ClaimOutcome::Accepted { amount: 0, .. }) => Line::from(Span::styled(
            "  Empty segment. Come back tomorrow!",
            Style::default().fg(Color::Yellow),
        )),
        Some(ClaimOutcome::Accepted { amount, .. }) => Line::from(Span::styled(
            format!("  You won {}!", app::format_loya(*amount)),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Some(ClaimOutcome::Rejected(RejectReason::AlreadyClaimedToday { claimed_at })) => {
            Line::from(Span::styled(
                format!("  Already claimed today at {}.", claimed_at.format("%H:%M")),
                Style::default().fg(Color::Red),
            ))
        }
        Some(ClaimOutcome::Rejected(RejectReason::InFlight)) | None => Line::from(""),
    };
    let reference = match &app.last_outcome {
        Some(ClaimOutcome::Accepted { transaction: Some(tx), .. }) => tx.reference.clone(),
        _ => "-".into(),
    };

    let header_lines = Paragraph::new(vec![
        Line::from(""),
        headline,
        Line::from(vec![
            Span::styled("  Reference: ", Style::default().fg(Color::Gray)),
            Span::styled(reference, Style::default().fg(Color::DarkGray)),
        ]),
    ]);
    frame.render_widget(header_lines, inner);

    let (before, after) = (app.balance_before, app.balance);
    let delta_color = if after > before { Color::Green } else { Color::DarkGray };
    let rows = vec![Row::new(vec![
        Cell::from("Balance").style(Style::default().fg(Color::Gray)),
        Cell::from(app::format_loya(before)),
        Cell::from(app::format_loya(after)),
        Cell::from(app::format_delta(before, after)).style(Style::default().fg(delta_color)),
    ])];
    let header = Row::new(vec!["", "Before", "After", "Delta"])
        .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))
        .bottom_margin(1);
    let widths = [
        Constraint::Length(10),
        Constraint::Length(14),
        Constraint::Length(14),
        Constraint::Length(10),
    ];
    let table_area = Rect {
        x: inner.x,
        y: inner.y + 4,
        width: inner.width,
        height: inner.height.saturating_sub(4),
    };
    frame.render_widget(Table::new(rows, widths).header(header), table_area);
}

fn draw_action_bar(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Actions ")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let line = match app.screen {
        Screen::Dashboard => {
            let mut spans = Vec::new();
            if app.can_spin() {
                spans.extend([action_key("[s]"), action_label("pin  ")]);
            }
            spans.extend([action_key("[a]"), action_label("ccount  ")]);
            spans.extend([action_key("[c]"), action_label("ontact  ")]);
            spans.extend([action_key("[r]"), action_label("efresh  ")]);
            spans.extend([action_key("[q]"), action_label("uit")]);
            Line::from(spans)
        }
        Screen::Wheel => match app.wheel {
            WheelPhase::Idle => Line::from(vec![
                action_key("[Enter]"), action_label("Spin  "),
                action_key("[Esc]"), action_label("Back"),
            ]),
            WheelPhase::Spinning { .. } => Line::from(vec![
                action_key("[Esc]"), action_label("Back"),
            ]),
            WheelPhase::Landed(_) => Line::from(vec![
                action_key("[Enter]"), action_label("Claim  "),
                action_key("[Esc]"), action_label("Back"),
            ]),
        },
        Screen::Form => Line::from(vec![
            action_key("[Enter]"), action_label("Submit  "),
            action_key("[Tab]"), action_label("Next  "),
            action_key("[Esc]"), action_label("Cancel"),
        ]),
        Screen::Result => Line::from(vec![action_label("Press any key to continue")]),
    };

    frame.render_widget(Paragraph::new(line), inner);
}

fn action_key(key: &str) -> Span<'_> {
    Span::styled(key, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
}

fn action_label(label: &str) -> Span<'_> {
    Span::styled(label, Style::default().fg(Color::White))
}

fn draw_message_log(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Log ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = app
        .message_log
        .iter()
        .map(|m| Line::from(format!(" > {}", m)))
        .collect();

    // Visual rows after wrapping, so the newest entry stays in view.
    let width = inner.width as usize;
    let total_rows: usize = lines
        .iter()
        .map(|line| {
            let len = line.width();
            if width == 0 { 1 } else { 1_usize.max(len.div_ceil(width)) }
        })
        .sum();

    let scroll = (total_rows as u16).saturating_sub(inner.height);

    let para = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(para, inner);
}
