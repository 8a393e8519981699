//! Common UI components shared across panels.
//!
//! This module contains the header bar, status bar, and help overlay.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::App;
use crate::duration::format_duration;
use crate::telemetry::TelemetrySnapshot;

/// Render the header bar.
///
/// Displays: title, wall clock, active source and a fleet summary.
pub fn render_header(frame: &mut Frame, app: &App, snapshot: &TelemetrySnapshot, area: Rect) {
    let clock = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let offline = snapshot
        .server_status
        .iter()
        .filter(|s| s.status == crate::telemetry::ServerState::Offline)
        .count();

    let fleet_style = if offline > 0 {
        Style::default().fg(app.theme.critical)
    } else {
        Style::default().fg(app.theme.healthy)
    };

    let line = Line::from(vec![
        Span::styled(" ● ", fleet_style),
        Span::styled("OPSDASH ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::raw(clock),
        Span::raw(" │ "),
        Span::styled(app.source_description(), Style::default().fg(app.theme.highlight)),
        Span::raw(" │ "),
        Span::styled(
            format!("{}", snapshot.server_status.len()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" servers "),
        Span::styled(format!("{}%", snapshot.online_rate()), fleet_style),
        Span::raw(" online"),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Render the status bar at the bottom.
///
/// Shows the latest source error or temporary status message if any,
/// otherwise time since last update and the available controls.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    if let Some(err) = app.recent_error() {
        let paragraph = Paragraph::new(format!(" Source error: {} | q:quit", err))
            .style(Style::default().fg(app.theme.critical));
        frame.render_widget(paragraph, area);
        return;
    }

    let controls = "1:synthetic 2:polling 3:streaming r:restart e:export ?:help q:quit";
    let status = match app.last_update() {
        Some(at) => format!(
            " Rev {} | Updated {} ago | {}",
            app.revision(),
            format_duration(at.elapsed()),
            controls
        ),
        None => format!(" Waiting for data... | {}", controls),
    };

    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));
    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
///
/// Displayed as a centered modal on top of the dashboard.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        Line::from(vec![Span::styled(
            " Data source",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  1         Synthetic generator"),
        Line::from("  2         HTTP polling"),
        Line::from("  3         Line stream"),
        Line::from("  r         Restart current source"),
        Line::from(""),
        Line::from(vec![Span::styled(
            " General",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  e         Export state to JSON"),
        Line::from("  ?         Toggle this help"),
        Line::from("  q / Esc   Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);

    let help_width = 40u16.min(area.width.saturating_sub(4));
    let help_height = 18u16.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(help_width)) / 2;
    let y = area.y + (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(x, y, help_width, help_height);

    frame.render_widget(Clear, help_area);
    frame.render_widget(paragraph, help_area);
}

/// A bordered panel block with the theme's styling.
pub fn panel<'a>(app: &App, title: impl Into<Line<'a>>) -> Block<'a> {
    let title: Line<'a> = title.into();
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(app.theme.border_style())
}
