//! Server roster table.

use ratatui::{
    layout::{Constraint, Rect},
    style::Style,
    text::Span,
    widgets::{Cell, Row, Table},
    Frame,
};

use crate::app::App;
use crate::telemetry::TelemetrySnapshot;
use crate::ui::common::panel;

/// Render the server table with the online rate in the title.
pub fn render(frame: &mut Frame, app: &App, snapshot: &TelemetrySnapshot, area: Rect) {
    let title = format!(
        " Servers ({}, {}% online) ",
        snapshot.server_status.len(),
        snapshot.online_rate()
    );

    let header = Row::new(vec!["Name", "Status", "CPU", "Mem"]).style(app.theme.header);

    let rows: Vec<Row> = snapshot
        .server_status
        .iter()
        .map(|server| {
            Row::new(vec![
                Cell::from(server.name.clone()),
                Cell::from(Span::styled(
                    server.status.label(),
                    app.theme.server_style(server.status),
                )),
                Cell::from(Span::styled(
                    format!("{:>5.1}%", server.cpu),
                    app.theme.percent_style(server.cpu),
                )),
                Cell::from(Span::styled(
                    format!("{:>5.1}%", server.mem),
                    app.theme.percent_style(server.mem),
                )),
            ])
        })
        .collect();

    let widths = [
        Constraint::Min(12),
        Constraint::Length(8),
        Constraint::Length(7),
        Constraint::Length(7),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(panel(app, Span::styled(title, Style::default().fg(app.theme.highlight))));

    frame.render_widget(table, area);
}
