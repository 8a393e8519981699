//! Resource gauges and per-mount disk usage.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::Line,
    widgets::{Bar, BarChart, BarGroup, Gauge, Paragraph},
    Frame,
};

use crate::app::App;
use crate::telemetry::{ResourceGauges, TelemetrySnapshot};
use crate::ui::common::panel;

/// Render CPU, memory and disk gauges stacked vertically.
pub fn render_gauges(frame: &mut Frame, app: &App, gauges: &ResourceGauges, area: Rect) {
    let block = panel(app, " Resources ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1); 3])
        .spacing(1)
        .split(inner);

    let entries = [("CPU", gauges.cpu), ("MEM", gauges.mem), ("DISK", gauges.disk)];
    for ((name, value), row) in entries.into_iter().zip(rows.iter()) {
        let gauge = Gauge::default()
            .gauge_style(app.theme.percent_style(value))
            .ratio((value / 100.0).clamp(0.0, 1.0))
            .label(format!("{} {:.1}%", name, value));
        frame.render_widget(gauge, *row);
    }
}

/// Render per-mount disk usage as a bar chart.
pub fn render_disks(frame: &mut Frame, app: &App, snapshot: &TelemetrySnapshot, area: Rect) {
    let block = panel(app, " Disk Usage ");

    if snapshot.disk_usage.is_empty() {
        let paragraph = Paragraph::new("No disks reported")
            .style(Style::default().add_modifier(Modifier::DIM))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let bars: Vec<Bar> = snapshot
        .disk_usage
        .iter()
        .map(|(mount, used)| {
            Bar::default()
                .value(used.round() as u64)
                .text_value(format!("{:.0}%", used))
                .label(Line::from(mount.to_string()))
                .style(app.theme.percent_style(used))
        })
        .collect();

    let count = bars.len() as u16;
    let inner_width = area.width.saturating_sub(2);
    let bar_width = (inner_width / count.max(1)).saturating_sub(1).clamp(3, 9);

    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1)
        .max(100);

    frame.render_widget(chart, area);
}
