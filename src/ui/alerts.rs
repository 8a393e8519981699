//! Alert feed, newest first.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
    Frame,
};

use crate::app::App;
use crate::telemetry::TelemetrySnapshot;
use crate::ui::common::panel;

/// Number of alerts shown in the panel.
pub const VISIBLE_ALERTS: usize = 10;

pub fn render(frame: &mut Frame, app: &App, snapshot: &TelemetrySnapshot, area: Rect) {
    let items: Vec<ListItem> = snapshot
        .alerts
        .iter()
        .take(VISIBLE_ALERTS)
        .map(|alert| {
            let style = app.theme.alert_style(alert.level);
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<8} ", alert.time),
                    Style::default().add_modifier(Modifier::DIM),
                ),
                Span::styled(format!("{:<8} ", alert.level.label().to_uppercase()), style),
                Span::raw(alert.message.clone()),
            ]))
        })
        .collect();

    let title = format!(" Alerts ({}) ", snapshot.alerts.len());
    let list = List::new(items).block(panel(app, title));

    frame.render_widget(list, area);
}
