//! Terminal UI rendering using ratatui.
//!
//! Every panel reads from the snapshot the [`App`] last pulled out of the
//! telemetry store; nothing here writes state.
//!
//! ## Submodules
//!
//! - [`resources`]: CPU/memory/disk gauges and the per-mount disk chart
//! - [`traffic`]: Inbound/outbound line chart
//! - [`servers`]: Server table with online rate
//! - [`alerts`]: Latest alerts, newest first
//! - [`common`]: Shared components (header, status bar, help overlay)
//! - [`theme`]: Light/dark theme support with terminal auto-detection
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Header (common::render_header)                   │
//! ├──────────────┬───────────────────────────────────┤
//! │ Resources    │ Traffic                           │
//! │              │                                   │
//! ├──────────────┼─────────────────┬─────────────────┤
//! │ Disk Usage   │ Servers         │ Alerts          │
//! │              │                 │                 │
//! ├──────────────┴─────────────────┴─────────────────┤
//! │ Status Bar (common::render_status_bar)           │
//! └──────────────────────────────────────────────────┘
//!         ↑
//!    Overlay rendered on top: common::render_help
//! ```

pub mod alerts;
pub mod common;
pub mod resources;
pub mod servers;
pub mod theme;
pub mod traffic;

pub use theme::Theme;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    widgets::Paragraph,
    Frame,
};

use crate::app::App;

/// Minimum terminal width for the dashboard.
pub const MIN_WIDTH: u16 = 80;
/// Minimum terminal height for the dashboard.
pub const MIN_HEIGHT: u16 = 20;

/// Draw the whole dashboard for one frame.
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = format!(
            "Terminal too small: {}x{}\nMinimum: {}x{}",
            area.width, area.height, MIN_WIDTH, MIN_HEIGHT
        );
        frame.render_widget(Paragraph::new(msg), area);
        return;
    }

    let snapshot = app.snapshot();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(45),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(rows[1]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(35),
            Constraint::Percentage(35),
        ])
        .split(rows[2]);

    common::render_header(frame, app, snapshot, rows[0]);
    resources::render_gauges(frame, app, &snapshot.resource_gauges, top[0]);
    traffic::render(frame, app, &snapshot.network_traffic, top[1]);
    resources::render_disks(frame, app, snapshot, bottom[0]);
    servers::render(frame, app, snapshot, bottom[1]);
    alerts::render(frame, app, snapshot, bottom[2]);
    common::render_status_bar(frame, app, rows[3]);

    if app.show_help {
        common::render_help(frame, app, area);
    }
}
