//! Theme configuration for the TUI.
//!
//! Supports light and dark themes with automatic terminal detection.

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::block::BorderType;

use crate::telemetry::{AlertLevel, ServerState};

/// Utilisation at or above this is shown as a warning.
const WARN_PERCENT: f64 = 75.0;
/// Utilisation at or above this is shown as critical.
const CRIT_PERCENT: f64 = 90.0;

/// Color and style theme for the TUI.
///
/// Use [`Theme::auto_detect()`] for automatic theme selection based on
/// terminal background, or [`Theme::dark()`]/[`Theme::light()`] explicitly.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Accent color for highlights and panel titles.
    pub highlight: Color,
    pub healthy: Color,
    pub warning: Color,
    pub critical: Color,
    /// Informational alerts.
    pub info: Color,
    pub border: Color,
    /// Inbound traffic series.
    pub inbound: Color,
    /// Outbound traffic series.
    pub outbound: Color,
    /// Style for header rows in tables.
    pub header: Style,
    pub border_type: BorderType,
}

impl Theme {
    /// Create a dark theme suitable for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self {
            highlight: Color::Cyan,
            healthy: Color::Green,
            warning: Color::Yellow,
            critical: Color::Red,
            info: Color::Gray,
            border: Color::Gray,
            inbound: Color::Cyan,
            outbound: Color::Magenta,
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            border_type: BorderType::Rounded,
        }
    }

    /// Create a light theme suitable for light terminal backgrounds.
    pub fn light() -> Self {
        Self {
            highlight: Color::Blue,
            healthy: Color::Green,
            warning: Color::Yellow,
            critical: Color::Red,
            info: Color::DarkGray,
            border: Color::DarkGray,
            inbound: Color::Blue,
            outbound: Color::Magenta,
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            border_type: BorderType::Rounded,
        }
    }

    /// Auto-detect based on terminal background
    pub fn auto_detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => Self::light(),
            _ => Self::dark(),
        }
    }

    pub fn server_style(&self, state: ServerState) -> Style {
        match state {
            ServerState::Online => Style::default().fg(self.healthy),
            ServerState::Warning => Style::default().fg(self.warning),
            ServerState::Offline => Style::default().fg(self.critical).add_modifier(Modifier::BOLD),
        }
    }

    pub fn alert_style(&self, level: AlertLevel) -> Style {
        match level {
            AlertLevel::Info => Style::default().fg(self.info),
            AlertLevel::Warn => Style::default().fg(self.warning),
            AlertLevel::Critical => Style::default().fg(self.critical).add_modifier(Modifier::BOLD),
        }
    }

    /// Style for a utilisation percentage.
    pub fn percent_style(&self, value: f64) -> Style {
        if value >= CRIT_PERCENT {
            Style::default().fg(self.critical)
        } else if value >= WARN_PERCENT {
            Style::default().fg(self.warning)
        } else {
            Style::default().fg(self.healthy)
        }
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.border)
    }
}
