//! Telemetry snapshot types.
//!
//! These types describe the dashboard's current values. Their serialized form
//! uses the same camelCase section names as the snapshot payloads consumed by
//! the normalizer, so a dumped snapshot can be fed straight back in.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of alerts kept in the feed.
pub const MAX_ALERT_ITEMS: usize = 50;

/// Default number of traffic samples kept in the rolling window.
pub const DEFAULT_TRAFFIC_WINDOW: usize = 60;

/// Clamp a value into the percentage range [0, 100].
pub fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// The complete dashboard state.
///
/// Every section is always present. Sections with invariants (parallel
/// arrays, bounded feeds) keep their storage private and only expose
/// mutators that preserve those invariants.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub resource_gauges: ResourceGauges,
    pub network_traffic: TrafficSeries,
    pub disk_usage: DiskUsage,
    pub server_status: Vec<Server>,
    pub alerts: AlertFeed,
}

impl TelemetrySnapshot {
    /// Create an empty snapshot whose traffic series keeps `window` samples.
    pub fn with_window(window: usize) -> Self {
        Self {
            network_traffic: TrafficSeries::with_window(window),
            ..Self::default()
        }
    }

    /// Percentage of servers currently online, rounded.
    pub fn online_rate(&self) -> u32 {
        let total = self.server_status.len();
        if total == 0 {
            return 0;
        }
        let online =
            self.server_status.iter().filter(|s| s.status == ServerState::Online).count();
        ((online as f64 / total as f64) * 100.0).round() as u32
    }
}

/// CPU, memory and disk utilisation, each in [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceGauges {
    pub cpu: f64,
    pub mem: f64,
    pub disk: f64,
}

/// A single network traffic sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSample {
    pub label: String,
    pub inbound: f64,
    pub outbound: f64,
}

/// Rolling window of inbound/outbound traffic.
///
/// `labels`, `inbound` and `outbound` always have the same length, which
/// never exceeds the window. The oldest samples are evicted first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSeries {
    #[serde(skip)]
    window: usize,
    labels: VecDeque<String>,
    inbound: VecDeque<f64>,
    outbound: VecDeque<f64>,
}

impl Default for TrafficSeries {
    fn default() -> Self {
        Self::with_window(DEFAULT_TRAFFIC_WINDOW)
    }
}

impl TrafficSeries {
    /// Create an empty series keeping at most `window` samples (minimum 1).
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            labels: VecDeque::with_capacity(window),
            inbound: VecDeque::with_capacity(window),
            outbound: VecDeque::with_capacity(window),
        }
    }

    /// Maximum number of samples retained.
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &VecDeque<String> {
        &self.labels
    }

    pub fn inbound(&self) -> &VecDeque<f64> {
        &self.inbound
    }

    pub fn outbound(&self) -> &VecDeque<f64> {
        &self.outbound
    }

    /// The most recent (inbound, outbound) pair.
    pub fn last(&self) -> Option<(f64, f64)> {
        Some((*self.inbound.back()?, *self.outbound.back()?))
    }

    /// Append a sample, evicting the oldest one when the window is full.
    pub fn push(&mut self, sample: TrafficSample) {
        self.labels.push_back(sample.label);
        self.inbound.push_back(non_negative(sample.inbound));
        self.outbound.push_back(non_negative(sample.outbound));
        while self.labels.len() > self.window {
            self.labels.pop_front();
            self.inbound.pop_front();
            self.outbound.pop_front();
        }
    }

    /// Replace the contents with `samples`, keeping only the newest that fit.
    pub fn replace<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = TrafficSample>,
    {
        self.clear();
        for sample in samples {
            self.push(sample);
        }
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        self.inbound.clear();
        self.outbound.clear();
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// A mount point and its usage percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskEntry {
    pub mount: String,
    pub used: f64,
}

/// Per-mount disk usage. `labels` and `used` always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskUsage {
    labels: Vec<String>,
    used: Vec<f64>,
}

impl DiskUsage {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn used(&self) -> &[f64] {
        &self.used
    }

    /// Iterate over `(mount, used)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.labels.iter().map(String::as_str).zip(self.used.iter().copied())
    }

    /// Replace all entries. Usage values are clamped into [0, 100].
    pub fn replace<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = DiskEntry>,
    {
        self.labels.clear();
        self.used.clear();
        for entry in entries {
            self.labels.push(entry.mount);
            self.used.push(finite_percent(entry.used));
        }
    }

    /// Rewrite every usage value in place. Results are clamped into [0, 100].
    pub fn update_used<F>(&mut self, mut f: F)
    where
        F: FnMut(f64) -> f64,
    {
        for value in &mut self.used {
            *value = finite_percent(f(*value));
        }
    }
}

fn finite_percent(value: f64) -> f64 {
    if value.is_finite() {
        clamp_percent(value)
    } else {
        0.0
    }
}

/// Server identifier. Payloads use either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerId {
    Num(u64),
    Text(String),
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerId::Num(n) => write!(f, "{}", n),
            ServerId::Text(s) => f.write_str(s),
        }
    }
}

/// Health of a single server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    #[default]
    Online,
    Warning,
    Offline,
}

impl ServerState {
    /// Map a free-form status string onto a known state.
    ///
    /// Matching is case-insensitive; anything unrecognized is `Online`.
    pub fn from_loose(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "offline" | "down" | "critical" | "error" | "failed" => ServerState::Offline,
            "warning" | "warn" | "degraded" | "partial" => ServerState::Warning,
            _ => ServerState::Online,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServerState::Online => "online",
            ServerState::Warning => "warning",
            ServerState::Offline => "offline",
        }
    }
}

/// One row of the server roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub status: ServerState,
    pub cpu: f64,
    pub mem: f64,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    Info,
    Warn,
    Critical,
}

impl AlertLevel {
    /// Map a free-form severity string onto a known level.
    ///
    /// Matching is case-insensitive; anything unrecognized is `Info`.
    pub fn from_loose(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" | "fatal" | "high" | "severe" => AlertLevel::Critical,
            "warning" | "warn" | "medium" => AlertLevel::Warn,
            _ => AlertLevel::Info,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warn => "warn",
            AlertLevel::Critical => "critical",
        }
    }
}

/// A single alert in the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub message: String,
    pub time: String,
}

/// Alerts ordered newest first, bounded to [`MAX_ALERT_ITEMS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AlertFeed {
    items: VecDeque<Alert>,
}

impl AlertFeed {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Alert> + '_ {
        self.items.iter()
    }

    /// Prepend a new alert, dropping the oldest when over capacity.
    pub fn push_front(&mut self, alert: Alert) {
        self.items.push_front(alert);
        self.items.truncate(MAX_ALERT_ITEMS);
    }

    /// Replace the feed with the first [`MAX_ALERT_ITEMS`] of `alerts`.
    pub fn replace<I>(&mut self, alerts: I)
    where
        I: IntoIterator<Item = Alert>,
    {
        self.items.clear();
        self.items.extend(alerts.into_iter().take(MAX_ALERT_ITEMS));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
