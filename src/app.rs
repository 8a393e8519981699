//! Application state for the dashboard TUI.
//!
//! The [`App`] owns the [`DataSourceManager`] and a read-only view of the
//! telemetry store. Each frame it pulls the latest snapshot if the store has
//! changed; rendering only ever reads that copy.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::{ConfigResolver, SourceConfig};
use crate::manager::DataSourceManager;
use crate::source::{SourceHooks, SourceKind};
use crate::telemetry::{TelemetrySnapshot, TelemetryStore, TelemetryView};
use crate::ui::Theme;

/// How long a temporary status message stays visible.
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(3);
/// How long a source error stays in the status bar.
const ERROR_TTL: Duration = Duration::from_secs(10);

/// Caller options to use when hot-swapping to each kind of source.
///
/// Built once from the command line; a kind with no entry switches with no
/// options, leaving everything to the global config and the environment.
#[derive(Debug, Clone, Default)]
pub struct SourceProfiles {
    options: HashMap<SourceKind, Map<String, Value>>,
}

impl SourceProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one option for `kind`.
    pub fn set(&mut self, kind: SourceKind, key: &str, value: impl Into<Value>) {
        self.options.entry(kind).or_default().insert(key.to_string(), value.into());
    }

    pub fn options(&self, kind: SourceKind) -> Map<String, Value> {
        self.options.get(&kind).cloned().unwrap_or_default()
    }
}

/// Most recent error reported by the active source.
#[derive(Debug, Clone, Default)]
struct LastError(Arc<Mutex<Option<(String, Instant)>>>);

impl LastError {
    fn hooks(&self) -> SourceHooks {
        let on_error = self.clone();
        let on_open = self.clone();
        SourceHooks::default()
            .with_on_error(move |err| {
                *on_error.0.lock() = Some((err.to_string(), Instant::now()));
            })
            .with_on_open(move || {
                on_open.clear();
            })
    }

    fn recent(&self) -> Option<String> {
        let guard = self.0.lock();
        match guard.as_ref() {
            Some((msg, at)) if at.elapsed() < ERROR_TTL => Some(msg.clone()),
            _ => None,
        }
    }

    fn clear(&self) {
        *self.0.lock() = None;
    }
}

/// Main application state.
#[derive(Debug)]
pub struct App {
    /// Whether the application is running
    pub running: bool,
    /// Show help overlay
    pub show_help: bool,
    /// Color theme (auto-detected or configured)
    pub theme: Theme,
    /// Temporary status message (message, timestamp)
    pub status_message: Option<(String, Instant)>,

    manager: DataSourceManager,
    view: TelemetryView,
    snapshot: TelemetrySnapshot,
    last_update: Option<Instant>,
    profiles: SourceProfiles,
    last_error: LastError,
}

impl App {
    /// Create the app. No source runs until [`App::start`].
    pub fn new(
        store: TelemetryStore,
        resolver: ConfigResolver,
        profiles: SourceProfiles,
        theme: Theme,
    ) -> Self {
        let last_error = LastError::default();
        let view = store.view();
        let snapshot = view.snapshot();
        let manager = DataSourceManager::with_resolver(store, resolver).with_hooks(last_error.hooks());

        Self {
            running: true,
            show_help: false,
            theme,
            status_message: None,
            manager,
            view,
            snapshot,
            last_update: None,
            profiles,
            last_error,
        }
    }

    /// Start the initial source. Must be called from within a tokio runtime.
    pub fn start(&mut self, overrides: Option<SourceConfig>) {
        let description = self.manager.init_data_source(overrides).description().to_string();
        self.set_status_message(format!("Started {}", description));
        self.refresh();
    }

    /// Hot-swap to `kind` using its profile options.
    pub fn switch_source(&mut self, kind: SourceKind) {
        self.last_error.clear();
        let options = self.profiles.options(kind);
        let adapter = self.manager.switch_data_source(kind.as_str(), options);
        let (active, description) = (adapter.kind(), adapter.description().to_string());

        if active == kind {
            self.set_status_message(format!("Switched to {}", description));
        } else {
            warn!(requested = %kind, active = %active, "source kind overridden by environment");
            self.set_status_message(format!("Environment keeps {} active", description));
        }
        self.refresh();
    }

    /// Restart the active source with its current options.
    pub fn restart_source(&mut self) {
        self.last_error.clear();
        let current = self.manager.current_data_source();
        let (kind, options) = (current.kind, current.options);
        let description = self.manager.switch_data_source(kind.as_str(), options).description().to_string();
        self.set_status_message(format!("Restarted {}", description));
        self.refresh();
    }

    /// Pull the latest snapshot if the store changed.
    ///
    /// Returns `true` if new data was taken.
    pub fn refresh(&mut self) -> bool {
        if !self.view.has_changed() {
            return false;
        }
        self.snapshot = self.view.snapshot_and_mark();
        self.last_update = Some(Instant::now());
        true
    }

    /// The snapshot the UI renders.
    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Number of writes the store has accepted.
    pub fn revision(&self) -> u64 {
        self.view.revision()
    }

    /// The active source's kind.
    pub fn current_kind(&self) -> SourceKind {
        self.manager.current_data_source().kind
    }

    /// Returns a description of the current data source.
    pub fn source_description(&self) -> String {
        match self.manager.current_data_source().adapter {
            Some(adapter) => adapter.description().to_string(),
            None => "no source".to_string(),
        }
    }

    /// The latest source error, if it is recent.
    pub fn recent_error(&self) -> Option<String> {
        self.last_error.recent()
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Get the current status message if it hasn't expired.
    pub fn get_status_message(&self) -> Option<&str> {
        match &self.status_message {
            Some((msg, time)) if time.elapsed() < STATUS_MESSAGE_TTL => Some(msg),
            _ => None,
        }
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Stop the active source.
    pub fn shutdown(&mut self) {
        self.manager.shutdown();
    }

    /// Export the current source and snapshot to a JSON file.
    pub fn export_state(&self, path: &Path) -> Result<()> {
        let current = self.manager.current_data_source();
        let export = json!({
            "exportedAt": chrono::Local::now().to_rfc3339(),
            "source": {
                "kind": current.kind,
                "description": current.adapter.map(|a| a.description().to_string()),
                "options": current.options,
            },
            "revision": self.view.revision(),
            "snapshot": &self.snapshot,
        });

        std::fs::write(path, serde_json::to_string_pretty(&export)?)?;
        info!(path = %path.display(), "exported dashboard state");
        Ok(())
    }
}
