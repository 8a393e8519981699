//! # opsdash
//!
//! A live operations dashboard and the library behind it.
//!
//! Telemetry (resource gauges, network traffic, disk usage, a server roster
//! and an alert feed) comes from one of three interchangeable sources and is
//! written into a shared store that the terminal UI renders from.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ┌──────────┐   config   ┌────────────────────┐             │
//! │  │  config  │──────────▶│ DataSourceManager  │             │
//! │  │(resolver)│            │  (one active src)  │             │
//! │  └──────────┘            └─────────┬──────────┘             │
//! │                                    │ writer lease           │
//! │                                    ▼                        │
//! │  Synthetic | Polling | Streaming ──▶ TelemetryStore         │
//! │            (source)                 (telemetry)             │
//! │                                         │ view              │
//! │                                         ▼                   │
//! │                           ┌─────────┐    ┌─────────┐        │
//! │                           │   app   │───▶│   ui    │        │
//! │                           │ (state) │    │(ratatui)│        │
//! │                           └─────────┘    └─────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`telemetry`]**: The snapshot model, the tolerant payload normalizer
//!   ([`apply_snapshot`]) and the store with its write leases and views
//! - **[`source`]**: The [`SourceAdapter`] trait and the synthetic, polling
//!   and streaming adapters
//! - **[`config`]**: Layered resolution of which source to run and with what
//!   options (global file, caller, environment)
//! - **[`manager`]**: Owns the active adapter and hot-swaps it
//! - **[`app`]**, **[`events`]**, **[`ui`]**: The terminal dashboard
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Synthetic data, reproducible
//! opsdash --seed 42
//!
//! # Poll an HTTP endpoint every two seconds
//! opsdash --source polling --endpoint http://localhost:8080/api/metrics --interval 2s
//!
//! # Follow a line-delimited JSON stream
//! opsdash --source streaming --url tcp://localhost:9100
//!
//! # Print one snapshot and exit
//! opsdash --dump --seed 1
//! ```
//!
//! ### As a library
//!
//! ```
//! use opsdash::{DataSourceManager, SourceKind, TelemetryStore};
//!
//! # tokio_test::block_on(async {
//! let store = TelemetryStore::new();
//! let view = store.view();
//! let mut manager = DataSourceManager::new(store);
//! manager.switch_data_source("synthetic", Default::default());
//!
//! assert_eq!(manager.current_data_source().kind, SourceKind::Synthetic);
//! assert_eq!(view.borrow().server_status.len(), 8);
//! manager.shutdown();
//! # });
//! ```
//!
//! ### Applying a payload by hand
//!
//! ```
//! use opsdash::TelemetryStore;
//! use serde_json::json;
//!
//! let store = TelemetryStore::new();
//! let writer = store.writer();
//! writer.apply(&json!({ "resources": { "cpu": "42.5", "memory": 130 } }));
//!
//! let state = store.view().snapshot();
//! assert_eq!(state.resource_gauges.cpu, 42.5);
//! assert_eq!(state.resource_gauges.mem, 100.0);
//! ```

pub mod app;
pub mod config;
pub mod duration;
pub mod error;
pub mod events;
pub mod manager;
pub mod source;
pub mod telemetry;
pub mod ui;

// Re-export main types for convenience
pub use app::{App, SourceProfiles};
pub use config::{ConfigResolver, Environment, ProcessEnvironment, ResolvedConfig, SourceConfig};
pub use error::SourceError;
pub use manager::{build_adapter, CurrentDataSource, DataSourceManager};
pub use source::{
    ConnectionState, Credentials, PollingOptions, PollingSource, SourceAdapter, SourceHooks,
    SourceKind, StreamingOptions, StreamingSource, SyntheticOptions, SyntheticSource,
};
pub use telemetry::{
    apply_snapshot, Alert, AlertLevel, Server, ServerId, ServerState, TelemetrySnapshot,
    TelemetryStore, TelemetryView, TelemetryWriter,
};
