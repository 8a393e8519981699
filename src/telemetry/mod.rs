//! Dashboard telemetry: the snapshot model, its normalizer and the shared store.

mod normalize;
mod snapshot;
mod store;

pub use normalize::apply_snapshot;
pub use snapshot::{
    clamp_percent, Alert, AlertFeed, AlertLevel, DiskEntry, DiskUsage, ResourceGauges, Server,
    ServerId, ServerState, TelemetrySnapshot, TrafficSample, TrafficSeries, DEFAULT_TRAFFIC_WINDOW,
    MAX_ALERT_ITEMS,
};
pub use store::{TelemetryStore, TelemetryView, TelemetryWriter};
