//! Data source abstraction for feeding the dashboard.
//!
//! A data source is anything that produces telemetry and writes it into the
//! shared store: a local generator, a polled HTTP endpoint or a persistent
//! push connection. The dashboard never knows which one is active; the
//! [`DataSourceManager`](crate::manager::DataSourceManager) owns exactly one
//! [`SourceAdapter`] at a time and swaps it on request.

mod polling;
mod streaming;
mod synthetic;

pub use polling::{Credentials, PollingOptions, PollingSource};
pub use streaming::{parse_address, ConnectionState, StreamingOptions, StreamingSource};
pub use synthetic::{SyntheticOptions, SyntheticSource};

use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::error::SourceError;

/// The three kinds of data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Synthetic,
    Polling,
    Streaming,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Synthetic, SourceKind::Polling, SourceKind::Streaming];

    /// Parse a kind name, case-insensitively.
    ///
    /// `random`, `rest` and `websocket` are accepted as aliases.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "random" => Some(SourceKind::Synthetic),
            "polling" | "rest" => Some(SourceKind::Polling),
            "streaming" | "websocket" => Some(SourceKind::Streaming),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Synthetic => "synthetic",
            SourceKind::Polling => "polling",
            SourceKind::Streaming => "streaming",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait implemented by every data source.
///
/// `start` spawns the adapter's background tasks on the current tokio
/// runtime, so it must be called from within one. `stop` aborts every task
/// the adapter created; it is idempotent and safe to call without `start`.
///
/// # Example
///
/// ```
/// use opsdash::{SourceAdapter, SyntheticSource, TelemetryStore};
///
/// # tokio_test::block_on(async {
/// let store = TelemetryStore::new();
/// let mut source = SyntheticSource::new(&Default::default(), store.writer());
/// source.start();
/// assert!(source.is_running());
/// source.stop();
/// # });
/// ```
pub trait SourceAdapter: Send + Sync + Debug {
    /// Which kind of source this is.
    fn kind(&self) -> SourceKind;

    /// Returns a human-readable description of the source.
    ///
    /// Used for display in the TUI header.
    fn description(&self) -> &str;

    /// Begin producing data.
    fn start(&mut self);

    /// Stop producing data and release every task.
    fn stop(&mut self);

    /// Whether the adapter currently owns running tasks.
    fn is_running(&self) -> bool;
}

pub type ErrorCallback = Arc<dyn Fn(&SourceError) + Send + Sync>;
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;
pub type DataCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub type TransformFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, SourceError>> + Send + Sync>;
pub type MessageMapper = Arc<dyn Fn(&str) -> Result<Option<Value>, SourceError> + Send + Sync>;
pub type HeartbeatFn = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// Programmatic callbacks handed to adapters.
///
/// Each adapter uses the hooks that apply to it and ignores the rest.
#[derive(Clone, Default)]
pub struct SourceHooks {
    pub on_error: Option<ErrorCallback>,
    pub on_data: Option<DataCallback>,
    pub on_open: Option<EventCallback>,
    pub on_close: Option<EventCallback>,
    pub transform: Option<TransformFn>,
    pub map_message: Option<MessageMapper>,
    pub heartbeat: Option<HeartbeatFn>,
}

impl Debug for SourceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHooks")
            .field("on_error", &self.on_error.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("transform", &self.transform.is_some())
            .field("map_message", &self.map_message.is_some())
            .field("heartbeat", &self.heartbeat.is_some())
            .finish()
    }
}

impl SourceHooks {
    pub fn with_on_error(mut self, f: impl Fn(&SourceError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn with_on_data(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_data = Some(Arc::new(f));
        self
    }

    pub fn with_on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    pub fn with_on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Set an async payload transform, run before normalization.
    pub fn with_transform<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, SourceError>> + Send + 'static,
    {
        self.transform = Some(Arc::new(move |value| f(value).boxed()));
        self
    }

    /// Set the inbound message mapper. `Ok(None)` drops the message.
    pub fn with_map_message(
        mut self,
        f: impl Fn(&str) -> Result<Option<Value>, SourceError> + Send + Sync + 'static,
    ) -> Self {
        self.map_message = Some(Arc::new(f));
        self
    }

    /// Set the heartbeat producer. Returning `None` skips that beat.
    pub fn with_heartbeat(mut self, f: impl Fn() -> Option<Value> + Send + Sync + 'static) -> Self {
        self.heartbeat = Some(Arc::new(f));
        self
    }

    pub(crate) fn report_error(&self, err: &SourceError) {
        if let Some(on_error) = &self.on_error {
            on_error(err);
        }
    }

    pub(crate) fn notify_data(&self, payload: &Value) {
        if let Some(on_data) = &self.on_data {
            on_data(payload);
        }
    }

    pub(crate) fn notify_open(&self) {
        if let Some(on_open) = &self.on_open {
            on_open();
        }
    }

    pub(crate) fn notify_close(&self) {
        if let Some(on_close) = &self.on_close {
            on_close();
        }
    }
}

/// Background tasks owned by one adapter. Dropping the set aborts them.
#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    handles: Vec<JoinHandle<()>>,
}

impl TaskSet {
    pub(crate) fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(task));
    }

    pub(crate) fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// True once every spawned task has returned or been aborted.
    pub(crate) fn all_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}

// Option readers shared by the adapters. Missing keys, nulls and values of
// the wrong type all read as `None`.

pub(crate) fn option_str<'a>(options: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn option_bool(options: &Map<String, Value>, key: &str) -> Option<bool> {
    match options.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}
