//! Polling data source.
//!
//! Fetches a snapshot payload from an HTTP endpoint on a fixed interval.
//! Only one request is ever in flight: starting a new fetch aborts the
//! previous one, and a sequence number checked under the same lock that
//! guards the write makes sure a superseded response is never applied.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{option_bool, option_str, SourceAdapter, SourceHooks, SourceKind, TaskSet};
use crate::duration::{duration_from_value, millis_from_value};
use crate::error::SourceError;
use crate::telemetry::TelemetryWriter;

const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials attached to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer(String),
}

/// Options for [`PollingSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollingOptions {
    /// URL to fetch. Without one every poll is skipped with a warning.
    pub endpoint: Option<String>,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    /// Period between polls; `None` disables periodic polling.
    pub interval: Option<Duration>,
    /// Fetch once as soon as the source starts.
    pub immediate: bool,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            method: Method::GET,
            headers: Vec::new(),
            interval: Some(DEFAULT_INTERVAL),
            immediate: true,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PollingOptions {
    /// Read options from a loosely typed map, falling back to defaults for
    /// anything missing or unusable.
    pub fn from_options(options: &Map<String, Value>) -> Self {
        let defaults = Self::default();

        let method = match option_str(options, "method") {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes()).unwrap_or_else(|_| {
                warn!(method = m, "invalid HTTP method, using GET");
                Method::GET
            }),
            None => defaults.method,
        };

        let headers = options
            .get("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            Value::Number(n) => n.to_string(),
                            Value::Bool(b) => b.to_string(),
                            _ => return None,
                        };
                        Some((name.clone(), value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Present but zero, negative or unparsable disables the timer
        let interval = match options.get("interval") {
            None | Some(Value::Null) => defaults.interval,
            Some(value) => millis_from_value(value)
                .filter(|ms| *ms > 0.0)
                .map(|ms| Duration::from_secs_f64(ms / 1_000.0)),
        };

        let credentials = match options.get("credentials") {
            Some(Value::String(token)) if !token.trim().is_empty() => {
                Some(Credentials::Bearer(token.trim().to_string()))
            }
            Some(Value::Object(creds)) => option_str(creds, "username").map(|username| {
                Credentials::Basic {
                    username: username.to_string(),
                    password: creds.get("password").and_then(Value::as_str).map(str::to_string),
                }
            }),
            _ => None,
        };

        Self {
            endpoint: option_str(options, "endpoint").map(str::to_string),
            method,
            headers,
            interval,
            immediate: option_bool(options, "immediate").unwrap_or(defaults.immediate),
            credentials,
            timeout: options.get("timeout").and_then(duration_from_value).unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    seq: u64,
    handle: Option<AbortHandle>,
}

#[derive(Debug)]
struct Poller {
    options: PollingOptions,
    client: Client,
    writer: TelemetryWriter,
    hooks: SourceHooks,
    in_flight: Mutex<InFlight>,
}

impl Poller {
    /// Start a fetch, superseding the one in flight.
    fn trigger(self: &Arc<Self>) -> JoinHandle<()> {
        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.handle.take() {
            previous.abort();
        }
        in_flight.seq += 1;
        let seq = in_flight.seq;

        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move { poller.fetch(seq).await });
        in_flight.handle = Some(handle.abort_handle());
        handle
    }

    /// Invalidate and abort whatever is in flight.
    fn cancel(&self) {
        let mut in_flight = self.in_flight.lock();
        in_flight.seq += 1;
        if let Some(handle) = in_flight.handle.take() {
            handle.abort();
        }
    }

    async fn fetch(&self, seq: u64) {
        let Some(endpoint) = self.options.endpoint.as_deref() else {
            warn!("polling source has no endpoint, skipping request");
            return;
        };

        let result = self.request(endpoint).await;

        let payload = {
            let mut in_flight = self.in_flight.lock();
            if in_flight.seq != seq {
                debug!(seq, current = in_flight.seq, "discarding superseded response");
                return;
            }
            in_flight.handle = None;
            match result {
                Ok(payload) => {
                    self.writer.apply(&payload);
                    payload
                }
                Err(err) => {
                    drop(in_flight);
                    error!(endpoint, error = %err, "polling request failed");
                    self.hooks.report_error(&err);
                    return;
                }
            }
        };

        debug!(endpoint, "applied polled snapshot");
        self.hooks.notify_data(&payload);
    }

    async fn request(&self, endpoint: &str) -> Result<Value, SourceError> {
        let mut request = self.client.request(self.options.method.clone(), endpoint);
        for (name, value) in &self.options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match &self.options.credentials {
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, password.as_deref())
            }
            Some(Credentials::Bearer(token)) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        match &self.hooks.transform {
            Some(transform) => transform(payload).await,
            None => Ok(payload),
        }
    }
}

/// A data source that polls an HTTP endpoint for snapshot payloads.
#[derive(Debug)]
pub struct PollingSource {
    poller: Arc<Poller>,
    tasks: TaskSet,
    running: bool,
    description: String,
}

impl PollingSource {
    pub fn new(options: &Map<String, Value>, writer: TelemetryWriter, hooks: SourceHooks) -> Self {
        Self::with_options(PollingOptions::from_options(options), writer, hooks)
    }

    pub fn with_options(options: PollingOptions, writer: TelemetryWriter, hooks: SourceHooks) -> Self {
        let description = match &options.endpoint {
            Some(endpoint) => format!("polling: {}", endpoint),
            None => "polling: (no endpoint)".to_string(),
        };

        let client = Client::builder().timeout(options.timeout).build().unwrap_or_else(|err| {
            warn!(error = %err, "failed to build HTTP client, using defaults");
            Client::new()
        });

        Self {
            poller: Arc::new(Poller {
                options,
                client,
                writer,
                hooks,
                in_flight: Mutex::new(InFlight::default()),
            }),
            tasks: TaskSet::default(),
            running: false,
            description,
        }
    }

    pub fn options(&self) -> &PollingOptions {
        &self.poller.options
    }

    /// Fetch right away, superseding any request in flight.
    ///
    /// The returned handle resolves once the response has been applied or
    /// discarded; it is cancelled if a later fetch supersedes this one.
    pub fn poll_now(&self) -> JoinHandle<()> {
        self.poller.trigger()
    }
}

impl SourceAdapter for PollingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Polling
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn start(&mut self) {
        self.stop();
        self.running = true;

        let options = &self.poller.options;
        info!(
            endpoint = options.endpoint.as_deref().unwrap_or("-"),
            interval_ms = options.interval.map(|d| d.as_millis() as u64),
            "polling source started"
        );

        if options.immediate {
            self.poller.trigger();
        }

        if let Some(period) = options.interval {
            let poller = Arc::clone(&self.poller);
            self.tasks.spawn(async move {
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if !poller.writer.is_current() {
                        debug!("polling timer stopped, writer revoked");
                        break;
                    }
                    poller.trigger();
                }
            });
        }
    }

    fn stop(&mut self) {
        self.tasks.abort_all();
        self.poller.cancel();
        if self.running {
            info!("polling source stopped");
        }
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for PollingSource {
    fn drop(&mut self) {
        self.poller.cancel();
    }
}
