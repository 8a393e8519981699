//! Synthetic data source.
//!
//! Generates plausible telemetry locally: it seeds every section of the
//! store, then keeps five independent timers running, one per section. Each
//! timer owns its own random generator, so a seeded run is reproducible
//! regardless of how the timers interleave.

use std::time::Duration;

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use tokio::time::{self, Instant};
use tracing::{debug, info};

use super::{SourceAdapter, SourceKind, TaskSet};
use crate::telemetry::{
    Alert, AlertLevel, DiskEntry, ResourceGauges, Server, ServerId, ServerState,
    TelemetrySnapshot, TelemetryWriter, TrafficSample,
};

const SERVER_COUNT: usize = 8;
const SEED_ALERTS: usize = 8;

const GAUGE_PERIOD: Duration = Duration::from_millis(2000);
const TRAFFIC_PERIOD: Duration = Duration::from_millis(1000);
const DISK_PERIOD: Duration = Duration::from_millis(2500);
const SERVER_PERIOD: Duration = Duration::from_millis(2500);
const ALERT_PERIOD: Duration = Duration::from_millis(3000);

const INBOUND_MAX: f64 = 220.0;
const OUTBOUND_MAX: f64 = 180.0;

const DISK_MOUNTS: [(&str, f64); 5] =
    [("/data", 72.0), ("/db", 58.0), ("/logs", 83.0), ("/backup", 45.0), ("/tmp", 38.0)];

const ALERT_SAMPLES: [&str; 10] = [
    "CPU usage above threshold",
    "Disk space below 10%",
    "Network latency rising",
    "Abnormal memory usage",
    "Service restarted successfully",
    "Connection drop detected",
    "Application response timeout",
    "DNS resolution failed",
    "Load balancer anomaly",
    "Write IO spike",
];

/// Options for [`SyntheticSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntheticOptions {
    /// Fixed seed for reproducible output. Entropy is used when unset.
    pub seed: Option<u64>,
}

impl SyntheticOptions {
    pub fn from_options(options: &Map<String, Value>) -> Self {
        let seed = match options.get("seed") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        Self { seed }
    }
}

/// A data source that fabricates telemetry.
///
/// # Example
///
/// ```
/// use opsdash::{SourceAdapter, SyntheticSource, TelemetryStore};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = TelemetryStore::new();
/// let options = json!({"seed": 7});
/// let mut source = SyntheticSource::new(options.as_object().unwrap(), store.writer());
/// source.start();
/// assert_eq!(store.view().borrow().server_status.len(), 8);
/// source.stop();
/// # });
/// ```
#[derive(Debug)]
pub struct SyntheticSource {
    options: SyntheticOptions,
    writer: TelemetryWriter,
    tasks: TaskSet,
    description: String,
}

impl SyntheticSource {
    pub fn new(options: &Map<String, Value>, writer: TelemetryWriter) -> Self {
        Self::with_options(SyntheticOptions::from_options(options), writer)
    }

    pub fn with_options(options: SyntheticOptions, writer: TelemetryWriter) -> Self {
        let description = match options.seed {
            Some(seed) => format!("synthetic (seed {})", seed),
            None => "synthetic".to_string(),
        };
        Self {
            options,
            writer,
            tasks: TaskSet::default(),
            description,
        }
    }

    /// Generator for one stream of values. Each timer gets its own stream.
    fn rng(&self, stream: u64) -> StdRng {
        match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }

    fn spawn_timer<F>(&mut self, period: Duration, mut rng: StdRng, mut tick: F)
    where
        F: FnMut(&mut TelemetrySnapshot, &mut StdRng) + Send + 'static,
    {
        let writer = self.writer.clone();
        self.tasks.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !writer.update(|state| tick(state, &mut rng)) {
                    debug!("synthetic timer stopped, writer revoked");
                    break;
                }
            }
        });
    }
}

impl SourceAdapter for SyntheticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn start(&mut self) {
        self.tasks.abort_all();

        let mut rng = self.rng(0);
        self.writer.update(|state| {
            seed_state(state, &mut rng);
            update_gauges(&mut state.resource_gauges, &mut rng);
            tick_traffic(state, &mut rng);
            update_disks(state, &mut rng);
            update_servers(&mut state.server_status, &mut rng);
            update_alerts(state, &mut rng);
        });

        let rng = self.rng(1);
        self.spawn_timer(GAUGE_PERIOD, rng, |s, rng| update_gauges(&mut s.resource_gauges, rng));
        let rng = self.rng(2);
        self.spawn_timer(TRAFFIC_PERIOD, rng, tick_traffic);
        let rng = self.rng(3);
        self.spawn_timer(DISK_PERIOD, rng, update_disks);
        let rng = self.rng(4);
        self.spawn_timer(SERVER_PERIOD, rng, |s, rng| update_servers(&mut s.server_status, rng));
        let rng = self.rng(5);
        self.spawn_timer(ALERT_PERIOD, rng, update_alerts);

        info!(seed = ?self.options.seed, "synthetic source started");
    }

    fn stop(&mut self) {
        if !self.tasks.is_empty() {
            info!("synthetic source stopped");
        }
        self.tasks.abort_all();
    }

    fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }
}

/// Fill every section with its starting values.
pub(crate) fn seed_state(state: &mut TelemetrySnapshot, rng: &mut StdRng) {
    state.resource_gauges = ResourceGauges { cpu: 28.0, mem: 46.0, disk: 62.0 };

    let mut inbound = (50.0 + rng.gen::<f64>() * 20.0).round();
    let mut outbound = (30.0 + rng.gen::<f64>() * 20.0).round();
    let samples: Vec<TrafficSample> = (0..state.network_traffic.window())
        .map(|_| {
            inbound = next_traffic(inbound, INBOUND_MAX, rng);
            outbound = next_traffic(outbound, OUTBOUND_MAX, rng);
            TrafficSample { label: String::new(), inbound, outbound }
        })
        .collect();
    state.network_traffic.replace(samples);

    state.disk_usage.replace(
        DISK_MOUNTS.iter().map(|(mount, used)| DiskEntry { mount: mount.to_string(), used: *used }),
    );

    state.server_status = (1..=SERVER_COUNT)
        .map(|n| Server {
            id: ServerId::Num(n as u64),
            name: format!("Server-{:02}", n),
            status: random_status(rng),
            cpu: 20.0 + (rng.gen::<f64>() * 60.0).round(),
            mem: 20.0 + (rng.gen::<f64>() * 60.0).round(),
        })
        .collect();

    state.alerts.clear();
    for _ in 0..SEED_ALERTS {
        state.alerts.push_front(random_alert(rng));
    }
}

fn update_gauges(gauges: &mut ResourceGauges, rng: &mut StdRng) {
    gauges.cpu = jitter(gauges.cpu, 10.0, 3.0, 97.0, rng);
    gauges.mem = jitter(gauges.mem, 10.0, 3.0, 97.0, rng);
    gauges.disk = jitter(gauges.disk, 10.0, 3.0, 97.0, rng);
}

fn tick_traffic(state: &mut TelemetrySnapshot, rng: &mut StdRng) {
    let (inbound, outbound) = state.network_traffic.last().unwrap_or((60.0, 40.0));
    state.network_traffic.push(TrafficSample {
        label: time_label(),
        inbound: next_traffic(inbound, INBOUND_MAX, rng),
        outbound: next_traffic(outbound, OUTBOUND_MAX, rng),
    });
}

fn update_disks(state: &mut TelemetrySnapshot, rng: &mut StdRng) {
    state.disk_usage.update_used(|used| jitter(used, 6.0, 5.0, 95.0, rng));
}

fn update_servers(servers: &mut [Server], rng: &mut StdRng) {
    for server in servers {
        if rng.gen_bool(0.2) {
            server.status = random_status(rng);
        }
        server.cpu = (server.cpu + (rng.gen::<f64>() - 0.5) * 15.0).round().clamp(1.0, 99.0);
        server.mem = (server.mem + (rng.gen::<f64>() - 0.5) * 12.0).round().clamp(1.0, 99.0);
    }
}

fn update_alerts(state: &mut TelemetrySnapshot, rng: &mut StdRng) {
    let burst = if rng.gen_bool(0.2) { 2 } else { 1 };
    for _ in 0..burst {
        state.alerts.push_front(random_alert(rng));
    }
}

/// Move `value` by a rounded random step of up to half `amplitude`.
fn jitter(value: f64, amplitude: f64, min: f64, max: f64, rng: &mut StdRng) -> f64 {
    let delta = ((rng.gen::<f64>() - 0.5) * amplitude).round();
    (value + delta).clamp(min, max)
}

fn next_traffic(current: f64, max: f64, rng: &mut StdRng) -> f64 {
    (current + (rng.gen::<f64>() - 0.5) * 20.0).round().clamp(2.0, max)
}

fn random_status(rng: &mut StdRng) -> ServerState {
    let r: f64 = rng.gen();
    if r < 0.12 {
        ServerState::Offline
    } else if r < 0.30 {
        ServerState::Warning
    } else {
        ServerState::Online
    }
}

fn random_level(rng: &mut StdRng) -> AlertLevel {
    let r: f64 = rng.gen();
    if r < 0.15 {
        AlertLevel::Critical
    } else if r < 0.45 {
        AlertLevel::Warn
    } else {
        AlertLevel::Info
    }
}

fn random_alert(rng: &mut StdRng) -> Alert {
    let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
    Alert {
        id: id.to_string(),
        level: random_level(rng),
        message: ALERT_SAMPLES[rng.gen_range(0..ALERT_SAMPLES.len())].to_string(),
        time: time_label(),
    }
}

fn time_label() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
