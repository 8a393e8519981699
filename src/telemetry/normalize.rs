//! Snapshot normalization.
//!
//! Payloads arrive from very different producers, so each logical value is
//! looked up under several alias keys. The first alias that is present and
//! not `null` wins. Sections are applied independently: a payload that only
//! carries `alerts` leaves every other section as it was.
//!
//! ## Payload shape
//!
//! ```text
//! resources | resourceGauges   { cpu, mem, disk }
//! traffic   | networkTraffic   { samples | series | points: [...], window }
//! diskUsage | disks            [...] or { entries | list: [...] }
//! servers   | serverStatus     [{ id, name, status, cpu, mem }]
//! alerts    | events           [{ id, level, message, time }]
//! ```

use std::collections::HashSet;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::snapshot::{
    clamp_percent, Alert, AlertLevel, DiskEntry, DiskUsage, ResourceGauges, Server, ServerId,
    ServerState, TelemetrySnapshot, TrafficSample, TrafficSeries,
};

const RESOURCES: &[&str] = &["resources", "resourceGauges"];
const CPU: &[&str] = &["cpu", "cpuUsage"];
const MEM: &[&str] = &["mem", "memory", "memUsage", "memoryUsage", "ram"];
const DISK: &[&str] = &["disk", "diskUsage", "storage", "diskPercent", "diskUse"];

const TRAFFIC: &[&str] = &["traffic", "networkTraffic"];
const SAMPLES: &[&str] = &["samples", "series", "points"];
const SAMPLE_LABEL: &[&str] = &["label", "time", "timestamp"];
const INBOUND: &[&str] = &["inbound", "in", "ingress", "inboundMbps", "rx"];
const OUTBOUND: &[&str] = &["outbound", "out", "egress", "outboundMbps", "tx"];
const WINDOW: &[&str] = &["window", "windowSize", "limit"];

const DISKS: &[&str] = &["diskUsage", "disks"];
const DISK_ENTRIES: &[&str] = &["entries", "list"];
const MOUNT: &[&str] = &["mount", "name", "path"];
const USED: &[&str] = &["used", "usage", "usedPercent", "value"];

const SERVERS: &[&str] = &["servers", "serverStatus"];
const SERVER_ID: &[&str] = &["id", "serverId", "uuid"];
const SERVER_NAME: &[&str] = &["name", "host", "hostname"];
const SERVER_STATUS: &[&str] = &["status", "state"];
const SERVER_CPU: &[&str] = &["cpu", "cpuUsage", "cpuPercent"];
const SERVER_MEM: &[&str] = &["mem", "memory", "memoryUsage", "memUsage"];

const ALERTS: &[&str] = &["alerts", "events"];
const ALERT_ID: &[&str] = &["id", "uuid", "eventId"];
const ALERT_LEVEL: &[&str] = &["level", "severity", "priority"];
const ALERT_MESSAGE: &[&str] = &["message", "title"];
const ALERT_TIME: &[&str] = &["time", "occurredAt", "timestamp", "createdAt"];

/// Apply a (possibly partial, possibly malformed) payload to `state`.
///
/// Never panics. A non-object payload is ignored, unknown section shapes are
/// skipped, and gauge values that fail to convert keep their previous value.
pub fn apply_snapshot(state: &mut TelemetrySnapshot, payload: &Value) {
    let Some(payload) = payload.as_object() else {
        return;
    };

    if let Some(resources) = first_present(payload, RESOURCES).and_then(Value::as_object) {
        apply_resources(&mut state.resource_gauges, resources);
    }

    if let Some(traffic) = first_present(payload, TRAFFIC).and_then(Value::as_object) {
        apply_traffic(&mut state.network_traffic, traffic);
    }

    if let Some(disks) = first_present(payload, DISKS) {
        apply_disks(&mut state.disk_usage, disks);
    }

    if let Some(servers) = first_present(payload, SERVERS).and_then(Value::as_array) {
        state.server_status = normalize_servers(servers);
    }

    if let Some(alerts) = first_present(payload, ALERTS).and_then(Value::as_array) {
        state.alerts.replace(normalize_alerts(alerts));
    }
}

fn apply_resources(gauges: &mut ResourceGauges, resources: &Map<String, Value>) {
    for (keys, slot) in [(CPU, &mut gauges.cpu), (MEM, &mut gauges.mem), (DISK, &mut gauges.disk)] {
        if let Some(value) = first_present(resources, keys).and_then(to_number) {
            *slot = clamp_percent(value);
        }
    }
}

fn apply_traffic(series: &mut TrafficSeries, traffic: &Map<String, Value>) {
    let Some(samples) = SAMPLES.iter().find_map(|key| traffic.get(*key).and_then(Value::as_array))
    else {
        return;
    };

    let samples: Vec<TrafficSample> = samples.iter().map(traffic_sample).collect();

    // Payload-declared window overrides the sample count; the series caps it
    // at its own configured window.
    let keep = first_present(traffic, WINDOW)
        .and_then(to_number)
        .map(f64::floor)
        .filter(|w| *w >= 1.0)
        .map(|w| w as usize)
        .unwrap_or(samples.len());
    let skip = samples.len().saturating_sub(keep);

    series.replace(samples.into_iter().skip(skip));
}

fn traffic_sample(item: &Value) -> TrafficSample {
    let empty = Map::new();
    let obj = item.as_object().unwrap_or(&empty);
    TrafficSample {
        label: first_present(obj, SAMPLE_LABEL).and_then(to_text).unwrap_or_default(),
        inbound: first_present(obj, INBOUND).and_then(to_number).unwrap_or(0.0),
        outbound: first_present(obj, OUTBOUND).and_then(to_number).unwrap_or(0.0),
    }
}

fn apply_disks(disks: &mut DiskUsage, container: &Value) {
    let entries = match container {
        Value::Array(items) => items,
        Value::Object(obj) => {
            match DISK_ENTRIES.iter().find_map(|key| obj.get(*key).and_then(Value::as_array)) {
                Some(items) => items,
                None => return,
            }
        }
        _ => return,
    };

    let objects: Vec<Option<&Map<String, Value>>> = entries.iter().map(Value::as_object).collect();
    let mounts = assign_unique(
        objects.iter().map(|o| o.and_then(|o| first_present(o, MOUNT)).and_then(to_text)).collect(),
        false,
        String::clone,
        |i| format!("/disk-{}", i + 1),
    );

    disks.replace(objects.iter().zip(mounts).map(|(obj, mount)| DiskEntry {
        mount,
        used: percent_or_zero(*obj, USED),
    }));
}

fn normalize_servers(items: &[Value]) -> Vec<Server> {
    let objects: Vec<Option<&Map<String, Value>>> = items.iter().map(Value::as_object).collect();

    let ids = assign_unique(
        objects.iter().map(|o| o.and_then(|o| first_present(o, SERVER_ID)).and_then(to_server_id)).collect(),
        true,
        ServerId::to_string,
        |i| ServerId::Num(i as u64 + 1),
    );
    let names = assign_unique(
        objects.iter().map(|o| o.and_then(|o| first_present(o, SERVER_NAME)).and_then(to_text)).collect(),
        false,
        String::clone,
        |i| format!("Server-{:02}", i + 1),
    );

    objects
        .iter()
        .zip(ids.into_iter().zip(names))
        .map(|(obj, (id, name))| Server {
            id,
            name,
            status: obj
                .and_then(|o| first_present(o, SERVER_STATUS))
                .and_then(to_text)
                .map(|s| ServerState::from_loose(&s))
                .unwrap_or_default(),
            cpu: percent_or_zero(*obj, SERVER_CPU),
            mem: percent_or_zero(*obj, SERVER_MEM),
        })
        .collect()
}

fn normalize_alerts(items: &[Value]) -> Vec<Alert> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    // Alerts without a usable message are dropped before ids are assigned.
    let kept: Vec<(&Map<String, Value>, String)> = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let message = first_present(obj, ALERT_MESSAGE).and_then(to_text)?;
            let message = message.trim();
            (!message.is_empty()).then(|| (obj, message.to_string()))
        })
        .take(super::snapshot::MAX_ALERT_ITEMS)
        .collect();

    let ids = assign_unique(
        kept.iter().map(|(obj, _)| first_present(obj, ALERT_ID).and_then(to_text)).collect(),
        true,
        String::clone,
        |i| format!("alert-{}", i),
    );

    kept.into_iter()
        .zip(ids)
        .map(|((obj, message), id)| Alert {
            id,
            level: first_present(obj, ALERT_LEVEL)
                .and_then(to_text)
                .map(|s| AlertLevel::from_loose(&s))
                .unwrap_or_default(),
            message,
            time: first_present(obj, ALERT_TIME).and_then(to_text).unwrap_or_else(|| now.clone()),
        })
        .collect()
}

/// Resolve every slot to a value unique within this update.
///
/// Explicit values are kept (duplicates too, unless `dedupe` is set, in which
/// case later duplicates fall back). Fallbacks start at their positional index
/// and move forward until they no longer collide with anything already taken.
fn assign_unique<T>(
    mut explicit: Vec<Option<T>>,
    dedupe: bool,
    key: impl Fn(&T) -> String,
    fallback: impl Fn(usize) -> T,
) -> Vec<T> {
    let mut taken = HashSet::new();
    for slot in explicit.iter_mut() {
        if let Some(value) = slot {
            if !taken.insert(key(value)) && dedupe {
                *slot = None;
            }
        }
    }

    explicit
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(value) => value,
            None => {
                let mut n = index;
                loop {
                    let candidate = fallback(n);
                    if taken.insert(key(&candidate)) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        })
        .collect()
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| obj.get(*key)).find(|value| !value.is_null())
}

fn percent_or_zero(obj: Option<&Map<String, Value>>, keys: &[&str]) -> f64 {
    clamp_percent(obj.and_then(|o| first_present(o, keys)).and_then(to_number).unwrap_or(0.0))
}

/// Convert a JSON value to a finite number.
///
/// Numbers, numeric strings and booleans convert; anything else fails.
fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_server_id(value: &Value) -> Option<ServerId> {
    match value {
        Value::Number(n) => Some(n.as_u64().map(ServerId::Num).unwrap_or_else(|| ServerId::Text(n.to_string()))),
        Value::String(s) if !s.trim().is_empty() => Some(ServerId::Text(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::snapshot::MAX_ALERT_ITEMS;
    use serde_json::json;

    fn state_with_gauges(cpu: f64, mem: f64, disk: f64) -> TelemetrySnapshot {
        let mut state = TelemetrySnapshot::default();
        state.resource_gauges = ResourceGauges { cpu, mem, disk };
        state
    }

    #[test]
    fn test_cpu_is_clamped() {
        let mut state = state_with_gauges(40.0, 50.0, 60.0);
        apply_snapshot(&mut state, &json!({"resources": {"cpu": 150}}));
        assert_eq!(state.resource_gauges.cpu, 100.0);
        assert_eq!(state.resource_gauges.mem, 50.0);
        assert_eq!(state.resource_gauges.disk, 60.0);
    }

    #[test]
    fn test_non_numeric_keeps_previous_value() {
        let mut state = state_with_gauges(40.0, 50.0, 60.0);
        apply_snapshot(&mut state, &json!({"resources": {"cpu": "abc", "mem": null, "ram": "-4"}}));
        assert_eq!(state.resource_gauges.cpu, 40.0);
        // null is skipped, so the `ram` alias is used and clamped
        assert_eq!(state.resource_gauges.mem, 0.0);
    }

    #[test]
    fn test_resource_aliases() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(
            &mut state,
            &json!({"resourceGauges": {"cpuUsage": "12.5", "memoryUsage": 33, "storage": true}}),
        );
        assert_eq!(state.resource_gauges, ResourceGauges { cpu: 12.5, mem: 33.0, disk: 1.0 });
    }

    #[test]
    fn test_first_alias_wins_even_when_invalid() {
        let mut state = state_with_gauges(10.0, 0.0, 0.0);
        apply_snapshot(&mut state, &json!({"resources": {"cpu": "n/a", "cpuUsage": 70}}));
        assert_eq!(state.resource_gauges.cpu, 10.0);
    }

    #[test]
    fn test_non_object_payload_is_ignored() {
        let mut state = state_with_gauges(1.0, 2.0, 3.0);
        let before = state.clone();
        for payload in [json!(null), json!(42), json!("cpu"), json!([1, 2, 3])] {
            apply_snapshot(&mut state, &payload);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn test_missing_sections_leave_state_untouched() {
        let mut state = state_with_gauges(1.0, 2.0, 3.0);
        apply_snapshot(
            &mut state,
            &json!({"alerts": [{"message": "disk full", "level": "high"}]}),
        );
        assert_eq!(state.resource_gauges.cpu, 1.0);
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(state.alerts.iter().next().unwrap().level, AlertLevel::Critical);
    }

    #[test]
    fn test_traffic_samples_and_aliases() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(
            &mut state,
            &json!({"networkTraffic": {"points": [
                {"time": "10:00:00", "rx": 12, "tx": "7"},
                {"label": "10:00:01", "ingress": -3, "egress": null},
            ]}}),
        );

        let traffic = &state.network_traffic;
        assert_eq!(traffic.len(), 2);
        assert_eq!(traffic.labels()[0], "10:00:00");
        assert_eq!(traffic.inbound().iter().copied().collect::<Vec<_>>(), vec![12.0, 0.0]);
        assert_eq!(traffic.outbound().iter().copied().collect::<Vec<_>>(), vec![7.0, 0.0]);
    }

    #[test]
    fn test_traffic_window_from_payload() {
        let mut state = TelemetrySnapshot::default();
        let samples: Vec<Value> =
            (0..10).map(|i| json!({"label": i.to_string(), "in": i, "out": i})).collect();
        apply_snapshot(&mut state, &json!({"traffic": {"samples": samples, "limit": 3}}));

        let labels: Vec<&str> =
            state.network_traffic.labels().iter().map(String::as_str).collect();
        assert_eq!(labels, vec!["7", "8", "9"]);
    }

    #[test]
    fn test_traffic_never_exceeds_configured_window() {
        let mut state = TelemetrySnapshot::with_window(60);
        let samples: Vec<Value> = (0..100).map(|i| json!({"in": i, "out": i})).collect();
        apply_snapshot(&mut state, &json!({"traffic": {"samples": samples.clone(), "window": 500}}));
        assert_eq!(state.network_traffic.len(), 60);
        assert_eq!(state.network_traffic.inbound().front(), Some(&40.0));

        for _ in 0..3 {
            apply_snapshot(&mut state, &json!({"traffic": {"series": samples}}));
            let t = &state.network_traffic;
            assert_eq!(t.labels().len(), t.inbound().len());
            assert_eq!(t.inbound().len(), t.outbound().len());
            assert!(t.len() <= 60);
        }
    }

    #[test]
    fn test_traffic_unknown_shape_is_untouched() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(&mut state, &json!({"traffic": {"samples": [{"in": 5, "out": 5}]}}));
        apply_snapshot(&mut state, &json!({"traffic": {"data": [{"in": 9}]}}));
        assert_eq!(state.network_traffic.len(), 1);
        assert_eq!(state.network_traffic.last(), Some((5.0, 5.0)));
    }

    #[test]
    fn test_disks_array_and_object_forms() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(
            &mut state,
            &json!({"disks": {"entries": [
                {"path": "/var", "usedPercent": 55},
                {"usage": 140},
            ]}}),
        );
        assert_eq!(state.disk_usage.labels(), &["/var".to_string(), "/disk-2".to_string()]);
        assert_eq!(state.disk_usage.used(), &[55.0, 100.0]);

        apply_snapshot(&mut state, &json!({"diskUsage": [{"mount": "/", "used": "12"}]}));
        assert_eq!(state.disk_usage.labels(), &["/".to_string()]);
        assert_eq!(state.disk_usage.used(), &[12.0]);

        apply_snapshot(&mut state, &json!({"diskUsage": {"rows": []}}));
        assert_eq!(state.disk_usage.len(), 1);
    }

    #[test]
    fn test_disk_fallback_mount_does_not_collide() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(
            &mut state,
            &json!({"disks": [{"used": 1}, {"mount": "/disk-1", "used": 2}]}),
        );
        let labels = state.disk_usage.labels();
        assert_eq!(labels.len(), 2);
        assert_ne!(labels[0], labels[1]);
        assert_eq!(labels[1], "/disk-1");
    }

    #[test]
    fn test_server_status_and_clamp() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(
            &mut state,
            &json!({"servers": [{"name": "X", "status": "DOWN", "cpu": 200}]}),
        );
        assert_eq!(state.server_status.len(), 1);
        let server = &state.server_status[0];
        assert_eq!(server.status, ServerState::Offline);
        assert_eq!(server.cpu, 100.0);
        assert_eq!(server.mem, 0.0);
        assert_eq!(server.name, "X");
        assert_eq!(server.id, ServerId::Num(1));
    }

    #[test]
    fn test_server_fallbacks_are_unique() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(
            &mut state,
            &json!({"serverStatus": [
                {"serverId": 2, "hostname": "db-1", "state": "degraded"},
                {"cpuPercent": 30},
                {"uuid": "edge", "memUsage": 45},
                {"id": 2},
            ]}),
        );

        let ids: Vec<String> = state.server_status.iter().map(|s| s.id.to_string()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "ids must be unique: {:?}", ids);
        assert_eq!(state.server_status[0].id, ServerId::Num(2));
        // Position 1 would fall back to 2, which is taken
        assert_eq!(state.server_status[1].id, ServerId::Num(3));
        assert_eq!(state.server_status[2].id, ServerId::Text("edge".into()));
        assert_eq!(state.server_status[0].status, ServerState::Warning);
        assert_eq!(state.server_status[1].name, "Server-02");
        assert_eq!(state.server_status[2].mem, 45.0);
    }

    #[test]
    fn test_alerts_normalized_and_bounded() {
        let mut state = TelemetrySnapshot::default();
        let events: Vec<Value> = (0..80)
            .map(|i| json!({"eventId": format!("e{}", i), "severity": "medium", "title": "latency up", "createdAt": "t"}))
            .collect();
        apply_snapshot(&mut state, &json!({"events": events}));

        assert_eq!(state.alerts.len(), MAX_ALERT_ITEMS);
        let first = state.alerts.iter().next().unwrap();
        assert_eq!(first.id, "e0");
        assert_eq!(first.level, AlertLevel::Warn);
        assert_eq!(first.message, "latency up");
        assert_eq!(first.time, "t");
        assert_eq!(state.alerts.iter().last().unwrap().id, "e49");
    }

    #[test]
    fn test_alerts_without_message_are_skipped() {
        let mut state = TelemetrySnapshot::default();
        apply_snapshot(
            &mut state,
            &json!({"alerts": [
                {"message": "   "},
                "not an object",
                {"message": "dns failure"},
                {"title": "restart ok", "id": "alert-0"},
            ]}),
        );

        let alerts: Vec<&Alert> = state.alerts.iter().collect();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].message, "dns failure");
        assert_eq!(alerts[0].level, AlertLevel::Info);
        assert!(!alerts[0].time.is_empty());
        assert_eq!(alerts[1].id, "alert-0");
        assert_ne!(alerts[0].id, alerts[1].id);
    }

    #[test]
    fn test_percentages_always_in_range() {
        let inputs = [json!(-1e9), json!(1e9), json!("55.5"), json!(0), json!(100), json!(false)];
        for input in inputs {
            let mut state = state_with_gauges(50.0, 50.0, 50.0);
            apply_snapshot(&mut state, &json!({"resources": {"cpu": input, "mem": input, "disk": input}}));
            let g = state.resource_gauges;
            for v in [g.cpu, g.mem, g.disk] {
                assert!((0.0..=100.0).contains(&v), "{} out of range", v);
            }
        }
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&json!(" 42 ")), Some(42.0));
        assert_eq!(to_number(&json!("NaN")), None);
        assert_eq!(to_number(&json!("inf")), None);
        assert_eq!(to_number(&json!("")), None);
        assert_eq!(to_number(&json!(true)), Some(1.0));
        assert_eq!(to_number(&json!({})), None);
    }
}
