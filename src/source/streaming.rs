//! Streaming data source.
//!
//! Holds a persistent TCP connection carrying newline-delimited JSON in both
//! directions: snapshot payloads arrive one per line, heartbeats go out one
//! per line. A single supervisor task owns the connection and the reconnect
//! delay, so there is never more than one connection or pending reconnect.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{option_bool, option_str, SourceAdapter, SourceHooks, SourceKind, TaskSet};
use crate::duration::duration_from_value;
use crate::error::SourceError;
use crate::telemetry::TelemetryWriter;

const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Options for [`StreamingSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingOptions {
    /// `tcp://host:port` or `host:port`.
    pub url: Option<String>,
    /// Sent as the first line after connecting, to select a feed.
    pub protocol: Option<String>,
    pub reconnect: bool,
    pub reconnect_interval: Duration,
    pub heartbeat_interval: Option<Duration>,
    /// Strings are sent verbatim, anything else as JSON text.
    pub heartbeat_message: Value,
    /// Longer incoming lines are dropped and reported as parse errors.
    pub max_line_bytes: usize,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            url: None,
            protocol: None,
            reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            heartbeat_interval: None,
            heartbeat_message: Value::String("ping".to_string()),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl StreamingOptions {
    pub fn from_options(options: &Map<String, Value>) -> Self {
        let defaults = Self::default();

        let protocol = option_str(options, "protocol").map(str::to_string).or_else(|| {
            match options.get("protocols") {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Array(list)) => {
                    let names: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
                    (!names.is_empty()).then(|| names.join(","))
                }
                _ => None,
            }
        });

        Self {
            url: option_str(options, "url").map(str::to_string),
            protocol,
            reconnect: option_bool(options, "reconnect").unwrap_or(defaults.reconnect),
            reconnect_interval: options
                .get("reconnectInterval")
                .and_then(duration_from_value)
                .unwrap_or(defaults.reconnect_interval),
            heartbeat_interval: options.get("heartbeatInterval").and_then(duration_from_value),
            heartbeat_message: options
                .get("heartbeatMessage")
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or(defaults.heartbeat_message),
            max_line_bytes: options
                .get("maxLineBytes")
                .and_then(Value::as_u64)
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_line_bytes),
        }
    }
}

/// Lifecycle of the streaming connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Resolve a stream URL into a `host:port` address.
///
/// Accepts `tcp://host:port[/...]` and bare `host:port`. Any other scheme is
/// rejected.
pub fn parse_address(url: &str) -> Result<String, SourceError> {
    let url = url.trim();
    let rest = match url.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("tcp") => rest,
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("ws") || scheme.eq_ignore_ascii_case("wss") => {
            return Err(SourceError::InvalidUrl(format!(
                "websocket urls are not supported ({}), use tcp://host:port for a newline-delimited JSON feed",
                url
            )))
        }
        Some((scheme, _)) => {
            return Err(SourceError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}, use tcp://host:port",
                scheme, url
            )))
        }
        None => url,
    };

    let authority = rest.split('/').next().unwrap_or_default();
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(authority.to_string())
        }
        _ => Err(SourceError::InvalidUrl(format!("expected host:port in {}", url))),
    }
}

/// One unit read off the wire by [`LineReader`].
#[derive(Debug, PartialEq)]
enum Frame {
    Line(Vec<u8>),
    /// A line longer than the limit was skipped; carries the bytes dropped.
    Oversized(usize),
    Eof,
}

/// Splits a byte stream into newline-terminated lines of bounded length.
///
/// Partial lines stay buffered across calls, so `next_frame` can sit in a
/// `select!` next to the heartbeat timer without losing input.
struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    limit: usize,
    dropped: Option<usize>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R, limit: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::new(),
            limit,
            dropped: None,
        }
    }

    async fn next_frame(&mut self) -> io::Result<Frame> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                // A trailing line without a newline still counts
                if let Some(dropped) = self.dropped.take() {
                    return Ok(Frame::Oversized(dropped));
                }
                if !self.buf.is_empty() {
                    return Ok(Frame::Line(std::mem::take(&mut self.buf)));
                }
                return Ok(Frame::Eof);
            }

            let newline = available.iter().position(|b| *b == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            let used = chunk.len() + usize::from(newline.is_some());

            if let Some(dropped) = self.dropped.as_mut() {
                *dropped += chunk.len();
            } else if self.buf.len() + chunk.len() > self.limit {
                self.dropped = Some(self.buf.len() + chunk.len());
                self.buf = Vec::new();
            } else {
                self.buf.extend_from_slice(chunk);
            }
            self.inner.consume(used);

            if newline.is_some() {
                return Ok(match self.dropped.take() {
                    Some(dropped) => Frame::Oversized(dropped),
                    None => Frame::Line(std::mem::take(&mut self.buf)),
                });
            }
        }
    }
}

/// Everything the supervisor task needs.
struct Session {
    url: String,
    options: Arc<StreamingOptions>,
    writer: TelemetryWriter,
    hooks: SourceHooks,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl Session {
    async fn supervise(self) {
        loop {
            match parse_address(&self.url) {
                Ok(addr) => self.connect(&addr).await,
                Err(err) => {
                    error!(url = %self.url, error = %err, "cannot connect stream");
                    self.hooks.report_error(&err);
                }
            }
            self.state.send_replace(ConnectionState::Closed);

            if !self.options.reconnect || !self.writer.is_current() {
                break;
            }
            debug!(delay_ms = self.options.reconnect_interval.as_millis() as u64, "scheduling reconnect");
            time::sleep(self.options.reconnect_interval).await;
        }
    }

    async fn connect(&self, addr: &str) {
        self.state.send_replace(ConnectionState::Connecting);
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                let err = SourceError::Connection(format!("{}: {}", addr, e));
                error!(addr, error = %err, "stream connection failed");
                self.hooks.report_error(&err);
                return;
            }
        };

        info!(addr, "stream connected");
        self.state.send_replace(ConnectionState::Open);
        self.hooks.notify_open();

        self.run(stream).await;

        info!(addr, "stream closed");
        self.state.send_replace(ConnectionState::Closed);
        self.hooks.notify_close();
    }

    /// Pump one open connection until it closes or fails.
    async fn run(&self, stream: TcpStream) {
        let (reader, mut writer) = stream.into_split();

        if let Some(protocol) = &self.options.protocol {
            if let Err(e) = writer.write_all(format!("{}\n", protocol).as_bytes()).await {
                self.fail(SourceError::from(e));
                return;
            }
        }

        let mut lines = LineReader::new(reader, self.options.max_line_bytes);
        let mut heartbeat = self.options.heartbeat_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                frame = lines.next_frame() => match frame {
                    Ok(Frame::Line(bytes)) => self.handle_bytes(bytes),
                    Ok(Frame::Oversized(dropped)) => {
                        let err = SourceError::Parse(format!(
                            "stream message of {} bytes exceeds the {} byte limit",
                            dropped, self.options.max_line_bytes
                        ));
                        error!(error = %err, "dropping stream message");
                        self.hooks.report_error(&err);
                    }
                    Ok(Frame::Eof) => {
                        debug!("stream reached end of input");
                        break;
                    }
                    Err(e) => {
                        self.fail(SourceError::from(e));
                        break;
                    }
                },
                _ = next_beat(&mut heartbeat) => {
                    if let Err(err) = self.send_heartbeat(&mut writer).await {
                        self.fail(err);
                        break;
                    }
                }
            }
        }
    }

    fn handle_bytes(&self, bytes: Vec<u8>) {
        match String::from_utf8(bytes) {
            Ok(line) => self.handle_line(&line),
            Err(e) => {
                let err = SourceError::Parse(format!("stream message is not valid UTF-8: {}", e.utf8_error()));
                error!(error = %err, "dropping stream message");
                self.hooks.report_error(&err);
            }
        }
    }

    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let mapped = match &self.hooks.map_message {
            Some(map) => map(line),
            None => Ok(parse_json_line(line)),
        };

        match mapped {
            Ok(Some(payload)) => {
                if !self.writer.apply(&payload) {
                    debug!("dropping message, writer revoked");
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "failed to process stream message");
                self.hooks.report_error(&err);
            }
        }
    }

    async fn send_heartbeat(&self, writer: &mut OwnedWriteHalf) -> Result<(), SourceError> {
        let payload = match &self.hooks.heartbeat {
            Some(heartbeat) => match heartbeat() {
                Some(payload) => payload,
                None => return Ok(()),
            },
            None => self.options.heartbeat_message.clone(),
        };

        let mut text = match payload {
            Value::String(s) => s,
            other => other.to_string(),
        };
        text.push('\n');
        writer.write_all(text.as_bytes()).await?;
        Ok(())
    }

    fn fail(&self, err: SourceError) {
        error!(error = %err, "stream connection error");
        self.hooks.report_error(&err);
    }
}

/// Default message mapper: parse the line as JSON, ignoring garbage.
fn parse_json_line(line: &str) -> Option<Value> {
    match serde_json::from_str(line) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "ignoring stream message that is not JSON");
            None
        }
    }
}

async fn next_beat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// A data source fed by a persistent TCP connection.
#[derive(Debug)]
pub struct StreamingSource {
    options: Arc<StreamingOptions>,
    writer: TelemetryWriter,
    hooks: SourceHooks,
    state: Arc<watch::Sender<ConnectionState>>,
    tasks: TaskSet,
    description: String,
}

impl StreamingSource {
    pub fn new(options: &Map<String, Value>, writer: TelemetryWriter, hooks: SourceHooks) -> Self {
        Self::with_options(StreamingOptions::from_options(options), writer, hooks)
    }

    pub fn with_options(options: StreamingOptions, writer: TelemetryWriter, hooks: SourceHooks) -> Self {
        let description = match &options.url {
            Some(url) => format!("streaming: {}", url),
            None => "streaming: (no url)".to_string(),
        };
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            options: Arc::new(options),
            writer,
            hooks,
            state: Arc::new(state),
            tasks: TaskSet::default(),
            description,
        }
    }

    pub fn options(&self) -> &StreamingOptions {
        &self.options
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

impl SourceAdapter for StreamingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Streaming
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let Some(url) = self.options.url.clone() else {
            warn!("streaming source has no url, not connecting");
            return;
        };

        // Clear out a supervisor that already gave up
        self.tasks.abort_all();
        info!(url = %url, reconnect = self.options.reconnect, "streaming source started");
        let session = Session {
            url,
            options: Arc::clone(&self.options),
            writer: self.writer.clone(),
            hooks: self.hooks.clone(),
            state: Arc::clone(&self.state),
        };
        self.tasks.spawn(session.supervise());
    }

    fn stop(&mut self) {
        if self.is_running() {
            info!("streaming source stopped");
        }
        self.tasks.abort_all();
        self.state.send_replace(ConnectionState::Idle);
    }

    fn is_running(&self) -> bool {
        !self.tasks.is_empty() && !self.tasks.all_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn options(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    fn error_channel() -> (SourceHooks, mpsc::UnboundedReceiver<SourceError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hooks = SourceHooks::default().with_on_error(move |err| {
            let _ = tx.send(err.clone());
        });
        (hooks, rx)
    }

    async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
        time::timeout(WAIT, rx.wait_for(|s| *s == state)).await.unwrap().unwrap();
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("tcp://127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert_eq!(parse_address("TCP://metrics.local:7000/feed").unwrap(), "metrics.local:7000");
        assert_eq!(parse_address(" localhost:80 ").unwrap(), "localhost:80");
        assert_eq!(parse_address("[::1]:9000").unwrap(), "[::1]:9000");
        match parse_address("ws://localhost:80") {
            Err(SourceError::InvalidUrl(msg)) => {
                assert!(msg.contains("websocket"), "{}", msg);
                assert!(msg.contains("tcp://host:port"), "{}", msg);
            }
            other => panic!("expected InvalidUrl, got {:?}", other),
        }
        assert!(matches!(parse_address("http://localhost:80"), Err(SourceError::InvalidUrl(_))));
        assert!(matches!(parse_address("localhost"), Err(SourceError::InvalidUrl(_))));
        assert!(matches!(parse_address("localhost:http"), Err(SourceError::InvalidUrl(_))));
        assert!(matches!(parse_address(":9000"), Err(SourceError::InvalidUrl(_))));
    }

    #[test]
    fn test_options() {
        let opts = StreamingOptions::from_options(&Map::new());
        assert_eq!(opts, StreamingOptions::default());
        assert_eq!(opts.heartbeat_message, json!("ping"));

        let opts = StreamingOptions::from_options(&options(json!({
            "url": "tcp://localhost:9000",
            "protocols": ["dashboard.v2", "dashboard.v1"],
            "reconnect": false,
            "reconnectInterval": "abc",
            "heartbeatInterval": 15000,
            "heartbeatMessage": {"type": "ping"},
            "maxLineBytes": 4096,
        })));
        assert_eq!(opts.url.as_deref(), Some("tcp://localhost:9000"));
        assert_eq!(opts.max_line_bytes, 4096);
        assert_eq!(opts.protocol.as_deref(), Some("dashboard.v2,dashboard.v1"));
        assert!(!opts.reconnect);
        assert_eq!(opts.reconnect_interval, Duration::from_millis(5000));
        assert_eq!(opts.heartbeat_interval, Some(Duration::from_secs(15)));
        assert_eq!(opts.heartbeat_message, json!({"type": "ping"}));

        let opts = StreamingOptions::from_options(&options(json!({"maxLineBytes": 0})));
        assert_eq!(opts.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
    }

    #[tokio::test]
    async fn test_line_reader_bounds_lines() {
        let input = b"short\nthis line is far too long\nok\r\npartial";
        let mut reader = LineReader::new(&input[..], 8);
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Line(b"short".to_vec()));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Oversized(25));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Line(b"ok\r".to_vec()));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Line(b"partial".to_vec()));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Eof);
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn test_line_reader_joins_split_reads() {
        use tokio::io::AsyncReadExt;

        // Lines arrive across read boundaries
        let input = (&b"abc"[..]).chain(&b"def\nghij"[..]).chain(&b"klmnop\nq\n"[..]);
        let mut reader = LineReader::new(input, 8);
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Line(b"abcdef".to_vec()));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Oversized(10));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Line(b"q".to_vec()));
        assert_eq!(reader.next_frame().await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn test_messages_are_applied() {
        let (listener, addr) = listener().await;
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let hooks = SourceHooks::default().with_on_open(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let store = TelemetryStore::new();
        let mut view = store.view();
        let mut source = StreamingSource::new(
            &options(json!({"url": format!("tcp://{}", addr)})),
            store.writer(),
            hooks,
        );
        source.start();
        assert!(source.is_running());

        let (mut socket, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        socket.write_all(b"not json\n\n{\"servers\":[{\"name\":\"X\",\"status\":\"DOWN\",\"cpu\":200}]}\n").await.unwrap();

        assert!(time::timeout(WAIT, view.changed()).await.unwrap());
        let snapshot = view.snapshot();
        assert_eq!(snapshot.server_status.len(), 1);
        assert_eq!(snapshot.server_status[0].cpu, 100.0);
        assert_eq!(source.connection_state(), ConnectionState::Open);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(store.revision(), 1);

        source.stop();
        assert_eq!(source.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_protocol_is_sent_first() {
        let (listener, addr) = listener().await;
        let store = TelemetryStore::new();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "protocol": "dashboard.v1"})),
            store.writer(),
            SourceHooks::default(),
        );
        source.start();

        let (socket, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut lines = BufReader::new(socket).lines();
        let first = time::timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some("dashboard.v1"));
        source.stop();
    }

    #[tokio::test]
    async fn test_heartbeat_is_sent() {
        let (listener, addr) = listener().await;
        let store = TelemetryStore::new();
        let mut source = StreamingSource::new(
            &options(json!({
                "url": addr,
                "heartbeatInterval": 20,
                "heartbeatMessage": {"type": "ping"},
            })),
            store.writer(),
            SourceHooks::default(),
        );
        source.start();

        let (socket, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut lines = BufReader::new(socket).lines();
        for _ in 0..2 {
            let line = time::timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
            assert_eq!(line.as_deref(), Some(r#"{"type":"ping"}"#));
        }
        source.stop();
    }

    #[tokio::test]
    async fn test_heartbeat_hook_overrides_message() {
        let (listener, addr) = listener().await;
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = beats.clone();
        // Every other beat is skipped
        let hooks = SourceHooks::default().with_heartbeat(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            (n % 2 == 0).then(|| json!(format!("beat-{}", n)))
        });

        let store = TelemetryStore::new();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "heartbeatInterval": 10})),
            store.writer(),
            hooks,
        );
        source.start();

        let (socket, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut lines = BufReader::new(socket).lines();
        let first = time::timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        let second = time::timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some("beat-0"));
        assert_eq!(second.as_deref(), Some("beat-2"));
        source.stop();
    }

    #[tokio::test]
    async fn test_mapping_errors_are_reported() {
        let (listener, addr) = listener().await;
        let (hooks, mut errors) = error_channel();
        let hooks = hooks.with_map_message(|line| {
            if line.starts_with('#') {
                Err(SourceError::Mapping(format!("comment line: {}", line)))
            } else {
                Ok(Some(json!({"resources": {"cpu": line}})))
            }
        });

        let store = TelemetryStore::new();
        let mut view = store.view();
        let mut source =
            StreamingSource::new(&options(json!({"url": addr})), store.writer(), hooks);
        source.start();

        let (mut socket, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        socket.write_all(b"# hello\n42\n").await.unwrap();

        let err = time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(err, SourceError::Mapping(_)));
        assert!(time::timeout(WAIT, view.changed()).await.unwrap());
        assert_eq!(view.snapshot().resource_gauges.cpu, 42.0);
        assert_eq!(source.connection_state(), ConnectionState::Open);
        source.stop();
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_connection() {
        let (listener, addr) = listener().await;
        let (hooks, mut errors) = error_channel();
        let store = TelemetryStore::new();
        let mut view = store.view();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "reconnect": false})),
            store.writer(),
            hooks,
        );
        let mut state = source.watch_state();
        source.start();

        let (mut socket, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        wait_for_state(&mut state, ConnectionState::Open).await;
        socket.write_all(b"\xff\xfe garbage\n{\"resources\":{\"cpu\":33}}\n").await.unwrap();

        let err = time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(err, SourceError::Parse(_)), "got {:?}", err);
        assert!(time::timeout(WAIT, view.changed()).await.unwrap());
        assert_eq!(view.snapshot().resource_gauges.cpu, 33.0);
        assert_eq!(source.connection_state(), ConnectionState::Open);
        assert!(source.is_running());
        source.stop();
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let (listener, addr) = listener().await;
        let (hooks, mut errors) = error_channel();
        let store = TelemetryStore::new();
        let mut view = store.view();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "reconnect": false, "maxLineBytes": 64})),
            store.writer(),
            hooks,
        );
        source.start();

        let (mut socket, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut flood = vec![b'x'; 4096];
        flood.push(b'\n');
        socket.write_all(&flood).await.unwrap();
        socket.write_all(b"{\"resources\":{\"disk\":12}}\n").await.unwrap();

        let err = time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        match err {
            SourceError::Parse(msg) => assert!(msg.contains("64 byte limit"), "{}", msg),
            other => panic!("expected Parse, got {:?}", other),
        }
        assert!(time::timeout(WAIT, view.changed()).await.unwrap());
        assert_eq!(view.snapshot().resource_gauges.disk, 12.0);
        assert_eq!(source.connection_state(), ConnectionState::Open);
        source.stop();
    }

    #[tokio::test]
    async fn test_reconnects_after_close() {
        let (listener, addr) = listener().await;
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let hooks = SourceHooks::default().with_on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let store = TelemetryStore::new();
        let mut view = store.view();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "reconnectInterval": 20})),
            store.writer(),
            hooks,
        );
        source.start();

        // First connection is dropped straight away
        let (first, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        drop(first);

        let (mut second, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        second.write_all(b"{\"resources\":{\"mem\":64}}\n").await.unwrap();

        assert!(time::timeout(WAIT, view.changed()).await.unwrap());
        assert_eq!(view.snapshot().resource_gauges.mem, 64.0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        source.stop();
    }

    #[tokio::test]
    async fn test_no_reconnect_when_disabled() {
        let (listener, addr) = listener().await;
        let store = TelemetryStore::new();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "reconnect": false, "reconnectInterval": 10})),
            store.writer(),
            SourceHooks::default(),
        );
        let mut state = source.watch_state();
        source.start();

        let (first, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        wait_for_state(&mut state, ConnectionState::Open).await;
        drop(first);
        wait_for_state(&mut state, ConnectionState::Closed).await;

        assert!(time::timeout(Duration::from_millis(200), listener.accept()).await.is_err());
        source.stop();
    }

    #[tokio::test]
    async fn test_not_running_once_supervisor_gives_up() {
        let (listener, addr) = listener().await;
        let store = TelemetryStore::new();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "reconnect": false})),
            store.writer(),
            SourceHooks::default(),
        );
        let mut state = source.watch_state();
        source.start();
        assert!(source.is_running());

        let (first, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        wait_for_state(&mut state, ConnectionState::Open).await;
        drop(first);
        wait_for_state(&mut state, ConnectionState::Closed).await;

        time::timeout(WAIT, async {
            while source.is_running() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // A later start connects again
        source.start();
        assert!(source.is_running());
        let (_second, _) = time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        source.stop();
        assert!(!source.is_running());
    }

    #[tokio::test]
    async fn test_invalid_url_is_retried() {
        let store = TelemetryStore::new();
        let (hooks, mut errors) = error_channel();
        let mut source = StreamingSource::new(
            &options(json!({"url": "ws://localhost:9000", "reconnectInterval": 10})),
            store.writer(),
            hooks,
        );
        source.start();

        for _ in 0..2 {
            let err = time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
            assert!(matches!(err, SourceError::InvalidUrl(_)), "got {:?}", err);
        }
        source.stop();
    }

    #[tokio::test]
    async fn test_stop_cancels_reconnect() {
        // Bind then drop to get a port nothing listens on
        let (listener, addr) = listener().await;
        drop(listener);

        let store = TelemetryStore::new();
        let (hooks, mut errors) = error_channel();
        let mut source = StreamingSource::new(
            &options(json!({"url": addr, "reconnectInterval": 20})),
            store.writer(),
            hooks,
        );
        source.start();

        let err = time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(err, SourceError::Connection(_)), "got {:?}", err);

        source.stop();
        source.stop();
        assert!(!source.is_running());
        while errors.try_recv().is_ok() {}

        time::sleep(Duration::from_millis(150)).await;
        assert!(errors.try_recv().is_err());
        assert_eq!(source.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_missing_url_does_not_connect() {
        let store = TelemetryStore::new();
        let mut source = StreamingSource::new(&Map::new(), store.writer(), SourceHooks::default());
        source.start();
        assert!(!source.is_running());
        assert_eq!(source.connection_state(), ConnectionState::Idle);
        source.stop();
    }
}
