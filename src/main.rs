use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossterm::{
    event::Event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde_json::Map;
use tokio::runtime::Runtime;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};

use opsdash::duration::parse_duration;
use opsdash::events;
use opsdash::ui::{self, Theme};
use opsdash::{
    App, ConfigResolver, DataSourceManager, SourceConfig, SourceKind, SourceProfiles, TelemetryStore,
};

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "opsdash")]
#[command(about = "Live operations dashboard fed by a synthetic, polling or streaming source")]
struct Args {
    /// Data source kind: synthetic, polling or streaming
    #[arg(short, long)]
    source: Option<String>,

    /// HTTP endpoint for the polling source
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Newline-delimited JSON feed over plain TCP: tcp://host:port (websocket URLs are not supported)
    #[arg(short, long)]
    url: Option<String>,

    /// Poll interval (e.g., "5s", "500ms"; a bare number is milliseconds)
    #[arg(short, long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Seed for the synthetic generator, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Global data source config file (TOML, JSON or YAML by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log file used while the dashboard owns the terminal
    #[arg(long, default_value = "opsdash.log")]
    log_file: PathBuf,

    /// Print one snapshot as JSON and exit instead of starting the dashboard
    #[arg(short, long)]
    dump: bool,

    /// How long --dump waits for the first update
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    wait: Duration,
}

impl Args {
    /// Options for each kind, as given on the command line.
    fn profiles(&self) -> SourceProfiles {
        let mut profiles = SourceProfiles::new();
        if let Some(seed) = self.seed {
            profiles.set(SourceKind::Synthetic, "seed", seed);
        }
        if let Some(endpoint) = &self.endpoint {
            profiles.set(SourceKind::Polling, "endpoint", endpoint.as_str());
        }
        if let Some(interval) = self.interval {
            profiles.set(SourceKind::Polling, "interval", interval.as_millis() as u64);
        }
        if let Some(url) = &self.url {
            profiles.set(SourceKind::Streaming, "url", url.as_str());
        }
        profiles
    }

    /// The caller override for the first source, if any flag asks for one.
    fn overrides(&self, profiles: &SourceProfiles) -> Option<SourceConfig> {
        let mut options = Map::new();
        for kind in SourceKind::ALL {
            options.extend(profiles.options(kind));
        }

        if self.source.is_none() && options.is_empty() {
            return None;
        }

        Some(SourceConfig {
            kind: self.source.clone(),
            options,
        })
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args)?;

    let mut resolver = ConfigResolver::new();
    if let Some(path) = &args.config {
        resolver = resolver.with_global(SourceConfig::load(path)?);
    }

    let profiles = args.profiles();
    let overrides = args.overrides(&profiles);

    let runtime = Runtime::new().context("Failed to start tokio runtime")?;

    if args.dump {
        return run_dump(&runtime, resolver, overrides, args.wait);
    }

    // Adapters spawn onto this runtime from the UI thread
    let _guard = runtime.enter();
    let mut app = App::new(TelemetryStore::new(), resolver, profiles, Theme::auto_detect());
    app.start(overrides);

    let result = run_tui(&mut app);
    app.shutdown();
    info!("dashboard closed");
    result
}

/// Initializes tracing; logs go to a file unless the terminal is free.
fn setup_logging(args: &Args) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(args.log_level))
        .with_target(true)
        .with_thread_ids(false);

    if args.dump {
        builder.with_writer(io::stderr).init();
    } else {
        let file = File::create(&args.log_file)
            .with_context(|| format!("Failed to create log file {}", args.log_file.display()))?;
        builder.with_writer(Mutex::new(file)).with_ansi(false).init();
    }

    info!("Logging initialized with level: {:?}", args.log_level);
    Ok(())
}

/// Start the source, wait for its first update and print the snapshot.
fn run_dump(
    runtime: &Runtime,
    resolver: ConfigResolver,
    overrides: Option<SourceConfig>,
    wait: Duration,
) -> Result<()> {
    let store = TelemetryStore::new();
    let mut view = store.view();
    let mut manager = DataSourceManager::with_resolver(store, resolver);

    runtime.block_on(async {
        manager.init_data_source(overrides);
        if view.revision() == 0 && tokio::time::timeout(wait, view.changed()).await.is_err() {
            warn!("no data within {:?}, dumping empty state", wait);
        }
        manager.shutdown();
    });

    let snapshot = view.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Run the TUI until the user quits
fn run_tui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    let result = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    while app.running {
        app.refresh();
        terminal.draw(|frame| ui::draw(frame, app))?;

        // Poll for events with a short timeout
        if let Some(event) = events::poll_event(Duration::from_millis(100))? {
            match event {
                Event::Key(key) => events::handle_key_event(app, key),
                Event::Resize(_, _) => {
                    // Terminal will redraw on next iteration
                }
                _ => {}
            }
        }
    }

    Ok(())
}
