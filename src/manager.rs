//! Ownership and hot-swapping of the active data source.

use serde_json::{Map, Value};
use tracing::info;

use crate::config::{ConfigResolver, ResolvedConfig, SourceConfig};
use crate::source::{
    PollingSource, SourceAdapter, SourceHooks, SourceKind, StreamingSource, SyntheticSource,
};
use crate::telemetry::{TelemetryStore, TelemetryWriter};

/// Build an adapter of the given kind. It is not started.
pub fn build_adapter(
    kind: SourceKind,
    options: &Map<String, Value>,
    writer: TelemetryWriter,
    hooks: SourceHooks,
) -> Box<dyn SourceAdapter> {
    match kind {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(options, writer)),
        SourceKind::Polling => Box::new(PollingSource::new(options, writer, hooks)),
        SourceKind::Streaming => Box::new(StreamingSource::new(options, writer, hooks)),
    }
}

#[derive(Debug)]
struct ActiveSource {
    config: ResolvedConfig,
    adapter: Box<dyn SourceAdapter>,
}

/// What [`DataSourceManager::current_data_source`] reports.
#[derive(Debug)]
pub struct CurrentDataSource<'a> {
    pub kind: SourceKind,
    pub options: Map<String, Value>,
    pub adapter: Option<&'a dyn SourceAdapter>,
}

/// Owns the one active data source and the store it writes to.
///
/// Replacing the source stops the old adapter and revokes its write lease
/// before the new adapter starts, so the old one can never write again.
///
/// # Example
///
/// ```
/// use opsdash::{DataSourceManager, SourceKind, TelemetryStore};
///
/// # tokio_test::block_on(async {
/// let store = TelemetryStore::new();
/// let mut manager = DataSourceManager::new(store.clone());
/// manager.switch_data_source("synthetic", Default::default());
/// assert_eq!(manager.current_data_source().kind, SourceKind::Synthetic);
/// manager.shutdown();
/// # });
/// ```
#[derive(Debug)]
pub struct DataSourceManager {
    store: TelemetryStore,
    resolver: ConfigResolver,
    hooks: SourceHooks,
    active: Option<ActiveSource>,
}

impl DataSourceManager {
    /// A manager reading the process environment, with no global config.
    pub fn new(store: TelemetryStore) -> Self {
        Self::with_resolver(store, ConfigResolver::new())
    }

    pub fn with_resolver(store: TelemetryStore, resolver: ConfigResolver) -> Self {
        Self {
            store,
            resolver,
            hooks: SourceHooks::default(),
            active: None,
        }
    }

    /// Callbacks passed to every adapter built from now on.
    pub fn with_hooks(mut self, hooks: SourceHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Resolve the configuration and replace the active source with it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init_data_source(&mut self, overrides: Option<SourceConfig>) -> &dyn SourceAdapter {
        let resolved = self.resolver.resolve(overrides.as_ref());
        self.apply(resolved)
    }

    /// Hot-swap to a source of `kind` with `options` as the caller override.
    ///
    /// The kind goes through the same resolution as everything else, so an
    /// unknown kind falls back to synthetic and the environment still wins.
    pub fn switch_data_source(&mut self, kind: &str, options: Map<String, Value>) -> &dyn SourceAdapter {
        self.init_data_source(Some(SourceConfig::new(kind, options)))
    }

    /// The active source's kind, options and adapter.
    ///
    /// Reports synthetic with no options and no adapter when nothing is
    /// active.
    pub fn current_data_source(&self) -> CurrentDataSource<'_> {
        match &self.active {
            Some(active) => CurrentDataSource {
                kind: active.config.kind,
                options: active.config.options.clone(),
                adapter: Some(active.adapter.as_ref()),
            },
            None => CurrentDataSource {
                kind: SourceKind::default(),
                options: Map::new(),
                adapter: None,
            },
        }
    }

    /// Stop and release the active source.
    pub fn shutdown(&mut self) {
        self.stop_current();
    }

    fn apply(&mut self, resolved: ResolvedConfig) -> &dyn SourceAdapter {
        self.stop_current();

        let mut adapter =
            build_adapter(resolved.kind, &resolved.options, self.store.writer(), self.hooks.clone());
        adapter.start();
        info!(kind = %resolved.kind, source = adapter.description(), "data source active");

        let active = self.active.insert(ActiveSource { config: resolved, adapter });
        active.adapter.as_ref()
    }

    fn stop_current(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.adapter.stop();
            self.store.revoke_writers();
            info!(kind = %active.config.kind, "data source stopped");
        }
    }
}

impl Drop for DataSourceManager {
    fn drop(&mut self) {
        self.stop_current();
    }
}
