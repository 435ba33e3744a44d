// crates/iris-lots-cli/src/wiring.rs
// ============================================================================
// Module: Runtime Wiring
// Description: Builds the lot runtime from a validated configuration.
// Purpose: Keep component assembly in one place for the binary and tests.
// Dependencies: iris-lots-config, iris-lots-core, iris-lots-store-sqlite, thiserror
// ============================================================================

//! ## Overview
//! Assembly order: event sink, queue store, exchange strategy, supervisor,
//! worker, service. The store is opened (and its schema created) before the
//! exchange strategy so the direct-database pair can be created in the same
//! file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use iris_lots_config::ConfigError;
use iris_lots_config::EventSinkKind;
use iris_lots_config::EventsConfig;
use iris_lots_config::ExchangeConfig;
use iris_lots_config::ExchangeType;
use iris_lots_config::IrisLotsConfig;
use iris_lots_core::FileEventSink;
use iris_lots_core::LotEventSink;
use iris_lots_core::LotService;
use iris_lots_core::LotStore;
use iris_lots_core::LotWorker;
use iris_lots_core::NoopEventSink;
use iris_lots_core::ProcessSupervisor;
use iris_lots_core::StderrEventSink;
use iris_lots_core::SyncError;
use iris_lots_store_sqlite::DatabaseSync;
use iris_lots_store_sqlite::FileSync;
use iris_lots_store_sqlite::SqliteLotStore;
use iris_lots_store_sqlite::SqliteStoreError;
use iris_lots_store_sqlite::Synchronizer;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while assembling the runtime.
#[derive(Debug, Error)]
pub enum WiringError {
    /// Configuration could not be turned into components.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Queue database could not be opened.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
    /// Exchange medium could not be prepared.
    #[error("exchange setup failed: {0}")]
    Exchange(#[from] SyncError),
    /// Event log could not be opened.
    #[error("event log {path}: {error}")]
    Events {
        /// Event log path.
        path: String,
        /// Underlying I/O error.
        error: String,
    },
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Fully wired lot runtime.
pub struct LotRuntime {
    /// Queue store.
    pub store: Arc<SqliteLotStore>,
    /// Request facade over the store and worker.
    pub service: LotService,
    /// Event sink shared by every component.
    pub sink: Arc<dyn LotEventSink>,
}

impl LotRuntime {
    /// Builds every component from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError`] when any component cannot be created.
    pub fn open(config: &IrisLotsConfig) -> Result<Self, WiringError> {
        let sink = event_sink(&config.events)?;
        let store = open_store(config)?;
        let sync = synchronizer(&store, &config.exchange)?;
        let supervisor = ProcessSupervisor::new(config.tool.tool_command()?, Arc::clone(&sink));
        let queue: Arc<dyn LotStore> = store.clone();
        let worker = Arc::new(LotWorker::new(
            Arc::clone(&queue),
            Arc::new(sync),
            supervisor,
            Arc::clone(&sink),
        ));
        let service = LotService::new(queue, worker, Arc::clone(&sink));
        Ok(Self {
            store,
            service,
            sink,
        })
    }

    /// Returns the worker behind the service.
    #[must_use]
    pub fn worker(&self) -> &LotWorker {
        self.service.worker()
    }
}

// ============================================================================
// SECTION: Components
// ============================================================================

/// Opens the queue store, creating the schema when missing.
///
/// # Errors
///
/// Returns [`WiringError`] when the database cannot be opened.
pub fn open_store(config: &IrisLotsConfig) -> Result<Arc<SqliteLotStore>, WiringError> {
    let store = SqliteLotStore::new(config.database.sqlite_config()?)?;
    Ok(Arc::new(store))
}

/// Builds the configured exchange strategy.
fn synchronizer(
    store: &Arc<SqliteLotStore>,
    exchange: &ExchangeConfig,
) -> Result<Synchronizer, WiringError> {
    match exchange.exchange_type {
        ExchangeType::Database => {
            let sync = DatabaseSync::new(Arc::clone(store), exchange.lot_name.clone())?;
            Ok(Synchronizer::Database(sync))
        }
        ExchangeType::File => {
            let path = exchange.path.clone().ok_or_else(|| {
                ConfigError::Invalid("file exchange requires path".to_string())
            })?;
            let queue: Arc<dyn LotStore> = store.clone();
            let sync = FileSync::new(queue, path, exchange.lot_name.clone())?;
            Ok(Synchronizer::File(sync))
        }
    }
}

/// Builds the configured event sink.
fn event_sink(events: &EventsConfig) -> Result<Arc<dyn LotEventSink>, WiringError> {
    match events.sink {
        EventSinkKind::Stderr => Ok(Arc::new(StderrEventSink)),
        EventSinkKind::None => Ok(Arc::new(NoopEventSink)),
        EventSinkKind::File => {
            let path = events.path.as_ref().ok_or_else(|| {
                ConfigError::Invalid("file event sink requires path".to_string())
            })?;
            let sink = FileEventSink::new(path).map_err(|err| WiringError::Events {
                path: path.display().to_string(),
                error: err.to_string(),
            })?;
            Ok(Arc::new(sink))
        }
    }
}
