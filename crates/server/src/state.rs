//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup. The `AppState` holds the configuration, the
//! database shared with the users table, and the lifecycle manager, making
//! them accessible to all request handlers.

use crate::config::{AppConfig, ProcessStoreKind};
use ingestflow::{LifecycleManager, MemoryStore, ProcessStore, SimulationFault, SqliteStore};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use turso::Database;

/// Counts simulator failures that could not be written to their process.
#[derive(Debug, Default)]
pub struct FaultLog {
    count: AtomicU64,
}

impl FaultLog {
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn record(&self, fault: &SimulationFault) {
        self.count.fetch_add(1, Ordering::Relaxed);
        warn!(id = %fault.process_id, "Recorded unrecoverable simulation fault.");
    }
}

/// The shared application state, accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<AppConfig>,
    /// The database holding users (and processes with the SQLite store).
    pub db: Database,
    pub manager: LifecycleManager,
    pub faults: Arc<FaultLog>,
    pub started_at: Instant,
}

/// Builds the shared application state from the configuration.
///
/// - Opens the database at `db_url` and ensures the users schema.
/// - Selects the process store named by `process_store`.
/// - Builds the lifecycle manager and spawns the task draining its fault channel.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let sqlite = SqliteStore::open(&config.db_url).await?;
    core_access::initialize_schema(&sqlite.db).await?;
    info!(db_path = %config.db_url, "Initialized local storage (SQLite).");
    let db = sqlite.db.clone();

    let store: Arc<dyn ProcessStore> = match config.process_store {
        ProcessStoreKind::Sqlite => {
            sqlite.initialize_schema().await?;
            Arc::new(sqlite)
        }
        ProcessStoreKind::Memory => Arc::new(MemoryStore::new()),
    };
    info!(store = store.name(), "Selected process store.");

    let (fault_tx, mut fault_rx) = mpsc::unbounded_channel();
    let manager = LifecycleManager::builder(store)
        .simulation(config.simulation.to_simulation_config())
        .fault_sink(fault_tx)
        .build();

    let faults = Arc::new(FaultLog::default());
    let fault_log = faults.clone();
    tokio::spawn(async move {
        while let Some(fault) = fault_rx.recv().await {
            fault_log.record(&fault);
        }
    });

    Ok(AppState {
        config: Arc::new(config),
        db,
        manager,
        faults,
        started_at: Instant::now(),
    })
}
