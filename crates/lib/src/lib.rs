//! # Ingestion Lifecycle
//!
//! This crate tracks asynchronous ingestion processes through their
//! lifecycle (`pending -> processing -> completed | failed`), enforces
//! ownership rules on every operation, and drives a simulated worker for each
//! started process. Records are persisted through a pluggable
//! [`ProcessStore`](providers::db::storage::ProcessStore).

pub mod errors;
pub mod manager;
pub mod providers;
pub mod simulator;
pub mod types;

pub use errors::IngestionError;
pub use manager::{LifecycleManager, LifecycleManagerBuilder};
pub use providers::db::{memory::MemoryStore, sqlite::SqliteStore, storage::ProcessStore};
pub use simulator::{SimulationConfig, SimulationFault};
pub use types::{
    IngestionProcess, IngestionStats, IngestionStatus, IngestionType, IngestionUpdate, JsonMap,
    NewIngestion, Page, PageRequest, ProcessFilter, ProcessView, SortField, SortOrder,
};

pub use core_access::{Actor, Role};
