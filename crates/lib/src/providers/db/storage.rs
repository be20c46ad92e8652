use crate::errors::IngestionError;
use crate::types::{IngestionProcess, IngestionStats, PageRequest, ProcessFilter};
use async_trait::async_trait;
use std::fmt::Debug;
use uuid::Uuid;

/// A trait for persisting ingestion process records.
///
/// The lifecycle manager is the only writer. Implementations only need to
/// provide record CRUD, a filtered/paged query and the aggregate counts used
/// by the statistics endpoint.
#[async_trait]
pub trait ProcessStore: Send + Sync + Debug {
    /// Returns the name of the store (e.g., "Memory", "SQLite").
    fn name(&self) -> &str;

    async fn insert(&self, process: &IngestionProcess) -> Result<(), IngestionError>;

    async fn get(&self, id: Uuid) -> Result<Option<IngestionProcess>, IngestionError>;

    /// Replaces the stored record with the same id.
    ///
    /// Fails with `NotFound` when the record has been deleted in the meantime.
    async fn save(&self, process: &IngestionProcess) -> Result<(), IngestionError>;

    /// Removes a record. Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, IngestionError>;

    /// Returns one page of records and the total number of matches.
    ///
    /// When `owner` is set only records initiated by that actor are considered.
    async fn query(
        &self,
        owner: Option<&str>,
        filter: &ProcessFilter,
        page: &PageRequest,
    ) -> Result<(Vec<IngestionProcess>, u64), IngestionError>;

    async fn stats(&self, owner: Option<&str>) -> Result<IngestionStats, IngestionError>;

    /// A cheap round-trip used by the detailed health check.
    async fn ping(&self) -> Result<(), IngestionError>;
}
