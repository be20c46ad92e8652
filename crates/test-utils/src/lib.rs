use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ingestflow::{
    Actor, IngestionProcess, IngestionStatus, IngestionType, JsonMap, LifecycleManager,
    NewIngestion, ProcessStore, SimulationConfig, SqliteStore,
};
use std::time::Duration;
use turso::Database;
use uuid::Uuid;

// --- Test Setup ---

/// A helper struct to manage database creation for each test.
pub struct TestSetup {
    pub db: Database,
    pub store: SqliteStore,
}

impl TestSetup {
    /// Creates a new, isolated in-memory database and initializes both the
    /// users and ingestion schemas.
    pub async fn new() -> Result<Self> {
        Self::at(":memory:").await
    }

    /// Same as [`TestSetup::new`] but backed by the database file at `path`.
    pub async fn at(path: &str) -> Result<Self> {
        let store = SqliteStore::open(path).await?;
        store.initialize_schema().await?;
        core_access::initialize_schema(&store.db).await?;
        Ok(Self {
            db: store.db.clone(),
            store,
        })
    }
}

/// Simulation timings short enough for tests that run on the real clock.
pub fn fast_simulation() -> SimulationConfig {
    SimulationConfig {
        initial_delay: Duration::from_millis(10),
        tick_interval: Duration::from_millis(20),
        min_duration: Duration::from_millis(60),
        max_duration: Duration::from_millis(120),
        max_step: 10,
    }
}

/// Polls `manager` until the process reaches `status`, or fails after `timeout`.
pub async fn wait_for_status(
    manager: &LifecycleManager,
    id: Uuid,
    actor: &Actor,
    status: IngestionStatus,
    timeout: Duration,
) -> Result<IngestionProcess> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let process = manager.get_one(id, actor).await?;
        if process.status == status {
            return Ok(process);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "process {id} still {} after {timeout:?}, expected {status}",
                process.status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// --- Process Fixtures ---

/// Builds process records in arbitrary states and writes them straight into
/// a store, bypassing the lifecycle rules.
pub struct ProcessFixture {
    process: IngestionProcess,
}

impl ProcessFixture {
    pub fn new(owner: &str, kind: IngestionType) -> Self {
        Self {
            process: IngestionProcess::new(NewIngestion::new(kind), owner),
        }
    }

    pub fn total_items(mut self, total: u32) -> Self {
        self.process.total_items = total;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.process.created_at = at;
        self.process.updated_at = at;
        self
    }

    /// A completed run that took `secs` seconds.
    pub fn completed_after(mut self, secs: i64) -> Self {
        let finished = Utc::now();
        self.process.status = IngestionStatus::Completed;
        self.process.started_at = Some(finished - ChronoDuration::seconds(secs));
        self.process.completed_at = Some(finished);
        self.process.processed_items = self.process.total_items;
        self
    }

    pub fn failed(mut self, message: &str) -> Self {
        let now = Utc::now();
        self.process.status = IngestionStatus::Failed;
        self.process.started_at = Some(now);
        self.process.completed_at = Some(now);
        self.process.error_message = Some(message.to_string());
        self
    }

    pub fn processing(mut self) -> Self {
        self.process.status = IngestionStatus::Processing;
        self.process.started_at = Some(Utc::now());
        self
    }

    pub fn result(mut self, result: JsonMap) -> Self {
        self.process.result = Some(result);
        self
    }

    pub fn build(self) -> IngestionProcess {
        self.process
    }

    pub async fn insert(self, store: &dyn ProcessStore) -> Result<IngestionProcess> {
        store.insert(&self.process).await?;
        Ok(self.process)
    }
}
