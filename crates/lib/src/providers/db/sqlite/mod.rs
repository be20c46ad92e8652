use crate::{
    errors::IngestionError,
    providers::db::storage::ProcessStore,
    types::{
        IngestionProcess, IngestionStats, IngestionStatus, IngestionType, JsonMap, PageRequest,
        ProcessFilter,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::{self, Debug};
use std::fs;
use std::path::Path;
use tracing::debug;
use turso::{Connection, Database, Row, Value as TursoValue};
use uuid::Uuid;

pub mod sql;

/// A process store backed by a local SQLite database using Turso.
///
/// When cloned, it shares the same underlying database, so the store and the
/// `users` table managed by `core-access` can live in one file.
#[derive(Clone)]
pub struct SqliteStore {
    /// The Turso database instance. It's cloneable and thread-safe.
    pub db: Database,
}

impl SqliteStore {
    /// Opens (or creates) the database at `db_path`. Use ":memory:" for an
    /// isolated in-memory database.
    pub async fn open(db_path: &str) -> Result<Self, IngestionError> {
        if db_path != ":memory:" {
            if let Some(dir) = Path::new(db_path).parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| {
                    IngestionError::Storage(format!("Failed to create '{}': {e}", dir.display()))
                })?;
            }
        }
        let db = turso::Builder::new_local(db_path).build().await?;

        // Enable WAL mode for better concurrency on file-based databases.
        // Use `query` for PRAGMA statements that return a value.
        let conn = db.connect()?;
        conn.query("PRAGMA journal_mode=WAL;", ()).await?;

        Ok(Self { db })
    }

    /// Wraps an already-built database handle.
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    /// Ensures that the ingestion table and its indexes exist.
    /// This function is idempotent and safe to call on every application startup.
    pub async fn initialize_schema(&self) -> Result<(), IngestionError> {
        let conn = self.db.connect()?;
        for statement in sql::ALL_TABLE_CREATION_SQL {
            conn.execute(statement, ()).await?;
        }
        Ok(())
    }

    fn connect(&self) -> Result<Connection, IngestionError> {
        Ok(self.db.connect()?)
    }
}

impl Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl AsRef<Database> for SqliteStore {
    fn as_ref(&self) -> &Database {
        &self.db
    }
}

// --- Value encoding ---

fn text(value: impl Into<String>) -> TursoValue {
    TursoValue::Text(value.into())
}

fn opt_text(value: Option<String>) -> TursoValue {
    value.map(TursoValue::Text).unwrap_or(TursoValue::Null)
}

fn json_value(value: &Option<JsonMap>) -> Result<TursoValue, IngestionError> {
    Ok(match value {
        Some(map) => TursoValue::Text(serde_json::to_string(map)?),
        None => TursoValue::Null,
    })
}

fn timestamp(value: DateTime<Utc>) -> TursoValue {
    TursoValue::Integer(value.timestamp_millis())
}

fn opt_timestamp(value: Option<DateTime<Utc>>) -> TursoValue {
    value.map(timestamp).unwrap_or(TursoValue::Null)
}

// --- Row decoding ---

fn integrity(column: usize, found: &TursoValue) -> IngestionError {
    IngestionError::Storage(format!("unexpected value in column {column}: {found:?}"))
}

fn get_text(row: &Row, idx: usize) -> Result<String, IngestionError> {
    match row.get_value(idx)? {
        TursoValue::Text(s) => Ok(s),
        other => Err(integrity(idx, &other)),
    }
}

fn get_opt_text(row: &Row, idx: usize) -> Result<Option<String>, IngestionError> {
    match row.get_value(idx)? {
        TursoValue::Null => Ok(None),
        TursoValue::Text(s) => Ok(Some(s)),
        other => Err(integrity(idx, &other)),
    }
}

fn get_int(row: &Row, idx: usize) -> Result<i64, IngestionError> {
    match row.get_value(idx)? {
        TursoValue::Integer(i) => Ok(i),
        other => Err(integrity(idx, &other)),
    }
}

fn get_opt_int(row: &Row, idx: usize) -> Result<Option<i64>, IngestionError> {
    match row.get_value(idx)? {
        TursoValue::Null => Ok(None),
        TursoValue::Integer(i) => Ok(Some(i)),
        other => Err(integrity(idx, &other)),
    }
}

fn get_counter(row: &Row, idx: usize) -> Result<u32, IngestionError> {
    let raw = get_int(row, idx)?;
    u32::try_from(raw).map_err(|_| integrity(idx, &TursoValue::Integer(raw)))
}

fn millis_to_datetime(idx: usize, millis: i64) -> Result<DateTime<Utc>, IngestionError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| integrity(idx, &TursoValue::Integer(millis)))
}

fn get_timestamp(row: &Row, idx: usize) -> Result<DateTime<Utc>, IngestionError> {
    millis_to_datetime(idx, get_int(row, idx)?)
}

fn get_opt_timestamp(row: &Row, idx: usize) -> Result<Option<DateTime<Utc>>, IngestionError> {
    get_opt_int(row, idx)?
        .map(|millis| millis_to_datetime(idx, millis))
        .transpose()
}

fn get_json(row: &Row, idx: usize) -> Result<Option<JsonMap>, IngestionError> {
    get_opt_text(row, idx)?
        .map(|raw| serde_json::from_str(&raw).map_err(IngestionError::from))
        .transpose()
}

/// Decodes a row selected with [`sql::PROCESS_COLUMNS`].
fn process_from_row(row: &Row) -> Result<IngestionProcess, IngestionError> {
    let id_str = get_text(row, 0)?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| IngestionError::Storage(format!("invalid process id '{id_str}': {e}")))?;

    Ok(IngestionProcess {
        id,
        kind: get_text(row, 1)?.parse()?,
        status: get_text(row, 2)?.parse()?,
        parameters: get_json(row, 3)?,
        result: get_json(row, 4)?,
        error_message: get_opt_text(row, 5)?,
        total_items: get_counter(row, 6)?,
        processed_items: get_counter(row, 7)?,
        failed_items: get_counter(row, 8)?,
        started_at: get_opt_timestamp(row, 9)?,
        completed_at: get_opt_timestamp(row, 10)?,
        initiated_by: get_text(row, 11)?,
        created_at: get_timestamp(row, 12)?,
        updated_at: get_timestamp(row, 13)?,
    })
}

/// Positional parameters matching [`sql::where_clause`].
fn filter_params(owner: Option<&str>, filter: &ProcessFilter) -> Vec<TursoValue> {
    let mut params = Vec::new();
    if let Some(owner) = owner {
        params.push(text(owner));
    }
    if let Some(status) = filter.status {
        params.push(text(status.as_str()));
    }
    if let Some(kind) = filter.kind {
        params.push(text(kind.as_str()));
    }
    params
}

async fn count(conn: &Connection, query: &str, params: Vec<TursoValue>) -> Result<u64, IngestionError> {
    let mut rows = conn.query(query, params).await?;
    match rows.next().await? {
        Some(row) => Ok(get_int(&row, 0)?.max(0) as u64),
        None => Ok(0),
    }
}

#[async_trait]
impl ProcessStore for SqliteStore {
    fn name(&self) -> &str {
        "SQLite"
    }

    async fn insert(&self, process: &IngestionProcess) -> Result<(), IngestionError> {
        let conn = self.connect()?;
        let params = vec![
            text(process.id.to_string()),
            text(process.kind.as_str()),
            text(process.status.as_str()),
            json_value(&process.parameters)?,
            json_value(&process.result)?,
            opt_text(process.error_message.clone()),
            TursoValue::Integer(i64::from(process.total_items)),
            TursoValue::Integer(i64::from(process.processed_items)),
            TursoValue::Integer(i64::from(process.failed_items)),
            opt_timestamp(process.started_at),
            opt_timestamp(process.completed_at),
            text(process.initiated_by.clone()),
            timestamp(process.created_at),
            timestamp(process.updated_at),
        ];
        conn.execute(sql::INSERT_PROCESS_SQL, params).await?;
        debug!(id = %process.id, "Inserted process row.");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IngestionProcess>, IngestionError> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(&sql::select_by_id(), vec![text(id.to_string())])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(process_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, process: &IngestionProcess) -> Result<(), IngestionError> {
        let conn = self.connect()?;
        let params = vec![
            text(process.status.as_str()),
            json_value(&process.parameters)?,
            json_value(&process.result)?,
            opt_text(process.error_message.clone()),
            TursoValue::Integer(i64::from(process.total_items)),
            TursoValue::Integer(i64::from(process.processed_items)),
            TursoValue::Integer(i64::from(process.failed_items)),
            opt_timestamp(process.started_at),
            opt_timestamp(process.completed_at),
            timestamp(process.updated_at),
            text(process.id.to_string()),
        ];
        let changed = conn.execute(sql::UPDATE_PROCESS_SQL, params).await?;
        if changed == 0 {
            return Err(IngestionError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, IngestionError> {
        let conn = self.connect()?;
        let changed = conn
            .execute(sql::DELETE_PROCESS_SQL, vec![text(id.to_string())])
            .await?;
        Ok(changed > 0)
    }

    async fn query(
        &self,
        owner: Option<&str>,
        filter: &ProcessFilter,
        page: &PageRequest,
    ) -> Result<(Vec<IngestionProcess>, u64), IngestionError> {
        let conn = self.connect()?;
        let where_sql = sql::where_clause(owner.is_some(), filter.status.is_some(), filter.kind.is_some());

        let total = count(&conn, &sql::count_processes(&where_sql), filter_params(owner, filter)).await?;

        let page_sql = sql::page_processes(
            &where_sql,
            page.sort_by.column(),
            page.sort_order.as_sql(),
            page.limit,
            page.offset(),
        );
        debug!(query = %page_sql, "--> Executing SQLite page query");
        let mut rows = conn.query(&page_sql, filter_params(owner, filter)).await?;

        let mut data = Vec::new();
        while let Some(row) = rows.next().await? {
            data.push(process_from_row(&row)?);
        }
        Ok((data, total))
    }

    async fn stats(&self, owner: Option<&str>) -> Result<IngestionStats, IngestionError> {
        let conn = self.connect()?;
        let no_filter = ProcessFilter::default();
        let where_sql = sql::where_clause(owner.is_some(), false, false);
        let mut stats = IngestionStats::default();

        let mut rows = conn
            .query(&sql::count_by_status(&where_sql), filter_params(owner, &no_filter))
            .await?;
        while let Some(row) = rows.next().await? {
            let status: IngestionStatus = get_text(&row, 0)?.parse()?;
            stats.record_status(status, get_int(&row, 1)?.max(0) as u64);
        }

        let mut rows = conn
            .query(&sql::count_by_type(&where_sql), filter_params(owner, &no_filter))
            .await?;
        while let Some(row) = rows.next().await? {
            let kind: IngestionType = get_text(&row, 0)?.parse()?;
            stats.by_type.insert(kind, get_int(&row, 1)?.max(0) as u64);
        }

        let mut rows = conn
            .query(
                &sql::average_duration(owner.is_some()),
                filter_params(owner, &no_filter),
            )
            .await?;
        if let Some(row) = rows.next().await? {
            stats.average_duration = match row.get_value(0)? {
                TursoValue::Real(avg) => avg,
                TursoValue::Integer(avg) => avg as f64,
                _ => 0.0,
            };
        }

        Ok(stats)
    }

    async fn ping(&self) -> Result<(), IngestionError> {
        let conn = self.connect()?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?;
        debug!("SQLite store answered ping.");
        Ok(())
    }
}
