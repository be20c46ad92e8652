//! # Ingestion Data Model
//!
//! The `IngestionProcess` record, its status and type enums, the inputs that
//! create or patch a record, and the query/paging/statistics shapes shared by
//! the manager and the stores.

use crate::errors::IngestionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A free-form key/value map, opaque to the manager.
pub type JsonMap = Map<String, Value>;

/// Lifecycle status of an ingestion process.
///
/// `Pending` is initial. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub const ALL: [IngestionStatus; 4] = [
        IngestionStatus::Pending,
        IngestionStatus::Processing,
        IngestionStatus::Completed,
        IngestionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Pending => "pending",
            IngestionStatus::Processing => "processing",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestionStatus {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IngestionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| IngestionError::Validation(format!("unknown status '{s}'")))
    }
}

/// Classification of an ingestion process. No behaviour branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionType {
    DocumentUpload,
    BatchImport,
    ApiSync,
}

impl IngestionType {
    pub const ALL: [IngestionType; 3] = [
        IngestionType::DocumentUpload,
        IngestionType::BatchImport,
        IngestionType::ApiSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionType::DocumentUpload => "document_upload",
            IngestionType::BatchImport => "batch_import",
            IngestionType::ApiSync => "api_sync",
        }
    }
}

impl fmt::Display for IngestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestionType {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IngestionType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| IngestionError::Validation(format!("unknown ingestion type '{s}'")))
    }
}

/// A tracked unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionProcess {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: IngestionType,
    pub status: IngestionStatus,
    pub parameters: Option<JsonMap>,
    pub result: Option<JsonMap>,
    pub error_message: Option<String>,
    pub total_items: u32,
    pub processed_items: u32,
    pub failed_items: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// The owning actor. Immutable after creation.
    pub initiated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionProcess {
    /// Builds a fresh `Pending` record owned by `initiated_by`.
    pub fn new(input: NewIngestion, initiated_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: input.kind,
            status: IngestionStatus::Pending,
            parameters: input.parameters,
            result: None,
            error_message: None,
            total_items: input.total_items.unwrap_or(0),
            processed_items: 0,
            failed_items: 0,
            started_at: None,
            completed_at: None,
            initiated_by: initiated_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Percentage of items processed, rounded. Zero while the total is unknown.
    pub fn progress(&self) -> u32 {
        if self.total_items == 0 {
            return 0;
        }
        (f64::from(self.processed_items) / f64::from(self.total_items) * 100.0).round() as u32
    }

    /// Whole seconds between `started_at` and `completed_at` (or `now` while running).
    pub fn duration_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or(now);
        Some(((end - started).num_milliseconds() as f64 / 1000.0).round() as i64)
    }

    pub fn view(&self) -> ProcessView {
        ProcessView {
            progress: self.progress(),
            duration: self.duration_secs(Utc::now()),
            process: self.clone(),
        }
    }
}

/// A record together with its derived values, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessView {
    #[serde(flatten)]
    pub process: IngestionProcess,
    pub progress: u32,
    pub duration: Option<i64>,
}

/// Input for creating a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIngestion {
    #[serde(rename = "type")]
    pub kind: IngestionType,
    #[serde(default)]
    pub parameters: Option<JsonMap>,
    #[serde(default)]
    pub total_items: Option<u32>,
}

impl NewIngestion {
    pub fn new(kind: IngestionType) -> Self {
        Self {
            kind,
            parameters: None,
            total_items: None,
        }
    }

    pub fn with_total_items(mut self, total_items: u32) -> Self {
        self.total_items = Some(total_items);
        self
    }

    pub fn with_parameters(mut self, parameters: JsonMap) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// A partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionUpdate {
    #[serde(default)]
    pub parameters: Option<JsonMap>,
    #[serde(default)]
    pub result: Option<JsonMap>,
    #[serde(default)]
    pub processed_items: Option<u32>,
    #[serde(default)]
    pub failed_items: Option<u32>,
}

/// Optional equality filters for listing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessFilter {
    pub status: Option<IngestionStatus>,
    #[serde(rename = "type")]
    pub kind: Option<IngestionType>,
}

impl ProcessFilter {
    pub fn matches(&self, process: &IngestionProcess) -> bool {
        self.status.is_none_or(|s| s == process.status)
            && self.kind.is_none_or(|k| k == process.kind)
    }
}

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    StartedAt,
    CompletedAt,
    Status,
    #[serde(rename = "type")]
    Kind,
    TotalItems,
}

impl SortField {
    /// The backing column name in the relational store.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::StartedAt => "started_at",
            SortField::CompletedAt => "completed_at",
            SortField::Status => "status",
            SortField::Kind => "type",
            SortField::TotalItems => "total_items",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Offset/limit paging and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            ..Default::default()
        }
    }

    pub fn sorted(mut self, sort_by: SortField, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn validate(&self) -> Result<(), IngestionError> {
        if self.page < 1 {
            return Err(IngestionError::Validation("page must be >= 1".to_string()));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            return Err(IngestionError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, request: &PageRequest) -> Self {
        Self {
            data,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(u64::from(request.limit.max(1))),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

/// Aggregate counts over the processes visible to an actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub by_type: BTreeMap<IngestionType, u64>,
    /// Mean of `completedAt - startedAt` in seconds over completed records.
    pub average_duration: f64,
}

impl IngestionStats {
    pub fn record_status(&mut self, status: IngestionStatus, count: u64) {
        match status {
            IngestionStatus::Pending => self.pending += count,
            IngestionStatus::Processing => self.processing += count,
            IngestionStatus::Completed => self.completed += count,
            IngestionStatus::Failed => self.failed += count,
        }
        self.total += count;
    }
}
