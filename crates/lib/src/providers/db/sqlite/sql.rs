//! # SQLite Specific SQL Queries
//!
//! This module centralizes SQL strings for the SQLite process store.
//! Timestamps are stored as epoch milliseconds and JSON maps as text.

pub const CREATE_INGESTION_PROCESSES_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS ingestion_processes (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        status TEXT NOT NULL,
        parameters TEXT,
        result TEXT,
        error_message TEXT,
        total_items INTEGER NOT NULL DEFAULT 0,
        processed_items INTEGER NOT NULL DEFAULT 0,
        failed_items INTEGER NOT NULL DEFAULT 0,
        started_at INTEGER,
        completed_at INTEGER,
        initiated_by TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )";

pub const CREATE_STATUS_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_ingestion_status ON ingestion_processes (status)";
pub const CREATE_TYPE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_ingestion_type ON ingestion_processes (type)";
pub const CREATE_CREATED_AT_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_ingestion_created_at ON ingestion_processes (created_at)";
pub const CREATE_INITIATED_BY_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_ingestion_initiated_by ON ingestion_processes (initiated_by)";

pub const ALL_TABLE_CREATION_SQL: &[&str] = &[
    CREATE_INGESTION_PROCESSES_TABLE_SQL,
    CREATE_STATUS_INDEX_SQL,
    CREATE_TYPE_INDEX_SQL,
    CREATE_CREATED_AT_INDEX_SQL,
    CREATE_INITIATED_BY_INDEX_SQL,
];

/// Column list shared by every SELECT so rows decode positionally.
pub const PROCESS_COLUMNS: &str = "id, type, status, parameters, result, error_message, \
     total_items, processed_items, failed_items, started_at, completed_at, \
     initiated_by, created_at, updated_at";

pub fn select_by_id() -> String {
    format!("SELECT {PROCESS_COLUMNS} FROM ingestion_processes WHERE id = ?")
}

pub const INSERT_PROCESS_SQL: &str = "
    INSERT INTO ingestion_processes (
        id, type, status, parameters, result, error_message,
        total_items, processed_items, failed_items, started_at, completed_at,
        initiated_by, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// `initiated_by` and `created_at` are immutable and never rewritten.
pub const UPDATE_PROCESS_SQL: &str = "
    UPDATE ingestion_processes SET
        status = ?, parameters = ?, result = ?, error_message = ?,
        total_items = ?, processed_items = ?, failed_items = ?,
        started_at = ?, completed_at = ?, updated_at = ?
    WHERE id = ?";

pub const DELETE_PROCESS_SQL: &str = "DELETE FROM ingestion_processes WHERE id = ?";

/// Builds a `WHERE` clause from the optional owner/status/type filters.
///
/// Every present condition contributes one positional parameter, in the order
/// owner, status, type.
pub fn where_clause(owner: bool, status: bool, kind: bool) -> String {
    let mut conditions = Vec::new();
    if owner {
        conditions.push("initiated_by = ?");
    }
    if status {
        conditions.push("status = ?");
    }
    if kind {
        conditions.push("type = ?");
    }
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

pub fn count_processes(where_sql: &str) -> String {
    format!("SELECT COUNT(*) FROM ingestion_processes{where_sql}")
}

/// `column` and `direction` come from whitelisted enums, never from callers.
pub fn page_processes(where_sql: &str, column: &str, direction: &str, limit: u32, offset: u64) -> String {
    format!(
        "SELECT {PROCESS_COLUMNS} FROM ingestion_processes{where_sql} \
         ORDER BY {column} {direction}, id ASC LIMIT {limit} OFFSET {offset}"
    )
}

pub fn count_by_status(where_sql: &str) -> String {
    format!("SELECT status, COUNT(*) FROM ingestion_processes{where_sql} GROUP BY status")
}

pub fn count_by_type(where_sql: &str) -> String {
    format!("SELECT type, COUNT(*) FROM ingestion_processes{where_sql} GROUP BY type")
}

/// Average completed duration in seconds. `owner_filter` adds one parameter.
pub fn average_duration(owner_filter: bool) -> String {
    let owner_sql = if owner_filter {
        " AND initiated_by = ?"
    } else {
        ""
    };
    format!(
        "SELECT AVG((completed_at - started_at) / 1000.0) FROM ingestion_processes \
         WHERE status = 'completed' AND started_at IS NOT NULL \
         AND completed_at IS NOT NULL{owner_sql}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_joins_present_filters() {
        assert_eq!(where_clause(false, false, false), "");
        assert_eq!(where_clause(true, false, false), " WHERE initiated_by = ?");
        assert_eq!(
            where_clause(true, true, true),
            " WHERE initiated_by = ? AND status = ? AND type = ?"
        );
    }
}
