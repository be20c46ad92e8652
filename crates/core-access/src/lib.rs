//! # Core Access Crate
//!
//! This crate is the central authority for identity and authorization (AuthZ)
//! primitives of the `ingestflow` service: roles, the acting caller, and the
//! persisted `users` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::Mutex;
use turso::{Connection, Database, Error as TursoError, Row, Value as TursoValue, params};
use uuid::Uuid;

/// Creates the `users` table. Safe to run on every startup.
pub const CREATE_USERS_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        role TEXT NOT NULL,
        created_at TEXT NOT NULL
    )";

#[derive(Error, Debug)]
pub enum CoreAccessError {
    #[error("Database error: {0}")]
    Database(#[from] TursoError),
    #[error("Failed to create or find user for identifier: {0}")]
    UserPersistenceFailed(String),
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("{0}")]
    Forbidden(String),
}

/// The role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            other => Err(CoreAccessError::UnknownRole(other.to_string())),
        }
    }
}

/// The already-authenticated identity on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when this actor initiated the resource owned by `owner_id`.
    pub fn owns(&self, owner_id: &str) -> bool {
        self.id == owner_id
    }

    /// Owners and admins may mutate a resource.
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.owns(owner_id) || self.is_admin()
    }

    /// Roles allowed to author new work and to drive manual transitions.
    pub fn can_author(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Editor)
    }
}

/// Represents a user in the system.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// The unique, deterministic ID of the user (UUIDv5 from an external identifier).
    pub id: String,
    pub role: Role,
    /// The timestamp when the user was first created.
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.role)
    }
}

fn text_column(row: &Row, idx: usize) -> Result<String, CoreAccessError> {
    match row.get_value(idx)? {
        TursoValue::Text(s) => Ok(s),
        other => Err(CoreAccessError::DataIntegrity(format!(
            "Expected text in column {idx}, found {other:?}"
        ))),
    }
}

impl TryFrom<&Row> for User {
    type Error = CoreAccessError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let created_at_str = text_column(row, 2)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                CoreAccessError::DataIntegrity(format!(
                    "Failed to parse date '{created_at_str}': {e}"
                ))
            })?;

        Ok(User {
            id: text_column(row, 0)?,
            role: text_column(row, 1)?.parse()?,
            created_at,
        })
    }
}

/// Derives the stable user id for an external identifier (e.g. a token subject).
pub fn user_id_for(user_identifier: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, user_identifier.as_bytes()).to_string()
}

/// Ensures the `users` table exists.
pub async fn initialize_schema(db: &Database) -> Result<(), CoreAccessError> {
    let conn = db.connect()?;
    conn.execute(CREATE_USERS_TABLE_SQL, ()).await?;
    Ok(())
}

/// Serializes user creation within this process so the admin bootstrap
/// decision and the insert are never interleaved.
static USER_CREATION: Mutex<()> = Mutex::const_new(());

const SELECT_USER_SQL: &str = "SELECT id, role, created_at FROM users WHERE id = ?";

async fn find_user(conn: &Connection, user_id: &str) -> Result<Option<User>, CoreAccessError> {
    let mut rows = conn.query(SELECT_USER_SQL, params![user_id.to_string()]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(User::try_from(&row)?)),
        None => Ok(None),
    }
}

/// Finds a user by their unique identifier (e.g., email or token sub),
/// creating them if they don't exist.
///
/// A newly created user receives `role` when given. Otherwise the first user
/// becomes `admin` and everyone after that starts as a `viewer`. Concurrent
/// first requests for the same identifier resolve to the same row.
pub async fn get_or_create_user(
    db: &Database,
    user_identifier: &str,
    role: Option<Role>,
) -> Result<User, CoreAccessError> {
    let mut conn = db.connect()?;
    let user_id = user_id_for(user_identifier);

    if let Some(user) = find_user(&conn, &user_id).await? {
        return Ok(user);
    }

    let _creating = USER_CREATION.lock().await;
    let tx = conn.transaction().await?;

    let role = match role {
        Some(role) => role,
        None => {
            let admin_exists = tx
                .query("SELECT 1 FROM users WHERE role = 'admin' LIMIT 1", ())
                .await?
                .next()
                .await?
                .is_some();

            if admin_exists { Role::Viewer } else { Role::Admin }
        }
    };

    let inserted = tx
        .execute(
            "INSERT INTO users (id, role, created_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
            params![user_id.clone(), role.as_str(), Utc::now().to_rfc3339()],
        )
        .await?;
    tx.commit().await?;

    if inserted > 0 {
        tracing::info!(user_id = %user_id, role = %role, "Created user.");
    }

    find_user(&conn, &user_id)
        .await?
        .ok_or_else(|| CoreAccessError::UserPersistenceFailed(user_identifier.to_string()))
}

/// Changes the role of an existing user. Only admins may do this.
///
/// Returns `Forbidden` for non-admin actors and `UserNotFound` for an unknown id.
pub async fn set_user_role(
    db: &Database,
    actor: &Actor,
    user_id: &str,
    role: Role,
) -> Result<User, CoreAccessError> {
    if !actor.is_admin() {
        return Err(CoreAccessError::Forbidden(
            "Only admins may change user roles.".to_string(),
        ));
    }

    let conn = db.connect()?;
    let changed = conn
        .execute(
            "UPDATE users SET role = ? WHERE id = ?",
            params![role.as_str(), user_id.to_string()],
        )
        .await?;
    if changed == 0 {
        return Err(CoreAccessError::UserNotFound(user_id.to_string()));
    }
    tracing::info!(user_id = %user_id, role = %role, by = %actor.id, "Changed user role.");

    find_user(&conn, user_id)
        .await?
        .ok_or_else(|| CoreAccessError::UserNotFound(user_id.to_string()))
}

/// Returns every user, newest first.
pub async fn list_users(db: &Database) -> Result<Vec<User>, CoreAccessError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT id, role, created_at FROM users ORDER BY created_at DESC",
            (),
        )
        .await?;

    let mut users = Vec::new();
    while let Some(row) = rows.next().await? {
        users.push(User::try_from(&row)?);
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> Database {
        let db = turso::Builder::new_local(":memory:").build().await.unwrap();
        initialize_schema(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_get_or_create_user_flow() {
        let db = memory_db().await;
        let user_identifier = "test@example.com";

        // The first user bootstraps as admin.
        let user1 = get_or_create_user(&db, user_identifier, None).await.unwrap();
        assert_eq!(user1.id, user_id_for(user_identifier));
        assert_eq!(user1.role, Role::Admin, "The first user should be admin");

        // A second call retrieves the same user.
        let user2 = get_or_create_user(&db, user_identifier, None).await.unwrap();
        assert_eq!(user1.id, user2.id);
        assert_eq!(user1.role, user2.role);
        assert_eq!(user1.created_at.timestamp(), user2.created_at.timestamp());

        let user3 = get_or_create_user(&db, "another@example.com", None)
            .await
            .unwrap();
        assert_ne!(user1.id, user3.id);
        assert_eq!(user3.role, Role::Viewer);
    }

    #[tokio::test]
    async fn test_explicit_role_is_kept_and_listed() {
        let db = memory_db().await;

        let editor = get_or_create_user(&db, "editor@example.com", Some(Role::Editor))
            .await
            .unwrap();
        assert_eq!(editor.role, Role::Editor);

        // Requesting a different role for an existing user does not change it.
        let again = get_or_create_user(&db, "editor@example.com", Some(Role::Admin))
            .await
            .unwrap();
        assert_eq!(again.role, Role::Editor);

        // No admin exists yet, so the next implicit user is promoted.
        let first_implicit = get_or_create_user(&db, "someone@example.com", None)
            .await
            .unwrap();
        assert_eq!(first_implicit.role, Role::Admin);

        let users = list_users(&db).await.unwrap();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_bootstrap_one_admin() {
        let db = memory_db().await;

        // The same new subject twice, plus a second new subject, all at once.
        let (a, b, c) = tokio::join!(
            get_or_create_user(&db, "first@example.com", None),
            get_or_create_user(&db, "first@example.com", None),
            get_or_create_user(&db, "second@example.com", None),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!(a.id, b.id);
        assert_eq!(a.role, b.role);
        assert_ne!(a.id, c.id);

        let users = list_users(&db).await.unwrap();
        assert_eq!(users.len(), 2);
        let admins = users.iter().filter(|u| u.role == Role::Admin).count();
        assert_eq!(admins, 1);
    }

    #[tokio::test]
    async fn test_set_user_role_is_admin_only() {
        let db = memory_db().await;
        let admin = get_or_create_user(&db, "root@example.com", None).await.unwrap();
        let viewer = get_or_create_user(&db, "v@example.com", None).await.unwrap();
        assert_eq!(viewer.role, Role::Viewer);

        let err = set_user_role(&db, &viewer.actor(), &viewer.id, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreAccessError::Forbidden(_)));

        let promoted = set_user_role(&db, &admin.actor(), &viewer.id, Role::Editor)
            .await
            .unwrap();
        assert_eq!(promoted.id, viewer.id);
        assert_eq!(promoted.role, Role::Editor);

        // Later logins see the new role.
        let again = get_or_create_user(&db, "v@example.com", None).await.unwrap();
        assert_eq!(again.role, Role::Editor);

        let err = set_user_role(&db, &admin.actor(), "nobody", Role::Editor)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreAccessError::UserNotFound(id) if id == "nobody"));
    }

    #[test]
    fn test_actor_predicates() {
        let owner = Actor::new("a", Role::Viewer);
        let admin = Actor::new("root", Role::Admin);
        let editor = Actor::new("e", Role::Editor);

        assert!(owner.can_manage("a"));
        assert!(!owner.can_manage("b"));
        assert!(admin.can_manage("b"));
        assert!(!editor.can_manage("b"));

        assert!(!owner.can_author());
        assert!(editor.can_author());
        assert!(admin.can_author());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("editor".parse::<Role>().unwrap(), Role::Editor);
        assert!(matches!(
            "root".parse::<Role>(),
            Err(CoreAccessError::UnknownRole(r)) if r == "root"
        ));
        assert_eq!(Role::Viewer.to_string(), "viewer");
    }
}
