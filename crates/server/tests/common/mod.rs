//! # Common Test Utilities
//!
//! This module centralizes test harnesses and helper functions used across the
//! `ingestflow-server` integration tests. It includes:
//!
//! - `TestApp`: A full application harness that spawns a real server on a random port,
//!   backed by a temporary SQLite database and fast simulation timings.
//! - JWT helpers that mint tokens the server accepts (or deliberately rejects).

// Allow unused code because this is a test utility module, and not all
// functions might be used by every test file that includes it.
#![allow(unused)]

use anyhow::{bail, Result};
use axum::serve;
use core_access::{get_or_create_user, Role, User};
use ingestflow_server::{
    auth::middleware::Claims,
    config, router,
    state::{build_app_state, AppState},
};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use serde_json::Value;
use std::{
    fs::File,
    io::Write,
    net::SocketAddr,
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tempfile::{tempdir, NamedTempFile, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

// --- Full Application Test Harness ---

/// A harness for end-to-end testing of the Axum server.
///
/// This struct spawns the server on a random available port and sets up a
/// temporary SQLite database for users and (by default) process records.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub db_path: PathBuf,
    pub app_state: AppState,
    _db_file: NamedTempFile,
    _config_dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawns the application server with the SQLite process store.
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with_store("sqlite").await
    }

    /// Spawns the application server with the named process store.
    pub async fn spawn_with_store(process_store: &str) -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();

        let db_file = NamedTempFile::new()?;
        let db_path = db_file.path().to_path_buf();

        let config_dir = tempdir()?;
        let config_path = config_dir.path().join("config.yml");
        let config_content = format!(
            r#"
port: 0
db_url: "{}"
process_store: "{process_store}"
environment: "test"
simulation:
  initial_delay_ms: 10
  tick_interval_ms: 20
  min_duration_ms: 60
  max_duration_ms: 120
  max_step: 10
"#,
            db_path.display(),
        );
        let mut file = File::create(&config_path)?;
        file.write_all(config_content.as_bytes())?;

        let config_path = config_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("non UTF-8 temp path"))?;
        let config = config::get_config(Some(config_path))?;
        let app_state = build_app_state(config).await?;
        let app_state_for_harness = app_state.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server_handle = tokio::spawn(async move {
            let manager = app_state.manager.clone();
            let app = router::create_router(app_state);
            let server = serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
            manager.shutdown().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;

        Ok(Self {
            address,
            client: Client::new(),
            db_path,
            app_state: app_state_for_harness,
            _db_file: db_file,
            _config_dir: config_dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    /// Creates `identifier` with `role` and returns a valid token for it.
    pub async fn login_as(&self, identifier: &str, role: Role) -> Result<(User, String)> {
        let user = get_or_create_user(&self.app_state.db, identifier, Some(role)).await?;
        Ok((user, generate_jwt(identifier)?))
    }

    /// Creates a process through the API and returns its `result` object.
    pub async fn create_process(&self, token: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.url("/ingestion"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if response.status() != reqwest::StatusCode::CREATED {
            bail!(
                "create returned {}: {}",
                response.status(),
                response.text().await?
            );
        }
        let body: Value = response.json().await?;
        Ok(body["result"].clone())
    }

    /// Polls `GET /ingestion/{id}` until the process reaches `status`.
    pub async fn wait_for_status(&self, token: &str, id: &str, status: &str) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let body: Value = self
                .client
                .get(self.url(&format!("/ingestion/{id}")))
                .bearer_auth(token)
                .send()
                .await?
                .json()
                .await?;
            if body["result"]["status"] == status {
                return Ok(body["result"].clone());
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("process {id} never reached '{status}': {body}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Generates a valid JWT for a given user identifier (subject).
pub fn generate_jwt(sub: &str) -> Result<String> {
    let expiration = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + 3600;
    sign(sub, expiration as usize)
}

/// Generates a JWT that expired well outside the validation leeway.
pub fn generate_expired_jwt(sub: &str) -> Result<String> {
    let expiration = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() - 3600;
    sign(sub, expiration as usize)
}

fn sign(sub: &str, exp: usize) -> Result<String> {
    let claims = Claims {
        sub: sub.to_string(),
        exp,
    };
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "a-secure-secret-key".to_string());
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;
    Ok(token)
}
