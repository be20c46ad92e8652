//! # Lifecycle Manager
//!
//! Owns the ingestion state machine:
//!
//! ```text
//! PENDING ──start──▶ PROCESSING ──complete──▶ COMPLETED
//!                         │
//!                         └──────fail───────▶ FAILED
//! ```
//!
//! Every mutating operation re-reads the record and writes it back while
//! holding the manager's transition lock, so a manual transition and a
//! simulator tick can never interleave. Terminal transitions and removal also
//! cancel the process's simulator task.

use crate::{
    errors::IngestionError,
    providers::db::storage::ProcessStore,
    simulator::{self, SimulationConfig, SimulationFault},
    types::{
        IngestionProcess, IngestionStats, IngestionStatus, IngestionUpdate, JsonMap,
        NewIngestion, Page, PageRequest, ProcessFilter,
    },
};
use chrono::Utc;
use core_access::Actor;
use serde_json::json;
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Inner {
    store: Arc<dyn ProcessStore>,
    simulation: SimulationConfig,
    transition_lock: Mutex<()>,
    tasks: Mutex<HashMap<Uuid, CancellationToken>>,
    shutdown: CancellationToken,
    faults: Option<mpsc::UnboundedSender<SimulationFault>>,
}

/// Enforces the ingestion state machine and its ownership rules.
///
/// Cheap to clone; clones share the store, the lock and the task registry.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("store", &self.inner.store.name())
            .field("simulation", &self.inner.simulation)
            .finish_non_exhaustive()
    }
}

/// A builder for creating `LifecycleManager` instances.
pub struct LifecycleManagerBuilder {
    store: Arc<dyn ProcessStore>,
    simulation: SimulationConfig,
    faults: Option<mpsc::UnboundedSender<SimulationFault>>,
}

impl LifecycleManagerBuilder {
    pub fn simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    /// Routes simulator failures that could not be persisted to `faults`.
    pub fn fault_sink(mut self, faults: mpsc::UnboundedSender<SimulationFault>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn build(self) -> LifecycleManager {
        LifecycleManager {
            inner: Arc::new(Inner {
                store: self.store,
                simulation: self.simulation,
                transition_lock: Mutex::new(()),
                tasks: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                faults: self.faults,
            }),
        }
    }
}

fn invalid_state(expected: IngestionStatus) -> IngestionError {
    IngestionError::InvalidState(format!("Ingestion process is not in {expected} status"))
}

impl LifecycleManager {
    pub fn builder(store: Arc<dyn ProcessStore>) -> LifecycleManagerBuilder {
        LifecycleManagerBuilder {
            store,
            simulation: SimulationConfig::default(),
            faults: None,
        }
    }

    pub fn new(store: Arc<dyn ProcessStore>) -> Self {
        Self::builder(store).build()
    }

    pub fn store(&self) -> &Arc<dyn ProcessStore> {
        &self.inner.store
    }

    pub fn simulation_config(&self) -> &SimulationConfig {
        &self.inner.simulation
    }

    /// Loads a record the actor may see. Invisible records look absent.
    async fn load_visible(
        &self,
        id: Uuid,
        actor: &Actor,
    ) -> Result<IngestionProcess, IngestionError> {
        match self.inner.store.get(id).await? {
            Some(process) if actor.is_admin() || actor.owns(&process.initiated_by) => Ok(process),
            _ => Err(IngestionError::NotFound),
        }
    }

    /// Loads a record regardless of owner. Used by operations that report
    /// `Forbidden` to non-owners instead of hiding the record.
    async fn load_existing(&self, id: Uuid) -> Result<IngestionProcess, IngestionError> {
        self.inner
            .store
            .get(id)
            .await?
            .ok_or(IngestionError::NotFound)
    }

    async fn persist(&self, process: &mut IngestionProcess) -> Result<(), IngestionError> {
        process.updated_at = Utc::now();
        self.inner.store.save(process).await
    }

    /// Creates a `Pending` process owned by `actor`.
    pub async fn create(
        &self,
        input: NewIngestion,
        actor: &Actor,
    ) -> Result<IngestionProcess, IngestionError> {
        let process = IngestionProcess::new(input, actor.id.clone());
        self.inner.store.insert(&process).await?;
        info!(id = %process.id, kind = %process.kind, owner = %actor.id, "Created ingestion process.");
        Ok(process)
    }

    pub async fn get_one(
        &self,
        id: Uuid,
        actor: &Actor,
    ) -> Result<IngestionProcess, IngestionError> {
        self.load_visible(id, actor).await
    }

    /// Lists processes. Non-admin actors only see their own.
    pub async fn list(
        &self,
        filter: ProcessFilter,
        page: PageRequest,
        actor: &Actor,
    ) -> Result<Page<IngestionProcess>, IngestionError> {
        page.validate()?;
        let owner = (!actor.is_admin()).then_some(actor.id.as_str());
        let (data, total) = self.inner.store.query(owner, &filter, &page).await?;
        debug!(actor = %actor.id, total, "Listed ingestion processes.");
        Ok(Page::new(data, total, &page))
    }

    /// Moves a `Pending` process to `Processing` and launches its simulator.
    pub async fn start(
        &self,
        id: Uuid,
        actor: &Actor,
    ) -> Result<IngestionProcess, IngestionError> {
        let process = {
            let _guard = self.inner.transition_lock.lock().await;
            let mut process = self.load_existing(id).await?;

            if process.status != IngestionStatus::Pending {
                return Err(invalid_state(IngestionStatus::Pending));
            }
            if !actor.can_manage(&process.initiated_by) {
                return Err(IngestionError::Forbidden(
                    "You can only start your own ingestion processes".to_string(),
                ));
            }

            process.status = IngestionStatus::Processing;
            process.started_at = Some(Utc::now());
            self.persist(&mut process).await?;
            process
        };

        info!(id = %id, actor = %actor.id, "Started ingestion process.");
        self.launch_simulation(id).await;
        Ok(process)
    }

    /// Marks a `Processing` process as `Completed` with the given result.
    pub async fn complete(
        &self,
        id: Uuid,
        result: JsonMap,
        actor: &Actor,
    ) -> Result<IngestionProcess, IngestionError> {
        let process = {
            let _guard = self.inner.transition_lock.lock().await;
            let mut process = self.load_visible(id, actor).await?;

            if process.status != IngestionStatus::Processing {
                return Err(invalid_state(IngestionStatus::Processing));
            }

            process.status = IngestionStatus::Completed;
            process.completed_at = Some(Utc::now());
            process.result = Some(result);
            self.persist(&mut process).await?;
            process
        };

        self.cancel_simulation(id).await;
        info!(id = %id, actor = %actor.id, "Completed ingestion process.");
        Ok(process)
    }

    /// Marks a `Processing` process as `Failed` with the given message.
    pub async fn fail(
        &self,
        id: Uuid,
        error_message: String,
        actor: &Actor,
    ) -> Result<IngestionProcess, IngestionError> {
        let process = {
            let _guard = self.inner.transition_lock.lock().await;
            let mut process = self.load_visible(id, actor).await?;

            if process.status != IngestionStatus::Processing {
                return Err(invalid_state(IngestionStatus::Processing));
            }

            process.status = IngestionStatus::Failed;
            process.completed_at = Some(Utc::now());
            process.error_message = Some(error_message);
            self.persist(&mut process).await?;
            process
        };

        self.cancel_simulation(id).await;
        info!(id = %id, actor = %actor.id, "Marked ingestion process as failed.");
        Ok(process)
    }

    /// Merges the present fields of `update`, in any status.
    pub async fn update(
        &self,
        id: Uuid,
        update: IngestionUpdate,
        actor: &Actor,
    ) -> Result<IngestionProcess, IngestionError> {
        let _guard = self.inner.transition_lock.lock().await;
        let mut process = self.load_existing(id).await?;

        if !actor.can_manage(&process.initiated_by) {
            return Err(IngestionError::Forbidden(
                "You can only update your own ingestion processes".to_string(),
            ));
        }

        if let Some(processed) = update.processed_items {
            if process.total_items > 0 && processed > process.total_items {
                return Err(IngestionError::Validation(format!(
                    "processedItems ({processed}) cannot exceed totalItems ({})",
                    process.total_items
                )));
            }
            process.processed_items = processed;
        }
        if let Some(failed) = update.failed_items {
            process.failed_items = failed;
        }
        if let Some(parameters) = update.parameters {
            process.parameters = Some(parameters);
        }
        if let Some(result) = update.result {
            process.result = Some(result);
        }

        self.persist(&mut process).await?;
        debug!(id = %id, actor = %actor.id, "Updated ingestion process.");
        Ok(process)
    }

    /// Deletes a process that is not currently running.
    pub async fn remove(&self, id: Uuid, actor: &Actor) -> Result<(), IngestionError> {
        {
            let _guard = self.inner.transition_lock.lock().await;
            let process = self.load_existing(id).await?;

            if !actor.can_manage(&process.initiated_by) {
                return Err(IngestionError::Forbidden(
                    "You can only delete your own ingestion processes".to_string(),
                ));
            }
            if process.status == IngestionStatus::Processing {
                return Err(IngestionError::InvalidState(
                    "Cannot delete a running ingestion process".to_string(),
                ));
            }

            if !self.inner.store.delete(id).await? {
                return Err(IngestionError::NotFound);
            }
        }

        self.cancel_simulation(id).await;
        info!(id = %id, actor = %actor.id, "Removed ingestion process.");
        Ok(())
    }

    /// Aggregates counts. Scoped to the actor's own records unless the actor
    /// is an admin or absent.
    pub async fn stats(&self, actor: Option<&Actor>) -> Result<IngestionStats, IngestionError> {
        let owner = actor
            .filter(|a| !a.is_admin())
            .map(|a| a.id.as_str());
        self.inner.store.stats(owner).await
    }

    // --- Simulator-facing transitions ---

    /// Advances `processed_items` by `step`, capped at the total.
    ///
    /// Returns `None` once the process has left `Processing` (or vanished),
    /// which tells the simulator to stop.
    pub(crate) async fn advance_progress(
        &self,
        id: Uuid,
        step: u32,
    ) -> Result<Option<IngestionProcess>, IngestionError> {
        let _guard = self.inner.transition_lock.lock().await;
        let Some(mut process) = self.inner.store.get(id).await? else {
            return Ok(None);
        };
        if process.status != IngestionStatus::Processing {
            return Ok(None);
        }
        if process.total_items > 0 {
            process.processed_items = process
                .processed_items
                .saturating_add(step)
                .min(process.total_items);
            self.persist(&mut process).await?;
        }
        Ok(Some(process))
    }

    /// Forces the terminal `Completed` transition at the end of a simulation.
    pub(crate) async fn finish_simulation(&self, id: Uuid) -> Result<bool, IngestionError> {
        let _guard = self.inner.transition_lock.lock().await;
        let Some(mut process) = self.inner.store.get(id).await? else {
            return Ok(false);
        };
        if process.status != IngestionStatus::Processing {
            return Ok(false);
        }

        process.status = IngestionStatus::Completed;
        process.completed_at = Some(Utc::now());
        process.processed_items = process.total_items;
        let mut result = JsonMap::new();
        result.insert("success".to_string(), json!(true));
        result.insert(
            "message".to_string(),
            json!("Ingestion completed successfully"),
        );
        result.insert("processedItems".to_string(), json!(process.total_items));
        process.result = Some(result);
        self.persist(&mut process).await?;
        info!(id = %id, "Simulated ingestion finished.");
        Ok(true)
    }

    /// Forces the terminal `Failed` transition after a simulator error.
    pub(crate) async fn fail_simulation(
        &self,
        id: Uuid,
        message: String,
    ) -> Result<bool, IngestionError> {
        let _guard = self.inner.transition_lock.lock().await;
        let Some(mut process) = self.inner.store.get(id).await? else {
            return Ok(false);
        };
        if process.status != IngestionStatus::Processing {
            return Ok(false);
        }

        process.status = IngestionStatus::Failed;
        process.completed_at = Some(Utc::now());
        process.error_message = Some(message);
        self.persist(&mut process).await?;
        warn!(id = %id, "Simulated ingestion failed.");
        Ok(true)
    }

    /// Surfaces a simulator failure that could not be recorded on the process.
    pub(crate) fn report_fault(&self, fault: SimulationFault) {
        error!(id = %fault.process_id, message = %fault.message, "Unrecorded simulation failure.");
        if let Some(faults) = &self.inner.faults {
            if faults.send(fault).is_err() {
                debug!("Fault receiver dropped.");
            }
        }
    }

    // --- Task registry ---

    async fn launch_simulation(&self, id: Uuid) {
        let token = self.inner.shutdown.child_token();
        let previous = self.inner.tasks.lock().await.insert(id, token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        simulator::spawn(self.clone(), id, token);
    }

    /// Signals the simulator for `id` (if any) to stop.
    pub async fn cancel_simulation(&self, id: Uuid) {
        if let Some(token) = self.inner.tasks.lock().await.remove(&id) {
            token.cancel();
            debug!(id = %id, "Cancelled simulation.");
        }
    }

    /// Called by a simulator task when it exits. A process is only ever
    /// started once, so the registered token for `id` is always this task's.
    pub(crate) async fn release_simulation(&self, id: Uuid) {
        self.inner.tasks.lock().await.remove(&id);
    }

    /// Number of simulator tasks currently registered.
    pub async fn active_simulations(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }

    /// Cancels every running simulation.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let drained = self.inner.tasks.lock().await.drain().count();
        info!(cancelled = drained, "Lifecycle manager shut down.");
    }
}
