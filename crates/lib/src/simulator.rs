//! # Progress Simulator
//!
//! Stands in for a real ingestion worker. Once a process is started, a
//! background task waits briefly, then periodically advances its progress
//! until a randomly chosen duration elapses, and finally completes it.
//!
//! All writes go through the [`LifecycleManager`], which re-reads the record
//! under its transition lock. A process that left `Processing` by other means
//! simply stops the task at the next tick.

use crate::{errors::IngestionError, manager::LifecycleManager};
use rand::Rng;
use std::time::Duration;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Timing knobs for the simulated worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Delay between `start` and the first progress tick.
    pub initial_delay: Duration,
    pub tick_interval: Duration,
    /// Bounds of the randomly chosen run time, measured after `initial_delay`.
    pub min_duration: Duration,
    pub max_duration: Duration,
    /// Each tick adds a random amount in `0..max_step` to the processed count.
    pub max_step: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            tick_interval: Duration::from_millis(500),
            min_duration: Duration::from_millis(1000),
            max_duration: Duration::from_millis(3000),
            max_step: 10,
        }
    }
}

impl SimulationConfig {
    /// Draws a run time from `[min_duration, max_duration]`.
    pub fn sample_duration(&self) -> Duration {
        if self.max_duration <= self.min_duration {
            return self.min_duration;
        }
        rand::thread_rng().gen_range(self.min_duration..=self.max_duration)
    }

    pub fn sample_step(&self) -> u32 {
        if self.max_step == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..self.max_step)
    }
}

/// A simulator failure that could not be recorded on the process itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationFault {
    pub process_id: Uuid,
    pub message: String,
}

/// Spawns the simulator for `id`. The task ends when the run completes, the
/// process leaves `Processing`, or `token` is cancelled.
pub(crate) fn spawn(manager: LifecycleManager, id: Uuid, token: CancellationToken) {
    tokio::spawn(async move {
        let outcome = tokio::select! {
            _ = token.cancelled() => {
                debug!(id = %id, "Simulation cancelled.");
                Ok(())
            }
            outcome = drive(&manager, id) => outcome,
        };

        if let Err(err) = outcome {
            warn!(id = %id, error = %err, "Simulation step failed.");
            if let Err(write_err) = manager.fail_simulation(id, err.to_string()).await {
                manager.report_fault(SimulationFault {
                    process_id: id,
                    message: format!("{err}; could not mark process as failed: {write_err}"),
                });
            }
        }

        manager.release_simulation(id).await;
    });
}

async fn drive(manager: &LifecycleManager, id: Uuid) -> Result<(), IngestionError> {
    let config = manager.simulation_config().clone();

    sleep(config.initial_delay).await;

    let run_for = config.sample_duration();
    debug!(id = %id, run_ms = run_for.as_millis() as u64, "Simulation running.");

    let deadline = sleep_until(Instant::now() + run_for);
    tokio::pin!(deadline);

    let mut ticks = interval_at(Instant::now() + config.tick_interval, config.tick_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = ticks.tick() => {
                let step = config.sample_step();
                if manager.advance_progress(id, step).await?.is_none() {
                    debug!(id = %id, "Process left processing; stopping simulation.");
                    return Ok(());
                }
            }
        }
    }

    manager.finish_simulation(id).await?;
    Ok(())
}
