// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public engine handle: submission, cancellation, waiting, teardown.

use crate::error::EngineError;
use crate::runtime::Runtime;
use crate::setting::EngineSetting;
use gig_core::{Binding, Control, Job, JobError, ResourcePool, Status, SystemClock};
use gig_storage::JobStore;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// State shared between the engine handle, the loop, and bound jobs.
pub(crate) struct Shared {
    pub setting: EngineSetting,
    pub store: Mutex<JobStore>,
    pub pool: Arc<ResourcePool>,
    pub control: gig_core::ControlSender,
    /// Pinged on every terminal transition; `wait`/`submit_async`
    /// re-check their predicate per ping.
    pub idle: Notify,
}

/// The job execution engine.
///
/// An ordinary value: concurrent engines in one process share nothing.
/// `new` spawns the scheduling loop on the ambient tokio runtime;
/// dropping the engine aborts it, `shutdown` ends it cleanly.
pub struct Engine {
    shared: Arc<Shared>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Start an engine. Must be called within a tokio runtime.
    pub fn new(setting: EngineSetting) -> Self {
        let pool = Arc::new(ResourcePool::new(setting.cpu_slots, setting.memory_slots));
        let store = JobStore::new(setting.cache_path.clone());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            setting,
            store: Mutex::new(store),
            pool,
            control: control_tx,
            idle: Notify::new(),
        });
        let runtime = Runtime::new(Arc::clone(&shared), control_rx, SystemClock);
        let loop_task = tokio::spawn(runtime.run());
        Self {
            shared,
            loop_task: Mutex::new(Some(loop_task)),
        }
    }

    pub fn setting(&self) -> &EngineSetting {
        &self.shared.setting
    }

    /// The engine's slot counters.
    pub fn resources(&self) -> Arc<ResourcePool> {
        Arc::clone(&self.shared.pool)
    }

    /// Lock the job store for inspection or maintenance
    /// (`update_from_cache`, `clear_non_active`, bucket queries).
    pub fn jobs(&self) -> MutexGuard<'_, JobStore> {
        self.shared.store.lock()
    }

    /// Add jobs to `pending`, binding them to this engine.
    ///
    /// The whole batch is validated first: jobs already bound (here or
    /// elsewhere) are rejected, as are args referencing the future of
    /// a job that is neither stored nor part of the batch.
    pub fn submit_all(&self, jobs: &[Job]) -> Result<(), EngineError> {
        let mut store = self.shared.store.lock();
        for job in jobs {
            if job.is_bound() {
                return Err(JobError::runtime(format!(
                    "job {} is already bound to an engine",
                    job.id()
                ))
                .into());
            }
            for fut in job.args().futures() {
                let owner = fut.job_id();
                let in_batch = jobs.iter().any(|j| j.id() == owner);
                if !in_batch && !store.contains(owner) {
                    return Err(JobError::invalid_state(format!(
                        "job {} depends on the future of unsubmitted job {}",
                        job.id(),
                        owner
                    ))
                    .into());
                }
            }
        }
        for job in jobs {
            job.bind(Binding {
                pool: Arc::downgrade(&self.shared.pool),
                control: self.shared.control.clone(),
            })?;
            store.add(job.clone())?;
        }
        drop(store);
        let _ = self.shared.control.send(Control::Wake);
        Ok(())
    }

    /// Synchronous add to `pending`.
    pub fn submit(&self, job: &Job) -> Result<(), EngineError> {
        self.submit_all(std::slice::from_ref(job))
    }

    /// Back-pressured add: yields while the engine is full (count of
    /// non-terminal jobs at or above `max_jobs`).
    pub async fn submit_async(&self, job: &Job) -> Result<(), EngineError> {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.store.lock().non_terminal_count() < self.shared.setting.max_jobs {
                break;
            }
            notified.await;
        }
        self.submit(job)
    }

    /// Request cancellation of a submitted job.
    pub fn cancel(&self, job: &Job) -> Result<(), EngineError> {
        job.cancel().map_err(Into::into)
    }

    /// Wait for one job to reach a terminal state.
    pub async fn wait_job(&self, job: &Job) -> Result<Status, EngineError> {
        job.join().await.map_err(Into::into)
    }

    /// Wait until no job is pending or running.
    pub async fn wait(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.store.lock().non_terminal_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for all jobs, then stop the loop. Idempotent; teardown
    /// problems are logged, not raised.
    pub async fn shutdown(&self) {
        self.wait().await;
        self.stop_loop().await;
    }

    /// Cancel every non-terminal job, wait for the cancellations to
    /// land, then stop the loop.
    pub async fn shutdown_cancelling(&self) {
        let jobs = self.shared.store.lock().all_jobs();
        for job in jobs {
            if !job.is_terminal() {
                if let Err(e) = job.cancel() {
                    tracing::warn!(job = %job.id(), error = %e, "cancel during shutdown failed");
                }
            }
        }
        self.wait().await;
        self.stop_loop().await;
    }

    async fn stop_loop(&self) {
        let _ = self.shared.control.send(Control::Shutdown);
        let task = self.loop_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "engine loop ended abnormally");
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineSetting::default())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Last-resort teardown for engines dropped without shutdown
        if let Some(task) = self.loop_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
