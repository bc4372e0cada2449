// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record, state machine, and builder.

use crate::args::Args;
use crate::clock::{Clock, SystemClock};
use crate::condition::Condition;
use crate::control::{Control, ControlSender};
use crate::error::JobError;
use crate::future::JobFuture;
use crate::id::JobId;
use crate::resources::{ResourcePool, Resources};
use crate::work::{CommandSpec, JobFn, Locality, WebAppSpec, Work};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a job.
///
/// `done`, `failed`, and `cancelled` are terminal and monotonic.
/// Deserialization accepts the `canceled` spelling as a synonym.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Done,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl Status {
    pub const TERMINAL: [Status; 3] = [Status::Done, Status::Failed, Status::Cancelled];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Failed | Status::Cancelled)
    }
}

crate::simple_display! {
    Status {
        Pending => "pending",
        Running => "running",
        Done => "done",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl std::str::FromStr for Status {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "running" => Ok(Status::Running),
            "done" => Ok(Status::Done),
            "failed" => Ok(Status::Failed),
            "cancelled" | "canceled" => Ok(Status::Cancelled),
            other => Err(JobError::runtime(format!("unknown status '{other}'"))),
        }
    }
}

pub type DoneCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&JobError) + Send + Sync>;
pub type CancelCallback = Arc<dyn Fn() + Send + Sync>;

/// Optional hooks run by the engine strictly after the matching
/// terminal transition.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_done: Option<DoneCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_cancel: Option<CancelCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_done", &self.on_done.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

/// Link from an accepted job back to its engine: the resource pool it
/// draws slots from and the control channel into the loop.
#[derive(Clone)]
pub struct Binding {
    pub pool: Weak<ResourcePool>,
    pub control: ControlSender,
}

/// Configuration for building a [`Job`].
pub struct JobSpec {
    work: Work,
    args: Args,
    name: Option<String>,
    retries: u32,
    retry_delay: Duration,
    condition: Option<Condition>,
    resources: Option<Resources>,
    cache_dir: Option<PathBuf>,
    callbacks: Callbacks,
}

impl JobSpec {
    fn new(work: Work) -> Self {
        Self {
            work,
            args: Args::new(),
            name: None,
            retries: 0,
            retry_delay: Duration::ZERO,
            condition: None,
            resources: None,
            cache_dir: None,
            callbacks: Callbacks::default(),
        }
    }

    /// Callable run as a cooperative task on the engine's runtime.
    pub fn local(f: JobFn) -> Self {
        Self::new(Work::Local(f))
    }

    /// Callable run on the worker-thread pool.
    pub fn thread(f: JobFn) -> Self {
        Self::new(Work::Thread(f))
    }

    /// External command run in a child process.
    pub fn process(cmd: CommandSpec) -> Self {
        Self::new(Work::Process(cmd))
    }

    /// Service process watched through TCP port probes.
    pub fn webapp(app: WebAppSpec) -> Self {
        Self::new(Work::WebApp(app))
    }

    crate::setters! {
        set {
            args: Args,
            retries: u32,
            retry_delay: Duration,
        }
        option {
            name: String,
            condition: Condition,
            resources: Resources,
            cache_dir: PathBuf,
        }
    }

    pub fn on_done(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.callbacks.on_done = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&JobError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.on_cancel = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Job {
        let now_ms = SystemClock.epoch_ms();
        self.build_with_epoch_ms(now_ms)
    }

    /// Build with an explicit construction timestamp (tests, replay).
    pub fn build_with_epoch_ms(self, now_ms: u64) -> Job {
        let id = JobId::generate();
        let name = match self.name {
            Some(name) => name,
            None => self.work.callable_name().to_string(),
        };
        let resources = self.resources.unwrap_or_else(|| self.work.default_resources());

        // Futures embedded in the args make their owners implicit
        // dependencies: conjoin AfterSuccess for each one with the
        // user-supplied condition.
        let implicit: Vec<Condition> = self
            .args
            .futures()
            .iter()
            .map(|f| Condition::AfterSuccess { job: f.job_id().clone() })
            .collect();
        let condition = match (self.condition, implicit.is_empty()) {
            (cond, true) => cond,
            (None, false) => Some(Condition::AllSatisfied(implicit)),
            (Some(cond), false) => {
                let mut parts = match cond {
                    Condition::AllSatisfied(parts) => parts,
                    other => vec![other],
                };
                parts.extend(implicit);
                Some(Condition::AllSatisfied(parts))
            }
        };

        let (status_tx, _) = watch::channel(Status::Pending);
        let args_summary = self.args.summary();
        let locality = self.work.locality();
        Job {
            inner: Arc::new(JobInner {
                id: id.clone(),
                name,
                locality,
                work: Some(self.work),
                args: self.args,
                args_summary,
                resources,
                retries: self.retries,
                retry_delay: self.retry_delay,
                condition,
                cache_dir: self.cache_dir,
                callbacks: self.callbacks,
                future: JobFuture::new(id),
                created_at_ms: now_ms,
                status_tx,
                state: Mutex::new(MutState {
                    status: Status::Pending,
                    retry_remain: self.retries,
                    attempts: 0,
                    error: None,
                    started_at_ms: None,
                    stopped_at_ms: None,
                    next_attempt_at_ms: None,
                    cancel: CancellationToken::new(),
                    binding: None,
                }),
            }),
        }
    }
}

struct JobInner {
    id: JobId,
    name: String,
    locality: Locality,
    /// Absent on jobs rebuilt from the terminal cache.
    work: Option<Work>,
    args: Args,
    args_summary: String,
    resources: Resources,
    retries: u32,
    retry_delay: Duration,
    condition: Option<Condition>,
    cache_dir: Option<PathBuf>,
    callbacks: Callbacks,
    future: JobFuture,
    created_at_ms: u64,
    status_tx: watch::Sender<Status>,
    state: Mutex<MutState>,
}

struct MutState {
    status: Status,
    retry_remain: u32,
    attempts: u32,
    error: Option<JobError>,
    started_at_ms: Option<u64>,
    stopped_at_ms: Option<u64>,
    /// Earliest dispatch time for a retried job.
    next_attempt_at_ms: Option<u64>,
    cancel: CancellationToken,
    binding: Option<Binding>,
}

/// One unit of work.
///
/// A `Job` is a cheap clone over shared state: the store, the engine,
/// and the caller all observe the same record. Mutating transitions
/// run on the engine loop; callers interact through `emit`, `rerun`,
/// `join`, `result`, and `cancel`.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    pub fn id(&self) -> &JobId {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn locality(&self) -> Locality {
        self.inner.locality
    }

    /// The execution payload; `None` for jobs rebuilt from cache.
    pub fn work(&self) -> Option<Work> {
        self.inner.work.clone()
    }

    pub fn args(&self) -> &Args {
        &self.inner.args
    }

    pub fn args_summary(&self) -> &str {
        &self.inner.args_summary
    }

    pub fn resources(&self) -> Resources {
        self.inner.resources
    }

    pub fn retries(&self) -> u32 {
        self.inner.retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.inner.retry_delay
    }

    pub fn retry_remain(&self) -> u32 {
        self.inner.state.lock().retry_remain
    }

    /// Number of dispatches so far (retries and reruns included).
    pub fn attempts(&self) -> u32 {
        self.inner.state.lock().attempts
    }

    /// The composed condition: explicit condition conjoined with the
    /// implicit dependencies induced by futures in the args.
    pub fn condition(&self) -> Option<&Condition> {
        self.inner.condition.as_ref()
    }

    pub fn status(&self) -> Status {
        self.inner.state.lock().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn error(&self) -> Option<JobError> {
        self.inner.state.lock().error.clone()
    }

    /// Handle to this job's eventual result.
    pub fn future(&self) -> JobFuture {
        self.inner.future.clone()
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.inner.cache_dir.as_deref()
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.inner.callbacks
    }

    pub fn created_at_ms(&self) -> u64 {
        self.inner.created_at_ms
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.inner.state.lock().started_at_ms
    }

    pub fn stopped_at_ms(&self) -> Option<u64> {
        self.inner.state.lock().stopped_at_ms
    }

    pub fn next_attempt_at_ms(&self) -> Option<u64> {
        self.inner.state.lock().next_attempt_at_ms
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.state.lock().cancel.clone()
    }

    // === Engine binding ===

    /// Attach the job to an engine. Fails when already bound.
    pub fn bind(&self, binding: Binding) -> Result<(), JobError> {
        let mut state = self.inner.state.lock();
        if state.binding.is_some() {
            return Err(JobError::runtime(format!(
                "job {} is already bound to an engine",
                self.inner.id
            )));
        }
        state.binding = Some(binding);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.inner.state.lock().binding.is_some()
    }

    fn pool(&self) -> Option<Arc<ResourcePool>> {
        self.inner
            .state
            .lock()
            .binding
            .as_ref()
            .and_then(|b| b.pool.upgrade())
    }

    fn control(&self) -> Option<ControlSender> {
        self.inner
            .state
            .lock()
            .binding
            .as_ref()
            .map(|b| b.control.clone())
    }

    /// Whether the engine could run this job at all: it must be bound
    /// and carry a callable.
    pub fn runnable(&self) -> bool {
        self.is_bound() && self.inner.work.is_some()
    }

    /// Whether the engine's pool could satisfy this job's slots right
    /// now. False when unbound.
    pub fn has_resource(&self) -> bool {
        self.pool()
            .map(|pool| pool.available(self.inner.resources))
            .unwrap_or(false)
    }

    /// Reserve this job's slots. False when unbound or unavailable.
    pub fn consume_resource(&self) -> bool {
        self.pool()
            .map(|pool| pool.consume(self.inner.resources))
            .unwrap_or(false)
    }

    /// Return this job's slots. False when unbound.
    pub fn release_resource(&self) -> bool {
        self.pool()
            .map(|pool| pool.release(self.inner.resources))
            .unwrap_or(false)
    }

    // === Caller operations ===

    /// Ask the engine to consider this job for dispatch now.
    pub fn emit(&self) -> Result<(), JobError> {
        let control = self.control().ok_or_else(|| {
            JobError::emit(format!("job {} is not bound to an engine", self.inner.id))
        })?;
        let status = self.status();
        if status != Status::Pending {
            return Err(JobError::emit(format!(
                "job {} is {status}, not pending",
                self.inner.id
            )));
        }
        control
            .send(Control::Emit(self.inner.id.clone()))
            .map_err(|_| JobError::emit("engine is shut down"))
    }

    /// Re-enter `pending` from a terminal state, clearing the previous
    /// outcome and resetting the retry budget.
    pub fn rerun(&self) -> Result<(), JobError> {
        let control = self.control().ok_or_else(|| {
            JobError::invalid_state(format!(
                "job {} is not bound to an engine",
                self.inner.id
            ))
        })?;
        if self.inner.work.is_none() {
            return Err(JobError::invalid_state(format!(
                "job {} was restored from cache and has no callable",
                self.inner.id
            )));
        }
        self.reset_for_rerun()?;
        control
            .send(Control::Rerun(self.inner.id.clone()))
            .map_err(|_| JobError::invalid_state("engine is shut down"))
    }

    /// Wait until the job reaches a terminal state.
    pub async fn join(&self) -> Result<Status, JobError> {
        if !self.is_bound() {
            return Err(JobError::invalid_state(format!(
                "job {} was never submitted",
                self.inner.id
            )));
        }
        let mut rx = self.inner.status_tx.subscribe();
        let status = rx
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| *s)
            .map_err(|_| JobError::invalid_state("status channel closed"))?;
        Ok(status)
    }

    /// The stored result; `InvalidState` unless the job is `done`.
    pub fn result(&self) -> Result<Value, JobError> {
        if self.status() != Status::Done {
            return Err(JobError::invalid_state(format!(
                "job {} is {}, result is only available when done",
                self.inner.id,
                self.status()
            )));
        }
        self.inner.future.get()
    }

    /// Request cancellation. Terminal jobs are left untouched.
    pub fn cancel(&self) -> Result<(), JobError> {
        let control = self.control().ok_or_else(|| {
            JobError::invalid_state(format!(
                "job {} is not bound to an engine",
                self.inner.id
            ))
        })?;
        if self.is_terminal() {
            return Ok(());
        }
        control
            .send(Control::Cancel(self.inner.id.clone()))
            .map_err(|_| JobError::invalid_state("engine is shut down"))
    }

    // === Engine-side transitions ===
    //
    // Called on the engine loop; guarded so an out-of-order call can
    // never regress a terminal state.

    fn set_status(&self, state: &mut MutState, status: Status) {
        state.status = status;
        self.inner.status_tx.send_replace(status);
    }

    /// `pending` → `running` at dispatch.
    pub fn mark_running(&self, now_ms: u64) -> Result<(), JobError> {
        let mut state = self.inner.state.lock();
        if state.status != Status::Pending {
            return Err(JobError::emit(format!(
                "job {} is {}, not pending",
                self.inner.id, state.status
            )));
        }
        state.started_at_ms = Some(now_ms);
        state.next_attempt_at_ms = None;
        state.attempts += 1;
        self.set_status(&mut state, Status::Running);
        Ok(())
    }

    /// `running` → `done`; stores the result and resolves the future.
    pub fn complete(&self, value: Value, now_ms: u64) -> Result<(), JobError> {
        let mut state = self.inner.state.lock();
        if state.status != Status::Running {
            return Err(JobError::invalid_state(format!(
                "job {} is {}, cannot complete",
                self.inner.id, state.status
            )));
        }
        state.stopped_at_ms = Some(now_ms);
        self.inner.future.fulfill(value);
        self.set_status(&mut state, Status::Done);
        Ok(())
    }

    /// `running` → `failed`; records the captured error.
    pub fn fail(&self, error: JobError, now_ms: u64) -> Result<(), JobError> {
        let mut state = self.inner.state.lock();
        if state.status != Status::Running {
            return Err(JobError::invalid_state(format!(
                "job {} is {}, cannot fail",
                self.inner.id, state.status
            )));
        }
        state.stopped_at_ms = Some(now_ms);
        state.error = Some(error);
        self.set_status(&mut state, Status::Failed);
        Ok(())
    }

    /// `pending`/`running` → `cancelled`, optionally recording why
    /// (upstream failure propagation).
    pub fn cancel_terminal(
        &self,
        error: Option<JobError>,
        now_ms: u64,
    ) -> Result<(), JobError> {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return Err(JobError::invalid_state(format!(
                "job {} is already {}",
                self.inner.id, state.status
            )));
        }
        state.stopped_at_ms = Some(now_ms);
        state.error = error;
        state.cancel.cancel();
        self.set_status(&mut state, Status::Cancelled);
        Ok(())
    }

    /// After a failed attempt with budget left: consume one retry and
    /// re-enter `pending`, not dispatchable before `next_attempt_at`.
    /// Returns false when the budget is exhausted.
    pub fn schedule_retry(&self, next_attempt_at_ms: u64) -> bool {
        let mut state = self.inner.state.lock();
        if state.status != Status::Running || state.retry_remain == 0 {
            return false;
        }
        state.retry_remain -= 1;
        state.next_attempt_at_ms = Some(next_attempt_at_ms);
        state.started_at_ms = None;
        self.set_status(&mut state, Status::Pending);
        true
    }

    fn reset_for_rerun(&self) -> Result<(), JobError> {
        let mut state = self.inner.state.lock();
        if !state.status.is_terminal() {
            return Err(JobError::invalid_state(format!(
                "job {} is still {}",
                self.inner.id, state.status
            )));
        }
        state.error = None;
        state.retry_remain = self.inner.retries;
        state.started_at_ms = None;
        state.stopped_at_ms = None;
        state.next_attempt_at_ms = None;
        state.cancel = CancellationToken::new();
        self.inner.future.reset();
        self.set_status(&mut state, Status::Pending);
        Ok(())
    }

    // === Persistence ===

    /// Self-describing serialized record of the job's current state.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.inner.state.lock();
        JobSnapshot {
            id: self.inner.id.clone(),
            name: self.inner.name.clone(),
            locality: self.inner.locality,
            status: state.status,
            resources: self.inner.resources,
            retries: self.inner.retries,
            retry_remain: state.retry_remain,
            attempts: state.attempts,
            result: self.inner.future.get().ok(),
            error: state.error.clone(),
            created_at_ms: self.inner.created_at_ms,
            started_at_ms: state.started_at_ms,
            stopped_at_ms: state.stopped_at_ms,
            args: self.inner.args_summary.clone(),
        }
    }

    /// Rebuild a terminal job from its snapshot. The callable is gone,
    /// so the job answers queries but is not runnable.
    pub fn from_snapshot(snap: JobSnapshot) -> Job {
        let future = JobFuture::new(snap.id.clone());
        if let Some(result) = snap.result {
            future.fulfill(result);
        }
        let (status_tx, _) = watch::channel(snap.status);
        Job {
            inner: Arc::new(JobInner {
                id: snap.id,
                name: snap.name,
                locality: snap.locality,
                work: None,
                args: Args::new(),
                args_summary: snap.args,
                resources: snap.resources,
                retries: snap.retries,
                retry_delay: Duration::ZERO,
                condition: None,
                cache_dir: None,
                callbacks: Callbacks::default(),
                future,
                created_at_ms: snap.created_at_ms,
                status_tx,
                state: Mutex::new(MutState {
                    status: snap.status,
                    retry_remain: snap.retry_remain,
                    attempts: snap.attempts,
                    error: snap.error,
                    started_at_ms: snap.started_at_ms,
                    stopped_at_ms: snap.stopped_at_ms,
                    next_attempt_at_ms: None,
                    cancel: CancellationToken::new(),
                    binding: None,
                }),
            }),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Serialized form of a job, one file per terminal job in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub locality: Locality,
    pub status: Status,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub retry_remain: u32,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at_ms: Option<u64>,
    /// Human-readable argument summary; arguments themselves are not
    /// persisted.
    #[serde(default)]
    pub args: String,
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
