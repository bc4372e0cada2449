// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cooperative scheduling loop.
//!
//! One task owns all store mutations and job transitions. Worker tasks
//! only run payloads and report [`Completion`]s; job handles only send
//! [`Control`] messages. Each loop iteration runs one scheduler tick.

use crate::dispatch;
use crate::engine::Shared;
use crate::timers::Timers;
use gig_core::{Clock, Control, Job, JobError, JobId, Status, StatusLookup};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Terminal report from a worker.
#[derive(Debug)]
pub(crate) struct Completion {
    pub job: JobId,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Done(Value),
    Failed(String),
    Cancelled,
}

pub(crate) struct Runtime<C: Clock> {
    shared: Arc<Shared>,
    control_rx: UnboundedReceiver<Control>,
    completion_tx: UnboundedSender<Completion>,
    completion_rx: UnboundedReceiver<Completion>,
    timers: Timers,
    clock: C,
}

impl<C: Clock> Runtime<C> {
    pub fn new(shared: Arc<Shared>, control_rx: UnboundedReceiver<Control>, clock: C) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            shared,
            control_rx,
            completion_tx,
            completion_rx,
            timers: Timers::new(),
            clock,
        }
    }

    pub async fn run(mut self) {
        loop {
            self.timers.fired(self.clock.now());
            self.tick();

            let sleep_for = self.sleep_duration();
            tokio::select! {
                maybe = self.control_rx.recv() => match maybe {
                    None | Some(Control::Shutdown) => break,
                    Some(ctrl) => self.handle_control(ctrl),
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
        tracing::debug!("engine loop stopped");
    }

    fn sleep_duration(&self) -> Duration {
        let tick = self.shared.setting.tick_interval();
        match self.timers.next_deadline() {
            Some(deadline) => {
                let now = self.clock.now();
                if deadline <= now {
                    Duration::ZERO
                } else {
                    tick.min(deadline - now)
                }
            }
            None => tick,
        }
    }

    fn handle_control(&mut self, ctrl: Control) {
        match ctrl {
            // Both just force the tick that follows every event
            Control::Emit(_) | Control::Wake => {}
            Control::Rerun(id) => self.handle_rerun(id),
            Control::Cancel(id) => self.handle_cancel(id),
            // Handled in run()
            Control::Shutdown => {}
        }
    }

    /// The job handle already reset itself to `pending`; re-bucket it
    /// (tail entry) and let the tick pick it up.
    fn handle_rerun(&mut self, id: JobId) {
        let job = self.shared.store.lock().get_by_id(&id);
        if let Some(job) = job {
            if job.status() == Status::Pending {
                self.move_job(&job);
            }
        }
    }

    fn handle_cancel(&mut self, id: JobId) {
        let job = self.shared.store.lock().get_by_id(&id);
        let Some(job) = job else { return };
        match job.status() {
            Status::Pending => {
                self.timers.cancel(job.id());
                self.finish_cancel(&job, None);
            }
            Status::Running => {
                // The worker observes the token and reports Cancelled;
                // slots are released when that completion drains.
                job.cancel_token().cancel();
            }
            _ => {}
        }
    }

    /// One scheduler pass over the pending bucket, in insertion order.
    fn tick(&mut self) {
        let now_ms = self.clock.epoch_ms();
        let candidates: Vec<Job> = {
            let store = self.shared.store.lock();
            store.bucket(Status::Pending).values().cloned().collect()
        };
        let mut running = self.shared.store.lock().counts().running;

        for job in candidates {
            if job.status() != Status::Pending {
                continue;
            }

            // Upstream failure/cancellation propagates regardless of
            // the (now unsatisfiable) condition.
            if let Some(upstream) = self.upstream_failure(&job) {
                self.finish_cancel(&job, Some(upstream));
                continue;
            }

            // Retried jobs hold back until their delay elapses
            if let Some(at) = job.next_attempt_at_ms() {
                if now_ms < at {
                    self.timers.set(
                        job.id().clone(),
                        Duration::from_millis(at - now_ms),
                        self.clock.now(),
                    );
                    continue;
                }
            }

            let ready = match job.condition() {
                Some(cond) => {
                    let store = self.shared.store.lock();
                    cond.satisfied(&*store, now_ms)
                }
                None => true,
            };
            if !ready {
                continue;
            }

            if running >= self.shared.setting.max_jobs {
                break;
            }
            if !job.consume_resource() {
                // FIFO fairness: nothing advances past a job blocked
                // on slots.
                break;
            }

            match job.args().resolve() {
                Ok(call) => {
                    if let Err(e) = job.mark_running(now_ms) {
                        job.release_resource();
                        tracing::warn!(job = %job.id(), error = %e, "dispatch raced a transition");
                        continue;
                    }
                    self.move_job(&job);
                    running += 1;
                    tracing::debug!(job = %job.id(), name = job.name(), "dispatched");
                    dispatch::spawn_worker(&job, call, self.completion_tx.clone());
                }
                Err(e) => {
                    // Unresolved future at dispatch time is a
                    // programming error; the dependent is cancelled.
                    job.release_resource();
                    self.finish_cancel(&job, Some(e));
                }
            }
        }
    }

    /// Check the owners of every future the job's args reference.
    fn upstream_failure(&self, job: &Job) -> Option<JobError> {
        for fut in job.args().futures() {
            let status = self.shared.store.lock().status_of(fut.job_id());
            match status {
                Some(status @ (Status::Failed | Status::Cancelled)) => {
                    return Some(JobError::Upstream {
                        job: fut.job_id().clone(),
                        status,
                    });
                }
                Some(_) => {}
                None if fut.resolved() => {
                    // Owner pruned after completing; the value is safe
                }
                None => {
                    return Some(JobError::invalid_state(format!(
                        "job {} depends on the future of unknown job {}",
                        job.id(),
                        fut.job_id()
                    )));
                }
            }
        }
        None
    }

    fn handle_completion(&mut self, completion: Completion) {
        let job = self.shared.store.lock().get_by_id(&completion.job);
        let Some(job) = job else { return };
        if job.status() != Status::Running {
            return;
        }
        job.release_resource();
        let now_ms = self.clock.epoch_ms();

        match completion.outcome {
            Outcome::Done(value) => {
                if job.complete(value, now_ms).is_ok() {
                    self.move_job(&job);
                    if let Some(cb) = &job.callbacks().on_done {
                        if let Ok(value) = job.result() {
                            cb(&value);
                        }
                    }
                }
            }
            Outcome::Failed(msg) => {
                if self.shared.setting.print_traceback {
                    tracing::error!(job = %job.id(), name = job.name(), error = %msg, "job failed");
                }
                let delay = job.retry_delay();
                let next_at = now_ms + delay.as_millis() as u64;
                if job.schedule_retry(next_at) {
                    self.move_job(&job);
                    self.timers.set(job.id().clone(), delay, self.clock.now());
                    tracing::debug!(
                        job = %job.id(),
                        remain = job.retry_remain(),
                        "retry scheduled"
                    );
                } else {
                    let err = JobError::user(msg);
                    if job.fail(err.clone(), now_ms).is_ok() {
                        self.move_job(&job);
                        if let Some(cb) = &job.callbacks().on_error {
                            cb(&err);
                        }
                    }
                }
            }
            Outcome::Cancelled => {
                self.finish_cancel(&job, None);
            }
        }
        self.shared.idle.notify_waiters();
    }

    /// Move a cancellable job to `cancelled`, run its hook, and wake
    /// waiters. Already-terminal jobs are left untouched.
    fn finish_cancel(&mut self, job: &Job, error: Option<JobError>) {
        let now_ms = self.clock.epoch_ms();
        if job.cancel_terminal(error, now_ms).is_ok() {
            self.move_job(job);
            if let Some(cb) = &job.callbacks().on_cancel {
                cb();
            }
            self.shared.idle.notify_waiters();
        }
    }

    /// Re-bucket after a transition. Persistence failures are logged,
    /// never raised into the loop.
    fn move_job(&self, job: &Job) {
        if let Err(e) = self.shared.store.lock().move_job(job) {
            tracing::warn!(job = %job.id(), error = %e, "store move failed");
        }
    }
}
