// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot handle to a job's eventual result.

use crate::error::JobError;
use crate::id::JobId;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A placeholder for a not-yet-computed value.
///
/// Created when a job is built and resolved exactly once, when the job
/// reaches `done`. Futures are first-class job arguments: embedding a
/// future in another job's args makes the owning job an implicit
/// dependency.
#[derive(Clone)]
pub struct JobFuture {
    job: JobId,
    cell: Arc<RwLock<Option<Value>>>,
}

impl JobFuture {
    pub(crate) fn new(job: JobId) -> Self {
        Self {
            job,
            cell: Arc::new(RwLock::new(None)),
        }
    }

    /// Id of the job that will produce the value.
    pub fn job_id(&self) -> &JobId {
        &self.job
    }

    /// True iff the owning job has completed and stored its result.
    pub fn resolved(&self) -> bool {
        self.cell.read().is_some()
    }

    /// The resolved value, or `InvalidState` while the owning job is
    /// not `done`.
    pub fn get(&self) -> Result<Value, JobError> {
        self.cell.read().clone().ok_or_else(|| {
            JobError::invalid_state(format!("job {} has no result yet", self.job))
        })
    }

    /// Store the result. First write wins; later writes are ignored so
    /// a racing duplicate completion cannot change an observed value.
    pub(crate) fn fulfill(&self, value: Value) {
        let mut cell = self.cell.write();
        if cell.is_none() {
            *cell = Some(value);
        }
    }

    /// Clear the cell so a rerun can resolve it again.
    pub(crate) fn reset(&self) {
        *self.cell.write() = None;
    }
}

/// Identity equality: two futures are the same iff they belong to the
/// same job.
impl PartialEq for JobFuture {
    fn eq(&self, other: &Self) -> bool {
        self.job == other.job
    }
}

impl Eq for JobFuture {}

impl fmt::Debug for JobFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFuture")
            .field("job", &self.job)
            .field("resolved", &self.resolved())
            .finish()
    }
}

#[cfg(test)]
#[path = "future_tests.rs"]
mod tests;
