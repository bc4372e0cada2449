// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Readiness predicates over the job store.

use crate::id::JobId;
use crate::job::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{BitAnd, BitOr};

/// Read-only view of job statuses, as seen by condition evaluation.
pub trait StatusLookup {
    fn status_of(&self, id: &JobId) -> Option<Status>;
}

impl StatusLookup for HashMap<JobId, Status> {
    fn status_of(&self, id: &JobId) -> Option<Status> {
        self.get(id).copied()
    }
}

/// A boolean predicate governing when a pending job may dispatch.
///
/// Conditions are monotonic under job completion: once satisfied for a
/// store snapshot, they stay satisfied for every extension that only
/// adds terminal jobs. A referenced job missing from the snapshot
/// evaluates to not-satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Job reached any terminal state.
    AfterAnother { job: JobId },
    /// Job reached `done`.
    AfterSuccess { job: JobId },
    /// Job reached `failed`.
    AfterFailure { job: JobId },
    /// Wall clock passed the given epoch milliseconds.
    AfterTime { epoch_ms: u64 },
    AllSatisfied(Vec<Condition>),
    AnySatisfied(Vec<Condition>),
}

impl Condition {
    pub fn after(job: impl Into<JobId>) -> Self {
        Self::AfterAnother { job: job.into() }
    }

    pub fn after_success(job: impl Into<JobId>) -> Self {
        Self::AfterSuccess { job: job.into() }
    }

    pub fn after_failure(job: impl Into<JobId>) -> Self {
        Self::AfterFailure { job: job.into() }
    }

    pub fn after_time(epoch_ms: u64) -> Self {
        Self::AfterTime { epoch_ms }
    }

    /// Evaluate against a store snapshot and the current wall clock.
    pub fn satisfied(&self, store: &dyn StatusLookup, now_ms: u64) -> bool {
        match self {
            Condition::AfterAnother { job } => store
                .status_of(job)
                .is_some_and(|s| s.is_terminal()),
            Condition::AfterSuccess { job } => {
                store.status_of(job) == Some(Status::Done)
            }
            Condition::AfterFailure { job } => {
                store.status_of(job) == Some(Status::Failed)
            }
            Condition::AfterTime { epoch_ms } => now_ms >= *epoch_ms,
            Condition::AllSatisfied(inner) => {
                inner.iter().all(|c| c.satisfied(store, now_ms))
            }
            Condition::AnySatisfied(inner) => {
                inner.iter().any(|c| c.satisfied(store, now_ms))
            }
        }
    }

    /// Every job id the condition mentions, in evaluation order.
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut out = Vec::new();
        self.collect_job_ids(&mut out);
        out
    }

    fn collect_job_ids(&self, out: &mut Vec<JobId>) {
        match self {
            Condition::AfterAnother { job }
            | Condition::AfterSuccess { job }
            | Condition::AfterFailure { job } => {
                if !out.contains(job) {
                    out.push(job.clone());
                }
            }
            Condition::AfterTime { .. } => {}
            Condition::AllSatisfied(inner) | Condition::AnySatisfied(inner) => {
                for c in inner {
                    c.collect_job_ids(out);
                }
            }
        }
    }

    /// Conjoin, flattening nested `AllSatisfied` lists.
    pub fn and(self, other: Condition) -> Condition {
        let mut parts = match self {
            Condition::AllSatisfied(inner) => inner,
            c => vec![c],
        };
        match other {
            Condition::AllSatisfied(inner) => parts.extend(inner),
            c => parts.push(c),
        }
        Condition::AllSatisfied(parts)
    }

    /// Disjoin, flattening nested `AnySatisfied` lists.
    pub fn or(self, other: Condition) -> Condition {
        let mut parts = match self {
            Condition::AnySatisfied(inner) => inner,
            c => vec![c],
        };
        match other {
            Condition::AnySatisfied(inner) => parts.extend(inner),
            c => parts.push(c),
        }
        Condition::AnySatisfied(parts)
    }
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        self.and(rhs)
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        self.or(rhs)
    }
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
