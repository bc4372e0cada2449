// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job wake timers (retry delays).

use gig_core::JobId;
use std::time::{Duration, Instant};

struct TimerEntry {
    job: JobId,
    deadline: Instant,
}

/// Deadline set driving the loop's sleep: one pending timer per job,
/// setting again replaces the previous deadline.
pub(crate) struct Timers {
    entries: Vec<TimerEntry>,
}

impl Timers {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn set(&mut self, job: JobId, delay: Duration, now: Instant) {
        let deadline = now + delay;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.job == job) {
            entry.deadline = deadline;
        } else {
            self.entries.push(TimerEntry { job, deadline });
        }
    }

    pub fn cancel(&mut self, job: &JobId) {
        self.entries.retain(|e| &e.job != job);
    }

    pub fn has_timers(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Remove and return the jobs whose deadline has passed.
    pub fn fired(&mut self, now: Instant) -> Vec<JobId> {
        let mut due = Vec::new();
        self.entries.retain(|e| {
            if e.deadline <= now {
                due.push(e.job.clone());
                false
            } else {
                true
            }
        });
        due
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
