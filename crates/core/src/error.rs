// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for job operations.

use crate::id::JobId;
use crate::job::Status;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by job and engine operations.
///
/// `User` and `Upstream` are stored on the job itself; the others are
/// returned to the caller of the offending API. Serializable so stored
/// errors survive the terminal-state cache.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobError {
    /// An operation was requested in a state where it is undefined.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The engine refused to emit the job.
    #[error("emit rejected: {0}")]
    Emit(String),

    /// Structural misuse of an API.
    #[error("runtime misuse: {0}")]
    Runtime(String),

    /// Synthetic failure attached to a job cancelled because a job it
    /// depends on failed or was cancelled.
    #[error("upstream job {job} {status}")]
    Upstream { job: JobId, status: Status },

    /// A failure raised by user code; captured on the job, never
    /// propagated to the engine loop.
    #[error("{0}")]
    User(String),
}

impl JobError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn emit(msg: impl Into<String>) -> Self {
        Self::Emit(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn user(msg: impl Into<String>) -> Self {
        Self::User(msg.into())
    }

    /// True for errors stored on the job record itself rather than
    /// returned from an API call.
    pub fn is_captured(&self) -> bool {
        matches!(self, Self::User(_) | Self::Upstream { .. })
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
