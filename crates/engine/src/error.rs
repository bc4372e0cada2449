// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine errors.

use gig_core::JobError;
use gig_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The wrapped job-level error, when there is one.
    pub fn as_job_error(&self) -> Option<&JobError> {
        match self {
            Self::Job(err) => Some(err),
            _ => None,
        }
    }
}
