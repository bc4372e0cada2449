// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control messages from job handles to the engine loop.

use crate::id::JobId;

/// A nudge sent to the engine's cooperative loop. Bound jobs hold the
/// sending half so `emit`/`rerun`/`cancel` can reach the loop without
/// touching engine internals.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// Consider the job for dispatch now.
    Emit(JobId),
    /// Reset a terminal job back into `pending`.
    Rerun(JobId),
    /// Cancel a non-terminal job.
    Cancel(JobId),
    /// Re-run the scheduler tick.
    Wake,
    /// Stop the loop. Sent by engine teardown only.
    Shutdown,
}

pub type ControlSender = tokio::sync::mpsc::UnboundedSender<Control>;
