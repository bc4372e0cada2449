// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for one engine instance. Loadable from TOML; every field
/// has a default so partial files work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSetting {
    /// Soft cap on concurrently running jobs.
    pub max_jobs: usize,
    /// Total CPU slot budget.
    pub cpu_slots: u32,
    /// Total memory slot budget; unset means memory is not enforced.
    pub memory_slots: Option<u32>,
    /// Root directory for the terminal-bucket mirror; unset disables
    /// persistence.
    pub cache_path: Option<PathBuf>,
    /// Write failure tracebacks to the error stream.
    pub print_traceback: bool,
    /// Scheduler wake interval when idle.
    pub tick_interval_ms: u64,
}

impl Default for EngineSetting {
    fn default() -> Self {
        Self {
            max_jobs: 20,
            cpu_slots: default_cpu_slots(),
            memory_slots: None,
            cache_path: None,
            print_traceback: true,
            tick_interval_ms: 20,
        }
    }
}

fn default_cpu_slots() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
}

impl EngineSetting {
    gig_core::setters! {
        set {
            max_jobs: usize,
            cpu_slots: u32,
            print_traceback: bool,
            tick_interval_ms: u64,
        }
        option {
            memory_slots: u32,
            cache_path: PathBuf,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::config(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
#[path = "setting_tests.rs"]
mod tests;
