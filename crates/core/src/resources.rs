// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slot-counted resource accounting.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Slots a job holds for the duration of its `running` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// CPU slots consumed at dispatch.
    pub cpu: u32,
    /// Memory slots; only enforced when the engine has a memory budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
}

impl Resources {
    pub const NONE: Resources = Resources { cpu: 0, memory: None };

    pub fn cpu(slots: u32) -> Self {
        Self { cpu: slots, memory: None }
    }

    pub fn with_memory(mut self, slots: u32) -> Self {
        self.memory = Some(slots);
        self
    }

    pub fn is_none(&self) -> bool {
        self.cpu == 0 && self.memory.is_none()
    }
}

/// Engine-wide slot counters.
///
/// Consumption is atomic check-and-take: either every requested slot is
/// reserved or none are. Exhaustion is back-pressure, not an error.
pub struct ResourcePool {
    state: Mutex<PoolState>,
}

struct PoolState {
    cpu_total: u32,
    cpu_used: u32,
    memory_total: Option<u32>,
    memory_used: u32,
}

impl ResourcePool {
    pub fn new(cpu_slots: u32, memory_slots: Option<u32>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                cpu_total: cpu_slots,
                cpu_used: 0,
                memory_total: memory_slots,
                memory_used: 0,
            }),
        }
    }

    /// Whether `wanted` could be consumed right now.
    pub fn available(&self, wanted: Resources) -> bool {
        self.state.lock().fits(wanted)
    }

    /// Reserve the slots; false (and no partial take) when any slot is
    /// unavailable.
    pub fn consume(&self, wanted: Resources) -> bool {
        let mut state = self.state.lock();
        if !state.fits(wanted) {
            return false;
        }
        state.cpu_used += wanted.cpu;
        if state.memory_total.is_some() {
            state.memory_used += wanted.memory.unwrap_or(0);
        }
        true
    }

    /// Return previously consumed slots. Underflow is clamped and
    /// reported, since it means release without a matching consume.
    pub fn release(&self, held: Resources) -> bool {
        let mut state = self.state.lock();
        let clean = state.cpu_used >= held.cpu
            && state.memory_used >= held.memory.unwrap_or(0);
        if !clean {
            tracing::warn!(
                cpu_used = state.cpu_used,
                cpu_release = held.cpu,
                "resource release without matching consume"
            );
        }
        state.cpu_used = state.cpu_used.saturating_sub(held.cpu);
        if state.memory_total.is_some() {
            state.memory_used = state.memory_used.saturating_sub(held.memory.unwrap_or(0));
        }
        clean
    }

    pub fn cpu_in_use(&self) -> u32 {
        self.state.lock().cpu_used
    }

    pub fn cpu_slots(&self) -> u32 {
        self.state.lock().cpu_total
    }

    pub fn memory_in_use(&self) -> u32 {
        self.state.lock().memory_used
    }
}

impl PoolState {
    fn fits(&self, wanted: Resources) -> bool {
        if self.cpu_used + wanted.cpu > self.cpu_total {
            return false;
        }
        if let (Some(total), Some(want)) = (self.memory_total, wanted.memory) {
            if self.memory_used + want > total {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
