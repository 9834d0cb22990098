// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Resource lifecycle state machine with typed state transitions.
//!
//! Idle → CpuSet → Mounted → Running → Unmounting → Idle, plus a forced
//! Cleanup reachable from every phase. Invalid transitions result in
//! StateTransitionError.

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;
use crate::lifecycle::HookStack;

/// Phases of one task's resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Nothing mounted for the harness.
    Idle,

    /// CPU set restricted and caches dropped for the next task.
    CpuSet,

    /// Filesystem under test mounted at the scratch root.
    Mounted,

    /// Workload running.
    Running,

    /// Scratch root being released.
    Unmounting,

    /// Forced teardown in progress.
    Cleanup,
}

impl LifecyclePhase {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::CpuSet => "CpuSet",
            Self::Mounted => "Mounted",
            Self::Running => "Running",
            Self::Unmounting => "Unmounting",
            Self::Cleanup => "Cleanup",
        }
    }

    pub fn can_transition_to(&self, target: LifecyclePhase) -> bool {
        matches!(
            (self, target),
            (_, Self::Cleanup) |
            (Self::Idle, Self::CpuSet) |
            // A failed mount leaves the CPU set in place for the next task
            (Self::CpuSet, Self::CpuSet) |
            (Self::CpuSet, Self::Mounted) |
            (Self::Mounted, Self::Running) |
            (Self::Running, Self::Unmounting) |
            (Self::Unmounting, Self::Idle) |
            (Self::Cleanup, Self::Idle)
        )
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything the lifecycle manager mutates between tasks: current phase,
/// memoized CPU count and pending cleanup hooks.
#[derive(Debug)]
pub struct LifecycleState {
    phase: LifecyclePhase,
    active_cores: Option<usize>,
    pub hooks: HookStack,
    transition_count: u64,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::Idle,
            active_cores: None,
            hooks: HookStack::new(),
            transition_count: 0,
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Core count currently configured; 0 means all CPUs.
    pub fn active_cores(&self) -> Option<usize> {
        self.active_cores
    }

    pub fn set_active_cores(&mut self, cores: usize) {
        self.active_cores = Some(cores);
    }

    pub fn transition_to(&mut self, target: LifecyclePhase) -> Result<(), StateTransitionError> {
        if !self.phase.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.phase.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = self.phase.name(),
            to = target.name(),
            "Lifecycle transition"
        );

        self.phase = target;
        self.transition_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = LifecycleState::new();
        assert_eq!(state.phase(), LifecyclePhase::Idle);
        assert_eq!(state.active_cores(), None);
        assert_eq!(state.transition_count(), 0);
    }

    #[test]
    fn test_full_cycle() {
        let mut state = LifecycleState::new();
        for phase in [
            LifecyclePhase::CpuSet,
            LifecyclePhase::Mounted,
            LifecyclePhase::Running,
            LifecyclePhase::Unmounting,
            LifecyclePhase::Idle,
        ] {
            state.transition_to(phase).unwrap();
        }
        assert_eq!(state.transition_count(), 5);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut state = LifecycleState::new();
        assert!(state.transition_to(LifecyclePhase::Running).is_err());
        assert!(state.transition_to(LifecyclePhase::Mounted).is_err());

        state.transition_to(LifecyclePhase::CpuSet).unwrap();
        assert!(state.transition_to(LifecyclePhase::Idle).is_err());
        assert_eq!(state.phase(), LifecyclePhase::CpuSet);
    }

    #[test]
    fn test_cleanup_reachable_from_every_phase() {
        for phase in [
            LifecyclePhase::Idle,
            LifecyclePhase::CpuSet,
            LifecyclePhase::Mounted,
            LifecyclePhase::Running,
            LifecyclePhase::Unmounting,
            LifecyclePhase::Cleanup,
        ] {
            assert!(phase.can_transition_to(LifecyclePhase::Cleanup));
        }
        assert!(LifecyclePhase::Cleanup.can_transition_to(LifecyclePhase::Idle));
    }
}
