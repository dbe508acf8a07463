//! Per-step ordering of the signal controllers

use std::sync::Arc;

use super::adaptive::AdaptiveSignalController;
use super::engine::SimulationEngine;
use super::override_control::SignalOverrideController;
use super::types::{IntersectionId, SignalStatus};

/// Runs the adaptive pass and then the override reassertion each step
///
/// Reassertion runs last so a manual override wins any same-tick conflict.
pub struct ControlCoordinator {
    engine: Arc<dyn SimulationEngine>,
    overrides: Arc<SignalOverrideController>,
    adaptive: Arc<AdaptiveSignalController>,
}

impl ControlCoordinator {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        overrides: Arc<SignalOverrideController>,
        adaptive: Arc<AdaptiveSignalController>,
    ) -> Self {
        Self {
            engine,
            overrides,
            adaptive,
        }
    }

    pub fn overrides(&self) -> &SignalOverrideController {
        &self.overrides
    }

    pub fn adaptive(&self) -> &AdaptiveSignalController {
        &self.adaptive
    }

    /// Signal control for one simulation step at sim time `now`
    pub fn apply_step(&self, now: f64) {
        self.adaptive.apply(now, &self.overrides);
        self.overrides.reassert();
    }

    /// Structured status of one intersection
    pub fn signal_status(&self, id: &IntersectionId) -> SignalStatus {
        SignalStatus {
            intersection_id: id.clone(),
            indicator: self.engine.signal_state(id).ok(),
            override_mode: self.overrides.mode(id),
            adaptive_enabled: self.adaptive.is_enabled(),
            adaptive_phase: self.adaptive.phase(id),
        }
    }

    pub fn all_signal_status(&self, ids: &[IntersectionId]) -> Vec<SignalStatus> {
        ids.iter().map(|id| self.signal_status(id)).collect()
    }
}
