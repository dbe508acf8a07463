//! Demand-driven stop/go cycling per intersection
//!
//! Every managed intersection runs its own finite state machine:
//!
//! - `Auto`: the engine's program runs. Positive demand forces all indicators
//!   red and enters `HoldRed` for the stop duration.
//! - `HoldRed`: at the deadline, all green for the go duration.
//! - `HoldGreen`: at the deadline, back to `HoldRed`.
//!
//! Zero demand in either hold phase restores the original program at once.
//! Intersections under an operator override are skipped entirely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info, warn};

use super::config::SignalTiming;
use super::engine::{capture_program, force_uniform, restore_program, SimulationEngine};
use super::override_control::{ResetSummary, SignalOverrideController};
use super::types::{AdaptivePhase, IntersectionId, ProgramId, SignalColor};

#[derive(Debug, Clone, Default)]
struct AdaptiveEntry {
    phase: AdaptivePhase,
    /// Captured on first positive demand; marks the intersection as touched
    original_program: Option<ProgramId>,
}

pub struct AdaptiveSignalController {
    engine: Arc<dyn SimulationEngine>,
    timing: SignalTiming,
    enabled: AtomicBool,
    managed: RwLock<Vec<IntersectionId>>,
    entries: Mutex<HashMap<IntersectionId, AdaptiveEntry>>,
}

impl AdaptiveSignalController {
    pub fn new(engine: Arc<dyn SimulationEngine>, timing: SignalTiming) -> Self {
        Self {
            engine,
            timing,
            enabled: AtomicBool::new(false),
            managed: RwLock::new(Vec::new()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the set of intersections the controller looks at
    pub fn set_intersections(&self, ids: Vec<IntersectionId>) {
        *self.managed.write().unwrap_or_else(PoisonError::into_inner) = ids;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Toggle adaptive mode
    ///
    /// Disabling hands every touched intersection back to its original
    /// program and forgets all adaptive state. Intersections under an
    /// override keep their forced state; their own reset restores them.
    pub fn set_enabled(&self, enabled: bool, overrides: &SignalOverrideController) -> ResetSummary {
        self.enabled.store(enabled, Ordering::Release);
        info!("Adaptive signal control {}", if enabled { "ON" } else { "OFF" });
        if enabled {
            ResetSummary::default()
        } else {
            self.restore_all(overrides)
        }
    }

    pub fn phase(&self, id: &IntersectionId) -> AdaptivePhase {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.phase)
            .unwrap_or_default()
    }

    /// Ids whose original program has been captured
    pub fn touched_ids(&self) -> Vec<IntersectionId> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<IntersectionId> = entries
            .iter()
            .filter(|(_, entry)| entry.original_program.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// One adaptive pass at sim time `now`
    pub fn apply(&self, now: f64, overrides: &SignalOverrideController) {
        if !self.is_enabled() {
            return;
        }

        let managed = self
            .managed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        for id in managed {
            if overrides.is_overridden(&id) {
                continue;
            }
            let demand = self.engine.approach_demand(&id);
            let entry = entries.entry(id.clone()).or_default();
            self.advance(&id, entry, demand, now);
        }
    }

    fn advance(&self, id: &IntersectionId, entry: &mut AdaptiveEntry, demand: u32, now: f64) {
        let engine = self.engine.as_ref();

        if demand == 0 {
            if entry.phase.is_auto() {
                return;
            }
            let program = entry
                .original_program
                .clone()
                .unwrap_or_else(ProgramId::fallback);
            match restore_program(engine, id, &program) {
                Ok(()) => {
                    debug!("Signal {} demand cleared, back to program {}", id, program);
                    entry.phase = AdaptivePhase::Auto;
                }
                Err(err) => warn!("Adaptive restore of {} failed: {:#}", id, err),
            }
            return;
        }

        if entry.original_program.is_none() {
            entry.original_program = Some(capture_program(engine, id));
        }

        let next = match entry.phase {
            AdaptivePhase::Auto => Some((
                SignalColor::Red,
                AdaptivePhase::HoldRed {
                    until: now + self.timing.stop_secs,
                },
            )),
            AdaptivePhase::HoldRed { until } if now >= until => Some((
                SignalColor::Green,
                AdaptivePhase::HoldGreen {
                    until: now + self.timing.go_secs,
                },
            )),
            AdaptivePhase::HoldGreen { until } if now >= until => Some((
                SignalColor::Red,
                AdaptivePhase::HoldRed {
                    until: now + self.timing.stop_secs,
                },
            )),
            _ => None,
        };

        let Some((color, phase)) = next else {
            return;
        };
        match force_uniform(engine, id, color) {
            Ok(()) => {
                debug!("Signal {} demand={} -> {:?}", id, demand, phase);
                entry.phase = phase;
            }
            Err(err) => warn!("Adaptive transition of {} failed: {:#}", id, err),
        }
    }

    fn restore_all(&self, overrides: &SignalOverrideController) -> ResetSummary {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut summary = ResetSummary::default();

        for (id, entry) in entries.iter() {
            let Some(program) = &entry.original_program else {
                continue;
            };
            if overrides.is_overridden(id) {
                debug!("Signal {} is overridden, leaving it forced", id);
                continue;
            }
            match restore_program(self.engine.as_ref(), id, program) {
                Ok(()) => summary.restored += 1,
                Err(err) => {
                    warn!("Adaptive restore of {} failed: {:#}", id, err);
                    summary.failed += 1;
                }
            }
        }

        entries.clear();
        summary
    }
}
