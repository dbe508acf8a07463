//! Operator-forced signal states
//!
//! The engine keeps running its own program every tick, so a forced color
//! only holds if it is written again on every step. See [`SignalOverrideController::reassert`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use log::{info, warn};

use super::engine::{capture_program, force_uniform, restore_program, SimulationEngine};
use super::types::{IntersectionId, OverrideMode, ProgramId, SignalColor};

#[derive(Debug, Clone)]
struct OverrideEntry {
    mode: OverrideMode,
    /// Program active before the first override, restored on reset
    original_program: ProgramId,
}

/// Counts reported by a bulk reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub restored: usize,
    pub failed: usize,
}

/// Tracks and reasserts forced signal states per intersection
pub struct SignalOverrideController {
    engine: Arc<dyn SimulationEngine>,
    entries: Mutex<HashMap<IntersectionId, OverrideEntry>>,
}

impl SignalOverrideController {
    pub fn new(engine: Arc<dyn SimulationEngine>) -> Self {
        Self {
            engine,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn force_red(&self, id: &IntersectionId) -> Result<()> {
        self.force(id, SignalColor::Red)
    }

    pub fn force_green(&self, id: &IntersectionId) -> Result<()> {
        self.force(id, SignalColor::Green)
    }

    /// Force every indicator to `color` and keep it there
    ///
    /// The original program is captured on the first override only. If the
    /// immediate write fails the intersection keeps its previous state.
    fn force(&self, id: &IntersectionId, color: SignalColor) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let original_program = match entries.get(id) {
            Some(entry) => entry.original_program.clone(),
            None => capture_program(self.engine.as_ref(), id),
        };

        if let Err(err) = force_uniform(self.engine.as_ref(), id, color) {
            warn!("Override of {} failed: {:#}", id, err);
            return Err(err);
        }

        entries.insert(
            id.clone(),
            OverrideEntry {
                mode: OverrideMode::from(color),
                original_program,
            },
        );
        info!("Signal {} forced {:?} (persistent)", id, color);
        Ok(())
    }

    pub fn mode(&self, id: &IntersectionId) -> OverrideMode {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.mode)
            .unwrap_or_default()
    }

    pub fn is_overridden(&self, id: &IntersectionId) -> bool {
        self.mode(id).is_active()
    }

    /// Program captured before the first override, if one is active
    pub fn saved_program(&self, id: &IntersectionId) -> Option<ProgramId> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.original_program.clone())
    }

    pub fn overridden_ids(&self) -> Vec<IntersectionId> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<IntersectionId> = entries
            .iter()
            .filter(|(_, entry)| entry.mode.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Write the forced color again for every overridden intersection
    pub fn reassert(&self) {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (id, entry) in entries.iter() {
            let Some(color) = entry.mode.color() else {
                continue;
            };
            if let Err(err) = force_uniform(self.engine.as_ref(), id, color) {
                warn!("Reasserting override on {} failed: {:#}", id, err);
            }
        }
    }

    /// Restore the saved program and clear the override
    ///
    /// Resetting an intersection that is not overridden is a no-op. On
    /// failure the override and its saved program are kept.
    pub fn reset(&self, id: &IntersectionId) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(id) else {
            return Ok(());
        };

        if let Err(err) = restore_program(self.engine.as_ref(), id, &entry.original_program) {
            warn!("Reset failed for signal {}: {:#}", id, err);
            return Err(err);
        }

        entries.remove(id);
        info!("Signal {} back to its normal program", id);
        Ok(())
    }

    /// Reset every overridden intersection, counting successes and failures
    pub fn reset_all(&self) -> ResetSummary {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut summary = ResetSummary::default();

        entries.retain(|id, entry| {
            match restore_program(self.engine.as_ref(), id, &entry.original_program) {
                Ok(()) => {
                    summary.restored += 1;
                    false
                }
                Err(err) => {
                    warn!("Reset failed for signal {}: {:#}", id, err);
                    summary.failed += 1;
                    true
                }
            }
        });

        info!(
            "Signal reset: restored={}, failed={}",
            summary.restored, summary.failed
        );
        summary
    }
}
