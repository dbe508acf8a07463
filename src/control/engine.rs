//! Interface to the external traffic simulation engine
//!
//! The console consumes exactly one query interface. Metrics the engine may
//! legitimately not provide are `Option`s rather than alternate code paths.

use anyhow::{Context, Result};
use log::warn;
use thiserror::Error;

use super::types::{
    EdgeId, IntersectionId, LaneId, ProgramId, RouteId, SignalColor, VehicleClass, VehicleId,
};

/// Errors reported by engine calls
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown intersection {0}")]
    UnknownIntersection(IntersectionId),

    #[error("unknown edge {0}")]
    UnknownEdge(EdgeId),

    #[error("unknown route {0}")]
    UnknownRoute(RouteId),

    #[error("unknown program {program} for intersection {intersection}")]
    UnknownProgram {
        intersection: IntersectionId,
        program: ProgramId,
    },

    #[error("route {0} already exists")]
    DuplicateRoute(RouteId),

    #[error("vehicle {0} already exists")]
    DuplicateVehicle(VehicleId),

    #[error("engine rejected request: {0}")]
    Rejected(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Query and command surface of the simulation engine
///
/// Methods take `&self`: the engine is a shared client used by the loop
/// thread and the operator thread alike.
pub trait SimulationEngine: Send + Sync {
    // Routing and network attributes

    /// Shortest path from `from` to `to` inclusive of both edges
    fn shortest_path(&self, from: &EdgeId, to: &EdgeId, class: VehicleClass) -> Option<Vec<EdgeId>>;

    fn edge_admits(&self, edge: &EdgeId, class: VehicleClass) -> bool;

    /// Length in meters, if the engine knows it
    fn edge_length(&self, edge: &EdgeId) -> Option<f64>;

    /// Every edge of the loaded network
    fn network_edges(&self) -> Vec<EdgeId>;

    // Signals

    fn signal_ids(&self) -> EngineResult<Vec<IntersectionId>>;

    fn signal_state(&self, id: &IntersectionId) -> EngineResult<String>;

    fn set_signal_state(&self, id: &IntersectionId, state: &str) -> EngineResult<()>;

    fn signal_program(&self, id: &IntersectionId) -> EngineResult<ProgramId>;

    fn set_signal_program(&self, id: &IntersectionId, program: &ProgramId) -> EngineResult<()>;

    fn controlled_lanes(&self, id: &IntersectionId) -> Option<Vec<LaneId>>;

    fn lane_halting_count(&self, lane: &LaneId) -> Option<u32>;

    fn lane_vehicle_count(&self, lane: &LaneId) -> Option<u32>;

    /// Halted vehicles on the approach lanes of an intersection
    ///
    /// Lanes without a halting count contribute their raw vehicle count;
    /// an intersection with no lane data at all has zero demand.
    fn approach_demand(&self, id: &IntersectionId) -> u32 {
        let Some(lanes) = self.controlled_lanes(id) else {
            return 0;
        };
        lanes
            .iter()
            .filter_map(|lane| {
                self.lane_halting_count(lane)
                    .or_else(|| self.lane_vehicle_count(lane))
            })
            .sum()
    }

    // Vehicles and routes

    fn register_route(&self, id: &RouteId, edges: &[EdgeId]) -> EngineResult<()>;

    fn create_vehicle(
        &self,
        id: &VehicleId,
        route: &RouteId,
        class: VehicleClass,
        depart: f64,
    ) -> EngineResult<()>;

    // Stepping

    fn step(&self) -> EngineResult<()>;

    /// Current simulation time in seconds
    fn current_time(&self) -> f64;

    // Metric inputs

    fn vehicle_ids(&self) -> Vec<VehicleId>;

    fn vehicle_speed(&self, id: &VehicleId) -> Option<f64>;

    fn vehicle_waiting_time(&self, id: &VehicleId) -> Option<f64>;

    /// Vehicles that left the network during the last step
    fn arrived_vehicles(&self) -> Option<Vec<VehicleId>>;
}

/// Read the active program, falling back to the default program on failure
pub(crate) fn capture_program(engine: &dyn SimulationEngine, id: &IntersectionId) -> ProgramId {
    match engine.signal_program(id) {
        Ok(program) if !program.as_str().trim().is_empty() => program,
        Ok(_) => ProgramId::fallback(),
        Err(err) => {
            warn!("Could not read program of {}, assuming default: {}", id, err);
            ProgramId::fallback()
        }
    }
}

/// Force every indicator of an intersection to one color
pub(crate) fn force_uniform(
    engine: &dyn SimulationEngine,
    id: &IntersectionId,
    color: SignalColor,
) -> Result<()> {
    let current = engine
        .signal_state(id)
        .with_context(|| format!("Failed to read signal state of {}", id))?;
    let forced = color.uniform_state(&current);
    engine
        .set_signal_state(id, &forced)
        .with_context(|| format!("Failed to force {} to {:?}", id, color))?;
    Ok(())
}

/// Hand an intersection back to a saved program
pub(crate) fn restore_program(
    engine: &dyn SimulationEngine,
    id: &IntersectionId,
    program: &ProgramId,
) -> Result<()> {
    engine
        .set_signal_program(id, program)
        .with_context(|| format!("Failed to restore program {} on {}", program, id))
}
