//! Traffic control core
//!
//! Route variant synthesis and signal control for a live micro-simulation.
//! The engine itself is external and reached through [`SimulationEngine`];
//! [`SandboxEngine`] is a small in-memory stand-in for demos and tests.

mod adaptive;
mod catalog;
mod config;
mod console;
mod coordinator;
mod engine;
mod installer;
mod metrics;
mod override_control;
mod rng;
mod runner;
mod sandbox;
mod spawner;
mod store;
mod synthesizer;
mod types;
mod via_pool;

pub use adaptive::AdaptiveSignalController;
pub use catalog::{IntersectionCatalog, Scenario, ScenarioCatalog};
pub use config::{
    ConsoleConfig, SignalTiming, SynthesisConfig, BRANCH_WEIGHTS, DEFAULT_EDGE_LENGTH,
    DEFAULT_STEP_DELAY_MS, EDGE_COUNT_BONUS, FALLBACK_STOP, GO_DURATION, IDLE_POLL_MS,
    LONG_MIN_EDGES, MAX_VARIANTS, PREFIX_EDGES_FOR_SPLIT, SEARCH_KEEP, STOP_DURATION,
    SYNTHESIS_TRY_BUDGET, THROUGHPUT_WINDOW_SECS,
};
pub use console::TrafficConsole;
pub use coordinator::ControlCoordinator;
pub use engine::{EngineError, EngineResult, SimulationEngine};
pub use installer::{InstallOutcome, RouteInstaller};
pub use metrics::{MetricsTracker, StepMetrics, STOPPED_SPEED_THRESHOLD};
pub use override_control::{ResetSummary, SignalOverrideController};
pub use rng::{component_rng, SALT_SPAWN, SALT_SYNTHESIS, SALT_VIA_POOL};
pub use runner::{LoopControls, SimulationLoop, StepSnapshot};
pub use sandbox::{grid_edge, LaneMetrics, SandboxEngine, CRUISE_SPEED, DEFAULT_PHASE_SECS};
pub use spawner::{
    pick_variant_index, NotReadyReason, SpawnError, SpawnReport, SpawnedVehicle, VehicleSpawner,
};
pub use store::SessionStore;
pub use synthesizer::{variant_id, variant_label, SplitPlan, VariantSynthesizer};
pub use types::{
    AdaptivePhase, EdgeId, IntersectionEntry, IntersectionId, LaneId, OverrideMode, ProgramId,
    RouteId, RouteVariant, ScenarioKey, SignalColor, SignalStatus, TripDefinition, TripId,
    UnknownVehicleClass, VehicleClass, VehicleId, VehicleSpawnRequest, DEFAULT_PROGRAM,
};
pub use via_pool::ViaPool;
