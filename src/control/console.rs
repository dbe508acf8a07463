//! Operator facade over one control session
//!
//! Owns the engine handle and every component, and exposes the operator
//! actions. All methods take `&self` and may be called from any thread
//! while the loop thread runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Sender;
use log::{info, warn};

use super::adaptive::AdaptiveSignalController;
use super::catalog::{IntersectionCatalog, Scenario, ScenarioCatalog};
use super::config::ConsoleConfig;
use super::coordinator::ControlCoordinator;
use super::engine::SimulationEngine;
use super::metrics::MetricsTracker;
use super::override_control::{ResetSummary, SignalOverrideController};
use super::rng::{component_rng, SALT_SPAWN, SALT_SYNTHESIS, SALT_VIA_POOL};
use super::runner::{LoopControls, SimulationLoop, StepSnapshot};
use super::spawner::{SpawnError, SpawnReport, VehicleSpawner};
use super::store::SessionStore;
use super::synthesizer::VariantSynthesizer;
use super::types::{
    IntersectionEntry, IntersectionId, RouteVariant, SignalStatus, TripDefinition, TripId,
    VehicleClass, VehicleSpawnRequest,
};
use super::via_pool::ViaPool;

pub struct TrafficConsole {
    engine: Arc<dyn SimulationEngine>,
    config: ConsoleConfig,
    trips: Vec<TripDefinition>,
    store: Arc<SessionStore>,
    synthesizer: Arc<VariantSynthesizer>,
    spawner: VehicleSpawner,
    overrides: Arc<SignalOverrideController>,
    adaptive: Arc<AdaptiveSignalController>,
    coordinator: Arc<ControlCoordinator>,
    controls: Arc<LoopControls>,
    ready: Arc<AtomicBool>,
    scenarios: RwLock<ScenarioCatalog>,
    intersections: RwLock<IntersectionCatalog>,
}

impl TrafficConsole {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        trips: Vec<TripDefinition>,
        config: ConsoleConfig,
    ) -> Self {
        let store = Arc::new(SessionStore::new());

        let mut pool_rng = component_rng(config.seed, SALT_VIA_POOL);
        let pool = ViaPool::build(&trips, engine.network_edges(), &mut pool_rng);

        let synthesizer = Arc::new(VariantSynthesizer::new(
            engine.clone(),
            store.clone(),
            pool,
            config.synthesis.clone(),
            component_rng(config.seed, SALT_SYNTHESIS),
        ));

        let ready = Arc::new(AtomicBool::new(false));
        let spawner = VehicleSpawner::new(
            engine.clone(),
            synthesizer.clone(),
            ready.clone(),
            config.branch_weights.clone(),
            component_rng(config.seed, SALT_SPAWN),
        );

        let overrides = Arc::new(SignalOverrideController::new(engine.clone()));
        let adaptive = Arc::new(AdaptiveSignalController::new(engine.clone(), config.timing));
        let coordinator = Arc::new(ControlCoordinator::new(
            engine.clone(),
            overrides.clone(),
            adaptive.clone(),
        ));
        let controls = Arc::new(LoopControls::new(config.step_delay_ms));

        Self {
            engine,
            config,
            trips,
            store,
            synthesizer,
            spawner,
            overrides,
            adaptive,
            coordinator,
            controls,
            ready,
            scenarios: RwLock::new(ScenarioCatalog::default()),
            intersections: RwLock::new(IntersectionCatalog::default()),
        }
    }

    /// Build both catalogs and pre-build variants for every scenario and class
    ///
    /// Marks the session ready when at least one scenario survived. Returns
    /// the number of scenarios.
    pub fn prepare(&self, tags: &HashMap<IntersectionId, String>) -> usize {
        let scenarios = ScenarioCatalog::prepare(&self.trips, self.engine.as_ref());
        let intersections = IntersectionCatalog::build(self.engine.as_ref(), tags);
        self.adaptive.set_intersections(intersections.ids());

        for scenario in scenarios.scenarios() {
            for class in VehicleClass::ALL {
                let variants = self.synthesizer.synthesize(&scenario.trip, class);
                if variants.is_empty() {
                    warn!("{}: no {} variants prepared", scenario.name, class);
                }
            }
        }

        let count = scenarios.len();
        info!(
            "Session prepared: {} scenarios, {} signals, {} cached variant sets",
            count,
            intersections.entries().len(),
            self.store.cached_scenarios()
        );

        *self.scenarios.write().unwrap_or_else(PoisonError::into_inner) = scenarios;
        *self
            .intersections
            .write()
            .unwrap_or_else(PoisonError::into_inner) = intersections;
        self.ready.store(count > 0, Ordering::Release);
        count
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn scenario_names(&self) -> Vec<String> {
        self.scenarios
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
    }

    pub fn scenario(&self, name: &str) -> Option<Scenario> {
        self.scenarios
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name(name)
            .cloned()
    }

    pub fn intersections(&self) -> Vec<IntersectionEntry> {
        self.intersections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
            .to_vec()
    }

    pub fn signal_status(&self, id: &IntersectionId) -> SignalStatus {
        self.coordinator.signal_status(id)
    }

    /// Variants for a trip, synthesizing them on first use
    pub fn variants(&self, trip: &TripId, class: VehicleClass) -> Option<Arc<[RouteVariant]>> {
        let trip = self.find_trip(trip)?;
        Some(self.synthesizer.synthesize(&trip, class))
    }

    pub fn force_red(&self, id: &IntersectionId) -> Result<()> {
        self.overrides.force_red(id)
    }

    pub fn force_green(&self, id: &IntersectionId) -> Result<()> {
        self.overrides.force_green(id)
    }

    pub fn reset_signal(&self, id: &IntersectionId) -> Result<()> {
        self.overrides.reset(id)
    }

    pub fn reset_all_signals(&self) -> ResetSummary {
        self.overrides.reset_all()
    }

    pub fn set_adaptive_enabled(&self, enabled: bool) -> ResetSummary {
        self.adaptive.set_enabled(enabled, &self.overrides)
    }

    pub fn is_adaptive_enabled(&self) -> bool {
        self.adaptive.is_enabled()
    }

    pub fn spawn(&self, request: &VehicleSpawnRequest) -> Result<SpawnReport, SpawnError> {
        let trip = self
            .find_trip(&request.trip)
            .ok_or_else(|| SpawnError::UnknownTrip(request.trip.clone()))?;
        self.spawner.spawn(&trip, request.class, request.count)
    }

    pub fn start(&self) {
        self.controls.start();
    }

    pub fn stop(&self) {
        self.controls.stop();
    }

    pub fn set_step_delay(&self, ms: u64) {
        self.controls.set_step_delay(ms);
    }

    pub fn controls(&self) -> Arc<LoopControls> {
        self.controls.clone()
    }

    pub fn coordinator(&self) -> Arc<ControlCoordinator> {
        self.coordinator.clone()
    }

    /// Loop bound to this session, publishing snapshots into `snapshots`
    pub fn simulation_loop(&self, snapshots: Sender<StepSnapshot>) -> SimulationLoop {
        let intersections = self
            .intersections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids();
        SimulationLoop::new(
            self.engine.clone(),
            self.coordinator.clone(),
            self.controls.clone(),
            intersections,
            MetricsTracker::new(self.config.throughput_window_secs),
            snapshots,
            Duration::from_millis(self.config.idle_poll_ms.max(1)),
        )
    }

    /// Prepared scenarios first, then any loaded trip by id
    fn find_trip(&self, trip: &TripId) -> Option<TripDefinition> {
        let scenarios = self.scenarios.read().unwrap_or_else(PoisonError::into_inner);
        scenarios
            .by_trip(trip)
            .map(|s| s.trip.clone())
            .or_else(|| self.trips.iter().find(|t| &t.id == trip).cloned())
    }
}
