//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use traffic_console::control::{
    EdgeId, EngineError, EngineResult, IntersectionId, LaneId, ProgramId, RouteId,
    SandboxEngine, SimulationEngine, TripDefinition, VehicleClass, VehicleId,
};

/// Trip E1 -> E9 with a 13-edge loop hanging off junction C
///
/// The only long route is `E1 E2 F1..F13 E9` (16 edges).
pub fn loop_network() -> (Arc<SandboxEngine>, TripDefinition) {
    loop_network_of(13)
}

/// Trip E1 -> E9 with a loop of `loop_edges` edges `F1..Fn` off junction C
pub fn loop_network_of(loop_edges: usize) -> (Arc<SandboxEngine>, TripDefinition) {
    let engine = SandboxEngine::new(1.0);
    engine.add_edge("E1", "A", "B", 50.0);
    engine.add_edge("E2", "B", "C", 50.0);
    engine.add_edge("E9", "C", "D", 50.0);
    for i in 1..=loop_edges {
        let from = if i == 1 { "C".to_string() } else { format!("L{}", i - 1) };
        let to = if i == loop_edges { "C".to_string() } else { format!("L{}", i) };
        engine.add_edge(&format!("F{}", i), &from, &to, 20.0);
    }
    (Arc::new(engine), TripDefinition::new("loop_trip", "E1", "E9"))
}

/// A single straight road A -> B -> C -> D and its trip
pub fn straight_network() -> (Arc<SandboxEngine>, TripDefinition) {
    let engine = SandboxEngine::new(1.0);
    engine.add_edge("S1", "A", "B", 40.0);
    engine.add_edge("S2", "B", "C", 40.0);
    engine.add_edge("S3", "C", "D", 40.0);
    (Arc::new(engine), TripDefinition::new("straight", "S1", "S3"))
}

/// Two approaches into a signalized junction X
pub fn signal_network() -> (Arc<SandboxEngine>, IntersectionId) {
    let engine = SandboxEngine::new(1.0);
    engine.add_edge("north_in", "N", "X", 100.0);
    engine.add_edge("west_in", "W", "X", 100.0);
    engine.add_edge("east_out", "X", "E", 100.0);
    let id = engine
        .add_signal("X")
        .expect("junction X has two approaches");
    engine
        .add_program(&id, "rush", &[("GG", 20.0), ("rr", 5.0)])
        .expect("program matches approach count");
    (Arc::new(engine), id)
}

pub fn lane(edge: &str) -> LaneId {
    LaneId::new(format!("{}_0", edge))
}

/// Engine wrapper that fails selected calls on demand
pub struct FlakyEngine {
    pub inner: Arc<SandboxEngine>,
    pub fail_register: AtomicBool,
    /// Every Nth vehicle creation fails; 0 disables
    pub fail_create_every: AtomicUsize,
    pub fail_signal_writes: AtomicBool,
    pub fail_program_reads: AtomicBool,
    pub fail_program_writes: AtomicBool,
    pub fail_step: AtomicBool,
    /// Report no arrival list, as engines without one do
    pub hide_arrivals: AtomicBool,
    creates: AtomicUsize,
}

impl FlakyEngine {
    pub fn new(inner: Arc<SandboxEngine>) -> Self {
        Self {
            inner,
            fail_register: AtomicBool::new(false),
            fail_create_every: AtomicUsize::new(0),
            fail_signal_writes: AtomicBool::new(false),
            fail_program_reads: AtomicBool::new(false),
            fail_program_writes: AtomicBool::new(false),
            fail_step: AtomicBool::new(false),
            hide_arrivals: AtomicBool::new(false),
            creates: AtomicUsize::new(0),
        }
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn rejected(what: &str) -> EngineError {
        EngineError::Rejected(format!("injected {} failure", what))
    }
}

impl SimulationEngine for FlakyEngine {
    fn shortest_path(&self, from: &EdgeId, to: &EdgeId, class: VehicleClass) -> Option<Vec<EdgeId>> {
        self.inner.shortest_path(from, to, class)
    }

    fn edge_admits(&self, edge: &EdgeId, class: VehicleClass) -> bool {
        self.inner.edge_admits(edge, class)
    }

    fn edge_length(&self, edge: &EdgeId) -> Option<f64> {
        self.inner.edge_length(edge)
    }

    fn network_edges(&self) -> Vec<EdgeId> {
        self.inner.network_edges()
    }

    fn signal_ids(&self) -> EngineResult<Vec<IntersectionId>> {
        self.inner.signal_ids()
    }

    fn signal_state(&self, id: &IntersectionId) -> EngineResult<String> {
        self.inner.signal_state(id)
    }

    fn set_signal_state(&self, id: &IntersectionId, state: &str) -> EngineResult<()> {
        if self.fail_signal_writes.load(Ordering::SeqCst) {
            return Err(Self::rejected("signal write"));
        }
        self.inner.set_signal_state(id, state)
    }

    fn signal_program(&self, id: &IntersectionId) -> EngineResult<ProgramId> {
        if self.fail_program_reads.load(Ordering::SeqCst) {
            return Err(Self::rejected("program read"));
        }
        self.inner.signal_program(id)
    }

    fn set_signal_program(&self, id: &IntersectionId, program: &ProgramId) -> EngineResult<()> {
        if self.fail_program_writes.load(Ordering::SeqCst) {
            return Err(Self::rejected("program write"));
        }
        self.inner.set_signal_program(id, program)
    }

    fn controlled_lanes(&self, id: &IntersectionId) -> Option<Vec<LaneId>> {
        self.inner.controlled_lanes(id)
    }

    fn lane_halting_count(&self, lane: &LaneId) -> Option<u32> {
        self.inner.lane_halting_count(lane)
    }

    fn lane_vehicle_count(&self, lane: &LaneId) -> Option<u32> {
        self.inner.lane_vehicle_count(lane)
    }

    fn register_route(&self, id: &RouteId, edges: &[EdgeId]) -> EngineResult<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(Self::rejected("route registration"));
        }
        self.inner.register_route(id, edges)
    }

    fn create_vehicle(
        &self,
        id: &VehicleId,
        route: &RouteId,
        class: VehicleClass,
        depart: f64,
    ) -> EngineResult<()> {
        let every = self.fail_create_every.load(Ordering::SeqCst);
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if every > 0 && n % every == 0 {
            return Err(Self::rejected("vehicle creation"));
        }
        self.inner.create_vehicle(id, route, class, depart)
    }

    fn step(&self) -> EngineResult<()> {
        if self.fail_step.load(Ordering::SeqCst) {
            return Err(Self::rejected("step"));
        }
        self.inner.step()
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.inner.vehicle_ids()
    }

    fn vehicle_speed(&self, id: &VehicleId) -> Option<f64> {
        self.inner.vehicle_speed(id)
    }

    fn vehicle_waiting_time(&self, id: &VehicleId) -> Option<f64> {
        self.inner.vehicle_waiting_time(id)
    }

    fn arrived_vehicles(&self) -> Option<Vec<VehicleId>> {
        if self.hide_arrivals.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.arrived_vehicles()
    }
}
