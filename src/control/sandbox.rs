//! In-memory reference engine
//!
//! A small stand-in for the external micro-simulation, used by the demo
//! binary and the integration tests. Junctions are graph nodes and edges are
//! one-way roads; paths are found with A* (null heuristic) over the edges
//! that admit the requested vehicle class.
//!
//! Signals run cyclic programs. A manually written indicator string holds
//! for exactly one step and is then dropped, the same way a real engine
//! falls back to its program unless the state is written again.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use petgraph::algo::astar;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::engine::{EngineError, EngineResult, SimulationEngine};
use super::metrics::STOPPED_SPEED_THRESHOLD;
use super::types::{
    EdgeId, IntersectionId, LaneId, ProgramId, RouteId, VehicleClass, VehicleId, DEFAULT_PROGRAM,
};

/// Free-flow speed of every sandbox vehicle (m/s)
pub const CRUISE_SPEED: f64 = 13.9;

/// Duration of each phase of the generated default program
pub const DEFAULT_PHASE_SECS: f64 = 30.0;

/// Edge data for the sandbox network graph
#[derive(Debug, Clone)]
struct RoadEdge {
    id: EdgeId,
    length: f64,
    /// `None` admits every class
    allowed: Option<Vec<VehicleClass>>,
    weight: u32,
}

impl RoadEdge {
    fn new(id: EdgeId, length: f64, allowed: Option<Vec<VehicleClass>>) -> Self {
        // Length scaled for integer weights
        let weight = ((length * 100.0) as u32).max(1);
        Self {
            id,
            length,
            allowed,
            weight,
        }
    }

    fn admits(&self, class: VehicleClass) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&class))
    }
}

#[derive(Debug, Clone)]
struct Phase {
    state: String,
    duration: f64,
}

#[derive(Debug, Clone)]
struct Signal {
    /// Incoming edges in indicator order
    approaches: Vec<EdgeIndex>,
    programs: HashMap<ProgramId, Vec<Phase>>,
    active: ProgramId,
    phase: usize,
    elapsed: f64,
    manual: Option<String>,
}

impl Signal {
    fn state(&self) -> String {
        if let Some(manual) = &self.manual {
            return manual.clone();
        }
        self.programs
            .get(&self.active)
            .and_then(|phases| phases.get(self.phase))
            .map(|phase| phase.state.clone())
            .unwrap_or_default()
    }

    fn advance(&mut self, dt: f64) {
        self.manual = None;
        let Some(phases) = self.programs.get(&self.active) else {
            return;
        };
        if phases.is_empty() {
            return;
        }
        self.elapsed += dt;
        while self.elapsed >= phases[self.phase].duration {
            self.elapsed -= phases[self.phase].duration;
            self.phase = (self.phase + 1) % phases.len();
        }
    }

    /// Whether traffic arriving on `approach` may enter the junction
    fn lets_pass(&self, approach: EdgeIndex) -> bool {
        let state = self.state();
        match self.approaches.iter().position(|e| *e == approach) {
            Some(index) => state
                .chars()
                .nth(index)
                .is_some_and(|c| c == 'G' || c == 'g'),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
struct Vehicle {
    route: RouteId,
    edges: Vec<EdgeIndex>,
    edge_index: usize,
    position: f64,
    speed: f64,
    waiting: f64,
    depart: f64,
}

/// Overrides for the per-lane metrics the sandbox would otherwise compute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneMetrics {
    pub halting: Option<u32>,
    pub vehicles: Option<u32>,
}

#[derive(Default)]
struct SandboxState {
    graph: DiGraph<String, RoadEdge>,
    junctions: HashMap<String, NodeIndex>,
    edges: HashMap<EdgeId, EdgeIndex>,
    signals: BTreeMap<IntersectionId, Signal>,
    routes: HashMap<RouteId, Vec<EdgeId>>,
    vehicles: BTreeMap<VehicleId, Vehicle>,
    lane_overrides: HashMap<LaneId, LaneMetrics>,
    arrived_last: Vec<VehicleId>,
    time: f64,
    step_length: f64,
}

impl SandboxState {
    fn junction(&mut self, name: &str) -> NodeIndex {
        if let Some(node) = self.junctions.get(name) {
            return *node;
        }
        let node = self.graph.add_node(name.to_string());
        self.junctions.insert(name.to_string(), node);
        node
    }

    fn edge(&self, id: &EdgeId) -> EngineResult<EdgeIndex> {
        self.edges
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::UnknownEdge(id.clone()))
    }

    fn signal(&self, id: &IntersectionId) -> EngineResult<&Signal> {
        self.signals
            .get(id)
            .ok_or_else(|| EngineError::UnknownIntersection(id.clone()))
    }

    fn signal_mut(&mut self, id: &IntersectionId) -> EngineResult<&mut Signal> {
        self.signals
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownIntersection(id.clone()))
    }

    fn signal_at(&self, node: NodeIndex) -> Option<&Signal> {
        let name = self.graph.node_weight(node)?;
        self.signals.get(&IntersectionId::new(name.as_str()))
    }

    fn lane_edge(&self, lane: &LaneId) -> Option<EdgeIndex> {
        let edge = lane.as_str().rsplit_once('_').map(|(edge, _)| edge)?;
        self.edges.get(&EdgeId::new(edge)).copied()
    }

    fn vehicles_on(&self, edge: EdgeIndex) -> impl Iterator<Item = &Vehicle> {
        self.vehicles
            .values()
            .filter(move |v| v.depart <= self.time && v.edges.get(v.edge_index) == Some(&edge))
    }

    /// Move one vehicle; returns true once it has left the network
    fn drive(&self, vehicle: &mut Vehicle, dt: f64) -> bool {
        let mut budget = CRUISE_SPEED * dt;
        loop {
            let current = vehicle.edges[vehicle.edge_index];
            let length = self.graph[current].length;
            let to_end = (length - vehicle.position).max(0.0);

            if budget < to_end {
                vehicle.position += budget;
                vehicle.speed = CRUISE_SPEED;
                return false;
            }

            if vehicle.edge_index + 1 >= vehicle.edges.len() {
                return true;
            }

            let gate = self.graph.edge_endpoints(current).map(|(_, to)| to);
            let blocked = gate
                .and_then(|node| self.signal_at(node))
                .is_some_and(|signal| !signal.lets_pass(current));
            if blocked {
                vehicle.position = length;
                vehicle.speed = 0.0;
                vehicle.waiting += dt;
                return false;
            }

            budget -= to_end;
            vehicle.edge_index += 1;
            vehicle.position = 0.0;
        }
    }
}

/// Thread-safe in-memory engine
pub struct SandboxEngine {
    state: Mutex<SandboxState>,
}

impl SandboxEngine {
    /// Empty network advancing `step_length` seconds per step
    pub fn new(step_length: f64) -> Self {
        Self {
            state: Mutex::new(SandboxState {
                step_length: step_length.max(f64::EPSILON),
                ..SandboxState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a one-way road between two junctions, creating them as needed
    pub fn add_edge(&self, id: &str, from: &str, to: &str, length: f64) {
        self.insert_edge(id, from, to, length, None);
    }

    /// Add a road only the listed classes may use
    pub fn add_edge_restricted(
        &self,
        id: &str,
        from: &str,
        to: &str,
        length: f64,
        allowed: &[VehicleClass],
    ) {
        self.insert_edge(id, from, to, length, Some(allowed.to_vec()));
    }

    fn insert_edge(
        &self,
        id: &str,
        from: &str,
        to: &str,
        length: f64,
        allowed: Option<Vec<VehicleClass>>,
    ) {
        let mut state = self.state();
        let from = state.junction(from);
        let to = state.junction(to);
        let edge_id = EdgeId::new(id);
        let index = state
            .graph
            .add_edge(from, to, RoadEdge::new(edge_id.clone(), length, allowed));
        state.edges.insert(edge_id, index);
    }

    /// Put a junction under signal control with a two-phase default program
    ///
    /// Even-numbered approaches are green in the first phase and red in the
    /// second; odd-numbered ones the other way round.
    pub fn add_signal(&self, junction: &str) -> EngineResult<IntersectionId> {
        let mut state = self.state();
        let id = IntersectionId::new(junction);
        let node = *state
            .junctions
            .get(junction)
            .ok_or_else(|| EngineError::UnknownIntersection(id.clone()))?;

        let mut approaches: Vec<EdgeIndex> = state
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        approaches.sort();
        if approaches.is_empty() {
            return Err(EngineError::Rejected(format!(
                "junction {} has no approaches",
                junction
            )));
        }

        let pattern = |green_even: bool| -> String {
            (0..approaches.len())
                .map(|i| if (i % 2 == 0) == green_even { 'G' } else { 'r' })
                .collect()
        };
        let default_program = vec![
            Phase {
                state: pattern(true),
                duration: DEFAULT_PHASE_SECS,
            },
            Phase {
                state: pattern(false),
                duration: DEFAULT_PHASE_SECS,
            },
        ];

        let mut programs = HashMap::new();
        programs.insert(ProgramId::new(DEFAULT_PROGRAM), default_program);
        state.signals.insert(
            id.clone(),
            Signal {
                approaches,
                programs,
                active: ProgramId::new(DEFAULT_PROGRAM),
                phase: 0,
                elapsed: 0.0,
                manual: None,
            },
        );
        Ok(id)
    }

    /// Register an additional program for a signal
    pub fn add_program(
        &self,
        id: &IntersectionId,
        program: &str,
        phases: &[(&str, f64)],
    ) -> EngineResult<()> {
        let mut state = self.state();
        let signal = state.signal_mut(id)?;
        if phases
            .iter()
            .any(|(s, _)| s.chars().count() != signal.approaches.len())
        {
            return Err(EngineError::Rejected(format!(
                "program {} does not match {} approaches",
                program,
                signal.approaches.len()
            )));
        }
        signal.programs.insert(
            ProgramId::new(program),
            phases
                .iter()
                .map(|(s, d)| Phase {
                    state: s.to_string(),
                    duration: (*d).max(f64::EPSILON),
                })
                .collect(),
        );
        Ok(())
    }

    /// Replace the computed metrics of one lane
    pub fn set_lane_metrics(&self, lane: &LaneId, metrics: LaneMetrics) {
        self.state().lane_overrides.insert(lane.clone(), metrics);
    }

    /// Bidirectional `cols` x `rows` grid with signals at every junction
    /// that has at least three approaches
    ///
    /// Junctions are named `J{c}_{r}` and edges `J{a}toJ{b}`.
    pub fn grid(cols: usize, rows: usize, edge_length: f64, step_length: f64) -> Self {
        let engine = Self::new(step_length);
        let name = |c: usize, r: usize| format!("J{}_{}", c, r);

        for r in 0..rows {
            for c in 0..cols {
                let here = name(c, r);
                let mut neighbours = Vec::new();
                if c + 1 < cols {
                    neighbours.push(name(c + 1, r));
                }
                if r + 1 < rows {
                    neighbours.push(name(c, r + 1));
                }
                for there in neighbours {
                    engine.add_edge(&grid_edge(&here, &there), &here, &there, edge_length);
                    engine.add_edge(&grid_edge(&there, &here), &there, &here, edge_length);
                }
            }
        }

        let signalized: Vec<String> = {
            let state = engine.state();
            let mut names: Vec<String> = state
                .junctions
                .iter()
                .filter(|(_, node)| {
                    state
                        .graph
                        .edges_directed(**node, Direction::Incoming)
                        .count()
                        >= 3
                })
                .map(|(name, _)| name.clone())
                .collect();
            names.sort();
            names
        };
        for junction in signalized {
            // Every listed junction exists and has approaches
            let _ = engine.add_signal(&junction);
        }
        engine
    }

    /// Edges of an installed route
    pub fn route_edges(&self, route: &RouteId) -> Option<Vec<EdgeId>> {
        self.state().routes.get(route).cloned()
    }

    /// Route a vehicle was created on, while it is still in the network
    pub fn vehicle_route(&self, vehicle: &VehicleId) -> Option<RouteId> {
        self.state().vehicles.get(vehicle).map(|v| v.route.clone())
    }

    pub fn vehicle_count(&self) -> usize {
        self.state().vehicles.len()
    }

    pub fn route_count(&self) -> usize {
        self.state().routes.len()
    }
}

/// Grid edge name between two junction names
pub fn grid_edge(from: &str, to: &str) -> String {
    format!("{}to{}", from, to)
}

fn lane_of(edge: &EdgeId) -> LaneId {
    LaneId::new(format!("{}_0", edge))
}

impl SimulationEngine for SandboxEngine {
    fn shortest_path(&self, from: &EdgeId, to: &EdgeId, class: VehicleClass) -> Option<Vec<EdgeId>> {
        let state = self.state();
        let from_edge = *state.edges.get(from)?;
        let to_edge = *state.edges.get(to)?;
        if !state.graph[from_edge].admits(class) || !state.graph[to_edge].admits(class) {
            return None;
        }
        if from_edge == to_edge {
            return Some(vec![from.clone()]);
        }

        let (_, start) = state.graph.edge_endpoints(from_edge)?;
        let (goal, _) = state.graph.edge_endpoints(to_edge)?;

        // Every node is kept, so node indices match the full graph
        let admitted: DiGraph<(), u32> = state
            .graph
            .filter_map(|_, _| Some(()), |_, e| e.admits(class).then_some(e.weight));
        let (_, nodes) = astar(
            &admitted,
            start,
            |node| node == goal,
            |e| *e.weight(),
            |_| 0, // Null heuristic = Dijkstra
        )?;

        let mut path = Vec::with_capacity(nodes.len() + 1);
        path.push(from.clone());
        for pair in nodes.windows(2) {
            let hop = state
                .graph
                .edges_connecting(pair[0], pair[1])
                .filter(|e| e.weight().admits(class))
                .min_by_key(|e| e.weight().weight)?;
            path.push(hop.weight().id.clone());
        }
        path.push(to.clone());
        Some(path)
    }

    fn edge_admits(&self, edge: &EdgeId, class: VehicleClass) -> bool {
        let state = self.state();
        state
            .edges
            .get(edge)
            .is_some_and(|index| state.graph[*index].admits(class))
    }

    fn edge_length(&self, edge: &EdgeId) -> Option<f64> {
        let state = self.state();
        state.edges.get(edge).map(|index| state.graph[*index].length)
    }

    fn network_edges(&self) -> Vec<EdgeId> {
        let mut edges: Vec<EdgeId> = self.state().edges.keys().cloned().collect();
        edges.sort();
        edges
    }

    fn signal_ids(&self) -> EngineResult<Vec<IntersectionId>> {
        Ok(self.state().signals.keys().cloned().collect())
    }

    fn signal_state(&self, id: &IntersectionId) -> EngineResult<String> {
        Ok(self.state().signal(id)?.state())
    }

    fn set_signal_state(&self, id: &IntersectionId, indicators: &str) -> EngineResult<()> {
        let mut state = self.state();
        let signal = state.signal_mut(id)?;
        if indicators.chars().count() != signal.approaches.len() {
            return Err(EngineError::Rejected(format!(
                "state '{}' does not match {} approaches of {}",
                indicators,
                signal.approaches.len(),
                id
            )));
        }
        signal.manual = Some(indicators.to_string());
        Ok(())
    }

    fn signal_program(&self, id: &IntersectionId) -> EngineResult<ProgramId> {
        Ok(self.state().signal(id)?.active.clone())
    }

    fn set_signal_program(&self, id: &IntersectionId, program: &ProgramId) -> EngineResult<()> {
        let mut state = self.state();
        let signal = state.signal_mut(id)?;
        if !signal.programs.contains_key(program) {
            return Err(EngineError::UnknownProgram {
                intersection: id.clone(),
                program: program.clone(),
            });
        }
        signal.active = program.clone();
        signal.phase = 0;
        signal.elapsed = 0.0;
        signal.manual = None;
        Ok(())
    }

    fn controlled_lanes(&self, id: &IntersectionId) -> Option<Vec<LaneId>> {
        let state = self.state();
        let signal = state.signals.get(id)?;
        Some(
            signal
                .approaches
                .iter()
                .map(|edge| lane_of(&state.graph[*edge].id))
                .collect(),
        )
    }

    fn lane_halting_count(&self, lane: &LaneId) -> Option<u32> {
        let state = self.state();
        if let Some(metrics) = state.lane_overrides.get(lane) {
            return metrics.halting;
        }
        let edge = state.lane_edge(lane)?;
        let halted = state
            .vehicles_on(edge)
            .filter(|v| v.speed < STOPPED_SPEED_THRESHOLD)
            .count();
        u32::try_from(halted).ok()
    }

    fn lane_vehicle_count(&self, lane: &LaneId) -> Option<u32> {
        let state = self.state();
        if let Some(metrics) = state.lane_overrides.get(lane) {
            return metrics.vehicles;
        }
        let edge = state.lane_edge(lane)?;
        u32::try_from(state.vehicles_on(edge).count()).ok()
    }

    fn register_route(&self, id: &RouteId, edges: &[EdgeId]) -> EngineResult<()> {
        let mut state = self.state();
        if state.routes.contains_key(id) {
            return Err(EngineError::DuplicateRoute(id.clone()));
        }
        if edges.is_empty() {
            return Err(EngineError::Rejected(format!("route {} has no edges", id)));
        }

        let indices = edges
            .iter()
            .map(|edge| state.edge(edge))
            .collect::<EngineResult<Vec<_>>>()?;
        for pair in indices.windows(2) {
            let head = state.graph.edge_endpoints(pair[0]).map(|(_, to)| to);
            let tail = state.graph.edge_endpoints(pair[1]).map(|(from, _)| from);
            if head != tail {
                return Err(EngineError::Rejected(format!(
                    "route {} is not connected between {} and {}",
                    id, state.graph[pair[0]].id, state.graph[pair[1]].id
                )));
            }
        }

        state.routes.insert(id.clone(), edges.to_vec());
        Ok(())
    }

    fn create_vehicle(
        &self,
        id: &VehicleId,
        route: &RouteId,
        class: VehicleClass,
        depart: f64,
    ) -> EngineResult<()> {
        let mut state = self.state();
        if state.vehicles.contains_key(id) {
            return Err(EngineError::DuplicateVehicle(id.clone()));
        }
        let edges = state
            .routes
            .get(route)
            .cloned()
            .ok_or_else(|| EngineError::UnknownRoute(route.clone()))?;
        let indices = edges
            .iter()
            .map(|edge| state.edge(edge))
            .collect::<EngineResult<Vec<_>>>()?;
        if let Some(blocked) = indices.iter().find(|e| !state.graph[**e].admits(class)) {
            return Err(EngineError::Rejected(format!(
                "edge {} does not admit {}",
                state.graph[*blocked].id, class
            )));
        }

        state.vehicles.insert(
            id.clone(),
            Vehicle {
                route: route.clone(),
                edges: indices,
                edge_index: 0,
                position: 0.0,
                speed: 0.0,
                waiting: 0.0,
                depart,
            },
        );
        Ok(())
    }

    fn step(&self) -> EngineResult<()> {
        let mut state = self.state();
        let dt = state.step_length;
        state.time += dt;
        let now = state.time;

        let mut vehicles = std::mem::take(&mut state.vehicles);
        let mut arrived = Vec::new();
        for (id, vehicle) in vehicles.iter_mut() {
            if vehicle.depart > now {
                continue;
            }
            if state.drive(vehicle, dt) {
                arrived.push(id.clone());
            }
        }
        for id in &arrived {
            vehicles.remove(id);
        }
        state.vehicles = vehicles;
        state.arrived_last = arrived;

        for signal in state.signals.values_mut() {
            signal.advance(dt);
        }
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.state().time
    }

    fn vehicle_ids(&self) -> Vec<VehicleId> {
        let state = self.state();
        state
            .vehicles
            .iter()
            .filter(|(_, v)| v.depart <= state.time)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn vehicle_speed(&self, id: &VehicleId) -> Option<f64> {
        self.state().vehicles.get(id).map(|v| v.speed)
    }

    fn vehicle_waiting_time(&self, id: &VehicleId) -> Option<f64> {
        self.state().vehicles.get(id).map(|v| v.waiting)
    }

    fn arrived_vehicles(&self) -> Option<Vec<VehicleId>> {
        Some(self.state().arrived_last.clone())
    }
}
