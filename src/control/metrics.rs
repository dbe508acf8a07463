//! Derived per-step traffic metrics

use std::collections::{HashSet, VecDeque};

use super::engine::SimulationEngine;
use super::types::VehicleId;

/// Vehicles slower than this count as stopped (m/s)
pub const STOPPED_SPEED_THRESHOLD: f64 = 0.1;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Metrics computed after one controlled step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepMetrics {
    pub active_vehicles: usize,
    pub stopped_vehicles: usize,
    /// Stopped share of active vehicles, 0 with no vehicles
    pub congestion_index: f64,
    /// `None` when no vehicle reports a waiting time
    pub avg_wait_secs: Option<f64>,
    pub mean_speed_mps: f64,
    /// Arrivals in the sliding window scaled to vehicles per hour
    pub throughput_vph: f64,
    /// Arrivals observed this step
    pub arrivals: usize,
}

/// Sliding-window arrival tracker
#[derive(Debug)]
pub struct MetricsTracker {
    window_secs: f64,
    arrival_times: VecDeque<f64>,
    previous_ids: HashSet<VehicleId>,
}

impl MetricsTracker {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs: window_secs.max(1.0),
            arrival_times: VecDeque::new(),
            previous_ids: HashSet::new(),
        }
    }

    pub fn observe(&mut self, now: f64, engine: &dyn SimulationEngine) -> StepMetrics {
        let ids = engine.vehicle_ids();
        let active_vehicles = ids.len();

        let speeds: Vec<f64> = ids.iter().filter_map(|id| engine.vehicle_speed(id)).collect();
        let stopped_vehicles = speeds
            .iter()
            .filter(|speed| **speed < STOPPED_SPEED_THRESHOLD)
            .count();
        let mean_speed_mps = if speeds.is_empty() {
            0.0
        } else {
            speeds.iter().sum::<f64>() / speeds.len() as f64
        };

        let congestion_index = if active_vehicles == 0 {
            0.0
        } else {
            stopped_vehicles as f64 / active_vehicles as f64
        };

        let avg_wait_secs = if active_vehicles == 0 {
            Some(0.0)
        } else {
            let waits: Vec<f64> = ids
                .iter()
                .filter_map(|id| engine.vehicle_waiting_time(id))
                .collect();
            (!waits.is_empty()).then(|| waits.iter().sum::<f64>() / waits.len() as f64)
        };

        let current: HashSet<VehicleId> = ids.into_iter().collect();
        let arrivals = match engine.arrived_vehicles() {
            Some(arrived) => arrived.len(),
            None => self.previous_ids.difference(&current).count(),
        };
        self.previous_ids = current;

        for _ in 0..arrivals {
            self.arrival_times.push_back(now);
        }
        while self
            .arrival_times
            .front()
            .is_some_and(|t| now - t > self.window_secs)
        {
            self.arrival_times.pop_front();
        }
        let throughput_vph =
            self.arrival_times.len() as f64 * SECONDS_PER_HOUR / self.window_secs;

        StepMetrics {
            active_vehicles,
            stopped_vehicles,
            congestion_index,
            avg_wait_secs,
            mean_speed_mps,
            throughput_vph,
            arrivals,
        }
    }
}
