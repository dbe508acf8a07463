//! Weighted assignment of spawn requests to installed variants

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info};
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;

use super::engine::SimulationEngine;
use super::synthesizer::VariantSynthesizer;
use super::types::{RouteId, ScenarioKey, TripDefinition, TripId, VehicleClass, VehicleId};

/// Why a spawn request was rejected before any vehicle was created
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReadyReason {
    SimulationNotReady,
    NoVariants(ScenarioKey),
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("not ready: {0}")]
    NotReady(NotReadyReason),

    #[error("unknown trip {0}")]
    UnknownTrip(TripId),
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::SimulationNotReady => f.write_str("simulation has not been started"),
            NotReadyReason::NoVariants(key) => write!(f, "no route variants for {}", key),
        }
    }
}

/// Outcome for one vehicle of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnedVehicle {
    pub vehicle: VehicleId,
    pub route: RouteId,
    pub variant_index: usize,
    pub created: bool,
}

/// Per-vehicle results of a spawn request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnReport {
    pub vehicles: Vec<SpawnedVehicle>,
}

impl SpawnReport {
    pub fn created_count(&self) -> usize {
        self.vehicles.iter().filter(|v| v.created).count()
    }

    pub fn failed_count(&self) -> usize {
        self.vehicles.len() - self.created_count()
    }
}

/// Pick a ranked variant index by cumulative-weight sampling
///
/// The index is clamped to `available - 1` so fewer variants than weights
/// never produce an out-of-range pick.
pub fn pick_variant_index<R: Rng + ?Sized>(weights: &[f64], available: usize, rng: &mut R) -> usize {
    let last = available.saturating_sub(1);
    let draw: f64 = rng.random();
    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if draw <= cumulative {
            return index.min(last);
        }
    }
    weights.len().saturating_sub(1).min(last)
}

/// Injects vehicles on synthesized variants
pub struct VehicleSpawner {
    engine: Arc<dyn SimulationEngine>,
    synthesizer: Arc<VariantSynthesizer>,
    ready: Arc<AtomicBool>,
    weights: Vec<f64>,
    rng: Mutex<StdRng>,
    next_vehicle: AtomicU64,
}

impl VehicleSpawner {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        synthesizer: Arc<VariantSynthesizer>,
        ready: Arc<AtomicBool>,
        weights: Vec<f64>,
        rng: StdRng,
    ) -> Self {
        Self {
            engine,
            synthesizer,
            ready,
            weights,
            rng: Mutex::new(rng),
            next_vehicle: AtomicU64::new(0),
        }
    }

    /// Spawn `count` vehicles of `class` on the trip's variants
    ///
    /// Rejected as a whole when the session is not ready or the trip has no
    /// variants. Individual creation failures are logged and do not stop the
    /// rest of the batch.
    pub fn spawn(
        &self,
        trip: &TripDefinition,
        class: VehicleClass,
        count: u32,
    ) -> Result<SpawnReport, SpawnError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(SpawnError::NotReady(NotReadyReason::SimulationNotReady));
        }

        let variants = self.synthesizer.synthesize(trip, class);
        if variants.is_empty() {
            return Err(SpawnError::NotReady(NotReadyReason::NoVariants(
                ScenarioKey::new(trip.id.clone(), class),
            )));
        }

        let depart = self.engine.current_time();
        let mut report = SpawnReport::default();
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        for _ in 0..count {
            let variant_index = pick_variant_index(&self.weights, variants.len(), &mut *rng);
            let chosen = &variants[variant_index];
            let vehicle = self.next_vehicle_id(class);

            let created = match self.engine.create_vehicle(&vehicle, &chosen.id, class, depart) {
                Ok(()) => true,
                Err(err) => {
                    error!(
                        "Vehicle creation failed for {} route={}: {}",
                        vehicle, chosen.id, err
                    );
                    false
                }
            };

            report.vehicles.push(SpawnedVehicle {
                vehicle,
                route: chosen.id.clone(),
                variant_index,
                created,
            });
        }

        info!(
            "Spawned {}/{} {} vehicles on trip {}",
            report.created_count(),
            count,
            class,
            trip.id
        );
        Ok(report)
    }

    fn next_vehicle_id(&self, class: VehicleClass) -> VehicleId {
        let n = self.next_vehicle.fetch_add(1, Ordering::Relaxed);
        VehicleId::new(format!("{}_{}", class, n))
    }
}
