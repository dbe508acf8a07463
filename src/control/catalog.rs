//! Scenario and intersection listings for the presentation layer

use std::collections::HashMap;

use log::{info, warn};

use super::engine::SimulationEngine;
use super::types::{IntersectionEntry, IntersectionId, TripDefinition, TripId, VehicleClass};

/// A trip that survived preparation, with its display name
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub trip: TripDefinition,
}

/// Ordered, named scenarios
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    /// Keep trips the engine can route for a car, naming them `Route 1`, `Route 2`, ...
    pub fn prepare(trips: &[TripDefinition], engine: &dyn SimulationEngine) -> Self {
        let mut scenarios = Vec::with_capacity(trips.len());

        for trip in trips {
            let routable = engine
                .shortest_path(&trip.origin, &trip.destination, VehicleClass::Car)
                .is_some_and(|path| !path.is_empty());
            if !routable {
                warn!(
                    "Dropping trip {}: no route from {} to {}",
                    trip.id, trip.origin, trip.destination
                );
                continue;
            }
            scenarios.push(Scenario {
                name: format!("Route {}", scenarios.len() + 1),
                trip: trip.clone(),
            });
        }

        info!("Prepared {} of {} trips", scenarios.len(), trips.len());
        Self { scenarios }
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.name.clone()).collect()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn by_name(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn by_trip(&self, trip: &TripId) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| &s.trip.id == trip)
    }
}

/// Signalized intersections with their display tags
#[derive(Debug, Clone, Default)]
pub struct IntersectionCatalog {
    entries: Vec<IntersectionEntry>,
}

impl IntersectionCatalog {
    /// List every signal the engine reports; missing tags default to the id
    pub fn build(engine: &dyn SimulationEngine, tags: &HashMap<IntersectionId, String>) -> Self {
        let ids = match engine.signal_ids() {
            Ok(ids) => ids,
            Err(err) => {
                warn!("Could not list signals: {}", err);
                Vec::new()
            }
        };

        let entries = ids
            .into_iter()
            .map(|id| {
                let display_tag = tags
                    .get(&id)
                    .filter(|tag| !tag.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| id.to_string());
                IntersectionEntry { id, display_tag }
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[IntersectionEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<IntersectionId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}
