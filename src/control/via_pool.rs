//! Candidate waypoint edges for route diversification

use std::collections::BTreeSet;

use log::{info, warn};
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use super::types::{EdgeId, TripDefinition};

/// Pools smaller than this produce little variety
const SMALL_POOL_WARNING: usize = 10;

/// Shuffled set of edges usable as waypoints
#[derive(Debug, Clone, Default)]
pub struct ViaPool {
    edges: Vec<EdgeId>,
}

impl ViaPool {
    /// Build the pool once from trip endpoints, required vias and network edges
    ///
    /// Blank and junction-internal edges are dropped.
    pub fn build<R: Rng + ?Sized>(
        trips: &[TripDefinition],
        network_edges: impl IntoIterator<Item = EdgeId>,
        rng: &mut R,
    ) -> Self {
        let trip_edges = trips.iter().flat_map(|trip| {
            [&trip.origin, &trip.destination]
                .into_iter()
                .chain(trip.required_via.iter())
                .cloned()
        });

        // Ordered set so a seeded shuffle is reproducible
        let unique: BTreeSet<EdgeId> = trip_edges
            .chain(network_edges)
            .map(|edge| EdgeId::new(edge.as_str().trim()))
            .filter(EdgeId::is_routable)
            .collect();

        let mut edges: Vec<EdgeId> = unique.into_iter().collect();
        edges.shuffle(rng);

        info!("Via-edge pool built: {}", edges.len());
        if edges.len() < SMALL_POOL_WARNING {
            warn!(
                "Via pool very small ({}), long route variety may be limited",
                edges.len()
            );
        }

        Self { edges }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn contains(&self, edge: &EdgeId) -> bool {
        self.edges.contains(edge)
    }

    /// Uniformly sample one waypoint
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&EdgeId> {
        self.edges.choose(rng)
    }
}
