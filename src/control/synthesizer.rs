//! Long-route variant synthesis
//!
//! A Monte-Carlo constrained path search: random waypoint pairs are stitched
//! together with shortest sub-paths, and the stitched route is kept only if it
//! preserves the baseline prefix, ends at the destination, is long enough and
//! never revisits an edge. The goal is diverse long alternatives, not optimal
//! routes.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHasher;

use super::config::SynthesisConfig;
use super::engine::SimulationEngine;
use super::installer::{InstallOutcome, RouteInstaller};
use super::store::SessionStore;
use super::types::{EdgeId, RouteId, RouteVariant, ScenarioKey, TripDefinition, TripId, VehicleClass};
use super::via_pool::ViaPool;

/// Joins edges into a signature; edge ids never contain it
const SIGNATURE_SEPARATOR: &str = "|";

/// Baseline path and the prefix every variant must keep
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPlan {
    pub baseline: Vec<EdgeId>,
    pub prefix: Vec<EdgeId>,
    /// Last prefix edge, or the trip origin when no baseline exists
    pub split: EdgeId,
}

impl SplitPlan {
    /// Split the baseline at `min(prefix_edges - 1, len - 3)`, both at least 1
    pub fn from_baseline(baseline: Vec<EdgeId>, origin: &EdgeId, prefix_edges: usize) -> Self {
        if baseline.is_empty() {
            return Self {
                baseline,
                prefix: Vec::new(),
                split: origin.clone(),
            };
        }

        let split_index = prefix_edges
            .saturating_sub(1)
            .max(1)
            .min(baseline.len().saturating_sub(3).max(1));
        let prefix: Vec<EdgeId> = baseline.iter().take(split_index + 1).cloned().collect();
        let split = prefix.last().cloned().unwrap_or_else(|| origin.clone());

        Self {
            baseline,
            prefix,
            split,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    edges: Vec<EdgeId>,
    score: f64,
    signature: String,
}

/// Ranked, deduplicated candidates collected during one search
#[derive(Debug)]
struct CandidateSet {
    keep: usize,
    distinct_hops: usize,
    candidates: Vec<Candidate>,
    signatures: HashSet<String>,
    first_hops: HashSet<EdgeId>,
}

impl CandidateSet {
    fn new(keep: usize, distinct_hops: usize) -> Self {
        Self {
            keep,
            distinct_hops,
            candidates: Vec::new(),
            signatures: HashSet::new(),
            first_hops: HashSet::new(),
        }
    }

    fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Add a candidate unless it duplicates an existing signature
    ///
    /// With `diversify`, once enough distinct first hops are represented a
    /// candidate reusing one of them is rejected.
    fn offer(&mut self, edges: Vec<EdgeId>, score: f64, first_hop: Option<EdgeId>, diversify: bool) -> bool {
        let signature = signature(&edges);
        if self.signatures.contains(&signature) {
            return false;
        }
        if diversify {
            if let Some(hop) = &first_hop {
                if self.first_hops.len() >= self.distinct_hops && self.first_hops.contains(hop) {
                    return false;
                }
            }
        }

        self.signatures.insert(signature.clone());
        if let Some(hop) = first_hop {
            self.first_hops.insert(hop);
        }
        self.candidates.push(Candidate {
            edges,
            score,
            signature,
        });
        self.candidates.sort_by_key(|c| Reverse(OrderedFloat(c.score)));
        self.candidates.truncate(self.keep);
        true
    }

    fn into_ranked(self) -> Vec<Candidate> {
        self.candidates
    }
}

/// Produces up to four ranked long-route variants per scenario
pub struct VariantSynthesizer {
    engine: Arc<dyn SimulationEngine>,
    store: Arc<SessionStore>,
    installer: RouteInstaller,
    pool: ViaPool,
    config: SynthesisConfig,
    rng: Mutex<StdRng>,
}

impl VariantSynthesizer {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        store: Arc<SessionStore>,
        pool: ViaPool,
        config: SynthesisConfig,
        rng: StdRng,
    ) -> Self {
        let installer = RouteInstaller::new(engine.clone(), store.clone());
        Self {
            engine,
            store,
            installer,
            pool,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Variants for a trip and vehicle class, searched once per scenario
    ///
    /// Runs synchronously and may issue hundreds of path queries on first
    /// use; later calls return the cached set. An empty result is not cached.
    pub fn synthesize(&self, trip: &TripDefinition, class: VehicleClass) -> Arc<[RouteVariant]> {
        let key = ScenarioKey::new(trip.id.clone(), class);
        if let Some(cached) = self.store.variants(&key) {
            return cached;
        }

        if !self.engine.edge_admits(&trip.origin, class)
            || !self.engine.edge_admits(&trip.destination, class)
        {
            debug!("Trip {} endpoints do not admit class {}", trip.id, class);
            return Arc::from(Vec::new());
        }

        let plan = self.split_plan(trip, class);
        let ranked = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let mut found = CandidateSet::new(self.config.search_keep, self.config.max_variants);
            self.search_two_waypoints(trip, class, &plan, &mut found, &mut *rng);
            if found.len() < self.config.max_variants && !self.pool.is_empty() {
                self.search_one_waypoint(trip, class, &plan, &mut found, &mut *rng);
            }
            found.into_ranked()
        };

        let ranked = if ranked.is_empty() {
            self.baseline_candidate(trip, &plan).into_iter().collect()
        } else {
            ranked
        };

        let variants = finalize(&trip.id, class, ranked, self.config.max_variants);
        if variants.is_empty() {
            warn!(
                "No route variants for trip {} class {} (dest={})",
                trip.id, class, trip.destination
            );
            return Arc::from(variants);
        }

        for variant in &variants {
            // Failed installs stay in the returned set; the spawner may still pick them
            if self.installer.install(variant) == InstallOutcome::Failed {
                warn!("Variant {} kept despite failed installation", variant.id);
            }
        }

        let summary: Vec<String> = variants
            .iter()
            .map(|v| format!("{}:edges={}", v.label, v.edges.len()))
            .collect();
        info!(
            "Built {} long variants for {} class={} (dest={}) | {}",
            variants.len(),
            trip.id,
            class,
            trip.destination,
            summary.join(" | ")
        );

        self.store.cache_variants(key, variants)
    }

    /// Baseline query and prefix split for a trip
    pub fn split_plan(&self, trip: &TripDefinition, class: VehicleClass) -> SplitPlan {
        let baseline = self
            .path(&trip.origin, &trip.destination, class)
            .unwrap_or_default();
        SplitPlan::from_baseline(baseline, &trip.origin, self.config.prefix_edges)
    }

    fn search_two_waypoints(
        &self,
        trip: &TripDefinition,
        class: VehicleClass,
        plan: &SplitPlan,
        found: &mut CandidateSet,
        rng: &mut impl Rng,
    ) {
        for _ in 0..self.config.try_budget {
            let (Some(via1), Some(via2)) = (self.pool.sample(rng), self.pool.sample(rng)) else {
                return;
            };
            if via1 == via2
                || !self.usable_waypoint(via1, trip, plan, class)
                || !self.usable_waypoint(via2, trip, plan, class)
            {
                continue;
            }

            let Some(first) = self.segment(&plan.split, via1, class) else {
                continue;
            };
            let Some(middle) = self.segment(via1, via2, class) else {
                continue;
            };
            let Some(last) = self.segment(via2, &trip.destination, class) else {
                continue;
            };

            let combined = assemble(&plan.prefix, &[&first, &middle, &last]);
            if !is_acceptable(&combined, &trip.destination, &plan.prefix, self.config.min_edges) {
                continue;
            }

            let first_hop = combined.get(plan.prefix.len()).cloned();
            let score = self.score(&combined);
            found.offer(combined, score, first_hop, true);
        }
    }

    /// Relaxed search through one waypoint with a lower length bound
    fn search_one_waypoint(
        &self,
        trip: &TripDefinition,
        class: VehicleClass,
        plan: &SplitPlan,
        found: &mut CandidateSet,
        rng: &mut impl Rng,
    ) {
        for _ in 0..self.config.try_budget {
            let Some(via) = self.pool.sample(rng) else {
                return;
            };
            if !self.usable_waypoint(via, trip, plan, class) {
                continue;
            }

            let Some(first) = self.segment(&plan.split, via, class) else {
                continue;
            };
            let Some(last) = self.segment(via, &trip.destination, class) else {
                continue;
            };

            let combined = assemble(&plan.prefix, &[&first, &last]);
            if !is_acceptable(
                &combined,
                &trip.destination,
                &plan.prefix,
                self.config.fallback_min_edges,
            ) {
                continue;
            }

            let score = self.score(&combined);
            found.offer(combined, score, None, false);
            if found.len() >= self.config.fallback_stop {
                return;
            }
        }
    }

    fn baseline_candidate(&self, trip: &TripDefinition, plan: &SplitPlan) -> Option<Candidate> {
        if plan.baseline.last() != Some(&trip.destination) || has_repeats(&plan.baseline) {
            return None;
        }
        debug!("Falling back to baseline route for trip {}", trip.id);
        Some(Candidate {
            edges: plan.baseline.clone(),
            score: self.score(&plan.baseline),
            signature: signature(&plan.baseline),
        })
    }

    fn usable_waypoint(
        &self,
        via: &EdgeId,
        trip: &TripDefinition,
        plan: &SplitPlan,
        class: VehicleClass,
    ) -> bool {
        via.is_routable()
            && *via != plan.split
            && *via != trip.destination
            && self.engine.edge_admits(via, class)
    }

    /// Sub-path between two edges; a single-edge answer is not a segment
    fn segment(&self, from: &EdgeId, to: &EdgeId, class: VehicleClass) -> Option<Vec<EdgeId>> {
        self.path(from, to, class).filter(|edges| edges.len() >= 2)
    }

    /// Path query with internal edges removed; empty answers become `None`
    fn path(&self, from: &EdgeId, to: &EdgeId, class: VehicleClass) -> Option<Vec<EdgeId>> {
        let edges: Vec<EdgeId> = self
            .engine
            .shortest_path(from, to, class)?
            .into_iter()
            .filter(EdgeId::is_routable)
            .collect();
        (!edges.is_empty()).then_some(edges)
    }

    /// Total length plus a per-edge bonus
    pub fn score(&self, edges: &[EdgeId]) -> f64 {
        let length: f64 = edges
            .iter()
            .map(|edge| {
                self.engine
                    .edge_length(edge)
                    .filter(|len| len.is_finite() && *len > 0.0)
                    .unwrap_or(self.config.default_edge_length)
            })
            .sum();
        length + self.config.edge_count_bonus * edges.len() as f64
    }
}

/// Concatenate segments, dropping an edge equal to its predecessor
fn assemble(prefix: &[EdgeId], segments: &[&[EdgeId]]) -> Vec<EdgeId> {
    let mut combined: Vec<EdgeId> = Vec::with_capacity(
        prefix.len() + segments.iter().map(|s| s.len()).sum::<usize>(),
    );
    for segment in std::iter::once(prefix).chain(segments.iter().copied()) {
        for edge in segment {
            if combined.last() != Some(edge) {
                combined.push(edge.clone());
            }
        }
    }
    combined
}

fn is_acceptable(edges: &[EdgeId], destination: &EdgeId, prefix: &[EdgeId], min_edges: usize) -> bool {
    edges.last() == Some(destination)
        && edges.starts_with(prefix)
        && edges.len() >= min_edges
        && !has_repeats(edges)
}

fn has_repeats(edges: &[EdgeId]) -> bool {
    let mut seen = HashSet::with_capacity(edges.len());
    !edges.iter().all(|edge| seen.insert(edge))
}

fn signature(edges: &[EdgeId]) -> String {
    edges
        .iter()
        .map(EdgeId::as_str)
        .collect::<Vec<_>>()
        .join(SIGNATURE_SEPARATOR)
}

/// Rank, truncate, label and id the final variant set
fn finalize(trip: &TripId, class: VehicleClass, mut ranked: Vec<Candidate>, max_variants: usize) -> Vec<RouteVariant> {
    ranked.sort_by_key(|c| Reverse(OrderedFloat(c.score)));
    ranked
        .into_iter()
        .take(max_variants)
        .enumerate()
        .map(|(rank, candidate)| RouteVariant {
            id: variant_id(trip, class, &candidate.signature),
            label: variant_label(rank),
            edges: candidate.edges,
            score: candidate.score,
        })
        .collect()
}

/// `Variant A` for rank 0, `Variant B` for rank 1, ...
pub fn variant_label(rank: usize) -> String {
    match u8::try_from(rank).ok().filter(|r| *r < 26) {
        Some(r) => format!("Variant {}", char::from(b'A' + r)),
        None => format!("Variant {}", rank + 1),
    }
}

/// Stable route id derived from the edge signature
pub fn variant_id(trip: &TripId, class: VehicleClass, signature: &str) -> RouteId {
    let mut hasher = FxHasher::default();
    signature.hash(&mut hasher);
    RouteId::new(format!(
        "rt_{}_{}_{:016x}",
        sanitize(trip.as_str()),
        class,
        hasher.finish()
    ))
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(hop: &str, tail: &str) -> Vec<EdgeId> {
        ["start", hop, tail, "end"].into_iter().map(EdgeId::new).collect()
    }

    #[test]
    fn test_first_hop_diversity_after_four_hops() {
        let mut set = CandidateSet::new(10, 4);

        assert!(set.offer(route("h1", "a"), 10.0, Some(EdgeId::new("h1")), true));
        // Repeats are fine while fewer than four hops are represented
        assert!(set.offer(route("h1", "b"), 9.0, Some(EdgeId::new("h1")), true));
        for hop in ["h2", "h3", "h4"] {
            assert!(set.offer(route(hop, "a"), 8.0, Some(EdgeId::new(hop)), true));
        }
        assert_eq!(set.len(), 5);

        for hop in ["h1", "h2", "h3", "h4"] {
            assert!(
                !set.offer(route(hop, "c"), 50.0, Some(EdgeId::new(hop)), true),
                "{} is already represented",
                hop
            );
        }
        assert!(set.offer(route("h5", "a"), 7.0, Some(EdgeId::new("h5")), true));
        assert_eq!(set.len(), 6);

        // Exact duplicates are always rejected, diversity only when asked
        assert!(!set.offer(route("h5", "a"), 7.0, Some(EdgeId::new("h5")), false));
        assert!(set.offer(route("h1", "c"), 50.0, Some(EdgeId::new("h1")), false));

        let ranked = set.into_ranked();
        assert_eq!(ranked[0].edges, route("h1", "c"));
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_candidate_set_keeps_best_scores() {
        let mut set = CandidateSet::new(2, 4);
        for (tail, score) in [("a", 1.0), ("b", 3.0), ("c", 2.0)] {
            set.offer(route("h1", tail), score, None, true);
        }
        let scores: Vec<f64> = set.into_ranked().iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![3.0, 2.0]);
    }
}
