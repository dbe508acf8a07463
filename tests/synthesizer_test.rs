mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use traffic_console::control::{
    grid_edge, variant_id, variant_label, EdgeId, InstallOutcome, RouteInstaller, RouteVariant,
    SandboxEngine, SessionStore, SimulationEngine, SplitPlan, SynthesisConfig, TripDefinition,
    TripId, VariantSynthesizer, VehicleClass, ViaPool,
};

use common::{loop_network, loop_network_of, FlakyEngine};

fn synthesizer_for(
    engine: Arc<dyn SimulationEngine>,
    trips: &[TripDefinition],
    store: Arc<SessionStore>,
    seed: u64,
) -> VariantSynthesizer {
    let mut pool_rng = StdRng::seed_from_u64(seed);
    let pool = ViaPool::build(trips, engine.network_edges(), &mut pool_rng);
    VariantSynthesizer::new(
        engine,
        store,
        pool,
        SynthesisConfig::default(),
        StdRng::seed_from_u64(seed.wrapping_add(1)),
    )
}

fn edges(names: &[&str]) -> Vec<EdgeId> {
    names.iter().map(|n| EdgeId::new(*n)).collect()
}

fn diagonal_trip() -> TripDefinition {
    TripDefinition::new("diagonal", grid_edge("J0_0", "J1_0"), grid_edge("J3_4", "J4_4"))
}

#[test]
fn test_loop_network_yields_sixteen_edge_variant() {
    let (engine, trip) = loop_network();
    let store = Arc::new(SessionStore::new());
    let synth = synthesizer_for(engine.clone(), &[trip.clone()], store, 7);

    let variants = synth.synthesize(&trip, VehicleClass::Car);

    assert_eq!(variants.len(), 1, "Only one distinct long route exists");
    let variant = &variants[0];
    let mut expected = edges(&["E1", "E2"]);
    expected.extend((1..=13).map(|i| EdgeId::new(format!("F{}", i))));
    expected.push(EdgeId::new("E9"));
    assert_eq!(variant.edges, expected);
    assert!(variant.len() >= 14);
    assert_eq!(variant.last_edge(), Some(&EdgeId::new("E9")));
    assert_eq!(variant.label, "Variant A");

    // 3 x 50m + 13 x 20m plus 2.0 per edge
    assert!((variant.score - (410.0 + 32.0)).abs() < 1e-9);

    assert_eq!(engine.route_edges(&variant.id), Some(variant.edges.clone()));
}

#[test]
fn test_short_loop_needs_relaxed_search() {
    // E1 E2 F1..F10 E9 is 13 edges, too short for the two-waypoint search
    let (engine, trip) = loop_network_of(10);
    let store = Arc::new(SessionStore::new());
    let synth = synthesizer_for(engine.clone(), &[trip.clone()], store, 7);
    let plan = synth.split_plan(&trip, VehicleClass::Car);
    assert_eq!(plan.baseline, edges(&["E1", "E2", "E9"]));

    let variants = synth.synthesize(&trip, VehicleClass::Car);

    assert_eq!(variants.len(), 1);
    let variant = &variants[0];
    assert_eq!(variant.len(), 13);
    assert!(variant.len() >= SynthesisConfig::default().fallback_min_edges);
    assert!(variant.len() < SynthesisConfig::default().min_edges);
    let mut expected = edges(&["E1", "E2"]);
    expected.extend((1..=10).map(|i| EdgeId::new(format!("F{}", i))));
    expected.push(EdgeId::new("E9"));
    assert_eq!(variant.edges, expected);
}

#[test]
fn test_split_plan_preserves_prefix() {
    let baseline = edges(&["a", "b", "c", "d", "e", "f", "g", "h"]);
    let plan = SplitPlan::from_baseline(baseline.clone(), &EdgeId::new("a"), 4);
    assert_eq!(plan.prefix, edges(&["a", "b", "c", "d"]));
    assert_eq!(plan.split, EdgeId::new("d"));

    // Short baselines keep at least three edges after the split
    let short = SplitPlan::from_baseline(edges(&["a", "b", "c", "d"]), &EdgeId::new("a"), 4);
    assert_eq!(short.prefix, edges(&["a", "b"]));
    assert_eq!(short.split, EdgeId::new("b"));

    let none = SplitPlan::from_baseline(Vec::new(), &EdgeId::new("origin"), 4);
    assert!(none.prefix.is_empty());
    assert_eq!(none.split, EdgeId::new("origin"));
}

fn assert_variant_set_invariants(variants: &[RouteVariant], trip: &TripDefinition, prefix: &[EdgeId]) {
    assert!(
        (1..=4).contains(&variants.len()),
        "Expected 1..=4 variants, got {}",
        variants.len()
    );

    let mut ids = HashSet::new();
    for (rank, variant) in variants.iter().enumerate() {
        assert_eq!(variant.last_edge(), Some(&trip.destination));
        assert!(
            variant.edges.starts_with(prefix),
            "{} does not keep the prefix",
            variant.label
        );
        let unique: HashSet<&EdgeId> = variant.edges.iter().collect();
        assert_eq!(unique.len(), variant.len(), "{} repeats an edge", variant.label);
        assert_eq!(variant.label, variant_label(rank));
        assert!(ids.insert(variant.id.clone()), "Duplicate variant id");
    }

    for pair in variants.windows(2) {
        assert!(pair[0].score >= pair[1].score, "Variants not ranked by score");
    }
}

#[test]
fn test_grid_variants_satisfy_invariants() {
    let engine = Arc::new(SandboxEngine::grid(5, 5, 100.0, 1.0));
    let trip = diagonal_trip();
    let store = Arc::new(SessionStore::new());

    for seed in [1, 2, 3] {
        let store = Arc::new(SessionStore::new());
        let synth = synthesizer_for(engine.clone(), &[trip.clone()], store, seed);
        let plan = synth.split_plan(&trip, VehicleClass::Car);
        assert!(!plan.prefix.is_empty());

        let variants = synth.synthesize(&trip, VehicleClass::Car);
        assert_eq!(variants.len(), 4, "Seed {} should fill the variant set", seed);
        assert_variant_set_invariants(&variants, &trip, &plan.prefix);
    }

    let synth = synthesizer_for(engine.clone(), &[trip.clone()], store.clone(), 42);
    let variants = synth.synthesize(&trip, VehicleClass::Car);
    for variant in variants.iter() {
        assert!(store.is_installed(&variant.id));
        assert_eq!(engine.route_edges(&variant.id), Some(variant.edges.clone()));
    }
}

#[test]
fn test_variants_are_cached_per_scenario() {
    let engine = Arc::new(SandboxEngine::grid(4, 4, 100.0, 1.0));
    let trip = TripDefinition::new("cached", grid_edge("J0_0", "J1_0"), grid_edge("J2_3", "J3_3"));
    let store = Arc::new(SessionStore::new());
    let synth = synthesizer_for(engine.clone(), &[trip.clone()], store.clone(), 5);

    let first = synth.synthesize(&trip, VehicleClass::Car);
    let routes_after_first = engine.route_count();
    let second = synth.synthesize(&trip, VehicleClass::Car);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.route_count(), routes_after_first);

    // Another class is a separate scenario
    synth.synthesize(&trip, VehicleClass::Truck);
    assert_eq!(store.cached_scenarios(), 2);
}

#[test]
fn test_failed_install_keeps_variants() {
    let (sandbox, trip) = loop_network();
    let flaky = Arc::new(FlakyEngine::new(sandbox.clone()));
    FlakyEngine::set(&flaky.fail_register, true);
    let store = Arc::new(SessionStore::new());
    let synth = synthesizer_for(flaky.clone(), &[trip.clone()], store.clone(), 9);

    let variants = synth.synthesize(&trip, VehicleClass::Car);

    assert_eq!(variants.len(), 1);
    assert_eq!(sandbox.route_count(), 0);
    assert!(!store.is_installed(&variants[0].id));
}

#[test]
fn test_inadmissible_class_yields_no_variants() {
    let engine = SandboxEngine::new(1.0);
    engine.add_edge_restricted("bus_in", "A", "B", 50.0, &[VehicleClass::Bus]);
    engine.add_edge("mid", "B", "C", 50.0);
    engine.add_edge("out", "C", "D", 50.0);
    let engine = Arc::new(engine);
    let trip = TripDefinition::new("bus_only", "bus_in", "out");
    let store = Arc::new(SessionStore::new());
    let synth = synthesizer_for(engine, &[trip.clone()], store.clone(), 3);

    assert!(synth.synthesize(&trip, VehicleClass::Car).is_empty());
    assert_eq!(store.cached_scenarios(), 0, "Empty results are not cached");

    // Too short for a long variant, so the bus falls back to the baseline
    let bus = synth.synthesize(&trip, VehicleClass::Bus);
    assert_eq!(bus.len(), 1);
    assert_eq!(bus[0].edges, edges(&["bus_in", "mid", "out"]));
}

#[test]
fn test_installer_registers_each_id_once() {
    let (sandbox, _) = loop_network();
    let flaky = Arc::new(FlakyEngine::new(sandbox.clone()));
    let store = Arc::new(SessionStore::new());
    let installer = RouteInstaller::new(flaky.clone(), store.clone());
    let variant = RouteVariant {
        id: variant_id(&TripId::new("t"), VehicleClass::Car, "E1|E2|E9"),
        label: variant_label(0),
        edges: edges(&["E1", "E2", "E9"]),
        score: 1.0,
    };

    flaky.fail_register.store(true, Ordering::SeqCst);
    assert_eq!(installer.install(&variant), InstallOutcome::Failed);
    assert!(!store.is_installed(&variant.id));

    flaky.fail_register.store(false, Ordering::SeqCst);
    assert_eq!(installer.install(&variant), InstallOutcome::Installed);
    assert_eq!(installer.install(&variant), InstallOutcome::AlreadyInstalled);
    assert_eq!(store.installed_count(), 1);
    assert_eq!(sandbox.route_count(), 1);
}

#[test]
fn test_variant_ids_and_labels() {
    let trip = TripId::new("trip-7");
    let a = variant_id(&trip, VehicleClass::Car, "x|y|z");
    let b = variant_id(&trip, VehicleClass::Car, "x|y|z");
    let c = variant_id(&trip, VehicleClass::Car, "x|y|w");

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.as_str().starts_with("rt_trip_7_car_"));
    assert_eq!(variant_label(0), "Variant A");
    assert_eq!(variant_label(3), "Variant D");
}

#[test]
fn test_via_pool_skips_internal_edges() {
    let trip = TripDefinition::new("t", "origin", "dest").with_via(vec![EdgeId::new("via")]);
    let network = vec![
        EdgeId::new(":J1_0"),
        EdgeId::new("  "),
        EdgeId::new("road"),
        EdgeId::new(" road"),
        EdgeId::new("dest "),
        EdgeId::new("origin"),
    ];
    let mut rng = StdRng::seed_from_u64(1);
    let pool = ViaPool::build(&[trip], network, &mut rng);

    assert_eq!(pool.len(), 4);
    for edge in ["origin", "dest", "via", "road"] {
        let copies = pool.edges().iter().filter(|e| e.as_str() == edge).count();
        assert_eq!(copies, 1, "{} should appear once", edge);
    }
    assert!(!pool.contains(&EdgeId::new(":J1_0")));
}
