use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::warn;
use traffic_console::control::{
    grid_edge, ConsoleConfig, IntersectionId, SandboxEngine, StepSnapshot, TrafficConsole,
    TripDefinition, VehicleClass, VehicleSpawnRequest,
};

#[derive(Parser)]
#[command(name = "traffic_console")]
#[command(about = "Headless traffic control console on a sandbox grid")]
struct Cli {
    /// Number of simulation steps to run
    #[arg(long, default_value = "300")]
    steps: u64,

    /// Wall-clock delay between steps in milliseconds
    #[arg(long, default_value = "1")]
    delay_ms: u64,

    /// Seed for reproducible route synthesis and spawning
    #[arg(long)]
    seed: Option<u64>,

    /// Vehicles to spawn per scenario
    #[arg(long, default_value = "20")]
    vehicles: u32,

    /// Vehicle class to spawn (car, truck, bus)
    #[arg(long, default_value = "car")]
    class: VehicleClass,

    /// Enable adaptive signal control
    #[arg(long)]
    adaptive: bool,

    /// Force these intersections red for the whole run
    #[arg(long = "force-red")]
    force_red: Vec<String>,

    /// Grid size (junctions per side)
    #[arg(long, default_value = "5")]
    grid: usize,

    /// Print a summary every N steps
    #[arg(long, default_value = "50")]
    report_every: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,traffic_console=info"),
    )
    .init();

    let cli = Cli::parse();
    run_headless(&cli)
}

/// Corner-to-corner trips across the grid
fn demo_trips(size: usize) -> Vec<TripDefinition> {
    let last = size - 1;
    let j = |c: usize, r: usize| format!("J{}_{}", c, r);
    vec![
        TripDefinition::new(
            "diagonal",
            grid_edge(&j(0, 0), &j(1, 0)),
            grid_edge(&j(last - 1, last), &j(last, last)),
        ),
        TripDefinition::new(
            "anti_diagonal",
            grid_edge(&j(0, last), &j(0, last - 1)),
            grid_edge(&j(last, 1), &j(last, 0)),
        ),
        TripDefinition::new(
            "crosstown",
            grid_edge(&j(0, size / 2), &j(1, size / 2)),
            grid_edge(&j(last - 1, size / 2), &j(last, size / 2)),
        ),
    ]
}

/// Run the console in headless mode (no display layer)
fn run_headless(cli: &Cli) -> Result<()> {
    let size = cli.grid.max(3);
    println!("Running traffic console in headless mode...");
    println!(
        "Grid: {}x{}, Steps: {}, Delay: {}ms",
        size, size, cli.steps, cli.delay_ms
    );
    println!();

    let engine = Arc::new(SandboxEngine::grid(size, size, 100.0, 1.0));
    let config = ConsoleConfig {
        step_delay_ms: cli.delay_ms,
        seed: cli.seed,
        ..ConsoleConfig::default()
    };
    let console = TrafficConsole::new(engine, demo_trips(size), config);

    if console.prepare(&HashMap::new()) == 0 {
        bail!("No routable scenarios in the demo network");
    }

    println!("Scenarios:");
    for name in console.scenario_names() {
        let Some(scenario) = console.scenario(&name) else {
            continue;
        };
        let variants = console
            .variants(&scenario.trip.id, cli.class)
            .unwrap_or_else(|| Arc::from(Vec::new()));
        println!("  {} ({}): {} variants", name, scenario.trip.id, variants.len());
        for variant in variants.iter() {
            println!(
                "    {} {} edges, score {:.1}",
                variant.label,
                variant.len(),
                variant.score
            );
        }
    }
    println!("Signals: {}", console.intersections().len());
    println!();

    let (tx, rx) = crossbeam_channel::unbounded::<StepSnapshot>();
    let handle = console
        .simulation_loop(tx)
        .with_max_steps(cli.steps)
        .spawn()
        .context("Failed to start simulation loop thread")?;

    console.set_adaptive_enabled(cli.adaptive);
    for id in &cli.force_red {
        if let Err(err) = console.force_red(&IntersectionId::new(id.as_str())) {
            warn!("Could not force {} red: {:#}", id, err);
        }
    }

    let mut spawned = 0;
    for name in console.scenario_names() {
        let Some(scenario) = console.scenario(&name) else {
            continue;
        };
        let request = VehicleSpawnRequest {
            class: cli.class,
            trip: scenario.trip.id.clone(),
            count: cli.vehicles,
        };
        match console.spawn(&request) {
            Ok(report) => spawned += report.created_count(),
            Err(err) => warn!("Spawn on {} rejected: {}", name, err),
        }
    }

    console.start();

    let report_every = cli.report_every.max(1);
    let mut arrived = 0;
    let mut last: Option<StepSnapshot> = None;
    for snapshot in rx.iter() {
        arrived += snapshot.metrics.arrivals;
        if snapshot.step % report_every == 0 {
            print_snapshot(&snapshot);
        }
        last = Some(snapshot);
    }

    let steps = handle
        .join()
        .map_err(|_| anyhow!("Simulation loop thread panicked"))??;
    let reset = console.reset_all_signals();
    console.set_adaptive_enabled(false);

    println!("=== SIMULATION COMPLETE ===");
    println!("Steps run: {}", steps);
    println!("Vehicles spawned: {}", spawned);
    println!("Vehicles arrived: {}", arrived);
    if let Some(snapshot) = last {
        println!("Vehicles active: {}", snapshot.metrics.active_vehicles);
    }
    println!(
        "Signals reset: restored={}, failed={}",
        reset.restored, reset.failed
    );
    Ok(())
}

fn print_snapshot(snapshot: &StepSnapshot) {
    let metrics = &snapshot.metrics;
    let wait = metrics
        .avg_wait_secs
        .map(|w| format!("{:.1}s", w))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "--- Step {} ({:.1}s simulated time) ---",
        snapshot.step, snapshot.sim_time
    );
    println!(
        "Active: {}  Stopped: {}  Congestion: {:.2}  Avg wait: {}  Throughput: {:.0} veh/h",
        metrics.active_vehicles,
        metrics.stopped_vehicles,
        metrics.congestion_index,
        wait,
        metrics.throughput_vph
    );
    let overridden = snapshot
        .signals
        .iter()
        .filter(|s| s.override_mode.is_active())
        .count();
    let holding = snapshot
        .signals
        .iter()
        .filter(|s| !s.adaptive_phase.is_auto())
        .count();
    println!(
        "Signals: {} overridden, {} under adaptive hold (adaptive {})",
        overridden,
        holding,
        if snapshot.adaptive_enabled { "on" } else { "off" }
    );
    println!();
}
