//! Dedicated simulation loop thread
//!
//! Step, control, sleep, measure, publish. Snapshots are owned values sent
//! over a channel so the display side never touches loop state.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use log::{debug, info};

use super::coordinator::ControlCoordinator;
use super::engine::SimulationEngine;
use super::metrics::{MetricsTracker, StepMetrics};
use super::types::{IntersectionId, SignalStatus};

/// Flags shared between the operator thread and the loop
#[derive(Debug)]
pub struct LoopControls {
    running: AtomicBool,
    started: AtomicBool,
    step_delay_ms: AtomicU64,
}

impl LoopControls {
    pub fn new(step_delay_ms: u64) -> Self {
        Self {
            running: AtomicBool::new(true),
            started: AtomicBool::new(false),
            step_delay_ms: AtomicU64::new(step_delay_ms.max(1)),
        }
    }

    /// Allow the loop to begin stepping
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Ask the loop to exit at the top of its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Clamped to at least 1 ms
    pub fn set_step_delay(&self, ms: u64) {
        self.step_delay_ms.store(ms.max(1), Ordering::Relaxed);
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms.load(Ordering::Relaxed))
    }
}

/// Immutable view of one completed step
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    pub step: u64,
    pub sim_time: f64,
    pub metrics: StepMetrics,
    pub signals: Vec<SignalStatus>,
    pub adaptive_enabled: bool,
}

pub struct SimulationLoop {
    engine: Arc<dyn SimulationEngine>,
    coordinator: Arc<ControlCoordinator>,
    controls: Arc<LoopControls>,
    intersections: Vec<IntersectionId>,
    metrics: MetricsTracker,
    snapshots: Sender<StepSnapshot>,
    idle_poll: Duration,
    max_steps: Option<u64>,
}

impl SimulationLoop {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        coordinator: Arc<ControlCoordinator>,
        controls: Arc<LoopControls>,
        intersections: Vec<IntersectionId>,
        metrics: MetricsTracker,
        snapshots: Sender<StepSnapshot>,
        idle_poll: Duration,
    ) -> Self {
        Self {
            engine,
            coordinator,
            controls,
            intersections,
            metrics,
            snapshots,
            idle_poll,
            max_steps: None,
        }
    }

    /// End the loop after `steps` steps
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Run on a named thread; the handle yields the number of steps taken
    pub fn spawn(self) -> io::Result<JoinHandle<Result<u64>>> {
        thread::Builder::new()
            .name("sim-loop".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) -> Result<u64> {
        let mut step: u64 = 0;
        info!("Simulation loop waiting for start");

        while self.controls.is_running() {
            if !self.controls.is_started() {
                thread::sleep(self.idle_poll);
                continue;
            }
            if self.max_steps.is_some_and(|max| step >= max) {
                break;
            }

            self.engine
                .step()
                .with_context(|| format!("Engine step {} failed", step + 1))?;
            step += 1;

            let now = self.engine.current_time();
            self.coordinator.apply_step(now);

            thread::sleep(self.controls.step_delay());

            let metrics = self.metrics.observe(now, self.engine.as_ref());
            let snapshot = StepSnapshot {
                step,
                sim_time: now,
                metrics,
                signals: self.coordinator.all_signal_status(&self.intersections),
                adaptive_enabled: self.coordinator.adaptive().is_enabled(),
            };

            // Nobody listening is fine; the loop keeps controlling signals
            if self.snapshots.send(snapshot).is_err() {
                debug!("Snapshot receiver gone at step {}", step);
            }
        }

        info!("Simulation loop finished after {} steps", step);
        Ok(step)
    }
}
