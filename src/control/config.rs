//! Tunables for synthesis, signal control and the loop
//!
//! Defaults are exported as constants so callers and tests can refer to them.

/// Random waypoint pairs tried per synthesis
pub const SYNTHESIS_TRY_BUDGET: usize = 800;

/// Minimum edge count of an accepted two-waypoint variant
pub const LONG_MIN_EDGES: usize = 14;

/// Baseline edges preserved as the shared prefix of every variant
pub const PREFIX_EDGES_FOR_SPLIT: usize = 4;

/// Candidates retained while searching
pub const SEARCH_KEEP: usize = 10;

/// Single-waypoint fallback stops once this many candidates exist
pub const FALLBACK_STOP: usize = 8;

/// Variants retained per scenario
pub const MAX_VARIANTS: usize = 4;

/// Score bonus per edge, favoring longer and more dispersed routes
pub const EDGE_COUNT_BONUS: f64 = 2.0;

/// Length assumed for edges the engine cannot measure
pub const DEFAULT_EDGE_LENGTH: f64 = 5.0;

/// Share of spawned vehicles per ranked variant
pub const BRANCH_WEIGHTS: [f64; 4] = [0.30, 0.40, 0.20, 0.10];

/// Adaptive red hold in sim seconds
pub const STOP_DURATION: f64 = 6.0;

/// Adaptive green hold in sim seconds
pub const GO_DURATION: f64 = 12.0;

/// Default wall-clock delay between steps
pub const DEFAULT_STEP_DELAY_MS: u64 = 50;

/// Poll interval while the loop waits for the start signal
pub const IDLE_POLL_MS: u64 = 50;

/// Sliding window for the throughput metric
pub const THROUGHPUT_WINDOW_SECS: f64 = 300.0;

/// Variant search parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    pub try_budget: usize,
    pub min_edges: usize,
    pub fallback_min_edges: usize,
    pub prefix_edges: usize,
    pub search_keep: usize,
    pub fallback_stop: usize,
    pub max_variants: usize,
    pub edge_count_bonus: f64,
    pub default_edge_length: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            try_budget: SYNTHESIS_TRY_BUDGET,
            min_edges: LONG_MIN_EDGES,
            fallback_min_edges: LONG_MIN_EDGES.saturating_sub(2).max(10),
            prefix_edges: PREFIX_EDGES_FOR_SPLIT,
            search_keep: SEARCH_KEEP,
            fallback_stop: FALLBACK_STOP,
            max_variants: MAX_VARIANTS,
            edge_count_bonus: EDGE_COUNT_BONUS,
            default_edge_length: DEFAULT_EDGE_LENGTH,
        }
    }
}

/// Adaptive hold durations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalTiming {
    pub stop_secs: f64,
    pub go_secs: f64,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            stop_secs: STOP_DURATION,
            go_secs: GO_DURATION,
        }
    }
}

/// Everything a control session needs to be configured with
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub synthesis: SynthesisConfig,
    pub timing: SignalTiming,
    pub branch_weights: Vec<f64>,
    pub step_delay_ms: u64,
    pub idle_poll_ms: u64,
    pub throughput_window_secs: f64,
    /// Seed for reproducible sessions; `None` draws from the OS
    pub seed: Option<u64>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            synthesis: SynthesisConfig::default(),
            timing: SignalTiming::default(),
            branch_weights: BRANCH_WEIGHTS.to_vec(),
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            idle_poll_ms: IDLE_POLL_MS,
            throughput_window_secs: THROUGHPUT_WINDOW_SECS,
            seed: None,
        }
    }
}

impl ConsoleConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
