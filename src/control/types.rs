//! Core types for the control console
//!
//! Identifiers are plain string wrappers because every id is owned by the
//! simulation engine; the console never invents edge or intersection names.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// A road edge in the engine's network
    EdgeId
);
string_id!(
    /// A single lane of an edge
    LaneId
);
string_id!(
    /// A signalized intersection
    IntersectionId
);
string_id!(
    /// A route registered with the engine
    RouteId
);
string_id!(
    /// A vehicle created in the engine
    VehicleId
);
string_id!(
    /// A signal program known to the engine
    ProgramId
);
string_id!(
    /// A trip definition loaded at startup
    TripId
);

impl EdgeId {
    /// Junction-internal edges carry a leading ':' and are never waypoints
    pub fn is_internal(&self) -> bool {
        self.0.starts_with(':')
    }

    /// Blank or internal edges are unusable for route synthesis
    pub fn is_routable(&self) -> bool {
        !self.0.trim().is_empty() && !self.is_internal()
    }
}

impl ProgramId {
    /// Program the engine falls back to when no original could be read
    pub fn fallback() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

/// Program id used when the engine reports none
pub const DEFAULT_PROGRAM: &str = "0";

/// Vehicle class used for admissibility checks and path queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VehicleClass {
    Car,
    Truck,
    Bus,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 3] = [VehicleClass::Car, VehicleClass::Truck, VehicleClass::Bus];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Truck => "truck",
            VehicleClass::Bus => "bus",
        }
    }

    /// Name of the lane permission class the engine checks against
    pub fn permission_class(&self) -> &'static str {
        match self {
            VehicleClass::Car => "passenger",
            VehicleClass::Truck => "truck",
            VehicleClass::Bus => "bus",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown vehicle class '{0}' (expected car, truck or bus)")]
pub struct UnknownVehicleClass(pub String);

impl FromStr for VehicleClass {
    type Err = UnknownVehicleClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" | "passenger" => Ok(VehicleClass::Car),
            "truck" => Ok(VehicleClass::Truck),
            "bus" => Ok(VehicleClass::Bus),
            _ => Err(UnknownVehicleClass(s.to_string())),
        }
    }
}

/// Static origin/destination definition of a scenario
#[derive(Debug, Clone, PartialEq)]
pub struct TripDefinition {
    pub id: TripId,
    pub origin: EdgeId,
    pub destination: EdgeId,
    /// Extra edges the trip file names; they only seed the via pool
    pub required_via: Vec<EdgeId>,
}

impl TripDefinition {
    pub fn new(id: impl Into<String>, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: TripId::new(id),
            origin: EdgeId::new(origin),
            destination: EdgeId::new(destination),
            required_via: Vec::new(),
        }
    }

    pub fn with_via(mut self, via: impl IntoIterator<Item = EdgeId>) -> Self {
        self.required_via.extend(via);
        self
    }
}

/// A synthesized long-form route for one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct RouteVariant {
    pub id: RouteId,
    pub label: String,
    pub edges: Vec<EdgeId>,
    pub score: f64,
}

impl RouteVariant {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn last_edge(&self) -> Option<&EdgeId> {
        self.edges.last()
    }
}

/// Cache and dedup key for synthesized variants
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScenarioKey {
    pub trip: TripId,
    pub class: VehicleClass,
}

impl ScenarioKey {
    pub fn new(trip: TripId, class: VehicleClass) -> Self {
        Self { trip, class }
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.trip, self.class)
    }
}

/// Operator request to inject vehicles
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSpawnRequest {
    pub class: VehicleClass,
    pub trip: TripId,
    pub count: u32,
}

/// Uniform color written to every indicator of an intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalColor {
    Red,
    Green,
}

impl SignalColor {
    pub fn indicator(&self) -> char {
        match self {
            SignalColor::Red => 'r',
            SignalColor::Green => 'G',
        }
    }

    /// Build an indicator string of the same width as `current`
    pub fn uniform_state(&self, current: &str) -> String {
        std::iter::repeat(self.indicator())
            .take(current.chars().count())
            .collect()
    }
}

/// Operator-forced signal mode of one intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrideMode {
    #[default]
    None,
    ForceRed,
    ForceGreen,
}

impl OverrideMode {
    pub fn color(&self) -> Option<SignalColor> {
        match self {
            OverrideMode::None => None,
            OverrideMode::ForceRed => Some(SignalColor::Red),
            OverrideMode::ForceGreen => Some(SignalColor::Green),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, OverrideMode::None)
    }
}

impl From<SignalColor> for OverrideMode {
    fn from(color: SignalColor) -> Self {
        match color {
            SignalColor::Red => OverrideMode::ForceRed,
            SignalColor::Green => OverrideMode::ForceGreen,
        }
    }
}

/// Adaptive controller phase; hold phases carry their deadline in sim seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AdaptivePhase {
    #[default]
    Auto,
    HoldRed { until: f64 },
    HoldGreen { until: f64 },
}

impl AdaptivePhase {
    pub fn deadline(&self) -> Option<f64> {
        match self {
            AdaptivePhase::Auto => None,
            AdaptivePhase::HoldRed { until } | AdaptivePhase::HoldGreen { until } => Some(*until),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, AdaptivePhase::Auto)
    }
}

/// Intersection entry offered to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntersectionEntry {
    pub id: IntersectionId,
    pub display_tag: String,
}

/// Structured signal status; formatting is left to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct SignalStatus {
    pub intersection_id: IntersectionId,
    /// `None` when the engine read failed
    pub indicator: Option<String>,
    pub override_mode: OverrideMode,
    pub adaptive_enabled: bool,
    pub adaptive_phase: AdaptivePhase,
}
