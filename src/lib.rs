//! Traffic Control Console
//!
//! Live control layer for an external traffic micro-simulation: long-route
//! variant synthesis, vehicle injection and signal override/adaptive control.

pub mod control;
