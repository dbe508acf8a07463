//! At-most-once route registration with the engine

use std::sync::Arc;

use log::{debug, warn};

use super::engine::SimulationEngine;
use super::store::SessionStore;
use super::types::RouteVariant;

/// Result of an install attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
    Failed,
}

/// Registers variants with the engine, idempotent by route id
pub struct RouteInstaller {
    engine: Arc<dyn SimulationEngine>,
    store: Arc<SessionStore>,
}

impl RouteInstaller {
    pub fn new(engine: Arc<dyn SimulationEngine>, store: Arc<SessionStore>) -> Self {
        Self { engine, store }
    }

    /// Register a variant unless its id is already installed
    ///
    /// Failures are logged and reported, never raised. A failed id stays
    /// unregistered so a later call may try again.
    pub fn install(&self, variant: &RouteVariant) -> InstallOutcome {
        self.store.with_installed(|installed| {
            if installed.contains(&variant.id) {
                return InstallOutcome::AlreadyInstalled;
            }

            match self.engine.register_route(&variant.id, &variant.edges) {
                Ok(()) => {
                    installed.insert(variant.id.clone());
                    debug!(
                        "Installed route {} ({}, {} edges)",
                        variant.id,
                        variant.label,
                        variant.edges.len()
                    );
                    InstallOutcome::Installed
                }
                Err(err) => {
                    warn!(
                        "Route registration failed for {} ({}): {}",
                        variant.id, variant.label, err
                    );
                    InstallOutcome::Failed
                }
            }
        })
    }
}
