//! Session-scoped caches shared between the operator and loop threads

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::types::{RouteId, RouteVariant, ScenarioKey};

/// Variant cache and installed-route registry of one control session
///
/// Injected into the synthesizer and installer instead of living in
/// global state, so two sessions never see each other's routes.
#[derive(Debug, Default)]
pub struct SessionStore {
    variants: RwLock<HashMap<ScenarioKey, Arc<[RouteVariant]>>>,
    installed_routes: Mutex<HashSet<RouteId>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached variant set for a scenario
    pub fn variants(&self, key: &ScenarioKey) -> Option<Arc<[RouteVariant]>> {
        self.variants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Cache a variant set; the first set stored for a key wins
    pub fn cache_variants(&self, key: ScenarioKey, variants: Vec<RouteVariant>) -> Arc<[RouteVariant]> {
        let mut guard = self.variants.write().unwrap_or_else(PoisonError::into_inner);
        guard.entry(key).or_insert_with(|| Arc::from(variants)).clone()
    }

    pub fn cached_scenarios(&self) -> usize {
        self.variants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_installed(&self, id: &RouteId) -> bool {
        self.installed_routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Run `f` with exclusive access to the installed-route set
    ///
    /// The lock is held for the whole closure so check-and-register is atomic.
    pub fn with_installed<R>(&self, f: impl FnOnce(&mut HashSet<RouteId>) -> R) -> R {
        let mut guard = self
            .installed_routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn installed_count(&self) -> usize {
        self.installed_routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
