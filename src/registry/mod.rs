//! Named breaker registry.
//!
//! # Responsibilities
//! - Map names to independent breaker instances
//! - Build the configured breakers at startup
//!
//! # Design Decisions
//! - DashMap for concurrent lookups without a global lock
//! - Breakers are handed out as `Arc`; removing one does not affect holders
//! - No state is shared between entries

use dashmap::DashMap;
use std::sync::Arc;

use crate::breaker::{Breaker, CircuitBreaker};
use crate::config::Config;

/// Concurrent name → breaker map.
#[derive(Debug)]
pub struct BreakerRegistry<B = Breaker> {
    breakers: DashMap<String, Arc<B>>,
}

impl<B: CircuitBreaker> BreakerRegistry<B> {
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<B>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert under the breaker's own name, returning any breaker it replaced.
    pub fn set(&self, breaker: B) -> Option<Arc<B>> {
        let name = breaker.name().to_string();
        tracing::debug!(breaker = %name, "Breaker registered");
        self.breakers.insert(name, Arc::new(breaker))
    }

    /// Look up `name`, creating the breaker with `make` if absent.
    pub fn get_or_insert_with(&self, name: &str, make: impl FnOnce() -> B) -> Arc<B> {
        let entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(make()));
        Arc::clone(entry.value())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<B>> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl BreakerRegistry<Breaker> {
    /// Build every breaker section of an already validated config.
    pub fn from_config(config: &Config) -> Self {
        let registry = Self::new();
        for section in &config.breakers {
            registry.set(Breaker::from_config(section));
        }
        tracing::info!(breakers = registry.len(), "Breaker registry built");
        registry
    }
}

impl<B: CircuitBreaker> Default for BreakerRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}
