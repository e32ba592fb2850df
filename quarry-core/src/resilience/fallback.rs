//! Ordered search provider fallback.
//!
//! Providers are tried in the order given. A provider-level permanent failure
//! advances the chain for the rest of the run; it never moves backwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

use crate::search::SearchProvider;

pub struct ProviderChain {
    providers: Vec<Arc<dyn SearchProvider>>,
    active: AtomicUsize,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self {
            providers,
            active: AtomicUsize::new(0),
        }
    }

    /// Index and handle of the provider currently in use.
    pub fn active(&self) -> Option<(usize, Arc<dyn SearchProvider>)> {
        let index = self.active.load(Ordering::Acquire);
        self.providers.get(index).map(|p| (index, Arc::clone(p)))
    }

    pub fn active_name(&self) -> Option<String> {
        self.active().map(|(_, p)| p.name().to_string())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.active.load(Ordering::Acquire) >= self.providers.len()
    }

    /// Move past the provider at `failed`.
    ///
    /// Concurrent queries that saw the same provider fail advance the chain
    /// only once.
    pub fn advance_from(&self, failed: usize) {
        if self
            .active
            .compare_exchange(failed, failed + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let next = self.providers.get(failed + 1).map(|p| p.name().to_string());
            warn!(
                failed_provider = self.providers.get(failed).map(|p| p.name()).unwrap_or("?"),
                next_provider = next.as_deref().unwrap_or("none"),
                "Search provider failed permanently; advancing to next provider"
            );
        }
    }
}
