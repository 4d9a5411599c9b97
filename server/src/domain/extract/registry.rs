//! Extractor registry
//!
//! Built once through [`RegistryBuilder`] before the first event is
//! dispatched, then shared read-only behind an `Arc`. No locking.
//!
//! ## Selection order
//!
//! For one event the registry returns, per phase (universal first):
//! 1. extractors registered for the event's kind, in registration order
//! 2. generic extractors whose `can_process` accepts the event, in
//!    registration order, skipping any already selected in step 1
//!
//! Identity is the extractor `name()`, so an extractor registered both
//! generically and for a kind runs once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::data::types::Event;

use super::extractor::Extractor;

/// Collects extractors before the registry is frozen
#[derive(Default)]
pub struct RegistryBuilder {
    generic: Vec<Arc<dyn Extractor>>,
    by_kind: HashMap<String, Vec<Arc<dyn Extractor>>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the generic list, matched through `can_process`
    pub fn register(mut self, extractor: Arc<dyn Extractor>) -> Self {
        if self.generic.iter().any(|e| e.name() == extractor.name()) {
            tracing::debug!(extractor = extractor.name(), "Duplicate generic registration ignored");
            return self;
        }
        self.generic.push(extractor);
        self
    }

    /// Add to the kind-indexed lists, matched on `event_type` alone
    pub fn register_for_event_kind(
        mut self,
        kind: impl Into<String>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        let list = self.by_kind.entry(kind.into()).or_default();
        if !list.iter().any(|e| e.name() == extractor.name()) {
            list.push(extractor);
        }
        self
    }

    /// Register for several kinds at once
    pub fn register_for_event_kinds(
        self,
        kinds: &[&str],
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        kinds.iter().fold(self, |builder, kind| {
            builder.register_for_event_kind(*kind, Arc::clone(&extractor))
        })
    }

    pub fn build(self) -> ExtractorRegistry {
        let registry = ExtractorRegistry {
            generic: self.generic,
            by_kind: self.by_kind,
        };
        tracing::debug!(
            extractors = registry.len(),
            kinds = registry.by_kind.len(),
            "Extractor registry built"
        );
        registry
    }
}

/// Read-only index of extractors by event kind and by capability
pub struct ExtractorRegistry {
    generic: Vec<Arc<dyn Extractor>>,
    by_kind: HashMap<String, Vec<Arc<dyn Extractor>>>,
}

impl ExtractorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Extractors applicable to `event`, in execution order
    pub fn extractors_for_event(&self, event: &Event) -> Vec<Arc<dyn Extractor>> {
        let mut selected: Vec<Arc<dyn Extractor>> = self
            .by_kind
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        let mut seen: HashSet<&'static str> = selected.iter().map(|e| e.name()).collect();

        for extractor in &self.generic {
            if !seen.contains(extractor.name()) && extractor.can_process(event) {
                seen.insert(extractor.name());
                selected.push(Arc::clone(extractor));
            }
        }

        // Stable: keeps the order above inside each phase
        selected.sort_by_key(|e| e.phase());
        selected
    }

    /// Look up any registered extractor by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Extractor>> {
        self.generic
            .iter()
            .chain(self.by_kind.values().flatten())
            .find(|e| e.name() == name)
            .cloned()
    }

    /// Distinct extractor names, generic ones first
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        let mut kinds: Vec<&String> = self.by_kind.keys().collect();
        kinds.sort();
        let kind_indexed = kinds.into_iter().flat_map(|k| &self.by_kind[k]);
        for extractor in self.generic.iter().chain(kind_indexed) {
            if !names.contains(&extractor.name()) {
                names.push(extractor.name());
            }
        }
        names
    }

    /// Number of distinct extractors
    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
