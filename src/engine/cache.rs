//! Per-identity model cache
//!
//! Keeps up to `max_entries` loaded models resident, keyed by the acting
//! identity. Every resolve, hit or miss, is followed by an eviction pass
//! that drops the least-used models while the device is above its memory
//! threshold or the cache holds too many entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::error::{EngineError, Result};
use crate::loader::{DeviceMemory, LoadedModel, ModelStore};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Model entry in the cache
struct CacheEntry {
    model: Arc<LoadedModel>,
    /// Number of resolves served by this entry
    usage: u64,
    /// Insertion order, breaks usage ties (older goes first)
    inserted: u64,
    location: PathBuf,
}

/// Usage-counted model cache, owned by the worker
pub struct ModelCache {
    store: Arc<dyn ModelStore>,
    memory: Arc<dyn DeviceMemory>,
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    /// Allocation at or above which entries are evicted
    threshold: u64,
    next_insertion: u64,
}

impl ModelCache {
    pub fn new(store: Arc<dyn ModelStore>, memory: Arc<dyn DeviceMemory>, config: &CacheConfig) -> Self {
        let threshold = config.threshold_bytes(memory.total());
        Self {
            store,
            memory,
            entries: HashMap::new(),
            max_entries: config.max_entries,
            threshold,
            next_insertion: 0,
        }
    }

    /// Get the model for `identity`, loading it from `location` on a miss
    pub fn resolve(&mut self, location: &Path, identity: &str) -> Result<Arc<LoadedModel>> {
        let model = match self.entries.get_mut(identity) {
            Some(entry) => {
                entry.usage += 1;
                if entry.location != location {
                    tracing::debug!(
                        identity,
                        cached = %entry.location.display(),
                        requested = %location.display(),
                        "Cache hit serves the identity's resident model"
                    );
                }
                tracing::info!(identity, usage = entry.usage, "Using cached model");
                Arc::clone(&entry.model)
            }
            None => {
                tracing::info!(identity, location = %location.display(), "Loading model");
                let model = Arc::new(self.load(location)?);
                self.entries.insert(
                    identity.to_string(),
                    CacheEntry {
                        model: Arc::clone(&model),
                        usage: 1,
                        inserted: self.next_insertion,
                        location: location.to_path_buf(),
                    },
                );
                self.next_insertion += 1;
                model
            }
        };

        self.evict();
        Ok(model)
    }

    fn load(&self, location: &Path) -> Result<LoadedModel> {
        let attach_adapter = self.store.has_adapter(location);
        if !attach_adapter {
            tracing::info!(location = %location.display(), "No adapter found, loading base model");
        }
        self.store
            .load(location, attach_adapter)
            .map_err(|e| EngineError::model_load(location.display(), format!("{e:#}")))
    }

    /// Drop least-used entries until memory and size are back within bounds.
    ///
    /// Returns the evicted identities in eviction order. Stops once the
    /// cache is empty even if memory is still above the threshold.
    pub fn evict(&mut self) -> Vec<String> {
        let mut allocated = self.memory.allocated();
        tracing::info!(
            allocated_gb = allocated as f64 / GB,
            threshold_gb = self.threshold as f64 / GB,
            entries = self.entries.len(),
            "Device memory check"
        );

        let mut evicted = Vec::new();
        while allocated >= self.threshold || self.entries.len() > self.max_entries {
            let Some(victim) = self.eviction_candidate() else {
                break;
            };

            if let Some(entry) = self.entries.remove(&victim) {
                tracing::info!(identity = %victim, usage = entry.usage, "Evicting model");
                drop(entry);
            }
            self.memory.empty_cache();
            allocated = self.memory.allocated();
            evicted.push(victim);
        }

        if !evicted.is_empty() && allocated >= self.threshold {
            tracing::warn!(
                allocated_gb = allocated as f64 / GB,
                "Memory still above threshold after emptying the cache"
            );
        }
        evicted
    }

    /// Lowest usage first, oldest insertion among equals
    fn eviction_candidate(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| (entry.usage, entry.inserted))
            .map(|(identity, _)| identity.clone())
    }

    /// Usage count for `identity`, if resident
    pub fn usage(&self, identity: &str) -> Option<u64> {
        self.entries.get(identity).map(|entry| entry.usage)
    }

    /// Allocation in bytes at or above which entries are evicted
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
