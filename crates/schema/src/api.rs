//! Preparer service: schema normalization, compiled-validator caching and
//! data validation behind process-wide bounded caches.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;

use crate::cache::TtlCache;
use crate::prepare::{self, canonical_key};
use crate::validate;

/// Generation mode, fixed per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Produced records carry only declared properties.
    Strict,
    /// Records are mutated, pruned and extended after baseline generation.
    Fuzz,
}

impl Mode {
    fn key_tag(self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Fuzz => "fuzz",
        }
    }
}

/// Size snapshot of one cache.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    /// Live entries.
    pub size: usize,
    /// Configured capacity.
    pub max: usize,
}

/// Combined snapshot of both caches.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PreparerStats {
    /// Prepared-schema cache.
    pub schema: CacheStats,
    /// Compiled-validator cache.
    pub validator: CacheStats,
}

/// Prepares schemas for generation and validates schemas/records, memoizing
/// both the prepared form and the compiled validator.
///
/// Safe for concurrent use; both caches sit behind their own mutex and are
/// only held for map operations, never across compilation or generation.
pub struct Preparer {
    prepared: Mutex<TtlCache<String, Arc<Value>>>,
    validators: Mutex<TtlCache<String, Arc<Validator>>>,
}

impl Preparer {
    /// Capacity of the prepared-schema cache.
    pub const SCHEMA_CACHE_CAPACITY: usize = 500;
    /// Capacity of the compiled-validator cache.
    pub const VALIDATOR_CACHE_CAPACITY: usize = 500;
    /// Soft TTL shared by both caches; reads extend age.
    pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

    /// Create a preparer with the default cache bounds.
    pub fn new() -> Self {
        let schema_cap =
            NonZeroUsize::new(Self::SCHEMA_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        let validator_cap =
            NonZeroUsize::new(Self::VALIDATOR_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            prepared: Mutex::new(TtlCache::new(schema_cap, Self::CACHE_TTL)),
            validators: Mutex::new(TtlCache::new(validator_cap, Self::CACHE_TTL)),
        }
    }

    /// Transform a schema for generation under `mode`, memoized by the
    /// schema's canonical serialization plus the mode tag.
    pub fn prepare(&self, schema: &Value, mode: Mode) -> Arc<Value> {
        let key = format!("{}:{}", mode.key_tag(), canonical_key(schema));

        if let Ok(mut cache) = self.prepared.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit;
            }
        }

        let prepared = Arc::new(prepare::prepare(schema, mode));
        if let Ok(mut cache) = self.prepared.lock() {
            cache.put(key, prepared.clone());
        }
        prepared
    }

    /// Check a schema for well-formedness: it must be an object, any `type`
    /// must name known types, and it must compile. Stops at the first error.
    pub fn validate_schema(&self, schema: &Value) -> Result<(), Vec<String>> {
        validate::check_shape(schema)?;
        self.compiled(schema).map(|_| ())
    }

    /// Validate one produced record against a schema through the cached
    /// compiled validator. Validation results themselves are not cached.
    pub fn validate_data(&self, record: &Value, schema: &Value) -> Result<(), Vec<String>> {
        let validator = self.compiled(schema)?;
        let errors: Vec<String> = validator
            .iter_errors(record)
            .map(|err| err.to_string())
            .collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn compiled(&self, schema: &Value) -> Result<Arc<Validator>, Vec<String>> {
        let key = canonical_key(schema);

        if let Ok(mut cache) = self.validators.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit);
            }
        }

        let validator = jsonschema::validator_for(schema)
            .map(Arc::new)
            .map_err(|err| vec![format!("schema compilation failed: {err}")])?;
        if let Ok(mut cache) = self.validators.lock() {
            cache.put(key, validator.clone());
        }
        Ok(validator)
    }

    /// Drop expired entries from both caches. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let mut purged = 0;
        if let Ok(mut cache) = self.prepared.lock() {
            purged += cache.purge_expired();
        }
        if let Ok(mut cache) = self.validators.lock() {
            purged += cache.purge_expired();
        }
        purged
    }

    /// Drop everything from both caches.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.prepared.lock() {
            cache.clear();
        }
        if let Ok(mut cache) = self.validators.lock() {
            cache.clear();
        }
    }

    /// Current size and bounds of both caches.
    pub fn stats(&self) -> PreparerStats {
        let schema = match self.prepared.lock() {
            Ok(cache) => CacheStats {
                size: cache.len(),
                max: cache.capacity(),
            },
            Err(_) => CacheStats {
                size: 0,
                max: Self::SCHEMA_CACHE_CAPACITY,
            },
        };
        let validator = match self.validators.lock() {
            Ok(cache) => CacheStats {
                size: cache.len(),
                max: cache.capacity(),
            },
            Err(_) => CacheStats {
                size: 0,
                max: Self::VALIDATOR_CACHE_CAPACITY,
            },
        };
        PreparerStats { schema, validator }
    }
}

impl Default for Preparer {
    fn default() -> Self {
        Self::new()
    }
}
