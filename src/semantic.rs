//! Semantic similarity with lexical fallback.
//!
//! The oracle is the only blocking I/O inside scoring, so all pairs are
//! primed in batches before the scoring shards start, then served from the
//! memoized cache. Oracle failure is never fatal: affected pairs fall back
//! to token-overlap Jaccard and a warning counter ticks up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::util::{jaccard, normalize_text};

/// Minimum pairs per oracle call. Callers accumulate at least this many
/// before going over the wire.
pub const ORACLE_BATCH_SIZE: usize = 32;

/// External semantic-similarity backend. Returns one score in [0, 1] per
/// input pair, in order.
pub trait SimilarityOracle: Send + Sync {
    fn similarity_batch(&self, pairs: &[(String, String)]) -> Result<Vec<f64>, String>;
}

/// Which machinery produced a similarity value. Thresholds differ: an
/// oracle score is compared against the semantic threshold, a lexical
/// score against the (lower) token-overlap threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilaritySource {
    Oracle,
    Lexical,
}

/// A similarity value tagged with its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub value: f64,
    pub source: SimilaritySource,
}

/// Memoized similarity lookup shared read-only by the scoring shards.
///
/// Keys are normalized and order-insensitive: (a, b) and (b, a) hit the
/// same entry.
pub struct SemanticIndex {
    oracle: Option<Arc<dyn SimilarityOracle>>,
    cache: Mutex<HashMap<(String, String), f64>>,
    fallbacks: AtomicU32,
}

impl SemanticIndex {
    pub fn new(oracle: Option<Arc<dyn SimilarityOracle>>) -> Self {
        Self {
            oracle,
            cache: Mutex::new(HashMap::new()),
            fallbacks: AtomicU32::new(0),
        }
    }

    /// Lexical-only index (oracle disabled by config or absent).
    pub fn lexical_only() -> Self {
        Self::new(None)
    }

    fn key(a: &str, b: &str) -> (String, String) {
        let a = normalize_text(a);
        let b = normalize_text(b);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Batch-resolve every pair against the oracle and memoize the results.
    ///
    /// Call once per cycle with all (need, offer) and (niche, niche) texts
    /// before scoring starts; after this, `similarity` never blocks.
    pub fn prime(&self, pairs: &[(&str, &str)]) {
        let Some(oracle) = self.oracle.as_ref() else {
            return;
        };

        let mut seen: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for (a, b) in pairs {
                let key = Self::key(a, b);
                if key.0.is_empty() || key.1.is_empty() || key.0 == key.1 {
                    continue;
                }
                if !cache.contains_key(&key) {
                    seen.insert(key);
                }
            }
        }
        if seen.is_empty() {
            return;
        }
        let mut todo: Vec<(String, String)> = seen.into_iter().collect();
        todo.sort();

        for chunk in todo.chunks(ORACLE_BATCH_SIZE.max(1)) {
            match oracle.similarity_batch(chunk) {
                Ok(scores) if scores.len() == chunk.len() => {
                    let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                    for (key, score) in chunk.iter().zip(scores) {
                        cache.insert(key.clone(), score.clamp(0.0, 1.0));
                    }
                }
                Ok(scores) => {
                    log::warn!(
                        "Semantic oracle returned {} scores for {} pairs; falling back to token overlap",
                        scores.len(),
                        chunk.len()
                    );
                    self.fallbacks.fetch_add(chunk.len() as u32, Ordering::Relaxed);
                }
                Err(e) => {
                    log::warn!("Semantic oracle batch failed ({e}); falling back to token overlap");
                    self.fallbacks.fetch_add(chunk.len() as u32, Ordering::Relaxed);
                }
            }
        }
    }

    /// Similarity for one pair of texts. Cache hit → oracle score; miss or
    /// blank text → lexical Jaccard.
    pub fn similarity(&self, a: &str, b: &str) -> Similarity {
        let key = Self::key(a, b);
        if key.0.is_empty() || key.1.is_empty() {
            return Similarity {
                value: 0.0,
                source: SimilaritySource::Lexical,
            };
        }
        if key.0 == key.1 {
            return Similarity {
                value: 1.0,
                source: SimilaritySource::Oracle,
            };
        }

        if let Some(value) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied()
        {
            return Similarity {
                value,
                source: SimilaritySource::Oracle,
            };
        }

        Similarity {
            value: jaccard(a, b),
            source: SimilaritySource::Lexical,
        }
    }

    /// Number of pairs served by fallback because the oracle failed.
    pub fn fallback_count(&self) -> u32 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}
