//! Content-addressed memo of fitted models
//!
//! Re-running the pipeline on the same file with the same parameters (the
//! common case while a user flips between views) should not refit. Models
//! are keyed by a SHA-256 digest of the raw matrix bytes and every fit
//! parameter.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use ndarray::ArrayView2;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::data::FeatureMatrix;
use crate::error::Result;
use crate::model::{self, ClusterModel, KMeansParams};

/// Hex-encoded SHA-256 digest identifying one fit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Digest of the raw matrix and the fit parameters.
    pub fn new(raw: &FeatureMatrix, params: &KMeansParams) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((raw.n_rows() as u64).to_le_bytes());
        hasher.update(raw.to_le_bytes());
        hasher.update((params.k as u64).to_le_bytes());
        hasher.update(params.seed.to_le_bytes());
        hasher.update((params.max_iter as u64).to_le_bytes());
        hasher.update(params.tolerance.to_bits().to_le_bytes());
        hasher.update((params.n_init as u64).to_le_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default)]
struct Entries {
    models: HashMap<CacheKey, Arc<ClusterModel>>,
    order: VecDeque<CacheKey>,
}

/// Bounded, thread-safe model cache. The oldest entry is evicted first.
#[derive(Debug)]
pub struct ModelCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl ModelCache {
    /// A cache holding at most `capacity` models (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<ClusterModel>> {
        self.entries.lock().models.get(key).cloned()
    }

    /// Return the cached model for `(raw, params)` or fit one on `scaled`.
    ///
    /// `scaled` must be the standardized form of `raw`. The lock is not held
    /// while fitting, so two threads missing on the same key may both fit;
    /// the results are identical and the first insert wins.
    pub fn get_or_fit(
        &self,
        raw: &FeatureMatrix,
        scaled: ArrayView2<f64>,
        params: &KMeansParams,
    ) -> Result<Arc<ClusterModel>> {
        let key = CacheKey::new(raw, params);
        if let Some(model) = self.get(&key) {
            debug!(key = key.as_str(), "model cache hit");
            return Ok(model);
        }

        debug!(key = key.as_str(), "model cache miss");
        let model = Arc::new(model::fit(scaled, params)?);
        Ok(self.insert(key, model))
    }

    fn insert(&self, key: CacheKey, model: Arc<ClusterModel>) -> Arc<ClusterModel> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.models.get(&key) {
            return Arc::clone(existing);
        }

        while entries.models.len() >= self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.models.remove(&oldest);
                }
                None => break,
            }
        }

        entries.order.push_back(key.clone());
        entries.models.insert(key, Arc::clone(&model));
        model
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.models.clear();
        entries.order.clear();
    }
}
