//! K-Means clustering engine (Lloyd's algorithm with k-means++ seeding)
//!
//! # Algorithm
//!
//! 1. Pick initial centroids with k-means++ from a seeded ChaCha generator
//! 2. Assign every point to its nearest centroid (ties go to the lowest index)
//! 3. Reseed empty clusters with the point farthest from its centroid
//! 4. Move each centroid to the mean of its points
//! 5. Repeat until the largest centroid movement drops below the tolerance
//!    or the iteration limit is hit
//!
//! All randomness comes from the seed in [`KMeansParams`], so the same
//! `(data, params)` pair always yields the same model.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};

/// Default iteration limit for a single Lloyd run.
pub const DEFAULT_MAX_ITER: usize = 300;
/// Default convergence tolerance on centroid movement.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Parameters for a K-Means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    /// Number of clusters, `1 <= k <= n_samples`
    pub k: usize,
    /// Seed for the k-means++ initialization
    pub seed: u64,
    /// Iteration limit per run
    pub max_iter: usize,
    /// Stop once no centroid moves farther than this between iterations
    pub tolerance: f64,
    /// Number of k-means++ restarts; the lowest inertia wins
    pub n_init: usize,
}

impl KMeansParams {
    /// Parameters with default iteration limit, tolerance and a single run.
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            seed,
            max_iter: DEFAULT_MAX_ITER,
            tolerance: DEFAULT_TOLERANCE,
            n_init: 1,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Check the parameters against a dataset of `n_samples` rows.
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if n_samples == 0 {
            return Err(ClusterError::EmptyInput);
        }
        if self.k == 0 || self.k > n_samples {
            return Err(ClusterError::invalid(format!(
                "k must be between 1 and the number of data points ({}), got {}",
                n_samples, self.k
            )));
        }
        if self.max_iter == 0 {
            return Err(ClusterError::invalid("max_iter must be at least 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ClusterError::invalid(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.n_init == 0 {
            return Err(ClusterError::invalid("n_init must be at least 1"));
        }
        Ok(())
    }
}

/// A fitted K-Means model.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignment of every training row, each in `[0, n_clusters)`
    pub labels: Array1<usize>,
    /// Cluster centroids in scaled space, one row per cluster
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    /// Lloyd iterations run by the kept run
    pub n_iter: usize,
    /// Whether the kept run met the tolerance before the iteration limit
    pub converged: bool,
    /// Inertia after every iteration of the kept run
    pub inertia_history: Vec<f64>,
}

impl ClusterModel {
    /// Nearest centroid for a single scaled point.
    pub fn predict_point(&self, point: ArrayView1<f64>) -> Result<usize> {
        if point.len() != self.centroids.ncols() {
            return Err(ClusterError::invalid(format!(
                "feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            )));
        }
        ensure_finite(point.iter())?;
        Ok(nearest_centroid(point, self.centroids.view()).0)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient over the first `sample_size` rows.
    ///
    /// Distances are only measured within the sample, which keeps the cost
    /// quadratic in `sample_size` rather than in the dataset size. Returns
    /// 0.0 for fewer than two sampled points.
    pub fn silhouette_sample(&self, features: ArrayView2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size).min(self.labels.len());
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            let mut same_sum = 0.0;
            let mut same_count = 0usize;
            let mut other_sums = vec![0.0; self.n_clusters];
            let mut other_counts = vec![0usize; self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }
                let distance = squared_distance(point, features.row(j)).sqrt();
                let other_label = self.labels[j];

                if other_label == cluster_label {
                    same_sum += distance;
                    same_count += 1;
                } else if other_label < self.n_clusters {
                    other_sums[other_label] += distance;
                    other_counts[other_label] += 1;
                }
            }

            // a singleton cluster scores 0 by convention
            if same_count == 0 {
                continue;
            }
            let a_i = same_sum / same_count as f64;

            let b_i = other_sums
                .iter()
                .zip(&other_counts)
                .filter(|(_, count)| **count > 0)
                .map(|(sum, count)| sum / *count as f64)
                .fold(f64::INFINITY, f64::min);

            if b_i.is_finite() && a_i.max(b_i) > 0.0 {
                silhouette_sum += (b_i - a_i) / a_i.max(b_i);
            }
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit K-Means on a standardized matrix.
///
/// # Arguments
/// * `data` - Scaled features, one row per record
/// * `params` - Cluster count, seed and stopping rules
///
/// # Returns
/// * The model of the run with the lowest inertia among `params.n_init` runs
///
/// # Errors
/// * [`ClusterError::EmptyInput`] when `data` has no rows
/// * [`ClusterError::InvalidParameter`] when `k` is outside `1..=n` or
///   another parameter is out of range, or `data` holds non-finite values
pub fn fit(data: ArrayView2<f64>, params: &KMeansParams) -> Result<ClusterModel> {
    params.validate(data.nrows())?;
    ensure_finite(data.iter())?;

    if params.k == 1 {
        return Ok(fit_single_cluster(data));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut best: Option<ClusterModel> = None;

    for run in 0..params.n_init {
        let model = run_lloyd(data, params, &mut rng);
        debug!(run, inertia = model.inertia, n_iter = model.n_iter, "k-means run finished");
        let improved = best
            .as_ref()
            .map_or(true, |current| model.inertia < current.inertia);
        if improved {
            best = Some(model);
        }
    }

    // n_init >= 1 is validated above
    let model = best.ok_or_else(|| ClusterError::invalid("n_init must be at least 1"))?;

    if !model.converged {
        warn!(
            k = params.k,
            max_iter = params.max_iter,
            "k-means reached the iteration limit before converging"
        );
    }
    info!(
        k = params.k,
        inertia = model.inertia,
        n_iter = model.n_iter,
        "k-means fit complete"
    );

    Ok(model)
}

/// Fit and return `(labels, centroids, inertia)` with default stopping rules.
pub fn fit_predict(
    data: ArrayView2<f64>,
    k: usize,
    seed: u64,
) -> Result<(Array1<usize>, Array2<f64>, f64)> {
    let model = fit(data, &KMeansParams::new(k, seed))?;
    Ok((model.labels, model.centroids, model.inertia))
}

/// Assign each row of `data` to the nearest centroid of a fitted model.
///
/// Centroids are not recomputed.
pub fn predict(model: &ClusterModel, data: ArrayView2<f64>) -> Result<Array1<usize>> {
    if data.ncols() != model.centroids.ncols() {
        return Err(ClusterError::invalid(format!(
            "expected {} features, got {}",
            model.centroids.ncols(),
            data.ncols()
        )));
    }
    ensure_finite(data.iter())?;
    Ok(data
        .rows()
        .into_iter()
        .map(|row| nearest_centroid(row, model.centroids.view()).0)
        .collect())
}

/// Closed-form `k = 1` model: the centroid is the column mean and the
/// inertia is the total sum of squares.
pub(crate) fn fit_single_cluster(data: ArrayView2<f64>) -> ClusterModel {
    let mean = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()));
    let inertia = data
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, mean.view()))
        .sum();
    let centroids = mean.insert_axis(Axis(0));

    ClusterModel {
        n_clusters: 1,
        labels: Array1::zeros(data.nrows()),
        centroids,
        inertia,
        n_iter: 0,
        converged: true,
        inertia_history: vec![inertia],
    }
}

/// One k-means++ initialization followed by Lloyd iterations.
fn run_lloyd(data: ArrayView2<f64>, params: &KMeansParams, rng: &mut ChaCha8Rng) -> ClusterModel {
    let k = params.k;
    let n = data.nrows();

    let mut centroids = kmeans_plus_plus(data, k, rng);
    let mut labels = Array1::<usize>::zeros(n);
    let mut distances = vec![0.0; n];
    let mut inertia_history = Vec::new();
    let mut converged = false;
    let mut n_iter = 0;

    while n_iter < params.max_iter {
        assign_labels(data, centroids.view(), &mut labels, &mut distances);
        reseed_empty_clusters(&mut labels, &mut distances, k);

        let updated = update_centroids(data, &labels, &centroids);
        let shift = max_centroid_shift(centroids.view(), updated.view());
        centroids = updated;
        n_iter += 1;

        let inertia = compute_inertia(data, &labels, centroids.view());
        inertia_history.push(inertia);
        debug!(iteration = n_iter, inertia, shift, "lloyd iteration");

        if shift < params.tolerance || shift == 0.0 {
            converged = true;
            break;
        }
    }

    let inertia = inertia_history.last().copied().unwrap_or(0.0);

    ClusterModel {
        n_clusters: k,
        labels,
        centroids,
        inertia,
        n_iter,
        converged,
        inertia_history,
    }
}

/// k-means++ seeding.
///
/// The first centroid is drawn uniformly; every following one with
/// probability proportional to its squared distance from the nearest
/// centroid chosen so far.
fn kmeans_plus_plus(data: ArrayView2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));
    let mut chosen = vec![false; n];

    let first = rng.gen_range(0..n);
    chosen[first] = true;
    centroids.row_mut(0).assign(&data.row(first));

    let mut min_distances: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, data.row(first)))
        .collect();

    for c in 1..k {
        let next = match WeightedIndex::new(&min_distances) {
            Ok(weights) => weights.sample(rng),
            // every remaining point coincides with a chosen centroid
            Err(_) => chosen.iter().position(|&taken| !taken).unwrap_or(0),
        };
        chosen[next] = true;
        centroids.row_mut(c).assign(&data.row(next));

        for (i, row) in data.rows().into_iter().enumerate() {
            let distance = squared_distance(row, data.row(next));
            if distance < min_distances[i] {
                min_distances[i] = distance;
            }
        }
    }

    centroids
}

/// Assignment step. Also records each point's squared distance to its centroid.
fn assign_labels(
    data: ArrayView2<f64>,
    centroids: ArrayView2<f64>,
    labels: &mut Array1<usize>,
    distances: &mut [f64],
) {
    for (i, row) in data.rows().into_iter().enumerate() {
        let (label, distance) = nearest_centroid(row, centroids);
        labels[i] = label;
        distances[i] = distance;
    }
}

/// Move the farthest point into every empty cluster.
///
/// Candidates are taken only from clusters with more than one member, so
/// filling one cluster never empties another. Ties go to the lowest row.
fn reseed_empty_clusters(labels: &mut Array1<usize>, distances: &mut [f64], k: usize) {
    let mut counts = vec![0usize; k];
    for &label in labels.iter() {
        counts[label] += 1;
    }

    for cluster in 0..k {
        if counts[cluster] > 0 {
            continue;
        }

        let mut candidate: Option<usize> = None;
        for (i, &distance) in distances.iter().enumerate() {
            if counts[labels[i]] < 2 {
                continue;
            }
            match candidate {
                Some(best) if distances[best] >= distance => {}
                _ => candidate = Some(i),
            }
        }

        // k <= n guarantees a donor cluster with at least two members
        if let Some(point) = candidate {
            debug!(cluster, point, "reseeding empty cluster");
            counts[labels[point]] -= 1;
            labels[point] = cluster;
            counts[cluster] = 1;
            distances[point] = 0.0;
        }
    }
}

/// Update step: each centroid becomes the mean of its members.
///
/// A cluster without members keeps its previous centroid.
fn update_centroids(
    data: ArrayView2<f64>,
    labels: &Array1<usize>,
    previous: &Array2<f64>,
) -> Array2<f64> {
    let k = previous.nrows();
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; k];

    for (row, &label) in data.rows().into_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    for (cluster, mut sum) in sums.rows_mut().into_iter().enumerate() {
        match counts[cluster] {
            0 => sum.assign(&previous.row(cluster)),
            count => sum.mapv_inplace(|x| x / count as f64),
        }
    }

    sums
}

/// Largest Euclidean distance any centroid moved.
fn max_centroid_shift(old: ArrayView2<f64>, new: ArrayView2<f64>) -> f64 {
    old.rows()
        .into_iter()
        .zip(new.rows())
        .map(|(a, b)| squared_distance(a, b).sqrt())
        .fold(0.0, f64::max)
}

/// Index of and squared distance to the nearest centroid; ties go to the
/// lowest index.
/// NaN or infinite coordinates have no nearest centroid.
fn ensure_finite<'a>(mut values: impl Iterator<Item = &'a f64>) -> Result<()> {
    if values.any(|x| !x.is_finite()) {
        return Err(ClusterError::invalid("data contains non-finite values"));
    }
    Ok(())
}

fn nearest_centroid(point: ArrayView1<f64>, centroids: ArrayView2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (cluster, centroid) in centroids.rows().into_iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best.1 {
            best = (cluster, distance);
        }
    }
    best
}

/// Compute within-cluster sum of squares (inertia)
pub(crate) fn compute_inertia(
    data: ArrayView2<f64>,
    labels: &Array1<usize>,
    centroids: ArrayView2<f64>,
) -> f64 {
    data.rows()
        .into_iter()
        .zip(labels.iter())
        .filter(|(_, label)| **label < centroids.nrows())
        .map(|(row, &label)| squared_distance(row, centroids.row(label)))
        .sum()
}

/// Squared Euclidean distance between two points.
pub(crate) fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
