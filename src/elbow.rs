//! Elbow analysis: inertia as a function of the number of clusters

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::cache::ModelCache;
use crate::data::FeatureMatrix;
use crate::error::{ClusterError, Result};
use crate::model::{self, KMeansParams};

/// Largest k swept when the caller does not say otherwise.
pub const DEFAULT_K_MAX: usize = 10;

/// One point of the elbow curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElbowPoint {
    pub k: usize,
    pub inertia: f64,
}

/// Inertia for `k = 1..=k_max`, ordered by `k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElbowCurve {
    pub points: Vec<ElbowPoint>,
}

impl ElbowCurve {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Inertia recorded for `k`, if it was part of the sweep.
    pub fn inertia(&self, k: usize) -> Option<f64> {
        self.points.iter().find(|p| p.k == k).map(|p| p.inertia)
    }

    /// The "knee" of the curve.
    ///
    /// Picks the point farthest from the straight line joining the first and
    /// last points. Returns `None` when fewer than three points were swept or
    /// the curve is flat.
    pub fn suggested_k(&self) -> Option<usize> {
        if self.points.len() < 3 {
            return None;
        }
        let first = self.points.first()?;
        let last = self.points.last()?;

        let dx = (last.k - first.k) as f64;
        let dy = last.inertia - first.inertia;
        let norm = (dx * dx + dy * dy).sqrt();
        if norm == 0.0 || dy == 0.0 {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for point in &self.points[1..self.points.len() - 1] {
            let px = (point.k - first.k) as f64;
            let py = point.inertia - first.inertia;
            let distance = (dy * px - dx * py).abs() / norm;
            if best.map_or(true, |(_, d)| distance > d) {
                best = Some((point.k, distance));
            }
        }
        best.map(|(k, _)| k)
    }
}

/// Fit K-Means for every `k` in `1..=k_max` and collect the inertia.
///
/// `k_max` is clamped to the number of rows. Every fit uses `params` with
/// only `k` replaced, so each owns a generator seeded with `params.seed`;
/// the fits run on the rayon pool and the result does not depend on
/// scheduling. `k = 1` is the closed-form total sum of squares.
///
/// Each `k` is a separate local optimum, so the curve is only roughly
/// non-increasing: with a single restart a larger `k` can land in a worse
/// optimum than a smaller one. Raise `params.n_init` to make that rarer.
/// Every point is still bounded by the `k = 1` inertia.
///
/// # Errors
/// * [`ClusterError::EmptyInput`] when `data` has no rows
/// * [`ClusterError::InvalidParameter`] when `k_max == 0` or a stopping rule
///   in `params` is invalid
pub fn sweep_with(
    data: ArrayView2<f64>,
    k_max: usize,
    params: &KMeansParams,
) -> Result<ElbowCurve> {
    sweep_by(data.nrows(), k_max, params, |params| {
        model::fit(data, params).map(|fitted| fitted.inertia)
    })
}

/// [`sweep_with`] using default stopping rules and a single restart.
pub fn sweep(data: ArrayView2<f64>, k_max: usize, seed: u64) -> Result<ElbowCurve> {
    sweep_with(data, k_max, &KMeansParams::new(1, seed))
}

/// [`sweep_with`] that stores every fitted model in `cache`.
///
/// A later [`ModelCache::get_or_fit`] for one of the swept `k` with the same
/// `params` is then a hit.
pub fn sweep_cached(
    cache: &ModelCache,
    raw: &FeatureMatrix,
    scaled: ArrayView2<f64>,
    k_max: usize,
    params: &KMeansParams,
) -> Result<ElbowCurve> {
    sweep_by(scaled.nrows(), k_max, params, |params| {
        cache
            .get_or_fit(raw, scaled, params)
            .map(|fitted| fitted.inertia)
    })
}

fn sweep_by<F>(
    n_rows: usize,
    k_max: usize,
    params: &KMeansParams,
    fit_inertia: F,
) -> Result<ElbowCurve>
where
    F: Fn(&KMeansParams) -> Result<f64> + Sync,
{
    if n_rows == 0 {
        return Err(ClusterError::EmptyInput);
    }
    if k_max == 0 {
        return Err(ClusterError::invalid("k_max must be at least 1"));
    }
    let k_max = k_max.min(n_rows);

    let points = (1..=k_max)
        .into_par_iter()
        .map(|k| {
            let inertia = fit_inertia(&KMeansParams { k, ..params.clone() })?;
            debug!(k, inertia, "elbow point");
            Ok(ElbowPoint { k, inertia })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ElbowCurve { points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn customers() -> Array2<f64> {
        array![
            [20.0, 15.0],
            [22.0, 18.0],
            [25.0, 20.0],
            [60.0, 5.0],
            [62.0, 6.0],
            [58.0, 4.0],
            [40.0, 30.0],
            [41.0, 29.0],
            [39.0, 31.0],
        ]
    }

    #[test]
    fn test_sweep_covers_every_k() {
        let (_, scaled) = scaler::fit_transform(customers().view()).unwrap();
        let curve = sweep(scaled.view(), 5, 42).unwrap();

        let ks: Vec<usize> = curve.points.iter().map(|p| p.k).collect();
        assert_eq!(ks, vec![1, 2, 3, 4, 5]);
        // standardized 9x2 matrix: total sum of squares is 18
        assert_abs_diff_eq!(curve.inertia(1).unwrap(), 18.0, epsilon = 1e-9);
    }

    #[test]
    fn test_default_sweep_bounded_by_single_cluster() {
        let (_, scaled) = scaler::fit_transform(customers().view()).unwrap();
        let curve = sweep(scaled.view(), 9, 42).unwrap();

        // any partition into member means has at most the total sum of squares
        let total = curve.inertia(1).unwrap();
        for point in &curve.points {
            assert!(point.inertia <= total + 1e-9, "{:?}", curve.points);
            assert!(point.inertia >= 0.0);
        }
        assert_eq!(curve.inertia(9), Some(0.0));
    }

    #[test]
    fn test_sweep_with_restarts_weakly_non_increasing() {
        let (_, scaled) = scaler::fit_transform(customers().view()).unwrap();
        let params = KMeansParams::new(1, 42).with_n_init(4);
        let curve = sweep_with(scaled.view(), 9, &params).unwrap();

        for pair in curve.points.windows(2) {
            assert!(
                pair[1].inertia <= pair[0].inertia + 1e-6,
                "{:?}",
                curve.points
            );
        }
        assert_eq!(curve.inertia(9), Some(0.0));
    }

    #[test]
    fn test_sweep_matches_individual_fits() {
        let (_, scaled) = scaler::fit_transform(customers().view()).unwrap();
        let curve = sweep(scaled.view(), 6, 7).unwrap();

        for point in &curve.points {
            let fitted = model::fit(scaled.view(), &KMeansParams::new(point.k, 7)).unwrap();
            assert_eq!(fitted.inertia, point.inertia);
        }
    }

    #[test]
    fn test_sweep_cached_fills_cache() {
        let raw = FeatureMatrix::from_rows(&[
            [20.0, 15.0],
            [22.0, 18.0],
            [25.0, 20.0],
            [60.0, 5.0],
            [62.0, 6.0],
            [58.0, 4.0],
        ])
        .unwrap();
        let (_, scaled) = scaler::fit_transform(raw.values()).unwrap();
        let cache = ModelCache::new(10);
        let params = KMeansParams::new(2, 42);

        let cached = sweep_cached(&cache, &raw, scaled.view(), 10, &params).unwrap();
        assert_eq!(cached, sweep_with(scaled.view(), 10, &params).unwrap());
        assert_eq!(cache.len(), 6);

        let key = crate::cache::CacheKey::new(&raw, &params);
        let model = cache.get(&key).unwrap();
        assert_eq!(model.inertia, cached.inertia(2).unwrap());
    }

    #[test]
    fn test_k_max_clamped_to_rows() {
        let data = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
        let curve = sweep(data.view(), 10, 0).unwrap();
        assert_eq!(curve.len(), 3);
    }

    #[test]
    fn test_invalid_k_max() {
        let data = array![[0.0, 1.0], [1.0, 0.0]];
        assert!(matches!(
            sweep(data.view(), 0, 0),
            Err(ClusterError::InvalidParameter(_))
        ));
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            sweep(empty.view(), 3, 0),
            Err(ClusterError::EmptyInput)
        ));
    }

    #[test]
    fn test_suggested_k_three_groups() {
        let (_, scaled) = scaler::fit_transform(customers().view()).unwrap();
        let params = KMeansParams::new(1, 42).with_n_init(4);
        let curve = sweep_with(scaled.view(), 9, &params).unwrap();
        assert_eq!(curve.suggested_k(), Some(3));
    }

    #[test]
    fn test_suggested_k_needs_three_points() {
        let curve = ElbowCurve {
            points: vec![
                ElbowPoint { k: 1, inertia: 4.0 },
                ElbowPoint { k: 2, inertia: 1.0 },
            ],
        };
        assert_eq!(curve.suggested_k(), None);
    }
}
