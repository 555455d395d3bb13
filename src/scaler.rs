//! Per-column z-score standardization
//!
//! Mirrors a standard scaler: population mean and standard deviation
//! (divisor `N`) are learned once from the fitting matrix and then applied
//! row by row.
//!
//! A column whose standard deviation is zero (all rows equal) is
//! *degenerate*. Instead of dividing by zero the scaler substitutes
//! `std = 1`, so the column is only centered and maps to zeros. The
//! fallback is recorded in [`ScalerState::degenerate_columns`] and logged at
//! `warn` level.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use tracing::warn;

use crate::error::{ClusterError, Result};

/// Fitted standardization parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerState {
    mean: Array1<f64>,
    /// Effective divisor per column, with the `1.0` fallback already applied
    std: Array1<f64>,
    degenerate: Vec<usize>,
}

impl ScalerState {
    /// Per-column means.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Per-column divisors actually used by [`transform`](Self::transform).
    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }

    /// Number of feature columns the state was fitted on.
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Indices of columns that had zero variance and use the `std = 1` fallback.
    pub fn degenerate_columns(&self) -> &[usize] {
        &self.degenerate
    }

    pub fn is_degenerate(&self) -> bool {
        !self.degenerate.is_empty()
    }

    /// Turn the degenerate-column fallback into an error for callers that
    /// cannot accept a constant feature.
    pub fn ensure_non_degenerate(&self) -> Result<()> {
        match self.degenerate.first() {
            Some(&column) => Err(ClusterError::DegenerateFeature { column }),
            None => Ok(()),
        }
    }

    /// Standardize a single row: `(x - mean) / std` per column.
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok(Zip::from(&row)
            .and(&self.mean)
            .and(&self.std)
            .map_collect(|&x, &mu, &sigma| (x - mu) / sigma))
    }

    /// Standardize every row of `data`.
    pub fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        let mut scaled = data.to_owned();
        for mut row in scaled.rows_mut() {
            Zip::from(&mut row)
                .and(&self.mean)
                .and(&self.std)
                .for_each(|x, &mu, &sigma| *x = (*x - mu) / sigma);
        }
        Ok(scaled)
    }

    /// Map a scaled row back into raw units: `z * std + mean`.
    ///
    /// Used to report centroids in the original units.
    pub fn inverse_transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok(Zip::from(&row)
            .and(&self.mean)
            .and(&self.std)
            .map_collect(|&z, &mu, &sigma| z * sigma + mu))
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features() {
            return Err(ClusterError::invalid(format!(
                "expected {} features, got {}",
                self.n_features(),
                width
            )));
        }
        Ok(())
    }
}

/// Learn per-column mean and population standard deviation.
///
/// # Errors
/// * [`ClusterError::EmptyInput`] when `data` has no rows
pub fn fit(data: ArrayView2<f64>) -> Result<ScalerState> {
    if data.nrows() == 0 {
        return Err(ClusterError::EmptyInput);
    }

    let mean = data.mean_axis(Axis(0)).ok_or(ClusterError::EmptyInput)?;
    let mut std = data.std_axis(Axis(0), 0.0);
    let mut degenerate = Vec::new();

    for (column, ((sigma, mu), values)) in std
        .iter_mut()
        .zip(mean.iter())
        .zip(data.columns())
        .enumerate()
    {
        // a constant like 0.1 can leave sigma at ~1e-17 since its mean rounds
        if *sigma == 0.0 || is_constant(values) {
            warn!(
                column,
                mean = *mu,
                "feature column has zero variance, using std = 1"
            );
            *sigma = 1.0;
            degenerate.push(column);
        }
    }

    Ok(ScalerState {
        mean,
        std,
        degenerate,
    })
}

fn is_constant(values: ArrayView1<f64>) -> bool {
    match values.first() {
        Some(&first) => values.iter().all(|&x| x == first),
        None => true,
    }
}

/// Fit the scaler on `data` and return it with the standardized matrix.
pub fn fit_transform(data: ArrayView2<f64>) -> Result<(ScalerState, Array2<f64>)> {
    let state = fit(data)?;
    let scaled = state.transform(data)?;
    Ok((state, scaled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_fit_population_statistics() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let state = fit(data.view()).unwrap();

        assert_abs_diff_eq!(state.mean()[0], 2.5);
        assert_abs_diff_eq!(state.mean()[1], 25.0);
        // population variance of 1..4 is 1.25
        assert_abs_diff_eq!(state.std()[0], 1.25_f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(state.std()[1], 125.0_f64.sqrt(), epsilon = 1e-12);
        assert!(!state.is_degenerate());
    }

    #[test]
    fn test_fit_transform_zero_mean_unit_variance() {
        let data = array![[20.0, 15.0], [22.0, 18.0], [25.0, 20.0], [60.0, 5.0]];
        let (_, scaled) = fit_transform(data.view()).unwrap();

        for column in scaled.columns() {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(column.std(0.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_round_trip() {
        let data = array![[17.0, 1_500_000.0], [33.0, 750_000.5], [50.0, 3_200_000.0]];
        let state = fit(data.view()).unwrap();

        for row in data.rows() {
            let scaled = state.transform_row(row).unwrap();
            let restored = state.inverse_transform_row(scaled.view()).unwrap();
            for (a, b) in restored.iter().zip(row.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_constant_column_falls_back_to_unit_std() {
        let data = array![[30.0, 100.0], [30.0, 200.0], [30.0, 300.0]];
        let (state, scaled) = fit_transform(data.view()).unwrap();

        assert_eq!(state.degenerate_columns(), &[0]);
        assert_eq!(state.std()[0], 1.0);
        assert!(scaled.column(0).iter().all(|&z| z == 0.0));
        assert!(matches!(
            state.ensure_non_degenerate(),
            Err(ClusterError::DegenerateFeature { column: 0 })
        ));
    }

    #[test]
    fn test_inexact_constant_column_is_degenerate() {
        let data = array![[0.1, 1.0], [0.1, 2.0], [0.1, 3.0]];
        let (state, scaled) = fit_transform(data.view()).unwrap();

        assert_eq!(state.degenerate_columns(), &[0]);
        for &z in scaled.column(0) {
            assert_abs_diff_eq!(z, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tiny_spread_is_still_standardized() {
        let data = array![[1e-16, 1.0], [2e-16, 2.0], [3e-16, 3.0]];
        let (state, scaled) = fit_transform(data.view()).unwrap();

        assert!(!state.is_degenerate());
        assert_abs_diff_eq!(scaled.column(0).std(0.0), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(scaled[[2, 0]], 1.5_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let data = Array2::<f64>::zeros((0, 2));
        assert!(matches!(fit(data.view()), Err(ClusterError::EmptyInput)));
    }

    #[test]
    fn test_width_mismatch() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let state = fit(data.view()).unwrap();
        let row = array![1.0, 2.0, 3.0];
        assert!(state.transform_row(row.view()).is_err());
    }
}
