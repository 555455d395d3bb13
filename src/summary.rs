//! Per-cluster statistics on the raw (unscaled) features

use ndarray::{Array1, ArrayView2};
use serde::Serialize;

use crate::error::{ClusterError, Result};

/// Mean feature values and size of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
    pub cluster: usize,
    /// Mean of every raw feature over the members, rounded to 2 decimals.
    /// All zeros when the cluster has no members.
    pub means: Vec<f64>,
    pub count: usize,
}

/// Statistics for every cluster id in `[0, k)`, ordered by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub clusters: Vec<ClusterStats>,
}

impl ClusterSummary {
    pub fn get(&self, cluster: usize) -> Option<&ClusterStats> {
        self.clusters.get(cluster)
    }

    /// Total number of rows across all clusters.
    pub fn total(&self) -> usize {
        self.clusters.iter().map(|c| c.count).sum()
    }
}

/// Aggregate the raw matrix by cluster label.
///
/// Every id in `[0, k)` gets an entry; an id with no members is reported
/// with count 0 instead of failing.
///
/// # Errors
/// * [`ClusterError::InvalidParameter`] when `k == 0`, `labels` does not
///   have one entry per row, or a label is `>= k`
pub fn summarize(raw: ArrayView2<f64>, labels: &Array1<usize>, k: usize) -> Result<ClusterSummary> {
    if k == 0 {
        return Err(ClusterError::invalid("k must be at least 1"));
    }
    if labels.len() != raw.nrows() {
        return Err(ClusterError::invalid(format!(
            "expected {} labels, got {}",
            raw.nrows(),
            labels.len()
        )));
    }
    if let Some(&label) = labels.iter().find(|&&label| label >= k) {
        return Err(ClusterError::invalid(format!(
            "label {} is outside [0, {})",
            label, k
        )));
    }

    let n_features = raw.ncols();
    let mut sums = vec![Array1::<f64>::zeros(n_features); k];
    let mut counts = vec![0usize; k];

    for (row, &label) in raw.rows().into_iter().zip(labels.iter()) {
        sums[label] += &row;
        counts[label] += 1;
    }

    let clusters = sums
        .into_iter()
        .zip(counts)
        .enumerate()
        .map(|(cluster, (sum, count))| {
            let means = if count == 0 {
                vec![0.0; n_features]
            } else {
                sum.iter().map(|s| round2(s / count as f64)).collect()
            };
            ClusterStats {
                cluster,
                means,
                count,
            }
        })
        .collect();

    Ok(ClusterSummary { clusters })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_summarize_means_and_counts() {
        let raw = array![
            [20.0, 15.0],
            [22.0, 18.0],
            [25.0, 20.0],
            [60.0, 5.0],
            [62.0, 6.0],
            [58.0, 4.0],
        ];
        let labels = array![1, 1, 1, 0, 0, 0];
        let summary = summarize(raw.view(), &labels, 2).unwrap();

        assert_eq!(summary.clusters.len(), 2);
        assert_eq!(summary.get(0).unwrap().means, vec![60.0, 5.0]);
        assert_eq!(summary.get(0).unwrap().count, 3);
        // 67 / 3 = 22.333.. and 53 / 3 = 17.666..
        assert_eq!(summary.get(1).unwrap().means, vec![22.33, 17.67]);
        assert_eq!(summary.total(), 6);
    }

    #[test]
    fn test_gap_in_labels_gives_zero_count() {
        let raw = array![[1.0, 2.0], [3.0, 4.0]];
        let labels = array![0, 2];
        let summary = summarize(raw.view(), &labels, 3).unwrap();

        let empty = summary.get(1).unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.means, vec![0.0, 0.0]);
        assert_eq!(summary.get(2).unwrap().means, vec![3.0, 4.0]);
    }

    #[test]
    fn test_rejects_bad_labels() {
        let raw = array![[1.0, 2.0], [3.0, 4.0]];

        assert!(summarize(raw.view(), &array![0], 2).is_err());
        assert!(summarize(raw.view(), &array![0, 2], 2).is_err());
        assert!(summarize(raw.view(), &array![0, 0], 0).is_err());
    }
}
