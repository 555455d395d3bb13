//! Plain-text and JSON reporting of clustering results

use serde::Serialize;

use crate::data::CustomerData;
use crate::elbow::ElbowCurve;
use crate::error::Result;
use crate::model::ClusterModel;
use crate::summary::ClusterSummary;

/// Number of rows used for the sampled silhouette score
pub const SILHOUETTE_SAMPLE: usize = 100;

/// Everything a run produced, in a serializable form.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub n_customers: usize,
    pub n_clusters: usize,
    pub columns: Vec<String>,
    pub inertia: f64,
    pub n_iter: usize,
    pub converged: bool,
    pub silhouette: f64,
    /// Centroids mapped back to raw units
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub summary: ClusterSummary,
    pub elbow: Option<ElbowCurve>,
    pub suggested_k: Option<usize>,
    pub degenerate_columns: Vec<usize>,
}

impl RunReport {
    pub fn new(
        data: &CustomerData,
        model: &ClusterModel,
        summary: ClusterSummary,
        elbow: Option<ElbowCurve>,
    ) -> Result<Self> {
        let centroids = raw_centroids(data, model)?;
        let suggested_k = elbow.as_ref().and_then(ElbowCurve::suggested_k);

        Ok(Self {
            n_customers: data.dataset.matrix.n_rows(),
            n_clusters: model.n_clusters,
            columns: data.dataset.matrix.column_names().to_vec(),
            inertia: model.inertia,
            n_iter: model.n_iter,
            converged: model.converged,
            silhouette: model.silhouette_sample(data.features.view(), SILHOUETTE_SAMPLE),
            centroids,
            labels: model.labels.to_vec(),
            summary,
            elbow,
            suggested_k,
            degenerate_columns: data.scaler.degenerate_columns().to_vec(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Centroids in the original units, rounded to 2 decimals.
pub fn raw_centroids(data: &CustomerData, model: &ClusterModel) -> Result<Vec<Vec<f64>>> {
    model
        .centroids
        .rows()
        .into_iter()
        .map(|row| {
            let raw = data.scaler.inverse_transform_row(row)?;
            Ok(raw.iter().map(|v| (v * 100.0).round() / 100.0).collect())
        })
        .collect()
}

/// Render the per-cluster summary as a table.
pub fn format_summary_table(summary: &ClusterSummary, columns: &[String]) -> String {
    let total = summary.total().max(1) as f64;
    let mut out = String::new();

    out.push_str(&format!("{:>7}", "Cluster"));
    for name in columns {
        out.push_str(&format!(" | {:>20}", format!("Mean {}", name)));
    }
    out.push_str(&format!(" | {:>5} | {:>6}\n", "Count", "Share"));
    out.push_str(&"-".repeat(7 + columns.len() * 23 + 17));
    out.push('\n');

    for stats in &summary.clusters {
        out.push_str(&format!("{:>7}", stats.cluster));
        for mean in &stats.means {
            out.push_str(&format!(" | {:>20.2}", mean));
        }
        let share = stats.count as f64 / total * 100.0;
        out.push_str(&format!(" | {:>5} | {:>5.1}%\n", stats.count, share));
    }

    out
}

/// Render the elbow curve as a table, marking the suggested k.
pub fn format_elbow_table(curve: &ElbowCurve) -> String {
    let suggested = curve.suggested_k();
    let mut out = String::from("      k |      inertia\n--------|-------------\n");

    for point in &curve.points {
        let marker = if Some(point.k) == suggested {
            "  <- elbow"
        } else {
            ""
        };
        out.push_str(&format!("{:>7} | {:>12.4}{}\n", point.k, point.inertia, marker));
    }

    out
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(report: &RunReport) {
    println!("\n=== Cluster Statistics ===");
    println!("Number of clusters: {}", report.n_clusters);
    println!("Total customers: {}", report.n_customers);
    println!("Within-cluster sum of squares (Inertia): {:.4}", report.inertia);
    println!(
        "Iterations: {} ({})",
        report.n_iter,
        if report.converged {
            "converged"
        } else {
            "iteration limit reached"
        }
    );
    println!("Silhouette score (sample): {:.3}", report.silhouette);

    for &column in &report.degenerate_columns {
        if let Some(name) = report.columns.get(column) {
            println!("Note: column '{}' is constant and was only centered", name);
        }
    }

    println!("\nCluster centroids (original units):");
    for (i, centroid) in report.centroids.iter().enumerate() {
        let values: Vec<String> = report
            .columns
            .iter()
            .zip(centroid)
            .map(|(name, value)| format!("{} = {:.2}", name, value))
            .collect();
        println!("  Cluster {}: {}", i, values.join(", "));
    }

    println!("\n=== Cluster Summary ===");
    print!("{}", format_summary_table(&report.summary, &report.columns));

    if let Some(curve) = &report.elbow {
        println!("\n=== Elbow Curve ===");
        print!("{}", format_elbow_table(curve));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{prepare_features, read_dataset, FeatureColumns};
    use crate::elbow::{sweep, ElbowPoint};
    use crate::model::{fit, KMeansParams};
    use crate::summary::summarize;

    const SAMPLE: &str = "Usia (17 - 50),Pengeluaran Bulanan\n\
                          20,15\n22,18\n25,20\n60,5\n62,6\n58,4\n";

    fn create_test_data() -> (CustomerData, ClusterModel) {
        let dataset = read_dataset(SAMPLE.as_bytes(), &FeatureColumns::default()).unwrap();
        let data = prepare_features(dataset).unwrap();
        let model = fit(data.features.view(), &KMeansParams::new(2, 42)).unwrap();
        (data, model)
    }

    #[test]
    fn test_raw_centroids_in_original_units() {
        let (data, model) = create_test_data();
        let centroids = raw_centroids(&data, &model).unwrap();

        let mut ages: Vec<f64> = centroids.iter().map(|c| c[0]).collect();
        ages.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(ages, vec![22.33, 60.0]);
    }

    #[test]
    fn test_run_report_json() {
        let (data, model) = create_test_data();
        let summary = summarize(data.raw_features(), &model.labels, 2).unwrap();
        let curve = sweep(data.features.view(), 4, 42).unwrap();

        let report = RunReport::new(&data, &model, summary, Some(curve)).unwrap();
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["n_clusters"], 2);
        assert_eq!(value["labels"].as_array().unwrap().len(), 6);
        assert_eq!(value["elbow"]["points"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_format_summary_table() {
        let (data, model) = create_test_data();
        let summary = summarize(data.raw_features(), &model.labels, 2).unwrap();
        let table = format_summary_table(&summary, data.dataset.matrix.column_names());

        assert!(table.contains("Mean Pengeluaran Bulanan"));
        assert!(table.contains("22.33"));
        assert!(table.contains("50.0%"));
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn test_format_elbow_table_marks_knee() {
        let curve = ElbowCurve {
            points: vec![
                ElbowPoint { k: 1, inertia: 12.0 },
                ElbowPoint { k: 2, inertia: 0.4 },
                ElbowPoint { k: 3, inertia: 0.2 },
                ElbowPoint { k: 4, inertia: 0.1 },
            ],
        };
        let table = format_elbow_table(&curve);

        let marked: Vec<&str> = table.lines().filter(|l| l.contains("<- elbow")).collect();
        assert_eq!(marked.len(), 1);
        assert!(marked[0].trim_start().starts_with('2'));
    }
}
