//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::data::{FeatureColumns, DEFAULT_AGE_COLUMN, DEFAULT_SPEND_COLUMN};
use crate::elbow::DEFAULT_K_MAX;
use crate::model::{KMeansParams, DEFAULT_MAX_ITER, DEFAULT_TOLERANCE};

/// Smallest cluster count offered on the command line
pub const MIN_CLUSTERS: usize = 2;
/// Largest cluster count offered on the command line
pub const MAX_CLUSTERS: usize = 10;

/// Mall customer segmentation by age and monthly spend using K-Means
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Number of clusters for K-Means (2-10)
    #[arg(short = 'k', long, default_value_t = 3)]
    pub clusters: usize,

    /// Seed for centroid initialization
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value_t = DEFAULT_MAX_ITER)]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,

    /// Number of k-means++ restarts; the lowest inertia is kept
    #[arg(long, default_value_t = 1)]
    pub n_init: usize,

    /// Largest k evaluated for the elbow curve
    #[arg(long, default_value_t = DEFAULT_K_MAX)]
    pub k_max: usize,

    /// Skip the elbow curve
    #[arg(long)]
    pub no_elbow: bool,

    /// Write the input rows with an appended Cluster column to this CSV file
    #[arg(short, long)]
    pub export: Option<String>,

    /// Name of the age column
    #[arg(long, default_value = DEFAULT_AGE_COLUMN)]
    pub age_column: String,

    /// Name of the monthly spend column
    #[arg(long, default_value = DEFAULT_SPEND_COLUMN)]
    pub spend_column: String,

    /// Prediction mode: provide age,spend as comma-separated string
    /// Example: --predict "30,2500000"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Print the full result as JSON instead of tables
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Reject settings the engine would accept but the tool does not offer
    pub fn validate(&self) -> crate::Result<()> {
        if !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&self.clusters) {
            anyhow::bail!(
                "Number of clusters must be between {} and {}, got {}",
                MIN_CLUSTERS,
                MAX_CLUSTERS,
                self.clusters
            );
        }
        if self.k_max == 0 {
            anyhow::bail!("--k-max must be at least 1");
        }
        Ok(())
    }

    /// Parse the `age,spend` values from the predict string
    pub fn parse_predict_values(&self) -> crate::Result<Option<[f64; 2]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 2 {
            anyhow::bail!("Predict values must be in format 'age,spend'");
        }

        let age: f64 = parts[0]
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| anyhow::anyhow!("Invalid age value: {}", parts[0]))?;
        let spend: f64 = parts[1]
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| anyhow::anyhow!("Invalid spend value: {}", parts[1]))?;

        Ok(Some([age, spend]))
    }

    pub fn feature_columns(&self) -> FeatureColumns {
        FeatureColumns {
            age: self.age_column.clone(),
            spend: self.spend_column.clone(),
        }
    }

    pub fn kmeans_params(&self) -> KMeansParams {
        KMeansParams::new(self.clusters, self.seed)
            .with_max_iter(self.max_iters)
            .with_tolerance(self.tolerance)
            .with_n_init(self.n_init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["mallcluster"]);

        assert_eq!(args.clusters, 3);
        assert_eq!(args.seed, 42);
        assert_eq!(args.k_max, 10);
        assert_eq!(args.age_column, "Usia (17 - 50)");
        assert!(args.validate().is_ok());

        let params = args.kmeans_params();
        assert_eq!(params.max_iter, 300);
        assert_eq!(params.tolerance, 1e-4);
        assert_eq!(params.n_init, 1);
    }

    #[test]
    fn test_cluster_range() {
        let args = Args::parse_from(["mallcluster", "-k", "1"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["mallcluster", "-k", "11"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["mallcluster", "-k", "10", "--seed", "7"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.kmeans_params(), KMeansParams::new(10, 7));
    }

    #[test]
    fn test_parse_predict_values() {
        let mut args = Args::parse_from(["mallcluster", "--predict", "30, 2500000"]);
        assert_eq!(args.parse_predict_values().unwrap(), Some([30.0, 2_500_000.0]));

        args.predict = None;
        assert_eq!(args.parse_predict_values().unwrap(), None);

        args.predict = Some("30".to_string());
        assert!(args.parse_predict_values().is_err());

        args.predict = Some("thirty,100".to_string());
        assert!(args.parse_predict_values().is_err());

        for non_finite in ["nan,1", "30,inf", "-infinity,5"] {
            args.predict = Some(non_finite.to_string());
            assert!(args.parse_predict_values().is_err(), "{}", non_finite);
        }
    }

    #[test]
    fn test_custom_columns() {
        let args = Args::parse_from([
            "mallcluster",
            "--age-column",
            "Age",
            "--spend-column",
            "Spend",
        ]);
        let columns = args.feature_columns();
        assert_eq!(columns.age, "Age");
        assert_eq!(columns.spend, "Spend");
    }
}
