//! mallcluster: mall customer segmentation on age and monthly spend
//!
//! The crate standardizes the two features, clusters customers with
//! K-Means (Lloyd's algorithm, k-means++ seeding), sweeps k to draw an
//! elbow curve, and summarizes each cluster in the original units.

pub mod cache;
pub mod cli;
pub mod data;
pub mod elbow;
pub mod error;
pub mod model;
pub mod report;
pub mod scaler;
pub mod summary;

// Re-export public items for easier access
pub use cache::{CacheKey, ModelCache};
pub use cli::Args;
pub use data::{load_and_process_data, CustomerData, FeatureColumns, FeatureMatrix};
pub use elbow::{sweep, ElbowCurve, ElbowPoint};
pub use error::ClusterError;
pub use model::{fit, fit_predict, predict, ClusterModel, KMeansParams};
pub use scaler::ScalerState;
pub use summary::{summarize, ClusterStats, ClusterSummary};

/// Result type used by the command-line layer
pub type Result<T> = anyhow::Result<T>;
