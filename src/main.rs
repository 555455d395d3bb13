//! mallcluster: segment mall customers by age and monthly spend
//!
//! This is the main entrypoint that orchestrates data loading, model fitting,
//! the elbow sweep, reporting and export.

use anyhow::{Context, Result};
use clap::Parser;
use mallcluster::data::{self, CustomerData};
use mallcluster::report::{self, RunReport};
use mallcluster::{elbow, summarize, Args, ModelCache};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);
    args.validate()?;

    // room for every model of the elbow sweep
    let cache = ModelCache::new(args.k_max);

    if let Some(values) = args.parse_predict_values()? {
        run_prediction_mode(&args, &cache, values)?;
    } else {
        run_full_pipeline(&args, &cache)?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load(args: &Args) -> Result<CustomerData> {
    info!(input = %args.input, "loading customer data");
    data::load_and_process_data(&args.input, &args.feature_columns())
        .with_context(|| format!("failed to load customer data from {}", args.input))
}

/// Run prediction mode for a single customer
fn run_prediction_mode(args: &Args, cache: &ModelCache, values: [f64; 2]) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!("Input values: age={}, spend={}", values[0], values[1]);

    let start_time = Instant::now();

    let customers = load(args)?;
    let model = cache.get_or_fit(
        &customers.dataset.matrix,
        customers.features.view(),
        &args.kmeans_params(),
    )?;

    let scaled = customers.scale_new_data(&values)?;
    let cluster = model.predict_point(scaled.view())?;
    let elapsed = start_time.elapsed();

    println!("\n✓ Predicted Cluster: {}", cluster);
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());

    let cluster_sizes = model.cluster_sizes();
    let total_customers = customers.dataset.matrix.n_rows();
    let cluster_percentage = (cluster_sizes[cluster] as f64 / total_customers as f64) * 100.0;
    let centroids = report::raw_centroids(&customers, &model)?;

    println!("\nCluster {} details:", cluster);
    println!(
        "  Size: {} customers ({:.1}% of total)",
        cluster_sizes[cluster], cluster_percentage
    );
    println!(
        "  Centroid: age={:.2}, spend={:.2}",
        centroids[cluster][0], centroids[cluster][1]
    );

    Ok(())
}

/// Run full clustering pipeline
fn run_full_pipeline(args: &Args, cache: &ModelCache) -> Result<()> {
    let start_time = Instant::now();

    // Step 1: Load and standardize data
    let customers = load(args)?;
    info!(
        customers = customers.dataset.matrix.n_rows(),
        "data loaded and standardized"
    );

    // Step 2: Elbow curve; every swept model lands in the cache
    let params = args.kmeans_params();
    let curve = if args.no_elbow {
        None
    } else {
        let sweep_start = Instant::now();
        let curve = elbow::sweep_cached(
            cache,
            &customers.dataset.matrix,
            customers.features.view(),
            args.k_max,
            &params,
        )?;
        info!(
            elapsed_ms = sweep_start.elapsed().as_millis() as u64,
            points = curve.len(),
            "elbow sweep complete"
        );
        Some(curve)
    };

    // Step 3: Fit K-Means model (a cache hit when the sweep covered k)
    let model_start = Instant::now();
    let model = cache.get_or_fit(
        &customers.dataset.matrix,
        customers.features.view(),
        &params,
    )?;
    info!(
        elapsed_ms = model_start.elapsed().as_millis() as u64,
        inertia = model.inertia,
        "model fitted"
    );

    // Step 4: Summaries and report
    let summary = summarize(customers.raw_features(), &model.labels, model.n_clusters)?;
    let run_report = RunReport::new(&customers, &model, summary, curve)?;

    if args.json {
        println!("{}", run_report.to_json()?);
    } else {
        report::print_cluster_statistics(&run_report);
    }

    // Step 5: Export
    if let Some(ref path) = args.export {
        data::export_labeled(&customers.dataset, &model.labels, path)
            .with_context(|| format!("failed to export results to {}", path))?;
        if !args.json {
            println!("\nLabelled data saved to: {}", path);
        }
    }

    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "pipeline complete"
    );

    Ok(())
}
