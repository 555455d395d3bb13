//! Customer data loading, schema validation and labelled export
//!
//! The engine only ever sees a [`FeatureMatrix`]. Everything that can go
//! wrong with the input file (missing columns, empty or non-numeric cells)
//! is reported here, before any clustering starts.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use ndarray::{Array1, Array2, ArrayView2};
use tracing::{debug, info};

use crate::error::{ClusterError, Result};
use crate::scaler::{self, ScalerState};

/// Age column name used by the mall customer workbook.
pub const DEFAULT_AGE_COLUMN: &str = "Usia (17 - 50)";
/// Monthly spend column name used by the mall customer workbook.
pub const DEFAULT_SPEND_COLUMN: &str = "Pengeluaran Bulanan";
/// Header of the label column appended on export.
pub const CLUSTER_COLUMN: &str = "Cluster";

/// Names of the two feature columns to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumns {
    pub age: String,
    pub spend: String,
}

impl Default for FeatureColumns {
    fn default() -> Self {
        Self {
            age: DEFAULT_AGE_COLUMN.to_string(),
            spend: DEFAULT_SPEND_COLUMN.to_string(),
        }
    }
}

impl FeatureColumns {
    fn names(&self) -> [&str; 2] {
        [self.age.as_str(), self.spend.as_str()]
    }
}

/// N x 2 matrix of finite feature values with column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    values: Array2<f64>,
    column_names: [String; 2],
}

impl FeatureMatrix {
    /// Wrap a matrix, rejecting empty, wrongly shaped or non-finite input.
    pub fn new(values: Array2<f64>, column_names: [String; 2]) -> Result<Self> {
        if values.nrows() == 0 {
            return Err(ClusterError::EmptyInput);
        }
        if values.ncols() != 2 {
            return Err(ClusterError::invalid(format!(
                "feature matrix must have 2 columns, got {}",
                values.ncols()
            )));
        }
        for ((row, column), value) in values.indexed_iter() {
            if !value.is_finite() {
                return Err(ClusterError::InvalidValue {
                    row: row + 1,
                    column: column_names[column].clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(Self {
            values,
            column_names,
        })
    }

    /// Build from `(age, spend)` rows with the default column names.
    pub fn from_rows(rows: &[[f64; 2]]) -> Result<Self> {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let values = Array2::from_shape_vec((rows.len(), 2), flat)?;
        let columns = FeatureColumns::default();
        Self::new(values, [columns.age, columns.spend])
    }

    pub fn values(&self) -> ArrayView2<f64> {
        self.values.view()
    }

    pub fn column_names(&self) -> &[String; 2] {
        &self.column_names
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Row-major little-endian bytes of the values, used as cache key input.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect()
    }
}

/// A parsed input file: the original records plus the extracted features.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
    pub matrix: FeatureMatrix,
}

/// Raw and standardized features ready for clustering.
#[derive(Debug, Clone)]
pub struct CustomerData {
    pub dataset: Dataset,
    /// Standardized features (n_customers, 2)
    pub features: Array2<f64>,
    /// Fitted scaler for mapping new points and centroids
    pub scaler: ScalerState,
}

impl CustomerData {
    /// Scale new `(age, spend)` values using the fitted scaler
    pub fn scale_new_data(&self, values: &[f64; 2]) -> Result<Array1<f64>> {
        let row = Array1::from(values.to_vec());
        self.scaler.transform_row(row.view())
    }

    /// Raw (unscaled) feature matrix.
    pub fn raw_features(&self) -> ArrayView2<f64> {
        self.dataset.matrix.values()
    }
}

/// Locate both feature columns in a header row.
///
/// # Errors
/// * [`ClusterError::MissingColumn`] naming the first absent column
pub fn validate_schema(headers: &StringRecord, columns: &FeatureColumns) -> Result<[usize; 2]> {
    let mut indices = [0usize; 2];
    for (slot, name) in indices.iter_mut().zip(columns.names()) {
        *slot = headers
            .iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| ClusterError::MissingColumn {
                name: name.to_string(),
            })?;
    }
    Ok(indices)
}

/// Read a CSV file with a header row and extract the feature columns.
pub fn load_dataset<P: AsRef<Path>>(path: P, columns: &FeatureColumns) -> Result<Dataset> {
    let file = File::open(path.as_ref())?;
    debug!(path = %path.as_ref().display(), "reading customer data");
    read_dataset(file, columns)
}

/// Read CSV from any reader; see [`load_dataset`].
///
/// # Errors
/// * [`ClusterError::MissingColumn`] if a feature column is absent
/// * [`ClusterError::InvalidValue`] for an empty or non-numeric cell
///   (rows are numbered from 1, excluding the header)
/// * [`ClusterError::EmptyInput`] if there are no data rows
pub fn read_dataset<R: Read>(reader: R, columns: &FeatureColumns) -> Result<Dataset> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let indices = validate_schema(&headers, columns)?;
    let names = columns.names();

    let mut records = Vec::new();
    let mut flat = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        for (&index, name) in indices.iter().zip(names) {
            let cell = record.get(index).unwrap_or("").trim();
            let value = cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ClusterError::InvalidValue {
                    row: i + 1,
                    column: name.to_string(),
                    value: cell.to_string(),
                })?;
            flat.push(value);
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(ClusterError::EmptyInput);
    }

    let values = Array2::from_shape_vec((records.len(), 2), flat)?;
    let matrix = FeatureMatrix::new(values, [columns.age.clone(), columns.spend.clone()])?;
    info!(rows = matrix.n_rows(), "customer data loaded");

    Ok(Dataset {
        headers,
        records,
        matrix,
    })
}

/// Load a CSV file and standardize its feature columns
///
/// # Arguments
/// * `file_path` - Path to the CSV file
/// * `columns` - Names of the age and monthly spend columns
///
/// # Returns
/// * `CustomerData` containing raw and standardized features and the scaler
pub fn load_and_process_data<P: AsRef<Path>>(
    file_path: P,
    columns: &FeatureColumns,
) -> Result<CustomerData> {
    let dataset = load_dataset(file_path, columns)?;
    prepare_features(dataset)
}

/// Standardize the feature matrix of an already parsed dataset.
pub fn prepare_features(dataset: Dataset) -> Result<CustomerData> {
    let (scaler, features) = scaler::fit_transform(dataset.matrix.values())?;
    Ok(CustomerData {
        dataset,
        features,
        scaler,
    })
}

/// Write the original records with the cluster label appended as a last column.
pub fn export_labeled<P: AsRef<Path>>(
    dataset: &Dataset,
    labels: &Array1<usize>,
    path: P,
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_labeled(dataset, labels, file)?;
    info!(path = %path.as_ref().display(), "labelled data exported");
    Ok(())
}

/// [`export_labeled`] to any writer.
pub fn write_labeled<W: Write>(dataset: &Dataset, labels: &Array1<usize>, writer: W) -> Result<()> {
    if labels.len() != dataset.records.len() {
        return Err(ClusterError::invalid(format!(
            "expected {} labels, got {}",
            dataset.records.len(),
            labels.len()
        )));
    }

    let mut wtr = WriterBuilder::new().from_writer(writer);

    let mut header = dataset.headers.clone();
    header.push_field(CLUSTER_COLUMN);
    wtr.write_record(&header)?;

    for (record, label) in dataset.records.iter().zip(labels.iter()) {
        let mut row = record.clone();
        row.push_field(&label.to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
