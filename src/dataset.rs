//! Training data intake and dataset identity

use crate::error::{MetaMlError, Result};
use crate::metafeatures::{MetafeatureProvider, Metafeatures};
use crate::mode::Mode;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Column name used internally for the target; input data may not use it
pub const RESERVED_TARGET_COLUMN: &str = "metaml_target";

/// Identity and metafeatures of the dataset a run trains on.
/// Created once at the start of `fit` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    pub metafeatures: Metafeatures,
}

impl DatasetDescriptor {
    pub fn new(id: impl Into<String>, metafeatures: Metafeatures) -> Self {
        Self {
            id: id.into(),
            metafeatures,
        }
    }

    /// Hash the data and compute its metafeatures
    pub fn describe(
        x: &Array2<f64>,
        y: &Array1<f64>,
        mode: Mode,
        provider: &dyn MetafeatureProvider,
    ) -> Result<Self> {
        validate_xy(x, y)?;
        let id = dataset_id(x, y);
        let metafeatures = provider.compute(x, y, mode)?;
        Ok(Self { id, metafeatures })
    }
}

/// SHA-256 over the feature matrix (row-major) followed by the target vector
pub fn dataset_id(x: &Array2<f64>, y: &Array1<f64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update((x.nrows() as u64).to_le_bytes());
    hasher.update((x.ncols() as u64).to_le_bytes());
    for v in x.iter() {
        hasher.update(v.to_le_bytes());
    }
    for v in y.iter() {
        hasher.update(v.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Shape and content checks shared by `fit`, `predict` and `score`
pub fn validate_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(MetaMlError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(MetaMlError::DataError(format!(
            "empty training data: {} rows, {} columns",
            x.nrows(),
            x.ncols()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(MetaMlError::DataError(
            "training data contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

/// Names given to the columns of a bare feature matrix
pub fn default_feature_names(n_features: usize) -> Vec<String> {
    (0..n_features).map(|i| format!("Feature_{}", i)).collect()
}

/// Split a DataFrame into a feature matrix, a target vector and feature names
pub fn from_dataframe(df: &DataFrame, target: &str) -> Result<(Array2<f64>, Array1<f64>, Vec<String>)> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    if names.iter().any(|n| n == RESERVED_TARGET_COLUMN) {
        return Err(MetaMlError::ConfigError(format!(
            "The column name \"{}\" is not allowed in the input data, please remove or rename that column",
            RESERVED_TARGET_COLUMN
        )));
    }
    if !names.iter().any(|n| n == target) {
        return Err(MetaMlError::DataError(format!("target column '{}' not found", target)));
    }

    let feature_cols: Vec<String> = names.into_iter().filter(|n| n != target).collect();
    let y = Array1::from_vec(column_as_f64(df, target)?);
    let x = columns_to_array2(df, &feature_cols)?;
    Ok((x, y, feature_cols))
}

/// Extract named columns into a row-major `Array2<f64>`
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| column_as_f64(df, name))
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| col_data[c][r]))
}

fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| MetaMlError::DataError(format!("column '{}' not found", name)))?;
    let as_f64 = column
        .cast(&DataType::Float64)
        .map_err(|e| MetaMlError::DataError(e.to_string()))?;
    as_f64
        .f64()
        .map_err(|e| MetaMlError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.ok_or_else(|| MetaMlError::DataError(format!("column '{}' has missing values", name))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dataset_id_is_content_hash() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0, 1.0];
        let id = dataset_id(&x, &y);
        assert_eq!(id.len(), 64);
        assert_eq!(id, dataset_id(&x.clone(), &y.clone()));

        let y2 = array![1.0, 0.0];
        assert_ne!(id, dataset_id(&x, &y2));
    }

    #[test]
    fn test_dataset_id_depends_on_shape() {
        let x1 = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let x2 = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = array![0.0];
        assert_ne!(dataset_id(&x1, &y), dataset_id(&x2, &y));
    }

    #[test]
    fn test_validate_xy() {
        let x = array![[1.0], [2.0]];
        assert!(validate_xy(&x, &array![0.0, 1.0]).is_ok());
        assert!(matches!(
            validate_xy(&x, &array![0.0]),
            Err(MetaMlError::ShapeError { .. })
        ));
        assert!(validate_xy(&array![[f64::NAN], [1.0]], &array![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_from_dataframe() {
        let df = df!(
            "a" => &[1.0, 2.0, 3.0],
            "b" => &[4i64, 5, 6],
            "label" => &[0.0, 1.0, 0.0]
        )
        .unwrap();
        let (x, y, names) = from_dataframe(&df, "label").unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(x.dim(), (3, 2));
        assert_eq!(x[[1, 1]], 5.0);
        assert_eq!(y[1], 1.0);
    }

    #[test]
    fn test_reserved_column_rejected() {
        let df = df!(
            "metaml_target" => &[1.0, 2.0],
            "label" => &[0.0, 1.0]
        )
        .unwrap();
        let result = from_dataframe(&df, "label");
        assert!(matches!(result, Err(MetaMlError::ConfigError(_))));
    }

    #[test]
    fn test_missing_target_column() {
        let df = df!("a" => &[1.0, 2.0]).unwrap();
        assert!(matches!(from_dataframe(&df, "label"), Err(MetaMlError::DataError(_))));
    }
}
