//! K-nearest neighbors classifier and regressor

use super::{check_fit_input, check_n_features, majority_label, unknown_parameter, Estimator};
use crate::error::{MetaMlError, Result};
use crate::params::{expect_f64, expect_str, expect_usize, invalid_parameter, ParamValue};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl WeightScheme {
    fn weight(&self, dist: f64) -> f64 {
        match self {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / (dist + 1e-10),
        }
    }
}

/// K-nearest neighbors with a Minkowski distance of order `p`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNeighbors {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    pub p: f64,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    is_classification: bool,
}

impl KNeighbors {
    pub fn classifier() -> Self {
        Self {
            n_neighbors: 5,
            weights: WeightScheme::Uniform,
            p: 2.0,
            x_train: None,
            y_train: None,
            is_classification: true,
        }
    }

    pub fn regressor() -> Self {
        Self {
            is_classification: false,
            ..Self::classifier()
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.n_neighbors = k;
        self
    }

    fn predict_row(&self, point: &[f64], x_train: &Array2<f64>, y_train: &Array1<f64>) -> f64 {
        let neighbors = find_k_nearest(point, x_train, y_train, self.n_neighbors, self.p);
        if self.is_classification {
            let mut votes: BTreeMap<i64, f64> = BTreeMap::new();
            for n in &neighbors {
                *votes.entry(n.label.round() as i64).or_insert(0.0) += self.weights.weight(n.dist);
            }
            majority_label(&votes)
        } else {
            let (num, den) = neighbors.iter().fold((0.0, 0.0), |(num, den), n| {
                let w = self.weights.weight(n.dist);
                (num + w * n.label, den + w)
            });
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
    }
}

impl Estimator for KNeighbors {
    fn name(&self) -> &str {
        if self.is_classification {
            "KNeighborsClassifier"
        } else {
            "KNeighborsRegressor"
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => {
                let k = expect_usize(name, value)?;
                if k == 0 {
                    return Err(invalid_parameter(name, value, "must be at least 1"));
                }
                self.n_neighbors = k;
            }
            "weights" => {
                self.weights = match expect_str(name, value)? {
                    "uniform" => WeightScheme::Uniform,
                    "distance" => WeightScheme::Distance,
                    _ => return Err(invalid_parameter(name, value, "expected uniform or distance")),
                }
            }
            "p" => {
                let p = expect_f64(name, value)?;
                if p < 1.0 {
                    return Err(invalid_parameter(name, value, "must be at least 1"));
                }
                self.p = p;
            }
            _ => return Err(unknown_parameter(self.name(), name, value)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.n_neighbors > x.nrows() {
            return Err(MetaMlError::TrainingError(format!(
                "n_neighbors = {} exceeds the {} training samples",
                self.n_neighbors,
                x.nrows()
            )));
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (Some(x_train), Some(y_train)) = (&self.x_train, &self.y_train) else {
            return Err(MetaMlError::ModelNotFitted);
        };
        check_n_features(x_train.ncols(), x)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let point: Vec<f64> = x.row(i).to_vec();
                self.predict_row(&point, x_train, y_train)
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }
}

/// Max-heap entry; ordered by distance then training index so ties are stable
struct Neighbor {
    dist: f64,
    index: usize,
    label: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then(self.index.cmp(&other.index))
    }
}

/// The k nearest training rows, kept in a bounded max-heap
fn find_k_nearest(point: &[f64], x_train: &Array2<f64>, y_train: &Array1<f64>, k: usize, p: f64) -> Vec<Neighbor> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (index, row) in x_train.rows().into_iter().enumerate() {
        let dist = minkowski(point, row.iter(), p);
        let candidate = Neighbor {
            dist,
            index,
            label: y_train[index],
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_sorted_vec()
}

fn minkowski<'a>(a: &[f64], b: impl Iterator<Item = &'a f64>, p: f64) -> f64 {
    if p == 1.0 {
        a.iter().zip(b).map(|(ai, bi)| (ai - bi).abs()).sum()
    } else if p == 2.0 {
        a.iter().zip(b).map(|(ai, bi)| (ai - bi).powi(2)).sum::<f64>().sqrt()
    } else {
        a.iter()
            .zip(b)
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_majority() {
        let x = array![[0.0], [0.1], [0.2], [5.0], [5.1]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0];
        let mut knn = KNeighbors::classifier().with_k(3);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.05], [5.05]]).unwrap(), array![0.0, 1.0]);
    }

    #[test]
    fn test_regressor_mean_of_neighbors() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![1.0, 2.0, 3.0, 100.0];
        let mut knn = KNeighbors::regressor().with_k(3);
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[1.0]]).unwrap();
        assert!((pred[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weighting_prefers_exact_match() {
        let x = array![[0.0], [1.0], [1.1]];
        let y = array![0.0, 1.0, 1.0];
        let mut knn = KNeighbors::classifier().with_k(3);
        knn.set_param("weights", &"distance".into()).unwrap();
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.0]]).unwrap()[0], 0.0);
    }

    #[test]
    fn test_too_many_neighbors_fails_fit() {
        let mut knn = KNeighbors::classifier().with_k(10);
        let result = knn.fit(&array![[0.0], [1.0]], &array![0.0, 1.0]);
        assert!(matches!(result, Err(MetaMlError::TrainingError(_))));
    }

    #[test]
    fn test_params() {
        let mut knn = KNeighbors::regressor();
        knn.set_param("p", &ParamValue::Int(1)).unwrap();
        assert_eq!(knn.p, 1.0);
        assert!(knn.set_param("weights", &"cosine".into()).is_err());
        assert!(knn.set_param("n_neighbors", &ParamValue::Int(0)).is_err());
        assert!(!knn.accepts_random_state());
    }
}
