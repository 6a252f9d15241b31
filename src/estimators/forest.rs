//! Random forest built from bootstrapped decision trees

use super::tree::{Criterion, DecisionTree, MaxFeatures};
use super::{check_fit_input, expect_seed, majority_label, unknown_parameter, Estimator};
use crate::error::{MetaMlError, Result};
use crate::params::{expect_bool, expect_usize, invalid_parameter, ParamValue};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Random forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    is_classification: bool,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::classifier()
    }
}

impl RandomForest {
    pub fn classifier() -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
            is_classification: true,
        }
    }

    pub fn regressor() -> Self {
        Self {
            max_features: MaxFeatures::All,
            criterion: Criterion::SquaredError,
            is_classification: false,
            ..Self::classifier()
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn base_tree(&self) -> DecisionTree {
        let mut tree = if self.is_classification {
            DecisionTree::classifier()
        } else {
            DecisionTree::regressor()
        };
        tree.max_depth = self.max_depth;
        tree.min_samples_split = self.min_samples_split;
        tree.min_samples_leaf = self.min_samples_leaf;
        tree.max_features = self.max_features;
        tree.criterion = self.criterion;
        tree
    }
}

impl Estimator for RandomForest {
    fn name(&self) -> &str {
        if self.is_classification {
            "RandomForestClassifier"
        } else {
            "RandomForestRegressor"
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => {
                let v = expect_usize(name, value)?;
                if v == 0 {
                    return Err(invalid_parameter(name, value, "must be at least 1"));
                }
                self.n_estimators = v;
            }
            "bootstrap" => self.bootstrap = expect_bool(name, value)?,
            "random_state" => self.random_state = expect_seed(name, value)?,
            // Tree-level settings are validated by a scratch tree
            "criterion" | "max_depth" | "min_samples_split" | "min_samples_leaf" | "max_features" => {
                let mut scratch = self.base_tree();
                scratch.set_param(name, value)?;
                self.criterion = scratch.criterion;
                self.max_depth = scratch.max_depth;
                self.min_samples_split = scratch.min_samples_split;
                self.min_samples_leaf = scratch.min_samples_leaf;
                self.max_features = scratch.max_features;
            }
            _ => return Err(unknown_parameter(self.name(), name, value)),
        }
        Ok(())
    }

    fn accepts_random_state(&self) -> bool {
        true
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let base_seed = self.random_state.unwrap_or(0);

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let mut tree = self.base_tree().with_random_state(seed.wrapping_mul(31).wrapping_add(1));
                if self.bootstrap {
                    let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                    let x_boot = x.select(Axis(0), &sample);
                    let y_boot = y.select(Axis(0), &sample);
                    tree.fit(&x_boot, &y_boot)?;
                } else {
                    tree.fit(x, y)?;
                }
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(MetaMlError::ModelNotFitted);
        }
        let all: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let predictions = (0..x.nrows()).map(|i| {
            if self.is_classification {
                let mut votes: BTreeMap<i64, f64> = BTreeMap::new();
                for preds in &all {
                    *votes.entry(preds[i].round() as i64).or_insert(0.0) += 1.0;
                }
                majority_label(&votes)
            } else {
                all.iter().map(|p| p[i]).sum::<f64>() / all.len() as f64
            }
        });
        Ok(predictions.collect())
    }
}
