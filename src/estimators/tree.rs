//! CART decision tree for classification and regression

use super::{check_fit_input, check_n_features, expect_seed, majority_label, unknown_parameter, Estimator};
use crate::error::{MetaMlError, Result};
use crate::params::{expect_optional_usize, expect_str, expect_usize, invalid_parameter, ParamValue};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Shannon entropy (classification)
    Entropy,
    /// Variance (regression)
    SquaredError,
}

/// Number of features examined at each split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Fixed(usize),
    Fraction(f64),
}

impl MaxFeatures {
    pub(crate) fn resolve(&self, n_features: usize) -> usize {
        let k = match *self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
        };
        k.clamp(1, n_features.max(1))
    }

    pub(crate) fn from_param(name: &str, value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Null => Ok(MaxFeatures::All),
            ParamValue::Str(s) => match s.as_str() {
                "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                _ => Err(invalid_parameter(name, value, "expected sqrt, log2, a count or a fraction")),
            },
            ParamValue::Int(n) if *n >= 1 => Ok(MaxFeatures::Fixed(*n as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            _ => Err(invalid_parameter(name, value, "expected sqrt, log2, a count or a fraction")),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    n_features: usize,
    is_classification: bool,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::classifier()
    }
}

impl DecisionTree {
    pub fn classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            is_classification: true,
        }
    }

    pub fn regressor() -> Self {
        Self {
            criterion: Criterion::SquaredError,
            is_classification: false,
            ..Self::classifier()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn is_classification(&self) -> bool {
        self.is_classification
    }

    /// Depth of the fitted tree; a lone leaf has depth 0
    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }

    fn parse_criterion(&self, value: &ParamValue) -> Result<Criterion> {
        let name = expect_str("criterion", value)?;
        match (self.is_classification, name) {
            (true, "gini") => Ok(Criterion::Gini),
            (true, "entropy") | (true, "log_loss") => Ok(Criterion::Entropy),
            (false, "squared_error") | (false, "mse") => Ok(Criterion::SquaredError),
            _ => Err(invalid_parameter("criterion", value, "unsupported criterion for this task")),
        }
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let stats = NodeStats::collect(indices.iter().map(|&i| y[i]));
        let n_samples = indices.len();

        let stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || stats.impurity(self.criterion) <= 0.0;
        if stop {
            return self.leaf(&stats);
        }

        let features = self.feature_subset(x.ncols(), rng);
        let Some((feature_idx, threshold)) = self.best_split(x, y, indices, &features, &stats) else {
            return self.leaf(&stats);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature_idx]] <= threshold);

        let left = Box::new(self.build(x, y, &left_idx, depth + 1, rng));
        let right = Box::new(self.build(x, y, &right_idx, depth + 1, rng));
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    fn feature_subset(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let k = self.max_features.resolve(n_features);
        if k >= n_features {
            return (0..n_features).collect();
        }
        let mut subset = rand::seq::index::sample(rng, n_features, k).into_vec();
        subset.sort_unstable();
        subset
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
        parent: &NodeStats,
    ) -> Option<(usize, f64)> {
        let n = indices.len() as f64;
        let parent_impurity = parent.impurity(self.criterion);

        // Each feature is scanned independently with a single sorted sweep
        let per_feature: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&f| {
                let mut order = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, f]].partial_cmp(&x[[b, f]]).unwrap_or(Ordering::Equal));

                let mut left = NodeStats::default();
                let mut best: Option<(f64, f64)> = None;
                for w in 0..order.len().saturating_sub(1) {
                    left.push(y[order[w]]);
                    let (cur, next) = (x[[order[w], f]], x[[order[w + 1], f]]);
                    if cur == next {
                        continue;
                    }
                    let n_left = w + 1;
                    let n_right = order.len() - n_left;
                    if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                        continue;
                    }
                    let right = parent.minus(&left);
                    let weighted = (n_left as f64 * left.impurity(self.criterion)
                        + n_right as f64 * right.impurity(self.criterion))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > best.map_or(0.0, |(g, _)| g) {
                        best = Some((gain, (cur + next) / 2.0));
                    }
                }
                best.map(|(gain, threshold)| (f, threshold, gain))
            })
            .collect();

        // Highest gain wins; the lowest feature index breaks ties
        per_feature
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
            .map(|(f, t, _)| (f, t))
    }

    fn leaf(&self, stats: &NodeStats) -> TreeNode {
        let value = if self.is_classification {
            let weights: BTreeMap<i64, f64> = stats.classes.iter().map(|(&c, &n)| (c, n as f64)).collect();
            majority_label(&weights)
        } else if stats.count > 0 {
            stats.sum / stats.count as f64
        } else {
            0.0
        };
        TreeNode::Leaf {
            value,
            n_samples: stats.count,
        }
    }

    fn predict_row(root: &TreeNode, row: ndarray::ArrayView1<f64>) -> f64 {
        let mut node = root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }
}

impl Estimator for DecisionTree {
    fn name(&self) -> &str {
        if self.is_classification {
            "DecisionTreeClassifier"
        } else {
            "DecisionTreeRegressor"
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "criterion" => self.criterion = self.parse_criterion(value)?,
            "max_depth" => self.max_depth = expect_optional_usize(name, value)?,
            "min_samples_split" => {
                let v = expect_usize(name, value)?;
                if v < 2 {
                    return Err(invalid_parameter(name, value, "must be at least 2"));
                }
                self.min_samples_split = v;
            }
            "min_samples_leaf" => {
                let v = expect_usize(name, value)?;
                if v < 1 {
                    return Err(invalid_parameter(name, value, "must be at least 1"));
                }
                self.min_samples_leaf = v;
            }
            "max_features" => self.max_features = MaxFeatures::from_param(name, value)?,
            "random_state" => self.random_state = expect_seed(name, value)?,
            _ => return Err(unknown_parameter(self.name(), name, value)),
        }
        Ok(())
    }

    fn accepts_random_state(&self) -> bool {
        true
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, y, &indices, 0, &mut rng));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(MetaMlError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| Self::predict_row(root, row)).collect())
    }
}

/// Running sufficient statistics of the targets in a node
#[derive(Debug, Clone, Default)]
struct NodeStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    classes: BTreeMap<i64, usize>,
}

impl NodeStats {
    fn collect(values: impl Iterator<Item = f64>) -> Self {
        let mut stats = Self::default();
        for v in values {
            stats.push(v);
        }
        stats
    }

    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sq_sum += v * v;
        *self.classes.entry(v.round() as i64).or_insert(0) += 1;
    }

    fn minus(&self, other: &Self) -> Self {
        let classes = self
            .classes
            .iter()
            .map(|(&c, &n)| (c, n - other.classes.get(&c).copied().unwrap_or(0)))
            .filter(|(_, n)| *n > 0)
            .collect();
        Self {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sq_sum: self.sq_sum - other.sq_sum,
            classes,
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => 1.0 - self.classes.values().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            Criterion::Entropy => -self
                .classes
                .values()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            Criterion::SquaredError => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}
