//! Dataset metafeatures
//!
//! A metafeature vector is a fixed set of named numeric descriptors of a
//! dataset. Recommenders compare datasets through these vectors.

use crate::error::Result;
use crate::mode::Mode;
use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeMap;

/// Named numeric descriptors of a dataset
pub type Metafeatures = BTreeMap<String, f64>;

/// Computes the metafeature vector of a dataset
pub trait MetafeatureProvider: Send + Sync {
    fn compute(&self, x: &Array2<f64>, y: &Array1<f64>, mode: Mode) -> Result<Metafeatures>;
}

/// Default provider: shape, class balance and per-feature moment aggregates
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalMetafeatures;

impl StatisticalMetafeatures {
    pub fn new() -> Self {
        Self
    }
}

impl MetafeatureProvider for StatisticalMetafeatures {
    fn compute(&self, x: &Array2<f64>, y: &Array1<f64>, mode: Mode) -> Result<Metafeatures> {
        let n_rows = x.nrows() as f64;
        let n_cols = x.ncols() as f64;

        let mut mf = Metafeatures::new();
        mf.insert("n_rows".to_string(), n_rows);
        mf.insert("n_columns".to_string(), n_cols);
        mf.insert(
            "ratio_rows_columns".to_string(),
            if n_cols > 0.0 { n_rows / n_cols } else { 0.0 },
        );

        let moments: Vec<Moments> = x.axis_iter(Axis(1)).map(|col| Moments::of(col.iter().copied())).collect();
        let means: Vec<f64> = moments.iter().map(|m| m.mean).collect();
        let stds: Vec<f64> = moments.iter().map(|m| m.std).collect();
        let skews: Vec<f64> = moments.iter().map(|m| m.skew).collect();
        let kurts: Vec<f64> = moments.iter().map(|m| m.kurtosis).collect();

        insert_summary(&mut mf, "feature_mean", &means);
        insert_summary(&mut mf, "feature_std", &stds);
        insert_summary(&mut mf, "feature_skew", &skews);
        insert_summary(&mut mf, "feature_kurtosis", &kurts);

        let target = Moments::of(y.iter().copied());
        let correlations: Vec<f64> = x
            .axis_iter(Axis(1))
            .zip(moments.iter())
            .map(|(col, m)| {
                if m.std == 0.0 || target.std == 0.0 {
                    return 0.0;
                }
                let cov = col
                    .iter()
                    .zip(y.iter())
                    .map(|(a, b)| (a - m.mean) * (b - target.mean))
                    .sum::<f64>()
                    / n_rows;
                (cov / (m.std * target.std)).abs()
            })
            .collect();
        insert_summary(&mut mf, "abs_corr_with_target", &correlations);

        match mode {
            Mode::Classification => {
                let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
                for &v in y.iter() {
                    *counts.entry(v.round() as i64).or_insert(0) += 1;
                }
                let probs: Vec<f64> = counts.values().map(|&c| c as f64 / n_rows).collect();
                let entropy = -probs.iter().filter(|p| **p > 0.0).map(|p| p * p.ln()).sum::<f64>();
                mf.insert("n_classes".to_string(), counts.len() as f64);
                insert_summary(&mut mf, "class_prob", &probs);
                mf.insert("class_entropy".to_string(), entropy);
            }
            Mode::Regression => {
                mf.insert("n_classes".to_string(), 0.0);
                mf.insert("target_mean".to_string(), target.mean);
                mf.insert("target_std".to_string(), target.std);
                mf.insert("target_skew".to_string(), target.skew);
            }
        }

        Ok(mf)
    }
}

/// Population moments of a sample
#[derive(Debug, Clone, Copy)]
struct Moments {
    mean: f64,
    std: f64,
    skew: f64,
    kurtosis: f64,
}

impl Moments {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.collect();
        let n = values.len() as f64;
        if values.is_empty() {
            return Self { mean: 0.0, std: 0.0, skew: 0.0, kurtosis: 0.0 };
        }
        let mean = values.iter().sum::<f64>() / n;
        let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = m2.sqrt();
        if std == 0.0 {
            return Self { mean, std, skew: 0.0, kurtosis: 0.0 };
        }
        let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
        let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
        Self {
            mean,
            std,
            skew: m3 / std.powi(3),
            kurtosis: m4 / (m2 * m2) - 3.0,
        }
    }
}

fn insert_summary(mf: &mut Metafeatures, prefix: &str, values: &[f64]) {
    let (min, max, mean) = if values.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (
            values.iter().copied().fold(f64::INFINITY, f64::min),
            values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            values.iter().sum::<f64>() / values.len() as f64,
        )
    };
    mf.insert(format!("{}_min", prefix), min);
    mf.insert(format!("{}_max", prefix), max);
    mf.insert(format!("{}_mean", prefix), mean);
}
