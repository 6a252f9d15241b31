//! Metafeature nearest-neighbour ranking

use super::{rank_candidates, History, Recommendations, Recommender, RecommenderConfig, RecommenderSnapshot, ResultSource};
use crate::dataset::DatasetDescriptor;
use crate::error::{MetaMlError, Result};
use crate::ledger::Observation;
use crate::metafeatures::Metafeatures;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Default number of neighbouring datasets consulted
pub const DEFAULT_META_NEIGHBORS: usize = 5;

/// Finds the historical datasets closest to the target in z-scored
/// metafeature space and ranks candidates by their mean score there.
/// Falls back to the global candidate mean, then the overall mean.
#[derive(Debug, Clone)]
pub struct KnnMetaRecommender {
    config: RecommenderConfig,
    n_neighbors: usize,
    history: History,
}

impl KnnMetaRecommender {
    pub fn new(config: RecommenderConfig) -> Result<Self> {
        Self::from_parts(config, DEFAULT_META_NEIGHBORS, History::default())
    }

    pub(crate) fn from_parts(config: RecommenderConfig, n_neighbors: usize, history: History) -> Result<Self> {
        config.validate()?;
        if n_neighbors == 0 {
            return Err(MetaMlError::RecommenderError(
                "n_neighbors must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            config,
            n_neighbors,
            history,
        })
    }

    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors.max(1);
        self
    }

    /// Ids of the nearest scored datasets other than `dataset_id`, closest first
    pub fn neighbors(&self, dataset_id: &str, metafeatures: &Metafeatures) -> Vec<String> {
        let others: Vec<(&String, &Metafeatures)> = self
            .history
            .metafeatures()
            .iter()
            .filter(|(id, _)| id.as_str() != dataset_id && self.history.dataset_scores(id).is_some())
            .collect();
        if others.is_empty() || metafeatures.is_empty() {
            return Vec::new();
        }

        // Per-feature mean and std over the target plus the history
        let stats: BTreeMap<&str, (f64, f64)> = metafeatures
            .iter()
            .map(|(name, &target)| {
                let values: Vec<f64> = std::iter::once(target)
                    .chain(others.iter().filter_map(|(_, mf)| mf.get(name).copied()))
                    .filter(|v| v.is_finite())
                    .collect();
                let n = values.len().max(1) as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                (name.as_str(), (mean, var.sqrt()))
            })
            .collect();

        let z = |name: &str, value: Option<f64>| -> f64 {
            match (stats.get(name), value) {
                (Some(&(mean, std)), Some(v)) if v.is_finite() && std > 0.0 => (v - mean) / std,
                _ => 0.0,
            }
        };

        let mut distances: Vec<(f64, &String)> = others
            .iter()
            .map(|(id, mf)| {
                let d2: f64 = metafeatures
                    .iter()
                    .map(|(name, &target)| {
                        let diff = z(name, Some(target)) - z(name, mf.get(name).copied());
                        diff * diff
                    })
                    .sum();
                (d2.sqrt(), *id)
            })
            .collect();
        distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal).then_with(|| a.1.cmp(b.1)));

        distances
            .into_iter()
            .take(self.n_neighbors)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

impl Recommender for KnnMetaRecommender {
    fn name(&self) -> &str {
        "KnnMetaRecommender"
    }

    fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    fn update(&mut self, results: &[Observation], descriptors: &[DatasetDescriptor], source: ResultSource) -> Result<()> {
        self.history.record(&self.config.metric, results, descriptors, source);
        Ok(())
    }

    fn recommend(&self, dataset_id: &str, n_recs: usize, metafeatures: &Metafeatures) -> Result<Recommendations> {
        let neighbors = self.neighbors(dataset_id, metafeatures);
        debug!(dataset = dataset_id, neighbors = ?neighbors, "Nearest datasets");

        let global = self.history.candidate_means();
        let prior = self.history.overall_mean().unwrap_or(0.0);
        let expected: Vec<f64> = self
            .config
            .candidates
            .iter()
            .map(|c| {
                let key = c.key();
                let local: Vec<f64> = neighbors
                    .iter()
                    .filter_map(|id| self.history.dataset_scores(id)?.get(&key)?.mean())
                    .collect();
                if local.is_empty() {
                    global.get(key.as_str()).copied().unwrap_or(prior)
                } else {
                    local.iter().sum::<f64>() / local.len() as f64
                }
            })
            .collect();

        let evaluated = self.history.evaluated(dataset_id);
        Ok(rank_candidates(&self.config.candidates, &expected, &evaluated, n_recs))
    }

    fn snapshot(&self) -> Result<RecommenderSnapshot> {
        Ok(RecommenderSnapshot::KnnMeta {
            config: self.config.clone(),
            n_neighbors: self.n_neighbors,
            history: self.history.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use crate::recommender::tests::pool;

    fn mf(rows: f64, cols: f64) -> Metafeatures {
        Metafeatures::from([("n_rows".to_string(), rows), ("n_columns".to_string(), cols)])
    }

    fn observe(k: i64, dataset: &str, value: f64) -> Observation {
        let c = &pool(3)[(k - 1) as usize];
        Observation::new(dataset, c.algorithm.clone(), c.parameters.clone(), "accuracy", value)
    }

    fn trained() -> KnnMetaRecommender {
        let mut rec = KnnMetaRecommender::new(RecommenderConfig::new("accuracy", Mode::Classification, pool(3)))
            .unwrap()
            .with_n_neighbors(1);
        rec.update(
            &[
                observe(1, "small", 0.9),
                observe(2, "small", 0.3),
                observe(1, "large", 0.2),
                observe(2, "large", 0.8),
            ],
            &[
                DatasetDescriptor::new("small", mf(100.0, 5.0)),
                DatasetDescriptor::new("large", mf(100_000.0, 50.0)),
            ],
            ResultSource::Knowledgebase,
        )
        .unwrap();
        rec
    }

    #[test]
    fn test_nearest_dataset_drives_ranking() {
        let rec = trained();
        assert_eq!(rec.neighbors("target", &mf(120.0, 6.0)), vec!["small".to_string()]);
        let recs = rec.recommend("target", 2, &mf(120.0, 6.0)).unwrap();
        assert_eq!(recs.parameters[0]["n_neighbors"].as_i64(), Some(1));

        let recs = rec.recommend("target", 2, &mf(90_000.0, 45.0)).unwrap();
        assert_eq!(recs.parameters[0]["n_neighbors"].as_i64(), Some(2));
    }

    #[test]
    fn test_no_metafeatures_falls_back_to_global_mean() {
        let rec = trained();
        assert!(rec.neighbors("target", &Metafeatures::new()).is_empty());
        let recs = rec.recommend("target", 3, &Metafeatures::new()).unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs.scores.iter().all(|s| (s - 0.55).abs() < 1e-9));
    }

    #[test]
    fn test_empty_update_keeps_ranking() {
        let mut rec = trained();
        let target = mf(120.0, 6.0);
        let before = rec.recommend("target", 3, &target).unwrap();

        rec.update(&[], &[DatasetDescriptor::new("target", target.clone())], ResultSource::Live)
            .unwrap();
        assert_eq!(rec.recommend("target", 3, &target).unwrap(), before);
        assert_eq!(rec.neighbors("target", &target), vec!["small".to_string()]);
    }

    #[test]
    fn test_zero_neighbors_rejected() {
        let config = RecommenderConfig::new("accuracy", Mode::Classification, pool(1));
        assert!(KnnMetaRecommender::from_parts(config, 0, History::default()).is_err());
    }
}
