//! Ranking by mean historical score

use super::{rank_candidates, History, Recommendations, Recommender, RecommenderConfig, RecommenderSnapshot, ResultSource};
use crate::dataset::DatasetDescriptor;
use crate::error::Result;
use crate::ledger::Observation;
use crate::metafeatures::Metafeatures;

/// Expected score of a candidate is its mean score across every dataset in
/// the history. Candidates never observed get the overall mean.
#[derive(Debug, Clone)]
pub struct AverageRecommender {
    config: RecommenderConfig,
    history: History,
}

impl AverageRecommender {
    pub fn new(config: RecommenderConfig) -> Result<Self> {
        Self::from_parts(config, History::default())
    }

    pub(crate) fn from_parts(config: RecommenderConfig, history: History) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, history })
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}

impl Recommender for AverageRecommender {
    fn name(&self) -> &str {
        "AverageRecommender"
    }

    fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    fn update(&mut self, results: &[Observation], descriptors: &[DatasetDescriptor], source: ResultSource) -> Result<()> {
        self.history.record(&self.config.metric, results, descriptors, source);
        Ok(())
    }

    fn recommend(&self, dataset_id: &str, n_recs: usize, _metafeatures: &Metafeatures) -> Result<Recommendations> {
        let means = self.history.candidate_means();
        let prior = self.history.overall_mean().unwrap_or(0.0);
        let expected: Vec<f64> = self
            .config
            .candidates
            .iter()
            .map(|c| means.get(c.key().as_str()).copied().unwrap_or(prior))
            .collect();
        let evaluated = self.history.evaluated(dataset_id);
        Ok(rank_candidates(&self.config.candidates, &expected, &evaluated, n_recs))
    }

    fn snapshot(&self) -> Result<RecommenderSnapshot> {
        Ok(RecommenderSnapshot::Average {
            config: self.config.clone(),
            history: self.history.clone(),
        })
    }
}
