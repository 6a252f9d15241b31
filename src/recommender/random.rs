//! Seeded random ranking

use super::{rank_candidates, History, Recommendations, Recommender, RecommenderConfig, RecommenderSnapshot, ResultSource};
use crate::dataset::DatasetDescriptor;
use crate::error::Result;
use crate::ledger::Observation;
use crate::metafeatures::Metafeatures;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Ranks candidates in a pseudo-random order derived from the seed, the
/// dataset id and the number of updates seen, so the ranking is stable
/// between updates and reproducible for a fixed seed.
#[derive(Debug, Clone)]
pub struct RandomRecommender {
    config: RecommenderConfig,
    seed: u64,
    history: History,
}

impl RandomRecommender {
    pub fn new(config: RecommenderConfig) -> Result<Self> {
        let seed = config.random_state.unwrap_or_else(rand::random);
        Self::from_parts(config, seed, History::default())
    }

    pub(crate) fn from_parts(config: RecommenderConfig, seed: u64, history: History) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, seed, history })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn rng_for(&self, dataset_id: &str) -> ChaCha8Rng {
        let digest = Sha256::digest(dataset_id.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let dataset_hash = u64::from_le_bytes(bytes);
        let round = self.history.n_updates().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        ChaCha8Rng::seed_from_u64(self.seed ^ dataset_hash ^ round)
    }
}

impl Recommender for RandomRecommender {
    fn name(&self) -> &str {
        "RandomRecommender"
    }

    fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    fn update(&mut self, results: &[Observation], descriptors: &[DatasetDescriptor], source: ResultSource) -> Result<()> {
        self.history.record(&self.config.metric, results, descriptors, source);
        Ok(())
    }

    fn recommend(&self, dataset_id: &str, n_recs: usize, _metafeatures: &Metafeatures) -> Result<Recommendations> {
        let mut rng = self.rng_for(dataset_id);
        let expected: Vec<f64> = self.config.candidates.iter().map(|_| rng.gen::<f64>()).collect();
        let evaluated = self.history.evaluated(dataset_id);
        Ok(rank_candidates(&self.config.candidates, &expected, &evaluated, n_recs))
    }

    fn snapshot(&self) -> Result<RecommenderSnapshot> {
        Ok(RecommenderSnapshot::Random {
            config: self.config.clone(),
            seed: self.seed,
            history: self.history.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use crate::recommender::tests::pool;

    fn recommender(seed: u64) -> RandomRecommender {
        RandomRecommender::new(RecommenderConfig::new("accuracy", Mode::Classification, pool(6)).with_random_state(Some(seed)))
            .unwrap()
    }

    #[test]
    fn test_reproducible_for_fixed_seed() {
        let a = recommender(42).recommend("d1", 4, &Metafeatures::new()).unwrap();
        let b = recommender(42).recommend("d1", 4, &Metafeatures::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn test_idempotent_without_update() {
        let rec = recommender(7);
        let first = rec.recommend("d1", 6, &Metafeatures::new()).unwrap();
        let second = rec.recommend("d1", 6, &Metafeatures::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_evaluated_candidates_move_last() {
        let mut rec = recommender(3);
        let first = rec.recommend("d1", 2, &Metafeatures::new()).unwrap();
        let observed: Vec<Observation> = first
            .algorithms
            .iter()
            .zip(&first.parameters)
            .map(|(a, p)| Observation::new("d1", a.clone(), p.clone(), "accuracy", 0.5))
            .collect();
        rec.update(&observed, &[], ResultSource::Live).unwrap();

        let next = rec.recommend("d1", 4, &Metafeatures::new()).unwrap();
        for p in &first.parameters {
            assert!(!next.parameters.contains(p));
        }
    }

    #[test]
    fn test_empty_update_keeps_ranking() {
        let mut rec = recommender(11);
        let before = rec.recommend("d1", 6, &Metafeatures::new()).unwrap();
        rec.update(&[], &[], ResultSource::Live).unwrap();
        assert_eq!(rec.recommend("d1", 6, &Metafeatures::new()).unwrap(), before);
    }

    #[test]
    fn test_snapshot_restores_same_ranking() {
        let rec = recommender(5);
        let restored = rec.snapshot().unwrap().restore().unwrap();
        assert_eq!(
            rec.recommend("d2", 6, &Metafeatures::new()).unwrap(),
            restored.recommend("d2", 6, &Metafeatures::new()).unwrap()
        );
    }
}
