//! Historical results used to bootstrap a recommender
//!
//! Two JSON documents make up a knowledgebase:
//! - results: `[{"_id": .., "algorithm": .., "parameters": {..}, "category": .., "<metric>": value, ..}]`
//! - metafeatures: `[{"_id": .., "<name>": value, ..}]`

use crate::dataset::DatasetDescriptor;
use crate::error::{MetaMlError, Result};
use crate::ledger::Observation;
use crate::metafeatures::Metafeatures;
use crate::mode::Mode;
use crate::params::ParamMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ResultRecord {
    #[serde(rename = "_id")]
    dataset_id: String,
    algorithm: String,
    #[serde(default)]
    parameters: ParamMap,
    #[serde(default)]
    category: Option<Mode>,
    #[serde(flatten)]
    metrics: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MetafeatureRecord {
    #[serde(rename = "_id")]
    dataset_id: String,
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

/// Historical observations and the metafeatures of the datasets they ran on
#[derive(Debug, Clone, Default)]
pub struct Knowledgebase {
    results: Vec<Observation>,
    descriptors: Vec<DatasetDescriptor>,
}

impl Knowledgebase {
    /// Load both documents from disk, keeping results for `mode` that carry `metric_key`
    pub fn load(
        results_path: impl AsRef<Path>,
        metafeatures_path: impl AsRef<Path>,
        mode: Mode,
        metric_key: &str,
    ) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                MetaMlError::KnowledgebaseError(format!("cannot read {}: {}", path.display(), e))
            })
        };
        let results = read(results_path.as_ref())?;
        let metafeatures = read(metafeatures_path.as_ref())?;
        Self::from_json_str(&results, &metafeatures, mode, metric_key)
    }

    pub fn from_json_str(results_json: &str, metafeatures_json: &str, mode: Mode, metric_key: &str) -> Result<Self> {
        let records: Vec<ResultRecord> = serde_json::from_str(results_json)
            .map_err(|e| MetaMlError::KnowledgebaseError(format!("malformed results document: {}", e)))?;
        let mf_records: Vec<MetafeatureRecord> = serde_json::from_str(metafeatures_json)
            .map_err(|e| MetaMlError::KnowledgebaseError(format!("malformed metafeatures document: {}", e)))?;

        let n_records = records.len();
        let results: Vec<Observation> = records
            .into_iter()
            .filter(|r| r.category.map_or(true, |c| c == mode))
            .filter_map(|r| {
                let value = r.metrics.get(metric_key).and_then(Value::as_f64)?;
                value.is_finite().then(|| {
                    Observation::new(r.dataset_id, r.algorithm, r.parameters, metric_key, value)
                })
            })
            .collect();
        debug!(
            total = n_records,
            kept = results.len(),
            metric = metric_key,
            mode = %mode,
            "Filtered knowledgebase results"
        );

        let descriptors = mf_records
            .into_iter()
            .map(|r| {
                let metafeatures: Metafeatures = r
                    .values
                    .iter()
                    .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                    .collect();
                DatasetDescriptor::new(r.dataset_id, metafeatures)
            })
            .collect();

        Ok(Self::from_parts(results, descriptors))
    }

    /// Assemble from in-memory parts. Descriptors are deduplicated by dataset
    /// id (first occurrence wins) and restricted to datasets with results.
    pub fn from_parts(results: Vec<Observation>, descriptors: Vec<DatasetDescriptor>) -> Self {
        let with_results: BTreeSet<&str> = results.iter().map(|r| r.dataset_id.as_str()).collect();
        let mut seen = BTreeSet::new();
        let descriptors: Vec<DatasetDescriptor> = descriptors
            .into_iter()
            .filter(|d| with_results.contains(d.id.as_str()))
            .filter(|d| seen.insert(d.id.clone()))
            .collect();

        info!(
            n_results = results.len(),
            n_datasets = descriptors.len(),
            "Knowledgebase loaded"
        );
        Self { results, descriptors }
    }

    pub fn results(&self) -> &[Observation] {
        &self.results
    }

    pub fn descriptors(&self) -> &[DatasetDescriptor] {
        &self.descriptors
    }

    pub fn metafeatures_of(&self, dataset_id: &str) -> Option<&Metafeatures> {
        self.descriptors
            .iter()
            .find(|d| d.id == dataset_id)
            .map(|d| &d.metafeatures)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of result records
    pub fn len(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use std::io::Write;

    const RESULTS: &str = r#"[
        {"_id": "d1", "algorithm": "GaussianNB", "parameters": {}, "category": "classification", "accuracy": 0.8, "bal_accuracy": 0.7},
        {"_id": "d1", "algorithm": "DecisionTreeClassifier", "parameters": {"max_depth": 3}, "accuracy": 0.9},
        {"_id": "d2", "algorithm": "Ridge", "parameters": {"alpha": 1.0}, "category": "regression", "accuracy": 0.1},
        {"_id": "d3", "algorithm": "GaussianNB", "parameters": {}, "bal_accuracy": 0.5}
    ]"#;

    const METAFEATURES: &str = r#"[
        {"_id": "d1", "n_rows": 100, "n_columns": 4, "note": "text is ignored"},
        {"_id": "d1", "n_rows": 999, "n_columns": 4},
        {"_id": "d2", "n_rows": 50, "n_columns": 2},
        {"_id": "d4", "n_rows": 10, "n_columns": 1}
    ]"#;

    #[test]
    fn test_filters_by_mode_and_metric() {
        let kb = Knowledgebase::from_json_str(RESULTS, METAFEATURES, Mode::Classification, "accuracy").unwrap();
        assert_eq!(kb.len(), 2);
        assert!(kb.results().iter().all(|r| r.dataset_id == "d1" && r.metric == "accuracy"));
        assert_eq!(kb.results()[1].parameters["max_depth"], ParamValue::Int(3));
    }

    #[test]
    fn test_metafeatures_deduplicated_and_restricted() {
        let kb = Knowledgebase::from_json_str(RESULTS, METAFEATURES, Mode::Classification, "accuracy").unwrap();
        assert_eq!(kb.descriptors().len(), 1);
        let mf = kb.metafeatures_of("d1").unwrap();
        assert_eq!(mf["n_rows"], 100.0);
        assert!(!mf.contains_key("note"));
        assert!(kb.metafeatures_of("d4").is_none());
    }

    #[test]
    fn test_load_from_files() {
        let mut results = tempfile::NamedTempFile::new().unwrap();
        results.write_all(RESULTS.as_bytes()).unwrap();
        let mut mf = tempfile::NamedTempFile::new().unwrap();
        mf.write_all(METAFEATURES.as_bytes()).unwrap();

        let kb = Knowledgebase::load(results.path(), mf.path(), Mode::Classification, "bal_accuracy").unwrap();
        let ids: Vec<&str> = kb.results().iter().map(|r| r.dataset_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);
    }

    #[test]
    fn test_missing_file() {
        let result = Knowledgebase::load("/nonexistent/r.json", "/nonexistent/m.json", Mode::Regression, "r2_cv_mean");
        assert!(matches!(result, Err(MetaMlError::KnowledgebaseError(_))));
    }
}
