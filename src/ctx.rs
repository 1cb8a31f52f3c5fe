use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::EvalConfig;
use crate::mesh::{Cohort, HemiPair};
use crate::metrics::{RocCurves, SigmoidSearchResult, SubjectStats};
use crate::predict::{FeatureMatrix, LesionModel};
use crate::saliency::ClusterAttribution;
use crate::store::PredictionStore;
use crate::threshold::ThresholdParameters;

/// Everything known about one subject. Per-vertex vectors are cortex-only
/// and hemisphere-concatenated (`2 * Vc`); features stay full-length per
/// hemisphere because the model runs on the whole mesh.
#[derive(Debug, Clone, Default)]
pub struct SubjectRecord {
    pub labels: Vec<bool>,
    /// Ground-truth distance to the lesion boundary.
    pub boundary_distance: Option<Vec<f32>>,
    pub features: Option<HemiPair<FeatureMatrix>>,
    pub prediction: Option<Vec<f32>>,
    /// Predicted distance map; NaN when the model has no distance head.
    pub distance_map: Option<Vec<f32>>,
    pub clustered: Option<Vec<u32>>,
    pub stats: Option<SubjectStats>,
}

impl SubjectRecord {
    pub fn is_patient(&self) -> bool {
        self.labels.iter().any(|&l| l)
    }
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub results_dir: PathBuf,
    pub predictions: PathBuf,
    pub test_results: PathBuf,
    pub sigmoid_params: PathBuf,
    pub saliency: PathBuf,
    pub roc: PathBuf,
    pub summary: PathBuf,
}

impl OutputPaths {
    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            results_dir: config.results_dir(),
            predictions: config.predictions_path(),
            test_results: config.test_results_path(),
            sigmoid_params: config.sigmoid_params_path(),
            saliency: config.saliency_path(),
            roc: config.roc_path(),
            summary: config.summary_path(),
        }
    }
}

pub struct Ctx {
    pub command: String,
    pub config: EvalConfig,
    pub mesh_dir: PathBuf,
    pub inputs_path: PathBuf,
    pub requested_subjects: Vec<String>,
    pub threads: usize,
    pub cohort: Option<Cohort>,
    pub model: Option<Box<dyn LesionModel>>,
    pub subject_ids: Vec<String>,
    pub subjects: BTreeMap<String, SubjectRecord>,
    pub threshold: Option<ThresholdParameters>,
    pub roc: Option<RocCurves>,
    pub sigmoid_search: Option<SigmoidSearchResult>,
    pub saliency: Vec<ClusterAttribution>,
    pub saliency_supported: Option<bool>,
    pub warnings: Vec<String>,
    pub output: OutputPaths,
}

impl Ctx {
    pub fn new(
        command: &str,
        config: EvalConfig,
        mesh_dir: PathBuf,
        inputs_path: PathBuf,
        requested_subjects: Vec<String>,
    ) -> Self {
        let output = OutputPaths::from_config(&config);
        Self {
            command: command.to_string(),
            config,
            mesh_dir,
            inputs_path,
            requested_subjects,
            threads: 0,
            cohort: None,
            model: None,
            subject_ids: Vec::new(),
            subjects: BTreeMap::new(),
            threshold: None,
            roc: None,
            sigmoid_search: None,
            saliency: Vec::new(),
            saliency_supported: None,
            warnings: Vec::new(),
            output,
        }
    }

    pub fn cohort(&self) -> Result<&Cohort> {
        self.cohort.as_ref().context("mesh not loaded")
    }

    pub fn results_store(&self) -> Result<PredictionStore> {
        Ok(PredictionStore::new(
            self.output.predictions.clone(),
            self.cohort()?.n_vertices(),
            self.config.retry,
        ))
    }

    pub fn inputs_store(&self) -> Result<PredictionStore> {
        Ok(PredictionStore::new(
            self.inputs_path.clone(),
            self.cohort()?.n_vertices(),
            self.config.retry,
        ))
    }

    pub fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}
