//! Run configuration, loaded from JSON and overridden by CLI flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::store::RetryPolicy;
use crate::threshold::ThresholdSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Experiment directory; results go to `<out_dir>/results`.
    pub out_dir: PathBuf,
    pub suffix: String,
    pub fold: Option<u32>,
    /// `"sigmoid"` or a fixed probability in `[0, 1]`.
    pub threshold: String,
    pub min_area_threshold: usize,
    pub roc_points: usize,
    pub borderzone_distance: f32,
    /// Distance assigned to vertices of subjects without a distance map.
    pub max_distance: f32,
    pub mc_dropout: McDropoutConfig,
    pub saliency: SaliencyConfig,
    pub sigmoid_search: SigmoidGrid,
    /// Names for the feature columns in the saliency report.
    pub feature_names: Vec<String>,
    pub store_format: StoreFormat,
    pub retry: RetryPolicy,
    /// Reuse predictions already present in the results store.
    pub reuse_predictions: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            suffix: String::new(),
            fold: None,
            threshold: "0.5".to_string(),
            min_area_threshold: 100,
            roc_points: 51,
            borderzone_distance: 20.0,
            max_distance: 200.0,
            mc_dropout: McDropoutConfig::default(),
            saliency: SaliencyConfig::default(),
            sigmoid_search: SigmoidGrid::default(),
            feature_names: Vec::new(),
            store_format: StoreFormat::Binary,
            retry: RetryPolicy::default(),
            reuse_predictions: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McDropoutConfig {
    pub repetitions: usize,
    /// Probability of dropping a feature column.
    pub p: f32,
    pub seed: u64,
}

impl Default for McDropoutConfig {
    fn default() -> Self {
        Self {
            repetitions: 1,
            p: 0.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaliencyConfig {
    pub steps: usize,
    pub batch_size: usize,
}

impl Default for SaliencyConfig {
    fn default() -> Self {
        Self {
            steps: 25,
            batch_size: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidGrid {
    pub ymin: Vec<f32>,
    pub ymax: Vec<f32>,
    pub k: Vec<f32>,
    pub m: Vec<f32>,
}

impl Default for SigmoidGrid {
    fn default() -> Self {
        Self {
            ymin: vec![0.01, 0.05, 0.1, 0.2],
            ymax: vec![0.3, 0.5, 0.7, 0.9],
            k: vec![0.5, 1.0, 2.0, 4.0],
            m: vec![5.0, 10.0, 20.0, 40.0],
        }
    }
}

impl SigmoidGrid {
    pub fn len(&self) -> usize {
        self.ymin.len() * self.ymax.len() * self.k.len() * self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    Binary,
    Hdf5,
}

impl StoreFormat {
    pub fn extension(self) -> &'static str {
        match self {
            StoreFormat::Binary => "bin",
            StoreFormat::Hdf5 => "hdf5",
        }
    }
}

impl EvalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: EvalConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ThresholdSpec::parse(&self.threshold)?;
        if self.roc_points < 2 {
            bail!("roc_points must be at least 2, got {}", self.roc_points);
        }
        if self.mc_dropout.repetitions == 0 {
            bail!("mc_dropout.repetitions must be at least 1");
        }
        if !(0.0..1.0).contains(&self.mc_dropout.p) {
            bail!("mc_dropout.p must lie in [0, 1), got {}", self.mc_dropout.p);
        }
        if self.saliency.steps == 0 || self.saliency.batch_size == 0 {
            bail!("saliency steps and batch_size must be positive");
        }
        if self.suffix.contains('/') {
            bail!("suffix must not contain '/'");
        }
        Ok(())
    }

    pub fn results_dir(&self) -> PathBuf {
        self.out_dir.join("results")
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.results_dir().join(format!(
            "predictions{}.{}",
            self.suffix,
            self.store_format.extension()
        ))
    }

    pub fn test_results_path(&self) -> PathBuf {
        let name = match self.fold {
            Some(fold) => format!("test_results_{}{}.csv", fold, self.suffix),
            None => format!("test_results{}.csv", self.suffix),
        };
        self.results_dir().join(name)
    }

    pub fn sigmoid_params_path(&self) -> PathBuf {
        self.results_dir().join("sigmoid_parameters.csv")
    }

    pub fn saliency_path(&self) -> PathBuf {
        self.results_dir()
            .join(format!("saliency{}.csv", self.suffix))
    }

    pub fn roc_path(&self) -> PathBuf {
        self.results_dir()
            .join(format!("roc_curves{}.json", self.suffix))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.results_dir()
            .join(format!("summary{}.json", self.suffix))
    }
}
