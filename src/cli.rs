use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::EvalConfig;

#[derive(Debug, Parser)]
#[command(
    name = "fcd-lesion-eval",
    version,
    about = "FCD lesion prediction post-processing and evaluation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// MC-dropout inference; writes prediction and distance_map to the results store
    Predict(PredictArgs),
    /// Threshold and cluster stored predictions
    Cluster(CommonArgs),
    /// Cluster, score every subject and write ROC curves
    Evaluate(EvaluateArgs),
    /// Grid-search the distance sigmoid and save its parameters
    OptimizeThreshold(EvaluateArgs),
    /// Per-cluster integrated-gradients attribution
    Saliency(PredictArgs),
    /// Predict, cluster and evaluate in one go
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    #[arg(long, help = "Input store with features, labels and distance_map per subject")]
    pub inputs: PathBuf,

    #[arg(long, help = "Directory with adjacency.tsv[.gz] and cortex.label[.gz]")]
    pub mesh_dir: PathBuf,

    #[arg(long, help = "Experiment directory; results go to <out>/results")]
    pub out: Option<PathBuf>,

    #[arg(long, help = "JSON run configuration")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        num_args = 1..,
        help = "Subject ids, or a file with one id per line (default: all in --inputs)"
    )]
    pub subjects: Vec<String>,

    #[arg(long)]
    pub suffix: Option<String>,

    #[arg(long)]
    pub fold: Option<u32>,

    #[arg(long, help = "Fixed probability in [0, 1] or 'sigmoid'")]
    pub threshold: Option<String>,

    #[arg(long, help = "Minimum cluster size in vertices")]
    pub min_area: Option<usize>,

    #[arg(long, default_value_t = 0, help = "Number of threads (0 = auto)")]
    pub threads: usize,
}

#[derive(Debug, Clone, Args)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, help = "Model weights (JSON); used when a prediction is not stored")]
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct PredictArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, help = "Model weights (JSON)")]
    pub model: PathBuf,

    #[arg(long, help = "MC dropout repetitions")]
    pub repetitions: Option<usize>,

    #[arg(long, help = "MC dropout probability")]
    pub dropout: Option<f32>,

    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub predict: PredictArgs,

    #[arg(long, default_value_t = false, help = "Also compute per-cluster saliency")]
    pub saliency: bool,

    #[arg(long, default_value_t = false, help = "Recompute predictions even if stored")]
    pub force: bool,
}

impl CommonArgs {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn build_config(&self) -> Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::load(path)?,
            None => EvalConfig::default(),
        };
        if let Some(out) = &self.out {
            config.out_dir = out.clone();
        }
        if let Some(suffix) = &self.suffix {
            config.suffix = suffix.clone();
        }
        if self.fold.is_some() {
            config.fold = self.fold;
        }
        if let Some(threshold) = &self.threshold {
            config.threshold = threshold.clone();
        }
        if let Some(min_area) = self.min_area {
            config.min_area_threshold = min_area;
        }
        Ok(config)
    }

    /// Expands a single existing file argument into the ids it lists.
    pub fn subject_ids(&self) -> Result<Vec<String>> {
        if let [single] = self.subjects.as_slice() {
            let path = Path::new(single);
            if path.is_file() {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read subject list {}", path.display()))?;
                return Ok(text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect());
            }
        }
        Ok(self.subjects.clone())
    }
}

impl PredictArgs {
    pub fn apply_dropout(&self, config: &mut EvalConfig) {
        if let Some(repetitions) = self.repetitions {
            config.mc_dropout.repetitions = repetitions;
        }
        if let Some(p) = self.dropout {
            config.mc_dropout.p = p;
        }
        if let Some(seed) = self.seed {
            config.mc_dropout.seed = seed;
        }
    }
}
