use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::predict::{FeatureMatrix, LesionModel, ModelOutput};

/// Per-vertex logistic lesion classifier with an optional linear distance
/// head. Weights are read from JSON:
///
/// ```json
/// { "weights": [..F..], "bias": -2.0,
///   "distance_weights": [..F..], "distance_bias": 200.0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearLesionModel {
    pub weights: Vec<f32>,
    #[serde(default)]
    pub bias: f32,
    #[serde(default)]
    pub distance_weights: Option<Vec<f32>>,
    #[serde(default)]
    pub distance_bias: f32,
}

impl LinearLesionModel {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read model {}", path.display()))?;
        let model: LinearLesionModel = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse model {}", path.display()))?;
        if model.weights.is_empty() {
            bail!("model {} has no feature weights", path.display());
        }
        if let Some(dw) = &model.distance_weights {
            if dw.len() != model.weights.len() {
                bail!(
                    "model {}: distance head has {} weights, classifier has {}",
                    path.display(),
                    dw.len(),
                    model.weights.len()
                );
            }
        }
        Ok(model)
    }

    fn logit(&self, row: &[f32]) -> f32 {
        self.bias + dot(&self.weights, row)
    }

    fn check(&self, features: &FeatureMatrix) -> Result<()> {
        if features.n_features() != self.weights.len() {
            bail!(
                "model expects {} features, got {}",
                self.weights.len(),
                features.n_features()
            );
        }
        Ok(())
    }
}

impl LesionModel for LinearLesionModel {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn has_distance_head(&self) -> bool {
        self.distance_weights.is_some()
    }

    fn forward(&self, features: &FeatureMatrix) -> Result<ModelOutput> {
        self.check(features)?;
        let log_softmax = (0..features.n_vertices())
            .map(|v| {
                let z = self.logit(features.row(v));
                [-softplus(z), -softplus(-z)]
            })
            .collect();
        let non_lesion_logits = self.distance_weights.as_ref().map(|dw| {
            (0..features.n_vertices())
                .map(|v| self.distance_bias + dot(dw, features.row(v)))
                .collect()
        });
        Ok(ModelOutput {
            log_softmax,
            non_lesion_logits,
        })
    }

    fn supports_attribution(&self) -> bool {
        true
    }

    fn lesion_gradient(
        &self,
        features: &FeatureMatrix,
        target: &[usize],
    ) -> Result<Option<FeatureMatrix>> {
        self.check(features)?;
        let n_features = features.n_features();
        let mut grad = vec![0.0f32; features.n_vertices() * n_features];
        for &v in target {
            if v >= features.n_vertices() {
                bail!("target vertex {} outside {} vertices", v, features.n_vertices());
            }
            let p = logistic(self.logit(features.row(v)));
            let scale = p * (1.0 - p);
            let out = &mut grad[v * n_features..(v + 1) * n_features];
            for (g, w) in out.iter_mut().zip(&self.weights) {
                *g += scale * w;
            }
        }
        Ok(Some(FeatureMatrix::new(
            features.n_vertices(),
            n_features,
            grad,
        )?))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn logistic(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

// log(1 + e^z) without overflow.
fn softplus(z: f32) -> f32 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

