//! Model inference seam and prediction assembly.
//!
//! The network itself is opaque: anything implementing [`LesionModel`] maps a
//! per-hemisphere `[V, F]` feature matrix to a two-class log-softmax and,
//! optionally, a distance regression. [`LinearLesionModel`] is the reference
//! implementation used by the CLI.

pub mod linear;
pub mod mc_dropout;

use anyhow::{Result, bail};

pub use linear::LinearLesionModel;
pub use mc_dropout::{McDropout, SubjectPrediction, predict_subject};

/// Row-major `[n_vertices, n_features]` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_vertices: usize,
    n_features: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    pub fn new(n_vertices: usize, n_features: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != n_vertices * n_features {
            bail!(
                "feature buffer has {} values, expected {} x {}",
                data.len(),
                n_vertices,
                n_features
            );
        }
        Ok(Self {
            n_vertices,
            n_features,
            data,
        })
    }

    pub fn zeros(n_vertices: usize, n_features: usize) -> Self {
        Self {
            n_vertices,
            n_features,
            data: vec![0.0; n_vertices * n_features],
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, vertex: usize) -> &[f32] {
        let start = vertex * self.n_features;
        &self.data[start..start + self.n_features]
    }

    pub fn get(&self, vertex: usize, feature: usize) -> f32 {
        self.data[vertex * self.n_features + feature]
    }

    /// Copy with every value multiplied by `alpha`.
    pub fn scaled(&self, alpha: f32) -> Self {
        Self {
            n_vertices: self.n_vertices,
            n_features: self.n_features,
            data: self.data.iter().map(|x| x * alpha).collect(),
        }
    }

    /// Copy with the columns whose `keep` flag is false set to zero.
    pub fn with_columns(&self, keep: &[bool]) -> Self {
        let mut data = self.data.clone();
        for row in data.chunks_exact_mut(self.n_features.max(1)) {
            for (x, &k) in row.iter_mut().zip(keep) {
                if !k {
                    *x = 0.0;
                }
            }
        }
        Self {
            n_vertices: self.n_vertices,
            n_features: self.n_features,
            data,
        }
    }
}

/// One forward pass over a hemisphere.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// `[non-lesion, lesion]` log-probabilities per vertex.
    pub log_softmax: Vec<[f32; 2]>,
    /// Distance regression head, when the model has one.
    pub non_lesion_logits: Option<Vec<f32>>,
}

impl ModelOutput {
    pub fn lesion_probability(&self) -> Vec<f32> {
        self.log_softmax.iter().map(|ls| ls[1].exp()).collect()
    }
}

pub trait LesionModel: Send + Sync {
    fn n_features(&self) -> usize;

    fn has_distance_head(&self) -> bool;

    fn forward(&self, features: &FeatureMatrix) -> Result<ModelOutput>;

    /// Whether [`LesionModel::lesion_gradient`] is implemented.
    fn supports_attribution(&self) -> bool {
        false
    }

    /// Gradient of the lesion probability summed over `target` vertices with
    /// respect to every input feature. `Ok(None)` when unsupported.
    fn lesion_gradient(
        &self,
        _features: &FeatureMatrix,
        _target: &[usize],
    ) -> Result<Option<FeatureMatrix>> {
        Ok(None)
    }
}
