//! Per-cluster integrated-gradients attribution.

pub mod source;

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use tracing::debug;

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::config::SaliencyConfig;
use crate::math::stats::{mean, std_dev};
use crate::mesh::{Cohort, HemiPair, Hemisphere};
use crate::predict::{FeatureMatrix, LesionModel};

pub use source::{ClusterSource, resolve_clusters};

/// Mean and standard deviation of the attribution of each feature over the
/// vertices of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAttribution {
    pub subject: String,
    pub hemi: Hemisphere,
    pub cluster: u32,
    pub n_vertices: usize,
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaliencyOutcome {
    Computed(Vec<ClusterAttribution>),
    /// The model cannot provide gradients.
    Unsupported,
}

/// Integrated gradients of the lesion probability summed over `target`,
/// from a zero baseline with `steps` right-Riemann points evaluated
/// `batch_size` at a time. `Ok(None)` when the model has no gradients.
pub fn integrated_gradients(
    model: &dyn LesionModel,
    features: &FeatureMatrix,
    target: &[usize],
    steps: usize,
    batch_size: usize,
) -> Result<Option<FeatureMatrix>> {
    if steps == 0 || batch_size == 0 {
        bail!("integrated gradients needs positive steps and batch size");
    }
    if !model.supports_attribution() {
        return Ok(None);
    }
    let alphas: Vec<f32> = (1..=steps).map(|k| k as f32 / steps as f32).collect();
    let mut total = vec![0.0f32; features.data().len()];

    for batch in alphas.chunks(batch_size) {
        let grad_at = |alpha: &f32| -> Result<Option<FeatureMatrix>> {
            model.lesion_gradient(&features.scaled(*alpha), target)
        };
        #[cfg(feature = "mt")]
        let grads: Vec<Option<FeatureMatrix>> =
            batch.par_iter().map(grad_at).collect::<Result<_>>()?;
        #[cfg(not(feature = "mt"))]
        let grads: Vec<Option<FeatureMatrix>> =
            batch.iter().map(grad_at).collect::<Result<_>>()?;

        for grad in grads {
            let Some(grad) = grad else {
                return Ok(None);
            };
            if grad.data().len() != total.len() {
                bail!(
                    "gradient has {} values, features have {}",
                    grad.data().len(),
                    total.len()
                );
            }
            for (acc, g) in total.iter_mut().zip(grad.data()) {
                *acc += g;
            }
        }
    }

    let scale = 1.0 / steps as f32;
    let attribution = total
        .iter()
        .zip(features.data())
        .map(|(g, x)| x * g * scale)
        .collect();
    Ok(Some(FeatureMatrix::new(
        features.n_vertices(),
        features.n_features(),
        attribution,
    )?))
}

/// Attributes every cluster of one subject. `clustered` is cortex-only and
/// hemisphere-concatenated; `features` are full-length per hemisphere.
pub fn attribute_subject(
    model: &dyn LesionModel,
    cohort: &Cohort,
    subject: &str,
    features: &HemiPair<FeatureMatrix>,
    clustered: &[u32],
    config: &SaliencyConfig,
) -> Result<SaliencyOutcome> {
    if !model.supports_attribution() {
        return Ok(SaliencyOutcome::Unsupported);
    }
    let hemis = cohort.split_hemispheres(clustered)?;
    let mut out = Vec::new();
    for hemi in Hemisphere::ALL {
        let full = cohort.cortex.expand(hemis.get(hemi), 0u32)?;
        let mut clusters: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (v, &c) in full.iter().enumerate() {
            if c > 0 {
                clusters.entry(c).or_default().push(v);
            }
        }
        let x = features.get(hemi);
        for (cluster, vertices) in clusters {
            let Some(attr) =
                integrated_gradients(model, x, &vertices, config.steps, config.batch_size)?
            else {
                return Ok(SaliencyOutcome::Unsupported);
            };
            let mut mean_row = Vec::with_capacity(attr.n_features());
            let mut std_row = Vec::with_capacity(attr.n_features());
            let mut column = Vec::with_capacity(vertices.len());
            for f in 0..attr.n_features() {
                column.clear();
                column.extend(vertices.iter().map(|&v| attr.get(v, f)));
                mean_row.push(mean(&column));
                std_row.push(std_dev(&column));
            }
            debug!(subject, hemi = %hemi, cluster, size = vertices.len(), "cluster attributed");
            out.push(ClusterAttribution {
                subject: subject.to_string(),
                hemi,
                cluster,
                n_vertices: vertices.len(),
                mean: mean_row,
                std: std_row,
            });
        }
    }
    Ok(SaliencyOutcome::Computed(out))
}
