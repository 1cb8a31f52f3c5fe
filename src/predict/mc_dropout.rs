//! Monte-Carlo feature dropout around a [`LesionModel`].

use anyhow::{Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::config::McDropoutConfig;
use crate::mesh::{Cohort, HemiPair, Hemisphere};
use crate::predict::{FeatureMatrix, LesionModel};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McDropout {
    repetitions: usize,
    p: f32,
    seed: u64,
}

/// Averaged output for one hemisphere at full mesh length.
#[derive(Debug, Clone, PartialEq)]
pub struct HemiPrediction {
    pub lesion: Vec<f32>,
    /// All NaN when the model has no distance head.
    pub distance: Vec<f32>,
}

/// Cortex-only, hemisphere-concatenated prediction for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectPrediction {
    pub prediction: Vec<f32>,
    pub distance_map: Vec<f32>,
}

impl McDropout {
    pub fn new(repetitions: usize, p: f32, seed: u64) -> Result<Self> {
        if repetitions == 0 {
            bail!("MC dropout needs at least one repetition");
        }
        if !(0.0..1.0).contains(&p) {
            bail!("dropout probability must lie in [0, 1), got {}", p);
        }
        Ok(Self { repetitions, p, seed })
    }

    pub fn from_config(config: &McDropoutConfig) -> Result<Self> {
        Self::new(config.repetitions, config.p, config.seed)
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Keep-mask over feature columns for one repetition. `stream` separates
    /// subjects and hemispheres so each draws independent masks.
    pub fn column_mask(&self, n_features: usize, stream: u64, repetition: usize) -> Vec<bool> {
        if self.p == 0.0 {
            return vec![true; n_features];
        }
        let seed = self.seed
            ^ stream.rotate_left(17)
            ^ (repetition as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n_features)
            .map(|_| !rng.gen_bool(f64::from(self.p)))
            .collect()
    }

    pub fn predict(
        &self,
        model: &dyn LesionModel,
        features: &FeatureMatrix,
        stream: u64,
    ) -> Result<HemiPrediction> {
        if features.n_features() != model.n_features() {
            bail!(
                "model expects {} features, input has {}",
                model.n_features(),
                features.n_features()
            );
        }
        let run_once = |rep: usize| -> Result<(Vec<f32>, Option<Vec<f32>>)> {
            let keep = self.column_mask(features.n_features(), stream, rep);
            let dropped = features.with_columns(&keep);
            let out = model.forward(&dropped)?;
            if out.log_softmax.len() != features.n_vertices() {
                bail!(
                    "model returned {} rows for {} vertices",
                    out.log_softmax.len(),
                    features.n_vertices()
                );
            }
            if model.has_distance_head() && out.non_lesion_logits.is_none() {
                bail!("model reports a distance head but returned no distance output");
            }
            Ok((out.lesion_probability(), out.non_lesion_logits))
        };

        #[cfg(feature = "mt")]
        let runs: Vec<_> = (0..self.repetitions)
            .into_par_iter()
            .map(run_once)
            .collect::<Result<_>>()?;
        #[cfg(not(feature = "mt"))]
        let runs: Vec<_> = (0..self.repetitions)
            .map(run_once)
            .collect::<Result<_>>()?;

        let n = features.n_vertices();
        let mut lesion = vec![0.0f32; n];
        let mut distance = if model.has_distance_head() {
            vec![0.0f32; n]
        } else {
            vec![f32::NAN; n]
        };
        for (p, d) in &runs {
            for (acc, x) in lesion.iter_mut().zip(p) {
                *acc += x;
            }
            if let Some(d) = d {
                for (acc, x) in distance.iter_mut().zip(d) {
                    *acc += x;
                }
            }
        }
        let scale = 1.0 / self.repetitions as f32;
        lesion.iter_mut().for_each(|x| *x *= scale);
        distance.iter_mut().for_each(|x| *x *= scale);
        Ok(HemiPrediction { lesion, distance })
    }
}

/// Runs MC dropout on both hemispheres and assembles the cortex-only,
/// hemisphere-concatenated prediction and distance map.
pub fn predict_subject(
    model: &dyn LesionModel,
    cohort: &Cohort,
    features: &HemiPair<FeatureMatrix>,
    dropout: &McDropout,
    subject: &str,
) -> Result<SubjectPrediction> {
    let mut prediction = Vec::with_capacity(2 * cohort.n_cortex());
    let mut distance_map = Vec::with_capacity(2 * cohort.n_cortex());
    for hemi in Hemisphere::ALL {
        let x = features.get(hemi);
        if x.n_vertices() != cohort.n_vertices() {
            bail!(
                "subject {} {}: features cover {} vertices, mesh has {}",
                subject,
                hemi,
                x.n_vertices(),
                cohort.n_vertices()
            );
        }
        let out = dropout.predict(model, x, subject_stream(subject, hemi))?;
        prediction.extend(cohort.cortex.restrict(&out.lesion)?);
        distance_map.extend(cohort.cortex.restrict(&out.distance)?);
    }
    debug!(subject, repetitions = dropout.repetitions(), "subject predicted");
    Ok(SubjectPrediction {
        prediction,
        distance_map,
    })
}

// FNV-1a over the subject id, tagged with the hemisphere.
fn subject_stream(subject: &str, hemi: Hemisphere) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in subject.bytes().chain(hemi.code().bytes()) {
        h ^= b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}
