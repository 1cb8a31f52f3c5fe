//! Subject-level detection curves over a fixed threshold sweep.

use anyhow::{Result, bail};
use serde::Serialize;

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::math::stats::trapezoid_auc;

#[derive(Debug, Clone, PartialEq)]
pub struct RocAccumulator {
    thresholds: Vec<f32>,
    sensitivity: Vec<u64>,
    sensitivity_plus: Vec<u64>,
    specificity: Vec<u64>,
    n_patients: u64,
    n_controls: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RocCurves {
    pub thresholds: Vec<f32>,
    pub sensitivity_counts: Vec<u64>,
    pub sensitivity_plus_counts: Vec<u64>,
    pub specificity_counts: Vec<u64>,
    pub sensitivity: Vec<f64>,
    pub sensitivity_plus: Vec<f64>,
    pub specificity: Vec<f64>,
    pub auc: f64,
    pub auc_plus: f64,
    pub n_patients: u64,
    pub n_controls: u64,
}

impl RocAccumulator {
    /// `n_points` evenly spaced thresholds on `[0, 1]`.
    pub fn new(n_points: usize) -> Result<Self> {
        if n_points < 2 {
            bail!("ROC sweep needs at least 2 thresholds, got {}", n_points);
        }
        let last = (n_points - 1) as f64;
        let thresholds = (0..n_points).map(|i| (i as f64 / last) as f32).collect();
        Ok(Self {
            thresholds,
            sensitivity: vec![0; n_points],
            sensitivity_plus: vec![0; n_points],
            specificity: vec![0; n_points],
            n_patients: 0,
            n_controls: 0,
        })
    }

    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }

    pub fn n_patients(&self) -> u64 {
        self.n_patients
    }

    pub fn n_controls(&self) -> u64 {
        self.n_controls
    }

    /// Adds one subject. `prediction` is the raw probability; `borderzone`
    /// marks vertices near the lesion. A subject without any label vertex
    /// counts as a control.
    pub fn add_subject(
        &mut self,
        prediction: &[f32],
        labels: &[bool],
        borderzone: &[bool],
    ) -> Result<()> {
        if prediction.len() != labels.len() || labels.len() != borderzone.len() {
            bail!(
                "ROC inputs disagree in length: prediction {}, labels {}, borderzone {}",
                prediction.len(),
                labels.len(),
                borderzone.len()
            );
        }
        let patient = labels.iter().any(|&l| l);

        let hits = |t: &f32| -> (bool, bool, bool) {
            let mut lesion_hit = false;
            let mut border_hit = false;
            let mut any = false;
            for ((&p, &l), &b) in prediction.iter().zip(labels).zip(borderzone) {
                if p >= *t {
                    any = true;
                    lesion_hit |= l;
                    border_hit |= b;
                    if lesion_hit && border_hit {
                        break;
                    }
                }
            }
            (lesion_hit, border_hit, any)
        };

        #[cfg(feature = "mt")]
        let flags: Vec<(bool, bool, bool)> = self.thresholds.par_iter().map(hits).collect();
        #[cfg(not(feature = "mt"))]
        let flags: Vec<(bool, bool, bool)> = self.thresholds.iter().map(hits).collect();

        for (i, (lesion_hit, border_hit, any)) in flags.into_iter().enumerate() {
            if patient {
                self.sensitivity[i] += lesion_hit as u64;
                self.sensitivity_plus[i] += border_hit as u64;
            } else {
                self.specificity[i] += (!any) as u64;
            }
        }
        if patient {
            self.n_patients += 1;
        } else {
            self.n_controls += 1;
        }
        Ok(())
    }

    pub fn finalize(&self) -> RocCurves {
        let last = self.thresholds.len() - 1;
        let sensitivity = normalize(&self.sensitivity, self.sensitivity[0]);
        let sensitivity_plus = normalize(&self.sensitivity_plus, self.sensitivity_plus[0]);
        let specificity = normalize(&self.specificity, self.specificity[last]);
        let fpr: Vec<f64> = specificity.iter().map(|s| 1.0 - s).collect();
        RocCurves {
            thresholds: self.thresholds.clone(),
            sensitivity_counts: self.sensitivity.clone(),
            sensitivity_plus_counts: self.sensitivity_plus.clone(),
            specificity_counts: self.specificity.clone(),
            auc: trapezoid_auc(&fpr, &sensitivity),
            auc_plus: trapezoid_auc(&fpr, &sensitivity_plus),
            sensitivity,
            sensitivity_plus,
            specificity,
            n_patients: self.n_patients,
            n_controls: self.n_controls,
        }
    }
}

/// Borderzone mask from a ground-truth boundary distance map.
pub fn borderzone(distance: &[f32], max_distance: f32) -> Vec<bool> {
    distance.iter().map(|&d| d < max_distance).collect()
}

fn normalize(counts: &[u64], reference: u64) -> Vec<f64> {
    if reference == 0 {
        return vec![0.0; counts.len()];
    }
    counts
        .iter()
        .map(|&c| c as f64 / reference as f64)
        .collect()
}
