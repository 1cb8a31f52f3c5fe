//! Grid search for the distance-sigmoid threshold parameters.

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{debug, info};

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::cluster::{subject_threshold, threshold_and_cluster};
use crate::config::SigmoidGrid;
use crate::math::sigmoid::SigmoidParams;
use crate::math::stats::dice;
use crate::mesh::Cohort;
use crate::threshold::ThresholdParameters;

/// Borrowed view of one subject's cortex-only arrays.
#[derive(Debug, Clone, Copy)]
pub struct SearchSubject<'a> {
    pub id: &'a str,
    pub prediction: &'a [f32],
    pub distance_map: &'a [f32],
    pub labels: &'a [bool],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SigmoidSearchResult {
    pub ymin: f32,
    pub ymax: f32,
    pub k: f32,
    pub m: f32,
    pub mean_dice: f64,
    pub sensitivity: f64,
    pub score: f64,
    pub n_subjects: usize,
    pub n_patients: usize,
    pub n_combinations: usize,
}

impl SigmoidSearchResult {
    pub fn params(&self) -> SigmoidParams {
        SigmoidParams {
            ymin: self.ymin,
            ymax: self.ymax,
            k: self.k,
            m: self.m,
        }
    }
}

/// Grid points in `ymin, ymax, k, m` nesting order, skipping `ymin > ymax`.
pub fn combinations(grid: &SigmoidGrid) -> Vec<SigmoidParams> {
    let mut out = Vec::with_capacity(grid.len());
    for &ymin in &grid.ymin {
        for &ymax in &grid.ymax {
            if ymin > ymax {
                continue;
            }
            for &k in &grid.k {
                for &m in &grid.m {
                    out.push(SigmoidParams { ymin, ymax, k, m });
                }
            }
        }
    }
    out
}

/// Scores every combination over all `subjects` and returns the one
/// maximizing `mean dice + sensitivity`, the first in grid order on ties.
/// A patient counts as found when more than one lesion vertex is covered by a
/// surviving cluster; a control is never found and scores a dice of 1 only
/// when no cluster survives, so false positives on controls lower the score.
pub fn search(
    grid: &SigmoidGrid,
    subjects: &[SearchSubject<'_>],
    cohort: &Cohort,
    min_area: usize,
) -> Result<SigmoidSearchResult> {
    let n_patients = subjects
        .iter()
        .filter(|s| s.labels.iter().any(|&l| l))
        .count();
    if n_patients == 0 {
        bail!("sigmoid search needs at least one patient with lesion labels");
    }
    let combos = combinations(grid);
    if combos.is_empty() {
        bail!("sigmoid search grid has no valid combination (ymin <= ymax)");
    }

    let score = |params: &SigmoidParams| -> Result<(f64, f64)> {
        let threshold = ThresholdParameters::Sigmoid(*params);
        let mut dice_sum = 0.0;
        let mut found = 0usize;
        for s in subjects {
            let t = subject_threshold(&threshold, Some(s.distance_map), s.id)?;
            let clustered = threshold_and_cluster(cohort, s.prediction, t, min_area)?;
            let predicted: Vec<bool> = clustered.iter().map(|&c| c > 0).collect();
            let tp = predicted
                .iter()
                .zip(s.labels)
                .filter(|(p, l)| **p && **l)
                .count();
            dice_sum += dice(&predicted, s.labels);
            if tp > 1 {
                found += 1;
            }
        }
        let n = subjects.len() as f64;
        Ok((dice_sum / n, found as f64 / n))
    };

    #[cfg(feature = "mt")]
    let scores: Vec<(f64, f64)> = combos.par_iter().map(score).collect::<Result<_>>()?;
    #[cfg(not(feature = "mt"))]
    let scores: Vec<(f64, f64)> = combos.iter().map(score).collect::<Result<_>>()?;

    let mut best = 0usize;
    for (i, (d, s)) in scores.iter().enumerate() {
        let (bd, bs) = scores[best];
        if d + s > bd + bs {
            best = i;
        }
        debug!(
            ymin = combos[i].ymin,
            ymax = combos[i].ymax,
            k = combos[i].k,
            m = combos[i].m,
            dice = d,
            sensitivity = s,
            "sigmoid combination scored"
        );
    }

    let params = combos[best];
    let (mean_dice, sensitivity) = scores[best];
    info!(
        ymin = params.ymin,
        ymax = params.ymax,
        k = params.k,
        m = params.m,
        mean_dice,
        sensitivity,
        "sigmoid parameters selected"
    );
    Ok(SigmoidSearchResult {
        ymin: params.ymin,
        ymax: params.ymax,
        k: params.k,
        m: params.m,
        mean_dice,
        sensitivity,
        score: mean_dice + sensitivity,
        n_subjects: subjects.len(),
        n_patients,
        n_combinations: combos.len(),
    })
}
