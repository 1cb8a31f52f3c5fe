//! Connected-component clustering of thresholded predictions.

use std::collections::VecDeque;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::mesh::{Adjacency, Cohort, HemiPair, Hemisphere};
use crate::threshold::ThresholdParameters;

/// Labels connected islands of `mask` (over the full hemisphere mesh) whose
/// size reaches `min_area`. Ids continue from `island_count`; the updated
/// counter is returned with the assignment. Components are discovered in
/// ascending vertex order, so the result is fully determined by the inputs.
pub fn cluster_islands(
    mask: &[bool],
    adjacency: &Adjacency,
    island_count: u32,
    min_area: usize,
) -> Result<(Vec<u32>, u32)> {
    if mask.len() != adjacency.n_vertices() {
        bail!(
            "mask length {} does not match mesh vertex count {}",
            mask.len(),
            adjacency.n_vertices()
        );
    }

    let mut out = vec![0u32; mask.len()];
    let mut visited = vec![false; mask.len()];
    let mut queue = VecDeque::new();
    let mut component = Vec::new();
    let mut count = island_count;

    for seed in 0..mask.len() {
        if !mask[seed] || visited[seed] {
            continue;
        }
        component.clear();
        visited[seed] = true;
        queue.push_back(seed);
        while let Some(v) = queue.pop_front() {
            component.push(v);
            for &n in adjacency.neighbors(v) {
                let n = n as usize;
                if mask[n] && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }
        if component.len() < min_area {
            debug!(size = component.len(), min_area, "island below minimum area discarded");
            continue;
        }
        count += 1;
        for &v in &component {
            out[v] = count;
        }
    }

    Ok((out, count))
}

/// Per-subject threshold: the scalar, or the sigmoid of the smallest
/// predicted distance.
pub fn subject_threshold(
    params: &ThresholdParameters,
    distance_map: Option<&[f32]>,
    subject: &str,
) -> Result<f32> {
    match params {
        ThresholdParameters::Fixed(t) => Ok(*t),
        ThresholdParameters::Sigmoid(sig) => {
            let distance = distance_map.with_context(|| {
                format!(
                    "subject {}: sigmoid threshold requires a distance map but none is available",
                    subject
                )
            })?;
            let min = crate::math::stats::nan_min(distance).with_context(|| {
                format!(
                    "subject {}: distance map is undefined (model has no distance head?)",
                    subject
                )
            })?;
            Ok(sig.eval(min))
        }
    }
}

/// Thresholds a cortex-only, hemisphere-concatenated prediction and clusters
/// each hemisphere (left first) with a shared island counter. Returns the
/// cluster assignment in the same cortex-only concatenated layout.
pub fn threshold_and_cluster(
    cohort: &Cohort,
    prediction: &[f32],
    threshold: f32,
    min_area: usize,
) -> Result<Vec<u32>> {
    if prediction.len() != 2 * cohort.n_cortex() {
        bail!(
            "prediction length {} does not match 2x cortex vertices ({})",
            prediction.len(),
            2 * cohort.n_cortex()
        );
    }
    let hemis = cohort.split_hemispheres(prediction)?;

    let mut island_count = 0u32;
    let mut clustered: HemiPair<Vec<u32>> = HemiPair::new(Vec::new(), Vec::new());
    for hemi in Hemisphere::ALL {
        let masked: Vec<bool> = hemis.get(hemi).iter().map(|&p| p >= threshold).collect();
        let full = cohort.cortex.expand(&masked, false)?;
        let (islands, count) =
            cluster_islands(&full, &cohort.adjacency, island_count, min_area)?;
        island_count = count;
        *clustered.get_mut(hemi) = cohort.cortex.restrict(&islands)?;
    }
    Ok(clustered.concat())
}
