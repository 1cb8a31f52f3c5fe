use anyhow::{Context, Result};
use tracing::info;

use crate::cluster::{subject_threshold, threshold_and_cluster};
use crate::ctx::Ctx;
use crate::pipeline::Stage;
use crate::store::{PREDICTION_CLUSTERED, VertexArray};
use crate::threshold::{self, ThresholdParameters, ThresholdSpec};

pub struct Stage4Cluster;

impl Stage4Cluster {
    pub fn new() -> Self {
        Self
    }
}

/// Parses the configured threshold mode and loads sigmoid parameters if
/// needed. Configuration errors surface here, before any subject runs.
pub fn resolve_threshold(ctx: &mut Ctx) -> Result<ThresholdParameters> {
    if let Some(t) = ctx.threshold {
        return Ok(t);
    }
    let spec = ThresholdSpec::parse(&ctx.config.threshold)?;
    let params = threshold::resolve(spec, &ctx.output.sigmoid_params)?;
    info!(threshold = %params.describe(), "threshold_resolved");
    ctx.threshold = Some(params);
    Ok(params)
}

impl Stage for Stage4Cluster {
    fn name(&self) -> &'static str {
        "stage4_cluster"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let params = resolve_threshold(ctx)?;
        let store = ctx.results_store()?;
        let cohort = ctx.cohort()?.clone();
        let min_area = ctx.config.min_area_threshold;

        for id in ctx.subject_ids.clone() {
            let record = ctx
                .subjects
                .get_mut(&id)
                .with_context(|| format!("subject {} not loaded", id))?;
            let prediction = record
                .prediction
                .as_deref()
                .with_context(|| format!("subject {}: no prediction to cluster", id))?;
            let t = subject_threshold(&params, record.distance_map.as_deref(), &id)?;
            let clustered = threshold_and_cluster(&cohort, prediction, t, min_area)?;

            let full = cohort
                .expand_hemispheres(&clustered, 0u32)?
                .map(|_, v| VertexArray::u32(v));
            store.save(&id, &full, PREDICTION_CLUSTERED)?;

            let n_clusters = clustered.iter().copied().max().unwrap_or(0);
            info!(subject = %id, threshold = t, n_clusters, "subject_clustered");
            record.clustered = Some(clustered);
            record.stats = None;
        }
        Ok(())
    }
}
