use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::math::pool;
use crate::metrics::SearchSubject;
use crate::metrics::sigmoid_search::search;
use crate::pipeline::Stage;
use crate::threshold::{ThresholdParameters, save_sigmoid_params};

pub struct Stage7ThresholdSearch;

impl Stage7ThresholdSearch {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage7ThresholdSearch {
    fn name(&self) -> &'static str {
        "stage7_threshold_search"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let cohort = ctx.cohort()?;
        let mut subjects = Vec::with_capacity(ctx.subject_ids.len());
        for id in &ctx.subject_ids {
            let record = ctx
                .subjects
                .get(id)
                .with_context(|| format!("subject {} not loaded", id))?;
            subjects.push(SearchSubject {
                id,
                prediction: record
                    .prediction
                    .as_deref()
                    .with_context(|| format!("subject {}: no prediction", id))?,
                distance_map: record
                    .distance_map
                    .as_deref()
                    .with_context(|| format!("subject {}: no distance map", id))?,
                labels: &record.labels,
            });
        }

        let grid = &ctx.config.sigmoid_search;
        let min_area = ctx.config.min_area_threshold;
        info!(combinations = grid.len(), "sigmoid_search_started");
        let result = pool::install(ctx.threads, || search(grid, &subjects, cohort, min_area))??;

        save_sigmoid_params(&ctx.output.sigmoid_params, &result.params())?;
        info!(
            path = %ctx.output.sigmoid_params.display(),
            score = result.score,
            "sigmoid_parameters_saved"
        );
        ctx.threshold = Some(ThresholdParameters::Sigmoid(result.params()));
        ctx.sigmoid_search = Some(result);
        Ok(())
    }
}
