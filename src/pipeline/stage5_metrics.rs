use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::metrics::results_csv::append_row;
use crate::metrics::subject_stats;
use crate::pipeline::Stage;

pub struct Stage5Metrics;

impl Stage5Metrics {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage5Metrics {
    fn name(&self) -> &'static str {
        "stage5_metrics"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let path = ctx.output.test_results.clone();
        let retry = ctx.config.retry;
        for id in ctx.subject_ids.clone() {
            let record = ctx
                .subjects
                .get_mut(&id)
                .with_context(|| format!("subject {} not loaded", id))?;
            let clustered = record
                .clustered
                .as_deref()
                .with_context(|| format!("subject {}: not clustered", id))?;
            let stats = subject_stats(&id, clustered, &record.labels)?;
            append_row(&path, &stats, &retry)?;
            info!(
                subject = %id,
                group = stats.group,
                detected = stats.detected,
                dice = stats.dice_lesional,
                "subject_scored"
            );
            record.stats = Some(stats);
        }
        info!(path = %path.display(), "test_results_ready");
        Ok(())
    }
}
