use anyhow::{Context, Result};

use crate::ctx::Ctx;
use crate::io::reports::write_roc_curves;
use crate::metrics::RocAccumulator;
use crate::metrics::roc::borderzone;
use crate::pipeline::Stage;

pub struct Stage6Roc;

impl Stage6Roc {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage6Roc {
    fn name(&self) -> &'static str {
        "stage6_roc"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let mut roc = RocAccumulator::new(ctx.config.roc_points)?;
        let max_distance = ctx.config.borderzone_distance;
        for id in &ctx.subject_ids {
            let record = ctx
                .subjects
                .get(id)
                .with_context(|| format!("subject {} not loaded", id))?;
            let prediction = record
                .prediction
                .as_deref()
                .with_context(|| format!("subject {}: no prediction", id))?;
            let zone = match &record.boundary_distance {
                Some(distance) => borderzone(distance, max_distance),
                None => record.labels.clone(),
            };
            roc.add_subject(prediction, &record.labels, &zone)
                .with_context(|| format!("subject {}", id))?;
        }
        let curves = roc.finalize();
        write_roc_curves(&ctx.output.roc, &curves)?;
        ctx.roc = Some(curves);
        Ok(())
    }
}
