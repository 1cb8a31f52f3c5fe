use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::mesh::load_cohort;
use crate::pipeline::Stage;

pub struct Stage1Cohort;

impl Stage1Cohort {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage1Cohort {
    fn name(&self) -> &'static str {
        "stage1_cohort"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let cohort = load_cohort(&ctx.mesh_dir)?;
        info!(
            n_vertices = cohort.n_vertices(),
            n_cortex = cohort.n_cortex(),
            "cohort_ready"
        );
        ctx.cohort = Some(cohort);
        Ok(())
    }
}
