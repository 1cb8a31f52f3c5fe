use anyhow::{Context, Result};
use std::fs;
use tracing::info;

use crate::ctx::Ctx;
use crate::pipeline::Stage;

pub struct Stage0Scaffold;

impl Stage0Scaffold {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage0Scaffold {
    fn name(&self) -> &'static str {
        "stage0_scaffold"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        ctx.config.validate()?;
        fs::create_dir_all(&ctx.output.results_dir).with_context(|| {
            format!("failed to create {}", ctx.output.results_dir.display())
        })?;
        info!(
            results_dir = %ctx.output.results_dir.display(),
            predictions = %ctx.output.predictions.display(),
            "results_dir_ready"
        );
        Ok(())
    }
}
