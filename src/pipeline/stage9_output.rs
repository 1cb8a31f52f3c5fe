use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::io::reports::write_summary;
use crate::io::summary::build_summary;
use crate::pipeline::Stage;

pub struct Stage9Output;

impl Stage9Output {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage9Output {
    fn name(&self) -> &'static str {
        "stage9_output"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let summary = build_summary(ctx)?;
        write_summary(&ctx.output.summary, &summary)?;
        info!("stage9_output_ready");
        Ok(())
    }
}
