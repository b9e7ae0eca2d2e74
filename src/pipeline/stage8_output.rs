use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::io::{summary, tables};
use crate::pipeline::Stage;

pub struct Stage8Output;

impl Stage8Output {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage8Output {
    fn name(&self) -> &'static str {
        "stage8_output"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        tables::write_growth(&ctx.output.growth_tsv, &ctx.growth)?;
        tables::write_fitness(&ctx.output.fitness_tsv, &ctx.rows)?;
        tables::write_susceptibility(&ctx.output.suscept_tsv, &ctx.susceptibility)?;
        tables::write_susceptibility_simplified(&ctx.output.suscept_simple_tsv, &ctx.simplified)?;
        tables::write_bad_spots(&ctx.output.badspots_tsv, &ctx.bad_flags)?;
        summary::write_summary_json(ctx)?;
        info!(out_dir = %ctx.output.out_dir.display(), "stage8_output_ready");
        Ok(())
    }
}
