use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::pipeline::Stage;
use crate::suscept::relative;

pub struct Stage6Relative;

impl Stage6Relative {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage6Relative {
    fn name(&self) -> &'static str {
        "stage6_relative"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let layout = ctx.layout()?;
        let rows = relative::normalize(&ctx.fitness, layout, &ctx.config)?;
        let valid = rows.iter().filter(|r| r.susceptibility_valid).count();
        info!(rows = rows.len(), valid, "relative fitness computed");
        ctx.rows = rows;
        Ok(())
    }
}
