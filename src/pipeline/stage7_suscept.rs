use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::pipeline::Stage;
use crate::suscept;

pub struct Stage7Suscept;

impl Stage7Suscept {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage7Suscept {
    fn name(&self) -> &'static str {
        "stage7_suscept"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let layout = ctx.layout()?;
        let records = suscept::estimate_susceptibility(&ctx.rows, layout, &ctx.config)?;
        let simplified = suscept::simplify(&records);
        info!(
            records = records.len(),
            simplified = simplified.len(),
            "susceptibility estimated"
        );
        ctx.susceptibility = records;
        ctx.simplified = simplified;
        Ok(())
    }
}
