use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::fitness::badspot;
use crate::pipeline::Stage;

pub struct Stage5BadSpots;

impl Stage5BadSpots {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage5BadSpots {
    fn name(&self) -> &'static str {
        "stage5_badspots"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let layout = ctx.layout.as_mut().context("plate layout not loaded yet")?;
        let auto = badspot::detect_outliers(&ctx.fitness, &layout.spot_map(), &ctx.config);
        let mut flags = badspot::manual_flags(&layout.spots, &ctx.fitness);
        let auto_count = auto.len();
        let manual_count = flags.len();
        flags.extend(auto);

        // Detected outliers join the manual flags on the spot table so that
        // normalization treats both the same way.
        let flagged: BTreeSet<_> = flags.iter().map(|f| f.key.clone()).collect();
        for spot in &mut layout.spots {
            if flagged.contains(&spot.key()) {
                spot.bad_spot = true;
            }
        }

        info!(manual = manual_count, auto = auto_count, "bad spots flagged");
        ctx.bad_flags = flags;
        Ok(())
    }
}
