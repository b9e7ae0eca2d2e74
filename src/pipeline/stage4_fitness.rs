use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::fitness::integrate::{self, PlateWork};
use crate::layout::PlateId;
use crate::pipeline::Stage;

pub struct Stage4Fitness;

impl Stage4Fitness {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage4Fitness {
    fn name(&self) -> &'static str {
        "stage4_fitness"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let layout = ctx.layout()?.clone();

        let mut work = Vec::new();
        for batch in &ctx.batches {
            for plate_num in layout.plates_of_batch(&batch.name) {
                work.push(PlateWork {
                    plate: PlateId {
                        batch: batch.name.clone(),
                        plate: plate_num,
                    },
                    plate_dir: batch.plate_dir(&ctx.output.tmp_dir, plate_num),
                });
            }
        }

        integrate::integrate_all(&work, ctx.fitter.as_ref(), &ctx.config)?;

        let mut fitness = Vec::new();
        let mut growth = Vec::new();
        for unit in &work {
            fitness.extend(integrate::read_integrated(&unit.plate, &unit.plate_dir)?);
            growth.extend(integrate::read_growth(&unit.plate, &unit.plate_dir)?);
        }
        fitness.sort_by(|a, b| a.key().cmp(&b.key()));

        info!(
            plates = work.len(),
            records = fitness.len(),
            measurements = growth.len(),
            "kinetic tables integrated"
        );
        ctx.fitness = fitness;
        ctx.growth = growth;
        Ok(())
    }
}
