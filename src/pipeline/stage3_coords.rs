//! Operator-in-the-loop coordinate calibration, one plate at a time.
//!
//! Strictly sequential: the operator reviews one grid overlay at a time and
//! the loop blocks until accept. Plates with an accepted coordinates file are
//! skipped inside the calibrator.

use anyhow::Result;

use crate::calibrate::Calibrator;
use crate::ctx::Ctx;
use crate::layout::PlateId;
use crate::pipeline::Stage;

pub struct Stage3Coords;

impl Stage3Coords {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage3Coords {
    fn name(&self) -> &'static str {
        "stage3_coords"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let layout = ctx.layout()?.clone();
        let tmp_dir = ctx.output.tmp_dir.clone();
        let retries = ctx.config.retries;

        for batch in &ctx.batches {
            for plate_num in layout.plates_of_batch(&batch.name) {
                let plate = PlateId {
                    batch: batch.name.clone(),
                    plate: plate_num,
                };
                let plate_dir = batch.plate_dir(&tmp_dir, plate_num);
                let coord_dir = tmp_dir
                    .join("coordinate_selection")
                    .join(format!("{}_plate{}", batch.name, plate_num));
                let calibrator = Calibrator {
                    plate,
                    plate_dir: &plate_dir,
                    coord_dir: &coord_dir,
                    fitter: ctx.fitter.as_ref(),
                    retries,
                };
                calibrator.run(ctx.operator.as_mut())?;
            }
        }
        Ok(())
    }
}
