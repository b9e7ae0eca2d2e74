//! Image preprocessing: enumerate, link, rectify and crop every plate batch.

use std::fs;

use anyhow::{bail, Result};
use rayon::prelude::*;
use tracing::info;

use crate::ctx::Ctx;
use crate::imaging::{self, crop, ImageBatch};
use crate::pipeline::Stage;
use crate::services::with_retries;

pub struct Stage2Images;

impl Stage2Images {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage2Images {
    fn name(&self) -> &'static str {
        "stage2_images"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let layout = ctx.layout()?.clone();
        let tmp_dir = ctx.output.tmp_dir.clone();

        let mut batches = Vec::new();
        for batch_name in layout.batches() {
            let raw_dir = ctx.input_dir.join(&batch_name);
            if !raw_dir.is_dir() {
                bail!(
                    "plate batch '{}' is in the layout but has no image directory at {}",
                    batch_name,
                    raw_dir.display()
                );
            }
            let images = imaging::enumerate_batch(&batch_name, &raw_dir)?;
            info!(
                batch = %batch_name,
                images = images.len(),
                "image series enumerated"
            );
            batches.push(ImageBatch {
                name: batch_name.clone(),
                raw_dir,
                images,
                linked_dir: tmp_dir.join("linked_images").join(&batch_name),
                rectified_dir: tmp_dir.join("rectified_images").join(&batch_name),
            });
        }

        // Each batch links and rectifies into its own working directories, so
        // the batches themselves are pool units and the rectifier invocations
        // run concurrently.
        let retries = ctx.config.retries;
        let rectifier = ctx.rectifier.as_ref();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.config.threads)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build thread pool: {}", e))?;
        pool.install(|| {
            batches.par_iter().try_for_each(|batch| {
                imaging::link_batch(&batch.images, &batch.linked_dir)?;
                fs::create_dir_all(&batch.rectified_dir)?;
                with_retries(
                    &format!("rectification of batch {}", batch.name),
                    retries,
                    || rectifier.rectify_batch(&batch.linked_dir, &batch.rectified_dir),
                )
            })
        })?;

        for batch in &batches {
            self.crop_batch(ctx, batch, &layout.plates_of_batch(&batch.name))?;
        }

        ctx.batches = batches;
        Ok(())
    }
}

impl Stage2Images {
    /// Crops each rectified image into its per-plate quadrants. Units are
    /// (plate, image) pairs writing disjoint files, so they fan out over the
    /// pool; crops that already exist are left alone.
    fn crop_batch(&self, ctx: &Ctx, batch: &ImageBatch, plates: &[u8]) -> Result<()> {
        let mut units = Vec::new();
        for &plate in plates {
            let plate_dir = batch.plate_dir(&ctx.output.tmp_dir, plate);
            fs::create_dir_all(&plate_dir)?;
            for img in &batch.images {
                let rectified = batch.rectified_dir.join(imaging::linked_name(img));
                let dest = plate_dir.join(format!("{}.png", img.barcode));
                units.push((plate, rectified, dest));
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.config.threads)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build thread pool: {}", e))?;
        pool.install(|| {
            units.par_iter().try_for_each(|(plate, rectified, dest)| {
                if crate::io::artifact_ready(dest) {
                    return Ok(());
                }
                crop::crop_plate(rectified, *plate, dest)
            })
        })?;
        info!(batch = %batch.name, crops = units.len(), "plate quadrants cropped");
        Ok(())
    }
}
