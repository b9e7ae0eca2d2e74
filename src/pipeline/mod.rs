use anyhow::Result;
use std::time::Instant;
use tracing::{info, warn};

use crate::ctx::Ctx;

pub mod stage0_scaffold;
pub mod stage1_layout;
pub mod stage2_images;
pub mod stage3_coords;
pub mod stage4_fitness;
pub mod stage5_badspots;
pub mod stage6_relative;
pub mod stage7_suscept;
pub mod stage8_output;

pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut Ctx) -> Result<()>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The standard stage order, from scaffold to output.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(stage0_scaffold::Stage0Scaffold::new()),
            Box::new(stage1_layout::Stage1Layout::new()),
            Box::new(stage2_images::Stage2Images::new()),
            Box::new(stage3_coords::Stage3Coords::new()),
            Box::new(stage4_fitness::Stage4Fitness::new()),
            Box::new(stage5_badspots::Stage5BadSpots::new()),
            Box::new(stage6_relative::Stage6Relative::new()),
            Box::new(stage7_suscept::Stage7Suscept::new()),
            Box::new(stage8_output::Stage8Output::new()),
        ])
    }

    pub fn run(&self, ctx: &mut Ctx) -> Result<()> {
        for stage in &self.stages {
            let start = Instant::now();
            info!(stage = stage.name(), "stage started");
            if let Err(err) = stage.run(ctx) {
                let elapsed_ms = start.elapsed().as_millis();
                warn!(
                    stage = stage.name(),
                    elapsed_ms = elapsed_ms as u64,
                    "stage failed"
                );
                return Err(err);
            }
            let elapsed_ms = start.elapsed().as_millis();
            info!(
                stage = stage.name(),
                elapsed_ms = elapsed_ms as u64,
                "stage finished"
            );
        }
        Ok(())
    }
}
