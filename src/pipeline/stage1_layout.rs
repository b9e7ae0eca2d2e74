use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::layout::{parse_layout, sheet, Sheet};
use crate::pipeline::Stage;

pub struct Stage1Layout;

impl Stage1Layout {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage1Layout {
    fn name(&self) -> &'static str {
        "stage1_layout"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let layout_file = sheet::discover_layout_file(&ctx.input_dir)?;
        let sheet = Sheet::load(&layout_file)?;
        let layout = parse_layout(&sheet)?;

        info!(
            file = %layout_file.display(),
            experiment = %layout.experiment,
            batches = layout.batches().len(),
            plates = layout.assignments.len(),
            spots = layout.spots.len(),
            "plate layout parsed"
        );
        ctx.warnings.extend(layout.warnings.iter().cloned());
        ctx.layout = Some(layout);
        Ok(())
    }
}
