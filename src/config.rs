use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::layout::PlateId;

/// All recognized analysis options, threaded explicitly through the pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Minimum nAUC for a spot to count as growing.
    pub min_nauc_growing: f64,
    /// Minimum number of tested concentrations required to compute rAUC.
    pub min_rauc_points: usize,
    /// Pseudocount added to concentrations before log2 transformation.
    pub pseudocount_log2_concentration: f64,
    /// Total duration of the experiment, passed through to the curve fitter.
    pub experiment_hours: f64,
    /// Optional plate whose image the rectifier uses as enhancement reference.
    pub reference_plate: Option<PlateId>,
    /// Whether the rectifier should enhance image contrast.
    pub enhance_contrast: bool,
    /// Worker threads for the parallel stages (0 = all available cores).
    pub threads: usize,
    /// Retries for a failing external-service invocation before aborting.
    pub retries: u32,
    /// External rectifier program.
    pub rectifier_program: PathBuf,
    /// External segmentation + curve-fitting program.
    pub fitter_program: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_nauc_growing: 0.5,
            min_rauc_points: 4,
            pseudocount_log2_concentration: 0.1,
            experiment_hours: 24.0,
            reference_plate: None,
            enhance_contrast: true,
            threads: 0,
            retries: 2,
            rectifier_program: PathBuf::new(),
            fitter_program: PathBuf::new(),
        }
    }
}

/// Parses a `<plate_batch>-plate<N>` override, e.g. `SC1-plate2`.
pub fn parse_reference_plate(value: &str) -> Result<PlateId> {
    let Some((batch, plate_part)) = value.rsplit_once("-plate") else {
        bail!(
            "reference plate '{}' should have the format <plate_batch>-plate<N>, e.g. SC1-plate1",
            value
        );
    };
    let plate: u8 = plate_part
        .parse()
        .map_err(|_| anyhow::anyhow!("reference plate '{}' has a non-numeric plate ID", value))?;
    if batch.is_empty() || !(1..=4).contains(&plate) {
        bail!(
            "reference plate '{}' should name a non-empty batch and a plate in 1..4",
            value
        );
    }
    Ok(PlateId {
        batch: batch.to_string(),
        plate,
    })
}
