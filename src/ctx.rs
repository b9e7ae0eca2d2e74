use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::calibrate::operator::Operator;
use crate::config::AnalysisConfig;
use crate::fitness::badspot::BadSpotFlag;
use crate::fitness::{FitnessRecord, GrowthPoint};
use crate::imaging::ImageBatch;
use crate::layout::PlateLayout;
use crate::services::{CurveFitter, ImageRectifier};
use crate::suscept::{FitnessRow, SimplifiedRecord, SusceptibilityRecord};

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub out_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub growth_tsv: PathBuf,
    pub fitness_tsv: PathBuf,
    pub suscept_tsv: PathBuf,
    pub suscept_simple_tsv: PathBuf,
    pub badspots_tsv: PathBuf,
    pub summary_json: PathBuf,
}

impl OutputPaths {
    pub fn new(out_dir: PathBuf) -> Self {
        Self {
            tmp_dir: out_dir.join("tmp"),
            growth_tsv: out_dir.join("growth_measurements.tsv"),
            fitness_tsv: out_dir.join("fitness_per_spot.tsv"),
            suscept_tsv: out_dir.join("susceptibility.tsv"),
            suscept_simple_tsv: out_dir.join("susceptibility_simplified.tsv"),
            badspots_tsv: out_dir.join("bad_spots.tsv"),
            summary_json: out_dir.join("summary.json"),
            out_dir,
        }
    }
}

/// Shared state threaded through the pipeline stages. Stages fill in the
/// optional fields in order; later stages `require` what earlier ones set.
pub struct Ctx {
    pub input_dir: PathBuf,
    pub config: AnalysisConfig,
    pub output: OutputPaths,

    pub rectifier: Box<dyn ImageRectifier>,
    pub fitter: Box<dyn CurveFitter>,
    pub operator: Box<dyn Operator>,

    pub layout: Option<PlateLayout>,
    pub batches: Vec<ImageBatch>,
    pub growth: Vec<GrowthPoint>,
    pub fitness: Vec<FitnessRecord>,
    pub bad_flags: Vec<BadSpotFlag>,
    pub rows: Vec<FitnessRow>,
    pub susceptibility: Vec<SusceptibilityRecord>,
    pub simplified: Vec<SimplifiedRecord>,
    pub warnings: Vec<String>,
}

impl Ctx {
    pub fn new(
        input_dir: PathBuf,
        out_dir: PathBuf,
        config: AnalysisConfig,
        rectifier: Box<dyn ImageRectifier>,
        fitter: Box<dyn CurveFitter>,
        operator: Box<dyn Operator>,
    ) -> Self {
        Self {
            input_dir,
            config,
            output: OutputPaths::new(out_dir),
            rectifier,
            fitter,
            operator,
            layout: None,
            batches: Vec::new(),
            growth: Vec::new(),
            fitness: Vec::new(),
            bad_flags: Vec::new(),
            rows: Vec::new(),
            susceptibility: Vec::new(),
            simplified: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn layout(&self) -> Result<&PlateLayout> {
        self.layout.as_ref().context("plate layout not loaded yet")
    }
}
