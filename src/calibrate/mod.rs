//! Spot-grid coordinate calibration.
//!
//! One state machine per (plate_batch, plate), operating on the latest image
//! of the series as the reference frame. Coordinates come either from
//! automatic segmentation (well-1 and well-96 centers) or from two operator
//! clicks on a downscaled preview, are sanity-checked, propagated to every
//! image of the series, validated against a segmentation run over the first
//! and last timepoints, and persisted only on explicit operator accept.
//! There is no timeout and no cancellation path: the loop runs until accept.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

pub mod operator;

pub use operator::{AutoOperator, ConsoleOperator, Decision, Operator, Point, ScriptedOperator};

use crate::imaging::crop;
use crate::layout::PlateId;
use crate::services::{with_retries, CurveFitter};

pub const COORDS_FILE: &str = "coordinates.tsv";
const PREVIEW_WIDTH: u32 = 900;
const HARD_MIN_EXTENT: f64 = 0.30;
const WARN_MIN_EXTENT: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    NeedCoordinates,
    CoordinatesSet,
    Validating,
    Accepted,
}

/// Full-resolution bounding box spanning the upper-left and lower-right well
/// centers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateCoords {
    pub top_left_x: u32,
    pub top_left_y: u32,
    pub bottom_right_x: u32,
    pub bottom_right_y: u32,
}

pub struct Calibrator<'a> {
    pub plate: PlateId,
    /// Directory holding the cropped, timestamp-ordered plate series.
    pub plate_dir: &'a Path,
    /// Scratch directory for previews and the validation subset run.
    pub coord_dir: &'a Path,
    pub fitter: &'a dyn CurveFitter,
    pub retries: u32,
}

impl<'a> Calibrator<'a> {
    pub fn coords_file(&self) -> PathBuf {
        self.plate_dir.join(COORDS_FILE)
    }

    /// Runs the calibration loop to completion. A pre-existing non-empty
    /// coordinates file gates the whole loop: the plate is already accepted.
    pub fn run(&self, operator: &mut dyn Operator) -> Result<()> {
        let coords_file = self.coords_file();
        if crate::io::artifact_ready(&coords_file) {
            info!(plate = %self.plate, "coordinates already accepted, skipping calibration");
            return Ok(());
        }

        let series = self.image_series()?;
        let reference = series.last().expect("series is non-empty").clone();
        fs::create_dir_all(self.coord_dir)?;

        let mut state = CalibrationState::NeedCoordinates;
        let mut coords: Option<PlateCoords> = None;
        loop {
            match state {
                CalibrationState::NeedCoordinates => {
                    let picked = self.obtain_coordinates(operator, &reference)?;
                    self.check_crop(&reference, &picked)?;
                    coords = Some(picked);
                    state = CalibrationState::CoordinatesSet;
                }
                CalibrationState::CoordinatesSet => {
                    // Colony positions do not move across time: one coordinate
                    // set serves the whole series.
                    let picked = coords.expect("coordinates were just set");
                    self.write_coords_file(&coords_file, &series, &picked)?;
                    state = CalibrationState::Validating;
                }
                CalibrationState::Validating => {
                    let subset_dir = self.coord_dir.join("subset_run");
                    let subset: Vec<PathBuf> =
                        vec![series[0].clone(), series[series.len() - 1].clone()];
                    let overlay = with_retries("grid preview", self.retries, || {
                        self.fitter.preview_grid(&subset, &coords_file, &subset_dir)
                    })?;
                    match operator.review_grid(&self.plate, &overlay)? {
                        Decision::Accept => {
                            state = CalibrationState::Accepted;
                        }
                        Decision::Reject => {
                            info!(plate = %self.plate, "coordinates rejected, repeating selection");
                            fs::remove_file(&coords_file).with_context(|| {
                                format!("failed to remove {}", coords_file.display())
                            })?;
                            fs::remove_dir_all(&subset_dir).with_context(|| {
                                format!("failed to remove {}", subset_dir.display())
                            })?;
                            coords = None;
                            state = CalibrationState::NeedCoordinates;
                        }
                    }
                }
                CalibrationState::Accepted => {
                    info!(plate = %self.plate, "coordinates accepted");
                    return Ok(());
                }
            }
        }
    }

    /// The cropped image series, ordered by the barcode-embedded timestamp.
    fn image_series(&self) -> Result<Vec<PathBuf>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.plate_dir)
            .with_context(|| format!("failed to list plate dir {}", self.plate_dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type()?.is_file() {
                continue;
            }
            if name == COORDS_FILE || name.ends_with(".tmp") {
                continue;
            }
            names.push(name);
        }
        if names.is_empty() {
            bail!("plate {} has no cropped images to calibrate", self.plate);
        }
        names.sort();
        Ok(names.iter().map(|n| self.plate_dir.join(n)).collect())
    }

    fn obtain_coordinates(
        &self,
        operator: &mut dyn Operator,
        reference: &Path,
    ) -> Result<PlateCoords> {
        let preview = self.coord_dir.join("preview.png");
        let factor = crop::write_preview(reference, &preview, PREVIEW_WIDTH)?;

        match operator.pick_corners(&self.plate, &preview)? {
            Some((top_left, bottom_right)) => {
                // Clicks land on the downscaled preview; reapply the factor
                // to recover full-resolution coordinates.
                Ok(PlateCoords {
                    top_left_x: (top_left.x / factor).round().max(0.0) as u32,
                    top_left_y: (top_left.y / factor).round().max(0.0) as u32,
                    bottom_right_x: (bottom_right.x / factor).round().max(0.0) as u32,
                    bottom_right_y: (bottom_right.y / factor).round().max(0.0) as u32,
                })
            }
            None => self.locate_corners_automatically(reference),
        }
    }

    fn locate_corners_automatically(&self, reference: &Path) -> Result<PlateCoords> {
        let wells = with_retries("well locator", self.retries, || {
            self.fitter.locate_wells(reference)
        })?;
        let first = wells.iter().find(|w| w.well == 1);
        let last = wells.iter().find(|w| w.well == 96);
        match (first, last) {
            (Some(w1), Some(w96)) => Ok(PlateCoords {
                top_left_x: w1.x,
                top_left_y: w1.y,
                bottom_right_x: w96.x,
                bottom_right_y: w96.y,
            }),
            _ => bail!(
                "automatic segmentation of {} did not locate wells 1 and 96",
                self.plate
            ),
        }
    }

    /// Guards against inverted or mis-ordered clicks: the implied crop must
    /// have positive extent, fit inside the image, and span at least 30% of
    /// it (warning below 50%).
    fn check_crop(&self, reference: &Path, coords: &PlateCoords) -> Result<()> {
        let (full_w, full_h) = crop::dimensions(reference)?;
        let crop_w = coords.bottom_right_x as i64 - coords.top_left_x as i64;
        let crop_h = coords.bottom_right_y as i64 - coords.top_left_y as i64;

        for (dim, cropped, full) in [
            ("width", crop_w, full_w as i64),
            ("height", crop_h, full_h as i64),
        ] {
            if cropped <= 0 {
                bail!(
                    "selected coordinates for {} give a non-positive {}; select the \
                     upper-left well first, then the lower-right well",
                    self.plate,
                    dim
                );
            }
            if cropped > full {
                bail!(
                    "selected {} for {} ({}) exceeds the image extent ({})",
                    dim,
                    self.plate,
                    cropped,
                    full
                );
            }
            let fraction = cropped as f64 / full as f64;
            if fraction < HARD_MIN_EXTENT {
                bail!(
                    "selected {} for {} spans only {:.0}% of the image; the spot grid \
                     should cover most of the plate",
                    dim,
                    self.plate,
                    fraction * 100.0
                );
            }
            if fraction < WARN_MIN_EXTENT {
                warn!(
                    plate = %self.plate,
                    dim,
                    fraction = format!("{:.2}", fraction),
                    "selected grid spans less than half the image"
                );
            }
        }
        Ok(())
    }

    fn write_coords_file(
        &self,
        coords_file: &Path,
        series: &[PathBuf],
        coords: &PlateCoords,
    ) -> Result<()> {
        let mut lines =
            String::from("image\ttop_left_x\ttop_left_y\tbottom_right_x\tbottom_right_y\n");
        for image in series {
            let name = image
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            lines.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                name,
                coords.top_left_x,
                coords.top_left_y,
                coords.bottom_right_x,
                coords.bottom_right_y
            ));
        }
        let tmp = coords_file.with_extension("tsv.tmp");
        fs::write(&tmp, lines)?;
        fs::rename(&tmp, coords_file)?;
        Ok(())
    }
}
