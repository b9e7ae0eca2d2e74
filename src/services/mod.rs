//! Capability interfaces over the two external numerical tools.
//!
//! The core depends only on these traits; the concrete tools are blocking
//! subprocesses behind [`subprocess`]. A non-zero exit status is fatal for
//! that invocation, and every invocation site wraps the call in
//! [`with_retries`].

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::warn;

pub mod subprocess;

/// Rotates, optionally contrast-enhances and canonically orients every image
/// of one plate batch in a single invocation.
pub trait ImageRectifier: Send + Sync {
    fn rectify_batch(&self, linked_dir: &Path, rectified_dir: &Path) -> Result<()>;
}

/// Center of one detected well on a reference image, wells numbered 1..96
/// row-major.
#[derive(Debug, Clone, Copy)]
pub struct WellCenter {
    pub well: u16,
    pub x: u32,
    pub y: u32,
}

/// Segments colonies and fits the growth model.
pub trait CurveFitter: Send + Sync {
    /// Segmentation only: detected well centers on one reference image.
    fn locate_wells(&self, image: &Path) -> Result<Vec<WellCenter>>;

    /// Segmentation over a representative image subset, writing a grid
    /// overlay for operator validation. Returns the overlay path.
    fn preview_grid(&self, images: &[PathBuf], coords_file: &Path, out_dir: &Path)
        -> Result<PathBuf>;

    /// Full segmentation + growth-model fit for one cropped plate series.
    /// Writes `growth.tsv` (barcode, row, column, intensity) and
    /// `kinetics.tsv` (row, column, K, r, nAUC, DT_h, MDP, MDR, MDRMDP, AUC,
    /// rsquare) into `out_dir`.
    fn fit_plate(&self, plate_dir: &Path, coords_file: &Path, out_dir: &Path) -> Result<()>;
}

/// Runs `f` up to `1 + retries` times, warning between attempts and
/// propagating the last error. No partial-success continuation: the caller
/// aborts on the returned error.
pub fn with_retries<T>(what: &str, retries: u32, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(
                    what,
                    attempt,
                    retries,
                    error = %err,
                    "external invocation failed, retrying"
                );
            }
            Err(err) => {
                return Err(err.context(format!(
                    "{} failed after {} attempt(s)",
                    what,
                    attempt + 1
                )))
            }
        }
    }
}
