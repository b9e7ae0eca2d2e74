//! Blocking subprocess implementations of the rectifier and fitter
//! capabilities.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::AnalysisConfig;
use crate::services::{CurveFitter, ImageRectifier, WellCenter};

fn run_command(mut cmd: Command, what: &str) -> Result<()> {
    info!(what, command = ?cmd, "invoking external tool");
    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn {}", what))?;
    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            what,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

pub struct SubprocessRectifier {
    program: PathBuf,
    enhance_contrast: bool,
    reference_plate: Option<String>,
}

impl SubprocessRectifier {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            program: config.rectifier_program.clone(),
            enhance_contrast: config.enhance_contrast,
            reference_plate: config.reference_plate.as_ref().map(|p| p.to_string()),
        }
    }
}

impl ImageRectifier for SubprocessRectifier {
    fn rectify_batch(&self, linked_dir: &Path, rectified_dir: &Path) -> Result<()> {
        fs::create_dir_all(rectified_dir)?;
        let mut cmd = Command::new(&self.program);
        cmd.arg("rectify")
            .arg("--input")
            .arg(linked_dir)
            .arg("--output")
            .arg(rectified_dir);
        if self.enhance_contrast {
            cmd.arg("--enhance-contrast");
        }
        if let Some(reference) = &self.reference_plate {
            cmd.arg("--reference-plate").arg(reference);
        }
        run_command(cmd, "image rectifier")
    }
}

pub struct SubprocessFitter {
    program: PathBuf,
    experiment_hours: f64,
}

impl SubprocessFitter {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            program: config.fitter_program.clone(),
            experiment_hours: config.experiment_hours,
        }
    }
}

impl CurveFitter for SubprocessFitter {
    fn locate_wells(&self, image: &Path) -> Result<Vec<WellCenter>> {
        let out_file = image.with_extension("wells.tsv");
        let mut cmd = Command::new(&self.program);
        cmd.arg("locate-wells")
            .arg("--image")
            .arg(image)
            .arg("--output")
            .arg(&out_file);
        run_command(cmd, "well locator")?;
        read_well_centers(&out_file)
    }

    fn preview_grid(
        &self,
        images: &[PathBuf],
        coords_file: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let mut cmd = Command::new(&self.program);
        cmd.arg("preview-grid")
            .arg("--coordinates")
            .arg(coords_file)
            .arg("--output")
            .arg(out_dir);
        for image in images {
            cmd.arg("--image").arg(image);
        }
        run_command(cmd, "grid preview")?;
        let overlay = out_dir.join("grid_overlay.png");
        if !overlay.is_file() {
            bail!("grid preview produced no overlay at {}", overlay.display());
        }
        Ok(overlay)
    }

    fn fit_plate(&self, plate_dir: &Path, coords_file: &Path, out_dir: &Path) -> Result<()> {
        fs::create_dir_all(out_dir)?;
        let mut cmd = Command::new(&self.program);
        cmd.arg("fit")
            .arg("--input")
            .arg(plate_dir)
            .arg("--coordinates")
            .arg(coords_file)
            .arg("--hours")
            .arg(self.experiment_hours.to_string())
            .arg("--output")
            .arg(out_dir);
        run_command(cmd, "curve fitter")
    }
}

fn read_well_centers(path: &Path) -> Result<Vec<WellCenter>> {
    let file = fs::File::open(path)
        .with_context(|| format!("well locator wrote no output at {}", path.display()))?;
    let mut centers = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if i == 0 || line.trim().is_empty() {
            continue; // header
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            bail!("well center line {} of {} is malformed", i + 1, path.display());
        }
        centers.push(WellCenter {
            well: fields[0].parse().context("well index")?,
            x: fields[1].parse().context("well center x")?,
            y: fields[2].parse().context("well center y")?,
        });
    }
    Ok(centers)
}
