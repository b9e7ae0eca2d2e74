//! Per-plate invocation of the curve fitter and assembly of the kinetic
//! tables.
//!
//! Every (plate_batch, plate) pair is one unit of work: verify the accepted
//! coordinates, skip entirely when both persisted artifacts already exist,
//! otherwise run the fitter in an isolated subdirectory, post-process and
//! persist. Units share no mutable state and write to disjoint paths; the
//! pool join is the only synchronization point.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use tracing::info;

use crate::calibrate::COORDS_FILE;
use crate::config::AnalysisConfig;
use crate::fitness::{FitnessRecord, GrowthPoint};
use crate::imaging::parse_timestamp;
use crate::layout::PlateId;
use crate::services::{with_retries, CurveFitter};

pub const INTEGRATED_FILE: &str = "integrated.tsv";
pub const GROWTH_FILE: &str = "growth_measurements.tsv";

const KINETICS_COLUMNS: usize = 11;

/// One parallel unit: a plate and its cropped-image directory.
#[derive(Debug, Clone)]
pub struct PlateWork {
    pub plate: PlateId,
    pub plate_dir: PathBuf,
}

/// Integrates every plate across a pool sized to the configured thread count
/// (0 = all cores). A failing unit aborts the whole batch after its retries
/// are exhausted.
pub fn integrate_all(
    work: &[PlateWork],
    fitter: &dyn CurveFitter,
    config: &AnalysisConfig,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build thread pool: {}", e))?;
    pool.install(|| {
        work.par_iter()
            .try_for_each(|unit| integrate_plate(unit, fitter, config))
    })
}

fn integrate_plate(
    unit: &PlateWork,
    fitter: &dyn CurveFitter,
    config: &AnalysisConfig,
) -> Result<()> {
    let coords_file = unit.plate_dir.join(COORDS_FILE);
    if !crate::io::artifact_ready(&coords_file) {
        bail!(
            "plate {} has no accepted coordinates file at {}",
            unit.plate,
            coords_file.display()
        );
    }

    // Both artifacts must be present for the skip: a failure between the two
    // writes would otherwise wedge every rerun on the missing one.
    let integrated = unit.plate_dir.join(INTEGRATED_FILE);
    let growth_file = unit.plate_dir.join(GROWTH_FILE);
    if crate::io::artifact_ready(&integrated) && crate::io::artifact_ready(&growth_file) {
        info!(plate = %unit.plate, "integrated output already present, skipping fit");
        return Ok(());
    }

    let fit_dir = unit.plate_dir.join("fit_out");
    with_retries(&format!("curve fit of {}", unit.plate), config.retries, || {
        fitter.fit_plate(&unit.plate_dir, &coords_file, &fit_dir)
    })?;

    let mut records = read_kinetics(&unit.plate, &fit_dir.join("kinetics.tsv"))?;
    for record in &mut records {
        record.postprocess();
    }

    let growth = read_fitter_growth(&unit.plate, &fit_dir.join("growth.tsv"))?;
    write_growth(&growth_file, &growth)?;
    // Written last, so its presence marks the unit complete.
    write_integrated(&integrated, &records)?;
    Ok(())
}

fn read_kinetics(plate: &PlateId, path: &Path) -> Result<Vec<FitnessRecord>> {
    let file = fs::File::open(path)
        .with_context(|| format!("curve fitter wrote no kinetics table at {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != KINETICS_COLUMNS {
            bail!(
                "kinetics line {} of {} has {} fields, expected {}",
                i + 1,
                path.display(),
                fields.len(),
                KINETICS_COLUMNS
            );
        }
        // NaN would poison the outlier statistics downstream; infinities are
        // left alone, column repair handles them during normalization.
        let parse = |j: usize, name: &str| -> Result<f64> {
            let value: f64 = fields[j]
                .parse()
                .with_context(|| format!("kinetics field {} on line {}", name, i + 1))?;
            if value.is_nan() {
                bail!(
                    "kinetics field {} on line {} of {} is NaN",
                    name,
                    i + 1,
                    path.display()
                );
            }
            Ok(value)
        };
        records.push(FitnessRecord {
            plate: plate.clone(),
            row: fields[0].parse().context("kinetics row")?,
            column: fields[1].parse().context("kinetics column")?,
            k: parse(2, "K")?,
            r: parse(3, "r")?,
            nauc: parse(4, "nAUC")?,
            dt_h: parse(5, "DT_h")?,
            mdp: parse(6, "MDP")?,
            mdr: parse(7, "MDR")?,
            mdrmdp: parse(8, "MDRMDP")?,
            auc: parse(9, "AUC")?,
            rsquare: parse(10, "rsquare")?,
            inv_dt_h: 0.0,
        });
    }
    if records.is_empty() {
        bail!("kinetics table {} holds no spots", path.display());
    }
    Ok(records)
}

/// Merges the fitter's per-image raw measurements into growth points with
/// hours relative to the earliest timepoint of the plate.
fn read_fitter_growth(plate: &PlateId, path: &Path) -> Result<Vec<GrowthPoint>> {
    let file = fs::File::open(path)
        .with_context(|| format!("curve fitter wrote no growth table at {}", path.display()))?;
    let mut raw: Vec<(String, u8, u8, f64)> = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            bail!("growth line {} of {} is malformed", i + 1, path.display());
        }
        raw.push((
            fields[0].to_string(),
            fields[1].parse().context("growth row")?,
            fields[2].parse().context("growth column")?,
            fields[3].parse().context("growth intensity")?,
        ));
    }
    if raw.is_empty() {
        bail!("growth table {} holds no measurements", path.display());
    }

    let mut start = None;
    for (barcode, ..) in &raw {
        let ts = parse_timestamp(barcode)?;
        if start.map(|s| ts < s).unwrap_or(true) {
            start = Some(ts);
        }
    }
    let start = start.expect("growth table is non-empty");

    let mut points = Vec::with_capacity(raw.len());
    for (barcode, row, column, intensity) in raw {
        let hours = parse_timestamp(&barcode)?.hours_since(&start)?;
        points.push(GrowthPoint {
            plate: plate.clone(),
            row,
            column,
            barcode,
            hours,
            intensity,
        });
    }
    points.sort_by(|a, b| {
        (a.row, a.column)
            .cmp(&(b.row, b.column))
            .then(a.hours.partial_cmp(&b.hours).unwrap())
    });
    Ok(points)
}

fn write_integrated(path: &Path, records: &[FitnessRecord]) -> Result<()> {
    let tmp = path.with_extension("tsv.tmp");
    {
        let file = fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        let mut w = BufWriter::new(file);
        writeln!(
            w,
            "row\tcolumn\tK\tr\tnAUC\tDT_h\tMDP\tMDR\tMDRMDP\tAUC\trsquare\tinv_DT_h"
        )?;
        for r in records {
            writeln!(
                w,
                "{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
                r.row, r.column, r.k, r.r, r.nauc, r.dt_h, r.mdp, r.mdr, r.mdrmdp, r.auc,
                r.rsquare, r.inv_dt_h
            )?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_growth(path: &Path, points: &[GrowthPoint]) -> Result<()> {
    let tmp = path.with_extension("tsv.tmp");
    {
        let file = fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        let mut w = BufWriter::new(file);
        writeln!(w, "row\tcolumn\tbarcode\thours\tintensity")?;
        for p in points {
            writeln!(
                w,
                "{}\t{}\t{}\t{:.4}\t{:.6}",
                p.row, p.column, p.barcode, p.hours, p.intensity
            )?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads one plate's persisted integrated table back into records.
pub fn read_integrated(plate: &PlateId, plate_dir: &Path) -> Result<Vec<FitnessRecord>> {
    let path = plate_dir.join(INTEGRATED_FILE);
    let file = fs::File::open(&path)
        .with_context(|| format!("missing integrated table {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 12 {
            bail!("integrated line {} of {} is malformed", i + 1, path.display());
        }
        let num = |j: usize| -> Result<f64> {
            fields[j]
                .parse()
                .with_context(|| format!("integrated field {} on line {}", j, i + 1))
        };
        records.push(FitnessRecord {
            plate: plate.clone(),
            row: fields[0].parse().context("integrated row")?,
            column: fields[1].parse().context("integrated column")?,
            k: num(2)?,
            r: num(3)?,
            nauc: num(4)?,
            dt_h: num(5)?,
            mdp: num(6)?,
            mdr: num(7)?,
            mdrmdp: num(8)?,
            auc: num(9)?,
            rsquare: num(10)?,
            inv_dt_h: num(11)?,
        });
    }
    Ok(records)
}

/// Reads one plate's persisted growth table back into points.
pub fn read_growth(plate: &PlateId, plate_dir: &Path) -> Result<Vec<GrowthPoint>> {
    let path = plate_dir.join(GROWTH_FILE);
    let file = fs::File::open(&path)
        .with_context(|| format!("missing growth table {}", path.display()))?;
    let mut points = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            bail!("growth line {} of {} is malformed", i + 1, path.display());
        }
        points.push(GrowthPoint {
            plate: plate.clone(),
            row: fields[0].parse().context("growth row")?,
            column: fields[1].parse().context("growth column")?,
            barcode: fields[2].to_string(),
            hours: fields[3].parse().context("growth hours")?,
            intensity: fields[4].parse().context("growth intensity")?,
        });
    }
    Ok(points)
}
