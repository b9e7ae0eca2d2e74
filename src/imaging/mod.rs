//! Raw image enumeration, acquisition timestamps and batch working dirs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::warn;

pub mod crop;

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["tiff", "tif", "jpg", "jpeg", "png", "gif"];

/// Acquisition timestamp parsed from a filename-embedded YYYYMMDDHHMM run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl Timestamp {
    pub fn compact(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }

    fn as_datetime(&self) -> Result<chrono::NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
            .and_then(|d| d.and_hms_opt(self.hour as u32, self.minute as u32, 0))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "timestamp {} is not a valid calendar date/time",
                    self.compact()
                )
            })
    }

    /// Hours elapsed since `start`.
    pub fn hours_since(&self, start: &Timestamp) -> Result<f64> {
        let delta = self.as_datetime()? - start.as_datetime()?;
        Ok(delta.num_minutes() as f64 / 60.0)
    }
}

/// Extracts the first contiguous 12-digit run from the filename and splits it
/// into calendar fields. Fields outside plausible ranges are warned about,
/// not rejected.
pub fn parse_timestamp(filename: &str) -> Result<Timestamp> {
    let digits = first_twelve_digit_run(filename).ok_or_else(|| {
        anyhow::anyhow!("cannot derive a YYYYMMDDHHMM timestamp from '{}'", filename)
    })?;

    let ts = Timestamp {
        year: digits[0..4].parse().unwrap(),
        month: digits[4..6].parse().unwrap(),
        day: digits[6..8].parse().unwrap(),
        hour: digits[8..10].parse().unwrap(),
        minute: digits[10..12].parse().unwrap(),
    };

    let checks: [(&str, u16, u16, u16); 5] = [
        ("year", ts.year, 2000, 2500),
        ("month", ts.month as u16, 1, 12),
        ("day", ts.day as u16, 1, 31),
        ("hour", ts.hour as u16, 0, 24),
        ("minute", ts.minute as u16, 0, 60),
    ];
    for (field, value, lo, hi) in checks {
        if value < lo || value > hi {
            warn!(
                file = filename,
                field, value, "parsed timestamp field looks implausible"
            );
        }
    }
    Ok(ts)
}

fn first_twelve_digit_run(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(st) = start.take() {
            if i - st == 12 {
                return Some(&s[st..i]);
            }
        }
    }
    if let Some(st) = start {
        if bytes.len() - st == 12 {
            return Some(&s[st..]);
        }
    }
    None
}

/// One raw photograph of a four-plate batch.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub path: PathBuf,
    pub timestamp: Timestamp,
    /// Fixed-width name required by the curve fitter, e.g. `img_0003_202108231200`.
    pub barcode: String,
}

/// Per-batch working directories and the timestamp-ordered image series.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    pub name: String,
    pub raw_dir: PathBuf,
    pub images: Vec<RawImage>,
    pub linked_dir: PathBuf,
    pub rectified_dir: PathBuf,
}

impl ImageBatch {
    pub fn plate_dir(&self, tmp_dir: &Path, plate: u8) -> PathBuf {
        tmp_dir
            .join("processed_images_each_plate")
            .join(format!("{}_plate{}", self.name, plate))
    }
}

/// Enumerates one plate-batch subdirectory: allowed extensions only, hidden
/// and non-conforming files skipped with a warning, series ordered by the
/// filename-embedded timestamp and remapped to fixed-width barcodes.
pub fn enumerate_batch(name: &str, raw_dir: &Path) -> Result<Vec<RawImage>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(raw_dir)
        .with_context(|| format!("failed to list batch directory {}", raw_dir.display()))?
    {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') {
            warn!(batch = name, file = %file_name, "skipping hidden file");
            continue;
        }
        if !entry.file_type()?.is_file() {
            continue;
        }
        let ext = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let allowed = ext
            .as_deref()
            .map(|e| ALLOWED_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if !allowed {
            warn!(
                batch = name,
                file = %file_name,
                "skipping file without an allowed image extension"
            );
            continue;
        }
        let timestamp = parse_timestamp(&file_name)
            .with_context(|| format!("image '{}' of batch '{}'", file_name, name))?;
        images.push(RawImage {
            path: entry.path(),
            timestamp,
            barcode: String::new(),
        });
    }
    if images.is_empty() {
        bail!("batch '{}' has no usable images in {}", name, raw_dir.display());
    }

    images.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    for (i, img) in images.iter_mut().enumerate() {
        img.barcode = format!("img_{:04}_{}", i, img.timestamp.compact());
    }
    Ok(images)
}

/// Barcode-based file name a raw image gets inside the working directories,
/// original extension preserved. The rectifier keeps this name.
pub fn linked_name(img: &RawImage) -> String {
    let ext = img
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "tif".to_string());
    format!("{}.{}", img.barcode, ext)
}

/// Copies every raw image into the batch working directory under its barcode
/// name, preserving the original extension. Skipped when the link already
/// exists, so reruns resume.
pub fn link_batch(images: &[RawImage], linked_dir: &Path) -> Result<()> {
    fs::create_dir_all(linked_dir)?;
    for img in images {
        let dest = linked_dir.join(linked_name(img));
        if crate::io::artifact_ready(&dest) {
            continue;
        }
        fs::copy(&img.path, &dest).with_context(|| {
            format!("failed to link {} to {}", img.path.display(), dest.display())
        })?;
    }
    Ok(())
}
