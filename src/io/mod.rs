use std::fs;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

pub mod summary;
pub mod tables;

/// Caching is the idempotence mechanism: a stage is skipped when its output
/// artifact already exists and is non-empty.
pub fn artifact_ready(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

pub fn write_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}
