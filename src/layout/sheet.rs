//! Rectangular cell grid backing the plate-layout sheet.
//!
//! Excel mechanics stay outside the core: the layout arrives as a grid of
//! text cells, loaded here from a tab-separated sheet file. Tables inside the
//! grid are located by scanning for sentinel header cells, never by fixed
//! offsets.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read layout sheet {}", path.display()))?;
        let rows = text
            .lines()
            .map(|line| line.split('\t').map(|c| c.trim().to_string()).collect())
            .collect();
        Ok(Self { rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Cell content, empty string when the cell is absent.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn row(&self, row: usize) -> &[String] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Locates the first cell whose content equals `sentinel`
    /// (case-insensitive, trimmed). Returns (row, col).
    pub fn find_sentinel(&self, sentinel: &str) -> Option<(usize, usize)> {
        for (ri, row) in self.rows.iter().enumerate() {
            for (ci, cell) in row.iter().enumerate() {
                if cell.trim().eq_ignore_ascii_case(sentinel) {
                    return Some((ri, ci));
                }
            }
        }
        None
    }

    pub fn require_sentinel(&self, sentinel: &str) -> Result<(usize, usize)> {
        match self.find_sentinel(sentinel) {
            Some(pos) => Ok(pos),
            None => bail!("layout sheet has no '{}' table header", sentinel),
        }
    }

    /// True when every cell of the row is empty; table blocks end at the
    /// first such row.
    pub fn row_is_blank(&self, row: usize) -> bool {
        self.row(row).iter().all(|c| c.trim().is_empty())
    }
}

/// Finds the single layout sheet in the input directory. Zero or several is a
/// structural error.
pub fn discover_layout_file(input_dir: &Path) -> Result<std::path::PathBuf> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(input_dir)
        .with_context(|| format!("failed to list input directory {}", input_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_file() && name.ends_with(".tsv") && name.contains("plate_layout") {
            candidates.push(entry.path());
        }
    }
    match candidates.len() {
        0 => bail!(
            "no plate_layout sheet (*.tsv) found in {}",
            input_dir.display()
        ),
        1 => Ok(candidates.remove(0)),
        n => bail!(
            "expected exactly one plate_layout sheet in {}, found {}",
            input_dir.display(),
            n
        ),
    }
}
