//! Sentinel-discovered parsing and structural validation of the layout sheet.
//!
//! Four logical tables: the compound grid (rows = plate batches, columns =
//! plates 1..4), the parallel concentration grid, the manual bad-spot list
//! and the 96-well strain grid, plus the free-text experiment-name cell.
//! Validation is intentionally strict: downstream joins assume a complete
//! rectangular grid, so every failure names the violated rule.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};

use crate::layout::{
    PlateAssignment, PlateId, PlateLayout, Sheet, Spot, PLATE_COLUMNS, PLATE_ROWS,
};

const SENTINEL_EXPERIMENT: &str = "experiment";
const SENTINEL_COMPOUNDS: &str = "compounds";
const SENTINEL_CONCENTRATIONS: &str = "concentrations";
const SENTINEL_BAD_SPOTS: &str = "bad spots";
const SENTINEL_STRAINS: &str = "strains";

const DEFAULT_EXPERIMENT: &str = "unnamed_experiment";

pub fn parse_layout(sheet: &Sheet) -> Result<PlateLayout> {
    let mut warnings = Vec::new();

    let experiment = parse_experiment_name(sheet);
    let compounds = parse_plate_grid(sheet, SENTINEL_COMPOUNDS)?;
    let concentrations = parse_plate_grid(sheet, SENTINEL_CONCENTRATIONS)?;
    let assignments = build_assignments(&compounds, &concentrations)?;
    let baseline = find_baseline(&assignments, &mut warnings)?;
    let strains = parse_strain_grid(sheet)?;

    let mut spots = Vec::with_capacity(assignments.len() * 96);
    for a in &assignments {
        for row in 1..=PLATE_ROWS {
            for column in 1..=PLATE_COLUMNS {
                spots.push(Spot {
                    plate: a.plate.clone(),
                    row,
                    column,
                    strain: strains[(row - 1) as usize][(column - 1) as usize].clone(),
                    drug: a.drug.clone(),
                    concentration: a.concentration,
                    bad_spot: false,
                });
            }
        }
    }

    apply_manual_bad_spots(sheet, &assignments, &mut spots)?;

    Ok(PlateLayout {
        experiment,
        assignments,
        baseline,
        spots,
        warnings,
    })
}

fn parse_experiment_name(sheet: &Sheet) -> String {
    let Some((row, col)) = sheet.find_sentinel(SENTINEL_EXPERIMENT) else {
        return DEFAULT_EXPERIMENT.to_string();
    };
    let name = sheet.cell(row, col + 1).trim();
    if name.is_empty() {
        DEFAULT_EXPERIMENT.to_string()
    } else {
        name.to_string()
    }
}

/// A batch-by-plate grid as laid out under the `compounds` and
/// `concentrations` sentinels.
struct PlateGrid {
    sentinel: String,
    batches: Vec<String>,
    plates: Vec<u8>,
    /// cells[batch_index][plate_index], untyped.
    cells: Vec<Vec<String>>,
}

fn parse_plate_grid(sheet: &Sheet, sentinel: &str) -> Result<PlateGrid> {
    let (sent_row, sent_col) = sheet.require_sentinel(sentinel)?;

    let header_row = sent_row + 1;
    if !sheet
        .cell(header_row, sent_col)
        .eq_ignore_ascii_case("plate_batch")
    {
        bail!(
            "'{}' table must carry a 'plate_batch' header row right below the sentinel",
            sentinel
        );
    }
    let mut plates = Vec::new();
    let mut col = sent_col + 1;
    loop {
        let cell = sheet.cell(header_row, col);
        if cell.is_empty() {
            break;
        }
        let Some(num) = cell.strip_prefix("plate") else {
            bail!(
                "'{}' table header cell '{}' should read plate<N>",
                sentinel,
                cell
            );
        };
        let plate: u8 = num
            .parse()
            .with_context(|| format!("'{}' table header cell '{}' is not plate<N>", sentinel, cell))?;
        if !(1..=4).contains(&plate) {
            bail!("'{}' table names plate {}, allowed plates are 1..4", sentinel, plate);
        }
        if plates.contains(&plate) {
            bail!("'{}' table names plate {} twice", sentinel, plate);
        }
        plates.push(plate);
        col += 1;
    }
    if plates.is_empty() {
        bail!("'{}' table has no plate columns", sentinel);
    }

    let mut batches = Vec::new();
    let mut cells = Vec::new();
    let mut row = header_row + 1;
    while row < sheet.n_rows() && !sheet.row_is_blank(row) {
        let batch = sheet.cell(row, sent_col).to_string();
        if batch.is_empty() {
            bail!("'{}' table has a row with an empty plate_batch cell", sentinel);
        }
        if batches.contains(&batch) {
            bail!("'{}' table lists plate batch '{}' twice", sentinel, batch);
        }
        let mut batch_cells = Vec::with_capacity(plates.len());
        for (i, _) in plates.iter().enumerate() {
            batch_cells.push(sheet.cell(row, sent_col + 1 + i).to_string());
        }
        batches.push(batch);
        cells.push(batch_cells);
        row += 1;
    }
    if batches.is_empty() {
        bail!("'{}' table has no plate batch rows", sentinel);
    }

    Ok(PlateGrid {
        sentinel: sentinel.to_string(),
        batches,
        plates,
        cells,
    })
}

fn build_assignments(
    compounds: &PlateGrid,
    concentrations: &PlateGrid,
) -> Result<Vec<PlateAssignment>> {
    if compounds.batches != concentrations.batches || compounds.plates != concentrations.plates {
        bail!(
            "'{}' and '{}' tables must align cell-for-cell: same plate batches and plate columns",
            compounds.sentinel,
            concentrations.sentinel
        );
    }

    let mut assignments = Vec::new();
    let mut seen: BTreeMap<(String, u64), PlateId> = BTreeMap::new();
    for (bi, batch) in compounds.batches.iter().enumerate() {
        for (pi, &plate) in compounds.plates.iter().enumerate() {
            let drug = compounds.cells[bi][pi].trim();
            let conc_cell = concentrations.cells[bi][pi].trim();
            match (drug.is_empty(), conc_cell.is_empty()) {
                (true, true) => continue, // plate not used in this batch
                (true, false) | (false, true) => bail!(
                    "plate {}-plate{} has a compound or concentration without its counterpart",
                    batch,
                    plate
                ),
                (false, false) => {}
            }
            let concentration: f64 = conc_cell.parse().with_context(|| {
                format!(
                    "concentration '{}' of plate {}-plate{} is not a number",
                    conc_cell, batch, plate
                )
            })?;
            if !concentration.is_finite() || concentration < 0.0 {
                bail!(
                    "concentration {} of plate {}-plate{} must be finite and >= 0",
                    concentration,
                    batch,
                    plate
                );
            }
            let plate_id = PlateId {
                batch: batch.clone(),
                plate,
            };
            // Non-baseline drug/concentration combinations must be unique.
            if concentration > 0.0 {
                let key = (drug.to_string(), concentration.to_bits());
                if let Some(prev) = seen.insert(key, plate_id.clone()) {
                    bail!(
                        "drug '{}' at concentration {} appears on both {} and {}",
                        drug,
                        concentration,
                        prev,
                        plate_id
                    );
                }
            }
            assignments.push(PlateAssignment {
                plate: plate_id,
                drug: drug.to_string(),
                concentration,
            });
        }
    }
    Ok(assignments)
}

fn find_baseline(
    assignments: &[PlateAssignment],
    warnings: &mut Vec<String>,
) -> Result<Option<PlateId>> {
    let baselines: Vec<&PlateAssignment> = assignments
        .iter()
        .filter(|a| a.concentration == 0.0)
        .collect();
    match baselines.len() {
        0 => {
            warnings.push(
                "no concentration-0 baseline plate in the layout; susceptibility \
                 estimation will be skipped"
                    .to_string(),
            );
            Ok(None)
        }
        1 => Ok(Some(baselines[0].plate.clone())),
        n => bail!(
            "exactly one concentration-0 baseline plate is allowed, found {} ({})",
            n,
            baselines
                .iter()
                .map(|a| a.plate.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn parse_strain_grid(sheet: &Sheet) -> Result<Vec<Vec<String>>> {
    let (sent_row, sent_col) = sheet.require_sentinel(SENTINEL_STRAINS)?;

    let mut grid = Vec::with_capacity(PLATE_ROWS as usize);
    for r in 0..PLATE_ROWS {
        let row = sent_row + 1 + r as usize;
        let letter_cell = sheet.cell(row, sent_col);
        let expected = (b'A' + r) as char;
        if letter_cell.len() != 1 || letter_cell.chars().next() != Some(expected) {
            bail!(
                "strain grid row {} should start with row letter '{}', found '{}'",
                r + 1,
                expected,
                letter_cell
            );
        }
        let mut strains = Vec::with_capacity(PLATE_COLUMNS as usize);
        for c in 0..PLATE_COLUMNS {
            let cell = sheet.cell(row, sent_col + 1 + c as usize).trim().to_string();
            if cell.is_empty() {
                bail!(
                    "strain grid cell {}{} is empty; the 8x12 grid must be complete",
                    expected,
                    c + 1
                );
            }
            strains.push(cell);
        }
        grid.push(strains);
    }
    Ok(grid)
}

fn apply_manual_bad_spots(
    sheet: &Sheet,
    assignments: &[PlateAssignment],
    spots: &mut [Spot],
) -> Result<()> {
    let (sent_row, sent_col) = sheet.require_sentinel(SENTINEL_BAD_SPOTS)?;

    let header_row = sent_row + 1;
    let expected_header = ["plate_batch", "plate", "row", "column"];
    for (i, want) in expected_header.iter().enumerate() {
        if !sheet.cell(header_row, sent_col + i).eq_ignore_ascii_case(want) {
            bail!(
                "'{}' table header must read plate_batch/plate/row/column",
                SENTINEL_BAD_SPOTS
            );
        }
    }

    let mut row = header_row + 1;
    while row < sheet.n_rows() && !sheet.row_is_blank(row) {
        let batch = sheet.cell(row, sent_col).to_string();
        let plate: u8 = sheet
            .cell(row, sent_col + 1)
            .parse()
            .with_context(|| format!("bad-spot entry for batch '{}' has a non-numeric plate", batch))?;
        let well_row = row_from_letter(sheet.cell(row, sent_col + 2))?;
        let column: u8 = sheet
            .cell(row, sent_col + 3)
            .parse()
            .with_context(|| format!("bad-spot entry for batch '{}' has a non-numeric column", batch))?;
        if !(1..=PLATE_COLUMNS).contains(&column) {
            bail!("bad-spot column {} is outside 1..{}", column, PLATE_COLUMNS);
        }
        let plate_id = PlateId {
            batch: batch.clone(),
            plate,
        };
        if !assignments.iter().any(|a| a.plate == plate_id) {
            bail!("bad-spot entry references unknown plate {}", plate_id);
        }
        for spot in spots.iter_mut() {
            if spot.plate == plate_id && spot.row == well_row && spot.column == column {
                spot.bad_spot = true;
            }
        }
        row += 1;
    }
    Ok(())
}

/// Converts row letters A..H to 1..8.
pub fn row_from_letter(letter: &str) -> Result<u8> {
    let trimmed = letter.trim();
    if trimmed.len() == 1 {
        let c = trimmed.chars().next().unwrap().to_ascii_uppercase();
        if ('A'..='H').contains(&c) {
            return Ok(c as u8 - b'A' + 1);
        }
    }
    bail!("row letter '{}' is not in A..H", letter)
}
