//! Fitness normalization relative to the zero-concentration baseline.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::AnalysisConfig;
use crate::fitness::{FitnessEstimate, FitnessRecord};
use crate::layout::{PlateLayout, SampleId, Spot, SpotKey};

/// One spot with repaired raw values, relative values and its validity for
/// susceptibility estimation.
#[derive(Debug, Clone)]
pub struct FitnessRow {
    pub spot: Spot,
    pub sample: SampleId,
    pub raw: BTreeMap<FitnessEstimate, f64>,
    pub rel: BTreeMap<FitnessEstimate, f64>,
    pub susceptibility_valid: bool,
}

/// Repairs one raw estimate column so downstream ratios stay non-negative:
/// +inf values are replaced by the column's maximum finite value, and a
/// negative minimum shifts the whole column up by its absolute value.
pub fn repair_column(values: &mut [f64], estimate: FitnessEstimate) {
    let max_finite = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if max_finite.is_finite() {
        for v in values.iter_mut() {
            if *v == f64::INFINITY {
                *v = max_finite;
            }
        }
    }

    let min = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    if min.is_finite() && min < 0.0 {
        warn!(
            estimate = estimate.as_str(),
            shift = -min,
            "negative raw fitness values, shifting the whole column by a pseudocount"
        );
        for v in values.iter_mut() {
            if v.is_finite() {
                *v += -min;
            }
        }
    }
}

/// Ratio clamping: NaN or +inf map to 1.0, -inf to 0.0. A negative ratio
/// after column repair indicates malformed input and raises.
fn clamp_relative(value: f64, estimate: FitnessEstimate, sample: &SampleId) -> Result<f64> {
    if value.is_nan() || value == f64::INFINITY {
        return Ok(1.0);
    }
    if value == f64::NEG_INFINITY {
        return Ok(0.0);
    }
    if value < 0.0 {
        bail!(
            "internal error: negative relative {} for sample {} after column repair",
            estimate.as_str(),
            sample
        );
    }
    Ok(value)
}

/// Builds the per-spot fitness rows: repaired raw columns, baseline-relative
/// values and the susceptibility-validity flag.
///
/// A spot is valid for susceptibility only if its baseline spot is growing
/// and not a bad spot, fewer than 2 of its non-baseline concentrations are
/// bad spots, and the spot itself is not a bad spot.
pub fn normalize(
    records: &[FitnessRecord],
    layout: &PlateLayout,
    config: &AnalysisConfig,
) -> Result<Vec<FitnessRow>> {
    let spot_map = layout.spot_map();

    let mut record_index: BTreeMap<SpotKey, usize> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        record_index.insert(record.key(), i);
    }

    // Column repair runs over the whole estimate column, across every plate.
    let mut columns: BTreeMap<FitnessEstimate, Vec<f64>> = BTreeMap::new();
    for estimate in FitnessEstimate::ALL {
        let mut column: Vec<f64> = records.iter().map(|r| estimate.value(r)).collect();
        repair_column(&mut column, estimate);
        columns.insert(estimate, column);
    }

    // Baseline record per sample position, shared across all drugs.
    let baseline_index: BTreeMap<(u8, u8), usize> = match &layout.baseline {
        Some(baseline) => record_index
            .iter()
            .filter(|(key, _)| &key.plate == baseline)
            .map(|(key, &i)| ((key.row, key.column), i))
            .collect(),
        None => BTreeMap::new(),
    };

    // Bad spots among the non-baseline concentrations of each (sample, drug).
    let mut bad_counts: BTreeMap<(SampleId, String), usize> = BTreeMap::new();
    for spot in &layout.spots {
        if spot.concentration > 0.0 && spot.bad_spot {
            *bad_counts
                .entry((spot.sample(), spot.drug.clone()))
                .or_default() += 1;
        }
    }

    let mut rows = Vec::with_capacity(layout.spots.len());
    for spot in &layout.spots {
        let Some(&idx) = record_index.get(&spot.key()) else {
            bail!(
                "no fitness record for spot {} {}{}; the kinetic table is incomplete",
                spot.plate,
                (b'A' + spot.row - 1) as char,
                spot.column
            );
        };
        let sample = spot.sample();

        let baseline = baseline_index.get(&(spot.row, spot.column)).copied();
        let mut raw = BTreeMap::new();
        let mut rel = BTreeMap::new();
        for estimate in FitnessEstimate::ALL {
            let column = &columns[&estimate];
            let raw_value = column[idx];
            raw.insert(estimate, raw_value);
            let rel_value = match baseline {
                Some(b) => clamp_relative(raw_value / column[b], estimate, &sample)?,
                None => f64::NAN,
            };
            rel.insert(estimate, rel_value);
        }

        let susceptibility_valid = match baseline {
            Some(b) => {
                let baseline_record = &records[b];
                let baseline_spot = spot_map
                    .get(&baseline_record.key())
                    .expect("baseline records join the spot table");
                let baseline_ok = baseline_record.nauc >= config.min_nauc_growing
                    && !baseline_spot.bad_spot;
                let drug_bad_count = if spot.concentration > 0.0 {
                    bad_counts
                        .get(&(sample.clone(), spot.drug.clone()))
                        .copied()
                        .unwrap_or(0)
                } else {
                    0
                };
                baseline_ok && drug_bad_count < 2 && !spot.bad_spot
            }
            None => false,
        };

        rows.push(FitnessRow {
            spot: spot.clone(),
            sample,
            raw,
            rel,
            susceptibility_valid,
        });
    }
    Ok(rows)
}
