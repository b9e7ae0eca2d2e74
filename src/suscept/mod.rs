//! Susceptibility estimation per drug, sample and fitness estimate.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::warn;

pub mod curves;
pub mod relative;

pub use curves::{DosePoint, RaucParams, MIC_FRACTIONS};
pub use relative::{normalize, FitnessRow};

use crate::config::AnalysisConfig;
use crate::fitness::FitnessEstimate;
use crate::layout::{PlateLayout, SampleId};
use crate::math::stats;

/// Endpoints for one (sample, drug, fitness estimate) triple. MIC and SMG
/// are indexed by [`MIC_FRACTIONS`].
#[derive(Debug, Clone)]
pub struct SusceptibilityRecord {
    pub drug: String,
    pub sample: SampleId,
    pub estimate: FitnessEstimate,
    pub mic: [f64; 4],
    pub rauc_conc: f64,
    pub rauc_log2: f64,
    pub smg: [f64; 4],
    pub baseline_fitness: f64,
    pub max_tested_concentration: f64,
}

/// Computes MIC, rAUC and SMG for every valid sample of every drug with
/// enough tested concentrations. Drugs with fewer than 3 distinct
/// concentrations (baseline included) are skipped with a warning.
pub fn estimate_susceptibility(
    rows: &[FitnessRow],
    layout: &PlateLayout,
    config: &AnalysisConfig,
) -> Result<Vec<SusceptibilityRecord>> {
    let Some(baseline_plate) = &layout.baseline else {
        warn!("no baseline plate in the layout, skipping susceptibility estimation");
        return Ok(Vec::new());
    };

    let rauc_params = RaucParams {
        min_points: config.min_rauc_points,
        pseudocount: config.pseudocount_log2_concentration,
    };

    // Baseline rows per sample, shared by every drug's series.
    let baseline_rows: BTreeMap<SampleId, &FitnessRow> = rows
        .iter()
        .filter(|r| &r.spot.plate == baseline_plate)
        .map(|r| (r.sample.clone(), r))
        .collect();

    let mut records = Vec::new();
    for drug in layout.drugs() {
        let grid = layout.concentration_grid(&drug);
        if grid.len() < 3 {
            warn!(
                drug = %drug,
                concentrations = grid.len(),
                "fewer than 3 distinct concentrations, skipping susceptibility"
            );
            continue;
        }

        let mut by_sample: BTreeMap<SampleId, Vec<&FitnessRow>> = BTreeMap::new();
        for row in rows {
            if row.spot.drug == drug && row.spot.concentration > 0.0 && row.susceptibility_valid {
                by_sample.entry(row.sample.clone()).or_default().push(row);
            }
        }

        for (sample, mut drug_rows) in by_sample {
            let Some(baseline_row) = baseline_rows.get(&sample) else {
                continue;
            };
            if !baseline_row.susceptibility_valid {
                continue;
            }
            drug_rows.sort_by(|a, b| {
                a.spot
                    .concentration
                    .partial_cmp(&b.spot.concentration)
                    .unwrap()
            });
            let max_tested = drug_rows
                .last()
                .map(|r| r.spot.concentration)
                .unwrap_or(0.0);

            for estimate in FitnessEstimate::ALL {
                let mut points = Vec::with_capacity(drug_rows.len() + 1);
                points.push(DosePoint {
                    concentration: 0.0,
                    rel: baseline_row.rel[&estimate],
                    raw: baseline_row.raw[&estimate],
                });
                points.extend(drug_rows.iter().map(|r| DosePoint {
                    concentration: r.spot.concentration,
                    rel: r.rel[&estimate],
                    raw: r.raw[&estimate],
                }));

                let mut mic = [f64::NAN; 4];
                let mut smg = [f64::NAN; 4];
                for (i, fraction) in MIC_FRACTIONS.iter().enumerate() {
                    mic[i] = curves::mic(&points, &grid, *fraction)?;
                    smg[i] = curves::smg(&points, mic[i], baseline_row.raw[&estimate]);
                }
                let rauc_conc = curves::rauc(&points, &grid, &rauc_params, false)?;
                let rauc_log2 = curves::rauc(&points, &grid, &rauc_params, true)?;

                records.push(SusceptibilityRecord {
                    drug: drug.clone(),
                    sample: sample.clone(),
                    estimate,
                    mic,
                    rauc_conc,
                    rauc_log2,
                    smg,
                    baseline_fitness: baseline_row.raw[&estimate],
                    max_tested_concentration: max_tested,
                });
            }
        }
    }
    Ok(records)
}

/// Replicate-aggregated view: per (strain, drug, estimate), the median of
/// MIC_50, log2-axis rAUC and SMG_50 across replicates with a finite value.
#[derive(Debug, Clone)]
pub struct SimplifiedRecord {
    pub strain: String,
    pub drug: String,
    pub estimate: FitnessEstimate,
    pub replicates: usize,
    pub mic50: f64,
    pub rauc_log2: f64,
    pub smg50: f64,
}

pub fn simplify(records: &[SusceptibilityRecord]) -> Vec<SimplifiedRecord> {
    let mic50_index = MIC_FRACTIONS
        .iter()
        .position(|f| *f == 0.50)
        .expect("0.50 is a MIC fraction");

    let mut groups: BTreeMap<(String, String, FitnessEstimate), Vec<&SusceptibilityRecord>> =
        BTreeMap::new();
    for record in records {
        groups
            .entry((
                record.sample.strain.clone(),
                record.drug.clone(),
                record.estimate,
            ))
            .or_default()
            .push(record);
    }

    let mut simplified = Vec::with_capacity(groups.len());
    for ((strain, drug, estimate), members) in groups {
        let median_of = |values: Vec<f64>| -> f64 {
            let mut finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                f64::NAN
            } else {
                stats::median(&mut finite)
            }
        };
        simplified.push(SimplifiedRecord {
            strain,
            drug,
            estimate,
            replicates: members.len(),
            mic50: median_of(members.iter().map(|m| m.mic[mic50_index]).collect()),
            rauc_log2: median_of(members.iter().map(|m| m.rauc_log2).collect()),
            smg50: median_of(members.iter().map(|m| m.smg[mic50_index]).collect()),
        });
    }
    simplified
}
