//! Layout through normalization to endpoint estimation, on synthetic
//! kinetics with a known dose response.

use agarqc::config::AnalysisConfig;
use agarqc::fitness::{FitnessEstimate, FitnessRecord};
use agarqc::layout::{PlateAssignment, PlateId, PlateLayout, Spot};
use agarqc::suscept::{estimate_susceptibility, normalize, simplify};

fn plate(n: u8) -> PlateId {
    PlateId {
        batch: "SC1".to_string(),
        plate: n,
    }
}

/// Baseline plate 1 plus ANI at 1, 2 and 4; two replicate spots per plate.
fn layout() -> PlateLayout {
    let specs = [
        (1u8, "water", 0.0),
        (2, "ANI", 1.0),
        (3, "ANI", 2.0),
        (4, "ANI", 4.0),
    ];
    let assignments = specs
        .iter()
        .map(|(n, drug, concentration)| PlateAssignment {
            plate: plate(*n),
            drug: drug.to_string(),
            concentration: *concentration,
        })
        .collect();
    let mut spots = Vec::new();
    for (n, drug, concentration) in specs {
        for column in [1u8, 2] {
            spots.push(Spot {
                plate: plate(n),
                row: 1,
                column,
                strain: "ca1".to_string(),
                drug: drug.to_string(),
                concentration,
                bad_spot: false,
            });
        }
    }
    PlateLayout {
        experiment: "e2e".to_string(),
        assignments,
        baseline: Some(plate(1)),
        spots,
        warnings: Vec::new(),
    }
}

/// Every kinetic parameter scaled by the same factor, so each estimate sees
/// the same relative dose response.
fn record(plate_n: u8, column: u8, factor: f64) -> FitnessRecord {
    FitnessRecord {
        plate: plate(plate_n),
        row: 1,
        column,
        k: 1.0 * factor,
        r: 0.5 * factor,
        nauc: 0.8 * factor,
        dt_h: 2.0 * factor,
        mdp: 0.1 * factor,
        mdr: 0.2 * factor,
        mdrmdp: 0.3 * factor,
        auc: 1.0 * factor,
        rsquare: 0.99,
        inv_dt_h: 0.5 * factor,
    }
}

#[test]
fn endpoints_from_synthetic_dose_response() {
    let layout = layout();
    // Relative fitness 1.0, 0.9, 0.4, 0.1 along the concentration series.
    let factors = [(1u8, 1.0), (2, 0.9), (3, 0.4), (4, 0.1)];
    let mut records = Vec::new();
    for (plate_n, factor) in factors {
        for column in [1u8, 2] {
            records.push(record(plate_n, column, factor));
        }
    }

    let config = AnalysisConfig::default();
    let rows = normalize(&records, &layout, &config).unwrap();
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|r| r.susceptibility_valid));

    let estimates = estimate_susceptibility(&rows, &layout, &config).unwrap();
    // 2 replicates x 9 estimates for the single drug.
    assert_eq!(estimates.len(), 18);

    let nauc_a1 = estimates
        .iter()
        .find(|r| r.estimate == FitnessEstimate::NAuc && r.sample.replicate == "A1")
        .unwrap();
    assert_eq!(nauc_a1.drug, "ANI");
    assert_eq!(nauc_a1.mic, [2.0, 2.0, 4.0, 8.0]);
    assert_eq!(nauc_a1.max_tested_concentration, 4.0);
    assert!((nauc_a1.baseline_fitness - 0.8).abs() < 1e-9);
    assert!(nauc_a1.rauc_log2 > 0.0 && nauc_a1.rauc_log2 < 1.0);
    assert!(nauc_a1.rauc_conc > 0.0 && nauc_a1.rauc_conc < 1.0);
    // Only one concentration sits above MIC_25 = 2, so SMG_25 is undefined.
    assert!(nauc_a1.smg[0].is_nan());

    let simplified = simplify(&estimates);
    assert_eq!(simplified.len(), 9);
    let nauc = simplified
        .iter()
        .find(|s| s.estimate == FitnessEstimate::NAuc)
        .unwrap();
    assert_eq!(nauc.replicates, 2);
    assert_eq!(nauc.mic50, 2.0);
}

#[test]
fn drugs_with_short_grids_are_skipped() {
    let mut layout = layout();
    // Drop the two highest concentrations: grid shrinks to [0, 1].
    layout.assignments.retain(|a| a.concentration <= 1.0);
    layout.spots.retain(|s| s.concentration <= 1.0);

    let mut records = Vec::new();
    for (plate_n, factor) in [(1u8, 1.0), (2, 0.9)] {
        for column in [1u8, 2] {
            records.push(record(plate_n, column, factor));
        }
    }
    let config = AnalysisConfig::default();
    let rows = normalize(&records, &layout, &config).unwrap();
    let estimates = estimate_susceptibility(&rows, &layout, &config).unwrap();
    assert!(estimates.is_empty());
}

#[test]
fn no_baseline_yields_no_estimates() {
    let mut layout = layout();
    layout.baseline = None;
    let mut records = Vec::new();
    for (plate_n, factor) in [(1u8, 1.0), (2, 0.9), (3, 0.4), (4, 0.1)] {
        for column in [1u8, 2] {
            records.push(record(plate_n, column, factor));
        }
    }
    let config = AnalysisConfig::default();
    let rows = normalize(&records, &layout, &config).unwrap();
    let estimates = estimate_susceptibility(&rows, &layout, &config).unwrap();
    assert!(estimates.is_empty());
}
