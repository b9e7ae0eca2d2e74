use std::collections::BTreeMap;
use std::fs;

use agarqc::fitness::badspot::{BadSpotFlag, BadSpotSource};
use agarqc::fitness::{FitnessEstimate, GrowthPoint};
use agarqc::io::{artifact_ready, tables};
use agarqc::layout::{PlateId, SampleId, Spot, SpotKey};
use agarqc::suscept::{FitnessRow, SusceptibilityRecord};
use tempfile::TempDir;

fn plate() -> PlateId {
    PlateId {
        batch: "SC1".to_string(),
        plate: 1,
    }
}

#[test]
fn artifact_ready_needs_content() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("a.tsv");
    assert!(!artifact_ready(&path));
    fs::write(&path, "").unwrap();
    assert!(!artifact_ready(&path));
    fs::write(&path, "x").unwrap();
    assert!(artifact_ready(&path));
}

#[test]
fn growth_table_layout() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("growth.tsv");
    let points = vec![GrowthPoint {
        plate: plate(),
        row: 1,
        column: 2,
        barcode: "img_0000_202108231200".to_string(),
        hours: 0.0,
        intensity: 0.25,
    }];
    tables::write_growth(&path, &points).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "plate_batch\tplate\trow\tcolumn\tbarcode\thours\tintensity"
    );
    assert_eq!(lines[1], "SC1\t1\t1\t2\timg_0000_202108231200\t0.0000\t0.250000");
}

#[test]
fn fitness_table_has_raw_and_relative_columns() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fitness.tsv");
    let mut raw = BTreeMap::new();
    let mut rel = BTreeMap::new();
    for estimate in FitnessEstimate::ALL {
        raw.insert(estimate, 0.5);
        rel.insert(estimate, 1.0);
    }
    let rows = vec![FitnessRow {
        spot: Spot {
            plate: plate(),
            row: 1,
            column: 1,
            strain: "ca1".to_string(),
            drug: "ANI".to_string(),
            concentration: 0.5,
            bad_spot: false,
        },
        sample: SampleId {
            strain: "ca1".to_string(),
            replicate: "A1".to_string(),
        },
        raw,
        rel,
        susceptibility_valid: true,
    }];
    tables::write_fitness(&path, &rows).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    let header: Vec<&str> = lines[0].split('\t').collect();
    // 9 fixed columns, 9 raw estimates, 9 relative, 1 validity flag.
    assert_eq!(header.len(), 9 + 9 + 9 + 1);
    assert!(header.contains(&"nAUC"));
    assert!(header.contains(&"nAUC_rel"));
    assert!(lines[1].starts_with("SC1\t1\t1\t1\tA1\tca1\tANI\t0.5\tfalse"));
    assert!(lines[1].ends_with("\ttrue"));
}

#[test]
fn susceptibility_table_writes_nan_explicitly() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("suscept.tsv");
    let records = vec![SusceptibilityRecord {
        drug: "ANI".to_string(),
        sample: SampleId {
            strain: "ca1".to_string(),
            replicate: "A1".to_string(),
        },
        estimate: FitnessEstimate::NAuc,
        mic: [2.0, 2.0, 4.0, f64::NAN],
        rauc_conc: 0.5,
        rauc_log2: 0.4,
        smg: [f64::NAN; 4],
        baseline_fitness: 0.8,
        max_tested_concentration: 4.0,
    }];
    tables::write_susceptibility(&path, &records).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("strain\treplicate\tdrug\testimate\tMIC_25\tMIC_50\tMIC_75\tMIC_90"));
    assert!(lines[1].starts_with("ca1\tA1\tANI\tnAUC\t2.000000\t2.000000\t4.000000\tNaN"));
}

#[test]
fn bad_spot_report_columns() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.tsv");
    let flags = vec![BadSpotFlag {
        key: SpotKey {
            plate: plate(),
            row: 2,
            column: 3,
        },
        strain: "ca1".to_string(),
        nauc: 0.05,
        source: BadSpotSource::Auto,
        reason: "nAUC 0.0500 outside [0.1050, 1.3050] for ca1 replicates".to_string(),
    }];
    tables::write_bad_spots(&path, &flags).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "plate_batch\tplate\trow\tcolumn\tstrain\tnAUC\tsource\treason"
    );
    assert!(lines[1].starts_with("SC1\t1\t2\t3\tca1\t0.050000\tauto\t"));
}
