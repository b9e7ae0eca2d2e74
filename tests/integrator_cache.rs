use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use agarqc::config::AnalysisConfig;
use agarqc::fitness::integrate::{integrate_all, read_growth, read_integrated, PlateWork};
use agarqc::fitness::PENALTY_DT_H;
use agarqc::layout::PlateId;
use agarqc::services::{CurveFitter, WellCenter};
use anyhow::Result;
use tempfile::TempDir;

const KINETICS: &str = "row\tcolumn\tK\tr\tnAUC\tDT_h\tMDP\tMDR\tMDRMDP\tAUC\trsquare\n\
                        1\t1\t1.2\t0.5\t0.8\t2.0\t0.1\t0.2\t0.3\t1.0\t0.99\n\
                        1\t2\t0.9\t0.4\t0.6\t3.0\t0.1\t0.2\t0.3\t0.8\t0.42\n";

/// Fitter double writing a fixed two-spot kinetic table.
#[derive(Default)]
struct FakeFitter {
    fit_calls: AtomicUsize,
    kinetics: Option<&'static str>,
}

impl CurveFitter for FakeFitter {
    fn locate_wells(&self, _image: &Path) -> Result<Vec<WellCenter>> {
        anyhow::bail!("not under test");
    }

    fn preview_grid(
        &self,
        _images: &[PathBuf],
        _coords_file: &Path,
        _out_dir: &Path,
    ) -> Result<PathBuf> {
        anyhow::bail!("not under test");
    }

    fn fit_plate(&self, _plate_dir: &Path, _coords_file: &Path, out_dir: &Path) -> Result<()> {
        self.fit_calls.fetch_add(1, Ordering::SeqCst);
        fs::create_dir_all(out_dir)?;
        fs::write(out_dir.join("kinetics.tsv"), self.kinetics.unwrap_or(KINETICS))?;
        fs::write(
            out_dir.join("growth.tsv"),
            "barcode\trow\tcolumn\tintensity\n\
             img_0001_202108240000\t1\t1\t0.9\n\
             img_0000_202108231200\t1\t1\t0.2\n",
        )?;
        Ok(())
    }
}

fn work_unit(dir: &Path) -> PlateWork {
    let plate_dir = dir.join("SC1_plate1");
    fs::create_dir_all(&plate_dir).unwrap();
    fs::write(
        plate_dir.join("coordinates.tsv"),
        "image\ttop_left_x\ttop_left_y\tbottom_right_x\tbottom_right_y\nimg.png\t1\t1\t9\t9\n",
    )
    .unwrap();
    PlateWork {
        plate: PlateId {
            batch: "SC1".to_string(),
            plate: 1,
        },
        plate_dir,
    }
}

#[test]
fn integration_postprocesses_and_persists() {
    let tmp = TempDir::new().unwrap();
    let unit = work_unit(tmp.path());
    let fitter = FakeFitter::default();
    integrate_all(
        std::slice::from_ref(&unit),
        &fitter,
        &AnalysisConfig::default(),
    )
    .unwrap();

    let records = read_integrated(&unit.plate, &unit.plate_dir).unwrap();
    assert_eq!(records.len(), 2);
    // Good fit keeps its doubling time.
    assert!((records[0].dt_h - 2.0).abs() < 1e-9);
    assert!((records[0].inv_dt_h - 0.5).abs() < 1e-9);
    // Poor fit (rsquare 0.42) gets the penalty doubling time.
    assert!((records[1].dt_h - PENALTY_DT_H).abs() < 1e-9);
    assert!((records[1].inv_dt_h - 1.0 / PENALTY_DT_H).abs() < 1e-9);

    // Growth measurements come back hours-relative and time-ordered.
    let growth = read_growth(&unit.plate, &unit.plate_dir).unwrap();
    assert_eq!(growth.len(), 2);
    assert_eq!(growth[0].hours, 0.0);
    assert!((growth[1].hours - 12.0).abs() < 1e-9);
}

#[test]
fn integration_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let unit = work_unit(tmp.path());
    let fitter = FakeFitter::default();
    let config = AnalysisConfig::default();

    integrate_all(std::slice::from_ref(&unit), &fitter, &config).unwrap();
    let first = fs::read(unit.plate_dir.join("integrated.tsv")).unwrap();
    assert_eq!(fitter.fit_calls.load(Ordering::SeqCst), 1);

    // Second run: the persisted artifact gates the fit entirely.
    integrate_all(std::slice::from_ref(&unit), &fitter, &config).unwrap();
    let second = fs::read(unit.plate_dir.join("integrated.tsv")).unwrap();
    assert_eq!(fitter.fit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[test]
fn partial_artifacts_rerun_the_fit() {
    let tmp = TempDir::new().unwrap();
    let unit = work_unit(tmp.path());
    // As left by a crash between the two artifact writes: one table present,
    // the other missing. The fit must rerun instead of wedging on the skip.
    fs::write(
        unit.plate_dir.join("integrated.tsv"),
        "row\tcolumn\tK\tr\tnAUC\tDT_h\tMDP\tMDR\tMDRMDP\tAUC\trsquare\tinv_DT_h\n",
    )
    .unwrap();

    let fitter = FakeFitter::default();
    integrate_all(
        std::slice::from_ref(&unit),
        &fitter,
        &AnalysisConfig::default(),
    )
    .unwrap();
    assert_eq!(fitter.fit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(read_integrated(&unit.plate, &unit.plate_dir).unwrap().len(), 2);
    assert_eq!(read_growth(&unit.plate, &unit.plate_dir).unwrap().len(), 2);
}

#[test]
fn nan_kinetics_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let unit = work_unit(tmp.path());
    let fitter = FakeFitter {
        kinetics: Some(
            "row\tcolumn\tK\tr\tnAUC\tDT_h\tMDP\tMDR\tMDRMDP\tAUC\trsquare\n\
             1\t1\t1.2\t0.5\tNaN\t2.0\t0.1\t0.2\t0.3\t1.0\t0.99\n",
        ),
        ..Default::default()
    };
    let err = integrate_all(
        std::slice::from_ref(&unit),
        &fitter,
        &AnalysisConfig::default(),
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("NaN"), "{}", err);
}

#[test]
fn missing_coordinates_error() {
    let tmp = TempDir::new().unwrap();
    let plate_dir = tmp.path().join("SC1_plate2");
    fs::create_dir_all(&plate_dir).unwrap();
    let unit = PlateWork {
        plate: PlateId {
            batch: "SC1".to_string(),
            plate: 2,
        },
        plate_dir,
    };
    let fitter = FakeFitter::default();
    let err = integrate_all(
        std::slice::from_ref(&unit),
        &fitter,
        &AnalysisConfig::default(),
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("no accepted coordinates"), "{}", err);
    assert_eq!(fitter.fit_calls.load(Ordering::SeqCst), 0);
}
