//! Stage behavior over a stubbed context: image preprocessing across plate
//! batches, and bad-spot flags folding back into the layout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agarqc::calibrate::AutoOperator;
use agarqc::config::AnalysisConfig;
use agarqc::ctx::Ctx;
use agarqc::fitness::badspot::BadSpotSource;
use agarqc::fitness::FitnessRecord;
use agarqc::io::artifact_ready;
use agarqc::layout::{PlateAssignment, PlateId, PlateLayout, Spot};
use agarqc::pipeline::stage2_images::Stage2Images;
use agarqc::pipeline::stage5_badspots::Stage5BadSpots;
use agarqc::pipeline::Stage;
use agarqc::services::{CurveFitter, ImageRectifier, WellCenter};
use anyhow::Result;
use tempfile::TempDir;

/// Rectifier double: copies every linked image through unchanged and counts
/// the per-batch invocations.
struct CopyRectifier {
    calls: Arc<AtomicUsize>,
}

impl ImageRectifier for CopyRectifier {
    fn rectify_batch(&self, linked_dir: &Path, rectified_dir: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for entry in fs::read_dir(linked_dir)? {
            let entry = entry?;
            fs::copy(entry.path(), rectified_dir.join(entry.file_name()))?;
        }
        Ok(())
    }
}

struct IdleFitter;

impl CurveFitter for IdleFitter {
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

    fn fit_plate(&self, _plate_dir: &Path, _coords_file: &Path, _out_dir: &Path) -> Result<()> {
        anyhow::bail!("not under test");
    }
}

fn plate(batch: &str, n: u8) -> PlateId {
    PlateId {
        batch: batch.to_string(),
        plate: n,
    }
}

fn ctx_with(input_dir: PathBuf, out_dir: PathBuf, calls: Arc<AtomicUsize>) -> Ctx {
    Ctx::new(
        input_dir,
        out_dir,
        AnalysisConfig::default(),
        Box::new(CopyRectifier { calls }),
        Box::new(IdleFitter),
        Box::new(AutoOperator),
    )
}

#[test]
fn image_stage_processes_every_batch() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    for batch in ["SC1", "SC2"] {
        let dir = input.join(batch);
        fs::create_dir_all(&dir).unwrap();
        for name in ["scan_202108231200.png", "scan_202108231400.png"] {
            image::RgbImage::new(100, 60).save(dir.join(name)).unwrap();
        }
    }
    let out = tmp.path().join("out");
    fs::create_dir_all(out.join("tmp")).unwrap();

    let specs = [
        ("SC1", 1u8, "water", 0.0),
        ("SC1", 2, "ANI", 1.0),
        ("SC2", 1, "ANI", 2.0),
        ("SC2", 2, "ANI", 4.0),
    ];
    let layout = PlateLayout {
        experiment: "t".to_string(),
        assignments: specs
            .iter()
            .map(|(batch, n, drug, concentration)| PlateAssignment {
                plate: plate(batch, *n),
                drug: drug.to_string(),
                concentration: *concentration,
            })
            .collect(),
        baseline: Some(plate("SC1", 1)),
        spots: Vec::new(),
        warnings: Vec::new(),
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ctx_with(input, out, calls.clone());
    ctx.layout = Some(layout);
    Stage2Images::new().run(&mut ctx).unwrap();

    // One rectifier invocation per batch, whatever the pool schedule.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.batches.len(), 2);
    for batch in &ctx.batches {
        for plate_n in [1u8, 2] {
            let plate_dir = batch.plate_dir(&ctx.output.tmp_dir, plate_n);
            for barcode in ["img_0000_202108231200", "img_0001_202108231400"] {
                let crop = plate_dir.join(format!("{}.png", barcode));
                assert!(artifact_ready(&crop), "missing crop {}", crop.display());
            }
        }
    }
}

#[test]
fn bad_spot_stage_folds_flags_into_the_layout() {
    let tmp = TempDir::new().unwrap();
    // Four ca1 replicates on one plate; column 3 is flagged in the layout,
    // column 4 carries an anomalously low nAUC.
    let spots: Vec<Spot> = (1u8..=4)
        .map(|column| Spot {
            plate: plate("SC1", 1),
            row: 1,
            column,
            strain: "ca1".to_string(),
            drug: "water".to_string(),
            concentration: 0.0,
            bad_spot: column == 3,
        })
        .collect();
    let layout = PlateLayout {
        experiment: "t".to_string(),
        assignments: vec![PlateAssignment {
            plate: plate("SC1", 1),
            drug: "water".to_string(),
            concentration: 0.0,
        }],
        baseline: Some(plate("SC1", 1)),
        spots,
        warnings: Vec::new(),
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = ctx_with(
        tmp.path().join("input"),
        tmp.path().join("out"),
        calls,
    );
    ctx.layout = Some(layout);
    ctx.fitness = [(1u8, 0.80), (2, 0.82), (3, 0.79), (4, 0.05)]
        .into_iter()
        .map(|(column, nauc)| FitnessRecord {
            plate: plate("SC1", 1),
            row: 1,
            column,
            k: 1.0,
            r: 0.5,
            nauc,
            dt_h: 2.0,
            mdp: 0.1,
            mdr: 0.1,
            mdrmdp: 0.1,
            auc: 1.0,
            rsquare: 0.99,
            inv_dt_h: 0.5,
        })
        .collect();

    Stage5BadSpots::new().run(&mut ctx).unwrap();

    let spots = &ctx.layout.as_ref().unwrap().spots;
    let bad_of = |column: u8| spots.iter().find(|s| s.column == column).unwrap().bad_spot;
    assert!(bad_of(3));
    assert!(bad_of(4));
    assert!(!bad_of(1) && !bad_of(2));

    assert_eq!(ctx.bad_flags.len(), 2);
    assert!(ctx
        .bad_flags
        .iter()
        .any(|f| f.source == BadSpotSource::Manual && f.key.column == 3));
    assert!(ctx
        .bad_flags
        .iter()
        .any(|f| f.source == BadSpotSource::Auto && f.key.column == 4));
}
