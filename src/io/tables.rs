//! Tabular outputs, one row per entity.

use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::fitness::badspot::BadSpotFlag;
use crate::fitness::{FitnessEstimate, GrowthPoint};
use crate::layout::replicate_id;
use crate::suscept::{FitnessRow, SimplifiedRecord, SusceptibilityRecord, MIC_FRACTIONS};

fn create(path: &Path) -> Result<BufWriter<std::fs::File>> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn fmt_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.6}", value)
    }
}

pub fn write_growth(path: &Path, points: &[GrowthPoint]) -> Result<()> {
    let mut w = create(path)?;
    writeln!(
        w,
        "plate_batch\tplate\trow\tcolumn\tbarcode\thours\tintensity"
    )?;
    for p in points {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{:.4}\t{:.6}",
            p.plate.batch, p.plate.plate, p.row, p.column, p.barcode, p.hours, p.intensity
        )?;
    }
    Ok(())
}

/// Raw and relative fitness per spot, wide: one column pair per estimate.
pub fn write_fitness(path: &Path, rows: &[FitnessRow]) -> Result<()> {
    let mut w = create(path)?;
    let mut header = String::from(
        "plate_batch\tplate\trow\tcolumn\treplicate\tstrain\tdrug\tconcentration\tbad_spot",
    );
    for estimate in FitnessEstimate::ALL {
        header.push_str(&format!("\t{}", estimate.as_str()));
    }
    for estimate in FitnessEstimate::ALL {
        header.push_str(&format!("\t{}_rel", estimate.as_str()));
    }
    header.push_str("\tsusceptibility_valid");
    writeln!(w, "{}", header)?;

    for row in rows {
        let spot = &row.spot;
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            spot.plate.batch,
            spot.plate.plate,
            spot.row,
            spot.column,
            replicate_id(spot.row, spot.column),
            spot.strain,
            spot.drug,
            spot.concentration,
            spot.bad_spot
        );
        for estimate in FitnessEstimate::ALL {
            line.push_str(&format!("\t{}", fmt_value(row.raw[&estimate])));
        }
        for estimate in FitnessEstimate::ALL {
            line.push_str(&format!("\t{}", fmt_value(row.rel[&estimate])));
        }
        line.push_str(&format!("\t{}", row.susceptibility_valid));
        writeln!(w, "{}", line)?;
    }
    Ok(())
}

pub fn write_susceptibility(path: &Path, records: &[SusceptibilityRecord]) -> Result<()> {
    let mut w = create(path)?;
    let mut header = String::from("strain\treplicate\tdrug\testimate");
    for fraction in MIC_FRACTIONS {
        header.push_str(&format!("\tMIC_{}", (fraction * 100.0) as u32));
    }
    header.push_str("\trAUC_conc\trAUC_log2");
    for fraction in MIC_FRACTIONS {
        header.push_str(&format!("\tSMG_{}", (fraction * 100.0) as u32));
    }
    header.push_str("\tbaseline_fitness\tmax_tested_concentration");
    writeln!(w, "{}", header)?;

    for r in records {
        let mut line = format!(
            "{}\t{}\t{}\t{}",
            r.sample.strain,
            r.sample.replicate,
            r.drug,
            r.estimate.as_str()
        );
        for value in r.mic {
            line.push_str(&format!("\t{}", fmt_value(value)));
        }
        line.push_str(&format!(
            "\t{}\t{}",
            fmt_value(r.rauc_conc),
            fmt_value(r.rauc_log2)
        ));
        for value in r.smg {
            line.push_str(&format!("\t{}", fmt_value(value)));
        }
        line.push_str(&format!(
            "\t{}\t{}",
            fmt_value(r.baseline_fitness),
            fmt_value(r.max_tested_concentration)
        ));
        writeln!(w, "{}", line)?;
    }
    Ok(())
}

pub fn write_susceptibility_simplified(path: &Path, records: &[SimplifiedRecord]) -> Result<()> {
    let mut w = create(path)?;
    writeln!(
        w,
        "strain\tdrug\testimate\treplicates\tMIC_50\trAUC_log2\tSMG_50"
    )?;
    for r in records {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.strain,
            r.drug,
            r.estimate.as_str(),
            r.replicates,
            fmt_value(r.mic50),
            fmt_value(r.rauc_log2),
            fmt_value(r.smg50)
        )?;
    }
    Ok(())
}

pub fn write_bad_spots(path: &Path, flags: &[BadSpotFlag]) -> Result<()> {
    let mut w = create(path)?;
    writeln!(
        w,
        "plate_batch\tplate\trow\tcolumn\tstrain\tnAUC\tsource\treason"
    )?;
    for f in flags {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            f.key.plate.batch,
            f.key.plate.plate,
            f.key.row,
            f.key.column,
            f.strain,
            fmt_value(f.nauc),
            f.source.as_str(),
            f.reason
        )?;
    }
    Ok(())
}
