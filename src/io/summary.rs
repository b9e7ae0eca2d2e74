use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::ctx::Ctx;
use crate::fitness::badspot::BadSpotSource;

#[derive(Debug, Clone, Serialize)]
struct ToolMeta {
    name: String,
    version: String,
}

#[derive(Debug, Clone, Serialize)]
struct InputSummary {
    experiment: String,
    plate_batches: usize,
    plates: usize,
    images: usize,
    spots: usize,
}

#[derive(Debug, Clone, Serialize)]
struct BadSpotCounts {
    manual: usize,
    auto: usize,
}

#[derive(Debug, Clone, Serialize)]
struct ResultCounts {
    growth_measurements: usize,
    fitness_records: usize,
    susceptibility_records: usize,
    drugs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct RunSummary {
    tool: ToolMeta,
    input: InputSummary,
    bad_spots: BadSpotCounts,
    results: ResultCounts,
    warnings: Vec<String>,
}

fn build_summary(ctx: &Ctx) -> Result<RunSummary> {
    let layout = ctx.layout()?;
    let images: usize = ctx.batches.iter().map(|b| b.images.len()).sum();
    let plates: usize = layout.assignments.len();

    let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
    for flag in &ctx.bad_flags {
        *by_source.entry(flag.source.as_str()).or_insert(0) += 1;
    }

    Ok(RunSummary {
        tool: ToolMeta {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        input: InputSummary {
            experiment: layout.experiment.clone(),
            plate_batches: layout.batches().len(),
            plates,
            images,
            spots: layout.spots.len(),
        },
        bad_spots: BadSpotCounts {
            manual: by_source
                .get(BadSpotSource::Manual.as_str())
                .copied()
                .unwrap_or(0),
            auto: by_source
                .get(BadSpotSource::Auto.as_str())
                .copied()
                .unwrap_or(0),
        },
        results: ResultCounts {
            growth_measurements: ctx.growth.len(),
            fitness_records: ctx.fitness.len(),
            susceptibility_records: ctx.susceptibility.len(),
            drugs: layout.drugs(),
        },
        warnings: ctx.warnings.clone(),
    })
}

pub fn write_summary_json(ctx: &Ctx) -> Result<()> {
    let summary = build_summary(ctx)?;
    super::write_json(&ctx.output.summary_json, &summary)
}

pub fn format_summary(ctx: &Ctx) -> Result<String> {
    let summary = build_summary(ctx)?;

    let mut out = String::new();
    out.push_str(&format!(
        "{} v{}\n",
        summary.tool.name, summary.tool.version
    ));
    out.push_str(&format!(
        "Experiment: {} ({} plate batches, {} plates, {} images)\n",
        summary.input.experiment,
        summary.input.plate_batches,
        summary.input.plates,
        summary.input.images
    ));
    out.push_str(&format!(
        "Fitness: {} spots, {} records\n",
        summary.input.spots, summary.results.fitness_records
    ));
    out.push_str(&format!(
        "Bad spots: {} manual, {} flagged\n",
        summary.bad_spots.manual, summary.bad_spots.auto
    ));
    if summary.results.drugs.is_empty() {
        out.push_str("Susceptibility: no drugs in the layout\n");
    } else {
        out.push_str(&format!(
            "Susceptibility: {} records across {}\n",
            summary.results.susceptibility_records,
            summary.results.drugs.join(", ")
        ));
    }
    if !summary.warnings.is_empty() {
        out.push_str(&format!("Warnings: {}\n", summary.warnings.len()));
    }
    Ok(out)
}
