use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agarqc::calibrate::{AutoOperator, ConsoleOperator, Operator};
use agarqc::cli::{Cli, Commands, RunArgs};
use agarqc::config::{parse_reference_plate, AnalysisConfig};
use agarqc::ctx::Ctx;
use agarqc::io;
use agarqc::layout::{parse_layout, sheet, Sheet};
use agarqc::pipeline::Pipeline;
use agarqc::services::subprocess::{SubprocessFitter, SubprocessRectifier};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Validate(args) => validate(&args.input),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = AnalysisConfig {
        min_nauc_growing: args.min_nauc_growing,
        min_rauc_points: args.min_rauc_points,
        pseudocount_log2_concentration: args.pseudocount,
        experiment_hours: args.hours,
        reference_plate: args
            .reference_plate
            .as_deref()
            .map(parse_reference_plate)
            .transpose()?,
        enhance_contrast: !args.no_enhance_contrast,
        threads: args.threads,
        retries: args.retries,
        rectifier_program: args.rectifier,
        fitter_program: args.fitter,
    };

    let rectifier = Box::new(SubprocessRectifier::new(&config));
    let fitter = Box::new(SubprocessFitter::new(&config));
    let operator: Box<dyn Operator> = if args.auto_accept {
        Box::new(AutoOperator)
    } else {
        Box::new(ConsoleOperator)
    };

    let mut ctx = Ctx::new(args.input, args.out, config, rectifier, fitter, operator);
    Pipeline::standard().run(&mut ctx)?;
    print_summary(&ctx)
}

fn validate(input_dir: &std::path::Path) -> Result<()> {
    let layout_file = sheet::discover_layout_file(input_dir)?;
    let layout = parse_layout(&Sheet::load(&layout_file)?)?;

    println!("layout ok: {}", layout_file.display());
    println!("experiment: {}", layout.experiment);
    println!("plate batches: {}", layout.batches().join(", "));
    println!("plates: {}", layout.assignments.len());
    println!("spots: {}", layout.spots.len());
    match &layout.baseline {
        Some(plate) => println!("baseline plate: {}", plate),
        None => println!("baseline plate: none (susceptibility disabled)"),
    }
    if !layout.warnings.is_empty() {
        println!("warnings:");
        for warning in &layout.warnings {
            println!("- {}", warning);
        }
    }
    Ok(())
}

fn print_summary(ctx: &Ctx) -> Result<()> {
    let summary = io::summary::format_summary(ctx)?;
    print!("{}", summary);
    if !ctx.warnings.is_empty() {
        println!("warnings:");
        for warning in &ctx.warnings {
            println!("- {}", warning);
        }
    }
    Ok(())
}
