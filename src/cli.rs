use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "agarqc",
    version,
    about = "Antifungal susceptibility from time-lapse agar plate images"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full analysis pipeline.
    Run(RunArgs),
    /// Parse and check the plate layout sheet, without touching any image.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, help = "Input directory: layout sheet plus one subdir per plate batch")]
    pub input: PathBuf,

    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, help = "External image rectification program")]
    pub rectifier: PathBuf,

    #[arg(long, help = "External segmentation and curve-fitting program")]
    pub fitter: PathBuf,

    #[arg(long, default_value_t = 24.0, help = "Experiment duration in hours")]
    pub hours: f64,

    #[arg(
        long,
        help = "Plate whose image anchors contrast enhancement, e.g. SC1-plate1"
    )]
    pub reference_plate: Option<String>,

    #[arg(long, default_value_t = false, help = "Disable contrast enhancement")]
    pub no_enhance_contrast: bool,

    #[arg(
        long,
        default_value_t = 0.5,
        help = "Minimum nAUC for a spot to count as growing"
    )]
    pub min_nauc_growing: f64,

    #[arg(
        long,
        default_value_t = 4,
        help = "Minimum tested concentrations required to compute rAUC"
    )]
    pub min_rauc_points: usize,

    #[arg(
        long,
        default_value_t = 0.1,
        help = "Pseudocount added to concentrations before log2"
    )]
    pub pseudocount: f64,

    #[arg(long, default_value_t = 0, help = "Number of threads (0 = auto)")]
    pub threads: usize,

    #[arg(
        long,
        default_value_t = 2,
        help = "Retries for a failing external invocation"
    )]
    pub retries: u32,

    #[arg(
        long,
        default_value_t = false,
        help = "Answer calibration prompts non-interactively: auto corners, accept all"
    )]
    pub auto_accept: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(long, help = "Input directory holding the plate layout sheet")]
    pub input: PathBuf,
}
