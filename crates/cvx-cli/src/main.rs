//! cvx - image operations on host and GPU backends
//!
//! Lists backends and operations, runs one operation on a synthetic image,
//! and sweeps the parity corpus.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use cvx_compute::{FlipMode, Preference, ThresholdType};
use cvx_core::Pattern;

mod commands;

#[derive(Parser)]
#[command(name = "cvx")]
#[command(author, version, about = "Image operations with host and GPU backends")]
#[command(long_about = "
Runs image operations through a dispatcher that picks the GPU when a kernel
exists for the input and falls back to the host when the GPU fails.

Examples:
  cvx backends                          # Show compute backends
  cvx ops --json                        # Capability table as JSON
  cvx run rgb_to_gray --size 512 -c 4   # Gray of a 512x512 RGBA gradient
  cvx run box_blur --ksize 5 --parity   # Run both backends and compare
  cvx parity --device software          # Sweep every operation

Environment:
  CVX_BACKEND, CVX_VALIDATE_PARITY, CVX_GPU_TIMEOUT_MS, RUST_LOG
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Compute device (auto, software, none)
    #[arg(long, global = true, value_enum, default_value = "auto")]
    device: DeviceArg,
}

/// Compute device selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DeviceArg {
    /// wgpu when built with it and an adapter exists, otherwise none
    Auto,
    /// Kernels on the emulated grid (host threads)
    Software,
    /// Host only
    None,
}

#[derive(Subcommand)]
enum Commands {
    /// List compute backends and their availability
    #[command(visible_alias = "b")]
    Backends,

    /// Print the operation capability table
    Ops(OpsArgs),

    /// Run one operation on a synthetic image
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Run every GPU-capable operation on both backends over the corpus
    #[command(visible_alias = "p")]
    Parity(ParityArgs),
}

#[derive(Args)]
struct OpsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Synthetic input patterns.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PatternArg {
    Gradient,
    Solid,
    Checker,
    Noise,
}

impl PatternArg {
    fn pattern(self) -> Pattern {
        match self {
            Self::Gradient => Pattern::Gradient,
            Self::Solid => Pattern::Solid([200, 100, 50, 128]),
            Self::Checker => Pattern::Checkerboard { cell: 8 },
            Self::Noise => Pattern::Noise { seed: 0x5eed },
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Operation name (see `cvx ops`)
    op: String,

    /// Input pattern
    #[arg(long, value_enum, default_value = "gradient")]
    pattern: PatternArg,

    /// Image edge in pixels
    #[arg(short, long, default_value = "512")]
    size: u32,

    /// Channels (1, 3 or 4)
    #[arg(short, long, default_value = "4")]
    channels: u8,

    /// Backend preference (auto, host, gpu)
    #[arg(short, long, default_value = "auto")]
    backend: Preference,

    /// Run both backends and report a divergence
    #[arg(long)]
    parity: bool,

    /// Threshold level
    #[arg(long, default_value = "127")]
    thresh: u8,

    /// Value written by binary thresholds
    #[arg(long, default_value = "255")]
    max_value: u8,

    /// Threshold type (binary, binary_inv, trunc, tozero, tozero_inv)
    #[arg(long = "type", default_value = "binary")]
    threshold_type: ThresholdType,

    /// Box filter size (odd)
    #[arg(short, long, default_value = "3")]
    ksize: u32,

    /// Addend for add_scalar
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    scalar: i16,

    /// Scale for convert_scale
    #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
    alpha: f32,

    /// Offset for convert_scale
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    beta: f32,

    /// Flip axes (horizontal, vertical, both)
    #[arg(long, default_value = "horizontal")]
    flip: FlipMode,
}

#[derive(Args)]
struct ParityArgs {
    /// Image edge in pixels
    #[arg(short, long, default_value = "64")]
    size: u32,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(if verbose { "debug" } else { "warn" }),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialize logging")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Backends => commands::backends::run(cli.device, cli.verbose),
        Commands::Ops(args) => commands::ops::run(args, cli.verbose),
        Commands::Run(args) => commands::run::run(args, cli.device, cli.verbose),
        Commands::Parity(args) => commands::parity::run(args, cli.device, cli.verbose),
    }
}
