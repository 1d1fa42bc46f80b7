//! Single operation on a synthetic image.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use cvx_compute::{ExecOptions, OpParams};
use cvx_core::digest;

use crate::{DeviceArg, RunArgs};

/// Runs `args.op` and prints where it ran and what came out.
pub fn run(args: RunArgs, device: DeviceArg, verbose: bool) -> Result<()> {
    let proc = super::processor(device)?;

    let pattern = args.pattern.pattern();
    let input = pattern
        .generate(args.size, args.size, args.channels)
        .with_context(|| format!("Failed to generate {} input", pattern.name()))?;

    let params = OpParams::default()
        .thresh(args.thresh)
        .max_value(args.max_value)
        .threshold_type(args.threshold_type)
        .ksize(args.ksize)
        .scalar(args.scalar)
        .scale(args.alpha, args.beta)
        .flip(args.flip);
    let options = ExecOptions {
        prefer_backend: args.backend,
        validate_parity: args.parity,
    };

    let start = Instant::now();
    let outcome = proc
        .dispatch(&args.op, &input, &params, options)
        .with_context(|| format!("{} failed", args.op))?;
    let elapsed = start.elapsed();
    info!(op = %args.op, backend = %outcome.backend, ?elapsed, "run complete");

    let out = &outcome.image;
    println!("{}", args.op);
    println!(
        "  Input:      {} {}x{}x{}",
        pattern.name(),
        input.width(),
        input.height(),
        input.channels()
    );
    println!("  Output:     {}x{}x{}", out.width(), out.height(), out.channels());
    println!("  Backend:    {}", outcome.backend);
    if let Some(reason) = &outcome.host_reason {
        println!("  Host:       {reason}");
    }
    if let Some(fallback) = &outcome.fallback {
        println!("  Fallback:   {fallback}");
    }
    match &outcome.divergence {
        Some(divergence) => println!("  Divergence: {divergence}"),
        None if args.parity => println!("  Divergence: none"),
        None => {}
    }
    println!("  Digest:     {}", digest(out));

    if verbose {
        println!("  Device:     {}", proc.device_name().unwrap_or("none"));
        println!("  Time:       {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    }

    Ok(())
}
