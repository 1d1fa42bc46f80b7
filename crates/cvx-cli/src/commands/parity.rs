//! Corpus sweep over both backends.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::warn;

use cvx_compute::{compare, OpParams, Registry};
use cvx_core::Pattern;

use crate::{DeviceArg, ParityArgs};

#[derive(Debug, Default, Serialize)]
struct OpReport {
    op: &'static str,
    tolerance: u8,
    cases: usize,
    gpu_runs: usize,
    max_diff: u8,
    over_tolerance: usize,
}

impl OpReport {
    fn passed(&self) -> bool {
        self.over_tolerance == 0
    }
}

pub fn run(args: ParityArgs, device: DeviceArg, verbose: bool) -> Result<()> {
    let proc = super::processor(device)?;
    if proc.device_name().is_none() {
        warn!("no compute device, only the host side runs (try --device software)");
    }
    let registry = Registry::builtin();
    let params = OpParams::default();

    let mut reports = Vec::new();
    for desc in registry.iter() {
        let Some(gpu_channels) = desc.gpu_channels else {
            continue;
        };
        let mut report = OpReport {
            op: desc.name,
            tolerance: desc.tolerance(),
            ..OpReport::default()
        };

        for channels in gpu_channels.counts() {
            for pattern in Pattern::CORPUS {
                let label = format!("{}@{channels}", pattern.name());
                let input = pattern
                    .generate(args.size, args.size, channels)
                    .with_context(|| format!("Failed to generate {label}"))?;
                report.cases += 1;
                let (host, gpu) = proc
                    .run_both(desc.name, &input, &params)
                    .with_context(|| format!("{} on {label}", desc.name))?;

                let Some(gpu) = gpu else { continue };
                report.gpu_runs += 1;

                let cmp = compare(&host, &gpu, report.tolerance);
                report.max_diff = report.max_diff.max(cmp.max_diff);
                if !cmp.within_tolerance() {
                    report.over_tolerance += 1;
                    if verbose {
                        eprintln!("  {} {label}: {:?}", desc.name, cmp.first_mismatch);
                    }
                }
            }
        }
        reports.push(report);
    }

    if args.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        println!("Device: {}", proc.device_name().unwrap_or("none"));
        println!(
            "{:<15} {:>5} {:>5} {:>8} {:>4}  result",
            "operation", "cases", "gpu", "max diff", "tol"
        );
        for r in &reports {
            println!(
                "{:<15} {:>5} {:>5} {:>8} {:>4}  {}",
                r.op,
                r.cases,
                r.gpu_runs,
                r.max_diff,
                r.tolerance,
                if r.passed() { "ok" } else { "FAIL" }
            );
        }
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        bail!("{failed} operation(s) diverged beyond tolerance");
    }
    Ok(())
}
