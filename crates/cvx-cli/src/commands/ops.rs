//! Capability table.

use anyhow::{Context, Result};
use serde::Serialize;

use cvx_compute::{OperationDescriptor, Registry};

use crate::OpsArgs;

#[derive(Serialize)]
struct OpRow {
    name: &'static str,
    class: &'static str,
    tolerance: u8,
    host_channels: Vec<u8>,
    gpu_channels: Option<Vec<u8>>,
    summary: &'static str,
}

impl From<&OperationDescriptor> for OpRow {
    fn from(desc: &OperationDescriptor) -> Self {
        Self {
            name: desc.name,
            class: desc.class.name(),
            tolerance: desc.tolerance(),
            host_channels: desc.host_channels.counts(),
            gpu_channels: desc.gpu_channels.map(|set| set.counts()),
            summary: desc.summary,
        }
    }
}

pub fn run(args: OpsArgs, verbose: bool) -> Result<()> {
    let registry = Registry::builtin();

    if args.json {
        let rows: Vec<OpRow> = registry.iter().map(OpRow::from).collect();
        let json = serde_json::to_string_pretty(&rows).context("Failed to serialize registry")?;
        println!("{json}");
        return Ok(());
    }

    println!("{:<15} {:<11} {:<6} {:<6} {:<6}", "operation", "class", "host", "gpu", "tol");
    for desc in registry.iter() {
        let gpu = desc
            .gpu_channels
            .map(|set| set.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<15} {:<11} {:<6} {:<6} {:<6}",
            desc.name,
            desc.class.name(),
            desc.host_channels.to_string(),
            gpu,
            desc.tolerance()
        );
        if verbose {
            println!("    {}", desc.summary);
        }
    }

    Ok(())
}
