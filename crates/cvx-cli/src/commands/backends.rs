//! Backend listing.

use anyhow::Result;
use cvx_compute::{describe_backends, detect_backends};

use crate::DeviceArg;

pub fn run(device: DeviceArg, verbose: bool) -> Result<()> {
    print!("{}", describe_backends());

    if verbose {
        println!();
        for info in detect_backends() {
            println!(
                "  {:<10} kind={:<5} priority={}",
                info.name,
                info.kind.name(),
                info.priority
            );
        }
        let proc = super::processor(device)?;
        println!("Selected device: {}", proc.device_name().unwrap_or("none"));
    }

    Ok(())
}
