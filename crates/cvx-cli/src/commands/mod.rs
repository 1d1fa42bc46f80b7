//! CLI command implementations

pub mod backends;
pub mod ops;
pub mod parity;
pub mod run;

use anyhow::{Context, Result};
use cvx_compute::Processor;

use crate::DeviceArg;

/// Processor configured from `CVX_*` variables on the chosen device.
pub fn processor(device: DeviceArg) -> Result<Processor> {
    let builder = Processor::builder().from_env();
    let builder = match device {
        DeviceArg::Auto => builder,
        DeviceArg::Software => builder.software_device(),
        DeviceArg::None => builder.no_device(),
    };
    builder.build().context("Failed to create processor")
}
