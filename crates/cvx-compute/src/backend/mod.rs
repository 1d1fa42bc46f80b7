//! Compute backends.
//!
//! The host backend is a set of plain functions ([`cpu_backend`]). The GPU
//! side is anything implementing [`ComputeDevice`]:
//!
//! ```text
//! ComputeDevice
//!     +-- SoftwareDevice (rayon grid, one invocation per output word)
//!     +-- WgpuDevice     (Vulkan/Metal/DX12, feature "wgpu")
//! ```
//!
//! Both devices run the same kernels under the same word-ownership rule, so
//! the software device exercises the GPU path on machines without an
//! adapter.

pub mod cpu_backend;
mod detect;
mod device;
mod software;

#[cfg(feature = "wgpu")]
mod wgpu_backend;

pub use detect::{describe_backends, detect_backends, select_best_device, BackendInfo};
pub use device::{ComputeDevice, DeviceLimits, KernelParams};
pub(crate) use device::panic_message;
pub use software::{Fault, SoftwareDevice};

#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuDevice;

use std::fmt;

/// Where an operation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Host implementation (rayon).
    Host,
    /// Compute kernel on a [`ComputeDevice`].
    Gpu,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
