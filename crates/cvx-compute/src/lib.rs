//! Backend registry, dispatcher and compute kernels for cvx.
//!
//! Every operation has a host implementation (rayon) and, for a subset of
//! operations and channel counts, a compute kernel that runs on a
//! [`ComputeDevice`]. The dispatcher picks one per call and falls back to the
//! host exactly once when the device path fails.
//!
//! # Architecture
//!
//! ```text
//! Processor (named operations + typed helpers)
//!     └── Dispatcher
//!             ├── Registry (immutable, Arc-shared)
//!             ├── host backend (cpu_backend, rayon)
//!             └── ComputeDevice
//!                     ├── SoftwareDevice (rayon grid, one invocation per word)
//!                     └── WgpuDevice     (WGSL, feature "wgpu")
//! ```
//!
//! Kernels touch pixel memory only through [`cvx_core::WordBuffer::read_byte`]
//! and [`cvx_core::WordSlot::write_byte`] (or their WGSL twins in the shared
//! shader prologue).
//!
//! # Example
//!
//! ```
//! use cvx_compute::{OpParams, Processor};
//! use cvx_core::Pattern;
//!
//! let proc = Processor::builder().software_device().build().unwrap();
//! let img = Pattern::Gradient.generate(64, 64, 4).unwrap();
//!
//! let gray = proc.to_gray(&img).unwrap();
//! assert_eq!(gray.channels(), 1);
//!
//! let out = proc.execute("threshold", &gray, &OpParams::default().thresh(100)).unwrap();
//! assert!(out.data().iter().all(|&v| v == 0 || v == 255));
//! ```

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod kernels;
pub mod params;
pub mod parity;
pub mod processor;
pub mod registry;
mod shaders;

pub use backend::{
    describe_backends, detect_backends, select_best_device, BackendInfo, BackendKind,
    ComputeDevice, DeviceLimits, Fault, KernelParams, SoftwareDevice,
};
#[cfg(feature = "wgpu")]
pub use backend::WgpuDevice;
pub use config::{DispatchConfig, ExecOptions, Preference};
pub use dispatch::{
    DispatchOutcome, DispatchStats, Dispatcher, FallbackReason, HostReason, StatsSnapshot,
};
pub use kernels::Kernel;
pub use params::{FlipMode, OpParams, ThresholdType};
pub use parity::{compare, Comparison, Divergence};
pub use processor::{Processor, ProcessorBuilder};
pub use registry::{
    CapabilityEntry, ChannelSet, OpClass, OpKind, OperationDescriptor, Registry, RegistryBuilder,
};

use std::time::Duration;

use thiserror::Error;

/// Errors raised by registry lookup, dispatch and compute devices.
///
/// Only [`UnknownOperation`](Self::UnknownOperation),
/// [`UnsupportedChannelCount`](Self::UnsupportedChannelCount) and
/// [`InvalidParameter`](Self::InvalidParameter) reach callers of
/// [`Dispatcher::execute`]; GPU failures are absorbed by the host fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("operation {op} does not support {channels}-channel input")]
    UnsupportedChannelCount { op: String, channels: u8 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("GPU unavailable: {0}")]
    GpuUnavailable(String),

    #[error("GPU kernel launch failed: {0}")]
    GpuLaunchFailed(String),

    #[error("GPU did not complete within {0:?}")]
    GpuTimeout(Duration),

    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    #[error(transparent)]
    Core(#[from] cvx_core::Error),
}

impl ComputeError {
    /// True for device-side failures the dispatcher recovers from by running
    /// the host implementation.
    pub fn is_gpu_failure(&self) -> bool {
        matches!(
            self,
            Self::GpuUnavailable(_)
                | Self::GpuLaunchFailed(_)
                | Self::GpuTimeout(_)
                | Self::NoAdapter
                | Self::DeviceCreation(_)
        )
    }

    /// True for errors that abort a call and are returned to the caller.
    pub fn is_fatal(&self) -> bool {
        !self.is_gpu_failure()
    }

    pub(crate) fn unsupported(op: &str, channels: u8) -> Self {
        Self::UnsupportedChannelCount {
            op: op.to_string(),
            channels,
        }
    }
}

pub type ComputeResult<T> = Result<T, ComputeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ComputeError::GpuLaunchFailed("x".into()).is_gpu_failure());
        assert!(ComputeError::GpuTimeout(Duration::from_millis(5)).is_gpu_failure());
        assert!(ComputeError::NoAdapter.is_gpu_failure());
        assert!(ComputeError::UnknownOperation("blurr".into()).is_fatal());
        assert!(ComputeError::unsupported("sobel", 3).is_fatal());
    }

    #[test]
    fn test_core_error_converts() {
        let core = cvx_core::Error::unsupported_channels(2, "rgb_to_gray");
        let err: ComputeError = core.clone().into();
        assert_eq!(err, ComputeError::Core(core));
        assert!(err.is_fatal());
    }
}
