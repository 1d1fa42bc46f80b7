//! Compute device abstraction.

use std::any::Any;

use bytemuck::{Pod, Zeroable};

use cvx_core::WordBuffer;

use crate::kernels::Kernel;
use crate::{ComputeError, ComputeResult};

/// Invocation parameters, uploaded verbatim as the kernel uniform.
///
/// `dims` is `[width, height, channels, out_channels]`; `params` holds the
/// operation-specific values (see [`Kernel::params`]).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    pub dims: [u32; 4],
    pub params: [f32; 16],
}

impl KernelParams {
    pub fn new(width: u32, height: u32, channels: u32, out_channels: u32) -> Self {
        Self {
            dims: [width, height, channels, out_channels],
            params: [0.0; 16],
        }
    }

    /// Sets `params[slot]`.
    pub fn with(mut self, slot: usize, value: f32) -> Self {
        self.params[slot] = value;
        self
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.dims[0]
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.dims[1]
    }

    #[inline]
    pub fn channels(&self) -> u32 {
        self.dims[2]
    }

    #[inline]
    pub fn out_channels(&self) -> u32 {
        self.dims[3]
    }

    /// Input length in bytes.
    pub fn in_len(&self) -> usize {
        self.width() as usize * self.height() as usize * self.channels() as usize
    }

    /// Output length in bytes.
    pub fn out_len(&self) -> usize {
        self.width() as usize * self.height() as usize * self.out_channels() as usize
    }
}

/// Device limits used to reject launches up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest storage buffer in bytes.
    pub max_buffer_bytes: u64,
    /// Invocations per workgroup.
    pub workgroup_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 1 << 30,
            workgroup_size: 256,
        }
    }
}

/// A device that runs kernels over word-packed buffers.
///
/// A launch is one grid with one invocation per output word. Each
/// invocation reads the source through [`WordBuffer::read_byte`] and writes
/// only the word it owns. `launch` blocks until the grid has finished and
/// `dst` holds the result.
pub trait ComputeDevice: Send + Sync {
    /// Device name for logs.
    fn name(&self) -> &str;

    fn limits(&self) -> DeviceLimits;

    /// False when the device can no longer accept work.
    fn is_available(&self) -> bool {
        true
    }

    /// Runs `kernel` over `src`, writing every byte of `dst`.
    fn launch(
        &self,
        kernel: &Kernel,
        src: &WordBuffer,
        dst: &mut WordBuffer,
        params: &KernelParams,
    ) -> ComputeResult<()>;
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Checks buffer sizes against `params` and `limits`.
pub(crate) fn check_launch(
    limits: &DeviceLimits,
    src: &WordBuffer,
    dst: &WordBuffer,
    params: &KernelParams,
) -> ComputeResult<()> {
    if src.byte_len() != params.in_len() {
        return Err(ComputeError::GpuLaunchFailed(format!(
            "source holds {} bytes, params describe {}",
            src.byte_len(),
            params.in_len()
        )));
    }
    if dst.byte_len() != params.out_len() {
        return Err(ComputeError::GpuLaunchFailed(format!(
            "destination holds {} bytes, params describe {}",
            dst.byte_len(),
            params.out_len()
        )));
    }
    let largest = (src.word_len().max(dst.word_len()) * 4) as u64;
    if largest > limits.max_buffer_bytes {
        return Err(ComputeError::GpuLaunchFailed(format!(
            "buffer of {largest} bytes exceeds device limit {}",
            limits.max_buffer_bytes
        )));
    }
    Ok(())
}
