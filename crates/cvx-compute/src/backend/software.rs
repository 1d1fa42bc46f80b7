//! Software compute device.
//!
//! Emulates a GPU launch on the rayon pool: the grid has one invocation per
//! output word, each invocation gets the [`WordSlot`] for its word and
//! computes the (up to) four bytes in it. Kernel bodies see the source only
//! through [`WordBuffer::read_byte`].
//!
//! Faults can be injected to drive the dispatcher's fallback and divergence
//! paths in tests.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, trace};

use cvx_core::{WordBuffer, WordSlot};

use super::device::{check_launch, panic_message, ComputeDevice, DeviceLimits, KernelParams};
use crate::kernels::Kernel;
use crate::{ComputeError, ComputeResult};

/// Failure injected into every launch until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Report the device as gone.
    Unavailable,
    /// Reject the launch after it was submitted.
    LaunchFailed,
    /// Sleep before running the grid.
    Delay(Duration),
    /// Run the grid, then flip every bit of the first output byte.
    Corrupt,
    /// Panic inside the grid.
    Panic,
}

/// Rayon-backed [`ComputeDevice`].
#[derive(Debug)]
pub struct SoftwareDevice {
    limits: DeviceLimits,
    fault: RwLock<Option<Fault>>,
    launches: AtomicU64,
    in_flight: AtomicUsize,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits::default(),
            fault: RwLock::new(None),
            launches: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Device that injects `fault` into every launch.
    pub fn with_fault(fault: Fault) -> Self {
        let dev = Self::new();
        dev.set_fault(Some(fault));
        dev
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the injected fault.
    pub fn set_fault(&self, fault: Option<Fault>) {
        match self.fault.write() {
            Ok(mut guard) => *guard = fault,
            Err(poisoned) => *poisoned.into_inner() = fault,
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        match self.fault.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Launches accepted so far (including ones that later failed).
    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Launches currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts a submission for as long as it lives, on every exit path.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ComputeDevice for SoftwareDevice {
    fn name(&self) -> &str {
        "software"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn is_available(&self) -> bool {
        self.fault() != Some(Fault::Unavailable)
    }

    fn launch(
        &self,
        kernel: &Kernel,
        src: &WordBuffer,
        dst: &mut WordBuffer,
        params: &KernelParams,
    ) -> ComputeResult<()> {
        let fault = self.fault();
        if fault == Some(Fault::Unavailable) {
            return Err(ComputeError::GpuUnavailable("software device disabled".into()));
        }
        check_launch(&self.limits, src, dst, params)?;

        self.launches.fetch_add(1, Ordering::SeqCst);
        let _submission = InFlight::enter(&self.in_flight);
        trace!(kernel = kernel.label(), words = dst.word_len(), "software::launch");

        match fault {
            Some(Fault::LaunchFailed) => {
                return Err(ComputeError::GpuLaunchFailed("injected launch failure".into()));
            }
            Some(Fault::Delay(d)) => {
                debug!(?d, "software device delaying launch");
                thread::sleep(d);
            }
            _ => {}
        }

        let inject_panic = fault == Some(Fault::Panic);
        let grid = panic::catch_unwind(AssertUnwindSafe(|| {
            dst.par_slots_mut().try_for_each(|slot| {
                if inject_panic {
                    panic!("injected kernel panic");
                }
                run_invocation(kernel, src, slot, params)
            })
        }));

        match grid {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ComputeError::GpuLaunchFailed(e.to_string())),
            Err(payload) => {
                return Err(ComputeError::GpuLaunchFailed(panic_message(payload.as_ref())));
            }
        }

        if fault == Some(Fault::Corrupt) && !dst.is_empty() {
            let first = dst.read_byte(0);
            dst.write_byte(0, !first);
        }
        Ok(())
    }
}

/// One grid invocation: fill every byte of the owned word.
fn run_invocation(
    kernel: &Kernel,
    src: &WordBuffer,
    mut slot: WordSlot<'_>,
    params: &KernelParams,
) -> cvx_core::Result<()> {
    for i in slot.byte_range() {
        slot.write_byte(i, kernel.compute_byte(src, i, params))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvx_core::{ConversionCode, Pattern};

    fn gray_launch(dev: &SoftwareDevice) -> ComputeResult<WordBuffer> {
        let img = Pattern::Gradient.generate(8, 8, 4).unwrap();
        let kernel = Kernel::Convert(ConversionCode::RgbaToGray);
        let params = KernelParams::new(8, 8, 4, 1);
        let src = WordBuffer::from_bytes(img.data());
        let mut dst = WordBuffer::zeroed(64);
        dev.launch(&kernel, &src, &mut dst, &params)?;
        Ok(dst)
    }

    #[test]
    fn test_launch_counts_and_releases() {
        let dev = SoftwareDevice::new();
        gray_launch(&dev).unwrap();
        assert_eq!(dev.launches(), 1);
        assert_eq!(dev.in_flight(), 0);
    }

    #[test]
    fn test_injected_faults() {
        let dev = SoftwareDevice::with_fault(Fault::Unavailable);
        assert!(!dev.is_available());
        assert!(matches!(gray_launch(&dev), Err(ComputeError::GpuUnavailable(_))));
        assert_eq!(dev.launches(), 0);

        dev.set_fault(Some(Fault::LaunchFailed));
        assert!(matches!(gray_launch(&dev), Err(ComputeError::GpuLaunchFailed(_))));
        assert_eq!(dev.in_flight(), 0);

        dev.set_fault(Some(Fault::Panic));
        assert!(matches!(gray_launch(&dev), Err(ComputeError::GpuLaunchFailed(_))));
        assert_eq!(dev.in_flight(), 0);

        dev.set_fault(None);
        let clean = gray_launch(&dev).unwrap();
        dev.set_fault(Some(Fault::Corrupt));
        let corrupt = gray_launch(&dev).unwrap();
        assert_eq!(corrupt.read_byte(0), !clean.read_byte(0));
        assert_eq!(corrupt.read_byte(1), clean.read_byte(1));
    }
}
