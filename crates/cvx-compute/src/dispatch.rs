//! Backend dispatch with single host fallback.
//!
//! Per call:
//!
//! ```text
//! Start -> CapabilityCheck -> GpuAttempt  -> Done
//!                          |      |
//!                          |   GpuFailed  -> HostExecute -> Done
//!                          +-------------->  HostExecute -> Done
//! ```
//!
//! A failed GPU attempt leads to exactly one host run. There is no retry on
//! the GPU path.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use cvx_core::{Image, WordBuffer};

use crate::backend::{cpu_backend, panic_message, BackendKind, ComputeDevice, KernelParams};
use crate::config::{DispatchConfig, ExecOptions, Preference};
use crate::kernels::Kernel;
use crate::params::OpParams;
use crate::parity::{compare, Divergence};
use crate::registry::{OperationDescriptor, Registry};
use crate::{ComputeError, ComputeResult};

/// Why a call ran on the host without attempting the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostReason {
    /// The caller asked for the host.
    Preferred,
    /// The operation has no GPU kernel.
    NoKernel,
    /// The GPU kernel does not accept this channel count.
    ChannelUnsupported,
    /// No compute device is attached.
    NoDevice,
}

impl fmt::Display for HostReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preferred => "host preferred",
            Self::NoKernel => "no gpu kernel",
            Self::ChannelUnsupported => "channel count not supported on gpu",
            Self::NoDevice => "no compute device",
        })
    }
}

/// Why a GPU attempt was abandoned for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The device could not accept work.
    Unavailable(String),
    /// The launch or the readback failed.
    LaunchFailed(String),
    /// The launch did not finish within the configured timeout.
    Timeout(Duration),
}

impl FallbackReason {
    fn from_error(err: &ComputeError) -> Self {
        match err {
            ComputeError::GpuTimeout(d) => Self::Timeout(*d),
            ComputeError::GpuLaunchFailed(msg) => Self::LaunchFailed(msg.clone()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "gpu unavailable: {msg}"),
            Self::LaunchFailed(msg) => write!(f, "gpu launch failed: {msg}"),
            Self::Timeout(d) => write!(f, "gpu timed out after {d:?}"),
        }
    }
}

/// Result of one dispatched call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub image: Image,
    /// Backend that produced `image`.
    pub backend: BackendKind,
    /// Set when the call went to the host without a GPU attempt.
    pub host_reason: Option<HostReason>,
    /// Set when a GPU attempt failed and the host ran instead.
    pub fallback: Option<FallbackReason>,
    /// Set in parity mode when the GPU result disagreed with the host.
    pub divergence: Option<Divergence>,
}

/// Running dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    gpu_attempts: AtomicU64,
    gpu_successes: AtomicU64,
    host_runs: AtomicU64,
    fallbacks: AtomicU64,
    divergences: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub gpu_attempts: u64,
    pub gpu_successes: u64,
    pub host_runs: u64,
    pub fallbacks: u64,
    pub divergences: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gpu_attempts: self.gpu_attempts.load(Ordering::Relaxed),
            gpu_successes: self.gpu_successes.load(Ordering::Relaxed),
            host_runs: self.host_runs.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            divergences: self.divergences.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// One timed launch handed to the [`LaunchWorker`].
struct LaunchJob {
    device: Arc<dyn ComputeDevice>,
    kernel: Kernel,
    src: WordBuffer,
    dst: WordBuffer,
    params: KernelParams,
    reply: mpsc::Sender<ComputeResult<WordBuffer>>,
}

impl LaunchJob {
    fn run(self) {
        let LaunchJob {
            device,
            kernel,
            src,
            mut dst,
            params,
            reply,
        } = self;
        let result =
            guarded_launch(device.as_ref(), &kernel, &src, &mut dst, &params).map(|()| dst);
        // The caller may have timed out and gone.
        let _ = reply.send(result);
    }
}

/// The thread that runs timed launches, one at a time.
///
/// Jobs queue behind a launch that outlived its caller's timeout, so a
/// stuck device holds one thread, not one per call. The thread exits when
/// the dispatcher is dropped.
struct LaunchWorker {
    jobs: mpsc::Sender<LaunchJob>,
}

impl LaunchWorker {
    fn spawn() -> ComputeResult<Self> {
        let (jobs, queue) = mpsc::channel::<LaunchJob>();
        thread::Builder::new()
            .name("cvx-gpu-launch".into())
            .spawn(move || {
                for job in queue {
                    job.run();
                }
                trace!("launch worker stopped");
            })
            .map_err(|e| {
                ComputeError::GpuLaunchFailed(format!("cannot spawn launch worker: {e}"))
            })?;
        debug!("launch worker started");
        Ok(Self { jobs })
    }
}

/// `device.launch` with a panic reported as a launch failure.
fn guarded_launch(
    device: &dyn ComputeDevice,
    kernel: &Kernel,
    src: &WordBuffer,
    dst: &mut WordBuffer,
    params: &KernelParams,
) -> ComputeResult<()> {
    panic::catch_unwind(AssertUnwindSafe(|| device.launch(kernel, src, dst, params)))
        .unwrap_or_else(|payload| {
            Err(ComputeError::GpuLaunchFailed(format!(
                "{} panicked: {}",
                device.name(),
                panic_message(payload.as_ref())
            )))
        })
}

enum Route {
    Gpu(Kernel),
    Host(HostReason),
}

/// Picks a backend per call and runs it.
///
/// The registry is shared read-only; the device is optional. Without a
/// device every call runs on the host.
pub struct Dispatcher {
    registry: Arc<Registry>,
    device: Option<Arc<dyn ComputeDevice>>,
    config: DispatchConfig,
    stats: DispatchStats,
    worker: Mutex<Option<LaunchWorker>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("operations", &self.registry.len())
            .field("device", &self.device.as_ref().map(|d| d.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        device: Option<Arc<dyn ComputeDevice>>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            device,
            config,
            stats: DispatchStats::default(),
            worker: Mutex::new(None),
        }
    }

    /// Dispatcher without a compute device.
    pub fn host_only(registry: Arc<Registry>) -> Self {
        Self::new(registry, None, DispatchConfig::default())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn device(&self) -> Option<&Arc<dyn ComputeDevice>> {
        self.device.as_ref()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Runs `op` and returns its image.
    pub fn execute(
        &self,
        op: &str,
        input: &Image,
        params: &OpParams,
        options: ExecOptions,
    ) -> ComputeResult<Image> {
        self.dispatch(op, input, params, options).map(|outcome| outcome.image)
    }

    /// Runs `op` and reports how it ran.
    ///
    /// Errors are limited to unknown operations, unsupported channel
    /// counts and invalid parameters. GPU failures are absorbed by one host
    /// run and reported in [`DispatchOutcome::fallback`].
    pub fn dispatch(
        &self,
        op: &str,
        input: &Image,
        params: &OpParams,
        options: ExecOptions,
    ) -> ComputeResult<DispatchOutcome> {
        let desc = self.prepare(op, input, params)?;

        if options.validate_parity {
            return self.dispatch_parity(desc, input, params, options.prefer_backend);
        }

        match self.route(desc, input.channels(), options.prefer_backend)? {
            Route::Host(reason) => Ok(DispatchOutcome {
                image: self.run_host(desc, input, params)?,
                backend: BackendKind::Host,
                host_reason: Some(reason),
                fallback: None,
                divergence: None,
            }),
            Route::Gpu(kernel) => match self.gpu_attempt(desc, kernel, input, params) {
                Ok(image) => Ok(DispatchOutcome {
                    image,
                    backend: BackendKind::Gpu,
                    host_reason: None,
                    fallback: None,
                    divergence: None,
                }),
                Err(e) if e.is_gpu_failure() => {
                    let reason = self.record_fallback(desc, &e);
                    Ok(DispatchOutcome {
                        image: self.run_host(desc, input, params)?,
                        backend: BackendKind::Host,
                        host_reason: None,
                        fallback: Some(reason),
                        divergence: None,
                    })
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Runs the host implementation and, when a GPU route exists, the GPU
    /// kernel on the same input.
    ///
    /// A GPU failure yields `None` for the GPU side; it is not an error.
    pub fn run_both(
        &self,
        op: &str,
        input: &Image,
        params: &OpParams,
    ) -> ComputeResult<(Image, Option<Image>)> {
        let desc = self.prepare(op, input, params)?;
        let host = self.run_host(desc, input, params)?;
        let gpu = match self.route(desc, input.channels(), Preference::Auto)? {
            Route::Gpu(kernel) => match self.gpu_attempt(desc, kernel, input, params) {
                Ok(image) => Some(image),
                Err(e) if e.is_gpu_failure() => {
                    debug!(op = desc.name, error = %e, "gpu side of run_both failed");
                    None
                }
                Err(e) => return Err(e),
            },
            Route::Host(_) => None,
        };
        Ok((host, gpu))
    }

    /// Lookup plus the checks that are fatal to a call.
    fn prepare(
        &self,
        op: &str,
        input: &Image,
        params: &OpParams,
    ) -> ComputeResult<&OperationDescriptor> {
        let (width, height, channels) = input.dimensions();
        trace!(op, width, height, channels, "dispatch");

        let desc = self.registry.lookup(op)?;
        if !desc.host_channels.supports(channels) {
            return Err(ComputeError::unsupported(desc.name, channels));
        }
        params.validate(desc.kind)?;
        Ok(desc)
    }

    /// Both backends; the host result is returned, a disagreement is
    /// reported as a divergence.
    fn dispatch_parity(
        &self,
        desc: &OperationDescriptor,
        input: &Image,
        params: &OpParams,
        preference: Preference,
    ) -> ComputeResult<DispatchOutcome> {
        // Comparing needs the GPU side even when the caller prefers the host.
        let preference = match preference {
            Preference::Host => Preference::Auto,
            other => other,
        };
        let host = self.run_host(desc, input, params)?;

        let mut host_reason = None;
        let mut fallback = None;
        let gpu = match self.route(desc, input.channels(), preference)? {
            Route::Host(reason) => {
                host_reason = Some(reason);
                None
            }
            Route::Gpu(kernel) => match self.gpu_attempt(desc, kernel, input, params) {
                Ok(image) => Some(image),
                Err(e) if e.is_gpu_failure() => {
                    fallback = Some(self.record_fallback(desc, &e));
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let divergence = gpu.as_ref().and_then(|gpu| {
            let comparison = compare(&host, gpu, desc.tolerance());
            (!comparison.within_tolerance()).then(|| Divergence {
                op: desc.name.to_string(),
                comparison,
            })
        });
        if let Some(d) = &divergence {
            DispatchStats::bump(&self.stats.divergences);
            warn!(op = desc.name, divergence = %d, "backend divergence, returning host result");
        }

        Ok(DispatchOutcome {
            image: host,
            backend: BackendKind::Host,
            host_reason,
            fallback,
            divergence,
        })
    }

    fn route(
        &self,
        desc: &OperationDescriptor,
        channels: u8,
        preference: Preference,
    ) -> ComputeResult<Route> {
        if preference == Preference::Host {
            return Ok(Route::Host(HostReason::Preferred));
        }

        let capability = desc.capability();
        let reason = if !capability.gpu_available {
            HostReason::NoKernel
        } else if !capability.gpu_supports(channels) {
            HostReason::ChannelUnsupported
        } else if self.device.is_none() {
            HostReason::NoDevice
        } else {
            match Kernel::for_operation(desc, channels)? {
                Some(kernel) => {
                    debug!(op = desc.name, channels, kernel = %kernel, "routing to gpu");
                    return Ok(Route::Gpu(kernel));
                }
                None => HostReason::NoKernel,
            }
        };

        if preference == Preference::Gpu {
            warn!(
                op = desc.name,
                channels,
                reason = %reason,
                "gpu requested but not usable, running on host"
            );
        } else {
            debug!(op = desc.name, channels, reason = %reason, "routing to host");
        }
        Ok(Route::Host(reason))
    }

    fn gpu_attempt(
        &self,
        desc: &OperationDescriptor,
        kernel: Kernel,
        input: &Image,
        params: &OpParams,
    ) -> ComputeResult<Image> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ComputeError::GpuUnavailable("no compute device".into()))?;
        DispatchStats::bump(&self.stats.gpu_attempts);

        if !device.is_available() {
            return Err(ComputeError::GpuUnavailable(format!(
                "{} is not accepting work",
                device.name()
            )));
        }

        let kp = kernel.params(input, params);
        let src = WordBuffer::from_bytes(input.data());
        let dst = WordBuffer::zeroed(kp.out_len());
        debug!(op = desc.name, kernel = %kernel, device = device.name(), "launching kernel");

        let dst = self.launch(device, kernel, src, dst, kp)?;
        let image = Image::from_vec(
            dst.to_bytes(),
            input.width(),
            input.height(),
            kernel.output_channels(input.channels()),
        )
        .map_err(|e| ComputeError::GpuLaunchFailed(format!("malformed device output: {e}")))?;

        DispatchStats::bump(&self.stats.gpu_successes);
        Ok(image)
    }

    /// Launch, waiting at most `gpu_timeout` when one is configured.
    ///
    /// Untimed launches run on the calling thread. Timed launches go to the
    /// dispatcher's launch worker; a timed-out launch cannot be cancelled,
    /// so it finishes there on its own and its result is dropped.
    fn launch(
        &self,
        device: &Arc<dyn ComputeDevice>,
        kernel: Kernel,
        src: WordBuffer,
        mut dst: WordBuffer,
        kp: KernelParams,
    ) -> ComputeResult<WordBuffer> {
        let Some(timeout) = self.config.gpu_timeout else {
            guarded_launch(device.as_ref(), &kernel, &src, &mut dst, &kp)?;
            return Ok(dst);
        };

        let (reply, rx) = mpsc::channel();
        self.submit(LaunchJob {
            device: Arc::clone(device),
            kernel,
            src,
            dst,
            params: kp,
            reply,
        })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ComputeError::GpuTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ComputeError::GpuLaunchFailed(
                "launch worker dropped the job".into(),
            )),
        }
    }

    /// Queues `job` on the launch worker, starting it on first use.
    ///
    /// A worker whose queue is closed is replaced on the next call.
    fn submit(&self, job: LaunchJob) -> ComputeResult<()> {
        let mut slot = self
            .worker
            .lock()
            .map_err(|_| ComputeError::GpuLaunchFailed("launch worker lock poisoned".into()))?;
        let worker = match slot.take() {
            Some(worker) => worker,
            None => LaunchWorker::spawn()?,
        };
        worker
            .jobs
            .send(job)
            .map_err(|_| ComputeError::GpuLaunchFailed("launch worker exited".into()))?;
        *slot = Some(worker);
        Ok(())
    }

    fn run_host(
        &self,
        desc: &OperationDescriptor,
        input: &Image,
        params: &OpParams,
    ) -> ComputeResult<Image> {
        DispatchStats::bump(&self.stats.host_runs);
        cpu_backend::execute(desc, input, params)
    }

    fn record_fallback(&self, desc: &OperationDescriptor, err: &ComputeError) -> FallbackReason {
        DispatchStats::bump(&self.stats.fallbacks);
        warn!(op = desc.name, error = %err, "gpu path failed, falling back to host");
        FallbackReason::from_error(err)
    }
}
