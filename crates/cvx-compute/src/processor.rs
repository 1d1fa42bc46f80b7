//! Unified processor API.
//!
//! [`Processor`] wraps a [`Dispatcher`] and exposes named operations plus
//! typed helpers for the common ones.

use std::sync::Arc;
use std::time::Duration;

use cvx_core::Image;

use crate::backend::{select_best_device, ComputeDevice, SoftwareDevice};
use crate::config::{DispatchConfig, ExecOptions, Preference};
use crate::dispatch::{DispatchOutcome, Dispatcher, StatsSnapshot};
use crate::params::{FlipMode, OpParams, ThresholdType};
use crate::registry::Registry;
use crate::ComputeResult;

// ============================================================================
// Builder
// ============================================================================

#[derive(Clone)]
enum DeviceChoice {
    Auto,
    Explicit(Arc<dyn ComputeDevice>),
    None,
}

/// Builder for [`Processor`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use cvx_compute::{Preference, ProcessorBuilder};
///
/// let proc = ProcessorBuilder::new()
///     .software_device()
///     .prefer(Preference::Gpu)
///     .gpu_timeout(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// assert_eq!(proc.device_name(), Some("software"));
/// ```
#[derive(Clone)]
pub struct ProcessorBuilder {
    config: DispatchConfig,
    device: DeviceChoice,
    registry: Option<Arc<Registry>>,
}

impl Default for ProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorBuilder {
    /// Create new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: DispatchConfig::default(),
            device: DeviceChoice::Auto,
            registry: None,
        }
    }

    /// Default backend preference for calls without options.
    pub fn prefer(mut self, preference: Preference) -> Self {
        self.config.default_preference = preference;
        self
    }

    /// Run both backends on every call without options.
    pub fn validate_parity(mut self, enabled: bool) -> Self {
        self.config.validate_parity = enabled;
        self
    }

    /// Abandon GPU launches after `timeout`.
    pub fn gpu_timeout(mut self, timeout: Duration) -> Self {
        self.config.gpu_timeout = Some(timeout);
        self
    }

    /// Replace the whole dispatch configuration.
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Configuration from `CVX_*` environment variables.
    pub fn from_env(self) -> Self {
        self.config(DispatchConfig::from_env())
    }

    /// Use `device` for GPU work.
    pub fn device(mut self, device: Arc<dyn ComputeDevice>) -> Self {
        self.device = DeviceChoice::Explicit(device);
        self
    }

    /// Use a fresh [`SoftwareDevice`].
    ///
    /// The software grid runs kernels on the host thread pool. Its results
    /// are still reported as [`BackendKind::Gpu`](crate::BackendKind::Gpu),
    /// so it is only chosen on request.
    pub fn software_device(self) -> Self {
        self.device(Arc::new(SoftwareDevice::new()))
    }

    /// No compute device; every call runs on the host.
    pub fn no_device(mut self) -> Self {
        self.device = DeviceChoice::None;
        self
    }

    /// Share an existing registry.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the Processor.
    pub fn build(self) -> ComputeResult<Processor> {
        let device = match self.device {
            DeviceChoice::Auto => select_best_device(),
            DeviceChoice::Explicit(device) => Some(device),
            DeviceChoice::None => None,
        };
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(Registry::builtin()));
        Ok(Processor {
            dispatcher: Dispatcher::new(registry, device, self.config),
        })
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Named-operation processor with automatic backend selection.
///
/// # Example
/// ```
/// use cvx_compute::{FlipMode, Processor};
/// use cvx_core::Pattern;
///
/// let proc = Processor::host_only();
/// let img = Pattern::Checkerboard { cell: 4 }.generate(16, 16, 3).unwrap();
/// let flipped = proc.flip(&img, FlipMode::Both).unwrap();
/// assert_eq!(flipped.pixel(0, 0), img.pixel(15, 15));
/// ```
#[derive(Debug)]
pub struct Processor {
    dispatcher: Dispatcher,
}

impl Processor {
    /// Create builder for fine-grained configuration.
    pub fn builder() -> ProcessorBuilder {
        ProcessorBuilder::new()
    }

    /// Create with the best available device and default config.
    ///
    /// Without a usable GPU the processor has no device and runs every call
    /// on the host.
    pub fn auto() -> ComputeResult<Self> {
        Self::builder().build()
    }

    /// Processor without a compute device.
    pub fn host_only() -> Self {
        Self {
            dispatcher: Dispatcher::host_only(Arc::new(Registry::builtin())),
        }
    }

    // =========================================================================
    // Info
    // =========================================================================

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Compute device name, if one is attached.
    pub fn device_name(&self) -> Option<&str> {
        self.dispatcher.device().map(|d| d.name())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }

    // =========================================================================
    // Named operations
    // =========================================================================

    /// Run `op` with the configured default options.
    pub fn execute(&self, op: &str, input: &Image, params: &OpParams) -> ComputeResult<Image> {
        let options = self.dispatcher.config().default_options();
        self.dispatcher.execute(op, input, params, options)
    }

    /// Run `op` with per-call options.
    pub fn execute_with(
        &self,
        op: &str,
        input: &Image,
        params: &OpParams,
        options: ExecOptions,
    ) -> ComputeResult<Image> {
        self.dispatcher.execute(op, input, params, options)
    }

    /// Run `op` and report backend, fallback and divergence.
    pub fn dispatch(
        &self,
        op: &str,
        input: &Image,
        params: &OpParams,
        options: ExecOptions,
    ) -> ComputeResult<DispatchOutcome> {
        self.dispatcher.dispatch(op, input, params, options)
    }

    /// Host and GPU results for the same call.
    pub fn run_both(
        &self,
        op: &str,
        input: &Image,
        params: &OpParams,
    ) -> ComputeResult<(Image, Option<Image>)> {
        self.dispatcher.run_both(op, input, params)
    }

    // =========================================================================
    // Typed helpers
    // =========================================================================

    /// Grayscale from RGB or RGBA; gray input is returned as is.
    pub fn to_gray(&self, img: &Image) -> ComputeResult<Image> {
        if img.channels() == 1 {
            return Ok(img.clone());
        }
        self.execute("rgb_to_gray", img, &OpParams::default())
    }

    pub fn threshold(
        &self,
        img: &Image,
        thresh: u8,
        max_value: u8,
        kind: ThresholdType,
    ) -> ComputeResult<Image> {
        let params = OpParams::default()
            .thresh(thresh)
            .max_value(max_value)
            .threshold_type(kind);
        self.execute("threshold", img, &params)
    }

    pub fn bitwise_not(&self, img: &Image) -> ComputeResult<Image> {
        self.execute("bitwise_not", img, &OpParams::default())
    }

    /// Saturating `x + scalar`.
    pub fn add_scalar(&self, img: &Image, scalar: i16) -> ComputeResult<Image> {
        self.execute("add_scalar", img, &OpParams::default().scalar(scalar))
    }

    /// `saturate(round(alpha * x + beta))`.
    pub fn convert_scale(&self, img: &Image, alpha: f32, beta: f32) -> ComputeResult<Image> {
        self.execute("convert_scale", img, &OpParams::default().scale(alpha, beta))
    }

    pub fn box_blur(&self, img: &Image, ksize: u32) -> ComputeResult<Image> {
        self.execute("box_blur", img, &OpParams::default().ksize(ksize))
    }

    /// Edge magnitude of a gray image.
    pub fn sobel(&self, img: &Image) -> ComputeResult<Image> {
        self.execute("sobel", img, &OpParams::default())
    }

    pub fn erode(&self, img: &Image) -> ComputeResult<Image> {
        self.execute("erode", img, &OpParams::default())
    }

    pub fn dilate(&self, img: &Image) -> ComputeResult<Image> {
        self.execute("dilate", img, &OpParams::default())
    }

    pub fn flip(&self, img: &Image, mode: FlipMode) -> ComputeResult<Image> {
        self.execute("flip", img, &OpParams::default().flip(mode))
    }

    pub fn equalize_hist(&self, img: &Image) -> ComputeResult<Image> {
        self.execute("equalize_hist", img, &OpParams::default())
    }

    pub fn median_blur(&self, img: &Image) -> ComputeResult<Image> {
        self.execute("median_blur", img, &OpParams::default())
    }
}
