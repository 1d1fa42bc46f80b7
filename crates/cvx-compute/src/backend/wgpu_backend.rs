//! wgpu compute device.
//!
//! Runs the WGSL kernels from [`crate::shaders`]. Pipelines are compiled on
//! first use and cached per [`Kernel`]. Source and destination travel as
//! `array<u32>` storage buffers holding the word-packed image, so the
//! shader's `main` is the only code that stores a word.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, info, trace};
use wgpu::util::DeviceExt;

use cvx_core::{WordBuffer, WORD_BYTES};

use super::device::{check_launch, ComputeDevice, DeviceLimits, KernelParams};
use crate::kernels::Kernel;
use crate::shaders::{self, WORKGROUP_SIZE};
use crate::{ComputeError, ComputeResult};

static SHARED: OnceLock<Result<Arc<WgpuDevice>, ComputeError>> = OnceLock::new();

/// GPU compute device backed by wgpu.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    limits: DeviceLimits,
    max_groups_per_dim: u32,
    pipelines: Mutex<HashMap<Kernel, wgpu::ComputePipeline>>,
    /// Held from `push_error_scope` to `pop_error_scope`. Error scopes are
    /// a per-device stack, so launches must not interleave them.
    launch_lock: Mutex<()>,
    lost: Arc<AtomicBool>,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("adapter", &self.adapter_name)
            .field("limits", &self.limits)
            .finish()
    }
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

fn adapter_options() -> wgpu::RequestAdapterOptions<'static, 'static> {
    wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }
}

impl WgpuDevice {
    /// Check whether any adapter is present.
    pub fn probe() -> bool {
        pollster::block_on(async {
            instance()
                .request_adapter(&adapter_options())
                .await
                .is_some()
        })
    }

    /// Process-wide device, created on first call.
    ///
    /// A failed creation is remembered; later calls return the same error
    /// without probing again.
    pub fn shared() -> ComputeResult<Arc<WgpuDevice>> {
        SHARED
            .get_or_init(|| WgpuDevice::new().map(Arc::new))
            .clone()
    }

    /// Create a new device.
    pub fn new() -> ComputeResult<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Create a new device asynchronously.
    pub async fn new_async() -> ComputeResult<Self> {
        let adapter = instance()
            .request_adapter(&adapter_options())
            .await
            .ok_or(ComputeError::NoAdapter)?;

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("cvx_compute_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| ComputeError::DeviceCreation(e.to_string()))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, msg| {
            tracing::warn!(?reason, %msg, "wgpu device lost");
            flag.store(true, Ordering::SeqCst);
        });

        let info = adapter.get_info();
        info!(adapter = %info.name, backend = ?info.backend, "wgpu device created");

        let limits = DeviceLimits {
            max_buffer_bytes: adapter_limits
                .max_buffer_size
                .min(adapter_limits.max_storage_buffer_binding_size as u64),
            workgroup_size: WORKGROUP_SIZE,
        };

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            limits,
            max_groups_per_dim: adapter_limits.max_compute_workgroups_per_dimension,
            pipelines: Mutex::new(HashMap::new()),
            launch_lock: Mutex::new(()),
            lost,
        })
    }

    /// Adapter name as reported by the driver.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn create_pipeline(&self, kernel: &Kernel) -> wgpu::ComputePipeline {
        let label = kernel.label();
        let source = shaders::compose(kernel);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: None, // Auto layout
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        })
    }

    /// Workgroup counts covering `words` invocations.
    fn workgroups(&self, words: usize) -> (u32, u32, u32) {
        let groups = (words as u32).div_ceil(WORKGROUP_SIZE).max(1);
        let max = self.max_groups_per_dim.max(1);
        if groups <= max {
            (groups, 1, 1)
        } else {
            (max, groups.div_ceil(max), 1)
        }
    }
}

/// Waits for queued work on every exit path once a submission happened.
struct Submission<'a>(&'a wgpu::Device);

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        self.0.poll(wgpu::Maintain::Wait);
    }
}

impl ComputeDevice for WgpuDevice {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn is_available(&self) -> bool {
        !self.lost.load(Ordering::SeqCst)
    }

    fn launch(
        &self,
        kernel: &Kernel,
        src: &WordBuffer,
        dst: &mut WordBuffer,
        params: &KernelParams,
    ) -> ComputeResult<()> {
        if !self.is_available() {
            return Err(ComputeError::GpuUnavailable("wgpu device lost".into()));
        }
        check_launch(&self.limits, src, dst, params)?;
        if dst.is_empty() {
            return Ok(());
        }
        trace!(kernel = kernel.label(), words = dst.word_len(), "wgpu::launch");

        let mut src_bytes = src.transfer_bytes();
        if src_bytes.is_empty() {
            src_bytes.resize(WORD_BYTES, 0);
        }
        let dst_size = (dst.word_len() * WORD_BYTES) as u64;

        let scope_guard = self
            .launch_lock
            .lock()
            .map_err(|_| ComputeError::GpuLaunchFailed("launch lock poisoned".into()))?;
        let mut pipelines = self
            .pipelines
            .lock()
            .map_err(|_| ComputeError::GpuLaunchFailed("pipeline cache poisoned".into()))?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = pipelines.entry(*kernel).or_insert_with(|| {
            debug!(kernel = kernel.label(), "compiling pipeline");
            self.create_pipeline(kernel)
        });

        let src_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("src_words"),
            contents: &src_bytes,
            usage: wgpu::BufferUsages::STORAGE,
        });
        let dst_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("dst_words"),
            size: dst_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let params_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kernel_params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size: dst_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel_bind_group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: src_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dst_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });

        let workgroups = self.workgroups(dst.word_len());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("compute_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        encoder.copy_buffer_to_buffer(&dst_buf, 0, &staging, 0, dst_size);
        drop(pipelines);

        let submission = Submission(&self.device);
        self.queue.submit(std::iter::once(encoder.finish()));

        // Map and read
        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);
        drop(submission);

        let scope_error = pollster::block_on(self.device.pop_error_scope());
        drop(scope_guard);
        if let Some(err) = scope_error {
            return Err(ComputeError::GpuLaunchFailed(err.to_string()));
        }

        rx.recv()
            .map_err(|_| ComputeError::GpuLaunchFailed("map channel closed".into()))?
            .map_err(|e| ComputeError::GpuLaunchFailed(format!("map failed: {e}")))?;

        let data = slice.get_mapped_range();
        let result = WordBuffer::from_transfer(&data, dst.byte_len())
            .map_err(|e| ComputeError::GpuLaunchFailed(e.to_string()));
        drop(data);
        staging.unmap();

        *dst = result?;
        Ok(())
    }
}
