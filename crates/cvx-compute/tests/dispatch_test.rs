//! Dispatcher tests for cvx-compute.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cvx_compute::{
    describe_backends, BackendKind, ComputeDevice, ComputeError, ComputeResult, DeviceLimits,
    ExecOptions, FallbackReason, Fault, HostReason, Kernel, KernelParams, OpParams, Preference,
    Processor, Registry, SoftwareDevice,
};
use cvx_core::{Image, Pattern, WordBuffer};

/// Panics inside `launch` while armed, otherwise runs the software grid.
struct PanickingDevice {
    armed: AtomicBool,
    inner: SoftwareDevice,
}

impl PanickingDevice {
    fn armed() -> Self {
        Self {
            armed: AtomicBool::new(true),
            inner: SoftwareDevice::new(),
        }
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl ComputeDevice for PanickingDevice {
    fn name(&self) -> &str {
        "panicking"
    }

    fn limits(&self) -> DeviceLimits {
        self.inner.limits()
    }

    fn launch(
        &self,
        kernel: &Kernel,
        src: &WordBuffer,
        dst: &mut WordBuffer,
        params: &KernelParams,
    ) -> ComputeResult<()> {
        if self.armed.load(Ordering::SeqCst) {
            panic!("driver fault");
        }
        self.inner.launch(kernel, src, dst, params)
    }
}

fn processor_with(dev: &Arc<SoftwareDevice>) -> Processor {
    Processor::builder()
        .device(Arc::clone(dev) as Arc<dyn ComputeDevice>)
        .build()
        .unwrap()
}

fn params() -> OpParams {
    OpParams::default().thresh(100).scalar(33).scale(0.75, 12.0).ksize(3)
}

#[test]
fn test_describe_backends() {
    let desc = describe_backends();
    println!("{}", desc);
    assert!(desc.contains("CPU"));
}

#[test]
fn test_host_and_gpu_agree_over_corpus() {
    let dev = Arc::new(SoftwareDevice::new());
    let proc = processor_with(&dev);
    let registry = Registry::builtin();
    let p = params();

    for desc in registry.iter() {
        for channels in desc.host_channels.counts() {
            for pattern in Pattern::CORPUS {
                let img = pattern.generate(37, 29, channels).unwrap();
                let host = proc
                    .execute_with(desc.name, &img, &p, ExecOptions::host())
                    .unwrap();
                let gpu = proc
                    .dispatch(desc.name, &img, &p, ExecOptions::gpu())
                    .unwrap();

                let cmp = cvx_compute::compare(&host, &gpu.image, desc.tolerance());
                assert!(
                    cmp.within_tolerance(),
                    "{} {pattern} @ {channels}: max diff {}",
                    desc.name,
                    cmp.max_diff
                );
                let expect_gpu = desc.capability().gpu_supports(channels);
                assert_eq!(
                    gpu.backend == BackendKind::Gpu,
                    expect_gpu,
                    "{} @ {channels}",
                    desc.name
                );
            }
        }
    }
    assert_eq!(dev.in_flight(), 0);
}

#[test]
fn test_launch_failure_falls_back_once() {
    for fault in [Fault::LaunchFailed, Fault::Unavailable, Fault::Panic] {
        let dev = Arc::new(SoftwareDevice::with_fault(fault));
        let proc = processor_with(&dev);
        let img = Pattern::Gradient.generate(32, 32, 4).unwrap();

        let out = proc
            .dispatch("rgb_to_gray", &img, &OpParams::default(), ExecOptions::gpu())
            .unwrap();
        let direct = proc
            .execute_with("rgb_to_gray", &img, &OpParams::default(), ExecOptions::host())
            .unwrap();

        assert_eq!(out.backend, BackendKind::Host, "{fault:?}");
        assert!(out.fallback.is_some(), "{fault:?}");
        assert_eq!(out.image, direct, "{fault:?}");

        let stats = proc.stats();
        assert_eq!(stats.fallbacks, 1, "{fault:?}");
        assert_eq!(stats.gpu_attempts, 1, "{fault:?}");
        // one fallback run plus the direct host call
        assert_eq!(stats.host_runs, 2, "{fault:?}");
        assert!(dev.launches() <= 1);
        assert_eq!(dev.in_flight(), 0);
    }
}

#[test]
fn test_unknown_and_unsupported_are_fatal() {
    let dev = Arc::new(SoftwareDevice::with_fault(Fault::LaunchFailed));
    let proc = processor_with(&dev);
    let rgba = Pattern::Gradient.generate(8, 8, 4).unwrap();
    let gray = Image::new(8, 8, 1).unwrap();

    for pref in [Preference::Auto, Preference::Host, Preference::Gpu] {
        let options = ExecOptions {
            prefer_backend: pref,
            validate_parity: false,
        };
        let err = proc.execute_with("to_grey", &rgba, &OpParams::default(), options).unwrap_err();
        assert_eq!(err, ComputeError::UnknownOperation("to_grey".into()));
        assert!(err.is_fatal());

        let err = proc
            .execute_with("bgr_to_gray", &gray, &OpParams::default(), options)
            .unwrap_err();
        assert!(matches!(err, ComputeError::UnsupportedChannelCount { channels: 1, .. }));

        let err = proc.execute_with("sobel", &rgba, &OpParams::default(), options).unwrap_err();
        assert!(matches!(err, ComputeError::UnsupportedChannelCount { channels: 4, .. }));
    }
    assert_eq!(dev.launches(), 0);
}

#[test]
fn test_timeout_falls_back_and_releases_device() {
    let dev = Arc::new(SoftwareDevice::with_fault(Fault::Delay(Duration::from_millis(300))));
    let proc = Processor::builder()
        .device(Arc::clone(&dev) as Arc<dyn ComputeDevice>)
        .gpu_timeout(Duration::from_millis(25))
        .build()
        .unwrap();
    let img = Pattern::Noise { seed: 9 }.generate(16, 16, 3).unwrap();

    let out = proc
        .dispatch("dilate", &img, &OpParams::default(), ExecOptions::default())
        .unwrap();
    assert!(matches!(out.fallback, Some(FallbackReason::Timeout(_))));
    assert_eq!(
        out.image,
        Processor::host_only().dilate(&img).unwrap()
    );

    // The abandoned launch finishes on its own thread.
    let deadline = Instant::now() + Duration::from_secs(5);
    while dev.in_flight() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(dev.in_flight(), 0);
}

#[test]
fn test_parity_mode_returns_host_result() {
    let dev = Arc::new(SoftwareDevice::with_fault(Fault::Corrupt));
    let proc = processor_with(&dev);
    let img = Pattern::Solid([200, 100, 50, 128]).generate(8, 8, 4).unwrap();
    let options = ExecOptions::default().with_parity(true);

    let out = proc.dispatch("bgr_to_rgb", &img, &OpParams::default(), options).unwrap();
    let divergence = out.divergence.expect("corrupted byte must be reported");
    assert_eq!(divergence.op, "bgr_to_rgb");
    assert_eq!(divergence.comparison.first_mismatch, Some((0, 0, 0)));
    assert_eq!(out.image.pixel(0, 0), &[50, 100, 200, 128]);
    assert_eq!(proc.stats().divergences, 1);
}

#[test]
fn test_host_only_ops_never_launch() {
    let dev = Arc::new(SoftwareDevice::new());
    let proc = processor_with(&dev);
    let img = Pattern::Noise { seed: 1 }.generate(16, 16, 1).unwrap();

    let out = proc
        .dispatch("equalize_hist", &img, &OpParams::default(), ExecOptions::gpu())
        .unwrap();
    assert_eq!(out.backend, BackendKind::Host);
    assert!(out.fallback.is_none());
    proc.median_blur(&img).unwrap();
    assert_eq!(dev.launches(), 0);
}

#[test]
fn test_concurrent_calls_share_dispatcher() {
    let dev = Arc::new(SoftwareDevice::new());
    let proc = Arc::new(processor_with(&dev));
    let img = Arc::new(Pattern::Gradient.generate(64, 64, 4).unwrap());
    let expected = Processor::host_only().to_gray(&img).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let proc = Arc::clone(&proc);
            let img = Arc::clone(&img);
            thread::spawn(move || proc.to_gray(&img).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
    assert_eq!(proc.stats().gpu_successes, 4);
    assert_eq!(dev.in_flight(), 0);
}

#[test]
fn test_device_panic_falls_back_without_timeout() {
    let dev = Arc::new(PanickingDevice::armed());
    let proc = Processor::builder()
        .device(Arc::clone(&dev) as Arc<dyn ComputeDevice>)
        .build()
        .unwrap();
    assert!(proc.dispatcher().config().gpu_timeout.is_none());
    let img = Pattern::Gradient.generate(32, 32, 4).unwrap();
    let p = OpParams::default();

    let out = proc.dispatch("rgb_to_gray", &img, &p, ExecOptions::default()).unwrap();
    assert_eq!(out.backend, BackendKind::Host);
    match &out.fallback {
        Some(FallbackReason::LaunchFailed(msg)) => assert!(msg.contains("driver fault"), "{msg}"),
        other => panic!("expected launch failure, got {other:?}"),
    }
    assert_eq!(out.image, Processor::host_only().to_gray(&img).unwrap());

    let stats = proc.stats();
    assert_eq!(stats.gpu_attempts, 1);
    assert_eq!(stats.fallbacks, 1);
    assert_eq!(stats.host_runs, 1);

    // run_both treats the panic as a missing GPU result.
    let (host, gpu) = proc.run_both("rgb_to_gray", &img, &p).unwrap();
    assert_eq!(host, out.image);
    assert!(gpu.is_none());
}

#[test]
fn test_launch_worker_survives_device_panic() {
    let dev = Arc::new(PanickingDevice::armed());
    let proc = Processor::builder()
        .device(Arc::clone(&dev) as Arc<dyn ComputeDevice>)
        .gpu_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let img = Pattern::Checkerboard { cell: 3 }.generate(16, 16, 3).unwrap();
    let p = OpParams::default();

    let out = proc.dispatch("bitwise_not", &img, &p, ExecOptions::gpu()).unwrap();
    assert!(matches!(out.fallback, Some(FallbackReason::LaunchFailed(_))));

    dev.disarm();
    for _ in 0..3 {
        let out = proc.dispatch("bitwise_not", &img, &p, ExecOptions::gpu()).unwrap();
        assert_eq!(out.backend, BackendKind::Gpu);
        assert!(out.fallback.is_none());
    }
    let stats = proc.stats();
    assert_eq!(stats.gpu_attempts, 4);
    assert_eq!(stats.gpu_successes, 3);
    assert_eq!(stats.fallbacks, 1);
}

#[test]
fn test_timed_launches_queue_behind_stuck_launch() {
    let dev = Arc::new(SoftwareDevice::with_fault(Fault::Delay(Duration::from_millis(200))));
    let proc = Processor::builder()
        .device(Arc::clone(&dev) as Arc<dyn ComputeDevice>)
        .gpu_timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let img = Pattern::Gradient.generate(8, 8, 1).unwrap();

    for _ in 0..3 {
        let out = proc
            .dispatch("erode", &img, &OpParams::default(), ExecOptions::default())
            .unwrap();
        assert!(matches!(out.fallback, Some(FallbackReason::Timeout(_))));
    }
    // Launches run one at a time on a single worker.
    assert!(dev.in_flight() <= 1);
    assert_eq!(proc.stats().fallbacks, 3);
}

#[test]
#[cfg(not(feature = "wgpu"))]
fn test_auto_without_gpu_reports_host() {
    let proc = Processor::auto().unwrap();
    assert_eq!(proc.device_name(), None);
    let img = Pattern::Gradient.generate(16, 16, 4).unwrap();

    for options in [ExecOptions::default(), ExecOptions::gpu()] {
        let out = proc
            .dispatch("rgb_to_gray", &img, &OpParams::default(), options)
            .unwrap();
        assert_eq!(out.backend, BackendKind::Host);
        assert_eq!(out.host_reason, Some(HostReason::NoDevice));
        assert!(out.fallback.is_none());
    }
    assert_eq!(proc.stats().gpu_attempts, 0);
    assert!(cvx_compute::detect_backends()
        .iter()
        .filter(|b| b.kind == BackendKind::Gpu)
        .all(|b| !b.available));
}
