//! Every operation over the synthetic corpus, on both backends, against the
//! reference oracle.

use std::sync::Arc;

use cvx_compute::{
    ComputeDevice, ComputeError, Fault, FlipMode, OpParams, Processor, Registry, SoftwareDevice,
    ThresholdType,
};
use cvx_core::Image;
use cvx_tests::{check, corpus::corpus_for};

fn param_sets() -> Vec<OpParams> {
    let mut sets = vec![
        OpParams::default(),
        OpParams::default().scalar(-90).scale(0.5, -3.0).ksize(5).flip(FlipMode::Vertical),
        OpParams::default().scalar(255).scale(2.25, 7.5).ksize(1).flip(FlipMode::Both),
    ];
    sets.extend(
        ThresholdType::ALL
            .into_iter()
            .map(|t| OpParams::default().thresh(60).max_value(200).threshold_type(t)),
    );
    sets
}

fn software() -> Processor {
    Processor::builder()
        .device(Arc::new(SoftwareDevice::new()) as Arc<dyn ComputeDevice>)
        .build()
        .unwrap()
}

#[test]
fn test_both_backends_match_oracle() {
    let proc = software();
    let registry = Registry::builtin();

    for desc in registry.iter() {
        for case in corpus_for(desc, 23, 19) {
            for params in param_sets() {
                let (host, gpu) = proc.run_both(desc.name, &case.image, &params).unwrap();

                let verdict = check(desc.name, &case.image, &params, &host).unwrap();
                assert!(verdict.pass, "host {} {}: {verdict:?}", desc.name, case.label());

                assert_eq!(gpu.is_some(), desc.capability().gpu_supports(case.channels));
                if let Some(gpu) = gpu {
                    let verdict = check(desc.name, &case.image, &params, &gpu).unwrap();
                    assert!(verdict.pass, "gpu {} {}: {verdict:?}", desc.name, case.label());
                }
            }
        }
    }
}

#[test]
fn test_failing_device_never_surfaces() {
    let dev = Arc::new(SoftwareDevice::with_fault(Fault::LaunchFailed));
    let proc = Processor::builder()
        .device(Arc::clone(&dev) as Arc<dyn ComputeDevice>)
        .build()
        .unwrap();
    let registry = Registry::builtin();

    for desc in registry.iter() {
        for case in corpus_for(desc, 11, 5) {
            let params = OpParams::default();
            let out = proc.execute(desc.name, &case.image, &params).unwrap();
            assert!(check(desc.name, &case.image, &params, &out).unwrap().pass);
        }
    }
    let stats = proc.stats();
    assert_eq!(stats.fallbacks, stats.gpu_attempts);
    assert_eq!(stats.gpu_successes, 0);
    assert_eq!(dev.in_flight(), 0);
}

#[test]
fn test_channel_mismatch_is_fatal_everywhere() {
    let proc = software();
    let registry = Registry::builtin();
    let params = OpParams::default();

    for desc in registry.iter() {
        for channels in [1u8, 3, 4] {
            if desc.host_channels.supports(channels) {
                continue;
            }
            let img = Image::new(4, 4, channels).unwrap();
            let err = proc.execute(desc.name, &img, &params).unwrap_err();
            assert_eq!(
                err,
                ComputeError::UnsupportedChannelCount {
                    op: desc.name.to_string(),
                    channels
                }
            );
        }
    }
}
