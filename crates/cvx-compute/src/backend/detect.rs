//! Backend detection and auto-selection.

use std::sync::Arc;

use tracing::debug;

use super::{BackendKind, ComputeDevice};

/// Information about a compute backend.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    /// Where work on this backend is accounted.
    pub kind: BackendKind,
    /// Human-readable name.
    pub name: &'static str,
    /// Whether backend is available.
    pub available: bool,
    /// Priority for auto-selection (higher = preferred).
    pub priority: u32,
    /// Description.
    pub description: &'static str,
}

/// Detect all backends, highest priority first.
///
/// Only real hardware is listed as a GPU backend. The software grid is a
/// test device and is never detected or auto-selected.
pub fn detect_backends() -> Vec<BackendInfo> {
    let mut backends = vec![BackendInfo {
        kind: BackendKind::Host,
        name: "CPU",
        available: true,
        priority: 10,
        description: "host implementation with rayon parallelization",
    }];

    #[cfg(feature = "wgpu")]
    {
        let wgpu_available = super::WgpuDevice::probe();
        backends.push(BackendInfo {
            kind: BackendKind::Gpu,
            name: "wgpu",
            available: wgpu_available,
            priority: if wgpu_available { 100 } else { 0 },
            description: "compute kernels via wgpu (Vulkan/Metal/DX12)",
        });
    }

    #[cfg(not(feature = "wgpu"))]
    backends.push(BackendInfo {
        kind: BackendKind::Gpu,
        name: "wgpu",
        available: false,
        priority: 0,
        description: "not compiled in (enable the `wgpu` feature)",
    });

    backends.sort_by(|a, b| b.priority.cmp(&a.priority));
    backends
}

/// Best available compute device, if any.
///
/// The shared wgpu device when the feature is on and an adapter exists.
/// `None` otherwise, and every call then runs on the host.
pub fn select_best_device() -> Option<Arc<dyn ComputeDevice>> {
    #[cfg(feature = "wgpu")]
    {
        match super::WgpuDevice::shared() {
            Ok(dev) => {
                debug!(adapter = dev.adapter_name(), "selected wgpu device");
                return Some(dev as Arc<dyn ComputeDevice>);
            }
            Err(e) => debug!(error = %e, "wgpu device unavailable"),
        }
    }
    debug!("no compute device, running on host");
    None
}

/// Get description of available backends.
pub fn describe_backends() -> String {
    let backends = detect_backends();
    let mut desc = String::new();

    for info in backends {
        let status = if info.available { "+" } else { "-" };
        desc.push_str(&format!("[{}] {}: {}\n", status, info.name, info.description));
    }

    desc
}
