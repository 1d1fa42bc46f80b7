//! Backend capability registry.
//!
//! A [`Registry`] maps operation names to [`OperationDescriptor`]s. It is
//! built once, validated, and shared by `Arc`; nothing mutates it after
//! [`RegistryBuilder::build`]. Dispatch decisions read it through
//! [`Registry::lookup`], which fails on unknown names instead of defaulting
//! to the host path.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;

use crate::{ComputeError, ComputeResult};

bitflags! {
    /// Set of channel counts an implementation accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelSet: u8 {
        /// 1 channel
        const GRAY = 1 << 0;
        /// 3 channels
        const RGB = 1 << 1;
        /// 4 channels
        const RGBA = 1 << 2;

        /// 3 or 4 channels
        const COLOR = Self::RGB.bits() | Self::RGBA.bits();
        /// 1, 3 or 4 channels
        const ANY = Self::GRAY.bits() | Self::RGB.bits() | Self::RGBA.bits();
    }
}

impl ChannelSet {
    /// The flag for a single channel count, if it is one of 1, 3, 4.
    pub fn from_count(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(Self::GRAY),
            3 => Some(Self::RGB),
            4 => Some(Self::RGBA),
            _ => None,
        }
    }

    /// True if `channels` is in the set.
    pub fn supports(self, channels: u8) -> bool {
        Self::from_count(channels).is_some_and(|flag| self.contains(flag))
    }

    /// Channel counts in ascending order.
    pub fn counts(self) -> Vec<u8> {
        [1u8, 3, 4].into_iter().filter(|&c| self.supports(c)).collect()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.counts().iter().map(u8::to_string).collect();
        if parts.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&parts.join(","))
        }
    }
}

/// Operation family. Decides the parity tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Color,
    Threshold,
    Arithmetic,
    Filter,
    Edge,
    Morphology,
    Transform,
    Histogram,
}

impl OpClass {
    /// Maximum absolute per-sample difference tolerated between backends.
    ///
    /// Classes that go through `f32` (luma weights, scale-and-offset,
    /// rounding) allow one step; integer-only classes must match exactly.
    pub const fn tolerance(self) -> u8 {
        match self {
            Self::Color | Self::Arithmetic | Self::Filter => 1,
            _ => 0,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Threshold => "threshold",
            Self::Arithmetic => "arithmetic",
            Self::Filter => "filter",
            Self::Edge => "edge",
            Self::Morphology => "morphology",
            Self::Transform => "transform",
            Self::Histogram => "histogram",
        }
    }
}

/// Host implementation selector. One variant per logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    RgbToGray,
    BgrToGray,
    BgrToRgb,
    GrayToRgb,
    Threshold,
    BitwiseNot,
    AddScalar,
    ConvertScale,
    BoxBlur,
    Sobel,
    Erode,
    Dilate,
    Flip,
    EqualizeHist,
    MedianBlur,
}

/// Static description of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Lookup name, e.g. `"rgb_to_gray"`.
    pub name: &'static str,
    pub kind: OpKind,
    pub class: OpClass,
    /// Channel counts the host implementation accepts.
    pub host_channels: ChannelSet,
    /// Channel counts with a GPU kernel, or `None` for host-only operations.
    pub gpu_channels: Option<ChannelSet>,
    pub summary: &'static str,
}

impl OperationDescriptor {
    /// The backend capability entry for this operation.
    pub fn capability(&self) -> CapabilityEntry {
        CapabilityEntry {
            host_available: true,
            gpu_available: self.gpu_channels.is_some(),
            gpu_channel_support: self.gpu_channels.unwrap_or(ChannelSet::empty()),
        }
    }

    /// Parity tolerance of the operation's class.
    pub fn tolerance(&self) -> u8 {
        self.class.tolerance()
    }
}

/// Which backends can run an operation.
///
/// Invariant: `gpu_available` implies a non-empty `gpu_channel_support`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityEntry {
    pub host_available: bool,
    pub gpu_available: bool,
    pub gpu_channel_support: ChannelSet,
}

impl CapabilityEntry {
    /// True if a GPU kernel exists for `channels`.
    pub fn gpu_supports(&self, channels: u8) -> bool {
        self.gpu_available && self.gpu_channel_support.supports(channels)
    }
}

const fn op(
    name: &'static str,
    kind: OpKind,
    class: OpClass,
    host_channels: ChannelSet,
    gpu_channels: Option<ChannelSet>,
    summary: &'static str,
) -> OperationDescriptor {
    OperationDescriptor {
        name,
        kind,
        class,
        host_channels,
        gpu_channels,
        summary,
    }
}

/// Built-in operation table.
pub const BUILTIN_OPS: &[OperationDescriptor] = &[
    op(
        "rgb_to_gray",
        OpKind::RgbToGray,
        OpClass::Color,
        ChannelSet::COLOR,
        Some(ChannelSet::COLOR),
        "RGB(A) to gray, Rec.601 luma",
    ),
    op(
        "bgr_to_gray",
        OpKind::BgrToGray,
        OpClass::Color,
        ChannelSet::COLOR,
        Some(ChannelSet::COLOR),
        "BGR(A) to gray, Rec.601 luma",
    ),
    op(
        "bgr_to_rgb",
        OpKind::BgrToRgb,
        OpClass::Color,
        ChannelSet::COLOR,
        Some(ChannelSet::COLOR),
        "swap red and blue, keep alpha",
    ),
    op(
        "gray_to_rgb",
        OpKind::GrayToRgb,
        OpClass::Color,
        ChannelSet::GRAY,
        Some(ChannelSet::GRAY),
        "replicate gray into RGB",
    ),
    op(
        "threshold",
        OpKind::Threshold,
        OpClass::Threshold,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "fixed-level threshold per sample",
    ),
    op(
        "bitwise_not",
        OpKind::BitwiseNot,
        OpClass::Arithmetic,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "invert every sample",
    ),
    op(
        "add_scalar",
        OpKind::AddScalar,
        OpClass::Arithmetic,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "saturating add of a signed scalar",
    ),
    op(
        "convert_scale",
        OpKind::ConvertScale,
        OpClass::Arithmetic,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "saturate(round(alpha * x + beta))",
    ),
    op(
        "box_blur",
        OpKind::BoxBlur,
        OpClass::Filter,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "normalized box filter, replicate border",
    ),
    op(
        "sobel",
        OpKind::Sobel,
        OpClass::Edge,
        ChannelSet::GRAY,
        Some(ChannelSet::GRAY),
        "3x3 Sobel magnitude |gx| + |gy|",
    ),
    op(
        "erode",
        OpKind::Erode,
        OpClass::Morphology,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "3x3 minimum",
    ),
    op(
        "dilate",
        OpKind::Dilate,
        OpClass::Morphology,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "3x3 maximum",
    ),
    op(
        "flip",
        OpKind::Flip,
        OpClass::Transform,
        ChannelSet::ANY,
        Some(ChannelSet::ANY),
        "mirror horizontally, vertically or both",
    ),
    op(
        "equalize_hist",
        OpKind::EqualizeHist,
        OpClass::Histogram,
        ChannelSet::GRAY,
        None,
        "histogram equalization",
    ),
    op(
        "median_blur",
        OpKind::MedianBlur,
        OpClass::Filter,
        ChannelSet::ANY,
        None,
        "3x3 median",
    ),
];

/// Immutable operation table.
#[derive(Debug, Clone)]
pub struct Registry {
    ops: BTreeMap<&'static str, OperationDescriptor>,
}

impl Registry {
    /// Registry holding [`BUILTIN_OPS`].
    pub fn builtin() -> Self {
        Self {
            ops: BUILTIN_OPS.iter().map(|d| (d.name, d.clone())).collect(),
        }
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Descriptor for `name`.
    pub fn lookup(&self, name: &str) -> ComputeResult<&OperationDescriptor> {
        self.ops
            .get(name)
            .ok_or_else(|| ComputeError::UnknownOperation(name.to_string()))
    }

    /// Capability entry for `name`.
    pub fn capability(&self, name: &str) -> ComputeResult<CapabilityEntry> {
        self.lookup(name).map(OperationDescriptor::capability)
    }

    /// All descriptors, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.ops.values()
    }

    /// Names of operations with at least one GPU kernel.
    pub fn gpu_operations(&self) -> Vec<&'static str> {
        self.iter()
            .filter(|d| d.gpu_channels.is_some())
            .map(|d| d.name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Collects descriptors and validates them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<OperationDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the built-in table.
    pub fn with_builtin() -> Self {
        Self {
            entries: BUILTIN_OPS.to_vec(),
        }
    }

    /// Adds one descriptor.
    pub fn register(mut self, desc: OperationDescriptor) -> Self {
        self.entries.push(desc);
        self
    }

    /// Validates and freezes the table.
    ///
    /// Rejects duplicate names, empty host channel sets, GPU entries with no
    /// channel counts, and GPU channel counts the host cannot serve as a
    /// fallback.
    pub fn build(self) -> ComputeResult<Registry> {
        let mut ops = BTreeMap::new();
        for desc in self.entries {
            if desc.host_channels.is_empty() {
                return Err(ComputeError::InvalidRegistry(format!(
                    "{}: host implementation accepts no channel count",
                    desc.name
                )));
            }
            if let Some(gpu) = desc.gpu_channels {
                if gpu.is_empty() {
                    return Err(ComputeError::InvalidRegistry(format!(
                        "{}: GPU kernel registered with an empty channel set",
                        desc.name
                    )));
                }
                if !desc.host_channels.contains(gpu) {
                    return Err(ComputeError::InvalidRegistry(format!(
                        "{}: GPU channels {} exceed host channels {}",
                        desc.name, gpu, desc.host_channels
                    )));
                }
            }
            if ops.insert(desc.name, desc.clone()).is_some() {
                return Err(ComputeError::InvalidRegistry(format!(
                    "duplicate operation {}",
                    desc.name
                )));
            }
        }
        Ok(Registry { ops })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert!(RegistryBuilder::with_builtin().build().is_ok());
        let reg = Registry::builtin();
        assert_eq!(reg.len(), BUILTIN_OPS.len());

        let gray = reg.capability("rgb_to_gray").unwrap();
        assert!(gray.host_available);
        assert!(gray.gpu_supports(4));
        assert!(gray.gpu_supports(3));
        assert!(!gray.gpu_supports(1));

        let eq = reg.capability("equalize_hist").unwrap();
        assert!(!eq.gpu_available);
        assert!(eq.gpu_channel_support.is_empty());
    }

    #[test]
    fn test_unknown_operation() {
        let reg = Registry::builtin();
        assert_eq!(
            reg.lookup("rgb_to_grey").unwrap_err(),
            ComputeError::UnknownOperation("rgb_to_grey".into())
        );
    }

    #[test]
    fn test_gpu_entries_never_empty() {
        for desc in Registry::builtin().iter() {
            let cap = desc.capability();
            if cap.gpu_available {
                assert!(!cap.gpu_channel_support.is_empty(), "{}", desc.name);
            }
        }
    }

    #[test]
    fn test_builder_rejects_empty_gpu_set() {
        let bad = op(
            "noop",
            OpKind::BitwiseNot,
            OpClass::Arithmetic,
            ChannelSet::ANY,
            Some(ChannelSet::empty()),
            "",
        );
        let err = RegistryBuilder::new().register(bad).build().unwrap_err();
        assert!(matches!(err, ComputeError::InvalidRegistry(_)));
    }

    #[test]
    fn test_builder_rejects_duplicates_and_gpu_superset() {
        let err = RegistryBuilder::with_builtin()
            .register(BUILTIN_OPS[0].clone())
            .build()
            .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidRegistry(_)));

        let wide = op(
            "wide",
            OpKind::Sobel,
            OpClass::Edge,
            ChannelSet::GRAY,
            Some(ChannelSet::ANY),
            "",
        );
        assert!(RegistryBuilder::new().register(wide).build().is_err());
    }

    #[test]
    fn test_channel_set() {
        assert!(ChannelSet::COLOR.supports(4));
        assert!(!ChannelSet::COLOR.supports(1));
        assert!(!ChannelSet::ANY.supports(2));
        assert_eq!(ChannelSet::ANY.counts(), vec![1, 3, 4]);
        assert_eq!(ChannelSet::COLOR.to_string(), "3,4");
        assert_eq!(ChannelSet::empty().to_string(), "-");
    }

    #[test]
    fn test_tolerances() {
        assert_eq!(OpClass::Color.tolerance(), 1);
        assert_eq!(OpClass::Morphology.tolerance(), 0);
        assert_eq!(Registry::builtin().lookup("sobel").unwrap().tolerance(), 0);
    }
}
