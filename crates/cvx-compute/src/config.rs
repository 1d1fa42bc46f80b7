//! Dispatch configuration.
//!
//! # Environment Variables
//!
//! - `CVX_BACKEND` - default backend preference (`auto`, `host`/`cpu`, `gpu`/`webgpu`/`wgpu`)
//! - `CVX_VALIDATE_PARITY` - run both backends and compare ("1" or "true")
//! - `CVX_GPU_TIMEOUT_MS` - abandon a GPU launch after this many milliseconds

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::ComputeError;

/// Which backend a call should try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preference {
    /// GPU when a kernel and a device exist, host otherwise.
    #[default]
    Auto,
    /// Host only.
    Host,
    /// GPU requested explicitly. Still falls back to the host once on
    /// failure; an unusable GPU route is logged at `warn` instead of `debug`.
    Gpu,
}

impl Preference {
    pub fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Host => "host",
            Self::Gpu => "gpu",
        }
    }
}

impl FromStr for Preference {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "host" | "cpu" => Ok(Self::Host),
            "gpu" | "webgpu" | "wgpu" => Ok(Self::Gpu),
            other => Err(ComputeError::InvalidParameter(format!(
                "unknown backend '{other}' (expected auto, host or gpu)"
            ))),
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOptions {
    pub prefer_backend: Preference,
    /// Run both backends, report a divergence, return the host result.
    pub validate_parity: bool,
}

impl ExecOptions {
    pub fn host() -> Self {
        Self {
            prefer_backend: Preference::Host,
            validate_parity: false,
        }
    }

    pub fn gpu() -> Self {
        Self {
            prefer_backend: Preference::Gpu,
            validate_parity: false,
        }
    }

    pub fn with_parity(mut self, enabled: bool) -> Self {
        self.validate_parity = enabled;
        self
    }
}

/// Dispatcher-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchConfig {
    /// Preference used when a call does not pass its own options.
    pub default_preference: Preference,
    /// Parity checking for calls without their own options.
    pub validate_parity: bool,
    /// Abandon a GPU launch after this long and fall back to the host.
    pub gpu_timeout: Option<Duration>,
}

impl DispatchConfig {
    /// Defaults overridden by `CVX_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var("CVX_BACKEND") {
            match value.parse() {
                Ok(pref) => config.default_preference = pref,
                Err(e) => warn!(value = %value, error = %e, "ignoring CVX_BACKEND, using auto"),
            }
        }

        if let Ok(value) = env::var("CVX_VALIDATE_PARITY") {
            config.validate_parity = value == "1" || value.eq_ignore_ascii_case("true");
        }

        if let Ok(value) = env::var("CVX_GPU_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) if ms > 0 => config.gpu_timeout = Some(Duration::from_millis(ms)),
                _ => warn!(value = %value, "ignoring CVX_GPU_TIMEOUT_MS"),
            }
        }

        config
    }

    /// Options for a call that does not supply its own.
    pub fn default_options(&self) -> ExecOptions {
        ExecOptions {
            prefer_backend: self.default_preference,
            validate_parity: self.validate_parity,
        }
    }
}
