// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Accelerator-first device selection with environment variable overrides.
//!
//! Selection is an explicit two-step search:
//!
//! 1. A **fallback probe** looks for a device of the fallback kind (CPU by
//!    default). Its failure is never fatal and its result is discarded when
//!    the preferred lookup succeeds.
//! 2. The **preferred lookup** looks for a device of the preferred kind (GPU by
//!    default) at the configured index.
//!
//! "No platform at all" ([`AccelError::NoPlatform`]) and "no device of this
//! kind" ([`AccelError::DeviceNotFound`]) are reported separately. Whether a
//! missing preferred device may be replaced by the probe result is governed by
//! [`FallbackPolicy`]; the default is [`FallbackPolicy::Disabled`].
//!
//! ## Environment Variables
//!
//! - `ACCEL_DEVICE_TYPE` - Preferred kind: `gpu`, `cpu`, `accelerator` or `all`
//! - `ACCEL_DEVICE_INDEX` - Ordinal among devices of the preferred kind
//! - `ACCEL_ALLOW_FALLBACK` - Set to `1` or `true` to accept the fallback device
//!
//! ## Example
//!
//! ```rust
//! use accel_runtime::{select_device, DeviceConfig, DeviceKind, Platform};
//!
//! let platform = Platform::host();
//! let device = select_device(&platform, &DeviceConfig::default())?;
//! assert_eq!(device.kind(), DeviceKind::Gpu);
//! # Ok::<(), accel_runtime::AccelError>(())
//! ```

use std::fmt;
use std::sync::Once;

use crate::backend::{DeviceId, Platform};
use crate::error::{AccelError, Result};
use crate::traits::ValidatableConfig;

/// Kind of compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Graphics processor.
    Gpu,
    /// Host processor.
    Cpu,
    /// Dedicated accelerator.
    Accelerator,
    /// Any device kind.
    All,
}

impl DeviceKind {
    /// Parse the value of `ACCEL_DEVICE_TYPE`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gpu" => Some(Self::Gpu),
            "cpu" => Some(Self::Cpu),
            "accelerator" | "acc" => Some(Self::Accelerator),
            "all" | "any" => Some(Self::All),
            _ => None,
        }
    }

    /// Whether a device of kind `self` satisfies a request for `wanted`.
    #[must_use]
    pub fn matches(self, wanted: DeviceKind) -> bool {
        wanted == DeviceKind::All || self == wanted
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gpu => "GPU",
            Self::Cpu => "CPU",
            Self::Accelerator => "accelerator",
            Self::All => "any",
        })
    }
}

/// What to do when no device of the preferred kind exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Fail with [`AccelError::DeviceNotFound`].
    #[default]
    Disabled,
    /// Use the fallback probe's device and warn once.
    Allowed,
}

/// Capability attributes of a device, queried on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device kind.
    pub kind: DeviceKind,
    /// Vendor name.
    pub vendor: String,
    /// Device name.
    pub name: String,
    /// Number of parallel compute units.
    pub compute_units: u32,
    /// Maximum clock frequency in MHz.
    pub clock_frequency_mhz: u32,
    /// Global memory size in bytes.
    pub global_mem_bytes: u64,
    /// Whether images are supported.
    pub image_support: bool,
    /// Supported extension names.
    pub extensions: Vec<String>,
    /// Largest work-group the device accepts.
    pub max_work_group_size: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device {} : {}", self.vendor, self.name)?;
        writeln!(f, "Max compute units: {}", self.compute_units)?;
        writeln!(f, "Max clock frequency: {} MHz", self.clock_frequency_mhz)?;
        writeln!(f, "Global mem size: {} bytes", self.global_mem_bytes)?;
        writeln!(f, "Image support: {}", u8::from(self.image_support))?;
        write!(f, "Device extensions: {}", self.extensions.join(" "))
    }
}

/// A device discovered on a [`Platform`].
///
/// Devices are owned by the platform; this handle only references one.
#[derive(Clone)]
pub struct Device {
    platform: Platform,
    id: DeviceId,
    kind: DeviceKind,
}

impl Device {
    pub(crate) fn new(platform: Platform, id: DeviceId, kind: DeviceKind) -> Self {
        Self { platform, id, kind }
    }

    /// Driver-level identifier.
    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Device kind.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Platform the device belongs to.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Query all capability attributes.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the query fails.
    pub fn info(&self) -> Result<DeviceInfo> {
        self.platform.driver().device_info(self.id)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.platform.same_as(&other.platform)
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("platform", &self.platform.name())
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Configuration for device selection.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Preferred device kind.
    pub preferred: DeviceKind,
    /// Kind probed as a fallback.
    pub fallback: DeviceKind,
    /// Whether the fallback may replace a missing preferred device.
    pub fallback_policy: FallbackPolicy,
    /// Ordinal among devices of the preferred kind.
    pub device_index: usize,
    /// Caller name for logging (appears in warnings).
    pub label: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            preferred: DeviceKind::Gpu,
            fallback: DeviceKind::Cpu,
            fallback_policy: FallbackPolicy::Disabled,
            device_index: 0,
            label: None,
        }
    }
}

impl DeviceConfig {
    /// Create a new device configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred device kind.
    #[must_use]
    pub fn with_preferred(mut self, kind: DeviceKind) -> Self {
        self.preferred = kind;
        self
    }

    /// Set the kind probed as a fallback.
    #[must_use]
    pub fn with_fallback(mut self, kind: DeviceKind) -> Self {
        self.fallback = kind;
        self
    }

    /// Allow or forbid using the fallback device.
    #[must_use]
    pub fn with_fallback_allowed(mut self, allowed: bool) -> Self {
        self.fallback_policy = if allowed {
            FallbackPolicy::Allowed
        } else {
            FallbackPolicy::Disabled
        };
        self
    }

    /// Set the device ordinal.
    #[must_use]
    pub fn with_device_index(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }

    /// Set caller name for logging.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Build configuration from environment variables.
    ///
    /// Unparseable values are ignored and leave the default in place.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(kind) = std::env::var("ACCEL_DEVICE_TYPE")
            .ok()
            .and_then(|v| DeviceKind::parse(&v))
        {
            config.preferred = kind;
        }

        if let Some(index) = std::env::var("ACCEL_DEVICE_INDEX")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            config.device_index = index;
        }

        if let Ok(val) = std::env::var("ACCEL_ALLOW_FALLBACK") {
            if val == "1" || val.to_lowercase() == "true" {
                config.fallback_policy = FallbackPolicy::Allowed;
            }
        }

        config
    }
}

impl ValidatableConfig for DeviceConfig {
    fn validate(&self) -> Result<()> {
        if self.fallback_policy == FallbackPolicy::Allowed && self.fallback == self.preferred {
            return Err(AccelError::invalid_config(
                "fallback device kind must differ from the preferred kind",
            ));
        }
        Ok(())
    }
}

/// Select a device according to configuration.
///
/// # Errors
///
/// - [`AccelError::NoPlatform`] if the platform exposes no devices at all.
/// - [`AccelError::DeviceNotFound`] if no device of the preferred kind exists
///   at `device_index` and the fallback is disabled or also missing.
/// - [`AccelError::InvalidConfig`] if `config` fails validation.
pub fn select_device(platform: &Platform, config: &DeviceConfig) -> Result<Device> {
    config.validate()?;
    let label = config.label.as_deref().unwrap_or("accel-runtime");
    let driver = platform.driver();

    // Step 1: fallback probe. Never fatal.
    let fallback = match driver.devices(config.fallback) {
        Ok(ids) => {
            let found = ids.first().copied();
            if found.is_none() {
                tracing::debug!(kind = %config.fallback, "{label}: fallback probe found no device");
            }
            found
        }
        Err(err) => {
            tracing::debug!(kind = %config.fallback, error = %err, "{label}: fallback probe failed");
            None
        }
    };

    // Step 2: preferred lookup. Platform errors are fatal here.
    let preferred = driver.devices(config.preferred)?;
    if let Some(&id) = preferred.get(config.device_index) {
        let kind = driver.device_info(id)?.kind;
        tracing::info!(
            platform = platform.name(),
            kind = %kind,
            index = config.device_index,
            "{label}: selected preferred device"
        );
        return Ok(Device::new(platform.clone(), id, kind));
    }

    match (config.fallback_policy, fallback) {
        (FallbackPolicy::Allowed, Some(id)) => {
            let kind = driver.device_info(id)?.kind;
            let device = Device::new(platform.clone(), id, kind);
            warn_if_fallback(&device, config.preferred, label);
            Ok(device)
        }
        _ => Err(AccelError::device_not_found(config.preferred)),
    }
}

/// Emit a one-time warning when running on a fallback device.
///
/// The warning is emitted only once per process to avoid log spam.
pub fn warn_if_fallback(device: &Device, preferred: DeviceKind, label: &str) {
    static WARN_ONCE: Once = Once::new();

    if device.kind() != preferred {
        WARN_ONCE.call_once(|| {
            tracing::warn!(
                "{label}: no {preferred} device available; running on {} fallback device. \
                 Set ACCEL_ALLOW_FALLBACK=0 to make this an error.",
                device.kind()
            );
        });
    }
}
