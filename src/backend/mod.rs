// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Driver seam between the lifecycle wrappers and a concrete platform.
//!
//! The public wrappers ([`Context`](crate::Context),
//! [`CommandQueue`](crate::CommandQueue), [`Program`](crate::Program),
//! [`Kernel`](crate::Kernel), [`Buffer`](crate::Buffer)) own opaque
//! [`RawHandle`]s issued by a [`Driver`] and hand them back through
//! `release_*` exactly once, from `Drop`.
//!
//! ## Drivers
//!
//! - [`host::HostDriver`] - in-process emulated platform, always available
//! - `opencl::OpenClDriver` - real OpenCL platform (feature-gated with `opencl`)

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::{Device, DeviceInfo, DeviceKind};
use crate::dtype::{ScalarType, ScalarValue};
use crate::error::{AccelError, Result};
use crate::kernel::WorkShape;
use crate::memory::AccessMode;
use crate::queue::QueueOptions;

pub mod host;

#[cfg(feature = "opencl")]
pub mod opencl;

/// Platform-scoped device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Wrap a driver-chosen value.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Driver-chosen value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Opaque driver object handle (context, queue, program, kernel or buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(u64);

impl RawHandle {
    /// Wrap a driver-chosen value.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Driver-chosen value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Host-side landing area for a device read.
///
/// The driver fills it when the read command completes; for non-blocking
/// reads that is guaranteed only once the queue has been finished.
pub type Staging = Arc<Mutex<Vec<u8>>>;

/// Address space of a pointer parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    /// `global`
    Global,
    /// `constant`
    Constant,
    /// `local`
    Local,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "global",
            Self::Constant => "constant",
            Self::Local => "local",
        })
    }
}

/// Declared kind of a kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Pointer into an address space; `elem` is `None` for non-scalar
    /// pointees such as vector types.
    Pointer {
        /// Address space qualifier.
        space: AddressSpace,
        /// Pointee scalar type, if known.
        elem: Option<ScalarType>,
    },
    /// By-value scalar.
    Scalar(ScalarType),
    /// The driver does not expose parameter types.
    Opaque,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pointer { space, elem } => match elem {
                Some(ty) => write!(f, "{space} {ty}*"),
                None => write!(f, "{space} pointer"),
            },
            Self::Scalar(ty) => write!(f, "scalar {ty}"),
            Self::Opaque => f.write_str("unknown parameter"),
        }
    }
}

impl ParamKind {
    /// Whether `value` may be bound to a parameter of this kind.
    #[must_use]
    pub fn accepts(&self, value: &ArgValue) -> bool {
        match (self, value) {
            (Self::Opaque, _)
            | (
                Self::Pointer {
                    space: AddressSpace::Global | AddressSpace::Constant,
                    ..
                },
                ArgValue::Buffer(_),
            )
            | (
                Self::Pointer {
                    space: AddressSpace::Local,
                    ..
                },
                ArgValue::Local(_),
            ) => true,
            (Self::Scalar(ty), ArgValue::Scalar(v)) => v.scalar_type() == *ty,
            _ => false,
        }
    }
}

/// Name and parameter list of one kernel entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSignature {
    /// Entry-point name.
    pub name: String,
    /// Positional parameters.
    pub params: Vec<ParamKind>,
}

/// A value bound to a kernel parameter slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue {
    /// Device buffer.
    Buffer(RawHandle),
    /// By-value scalar.
    Scalar(ScalarValue),
    /// Size in bytes of per-work-group local memory.
    Local(usize),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(_) => f.write_str("buffer"),
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Local(bytes) => write!(f, "local memory ({bytes} bytes)"),
        }
    }
}

/// Timing of one completed command on a profiling-enabled queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    /// Command description, e.g. `write 128 bytes` or `kernel add`.
    pub command: String,
    /// Wall time the command took to execute.
    pub elapsed: Duration,
}

/// Low-level platform interface.
///
/// Every `create_*` / `build_*` call hands out a handle that the caller
/// releases exactly once with the matching `release_*`. Drivers never release
/// on their own; parents outlive children because the wrappers keep their
/// parents alive.
pub trait Driver: Send + Sync {
    /// Platform name for logging.
    fn name(&self) -> &str;

    /// Devices of `kind` in platform order.
    ///
    /// # Errors
    ///
    /// [`AccelError::NoPlatform`] when no platform exists at all. An empty
    /// vector means the platform has no device of this kind.
    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceId>>;

    /// Query device attributes.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown devices or failed queries.
    fn device_info(&self, device: DeviceId) -> Result<DeviceInfo>;

    /// Create a context spanning `devices` (non-empty).
    ///
    /// # Errors
    ///
    /// [`AccelError::ResourceCreation`] on failure.
    fn create_context(&self, devices: &[DeviceId]) -> Result<RawHandle>;

    /// Release a context.
    fn release_context(&self, context: RawHandle);

    /// Create a command queue on `device` inside `context`.
    ///
    /// # Errors
    ///
    /// [`AccelError::ResourceCreation`] on failure.
    fn create_queue(
        &self,
        context: RawHandle,
        device: DeviceId,
        options: QueueOptions,
    ) -> Result<RawHandle>;

    /// Release a command queue.
    fn release_queue(&self, queue: RawHandle);

    /// Compile and link `source`; synchronous.
    ///
    /// # Errors
    ///
    /// [`AccelError::Compile`] with the build log on failure.
    fn build_program(
        &self,
        context: RawHandle,
        source: &str,
        options: &str,
    ) -> Result<(RawHandle, Vec<KernelSignature>)>;

    /// Release a program.
    fn release_program(&self, program: RawHandle);

    /// Create a kernel object for entry point `name`.
    ///
    /// # Errors
    ///
    /// [`AccelError::NoSuchEntryPoint`] if the program has no such kernel.
    fn create_kernel(&self, program: RawHandle, name: &str) -> Result<RawHandle>;

    /// Bind one positional argument.
    ///
    /// # Errors
    ///
    /// [`AccelError::ArgBind`] on a bad index or type.
    fn set_kernel_arg(&self, kernel: RawHandle, index: u32, value: &ArgValue) -> Result<()>;

    /// Release a kernel.
    fn release_kernel(&self, kernel: RawHandle);

    /// Allocate `size` bytes of device memory.
    ///
    /// # Errors
    ///
    /// [`AccelError::ResourceCreation`] on failure.
    fn create_buffer(&self, context: RawHandle, size: usize, access: AccessMode)
        -> Result<RawHandle>;

    /// Release a buffer.
    fn release_buffer(&self, buffer: RawHandle);

    /// Copy `data` into `buffer` at `offset`.
    ///
    /// Non-blocking writes take their own copy of `data` and return before the
    /// command runs.
    ///
    /// # Errors
    ///
    /// [`AccelError::Transfer`] on failure; a blocking write also surfaces
    /// deferred failures of earlier commands.
    fn enqueue_write(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        offset: usize,
        data: &[u8],
        blocking: bool,
    ) -> Result<()>;

    /// Copy `staging.len()` bytes from `buffer` at `offset` into `staging`.
    ///
    /// # Errors
    ///
    /// [`AccelError::Transfer`] on failure; a blocking read also surfaces
    /// deferred failures of earlier commands.
    fn enqueue_read(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        offset: usize,
        staging: Staging,
        blocking: bool,
    ) -> Result<()>;

    /// Enqueue an N-dimensional kernel invocation; asynchronous.
    ///
    /// # Errors
    ///
    /// [`AccelError::Dispatch`] if the launch is rejected.
    fn enqueue_kernel(
        &self,
        queue: RawHandle,
        kernel: RawHandle,
        global: WorkShape,
        local: Option<WorkShape>,
    ) -> Result<()>;

    /// Block until all commands on `queue` have completed.
    ///
    /// # Errors
    ///
    /// [`AccelError::DeferredExecution`] if any of them failed.
    fn finish(&self, queue: RawHandle) -> Result<()>;

    /// Timings recorded on a profiling-enabled queue.
    fn profile(&self, _queue: RawHandle) -> Vec<ProfileEntry> {
        Vec::new()
    }
}

/// Which driver a [`Platform`] should be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// In-process emulated platform.
    #[default]
    Host,
    /// OpenCL platform (requires the `opencl` feature).
    OpenCl,
}

impl BackendKind {
    /// Parse the value of `ACCEL_BACKEND`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "host" | "emulated" => Some(Self::Host),
            "opencl" | "cl" => Some(Self::OpenCl),
            _ => None,
        }
    }

    /// Read `ACCEL_BACKEND`, defaulting to [`BackendKind::Host`].
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("ACCEL_BACKEND")
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

/// A compute platform: a shared handle to its [`Driver`].
#[derive(Clone)]
pub struct Platform {
    driver: Arc<dyn Driver>,
}

impl Platform {
    /// Emulated host platform with the default device set.
    #[must_use]
    pub fn host() -> Self {
        Self::from_driver(host::HostDriver::new())
    }

    /// Wrap an arbitrary driver.
    pub fn from_driver(driver: impl Driver + 'static) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// The system OpenCL platform.
    ///
    /// # Errors
    ///
    /// [`AccelError::NoPlatform`] if no OpenCL platform is installed.
    #[cfg(feature = "opencl")]
    pub fn opencl() -> Result<Self> {
        Ok(Self::from_driver(opencl::OpenClDriver::new()?))
    }

    /// Build the platform for `kind`.
    ///
    /// # Errors
    ///
    /// [`AccelError::NoPlatform`] if the backend is unavailable, including
    /// OpenCL when the crate was built without the `opencl` feature.
    pub fn from_backend(kind: BackendKind) -> Result<Self> {
        match kind {
            BackendKind::Host => Ok(Self::host()),
            #[cfg(feature = "opencl")]
            BackendKind::OpenCl => Self::opencl(),
            #[cfg(not(feature = "opencl"))]
            BackendKind::OpenCl => {
                tracing::warn!("OpenCL backend requested but the `opencl` feature is disabled");
                Err(AccelError::NoPlatform)
            }
        }
    }

    /// Platform name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Enumerate devices of `kind`.
    ///
    /// # Errors
    ///
    /// [`AccelError::NoPlatform`] if no platform exists.
    pub fn devices(&self, kind: DeviceKind) -> Result<Vec<Device>> {
        self.driver
            .devices(kind)?
            .into_iter()
            .map(|id| {
                let info = self.driver.device_info(id)?;
                Ok(Device::new(self.clone(), id, info.kind))
            })
            .collect()
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub(crate) fn same_as(&self, other: &Platform) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.driver).cast::<u8>(),
            Arc::as_ptr(&other.driver).cast::<u8>(),
        )
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("name", &self.driver.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("host"), Some(BackendKind::Host));
        assert_eq!(BackendKind::parse("OpenCL"), Some(BackendKind::OpenCl));
        assert_eq!(BackendKind::parse("vulkan"), None);
    }

    #[test]
    fn test_param_kind_display() {
        let p = ParamKind::Pointer {
            space: AddressSpace::Global,
            elem: Some(ScalarType::F32),
        };
        assert_eq!(p.to_string(), "global float*");
        assert_eq!(ParamKind::Scalar(ScalarType::I32).to_string(), "scalar int");
    }

    #[test]
    fn test_param_kind_accepts() {
        let global = ParamKind::Pointer {
            space: AddressSpace::Global,
            elem: Some(ScalarType::F32),
        };
        let local = ParamKind::Pointer {
            space: AddressSpace::Local,
            elem: None,
        };
        let buffer = ArgValue::Buffer(RawHandle::new(1));
        assert!(global.accepts(&buffer));
        assert!(!global.accepts(&ArgValue::Local(64)));
        assert!(local.accepts(&ArgValue::Local(64)));
        assert!(!local.accepts(&buffer));
        assert!(ParamKind::Scalar(ScalarType::F32).accepts(&ArgValue::Scalar(ScalarValue::F32(1.0))));
        assert!(!ParamKind::Scalar(ScalarType::F32).accepts(&ArgValue::Scalar(ScalarValue::I32(1))));
        assert!(ParamKind::Opaque.accepts(&buffer));
    }

    #[test]
    fn test_platform_identity() {
        let a = Platform::host();
        let b = a.clone();
        let c = Platform::host();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[cfg(not(feature = "opencl"))]
    #[test]
    fn test_opencl_unavailable_without_feature() {
        assert!(matches!(
            Platform::from_backend(BackendKind::OpenCl),
            Err(AccelError::NoPlatform)
        ));
    }
}
