// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! One-call setup of the front half of the pipeline.
//!
//! Most programs do the same thing first: pick a device, create a context on
//! it and open one queue. [`Session`] does exactly that from a
//! [`SessionConfig`] and then hands out the pieces; everything after setup
//! (building programs, allocating buffers, dispatching) uses the regular
//! types.
//!
//! ## Example
//!
//! ```rust
//! use accel_runtime::{AccessMode, Session, SessionConfig, WorkShape};
//!
//! let session = Session::open(SessionConfig::new())?;
//! let program = session.build_program(
//!     "kernel void calcSin(global float* data) {\n\
//!        int id = get_global_id(0);\n\
//!        data[id] = sin(data[id]);\n\
//!      }",
//! )?;
//! let mut kernel = program.kernel("calcSin")?;
//! let data = session.buffer_from(&[0.0f32; 8], AccessMode::ReadWrite)?;
//! kernel.set_arg_buffer(0, &data)?;
//! session.queue().enqueue_kernel(&kernel, WorkShape::D1(8), None)?;
//! session.queue().finish()?;
//! # Ok::<(), accel_runtime::AccelError>(())
//! ```

use std::fmt;

use crate::backend::{BackendKind, Platform};
use crate::context::Context;
use crate::device::{select_device, Device, DeviceConfig, DeviceInfo};
use crate::dtype::Element;
use crate::error::Result;
use crate::memory::{AccessMode, Buffer};
use crate::program::{KernelSource, Program};
use crate::queue::{CommandQueue, QueueOptions};
use crate::traits::ValidatableConfig;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for [`Session::open`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device selection.
    pub device: DeviceConfig,
    /// Options for the session's queue.
    pub queue: QueueOptions,
    /// Driver to open the platform with.
    pub backend: BackendKind,
    /// Log the selected device's capabilities.
    pub verbose: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::from_env(),
            queue: QueueOptions::default(),
            backend: BackendKind::from_env(),
            verbose: false,
        }
    }
}

impl SessionConfig {
    /// Defaults, honoring the `ACCEL_*` environment variables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set device selection.
    #[must_use]
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Set queue options.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueOptions) -> Self {
        self.queue = queue;
        self
    }

    /// Set the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set verbose mode.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl ValidatableConfig for SessionConfig {
    fn validate(&self) -> Result<()> {
        self.device.validate()
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A selected device with its context and queue.
pub struct Session {
    // Declared first so it is released before the context.
    queue: CommandQueue,
    context: Context,
    device: Device,
    config: SessionConfig,
}

impl Session {
    /// Open the configured backend and set up device, context and queue.
    ///
    /// # Errors
    ///
    /// Selection, context and queue errors, each tagged with its stage.
    pub fn open(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let platform = Platform::from_backend(config.backend)?;
        Self::with_platform(&platform, config)
    }

    /// Like [`Session::open`], on an existing platform.
    ///
    /// # Errors
    ///
    /// Selection, context and queue errors, each tagged with its stage.
    pub fn with_platform(platform: &Platform, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let device = select_device(platform, &config.device)?;
        let context = Context::new(std::slice::from_ref(&device))?;
        let queue = CommandQueue::new(&context, &device, config.queue)?;

        if config.verbose {
            crate::logging::log_device_info(&device.info()?);
        }
        tracing::info!(platform = platform.name(), kind = %device.kind(), "session opened");

        Ok(Self {
            queue,
            context,
            device,
            config,
        })
    }

    /// Selected device.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Session context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Session queue.
    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Configuration the session was opened with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Build a program in the session context without build options.
    ///
    /// # Errors
    ///
    /// See [`Program::build`].
    pub fn build_program(&self, source: impl Into<KernelSource>) -> Result<Program> {
        Program::build(&self.context, source, "")
    }

    /// Allocate an uninitialized buffer.
    ///
    /// # Errors
    ///
    /// See [`Buffer::new`].
    pub fn buffer(&self, size: usize, access: AccessMode) -> Result<Buffer> {
        Buffer::new(&self.context, size, access)
    }

    /// Allocate a buffer holding a copy of `data`.
    ///
    /// # Errors
    ///
    /// See [`Buffer::from_slice`].
    pub fn buffer_from<T: Element>(&self, data: &[T], access: AccessMode) -> Result<Buffer> {
        Buffer::from_slice(&self.queue, data, access)
    }

    /// Summary of the session.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the device query fails.
    pub fn info(&self) -> Result<SessionInfo> {
        Ok(SessionInfo {
            version: crate::VERSION.to_string(),
            platform: self.context.platform().name().to_string(),
            device: self.device.info()?,
            memory_limit: self.context.memory().limit_bytes(),
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Information about an open session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Crate version.
    pub version: String,
    /// Platform name.
    pub platform: String,
    /// Selected device attributes.
    pub device: DeviceInfo,
    /// Device memory budget of the context in bytes.
    pub memory_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{HostDeviceSpec, HostDriver};
    use crate::device::DeviceKind;
    use crate::error::AccelError;

    fn host_config() -> SessionConfig {
        SessionConfig {
            device: DeviceConfig::default(),
            queue: QueueOptions::default(),
            backend: BackendKind::Host,
            verbose: false,
        }
    }

    #[test]
    fn test_config_builder() {
        let config = host_config()
            .with_queue(QueueOptions::new().with_profiling(true))
            .with_verbose(true);
        assert!(config.queue.profiling);
        assert!(config.verbose);
        assert_eq!(config.backend, BackendKind::Host);
    }

    #[test]
    fn test_open_host_session() {
        let session = Session::open(host_config().with_verbose(true)).unwrap();
        assert_eq!(session.device().kind(), DeviceKind::Gpu);
        let info = session.info().unwrap();
        assert_eq!(info.version, crate::VERSION);
        assert_eq!(info.memory_limit as u64, info.device.global_mem_bytes);
    }

    #[test]
    fn test_cpu_only_platform_fails_at_selection() {
        let platform = Platform::from_driver(
            HostDriver::builder()
                .with_device(HostDeviceSpec::cpu())
                .build(),
        );
        let err = Session::with_platform(&platform, host_config()).unwrap_err();
        assert!(matches!(err, AccelError::DeviceNotFound { .. }));
        assert!(err.diagnostic().starts_with("device selection failed"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = host_config().with_device(
            DeviceConfig::new()
                .with_preferred(DeviceKind::Cpu)
                .with_fallback_allowed(true),
        );
        assert!(matches!(
            Session::open(config),
            Err(AccelError::InvalidConfig(_))
        ));
    }
}
