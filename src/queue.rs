// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Command queues and the synchronization barrier.
//!
//! A [`CommandQueue`] is an ordered, asynchronous channel to one device of a
//! [`Context`]. Transfers live in [`memory`](crate::memory), kernel launches in
//! [`kernel`](crate::kernel); both are methods on the queue.
//!
//! [`CommandQueue::finish`] is the barrier: it returns once every command
//! submitted so far has completed, and it is where failures of asynchronous
//! commands are reported.

use std::fmt;

use crate::backend::{Driver, ProfileEntry, RawHandle};
use crate::context::Context;
use crate::device::Device;
use crate::error::{AccelError, Resource, Result};

/// Queue creation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    /// Record per-command timings.
    pub profiling: bool,
    /// Allow the device to reorder independent commands.
    pub out_of_order: bool,
}

impl QueueOptions {
    /// In-order queue without profiling.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable per-command timing.
    #[must_use]
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Enable or disable out-of-order execution.
    #[must_use]
    pub fn with_out_of_order(mut self, enabled: bool) -> Self {
        self.out_of_order = enabled;
        self
    }
}

/// An ordered command channel to one device.
pub struct CommandQueue {
    context: Context,
    device: Device,
    options: QueueOptions,
    handle: RawHandle,
}

impl CommandQueue {
    /// Create a queue on `device` inside `context`.
    ///
    /// # Errors
    ///
    /// [`AccelError::ResourceCreation`] if `device` is not part of `context`
    /// or the driver refuses the queue.
    pub fn new(context: &Context, device: &Device, options: QueueOptions) -> Result<Self> {
        if !context.contains(device) {
            return Err(AccelError::resource(
                Resource::Queue,
                "device is not part of the context",
            ));
        }
        let handle = context
            .driver()
            .create_queue(context.handle(), device.id(), options)?;
        tracing::debug!(
            device = %device.id(),
            profiling = options.profiling,
            out_of_order = options.out_of_order,
            "created command queue"
        );
        Ok(Self {
            context: context.clone(),
            device: device.clone(),
            options,
            handle,
        })
    }

    /// Block until every command submitted so far has completed.
    ///
    /// Calling it on an idle queue is a no-op. A reported failure is not
    /// reported again by the next call.
    ///
    /// # Errors
    ///
    /// [`AccelError::DeferredExecution`] if an asynchronous command failed.
    pub fn finish(&self) -> Result<()> {
        tracing::trace!(device = %self.device.id(), "finish");
        self.driver().finish(self.handle)
    }

    /// Timings of completed commands (empty unless profiling is enabled).
    #[must_use]
    pub fn profile(&self) -> Vec<ProfileEntry> {
        self.driver().profile(self.handle)
    }

    /// Context the queue belongs to.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Device the queue feeds.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Options the queue was created with.
    #[must_use]
    pub fn options(&self) -> QueueOptions {
        self.options
    }

    pub(crate) fn handle(&self) -> RawHandle {
        self.handle
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.context.driver()
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        tracing::debug!(device = %self.device.id(), "releasing command queue");
        self.driver().release_queue(self.handle);
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("device", &self.device)
            .field("options", &self.options)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Platform;
    use crate::device::DeviceKind;

    #[test]
    fn test_queue_options_builder() {
        let opts = QueueOptions::new()
            .with_profiling(true)
            .with_out_of_order(true);
        assert!(opts.profiling);
        assert!(opts.out_of_order);
        assert_eq!(QueueOptions::default(), QueueOptions::new());
    }

    #[test]
    fn test_finish_on_idle_queue_is_noop() {
        let platform = Platform::host();
        let gpu = platform.devices(DeviceKind::Gpu).unwrap();
        let ctx = Context::new(&gpu).unwrap();
        let queue = CommandQueue::new(&ctx, &gpu[0], QueueOptions::default()).unwrap();
        queue.finish().unwrap();
        queue.finish().unwrap();
        assert!(queue.profile().is_empty());
    }

    #[test]
    fn test_device_outside_context_rejected() {
        let platform = Platform::host();
        let gpu = platform.devices(DeviceKind::Gpu).unwrap();
        let cpu = platform.devices(DeviceKind::Cpu).unwrap();
        let ctx = Context::new(&gpu).unwrap();
        let err = CommandQueue::new(&ctx, &cpu[0], QueueOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            AccelError::ResourceCreation {
                resource: Resource::Queue,
                ..
            }
        ));
    }
}
