// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Execution contexts.
//!
//! A [`Context`] groups one or more devices of a single platform and owns
//! everything created inside it: queues, programs and buffers hold a clone of
//! their context, so the driver context is released only after the last of
//! them is gone.

use std::fmt;
use std::sync::Arc;

use crate::backend::{Driver, Platform, RawHandle};
use crate::device::Device;
use crate::error::{AccelError, Resource, Result};
use crate::memory::MemoryTracker;

struct ContextInner {
    platform: Platform,
    handle: RawHandle,
    devices: Vec<Device>,
    tracker: MemoryTracker,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        tracing::debug!(
            platform = self.platform.name(),
            allocated = self.tracker.allocated_bytes(),
            peak = self.tracker.peak_bytes(),
            "releasing context"
        );
        self.platform.driver().release_context(self.handle);
    }
}

/// Shared handle to a driver context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a context spanning `devices`.
    ///
    /// Device memory allocated in the context is budgeted against the smallest
    /// global memory size among the devices.
    ///
    /// # Errors
    ///
    /// [`AccelError::ResourceCreation`] if `devices` is empty, spans several
    /// platforms, or the driver refuses the context.
    pub fn new(devices: &[Device]) -> Result<Self> {
        let Some(first) = devices.first() else {
            return Err(AccelError::resource(
                Resource::Context,
                "no devices given",
            ));
        };
        let platform = first.platform().clone();
        if devices.iter().any(|d| !d.platform().same_as(&platform)) {
            return Err(AccelError::resource(
                Resource::Context,
                "devices belong to different platforms",
            ));
        }

        let mut limit = u64::MAX;
        for device in devices {
            limit = limit.min(device.info()?.global_mem_bytes);
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let ids: Vec<_> = devices.iter().map(Device::id).collect();
        let handle = platform.driver().create_context(&ids)?;
        tracing::debug!(
            platform = platform.name(),
            devices = devices.len(),
            memory_limit = limit,
            "created context"
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                platform,
                handle,
                devices: devices.to_vec(),
                tracker: MemoryTracker::with_limit(limit),
            }),
        })
    }

    /// Devices in this context.
    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.inner.devices
    }

    /// Whether `device` is part of this context.
    #[must_use]
    pub fn contains(&self, device: &Device) -> bool {
        self.inner.devices.iter().any(|d| d == device)
    }

    /// Platform of this context.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    /// Device memory budget of this context.
    #[must_use]
    pub fn memory(&self) -> &MemoryTracker {
        &self.inner.tracker
    }

    /// Whether both handles refer to the same driver context.
    #[must_use]
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn handle(&self) -> RawHandle {
        self.inner.handle
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.inner.platform.driver()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("platform", &self.inner.platform.name())
            .field("devices", &self.inner.devices)
            .field("handle", &self.inner.handle)
            .finish()
    }
}
