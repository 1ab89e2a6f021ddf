// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Device buffers, host <-> device transfers and allocation tracking.
//!
//! ## Why This Module Exists
//!
//! Device memory is limited and there is no swap to fall back on, so every
//! [`Buffer`] is budgeted against its context's [`MemoryTracker`] before the
//! driver is asked for it.
//!
//! Transfers are where asynchrony bites. A non-blocking read returns before
//! the data has arrived; reading the destination early yields stale values.
//! [`CommandQueue::enqueue_read_buffer`] therefore returns a [`PendingRead`]
//! that mutably borrows the destination until the queue has been finished.
//!
//! ## Design Decisions
//!
//! - **Whole-buffer transfers**: the host slice must match the buffer size
//!   exactly; partial copies are reported, never truncated.
//! - **Destination untouched on failure**: reads land in a staging area and
//!   are copied out only after the queue reports success.
//! - **No global state**: each context owns its tracker.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{RawHandle, Staging};
use crate::context::Context;
use crate::dtype::Element;
use crate::error::{AccelError, Resource, Result};
use crate::queue::CommandQueue;

/// Allocation budget for device memory.
///
/// Tracks allocated and peak bytes. Thread-safe via atomics.
///
/// ```rust
/// use accel_runtime::MemoryTracker;
///
/// let tracker = MemoryTracker::with_limit(1024);
/// tracker.allocate(512).expect("allocation should succeed");
/// assert!(!tracker.would_fit(1024));
/// tracker.deallocate(512);
/// assert_eq!(tracker.peak_bytes(), 512);
/// ```
#[derive(Debug)]
pub struct MemoryTracker {
    /// Currently allocated bytes.
    allocated: AtomicUsize,
    /// Peak allocation during lifetime.
    peak: AtomicUsize,
    /// Memory limit (0 = unlimited).
    limit: AtomicUsize,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    /// Create a tracker with no limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(0)
    }

    /// Create a tracker with a limit in bytes (0 = unlimited).
    #[must_use]
    pub fn with_limit(limit_bytes: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            limit: AtomicUsize::new(limit_bytes),
        }
    }

    /// Record an allocation.
    ///
    /// # Errors
    ///
    /// [`AccelError::ResourceCreation`] for [`Resource::Buffer`] if the
    /// allocation would exceed the limit. Nothing is recorded in that case.
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        let limit = self.limit.load(Ordering::SeqCst);
        let mut current = self.allocated.load(Ordering::SeqCst);
        loop {
            let new_allocated = current.checked_add(bytes).ok_or_else(|| {
                AccelError::resource(Resource::Buffer, "allocation size overflows")
            })?;
            if limit > 0 && new_allocated > limit {
                return Err(AccelError::resource(
                    Resource::Buffer,
                    format!(
                        "allocation of {bytes} bytes would exceed limit of {limit} bytes \
                         (current: {current} bytes)"
                    ),
                ));
            }
            match self.allocated.compare_exchange_weak(
                current,
                new_allocated,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(new_allocated, Ordering::SeqCst);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Record a deallocation.
    pub fn deallocate(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::SeqCst);
    }

    /// Currently allocated bytes.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Peak allocation during the tracker's lifetime.
    #[must_use]
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Configured limit (0 = unlimited).
    #[must_use]
    pub fn limit_bytes(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    /// Check whether an allocation would fit within the limit.
    #[must_use]
    pub fn would_fit(&self, bytes: usize) -> bool {
        let limit = self.limit.load(Ordering::SeqCst);
        if limit == 0 {
            return true;
        }
        self.allocated
            .load(Ordering::SeqCst)
            .checked_add(bytes)
            .is_some_and(|total| total <= limit)
    }

    /// Reset the peak to the current allocation.
    pub fn reset_peak(&self) {
        self.peak
            .store(self.allocated.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

/// How the device may access a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Kernels only read.
    ReadOnly,
    /// Kernels only write.
    WriteOnly,
    /// Kernels read and write.
    #[default]
    ReadWrite,
}

/// Whether a transfer waits for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Return once the copy has completed.
    #[default]
    Blocking,
    /// Return immediately; the copy is ordered on the queue.
    NonBlocking,
}

struct BufferInner {
    context: Context,
    handle: RawHandle,
    size: usize,
    access: AccessMode,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        tracing::trace!(size = self.size, "releasing buffer");
        self.context.driver().release_buffer(self.handle);
        self.context.memory().deallocate(self.size);
    }
}

/// A region of device memory with a fixed size.
///
/// Clones share the same device memory, which is released with the last one.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Allocate `size` bytes in `context`.
    ///
    /// # Errors
    ///
    /// [`AccelError::ResourceCreation`] for [`Resource::Buffer`] if `size` is
    /// zero, exceeds the context's memory budget, or the driver refuses.
    pub fn new(context: &Context, size: usize, access: AccessMode) -> Result<Self> {
        if size == 0 {
            return Err(AccelError::resource(
                Resource::Buffer,
                "buffer size must be non-zero",
            ));
        }
        context.memory().allocate(size)?;
        let handle = match context
            .driver()
            .create_buffer(context.handle(), size, access)
        {
            Ok(handle) => handle,
            Err(err) => {
                context.memory().deallocate(size);
                return Err(err);
            }
        };
        tracing::trace!(size, ?access, "allocated buffer");
        Ok(Self {
            inner: Arc::new(BufferInner {
                context: context.clone(),
                handle,
                size,
                access,
            }),
        })
    }

    /// Allocate a buffer sized for `data` and fill it with a blocking write.
    ///
    /// # Errors
    ///
    /// Allocation errors from [`Buffer::new`], transfer errors from
    /// [`CommandQueue::write_buffer`].
    pub fn from_slice<T: Element>(
        queue: &CommandQueue,
        data: &[T],
        access: AccessMode,
    ) -> Result<Self> {
        let buffer = Self::new(queue.context(), std::mem::size_of_val(data), access)?;
        queue.write_buffer(&buffer, data, TransferMode::Blocking)?;
        Ok(buffer)
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Number of `T` elements that fit in the buffer.
    #[must_use]
    pub fn len<T: Element>(&self) -> usize {
        self.inner.size / std::mem::size_of::<T>()
    }

    /// Device access mode.
    #[must_use]
    pub fn access(&self) -> AccessMode {
        self.inner.access
    }

    /// Context the buffer was allocated in.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub(crate) fn handle(&self) -> RawHandle {
        self.inner.handle
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.inner.size)
            .field("access", &self.inner.access)
            .field("handle", &self.inner.handle)
            .finish()
    }
}

impl CommandQueue {
    fn check_transfer(&self, buffer: &Buffer, bytes: usize) -> Result<()> {
        if !buffer.context().same_as(self.context()) {
            return Err(AccelError::transfer(
                "buffer belongs to a different context than the queue",
            ));
        }
        if bytes != buffer.size() {
            return Err(AccelError::transfer(format!(
                "host data is {bytes} bytes but the buffer is {} bytes",
                buffer.size()
            )));
        }
        Ok(())
    }

    /// Copy `data` into `buffer`.
    ///
    /// # Errors
    ///
    /// [`AccelError::Transfer`] on a size mismatch, a buffer from another
    /// context, or a driver failure. A blocking write also reports deferred
    /// failures of earlier commands.
    pub fn write_buffer<T: Element>(
        &self,
        buffer: &Buffer,
        data: &[T],
        mode: TransferMode,
    ) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.check_transfer(buffer, bytes.len())?;
        tracing::trace!(bytes = bytes.len(), ?mode, "write buffer");
        self.driver().enqueue_write(
            self.handle(),
            buffer.handle(),
            0,
            bytes,
            mode == TransferMode::Blocking,
        )
    }

    /// Copy `buffer` into `dst`, waiting for completion.
    ///
    /// # Errors
    ///
    /// Same as [`CommandQueue::write_buffer`]. `dst` is unmodified on error.
    pub fn read_buffer<T: Element>(&self, buffer: &Buffer, dst: &mut [T]) -> Result<()> {
        let bytes = std::mem::size_of_val(dst);
        self.check_transfer(buffer, bytes)?;
        let staging: Staging = Arc::new(Mutex::new(vec![0u8; bytes]));
        tracing::trace!(bytes, "read buffer");
        self.driver().enqueue_read(
            self.handle(),
            buffer.handle(),
            0,
            Arc::clone(&staging),
            true,
        )?;
        copy_out(&staging, dst);
        Ok(())
    }

    /// Start copying `buffer` into `dst` without waiting.
    ///
    /// `dst` stays borrowed until the returned [`PendingRead`] is waited on or
    /// dropped.
    ///
    /// # Errors
    ///
    /// [`AccelError::Transfer`] if the read cannot be enqueued.
    pub fn enqueue_read_buffer<'a, T: Element>(
        &'a self,
        buffer: &Buffer,
        dst: &'a mut [T],
    ) -> Result<PendingRead<'a, T>> {
        let bytes = std::mem::size_of_val(dst);
        self.check_transfer(buffer, bytes)?;
        let staging: Staging = Arc::new(Mutex::new(vec![0u8; bytes]));
        tracing::trace!(bytes, "enqueue read buffer");
        self.driver().enqueue_read(
            self.handle(),
            buffer.handle(),
            0,
            Arc::clone(&staging),
            false,
        )?;
        Ok(PendingRead {
            queue: self,
            staging,
            dst: Some(dst),
        })
    }
}

fn copy_out<T: Element>(staging: &Staging, dst: &mut [T]) {
    let data = staging.lock().unwrap_or_else(PoisonError::into_inner);
    bytemuck::cast_slice_mut::<T, u8>(dst).copy_from_slice(&data);
}

/// A non-blocking read in flight.
///
/// Holds the destination slice until [`PendingRead::wait`] finishes the queue.
/// Dropping it without waiting also finishes the queue; a failure is then
/// only logged.
#[must_use = "the destination is not filled until the read is waited on"]
pub struct PendingRead<'a, T: Element> {
    queue: &'a CommandQueue,
    staging: Staging,
    dst: Option<&'a mut [T]>,
}

impl<T: Element> PendingRead<'_, T> {
    /// Finish the queue and fill the destination.
    ///
    /// # Errors
    ///
    /// [`AccelError::DeferredExecution`] if the read or an earlier command
    /// failed; the destination is unmodified.
    pub fn wait(mut self) -> Result<()> {
        self.complete()
    }

    fn complete(&mut self) -> Result<()> {
        let Some(dst) = self.dst.take() else {
            return Ok(());
        };
        self.queue.finish()?;
        copy_out(&self.staging, dst);
        Ok(())
    }
}

impl<T: Element> Drop for PendingRead<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.complete() {
            tracing::warn!(error = %err, "pending read dropped after a failed finish");
        }
    }
}

impl<T: Element> fmt::Debug for PendingRead<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRead")
            .field("bytes", &self.dst.as_deref().map_or(0, std::mem::size_of_val))
            .field("done", &self.dst.is_none())
            .finish()
    }
}
