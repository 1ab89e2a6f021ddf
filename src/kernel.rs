// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Kernel argument binding and N-dimensional dispatch.
//!
//! A [`Kernel`] is a named entry point of a built [`Program`]. Its positional
//! arguments are bound with [`Kernel::set_arg`] and must all be bound before
//! [`CommandQueue::enqueue_kernel`] accepts it. Launches are asynchronous:
//! results are only visible after the queue has been finished (or a blocking
//! read has been issued behind the launch).
//!
//! ## Example
//!
//! ```rust
//! use accel_runtime::{
//!     AccessMode, Buffer, CommandQueue, Context, DeviceConfig, Program,
//!     QueueOptions, WorkShape, select_device, Platform,
//! };
//!
//! let platform = Platform::host();
//! let device = select_device(&platform, &DeviceConfig::default())?;
//! let ctx = Context::new(&[device.clone()])?;
//! let queue = CommandQueue::new(&ctx, &device, QueueOptions::default())?;
//!
//! let program = Program::build(
//!     &ctx,
//!     "kernel void scale(global float* data, float factor) {\n\
//!        int i = get_global_id(0);\n\
//!        data[i] = data[i] * factor;\n\
//!      }",
//!     "",
//! )?;
//! let mut kernel = program.kernel("scale")?;
//! let data = Buffer::from_slice(&queue, &[1.0f32, 2.0, 3.0], AccessMode::ReadWrite)?;
//! kernel.set_arg_buffer(0, &data)?;
//! kernel.set_arg_scalar(1, 2.0f32)?;
//! queue.enqueue_kernel(&kernel, WorkShape::D1(3), None)?;
//! queue.finish()?;
//!
//! let mut out = [0.0f32; 3];
//! queue.read_buffer(&data, &mut out)?;
//! assert_eq!(out, [2.0, 4.0, 6.0]);
//! # Ok::<(), accel_runtime::AccelError>(())
//! ```

use std::fmt;

use crate::backend::{ArgValue, KernelSignature, ParamKind, RawHandle};
use crate::dtype::ScalarValue;
use crate::error::{AccelError, ArgBindReason, Result};
use crate::memory::Buffer;
use crate::program::Program;
use crate::queue::CommandQueue;

/// Extent of an N-dimensional launch (1 to 3 dimensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkShape {
    /// One dimension.
    D1(usize),
    /// Two dimensions.
    D2(usize, usize),
    /// Three dimensions.
    D3(usize, usize, usize),
}

impl WorkShape {
    /// Number of dimensions.
    #[must_use]
    pub fn dims(&self) -> u32 {
        match self {
            Self::D1(..) => 1,
            Self::D2(..) => 2,
            Self::D3(..) => 3,
        }
    }

    /// Extents as a slice-friendly vector, one entry per dimension.
    #[must_use]
    pub fn extents(&self) -> Vec<usize> {
        match *self {
            Self::D1(x) => vec![x],
            Self::D2(x, y) => vec![x, y],
            Self::D3(x, y, z) => vec![x, y, z],
        }
    }

    /// Total number of work items, or `None` if it does not fit in `usize`.
    #[must_use]
    pub fn total(&self) -> Option<usize> {
        self.extents()
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
    }

    /// Check that every extent is non-zero and the item count is representable.
    ///
    /// # Errors
    ///
    /// [`AccelError::Dispatch`] naming the first zero extent, or reporting
    /// an overflowing total.
    pub fn validate(&self) -> Result<usize> {
        if let Some(dim) = self.extents().iter().position(|&e| e == 0) {
            return Err(AccelError::dispatch(format!(
                "work size is zero in dimension {dim}"
            )));
        }
        self.total().ok_or_else(|| {
            AccelError::dispatch(format!("work size {self} overflows the item count"))
        })
    }
}

impl From<usize> for WorkShape {
    fn from(x: usize) -> Self {
        Self::D1(x)
    }
}

impl From<[usize; 2]> for WorkShape {
    fn from([x, y]: [usize; 2]) -> Self {
        Self::D2(x, y)
    }
}

impl From<[usize; 3]> for WorkShape {
    fn from([x, y, z]: [usize; 3]) -> Self {
        Self::D3(x, y, z)
    }
}

impl fmt::Display for WorkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::D1(x) => write!(f, "{x}"),
            Self::D2(x, y) => write!(f, "{x}x{y}"),
            Self::D3(x, y, z) => write!(f, "{x}x{y}x{z}"),
        }
    }
}

/// A value for one kernel argument.
#[derive(Debug, Clone, Copy)]
pub enum KernelArg<'a> {
    /// Device buffer (`global` or `constant` pointer).
    Buffer(&'a Buffer),
    /// By-value scalar.
    Scalar(ScalarValue),
    /// Bytes of per-work-group `local` memory.
    Local(usize),
}

enum Binding {
    Buffer(Buffer),
    Value,
}

/// A kernel entry point with its argument bindings.
pub struct Kernel {
    program: Program,
    signature: KernelSignature,
    handle: RawHandle,
    bindings: Vec<Option<Binding>>,
}

impl Kernel {
    pub(crate) fn new(program: Program, signature: KernelSignature, handle: RawHandle) -> Self {
        let bindings = signature.params.iter().map(|_| None).collect();
        Self {
            program,
            signature,
            handle,
            bindings,
        }
    }

    /// Entry-point name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Number of positional arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.signature.params.len()
    }

    /// Declared parameter kinds.
    #[must_use]
    pub fn params(&self) -> &[ParamKind] {
        &self.signature.params
    }

    /// Program this kernel was extracted from.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Index of the first argument that has not been bound.
    #[must_use]
    pub fn first_unbound(&self) -> Option<usize> {
        self.bindings.iter().position(Option::is_none)
    }

    /// Bind argument `index`.
    ///
    /// A bound buffer is kept alive by the kernel until it is rebound or the
    /// kernel is dropped.
    ///
    /// # Errors
    ///
    /// [`AccelError::ArgBind`] if `index` is past the parameter list, the
    /// value does not match the declared parameter, or the buffer belongs to
    /// another context.
    pub fn set_arg(&mut self, index: u32, arg: KernelArg<'_>) -> Result<()> {
        let slot = index as usize;
        let arity = self.arity();
        let Some(&param) = self.signature.params.get(slot) else {
            return Err(self.bind_error(index, ArgBindReason::InvalidIndex { arity }));
        };

        let value = match arg {
            KernelArg::Buffer(buffer) => {
                if !buffer.context().same_as(self.program.context()) {
                    return Err(self.bind_error(
                        index,
                        ArgBindReason::TypeMismatch {
                            expected: format!("{param} from the kernel's context"),
                            actual: "buffer from another context".to_string(),
                        },
                    ));
                }
                ArgValue::Buffer(buffer.handle())
            }
            KernelArg::Scalar(value) => ArgValue::Scalar(value),
            KernelArg::Local(bytes) => ArgValue::Local(bytes),
        };
        if !param.accepts(&value) {
            return Err(self.bind_error(
                index,
                ArgBindReason::TypeMismatch {
                    expected: param.to_string(),
                    actual: value.to_string(),
                },
            ));
        }

        self.program
            .context()
            .driver()
            .set_kernel_arg(self.handle, index, &value)?;
        tracing::trace!(kernel = %self.signature.name, index, arg = %value, "bound argument");
        self.bindings[slot] = Some(match arg {
            KernelArg::Buffer(buffer) => Binding::Buffer(buffer.clone()),
            KernelArg::Scalar(_) | KernelArg::Local(_) => Binding::Value,
        });
        Ok(())
    }

    /// Bind a buffer to argument `index`.
    ///
    /// # Errors
    ///
    /// See [`Kernel::set_arg`].
    pub fn set_arg_buffer(&mut self, index: u32, buffer: &Buffer) -> Result<()> {
        self.set_arg(index, KernelArg::Buffer(buffer))
    }

    /// Bind a scalar to argument `index`.
    ///
    /// # Errors
    ///
    /// See [`Kernel::set_arg`].
    pub fn set_arg_scalar(&mut self, index: u32, value: impl Into<ScalarValue>) -> Result<()> {
        self.set_arg(index, KernelArg::Scalar(value.into()))
    }

    /// Reserve `bytes` of local memory for argument `index`.
    ///
    /// # Errors
    ///
    /// See [`Kernel::set_arg`].
    pub fn set_arg_local(&mut self, index: u32, bytes: usize) -> Result<()> {
        self.set_arg(index, KernelArg::Local(bytes))
    }

    fn bind_error(&self, index: u32, reason: ArgBindReason) -> AccelError {
        AccelError::ArgBind {
            kernel: self.signature.name.clone(),
            index,
            reason,
        }
    }

    /// Buffers currently bound, by argument index.
    pub(crate) fn bound_buffers(&self) -> impl Iterator<Item = (usize, &Buffer)> {
        self.bindings
            .iter()
            .enumerate()
            .filter_map(|(i, b)| match b {
                Some(Binding::Buffer(buffer)) => Some((i, buffer)),
                _ => None,
            })
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        tracing::trace!(kernel = %self.signature.name, "releasing kernel");
        self.program.context().driver().release_kernel(self.handle);
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.signature.name)
            .field("params", &self.signature.params)
            .field("first_unbound", &self.first_unbound())
            .finish_non_exhaustive()
    }
}

impl CommandQueue {
    /// Enqueue an invocation of `kernel` over `global` work items.
    ///
    /// `local` fixes the work-group shape; `None` lets the driver choose.
    /// Returns as soon as the launch is queued.
    ///
    /// # Errors
    ///
    /// [`AccelError::Dispatch`] if an argument is unbound, the kernel or one
    /// of its buffers belongs to another context, an extent is zero, an item
    /// count overflows, or the local shape does not match or divide the
    /// global shape.
    pub fn enqueue_kernel(
        &self,
        kernel: &Kernel,
        global: WorkShape,
        local: Option<WorkShape>,
    ) -> Result<()> {
        let name = kernel.name();
        if !kernel.program().context().same_as(self.context()) {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}` belongs to a different context than the queue"
            )));
        }
        if let Some(index) = kernel.first_unbound() {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}`: argument {index} is not set"
            )));
        }
        if let Some((index, _)) = kernel
            .bound_buffers()
            .find(|(_, b)| !b.context().same_as(self.context()))
        {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}`: argument {index} belongs to another context"
            )));
        }
        let items = global.validate()?;
        if let Some(local) = local {
            local.validate()?;
            if local.dims() != global.dims() {
                return Err(AccelError::dispatch(format!(
                    "kernel `{name}`: local work size {local} does not match the \
                     dimensionality of global work size {global}"
                )));
            }
            let divides = global
                .extents()
                .iter()
                .zip(local.extents())
                .all(|(g, l)| g % l == 0);
            if !divides {
                return Err(AccelError::dispatch(format!(
                    "kernel `{name}`: local work size {local} does not divide global work size {global}"
                )));
            }
        }

        tracing::debug!(kernel = name, %global, items, "enqueue kernel");
        self.driver()
            .enqueue_kernel(self.handle(), kernel.handle, global, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Platform;
    use crate::context::Context;
    use crate::device::DeviceKind;
    use crate::memory::AccessMode;
    use crate::queue::QueueOptions;

    const ADD: &str = "kernel void add(global const float* a, global const float* b, \
                       global float* c) {\n  int i = get_global_id(0);\n  c[i] = a[i] + b[i];\n}\n";

    fn setup() -> (CommandQueue, Kernel) {
        let gpu = Platform::host().devices(DeviceKind::Gpu).unwrap();
        let ctx = Context::new(&gpu).unwrap();
        let queue = CommandQueue::new(&ctx, &gpu[0], QueueOptions::default()).unwrap();
        let kernel = Program::build(&ctx, ADD, "").unwrap().kernel("add").unwrap();
        (queue, kernel)
    }

    #[test]
    fn test_work_shape() {
        assert_eq!(WorkShape::D1(32).dims(), 1);
        assert_eq!(WorkShape::D3(2, 3, 4).total(), Some(24));
        assert_eq!(WorkShape::D3(1 << 22, 1 << 22, 1 << 22).total(), None);
        assert_eq!(WorkShape::from([8, 4]), WorkShape::D2(8, 4));
        assert_eq!(WorkShape::D2(8, 4).to_string(), "8x4");
        assert!(WorkShape::D2(8, 0).validate().is_err());
        assert_eq!(WorkShape::D1(1).validate().unwrap(), 1);
    }

    #[test]
    fn test_invalid_index() {
        let (_queue, mut kernel) = setup();
        let err = kernel.set_arg_scalar(3, 1.0f32).unwrap_err();
        assert!(matches!(
            err,
            AccelError::ArgBind {
                index: 3,
                reason: ArgBindReason::InvalidIndex { arity: 3 },
                ..
            }
        ));
    }

    #[test]
    fn test_scalar_for_buffer_is_type_mismatch() {
        let (_queue, mut kernel) = setup();
        let err = kernel.set_arg_scalar(0, 1.0f32).unwrap_err();
        assert!(matches!(
            err,
            AccelError::ArgBind {
                reason: ArgBindReason::TypeMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_unbound_argument_rejected_at_dispatch() {
        let (queue, mut kernel) = setup();
        let buf = Buffer::new(queue.context(), 16, AccessMode::ReadWrite).unwrap();
        kernel.set_arg_buffer(0, &buf).unwrap();
        kernel.set_arg_buffer(1, &buf).unwrap();
        assert_eq!(kernel.first_unbound(), Some(2));

        let err = queue
            .enqueue_kernel(&kernel, WorkShape::D1(4), None)
            .unwrap_err();
        assert!(matches!(err, AccelError::Dispatch { .. }));
        assert!(err.to_string().contains("argument 2"));
    }

    #[test]
    fn test_local_shape_checks() {
        let (queue, mut kernel) = setup();
        let buf = Buffer::new(queue.context(), 64, AccessMode::ReadWrite).unwrap();
        for i in 0..3 {
            kernel.set_arg_buffer(i, &buf).unwrap();
        }
        assert!(queue
            .enqueue_kernel(&kernel, WorkShape::D1(16), Some(WorkShape::D2(4, 1)))
            .is_err());
        assert!(queue
            .enqueue_kernel(&kernel, WorkShape::D1(16), Some(WorkShape::D1(5)))
            .is_err());
        assert!(queue
            .enqueue_kernel(&kernel, WorkShape::D1(0), None)
            .is_err());
        let huge = WorkShape::D3(1 << 22, 1 << 22, 1 << 22);
        let err = queue.enqueue_kernel(&kernel, huge, Some(huge)).unwrap_err();
        assert!(matches!(err, AccelError::Dispatch { .. }));
        assert!(err.to_string().contains("overflows"));
        queue
            .enqueue_kernel(&kernel, WorkShape::D1(16), Some(WorkShape::D1(4)))
            .unwrap();
        queue.finish().unwrap();
    }

    #[test]
    fn test_kernel_keeps_buffer_alive() {
        let (queue, mut kernel) = setup();
        let buf = Buffer::new(queue.context(), 16, AccessMode::ReadWrite).unwrap();
        kernel.set_arg_buffer(0, &buf).unwrap();
        drop(buf);
        assert_eq!(queue.context().memory().allocated_bytes(), 16);
        drop(kernel);
        assert_eq!(queue.context().memory().allocated_bytes(), 0);
    }
}
