// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Host implementations of kernel entry points.
//!
//! A host kernel is a closure invoked once per work item. It sees its position
//! in the N-dimensional range through [`WorkItem`] and reaches its bound
//! arguments through [`KernelArgs`], which bounds-checks every access. A
//! [`KernelFault`] aborts the launch and surfaces at the next synchronization
//! point as a deferred execution error.
//!
//! Every implementation is registered with the OpenCL C definition it stands
//! in for, so a program only runs host code that computes what its source says.

use std::sync::Arc;

use thiserror::Error;

use crate::dtype::{Element, ScalarType, ScalarValue};

/// Host implementation of a kernel.
pub type HostKernelFn =
    Arc<dyn Fn(&WorkItem, &mut KernelArgs<'_>) -> Result<(), KernelFault> + Send + Sync>;

/// A fault raised by a host kernel while executing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelFault {
    /// The kernel accessed an argument slot that does not exist.
    #[error("argument {arg} does not exist")]
    MissingArg {
        /// Argument index.
        arg: usize,
    },

    /// The argument is bound to a different kind of value.
    #[error("argument {arg} is not a {expected}")]
    ArgKind {
        /// Argument index.
        arg: usize,
        /// Kind the kernel asked for.
        expected: &'static str,
    },

    /// A scalar argument has a different type than the kernel read.
    #[error("argument {arg} is {actual}, read as {expected}")]
    ScalarType {
        /// Argument index.
        arg: usize,
        /// Type the kernel asked for.
        expected: ScalarType,
        /// Type that was bound.
        actual: ScalarType,
    },

    /// Memory access past the end of a buffer.
    #[error("out-of-bounds access to element {index} of argument {arg} ({len} elements)")]
    OutOfBounds {
        /// Argument index.
        arg: usize,
        /// Element index accessed.
        index: usize,
        /// Element count of the buffer.
        len: usize,
    },

    /// Kernel-specific failure.
    #[error("{0}")]
    Custom(String),
}

/// Position of one work item in the launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub(crate) dims: u32,
    pub(crate) global_id: [usize; 3],
    pub(crate) local_id: [usize; 3],
    pub(crate) group_id: [usize; 3],
    pub(crate) global_size: [usize; 3],
    pub(crate) local_size: [usize; 3],
}

impl WorkItem {
    /// Number of dimensions of the launch (1 to 3).
    #[must_use]
    pub fn work_dim(&self) -> u32 {
        self.dims
    }

    /// Global index along `dim`; 0 for dimensions past the launch.
    #[must_use]
    pub fn global_id(&self, dim: usize) -> usize {
        self.global_id.get(dim).copied().unwrap_or(0)
    }

    /// Index within the work-group along `dim`.
    #[must_use]
    pub fn local_id(&self, dim: usize) -> usize {
        self.local_id.get(dim).copied().unwrap_or(0)
    }

    /// Work-group index along `dim`.
    #[must_use]
    pub fn group_id(&self, dim: usize) -> usize {
        self.group_id.get(dim).copied().unwrap_or(0)
    }

    /// Global extent along `dim`; 1 for dimensions past the launch.
    #[must_use]
    pub fn global_size(&self, dim: usize) -> usize {
        self.global_size.get(dim).copied().unwrap_or(1)
    }

    /// Work-group extent along `dim`.
    #[must_use]
    pub fn local_size(&self, dim: usize) -> usize {
        self.local_size.get(dim).copied().unwrap_or(1)
    }

    /// Number of work-groups along `dim`.
    #[must_use]
    pub fn num_groups(&self, dim: usize) -> usize {
        self.global_size(dim) / self.local_size(dim)
    }
}

/// How a launch argument resolves during execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Slot {
    /// Index into the launch's working buffer set.
    Buffer(usize),
    /// Index into the work-group's local scratch set.
    Local(usize),
    Scalar(ScalarValue),
}

/// Bound arguments as seen by one work item.
pub struct KernelArgs<'a> {
    pub(crate) slots: &'a [Slot],
    pub(crate) buffers: &'a mut [Vec<u8>],
    pub(crate) locals: &'a mut [Vec<u8>],
}

impl KernelArgs<'_> {
    fn memory(&self, arg: usize) -> Result<&[u8], KernelFault> {
        match self.slots.get(arg) {
            Some(Slot::Buffer(i)) => Ok(&self.buffers[*i]),
            Some(Slot::Local(i)) => Ok(&self.locals[*i]),
            Some(Slot::Scalar(_)) => Err(KernelFault::ArgKind {
                arg,
                expected: "pointer",
            }),
            None => Err(KernelFault::MissingArg { arg }),
        }
    }

    fn memory_mut(&mut self, arg: usize) -> Result<&mut [u8], KernelFault> {
        match self.slots.get(arg) {
            Some(Slot::Buffer(i)) => Ok(&mut self.buffers[*i]),
            Some(Slot::Local(i)) => Ok(&mut self.locals[*i]),
            Some(Slot::Scalar(_)) => Err(KernelFault::ArgKind {
                arg,
                expected: "pointer",
            }),
            None => Err(KernelFault::MissingArg { arg }),
        }
    }

    /// Element count of pointer argument `arg` viewed as `T`.
    ///
    /// # Errors
    ///
    /// Faults if `arg` is missing or not a pointer.
    pub fn len<T: Element>(&self, arg: usize) -> Result<usize, KernelFault> {
        Ok(self.memory(arg)?.len() / std::mem::size_of::<T>())
    }

    /// Read element `index` of pointer argument `arg`.
    ///
    /// # Errors
    ///
    /// Faults on a missing or non-pointer argument or an out-of-bounds index.
    pub fn load<T: Element>(&self, arg: usize, index: usize) -> Result<T, KernelFault> {
        let mem = self.memory(arg)?;
        let size = std::mem::size_of::<T>();
        let len = mem.len() / size;
        if index >= len {
            return Err(KernelFault::OutOfBounds { arg, index, len });
        }
        let start = index * size;
        Ok(bytemuck::pod_read_unaligned(&mem[start..start + size]))
    }

    /// Write element `index` of pointer argument `arg`.
    ///
    /// # Errors
    ///
    /// Faults on a missing or non-pointer argument or an out-of-bounds index.
    pub fn store<T: Element>(&mut self, arg: usize, index: usize, value: T) -> Result<(), KernelFault> {
        let mem = self.memory_mut(arg)?;
        let size = std::mem::size_of::<T>();
        let len = mem.len() / size;
        if index >= len {
            return Err(KernelFault::OutOfBounds { arg, index, len });
        }
        let start = index * size;
        mem[start..start + size].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Read scalar argument `arg`.
    ///
    /// # Errors
    ///
    /// Faults on a missing or non-scalar argument or a type mismatch.
    pub fn scalar<T: Element>(&self, arg: usize) -> Result<T, KernelFault> {
        match self.slots.get(arg) {
            Some(Slot::Scalar(value)) => value.get::<T>().ok_or(KernelFault::ScalarType {
                arg,
                expected: T::SCALAR,
                actual: value.scalar_type(),
            }),
            Some(_) => Err(KernelFault::ArgKind {
                arg,
                expected: "scalar",
            }),
            None => Err(KernelFault::MissingArg { arg }),
        }
    }
}

/// Wrap a closure as a [`HostKernelFn`].
pub fn host_kernel<F>(f: F) -> HostKernelFn
where
    F: Fn(&WorkItem, &mut KernelArgs<'_>) -> Result<(), KernelFault> + Send + Sync + 'static,
{
    Arc::new(f)
}

const CALC_SIN: &str = "\
kernel void calcSin(global float* data) {
    int id = get_global_id(0);
    data[id] = sin(data[id]);
}";

const ADD: &str = "\
kernel void add(global const float* a, global const float* b, global float* c) {
    int i = get_global_id(0);
    c[i] = a[i] + b[i];
}";

const SCALE: &str = "\
kernel void scale(global float* data, float factor) {
    int i = get_global_id(0);
    data[i] = data[i] * factor;
}";

const COPY: &str = "\
kernel void copy(global const float* src, global float* dst) {
    int i = get_global_id(0);
    dst[i] = src[i];
}";

/// Entry points every host driver knows, as `(name, definition, implementation)`.
///
/// A program links against one of these only when its kernel matches the
/// definition up to parameter names, whitespace and comments.
pub(crate) fn builtins() -> Vec<(&'static str, &'static str, HostKernelFn)> {
    vec![
        (
            "calcSin",
            CALC_SIN,
            host_kernel(|item, args| {
                let i = item.global_id(0);
                let x: f32 = args.load(0, i)?;
                args.store(0, i, x.sin())
            }),
        ),
        (
            "add",
            ADD,
            host_kernel(|item, args| {
                let i = item.global_id(0);
                let sum = args.load::<f32>(0, i)? + args.load::<f32>(1, i)?;
                args.store(2, i, sum)
            }),
        ),
        (
            "scale",
            SCALE,
            host_kernel(|item, args| {
                let i = item.global_id(0);
                let factor: f32 = args.scalar(1)?;
                let x: f32 = args.load(0, i)?;
                args.store(0, i, x * factor)
            }),
        ),
        (
            "copy",
            COPY,
            host_kernel(|item, args| {
                let i = item.global_id(0);
                let x: f32 = args.load(0, i)?;
                args.store(1, i, x)
            }),
        ),
    ]
}

/// Reference definition of built-in kernel `name`.
#[must_use]
pub fn builtin_definition(name: &str) -> Option<&'static str> {
    builtins()
        .into_iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, definition, _)| definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(i: usize, n: usize) -> WorkItem {
        WorkItem {
            dims: 1,
            global_id: [i, 0, 0],
            local_id: [i, 0, 0],
            group_id: [0; 3],
            global_size: [n, 1, 1],
            local_size: [n, 1, 1],
        }
    }

    fn run(name: &str, slots: &[Slot], buffers: &mut [Vec<u8>], n: usize) -> Result<(), KernelFault> {
        let (_, _, f) = builtins()
            .into_iter()
            .find(|(k, _, _)| *k == name)
            .unwrap();
        let mut args = KernelArgs {
            slots,
            buffers,
            locals: &mut [],
        };
        for i in 0..n {
            f(&item(i, n), &mut args)?;
        }
        Ok(())
    }

    #[test]
    fn test_builtin_add() {
        let a: Vec<f32> = vec![1.0, 2.0, 3.0];
        let b: Vec<f32> = vec![10.0, 20.0, 30.0];
        let mut buffers = vec![
            bytemuck::cast_slice(&a).to_vec(),
            bytemuck::cast_slice(&b).to_vec(),
            vec![0u8; 12],
        ];
        let slots = [Slot::Buffer(0), Slot::Buffer(1), Slot::Buffer(2)];
        run("add", &slots, &mut buffers, 3).unwrap();
        let c: Vec<f32> = bytemuck::pod_collect_to_vec(&buffers[2]);
        assert_eq!(c, vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_builtin_scale_checks_scalar_type() {
        let mut buffers = vec![bytemuck::cast_slice(&[2.0f32]).to_vec()];
        let slots = [Slot::Buffer(0), Slot::Scalar(ScalarValue::F32(3.0))];
        run("scale", &slots, &mut buffers, 1).unwrap();
        assert_eq!(bytemuck::pod_collect_to_vec::<u8, f32>(&buffers[0]), vec![6.0]);

        let slots = [Slot::Buffer(0), Slot::Scalar(ScalarValue::I32(3))];
        let err = run("scale", &slots, &mut buffers, 1).unwrap_err();
        assert!(matches!(err, KernelFault::ScalarType { arg: 1, .. }));
    }

    #[test]
    fn test_out_of_bounds_faults() {
        let mut buffers = vec![vec![0u8; 8]];
        let slots = [Slot::Buffer(0)];
        let err = run("calcSin", &slots, &mut buffers, 3).unwrap_err();
        assert_eq!(
            err,
            KernelFault::OutOfBounds {
                arg: 0,
                index: 2,
                len: 2
            }
        );
    }

    #[test]
    fn test_work_item_defaults_past_launch_dims() {
        let it = item(4, 8);
        assert_eq!(it.work_dim(), 1);
        assert_eq!(it.global_id(2), 0);
        assert_eq!(it.global_size(1), 1);
        assert_eq!(it.num_groups(0), 1);
        assert_eq!(it.global_id(7), 0);
    }
}
