// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! # accel-runtime
//!
//! The device-program execution lifecycle for compute accelerators: select a
//! device, create a context and command queue, build kernel source into a
//! program, move data into device buffers, dispatch a kernel over an
//! N-dimensional range, synchronize and read the results back.
//!
//! ## Design Philosophy
//!
//! **Accelerator-first, no silent fallback**: a GPU is requested by default.
//! Running on the CPU instead is an explicit opt-in that emits a warning.
//!
//! **Scoped acquisition**: every driver object is released by its owner's
//! `Drop`, children keep their parents alive, and an error at any stage
//! unwinds whatever was acquired before it.
//!
//! ## Modules
//!
//! - [`device`] - Device discovery and two-step selection
//! - [`context`] / [`queue`] - Execution contexts, command queues, `finish`
//! - [`program`] - Kernel source loading and program builds
//! - [`memory`] - Buffers, transfers and allocation tracking
//! - [`kernel`] - Argument binding and dispatch
//! - [`session`] - One-call device/context/queue setup
//! - [`backend`] - Driver seam; emulated host driver and OpenCL driver
//! - [`error`] - Stage-tagged error type
//!
//! ## Quick Start
//!
//! ```rust
//! use accel_runtime::{
//!     select_device, AccessMode, Buffer, CommandQueue, Context, DeviceConfig,
//!     Platform, Program, QueueOptions, Result, WorkShape,
//! };
//!
//! const ADD: &str = "kernel void add(global const float* a, global const float* b,\n\
//!                                    global float* c) {\n\
//!                      int i = get_global_id(0);\n\
//!                      c[i] = a[i] + b[i];\n\
//!                    }\n";
//!
//! fn main() -> Result<()> {
//!     let platform = Platform::host();
//!     let device = select_device(&platform, &DeviceConfig::default())?;
//!     let context = Context::new(&[device.clone()])?;
//!     let queue = CommandQueue::new(&context, &device, QueueOptions::default())?;
//!
//!     let program = Program::build(&context, ADD, "")?;
//!     let mut add = program.kernel("add")?;
//!
//!     let a: Vec<f32> = (0..32).map(|i| i as f32).collect();
//!     let b: Vec<f32> = (0..32).map(|i| (32 - i) as f32).collect();
//!     let a_mem = Buffer::from_slice(&queue, &a, AccessMode::ReadOnly)?;
//!     let b_mem = Buffer::from_slice(&queue, &b, AccessMode::ReadOnly)?;
//!     let c_mem = Buffer::new(&context, 32 * 4, AccessMode::ReadWrite)?;
//!
//!     add.set_arg_buffer(0, &a_mem)?;
//!     add.set_arg_buffer(1, &b_mem)?;
//!     add.set_arg_buffer(2, &c_mem)?;
//!     queue.enqueue_kernel(&add, WorkShape::D1(32), None)?;
//!     queue.finish()?;
//!
//!     let mut c = vec![0.0f32; 32];
//!     queue.read_buffer(&c_mem, &mut c)?;
//!     assert!(c.iter().all(|&x| x == 32.0));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `opencl` - Real OpenCL platforms through the `opencl3` crate
//!
//! ## Environment Variables
//!
//! - `ACCEL_BACKEND` - `host` (default) or `opencl`
//! - `ACCEL_DEVICE_TYPE`, `ACCEL_DEVICE_INDEX`, `ACCEL_ALLOW_FALLBACK` - see [`device`]
//! - `ACCEL_LOG_LEVEL` - default level for [`init_logging`]; `RUST_LOG` wins

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod context;
pub mod device;
pub mod dtype;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod program;
pub mod queue;
pub mod session;
pub mod traits;

// Re-exports for convenience
pub use backend::{BackendKind, DeviceId, Driver, Platform, ProfileEntry};
pub use context::Context;
pub use device::{select_device, warn_if_fallback, Device, DeviceConfig, DeviceInfo, DeviceKind, FallbackPolicy};
pub use dtype::{Element, ScalarType, ScalarValue};
pub use error::{AccelError, ArgBindReason, Resource, Result, SourceLoadKind, Stage};
pub use kernel::{Kernel, KernelArg, WorkShape};
pub use logging::{init_logging, log_device_info, log_memory_usage, LogConfig, LogLevel};
pub use memory::{AccessMode, Buffer, MemoryTracker, PendingRead, TransferMode};
pub use program::{load_source, KernelSource, Program};
pub use queue::{CommandQueue, QueueOptions};
pub use session::{Session, SessionConfig, SessionInfo};
pub use traits::ValidatableConfig;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
