// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! OpenCL driver built on the `opencl3` crate.
//!
//! Driver objects live in handle tables guarded by one mutex; removing an
//! entry drops the `opencl3` wrapper, which releases the OpenCL object.
//! Kernel parameter types are not introspected (that needs
//! `-cl-kernel-arg-info`), so signatures carry [`ParamKind::Opaque`] and
//! argument mistakes are reported from the OpenCL error code instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opencl3::command_queue::{
    CommandQueue, CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE, CL_QUEUE_PROFILING_ENABLE,
};
use opencl3::context::Context;
use opencl3::device::{
    Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU,
    CL_DEVICE_TYPE_GPU,
};
use opencl3::error_codes::ClError;
use opencl3::kernel::{create_program_kernels, Kernel};
use opencl3::memory::{Buffer, ClMem, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{cl_command_queue_properties, cl_device_id, CL_BLOCKING, CL_NON_BLOCKING};

use super::{ArgValue, DeviceId, Driver, KernelSignature, ParamKind, RawHandle, Staging};
use crate::device::{DeviceInfo, DeviceKind};
use crate::dtype::ScalarValue;
use crate::error::{AccelError, ArgBindReason, Resource, Result};
use crate::kernel::WorkShape;
use crate::memory::AccessMode;
use crate::queue::QueueOptions;

const CL_INVALID_MEM_OBJECT: i32 = -38;
const CL_INVALID_ARG_INDEX: i32 = -49;
const CL_INVALID_ARG_VALUE: i32 = -50;
const CL_INVALID_ARG_SIZE: i32 = -51;

struct QueueEntry {
    queue: CommandQueue,
    // Host memory referenced by non-blocking commands, held until `finish`.
    in_flight: Vec<InFlight>,
}

enum InFlight {
    Write(Vec<u8>),
    Read(Staging),
}

struct KernelEntry {
    kernel: Kernel,
    name: String,
}

#[derive(Default)]
struct ClState {
    next: u64,
    contexts: HashMap<RawHandle, Context>,
    queues: HashMap<RawHandle, QueueEntry>,
    programs: HashMap<RawHandle, Program>,
    kernels: HashMap<RawHandle, KernelEntry>,
    buffers: HashMap<RawHandle, Buffer<u8>>,
}

impl ClState {
    fn issue(&mut self) -> RawHandle {
        self.next += 1;
        RawHandle::new(self.next)
    }
}

/// Driver for one OpenCL platform.
pub struct OpenClDriver {
    name: String,
    devices: Vec<cl_device_id>,
    state: Mutex<ClState>,
}

// SAFETY: OpenCL objects are reference-counted and thread-safe in the OpenCL
// API (except clSetKernelArg, which is serialized by `state`).
// The raw ids are only dereferenced by the OpenCL runtime.
unsafe impl Send for OpenClDriver {}
unsafe impl Sync for OpenClDriver {}

impl std::fmt::Debug for OpenClDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClDriver")
            .field("name", &self.name)
            .field("devices", &self.devices.len())
            .finish_non_exhaustive()
    }
}

fn cl_message(err: ClError) -> String {
    format!("{err} (code {})", err.0)
}

impl OpenClDriver {
    /// Open the platform selected by `ACCEL_OPENCL_PLATFORM` (default 0).
    ///
    /// # Errors
    ///
    /// [`AccelError::NoPlatform`] if no OpenCL platform is installed or the
    /// index is out of range.
    pub fn new() -> Result<Self> {
        let index = std::env::var("ACCEL_OPENCL_PLATFORM")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        Self::with_platform_index(index)
    }

    /// Open the `index`-th OpenCL platform.
    ///
    /// # Errors
    ///
    /// [`AccelError::NoPlatform`] if there is no such platform.
    pub fn with_platform_index(index: usize) -> Result<Self> {
        let platforms = get_platforms().map_err(|e| {
            tracing::debug!(error = %cl_message(e), "cannot enumerate OpenCL platforms");
            AccelError::NoPlatform
        })?;
        let platform = platforms.get(index).ok_or(AccelError::NoPlatform)?;
        let name = platform.name().unwrap_or_else(|_| "OpenCL".to_string());
        let devices = platform.get_devices(CL_DEVICE_TYPE_ALL).unwrap_or_default();
        tracing::info!(platform = %name, devices = devices.len(), "opened OpenCL platform");
        Ok(Self {
            name,
            devices,
            state: Mutex::new(ClState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, ClState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn raw_device(&self, device: DeviceId) -> Result<cl_device_id> {
        usize::try_from(device.get())
            .ok()
            .and_then(|i| self.devices.get(i).copied())
            .ok_or_else(|| AccelError::invalid_config(format!("unknown {device}")))
    }

    fn kind_of(device: &Device) -> DeviceKind {
        let bits = device.dev_type().unwrap_or(0);
        if bits & CL_DEVICE_TYPE_GPU != 0 {
            DeviceKind::Gpu
        } else if bits & CL_DEVICE_TYPE_CPU != 0 {
            DeviceKind::Cpu
        } else {
            DeviceKind::Accelerator
        }
    }
}

impl Driver for OpenClDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceId>> {
        if self.devices.is_empty() {
            return Err(AccelError::NoPlatform);
        }
        let wanted = match kind {
            DeviceKind::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceKind::Cpu => CL_DEVICE_TYPE_CPU,
            DeviceKind::Accelerator => CL_DEVICE_TYPE_ACCELERATOR,
            DeviceKind::All => CL_DEVICE_TYPE_ALL,
        };
        Ok(self
            .devices
            .iter()
            .enumerate()
            .filter(|(_, &id)| Device::new(id).dev_type().unwrap_or(0) & wanted != 0)
            .map(|(i, _)| DeviceId::new(i as u64))
            .collect())
    }

    fn device_info(&self, device: DeviceId) -> Result<DeviceInfo> {
        let dev = Device::new(self.raw_device(device)?);
        let query = |e: ClError| AccelError::invalid_config(format!("device query failed: {}", cl_message(e)));
        Ok(DeviceInfo {
            kind: Self::kind_of(&dev),
            vendor: dev.vendor().map_err(query)?,
            name: dev.name().map_err(query)?,
            compute_units: dev.max_compute_units().map_err(query)?,
            clock_frequency_mhz: dev.max_clock_frequency().map_err(query)?,
            global_mem_bytes: dev.global_mem_size().map_err(query)?,
            image_support: dev.image_support().map_err(query)?,
            extensions: dev
                .extensions()
                .map_err(query)?
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            max_work_group_size: dev.max_work_group_size().map_err(query)?,
        })
    }

    fn create_context(&self, devices: &[DeviceId]) -> Result<RawHandle> {
        let ids = devices
            .iter()
            .map(|&d| self.raw_device(d))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| AccelError::resource(Resource::Context, e.to_string()))?;
        let context = Context::from_devices(&ids, &[], None, std::ptr::null_mut())
            .map_err(|e| AccelError::resource(Resource::Context, cl_message(e)))?;
        let mut state = self.state();
        let handle = state.issue();
        state.contexts.insert(handle, context);
        Ok(handle)
    }

    fn release_context(&self, context: RawHandle) {
        self.state().contexts.remove(&context);
    }

    fn create_queue(
        &self,
        context: RawHandle,
        device: DeviceId,
        options: QueueOptions,
    ) -> Result<RawHandle> {
        let raw = self
            .raw_device(device)
            .map_err(|e| AccelError::resource(Resource::Queue, e.to_string()))?;
        let mut props: cl_command_queue_properties = 0;
        if options.profiling {
            props |= CL_QUEUE_PROFILING_ENABLE;
        }
        if options.out_of_order {
            props |= CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE;
        }
        let mut state = self.state();
        let ctx = state
            .contexts
            .get(&context)
            .ok_or_else(|| AccelError::resource(Resource::Queue, "unknown context"))?;
        let queue = CommandQueue::create_command_queue_with_properties(ctx, raw, props, 0)
            .map_err(|e| AccelError::resource(Resource::Queue, cl_message(e)))?;
        let handle = state.issue();
        state.queues.insert(
            handle,
            QueueEntry {
                queue,
                in_flight: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn release_queue(&self, queue: RawHandle) {
        if let Err(err) = self.finish(queue) {
            tracing::debug!(error = %err, "discarding deferred error on queue release");
        }
        self.state().queues.remove(&queue);
    }

    fn build_program(
        &self,
        context: RawHandle,
        source: &str,
        options: &str,
    ) -> Result<(RawHandle, Vec<KernelSignature>)> {
        let mut state = self.state();
        let ctx = state
            .contexts
            .get(&context)
            .ok_or_else(|| AccelError::compile("invalid context"))?;
        let program =
            Program::create_and_build_from_source(ctx, source, options).map_err(AccelError::compile)?;
        let kernels = create_program_kernels(&program)
            .map_err(|e| AccelError::compile(format!("cannot enumerate kernels: {}", cl_message(e))))?;
        let mut signatures = Vec::with_capacity(kernels.len());
        for kernel in &kernels {
            let name = kernel
                .function_name()
                .map_err(|e| AccelError::compile(cl_message(e)))?;
            let arity = kernel
                .num_args()
                .map_err(|e| AccelError::compile(cl_message(e)))?;
            signatures.push(KernelSignature {
                name,
                params: vec![ParamKind::Opaque; arity as usize],
            });
        }
        let handle = state.issue();
        state.programs.insert(handle, program);
        Ok((handle, signatures))
    }

    fn release_program(&self, program: RawHandle) {
        self.state().programs.remove(&program);
    }

    fn create_kernel(&self, program: RawHandle, name: &str) -> Result<RawHandle> {
        let mut state = self.state();
        let prog = state
            .programs
            .get(&program)
            .ok_or_else(|| AccelError::no_such_entry_point(name))?;
        let kernel = Kernel::create(prog, name).map_err(|e| {
            tracing::debug!(kernel = name, error = %cl_message(e), "clCreateKernel failed");
            AccelError::no_such_entry_point(name)
        })?;
        let handle = state.issue();
        state.kernels.insert(
            handle,
            KernelEntry {
                kernel,
                name: name.to_string(),
            },
        );
        Ok(handle)
    }

    fn set_kernel_arg(&self, kernel: RawHandle, index: u32, value: &ArgValue) -> Result<()> {
        let state = self.state();
        let entry = state
            .kernels
            .get(&kernel)
            .ok_or_else(|| AccelError::dispatch("unknown kernel"))?;
        let k = &entry.kernel;
        // SAFETY: each arm passes a value whose size matches what OpenCL
        // copies for that argument; buffers pass their `cl_mem`.
        let result = unsafe {
            match value {
                ArgValue::Buffer(handle) => {
                    let buffer = state
                        .buffers
                        .get(handle)
                        .ok_or_else(|| AccelError::dispatch("unknown buffer"))?;
                    k.set_arg(index, &buffer.get())
                }
                ArgValue::Local(bytes) => k.set_arg_local_buffer(index, *bytes),
                ArgValue::Scalar(v) => match *v {
                    ScalarValue::I8(x) => k.set_arg(index, &x),
                    ScalarValue::U8(x) => k.set_arg(index, &x),
                    ScalarValue::I16(x) => k.set_arg(index, &x),
                    ScalarValue::U16(x) => k.set_arg(index, &x),
                    ScalarValue::I32(x) => k.set_arg(index, &x),
                    ScalarValue::U32(x) => k.set_arg(index, &x),
                    ScalarValue::I64(x) => k.set_arg(index, &x),
                    ScalarValue::U64(x) => k.set_arg(index, &x),
                    ScalarValue::F32(x) => k.set_arg(index, &x),
                    ScalarValue::F64(x) => k.set_arg(index, &x),
                },
            }
        };
        result.map_err(|e| {
            let reason = match e.0 {
                CL_INVALID_ARG_INDEX => ArgBindReason::InvalidIndex {
                    arity: k.num_args().map_or(0, |n| n as usize),
                },
                CL_INVALID_ARG_VALUE | CL_INVALID_ARG_SIZE | CL_INVALID_MEM_OBJECT => {
                    ArgBindReason::TypeMismatch {
                        expected: "declared parameter type".to_string(),
                        actual: value.to_string(),
                    }
                }
                _ => {
                    return AccelError::dispatch(format!(
                        "cannot set argument {index} of `{}`: {}",
                        entry.name,
                        cl_message(e)
                    ));
                }
            };
            AccelError::ArgBind {
                kernel: entry.name.clone(),
                index,
                reason,
            }
        })
    }

    fn release_kernel(&self, kernel: RawHandle) {
        self.state().kernels.remove(&kernel);
    }

    fn create_buffer(
        &self,
        context: RawHandle,
        size: usize,
        access: AccessMode,
    ) -> Result<RawHandle> {
        let flags = match access {
            AccessMode::ReadOnly => CL_MEM_READ_ONLY,
            AccessMode::WriteOnly => CL_MEM_WRITE_ONLY,
            AccessMode::ReadWrite => CL_MEM_READ_WRITE,
        };
        let mut state = self.state();
        let ctx = state
            .contexts
            .get(&context)
            .ok_or_else(|| AccelError::resource(Resource::Buffer, "unknown context"))?;
        // SAFETY: no host pointer is passed, so OpenCL owns the allocation.
        let buffer = unsafe { Buffer::<u8>::create(ctx, flags, size, std::ptr::null_mut()) }
            .map_err(|e| AccelError::resource(Resource::Buffer, cl_message(e)))?;
        let handle = state.issue();
        state.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn release_buffer(&self, buffer: RawHandle) {
        self.state().buffers.remove(&buffer);
    }

    fn enqueue_write(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        offset: usize,
        data: &[u8],
        blocking: bool,
    ) -> Result<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let buf = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| AccelError::transfer("unknown buffer"))?;
        let entry = state
            .queues
            .get_mut(&queue)
            .ok_or_else(|| AccelError::transfer("unknown command queue"))?;
        if blocking {
            // SAFETY: `data` outlives a blocking write.
            unsafe {
                entry
                    .queue
                    .enqueue_write_buffer(buf, CL_BLOCKING, offset, data, &[])
            }
            .map_err(|e| AccelError::transfer(cl_message(e)))?;
        } else {
            let owned = data.to_vec();
            // SAFETY: the heap block of `owned` is kept in `in_flight` until
            // the queue is finished.
            unsafe {
                entry
                    .queue
                    .enqueue_write_buffer(buf, CL_NON_BLOCKING, offset, owned.as_slice(), &[])
            }
            .map_err(|e| AccelError::transfer(cl_message(e)))?;
            entry.in_flight.push(InFlight::Write(owned));
        }
        Ok(())
    }

    fn enqueue_read(
        &self,
        queue: RawHandle,
        buffer: RawHandle,
        offset: usize,
        staging: Staging,
        blocking: bool,
    ) -> Result<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let buf = state
            .buffers
            .get(&buffer)
            .ok_or_else(|| AccelError::transfer("unknown buffer"))?;
        let entry = state
            .queues
            .get_mut(&queue)
            .ok_or_else(|| AccelError::transfer("unknown command queue"))?;
        {
            let mut dst = staging.lock().unwrap_or_else(PoisonError::into_inner);
            let flag = if blocking { CL_BLOCKING } else { CL_NON_BLOCKING };
            // SAFETY: the staging vector is never resized and, for
            // non-blocking reads, is kept alive in `in_flight` until the queue
            // is finished. Nobody reads it before then.
            unsafe {
                entry
                    .queue
                    .enqueue_read_buffer(buf, flag, offset, dst.as_mut_slice(), &[])
            }
            .map_err(|e| AccelError::transfer(cl_message(e)))?;
        }
        if !blocking {
            entry.in_flight.push(InFlight::Read(Arc::clone(&staging)));
        }
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        queue: RawHandle,
        kernel: RawHandle,
        global: WorkShape,
        local: Option<WorkShape>,
    ) -> Result<()> {
        let state = self.state();
        let entry = state
            .kernels
            .get(&kernel)
            .ok_or_else(|| AccelError::dispatch("unknown kernel"))?;
        let q = state
            .queues
            .get(&queue)
            .ok_or_else(|| AccelError::dispatch("unknown command queue"))?;
        let global_sizes = global.extents();
        let local_sizes = local.map(|l| l.extents());
        let local_ptr = local_sizes
            .as_ref()
            .map_or(std::ptr::null(), |l| l.as_ptr());
        // SAFETY: the size arrays have `work_dim` entries and outlive the call.
        unsafe {
            q.queue.enqueue_nd_range_kernel(
                entry.kernel.get(),
                global.dims(),
                std::ptr::null(),
                global_sizes.as_ptr(),
                local_ptr,
                &[],
            )
        }
        .map_err(|e| AccelError::dispatch(format!("kernel `{}`: {}", entry.name, cl_message(e))))?;
        Ok(())
    }

    fn finish(&self, queue: RawHandle) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .queues
            .get_mut(&queue)
            .ok_or_else(|| AccelError::deferred("unknown command queue"))?;
        let result = entry.queue.finish();
        entry.in_flight.clear();
        result.map_err(|e| AccelError::deferred(cl_message(e)))
    }
}
