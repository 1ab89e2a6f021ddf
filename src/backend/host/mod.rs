// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! In-process emulated compute platform.
//!
//! The host driver behaves like an asynchronous device from the caller's point
//! of view. Non-blocking transfers and kernel launches are only *queued*; they
//! run, in submission order, when the queue reaches a synchronization point (a
//! blocking transfer or `finish`). A failing command discards the rest of the
//! queue and is reported at that point as a deferred execution error.
//!
//! ## Design Decisions
//!
//! - **Commands own their data**: a queued command keeps its buffers alive
//!   through `Arc`s, so releasing a buffer while work is pending is safe.
//! - **Launch-time argument snapshot**: rebinding arguments after enqueue does
//!   not affect launches already queued.
//! - **Sequential work items**: work-groups run one after another, each with
//!   freshly zeroed local memory. Kernels that need concurrent work items
//!   (barriers) are out of scope.
//! - **Linking by definition**: a host implementation is registered with the
//!   OpenCL C kernel it implements. A built kernel links only when its
//!   parameters and body match that definition; parameter names, whitespace
//!   and comments may differ.
//!
//! ## Example
//!
//! ```rust
//! use accel_runtime::backend::host::{host_kernel, HostDeviceSpec, HostDriver};
//! use accel_runtime::Platform;
//!
//! let driver = HostDriver::builder()
//!     .with_device(HostDeviceSpec::cpu())
//!     .with_kernel(
//!         "negate",
//!         "kernel void negate(global float* x) { int i = get_global_id(0); x[i] = -x[i]; }",
//!         host_kernel(|item, args| {
//!             let i = item.global_id(0);
//!             let x: f32 = args.load(0, i)?;
//!             args.store(0, i, -x)
//!         }),
//!     )
//!     .build();
//! let platform = Platform::from_driver(driver);
//! assert_eq!(platform.name(), "accel-runtime host");
//! ```

mod frontend;
mod kernels;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub use kernels::{
    builtin_definition, host_kernel, HostKernelFn, KernelArgs, KernelFault, WorkItem,
};

use frontend::ParsedKernel;
use kernels::Slot;

use super::{ArgValue, DeviceId, Driver, KernelSignature, ProfileEntry, RawHandle, Staging};
use crate::device::{DeviceInfo, DeviceKind};
use crate::dtype::ScalarValue;
use crate::error::{AccelError, ArgBindReason, Resource, Result};
use crate::kernel::WorkShape;
use crate::memory::AccessMode;
use crate::queue::QueueOptions;

/// Default global memory of an emulated device (256 MiB).
pub const DEFAULT_GLOBAL_MEM: u64 = 256 * 1024 * 1024;

/// Description of one emulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDeviceSpec {
    /// Reported attributes.
    pub info: DeviceInfo,
}

impl HostDeviceSpec {
    fn base(kind: DeviceKind, name: &str, compute_units: u32, clock: u32) -> Self {
        Self {
            info: DeviceInfo {
                kind,
                vendor: "accel-runtime".to_string(),
                name: name.to_string(),
                compute_units,
                clock_frequency_mhz: clock,
                global_mem_bytes: DEFAULT_GLOBAL_MEM,
                image_support: false,
                extensions: vec!["cl_khr_byte_addressable_store".to_string()],
                max_work_group_size: 256,
            },
        }
    }

    /// Emulated GPU.
    #[must_use]
    pub fn gpu() -> Self {
        Self::base(DeviceKind::Gpu, "Emulated GPU", 16, 1000)
    }

    /// Emulated CPU.
    #[must_use]
    pub fn cpu() -> Self {
        Self::base(DeviceKind::Cpu, "Emulated CPU", 4, 2400)
    }

    /// Emulated dedicated accelerator.
    #[must_use]
    pub fn accelerator() -> Self {
        Self::base(DeviceKind::Accelerator, "Emulated Accelerator", 8, 800)
    }

    /// Set the device name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    /// Set the global memory size.
    #[must_use]
    pub fn with_global_mem(mut self, bytes: u64) -> Self {
        self.info.global_mem_bytes = bytes;
        self
    }

    /// Set the largest accepted work-group size.
    #[must_use]
    pub fn with_max_work_group_size(mut self, size: usize) -> Self {
        self.info.max_work_group_size = size;
        self
    }
}

/// Builder for [`HostDriver`].
#[derive(Default)]
pub struct HostDriverBuilder {
    devices: Vec<HostDeviceSpec>,
    kernels: Vec<(String, String, HostKernelFn)>,
}

impl HostDriverBuilder {
    /// Add an emulated device. Devices are enumerated in insertion order.
    #[must_use]
    pub fn with_device(mut self, spec: HostDeviceSpec) -> Self {
        self.devices.push(spec);
        self
    }

    /// Register (or replace) the host implementation of entry point `name`.
    ///
    /// `definition` is the OpenCL C source of the kernel `kernel` implements.
    /// Programs declaring `name` link to `kernel` only if their definition
    /// matches it. An invalid definition is reported when such a program is
    /// built.
    #[must_use]
    pub fn with_kernel(
        mut self,
        name: impl Into<String>,
        definition: impl Into<String>,
        kernel: HostKernelFn,
    ) -> Self {
        self.kernels.push((name.into(), definition.into(), kernel));
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> HostDriver {
        let mut kernels: HashMap<String, HostKernel> = kernels::builtins()
            .into_iter()
            .map(|(name, definition, f)| (name.to_string(), HostKernel::new(name, definition, f)))
            .collect();
        for (name, definition, f) in self.kernels {
            let kernel = HostKernel::new(&name, &definition, f);
            kernels.insert(name, kernel);
        }
        HostDriver {
            devices: self.devices,
            kernels,
            state: Mutex::new(HostState::default()),
        }
    }
}

/// A host implementation and the kernel definition it stands in for.
struct HostKernel {
    func: HostKernelFn,
    reference: std::result::Result<ParsedKernel, String>,
}

impl HostKernel {
    fn new(name: &str, definition: &str, func: HostKernelFn) -> Self {
        let reference = frontend::parse_program(definition).and_then(|kernels| {
            kernels
                .into_iter()
                .find(|k| k.signature.name == name)
                .ok_or_else(|| format!("definition does not declare kernel `{name}`"))
        });
        Self { func, reference }
    }

    /// Why `parsed` cannot link to this implementation, if it cannot.
    fn mismatch(&self, parsed: &ParsedKernel) -> Option<String> {
        let name = &parsed.signature.name;
        match &self.reference {
            Err(err) => Some(format!(
                "host implementation of kernel `{name}` has an invalid definition: {err}"
            )),
            Ok(reference) if reference.signature.params != parsed.signature.params => {
                let expected: Vec<String> =
                    reference.signature.params.iter().map(ToString::to_string).collect();
                Some(format!(
                    "parameters of kernel `{name}` do not match its host implementation ({})",
                    expected.join(", ")
                ))
            }
            Ok(reference) if reference.body != parsed.body => Some(format!(
                "body of kernel `{name}` does not match its host implementation"
            )),
            Ok(_) => None,
        }
    }
}

/// Emulated platform driver.
pub struct HostDriver {
    devices: Vec<HostDeviceSpec>,
    kernels: HashMap<String, HostKernel>,
    state: Mutex<HostState>,
}

impl HostDriver {
    /// Driver with one emulated GPU followed by one emulated CPU.
    #[must_use]
    pub fn new() -> Self {
        Self::builder()
            .with_device(HostDeviceSpec::gpu())
            .with_device(HostDeviceSpec::cpu())
            .build()
    }

    /// Start from an empty device list and the built-in kernels.
    #[must_use]
    pub fn builder() -> HostDriverBuilder {
        HostDriverBuilder::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spec(&self, device: DeviceId) -> Result<&HostDeviceSpec> {
        usize::try_from(device.get())
            .ok()
            .and_then(|i| self.devices.get(i))
            .ok_or_else(|| AccelError::invalid_config(format!("unknown {device}")))
    }

    /// Run everything pending on `queue`, in order.
    ///
    /// Commands execute without the state lock held so kernels never block
    /// other driver calls.
    fn drain(&self, queue: RawHandle) -> Result<()> {
        let (pending, profiling) = {
            let mut state = self.state();
            let q = state.queue_mut(queue)?;
            (std::mem::take(&mut q.pending), q.options.profiling)
        };
        if pending.is_empty() {
            return Ok(());
        }

        let mut profile = Vec::new();
        let mut failure = None;
        for command in pending {
            let started = Instant::now();
            let label = command.label();
            if let Err(msg) = command.execute() {
                tracing::debug!(command = %label, error = %msg, "host command failed");
                failure = Some(format!("{label}: {msg}"));
                break;
            }
            if profiling {
                profile.push(ProfileEntry {
                    command: label,
                    elapsed: started.elapsed(),
                });
            }
        }

        if !profile.is_empty() {
            if let Ok(q) = self.state().queue_mut(queue) {
                q.profile.extend(profile);
            }
        }
        match failure {
            Some(msg) => Err(AccelError::deferred(msg)),
            None => Ok(()),
        }
    }
}

impl Default for HostDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.kernels.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HostDriver")
            .field("devices", &self.devices.len())
            .field("kernels", &names)
            .finish_non_exhaustive()
    }
}

type Storage = Arc<Mutex<Vec<u8>>>;

fn lock(storage: &Storage) -> MutexGuard<'_, Vec<u8>> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct HostState {
    next: u64,
    contexts: HashMap<RawHandle, ContextState>,
    queues: HashMap<RawHandle, QueueState>,
    programs: HashMap<RawHandle, ProgramState>,
    kernels: HashMap<RawHandle, KernelState>,
    buffers: HashMap<RawHandle, BufferState>,
}

struct ContextState {
    devices: Vec<DeviceId>,
}

struct QueueState {
    device: DeviceId,
    options: QueueOptions,
    pending: VecDeque<Command>,
    profile: Vec<ProfileEntry>,
}

struct ProgramState {
    context: RawHandle,
    signatures: Vec<KernelSignature>,
}

struct KernelState {
    context: RawHandle,
    signature: KernelSignature,
    func: HostKernelFn,
    args: Vec<Option<ArgValue>>,
}

struct BufferState {
    context: RawHandle,
    storage: Storage,
}

impl HostState {
    fn issue(&mut self) -> RawHandle {
        self.next += 1;
        RawHandle::new(self.next)
    }

    fn queue_mut(&mut self, queue: RawHandle) -> Result<&mut QueueState> {
        self.queues
            .get_mut(&queue)
            .ok_or_else(|| AccelError::invalid_config("unknown command queue"))
    }

    fn buffer(&self, buffer: RawHandle) -> Result<&BufferState> {
        self.buffers
            .get(&buffer)
            .ok_or_else(|| AccelError::transfer("unknown buffer"))
    }
}

enum BoundArg {
    Buffer(Storage),
    Local(usize),
    Scalar(ScalarValue),
}

struct Launch {
    name: String,
    func: HostKernelFn,
    args: Vec<BoundArg>,
    global: [usize; 3],
    local: [usize; 3],
    dims: u32,
}

enum Command {
    Write {
        target: Storage,
        offset: usize,
        data: Vec<u8>,
    },
    Read {
        source: Storage,
        offset: usize,
        staging: Staging,
    },
    Launch(Launch),
}

impl Command {
    fn label(&self) -> String {
        match self {
            Self::Write { data, .. } => format!("write {} bytes", data.len()),
            Self::Read { staging, .. } => format!("read {} bytes", lock(staging).len()),
            Self::Launch(launch) => format!("kernel {}", launch.name),
        }
    }

    fn execute(self) -> std::result::Result<(), String> {
        match self {
            Self::Write {
                target,
                offset,
                data,
            } => {
                lock(&target)[offset..offset + data.len()].copy_from_slice(&data);
                Ok(())
            }
            Self::Read {
                source,
                offset,
                staging,
            } => {
                let src = lock(&source);
                let mut dst = lock(&staging);
                let len = dst.len();
                dst.copy_from_slice(&src[offset..offset + len]);
                Ok(())
            }
            Self::Launch(launch) => launch.run().map_err(|fault| fault.to_string()),
        }
    }
}

impl Launch {
    fn run(self) -> std::result::Result<(), KernelFault> {
        // Working copies: each distinct buffer once, so aliased arguments see
        // each other's writes.
        let mut sources: Vec<Storage> = Vec::new();
        let mut local_sizes = Vec::new();
        let slots: Vec<Slot> = self
            .args
            .iter()
            .map(|arg| match arg {
                BoundArg::Buffer(storage) => {
                    let idx = sources
                        .iter()
                        .position(|s| Arc::ptr_eq(s, storage))
                        .unwrap_or_else(|| {
                            sources.push(Arc::clone(storage));
                            sources.len() - 1
                        });
                    Slot::Buffer(idx)
                }
                BoundArg::Local(bytes) => {
                    local_sizes.push(*bytes);
                    Slot::Local(local_sizes.len() - 1)
                }
                BoundArg::Scalar(value) => Slot::Scalar(*value),
            })
            .collect();
        let mut buffers: Vec<Vec<u8>> = sources.iter().map(|s| lock(s).clone()).collect();

        let groups = [
            self.global[0] / self.local[0],
            self.global[1] / self.local[1],
            self.global[2] / self.local[2],
        ];
        for gz in 0..groups[2] {
            for gy in 0..groups[1] {
                for gx in 0..groups[0] {
                    let mut locals: Vec<Vec<u8>> =
                        local_sizes.iter().map(|&n| vec![0u8; n]).collect();
                    let mut args = KernelArgs {
                        slots: &slots,
                        buffers: &mut buffers,
                        locals: &mut locals,
                    };
                    for lz in 0..self.local[2] {
                        for ly in 0..self.local[1] {
                            for lx in 0..self.local[0] {
                                let item = WorkItem {
                                    dims: self.dims,
                                    global_id: [
                                        gx * self.local[0] + lx,
                                        gy * self.local[1] + ly,
                                        gz * self.local[2] + lz,
                                    ],
                                    local_id: [lx, ly, lz],
                                    group_id: [gx, gy, gz],
                                    global_size: self.global,
                                    local_size: self.local,
                                };
                                (self.func)(&item, &mut args)?;
                            }
                        }
                    }
                }
            }
        }

        for (storage, data) in sources.iter().zip(buffers) {
            *lock(storage) = data;
        }
        Ok(())
    }
}

fn extents(shape: WorkShape) -> [usize; 3] {
    match shape {
        WorkShape::D1(x) => [x, 1, 1],
        WorkShape::D2(x, y) => [x, y, 1],
        WorkShape::D3(x, y, z) => [x, y, z],
    }
}

fn item_count(extents: &[usize; 3]) -> Option<usize> {
    extents
        .iter()
        .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
}

/// Largest divisor of `n` not above `limit`.
fn largest_divisor(n: usize, limit: usize) -> usize {
    (1..=n.min(limit).max(1))
        .rev()
        .find(|d| n % d == 0)
        .unwrap_or(1)
}

fn check_range(what: &str, offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(AccelError::transfer(format!(
            "{what} of {len} bytes at offset {offset} exceeds buffer of {size} bytes"
        ))),
    }
}

impl Driver for HostDriver {
    fn name(&self) -> &str {
        "accel-runtime host"
    }

    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceId>> {
        if self.devices.is_empty() {
            return Err(AccelError::NoPlatform);
        }
        Ok(self
            .devices
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.info.kind.matches(kind))
            .map(|(i, _)| DeviceId::new(i as u64))
            .collect())
    }

    fn device_info(&self, device: DeviceId) -> Result<DeviceInfo> {
        Ok(self.spec(device)?.info.clone())
    }

    fn create_context(&self, devices: &[DeviceId]) -> Result<RawHandle> {
        if devices.is_empty() {
            return Err(AccelError::resource(Resource::Context, "empty device list"));
        }
        for &id in devices {
            self.spec(id)
                .map_err(|_| AccelError::resource(Resource::Context, format!("unknown {id}")))?;
        }
        let mut state = self.state();
        let handle = state.issue();
        state.contexts.insert(
            handle,
            ContextState {
                devices: devices.to_vec(),
            },
        );
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
        let mut state = self.state();
        let ctx = state
            .contexts
            .get(&context)
            .ok_or_else(|| AccelError::resource(Resource::Queue, "unknown context"))?;
        if !ctx.devices.contains(&device) {
            return Err(AccelError::resource(
                Resource::Queue,
                format!("{device} is not part of the context"),
            ));
        }
        let handle = state.issue();
        state.queues.insert(
            handle,
            QueueState {
                device,
                options,
                pending: VecDeque::new(),
                profile: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn release_queue(&self, queue: RawHandle) {
        // Outstanding commands complete before the queue goes away.
        if let Err(err) = self.drain(queue) {
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
        if !self.state().contexts.contains_key(&context) {
            return Err(AccelError::compile("invalid context"));
        }
        frontend::check_options(options).map_err(AccelError::compile)?;
        let parsed = frontend::parse_program(source).map_err(AccelError::compile)?;

        // Link: every kernel needs a host implementation of the same definition.
        let unresolved: Vec<String> = parsed
            .iter()
            .filter_map(|k| {
                let reason = match self.kernels.get(&k.signature.name) {
                    None => Some(format!(
                        "no host implementation for kernel `{}`",
                        k.signature.name
                    )),
                    Some(host) => host.mismatch(k),
                };
                reason.map(|r| format!("<source>:{}:{}: error: {r}", k.line, k.col))
            })
            .collect();
        if !unresolved.is_empty() {
            return Err(AccelError::compile(unresolved.join("\n")));
        }

        let signatures: Vec<KernelSignature> = parsed.into_iter().map(|k| k.signature).collect();
        let mut state = self.state();
        let handle = state.issue();
        state.programs.insert(
            handle,
            ProgramState {
                context,
                signatures: signatures.clone(),
            },
        );
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
        let signature = prog
            .signatures
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| AccelError::no_such_entry_point(name))?;
        let func = self
            .kernels
            .get(name)
            .map(|k| Arc::clone(&k.func))
            .ok_or_else(|| AccelError::no_such_entry_point(name))?;
        let context = prog.context;
        let handle = state.issue();
        let args = vec![None; signature.params.len()];
        state.kernels.insert(
            handle,
            KernelState {
                context,
                signature,
                func,
                args,
            },
        );
        Ok(handle)
    }

    fn set_kernel_arg(&self, kernel: RawHandle, index: u32, value: &ArgValue) -> Result<()> {
        let mut state = self.state();
        if let ArgValue::Buffer(buffer) = value {
            if !state.buffers.contains_key(buffer) {
                return Err(AccelError::dispatch("unknown buffer"));
            }
        }
        let k = state
            .kernels
            .get_mut(&kernel)
            .ok_or_else(|| AccelError::dispatch("unknown kernel"))?;
        let arity = k.signature.params.len();
        let bind_err = |reason| AccelError::ArgBind {
            kernel: k.signature.name.clone(),
            index,
            reason,
        };
        let Some(&param) = k.signature.params.get(index as usize) else {
            return Err(bind_err(ArgBindReason::InvalidIndex { arity }));
        };
        if !param.accepts(value) {
            return Err(bind_err(ArgBindReason::TypeMismatch {
                expected: param.to_string(),
                actual: value.to_string(),
            }));
        }
        k.args[index as usize] = Some(*value);
        Ok(())
    }

    fn release_kernel(&self, kernel: RawHandle) {
        self.state().kernels.remove(&kernel);
    }

    fn create_buffer(
        &self,
        context: RawHandle,
        size: usize,
        _access: AccessMode,
    ) -> Result<RawHandle> {
        let mut state = self.state();
        if !state.contexts.contains_key(&context) {
            return Err(AccelError::resource(Resource::Buffer, "unknown context"));
        }
        let handle = state.issue();
        state.buffers.insert(
            handle,
            BufferState {
                context,
                storage: Arc::new(Mutex::new(vec![0u8; size])),
            },
        );
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
        {
            let mut state = self.state();
            let target = state.buffer(buffer)?;
            let size = lock(&target.storage).len();
            check_range("write", offset, data.len(), size)?;
            let command = Command::Write {
                target: Arc::clone(&target.storage),
                offset,
                data: data.to_vec(),
            };
            state.queue_mut(queue)?.pending.push_back(command);
        }
        if blocking {
            self.drain(queue)?;
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
        {
            let mut state = self.state();
            let source = state.buffer(buffer)?;
            let size = lock(&source.storage).len();
            check_range("read", offset, lock(&staging).len(), size)?;
            let command = Command::Read {
                source: Arc::clone(&source.storage),
                offset,
                staging,
            };
            state.queue_mut(queue)?.pending.push_back(command);
        }
        if blocking {
            self.drain(queue)?;
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
        let mut state = self.state();
        let device = state.queue_mut(queue)?.device;
        let max_group = self.spec(device)?.info.max_work_group_size;

        let k = state
            .kernels
            .get(&kernel)
            .ok_or_else(|| AccelError::dispatch("unknown kernel"))?;
        let name = k.signature.name.clone();

        let global_ext = extents(global);
        let local_ext = match local {
            Some(shape) => {
                if shape.dims() != global.dims() {
                    return Err(AccelError::dispatch(format!(
                        "kernel `{name}`: local work size has {} dimensions, global has {}",
                        shape.dims(),
                        global.dims()
                    )));
                }
                extents(shape)
            }
            None => [largest_divisor(global_ext[0], max_group), 1, 1],
        };
        if global_ext.contains(&0) || local_ext.contains(&0) {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}`: work size extents must be non-zero"
            )));
        }
        if global_ext.iter().zip(&local_ext).any(|(g, l)| g % l != 0) {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}`: local work size {local_ext:?} does not divide global work size {global_ext:?}"
            )));
        }
        let Some(group) = item_count(&local_ext) else {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}`: work-group size {local_ext:?} overflows the item count"
            )));
        };
        if item_count(&global_ext).is_none() {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}`: global work size {global_ext:?} overflows the item count"
            )));
        }
        if group > max_group {
            return Err(AccelError::dispatch(format!(
                "kernel `{name}`: work-group of {group} items exceeds device limit {max_group}"
            )));
        }

        let mut args = Vec::with_capacity(k.args.len());
        for (index, arg) in k.args.iter().enumerate() {
            let bound = match arg {
                None => {
                    return Err(AccelError::dispatch(format!(
                        "kernel `{name}`: argument {index} is not set"
                    )));
                }
                Some(ArgValue::Buffer(handle)) => {
                    let buf = state.buffers.get(handle).ok_or_else(|| {
                        AccelError::dispatch(format!(
                            "kernel `{name}`: argument {index} refers to a released buffer"
                        ))
                    })?;
                    if buf.context != k.context {
                        return Err(AccelError::dispatch(format!(
                            "kernel `{name}`: argument {index} belongs to another context"
                        )));
                    }
                    BoundArg::Buffer(Arc::clone(&buf.storage))
                }
                Some(ArgValue::Local(bytes)) => BoundArg::Local(*bytes),
                Some(ArgValue::Scalar(value)) => BoundArg::Scalar(*value),
            };
            args.push(bound);
        }

        let launch = Launch {
            name,
            func: Arc::clone(&k.func),
            args,
            global: global_ext,
            local: local_ext,
            dims: global.dims(),
        };
        state.queue_mut(queue)?.pending.push_back(Command::Launch(launch));
        Ok(())
    }

    fn finish(&self, queue: RawHandle) -> Result<()> {
        self.drain(queue)
    }

    fn profile(&self, queue: RawHandle) -> Vec<ProfileEntry> {
        self.state()
            .queues
            .get(&queue)
            .map(|q| q.profile.clone())
            .unwrap_or_default()
    }
}
