// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Integration tests for accel-runtime.
//!
//! These tests drive the whole pipeline through the public API: selection,
//! context and queue, program build, buffers, dispatch and synchronization.

#![allow(clippy::cast_precision_loss)] // small test indices converted to f32

use std::io::Write as _;

use accel_runtime::backend::host::{host_kernel, HostDeviceSpec, HostDriver, KernelFault};
use accel_runtime::{
    load_source, select_device, AccelError, AccessMode, ArgBindReason, BackendKind, Buffer,
    CommandQueue, Context, Device, DeviceConfig, DeviceKind, Kernel, KernelSource, Platform, Program,
    QueueOptions, Resource, Session, SessionConfig, SourceLoadKind, Stage, TransferMode,
    ValidatableConfig, WorkShape,
};
use proptest::prelude::*;

const CALC_SIN: &str = "\
kernel void calcSin(global float* data) {
    int id = get_global_id(0);
    data[id] = sin(data[id]);
}
";

const ADD: &str = "\
kernel void add(global const float* a,
                global const float* b,
                global float* c) {
    int i = get_global_id(0);
    c[i] = a[i] + b[i];
}
";

const SCALE: &str = "\
kernel void scale(global float* data, float factor) {
    int i = get_global_id(0);
    data[i] = data[i] * factor;
}
";

struct Pipeline {
    device: Device,
    context: Context,
    queue: CommandQueue,
}

fn pipeline_on(platform: &Platform) -> Pipeline {
    let device = select_device(platform, &DeviceConfig::default()).expect("GPU available");
    let context = Context::new(std::slice::from_ref(&device)).expect("context");
    let queue = CommandQueue::new(&context, &device, QueueOptions::default()).expect("queue");
    Pipeline {
        device,
        context,
        queue,
    }
}

fn pipeline() -> Pipeline {
    pipeline_on(&Platform::host())
}

fn run_add(p: &Pipeline, a: &[f32], b: &[f32]) -> accel_runtime::Result<Vec<f32>> {
    let program = Program::build(&p.context, ADD, "")?;
    let mut add = program.kernel("add")?;
    let a_mem = Buffer::from_slice(&p.queue, a, AccessMode::ReadOnly)?;
    let b_mem = Buffer::from_slice(&p.queue, b, AccessMode::ReadOnly)?;
    let c_mem = Buffer::new(&p.context, std::mem::size_of_val(a), AccessMode::WriteOnly)?;
    add.set_arg_buffer(0, &a_mem)?;
    add.set_arg_buffer(1, &b_mem)?;
    add.set_arg_buffer(2, &c_mem)?;
    p.queue.enqueue_kernel(&add, WorkShape::D1(a.len()), None)?;
    p.queue.finish()?;
    let mut c = vec![0.0f32; a.len()];
    p.queue.read_buffer(&c_mem, &mut c)?;
    Ok(c)
}

// ============================================================================
// End-to-End Pipelines
// ============================================================================

#[test]
fn test_calc_sin_in_place() {
    let p = pipeline();
    let input: Vec<f32> = (0..32).map(|i| i as f32).collect();

    let program = Program::build(&p.context, CALC_SIN, "").unwrap();
    let mut kernel = program.kernel("calcSin").unwrap();
    let data = Buffer::from_slice(&p.queue, &input, AccessMode::ReadWrite).unwrap();
    kernel.set_arg_buffer(0, &data).unwrap();
    p.queue
        .enqueue_kernel(&kernel, WorkShape::D1(input.len()), None)
        .unwrap();
    p.queue.finish().unwrap();

    let mut output = vec![0.0f32; input.len()];
    p.queue.read_buffer(&data, &mut output).unwrap();
    for (i, (x, y)) in input.iter().zip(&output).enumerate() {
        assert!((x.sin() - y).abs() < 1e-5, "element {i}: {y} != sin({x})");
    }
}

#[test]
fn test_vector_add_sums_to_n() {
    let p = pipeline();
    let a: Vec<f32> = (0..32).map(|i| i as f32).collect();
    let b: Vec<f32> = (0..32).map(|i| (32 - i) as f32).collect();
    let c = run_add(&p, &a, &b).unwrap();
    assert_eq!(c.len(), 32);
    assert!(c.iter().all(|&x| (x - 32.0).abs() < f32::EPSILON));
}

#[test]
fn test_explicit_local_size() {
    let p = pipeline();
    let program = Program::build(&p.context, SCALE, "").unwrap();
    let mut kernel = program.kernel("scale").unwrap();
    let data = Buffer::from_slice(&p.queue, &[1.0f32; 64], AccessMode::ReadWrite).unwrap();
    kernel.set_arg_buffer(0, &data).unwrap();
    kernel.set_arg_scalar(1, 2.5f32).unwrap();
    p.queue
        .enqueue_kernel(&kernel, WorkShape::D1(64), Some(WorkShape::D1(16)))
        .unwrap();
    let mut out = vec![0.0f32; 64];
    p.queue.read_buffer(&data, &mut out).unwrap();
    assert!(out.iter().all(|&x| (x - 2.5).abs() < f32::EPSILON));
}

const INDEX2D: &str = "\
kernel void index2d(global uint* out) {
    int x = get_global_id(0);
    int y = get_global_id(1);
    out[y * get_global_size(0) + x] = y * 100 + x;
}
";

#[test]
fn test_two_dimensional_range() {
    let driver = HostDriver::builder()
        .with_device(HostDeviceSpec::gpu())
        .with_kernel(
            "index2d",
            INDEX2D,
            host_kernel(|item, args| {
                let (x, y) = (item.global_id(0), item.global_id(1));
                let width = item.global_size(0);
                args.store(0, y * width + x, (y * 100 + x) as u32)
            }),
        )
        .build();
    let p = pipeline_on(&Platform::from_driver(driver));
    let program = Program::build(&p.context, INDEX2D, "").unwrap();
    let mut kernel = program.kernel("index2d").unwrap();
    let out_mem = Buffer::new(&p.context, 8 * 4 * 4, AccessMode::WriteOnly).unwrap();
    kernel.set_arg_buffer(0, &out_mem).unwrap();
    p.queue
        .enqueue_kernel(&kernel, WorkShape::from([8, 4]), Some(WorkShape::from([4, 2])))
        .unwrap();
    let mut out = vec![0u32; 32];
    p.queue.read_buffer(&out_mem, &mut out).unwrap();
    assert_eq!(out[0], 0);
    assert_eq!(out[7], 7);
    assert_eq!(out[8], 100);
    assert_eq!(out[31], 307);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_add_matches_host_sum(a in prop::collection::vec(-1.0e3f32..1.0e3, 1..200)) {
        let b: Vec<f32> = a.iter().map(|x| x * 0.5).collect();
        let p = pipeline();
        let c = run_add(&p, &a, &b).unwrap();
        for ((x, y), z) in a.iter().zip(&b).zip(&c) {
            prop_assert!((x + y - z).abs() < 1e-3);
        }
    }
}

// ============================================================================
// Device Selection
// ============================================================================

#[test]
fn test_cpu_only_platform_without_fallback() {
    let platform = Platform::from_driver(
        HostDriver::builder()
            .with_device(HostDeviceSpec::cpu())
            .build(),
    );
    let err = select_device(&platform, &DeviceConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        AccelError::DeviceNotFound {
            kind: DeviceKind::Gpu
        }
    ));
    assert_eq!(err.stage(), Stage::Selection);
}

#[test]
fn test_cpu_fallback_when_allowed() {
    let platform = Platform::from_driver(
        HostDriver::builder()
            .with_device(HostDeviceSpec::cpu())
            .build(),
    );
    let config = DeviceConfig::new().with_fallback_allowed(true);
    let device = select_device(&platform, &config).unwrap();
    assert_eq!(device.kind(), DeviceKind::Cpu);
}

#[test]
fn test_empty_platform_reports_no_platform() {
    let platform = Platform::from_driver(HostDriver::builder().build());
    assert!(matches!(
        select_device(&platform, &DeviceConfig::default()),
        Err(AccelError::NoPlatform)
    ));
}

#[test]
fn test_device_index_selects_second_gpu() {
    let platform = Platform::from_driver(
        HostDriver::builder()
            .with_device(HostDeviceSpec::gpu().with_name("first"))
            .with_device(HostDeviceSpec::gpu().with_name("second"))
            .build(),
    );
    let device = select_device(&platform, &DeviceConfig::new().with_device_index(1)).unwrap();
    assert_eq!(device.info().unwrap().name, "second");

    let err = select_device(&platform, &DeviceConfig::new().with_device_index(2)).unwrap_err();
    assert!(matches!(err, AccelError::DeviceNotFound { .. }));
}

// ============================================================================
// Context and Queue
// ============================================================================

#[test]
fn test_finish_is_idempotent() {
    let p = pipeline();
    p.queue.finish().unwrap();
    p.queue.finish().unwrap();

    let _buf = Buffer::from_slice(&p.queue, &[1u32, 2, 3], AccessMode::ReadOnly).unwrap();
    p.queue.finish().unwrap();
    p.queue.finish().unwrap();
}

#[test]
fn test_context_requires_devices() {
    let err = Context::new(&[]).unwrap_err();
    assert!(matches!(
        err,
        AccelError::ResourceCreation {
            resource: Resource::Context,
            ..
        }
    ));
}

#[test]
fn test_queue_device_must_belong_to_context() {
    let platform = Platform::host();
    let gpu = platform.devices(DeviceKind::Gpu).unwrap().remove(0);
    let cpu = platform.devices(DeviceKind::Cpu).unwrap().remove(0);
    let context = Context::new(&[gpu]).unwrap();
    let err = CommandQueue::new(&context, &cpu, QueueOptions::default()).unwrap_err();
    assert_eq!(err.stage(), Stage::Queue);
}

#[test]
fn test_profiling_queue_records_kernel() {
    let platform = Platform::host();
    let device = select_device(&platform, &DeviceConfig::default()).unwrap();
    let context = Context::new(std::slice::from_ref(&device)).unwrap();
    let queue =
        CommandQueue::new(&context, &device, QueueOptions::new().with_profiling(true)).unwrap();
    let program = Program::build(&context, CALC_SIN, "").unwrap();
    let mut kernel = program.kernel("calcSin").unwrap();
    let data = Buffer::from_slice(&queue, &[0.0f32; 16], AccessMode::ReadWrite).unwrap();
    kernel.set_arg_buffer(0, &data).unwrap();
    queue.enqueue_kernel(&kernel, WorkShape::D1(16), None).unwrap();
    queue.finish().unwrap();

    assert!(queue
        .profile()
        .iter()
        .any(|entry| entry.command == "kernel calcSin"));
}

// ============================================================================
// Program Build
// ============================================================================

#[test]
fn test_syntax_error_yields_compile_error() {
    let p = pipeline();
    let err = Program::build(&p.context, "kernel void broken(global float* a) {", "").unwrap_err();
    match &err {
        AccelError::Compile { log } => assert!(log.contains("error")),
        other => panic!("expected compile error, got {other}"),
    }
    assert_eq!(err.stage(), Stage::Build);
    assert!(err.diagnostic().contains("unclosed"));
}

#[test]
fn test_statement_errors_yield_compile_error() {
    let p = pipeline();
    let missing_semicolon = "\
kernel void add(global const float* a, global const float* b, global float* c) {
    int i = get_global_id(0)
    c[i] = a[i] + b[i];
}
";
    let err = Program::build(&p.context, missing_semicolon, "").unwrap_err();
    assert_eq!(err.stage(), Stage::Build);
    assert!(err.to_string().contains("<source>:3:5: error: expected `;` before `c`"));

    let dangling = "\
kernel void add(global const float* a, global const float* b, global float* c) {
    int i = get_global_id(0);
    c[i] = a[i] + ;
}
";
    let err = Program::build(&p.context, dangling, "").unwrap_err();
    assert!(matches!(err, AccelError::Compile { ref log } if log.contains("expected expression")));
}

#[test]
fn test_body_differing_from_host_kernel_rejected() {
    let p = pipeline();
    let product = ADD.replace("a[i] + b[i]", "a[i] * b[i]");
    let err = Program::build(&p.context, product, "").unwrap_err();
    match &err {
        AccelError::Compile { log } => {
            assert!(log.contains("body of kernel `add` does not match its host implementation"));
        }
        other => panic!("expected compile error, got {other}"),
    }
}

#[test]
fn test_size_t_parameter_rejected() {
    let p = pipeline();
    let source = "kernel void scale(global float* data, size_t n) { }";
    let err = Program::build(&p.context, source, "").unwrap_err();
    assert!(err.to_string().contains("cannot be declared with type `size_t`"));
}

#[test]
fn test_unknown_entry_point() {
    let p = pipeline();
    let program = Program::build(&p.context, ADD, "").unwrap();
    assert_eq!(program.entry_points(), vec!["add"]);
    let err = program.kernel("sub").unwrap_err();
    assert!(matches!(err, AccelError::NoSuchEntryPoint { ref name } if name == "sub"));
}

#[test]
fn test_unrecognized_build_option() {
    let p = pipeline();
    let err = Program::build(&p.context, ADD, "--turbo").unwrap_err();
    assert!(matches!(err, AccelError::Compile { .. }));
}

#[test]
fn test_multiple_kernels_in_one_program() {
    let p = pipeline();
    let source = format!("{ADD}\n{SCALE}");
    let program = Program::build(&p.context, source, "-cl-fast-relaxed-math").unwrap();
    let kernels = program.kernels().unwrap();
    let names: Vec<&str> = kernels.iter().map(accel_runtime::Kernel::name).collect();
    assert_eq!(names, vec!["add", "scale"]);
}

// ============================================================================
// Source Loading
// ============================================================================

#[test]
fn test_load_source_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CALC_SIN.as_bytes()).unwrap();
    let text = load_source(file.path()).unwrap();
    assert_eq!(text, CALC_SIN);

    let p = pipeline();
    let program = Program::build(&p.context, KernelSource::file(file.path()), "").unwrap();
    assert_eq!(program.entry_points(), vec!["calcSin"]);
}

#[test]
fn test_load_source_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_source(dir.path().join("example.cl")).unwrap_err();
    assert!(matches!(
        err,
        AccelError::SourceLoad {
            kind: SourceLoadKind::NotFound,
            ..
        }
    ));
    assert_eq!(err.stage(), Stage::SourceLoad);
}

#[test]
fn test_load_source_empty_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let err = load_source(file.path()).unwrap_err();
    assert!(matches!(
        err,
        AccelError::SourceLoad {
            kind: SourceLoadKind::Empty,
            ..
        }
    ));
}

// ============================================================================
// Memory and Transfers
// ============================================================================

#[test]
fn test_write_then_read_identity() {
    let p = pipeline();
    let data: Vec<i32> = (-50..50).collect();
    let buf = Buffer::new(&p.context, data.len() * 4, AccessMode::ReadWrite).unwrap();
    p.queue
        .write_buffer(&buf, &data, TransferMode::Blocking)
        .unwrap();
    let mut back = vec![0i32; data.len()];
    p.queue.read_buffer(&buf, &mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_non_blocking_read_completes_on_wait() {
    let p = pipeline();
    let buf = Buffer::from_slice(&p.queue, &[7u16; 10], AccessMode::ReadOnly).unwrap();
    let mut out = [0u16; 10];
    let pending = p.queue.enqueue_read_buffer(&buf, &mut out).unwrap();
    pending.wait().unwrap();
    assert_eq!(out, [7u16; 10]);
}

#[test]
fn test_transfer_size_mismatch() {
    let p = pipeline();
    let buf = Buffer::new(&p.context, 16, AccessMode::ReadWrite).unwrap();
    let err = p
        .queue
        .write_buffer(&buf, &[0u8; 8], TransferMode::Blocking)
        .unwrap_err();
    assert!(matches!(err, AccelError::Transfer { .. }));
    assert_eq!(err.stage(), Stage::Transfer);
}

#[test]
fn test_zero_sized_buffer_rejected() {
    let p = pipeline();
    let err = Buffer::new(&p.context, 0, AccessMode::ReadWrite).unwrap_err();
    assert!(matches!(
        err,
        AccelError::ResourceCreation {
            resource: Resource::Buffer,
            ..
        }
    ));
}

#[test]
fn test_memory_tracking_follows_buffer_lifetime() {
    let p = pipeline();
    let tracker = p.context.memory();
    {
        let _a = Buffer::new(&p.context, 1024, AccessMode::ReadWrite).unwrap();
        let _b = Buffer::new(&p.context, 2048, AccessMode::ReadWrite).unwrap();
        assert_eq!(tracker.allocated_bytes(), 3072);
    }
    assert_eq!(tracker.allocated_bytes(), 0);
    assert_eq!(tracker.peak_bytes(), 3072);
}

#[test]
fn test_allocation_beyond_device_memory() {
    let platform = Platform::from_driver(
        HostDriver::builder()
            .with_device(HostDeviceSpec::gpu().with_global_mem(4096))
            .build(),
    );
    let p = pipeline_on(&platform);
    let _a = Buffer::new(&p.context, 4096, AccessMode::ReadWrite).unwrap();
    let err = Buffer::new(&p.context, 1, AccessMode::ReadWrite).unwrap_err();
    assert!(matches!(
        err,
        AccelError::ResourceCreation {
            resource: Resource::Buffer,
            ..
        }
    ));
}

// ============================================================================
// Argument Binding and Dispatch
// ============================================================================

#[test]
fn test_arg_index_out_of_range() {
    let p = pipeline();
    let program = Program::build(&p.context, ADD, "").unwrap();
    let mut add = program.kernel("add").unwrap();
    let buf = Buffer::new(&p.context, 16, AccessMode::ReadWrite).unwrap();
    let err = add.set_arg_buffer(3, &buf).unwrap_err();
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
fn test_arg_type_mismatch() {
    let p = pipeline();
    let program = Program::build(&p.context, SCALE, "").unwrap();
    let mut scale = program.kernel("scale").unwrap();
    let err = scale.set_arg_scalar(0, 1.0f32).unwrap_err();
    assert!(matches!(
        err,
        AccelError::ArgBind {
            reason: ArgBindReason::TypeMismatch { .. },
            ..
        }
    ));
    let err = scale.set_arg_scalar(1, 1i32).unwrap_err();
    assert_eq!(err.stage(), Stage::ArgBinding);
}

#[test]
fn test_dispatch_with_unbound_argument() {
    let p = pipeline();
    let program = Program::build(&p.context, ADD, "").unwrap();
    let mut add = program.kernel("add").unwrap();
    let buf = Buffer::new(&p.context, 16, AccessMode::ReadWrite).unwrap();
    add.set_arg_buffer(0, &buf).unwrap();
    assert_eq!(add.first_unbound(), Some(1));
    let err = p
        .queue
        .enqueue_kernel(&add, WorkShape::D1(4), None)
        .unwrap_err();
    assert!(matches!(err, AccelError::Dispatch { .. }));
}

#[test]
fn test_local_size_must_divide_global() {
    let p = pipeline();
    let program = Program::build(&p.context, CALC_SIN, "").unwrap();
    let mut kernel = program.kernel("calcSin").unwrap();
    let buf = Buffer::new(&p.context, 40, AccessMode::ReadWrite).unwrap();
    kernel.set_arg_buffer(0, &buf).unwrap();
    let err = p
        .queue
        .enqueue_kernel(&kernel, WorkShape::D1(10), Some(WorkShape::D1(3)))
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Dispatch);
    let err = p
        .queue
        .enqueue_kernel(&kernel, WorkShape::D1(0), None)
        .unwrap_err();
    assert!(matches!(err, AccelError::Dispatch { .. }));
}

#[test]
fn test_overflowing_work_size_rejected() {
    let p = pipeline();
    let program = Program::build(&p.context, CALC_SIN, "").unwrap();
    let mut kernel = program.kernel("calcSin").unwrap();
    let buf = Buffer::new(&p.context, 16, AccessMode::ReadWrite).unwrap();
    kernel.set_arg_buffer(0, &buf).unwrap();
    let huge = WorkShape::D3(1 << 22, 1 << 22, 1 << 22);
    let err = p.queue.enqueue_kernel(&kernel, huge, Some(huge)).unwrap_err();
    assert_eq!(err.stage(), Stage::Dispatch);

    // Nothing was queued.
    p.queue.finish().unwrap();
}

#[test]
fn test_kernel_fault_reported_at_finish() {
    let p = pipeline();
    let program = Program::build(&p.context, ADD, "").unwrap();
    let mut add = program.kernel("add").unwrap();
    let a = Buffer::from_slice(&p.queue, &[1.0f32; 32], AccessMode::ReadOnly).unwrap();
    let b = Buffer::from_slice(&p.queue, &[1.0f32; 32], AccessMode::ReadOnly).unwrap();
    let c = Buffer::new(&p.context, 16 * 4, AccessMode::WriteOnly).unwrap();
    add.set_arg_buffer(0, &a).unwrap();
    add.set_arg_buffer(1, &b).unwrap();
    add.set_arg_buffer(2, &c).unwrap();

    // Enqueue succeeds; the out-of-bounds store only shows up at the barrier.
    p.queue.enqueue_kernel(&add, WorkShape::D1(32), None).unwrap();
    let err = p.queue.finish().unwrap_err();
    assert!(matches!(err, AccelError::DeferredExecution { .. }));
    assert!(err.to_string().contains("kernel add"));

    // The failure is consumed; the queue is usable again.
    p.queue.finish().unwrap();
}

const EXPLODE: &str = "\
kernel void explode(global int* x) {
    int i = get_global_id(0);
    if (i == 3) trap();
    x[0] = 7;
}
";

/// Pipeline whose `explode` kernel stores 7 to `x[0]` and faults at item 3.
fn exploding_pipeline() -> (Pipeline, Kernel, Buffer) {
    let driver = HostDriver::builder()
        .with_device(HostDeviceSpec::gpu())
        .with_kernel(
            "explode",
            EXPLODE,
            host_kernel(|item, args| {
                if item.global_id(0) == 3 {
                    return Err(KernelFault::Custom("boom".to_string()));
                }
                args.store(0, 0, 7i32)
            }),
        )
        .build();
    let p = pipeline_on(&Platform::from_driver(driver));
    let program = Program::build(&p.context, EXPLODE, "").unwrap();
    let mut kernel = program.kernel("explode").unwrap();
    let buf = Buffer::new(&p.context, 4, AccessMode::ReadWrite).unwrap();
    kernel.set_arg_buffer(0, &buf).unwrap();
    (p, kernel, buf)
}

#[test]
fn test_custom_kernel_fault() {
    let (p, kernel, buf) = exploding_pipeline();
    p.queue.enqueue_kernel(&kernel, WorkShape::D1(8), None).unwrap();

    let mut out = [0i32; 1];
    let err = p.queue.read_buffer(&buf, &mut out).unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert_eq!(out, [0]);

    // Writes of the faulting launch are discarded.
    p.queue.read_buffer(&buf, &mut out).unwrap();
    assert_eq!(out, [0]);
}

#[test]
fn test_failed_pending_read_leaves_destination_untouched() {
    let (p, kernel, buf) = exploding_pipeline();
    p.queue.enqueue_kernel(&kernel, WorkShape::D1(8), None).unwrap();

    let mut out = [-1i32; 1];
    let pending = p.queue.enqueue_read_buffer(&buf, &mut out).unwrap();
    let err = pending.wait().unwrap_err();
    assert!(matches!(err, AccelError::DeferredExecution { .. }));
    assert!(err.to_string().contains("kernel explode: boom"));
    assert_eq!(out, [-1]);

    // Without the fault the same read goes through.
    p.queue.enqueue_kernel(&kernel, WorkShape::D1(2), None).unwrap();
    p.queue.enqueue_read_buffer(&buf, &mut out).unwrap().wait().unwrap();
    assert_eq!(out, [7]);
}

#[test]
fn test_buffer_from_other_context_rejected() {
    let p = pipeline();
    let other = Context::new(std::slice::from_ref(&p.device)).unwrap();
    let program = Program::build(&p.context, CALC_SIN, "").unwrap();
    let mut kernel = program.kernel("calcSin").unwrap();
    let foreign = Buffer::new(&other, 16, AccessMode::ReadWrite).unwrap();
    let err = kernel.set_arg_buffer(0, &foreign).unwrap_err();
    assert_eq!(err.stage(), Stage::ArgBinding);
}

// ============================================================================
// Session
// ============================================================================

fn host_session_config() -> SessionConfig {
    SessionConfig::new()
        .with_device(DeviceConfig::default())
        .with_backend(BackendKind::Host)
}

#[test]
fn test_session_round_trip() {
    let session = Session::open(host_session_config()).unwrap();
    let program = session.build_program(SCALE).unwrap();
    let mut kernel = program.kernel("scale").unwrap();
    let data = session
        .buffer_from(&[1.0f32, 2.0, 3.0, 4.0], AccessMode::ReadWrite)
        .unwrap();
    kernel.set_arg_buffer(0, &data).unwrap();
    kernel.set_arg_scalar(1, 10.0f32).unwrap();
    session
        .queue()
        .enqueue_kernel(&kernel, WorkShape::D1(4), None)
        .unwrap();

    let mut out = [0.0f32; 4];
    session.queue().read_buffer(&data, &mut out).unwrap();
    assert_eq!(out, [10.0, 20.0, 30.0, 40.0]);
}

#[test]
fn test_session_config_validates() {
    assert!(host_session_config().validate().is_ok());
    let bad = host_session_config().with_device(
        DeviceConfig::new()
            .with_preferred(DeviceKind::Gpu)
            .with_fallback(DeviceKind::Gpu)
            .with_fallback_allowed(true),
    );
    assert!(bad.validate().is_err());
}

// ============================================================================
// OpenCL Platform
// ============================================================================

#[cfg(feature = "opencl")]
mod opencl {
    use super::*;

    #[test]
    #[ignore = "Requires OpenCL device"]
    fn test_opencl_vector_add() {
        let platform = Platform::opencl().unwrap();
        let p = pipeline_on(&platform);
        let a: Vec<f32> = (0..32).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..32).map(|i| (32 - i) as f32).collect();
        let c = run_add(&p, &a, &b).unwrap();
        assert!(c.iter().all(|&x| (x - 32.0).abs() < f32::EPSILON));
    }

    #[test]
    #[ignore = "Requires OpenCL device"]
    fn test_opencl_compile_error_has_log() {
        let platform = Platform::opencl().unwrap();
        let p = pipeline_on(&platform);
        let err = Program::build(&p.context, "kernel void broken(", "").unwrap_err();
        assert_eq!(err.stage(), Stage::Build);
    }
}
