//! Example: Error Handling
//!
//! Every failure carries the pipeline stage it came from. This example
//! provokes one failure per stage and prints its diagnostic.
//!
//! Run with:
//! ```bash
//! cargo run --example error_handling
//! ```

use accel_runtime::backend::host::{HostDeviceSpec, HostDriver};
use accel_runtime::{
    load_source, select_device, AccelError, AccessMode, Buffer, CommandQueue, Context,
    DeviceConfig, Platform, Program, QueueOptions, Result, WorkShape,
};

/// Application error that wraps `AccelError`.
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("bad input: {0}")]
    Input(String),

    #[error(transparent)]
    Accel(#[from] AccelError),
}

fn checked_len(n: usize) -> std::result::Result<usize, AppError> {
    if n == 0 {
        return Err(AppError::Input("problem size must be positive".to_string()));
    }
    Ok(n)
}

fn show(title: &str, result: Result<()>) {
    println!("{title}:");
    match result {
        Ok(()) => println!("   ok\n"),
        Err(err) => println!("   [{}] {}\n", err.stage(), err.diagnostic()),
    }
}

fn setup(platform: &Platform) -> Result<(Context, CommandQueue)> {
    let device = select_device(platform, &DeviceConfig::default())?;
    let context = Context::new(std::slice::from_ref(&device))?;
    let queue = CommandQueue::new(&context, &device, QueueOptions::default())?;
    Ok((context, queue))
}

fn bind_wrong_type(context: &Context) -> Result<()> {
    let program = Program::build(
        context,
        "kernel void scale(global float* data, float factor) {\n\
           int i = get_global_id(0);\n\
           data[i] = data[i] * factor;\n\
         }",
        "",
    )?;
    let mut scale = program.kernel("scale")?;
    scale.set_arg_scalar(0, 2.0f32)
}

fn fault_at_finish(context: &Context, queue: &CommandQueue) -> Result<()> {
    let program = Program::build(
        context,
        "kernel void copy(global const float* src, global float* dst) {\n\
           int i = get_global_id(0);\n\
           dst[i] = src[i];\n\
         }",
        "",
    )?;
    let mut copy = program.kernel("copy")?;
    let src = Buffer::from_slice(queue, &[1.0f32; 8], AccessMode::ReadOnly)?;
    let dst = Buffer::new(context, 4 * 4, AccessMode::WriteOnly)?;
    copy.set_arg_buffer(0, &src)?;
    copy.set_arg_buffer(1, &dst)?;
    // Enqueue succeeds; the fault shows up at the barrier.
    queue.enqueue_kernel(&copy, WorkShape::D1(8), None)?;
    queue.finish()
}

fn main() {
    println!("=== Error Handling Example ===\n");

    // 1. No GPU and no fallback
    let cpu_only = Platform::from_driver(
        HostDriver::builder()
            .with_device(HostDeviceSpec::cpu())
            .build(),
    );
    show(
        "1. Selection on a CPU-only platform",
        select_device(&cpu_only, &DeviceConfig::default()).map(drop),
    );

    // 2. The same platform with the fallback enabled
    show(
        "2. Selection with fallback allowed",
        select_device(&cpu_only, &DeviceConfig::new().with_fallback_allowed(true)).map(drop),
    );

    let platform = Platform::host();
    let (context, queue) = match setup(&platform) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("{}", err.diagnostic());
            return;
        }
    };

    // 3. Missing source file
    show(
        "3. Loading a missing kernel file",
        load_source("does/not/exist.cl").map(drop),
    );

    // 4. Compile error with the build log
    show(
        "4. Building broken source",
        Program::build(&context, "kernel void broken(global float* a) {", "").map(drop),
    );

    // 5. Argument type mismatch
    show(
        "5. Binding a scalar to a pointer parameter",
        bind_wrong_type(&context),
    );

    // 6. Kernel fault surfaced at the synchronization point
    show(
        "6. Out-of-bounds store reported by finish",
        fault_at_finish(&context, &queue),
    );

    // 7. Wrapping in an application error type
    println!("7. Application error wrapping:");
    match checked_len(0) {
        Ok(n) => println!("   n = {n}"),
        Err(e) => println!("   Error: {e}"),
    }
    let wrapped: AppError = AccelError::no_such_entry_point("missing").into();
    println!("   Error: {wrapped}");

    println!("\n=== Example Complete ===");
}
