//! Example: Logging Setup
//!
//! This example shows how to install the tracing subscriber and what the
//! pipeline logs while it works.
//!
//! Run with:
//!
//! ```bash
//! cargo run --example logging_setup
//! RUST_LOG=accel_runtime=trace cargo run --example logging_setup
//! ```

use std::process::ExitCode;

use accel_runtime::logging::{debug, info, log_profile, trace, warn};
use accel_runtime::{
    init_logging, log_device_info, log_memory_usage, AccessMode,
    LogConfig, LogLevel, QueueOptions, Result, Session, SessionConfig, WorkShape,
};

fn profiled_run() -> Result<()> {
    let config = SessionConfig::new()
        .with_queue(QueueOptions::new().with_profiling(true))
        .with_verbose(true);
    let session = Session::open(config)?;
    log_device_info(&session.device().info()?);

    let program = session.build_program(
        "kernel void scale(global float* data, float factor) {\n\
           int i = get_global_id(0);\n\
           data[i] = data[i] * factor;\n\
         }",
    )?;
    let mut scale = program.kernel("scale")?;
    let data = session.buffer_from(&[1.0f32; 1024], AccessMode::ReadWrite)?;
    log_memory_usage(session.context().memory(), "after upload");

    scale.set_arg_buffer(0, &data)?;
    scale.set_arg_scalar(1, 0.5f32)?;
    session
        .queue()
        .enqueue_kernel(&scale, WorkShape::D1(1024), None)?;
    session.queue().finish()?;
    log_profile(&session.queue().profile());
    Ok(())
}

fn main() -> ExitCode {
    println!("=== Logging Setup Example ===\n");

    // 1. Configuration presets
    println!("1. Preset configurations:");
    println!("   LogConfig::development() - Debug level, file/line, colors");
    println!("   LogConfig::production()  - Info level, no colors");
    println!("   LogConfig::testing()     - Warn level, no timestamps\n");

    // 2. Initialize logging (only the first call takes effect)
    println!("2. Initializing with Debug level:");
    let config = LogConfig::new().with_level(LogLevel::Debug);
    init_logging(&config);
    init_logging(&LogConfig::production());
    println!("   second init_logging call was a no-op\n");

    // 3. Tracing macros re-exported by the crate
    println!("3. Tracing macros (output on stderr):");
    trace!("hidden unless RUST_LOG=trace");
    debug!("debug message");
    info!(work_items = 1024, "structured fields");
    warn!("warning message");
    println!();

    // 4. Pipeline events
    println!("4. A profiled pipeline run:");
    if let Err(err) = profiled_run() {
        eprintln!("{}", err.diagnostic());
        return ExitCode::FAILURE;
    }
    println!();

    println!("5. Environment variable configuration:");
    println!("     ACCEL_LOG_LEVEL=debug              - default level for LogConfig::from_env()");
    println!("     RUST_LOG=accel_runtime=trace       - per-transfer and per-argument events");
    println!("     RUST_LOG=accel_runtime::profile=debug - queue timings only");
    println!();

    println!("=== Example Complete ===");
    ExitCode::SUCCESS
}
