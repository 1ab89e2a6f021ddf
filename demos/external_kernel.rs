//! Example: Kernel Loaded From a File
//!
//! Builds `add` from `demos/kernels/example.cl`, sums two 32-element vectors
//! whose elements pair up to 32 and prints the result.
//!
//! Run with:
//! ```bash
//! cargo run --example external_kernel
//! cargo run --example external_kernel -- path/to/kernel.cl
//! ```

#![allow(clippy::cast_precision_loss)]

use std::path::PathBuf;
use std::process::ExitCode;

use accel_runtime::{
    init_logging, load_source, AccessMode, LogConfig, Result, Session, SessionConfig, WorkShape,
};

const N: usize = 32;

fn kernel_path() -> PathBuf {
    std::env::args_os().nth(1).map_or_else(
        || PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/kernels/example.cl"),
        PathBuf::from,
    )
}

fn run_add(a: &[f32], b: &[f32], results: &mut [f32]) -> Result<()> {
    // Load first: a missing file should fail before any device work.
    let source = load_source(kernel_path())?;

    let session = Session::open(SessionConfig::new())?;
    let info = session.device().info()?;
    println!("Connecting to {} : {} ...", info.vendor, info.name);

    let program = session.build_program(source)?;
    let mut add = program.kernel("add")?;

    let a_mem = session.buffer_from(a, AccessMode::ReadOnly)?;
    let b_mem = session.buffer_from(b, AccessMode::ReadOnly)?;
    let c_mem = session.buffer(std::mem::size_of_val(results), AccessMode::WriteOnly)?;
    add.set_arg_buffer(0, &a_mem)?;
    add.set_arg_buffer(1, &b_mem)?;
    add.set_arg_buffer(2, &c_mem)?;

    session
        .queue()
        .enqueue_kernel(&add, WorkShape::D1(results.len()), None)?;
    session.queue().finish()?;
    session.queue().read_buffer(&c_mem, results)
}

fn main() -> ExitCode {
    init_logging(&LogConfig::from_env());

    let a: Vec<f32> = (0..N).map(|i| i as f32).collect();
    let b: Vec<f32> = (0..N).map(|i| (N - i) as f32).collect();
    let mut results = vec![0.0f32; N];

    if let Err(err) = run_add(&a, &b, &mut results) {
        eprintln!("{}", err.diagnostic());
        return ExitCode::FAILURE;
    }
    // Every element should be N.
    for x in &results {
        println!("{x:.6}");
    }
    ExitCode::SUCCESS
}
