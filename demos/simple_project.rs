//! Example: In-Place Sine
//!
//! Runs `calcSin` over 32 floats in place and prints the results.
//!
//! Run with:
//! ```bash
//! cargo run --example simple_project
//! ```

#![allow(clippy::cast_precision_loss)]

use std::process::ExitCode;

use accel_runtime::{
    init_logging, AccessMode, LogConfig, Result, Session, SessionConfig, WorkShape,
};

const KERNEL_SOURCE: &str = "\
kernel void calcSin(global float* data) {
    int id = get_global_id(0);
    data[id] = sin(data[id]);
}
";

const N: usize = 32;

fn run_sin(data: &mut [f32]) -> Result<()> {
    let session = Session::open(SessionConfig::new())?;
    let info = session.device().info()?;
    println!("Connecting to {} : {} ...", info.vendor, info.name);

    let program = session.build_program(KERNEL_SOURCE)?;
    let mut kernel = program.kernel("calcSin")?;
    let buffer = session.buffer_from(&*data, AccessMode::ReadWrite)?;
    kernel.set_arg_buffer(0, &buffer)?;

    session
        .queue()
        .enqueue_kernel(&kernel, WorkShape::D1(data.len()), None)?;
    session.queue().finish()?;
    session.queue().read_buffer(&buffer, data)
}

fn main() -> ExitCode {
    init_logging(&LogConfig::from_env());

    let mut data: Vec<f32> = (0..N).map(|i| i as f32).collect();
    if let Err(err) = run_sin(&mut data) {
        eprintln!("{}", err.diagnostic());
        return ExitCode::FAILURE;
    }
    for x in &data {
        println!("{x:.6}");
    }
    ExitCode::SUCCESS
}
