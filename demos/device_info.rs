//! Example: Device Information
//!
//! Selects the default device and prints its capabilities.
//!
//! Run with:
//! ```bash
//! cargo run --example device_info
//! ACCEL_BACKEND=opencl cargo run --example device_info --features opencl
//! ```

use std::process::ExitCode;

use accel_runtime::{init_logging, select_device, DeviceConfig, LogConfig, Platform, Result};

fn run() -> Result<()> {
    let platform = Platform::from_backend(accel_runtime::BackendKind::from_env())?;
    let device = select_device(&platform, &DeviceConfig::from_env())?;
    println!("{}", device.info()?);
    println!("Done.");
    Ok(())
}

fn main() -> ExitCode {
    init_logging(&LogConfig::from_env());
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.diagnostic());
            ExitCode::FAILURE
        }
    }
}
