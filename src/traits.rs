// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Shared trait interfaces.
//!
//! - [`ValidatableConfig`] - configuration validation, called by the
//!   constructors that consume a config before any driver object is created.

use crate::error::Result;

/// Configuration validation trait.
///
/// # Example
///
/// ```rust
/// use accel_runtime::{AccelError, Result, ValidatableConfig};
///
/// #[derive(Clone)]
/// struct LaunchConfig {
///     items: usize,
///     group: usize,
/// }
///
/// impl ValidatableConfig for LaunchConfig {
///     fn validate(&self) -> Result<()> {
///         if self.group == 0 || self.items % self.group != 0 {
///             return Err(AccelError::invalid_config("group must divide items"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(LaunchConfig { items: 32, group: 8 }.validate().is_ok());
/// assert!(LaunchConfig { items: 32, group: 5 }.validate().is_err());
/// ```
pub trait ValidatableConfig: Clone + Send + Sync {
    /// Validate the configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AccelError::InvalidConfig`](crate::AccelError::InvalidConfig)
    /// if validation fails.
    fn validate(&self) -> Result<()>;
}
