// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Unified error types for the device-program execution pipeline.
//!
//! Every fallible operation returns [`Result`]. Errors are unrecoverable at the
//! point of occurrence: nothing retries, and resources already acquired are
//! released by their owners' `Drop` impls as the error propagates.
//!
//! ## Error Hierarchy
//!
//! ```text
//! AccelError
//! ├── NoPlatform          - No compute platform is available at all
//! ├── DeviceNotFound      - Platform exists, but no device of the requested kind
//! ├── ResourceCreation    - Context / queue / buffer could not be created
//! ├── Compile             - Kernel source failed to build (carries the log)
//! ├── NoSuchEntryPoint    - Named kernel missing from a built program
//! ├── ArgBind             - Wrong index or type while binding a kernel argument
//! ├── Transfer            - Host <-> device copy failed
//! ├── Dispatch            - Kernel enqueue rejected (bad shape, unbound args)
//! ├── DeferredExecution   - Asynchronous failure surfaced at a sync point
//! ├── SourceLoad          - Kernel source file could not be loaded
//! └── InvalidConfig       - Configuration validation failures
//! ```
//!
//! ## Stages
//!
//! [`AccelError::stage`] maps each error onto the pipeline [`Stage`] that
//! failed, which is what drivers print in their single diagnostic line.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::device::DeviceKind;

/// Result type alias for accel-runtime operations.
pub type Result<T> = std::result::Result<T, AccelError>;

/// Pipeline stage in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Device discovery and selection.
    Selection,
    /// Context creation.
    Context,
    /// Command queue creation.
    Queue,
    /// Loading kernel source from an external file.
    SourceLoad,
    /// Program compilation.
    Build,
    /// Kernel entry-point extraction.
    KernelExtraction,
    /// Buffer allocation.
    Allocation,
    /// Host <-> device transfer.
    Transfer,
    /// Kernel argument binding.
    ArgBinding,
    /// Kernel dispatch.
    Dispatch,
    /// Synchronization barrier.
    Synchronization,
    /// Configuration validation.
    Configuration,
}

impl Stage {
    /// Short lowercase name used in diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selection => "device selection",
            Self::Context => "context creation",
            Self::Queue => "queue creation",
            Self::SourceLoad => "source load",
            Self::Build => "program build",
            Self::KernelExtraction => "kernel extraction",
            Self::Allocation => "buffer allocation",
            Self::Transfer => "transfer",
            Self::ArgBinding => "argument binding",
            Self::Dispatch => "dispatch",
            Self::Synchronization => "synchronization",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver object kinds that can fail to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Execution context.
    Context,
    /// Command queue.
    Queue,
    /// Device buffer.
    Buffer,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Context => "context",
            Self::Queue => "command queue",
            Self::Buffer => "buffer",
        })
    }
}

/// Why a kernel argument could not be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgBindReason {
    /// Index is past the kernel's parameter list.
    InvalidIndex {
        /// Number of parameters the kernel declares.
        arity: usize,
    },
    /// Value kind or scalar type does not match the parameter.
    TypeMismatch {
        /// Parameter as declared by the kernel.
        expected: String,
        /// Value that was supplied.
        actual: String,
    },
}

impl fmt::Display for ArgBindReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIndex { arity } => {
                write!(f, "invalid argument index (kernel takes {arity} arguments)")
            }
            Self::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

/// Why kernel source could not be loaded from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLoadKind {
    /// The file does not exist.
    NotFound,
    /// The file exists but could not be read completely.
    Io,
    /// The file is empty.
    Empty,
}

impl fmt::Display for SourceLoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not found",
            Self::Io => "I/O error",
            Self::Empty => "file is empty",
        })
    }
}

/// Errors raised by the execution pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AccelError {
    /// No compute platform is installed or reachable.
    #[error("no compute platform available")]
    NoPlatform,

    /// A platform exists but exposes no device of the requested kind.
    #[error("no {kind} device found")]
    DeviceNotFound {
        /// Kind that was searched for.
        kind: DeviceKind,
    },

    /// A context, queue or buffer could not be created.
    #[error("cannot create {resource}: {message}")]
    ResourceCreation {
        /// What was being created.
        resource: Resource,
        /// Driver diagnostic.
        message: String,
    },

    /// Kernel source failed to build.
    #[error("compiler reported errors:\n{log}")]
    Compile {
        /// Compiler log.
        log: String,
    },

    /// The built program has no kernel with this name.
    #[error("no kernel named `{name}` in program")]
    NoSuchEntryPoint {
        /// Requested entry point.
        name: String,
    },

    /// A kernel argument could not be bound.
    #[error("cannot bind argument {index} of kernel `{kernel}`: {reason}")]
    ArgBind {
        /// Kernel name.
        kernel: String,
        /// Positional argument index.
        index: u32,
        /// Failure reason.
        reason: ArgBindReason,
    },

    /// A host <-> device copy failed.
    #[error("invalid transfer: {message}")]
    Transfer {
        /// Descriptive error message.
        message: String,
    },

    /// A kernel could not be enqueued.
    #[error("cannot enqueue kernel: {message}")]
    Dispatch {
        /// Descriptive error message.
        message: String,
    },

    /// An asynchronously enqueued command failed; reported at the next
    /// synchronization point.
    #[error("deferred execution error: {message}")]
    DeferredExecution {
        /// Descriptive error message.
        message: String,
    },

    /// Kernel source could not be loaded from disk.
    #[error("cannot load kernel source {}: {kind}", path.display())]
    SourceLoad {
        /// File that was requested.
        path: PathBuf,
        /// Failure kind.
        kind: SourceLoadKind,
    },

    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AccelError {
    /// Create a device-not-found error.
    pub fn device_not_found(kind: DeviceKind) -> Self {
        Self::DeviceNotFound { kind }
    }

    /// Create a resource creation error.
    pub fn resource(resource: Resource, msg: impl Into<String>) -> Self {
        Self::ResourceCreation {
            resource,
            message: msg.into(),
        }
    }

    /// Create a compile error carrying the build log.
    pub fn compile(log: impl Into<String>) -> Self {
        Self::Compile { log: log.into() }
    }

    /// Create a missing entry point error.
    pub fn no_such_entry_point(name: impl Into<String>) -> Self {
        Self::NoSuchEntryPoint { name: name.into() }
    }

    /// Create a transfer error.
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer {
            message: msg.into(),
        }
    }

    /// Create a dispatch error.
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch {
            message: msg.into(),
        }
    }

    /// Create a deferred execution error.
    pub fn deferred(msg: impl Into<String>) -> Self {
        Self::DeferredExecution {
            message: msg.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Pipeline stage this error belongs to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::NoPlatform | Self::DeviceNotFound { .. } => Stage::Selection,
            Self::ResourceCreation { resource, .. } => match resource {
                Resource::Context => Stage::Context,
                Resource::Queue => Stage::Queue,
                Resource::Buffer => Stage::Allocation,
            },
            Self::Compile { .. } => Stage::Build,
            Self::NoSuchEntryPoint { .. } => Stage::KernelExtraction,
            Self::ArgBind { .. } => Stage::ArgBinding,
            Self::Transfer { .. } => Stage::Transfer,
            Self::Dispatch { .. } => Stage::Dispatch,
            Self::DeferredExecution { .. } => Stage::Synchronization,
            Self::SourceLoad { .. } => Stage::SourceLoad,
            Self::InvalidConfig(_) => Stage::Configuration,
        }
    }

    /// Single-line diagnostic naming the failing stage.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        format!("{} failed: {self}", self.stage())
    }
}
