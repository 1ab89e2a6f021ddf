// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Program compilation and kernel extraction.
//!
//! Source comes either inline or from a file ([`KernelSource`]). Building is
//! synchronous: [`Program::build`] returns only once the driver has compiled
//! (or rejected) the source, and a failed build yields the compiler log
//! instead of a program.

use std::borrow::Cow;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{KernelSignature, RawHandle};
use crate::context::Context;
use crate::error::{AccelError, Result, SourceLoadKind};
use crate::kernel::Kernel;

/// Where kernel source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    /// Source text embedded in the program.
    Inline(String),
    /// Path of a source file, read at build time.
    File(PathBuf),
}

impl KernelSource {
    /// Inline source.
    pub fn inline(source: impl Into<String>) -> Self {
        Self::Inline(source.into())
    }

    /// Source file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Source text, reading the file if needed.
    ///
    /// # Errors
    ///
    /// See [`load_source`].
    pub fn text(&self) -> Result<Cow<'_, str>> {
        match self {
            Self::Inline(src) => Ok(Cow::Borrowed(src.as_str())),
            Self::File(path) => load_source(path).map(Cow::Owned),
        }
    }
}

impl From<&str> for KernelSource {
    fn from(source: &str) -> Self {
        Self::Inline(source.to_string())
    }
}

impl From<String> for KernelSource {
    fn from(source: String) -> Self {
        Self::Inline(source)
    }
}

impl From<&Path> for KernelSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<PathBuf> for KernelSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Read kernel source from `path`.
///
/// # Errors
///
/// [`AccelError::SourceLoad`] with [`SourceLoadKind::NotFound`] if the file
/// does not exist, [`SourceLoadKind::Empty`] if it has no content, and
/// [`SourceLoadKind::Io`] if it cannot be read completely or is not UTF-8.
pub fn load_source(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let fail = |kind| AccelError::SourceLoad {
        path: path.to_path_buf(),
        kind,
    };

    let expected = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(fail(SourceLoadKind::NotFound)),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "cannot stat kernel source");
            return Err(fail(SourceLoadKind::Io));
        }
    };
    if expected == 0 {
        return Err(fail(SourceLoadKind::Empty));
    }

    let bytes = std::fs::read(path).map_err(|err| {
        tracing::debug!(path = %path.display(), error = %err, "cannot read kernel source");
        fail(SourceLoadKind::Io)
    })?;
    if bytes.len() as u64 != expected {
        tracing::debug!(
            path = %path.display(),
            expected,
            read = bytes.len(),
            "short read of kernel source"
        );
        return Err(fail(SourceLoadKind::Io));
    }
    String::from_utf8(bytes).map_err(|_| fail(SourceLoadKind::Io))
}

struct ProgramInner {
    context: Context,
    handle: RawHandle,
    signatures: Vec<KernelSignature>,
}

impl Drop for ProgramInner {
    fn drop(&mut self) {
        tracing::debug!(kernels = self.signatures.len(), "releasing program");
        self.context.driver().release_program(self.handle);
    }
}

/// A built program.
///
/// Kernels extracted from it hold a clone, so the program outlives them.
#[derive(Clone)]
pub struct Program {
    inner: Arc<ProgramInner>,
}

impl Program {
    /// Compile `source` for every device of `context`.
    ///
    /// `options` are driver build options such as `-cl-fast-relaxed-math` or
    /// `-D N=32`.
    ///
    /// On the host platform each kernel runs a registered host
    /// implementation, so the build only succeeds when every kernel matches
    /// the OpenCL C definition its implementation was registered with.
    /// Parameter names, whitespace and comments may differ; any other change
    /// to the body is a compile error. The built-in definitions are available
    /// from [`builtin_definition`](crate::backend::host::builtin_definition).
    ///
    /// # Errors
    ///
    /// [`AccelError::SourceLoad`] if a source file cannot be read,
    /// [`AccelError::Compile`] with the build log if compilation fails.
    pub fn build(context: &Context, source: impl Into<KernelSource>, options: &str) -> Result<Self> {
        let source = source.into();
        let text = source.text()?;
        let (handle, signatures) = context
            .driver()
            .build_program(context.handle(), &text, options)
            .map_err(|err| {
                if let AccelError::Compile { log } = &err {
                    tracing::debug!(log = %log, "program build failed");
                }
                err
            })?;
        tracing::info!(
            platform = context.platform().name(),
            kernels = signatures.len(),
            "built program"
        );
        Ok(Self {
            inner: Arc::new(ProgramInner {
                context: context.clone(),
                handle,
                signatures,
            }),
        })
    }

    /// Names of all kernels in the program, in source order.
    #[must_use]
    pub fn entry_points(&self) -> Vec<&str> {
        self.inner
            .signatures
            .iter()
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Extract the kernel named `name`.
    ///
    /// # Errors
    ///
    /// [`AccelError::NoSuchEntryPoint`] if the program has no such kernel.
    pub fn kernel(&self, name: &str) -> Result<Kernel> {
        let signature = self
            .inner
            .signatures
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| AccelError::no_such_entry_point(name))?;
        let handle = self
            .inner
            .context
            .driver()
            .create_kernel(self.inner.handle, name)?;
        tracing::debug!(kernel = name, args = signature.params.len(), "created kernel");
        Ok(Kernel::new(self.clone(), signature, handle))
    }

    /// Extract every kernel, in source order.
    ///
    /// # Errors
    ///
    /// Driver errors from kernel creation.
    pub fn kernels(&self) -> Result<Vec<Kernel>> {
        self.inner
            .signatures
            .iter()
            .map(|s| self.kernel(&s.name))
            .collect()
    }

    /// Context the program was built in.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.inner.context
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("entry_points", &self.entry_points())
            .field("handle", &self.inner.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::backend::Platform;
    use crate::device::DeviceKind;

    const TWO: &str = "kernel void copy(global const float* s, global float* d) {\n\
                         int i = get_global_id(0); d[i] = s[i];\n\
                       }\n\
                       kernel void calcSin(global float* data) {\n\
                         int id = get_global_id(0); data[id] = sin(data[id]);\n\
                       }\n";

    fn context() -> Context {
        let gpu = Platform::host().devices(DeviceKind::Gpu).unwrap();
        Context::new(&gpu).unwrap()
    }

    #[test]
    fn test_entry_points_in_source_order() {
        let program = Program::build(&context(), TWO, "").unwrap();
        assert_eq!(program.entry_points(), vec!["copy", "calcSin"]);
        let kernels = program.kernels().unwrap();
        assert_eq!(kernels[1].name(), "calcSin");
        assert_eq!(kernels[1].arity(), 1);
    }

    #[test]
    fn test_missing_entry_point() {
        let program = Program::build(&context(), TWO, "").unwrap();
        let err = program.kernel("calcCos").unwrap_err();
        assert!(matches!(err, AccelError::NoSuchEntryPoint { name } if name == "calcCos"));
    }

    #[test]
    fn test_compile_error_carries_log() {
        let err = Program::build(&context(), "kernel void broken(global float* a) {", "")
            .unwrap_err();
        match err {
            AccelError::Compile { log } => assert!(log.contains("unclosed")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_build_option() {
        let err = Program::build(&context(), TWO, "-fno-such-flag").unwrap_err();
        assert!(matches!(err, AccelError::Compile { .. }));
    }

    #[test]
    fn test_load_source_kinds() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.cl");
        assert!(matches!(
            load_source(&missing),
            Err(AccelError::SourceLoad {
                kind: SourceLoadKind::NotFound,
                ..
            })
        ));

        let empty = dir.path().join("empty.cl");
        std::fs::File::create(&empty).unwrap();
        assert!(matches!(
            load_source(&empty),
            Err(AccelError::SourceLoad {
                kind: SourceLoadKind::Empty,
                ..
            })
        ));

        let good = dir.path().join("good.cl");
        let mut file = std::fs::File::create(&good).unwrap();
        file.write_all(TWO.as_bytes()).unwrap();
        assert_eq!(load_source(&good).unwrap(), TWO);
    }

    #[test]
    fn test_build_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO.as_bytes()).unwrap();
        let program = Program::build(&context(), file.path(), "").unwrap();
        assert_eq!(program.entry_points().len(), 2);
    }
}
