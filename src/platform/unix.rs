// ── Unix shared-object loading ────────────────────────────────────────────────
//
// One of exactly two modules where `unsafe` is permitted (the other is
// `platform::win32`).  Every `unsafe` block MUST carry a `// SAFETY:` comment.
//
// ── Ownership model ───────────────────────────────────────────────────────────
//
// `NativeLibrary` owns one `dlopen` reference.  Dropping it calls `dlclose`,
// which is what we want when initialisation fails half-way.  Once the entry
// point has handed out a context the library must stay mapped for the rest
// of the process: `leak()` turns the handle into a `&'static` that is never
// dropped.

#![allow(unsafe_code)]

use std::{
    fmt,
    path::{Path, PathBuf},
};

use libloading::os::unix::{Library, Symbol, RTLD_LOCAL, RTLD_NOW};

use super::InitContextFn;
use crate::error::LoadError;

/// A shared object mapped into the current process.
pub struct NativeLibrary {
    lib: Library,
    path: PathBuf,
}

impl NativeLibrary {
    /// `dlopen` the library at `path`.
    ///
    /// `RTLD_NOW` forces every undefined symbol to resolve here, so a missing
    /// dependency surfaces as a link failure instead of a crash on first use.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        // SAFETY: loading a library runs its initialisers.  The caller chose
        // this file as the secp256k1 backend; its constructors only set up
        // library-internal state.
        let lib = unsafe { Library::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map_err(|e| {
            LoadError::Link {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            lib,
            path: path.to_path_buf(),
        })
    }

    /// Resolve `entry_point` and call it, returning the raw context handle.
    pub fn init_context(&self, entry_point: &str) -> Result<i64, LoadError> {
        // SAFETY: the exported symbol is declared by the backend ABI as
        // `int64_t fn(void)`; `InitContextFn` matches that signature.
        let init: Symbol<InitContextFn> =
            unsafe { self.lib.get(entry_point.as_bytes()) }.map_err(|e| LoadError::Link {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        // SAFETY: `init` points into `self.lib`, which outlives this call.
        // The entry point takes no arguments and has no preconditions.
        Ok(unsafe { init() })
    }

    /// The path this library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the library mapped for the lifetime of the process.
    pub fn leak(self) -> &'static Self {
        Box::leak(Box::new(self))
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
