// ── Win32 DLL loading ─────────────────────────────────────────────────────────
//
// One of exactly two modules where `unsafe` is permitted (the other is
// `platform::unix`).  Every `unsafe` block MUST carry a `// SAFETY:` comment
// that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// ── DLL ownership model ───────────────────────────────────────────────────────
//
// `NativeLibrary` owns the single `LoadLibraryExW` reference.  `FreeLibrary`
// is called on `Drop`, which only happens when initialisation fails before a
// context was handed out.  A successfully initialised library is `leak()`ed
// and stays loaded until the process exits.
//
// ── Search path ───────────────────────────────────────────────────────────────
//
// The path is always absolute (an extracted temp file or a configured
// override), and `LOAD_WITH_ALTERED_SEARCH_PATH` makes Windows resolve the
// DLL's own dependencies from its directory rather than from ours.

#![allow(unsafe_code)]

use std::{
    ffi::CString,
    fmt,
    os::windows::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use windows::{
    core::{PCSTR, PCWSTR},
    Win32::{
        Foundation::{GetLastError, HANDLE, HMODULE},
        System::LibraryLoader::{
            FreeLibrary, GetProcAddress, LoadLibraryExW, LOAD_WITH_ALTERED_SEARCH_PATH,
        },
    },
};

use super::InitContextFn;
use crate::error::LoadError;

/// RAII handle to a loaded DLL.
pub struct NativeLibrary {
    module: HMODULE,
    path: PathBuf,
}

// SAFETY: an HMODULE is a process-wide base address, valid from any thread
// until FreeLibrary.  NativeLibrary never mutates it after construction.
unsafe impl Send for NativeLibrary {}
// SAFETY: see above; every method takes `&self` and only reads the handle.
unsafe impl Sync for NativeLibrary {}

impl NativeLibrary {
    /// Load the DLL at `path`.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        // SAFETY: wide is a valid null-terminated UTF-16 string that outlives
        // the call.  A null file handle is required by LoadLibraryExW.
        let module = unsafe {
            LoadLibraryExW(
                PCWSTR(wide.as_ptr()),
                HANDLE::default(),
                LOAD_WITH_ALTERED_SEARCH_PATH,
            )
        }
        .map_err(|e| LoadError::Link {
            path: path.to_path_buf(),
            message: e.message(),
        })?;
        Ok(Self {
            module,
            path: path.to_path_buf(),
        })
    }

    /// Resolve `entry_point` and call it, returning the raw context handle.
    pub fn init_context(&self, entry_point: &str) -> Result<i64, LoadError> {
        let name = CString::new(entry_point).map_err(|e| LoadError::Link {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        // SAFETY: self.module is a live module handle; name is a valid
        // null-terminated ANSI string that outlives the call.
        let proc = unsafe { GetProcAddress(self.module, PCSTR(name.as_ptr().cast())) };
        let Some(proc) = proc else {
            // SAFETY: GetLastError reads thread-local state set by the
            // just-failed GetProcAddress; no Win32 calls between them.
            let code = unsafe { GetLastError().0 };
            return Err(LoadError::Link {
                path: self.path.clone(),
                message: format!("GetProcAddress({entry_point}) failed (error {code:#010x})"),
            });
        };
        // SAFETY: the backend ABI declares the entry point as
        // `int64_t fn(void)`; FARPROC and InitContextFn are both plain
        // function pointers of the same size.
        let init: InitContextFn = unsafe { std::mem::transmute(proc) };
        // SAFETY: the module stays loaded for the duration of the call and
        // the entry point has no preconditions.
        Ok(unsafe { init() })
    }

    /// The path this library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the DLL loaded for the lifetime of the process.
    pub fn leak(self) -> &'static Self {
        Box::leak(Box::new(self))
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        // SAFETY: self.module was returned by a successful LoadLibraryExW and
        // has not been freed.  No context from it escaped (see `leak`).
        unsafe {
            let _ = FreeLibrary(self.module);
        }
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
