//! Locate, extract and load a pre-built secp256k1 native library.
//!
//! The crate performs no cryptography.  It finds the platform's build of the
//! backend (bundled into the binary at compile time, supplied through
//! configuration, or, on ARM64 hosts, a fixed file under `~/.firefly`),
//! maps it into the process, calls its context-initialisation entry point
//! and hands back the opaque context.
//!
//! ```no_run
//! use secp256k1_native::{Loader, LoaderConfig};
//!
//! let status = Loader::new(LoaderConfig::from_env())
//!     .initialize()
//!     .expect("unsupported platform");
//! if status.is_enabled() {
//!     let ctx = status.context();
//!     // pass `ctx` to the native signing / verification calls
//!     # let _ = ctx;
//! }
//! ```
//!
//! For the classic "load once per process" behaviour use [`shared`].

// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except:
//   • `platform::unix`  – dlopen / dlsym
//   • `platform::win32` – LoadLibraryExW / GetProcAddress
// Each unsafe block in those modules MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod loader;
pub mod platform;
pub mod resources;

pub use config::LoaderConfig;
pub use error::{ConfigError, LoadError, LoaderError, UnsupportedPlatform};
pub use loader::{
    shared::{shared, SharedBackend},
    Backend, BackendStatus, ContextHandle, LibrarySource, Loader,
};
pub use platform::{Arch, Os, Platform};
