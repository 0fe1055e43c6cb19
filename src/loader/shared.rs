// ── Process-wide backend ──────────────────────────────────────────────────────
//
// `SharedBackend` runs a loader at most once.  Threads that arrive while the
// first caller is still initialising block on the `OnceLock` and then see
// the finished result; nobody observes a half-initialised status.

use std::sync::OnceLock;

use super::{BackendStatus, Loader};
use crate::error::UnsupportedPlatform;

/// A lazily initialised, never re-initialised backend status.
pub struct SharedBackend {
    cell: OnceLock<Result<BackendStatus, UnsupportedPlatform>>,
    make_loader: fn() -> Loader,
}

impl SharedBackend {
    /// `make_loader` is called once, on first use.
    pub const fn new(make_loader: fn() -> Loader) -> Self {
        Self {
            cell: OnceLock::new(),
            make_loader,
        }
    }

    /// Initialise on first call; every call returns the same result.
    pub fn get(&self) -> Result<&BackendStatus, &UnsupportedPlatform> {
        self.cell
            .get_or_init(|| (self.make_loader)().initialize())
            .as_ref()
    }

    /// Whether initialisation has already run.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

static SHARED: SharedBackend = SharedBackend::new(Loader::from_env);

/// The backend for this process, configured by `LoaderConfig::from_env`.
///
/// The first call loads the library; later calls are plain reads.
pub fn shared() -> Result<&'static BackendStatus, &'static UnsupportedPlatform> {
    SHARED.get()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
