// ── Central error types ───────────────────────────────────────────────────────
//
// Failures come in two tiers:
//   • `UnsupportedPlatform` is fatal.  It is returned before any filesystem or
//     native activity and is never absorbed.
//   • `LoadError` covers everything that can go wrong while resolving,
//     loading and initialising the library.  `Loader::initialize` absorbs it
//     into `BackendStatus::Disabled`.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The running (architecture, OS) pair has no secp256k1 native library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no secp256k1 native library for arch {arch:?} on os {os:?}")]
pub struct UnsupportedPlatform {
    /// Raw architecture identifier, as reported or supplied.
    pub arch: String,
    /// Raw operating-system identifier, as reported or supplied.
    pub os: String,
}

/// A failure that disables the native backend for the rest of the process.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The library could not be mapped, or its entry point is missing.
    #[error("failed to link {}: {message}", path.display())]
    Link {
        /// The path handed to the platform loader.
        path: PathBuf,
        /// Loader diagnostic (`dlerror()` text or the Win32 error).
        message: String,
    },

    /// An embedded resource could not be read or written to disk.
    #[error("failed to extract {resource}: {source}")]
    ResourceIo {
        /// Resource name, e.g. `coop/rchain/secp256k1-native-linux-x86_64.so`.
        resource: String,
        source: io::Error,
    },

    /// Something that must exist was absent: the resource itself, the home
    /// directory, or the context returned by the native library.
    #[error("{what} is null")]
    UnexpectedNull { what: String },
}

impl LoadError {
    /// Stable short name of the failure category, used in logs and reports.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Link { .. } => "link",
            Self::ResourceIo { .. } => "resource-io",
            Self::UnexpectedNull { .. } => "unexpected-null",
        }
    }
}

/// Every error `Loader::load` can produce.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedPlatform),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Problems with the optional JSON configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported config version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = LoaderError> = std::result::Result<T, E>;

// ── Tests ─────────────────────────────────────────────────────────────────────
