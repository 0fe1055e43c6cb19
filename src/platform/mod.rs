// ── Platform abstraction layer ────────────────────────────────────────────────
//
// Classifies the running (architecture, OS) pair and picks the OS-specific
// dynamic-library handle.  No `unsafe` lives here; all FFI is confined to the
// `unix` and `win32` sub-modules and never leaks outward.

use std::{env, fmt};

use crate::error::UnsupportedPlatform;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativeLibrary;

#[cfg(windows)]
mod win32;
#[cfg(windows)]
pub use win32::NativeLibrary;

/// Signature of the native context-initialisation entry point.
pub type InitContextFn = unsafe extern "C" fn() -> i64;

/// Namespace prefix of every embedded resource name.
pub const RESOURCE_NAMESPACE: &str = "coop/rchain";

// ── Architecture ──────────────────────────────────────────────────────────────

/// CPU architecture families with a secp256k1 build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    /// Case-insensitive match of an architecture identifier.
    ///
    /// Accepts Rust's `std::env::consts::ARCH` spelling as well as the
    /// `amd64` / `x64` / `arm64` aliases other toolchains report.
    pub fn classify(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            _ => None,
        }
    }

    /// Spelling used in resource names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

// ── Operating system ──────────────────────────────────────────────────────────

/// Operating systems with a secp256k1 build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

impl Os {
    /// Case-insensitive prefix / equality match of an OS identifier.
    ///
    /// `"linux"`, `"Linux"`, `"Mac OS X"`, `"macos"`, `"darwin"`,
    /// `"windows"` and `"Windows 11"` are all recognised.
    pub fn classify(raw: &str) -> Option<Self> {
        let os = raw.trim().to_ascii_lowercase();
        if os.starts_with("linux") {
            Some(Self::Linux)
        } else if os == "macos" || os == "darwin" || os.starts_with("mac os x") {
            Some(Self::MacOs)
        } else if os.starts_with("windows") {
            Some(Self::Windows)
        } else {
            None
        }
    }

    /// Spelling used in resource names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "osx",
            Self::Windows => "windows",
        }
    }

    /// Shared-library file extension, without the dot.
    pub fn library_extension(self) -> &'static str {
        match self {
            Self::Linux => "so",
            Self::MacOs => "dylib",
            Self::Windows => "dll",
        }
    }
}

// ── Platform ──────────────────────────────────────────────────────────────────

/// A supported (architecture, OS) pair.
///
/// Only `classify` builds one, so holding a `Platform` proves the pair is
/// one of x86-64 × {Linux, macOS, Windows} or ARM64 × {Linux, macOS}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    arch: Arch,
    os: Os,
}

impl Platform {
    /// The platform this process runs on.
    pub fn current() -> Result<Self, UnsupportedPlatform> {
        Self::classify(env::consts::ARCH, env::consts::OS)
    }

    /// Classify raw identifiers into a supported platform.
    pub fn classify(arch: &str, os: &str) -> Result<Self, UnsupportedPlatform> {
        let unsupported = || UnsupportedPlatform {
            arch: arch.to_owned(),
            os: os.to_owned(),
        };
        let (Some(a), Some(o)) = (Arch::classify(arch), Os::classify(os)) else {
            return Err(unsupported());
        };
        match (a, o) {
            (Arch::X86_64, _) | (Arch::Aarch64, Os::Linux | Os::MacOs) => Ok(Self { arch: a, os: o }),
            (Arch::Aarch64, Os::Windows) => Err(unsupported()),
        }
    }

    pub fn arch(self) -> Arch {
        self.arch
    }

    pub fn os(self) -> Os {
        self.os
    }

    /// Name of the embedded resource holding this platform's library,
    /// e.g. `coop/rchain/secp256k1-native-linux-x86_64.so`.
    pub fn resource_name(self) -> String {
        format!(
            "{RESOURCE_NAMESPACE}/secp256k1-native-{}-{}.{}",
            self.os.as_str(),
            self.arch.as_str(),
            self.os.library_extension(),
        )
    }

    /// File name expected under the application directory when no resource
    /// is bundled.  Only ARM64 platforms fall back to a fixed path.
    pub fn fixed_library_name(self) -> Option<&'static str> {
        match (self.arch, self.os) {
            (Arch::Aarch64, Os::Linux) => Some("libsecp256k1.so"),
            (Arch::Aarch64, Os::MacOs) => Some("libsecp256k1.0.dylib"),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
