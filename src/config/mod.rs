// ── Loader configuration ──────────────────────────────────────────────────────
//
// Reads `$SECP256K1_NATIVE_CONFIG`, falling back to
// `~/.firefly/secp256k1-native.json`.  No `unsafe` — pure safe Rust +
// serde_json.  Every field is optional; a missing file means defaults.

use std::{
    env,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Format version of the JSON file.
pub const CONFIG_VERSION: u32 = 1;

/// Symbol exported by the backend to create its context.
pub const DEFAULT_ENTRY_POINT: &str = "secp256k1_init_context";

/// Per-user application directory, relative to the home directory.
pub const APP_DIR: &str = ".firefly";

const CONFIG_FILE: &str = "secp256k1-native.json";

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "SECP256K1_NATIVE_CONFIG";
/// Environment variable overriding `library_path`.
pub const ENV_LIBRARY: &str = "SECP256K1_NATIVE_LIBRARY";
/// Environment variable overriding `entry_point`.
pub const ENV_ENTRY_POINT: &str = "SECP256K1_NATIVE_ENTRY_POINT";

// ── On-disk type ──────────────────────────────────────────────────────────────

/// How the loader finds and initialises the native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub version: u32,
    /// Load this file directly and skip resource resolution.
    pub library_path: Option<PathBuf>,
    /// Directory holding the fixed-path library on ARM64
    /// (default `~/.firefly`).
    pub library_dir: Option<PathBuf>,
    /// Directory searched for resources before the embedded table.
    pub resource_dir: Option<PathBuf>,
    /// Where extracted libraries are written (default: system temp dir).
    pub temp_dir: Option<PathBuf>,
    pub entry_point: String,
    /// Leave extracted libraries on disk instead of deleting them on drop.
    pub keep_extracted: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            library_path: None,
            library_dir: None,
            resource_dir: None,
            temp_dir: None,
            entry_point: DEFAULT_ENTRY_POINT.to_owned(),
            keep_extracted: false,
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// The current user's home directory.
///
/// `HOME` everywhere, with `USERPROFILE` as a Windows fallback.  Empty values
/// count as unset.
pub fn home_dir() -> Option<PathBuf> {
    let var = |key: &str| env::var_os(key).filter(|v| !v.is_empty());
    let home = var("HOME");
    #[cfg(windows)]
    let home = home.or_else(|| var("USERPROFILE"));
    home.map(PathBuf::from)
}

/// Location of the config file, or `None` if neither the override variable
/// nor a home directory is available.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(ENV_CONFIG).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let mut p = home_dir()?;
    p.push(APP_DIR);
    p.push(CONFIG_FILE);
    Some(p)
}

// ── Load ──────────────────────────────────────────────────────────────────────

impl LoaderConfig {
    /// Parse a config document and check its version.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        if config.version != CONFIG_VERSION {
            return Err(ConfigError::Version {
                found: config.version,
                expected: CONFIG_VERSION,
            });
        }
        Ok(config)
    }

    /// Read the config file at `path`.  A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        match fs::read(path) {
            Ok(bytes) => Self::parse(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the config file at `path`, falling back to defaults on any
    /// problem.  Problems other than a missing file are logged.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(config)) => {
                debug!(path = %path.display(), "loaded secp256k1 native config");
                config
            }
            Ok(None) => Self::default(),
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring secp256k1 native config");
                Self::default()
            }
        }
    }

    /// The config for this process: file (if any) plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = config_path()
            .map(|p| Self::load_or_default(&p))
            .unwrap_or_default();
        config.apply_overrides(|key| env::var_os(key));
        config
    }

    /// Apply `SECP256K1_NATIVE_LIBRARY` / `SECP256K1_NATIVE_ENTRY_POINT`
    /// as returned by `var`.  Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if let Some(path) = var(ENV_LIBRARY).filter(|v| !v.is_empty()) {
            self.library_path = Some(PathBuf::from(path));
        }
        if let Some(symbol) = var(ENV_ENTRY_POINT).filter(|v| !v.is_empty()) {
            self.entry_point = symbol.to_string_lossy().into_owned();
        }
    }

    /// Directory of the ARM64 fixed-path library: `library_dir` if set,
    /// else `<home>/.firefly`.
    pub fn library_dir(&self, home: Option<&Path>) -> Option<PathBuf> {
        match &self.library_dir {
            Some(dir) => Some(dir.clone()),
            None => home.map(|h| h.join(APP_DIR)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
