// ── Resource extraction ───────────────────────────────────────────────────────
//
// Copies a resource into a uniquely named temp file so the platform loader
// can map it.  Removal is best-effort and never awaited:
//   • Unix: the file is unlinked as soon as the library is mapped; the
//     mapping does not need the directory entry.
//   • Windows: a loaded DLL cannot be deleted, so the file goes when the
//     `ExtractedLibrary` is dropped if that is still possible, and leftovers
//     from exited processes are swept before the next extraction.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tempfile::{Builder, TempPath};
use tracing::debug;

use crate::{error::LoadError, resources::ResourceProvider};

/// Prefix of every extracted file name.
pub const TEMP_PREFIX: &str = "secp256k1-native-library-";

/// Where and how to write extracted libraries.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions<'a> {
    /// Target directory; `None` means the system temp dir.
    pub dir: Option<&'a Path>,
    /// Leave the file behind when the guard is dropped.
    pub keep: bool,
}

/// An extracted library file on disk.
#[derive(Debug)]
pub struct ExtractedLibrary {
    path: PathBuf,
    // Deletes the file on drop.  `None` once persisted with `keep` or
    // unlinked after loading.
    guard: Option<TempPath>,
}

impl ExtractedLibrary {
    /// Where the library was written.  The file may already be gone, see
    /// `release_loaded`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is still scheduled for deletion on drop.
    pub fn is_pending_removal(&self) -> bool {
        self.guard.is_some()
    }

    /// Called once the library is mapped.  On Unix the file is removed right
    /// away, so a backend that lives until exit leaves nothing behind.
    #[cfg(unix)]
    pub fn release_loaded(&mut self) {
        if let Some(guard) = self.guard.take() {
            match guard.close() {
                Ok(()) => debug!(path = %self.path.display(), "unlinked loaded library"),
                Err(err) => debug!(path = %self.path.display(), %err, "could not unlink loaded library"),
            }
        }
    }

    /// Called once the library is mapped.  Windows keeps the DLL locked, so
    /// the file stays until drop or the next process's sweep.
    #[cfg(windows)]
    pub fn release_loaded(&mut self) {}
}

/// Files younger than this may belong to a process that is still between
/// extracting and loading.
const STALE_AFTER: Duration = Duration::from_secs(60);

/// Remove leftovers of earlier extractions from `dir`.
///
/// Files still loaded by a live process cannot be deleted on Windows and are
/// skipped silently.  Returns the number of files removed.
pub(crate) fn sweep_stale(dir: &Path, now: SystemTime) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        let modified = entry.metadata().and_then(|m| m.modified());
        let stale = modified
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .is_some_and(|age| age >= STALE_AFTER);
        if stale && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(dir = %dir.display(), removed, "swept stale extracted libraries");
    }
    removed
}

/// Look up `name` in `resources` and write it to a fresh temp file.
///
/// A missing resource is `UnexpectedNull`; everything else that goes wrong
/// is `ResourceIo`.
pub fn extract(
    resources: &dyn ResourceProvider,
    name: &str,
    options: &ExtractOptions<'_>,
) -> Result<ExtractedLibrary, LoadError> {
    let bytes = resources
        .open(name)
        .map_err(|source| resource_io(name, source))?
        .ok_or_else(|| LoadError::UnexpectedNull {
            what: format!("resource {name}"),
        })?;
    write_library(name, &bytes, options)
}

/// Write `bytes` to a fresh temp file named after resource `name`.
pub fn write_library(
    name: &str,
    bytes: &[u8],
    options: &ExtractOptions<'_>,
) -> Result<ExtractedLibrary, LoadError> {
    if cfg!(windows) {
        sweep_stale(
            &options.dir.map_or_else(std::env::temp_dir, Path::to_path_buf),
            SystemTime::now(),
        );
    }

    let suffix = suffix_of(name);
    let mut builder = Builder::new();
    builder.prefix(TEMP_PREFIX).suffix(suffix);
    let mut file = match options.dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|source| resource_io(name, source))?;

    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|source| resource_io(name, source))?;

    // Close our handle before anyone loads the file: Windows will not map a
    // DLL that is still open for writing.
    let temp = file.into_temp_path();
    let extracted = if options.keep {
        let path = temp.keep().map_err(|e| resource_io(name, e.error))?;
        ExtractedLibrary { path, guard: None }
    } else {
        ExtractedLibrary {
            path: temp.to_path_buf(),
            guard: Some(temp),
        }
    };

    debug!(
        resource = name,
        path = %extracted.path.display(),
        bytes = bytes.len(),
        "extracted native library"
    );
    Ok(extracted)
}

/// The extension of `name` including its dot, or `""`.
fn suffix_of(name: &str) -> &str {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    file_name.rfind('.').map_or("", |i| &file_name[i..])
}

fn resource_io(name: &str, source: std::io::Error) -> LoadError {
    LoadError::ResourceIo {
        resource: name.to_owned(),
        source,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
