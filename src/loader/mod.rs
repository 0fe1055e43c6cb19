// ── Native backend loader ─────────────────────────────────────────────────────
//
// Initialisation sequence:
//   1. classify the platform (unsupported → fatal, before any I/O)
//   2. resolve a library path: override, extracted resource, or the ARM64
//      fixed path
//   3. map the library
//   4. call the entry point and keep the returned context
//
// `Loader::load` reports every failure.  `Loader::initialize` absorbs
// `LoadError`s into `BackendStatus::Disabled` and only lets
// `UnsupportedPlatform` through.

pub mod extract;
pub mod shared;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, error, info};

use crate::{
    config::{home_dir, LoaderConfig},
    error::{LoadError, Result, UnsupportedPlatform},
    platform::{Arch, NativeLibrary, Platform},
    resources::{Chain, DirectoryResources, Embedded, ResourceProvider},
};
use extract::{ExtractOptions, ExtractedLibrary};

// ── Context handle ────────────────────────────────────────────────────────────

/// Opaque token for the context owned by the native backend.
///
/// The shim never dereferences it; it only passes it back to native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(i64);

impl ContextHandle {
    /// What readers get when the backend is unavailable.
    pub const SENTINEL: Self = Self(-1);

    pub fn as_raw(self) -> i64 {
        self.0
    }

    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }
}

// ── Library source ────────────────────────────────────────────────────────────

/// How the loaded library's path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibrarySource {
    /// Copied from a resource into a temp file.
    Extracted,
    /// The ARM64 fallback under the application directory.
    FixedPath,
    /// Named explicitly by configuration.
    Override,
}

impl LibrarySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::FixedPath => "fixed-path",
            Self::Override => "override",
        }
    }
}

// ── Backend ───────────────────────────────────────────────────────────────────

/// A loaded and initialised native backend.
///
/// The library stays mapped for the rest of the process even after the
/// `Backend` is dropped.  An extracted file is unlinked right after loading
/// on Unix; on Windows dropping the `Backend` attempts its removal.
pub struct Backend {
    platform: Platform,
    source: LibrarySource,
    path: PathBuf,
    context: ContextHandle,
    _library: &'static NativeLibrary,
    _extracted: Option<ExtractedLibrary>,
}

impl Backend {
    pub fn context(&self) -> ContextHandle {
        self.context
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn source(&self) -> LibrarySource {
        self.source
    }

    /// The file the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("platform", &self.platform)
            .field("source", &self.source)
            .field("path", &self.path)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Outcome of initialisation: either a usable backend or the reason there
/// is none.  Fixed for the lifetime of the value.
#[derive(Debug)]
pub enum BackendStatus {
    Enabled(Backend),
    Disabled(LoadError),
}

impl BackendStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// The raw context, or `-1` when disabled.
    pub fn context(&self) -> i64 {
        match self {
            Self::Enabled(backend) => backend.context.as_raw(),
            Self::Disabled(_) => ContextHandle::SENTINEL.as_raw(),
        }
    }

    pub fn backend(&self) -> Option<&Backend> {
        match self {
            Self::Enabled(backend) => Some(backend),
            Self::Disabled(_) => None,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Enabled(_) => None,
            Self::Disabled(err) => Some(err),
        }
    }
}

impl From<std::result::Result<Backend, LoadError>> for BackendStatus {
    fn from(result: std::result::Result<Backend, LoadError>) -> Self {
        match result {
            Ok(backend) => Self::Enabled(backend),
            Err(err) => Self::Disabled(err),
        }
    }
}

// ── Loader ────────────────────────────────────────────────────────────────────

/// Resolves, loads and initialises the native backend.
pub struct Loader {
    config: LoaderConfig,
    resources: Box<dyn ResourceProvider>,
    target: Option<(String, String)>,
    home: Option<PathBuf>,
}

impl Loader {
    /// A loader for the running platform.
    ///
    /// Resources come from `config.resource_dir` (if set) and then from the
    /// table embedded at build time.
    pub fn new(config: LoaderConfig) -> Self {
        let mut chain = Chain::new();
        if let Some(dir) = &config.resource_dir {
            chain = chain.with(DirectoryResources::new(dir));
        }
        Self {
            config,
            resources: Box::new(chain.with(Embedded)),
            target: None,
            home: home_dir(),
        }
    }

    /// A loader configured from the config file and environment.
    ///
    /// The config file is only read on a supported platform, so an
    /// unsupported one fails in `initialize` without touching the disk.
    pub fn from_env() -> Self {
        Self::new(config_for(Platform::current(), LoaderConfig::from_env))
    }

    /// Replace the resource provider.
    pub fn with_resources(mut self, resources: impl ResourceProvider + 'static) -> Self {
        self.resources = Box::new(resources);
        self
    }

    /// Classify these identifiers instead of the running platform.
    pub fn with_target(mut self, arch: impl Into<String>, os: impl Into<String>) -> Self {
        self.target = Some((arch.into(), os.into()));
        self
    }

    /// Use `home` as the home directory (`None`: no home directory).
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The platform this loader targets.
    pub fn platform(&self) -> std::result::Result<Platform, UnsupportedPlatform> {
        match &self.target {
            Some((arch, os)) => Platform::classify(arch, os),
            None => Platform::current(),
        }
    }

    /// Run the full sequence, reporting every failure.
    pub fn load(&self) -> Result<Backend> {
        let platform = self.platform()?;
        Ok(self.load_for(platform)?)
    }

    /// Run the full sequence and absorb load failures into the status.
    ///
    /// Only an unsupported platform is returned as an error.
    pub fn initialize(&self) -> std::result::Result<BackendStatus, UnsupportedPlatform> {
        let platform = self.platform().inspect_err(|err| {
            error!(arch = %err.arch, os = %err.os, "no secp256k1 native library for this platform");
        })?;

        let status = BackendStatus::from(self.load_for(platform));
        match &status {
            BackendStatus::Enabled(backend) => info!(
                %platform,
                source = backend.source.as_str(),
                path = %backend.path.display(),
                context = backend.context.as_raw(),
                "secp256k1 native backend enabled"
            ),
            BackendStatus::Disabled(err) => error!(
                %platform,
                category = err.category(),
                %err,
                "secp256k1 native backend disabled"
            ),
        }
        Ok(status)
    }

    fn load_for(&self, platform: Platform) -> std::result::Result<Backend, LoadError> {
        let (source, path, mut extracted) = self.resolve(platform)?;
        debug!(%platform, source = source.as_str(), path = %path.display(), "loading native library");

        let library = NativeLibrary::open(&path)?;
        if let Some(file) = extracted.as_mut() {
            file.release_loaded();
        }
        let raw = library.init_context(&self.config.entry_point)?;
        if raw == 0 {
            return Err(LoadError::UnexpectedNull {
                what: format!("context returned by {}", self.config.entry_point),
            });
        }

        Ok(Backend {
            platform,
            source,
            path,
            context: ContextHandle(raw),
            _library: library.leak(),
            _extracted: extracted,
        })
    }

    fn resolve(
        &self,
        platform: Platform,
    ) -> std::result::Result<(LibrarySource, PathBuf, Option<ExtractedLibrary>), LoadError> {
        if let Some(path) = &self.config.library_path {
            return Ok((LibrarySource::Override, path.clone(), None));
        }

        let resource = platform.resource_name();
        let options = ExtractOptions {
            dir: self.config.temp_dir.as_deref(),
            keep: self.config.keep_extracted,
        };

        let extracted = match platform.arch() {
            Arch::X86_64 => extract::extract(self.resources.as_ref(), &resource, &options)?,
            Arch::Aarch64 => {
                // Bundled resources win; the fixed path is only a fallback
                // for hosts that were provisioned by hand.
                let bytes = self
                    .resources
                    .open(&resource)
                    .map_err(|source| LoadError::ResourceIo {
                        resource: resource.clone(),
                        source,
                    })?;
                match bytes {
                    Some(bytes) => extract::write_library(&resource, &bytes, &options)?,
                    None => {
                        let path = self.fixed_path(platform)?;
                        return Ok((LibrarySource::FixedPath, path, None));
                    }
                }
            }
        };
        Ok((
            LibrarySource::Extracted,
            extracted.path().to_path_buf(),
            Some(extracted),
        ))
    }

    fn fixed_path(&self, platform: Platform) -> std::result::Result<PathBuf, LoadError> {
        let file_name = platform
            .fixed_library_name()
            .ok_or_else(|| LoadError::UnexpectedNull {
                what: format!("fixed library name for {platform}"),
            })?;
        let dir = self
            .config
            .library_dir(self.home.as_deref())
            .ok_or_else(|| LoadError::UnexpectedNull {
                what: "HOME".to_owned(),
            })?;
        Ok(dir.join(file_name))
    }
}

fn config_for(
    platform: std::result::Result<Platform, UnsupportedPlatform>,
    read: impl FnOnce() -> LoaderConfig,
) -> LoaderConfig {
    match platform {
        Ok(_) => read(),
        Err(_) => LoaderConfig::default(),
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("target", &self.target)
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        borrow::Cow,
        collections::HashMap,
        fs, io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::*;
    use crate::error::LoaderError;

    const LINUX_X64: &str = "coop/rchain/secp256k1-native-linux-x86_64.so";
    const LINUX_ARM64: &str = "coop/rchain/secp256k1-native-linux-aarch64.so";

    /// In-memory resources that count lookups.
    #[derive(Default)]
    struct Memory {
        files: HashMap<String, Vec<u8>>,
        opened: Arc<AtomicUsize>,
    }

    impl Memory {
        fn with(mut self, name: &str, bytes: &[u8]) -> Self {
            self.files.insert(name.to_owned(), bytes.to_vec());
            self
        }
    }

    impl ResourceProvider for Memory {
        fn open(&self, name: &str) -> io::Result<Option<Cow<'static, [u8]>>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(self.files.get(name).map(|b| Cow::Owned(b.clone())))
        }
    }

    fn config_in(dir: &Path) -> LoaderConfig {
        LoaderConfig {
            temp_dir: Some(dir.to_path_buf()),
            ..LoaderConfig::default()
        }
    }

    #[test]
    fn unsupported_platform_fails_before_any_lookup() {
        let memory = Memory::default();
        let opened = Arc::clone(&memory.opened);
        let loader = Loader::new(LoaderConfig::default())
            .with_resources(memory)
            .with_target("x86_64", "SolarisXYZ");

        let err = loader.initialize().unwrap_err();
        assert_eq!(err.os, "SolarisXYZ");
        assert!(matches!(loader.load(), Err(LoaderError::Unsupported(_))));
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsupported_platform_ignores_library_override() {
        let config = LoaderConfig {
            library_path: Some(PathBuf::from("/opt/libsecp256k1.so")),
            ..LoaderConfig::default()
        };
        let loader = Loader::new(config).with_target("sparcv9", "linux");
        assert!(loader.initialize().is_err());
    }

    #[test]
    fn missing_resource_disables_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = Loader::new(config_in(dir.path()))
            .with_resources(Memory::default())
            .with_target("x86_64", "Linux");

        let status = loader.initialize().expect("supported platform");
        assert!(!status.is_enabled());
        assert_eq!(status.context(), -1);
        assert!(status.backend().is_none());
        assert_eq!(status.error().map(LoadError::category), Some("unexpected-null"));
        assert!(fs::read_dir(dir.path()).expect("read_dir").next().is_none());
    }

    #[test]
    fn invalid_resource_is_a_link_failure_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = Loader::new(config_in(dir.path()))
            .with_resources(Memory::default().with(LINUX_X64, b"not a shared object"))
            .with_target("amd64", "linux");

        let status = loader.initialize().expect("supported platform");
        assert_eq!(status.context(), -1);
        match status.error() {
            Some(LoadError::Link { path, .. }) => {
                assert!(path.starts_with(dir.path()), "{}", path.display());
            }
            other => panic!("unexpected status: {other:?}"),
        }
        // The temp file went away with the failed attempt.
        assert!(fs::read_dir(dir.path()).expect("read_dir").next().is_none());
    }

    #[test]
    fn load_reports_the_same_failure_unabsorbed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = Loader::new(config_in(dir.path()))
            .with_resources(Memory::default())
            .with_target("x86_64", "Mac OS X");

        match loader.load() {
            Err(LoaderError::Load(err)) => {
                assert!(err.to_string().contains("secp256k1-native-osx-x86_64.dylib"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn arm64_falls_back_to_fixed_path_under_home() {
        let home = tempfile::tempdir().expect("tempdir");
        let loader = Loader::new(LoaderConfig::default())
            .with_resources(Memory::default())
            .with_target("aarch64", "Linux")
            .with_home(Some(home.path().to_path_buf()));

        let status = loader.initialize().expect("supported platform");
        assert_eq!(status.context(), -1);
        match status.error() {
            Some(LoadError::Link { path, .. }) => {
                assert_eq!(*path, home.path().join(".firefly").join("libsecp256k1.so"));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn arm64_macos_fixed_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LoaderConfig {
            library_dir: Some(dir.path().to_path_buf()),
            ..LoaderConfig::default()
        };
        let loader = Loader::new(config)
            .with_resources(Memory::default())
            .with_target("arm64", "macos")
            .with_home(None);

        let status = loader.initialize().expect("supported platform");
        match status.error() {
            Some(LoadError::Link { path, .. }) => {
                assert_eq!(*path, dir.path().join("libsecp256k1.0.dylib"));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn arm64_without_home_is_unexpected_null() {
        let loader = Loader::new(LoaderConfig::default())
            .with_resources(Memory::default())
            .with_target("aarch64", "linux")
            .with_home(None);

        let status = loader.initialize().expect("supported platform");
        assert!(!status.is_enabled());
        assert_eq!(status.error().map(LoadError::category), Some("unexpected-null"));
    }

    #[test]
    fn arm64_prefers_bundled_resource() {
        let dir = tempfile::tempdir().expect("tempdir");
        let home = tempfile::tempdir().expect("tempdir");
        let loader = Loader::new(config_in(dir.path()))
            .with_resources(Memory::default().with(LINUX_ARM64, b"garbage"))
            .with_target("aarch64", "linux")
            .with_home(Some(home.path().to_path_buf()));

        let status = loader.initialize().expect("supported platform");
        match status.error() {
            Some(LoadError::Link { path, .. }) => assert!(path.starts_with(dir.path())),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn override_skips_resources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = Memory::default();
        let opened = Arc::clone(&memory.opened);
        let config = LoaderConfig {
            library_path: Some(dir.path().join("custom.so")),
            ..LoaderConfig::default()
        };
        let loader = Loader::new(config)
            .with_resources(memory)
            .with_target("x86_64", "linux");

        let status = loader.initialize().expect("supported platform");
        assert_eq!(status.error().map(LoadError::category), Some("link"));
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn config_is_not_read_for_unsupported_platforms() {
        let reads = AtomicUsize::new(0);
        let read = || {
            reads.fetch_add(1, Ordering::SeqCst);
            LoaderConfig {
                entry_point: "from_file".to_owned(),
                ..LoaderConfig::default()
            }
        };

        let config = config_for(Platform::classify("x86_64", "SolarisXYZ"), read);
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        let config = config_for(Platform::classify("x86_64", "linux"), read);
        assert_eq!(config.entry_point, "from_file");
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn context_handle_sentinel() {
        assert_eq!(ContextHandle::SENTINEL.as_raw(), -1);
        assert!(ContextHandle::SENTINEL.is_sentinel());
        assert!(!ContextHandle(0x7f00_dead_beef).is_sentinel());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    mod glibc {
        use std::sync::OnceLock;

        use super::*;
        use crate::loader::shared::SharedBackend;

        // `long random(void)` matches the entry-point ABI and never returns
        // a negative value, which makes glibc a stand-in backend.
        fn libc_config() -> LoaderConfig {
            LoaderConfig {
                library_path: Some(PathBuf::from("libc.so.6")),
                entry_point: "random".to_owned(),
                ..LoaderConfig::default()
            }
        }

        #[test]
        fn enabled_backend_exposes_its_context() {
            let status = Loader::new(libc_config())
                .with_target("x86_64", "Linux")
                .initialize()
                .expect("supported platform");

            assert!(status.is_enabled(), "{:?}", status.error());
            assert_ne!(status.context(), -1);
            let backend = status.backend().expect("backend");
            assert_eq!(backend.context().as_raw(), status.context());
            assert_eq!(backend.source(), LibrarySource::Override);
            assert_eq!(backend.path(), Path::new("libc.so.6"));
            assert_eq!(backend.platform().to_string(), "linux-x86_64");
        }

        #[test]
        fn status_reads_are_stable() {
            let status = Loader::new(libc_config())
                .with_target("x86_64", "Linux")
                .initialize()
                .expect("supported platform");
            let first = (status.is_enabled(), status.context());
            for _ in 0..16 {
                assert_eq!((status.is_enabled(), status.context()), first);
            }
        }

        /// Path of the glibc image mapped into this test process.
        fn libc_image() -> PathBuf {
            let maps = fs::read_to_string("/proc/self/maps").expect("read maps");
            maps.lines()
                .filter_map(|line| line.split_whitespace().nth(5))
                .find(|path| {
                    let name = Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    name == "libc.so.6" || (name.starts_with("libc-") && name.ends_with(".so"))
                })
                .map(PathBuf::from)
                .expect("libc is mapped")
        }

        /// A resource directory holding glibc under the x86-64 Linux name.
        fn libc_resources() -> tempfile::TempDir {
            let dir = tempfile::tempdir().expect("tempdir");
            fs::copy(libc_image(), dir.path().join("secp256k1-native-linux-x86_64.so"))
                .expect("copy libc");
            dir
        }

        #[test]
        fn extracted_resource_is_loaded_and_unlinked() {
            let resources = libc_resources();
            let temp = tempfile::tempdir().expect("tempdir");
            let config = LoaderConfig {
                resource_dir: Some(resources.path().to_path_buf()),
                temp_dir: Some(temp.path().to_path_buf()),
                entry_point: "random".to_owned(),
                ..LoaderConfig::default()
            };

            let status = Loader::new(config)
                .with_target("x86_64", "Linux")
                .initialize()
                .expect("supported platform");

            assert!(status.is_enabled(), "{:?}", status.error());
            assert_ne!(status.context(), -1);
            let backend = status.backend().expect("backend");
            assert_eq!(backend.source(), LibrarySource::Extracted);
            assert!(backend.path().starts_with(temp.path()));
            // Mapped, so the directory entry is no longer needed.
            assert!(!backend.path().exists());
            assert!(fs::read_dir(temp.path()).expect("read_dir").next().is_none());

            drop(status);
            assert!(fs::read_dir(temp.path()).expect("read_dir").next().is_none());
        }

        #[test]
        fn shared_backend_leaves_no_extracted_file() {
            static TEMP: OnceLock<(tempfile::TempDir, tempfile::TempDir)> = OnceLock::new();
            fn dirs() -> &'static (tempfile::TempDir, tempfile::TempDir) {
                TEMP.get_or_init(|| (libc_resources(), tempfile::tempdir().expect("tempdir")))
            }
            static CELL: SharedBackend = SharedBackend::new(|| {
                let (resources, temp) = dirs();
                let config = LoaderConfig {
                    resource_dir: Some(resources.path().to_path_buf()),
                    temp_dir: Some(temp.path().to_path_buf()),
                    entry_point: "random".to_owned(),
                    ..LoaderConfig::default()
                };
                Loader::new(config).with_target("x86_64", "linux")
            });

            let status = CELL.get().expect("supported platform");
            assert!(status.is_enabled(), "{:?}", status.error());
            // The status is never dropped; the file must already be gone.
            let temp = &dirs().1;
            assert!(fs::read_dir(temp.path()).expect("read_dir").next().is_none());
        }

        #[test]
        fn missing_entry_point_is_a_link_failure() {
            let config = LoaderConfig {
                entry_point: "secp256k1_init_context".to_owned(),
                ..libc_config()
            };
            let status = Loader::new(config)
                .with_target("x86_64", "Linux")
                .initialize()
                .expect("supported platform");
            assert_eq!(status.error().map(LoadError::category), Some("link"));
            assert_eq!(status.context(), -1);
        }
    }
}
