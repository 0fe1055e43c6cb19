// ── Resource providers ────────────────────────────────────────────────────────
//
// A resource is a pre-built library addressed by its conventional name,
// `coop/rchain/secp256k1-native-<os>-<arch>.<ext>`.  Providers only hand out
// bytes; writing them to disk is `loader::extract`'s job.

use std::{
    borrow::Cow,
    fmt, fs, io,
    path::{Path, PathBuf},
};

mod generated {
    include!(concat!(env!("OUT_DIR"), "/embedded.rs"));
}

/// A source of named resource bytes.
pub trait ResourceProvider: Send + Sync {
    /// Look up `name`.
    ///
    /// `Ok(None)` means the resource does not exist; `Err` means it exists
    /// but could not be read.
    fn open(&self, name: &str) -> io::Result<Option<Cow<'static, [u8]>>>;
}

impl<P: ResourceProvider + ?Sized> ResourceProvider for Box<P> {
    fn open(&self, name: &str) -> io::Result<Option<Cow<'static, [u8]>>> {
        (**self).open(name)
    }
}

// ── Embedded ──────────────────────────────────────────────────────────────────

/// Libraries compiled into this binary by `build.rs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Embedded;

impl Embedded {
    /// Names of every embedded resource.
    pub fn names() -> impl Iterator<Item = &'static str> {
        generated::EMBEDDED.iter().map(|(name, _)| *name)
    }
}

impl ResourceProvider for Embedded {
    fn open(&self, name: &str) -> io::Result<Option<Cow<'static, [u8]>>> {
        Ok(generated::EMBEDDED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, bytes)| Cow::Borrowed(*bytes)))
    }
}

// ── Directory ─────────────────────────────────────────────────────────────────

/// Resources read at runtime from a directory, by file name.
///
/// The namespace part of a resource name is ignored, so
/// `coop/rchain/secp256k1-native-linux-x86_64.so` resolves to
/// `<root>/secp256k1-native-linux-x86_64.so`.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> PathBuf {
        let file_name = name.rsplit('/').next().unwrap_or(name);
        self.root.join(file_name)
    }
}

impl ResourceProvider for DirectoryResources {
    fn open(&self, name: &str) -> io::Result<Option<Cow<'static, [u8]>>> {
        match fs::read(self.path_of(name)) {
            Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Tries each provider in order; the first one that has the resource wins.
///
/// A read error stops the search: a present-but-broken resource must not be
/// masked by a different copy further down the chain.
#[derive(Default)]
pub struct Chain {
    providers: Vec<Box<dyn ResourceProvider>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl ResourceProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ResourceProvider for Chain {
    fn open(&self, name: &str) -> io::Result<Option<Cow<'static, [u8]>>> {
        for provider in &self.providers {
            if let Some(bytes) = provider.open(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("providers", &self.providers.len())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
