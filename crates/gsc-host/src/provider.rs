//! Script source providers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use gsc_core::CanonicalName;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::HostConfig;
use crate::error::SourceError;

/// Script extension, stripped from scanned file names.
pub const SCRIPT_EXTENSION: &str = "gsc";

/// A byte source keyed by canonical script name.
pub trait SourceProvider: Send + Sync {
    /// Fetch a script's source. `Ok(None)` means the provider has no such
    /// script.
    fn fetch(&self, name: &CanonicalName) -> Result<Option<Vec<u8>>, SourceError>;

    /// Every script name this provider can serve.
    fn scan(&self) -> Result<Vec<CanonicalName>, SourceError>;
}

/// In-memory scripts.
#[derive(Debug, Default)]
pub struct MemorySource {
    scripts: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: &str, source: impl Into<Vec<u8>>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&self, name: &str, source: impl Into<Vec<u8>>) {
        self.scripts.write().insert(name.to_string(), source.into());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.scripts.write().remove(name).is_some()
    }
}

impl SourceProvider for MemorySource {
    fn fetch(&self, name: &CanonicalName) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.scripts.read().get(name.as_str()).cloned())
    }

    fn scan(&self) -> Result<Vec<CanonicalName>, SourceError> {
        let names: BTreeSet<_> = self.scripts.read().keys().cloned().collect();
        Ok(names.into_iter().map(CanonicalName::new).collect())
    }
}

/// Scripts on disk: explicit overrides first, then the search directories.
#[derive(Debug, Clone, Default)]
pub struct FsSource {
    overrides: BTreeMap<String, PathBuf>,
    dirs: Vec<PathBuf>,
}

fn io_error(path: &Path, source: io::Error) -> SourceError {
    SourceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FsSource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            overrides: BTreeMap::new(),
            dirs,
        }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            overrides: config.scripts.clone(),
            dirs: config.script_dirs.clone(),
        }
    }

    pub fn with_override(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.to_string(), path.into());
        self
    }

    fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SourceError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }

    fn scan_dir(root: &Path, dir: &Path, names: &mut BTreeSet<String>) -> Result<(), SourceError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(dir, e)),
        };
        for entry in entries {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.is_dir() {
                Self::scan_dir(root, &path, names)?;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
                continue;
            }
            if let Ok(relative) = path.with_extension("").strip_prefix(root) {
                let name: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect();
                names.insert(name.join("/"));
            }
        }
        Ok(())
    }
}

/// A name that stays inside whatever directory it is joined onto.
fn is_relative_name(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl SourceProvider for FsSource {
    fn fetch(&self, name: &CanonicalName) -> Result<Option<Vec<u8>>, SourceError> {
        // An override that is missing on disk is a configuration error
        if let Some(path) = self.overrides.get(name.as_str()) {
            debug!(script = %name, path = %path.display(), "reading override");
            return fs::read(path).map(Some).map_err(|e| io_error(path, e));
        }
        if !is_relative_name(name.as_str()) {
            debug!(script = %name, "name escapes the script directories");
            return Ok(None);
        }
        for dir in &self.dirs {
            let path = dir.join(format!("{name}.{SCRIPT_EXTENSION}"));
            if let Some(bytes) = Self::read_optional(&path)? {
                debug!(script = %name, path = %path.display(), "reading script");
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn scan(&self) -> Result<Vec<CanonicalName>, SourceError> {
        let mut names: BTreeSet<String> = self.overrides.keys().cloned().collect();
        for dir in &self.dirs {
            Self::scan_dir(dir, dir, &mut names)?;
        }
        Ok(names.into_iter().map(CanonicalName::new).collect())
    }
}
