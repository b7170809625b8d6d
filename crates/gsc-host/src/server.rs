//! Request server: the entry point the host's asset loader calls.

use std::sync::Arc;

use gsc_core::{resolve, CanonicalName, Pipeline, ScriptArtifact, ScriptIdentifier, TokenTable};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{ArtifactCache, CacheStats};
use crate::config::{ConfigError, HostConfig};
use crate::error::{LoadError, LoadFailure, SourceError};
use crate::provider::{FsSource, SourceProvider};

/// Asset kinds the host asks for. Only script files are served here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    ScriptFile,
    RawFile,
    StringTable,
    Other(u32),
}

/// Entry points looked up after a script loads.
pub const ENTRY_POINTS: [&str; 2] = ["main", "init"];

/// Per-script preload result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadedScript {
    pub name: CanonicalName,
    /// Bytecode offset of `main`, if defined.
    pub main: Option<u32>,
    /// Bytecode offset of `init`, if defined.
    pub init: Option<u32>,
}

/// Outcome of [`ScriptServer::preload`].
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub loaded: Vec<PreloadedScript>,
    pub skipped: Vec<CanonicalName>,
    pub failed: Vec<LoadFailure>,
}

pub struct ScriptServer {
    tokens: TokenTable,
    pipeline: Pipeline,
    source: Arc<dyn SourceProvider>,
    cache: ArtifactCache,
}

impl ScriptServer {
    pub fn new(tokens: TokenTable, pipeline: Pipeline, source: Arc<dyn SourceProvider>) -> Self {
        Self {
            tokens,
            pipeline,
            source,
            cache: ArtifactCache::new(),
        }
    }

    /// Build a server from a host config: tables and filesystem sources.
    pub fn from_config(config: &HostConfig) -> Result<Self, ConfigError> {
        let tokens = config.load_token_table()?;
        let opcodes = config.load_opcode_table()?;
        info!(
            tokens = tokens.len(),
            token_version = tokens.version(),
            opcode_version = opcodes.version(),
            script_dirs = config.script_dirs.len(),
            overrides = config.scripts.len(),
            "script server configured"
        );
        Ok(Self::new(
            tokens,
            Pipeline::new(opcodes),
            Arc::new(FsSource::from_config(config)),
        ))
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn source(&self) -> &dyn SourceProvider {
        self.source.as_ref()
    }

    /// Resolve, then serve from cache or build.
    pub fn load(&self, identifier: &ScriptIdentifier) -> Result<Arc<ScriptArtifact>, LoadError> {
        let name = resolve(identifier, &self.tokens)?;
        if name.as_str() != identifier.name {
            debug!(requested = %identifier, script = %name, "resolved script token");
        }
        self.load_canonical(&name)
    }

    fn load_canonical(&self, name: &CanonicalName) -> Result<Arc<ScriptArtifact>, LoadError> {
        self.cache.get_or_build(name, || {
            let source = self
                .source
                .fetch(name)
                .map_err(|e: SourceError| LoadFailure::from_source(name, &e))?
                .ok_or_else(|| LoadError::SourceNotFound(name.clone()))?;

            let artifact = self
                .pipeline
                .build(name.as_str(), &source)
                .map_err(|e| LoadFailure::from_build(name, &e))?;
            info!(
                script = %name,
                len = artifact.len(),
                bytecode_len = artifact.bytecode_len(),
                compressed_len = artifact.compressed_len(),
                "built script"
            );
            Ok(artifact)
        })
    }

    /// The host asset hook.
    ///
    /// `Ok(None)` means "not handled here": the asset is not a script, the
    /// token is unknown, or there is no source. The host then falls back to
    /// its own loader.
    pub fn load_script(&self, kind: AssetKind, name: &str) -> Result<Option<Arc<ScriptArtifact>>, LoadFailure> {
        if kind != AssetKind::ScriptFile {
            return Ok(None);
        }
        match self.load(&ScriptIdentifier::parse(name)) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(LoadError::Failed(failure)) => {
                warn!(script = %failure.name, stage = %failure.stage, "script load failed");
                Err(failure)
            }
            Err(other) => {
                debug!(requested = name, reason = %other, "deferring to default loader");
                Ok(None)
            }
        }
    }

    /// Entry offset of `function` in a loaded script.
    pub fn function_handle(&self, name: &str, function: &str) -> Result<Option<u32>, LoadError> {
        let artifact = self.load(&ScriptIdentifier::parse(name))?;
        Ok(artifact.function(function).map(|f| f.offset))
    }

    /// Load every listed script, or every script the source provider can
    /// find when `names` is `None`.
    pub fn preload(&self, names: Option<&[CanonicalName]>) -> Result<PreloadReport, SourceError> {
        let names = match names {
            Some(names) => names.to_vec(),
            None => self.source.scan()?,
        };

        let mut report = PreloadReport::default();
        for name in names {
            match self.load_canonical(&name) {
                Ok(artifact) => {
                    let [main, init] =
                        ENTRY_POINTS.map(|entry| artifact.function(entry).map(|f| f.offset));
                    debug!(script = %name, ?main, ?init, "preloaded script");
                    report.loaded.push(PreloadedScript { name, main, init });
                }
                Err(LoadError::Failed(failure)) => report.failed.push(failure),
                Err(_) => report.skipped.push(name),
            }
        }
        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "preload finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::provider::MemorySource;

    fn server(source: MemorySource) -> ScriptServer {
        let mut tokens = TokenTable::new("test");
        tokens.insert(1234, "maps/mp/gametypes/_playercards").unwrap();
        ScriptServer::new(tokens, Pipeline::default(), Arc::new(source))
    }

    #[test]
    fn test_load_by_name_and_token() {
        let server = server(
            MemorySource::new().with("maps/mp/gametypes/_playercards", "init() {}\nmain() { wait 1; }"),
        );
        let by_token = server.load_script(AssetKind::ScriptFile, "1234").unwrap().unwrap();
        let by_name = server
            .load_script(AssetKind::ScriptFile, "maps/mp/gametypes/_playercards")
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&by_token, &by_name));
        assert_eq!(by_token.name(), "maps/mp/gametypes/_playercards");
        assert_eq!(server.stats().builds, 1);
        assert_eq!(server.function_handle("1234", "init").unwrap(), Some(0));
        assert!(server.function_handle("1234", "main").unwrap().is_some_and(|o| o > 0));
        assert_eq!(server.function_handle("1234", "onplayerconnect").unwrap(), None);
    }

    #[test]
    fn test_not_handled() {
        let server = server(MemorySource::new().with("a", "main() {}"));
        assert_eq!(server.load_script(AssetKind::RawFile, "a"), Ok(None));
        assert_eq!(server.load_script(AssetKind::ScriptFile, "0"), Ok(None));
        assert_eq!(server.load_script(AssetKind::ScriptFile, "99"), Ok(None));
        assert_eq!(server.load_script(AssetKind::ScriptFile, "missing"), Ok(None));
        assert!(matches!(
            server.load(&ScriptIdentifier::parse("missing")),
            Err(LoadError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_preload_reports_each_script() {
        let server = server(
            MemorySource::new()
                .with("good", "init() {}\nmain() {}")
                .with("helper", "f() {}")
                .with("bad", "main( {"),
        );
        let report = server.preload(None).unwrap();
        let loaded: Vec<_> = report.loaded.iter().map(|s| (s.name.as_str(), s.main.is_some(), s.init)).collect();
        assert_eq!(loaded, [("good", true, Some(0)), ("helper", false, None)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].stage, Stage::Compile);

        let report = server.preload(Some(&[CanonicalName::new("nope")][..])).unwrap();
        assert_eq!(report.skipped, [CanonicalName::new("nope")]);
    }
}
