//! Load errors.
//!
//! Only [`LoadFailure`] is fatal. The other [`LoadError`] variants mean the
//! request should fall through to the VM's default loader.

use std::fmt;
use std::path::PathBuf;

use gsc_core::{BuildError, CanonicalName, ResolveError};
use thiserror::Error;

/// Pipeline stage a load failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Source,
    Compile,
    Assemble,
    Pack,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Compile => "compile",
            Stage::Assemble => "assemble",
            Stage::Pack => "pack",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal load failure, in the form the host's error dialog prints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to compile '{name}'.\n{message}")]
pub struct LoadFailure {
    pub name: CanonicalName,
    pub stage: Stage,
    pub message: String,
}

impl LoadFailure {
    pub fn from_build(name: &CanonicalName, err: &BuildError) -> Self {
        let stage = match err {
            BuildError::Compile(_) => Stage::Compile,
            BuildError::Assemble(_) => Stage::Assemble,
            BuildError::Compress(_) | BuildError::Pack(_) => Stage::Pack,
        };
        Self {
            name: name.clone(),
            stage,
            message: err.to_string(),
        }
    }

    pub fn from_source(name: &CanonicalName, err: &SourceError) -> Self {
        Self {
            name: name.clone(),
            stage: Stage::Source,
            message: err.to_string(),
        }
    }
}

/// Errors reading script source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a load that produced no artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("no source for script '{0}'")]
    SourceNotFound(CanonicalName),

    #[error(transparent)]
    Failed(#[from] LoadFailure),
}

impl LoadError {
    /// Whether the request should fall through to the default loader.
    pub fn is_not_handled(&self) -> bool {
        !matches!(self, LoadError::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_format() {
        let failure = LoadFailure {
            name: CanonicalName::new("maps/mp/gametypes/_playercards"),
            stage: Stage::Compile,
            message: "error: expected ';'".into(),
        };
        assert_eq!(
            failure.to_string(),
            "Failed to compile 'maps/mp/gametypes/_playercards'.\nerror: expected ';'"
        );
        assert!(!LoadError::from(failure).is_not_handled());
        assert!(LoadError::Resolve(ResolveError::UnknownToken(0)).is_not_handled());
    }

    #[test]
    fn test_build_error_stage() {
        let name = CanonicalName::new("x");
        let err = gsc_core::Pipeline::default().build("x", b"main(").unwrap_err();
        let failure = LoadFailure::from_build(&name, &err);
        assert_eq!(failure.stage, Stage::Compile);
        assert!(failure.message.contains("--> x:1:"), "{}", failure.message);
    }
}
