//! Host configuration.
//!
//! ```toml
//! script_dirs = ["raw/gsc"]
//! token_table = "tokens.toml"
//! opcode_table = "opcodes.toml"
//!
//! [scripts]
//! "maps/mp/gametypes/_playercards" = "raw/_playercards.gsc"
//! ```
//!
//! Relative paths are resolved against the directory holding the config
//! file, once, at load time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use gsc_core::{OpcodeTable, OpcodeTableError, TableError, TokenTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid token table '{}': {source}", path.display())]
    Tokens {
        path: PathBuf,
        #[source]
        source: TableError,
    },

    #[error("invalid opcode table '{}': {source}", path.display())]
    Opcodes {
        path: PathBuf,
        #[source]
        source: OpcodeTableError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Directories searched as `<dir>/<name>.gsc`, in order.
    pub script_dirs: Vec<PathBuf>,
    pub token_table: Option<PathBuf>,
    pub opcode_table: Option<PathBuf>,
    /// Per-script source overrides, checked before the search directories.
    pub scripts: BTreeMap<String, PathBuf>,
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl HostConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml(&text, base).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a config, resolving relative paths against `base`.
    pub fn from_toml(text: &str, base: &Path) -> Result<Self, toml::de::Error> {
        let config: HostConfig = toml::from_str(text)?;
        Ok(config.rebase(base))
    }

    fn rebase(mut self, base: &Path) -> Self {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.script_dirs.iter_mut().for_each(join);
        self.token_table.iter_mut().for_each(join);
        self.opcode_table.iter_mut().for_each(join);
        self.scripts.values_mut().for_each(join);
        self
    }

    /// Load the configured token table, or an empty one.
    pub fn load_token_table(&self) -> Result<TokenTable, ConfigError> {
        let Some(path) = &self.token_table else {
            return Ok(TokenTable::default());
        };
        TokenTable::from_toml(&read(path)?).map_err(|source| ConfigError::Tokens {
            path: path.clone(),
            source,
        })
    }

    /// Load the configured opcode table, or the built-in one.
    pub fn load_opcode_table(&self) -> Result<OpcodeTable, ConfigError> {
        let Some(path) = &self.opcode_table else {
            return Ok(OpcodeTable::v1());
        };
        OpcodeTable::from_toml(&read(path)?).map_err(|source| ConfigError::Opcodes {
            path: path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("host.toml");
        fs::write(
            &path,
            r#"
            script_dirs = ["raw/gsc", "/abs/scripts"]
            token_table = "tokens.toml"

            [scripts]
            "maps/mp/gametypes/_playercards" = "raw/_playercards.gsc"
            "#,
        )
        .unwrap();

        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.script_dirs, [dir.path().join("raw/gsc"), PathBuf::from("/abs/scripts")]);
        assert_eq!(config.token_table, Some(dir.path().join("tokens.toml")));
        assert_eq!(config.opcode_table, None);
        assert_eq!(
            config.scripts["maps/mp/gametypes/_playercards"],
            dir.path().join("raw/_playercards.gsc")
        );
    }

    #[test]
    fn test_tables() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("tokens.toml"),
            "version = \"custom\"\n[tokens]\n\"maps/mp/_load\" = 12\n",
        )
        .unwrap();
        let config = HostConfig::from_toml("token_table = \"tokens.toml\"", dir.path()).unwrap();

        let tokens = config.load_token_table().unwrap();
        assert_eq!(tokens.version(), "custom");
        assert_eq!(tokens.name(12).map(|n| n.as_str()), Some("maps/mp/_load"));
        assert_eq!(config.load_opcode_table().unwrap().version(), "v1");
        assert!(HostConfig::default().load_token_table().unwrap().is_empty());
    }

    #[test]
    fn test_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            HostConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));

        let path = dir.path().join("bad.toml");
        fs::write(&path, "script_dir = []").unwrap();
        assert!(matches!(HostConfig::load(&path), Err(ConfigError::Parse { .. })));

        let config = HostConfig::from_toml("opcode_table = \"nope.toml\"", dir.path()).unwrap();
        assert!(matches!(config.load_opcode_table(), Err(ConfigError::Io { .. })));
    }
}
