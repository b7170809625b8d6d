//! Script artifact server.
//!
//! Sits between the host's asset loader and the compiler pipeline:
//! resolves requested names, reads source, builds artifacts once per name
//! and hands out shared references to them.

pub mod cache;
pub mod config;
pub mod error;
pub mod provider;
pub mod server;

pub use cache::{ArtifactCache, CacheStats};
pub use config::{ConfigError, HostConfig};
pub use error::{LoadError, LoadFailure, SourceError, Stage};
pub use provider::{FsSource, MemorySource, SourceProvider};
pub use server::{AssetKind, PreloadReport, PreloadedScript, ScriptServer};
