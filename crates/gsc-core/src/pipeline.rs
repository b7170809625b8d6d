//! The build pipeline: compile, assemble, compress, pack.
//!
//! Every build owns its buffers end to end. Nothing is shared between
//! builds except the read-only opcode table, so a [`Pipeline`] can be used
//! from many threads at once.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::artifact::{pack, PackError, ScriptArtifact};
use crate::assembler::{assemble, AssembleError, OpcodeTable};
use crate::compiler::{compile, CompileError};
use crate::compress::compress;

/// A fatal build failure, tagged by stage.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    #[error("stack compression failed: {0}")]
    Compress(#[from] std::io::Error),

    #[error("packing failed: {0}")]
    Pack(#[from] PackError),
}

impl BuildError {
    /// Stage name used in load failures.
    pub fn stage(&self) -> &'static str {
        match self {
            BuildError::Compile(_) => "compile",
            BuildError::Assemble(_) => "assemble",
            BuildError::Compress(_) | BuildError::Pack(_) => "pack",
        }
    }
}

/// Stateless script builder.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    opcodes: Arc<OpcodeTable>,
}

impl Pipeline {
    pub fn new(opcodes: OpcodeTable) -> Self {
        Self {
            opcodes: Arc::new(opcodes),
        }
    }

    pub fn opcodes(&self) -> &OpcodeTable {
        &self.opcodes
    }

    /// Build an artifact from source bytes.
    pub fn build(&self, name: &str, source: &[u8]) -> Result<ScriptArtifact, BuildError> {
        let module = compile(name, source)?;
        let assembled = assemble(name, &module, &self.opcodes)?;
        let compressed = compress(&assembled.stack)?;
        debug!(
            script = name,
            stack_len = compressed.original_len,
            compressed_len = compressed.compressed_len(),
            "compressed stack"
        );
        let artifact = pack(name, &assembled.bytecode, &compressed, assembled.functions)?;
        Ok(artifact)
    }
}
