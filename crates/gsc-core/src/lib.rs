//! GSC script compiler
//!
//! Turns GSC source text into the packed artifact a script VM loads:
//! - pest grammar and AST for the script language
//! - lowering to a stack-machine IR with semantic checks
//! - assembly against a versioned opcode table
//! - zlib compression of the stack region and single-buffer packing
//!
//! # Architecture
//!
//! ```text
//!  identifier ──► Resolver ──► CanonicalName
//!                                   │
//!                             source bytes
//!                                   ▼
//!    ┌─────────┐    ┌─────────┐    ┌───────────┐    ┌──────────┐    ┌────────┐
//!    │  Parse  │ →  │  Lower  │ →  │ Assemble  │ →  │ Compress │ →  │  Pack  │
//!    │  (AST)  │    │  (IR)   │    │ bytecode  │    │  stack   │    │ buffer │
//!    └─────────┘    └─────────┘    │ + stack   │    └──────────┘    └────────┘
//!                                  └───────────┘
//! ```

// Core modules
pub mod diagnostic;
pub mod known;
pub mod resolver;
pub mod source;
pub mod syntax;

// Pipeline stages
pub mod artifact;
pub mod assembler;
pub mod compiler;
pub mod compress;
pub mod ir;
pub mod pipeline;

// Re-exports
pub use artifact::{pack, ArtifactMetadata, ArtifactView, PackError, ScriptArtifact};
pub use assembler::{assemble, AssembleError, AssembledOutput, FunctionEntry, OpcodeTable, OpcodeTableError};
pub use compiler::{compile, CompileError};
pub use compress::{compress, decompress, CompressedStack, DecompressError};
pub use diagnostic::{Diagnostic, Diagnostics};
pub use ir::IrModule;
pub use pipeline::{BuildError, Pipeline};
pub use resolver::{resolve, CanonicalName, ResolveError, ScriptIdentifier, TableError, TokenTable};
pub use source::{Source, Span};
pub use syntax::{parse, ParseError};
