//! Packed script artifacts.
//!
//! The VM expects one contiguous buffer:
//!
//! ```text
//! offset 0            : bytecode          (bytecode_len bytes)
//! offset bytecode_len : compressed stack  (compressed_len bytes)
//! ```
//!
//! with `len` recording the stack's inflated size. There is no padding and
//! no header inside the buffer; everything else travels as metadata.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::assembler::FunctionEntry;
use crate::compress::{decompress, CompressedStack, DecompressError};

/// Largest length the VM's signed 32-bit fields can hold.
pub const MAX_FIELD_LEN: usize = i32::MAX as usize;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("{field} of {len} bytes exceeds the 2147483647 byte limit")]
    TooLarge { field: &'static str, len: usize },

    #[error("buffer is {actual} bytes, metadata describes {expected}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Decompress(#[from] DecompressError),
}

fn check_field(field: &'static str, len: usize) -> Result<i32, PackError> {
    i32::try_from(len).map_err(|_| PackError::TooLarge { field, len })
}

/// A compiled, assembled and packed script.
///
/// Immutable once built. The artifact owns its buffer; callers get borrowed
/// views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptArtifact {
    name: String,
    len: usize,
    bytecode_len: usize,
    compressed_len: usize,
    buffer: Box<[u8]>,
    functions: Vec<FunctionEntry>,
}

/// Artifact metadata, as the VM sees it plus the export table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub len: usize,
    pub bytecode_len: usize,
    pub compressed_len: usize,
    pub bytecode_offset: usize,
    pub stack_offset: usize,
    #[serde(default)]
    pub functions: Vec<FunctionEntry>,
}

/// A borrowed view handed to the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactView<'a> {
    pub name: &'a str,
    pub len: i32,
    pub bytecode_len: i32,
    pub compressed_len: i32,
    pub buffer: &'a [u8],
}

impl<'a> ArtifactView<'a> {
    pub fn bytecode(&self) -> &'a [u8] {
        &self.buffer[..self.bytecode_len as usize]
    }

    pub fn compressed_stack(&self) -> &'a [u8] {
        &self.buffer[self.bytecode_len as usize..]
    }
}

/// Lay out bytecode and the compressed stack into one artifact.
pub fn pack(
    name: &str,
    bytecode: &[u8],
    stack: &CompressedStack,
    functions: Vec<FunctionEntry>,
) -> Result<ScriptArtifact, PackError> {
    check_field("stack", stack.original_len)?;
    check_field("bytecode", bytecode.len())?;
    check_field("compressed stack", stack.bytes.len())?;
    let total = bytecode.len() + stack.bytes.len();
    check_field("buffer", total)?;

    let mut buffer = Vec::with_capacity(total);
    buffer.extend_from_slice(bytecode);
    buffer.extend_from_slice(&stack.bytes);

    let artifact = ScriptArtifact {
        name: name.to_string(),
        len: stack.original_len,
        bytecode_len: bytecode.len(),
        compressed_len: stack.bytes.len(),
        buffer: buffer.into_boxed_slice(),
        functions,
    };
    debug!(
        script = name,
        len = artifact.len,
        bytecode_len = artifact.bytecode_len,
        compressed_len = artifact.compressed_len,
        bytecode_offset = artifact.bytecode_offset(),
        stack_offset = artifact.stack_offset(),
        "packed artifact"
    );
    Ok(artifact)
}

impl ScriptArtifact {
    /// Rebuild an artifact from a stored buffer and its metadata, checking
    /// that the buffer matches the layout and the stack inflates to `len`.
    pub fn from_parts(metadata: ArtifactMetadata, buffer: Vec<u8>) -> Result<Self, PackError> {
        let expected = metadata.bytecode_len + metadata.compressed_len;
        if buffer.len() != expected
            || metadata.bytecode_offset != 0
            || metadata.stack_offset != metadata.bytecode_len
        {
            return Err(PackError::LayoutMismatch {
                expected,
                actual: buffer.len(),
            });
        }
        check_field("stack", metadata.len)?;
        check_field("buffer", buffer.len())?;

        let artifact = Self {
            name: metadata.name,
            len: metadata.len,
            bytecode_len: metadata.bytecode_len,
            compressed_len: metadata.compressed_len,
            buffer: buffer.into_boxed_slice(),
            functions: metadata.functions,
        };
        artifact.inflate_stack()?;
        Ok(artifact)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inflated stack length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn bytecode_len(&self) -> usize {
        self.bytecode_len
    }

    pub fn compressed_len(&self) -> usize {
        self.compressed_len
    }

    pub fn bytecode_offset(&self) -> usize {
        0
    }

    pub fn stack_offset(&self) -> usize {
        self.bytecode_len
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.buffer[..self.bytecode_len]
    }

    pub fn compressed_stack(&self) -> &[u8] {
        &self.buffer[self.stack_offset()..]
    }

    /// Exported functions in definition order.
    pub fn functions(&self) -> &[FunctionEntry] {
        &self.functions
    }

    /// Entry offset of an exported function.
    pub fn function(&self, name: &str) -> Option<&FunctionEntry> {
        let name = name.to_ascii_lowercase();
        self.functions.iter().find(|f| f.name == name)
    }

    /// Inflate the stack region back to `len` bytes.
    pub fn inflate_stack(&self) -> Result<Vec<u8>, DecompressError> {
        decompress(self.compressed_stack(), self.len)
    }

    /// Borrowed view for the VM. Lengths were range checked at pack time.
    pub fn view(&self) -> ArtifactView<'_> {
        ArtifactView {
            name: &self.name,
            len: self.len as i32,
            bytecode_len: self.bytecode_len as i32,
            compressed_len: self.compressed_len as i32,
            buffer: &self.buffer,
        }
    }

    pub fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            name: self.name.clone(),
            len: self.len,
            bytecode_len: self.bytecode_len,
            compressed_len: self.compressed_len,
            bytecode_offset: self.bytecode_offset(),
            stack_offset: self.stack_offset(),
            functions: self.functions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::compress;
    use proptest::prelude::*;

    fn entry(name: &str, offset: u32, size: u32) -> FunctionEntry {
        FunctionEntry {
            name: name.into(),
            offset,
            size,
        }
    }

    #[test]
    fn test_pack_layout() {
        let stack = b"\x01\0\0\0\0\0\0\0\x03\0\0\0\x10\0\0\0main\0".to_vec();
        let compressed = compress(&stack).unwrap();
        let artifact = pack("a", &[1, 2, 3], &compressed, vec![entry("main", 0, 3)]).unwrap();

        assert_eq!(artifact.name(), "a");
        assert_eq!(artifact.len(), stack.len());
        assert_eq!(artifact.bytecode(), [1, 2, 3]);
        assert_eq!(artifact.stack_offset(), 3);
        assert_eq!(artifact.compressed_stack(), compressed.bytes.as_slice());
        assert_eq!(artifact.buffer().len(), 3 + compressed.bytes.len());
        assert_eq!(artifact.inflate_stack().unwrap(), stack);
        assert_eq!(artifact.function("MAIN").map(|f| f.offset), Some(0));
        assert!(artifact.function("init").is_none());

        let view = artifact.view();
        assert_eq!(view.bytecode_len, 3);
        assert_eq!(view.len as usize, stack.len());
        assert_eq!(view.compressed_stack(), artifact.compressed_stack());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let compressed = compress(b"\0\0\0\0").unwrap();
        let artifact = pack("maps/mp/b", &[7; 10], &compressed, Vec::new()).unwrap();
        let json = serde_json::to_string(&artifact.metadata()).unwrap();
        let metadata: ArtifactMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata.stack_offset, 10);
        let rebuilt = ScriptArtifact::from_parts(metadata, artifact.buffer().to_vec()).unwrap();
        assert_eq!(rebuilt, artifact);
    }

    #[test]
    fn test_from_parts_rejects_bad_layout() {
        let compressed = compress(b"\0\0\0\0").unwrap();
        let artifact = pack("c", &[7; 10], &compressed, Vec::new()).unwrap();

        let mut short = artifact.buffer().to_vec();
        short.pop();
        assert!(matches!(
            ScriptArtifact::from_parts(artifact.metadata(), short),
            Err(PackError::LayoutMismatch { .. })
        ));

        let mut wrong_len = artifact.metadata();
        wrong_len.len = 5;
        assert!(matches!(
            ScriptArtifact::from_parts(wrong_len, artifact.buffer().to_vec()),
            Err(PackError::Decompress(_))
        ));
    }

    proptest! {
        #[test]
        fn test_layout_invariant(
            bytecode in proptest::collection::vec(any::<u8>(), 0..512),
            stack in proptest::collection::vec(any::<u8>(), 0..2048),
        ) {
            let compressed = compress(&stack).unwrap();
            let artifact = pack("p", &bytecode, &compressed, Vec::new()).unwrap();
            prop_assert_eq!(artifact.buffer().len(), artifact.bytecode_len() + artifact.compressed_len());
            prop_assert_eq!(artifact.bytecode(), bytecode.as_slice());
            let inflated = decompress(&artifact.buffer()[artifact.bytecode_len()..], artifact.len()).unwrap();
            prop_assert_eq!(inflated, stack);
        }
    }
}
