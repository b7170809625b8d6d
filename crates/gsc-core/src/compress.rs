//! Stack region compression.
//!
//! The VM inflates the trailing artifact region with zlib, so the stack is
//! stored as a zlib stream at the best compression level. The original
//! length travels alongside, since the consumer sizes its output buffer
//! from it.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

/// A compressed stack region and its inflated length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedStack {
    pub bytes: Vec<u8>,
    pub original_len: usize,
}

impl CompressedStack {
    pub fn compressed_len(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("corrupt zlib stream: {0}")]
    Corrupt(#[from] std::io::Error),

    #[error("stack inflated to {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Compress a stack region. Empty input gives empty output.
///
/// The encoder writes into memory, so an error here means the codec itself
/// misbehaved.
pub fn compress(stack: &[u8]) -> std::io::Result<CompressedStack> {
    if stack.is_empty() {
        return Ok(CompressedStack {
            bytes: Vec::new(),
            original_len: 0,
        });
    }
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(stack.len() / 2), Compression::best());
    encoder.write_all(stack)?;
    Ok(CompressedStack {
        bytes: encoder.finish()?,
        original_len: stack.len(),
    })
}

/// Inflate a stack region, requiring exactly `original_len` bytes.
pub fn decompress(bytes: &[u8], original_len: usize) -> Result<Vec<u8>, DecompressError> {
    if bytes.is_empty() && original_len == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(original_len);
    // Read one byte past the expected end so oversized streams are caught
    ZlibDecoder::new(bytes)
        .take(original_len as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() != original_len {
        return Err(DecompressError::LengthMismatch {
            expected: original_len,
            actual: out.len(),
        });
    }
    Ok(out)
}
