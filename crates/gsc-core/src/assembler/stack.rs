//! The stack region: function table plus string pool.
//!
//! ```text
//! u32 function_count
//! function_count × { u32 bytecode_offset, u32 bytecode_size, u32 name_offset }
//! NUL-terminated strings, deduplicated, in first-use order
//! ```
//!
//! All integers are little-endian. String offsets are absolute offsets into
//! the region.

use std::collections::HashMap;

use super::{AssembleError, FunctionEntry};

/// Size of one function table entry.
pub const FUNCTION_ENTRY_SIZE: usize = 12;

/// Bytes before the string pool for a script with `function_count` functions.
pub fn header_size(function_count: usize) -> usize {
    4 + FUNCTION_ENTRY_SIZE * function_count
}

/// Deduplicated NUL-terminated string storage placed after the header.
#[derive(Debug, Clone)]
pub struct StringPool {
    /// Raw bytes of all strings, terminators included.
    bytes: Vec<u8>,
    /// String -> offset relative to the pool start.
    cache: HashMap<String, u32>,
    /// Offset of the pool inside the stack region.
    base: u32,
}

impl StringPool {
    pub fn new(base: u32) -> Self {
        Self {
            bytes: Vec::new(),
            cache: HashMap::new(),
            base,
        }
    }

    /// Intern a string, returning its absolute offset in the stack region.
    ///
    /// If the string was already interned, returns the cached location.
    pub fn intern(&mut self, s: &str) -> Result<u32, AssembleError> {
        if let Some(&rel) = self.cache.get(s) {
            return Ok(self.base + rel);
        }
        if s.as_bytes().contains(&0) {
            return Err(AssembleError::NulInString(s.to_string()));
        }

        let rel = u32::try_from(self.bytes.len()).map_err(|_| AssembleError::TooLarge {
            region: "stack",
            len: self.bytes.len(),
        })?;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.cache.insert(s.to_string(), rel);

        Ok(self.base + rel)
    }

    /// Total size of the pool in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn base(&self) -> u32 {
        self.base
    }
}

/// Serialize the header and pool into the final stack region.
pub fn write_stack(functions: &[FunctionEntry], name_offsets: &[u32], pool: &StringPool) -> Vec<u8> {
    let mut out = Vec::with_capacity(header_size(functions.len()) + pool.size());
    out.extend_from_slice(&(functions.len() as u32).to_le_bytes());
    for (function, name_offset) in functions.iter().zip(name_offsets) {
        out.extend_from_slice(&function.offset.to_le_bytes());
        out.extend_from_slice(&function.size.to_le_bytes());
        out.extend_from_slice(&name_offset.to_le_bytes());
    }
    out.extend_from_slice(pool.bytes());
    out
}

/// A function table row as stored in the stack region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFunctionEntry {
    pub offset: u32,
    pub size: u32,
    pub name_offset: u32,
}

/// Errors reading a stack region back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackFormatError {
    #[error("stack region truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("string offset {0} is outside the string pool")]
    BadStringOffset(u32),

    #[error("string at offset {0} is not NUL-terminated")]
    Unterminated(u32),

    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(u32),
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, StackFormatError> {
    bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(StackFormatError::Truncated {
            needed: at + 4,
            available: bytes.len(),
        })
}

/// Read the function table from a stack region.
pub fn read_function_table(stack: &[u8]) -> Result<Vec<RawFunctionEntry>, StackFormatError> {
    let count = read_u32(stack, 0)? as usize;
    let needed = header_size(count);
    if stack.len() < needed {
        return Err(StackFormatError::Truncated {
            needed,
            available: stack.len(),
        });
    }
    (0..count)
        .map(|i| {
            let at = 4 + i * FUNCTION_ENTRY_SIZE;
            Ok(RawFunctionEntry {
                offset: read_u32(stack, at)?,
                size: read_u32(stack, at + 4)?,
                name_offset: read_u32(stack, at + 8)?,
            })
        })
        .collect()
}

/// Read a NUL-terminated string at `offset`, which must lie in the pool.
pub fn read_string(stack: &[u8], offset: u32) -> Result<&str, StackFormatError> {
    let count = read_u32(stack, 0)? as usize;
    let start = offset as usize;
    if start < header_size(count) || start >= stack.len() {
        return Err(StackFormatError::BadStringOffset(offset));
    }
    let tail = &stack[start..];
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(StackFormatError::Unterminated(offset))?;
    std::str::from_utf8(&tail[..end]).map_err(|_| StackFormatError::InvalidUtf8(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut pool = StringPool::new(16);
        let a = pool.intern("main").unwrap();
        let b = pool.intern("init").unwrap();
        assert_eq!(a, 16);
        assert_eq!(b, 21);
        assert_eq!(pool.intern("main").unwrap(), a);
        assert_eq!(pool.intern("init").unwrap(), b);
        assert_eq!(pool.bytes(), b"main\0init\0");
        assert!(matches!(pool.intern("a\0b"), Err(AssembleError::NulInString(_))));
    }

    #[test]
    fn test_write_and_read_back() {
        let mut pool = StringPool::new(header_size(1) as u32);
        let name = pool.intern("main").unwrap();
        let functions = [FunctionEntry {
            name: "main".into(),
            offset: 0,
            size: 7,
        }];
        let stack = write_stack(&functions, &[name], &pool);
        assert_eq!(stack.len(), header_size(1) + 5);
        assert_eq!(
            read_function_table(&stack).unwrap(),
            [RawFunctionEntry {
                offset: 0,
                size: 7,
                name_offset: name
            }]
        );
        assert_eq!(read_string(&stack, name).unwrap(), "main");
        assert_eq!(read_string(&stack, 4), Err(StackFormatError::BadStringOffset(4)));
        assert_eq!(read_string(&stack, 99), Err(StackFormatError::BadStringOffset(99)));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            read_function_table(&[2, 0, 0, 0, 1, 2]),
            Err(StackFormatError::Truncated { needed: 28, .. })
        ));
        assert!(read_function_table(&[]).is_err());
    }
}
