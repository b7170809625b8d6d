//! Opcode byte assignments.
//!
//! Different VM builds number their opcodes differently. An [`OpcodeTable`]
//! maps every [`Opcode`] to the byte a particular build expects; the
//! assembler and disassembler take one explicitly.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::ir::Opcode;

/// Errors raised while loading an opcode table.
#[derive(Debug, Error)]
pub enum OpcodeTableError {
    #[error("invalid opcode table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown opcode mnemonic '{0}'")]
    UnknownMnemonic(String),

    #[error("opcode table has no byte for {0}")]
    Missing(Opcode),

    #[error("byte {byte:#04x} is assigned to both {first} and {second}")]
    DuplicateByte {
        byte: u8,
        first: Opcode,
        second: Opcode,
    },
}

#[derive(Deserialize)]
struct OpcodeTableFile {
    version: String,
    opcodes: BTreeMap<String, u8>,
}

/// A complete, bijective opcode → byte mapping.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    version: String,
    /// Indexed by `Opcode as usize`.
    encode: Vec<u8>,
    decode: [Option<Opcode>; 256],
}

impl OpcodeTable {
    /// The built-in table: opcodes numbered in declaration order from 0.
    pub fn v1() -> Self {
        let mut decode = [None; 256];
        let encode: Vec<u8> = Opcode::ALL
            .iter()
            .enumerate()
            .map(|(byte, &op)| {
                decode[byte] = Some(op);
                byte as u8
            })
            .collect();
        Self {
            version: "v1".to_string(),
            encode,
            decode,
        }
    }

    /// Build a table from explicit assignments. Every opcode must be
    /// present and no two may share a byte.
    pub fn from_assignments(
        version: impl Into<String>,
        assignments: impl IntoIterator<Item = (Opcode, u8)>,
    ) -> Result<Self, OpcodeTableError> {
        let mut encode: Vec<Option<u8>> = vec![None; Opcode::ALL.len()];
        let mut decode = [None; 256];
        for (op, byte) in assignments {
            if let Some(first) = decode[byte as usize] {
                if first != op {
                    return Err(OpcodeTableError::DuplicateByte {
                        byte,
                        first,
                        second: op,
                    });
                }
            }
            if let Some(old) = encode[op as usize].replace(byte) {
                decode[old as usize] = None;
            }
            decode[byte as usize] = Some(op);
        }

        let encode = Opcode::ALL
            .iter()
            .map(|&op| encode[op as usize].ok_or(OpcodeTableError::Missing(op)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: version.into(),
            encode,
            decode,
        })
    }

    /// Parse a table from TOML:
    ///
    /// ```toml
    /// version = "custom"
    /// [opcodes]
    /// End = 0x00
    /// Return = 0x01
    /// # ...every opcode
    /// ```
    pub fn from_toml(text: &str) -> Result<Self, OpcodeTableError> {
        let file: OpcodeTableFile = toml::from_str(text)?;
        let assignments = file
            .opcodes
            .into_iter()
            .map(|(mnemonic, byte)| {
                Opcode::from_mnemonic(&mnemonic)
                    .map(|op| (op, byte))
                    .ok_or(OpcodeTableError::UnknownMnemonic(mnemonic))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_assignments(file.version, assignments)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn byte(&self, op: Opcode) -> u8 {
        self.encode[op as usize]
    }

    pub fn opcode(&self, byte: u8) -> Option<Opcode> {
        self.decode[byte as usize]
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_toml(skip: Option<Opcode>, extra: &str) -> String {
        let table = OpcodeTable::v1();
        let mut text = String::from("version = \"test\"\n[opcodes]\n");
        for &op in Opcode::ALL {
            if Some(op) != skip {
                text.push_str(&format!("{} = {}\n", op.mnemonic(), 200 - table.byte(op)));
            }
        }
        text.push_str(extra);
        text
    }

    #[test]
    fn test_v1_is_bijective() {
        let table = OpcodeTable::v1();
        assert_eq!(table.version(), "v1");
        for &op in Opcode::ALL {
            assert_eq!(table.opcode(table.byte(op)), Some(op));
        }
        assert_eq!(table.opcode(255), None);
    }

    #[test]
    fn test_from_toml() {
        let table = OpcodeTable::from_toml(&v1_toml(None, "")).unwrap();
        assert_eq!(table.version(), "test");
        assert_eq!(table.byte(Opcode::CreateLocalVariables), 200);
        assert_eq!(table.opcode(199), Some(Opcode::End));
    }

    #[test]
    fn test_from_toml_rejects_incomplete_or_ambiguous() {
        assert!(matches!(
            OpcodeTable::from_toml(&v1_toml(Some(Opcode::Wait), "")),
            Err(OpcodeTableError::Missing(Opcode::Wait))
        ));
        assert!(matches!(
            OpcodeTable::from_toml(&v1_toml(None, "Bogus = 250\n")),
            Err(OpcodeTableError::UnknownMnemonic(m)) if m == "Bogus"
        ));
        assert!(matches!(
            OpcodeTable::from_assignments("dup", [(Opcode::End, 1), (Opcode::Return, 1)]),
            Err(OpcodeTableError::DuplicateByte { byte: 1, .. })
        ));
        assert!(OpcodeTable::from_toml("version = 3").is_err());
    }
}
