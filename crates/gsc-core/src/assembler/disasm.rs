//! Bytecode disassembly and validation.
//!
//! Decoding checks the invariants the VM relies on: every opcode byte is
//! known to the table, every `str` operand points into the string pool, and
//! every jump lands inside the bytecode stream.

use std::fmt;

use thiserror::Error;

use super::stack::{read_function_table, read_string, StackFormatError};
use super::table::OpcodeTable;
use crate::ir::{Opcode, OperandKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DisasmError {
    #[error("unknown opcode byte {byte:#04x} at offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },

    #[error("instruction {opcode} at offset {offset} is truncated")]
    Truncated { offset: usize, opcode: Opcode },

    #[error("jump at offset {offset} targets {target}, outside the bytecode")]
    JumpOutOfRange { offset: usize, target: i64 },

    #[error("function '{name}' ({offset}+{size}) lies outside the bytecode")]
    FunctionOutOfRange { name: String, offset: u32, size: u32 },

    #[error("invalid stack region: {0}")]
    Stack(#[from] StackFormatError),
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedOperand {
    U8(u8),
    U16(u16),
    I32(i32),
    F32(f32),
    Str { offset: u32, value: String },
    /// Displacement plus the absolute target it resolves to.
    Rel { rel: i32, target: usize },
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInstruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Vec<DecodedOperand>,
}

/// Disassembly of one exported function.
#[derive(Debug, Clone, PartialEq)]
pub struct DisassembledFunction {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub instructions: Vec<DecodedInstruction>,
}

/// Decode a whole bytecode stream.
pub fn disassemble(
    bytecode: &[u8],
    stack: &[u8],
    table: &OpcodeTable,
) -> Result<Vec<DecodedInstruction>, DisasmError> {
    decode_range(bytecode, 0, bytecode.len(), stack, table)
}

/// Decode every function listed in the stack region's function table.
pub fn disassemble_functions(
    bytecode: &[u8],
    stack: &[u8],
    table: &OpcodeTable,
) -> Result<Vec<DisassembledFunction>, DisasmError> {
    read_function_table(stack)?
        .into_iter()
        .map(|entry| {
            let name = read_string(stack, entry.name_offset)?.to_string();
            let start = entry.offset as usize;
            let end = start + entry.size as usize;
            if end > bytecode.len() {
                return Err(DisasmError::FunctionOutOfRange {
                    name,
                    offset: entry.offset,
                    size: entry.size,
                });
            }
            Ok(DisassembledFunction {
                name,
                offset: entry.offset,
                size: entry.size,
                instructions: decode_range(bytecode, start, end, stack, table)?,
            })
        })
        .collect()
}

fn decode_range(
    bytecode: &[u8],
    start: usize,
    end: usize,
    stack: &[u8],
    table: &OpcodeTable,
) -> Result<Vec<DecodedInstruction>, DisasmError> {
    let mut instructions = Vec::new();
    let mut at = start;
    while at < end {
        let offset = at;
        let byte = bytecode[at];
        let opcode = table
            .opcode(byte)
            .ok_or(DisasmError::UnknownOpcode { offset, byte })?;
        let inst_end = offset + opcode.encoded_size();
        if inst_end > end {
            return Err(DisasmError::Truncated { offset, opcode });
        }
        at += 1;

        let mut operands = Vec::with_capacity(opcode.operands().len());
        for kind in opcode.operands() {
            let raw = &bytecode[at..at + kind.size()];
            at += kind.size();
            let word = || [raw[0], raw[1], raw[2], raw[3]];
            operands.push(match kind {
                OperandKind::U8 => DecodedOperand::U8(raw[0]),
                OperandKind::U16 => DecodedOperand::U16(u16::from_le_bytes([raw[0], raw[1]])),
                OperandKind::I32 => DecodedOperand::I32(i32::from_le_bytes(word())),
                OperandKind::F32 => DecodedOperand::F32(f32::from_le_bytes(word())),
                OperandKind::Str => {
                    let offset = u32::from_le_bytes(word());
                    let value = read_string(stack, offset)?.to_string();
                    DecodedOperand::Str { offset, value }
                }
                OperandKind::Rel => {
                    let rel = i32::from_le_bytes(word());
                    let target = inst_end as i64 + rel as i64;
                    if target < 0 || target as usize > bytecode.len() {
                        return Err(DisasmError::JumpOutOfRange { offset, target });
                    }
                    DecodedOperand::Rel {
                        rel,
                        target: target as usize,
                    }
                }
            });
        }

        instructions.push(DecodedInstruction {
            offset,
            opcode,
            operands,
        });
    }
    Ok(instructions)
}

impl fmt::Display for DecodedOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedOperand::U8(v) => write!(f, "{v}"),
            DecodedOperand::U16(v) => write!(f, "{v}"),
            DecodedOperand::I32(v) => write!(f, "{v}"),
            DecodedOperand::F32(v) => write!(f, "{v:?}"),
            DecodedOperand::Str { value, .. } => write!(f, "{value:?}"),
            DecodedOperand::Rel { target, .. } => write!(f, "@{target:04x}"),
        }
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}  {}", self.offset, self.opcode)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{operand}")?;
        }
        Ok(())
    }
}
