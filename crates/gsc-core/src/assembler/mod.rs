//! IR to bytecode assembly.
//!
//! Produces two byte streams: the instruction stream and the stack region
//! (function table plus string pool) that `str` operands point into. Jumps
//! are encoded relative to the end of the jumping instruction.

pub mod disasm;
pub mod stack;
pub mod table;

pub use disasm::{disassemble, disassemble_functions, DecodedInstruction, DecodedOperand, DisasmError};
pub use stack::{StackFormatError, StringPool};
pub use table::{OpcodeTable, OpcodeTableError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ir::{IrFunction, IrModule, Opcode, Operand, OperandKind};
use stack::{header_size, write_stack};

/// Largest region the artifact's signed 32-bit length fields can describe.
pub const MAX_REGION_LEN: usize = i32::MAX as usize;

/// Assembly error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssembleError {
    #[error("string {0:?} contains a NUL byte")]
    NulInString(String),

    #[error("label L{label} in function '{function}' is never bound")]
    UnboundLabel { function: String, label: u32 },

    #[error("{opcode} in function '{function}' expects operands {expected:?}, found {found:?}")]
    OperandMismatch {
        function: String,
        opcode: Opcode,
        expected: Vec<OperandKind>,
        found: Vec<OperandKind>,
    },

    #[error("{region} region is {len} bytes, which exceeds the 2147483647 byte limit")]
    TooLarge { region: &'static str, len: usize },
}

/// An exported function: where its code lives in the bytecode stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// Output of the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledOutput {
    pub bytecode: Vec<u8>,
    pub stack: Vec<u8>,
    pub functions: Vec<FunctionEntry>,
}

fn region_len(region: &'static str, len: usize) -> Result<u32, AssembleError> {
    if len > MAX_REGION_LEN {
        return Err(AssembleError::TooLarge { region, len });
    }
    Ok(len as u32)
}

/// Assemble a module with the given opcode encoding.
pub fn assemble(name: &str, module: &IrModule, table: &OpcodeTable) -> Result<AssembledOutput, AssembleError> {
    let header = header_size(module.functions.len());
    let mut pool = StringPool::new(region_len("stack", header)?);

    // Function names lead the pool
    let name_offsets = module
        .functions
        .iter()
        .map(|f| pool.intern(&f.name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut bytecode = Vec::new();
    let mut functions = Vec::with_capacity(module.functions.len());
    for function in &module.functions {
        let start = bytecode.len();
        encode_function(function, table, &mut pool, &mut bytecode)?;
        functions.push(FunctionEntry {
            name: function.name.clone(),
            offset: region_len("bytecode", start)?,
            size: region_len("bytecode", bytecode.len() - start)?,
        });
    }
    region_len("bytecode", bytecode.len())?;

    let stack = write_stack(&functions, &name_offsets, &pool);
    region_len("stack", stack.len())?;

    debug!(
        script = name,
        table = table.version(),
        bytecode_len = bytecode.len(),
        stack_len = stack.len(),
        functions = functions.len(),
        "assembled script"
    );

    Ok(AssembledOutput {
        bytecode,
        stack,
        functions,
    })
}

fn check_operands(function: &IrFunction, opcode: Opcode, operands: &[Operand]) -> Result<(), AssembleError> {
    let expected = opcode.operands();
    let matches = expected.len() == operands.len()
        && expected.iter().zip(operands).all(|(kind, operand)| *kind == operand.kind());
    if matches {
        return Ok(());
    }
    Err(AssembleError::OperandMismatch {
        function: function.name.clone(),
        opcode,
        expected: expected.to_vec(),
        found: operands.iter().map(Operand::kind).collect(),
    })
}

fn encode_function(
    function: &IrFunction,
    table: &OpcodeTable,
    pool: &mut StringPool,
    out: &mut Vec<u8>,
) -> Result<(), AssembleError> {
    // Pass 1: instruction offsets relative to the function start
    let mut offsets = Vec::with_capacity(function.instructions.len() + 1);
    let mut at = 0usize;
    for inst in &function.instructions {
        check_operands(function, inst.opcode, &inst.operands)?;
        offsets.push(at);
        at += inst.opcode.encoded_size();
    }
    offsets.push(at);

    // Pass 2: emit
    for (index, inst) in function.instructions.iter().enumerate() {
        out.push(table.byte(inst.opcode));
        let end = offsets[index + 1];
        for operand in &inst.operands {
            match operand {
                Operand::U8(v) => out.push(*v),
                Operand::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
                Operand::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
                Operand::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
                Operand::Str(s) => out.extend_from_slice(&pool.intern(s)?.to_le_bytes()),
                Operand::Label(label) => {
                    let target = function
                        .label_target(*label)
                        .and_then(|index| offsets.get(index).copied())
                        .ok_or_else(|| AssembleError::UnboundLabel {
                            function: function.name.clone(),
                            label: label.0,
                        })?;
                    let rel = i32::try_from(target as i64 - end as i64)
                        .map_err(|_| AssembleError::TooLarge { region: "bytecode", len: at })?;
                    out.extend_from_slice(&rel.to_le_bytes());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, LabelId};

    fn function(name: &str, instructions: Vec<Instruction>, labels: Vec<Option<usize>>) -> IrFunction {
        IrFunction {
            name: name.into(),
            params: 0,
            locals: Vec::new(),
            instructions,
            labels,
        }
    }

    fn module(functions: Vec<IrFunction>) -> IrModule {
        IrModule {
            name: "test".into(),
            includes: Vec::new(),
            animtree: None,
            functions,
        }
    }

    fn prologue() -> Instruction {
        Instruction::new(Opcode::CreateLocalVariables, vec![Operand::U8(0), Operand::U8(0)])
    }

    #[test]
    fn test_assemble_layout() {
        let table = OpcodeTable::v1();
        let ir = module(vec![
            function(
                "main",
                vec![
                    prologue(),
                    Instruction::new(Opcode::GetString, vec![Operand::Str("hello".into())]),
                    Instruction::simple(Opcode::Wait),
                    Instruction::simple(Opcode::End),
                ],
                vec![],
            ),
            function("init", vec![prologue(), Instruction::simple(Opcode::End)], vec![]),
        ]);
        let out = assemble("test", &ir, &table).unwrap();

        assert_eq!(out.bytecode.len(), 3 + 5 + 1 + 1 + 3 + 1);
        assert_eq!(out.bytecode[0], table.byte(Opcode::CreateLocalVariables));
        assert_eq!(
            out.functions,
            [
                FunctionEntry { name: "main".into(), offset: 0, size: 10 },
                FunctionEntry { name: "init".into(), offset: 10, size: 4 },
            ]
        );

        // header (4 + 2 * 12) then "main\0init\0hello\0"
        let pool_base = 28;
        assert_eq!(&out.stack[..4], &2u32.to_le_bytes());
        assert_eq!(&out.stack[pool_base..], b"main\0init\0hello\0");
        let hello = u32::from_le_bytes(out.bytecode[4..8].try_into().unwrap());
        assert_eq!(hello as usize, pool_base + 10);
    }

    #[test]
    fn test_jump_displacements() {
        let table = OpcodeTable::v1();
        let ir = module(vec![function(
            "f",
            vec![
                prologue(),                                                          // 0..3
                Instruction::new(Opcode::Jump, vec![Operand::Label(LabelId(0))]),    // 3..8
                Instruction::simple(Opcode::Wait),                                   // 8..9
                Instruction::new(Opcode::Jump, vec![Operand::Label(LabelId(1))]),    // 9..14
                Instruction::simple(Opcode::End),                                    // 14..15
            ],
            vec![Some(3), Some(1)],
        )]);
        let out = assemble("test", &ir, &table).unwrap();
        let forward = i32::from_le_bytes(out.bytecode[4..8].try_into().unwrap());
        let backward = i32::from_le_bytes(out.bytecode[10..14].try_into().unwrap());
        assert_eq!(forward, 1);
        assert_eq!(backward, 3 - 14);
    }

    #[test]
    fn test_assemble_errors() {
        let table = OpcodeTable::v1();
        let unbound = module(vec![function(
            "f",
            vec![Instruction::new(Opcode::Jump, vec![Operand::Label(LabelId(0))])],
            vec![None],
        )]);
        assert_eq!(
            assemble("t", &unbound, &table),
            Err(AssembleError::UnboundLabel { function: "f".into(), label: 0 })
        );

        let mismatch = module(vec![function(
            "f",
            vec![Instruction::new(Opcode::GetByte, vec![Operand::U16(1)])],
            vec![],
        )]);
        assert!(matches!(
            assemble("t", &mismatch, &table),
            Err(AssembleError::OperandMismatch { opcode: Opcode::GetByte, .. })
        ));

        let nul = module(vec![function(
            "f",
            vec![Instruction::new(Opcode::GetString, vec![Operand::Str("a\0".into())])],
            vec![],
        )]);
        assert!(matches!(assemble("t", &nul, &table), Err(AssembleError::NulInString(_))));
    }

    #[test]
    fn test_empty_module() {
        let out = assemble("empty", &module(vec![]), &OpcodeTable::v1()).unwrap();
        assert!(out.bytecode.is_empty());
        assert_eq!(out.stack, 0u32.to_le_bytes());
    }
}
