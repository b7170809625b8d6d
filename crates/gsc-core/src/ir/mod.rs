//! Linear intermediate representation.
//!
//! The IR is a flat instruction list per function, with jump targets held
//! as symbolic labels. The assembler resolves labels to byte displacements
//! and string operands to stack offsets.

pub mod local_scope;
pub mod lower;
pub mod opcode;

pub use local_scope::LocalScope;
pub use lower::lower_file;
pub use opcode::{Opcode, OperandKind};

use serde::Serialize;
use std::fmt;

/// A compiled script module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrModule {
    /// Canonical script name.
    pub name: String,
    pub includes: Vec<String>,
    pub animtree: Option<String>,
    pub functions: Vec<IrFunction>,
}

impl IrModule {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A jump target inside one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LabelId(pub u32);

/// A lowered function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrFunction {
    pub name: String,
    pub params: u8,
    /// All locals, parameters first, indexed by slot.
    pub locals: Vec<String>,
    pub instructions: Vec<Instruction>,
    /// Label → index of the instruction it precedes. `None` is unbound.
    pub labels: Vec<Option<usize>>,
}

impl IrFunction {
    pub fn label_target(&self, label: LabelId) -> Option<usize> {
        self.labels.get(label.0 as usize).copied().flatten()
    }
}

/// One instruction with its operands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }

    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    U8(u8),
    U16(u16),
    I32(i32),
    F32(f32),
    Str(String),
    Label(LabelId),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::U8(_) => OperandKind::U8,
            Operand::U16(_) => OperandKind::U16,
            Operand::I32(_) => OperandKind::I32,
            Operand::F32(_) => OperandKind::F32,
            Operand::Str(_) => OperandKind::Str,
            Operand::Label(_) => OperandKind::Rel,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::U8(v) => write!(f, "{v}"),
            Operand::U16(v) => write!(f, "{v}"),
            Operand::I32(v) => write!(f, "{v}"),
            Operand::F32(v) => write!(f, "{v:?}"),
            Operand::Str(s) => write!(f, "{s:?}"),
            Operand::Label(l) => write!(f, "L{}", l.0),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{operand}")?;
        }
        Ok(())
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}({}) locals={}", self.name, self.params, self.locals.len())?;
        for (index, inst) in self.instructions.iter().enumerate() {
            for (label, target) in self.labels.iter().enumerate() {
                if *target == Some(index) {
                    writeln!(f, "  L{label}:")?;
                }
            }
            writeln!(f, "    {inst}")?;
        }
        for (label, target) in self.labels.iter().enumerate() {
            if *target == Some(self.instructions.len()) {
                writeln!(f, "  L{label}:")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; script {}", self.name)?;
        for include in &self.includes {
            writeln!(f, "; include {include}")?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
