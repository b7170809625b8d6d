//! The abstract instruction set.
//!
//! Every opcode has a fixed operand layout. The byte each opcode encodes to
//! is not defined here: that comes from an
//! [`OpcodeTable`](crate::assembler::OpcodeTable) so the same IR can target
//! different VM builds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded operand kinds, all little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    U8,
    U16,
    I32,
    F32,
    /// `u32` offset of a NUL-terminated string in the stack region.
    Str,
    /// `i32` displacement from the end of the instruction.
    Rel,
}

impl OperandKind {
    /// Encoded width in bytes.
    pub fn size(self) -> usize {
        match self {
            OperandKind::U8 => 1,
            OperandKind::U16 => 2,
            OperandKind::I32 | OperandKind::F32 | OperandKind::Str | OperandKind::Rel => 4,
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident [$($kind:ident),*] ),* $(,)?) => {
        /// VM opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Opcode {
            $( $(#[$doc])* $name, )*
        }

        impl Opcode {
            /// Every opcode, in declaration order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name),)*
                }
            }

            /// Operand layout following the opcode byte.
            pub fn operands(self) -> &'static [OperandKind] {
                match self {
                    $(Opcode::$name => &[$(OperandKind::$kind),*],)*
                }
            }
        }
    };
}

opcodes! {
    /// Function prologue: parameter count, total local count.
    CreateLocalVariables [U8, U8],
    /// Return `undefined` and finish the thread.
    End [],
    /// Return the value on top of the stack.
    Return [],

    GetUndefined [],
    GetZero [],
    GetByte [U8],
    GetNegByte [U8],
    GetUnsignedShort [U16],
    GetNegUnsignedShort [U16],
    GetInteger [I32],
    GetFloat [F32],
    GetString [Str],
    GetIString [Str],
    /// Pops z, y, x and pushes the vector (x, y, z).
    GetVector [],
    GetLevel [],
    GetSelf [],
    GetGame [],
    GetAnim [],
    GetEmptyArray [],
    GetLocalFunction [Str],
    /// Script path, function name.
    GetFarFunction [Str, Str],

    EvalLocal [U8],
    EvalLocalRef [U8],
    /// Pops an object, pushes its field.
    EvalField [Str],
    EvalFieldRef [Str],
    /// Pops an array then an index, pushes the element.
    EvalArray [],
    EvalArrayRef [],
    EvalSize [],
    /// Pops a reference then a value and stores the value.
    SetVariable [],
    Inc [],
    Dec [],

    Plus [],
    Minus [],
    Multiply [],
    Divide [],
    Modulus [],
    BitOr [],
    BitExOr [],
    BitAnd [],
    ShiftLeft [],
    ShiftRight [],
    Equality [],
    Inequality [],
    LessThan [],
    GreaterThan [],
    LessEqual [],
    GreaterEqual [],
    BoolNot [],
    BoolComplement [],

    Jump [Rel],
    /// Pops a value and jumps if it is false.
    JumpOnFalse [Rel],
    /// Jumps keeping the value if it is true, otherwise pops it.
    JumpOnTrueExpr [Rel],
    /// Jumps keeping the value if it is false, otherwise pops it.
    JumpOnFalseExpr [Rel],

    /// Marks the start of a script call's arguments.
    PreScriptCall [],
    /// Builtin name, argument count.
    CallBuiltin [Str, U8],
    CallBuiltinMethod [Str, U8],
    ScriptLocalCall [Str],
    ScriptLocalMethodCall [Str],
    ScriptLocalThreadCall [Str, U8],
    ScriptLocalMethodThreadCall [Str, U8],
    ScriptFarCall [Str, Str],
    ScriptFarMethodCall [Str, Str],
    ScriptFarThreadCall [Str, Str, U8],
    ScriptFarMethodThreadCall [Str, Str, U8],
    ScriptPointerCall [],
    ScriptPointerMethodCall [],
    ScriptPointerThreadCall [U8],
    ScriptPointerMethodThreadCall [U8],
    /// Discards the value on top of the stack.
    DecTop [],

    Wait [],
    WaitTillFrameEnd [],
    /// Pops an object then an event, then the notify arguments up to the marker.
    Notify [],
    EndOn [],
    WaitTill [],
    /// Stores the next waittill parameter into a local.
    SafeSetWaittillVariable [U8],
    ClearParams [],
}

impl Opcode {
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.mnemonic() == mnemonic)
    }

    /// Encoded size including the opcode byte.
    pub fn encoded_size(self) -> usize {
        1 + self.operands().iter().map(|k| k.size()).sum::<usize>()
    }

    pub fn is_jump(self) -> bool {
        self.operands().contains(&OperandKind::Rel)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
