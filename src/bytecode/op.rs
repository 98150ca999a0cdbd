use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - Instruction tags
// =============================================================================

/// Operation tag stored in the two lowest decimal digits of an instruction
/// word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // arithmetic
    Add,
    Multiply,

    // I/O
    /// Store the next value read from the input port.
    Input,
    /// Emit a value to the output port.
    Output,

    // control flow
    /// Jump to the second parameter if the first is non-zero.
    JumpIfTrue,
    /// Jump to the second parameter if the first is zero.
    JumpIfFalse,

    // comparison
    LessThan,
    Equals,

    // registers
    AdjustRelativeBase,

    Halt,
}

impl Opcode {
    /// Maps the numeric code (`word % 100`) to an opcode.
    pub fn from_code(code: i64) -> Option<Self> {
        use Opcode::*;
        Some(match code {
            1 => Add,
            2 => Multiply,
            3 => Input,
            4 => Output,
            5 => JumpIfTrue,
            6 => JumpIfFalse,
            7 => LessThan,
            8 => Equals,
            9 => AdjustRelativeBase,
            99 => Halt,
            _ => return None,
        })
    }

    pub fn code(self) -> i64 {
        use Opcode::*;
        match self {
            Add => 1,
            Multiply => 2,
            Input => 3,
            Output => 4,
            JumpIfTrue => 5,
            JumpIfFalse => 6,
            LessThan => 7,
            Equals => 8,
            AdjustRelativeBase => 9,
            Halt => 99,
        }
    }

    /// Number of parameters that follow the instruction word.
    pub fn arity(self) -> usize {
        use Opcode::*;
        match self {
            Add | Multiply | LessThan | Equals => 3,
            JumpIfTrue | JumpIfFalse => 2,
            Input | Output | AdjustRelativeBase => 1,
            Halt => 0,
        }
    }

    /// Instruction width in cells, including the instruction word itself.
    pub fn width(self) -> usize {
        self.arity() + 1
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Add => "ADD",
            Multiply => "MUL",
            Input => "IN",
            Output => "OUT",
            JumpIfTrue => "JNZ",
            JumpIfFalse => "JZ",
            LessThan => "LT",
            Equals => "EQ",
            AdjustRelativeBase => "ARB",
            Halt => "HALT",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

// =============================================================================
// ADDRESSING MODES
// =============================================================================

/// How a parameter's raw operand is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressingMode {
    /// Operand is an absolute memory index.
    #[default]
    Position,
    /// Operand is the value itself. Not valid as a write target.
    Immediate,
    /// Operand is added to the relative base to form a memory index.
    Relative,
}

impl AddressingMode {
    pub fn from_digit(digit: i64) -> Option<Self> {
        match digit {
            0 => Some(AddressingMode::Position),
            1 => Some(AddressingMode::Immediate),
            2 => Some(AddressingMode::Relative),
            _ => None,
        }
    }
}
