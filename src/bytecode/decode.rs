use crate::bytecode::op::{AddressingMode, Opcode};
use crate::runtime::memory::Memory;
use crate::runtime::runtime_error::ErrorKind;

/// A raw operand together with the mode it is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Parameter {
    pub mode: AddressingMode,
    pub operand: i64,
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            AddressingMode::Position => write!(f, "[{}]", self.operand),
            AddressingMode::Immediate => write!(f, "{}", self.operand),
            AddressingMode::Relative => write!(f, "[rb{:+}]", self.operand),
        }
    }
}

/// Decoded view of the instruction at some program counter.
///
/// Only the first `opcode.arity()` entries of `params` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    params: [Parameter; 3],
}

impl Instruction {
    pub fn params(&self) -> &[Parameter] {
        &self.params[..self.opcode.arity()]
    }

    pub fn param(&self, n: usize) -> Parameter {
        self.params()[n]
    }

    pub fn width(&self) -> usize {
        self.opcode.width()
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.params().is_empty() {
            return write!(f, "{}", self.opcode.mnemonic());
        }
        write!(f, "{:<5}", self.opcode.mnemonic())?;
        for (i, param) in self.params().iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, param)?;
        }
        Ok(())
    }
}

/// Splits an instruction word into its opcode and the modes of the
/// parameters that opcode consumes. Mode digits past the opcode's arity are
/// never inspected.
pub fn decode_word(word: i64) -> Result<(Opcode, [AddressingMode; 3]), ErrorKind> {
    let opcode = Opcode::from_code(word % 100).ok_or(ErrorKind::UnknownOpcode(word % 100))?;

    let mut modes = [AddressingMode::Position; 3];
    let mut digits = word / 100;
    for mode in modes.iter_mut().take(opcode.arity()) {
        let digit = digits % 10;
        *mode = AddressingMode::from_digit(digit).ok_or(ErrorKind::UnknownAddressingMode(digit))?;
        digits /= 10;
    }

    Ok((opcode, modes))
}

/// Decodes the instruction at `pc`. Operand cells past the end of memory read
/// as zero, like any other read.
pub fn decode(memory: &mut Memory, pc: usize) -> Result<Instruction, ErrorKind> {
    let (opcode, modes) = decode_word(memory.get(pc)?)?;

    let mut params = [Parameter::default(); 3];
    for (i, param) in params.iter_mut().enumerate().take(opcode.arity()) {
        *param = Parameter {
            mode: modes[i],
            operand: memory.get(pc + 1 + i)?,
        };
    }

    Ok(Instruction { opcode, params })
}
