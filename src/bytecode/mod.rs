pub mod decode;
pub mod disasm;
pub mod ir;
pub mod op;

pub use decode::{Instruction, Parameter};
pub use ir::Program;
pub use op::{AddressingMode, Opcode};
