use crate::bytecode::Program;
use crate::bytecode::decode::{Instruction, decode};
use crate::bytecode::op::{AddressingMode, Opcode};
use crate::runtime::memory::Memory;

/// One line of a listing: a decoded instruction or a cell that does not
/// decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Instruction(Instruction),
    Data(i64),
}

/// Sweeps `program` from address 0, decoding instructions back to back.
/// A cell that is not a valid instruction word becomes a single data entry
/// and the sweep resumes at the next cell.
pub fn sweep(program: &Program) -> Vec<(usize, Entry)> {
    let mut memory = Memory::from_program(program, usize::MAX);
    let mut entries = Vec::new();
    let mut pc = 0;

    while pc < program.len() {
        match decode(&mut memory, pc) {
            Ok(instr) => {
                entries.push((pc, Entry::Instruction(instr)));
                pc += instr.width();
            }
            Err(_) => {
                entries.push((pc, Entry::Data(program.cells()[pc])));
                pc += 1;
            }
        }
    }

    entries
}

/// Addresses named by immediate jump operands.
fn collect_jump_targets(entries: &[(usize, Entry)]) -> Vec<usize> {
    let mut targets = Vec::new();

    for (_, entry) in entries {
        let Entry::Instruction(instr) = entry else {
            continue;
        };
        if !matches!(instr.opcode, Opcode::JumpIfTrue | Opcode::JumpIfFalse) {
            continue;
        }

        let dest = instr.param(1);
        if dest.mode == AddressingMode::Immediate {
            if let Ok(target) = usize::try_from(dest.operand) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
    }

    targets
}

/// Return disassembly as a String
pub fn listing(program: &Program) -> String {
    let entries = sweep(program);
    let jump_targets = collect_jump_targets(&entries);
    let mut output = String::new();

    for (address, entry) in &entries {
        output.push_str(&format!("{:04} ", address));

        if jump_targets.contains(address) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        match entry {
            Entry::Instruction(instr) => output.push_str(&instr.to_string()),
            Entry::Data(value) => output.push_str(&format!("{:<5} {}", "DATA", value)),
        }
        output.push('\n');
    }

    output
}

/// Print disassembly of a program
pub fn print_listing(program: &Program) {
    println!("=== INTCODE PROGRAM ===");
    println!("{} cells\n", program.len());
    print!("{}", listing(program));
}
