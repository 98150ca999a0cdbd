//! An Intcode virtual machine.
//!
//! - [`frontend`] parses the comma-separated source form into a [`Program`]
//! - [`bytecode`] holds the program image, instruction decoding and the
//!   disassembler
//! - [`runtime`] executes a program against pluggable input and output ports
//! - [`compose`] wires several VMs together over channels

pub mod bytecode;
pub mod compose;
pub mod frontend;
pub mod logging;
pub mod runtime;

pub use bytecode::Program;
pub use compose::ComposeError;
pub use frontend::{LoadError, parse_program};
pub use runtime::{ErrorKind, PortError, RuntimeError, State, Vm, VmConfig};
