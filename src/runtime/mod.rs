pub mod channel;
pub mod io;
pub mod memory;
pub mod runtime_error;
pub mod vm;

pub use runtime_error::{ErrorKind, PortError, RuntimeError};
pub use vm::{State, Vm, VmConfig};
