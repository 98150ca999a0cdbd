use thiserror::Error;

use crate::frontend::loader::LoadError;

/// Failure of an I/O port or of the pre-input hook.
#[derive(Debug, Error)]
pub enum PortError {
    /// The other endpoint is gone (channel dropped, script exhausted, EOF).
    #[error("port closed")]
    Closed,

    #[error("console i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("pre-input hook failed: {0}")]
    Hook(String),
}

/// What went wrong while executing a program.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("unknown opcode {0}")]
    UnknownOpcode(i64),

    #[error("unknown addressing mode {0}")]
    UnknownAddressingMode(i64),

    #[error("write parameter in immediate mode")]
    InvalidWrite,

    #[error("address out of range: {0}")]
    AddressOutOfRange(i128),

    #[error("malformed program: {0}")]
    MalformedProgram(#[from] LoadError),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(u64),

    #[error(transparent)]
    Port(#[from] PortError),
}

/// A fatal fault, with the program counter of the instruction that raised it
/// when there is one.
#[derive(Debug)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub pc: Option<usize>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if let Some(pc) = self.pc {
            write!(f, " at pc {}", pc)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind) -> Self {
        RuntimeError { kind, pc: None }
    }

    /// Attaches the program counter unless one is already recorded.
    pub fn with_pc(mut self, pc: usize) -> Self {
        self.pc.get_or_insert(pc);
        self
    }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl From<PortError> for RuntimeError {
    fn from(err: PortError) -> Self {
        RuntimeError::new(ErrorKind::Port(err))
    }
}

impl From<LoadError> for RuntimeError {
    fn from(err: LoadError) -> Self {
        RuntimeError::new(ErrorKind::MalformedProgram(err))
    }
}
