use crate::bytecode::Program;
use thiserror::Error;

/// A source token that is not a base-10 signed 64-bit integer.
///
/// `index` is the 0-based position of the token in the comma-separated list,
/// which is also the memory cell it would have initialised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cell {index}: invalid integer {token:?}")]
pub struct LoadError {
    pub index: usize,
    pub token: String,
}

/// Parses a program from its textual form: one line of comma-separated
/// integers. Whitespace around each token is ignored.
pub fn parse_program(source: &str) -> Result<Program, LoadError> {
    source
        .trim()
        .split(',')
        .enumerate()
        .map(|(index, token)| {
            let token = token.trim();
            token.parse::<i64>().map_err(|_| LoadError {
                index,
                token: token.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Program::new)
}

impl std::str::FromStr for Program {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_program(s)
    }
}
