use crate::bytecode::Program;
use crate::bytecode::decode::Parameter;
use crate::bytecode::op::AddressingMode;
use crate::runtime::runtime_error::ErrorKind;

/// Growable VM memory.
///
/// Both reads and writes go through [`Memory::ensure`], so touching any cell
/// below `limit` extends the buffer with zeroes up to that cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<i64>,
    limit: usize,
}

impl Memory {
    /// A fresh copy of `program`. Cells at or beyond `limit` are out of range.
    pub fn from_program(program: &Program, limit: usize) -> Self {
        Self {
            cells: program.cells().to_vec(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.cells
    }

    fn ensure(&mut self, index: usize) -> Result<(), ErrorKind> {
        if index >= self.limit {
            return Err(ErrorKind::AddressOutOfRange(index as i128));
        }
        if index >= self.cells.len() {
            self.cells.resize(index + 1, 0);
        }
        Ok(())
    }

    pub fn get(&mut self, index: usize) -> Result<i64, ErrorKind> {
        self.ensure(index)?;
        Ok(self.cells[index])
    }

    pub fn set(&mut self, index: usize, value: i64) -> Result<(), ErrorKind> {
        self.ensure(index)?;
        self.cells[index] = value;
        Ok(())
    }

    // Parameter resolution

    /// Effective memory index of a position or relative parameter.
    fn address(param: Parameter, relative_base: i64) -> Result<usize, ErrorKind> {
        let raw = match param.mode {
            AddressingMode::Position => param.operand as i128,
            AddressingMode::Relative => param.operand as i128 + relative_base as i128,
            AddressingMode::Immediate => return Err(ErrorKind::InvalidWrite),
        };
        usize::try_from(raw).map_err(|_| ErrorKind::AddressOutOfRange(raw))
    }

    /// Value of a parameter.
    pub fn read(&mut self, param: Parameter, relative_base: i64) -> Result<i64, ErrorKind> {
        match param.mode {
            AddressingMode::Immediate => Ok(param.operand),
            _ => {
                let index = Self::address(param, relative_base)?;
                self.get(index)
            }
        }
    }

    /// Stores `value` at the cell a parameter designates.
    pub fn write(
        &mut self,
        param: Parameter,
        relative_base: i64,
        value: i64,
    ) -> Result<(), ErrorKind> {
        let index = Self::address(param, relative_base)?;
        self.set(index, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(cells: &[i64]) -> Memory {
        Memory::from_program(&Program::from(cells), 1 << 16)
    }

    fn param(mode: AddressingMode, operand: i64) -> Parameter {
        Parameter { mode, operand }
    }

    #[test]
    fn test_read_modes() {
        let mut mem = memory(&[10, 20, 30, 40]);

        assert_eq!(mem.read(param(AddressingMode::Position, 2), 0).unwrap(), 30);
        assert_eq!(mem.read(param(AddressingMode::Immediate, 2), 0).unwrap(), 2);
        assert_eq!(mem.read(param(AddressingMode::Relative, -1), 4).unwrap(), 40);
    }

    #[test]
    fn test_write_beyond_end_zero_fills() {
        let mut mem = memory(&[1, 2]);
        mem.write(param(AddressingMode::Position, 6), 0, 7).unwrap();

        assert_eq!(mem.as_slice(), &[1, 2, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_read_beyond_end_grows() {
        let mut mem = memory(&[5]);
        assert_eq!(mem.read(param(AddressingMode::Position, 3), 0).unwrap(), 0);
        assert_eq!(mem.len(), 4);
    }

    #[test]
    fn test_relative_write() {
        let mut mem = memory(&[0; 4]);
        mem.write(param(AddressingMode::Relative, 2), 1, 9).unwrap();
        assert_eq!(mem.as_slice(), &[0, 0, 0, 9]);
    }

    #[test]
    fn test_immediate_write_rejected() {
        let mut mem = memory(&[1, 2, 3]);
        let err = mem.write(param(AddressingMode::Immediate, 1), 0, 99).unwrap_err();

        assert!(matches!(err, ErrorKind::InvalidWrite));
        assert_eq!(mem.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_negative_address() {
        let mut mem = memory(&[1, 2, 3]);
        assert!(matches!(
            mem.read(param(AddressingMode::Position, -1), 0),
            Err(ErrorKind::AddressOutOfRange(-1))
        ));
        assert!(matches!(
            mem.write(param(AddressingMode::Relative, -5), 2, 0),
            Err(ErrorKind::AddressOutOfRange(-3))
        ));
    }

    #[test]
    fn test_limit() {
        let mut mem = Memory::from_program(&Program::from(&[0i64][..]), 8);
        assert!(mem.set(7, 1).is_ok());
        assert!(matches!(mem.set(8, 1), Err(ErrorKind::AddressOutOfRange(8))));
        assert!(matches!(
            mem.read(param(AddressingMode::Position, i64::MAX), 0),
            Err(ErrorKind::AddressOutOfRange(_))
        ));
        assert_eq!(mem.len(), 8);
    }

    #[test]
    fn test_relative_sum_does_not_wrap() {
        let mut mem = memory(&[0]);
        assert!(matches!(
            mem.read(param(AddressingMode::Relative, i64::MAX), i64::MAX),
            Err(ErrorKind::AddressOutOfRange(_))
        ));
    }
}
