use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An immutable program image.
///
/// Cloning a `Program` is cheap: the cells are shared. Every VM copies the
/// cells into its own memory when a run starts, so VMs built from the same
/// image never observe each other's writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    cells: Arc<[i64]>,
}

impl Program {
    pub fn new(cells: Vec<i64>) -> Self {
        Self {
            cells: cells.into(),
        }
    }

    pub fn cells(&self) -> &[i64] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns a copy of this image with one cell replaced, growing the image
    /// with zeroes if `address` lies past its end.
    pub fn patch(&self, address: usize, value: i64) -> Program {
        let mut cells = self.cells.to_vec();
        if address >= cells.len() {
            cells.resize(address + 1, 0);
        }
        cells[address] = value;
        Program::new(cells)
    }

    /// Encodes the image as a postcard binary (`.icb`).
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl From<Vec<i64>> for Program {
    fn from(cells: Vec<i64>) -> Self {
        Program::new(cells)
    }
}

impl From<&[i64]> for Program {
    fn from(cells: &[i64]) -> Self {
        Program::new(cells.to_vec())
    }
}

impl std::fmt::Display for Program {
    /// Formats the image in its source form.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", cell)?;
        }
        Ok(())
    }
}
