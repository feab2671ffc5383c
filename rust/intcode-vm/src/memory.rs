//! Growable integer tape holding both code and data.
//!
//! Accesses past the end are not faults. Reads there see 0 without touching
//! the tape; writes zero-extend it up to and including the written address.

/// The VM's memory tape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<i64>,
}

impl Memory {
    /// Create a tape holding a copy of `image`.
    pub fn new(image: &[i64]) -> Self {
        Self {
            cells: image.to_vec(),
        }
    }

    /// Number of cells currently materialized.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read a cell. Unmaterialized cells read as 0 and stay unmaterialized.
    pub fn load(&self, addr: usize) -> i64 {
        self.cells.get(addr).copied().unwrap_or(0)
    }

    /// Write a cell, growing the tape if `addr` lies beyond the end.
    ///
    /// # Panics
    ///
    /// Panics if the tape cannot be grown to `addr + 1` cells.
    pub fn store(&mut self, addr: usize, value: i64) {
        self.ensure(addr);
        self.cells[addr] = value;
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.cells
    }

    fn ensure(&mut self, addr: usize) {
        if addr >= self.cells.len() {
            self.cells.resize(addr + 1, 0);
        }
    }
}

impl From<Vec<i64>> for Memory {
    fn from(cells: Vec<i64>) -> Self {
        Self { cells }
    }
}
