//! Memory interface consumed by the execution engine.

use crate::dram::MemoryError;

/// System bus trait for instruction fetch and data access.
///
/// The engine only ever issues 1-, 4- and 8-byte accesses; the
/// width-dispatching [`load`](Bus::load)/[`store`](Bus::store) helpers
/// reject anything else. All methods complete synchronously; a returned
/// error aborts the step that issued the access.
pub trait Bus {
    fn read8(&self, addr: u64) -> Result<u8, MemoryError>;
    fn read32(&self, addr: u64) -> Result<u32, MemoryError>;
    fn read64(&self, addr: u64) -> Result<u64, MemoryError>;

    fn write8(&mut self, addr: u64, val: u8) -> Result<(), MemoryError>;
    fn write32(&mut self, addr: u64, val: u32) -> Result<(), MemoryError>;
    fn write64(&mut self, addr: u64, val: u64) -> Result<(), MemoryError>;

    /// Read `width` bytes at `addr`, zero-extended to 64 bits.
    fn load(&self, addr: u64, width: u64) -> Result<u64, MemoryError> {
        match width {
            1 => self.read8(addr).map(u64::from),
            4 => self.read32(addr).map(u64::from),
            8 => self.read64(addr),
            _ => Err(MemoryError::UnsupportedWidth { addr, width }),
        }
    }

    /// Write the low `width` bytes of `value` to `addr`.
    fn store(&mut self, addr: u64, width: u64, value: u64) -> Result<(), MemoryError> {
        match width {
            1 => self.write8(addr, value as u8),
            4 => self.write32(addr, value as u32),
            8 => self.write64(addr, value),
            _ => Err(MemoryError::UnsupportedWidth { addr, width }),
        }
    }

    /// Fetch the instruction word at `pc`. The sequential next PC is always
    /// `pc + 4` for this fixed-width encoding, so only the word is returned.
    fn fetch(&self, pc: u64) -> Result<u32, MemoryError> {
        self.read32(pc)
    }
}
