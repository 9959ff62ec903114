//! Byte-addressable DRAM backing store.

use thiserror::Error;

use crate::bus::Bus;

/// Default DRAM base used by tests and simple drivers.
pub const DRAM_BASE: u64 = 0x8000_0000;

/// Memory access errors. The engine maps these into per-step
/// [`Fault::Memory`](crate::Fault::Memory) outcomes carrying the faulting PC
/// and access kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("out-of-bounds memory access at {0:#x}")]
    OutOfBounds(u64),

    #[error("misaligned access at {0:#x}")]
    Misaligned(u64),

    #[error("unsupported {width}-byte access at {addr:#x}")]
    UnsupportedWidth { addr: u64, width: u64 },
}

impl MemoryError {
    /// The guest address the failing access targeted.
    pub fn address(&self) -> u64 {
        match self {
            MemoryError::OutOfBounds(addr) | MemoryError::Misaligned(addr) => *addr,
            MemoryError::UnsupportedWidth { addr, .. } => *addr,
        }
    }
}

/// Flat little-endian memory image starting at `base`.
pub struct Dram {
    base: u64,
    data: Vec<u8>,
}

impl Dram {
    /// Create a new DRAM image of `size` bytes at `base`, zero-initialised.
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Copy a raw image into memory at guest address `addr`.
    pub fn load_image(&mut self, addr: u64, image: &[u8]) -> Result<(), MemoryError> {
        let off = self.offset(addr, image.len())?;
        self.data[off..off + image.len()].copy_from_slice(image);
        Ok(())
    }

    fn offset(&self, addr: u64, size: usize) -> Result<usize, MemoryError> {
        let off = addr
            .checked_sub(self.base)
            .ok_or(MemoryError::OutOfBounds(addr))? as usize;
        let end = off
            .checked_add(size)
            .ok_or(MemoryError::OutOfBounds(addr))?;
        if end > self.data.len() {
            return Err(MemoryError::OutOfBounds(addr));
        }
        Ok(off)
    }
}

impl Bus for Dram {
    fn read8(&self, addr: u64) -> Result<u8, MemoryError> {
        let off = self.offset(addr, 1)?;
        Ok(self.data[off])
    }

    fn read32(&self, addr: u64) -> Result<u32, MemoryError> {
        if addr % 4 != 0 {
            return Err(MemoryError::Misaligned(addr));
        }
        let off = self.offset(addr, 4)?;
        let bytes: [u8; 4] = self.data[off..off + 4].try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    fn read64(&self, addr: u64) -> Result<u64, MemoryError> {
        if addr % 8 != 0 {
            return Err(MemoryError::Misaligned(addr));
        }
        let off = self.offset(addr, 8)?;
        let bytes: [u8; 8] = self.data[off..off + 8].try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    fn write8(&mut self, addr: u64, val: u8) -> Result<(), MemoryError> {
        let off = self.offset(addr, 1)?;
        self.data[off] = val;
        Ok(())
    }

    fn write32(&mut self, addr: u64, val: u32) -> Result<(), MemoryError> {
        if addr % 4 != 0 {
            return Err(MemoryError::Misaligned(addr));
        }
        let off = self.offset(addr, 4)?;
        self.data[off..off + 4].copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    fn write64(&mut self, addr: u64, val: u64) -> Result<(), MemoryError> {
        if addr % 8 != 0 {
            return Err(MemoryError::Misaligned(addr));
        }
        let off = self.offset(addr, 8)?;
        self.data[off..off + 8].copy_from_slice(&val.to_le_bytes());
        Ok(())
    }
}
