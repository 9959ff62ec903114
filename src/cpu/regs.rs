//! Integer register file.

use serde::{Deserialize, Serialize};

/// Architectural index of the hard-wired zero register.
pub const REG_ZERO: usize = 0;
/// Architectural index of a0, the return-value register reported on traps.
pub const REG_A0: usize = 10;

/// 32 integer registers, 64 bits wide.
///
/// x0 is kept in the array like any other register: writes to it land
/// normally and are wiped by [`RegisterFile::reset_zero`] after every step.
/// An action that reads x0 mid-step, after writing it, therefore sees the
/// written value, matching the architecture-simulator quirk this engine
/// reproduces. Observably, x0 is zero whenever a step is not in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    regs: [u64; 32],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self { regs: [0; 32] }
    }

    /// Read register `idx` (0..=31).
    #[inline]
    pub fn read(&self, idx: usize) -> u64 {
        self.regs[idx]
    }

    /// Write register `idx` (0..=31). Writes to x0 are not refused here;
    /// see the type-level invariant.
    #[inline]
    pub fn write(&mut self, idx: usize, val: u64) {
        self.regs[idx] = val;
    }

    /// Force x0 back to zero. Called by the engine after every step.
    #[inline]
    pub(crate) fn reset_zero(&mut self) {
        self.regs[REG_ZERO] = 0;
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
