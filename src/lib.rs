//! RISC-V64 integer instruction interpreter core.
//!
//! One [`Engine::step`] call turns a raw 32-bit instruction word plus the
//! current processor state into a state mutation and a next program
//! counter. Instruction recognition uses an ordered table of wildcard bit
//! patterns; the first matching entry selects the operand format and the
//! semantic action.
//!
//! The surrounding simulator owns the register file and memory and drives
//! the fetch-execute loop; the engine owns only the immutable dispatch
//! table.
//!
//! ```
//! use rv64_core::{Bus, Dram, Engine, RegisterFile, StepOutcome};
//!
//! let engine = Engine::new().unwrap();
//! let mut regs = RegisterFile::new();
//! let mut dram = Dram::new(0x8000_0000, 4096);
//!
//! // addi x5, x0, 1
//! dram.write32(0x8000_0000, 0x00100293).unwrap();
//! let outcome = engine.step(0x8000_0000, &mut regs, &mut dram);
//!
//! assert_eq!(outcome, StepOutcome::Continue(0x8000_0004));
//! assert_eq!(regs.read(5), 1);
//! ```

pub mod bus;
pub mod cpu;
pub mod dram;
pub mod engine;

pub use bus::Bus;
pub use cpu::core::Engine;
pub use cpu::regs::{REG_A0, REG_ZERO, RegisterFile};
pub use cpu::types::{AccessKind, Fault, StepOutcome};
pub use dram::{DRAM_BASE, Dram, MemoryError};
pub use engine::decode::{Format, Operands};
pub use engine::pattern::{Pattern, TableError};
