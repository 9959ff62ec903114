//! Engine, register file and step outcome types.

pub mod core;
pub mod regs;
pub mod types;

pub use self::core::Engine;
pub use regs::{REG_A0, REG_ZERO, RegisterFile};
pub use types::{AccessKind, Fault, StepOutcome};
