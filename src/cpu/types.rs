use serde::{Deserialize, Serialize};

/// Kind of memory access that faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    Fetch,
    Load,
    Store,
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessKind::Fetch => write!(f, "fetch"),
            AccessKind::Load => write!(f, "load"),
            AccessKind::Store => write!(f, "store"),
        }
    }
}

/// Fatal per-step conditions. The step that produced one commits no partial
/// register or memory write; the surrounding driver decides whether to halt
/// or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// No dispatch entry beyond the catch-all matched the word at `pc`.
    IllegalInstruction { pc: u64 },
    /// The memory interface rejected an access issued by the step at `pc`.
    Memory {
        pc: u64,
        addr: u64,
        access: AccessKind,
    },
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::IllegalInstruction { pc } => {
                write!(f, "illegal instruction at {pc:#x}")
            }
            Fault::Memory { pc, addr, access } => {
                write!(f, "{access} fault at {addr:#x} (pc {pc:#x})")
            }
        }
    }
}

impl std::error::Error for Fault {}

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// The step completed; resume at this PC.
    Continue(u64),
    /// The trap instruction fired: an intentional, clean stop carrying the
    /// trapping PC and the value held in a0. Not an error.
    Trap { pc: u64, value: u64 },
    /// The step failed atomically.
    Fault(Fault),
}

/// Internal early-exit signal raised by semantic actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    Trap { pc: u64, value: u64 },
    Fault(Fault),
}
