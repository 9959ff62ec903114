//! Operand decoding.
//!
//! Every instruction carries its register indices in the same positions:
//! rd at [11:7], rs1 at [19:15], rs2 at [24:20]. What differs per format is
//! which source registers are actually read and how the immediate is
//! assembled from the scattered immediate fields.

use super::bits::{bit, bits, sext};
use crate::cpu::regs::RegisterFile;

/// Encoding class of an instruction, selecting the immediate recipe and
/// which source operands are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Upper-immediate: imm = bits[31:12] sign-extended, shifted left 12.
    U,
    /// Register + 12-bit immediate: imm = bits[31:20] sign-extended.
    I,
    /// Shift-immediate: imm = bits[25:20] sign-extended from 6 bits.
    /// Bit 5 of the shamt is validated by the 32-bit shift executors,
    /// not here.
    Is,
    /// Store: imm = {bits[31:25], bits[11:7]} sign-extended from 12 bits.
    S,
    /// Branch: imm = {bit31, bit7, bits[30:25], bits[11:8], 0}
    /// sign-extended from 13 bits.
    B,
    /// Jump: imm = {bit31, bits[19:12], bit20, bits[30:21], 0}
    /// sign-extended from 21 bits.
    J,
    /// Register-register: no immediate.
    R,
    /// No operands.
    N,
}

/// Decoded operands for one step. Unused fields stay zero; the action bound
/// to the matching format never reads them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Operands {
    pub rd: usize,
    pub src1: u64,
    pub src2: u64,
    pub imm: u64,
}

/// Extract operands from `word` according to `format`, reading source
/// register values out of `regs`.
pub fn decode_operand(word: u32, format: Format, regs: &RegisterFile) -> Operands {
    let rd = bits(word, 11, 7) as usize;
    let rs1 = bits(word, 19, 15) as usize;
    let rs2 = bits(word, 24, 20) as usize;

    let mut ops = Operands {
        rd,
        ..Operands::default()
    };

    match format {
        Format::U => {
            ops.imm = sext(bits(word, 31, 12), 20) << 12;
        }
        Format::I => {
            ops.src1 = regs.read(rs1);
            ops.imm = sext(bits(word, 31, 20), 12);
        }
        Format::Is => {
            ops.src1 = regs.read(rs1);
            ops.imm = sext(bits(word, 25, 20), 6);
        }
        Format::S => {
            ops.src1 = regs.read(rs1);
            ops.src2 = regs.read(rs2);
            ops.imm = sext((bits(word, 31, 25) << 5) | bits(word, 11, 7), 12);
        }
        Format::B => {
            ops.src1 = regs.read(rs1);
            ops.src2 = regs.read(rs2);
            ops.imm = sext(
                (bit(word, 31) << 12)
                    | (bit(word, 7) << 11)
                    | (bits(word, 30, 25) << 5)
                    | (bits(word, 11, 8) << 1),
                13,
            );
        }
        Format::J => {
            ops.imm = sext(
                (bit(word, 31) << 20)
                    | (bits(word, 19, 12) << 12)
                    | (bit(word, 20) << 11)
                    | (bits(word, 30, 21) << 1),
                21,
            );
        }
        Format::R => {
            ops.src1 = regs.read(rs1);
            ops.src2 = regs.read(rs2);
        }
        Format::N => {}
    }

    ops
}
