//! Ordered dispatch table binding bit patterns to semantic actions.
//!
//! Matching walks the table in declaration order and the first full match
//! wins, so specializations (`li`, `seqz`, `beqz`) sit above their general
//! forms and the all-wildcard illegal-instruction entry is always last.
//! The table is built once, validated, and never mutated afterwards.

use crate::bus::Bus;
use crate::cpu::regs::{REG_A0, RegisterFile};
use crate::cpu::types::{AccessKind, Fault, Stop};
use crate::dram::MemoryError;

use super::decode::{Format, Operands};
use super::pattern::{Pattern, TableError};

/// Per-step execution context handed to semantic actions.
///
/// `dnpc` starts at the sequential next PC and is overwritten at most once,
/// by whichever control-transfer action fires.
pub(crate) struct Step<'a> {
    pub pc: u64,
    pub dnpc: u64,
    pub ops: Operands,
    pub regs: &'a mut RegisterFile,
    pub bus: &'a mut dyn Bus,
}

type Exec = Result<(), Stop>;

impl Step<'_> {
    /// Write the destination register.
    #[inline]
    fn wr(&mut self, val: u64) {
        self.regs.write(self.ops.rd, val);
    }

    /// Write the destination with the low 32 bits of `val`, sign-extended
    /// back to 64. Every `*w` action funnels through here.
    #[inline]
    fn wr32(&mut self, val: u64) {
        self.wr(val as u32 as i32 as i64 as u64);
    }

    /// Effective address of a load/store: src1 + immediate.
    #[inline]
    fn ea(&self) -> u64 {
        self.ops.src1.wrapping_add(self.ops.imm)
    }

    /// Read `width` bytes at the effective address, zero-extended. The
    /// access completes before any destination write, so a failing load
    /// leaves the register file untouched.
    fn load(&mut self, width: u64) -> Result<u64, Stop> {
        let addr = self.ea();
        self.bus
            .load(addr, width)
            .map_err(|e| self.mem_fault(e, AccessKind::Load))
    }

    /// Write the low `width` bytes of src2 to the effective address.
    fn store(&mut self, width: u64) -> Exec {
        let addr = self.ea();
        let value = self.ops.src2;
        self.bus
            .store(addr, width, value)
            .map_err(|e| self.mem_fault(e, AccessKind::Store))
    }

    /// Redirect the committed next PC to pc + immediate when `taken`.
    #[inline]
    fn branch(&mut self, taken: bool) {
        if taken {
            self.dnpc = self.pc.wrapping_add(self.ops.imm);
        }
    }

    fn mem_fault(&self, e: MemoryError, access: AccessKind) -> Stop {
        Stop::Fault(Fault::Memory {
            pc: self.pc,
            addr: e.address(),
            access,
        })
    }

    fn illegal(&self) -> Stop {
        Stop::Fault(Fault::IllegalInstruction { pc: self.pc })
    }
}

pub(crate) type Action = fn(&mut Step<'_>) -> Exec;

/// One dispatch entry: recognizer pattern, operand format, bound action.
pub(crate) struct Entry {
    pub name: &'static str,
    pub pattern: Pattern,
    pub format: Format,
    pub action: Action,
}

// ---------------------------------------------------------------------------
// Semantic actions
// ---------------------------------------------------------------------------

fn lui(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.imm);
    Ok(())
}

fn auipc(s: &mut Step<'_>) -> Exec {
    s.wr(s.pc.wrapping_add(s.ops.imm));
    Ok(())
}

// -- Loads and stores -------------------------------------------------------

fn lb(s: &mut Step<'_>) -> Exec {
    let v = s.load(1)?;
    s.wr(v as u8 as i8 as i64 as u64);
    Ok(())
}

fn lbu(s: &mut Step<'_>) -> Exec {
    let v = s.load(1)?;
    s.wr(v);
    Ok(())
}

fn lw(s: &mut Step<'_>) -> Exec {
    let v = s.load(4)?;
    s.wr(v as u32 as i32 as i64 as u64);
    Ok(())
}

fn ld(s: &mut Step<'_>) -> Exec {
    let v = s.load(8)?;
    s.wr(v);
    Ok(())
}

fn sb(s: &mut Step<'_>) -> Exec {
    s.store(1)
}

fn sw(s: &mut Step<'_>) -> Exec {
    s.store(4)
}

fn sd(s: &mut Step<'_>) -> Exec {
    s.store(8)
}

// -- Immediate arithmetic ---------------------------------------------------

fn li(s: &mut Step<'_>) -> Exec {
    // addi with rs1 = x0.
    s.wr(s.ops.imm);
    Ok(())
}

fn addi(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1.wrapping_add(s.ops.imm));
    Ok(())
}

fn slti(s: &mut Step<'_>) -> Exec {
    s.wr(((s.ops.src1 as i64) < (s.ops.imm as i64)) as u64);
    Ok(())
}

fn seqz(s: &mut Step<'_>) -> Exec {
    // sltiu rd, rs1, 1.
    s.wr((s.ops.src1 < 1) as u64);
    Ok(())
}

fn sltiu(s: &mut Step<'_>) -> Exec {
    s.wr((s.ops.src1 < s.ops.imm) as u64);
    Ok(())
}

fn xori(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 ^ s.ops.imm);
    Ok(())
}

fn ori(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 | s.ops.imm);
    Ok(())
}

fn andi(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 & s.ops.imm);
    Ok(())
}

fn addiw(s: &mut Step<'_>) -> Exec {
    s.wr32(s.ops.src1.wrapping_add(s.ops.imm));
    Ok(())
}

// -- Immediate shifts -------------------------------------------------------

fn slli(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 << (s.ops.imm & 0x3f));
    Ok(())
}

fn srli(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 >> (s.ops.imm & 0x3f));
    Ok(())
}

fn srai(s: &mut Step<'_>) -> Exec {
    s.wr(((s.ops.src1 as i64) >> (s.ops.imm & 0x3f)) as u64);
    Ok(())
}

/// The `*w` shift-immediate encodings only allow 5-bit shift amounts; a set
/// bit 5 in the shamt field is an illegal encoding, checked here uniformly.
#[inline]
fn wide_shamt(s: &Step<'_>) -> Result<u32, Stop> {
    if s.ops.imm & 0x20 != 0 {
        return Err(s.illegal());
    }
    Ok((s.ops.imm & 0x1f) as u32)
}

fn slliw(s: &mut Step<'_>) -> Exec {
    let shamt = wide_shamt(s)?;
    s.wr32(((s.ops.src1 as u32) << shamt) as u64);
    Ok(())
}

fn srliw(s: &mut Step<'_>) -> Exec {
    let shamt = wide_shamt(s)?;
    s.wr32(((s.ops.src1 as u32) >> shamt) as u64);
    Ok(())
}

fn sraiw(s: &mut Step<'_>) -> Exec {
    let shamt = wide_shamt(s)?;
    s.wr32(((s.ops.src1 as i32) >> shamt) as u32 as u64);
    Ok(())
}

// -- Register-register, 64-bit ----------------------------------------------

fn add(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1.wrapping_add(s.ops.src2));
    Ok(())
}

fn sub(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1.wrapping_sub(s.ops.src2));
    Ok(())
}

fn sll(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 << (s.ops.src2 & 0x3f));
    Ok(())
}

fn slt(s: &mut Step<'_>) -> Exec {
    s.wr(((s.ops.src1 as i64) < (s.ops.src2 as i64)) as u64);
    Ok(())
}

fn sltu(s: &mut Step<'_>) -> Exec {
    s.wr((s.ops.src1 < s.ops.src2) as u64);
    Ok(())
}

fn xor(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 ^ s.ops.src2);
    Ok(())
}

fn srl(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 >> (s.ops.src2 & 0x3f));
    Ok(())
}

fn sra(s: &mut Step<'_>) -> Exec {
    s.wr(((s.ops.src1 as i64) >> (s.ops.src2 & 0x3f)) as u64);
    Ok(())
}

fn or(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 | s.ops.src2);
    Ok(())
}

fn and(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1 & s.ops.src2);
    Ok(())
}

fn mul(s: &mut Step<'_>) -> Exec {
    s.wr(s.ops.src1.wrapping_mul(s.ops.src2));
    Ok(())
}

fn mulh(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as i64 as i128;
    let b = s.ops.src2 as i64 as i128;
    s.wr(((a.wrapping_mul(b) >> 64) as i64) as u64);
    Ok(())
}

fn mulhsu(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as i64 as i128;
    let b = s.ops.src2 as i128;
    s.wr(((a.wrapping_mul(b) >> 64) as i64) as u64);
    Ok(())
}

fn mulhu(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as u128;
    let b = s.ops.src2 as u128;
    s.wr((a.wrapping_mul(b) >> 64) as u64);
    Ok(())
}

fn div(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as i64;
    let b = s.ops.src2 as i64;
    let q = if b == 0 {
        -1
    } else if a == i64::MIN && b == -1 {
        i64::MIN
    } else {
        a / b
    };
    s.wr(q as u64);
    Ok(())
}

fn divu(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1;
    let b = s.ops.src2;
    s.wr(if b == 0 { u64::MAX } else { a / b });
    Ok(())
}

fn rem(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as i64;
    let b = s.ops.src2 as i64;
    let r = if b == 0 {
        a
    } else if a == i64::MIN && b == -1 {
        0
    } else {
        a % b
    };
    s.wr(r as u64);
    Ok(())
}

fn remu(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1;
    let b = s.ops.src2;
    s.wr(if b == 0 { a } else { a % b });
    Ok(())
}

// -- Register-register, 32-bit truncated ------------------------------------
//
// Every result is truncated to 32 bits and sign-extended back, even where
// the full 64-bit result would differ.

fn addw(s: &mut Step<'_>) -> Exec {
    s.wr32(s.ops.src1.wrapping_add(s.ops.src2));
    Ok(())
}

fn subw(s: &mut Step<'_>) -> Exec {
    s.wr32(s.ops.src1.wrapping_sub(s.ops.src2));
    Ok(())
}

fn sllw(s: &mut Step<'_>) -> Exec {
    s.wr32(((s.ops.src1 as u32) << (s.ops.src2 & 0x1f)) as u64);
    Ok(())
}

fn srlw(s: &mut Step<'_>) -> Exec {
    s.wr32(((s.ops.src1 as u32) >> (s.ops.src2 & 0x1f)) as u64);
    Ok(())
}

fn sraw(s: &mut Step<'_>) -> Exec {
    s.wr32(((s.ops.src1 as i32) >> (s.ops.src2 & 0x1f)) as u32 as u64);
    Ok(())
}

fn mulw(s: &mut Step<'_>) -> Exec {
    s.wr32(s.ops.src1.wrapping_mul(s.ops.src2));
    Ok(())
}

fn divw(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as i32;
    let b = s.ops.src2 as i32;
    let q = if b == 0 {
        -1
    } else if a == i32::MIN && b == -1 {
        i32::MIN
    } else {
        a / b
    };
    s.wr32(q as u32 as u64);
    Ok(())
}

fn divuw(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as u32;
    let b = s.ops.src2 as u32;
    s.wr32(if b == 0 { u32::MAX } else { a / b } as u64);
    Ok(())
}

// Remainder sign follows the dividend, per the architecture.
fn remw(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as i32;
    let b = s.ops.src2 as i32;
    let r = if b == 0 {
        a
    } else if a == i32::MIN && b == -1 {
        0
    } else {
        a % b
    };
    s.wr32(r as u32 as u64);
    Ok(())
}

fn remuw(s: &mut Step<'_>) -> Exec {
    let a = s.ops.src1 as u32;
    let b = s.ops.src2 as u32;
    s.wr32(if b == 0 { a } else { a % b } as u64);
    Ok(())
}

// -- Control transfer -------------------------------------------------------

fn jal(s: &mut Step<'_>) -> Exec {
    s.wr(s.pc.wrapping_add(4));
    s.dnpc = s.pc.wrapping_add(s.ops.imm);
    Ok(())
}

/// Register-indirect return: the next PC is src1, no destination write.
fn ret(s: &mut Step<'_>) -> Exec {
    s.dnpc = s.ops.src1;
    Ok(())
}

fn beqz(s: &mut Step<'_>) -> Exec {
    // beq with rs2 = x0.
    s.branch(s.ops.src1 == 0);
    Ok(())
}

fn beq(s: &mut Step<'_>) -> Exec {
    s.branch(s.ops.src1 == s.ops.src2);
    Ok(())
}

fn bne(s: &mut Step<'_>) -> Exec {
    s.branch(s.ops.src1 != s.ops.src2);
    Ok(())
}

fn blt(s: &mut Step<'_>) -> Exec {
    s.branch((s.ops.src1 as i64) < (s.ops.src2 as i64));
    Ok(())
}

fn bge(s: &mut Step<'_>) -> Exec {
    s.branch((s.ops.src1 as i64) >= (s.ops.src2 as i64));
    Ok(())
}

fn bltu(s: &mut Step<'_>) -> Exec {
    s.branch(s.ops.src1 < s.ops.src2);
    Ok(())
}

fn bgeu(s: &mut Step<'_>) -> Exec {
    s.branch(s.ops.src1 >= s.ops.src2);
    Ok(())
}

// -- Trap and catch-all -----------------------------------------------------

fn ebreak(s: &mut Step<'_>) -> Exec {
    Err(Stop::Trap {
        pc: s.pc,
        value: s.regs.read(REG_A0),
    })
}

fn inv(s: &mut Step<'_>) -> Exec {
    Err(s.illegal())
}

// ---------------------------------------------------------------------------
// Table construction
// ---------------------------------------------------------------------------

/// Build the dispatch table in priority order and validate it.
pub(crate) fn build_table() -> Result<Vec<Entry>, TableError> {
    use Format::*;

    #[rustfmt::skip]
    let specs: &[(&'static str, &'static str, Format, Action)] = &[
        ("lui",    "??????? ????? ????? ??? ????? 01101 11", U,  lui),
        ("auipc",  "??????? ????? ????? ??? ????? 00101 11", U,  auipc),

        ("lb",     "??????? ????? ????? 000 ????? 00000 11", I,  lb),
        ("lw",     "??????? ????? ????? 010 ????? 00000 11", I,  lw),
        ("ld",     "??????? ????? ????? 011 ????? 00000 11", I,  ld),
        ("lbu",    "??????? ????? ????? 100 ????? 00000 11", I,  lbu),

        ("sb",     "??????? ????? ????? 000 ????? 01000 11", S,  sb),
        ("sw",     "??????? ????? ????? 010 ????? 01000 11", S,  sw),
        ("sd",     "??????? ????? ????? 011 ????? 01000 11", S,  sd),

        // li is addi with rs1 = x0; it must precede addi.
        ("li",     "??????? ????? 00000 000 ????? 00100 11", I,  li),
        ("addi",   "??????? ????? ????? 000 ????? 00100 11", I,  addi),
        ("slti",   "??????? ????? ????? 010 ????? 00100 11", I,  slti),
        // seqz is sltiu with imm = 1; it must precede sltiu.
        ("seqz",   "0000000 00001 ????? 011 ????? 00100 11", I,  seqz),
        ("sltiu",  "??????? ????? ????? 011 ????? 00100 11", I,  sltiu),
        ("xori",   "??????? ????? ????? 100 ????? 00100 11", I,  xori),
        ("ori",    "??????? ????? ????? 110 ????? 00100 11", I,  ori),
        ("andi",   "??????? ????? ????? 111 ????? 00100 11", I,  andi),
        ("slli",   "000000? ????? ????? 001 ????? 00100 11", Is, slli),
        ("srli",   "000000? ????? ????? 101 ????? 00100 11", Is, srli),
        ("srai",   "010000? ????? ????? 101 ????? 00100 11", Is, srai),

        ("addiw",  "??????? ????? ????? 000 ????? 00110 11", I,  addiw),
        // Bit 25 is the shamt's bit 5, left wildcard so the executor can
        // reject it as an illegal encoding.
        ("slliw",  "000000? ????? ????? 001 ????? 00110 11", Is, slliw),
        ("srliw",  "000000? ????? ????? 101 ????? 00110 11", Is, srliw),
        ("sraiw",  "010000? ????? ????? 101 ????? 00110 11", Is, sraiw),

        ("add",    "0000000 ????? ????? 000 ????? 01100 11", R,  add),
        ("sub",    "0100000 ????? ????? 000 ????? 01100 11", R,  sub),
        ("sll",    "0000000 ????? ????? 001 ????? 01100 11", R,  sll),
        ("slt",    "0000000 ????? ????? 010 ????? 01100 11", R,  slt),
        ("sltu",   "0000000 ????? ????? 011 ????? 01100 11", R,  sltu),
        ("xor",    "0000000 ????? ????? 100 ????? 01100 11", R,  xor),
        ("srl",    "0000000 ????? ????? 101 ????? 01100 11", R,  srl),
        ("sra",    "0100000 ????? ????? 101 ????? 01100 11", R,  sra),
        ("or",     "0000000 ????? ????? 110 ????? 01100 11", R,  or),
        ("and",    "0000000 ????? ????? 111 ????? 01100 11", R,  and),
        ("mul",    "0000001 ????? ????? 000 ????? 01100 11", R,  mul),
        ("mulh",   "0000001 ????? ????? 001 ????? 01100 11", R,  mulh),
        ("mulhsu", "0000001 ????? ????? 010 ????? 01100 11", R,  mulhsu),
        ("mulhu",  "0000001 ????? ????? 011 ????? 01100 11", R,  mulhu),
        ("div",    "0000001 ????? ????? 100 ????? 01100 11", R,  div),
        ("divu",   "0000001 ????? ????? 101 ????? 01100 11", R,  divu),
        ("rem",    "0000001 ????? ????? 110 ????? 01100 11", R,  rem),
        ("remu",   "0000001 ????? ????? 111 ????? 01100 11", R,  remu),

        ("addw",   "0000000 ????? ????? 000 ????? 01110 11", R,  addw),
        ("subw",   "0100000 ????? ????? 000 ????? 01110 11", R,  subw),
        ("sllw",   "0000000 ????? ????? 001 ????? 01110 11", R,  sllw),
        ("srlw",   "0000000 ????? ????? 101 ????? 01110 11", R,  srlw),
        ("sraw",   "0100000 ????? ????? 101 ????? 01110 11", R,  sraw),
        ("mulw",   "0000001 ????? ????? 000 ????? 01110 11", R,  mulw),
        ("divw",   "0000001 ????? ????? 100 ????? 01110 11", R,  divw),
        ("divuw",  "0000001 ????? ????? 101 ????? 01110 11", R,  divuw),
        ("remw",   "0000001 ????? ????? 110 ????? 01110 11", R,  remw),
        ("remuw",  "0000001 ????? ????? 111 ????? 01110 11", R,  remuw),

        ("jal",    "??????? ????? ????? ??? ????? 11011 11", J,  jal),
        ("ret",    "??????? ????? ????? 000 ????? 11001 11", I,  ret),

        // beqz is beq with rs2 = x0; it must precede beq.
        ("beqz",   "??????? 00000 ????? 000 ????? 11000 11", B,  beqz),
        ("beq",    "??????? ????? ????? 000 ????? 11000 11", B,  beq),
        ("bne",    "??????? ????? ????? 001 ????? 11000 11", B,  bne),
        ("blt",    "??????? ????? ????? 100 ????? 11000 11", B,  blt),
        ("bge",    "??????? ????? ????? 101 ????? 11000 11", B,  bge),
        ("bltu",   "??????? ????? ????? 110 ????? 11000 11", B,  bltu),
        ("bgeu",   "??????? ????? ????? 111 ????? 11000 11", B,  bgeu),

        ("ebreak", "0000000 00001 00000 000 00000 11100 11", N,  ebreak),

        ("inv",    "??????? ????? ????? ??? ????? ????? ??", N,  inv),
    ];

    let mut table = Vec::with_capacity(specs.len());
    for &(name, text, format, action) in specs {
        table.push(Entry {
            name,
            pattern: Pattern::parse(name, text)?,
            format,
            action,
        });
    }
    validate(&table)?;
    Ok(table)
}

/// Structural checks on a finished table: a catch-all must terminate it and
/// no entry may be fully shadowed by an earlier, more general one.
fn validate(table: &[Entry]) -> Result<(), TableError> {
    match table.last() {
        Some(last) if last.pattern.is_catch_all() => {}
        _ => return Err(TableError::MissingCatchAll),
    }
    for (j, entry) in table.iter().enumerate() {
        for earlier in &table[..j] {
            if earlier.pattern.shadows(entry.pattern) {
                return Err(TableError::Unreachable {
                    name: entry.name,
                    shadowed_by: earlier.name,
                });
            }
        }
    }
    Ok(())
}
