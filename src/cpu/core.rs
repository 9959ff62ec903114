//! The execution engine: fetch, match, decode, execute, commit.

use log::{debug, trace};

use crate::bus::Bus;
use crate::engine::decode::decode_operand;
use crate::engine::pattern::TableError;
use crate::engine::table::{Entry, Step, build_table};

use super::regs::RegisterFile;
use super::types::{AccessKind, Fault, StepOutcome, Stop};

/// RISC-V64 integer instruction interpreter.
///
/// Owns nothing but the immutable dispatch table; the register file and
/// memory are owned by the surrounding simulator and passed into each
/// [`step`](Engine::step). One engine may therefore drive any number of
/// simulated cores, including concurrently.
pub struct Engine {
    table: Vec<Entry>,
}

impl Engine {
    /// Build the dispatch table. Table defects (bad pattern text, missing
    /// catch-all, unreachable entries) surface here, before any step runs.
    pub fn new() -> Result<Self, TableError> {
        let table = build_table()?;
        debug!("dispatch table built: {} entries", table.len());
        Ok(Self { table })
    }

    /// First dispatch entry whose pattern matches `word`. The validated
    /// catch-all guarantees a match for every 32-bit value.
    fn lookup(&self, word: u32) -> &Entry {
        self.table
            .iter()
            .find(|e| e.pattern.matches(word))
            .expect("validated dispatch table always ends with a catch-all")
    }

    /// Execute the instruction at `pc` against `regs` and `bus`.
    ///
    /// On [`StepOutcome::Continue`] the carried PC is the committed next PC:
    /// the sequential `pc + 4` unless a control-transfer action overrode it.
    /// Faulting steps commit no partial register or memory write. x0 is
    /// forced back to zero after every step, whatever the outcome.
    pub fn step(&self, pc: u64, regs: &mut RegisterFile, bus: &mut dyn Bus) -> StepOutcome {
        let word = match bus.fetch(pc) {
            Ok(word) => word,
            Err(e) => {
                return StepOutcome::Fault(Fault::Memory {
                    pc,
                    addr: e.address(),
                    access: AccessKind::Fetch,
                });
            }
        };

        let entry = self.lookup(word);
        let ops = decode_operand(word, entry.format, regs);
        trace!("{pc:#x}: {word:08x} {}", entry.name);

        let snpc = pc.wrapping_add(4);
        let mut step = Step {
            pc,
            dnpc: snpc,
            ops,
            regs: &mut *regs,
            bus: &mut *bus,
        };
        let result = (entry.action)(&mut step);
        let dnpc = step.dnpc;

        regs.reset_zero();

        match result {
            Ok(()) => StepOutcome::Continue(dnpc),
            Err(Stop::Trap { pc, value }) => StepOutcome::Trap { pc, value },
            Err(Stop::Fault(fault)) => StepOutcome::Fault(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::regs::REG_A0;
    use crate::dram::{DRAM_BASE, Dram};

    fn setup() -> (Engine, RegisterFile, Dram) {
        let _ = env_logger::builder().is_test(true).try_init();
        (
            Engine::new().unwrap(),
            RegisterFile::new(),
            Dram::new(DRAM_BASE, 64 * 1024),
        )
    }

    // ---- encoding helpers ----

    fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        ((imm as u32 & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        ((imm >> 5 & 0x7f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | ((imm & 0x1f) << 7)
            | 0x23
    }

    fn b_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        ((imm >> 12 & 1) << 31)
            | ((imm >> 5 & 0x3f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | ((imm >> 1 & 0xf) << 8)
            | ((imm >> 11 & 1) << 7)
            | 0x63
    }

    fn j_type(imm: i32, rd: u32) -> u32 {
        let imm = imm as u32;
        ((imm >> 20 & 1) << 31)
            | ((imm >> 1 & 0x3ff) << 21)
            | ((imm >> 11 & 1) << 20)
            | ((imm >> 12 & 0xff) << 12)
            | (rd << 7)
            | 0x6f
    }

    const EBREAK: u32 = 0x00100073;

    /// Place `words` at `pc` and execute them in order, asserting each step
    /// continues sequentially. Returns the final PC.
    fn run_straight(
        engine: &Engine,
        regs: &mut RegisterFile,
        dram: &mut Dram,
        mut pc: u64,
        words: &[u32],
    ) -> u64 {
        for (i, &word) in words.iter().enumerate() {
            dram.write32(pc + 4 * i as u64, word).unwrap();
        }
        for _ in words {
            match engine.step(pc, regs, dram) {
                StepOutcome::Continue(next) => pc = next,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        pc
    }

    /// Execute a single register-register or register-immediate word with
    /// the given initial x1/x2 and return the value left in x3.
    fn eval(word: u32, x1: u64, x2: u64) -> u64 {
        let (engine, mut regs, mut dram) = setup();
        regs.write(1, x1);
        regs.write(2, x2);
        dram.write32(DRAM_BASE, word).unwrap();
        match engine.step(DRAM_BASE, &mut regs, &mut dram) {
            StepOutcome::Continue(next) => assert_eq!(next, DRAM_BASE + 4),
            other => panic!("unexpected outcome: {other:?}"),
        }
        regs.read(3)
    }

    // ---- end-to-end scenarios ----

    #[test]
    fn two_dependent_addis() {
        let (engine, mut regs, mut dram) = setup();
        let pc = run_straight(
            &engine,
            &mut regs,
            &mut dram,
            DRAM_BASE,
            &[
                i_type(10, 0, 0b000, 5, 0x13), // addi x5, x0, 10
                i_type(5, 5, 0b000, 6, 0x13),  // addi x6, x5, 5
            ],
        );
        assert_eq!(regs.read(5), 10);
        assert_eq!(regs.read(6), 15);
        assert_eq!(pc, DRAM_BASE + 8);
    }

    #[test]
    fn taken_branch_overrides_sequential_pc() {
        let engine = Engine::new().unwrap();
        let mut regs = RegisterFile::new();
        let mut dram = Dram::new(0x1000, 4096);
        // beq x1, x1, +8 at 0x1000: always taken.
        dram.write32(0x1000, b_type(8, 1, 1, 0b000)).unwrap();
        let outcome = engine.step(0x1000, &mut regs, &mut dram);
        assert_eq!(outcome, StepOutcome::Continue(0x1008));
    }

    #[test]
    fn untaken_branch_falls_through() {
        let (engine, mut regs, mut dram) = setup();
        regs.write(1, 1);
        regs.write(2, 2);
        dram.write32(DRAM_BASE, b_type(8, 2, 1, 0b000)).unwrap();
        let outcome = engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(outcome, StepOutcome::Continue(DRAM_BASE + 4));
    }

    #[test]
    fn unsigned_byte_load_zero_extends() {
        let (engine, mut regs, mut dram) = setup();
        dram.write8(DRAM_BASE + 0x100, 0xff).unwrap();
        regs.write(1, DRAM_BASE + 0x100);
        // lbu x3, 0(x1)
        dram.write32(DRAM_BASE, i_type(0, 1, 0b100, 3, 0x03))
            .unwrap();
        engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(regs.read(3), 255);
    }

    #[test]
    fn signed_byte_load_sign_extends() {
        let (engine, mut regs, mut dram) = setup();
        dram.write8(DRAM_BASE + 0x100, 0x80).unwrap();
        regs.write(1, DRAM_BASE + 0x100);
        // lb x3, 0(x1)
        dram.write32(DRAM_BASE, i_type(0, 1, 0b000, 3, 0x03))
            .unwrap();
        engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(regs.read(3) as i64, -128);
    }

    #[test]
    fn signed_word_load_sign_extends() {
        let (engine, mut regs, mut dram) = setup();
        dram.write32(DRAM_BASE + 0x100, 0x8000_0000).unwrap();
        regs.write(1, DRAM_BASE + 0x100);
        // lw x3, 0(x1)
        dram.write32(DRAM_BASE, i_type(0, 1, 0b010, 3, 0x03))
            .unwrap();
        engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(regs.read(3), 0xffff_ffff_8000_0000);
    }

    #[test]
    fn stores_truncate_to_width() {
        let (engine, mut regs, mut dram) = setup();
        regs.write(1, DRAM_BASE + 0x100);
        regs.write(2, 0x1122_3344_5566_7788);
        let pc = DRAM_BASE;
        run_straight(
            &engine,
            &mut regs,
            &mut dram,
            pc,
            &[
                s_type(0, 2, 1, 0b000),  // sb x2, 0(x1)
                s_type(8, 2, 1, 0b010),  // sw x2, 8(x1)
                s_type(16, 2, 1, 0b011), // sd x2, 16(x1)
            ],
        );
        assert_eq!(dram.read8(DRAM_BASE + 0x100).unwrap(), 0x88);
        assert_eq!(dram.read32(DRAM_BASE + 0x108).unwrap(), 0x5566_7788);
        assert_eq!(
            dram.read64(DRAM_BASE + 0x110).unwrap(),
            0x1122_3344_5566_7788
        );
    }

    #[test]
    fn trap_reports_pc_and_a0() {
        let (engine, mut regs, mut dram) = setup();
        regs.write(REG_A0, 7);
        dram.write32(DRAM_BASE, EBREAK).unwrap();
        let outcome = engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(
            outcome,
            StepOutcome::Trap {
                pc: DRAM_BASE,
                value: 7
            }
        );
    }

    #[test]
    fn unmatched_word_faults_with_exact_pc() {
        let (engine, mut regs, mut dram) = setup();
        let pc = DRAM_BASE + 0x40;
        dram.write32(pc, 0).unwrap();
        let outcome = engine.step(pc, &mut regs, &mut dram);
        assert_eq!(outcome, StepOutcome::Fault(Fault::IllegalInstruction { pc }));
    }

    // ---- invariants ----

    #[test]
    fn x0_is_zero_after_a_step_that_targets_it() {
        let (engine, mut regs, mut dram) = setup();
        // addi x0, x0, 5
        dram.write32(DRAM_BASE, i_type(5, 0, 0b000, 0, 0x13))
            .unwrap();
        let outcome = engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(outcome, StepOutcome::Continue(DRAM_BASE + 4));
        assert_eq!(regs.read(0), 0);
    }

    #[test]
    fn failed_load_leaves_destination_untouched() {
        let (engine, mut regs, mut dram) = setup();
        regs.write(5, 0xdead);
        regs.write(1, 0x10); // far below DRAM
        // ld x5, 0(x1)
        dram.write32(DRAM_BASE, i_type(0, 1, 0b011, 5, 0x03))
            .unwrap();
        let outcome = engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(
            outcome,
            StepOutcome::Fault(Fault::Memory {
                pc: DRAM_BASE,
                addr: 0x10,
                access: AccessKind::Load
            })
        );
        assert_eq!(regs.read(5), 0xdead);
    }

    #[test]
    fn fetch_outside_memory_faults() {
        let (engine, mut regs, mut dram) = setup();
        let pc = DRAM_BASE - 0x1000;
        let outcome = engine.step(pc, &mut regs, &mut dram);
        assert_eq!(
            outcome,
            StepOutcome::Fault(Fault::Memory {
                pc,
                addr: pc,
                access: AccessKind::Fetch
            })
        );
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<Engine>();
    }

    // ---- arithmetic ----

    #[test]
    fn truncated_adds_differ_from_full_width() {
        // 0x7fff_ffff + 1 overflows 32 bits but not 64.
        let addw = r_type(0x00, 2, 1, 0b000, 3, 0x3b);
        assert_eq!(eval(addw, 0x7fff_ffff, 1), 0xffff_ffff_8000_0000);
        let add = r_type(0x00, 2, 1, 0b000, 3, 0x33);
        assert_eq!(eval(add, 0x7fff_ffff, 1), 0x8000_0000);
    }

    #[test]
    fn truncated_mul_differs_from_full_width() {
        // 0x10000 * 0x10000 = 2^32: the full product is nonzero, the
        // truncated-then-extended result is zero.
        let mulw = r_type(0x01, 2, 1, 0b000, 3, 0x3b);
        assert_eq!(eval(mulw, 0x10000, 0x10000), 0);
        let mul = r_type(0x01, 2, 1, 0b000, 3, 0x33);
        assert_eq!(eval(mul, 0x10000, 0x10000), 1 << 32);
    }

    #[test]
    fn subw_sign_extends_truncated_result() {
        let subw = r_type(0x20, 2, 1, 0b000, 3, 0x3b);
        assert_eq!(eval(subw, 0, 1) as i64, -1);
        assert_eq!(eval(subw, 0x1_0000_0005, 4), 1);
    }

    #[test]
    fn comparisons_distinguish_signedness() {
        let slt = r_type(0x00, 2, 1, 0b010, 3, 0x33);
        let sltu = r_type(0x00, 2, 1, 0b011, 3, 0x33);
        // -1 < 1 signed, but 0xffff... is huge unsigned.
        assert_eq!(eval(slt, u64::MAX, 1), 1);
        assert_eq!(eval(sltu, u64::MAX, 1), 0);
    }

    #[test]
    fn branch_signedness() {
        let (engine, mut regs, mut dram) = setup();
        regs.write(1, u64::MAX); // -1 signed
        regs.write(2, 1);
        // blt x1, x2, +8: signed, taken.
        dram.write32(DRAM_BASE, b_type(8, 2, 1, 0b100)).unwrap();
        assert_eq!(
            engine.step(DRAM_BASE, &mut regs, &mut dram),
            StepOutcome::Continue(DRAM_BASE + 8)
        );
        // bltu x1, x2, +8: unsigned, not taken.
        dram.write32(DRAM_BASE, b_type(8, 2, 1, 0b110)).unwrap();
        assert_eq!(
            engine.step(DRAM_BASE, &mut regs, &mut dram),
            StepOutcome::Continue(DRAM_BASE + 4)
        );
    }

    #[test]
    fn shifts_mask_the_shift_amount() {
        let sll = r_type(0x00, 2, 1, 0b001, 3, 0x33);
        assert_eq!(eval(sll, 1, 63), 1 << 63);
        let sra = r_type(0x20, 2, 1, 0b101, 3, 0x33);
        assert_eq!(eval(sra, u64::MAX << 1, 1) as i64, -1);
        let srl = r_type(0x00, 2, 1, 0b101, 3, 0x33);
        assert_eq!(eval(srl, u64::MAX, 63), 1);
        // sllw shifts within 32 bits.
        let sllw = r_type(0x00, 2, 1, 0b001, 3, 0x3b);
        assert_eq!(eval(sllw, 1, 31), 0xffff_ffff_8000_0000);
    }

    #[test]
    fn wide_shift_immediates_reject_shamt_bit_5() {
        let (engine, mut regs, mut dram) = setup();
        regs.write(1, 1);
        // slliw/srliw/sraiw with shamt = 0x25 (bit 5 set) are illegal,
        // uniformly across all three.
        let words = [
            i_type(0x025, 1, 0b001, 3, 0x1b),
            i_type(0x025, 1, 0b101, 3, 0x1b),
            i_type(0x425, 1, 0b101, 3, 0x1b),
        ];
        for word in words {
            dram.write32(DRAM_BASE, word).unwrap();
            assert_eq!(
                engine.step(DRAM_BASE, &mut regs, &mut dram),
                StepOutcome::Fault(Fault::IllegalInstruction { pc: DRAM_BASE }),
                "word {word:08x}"
            );
        }
        // The same encodings with bit 5 clear execute normally.
        dram.write32(DRAM_BASE, i_type(0x005, 1, 0b001, 3, 0x1b))
            .unwrap();
        assert_eq!(
            engine.step(DRAM_BASE, &mut regs, &mut dram),
            StepOutcome::Continue(DRAM_BASE + 4)
        );
        assert_eq!(regs.read(3), 32);
    }

    #[test]
    fn sixty_four_bit_shift_immediates_take_six_bits() {
        let (engine, mut regs, mut dram) = setup();
        regs.write(1, 1);
        // slli x3, x1, 63
        dram.write32(DRAM_BASE, i_type(63, 1, 0b001, 3, 0x13))
            .unwrap();
        engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(regs.read(3), 1 << 63);
        // srai x3, x3, 63
        dram.write32(DRAM_BASE, i_type(0x43f, 3, 0b101, 3, 0x13))
            .unwrap();
        engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(regs.read(3) as i64, -1);
    }

    // ---- division and remainder edges ----

    #[test]
    fn division_by_zero_yields_all_ones() {
        let div = r_type(0x01, 2, 1, 0b100, 3, 0x33);
        assert_eq!(eval(div, 42, 0) as i64, -1);
        let divu = r_type(0x01, 2, 1, 0b101, 3, 0x33);
        assert_eq!(eval(divu, 42, 0), u64::MAX);
        let divw = r_type(0x01, 2, 1, 0b100, 3, 0x3b);
        assert_eq!(eval(divw, 42, 0) as i64, -1);
    }

    #[test]
    fn remainder_by_zero_yields_dividend() {
        let rem = r_type(0x01, 2, 1, 0b110, 3, 0x33);
        assert_eq!(eval(rem, 42, 0), 42);
        let remuw = r_type(0x01, 2, 1, 0b111, 3, 0x3b);
        assert_eq!(eval(remuw, 42, 0), 42);
    }

    #[test]
    fn signed_overflow_division() {
        let div = r_type(0x01, 2, 1, 0b100, 3, 0x33);
        assert_eq!(eval(div, i64::MIN as u64, u64::MAX), i64::MIN as u64);
        let rem = r_type(0x01, 2, 1, 0b110, 3, 0x33);
        assert_eq!(eval(rem, i64::MIN as u64, u64::MAX), 0);
        let divw = r_type(0x01, 2, 1, 0b100, 3, 0x3b);
        assert_eq!(
            eval(divw, i32::MIN as u32 as u64, u32::MAX as u64),
            i32::MIN as i64 as u64
        );
    }

    #[test]
    fn remainder_sign_follows_dividend() {
        let rem = r_type(0x01, 2, 1, 0b110, 3, 0x33);
        assert_eq!(eval(rem, (-7i64) as u64, 2) as i64, -1);
        assert_eq!(eval(rem, 7, (-2i64) as u64) as i64, 1);
        let remw = r_type(0x01, 2, 1, 0b110, 3, 0x3b);
        assert_eq!(eval(remw, (-7i32) as u32 as u64, 2) as i64, -1);
    }

    #[test]
    fn mulh_computes_high_bits() {
        let mulhu = r_type(0x01, 2, 1, 0b011, 3, 0x33);
        assert_eq!(eval(mulhu, u64::MAX, u64::MAX), u64::MAX - 1);
        let mulh = r_type(0x01, 2, 1, 0b001, 3, 0x33);
        // (-1) * (-1) = 1: high part is zero.
        assert_eq!(eval(mulh, u64::MAX, u64::MAX), 0);
    }

    // ---- control transfer ----

    #[test]
    fn jal_links_and_redirects() {
        let (engine, mut regs, mut dram) = setup();
        dram.write32(DRAM_BASE, j_type(-16, 1)).unwrap();
        let outcome = engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(outcome, StepOutcome::Continue(DRAM_BASE - 16));
        assert_eq!(regs.read(1), DRAM_BASE + 4);
    }

    #[test]
    fn register_indirect_return() {
        let (engine, mut regs, mut dram) = setup();
        let target = DRAM_BASE + 0x200;
        regs.write(1, target);
        // jalr-form return with rd = x5: next PC is x1, x5 is not written.
        dram.write32(DRAM_BASE, i_type(0, 1, 0b000, 5, 0x67))
            .unwrap();
        let outcome = engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(outcome, StepOutcome::Continue(target));
        assert_eq!(regs.read(5), 0);
    }

    #[test]
    fn lui_auipc() {
        let (engine, mut regs, mut dram) = setup();
        // lui x3, 0xfffff (sign-extends to -4096)
        dram.write32(DRAM_BASE, (0xfffff << 12) | (3 << 7) | 0x37)
            .unwrap();
        engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(regs.read(3) as i64, -4096);
        // auipc x4, 1
        dram.write32(DRAM_BASE, (1 << 12) | (4 << 7) | 0x17).unwrap();
        engine.step(DRAM_BASE, &mut regs, &mut dram);
        assert_eq!(regs.read(4), DRAM_BASE + 0x1000);
    }

    #[test]
    fn small_loop_terminates_with_trap() {
        // Count x5 up to 3 in a branch loop, then ebreak with a0 = x5.
        let (engine, mut regs, mut dram) = setup();
        let program = [
            i_type(0, 0, 0b000, 5, 0x13),    // addi x5, x0, 0
            i_type(3, 0, 0b000, 6, 0x13),    // addi x6, x0, 3
            i_type(1, 5, 0b000, 5, 0x13),    // loop: addi x5, x5, 1
            b_type(-4, 6, 5, 0b001),         // bne x5, x6, loop
            i_type(0, 5, 0b000, 10, 0x13),   // addi a0, x5, 0
            EBREAK,
        ];
        for (i, word) in program.iter().enumerate() {
            dram.write32(DRAM_BASE + 4 * i as u64, *word).unwrap();
        }
        let mut pc = DRAM_BASE;
        let outcome = loop {
            match engine.step(pc, &mut regs, &mut dram) {
                StepOutcome::Continue(next) => pc = next,
                other => break other,
            }
        };
        assert_eq!(
            outcome,
            StepOutcome::Trap {
                pc: DRAM_BASE + 20,
                value: 3
            }
        );
    }
}
