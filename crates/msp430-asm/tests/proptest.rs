#![cfg(not(target_arch = "wasm32"))]
//! Property-based tests using proptest.
//!
//! These tests verify assembler invariants across large, randomly generated
//! input spaces, complementing the targeted unit/integration tests and the
//! libfuzzer-based fuzz target.

use msp430_asm::{
    assemble, assemble_at, relocate, Assembler, Expr, Operand, RelocType, Register,
};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

/// Generates arbitrary ASCII strings (the assembler only accepts text input).
fn arb_asm_input() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::char::range('\0', '\x7f'), 0..256)
        .prop_map(|v| v.into_iter().collect())
}

/// Valid instructions from a curated pool.
fn valid_insn() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "nop",
        "ret",
        "reti",
        "clrc",
        "setz",
        "dint",
        "eint",
        "mov r4, r5",
        "mov.b @r6+, r7",
        "mov #0x1234, r8",
        "mov #-1, r9",
        "add 2(r4), 6(r5)",
        "sub.b &0x21, r10",
        "cmp #8, r11",
        "bis.b #1, &0x22",
        "xor @r12, r13",
        "and #0xFF, r14",
        "rra r15",
        "rrc.b r4",
        "swpb r5",
        "sxt r6",
        "push #4",
        "push.b r7",
        "pop r8",
        "call r9",
        "call #0x4400",
        "clr.b r10",
        "inc r11",
        "decd r12",
        "tst r13",
        "inv.b r14",
        "rla r15",
        "br @r4",
    ])
}

fn gr16() -> impl Strategy<Value = Register> {
    prop::sample::select(Register::GR16.to_vec())
}

fn numbered() -> impl Strategy<Value = u8> {
    4u8..=15
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Arbitrary input never panics; it either assembles or errors.
    #[test]
    fn arbitrary_input_never_panics(src in arb_asm_input()) {
        let _ = assemble(&src);
    }

    /// Random sequences of valid instructions always assemble to an even,
    /// non-empty image.
    #[test]
    fn valid_sequences_assemble(lines in prop::collection::vec(valid_insn(), 1..32)) {
        let src = lines.join("\n");
        let bytes = assemble(&src).unwrap();
        prop_assert!(!bytes.is_empty());
        prop_assert_eq!(bytes.len() % 2, 0);
    }

    /// Position-independent code does not depend on the base address.
    #[test]
    fn jumps_are_position_independent(
        base in (0u64..0x8000).prop_map(|b| b * 2),
        n in 0usize..64,
    ) {
        let mut src = String::from("top:\njmp bottom\n");
        for _ in 0..n {
            src.push_str("nop\n");
        }
        src.push_str("bottom: jne top");
        prop_assert_eq!(assemble_at(&src, base).unwrap(), assemble(&src).unwrap());
    }

    /// Jumping over `n` single-word instructions encodes displacement `n`.
    #[test]
    fn jmp_over_nops(n in 0usize..=511) {
        let mut src = String::from("jmp done\n");
        for _ in 0..n {
            src.push_str("nop\n");
        }
        src.push_str("done:");
        let bytes = assemble(&src).unwrap();
        let word = u16::from_le_bytes([bytes[0], bytes[1]]);
        prop_assert_eq!(word, 0x3C00 | n as u16);
    }

    /// Register-to-register moves are a single word with both fields set.
    #[test]
    fn mov_register_to_register(src in numbered(), dst in numbered(), byte in any::<bool>()) {
        let mnemonic = if byte { "mov.b" } else { "mov" };
        let bytes = assemble(&format!("{mnemonic} r{src}, r{dst}")).unwrap();
        let expected = 0x4000 | u16::from(src) << 8 | u16::from(byte) << 6 | u16::from(dst);
        prop_assert_eq!(bytes, expected.to_le_bytes().to_vec());
    }

    /// Narrowing maps each 16-bit register to a distinct alias and is
    /// idempotent.
    #[test]
    fn narrowing_is_idempotent(reg in gr16()) {
        let narrow = reg.to_gr8().unwrap();
        prop_assert_eq!(narrow.to_gr8(), Some(narrow));
        prop_assert_eq!(narrow.to_gr16(), reg);
        prop_assert_eq!(narrow.encoding(), reg.encoding());
    }

    /// Only the six constant-generator values avoid an extension word.
    #[test]
    fn constant_generator_set(value in -70_000i128..70_000) {
        let op = Operand::Immediate(Expr::Num(value));
        let cg = [0, 1, 2, 4, 8, -1].contains(&value);
        prop_assert_eq!(op.is_cg_immediate(), cg);
        if (-32768..=65535).contains(&value) {
            let len = assemble(&format!("mov #{value}, r4")).unwrap().len();
            prop_assert_eq!(len, if cg { 2 } else { 4 });
        }
    }

    /// Every in-range byte distance round-trips through the 10-bit field,
    /// whatever the word held before; the top six bits are left alone.
    #[test]
    fn pcrel10_round_trip(disp in -512i64..=511, before in any::<u16>()) {
        let mut buf = before.to_le_bytes();
        let value = (disp + 1) * 2;
        relocate(&mut buf, 0, RelocType::Pcrel10.code(), value as u64).unwrap();
        let after = u16::from_le_bytes(buf);
        let decoded = i64::from((((after & 0x03FF) << 6) as i16) >> 6);
        prop_assert_eq!(decoded, disp);
        prop_assert_eq!(after & 0xFC00, before & 0xFC00);
    }

    /// The 16-bit absolute field accepts exactly `-32768..=65535`.
    #[test]
    fn abs16_range(value in -100_000i64..100_000) {
        let mut buf = [0u8; 2];
        let result = relocate(&mut buf, 0, RelocType::Abs16.code(), value as u64);
        prop_assert_eq!(result.is_ok(), (-32768..=65535).contains(&value));
        if result.is_ok() {
            prop_assert_eq!(u16::from_le_bytes(buf), value as u16);
        } else {
            prop_assert_eq!(buf, [0, 0]);
        }
    }

    /// Unknown relocation codes never touch the buffer.
    #[test]
    fn unknown_codes_leave_buffer(code in 11u32..1000, value in any::<u64>(), fill in any::<u8>()) {
        let mut buf = [fill; 4];
        prop_assert!(relocate(&mut buf, 0, code, value).is_err());
        prop_assert_eq!(buf, [fill; 4]);
    }

    /// `encode_one` agrees with a full assembly of the same instruction.
    #[test]
    fn encode_one_matches_assemble(insn in valid_insn()) {
        let asm = Assembler::new();
        prop_assert_eq!(asm.encode_one(insn).unwrap(), assemble(insn).unwrap());
    }
}
