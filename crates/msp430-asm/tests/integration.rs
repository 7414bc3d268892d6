//! Integration tests for msp430_asm.
//!
//! These tests exercise the public API end-to-end, verifying that assembly
//! source text is correctly translated into expected machine code bytes.

use msp430_asm::{assemble, assemble_at, assemble_with, AsmError, Assembler, RelocType};

fn words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn asm_words(src: &str) -> Vec<u16> {
    words(&assemble(src).unwrap())
}

// ============================================================================
// One-Shot API
// ============================================================================

#[test]
fn one_shot_nop() {
    assert_eq!(assemble("nop").unwrap(), vec![0x03, 0x43]);
}

#[test]
fn one_shot_multiple_instructions() {
    assert_eq!(asm_words("nop\nnop\nret"), [0x4303, 0x4303, 0x4130]);
}

#[test]
fn one_shot_with_base_address() {
    let bytes = assemble_at("here: br #here", 0xF000).unwrap();
    assert_eq!(words(&bytes), [0x4030, 0xF000]);
}

#[test]
fn one_shot_with_externals() {
    let bytes = assemble_with("call #__stop_progExec__", 0, &[("__stop_progExec__", 0xFFDE)])
        .unwrap();
    assert_eq!(words(&bytes), [0x12B0, 0xFFDE]);
}

#[test]
fn empty_source() {
    assert!(assemble("").unwrap().is_empty());
    assert!(assemble("; only a comment\n\n").unwrap().is_empty());
}

// ============================================================================
// A complete program
// ============================================================================

const BLINK: &str = "
.equ WDTCTL, 0x0120
.equ P1DIR, 0x0022
.equ P1OUT, 0x0021
.global main
main:
    mov   #0x0400, sp       ; top of RAM
    mov   #0x5A80, &WDTCTL  ; stop watchdog
    bis.b #1, &P1DIR
loop:
    xor.b #1, &P1OUT
    mov   #50000, r15
delay:
    dec   r15
    jnz   delay
    jmp   loop
";

#[test]
fn blink_program() {
    let mut asm = Assembler::new();
    asm.emit(BLINK).unwrap();
    let result = asm.finish().unwrap();

    assert_eq!(
        words(result.bytes()),
        [
            0x4031, 0x0400, // mov #0x400, sp
            0x40B2, 0x5A80, 0x0120, // mov #0x5a80, &WDTCTL
            0xD3D2, 0x0022, // bis.b #1, &P1DIR
            0xE3D2, 0x0021, // xor.b #1, &P1OUT
            0x403F, 0xC350, // mov #50000, r15
            0x831F, // dec r15
            0x23FE, // jnz delay
            0x3FF9, // jmp loop
        ]
    );
    assert_eq!(result.label_address("main"), Some(0));
    assert_eq!(result.label_address("loop"), Some(14));
    assert_eq!(result.label_address("delay"), Some(22));
    assert_eq!(result.referenced_symbols(), &["main"]);
    // Only the two label jumps needed relocations; constants were folded.
    let types: Vec<_> = result.relocations().iter().map(|r| r.r_type).collect();
    assert_eq!(types, [RelocType::Pcrel10, RelocType::Pcrel10]);
}

// ============================================================================
// Addressing modes
// ============================================================================

#[test]
fn source_addressing_modes() {
    assert_eq!(asm_words("mov r4, r5"), [0x4405]);
    assert_eq!(asm_words("mov 4(r4), r5"), [0x4415, 0x0004]);
    assert_eq!(asm_words("mov -2(r4), r5"), [0x4415, 0xFFFE]);
    assert_eq!(asm_words("mov @r4, r5"), [0x4425]);
    assert_eq!(asm_words("mov @r4+, r5"), [0x4435]);
    assert_eq!(asm_words("mov #0x55, r5"), [0x4035, 0x0055]);
    assert_eq!(asm_words("mov &0x0200, r5"), [0x4215, 0x0200]);
}

#[test]
fn destination_addressing_modes() {
    assert_eq!(asm_words("mov r4, 2(r5)"), [0x4485, 0x0002]);
    assert_eq!(asm_words("mov r4, &0x0200"), [0x4482, 0x0200]);
    // `@rN` in destination position means `0(rN)`.
    assert_eq!(asm_words("mov r4, @r5"), [0x4485, 0x0000]);
}

#[test]
fn mnemonic_and_register_case_insensitive() {
    assert_eq!(asm_words("MOV R4, R5"), [0x4405]);
    assert_eq!(asm_words("Mov.W r4, r5"), [0x4405]);
    assert_eq!(asm_words("mov.B PC, SP"), [0x4041]);
}

#[test]
fn register_aliases() {
    assert_eq!(asm_words("mov r0, r1"), asm_words("mov pc, sp"));
    assert_eq!(asm_words("mov r2, r3"), asm_words("mov sr, cg"));
}

#[test]
fn symbolic_mode_is_pc_relative() {
    let mut asm = Assembler::new();
    asm.base_address(0xC000);
    asm.emit("mov counter, r4\nnop\ncounter: .word 7").unwrap();
    let result = asm.finish().unwrap();
    // Extension word at 0xC002, counter at 0xC006.
    assert_eq!(words(result.bytes()), [0x4014, 0x0004, 0x4303, 0x0007]);
    assert_eq!(result.relocations()[0].r_type, RelocType::Pcrel16Byte);
    assert_eq!(result.relocations()[0].offset, 2);
}

#[test]
fn absolute_mode_uses_byte_relocation() {
    let mut asm = Assembler::new();
    asm.define_external("P1IN", 0x0020);
    asm.emit("mov.b &P1IN, r4").unwrap();
    let result = asm.finish().unwrap();
    assert_eq!(words(result.bytes()), [0x4254, 0x0020]);
    assert_eq!(result.relocations()[0].r_type, RelocType::Abs16Byte);
    assert_eq!(result.relocations()[0].symbol, "P1IN");
}

#[test]
fn symbolic_immediate_uses_abs16() {
    let mut asm = Assembler::new();
    asm.emit("mov #table + 4, r4\ntable: .word 1, 2, 3").unwrap();
    let result = asm.finish().unwrap();
    assert_eq!(words(result.bytes())[1], 8);
    let rec = &result.relocations()[0];
    assert_eq!(rec.r_type, RelocType::Abs16);
    assert_eq!(rec.symbol, "table");
    assert_eq!(rec.addend, 4);
}

// ============================================================================
// Byte forms and narrowing
// ============================================================================

#[test]
fn byte_forms_narrow_registers() {
    assert_eq!(asm_words("mov.b r4, r5"), [0x4445]);
    assert_eq!(asm_words("add.b @r6+, r7"), [0x5677]);
    assert_eq!(asm_words("push.b r9"), [0x1249]);
    assert_eq!(asm_words("rrc.b r10"), [0x104A]);
}

#[test]
fn word_only_single_operand_rejects_byte_form() {
    for src in ["swpb.b r4", "sxt.b r4", "call.b r4"] {
        assert!(
            matches!(assemble(src), Err(AsmError::UnknownMnemonic { .. })),
            "{src}"
        );
    }
}

// ============================================================================
// Emulated instructions
// ============================================================================

#[test]
fn emulated_instructions() {
    let cases: &[(&str, &[u16])] = &[
        ("clr r5", &[0x4305]),
        ("inc r5", &[0x5315]),
        ("incd r5", &[0x5325]),
        ("dec r5", &[0x8315]),
        ("decd r5", &[0x8325]),
        ("tst r5", &[0x9305]),
        ("inv r5", &[0xE335]),
        ("rla r5", &[0x5505]),
        ("rlc r5", &[0x6505]),
        ("adc r5", &[0x6305]),
        ("sbc r5", &[0x7305]),
        ("dadc r5", &[0xA305]),
        ("pop r5", &[0x4135]),
        ("br r5", &[0x4500]),
        ("br #0x4400", &[0x4030, 0x4400]),
        ("clrc", &[0xC312]),
        ("setc", &[0xD312]),
        ("clrz", &[0xC322]),
        ("setz", &[0xD322]),
        ("clrn", &[0xC222]),
        ("setn", &[0xD222]),
        ("dint", &[0xC232]),
        ("eint", &[0xD232]),
        ("nop", &[0x4303]),
        ("ret", &[0x4130]),
        ("reti", &[0x1300]),
        ("clr.b r5", &[0x4345]),
        ("inc.b &0x21", &[0x53D2, 0x0021]),
        ("tst.b 0(r4)", &[0x93C4, 0x0000]),
    ];
    for (src, expected) in cases {
        assert_eq!(&asm_words(src), expected, "{src}");
    }
}

// ============================================================================
// Jumps
// ============================================================================

#[test]
fn every_condition_code_self_loop() {
    let cases = [
        ("jne", 0x23FF),
        ("jnz", 0x23FF),
        ("jeq", 0x27FF),
        ("jz", 0x27FF),
        ("jlo", 0x2BFF),
        ("jnc", 0x2BFF),
        ("jhs", 0x2FFF),
        ("jc", 0x2FFF),
        ("jn", 0x33FF),
        ("jge", 0x37FF),
        ("jl", 0x3BFF),
        ("jmp", 0x3FFF),
    ];
    for (mnemonic, word) in cases {
        let src = format!("x: {mnemonic} x");
        assert_eq!(asm_words(&src), [word], "{mnemonic}");
    }
}

#[test]
fn constant_jump_offsets() {
    assert_eq!(asm_words("jmp 0"), [0x3C00]);
    assert_eq!(asm_words("jeq $+4"), [0x2404]);
    assert_eq!(asm_words("jne -512"), [0x2200]);
}

#[test]
fn jump_offset_out_of_range() {
    assert!(matches!(
        assemble("jeq 600"),
        Err(AsmError::InvalidJumpOffset { value: 600, .. })
    ));
    assert!(matches!(
        assemble("jmp -513"),
        Err(AsmError::InvalidJumpOffset { .. })
    ));
}

#[test]
fn unknown_condition_suffix() {
    assert!(matches!(
        assemble("jxx 4"),
        Err(AsmError::UnknownInstruction { .. })
    ));
}

#[test]
fn label_jump_out_of_range() {
    let src = "jmp far\n.align 10\n.word 0\nfar: nop";
    assert!(matches!(
        assemble(src),
        Err(AsmError::RelocationOverflow {
            r_type: RelocType::Pcrel10,
            ..
        })
    ));
}

#[test]
fn jump_at_maximum_forward_distance() {
    // 511 words of padding after the jump: target - site = 1024 bytes.
    let mut src = String::from("jmp end\n");
    for _ in 0..511 {
        src.push_str("nop\n");
    }
    src.push_str("end:");
    let bytes = assemble(&src).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0x3D]);
}

// ============================================================================
// Data and alignment
// ============================================================================

#[test]
fn data_directives() {
    let bytes = assemble(".byte 1, 2, -1\n.word 0x1234\n.short -2\n.long 0xCAFEBABE").unwrap();
    assert_eq!(
        bytes,
        [1, 2, 0xFF, 0x34, 0x12, 0xFE, 0xFF, 0xBE, 0xBA, 0xFE, 0xCA]
    );
}

#[test]
fn data_with_symbols() {
    let mut asm = Assembler::new();
    asm.base_address(0xFFE0);
    asm.emit(".word reset, isr\nreset: nop\nisr: reti").unwrap();
    let result = asm.finish().unwrap();
    assert_eq!(words(result.bytes()), [0xFFE4, 0xFFE6, 0x4303, 0x1300]);
    assert!(result
        .relocations()
        .iter()
        .all(|r| r.r_type == RelocType::Abs16Byte));
}

#[test]
fn align_pads_with_trap_pattern() {
    assert_eq!(assemble(".byte 1\n.align 1\nnop").unwrap(), [0x01, 0x43, 0x03, 0x43]);
    assert_eq!(assemble(".p2align 2\nnop").unwrap(), [0x03, 0x43]);
    assert_eq!(
        assemble_at(".align 3\nnop", 0x1002).unwrap(),
        [0x43, 0x43, 0x43, 0x43, 0x43, 0x43, 0x03, 0x43]
    );
}

#[test]
fn constants_and_assignments() {
    let src = "SIZE = 4\n.set DOUBLE, SIZE * 2\nmov #DOUBLE, r4\nmov #SIZE-4, r5";
    assert_eq!(asm_words(src), [0x4234, 0x4305]);
}

#[test]
fn section_directives_are_accepted() {
    assert_eq!(asm_words(".text\n.section .init9\nnop"), [0x4303]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn unknown_mnemonic() {
    match assemble("frobnicate r4") {
        Err(AsmError::UnknownMnemonic { mnemonic, span }) => {
            assert_eq!(mnemonic, "frobnicate");
            assert_eq!(span.line, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn invalid_operand_reports_index() {
    assert!(matches!(
        assemble("mov r4, #5"),
        Err(AsmError::InvalidOperand { index: 1, .. })
    ));
    assert!(matches!(
        assemble("rra #5"),
        Err(AsmError::InvalidOperand { index: 0, .. })
    ));
    // Emulated instructions report the operand as written.
    assert!(matches!(
        assemble("inc #5"),
        Err(AsmError::InvalidOperand { index: 0, .. })
    ));
}

#[test]
fn immediate_overflow() {
    assert!(matches!(
        assemble("mov #0x10000, r4"),
        Err(AsmError::ImmediateOverflow { value: 0x10000, .. })
    ));
    assert!(matches!(
        assemble(".byte 256"),
        Err(AsmError::ImmediateOverflow { .. })
    ));
}

#[test]
fn relocation_overflow_on_byte_data() {
    assert!(matches!(
        assemble_with(".byte big", 0, &[("big", 0x1FF)]),
        Err(AsmError::RelocationOverflow {
            r_type: RelocType::Abs8,
            ..
        })
    ));
}

#[test]
fn undefined_symbol() {
    match assemble("call #missing") {
        Err(AsmError::UndefinedLabel { label, span }) => {
            assert_eq!(label, "missing");
            assert_eq!(span.line, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn parse_errors_reported_per_line() {
    match assemble("mov @, r4\nnop\nmov #, r5") {
        Err(AsmError::Multiple { errors }) => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0].span().map(|s| s.line), Some(1));
            assert_eq!(errors[1].span().map(|s| s.line), Some(3));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn error_display_includes_location() {
    let err = assemble("nop\nfrob").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("frob"), "{msg}");
    assert!(msg.contains("2:"), "{msg}");
}

// ============================================================================
// Builder API
// ============================================================================

#[test]
fn builder_multiple_emits_share_labels() {
    let mut asm = Assembler::new();
    asm.emit("start: nop").unwrap();
    asm.emit("jmp start").unwrap();
    let result = asm.finish().unwrap();
    assert_eq!(words(result.bytes()), [0x4303, 0x3FFE]);
}

#[test]
fn builder_label_and_data() {
    let mut asm = Assembler::new();
    asm.base_address(0x0200);
    asm.label("buf").unwrap();
    asm.db(&[0; 4]).unwrap();
    asm.emit("mov #buf, r4").unwrap();
    let result = asm.finish().unwrap();
    assert_eq!(&result.bytes()[4..], &[0x34, 0x40, 0x00, 0x02]);
}

#[test]
fn encode_one_does_not_change_state() {
    let mut asm = Assembler::new();
    assert_eq!(asm.encode_one("mov @r4+, r5").unwrap(), [0x35, 0x44]);
    asm.emit("nop").unwrap();
    assert_eq!(asm.finish().unwrap().len(), 2);
}
