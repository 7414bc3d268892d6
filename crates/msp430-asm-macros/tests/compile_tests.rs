//! Integration tests for `asm_bytes!` and `asm_array!` proc-macros.

use msp430_asm_macros::{asm_array, asm_bytes};

#[test]
fn nop() {
    const CODE: &[u8] = asm_bytes!("nop");
    assert_eq!(CODE, &[0x03, 0x43]);
}

#[test]
fn ret() {
    const CODE: &[u8] = asm_bytes!("ret");
    assert_eq!(CODE, &[0x30, 0x41]);
}

#[test]
fn multi_instruction() {
    const CODE: &[u8] = asm_bytes!("mov #0x5a80, &0x0120\nbis.b #1, &0x22");
    assert_eq!(
        CODE,
        &[0xB2, 0x40, 0x80, 0x5A, 0x20, 0x01, 0xD2, 0xD3, 0x22, 0x00]
    );
}

#[test]
fn with_label() {
    const CODE: &[u8] = asm_bytes!(
        "
        delay:
            dec r15
            jnz delay
    "
    );
    assert_eq!(CODE, &[0x1F, 0x83, 0xFE, 0x23]);
}

#[test]
fn comments_in_source() {
    const CODE: &[u8] = asm_bytes!("clr r4 ; zero\nnop");
    assert_eq!(CODE, &[0x04, 0x43, 0x03, 0x43]);
}

#[test]
fn raw_string_source() {
    const CODE: &[u8] = asm_bytes!(r"push r4
pop r4");
    assert_eq!(CODE, &[0x04, 0x12, 0x34, 0x41]);
}

#[test]
fn with_base_address() {
    const CODE: &[u8] = asm_bytes!(0xC000, "start: mov #start, r4");
    assert_eq!(CODE, &[0x34, 0x40, 0x00, 0xC0]);
}

#[test]
fn base_address_with_suffix_and_separator() {
    const CODE: &[u8] = asm_bytes!(0xF0_00u16, "here: br #here");
    assert_eq!(CODE, &[0x30, 0x40, 0x00, 0xF0]);
}

#[test]
fn array_form() {
    const CODE: [u8; 2] = asm_array!("nop");
    assert_eq!(CODE, [0x03, 0x43]);
}

#[test]
fn array_form_with_base() {
    const CODE: [u8; 4] = asm_array!(0x0200, ".word buf\nbuf: .word 0");
    assert_eq!(CODE, [0x02, 0x02, 0x00, 0x00]);
}

#[test]
fn usable_in_static() {
    static VECTOR: &[u8] = asm_bytes!(".word 0xC000");
    assert_eq!(VECTOR, &[0x00, 0xC0]);
}
