//! Compile-time assembly with `asm_bytes!` and `asm_array!` macros.
//!
//! These macros assemble instructions at compile time, producing
//! `&'static [u8]` or `[u8; N]` constants with zero runtime overhead.
//!
//! Run with: `cargo run --example compile_time_asm -p msp430-asm-macros`

use msp430_asm_macros::{asm_array, asm_bytes};

// ── Compile-time constants ──────────────────────────────────────────────

/// Stop the watchdog timer.
const STOP_WDT: &[u8] = asm_bytes!("mov #0x5a80, &0x0120");

/// Busy-wait on r15.
const DELAY: &[u8] = asm_bytes!(
    "
delay:
    dec r15
    jnz delay
    ret
"
);

/// Reset stub linked at the start of flash.
const RESET: &[u8] = asm_bytes!(
    0xC000,
    "
start:
    mov #0x0400, sp
    call #main
    jmp start
main:
    ret
"
);

/// A single `reti` as a fixed-size array.
const RETI: [u8; 2] = asm_array!("reti");

fn main() {
    println!("=== msp430_asm_macros compile-time assembly ===\n");
    dump("stop watchdog", STOP_WDT);
    dump("delay loop", DELAY);
    dump("reset stub @ 0xC000", RESET);
    dump("reti", &RETI);
}

fn dump(name: &str, bytes: &[u8]) {
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
    println!("{name:>22}: {} ({} bytes)", hex.join(" "), bytes.len());
}
