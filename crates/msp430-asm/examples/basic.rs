//! Basic assembly example — demonstrates the one-shot and builder APIs.
//!
//! Run with: `cargo run --example basic`

use msp430_asm::{assemble, Assembler};

fn main() {
    println!("=== msp430_asm basic example ===\n");

    // --- One-shot assembly ---
    println!("1. One-shot assembly (mov #42, r15; ret):");
    let bytes = assemble("mov #42, r15\nret").unwrap();
    print_hex("   ", &bytes);

    // --- Builder API ---
    println!("\n2. Builder API (blink loop at 0xC000):");
    let mut asm = Assembler::new();
    asm.base_address(0xC000).enable_listing();
    asm.emit(
        r#"
.equ WDTCTL, 0x0120
.equ P1DIR, 0x0022
.equ P1OUT, 0x0021
main:
    mov   #0x0400, sp
    mov   #0x5A80, &WDTCTL  ; stop watchdog
    bis.b #1, &P1DIR
loop:
    xor.b #1, &P1OUT
    mov   #50000, r15
delay:
    dec   r15
    jnz   delay
    jmp   loop
"#,
    )
    .unwrap();

    let result = asm.finish().unwrap();
    print_hex("   ", result.bytes());

    // Label addresses
    println!("\n   Labels:");
    for (name, addr) in result.labels() {
        println!("   {}: 0x{:04X}", name, addr);
    }

    // Relocations
    println!("\n   Relocations:");
    for rec in result.relocations() {
        println!(
            "   +0x{:04X} {} {}{:+}",
            rec.offset, rec.r_type, rec.symbol, rec.addend
        );
    }

    // Listing output
    println!("\n   Listing:");
    for line in result.listing().lines() {
        println!("   {}", line);
    }

    // --- Data directives ---
    println!("\n3. Interrupt vector table:");
    let mut asm = Assembler::new();
    asm.base_address(0xFFE0);
    asm.define_external("reset_handler", 0xC000);
    asm.emit(".word 0, 0, 0, 0, 0, 0, 0, 0\n.word 0, 0, 0, 0, 0, 0, 0, reset_handler")
        .unwrap();
    print_hex("   ", asm.finish().unwrap().bytes());

    println!("\n=== Done! ===");
}

fn print_hex(prefix: &str, bytes: &[u8]) {
    print!("{}", prefix);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && i % 16 == 0 {
            println!();
            print!("{}", prefix);
        }
        print!("{:02X} ", b);
    }
    println!();
}
