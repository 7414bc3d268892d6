#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz the one-shot assembler: must never panic, only return Ok/Err.
    let _ = msp430_asm::assemble(data);

    // Also fuzz with a non-zero base address.
    let _ = msp430_asm::assemble_at(data, 0xC000);

    // Fuzz the builder API with multiple emit calls (split on newlines).
    let mut asm = msp430_asm::Assembler::new();
    for line in data.lines() {
        if asm.emit(line).is_err() {
            return;
        }
    }
    let _ = asm.finish();
});
