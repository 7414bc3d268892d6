#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<u8>, usize, u32, u64)| {
    let (mut buf, offset, r_type, value) = input;
    let before = buf.clone();
    // A failed patch must leave the buffer untouched.
    if msp430_asm::relocate(&mut buf, offset, r_type, value).is_err() {
        assert_eq!(buf, before);
    }
});
