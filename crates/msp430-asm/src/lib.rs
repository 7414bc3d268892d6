//! # msp430-asm: Pure Rust MSP430 Assembler Core
//!
//! `msp430-asm` turns MSP430 assembly text into machine-code bytes and
//! resolves symbol references through the MSP430 ELF relocation model.
//!
//! ## Quick Start
//!
//! ```rust
//! use msp430_asm::assemble;
//!
//! let code = assemble("nop").unwrap();
//! assert_eq!(code, vec![0x03, 0x43]);
//! ```
//!
//! ## Pipeline
//!
//! - **Parser**: addressing-mode grammar and conditional-jump normalization.
//! - **Matcher**: static form table with 8-bit register narrowing for `.b`
//!   forms and the standard emulated instructions (`clr`, `inc`, `ret`, ...).
//! - **Encoder**: opcode and extension words, constant generators, fixups.
//! - **Relocations**: fixup→relocation mapping and the relocation patcher.
//! - **`no_std` + `alloc`**: embeddable in firmware tooling and WASM.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// An assembler performs many narrowing / sign-changing casts between integer
// widths (i128→u16, u64→i64, etc.) and uses dense hex literals without
// separators (0xFC00, 0x03FF). The lints below are expected here.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

extern crate alloc;

/// Public assembler API: builder pattern, one-shot assembly, and `AssemblyResult`.
pub mod assembler;
/// MSP430 instruction and data encoder (opcode words, extension words, fixups).
pub mod encoder;
/// Error types and source-span diagnostics.
pub mod error;
/// Intermediate representation: registers, operands, instructions, directives.
pub mod ir;
/// Zero-copy lexer (tokenizer) with span tracking.
pub mod lexer;
/// Fragment-based linker: layout, label resolution, fixup patching.
pub mod linker;
/// Instruction matcher: form table, operand classes, emulated instructions.
pub mod matcher;
/// Parser producing IR statements.
pub mod parser;
/// Fixup kinds, relocation types, and the relocation patcher.
pub mod reloc;

// Re-exports
pub use assembler::{Assembler, AssemblyResult, ResourceLimits};
pub use encoder::{EncodedInstr, Fixup};
pub use error::{AsmError, Span};
pub use ir::{
    CondCode, ConstDef, DataDecl, DataSize, Expr, Instruction, Operand, ParsedOperand, RegClass,
    Register, Statement,
};
pub use matcher::{match_instruction, MatchedInstr, OperandClass};
pub use parser::{normalize_jump, parse_operand};
pub use reloc::{
    map_fixup_kind, relocate, relocate_record, FixupKind, RelocType, RelocationRecord, TRAP_INSTR,
};

use alloc::vec::Vec;

/// Assemble a string of MSP430 assembly into machine code bytes at base
/// address 0.
///
/// Newlines separate statements; `;` starts a comment. Labels are defined
/// with a trailing colon: `loop:`
///
/// # Errors
///
/// Returns [`AsmError`] if the input contains syntax errors, unknown
/// mnemonics, invalid operand combinations, undefined labels, or values
/// that do not fit their fields.
///
/// # Examples
///
/// ```rust
/// use msp430_asm::assemble;
///
/// let code = assemble("loop: jmp loop").unwrap();
/// assert_eq!(code, vec![0xFF, 0x3F]);
/// ```
pub fn assemble(source: &str) -> Result<Vec<u8>, AsmError> {
    assemble_at(source, 0)
}

/// Assemble with an explicit base address.
///
/// # Errors
///
/// Returns [`AsmError`] on assembly failure (see [`assemble`] for details).
///
/// # Examples
///
/// ```rust
/// use msp430_asm::assemble_at;
///
/// let code = assemble_at("start: mov #start, r4", 0xC000).unwrap();
/// assert_eq!(code, vec![0x34, 0x40, 0x00, 0xC0]);
/// ```
pub fn assemble_at(source: &str, base_addr: u64) -> Result<Vec<u8>, AsmError> {
    let mut asm = Assembler::new();
    asm.base_address(base_addr);
    asm.emit(source)?;
    let result = asm.finish()?;
    Ok(result.into_bytes())
}

/// Assemble with external symbols pre-defined at known addresses.
///
/// # Errors
///
/// Returns [`AsmError`] on assembly failure (see [`assemble`] for details).
///
/// # Examples
///
/// ```rust
/// use msp430_asm::assemble_with;
///
/// let code = assemble_with("call #abort", 0x0, &[("abort", 0xFFF0)]).unwrap();
/// assert_eq!(code, vec![0xB0, 0x12, 0xF0, 0xFF]);
/// ```
pub fn assemble_with(
    source: &str,
    base_addr: u64,
    external_symbols: &[(&str, u64)],
) -> Result<Vec<u8>, AsmError> {
    let mut asm = Assembler::new();
    asm.base_address(base_addr);
    for &(name, addr) in external_symbols {
        asm.define_external(name, addr);
    }
    asm.emit(source)?;
    let result = asm.finish()?;
    Ok(result.into_bytes())
}
