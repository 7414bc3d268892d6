//! Public assembler API: builder pattern and one-shot assembly.
//!
//! This module ties together the lexer, parser, matcher, encoder, and
//! linker into a fluent API for assembling MSP430 code.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::encoder;
use crate::error::{AsmError, Span};
use crate::ir::*;
use crate::lexer;
use crate::linker::Linker;
use crate::matcher;
use crate::parser;
use crate::reloc::RelocationRecord;

/// The result of a successful assembly operation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct AssemblyResult {
    /// The assembled machine code.
    bytes: Vec<u8>,
    /// Label addresses (name → absolute address).
    labels: Vec<(String, u64)>,
    /// Relocation records applied to the output.
    relocations: Vec<RelocationRecord>,
    /// Base address used during assembly.
    base_address: u64,
    /// Symbols named by `.global` / `.globl` / `.refsym`, in first-seen order.
    referenced_symbols: Vec<String>,
    /// Source text annotations: `(address, source_text)` for listing.
    source_annotations: Vec<(u64, String)>,
}

impl AssemblyResult {
    /// Get the assembled bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use msp430_asm::Assembler;
    ///
    /// let mut asm = Assembler::new();
    /// asm.emit("nop")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.bytes(), &[0x03, 0x43]);
    /// # Ok::<(), msp430_asm::AsmError>(())
    /// ```
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Get the byte count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the result is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Get label addresses (name, absolute address), sorted by name.
    #[must_use]
    pub fn labels(&self) -> &[(String, u64)] {
        &self.labels
    }

    /// Look up a label address by name.
    ///
    /// # Examples
    ///
    /// ```
    /// use msp430_asm::Assembler;
    ///
    /// let mut asm = Assembler::new();
    /// asm.base_address(0xC000);
    /// asm.emit("start: nop\nnop\nend: ret")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.label_address("start"), Some(0xC000));
    /// assert_eq!(result.label_address("end"), Some(0xC004));
    /// # Ok::<(), msp430_asm::AsmError>(())
    /// ```
    #[must_use]
    pub fn label_address(&self, name: &str) -> Option<u64> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| *addr)
    }

    /// Relocation records that were resolved and applied, in output order.
    #[must_use]
    pub fn relocations(&self) -> &[RelocationRecord] {
        &self.relocations
    }

    /// Base address used for assembly.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Symbols named by `.global`, `.globl` or `.refsym`.
    #[must_use]
    pub fn referenced_symbols(&self) -> &[String] {
        &self.referenced_symbols
    }

    /// Produce a human-readable listing of address and hex bytes.
    ///
    /// Labels are shown on their own line with their resolved address. Each
    /// instruction gets its own row when listing was enabled; otherwise bytes
    /// are shown in rows of up to 8.
    ///
    /// # Example output
    ///
    /// ```text
    /// C000            main:
    /// C000  4031 0400       mov #0x400, sp
    /// C004  3FFD            jmp main
    /// ```
    #[must_use]
    pub fn listing(&self) -> String {
        use core::fmt::Write;

        let mut out = String::new();
        let base = self.base_address;

        let mut label_at: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
        for (name, addr) in &self.labels {
            label_at.entry(*addr).or_default().push(name);
        }
        let source_at: BTreeMap<u64, &str> = self
            .source_annotations
            .iter()
            .filter(|(_, text)| !text.is_empty())
            .map(|(addr, text)| (*addr, text.as_str()))
            .collect();
        let splits: BTreeSet<u64> = label_at.keys().chain(source_at.keys()).copied().collect();

        let write_labels = |out: &mut String, addr: u64| {
            for name in label_at.get(&addr).into_iter().flatten() {
                let _ = writeln!(out, "{:04X}            {}:", addr, name);
            }
        };

        let mut i = 0;
        let mut addr = base;
        while i < self.bytes.len() {
            write_labels(&mut out, addr);

            let max_end = core::cmp::min(i + 8, self.bytes.len());
            let end = splits
                .range(addr + 1..addr + (max_end - i) as u64)
                .next()
                .map_or(max_end, |&split| (split - base) as usize);

            let hex = self.bytes[i..end]
                .chunks(2)
                .fold(String::new(), |mut acc, word| {
                    if !acc.is_empty() {
                        acc.push(' ');
                    }
                    // Words are shown most significant byte first.
                    for b in word.iter().rev() {
                        let _ = write!(acc, "{:02X}", b);
                    }
                    acc
                });

            match source_at.get(&addr) {
                Some(text) => {
                    let _ = writeln!(out, "{:04X}  {:<14}  {}", addr, hex, text);
                }
                None => {
                    let _ = writeln!(out, "{:04X}  {}", addr, hex);
                }
            }

            addr += (end - i) as u64;
            i = end;
        }
        write_labels(&mut out, addr);

        out
    }
}

/// Configurable resource limits for defense against pathological input.
///
/// All limits default to generous values that are sufficient for any
/// program that fits in a 16-bit address space many times over.
///
/// # Examples
///
/// ```rust
/// use msp430_asm::{Assembler, ResourceLimits};
///
/// let mut asm = Assembler::new();
/// asm.limits(ResourceLimits {
///     max_statements: 1_000,
///     max_labels: 100,
///     max_output_bytes: 4096,
///     max_errors: 16,
///     max_source_bytes: 64 * 1024,
/// });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceLimits {
    /// Maximum number of parsed statements (instructions + directives + labels).
    /// Default: 1,000,000.
    pub max_statements: usize,
    /// Maximum number of labels that can be defined. Default: 100,000.
    pub max_labels: usize,
    /// Maximum output size in bytes. Default: 16 MiB.
    pub max_output_bytes: usize,
    /// Maximum accumulated errors before bailing. Default: 64.
    pub max_errors: usize,
    /// Maximum input source bytes per `emit()` call. Default: 64 MiB.
    pub max_source_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_statements: 1_000_000,
            max_labels: 100_000,
            max_output_bytes: 16 * 1024 * 1024,
            max_errors: 64,
            max_source_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Largest `.align` power accepted by the builder API.
const MAX_ALIGN_POWER: u32 = 15;

/// Builder-pattern assembler.
///
/// # Examples
///
/// ```rust
/// use msp430_asm::Assembler;
///
/// let mut asm = Assembler::new();
/// asm.emit("mov #0x0280, sp").unwrap();
/// asm.emit("loop: inc r4").unwrap();
/// asm.emit("jmp loop").unwrap();
/// let result = asm.finish().unwrap();
/// assert_eq!(result.len(), 8);
/// ```
#[derive(Debug)]
pub struct Assembler {
    linker: Linker,
    /// Accumulated instruction errors for multi-error mode.
    errors: Vec<AsmError>,
    /// Maps linker fragment index → source text for listing.
    fragment_annotations: Vec<(usize, String)>,
    /// Whether to collect source annotations for listing output.
    listing_enabled: bool,
    resource_limits: ResourceLimits,
    /// Running count of parsed statements so far.
    statement_count: usize,
    /// Running count of defined labels so far.
    label_count: usize,
    /// `.global` / `.refsym` names in first-seen order.
    referenced: Vec<String>,
    /// Running estimate of cumulative output bytes, checked before data is
    /// allocated.
    estimated_output_bytes: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Create a new assembler with base address 0.
    pub fn new() -> Self {
        Self {
            linker: Linker::new(),
            errors: Vec::new(),
            fragment_annotations: Vec::new(),
            listing_enabled: false,
            resource_limits: ResourceLimits::default(),
            statement_count: 0,
            label_count: 0,
            referenced: Vec::new(),
            estimated_output_bytes: 0,
        }
    }

    /// Set resource limits for defense against pathological inputs.
    pub fn limits(&mut self, limits: ResourceLimits) -> &mut Self {
        self.resource_limits = limits;
        self
    }

    /// Record source text per instruction for [`AssemblyResult::listing`].
    ///
    /// # Examples
    ///
    /// ```
    /// use msp430_asm::Assembler;
    ///
    /// let mut asm = Assembler::new();
    /// asm.enable_listing();
    /// asm.emit("nop")?;
    /// let listing = asm.finish()?.listing();
    /// assert!(listing.contains("4303"));
    /// assert!(listing.contains("nop"));
    /// # Ok::<(), msp430_asm::AsmError>(())
    /// ```
    pub fn enable_listing(&mut self) -> &mut Self {
        self.listing_enabled = true;
        self
    }

    /// Set the load address of the image.
    pub fn base_address(&mut self, addr: u64) -> &mut Self {
        self.linker.set_base_address(addr);
        self
    }

    /// Define an external symbol at a known absolute address.
    ///
    /// # Examples
    ///
    /// ```
    /// use msp430_asm::Assembler;
    ///
    /// let mut asm = Assembler::new();
    /// asm.define_external("putchar", 0xF000);
    /// asm.emit("call #putchar")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.bytes(), &[0xB0, 0x12, 0x00, 0xF0]);
    /// # Ok::<(), msp430_asm::AsmError>(())
    /// ```
    pub fn define_external(&mut self, name: &str, addr: u64) -> &mut Self {
        self.linker.define_external(name, addr);
        self
    }

    /// Define a named constant value, usable like `.equ`.
    pub fn define_constant(&mut self, name: &str, value: i128) -> &mut Self {
        self.linker.define_constant(name, value);
        self
    }

    /// Emit assembly source text. Can be called multiple times.
    ///
    /// Parse errors fail the call. Matching and encoding errors are collected
    /// and reported by [`finish`](Assembler::finish).
    ///
    /// # Errors
    ///
    /// Returns [`AsmError`] on lexer or parse errors, duplicate labels, or
    /// if resource limits are exceeded.
    pub fn emit(&mut self, source: &str) -> Result<&mut Self, AsmError> {
        if source.len() > self.resource_limits.max_source_bytes {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("source bytes"),
                limit: self.resource_limits.max_source_bytes,
            });
        }
        let tokens = lexer::tokenize(source)?;
        let statements = parser::parse_with_constants(&tokens, self.linker.constants())?;
        self.process_statements(&statements, source)?;
        Ok(self)
    }

    /// Add a label at the current position (builder API).
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::DuplicateLabel`] if the label was already defined,
    /// or [`AsmError::ResourceLimitExceeded`] if the label limit is reached.
    pub fn label(&mut self, name: &str) -> Result<&mut Self, AsmError> {
        self.add_label(name, Span::dummy())?;
        Ok(self)
    }

    /// Emit raw bytes (builder API for `.byte`).
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::ResourceLimitExceeded`] if the output size limit
    /// would be exceeded.
    pub fn db(&mut self, bytes: &[u8]) -> Result<&mut Self, AsmError> {
        self.check_output_limit(bytes.len())?;
        self.linker.add_bytes(bytes.to_vec(), Span::dummy());
        Ok(self)
    }

    /// Emit a 16-bit little-endian value (builder API for `.word`).
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::ResourceLimitExceeded`] if the output size limit
    /// would be exceeded.
    pub fn dw(&mut self, value: u16) -> Result<&mut Self, AsmError> {
        self.check_output_limit(2)?;
        self.linker
            .add_bytes(value.to_le_bytes().to_vec(), Span::dummy());
        Ok(self)
    }

    /// Emit a 32-bit little-endian value (builder API for `.long`).
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::ResourceLimitExceeded`] if the output size limit
    /// would be exceeded.
    pub fn dl(&mut self, value: u32) -> Result<&mut Self, AsmError> {
        self.check_output_limit(4)?;
        self.linker
            .add_bytes(value.to_le_bytes().to_vec(), Span::dummy());
        Ok(self)
    }

    /// Pad to a `2^power`-byte boundary with the trap pattern (builder API
    /// for `.align`).
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::Syntax`] if `power` is larger than 15.
    pub fn align(&mut self, power: u32) -> Result<&mut Self, AsmError> {
        if power > MAX_ALIGN_POWER {
            return Err(AsmError::Syntax {
                msg: alloc::format!("alignment power {power} exceeds {MAX_ALIGN_POWER}"),
                span: Span::dummy(),
            });
        }
        self.check_output_limit((1usize << power) - 1)?;
        self.linker.add_alignment(power, Span::dummy());
        Ok(self)
    }

    /// Returns the current number of fragments (instructions + data) emitted so far.
    pub fn current_fragment_count(&self) -> usize {
        self.linker.fragment_count()
    }

    /// Encode a single instruction and return its raw bytes immediately,
    /// without label resolution.
    ///
    /// Extension words that refer to symbols are left as zero. The
    /// instruction is NOT added to the assembler's internal state.
    ///
    /// # Examples
    ///
    /// ```
    /// use msp430_asm::Assembler;
    ///
    /// let asm = Assembler::new();
    /// assert_eq!(asm.encode_one("mov r4, r5")?, [0x05, 0x44]);
    /// assert_eq!(asm.encode_one("mov #0x1234, r5")?, [0x35, 0x40, 0x34, 0x12]);
    /// # Ok::<(), msp430_asm::AsmError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`AsmError`] if the instruction cannot be parsed, matched or
    /// encoded, or if the source is not an instruction.
    pub fn encode_one(&self, source: &str) -> Result<Vec<u8>, AsmError> {
        let tokens = lexer::tokenize(source)?;
        let stmts = parser::parse_with_constants(&tokens, self.linker.constants())?;
        match stmts.first() {
            None => Ok(Vec::new()),
            Some(Statement::Instruction(instr)) => {
                let matched = matcher::match_instruction(instr)?;
                Ok(encoder::encode(&matched)?.bytes.to_vec())
            }
            Some(_) => Err(AsmError::Syntax {
                msg: String::from("expected an instruction"),
                span: Span::dummy(),
            }),
        }
    }

    /// Reset the assembler to its initial state, keeping configuration
    /// (base address, externals, constants, limits, listing) intact.
    ///
    /// # Examples
    ///
    /// ```
    /// use msp430_asm::Assembler;
    ///
    /// let mut asm = Assembler::new();
    /// asm.emit("nop")?;
    /// asm.reset();
    /// asm.emit("ret")?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.bytes(), &[0x30, 0x41]);
    /// # Ok::<(), msp430_asm::AsmError>(())
    /// ```
    pub fn reset(&mut self) -> &mut Self {
        self.linker.clear();
        self.errors.clear();
        self.fragment_annotations.clear();
        self.statement_count = 0;
        self.label_count = 0;
        self.referenced.clear();
        self.estimated_output_bytes = 0;
        self
    }

    /// Check that adding `n` bytes would not exceed the output size limit.
    fn check_output_limit(&mut self, additional: usize) -> Result<(), AsmError> {
        self.estimated_output_bytes += additional;
        if self.estimated_output_bytes > self.resource_limits.max_output_bytes {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("output bytes"),
                limit: self.resource_limits.max_output_bytes,
            });
        }
        Ok(())
    }

    /// Finalize assembly: lay out, resolve fixups, return the image.
    ///
    /// # Errors
    ///
    /// Returns the single collected error, [`AsmError::Multiple`] if several
    /// instructions failed, or any linker error (undefined symbol,
    /// relocation overflow).
    pub fn finish(mut self) -> Result<AssemblyResult, AsmError> {
        if !self.errors.is_empty() {
            if self.errors.len() == 1 {
                return Err(self.errors.remove(0));
            }
            return Err(AsmError::Multiple {
                errors: self.errors,
            });
        }

        let base = self.linker.base_address();
        let (bytes, labels, relocations, offsets) = self.linker.resolve()?;

        if bytes.len() > self.resource_limits.max_output_bytes {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("output bytes"),
                limit: self.resource_limits.max_output_bytes,
            });
        }

        let source_annotations = self
            .fragment_annotations
            .iter()
            .filter_map(|(idx, text)| offsets.get(*idx).map(|addr| (*addr, text.clone())))
            .collect();

        Ok(AssemblyResult {
            bytes,
            labels,
            relocations,
            base_address: base,
            referenced_symbols: self.referenced,
            source_annotations,
        })
    }

    fn add_label(&mut self, name: &str, span: Span) -> Result<(), AsmError> {
        self.label_count += 1;
        if self.label_count > self.resource_limits.max_labels {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("labels"),
                limit: self.resource_limits.max_labels,
            });
        }
        self.linker.add_label(name, span)
    }

    fn process_statements(&mut self, statements: &[Statement], source: &str) -> Result<(), AsmError> {
        self.statement_count += statements.len();
        if self.statement_count > self.resource_limits.max_statements {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("statements"),
                limit: self.resource_limits.max_statements,
            });
        }

        for stmt in statements {
            match stmt {
                Statement::Label(name, span) => self.add_label(name, *span)?,

                Statement::Instruction(instr) => {
                    let frag_idx = self.linker.fragment_count();
                    match matcher::match_instruction(instr).and_then(|m| encoder::encode(&m)) {
                        Ok(encoded) => {
                            self.check_output_limit(encoded.bytes.len())?;
                            self.linker.add_encoded(encoded, instr.span);
                            self.annotate(frag_idx, source, instr.span);
                        }
                        Err(e) => self.record_error(e)?,
                    }
                }

                Statement::Data(data) => {
                    let frag_idx = self.linker.fragment_count();
                    match encoder::encode_data(data) {
                        Ok(encoded) => {
                            self.check_output_limit(encoded.bytes.len())?;
                            self.linker.add_data(encoded, data.span);
                            self.annotate(frag_idx, source, data.span);
                        }
                        Err(e) => self.record_error(e)?,
                    }
                }

                Statement::Align { power, span } => {
                    self.check_output_limit((1usize << power) - 1)?;
                    self.linker.add_alignment(*power, *span);
                }

                Statement::Const(c) => self.linker.define_constant(&c.name, c.value),

                Statement::Global(names, _) => {
                    for name in names {
                        if !self.referenced.contains(name) {
                            self.referenced.push(name.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn record_error(&mut self, e: AsmError) -> Result<(), AsmError> {
        self.errors.push(e);
        if self.errors.len() >= self.resource_limits.max_errors {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("errors"),
                limit: self.resource_limits.max_errors,
            });
        }
        Ok(())
    }

    /// Record a source-text annotation for a fragment, if listing is enabled.
    #[inline]
    fn annotate(&mut self, frag_idx: usize, source: &str, span: Span) {
        if self.listing_enabled {
            let text = extract_source_line(source, span);
            if !text.is_empty() {
                self.fragment_annotations.push((frag_idx, text.to_string()));
            }
        }
    }
}

/// Extract the trimmed source line containing `span`, without any label
/// definition in front of the statement.
fn extract_source_line(source: &str, span: Span) -> &str {
    let offset = span.offset;
    if offset >= source.len() || !source.is_char_boundary(offset) {
        return "";
    }
    let line_end = source[offset..]
        .find('\n')
        .map_or(source.len(), |p| offset + p);
    source[offset..line_end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(src: &str) -> Result<AssemblyResult, AsmError> {
        let mut asm = Assembler::new();
        asm.emit(src)?;
        asm.finish()
    }

    #[test]
    fn assemble_nop() {
        assert_eq!(assemble("nop").unwrap().bytes(), &[0x03, 0x43]);
    }

    #[test]
    fn assemble_ret() {
        assert_eq!(assemble("ret").unwrap().bytes(), &[0x30, 0x41]);
    }

    #[test]
    fn assemble_self_loop() {
        assert_eq!(assemble("here: jmp here").unwrap().bytes(), &[0xFF, 0x3F]);
    }

    #[test]
    fn assemble_backward_conditional_jump() {
        let r = assemble("top: dec r15\njnz top").unwrap();
        // dec r15 = sub #1, r15 = 0x831F; jnz back 2 words: -2 -> 0x3FE.
        assert_eq!(r.bytes(), &[0x1F, 0x83, 0xFE, 0x23]);
    }

    #[test]
    fn assemble_forward_reference() {
        let r = assemble("mov #data, r4\nnop\ndata: .word 0xBEEF").unwrap();
        assert_eq!(r.bytes(), &[0x34, 0x40, 0x06, 0x00, 0x03, 0x43, 0xEF, 0xBE]);
        assert_eq!(r.relocations().len(), 1);
    }

    #[test]
    fn builder_api() {
        let mut asm = Assembler::new();
        asm.base_address(0xF800);
        asm.label("entry").unwrap();
        asm.emit("nop").unwrap();
        asm.dw(0x1234).unwrap();
        asm.db(&[0xAA]).unwrap();
        asm.align(1).unwrap();
        asm.dl(0xDEADBEEF).unwrap();
        let r = asm.finish().unwrap();
        assert_eq!(
            r.bytes(),
            &[0x03, 0x43, 0x34, 0x12, 0xAA, 0x43, 0xEF, 0xBE, 0xAD, 0xDE]
        );
        assert_eq!(r.label_address("entry"), Some(0xF800));
        assert_eq!(r.base_address(), 0xF800);
    }

    #[test]
    fn builder_align_power_limit() {
        let mut asm = Assembler::new();
        assert!(matches!(asm.align(16), Err(AsmError::Syntax { .. })));
    }

    #[test]
    fn define_constant_before_emit() {
        let mut asm = Assembler::new();
        asm.define_constant("WDTCTL", 0x0120);
        asm.emit("mov #0x5A80, &WDTCTL").unwrap();
        let r = asm.finish().unwrap();
        assert_eq!(r.bytes(), &[0xB2, 0x40, 0x80, 0x5A, 0x20, 0x01]);
    }

    #[test]
    fn constants_carry_across_emits() {
        let mut asm = Assembler::new();
        asm.emit(".equ COUNT, 10").unwrap();
        asm.emit("mov #COUNT, r4").unwrap();
        assert_eq!(asm.finish().unwrap().bytes(), &[0x34, 0x40, 0x0A, 0x00]);
    }

    #[test]
    fn referenced_symbols_collected() {
        let r = assemble(".global main, isr\n.refsym __crt0\n.globl main\nmain: nop").unwrap();
        assert_eq!(r.referenced_symbols(), &["main", "isr", "__crt0"]);
    }

    #[test]
    fn instruction_errors_collected() {
        let mut asm = Assembler::new();
        asm.emit("frob r4\nmov r4, #1\nnop").unwrap();
        match asm.finish() {
            Err(AsmError::Multiple { errors }) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], AsmError::UnknownMnemonic { .. }));
                assert!(matches!(errors[1], AsmError::InvalidOperand { index: 1, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_error_returned_bare() {
        assert!(matches!(
            assemble("jmp nowhere"),
            Err(AsmError::UndefinedLabel { .. })
        ));
    }

    #[test]
    fn duplicate_label_error() {
        let mut asm = Assembler::new();
        let err = asm.emit("a: nop\na: nop").unwrap_err();
        assert!(matches!(err, AsmError::DuplicateLabel { .. }));
    }

    #[test]
    fn label_limit() {
        let mut asm = Assembler::new();
        asm.limits(ResourceLimits {
            max_labels: 1,
            ..ResourceLimits::default()
        });
        assert!(matches!(
            asm.emit("a: nop\nb: nop"),
            Err(AsmError::ResourceLimitExceeded { .. })
        ));
    }

    #[test]
    fn output_limit() {
        let mut asm = Assembler::new();
        asm.limits(ResourceLimits {
            max_output_bytes: 4,
            ..ResourceLimits::default()
        });
        asm.emit("nop\nnop").unwrap();
        assert!(asm.emit("nop").is_err());
    }

    #[test]
    fn source_limit() {
        let mut asm = Assembler::new();
        asm.limits(ResourceLimits {
            max_source_bytes: 4,
            ..ResourceLimits::default()
        });
        assert!(asm.emit("nop\nnop").is_err());
    }

    #[test]
    fn error_limit() {
        let mut asm = Assembler::new();
        asm.limits(ResourceLimits {
            max_errors: 2,
            ..ResourceLimits::default()
        });
        assert!(matches!(
            asm.emit("frob\nfrob\nfrob"),
            Err(AsmError::ResourceLimitExceeded { .. })
        ));
    }

    #[test]
    fn encode_one_leaves_symbol_sites_zero() {
        let asm = Assembler::new();
        assert_eq!(asm.encode_one("call #main").unwrap(), [0xB0, 0x12, 0, 0]);
        assert!(asm.encode_one(".word 1").is_err());
        assert!(asm.encode_one("").unwrap().is_empty());
    }

    #[test]
    fn reset_keeps_configuration() {
        let mut asm = Assembler::new();
        asm.base_address(0x4400).define_external("ext", 0x1234);
        asm.emit("start: nop").unwrap();
        asm.reset();
        asm.emit("start: mov #ext, r4").unwrap();
        let r = asm.finish().unwrap();
        assert_eq!(r.bytes(), &[0x34, 0x40, 0x34, 0x12]);
        assert_eq!(r.label_address("start"), Some(0x4400));
    }

    #[test]
    fn listing_shows_labels_and_source() {
        let mut asm = Assembler::new();
        asm.base_address(0xC000).enable_listing();
        asm.emit("main: mov #0x400, sp\njmp main").unwrap();
        let listing = asm.finish().unwrap().listing();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "C000            main:");
        assert!(lines[1].starts_with("C000  4031 0400"));
        assert!(lines[1].ends_with("mov #0x400, sp"));
        assert!(lines[2].starts_with("C004  3FFD"));
        assert!(lines[2].ends_with("jmp main"));
    }

    #[test]
    fn listing_without_annotations() {
        let mut asm = Assembler::new();
        asm.emit("nop\nnop").unwrap();
        let listing = asm.finish().unwrap().listing();
        assert_eq!(listing, "0000  4303 4303\n");
    }
}
