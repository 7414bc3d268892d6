//! MSP430 instruction encoder.
//!
//! Turns a [`MatchedInstr`] into its opcode word, extension words and the
//! fixups the linker resolves later. Data directives are encoded by
//! [`encode_data`].

use alloc::vec::Vec;

use crate::error::{AsmError, Span};
use crate::ir::*;
use crate::matcher::{Format, MatchedInstr};
use crate::reloc::FixupKind;

// ─── InstrBytes: stack-allocated instruction buffer ────────────────────

/// Stack-allocated instruction byte buffer.
///
/// An MSP430 instruction is one opcode word plus at most two extension
/// words, so six bytes always suffice.
#[derive(Clone, Copy)]
pub struct InstrBytes {
    data: [u8; 6],
    len: u8,
}

impl InstrBytes {
    /// Create an empty buffer.
    #[inline]
    pub const fn new() -> Self {
        Self {
            data: [0; 6],
            len: 0,
        }
    }

    /// Append a little-endian word.
    ///
    /// # Panics
    ///
    /// Panics if the buffer already holds three words.
    #[inline]
    pub fn push_word(&mut self, word: u16) {
        let start = self.len as usize;
        assert!(start + 2 <= 6, "InstrBytes overflow: more than three words");
        self.data[start..start + 2].copy_from_slice(&word.to_le_bytes());
        self.len += 2;
    }

    /// Number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The opcode word, if one has been pushed.
    #[inline]
    pub fn opcode(&self) -> Option<u16> {
        (self.len >= 2).then(|| u16::from_le_bytes([self.data[0], self.data[1]]))
    }

    /// Convert to a heap-allocated `Vec<u8>`.
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl Default for InstrBytes {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for InstrBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl AsRef<[u8]> for InstrBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl core::fmt::Debug for InstrBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for InstrBytes {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for InstrBytes {}

impl PartialEq<[u8]> for InstrBytes {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

// ─── Encoded records ───────────────────────────────────────

/// A value the encoder could not compute, to be patched at link time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fixup {
    /// Byte offset of the site within the encoded instruction or data.
    pub offset: usize,
    /// Kind of value the site expects.
    pub kind: FixupKind,
    /// Expression to evaluate once symbols are known.
    pub expr: Expr,
    /// Source location of the expression.
    pub span: Span,
}

/// Result of encoding a single instruction.
#[derive(Debug, Clone)]
pub struct EncodedInstr {
    /// Opcode word followed by any extension words, little-endian.
    pub bytes: InstrBytes,
    /// Sites that still need a symbol value.
    pub fixups: Vec<Fixup>,
}

/// Result of encoding a data directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedData {
    /// Data bytes, little-endian, zero at fixup sites.
    pub bytes: Vec<u8>,
    /// Sites that still need a symbol value.
    pub fixups: Vec<Fixup>,
}

// ─── Operand fields ────────────────────────────────────────

const EXT_MIN: i128 = -0x8000;
const EXT_MAX: i128 = 0xFFFF;

/// Extension word contents.
enum Ext {
    Value(u16),
    Fixup(FixupKind, Expr, Span),
}

/// Register field, addressing-mode bits and optional extension word.
struct Field {
    reg: u16,
    mode: u16,
    ext: Option<Ext>,
}

fn ext_word(expr: &Expr, kind: FixupKind, span: Span) -> Result<Ext, AsmError> {
    match expr.eval() {
        Some(v) if (EXT_MIN..=EXT_MAX).contains(&v) => Ok(Ext::Value(v as u16)),
        Some(v) => Err(AsmError::ImmediateOverflow {
            value: v,
            min: EXT_MIN,
            max: EXT_MAX,
            span,
        }),
        None => Ok(Ext::Fixup(kind, expr.clone(), span)),
    }
}

fn memory_kind(base: Register) -> FixupKind {
    if base == Register::Pc {
        FixupKind::Pcrel16Byte
    } else {
        FixupKind::Abs16Byte
    }
}

/// Constant-generator register and As bits for `value`.
fn constant_generator(value: i128) -> Option<(Register, u16)> {
    match value {
        0 => Some((Register::Cg, 0)),
        1 => Some((Register::Cg, 1)),
        2 => Some((Register::Cg, 2)),
        -1 => Some((Register::Cg, 3)),
        4 => Some((Register::Sr, 2)),
        8 => Some((Register::Sr, 3)),
        _ => None,
    }
}

/// Source operand: any addressing mode, As in two bits.
fn source_field(op: &ParsedOperand) -> Result<Field, AsmError> {
    let field = |reg: Register, mode: u16, ext: Option<Ext>| Field {
        reg: u16::from(reg.encoding()),
        mode,
        ext,
    };
    Ok(match &op.operand {
        Operand::Register(r) => field(*r, 0, None),
        Operand::Memory { base, offset } => {
            field(*base, 1, Some(ext_word(offset, memory_kind(*base), op.span)?))
        }
        Operand::IndirectRegister(r) => field(*r, 2, None),
        Operand::PostIncrementRegister(r) => field(*r, 3, None),
        Operand::Immediate(e) => match e.eval().and_then(constant_generator) {
            Some((reg, mode)) => field(reg, mode, None),
            None => field(Register::Pc, 3, Some(ext_word(e, FixupKind::Abs16, op.span)?)),
        },
        Operand::Token(_) => return Err(invalid(0, op)),
    })
}

/// Destination operand: register or indexed, Ad in one bit.
fn destination_field(op: &ParsedOperand) -> Result<Field, AsmError> {
    match &op.operand {
        Operand::Register(r) => Ok(Field {
            reg: u16::from(r.encoding()),
            mode: 0,
            ext: None,
        }),
        Operand::Memory { base, offset } => Ok(Field {
            reg: u16::from(base.encoding()),
            mode: 1,
            ext: Some(ext_word(offset, memory_kind(*base), op.span)?),
        }),
        _ => Err(invalid(1, op)),
    }
}

fn invalid(index: usize, op: &ParsedOperand) -> AsmError {
    AsmError::InvalidOperand {
        index,
        detail: alloc::format!("cannot encode operand '{}'", op.operand),
        span: op.span,
    }
}

fn operand<'a>(m: &'a MatchedInstr, index: usize) -> Result<&'a ParsedOperand, AsmError> {
    m.operands.get(index).ok_or_else(|| AsmError::InvalidOperand {
        index,
        detail: alloc::format!("'{}' is missing operand {}", m.form.mnemonic, index),
        span: m.span,
    })
}

// ─── Instructions ──────────────────────────────────────────

struct Emitter {
    bytes: InstrBytes,
    fixups: Vec<Fixup>,
}

impl Emitter {
    fn new(word: u16) -> Self {
        let mut bytes = InstrBytes::new();
        bytes.push_word(word);
        Self {
            bytes,
            fixups: Vec::new(),
        }
    }

    fn ext(&mut self, ext: Option<Ext>) {
        match ext {
            None => {}
            Some(Ext::Value(v)) => self.bytes.push_word(v),
            Some(Ext::Fixup(kind, expr, span)) => {
                self.fixups.push(Fixup {
                    offset: self.bytes.len(),
                    kind,
                    expr,
                    span,
                });
                self.bytes.push_word(0);
            }
        }
    }

    fn finish(self) -> EncodedInstr {
        EncodedInstr {
            bytes: self.bytes,
            fixups: self.fixups,
        }
    }
}

/// Encode a matched instruction.
///
/// Extension words follow the opcode word, source before destination. Each
/// value that is not a constant leaves a zero word and a [`Fixup`].
///
/// # Errors
///
/// - [`AsmError::ImmediateOverflow`] for a constant extension value outside
///   `-32768..=65535`.
/// - [`AsmError::InvalidJumpOffset`] for a constant jump displacement
///   outside `-512..=511`.
pub fn encode(m: &MatchedInstr) -> Result<EncodedInstr, AsmError> {
    let bw = u16::from(m.form.byte) << 6;
    let encoded = match m.form.format {
        Format::DoubleOperand(opcode) => {
            let src = source_field(operand(m, 0)?)?;
            let dst = destination_field(operand(m, 1)?)?;
            let word = opcode << 12
                | src.reg << 8
                | dst.mode << 7
                | bw
                | src.mode << 4
                | dst.reg;
            let mut e = Emitter::new(word);
            e.ext(src.ext);
            e.ext(dst.ext);
            e.finish()
        }
        Format::SingleOperand(base) => match m.operands.first() {
            Some(op) => {
                let f = source_field(op)?;
                let mut e = Emitter::new(base | bw | f.mode << 4 | f.reg);
                e.ext(f.ext);
                e.finish()
            }
            None => Emitter::new(base).finish(),
        },
        Format::Jump => encode_jump(m)?,
    };
    log::trace!(
        "encode {} -> {:04x?} ({} fixups)",
        m.form.mnemonic,
        encoded.bytes.opcode(),
        encoded.fixups.len()
    );
    Ok(encoded)
}

/// Field value of the unconditional jump.
const JMP_FIELD: u16 = 7;

fn encode_jump(m: &MatchedInstr) -> Result<EncodedInstr, AsmError> {
    let (field, target) = match m.operands.as_slice() {
        [cc, target] => {
            let cond = cc
                .operand
                .as_immediate()
                .and_then(Expr::eval)
                .and_then(CondCode::from_code)
                .ok_or_else(|| invalid(0, cc))?;
            (cond.field(), target)
        }
        [target] => (JMP_FIELD, target),
        _ => {
            return Err(AsmError::InvalidOperand {
                index: 0,
                detail: alloc::format!("'{}' expects a target", m.form.mnemonic),
                span: m.span,
            })
        }
    };
    let expr = target.operand.as_immediate().ok_or_else(|| invalid(0, target))?;
    let word = 0x2000 | field << 10;

    match expr.eval() {
        Some(v) if (-512..=511).contains(&v) => Ok(Emitter::new(word | (v as u16 & 0x03FF)).finish()),
        Some(v) => Err(AsmError::InvalidJumpOffset {
            value: v,
            span: target.span,
        }),
        None => {
            let mut e = Emitter::new(word);
            e.fixups.push(Fixup {
                offset: 0,
                kind: FixupKind::Pcrel10,
                expr: expr.clone(),
                span: target.span,
            });
            Ok(e.finish())
        }
    }
}

// ─── Data ──────────────────────────────────────────────────

fn data_range(size: DataSize) -> (i128, i128) {
    match size {
        DataSize::Byte => (-0x80, 0xFF),
        DataSize::Word => (-0x8000, 0xFFFF),
        DataSize::Long => (-0x8000_0000, 0xFFFF_FFFF),
    }
}

fn data_kind(size: DataSize) -> FixupKind {
    match size {
        DataSize::Byte => FixupKind::Data1,
        DataSize::Word => FixupKind::Data2,
        DataSize::Long => FixupKind::Data4,
    }
}

/// Encode a `.byte` / `.word` / `.long` directive.
///
/// # Errors
///
/// [`AsmError::ImmediateOverflow`] for a constant that does not fit the
/// element width.
pub fn encode_data(decl: &DataDecl) -> Result<EncodedData, AsmError> {
    let width = decl.size.bytes();
    let (min, max) = data_range(decl.size);
    let mut bytes = Vec::with_capacity(width * decl.values.len());
    let mut fixups = Vec::new();

    for expr in &decl.values {
        match expr.eval() {
            Some(v) if (min..=max).contains(&v) => {
                bytes.extend_from_slice(&(v as u32).to_le_bytes()[..width]);
            }
            Some(v) => {
                return Err(AsmError::ImmediateOverflow {
                    value: v,
                    min,
                    max,
                    span: decl.span,
                })
            }
            None => {
                fixups.push(Fixup {
                    offset: bytes.len(),
                    kind: data_kind(decl.size),
                    expr: expr.clone(),
                    span: decl.span,
                });
                bytes.resize(bytes.len() + width, 0);
            }
        }
    }
    Ok(EncodedData { bytes, fixups })
}
