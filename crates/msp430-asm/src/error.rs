//! Error types and source span tracking for diagnostics.

#[allow(unused_imports)]
use alloc::format;
use alloc::string::String;
#[allow(unused_imports)]
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::reloc::RelocType;

/// Source location for diagnostics.
///
/// Tracks the line, column, byte offset, and length of a token or construct
/// in the original assembly source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (byte offset within line).
    pub col: u32,
    /// 0-based byte offset from start of source.
    pub offset: usize,
    /// Byte length of the spanned region.
    pub len: usize,
}

impl Span {
    /// Create a new span.
    #[must_use]
    pub fn new(line: u32, col: u32, offset: usize, len: usize) -> Self {
        Self {
            line,
            col,
            offset,
            len,
        }
    }

    /// A dummy span for generated/internal constructs.
    #[must_use]
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Smallest span covering both `self` and `other` (same line assumed).
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        let end = other.offset + other.len;
        Span {
            len: end.saturating_sub(self.offset),
            ..self
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Assembly or link error with a source location or relocation site.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// No instruction form exists for the mnemonic.
    UnknownMnemonic {
        /// The mnemonic that was not recognized.
        mnemonic: String,
        /// Source location of the mnemonic.
        span: Span,
    },

    /// A `j`-prefixed mnemonic whose condition suffix is not known.
    UnknownInstruction {
        /// The full mnemonic as written.
        mnemonic: String,
        /// Source location of the mnemonic.
        span: Span,
    },

    /// Operand does not fit any addressing-mode rule, or no instruction form
    /// accepts its class.
    InvalidOperand {
        /// 0-based index of the offending operand.
        index: usize,
        /// Description of why the operand is invalid.
        detail: String,
        /// Source location of the operand (or instruction when missing).
        span: Span,
    },

    /// Constant jump displacement outside ±511 words.
    InvalidJumpOffset {
        /// The displacement as written, in words.
        value: i128,
        /// Source location of the displacement expression.
        span: Span,
    },

    /// Constant value does not fit its encoding field.
    ImmediateOverflow {
        /// The immediate value that overflowed.
        value: i128,
        /// Minimum allowed value.
        min: i128,
        /// Maximum allowed value.
        max: i128,
        /// Source location of the immediate.
        span: Span,
    },

    /// Syntax error during lexing or parsing.
    Syntax {
        /// The syntax error message.
        msg: String,
        /// Source location of the syntax error.
        span: Span,
    },

    /// Referenced symbol was never defined.
    UndefinedLabel {
        /// The undefined label name.
        label: String,
        /// Source location of the reference.
        span: Span,
    },

    /// Label was defined more than once.
    DuplicateLabel {
        /// The duplicated label name.
        label: String,
        /// Source location of the duplicate definition.
        span: Span,
        /// Source location of the first definition.
        first_span: Span,
    },

    /// Resolved value does not fit the relocated field.
    RelocationOverflow {
        /// Relocation type being applied.
        r_type: RelocType,
        /// The value that failed the range check (after any field arithmetic).
        value: i64,
        /// Byte offset of the relocation site in the output image.
        offset: usize,
    },

    /// Relocation type code the patcher cannot apply.
    UnrecognizedRelocation {
        /// Raw relocation type code.
        r_type: u32,
        /// Byte offset of the relocation site in the output image.
        offset: usize,
    },

    /// Relocation site lies (partly) outside the buffer.
    RelocationOutOfBounds {
        /// Byte offset of the relocation site.
        offset: usize,
        /// Number of bytes the relocation writes.
        size: usize,
        /// Length of the buffer.
        len: usize,
    },

    /// Raw fixup kind outside the closed set. Always a programming error.
    InvalidFixupKind {
        /// The raw kind value.
        kind: u32,
    },

    /// A configurable resource limit was exceeded.
    ResourceLimitExceeded {
        /// Human-readable name of the resource (e.g. "statements", "labels").
        resource: String,
        /// The configured limit that was exceeded.
        limit: usize,
    },

    /// Multiple errors collected during assembly.
    Multiple {
        /// The collected assembly errors.
        errors: Vec<AsmError>,
    },
}

impl AsmError {
    /// Source span of the error, if it has one.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            AsmError::UnknownMnemonic { span, .. }
            | AsmError::UnknownInstruction { span, .. }
            | AsmError::InvalidOperand { span, .. }
            | AsmError::InvalidJumpOffset { span, .. }
            | AsmError::ImmediateOverflow { span, .. }
            | AsmError::Syntax { span, .. }
            | AsmError::UndefinedLabel { span, .. }
            | AsmError::DuplicateLabel { span, .. } => Some(*span),
            AsmError::Multiple { errors } => errors.first().and_then(AsmError::span),
            _ => None,
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::UnknownMnemonic { mnemonic, span } => {
                write!(f, "{}: invalid instruction mnemonic '{}'", span, mnemonic)
            }
            AsmError::UnknownInstruction { mnemonic, span } => {
                write!(f, "{}: unknown instruction '{}'", span, mnemonic)
            }
            AsmError::InvalidOperand {
                index,
                detail,
                span,
            } => {
                write!(
                    f,
                    "{}: invalid operand {} for instruction: {}",
                    span,
                    index + 1,
                    detail
                )
            }
            AsmError::InvalidJumpOffset { value, span } => {
                write!(
                    f,
                    "{}: invalid jump offset {} (must be within -512..511 words)",
                    span, value
                )
            }
            AsmError::ImmediateOverflow {
                value,
                min,
                max,
                span,
            } => {
                write!(
                    f,
                    "{}: immediate value {} out of range [{}..{}]",
                    span, value, min, max
                )
            }
            AsmError::Syntax { msg, span } => write!(f, "{}: {}", span, msg),
            AsmError::UndefinedLabel { label, span } => {
                write!(f, "{}: undefined label '{}'", span, label)
            }
            AsmError::DuplicateLabel {
                label,
                span,
                first_span,
            } => {
                write!(
                    f,
                    "{}: duplicate label '{}' (first defined at {})",
                    span, label, first_span
                )
            }
            AsmError::RelocationOverflow {
                r_type,
                value,
                offset,
            } => {
                write!(
                    f,
                    "offset 0x{:04x}: relocation {} out of range: {} is not in [{}, {}]",
                    offset,
                    r_type,
                    value,
                    r_type.min_value(),
                    r_type.max_value()
                )
            }
            AsmError::UnrecognizedRelocation { r_type, offset } => match RelocType::from_code(
                *r_type,
            ) {
                Some(known) => write!(
                    f,
                    "offset 0x{:04x}: unrecognized relocation {}",
                    offset, known
                ),
                None => write!(
                    f,
                    "offset 0x{:04x}: unrecognized relocation type {}",
                    offset, r_type
                ),
            },
            AsmError::RelocationOutOfBounds { offset, size, len } => {
                write!(
                    f,
                    "offset 0x{:04x}: {}-byte relocation site out of bounds (buffer len {})",
                    offset, size, len
                )
            }
            AsmError::InvalidFixupKind { kind } => write!(f, "invalid fixup kind {}", kind),
            AsmError::ResourceLimitExceeded { resource, limit } => {
                write!(
                    f,
                    "resource limit exceeded: {} (limit: {})",
                    resource, limit
                )
            }
            AsmError::Multiple { errors } => {
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AsmError {}
