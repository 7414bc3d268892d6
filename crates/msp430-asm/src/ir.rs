//! Intermediate representation: registers, expressions, operands, statements.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::error::Span;

// ─── Registers ─────────────────────────────────────────────

/// Register class an instruction slot demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegClass {
    /// Full 16-bit registers.
    Gr16,
    /// Low-byte aliases used by `.b` instruction forms.
    Gr8,
}

/// An MSP430 register.
///
/// Sixteen 16-bit registers and their sixteen 8-bit low-byte aliases. The
/// byte aliases are never written in source; they only appear after the
/// matcher narrows a 16-bit register into a `.b` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Register {
    // 16-bit
    Pc,
    Sp,
    Sr,
    Cg,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    // 8-bit low-byte aliases
    Pcb,
    Spb,
    Srb,
    Cgb,
    R4b,
    R5b,
    R6b,
    R7b,
    R8b,
    R9b,
    R10b,
    R11b,
    R12b,
    R13b,
    R14b,
    R15b,
}

const GR16: [Register; 16] = [
    Register::Pc,
    Register::Sp,
    Register::Sr,
    Register::Cg,
    Register::R4,
    Register::R5,
    Register::R6,
    Register::R7,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

const GR8: [Register; 16] = [
    Register::Pcb,
    Register::Spb,
    Register::Srb,
    Register::Cgb,
    Register::R4b,
    Register::R5b,
    Register::R6b,
    Register::R7b,
    Register::R8b,
    Register::R9b,
    Register::R10b,
    Register::R11b,
    Register::R12b,
    Register::R13b,
    Register::R14b,
    Register::R15b,
];

impl Register {
    /// All sixteen 16-bit registers in encoding order.
    pub const GR16: [Register; 16] = GR16;
    /// All sixteen 8-bit aliases in encoding order.
    pub const GR8: [Register; 16] = GR8;

    /// Look up a register by name, case-insensitively.
    ///
    /// Accepts `pc`, `sp`, `sr`, `cg` and `r0`..`r15`; `r0`..`r3` name the
    /// same registers as `pc`, `sp`, `sr`, `cg`. Always yields a 16-bit
    /// register.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Register> {
        let mut buf = [0u8; 4];
        if name.len() > buf.len() {
            return None;
        }
        buf[..name.len()].copy_from_slice(name.as_bytes());
        buf[..name.len()].make_ascii_lowercase();
        let lower = core::str::from_utf8(&buf[..name.len()]).ok()?;
        match lower {
            "pc" => Some(Register::Pc),
            "sp" => Some(Register::Sp),
            "sr" => Some(Register::Sr),
            "cg" => Some(Register::Cg),
            _ => {
                let digits = lower.strip_prefix('r')?;
                // Reject "r" alone and leading zeros like "r04".
                if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
                    return None;
                }
                let n: usize = digits.parse().ok()?;
                GR16.get(n).copied()
            }
        }
    }

    /// The 4-bit register field value.
    #[must_use]
    pub fn encoding(self) -> u8 {
        let idx = self as u8;
        idx & 0x0F
    }

    /// Register class of this register.
    #[must_use]
    pub fn class(self) -> RegClass {
        if (self as u8) < 16 {
            RegClass::Gr16
        } else {
            RegClass::Gr8
        }
    }

    /// Narrow to the 8-bit low-byte alias.
    ///
    /// Every 16-bit register has exactly one alias; an 8-bit register maps
    /// to itself.
    #[must_use]
    pub fn to_gr8(self) -> Option<Register> {
        GR8.get(self.encoding() as usize).copied()
    }

    /// The 16-bit register this one aliases (identity for 16-bit registers).
    #[must_use]
    pub fn to_gr16(self) -> Register {
        GR16[self.encoding() as usize]
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_gr16() {
            Register::Pc => write!(f, "pc"),
            Register::Sp => write!(f, "sp"),
            Register::Sr => write!(f, "sr"),
            Register::Cg => write!(f, "cg"),
            other => write!(f, "r{}", other.encoding()),
        }
    }
}

// ─── Expressions ───────────────────────────────────────────

/// A constant or symbolic expression.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    /// A numeric literal.
    Num(i128),
    /// A symbol reference.
    Label(String),
    /// Addition: left + right.
    Add(Box<Expr>, Box<Expr>),
    /// Subtraction: left - right.
    Sub(Box<Expr>, Box<Expr>),
    /// Multiplication: left * right.
    Mul(Box<Expr>, Box<Expr>),
    /// Negation.
    Neg(Box<Expr>),
}

impl Expr {
    /// Try to evaluate to a constant integer.
    ///
    /// Returns `None` if the expression still contains unresolved symbols
    /// or an intermediate result overflows.
    pub fn eval(&self) -> Option<i128> {
        match self {
            Expr::Num(n) => Some(*n),
            Expr::Label(_) => None,
            Expr::Add(l, r) => l.eval()?.checked_add(r.eval()?),
            Expr::Sub(l, r) => l.eval()?.checked_sub(r.eval()?),
            Expr::Mul(l, r) => l.eval()?.checked_mul(r.eval()?),
            Expr::Neg(e) => e.eval()?.checked_neg(),
        }
    }

    /// Decompose into a single symbol plus a numeric addend.
    ///
    /// Returns `Some((symbol, addend))` for `sym`, `sym + c`, `c + sym`,
    /// `sym - c`. Returns `None` for zero or several symbols, a negated
    /// symbol, a symbol inside a product, or an addend outside `i64`.
    pub fn label_addend(&self) -> Option<(&str, i64)> {
        let mut label: Option<&str> = None;
        let mut addend: i64 = 0;
        if self.collect_single_label(&mut label, &mut addend, 1) {
            label.map(|l| (l, addend))
        } else {
            None
        }
    }

    /// Evaluate with symbols looked up through `lookup`.
    ///
    /// Returns `Err(name)` naming the first symbol `lookup` cannot resolve.
    pub fn eval_with<'a>(
        &'a self,
        lookup: &impl Fn(&str) -> Option<i128>,
    ) -> Result<Option<i128>, &'a str> {
        Ok(match self {
            Expr::Num(n) => Some(*n),
            Expr::Label(name) => Some(lookup(name).ok_or(name.as_str())?),
            Expr::Add(l, r) => match (l.eval_with(lookup)?, r.eval_with(lookup)?) {
                (Some(a), Some(b)) => a.checked_add(b),
                _ => None,
            },
            Expr::Sub(l, r) => match (l.eval_with(lookup)?, r.eval_with(lookup)?) {
                (Some(a), Some(b)) => a.checked_sub(b),
                _ => None,
            },
            Expr::Mul(l, r) => match (l.eval_with(lookup)?, r.eval_with(lookup)?) {
                (Some(a), Some(b)) => a.checked_mul(b),
                _ => None,
            },
            Expr::Neg(e) => e.eval_with(lookup)?.and_then(i128::checked_neg),
        })
    }

    fn collect_single_label<'a>(
        &'a self,
        label: &mut Option<&'a str>,
        addend: &mut i64,
        sign: i64,
    ) -> bool {
        match self {
            Expr::Num(n) => accumulate(addend, *n, sign),
            Expr::Label(name) => {
                if sign != 1 || label.is_some() {
                    false
                } else {
                    *label = Some(name.as_str());
                    true
                }
            }
            Expr::Add(l, r) => {
                l.collect_single_label(label, addend, sign)
                    && r.collect_single_label(label, addend, sign)
            }
            Expr::Sub(l, r) => {
                l.collect_single_label(label, addend, sign)
                    && r.collect_single_label(label, addend, -sign)
            }
            Expr::Neg(e) => e.collect_single_label(label, addend, -sign),
            Expr::Mul(..) => self.eval().is_some_and(|n| accumulate(addend, n, sign)),
        }
    }
}

/// `addend += n * sign`, failing if any step leaves the `i64` range.
fn accumulate(addend: &mut i64, n: i128, sign: i64) -> bool {
    let sum = i64::try_from(n)
        .ok()
        .and_then(|n| n.checked_mul(sign))
        .and_then(|n| addend.checked_add(n));
    match sum {
        Some(v) => {
            *addend = v;
            true
        }
        None => false,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => write!(f, "{}", n),
            Expr::Label(name) => write!(f, "{}", name),
            Expr::Add(l, r) => write!(f, "({} + {})", l, r),
            Expr::Sub(l, r) => write!(f, "({} - {})", l, r),
            Expr::Mul(l, r) => write!(f, "({} * {})", l, r),
            Expr::Neg(e) => write!(f, "-{}", e),
        }
    }
}

// ─── Operands ──────────────────────────────────────────────

/// Values an immediate can take without an extension word.
pub const CG_VALUES: [i128; 6] = [0, 1, 2, 4, 8, -1];

/// A parsed operand.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// `rN`
    Register(Register),
    /// `#expr`
    Immediate(Expr),
    /// `disp(rN)`, `expr` (base `pc`), or `&expr` (base `sr`).
    Memory {
        /// Base register.
        base: Register,
        /// Displacement or address expression.
        offset: Expr,
    },
    /// `@rN`
    IndirectRegister(Register),
    /// `@rN+`
    PostIncrementRegister(Register),
    /// Mnemonic or keyword placeholder, never a real argument.
    Token(String),
}

impl Operand {
    /// The register, if this is a `Register` operand.
    #[must_use]
    pub fn as_register(&self) -> Option<Register> {
        match self {
            Operand::Register(r) => Some(*r),
            _ => None,
        }
    }

    /// The expression, if this is an `Immediate` operand.
    #[must_use]
    pub fn as_immediate(&self) -> Option<&Expr> {
        match self {
            Operand::Immediate(e) => Some(e),
            _ => None,
        }
    }

    /// Base register and offset, if this is a `Memory` operand.
    #[must_use]
    pub fn as_memory(&self) -> Option<(Register, &Expr)> {
        match self {
            Operand::Memory { base, offset } => Some((*base, offset)),
            _ => None,
        }
    }

    /// The token text, if this is a `Token` operand.
    #[must_use]
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Operand::Token(t) => Some(t),
            _ => None,
        }
    }

    /// Whether this is an immediate the constant generators can produce:
    /// a statically known value in `{0, 1, 2, 4, 8, -1}`.
    #[must_use]
    pub fn is_cg_immediate(&self) -> bool {
        match self {
            Operand::Immediate(e) => e.eval().is_some_and(|v| CG_VALUES.contains(&v)),
            _ => false,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Immediate(e) => write!(f, "#{}", e),
            Operand::Memory { base, offset } => match base {
                Register::Pc => write!(f, "{}", offset),
                Register::Sr => write!(f, "&{}", offset),
                _ => write!(f, "{}({})", offset, base),
            },
            Operand::IndirectRegister(r) => write!(f, "@{}", r),
            Operand::PostIncrementRegister(r) => write!(f, "@{}+", r),
            Operand::Token(t) => write!(f, "{}", t),
        }
    }
}

/// An operand together with its source span.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParsedOperand {
    /// The operand.
    pub operand: Operand,
    /// Where it was written.
    pub span: Span,
}

impl ParsedOperand {
    /// Pair an operand with its span.
    #[must_use]
    pub fn new(operand: Operand, span: Span) -> Self {
        Self { operand, span }
    }
}

// ─── Condition codes ───────────────────────────────────────

/// Conditional-jump condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CondCode {
    /// Equal / zero (`jeq`, `jz`).
    Eq,
    /// Not equal / not zero (`jne`, `jnz`).
    Ne,
    /// Higher or same / carry (`jhs`, `jc`).
    Hs,
    /// Lower / no carry (`jlo`, `jnc`).
    Lo,
    /// Signed greater or equal (`jge`).
    Ge,
    /// Signed less (`jl`).
    L,
    /// Negative (`jn`).
    N,
}

impl CondCode {
    /// Every condition, ordered by [`CondCode::code`].
    pub const ALL: [CondCode; 7] = [
        CondCode::Eq,
        CondCode::Ne,
        CondCode::Hs,
        CondCode::Lo,
        CondCode::Ge,
        CondCode::L,
        CondCode::N,
    ];

    /// Parse the suffix after the leading `j` (case-insensitive).
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<CondCode> {
        let cc = match suffix.to_ascii_lowercase().as_str() {
            "ne" | "nz" => CondCode::Ne,
            "eq" | "z" => CondCode::Eq,
            "lo" | "nc" => CondCode::Lo,
            "hs" | "c" => CondCode::Hs,
            "n" => CondCode::N,
            "ge" => CondCode::Ge,
            "l" => CondCode::L,
            _ => return None,
        };
        Some(cc)
    }

    /// Value carried by the synthetic condition-code immediate.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            CondCode::Eq => 0,
            CondCode::Ne => 1,
            CondCode::Hs => 2,
            CondCode::Lo => 3,
            CondCode::Ge => 4,
            CondCode::L => 5,
            CondCode::N => 6,
        }
    }

    /// Inverse of [`CondCode::code`].
    #[must_use]
    pub fn from_code(code: i128) -> Option<CondCode> {
        CondCode::ALL.iter().copied().find(|cc| cc.code() as i128 == code)
    }

    /// The 3-bit condition field of the jump opcode (bits 12..10).
    #[must_use]
    pub fn field(self) -> u16 {
        match self {
            CondCode::Ne => 0,
            CondCode::Eq => 1,
            CondCode::Lo => 2,
            CondCode::Hs => 3,
            CondCode::N => 4,
            CondCode::Ge => 5,
            CondCode::L => 6,
        }
    }

    /// The logically opposite condition. `N` has no hardware inverse.
    #[must_use]
    pub fn invert(self) -> Option<CondCode> {
        match self {
            CondCode::Eq => Some(CondCode::Ne),
            CondCode::Ne => Some(CondCode::Eq),
            CondCode::L => Some(CondCode::Ge),
            CondCode::Ge => Some(CondCode::L),
            CondCode::Hs => Some(CondCode::Lo),
            CondCode::Lo => Some(CondCode::Hs),
            CondCode::N => None,
        }
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CondCode::Eq => "eq",
            CondCode::Ne => "ne",
            CondCode::Hs => "hs",
            CondCode::Lo => "lo",
            CondCode::Ge => "ge",
            CondCode::L => "l",
            CondCode::N => "n",
        };
        f.write_str(s)
    }
}

// ─── Statements ────────────────────────────────────────────

/// A single instruction after parsing and normalization.
///
/// `mnemonic` is lowercase with any `.w` suffix removed. Conditional jumps
/// are normalized to mnemonic `j` with the condition code as the first
/// operand; `jmp` keeps its name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// Canonical mnemonic.
    pub mnemonic: String,
    /// Operands in source order.
    pub operands: Vec<ParsedOperand>,
    /// Location of the mnemonic.
    pub span: Span,
}

/// Data directive element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataSize {
    /// `.byte`
    Byte,
    /// `.word` / `.short`
    Word,
    /// `.long`
    Long,
}

impl DataSize {
    /// Width in bytes.
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            DataSize::Byte => 1,
            DataSize::Word => 2,
            DataSize::Long => 4,
        }
    }
}

/// `.byte` / `.word` / `.long` values.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataDecl {
    /// Element width.
    pub size: DataSize,
    /// One expression per element.
    pub values: Vec<Expr>,
    /// Location of the directive.
    pub span: Span,
}

/// `NAME = expr`, `.equ NAME, expr`, `.set NAME, expr`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstDef {
    /// Constant name.
    pub name: String,
    /// Value.
    pub value: i128,
    /// Location of the definition.
    pub span: Span,
}

/// One parsed source statement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Statement {
    /// `name:`
    Label(String, Span),
    /// An instruction.
    Instruction(Instruction),
    /// Data directive.
    Data(DataDecl),
    /// Constant definition.
    Const(ConstDef),
    /// `.align n`: pad to a `2^n`-byte boundary.
    Align {
        /// Log2 of the alignment.
        power: u32,
        /// Location of the directive.
        span: Span,
    },
    /// `.refsym`, `.global`, `.globl`: symbols made visible to the linker.
    Global(Vec<String>, Span),
}
