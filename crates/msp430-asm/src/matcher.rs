//! Instruction matcher: selects an instruction form for a parsed instruction.
//!
//! Every mnemonic owns a list of operand-class signatures, most specific
//! first. The first signature whose slots accept all operands wins. `.b`
//! forms use 8-bit register slots; a 16-bit register written in such a slot
//! is narrowed to its low-byte alias.
//!
//! Emulated instructions (`clr`, `inc`, `ret`, `br`, ...) are rewritten to
//! their native equivalents before matching.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::{AsmError, Span};
use crate::ir::*;

/// Operand class an instruction slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandClass {
    /// 16-bit register.
    Gr16,
    /// 8-bit register; a 16-bit register is narrowed into it.
    Gr8,
    /// Indexed, symbolic, or absolute memory.
    Mem,
    /// `@rN`
    IndReg,
    /// `@rN+`
    PostInc,
    /// Immediate the constant generators can produce.
    CgImm,
    /// Any immediate.
    Imm,
    /// Condition-code immediate of a normalized conditional jump.
    CondCode,
}

impl OperandClass {
    /// Whether `op` fits this slot.
    #[must_use]
    pub fn accepts(self, op: &Operand) -> bool {
        match (self, op) {
            (OperandClass::Gr16, Operand::Register(r)) => r.class() == RegClass::Gr16,
            (OperandClass::Gr8, Operand::Register(_)) => true,
            // Indexed mode on cg selects a constant, not memory.
            (OperandClass::Mem, Operand::Memory { base, .. }) => {
                base.class() == RegClass::Gr16 && *base != Register::Cg
            }
            (OperandClass::IndReg, Operand::IndirectRegister(r)) => {
                r.class() == RegClass::Gr16 && !matches!(r, Register::Sr | Register::Cg)
            }
            (OperandClass::PostInc, Operand::PostIncrementRegister(r)) => {
                r.class() == RegClass::Gr16
                    && !matches!(r, Register::Pc | Register::Sr | Register::Cg)
            }
            (OperandClass::CgImm, op) => op.is_cg_immediate(),
            (OperandClass::Imm, Operand::Immediate(_)) => true,
            (OperandClass::CondCode, Operand::Immediate(e)) => {
                e.eval().and_then(CondCode::from_code).is_some()
            }
            _ => false,
        }
    }
}

/// Encoding family of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Two-operand (format I); the value is the 4-bit opcode.
    DoubleOperand(u16),
    /// One-operand (format II); the value is the base opcode word.
    SingleOperand(u16),
    /// Conditional or unconditional relative jump.
    Jump,
}

/// One mnemonic's entry in the form table.
#[derive(Debug)]
pub struct InstrForm {
    /// Mnemonic including any `.b` suffix.
    pub mnemonic: &'static str,
    /// Encoding family.
    pub format: Format,
    /// Byte-width (`.b`) form.
    pub byte: bool,
    /// Accepted operand signatures, most specific first.
    pub signatures: &'static [&'static [OperandClass]],
}

use OperandClass::{CgImm, CondCode as Cc, Gr16, Gr8, Imm, IndReg, Mem, PostInc};

static DOUBLE_W: &[&[OperandClass]] = &[
    &[Gr16, Gr16],
    &[Mem, Gr16],
    &[IndReg, Gr16],
    &[PostInc, Gr16],
    &[CgImm, Gr16],
    &[Imm, Gr16],
    &[Gr16, Mem],
    &[Mem, Mem],
    &[IndReg, Mem],
    &[PostInc, Mem],
    &[CgImm, Mem],
    &[Imm, Mem],
];

static DOUBLE_B: &[&[OperandClass]] = &[
    &[Gr8, Gr8],
    &[Mem, Gr8],
    &[IndReg, Gr8],
    &[PostInc, Gr8],
    &[CgImm, Gr8],
    &[Imm, Gr8],
    &[Gr8, Mem],
    &[Mem, Mem],
    &[IndReg, Mem],
    &[PostInc, Mem],
    &[CgImm, Mem],
    &[Imm, Mem],
];

static SINGLE_DST_W: &[&[OperandClass]] = &[&[Gr16], &[Mem], &[IndReg], &[PostInc]];
static SINGLE_DST_B: &[&[OperandClass]] = &[&[Gr8], &[Mem], &[IndReg], &[PostInc]];
static SINGLE_SRC_W: &[&[OperandClass]] =
    &[&[Gr16], &[Mem], &[IndReg], &[PostInc], &[CgImm], &[Imm]];
static SINGLE_SRC_B: &[&[OperandClass]] =
    &[&[Gr8], &[Mem], &[IndReg], &[PostInc], &[CgImm], &[Imm]];
static NONE: &[&[OperandClass]] = &[&[]];
static JCC: &[&[OperandClass]] = &[&[Cc, Imm]];
static JMP: &[&[OperandClass]] = &[&[Imm]];

macro_rules! double {
    ($w:literal, $b:literal, $op:literal) => {
        [
            InstrForm {
                mnemonic: $w,
                format: Format::DoubleOperand($op),
                byte: false,
                signatures: DOUBLE_W,
            },
            InstrForm {
                mnemonic: $b,
                format: Format::DoubleOperand($op),
                byte: true,
                signatures: DOUBLE_B,
            },
        ]
    };
}

const fn single(
    mnemonic: &'static str,
    base: u16,
    byte: bool,
    signatures: &'static [&'static [OperandClass]],
) -> InstrForm {
    InstrForm {
        mnemonic,
        format: Format::SingleOperand(base),
        byte,
        signatures,
    }
}

static DOUBLE_FORMS: [[InstrForm; 2]; 12] = [
    double!("mov", "mov.b", 0x4),
    double!("add", "add.b", 0x5),
    double!("addc", "addc.b", 0x6),
    double!("subc", "subc.b", 0x7),
    double!("sub", "sub.b", 0x8),
    double!("cmp", "cmp.b", 0x9),
    double!("dadd", "dadd.b", 0xA),
    double!("bit", "bit.b", 0xB),
    double!("bic", "bic.b", 0xC),
    double!("bis", "bis.b", 0xD),
    double!("xor", "xor.b", 0xE),
    double!("and", "and.b", 0xF),
];

static OTHER_FORMS: [InstrForm; 12] = [
    single("rrc", 0x1000, false, SINGLE_DST_W),
    single("rrc.b", 0x1000, true, SINGLE_DST_B),
    single("swpb", 0x1080, false, SINGLE_DST_W),
    single("rra", 0x1100, false, SINGLE_DST_W),
    single("rra.b", 0x1100, true, SINGLE_DST_B),
    single("sxt", 0x1180, false, SINGLE_DST_W),
    single("push", 0x1200, false, SINGLE_SRC_W),
    single("push.b", 0x1200, true, SINGLE_SRC_B),
    single("call", 0x1280, false, SINGLE_SRC_W),
    single("reti", 0x1300, false, NONE),
    InstrForm {
        mnemonic: "j",
        format: Format::Jump,
        byte: false,
        signatures: JCC,
    },
    InstrForm {
        mnemonic: "jmp",
        format: Format::Jump,
        byte: false,
        signatures: JMP,
    },
];

/// Look up the form table entry for a canonical mnemonic.
#[must_use]
pub fn lookup(mnemonic: &str) -> Option<&'static InstrForm> {
    DOUBLE_FORMS
        .iter()
        .flatten()
        .chain(OTHER_FORMS.iter())
        .find(|f| f.mnemonic == mnemonic)
}

/// An instruction bound to a form, operands narrowed to the chosen slots.
#[derive(Debug, Clone)]
pub struct MatchedInstr {
    /// The selected form.
    pub form: &'static InstrForm,
    /// The signature that matched.
    pub signature: &'static [OperandClass],
    /// Operands after narrowing.
    pub operands: Vec<ParsedOperand>,
    /// Location of the mnemonic.
    pub span: Span,
}

/// Select the instruction form for `instr`.
///
/// # Errors
///
/// - [`AsmError::UnknownMnemonic`] if no form exists for the mnemonic.
/// - [`AsmError::InvalidOperand`] if forms exist but none accepts the
///   operands; `index` is the furthest operand any signature reached.
///
/// Operand indices in errors always refer to the operands as written, also
/// for emulated instructions.
pub fn match_instruction(instr: &Instruction) -> Result<MatchedInstr, AsmError> {
    let Some(native) = expand_alias(instr)? else {
        return match_native(instr);
    };
    match_native(&native).map_err(|err| match err {
        AsmError::InvalidOperand {
            index,
            detail,
            span,
        } => AsmError::InvalidOperand {
            index: written_index(instr, &native, index),
            detail,
            span,
        },
        other => other,
    })
}

/// Position in `written` of the operand that became `native.operands[index]`.
/// Operands the alias supplies itself map to the first written operand.
fn written_index(written: &Instruction, native: &Instruction, index: usize) -> usize {
    native
        .operands
        .get(index)
        .and_then(|op| written.operands.iter().position(|w| w.span == op.span))
        .unwrap_or(0)
}

fn match_native(instr: &Instruction) -> Result<MatchedInstr, AsmError> {
    let form = lookup(&instr.mnemonic).ok_or_else(|| AsmError::UnknownMnemonic {
        mnemonic: instr.mnemonic.clone(),
        span: instr.span,
    })?;

    let mut furthest = 0usize;
    for sig in form.signatures {
        match first_mismatch(sig, &instr.operands) {
            None => return Ok(bind(form, sig, instr)),
            Some(i) => furthest = furthest.max(i),
        }
    }
    Err(operand_error(form, instr, furthest))
}

/// Index of the first slot/operand pair that does not fit, or `None` if the
/// whole signature matches.
fn first_mismatch(sig: &[OperandClass], ops: &[ParsedOperand]) -> Option<usize> {
    let n = sig.len().max(ops.len());
    (0..n).find(|&i| match (sig.get(i), ops.get(i)) {
        (Some(class), Some(op)) => !class.accepts(&op.operand),
        _ => true,
    })
}

fn bind(
    form: &'static InstrForm,
    sig: &'static [OperandClass],
    instr: &Instruction,
) -> MatchedInstr {
    let operands = sig
        .iter()
        .zip(&instr.operands)
        .map(|(class, op)| match (class, &op.operand) {
            (OperandClass::Gr8, Operand::Register(r)) => {
                ParsedOperand::new(Operand::Register(r.to_gr8().unwrap_or(*r)), op.span)
            }
            _ => op.clone(),
        })
        .collect();
    MatchedInstr {
        form,
        signature: sig,
        operands,
        span: instr.span,
    }
}

fn operand_error(form: &InstrForm, instr: &Instruction, index: usize) -> AsmError {
    let max_arity = form.signatures.iter().map(|s| s.len()).max().unwrap_or(0);
    match instr.operands.get(index) {
        None => AsmError::InvalidOperand {
            index,
            detail: alloc::format!("'{}' expects {} operand(s)", form.mnemonic, max_arity),
            span: instr.span,
        },
        Some(op) if index >= max_arity => AsmError::InvalidOperand {
            index,
            detail: alloc::format!(
                "unexpected operand '{}' ('{}' takes {})",
                op.operand,
                form.mnemonic,
                max_arity
            ),
            span: op.span,
        },
        Some(op) => AsmError::InvalidOperand {
            index,
            detail: alloc::format!(
                "'{}' is not a valid operand for '{}'",
                op.operand,
                form.mnemonic
            ),
            span: op.span,
        },
    }
}

// ─── Emulated instructions ─────────────────────────────────

fn take_operands<const N: usize>(instr: &Instruction) -> Result<[ParsedOperand; N], AsmError> {
    let ops = &instr.operands;
    if ops.len() < N {
        return Err(AsmError::InvalidOperand {
            index: ops.len(),
            detail: alloc::format!("'{}' expects {} operand(s)", instr.mnemonic, N),
            span: instr.span,
        });
    }
    if ops.len() > N {
        return Err(AsmError::InvalidOperand {
            index: N,
            detail: alloc::format!(
                "unexpected operand '{}' ('{}' takes {})",
                ops[N].operand,
                instr.mnemonic,
                N
            ),
            span: ops[N].span,
        });
    }
    Ok(core::array::from_fn(|i| ops[i].clone()))
}

/// An alias operand written in destination position: `@rN` means `0(rN)`.
fn as_destination(op: ParsedOperand) -> ParsedOperand {
    match op.operand {
        Operand::IndirectRegister(base) => ParsedOperand::new(
            Operand::Memory {
                base,
                offset: Expr::Num(0),
            },
            op.span,
        ),
        _ => op,
    }
}

/// Rewrite an emulated instruction into its native form.
///
/// Returns `Ok(None)` if `instr` is not an emulated instruction.
///
/// # Errors
///
/// [`AsmError::InvalidOperand`] if the alias has the wrong number of operands.
pub fn expand_alias(instr: &Instruction) -> Result<Option<Instruction>, AsmError> {
    let (base, byte) = match instr.mnemonic.strip_suffix(".b") {
        Some(base) => (base, true),
        None => (instr.mnemonic.as_str(), false),
    };
    let span = instr.span;
    let imm = |v: i128| ParsedOperand::new(Operand::Immediate(Expr::Num(v)), span);
    let reg = |r: Register| ParsedOperand::new(Operand::Register(r), span);
    let pop_sp = || ParsedOperand::new(Operand::PostIncrementRegister(Register::Sp), span);

    // Aliases with a byte form.
    let sized: Option<(&str, Vec<ParsedOperand>)> = match base {
        "clr" | "inc" | "incd" | "dec" | "decd" | "tst" | "inv" | "adc" | "sbc" | "dadc" => {
            let [dst] = take_operands::<1>(instr)?;
            let (native, value) = match base {
                "clr" => ("mov", 0),
                "inc" => ("add", 1),
                "incd" => ("add", 2),
                "dec" => ("sub", 1),
                "decd" => ("sub", 2),
                "tst" => ("cmp", 0),
                "inv" => ("xor", -1),
                "adc" => ("addc", 0),
                "sbc" => ("subc", 0),
                _ => ("dadd", 0),
            };
            Some((native, vec![imm(value), as_destination(dst)]))
        }
        "rla" | "rlc" => {
            let [dst] = take_operands::<1>(instr)?;
            let native = if base == "rla" { "add" } else { "addc" };
            let src = dst.clone();
            Some((native, vec![src, as_destination(dst)]))
        }
        "pop" => {
            let [dst] = take_operands::<1>(instr)?;
            Some(("mov", vec![pop_sp(), as_destination(dst)]))
        }
        _ => None,
    };

    let rewritten = match sized {
        Some((native, operands)) => {
            let mut mnemonic = String::from(native);
            if byte {
                mnemonic.push_str(".b");
            }
            Some((mnemonic, operands))
        }
        None if byte => None,
        None => {
            let flag = |native: &str, bit: i128| -> Result<_, AsmError> {
                take_operands::<0>(instr)?;
                Ok(Some((String::from(native), vec![imm(bit), reg(Register::Sr)])))
            };
            match base {
                "nop" => {
                    take_operands::<0>(instr)?;
                    Some((String::from("mov"), vec![imm(0), reg(Register::Cg)]))
                }
                "ret" => {
                    take_operands::<0>(instr)?;
                    Some((String::from("mov"), vec![pop_sp(), reg(Register::Pc)]))
                }
                "br" => {
                    let [src] = take_operands::<1>(instr)?;
                    Some((String::from("mov"), vec![src, reg(Register::Pc)]))
                }
                "clrc" => flag("bic", 1)?,
                "setc" => flag("bis", 1)?,
                "clrz" => flag("bic", 2)?,
                "setz" => flag("bis", 2)?,
                "clrn" => flag("bic", 4)?,
                "setn" => flag("bis", 4)?,
                "dint" => flag("bic", 8)?,
                "eint" => flag("bis", 8)?,
                _ => None,
            }
        }
    };

    Ok(rewritten.map(|(mnemonic, operands)| {
        log::debug!("alias {} -> {}", instr.mnemonic, mnemonic);
        Instruction {
            mnemonic,
            operands,
            span,
        }
    }))
}
