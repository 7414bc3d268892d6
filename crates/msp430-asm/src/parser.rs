//! MSP430 assembly parser.
//!
//! Converts a stream of `Token`s from the lexer into a `Statement` list.
//! Handles instructions, labels, data and constant directives, the operand
//! addressing-mode grammar, and conditional-jump normalization.
//!
//! A malformed line does not stop parsing: the parser records the error,
//! skips to the next line and carries on, then reports everything it found.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::{AsmError, Span};
use crate::ir::*;
use crate::lexer::{Token, TokenKind};

/// Largest jump displacement, in words, written as a constant.
const JUMP_MAX: i128 = 511;
/// Smallest jump displacement, in words, written as a constant.
const JUMP_MIN: i128 = -512;

/// Zero-allocation ASCII-lowercase into a caller-provided stack buffer.
/// Returns `&str` of the lowered text. Inputs longer than `buf` are truncated.
#[inline]
fn to_lower_buf<'b>(s: &str, buf: &'b mut [u8]) -> &'b str {
    let len = s.len().min(buf.len());
    buf[..len].copy_from_slice(&s.as_bytes()[..len]);
    buf[..len].make_ascii_lowercase();
    core::str::from_utf8(&buf[..len]).unwrap_or("")
}

/// Parse a token stream into a list of IR statements.
///
/// # Errors
///
/// Returns the first error if exactly one line failed to parse, or
/// `AsmError::Multiple` with one error per failing line.
pub fn parse(tokens: &[Token<'_>]) -> Result<Vec<Statement>, AsmError> {
    parse_with_constants(tokens, &BTreeMap::new())
}

/// Parse with named constants already defined (substituted like `.equ`).
///
/// # Errors
///
/// Same as [`parse`].
pub fn parse_with_constants(
    tokens: &[Token<'_>],
    constants: &BTreeMap<String, i128>,
) -> Result<Vec<Statement>, AsmError> {
    let mut parser = Parser::new(tokens);
    parser.constants = constants.clone();
    let (stmts, mut errors) = parser.parse_program();
    match errors.len() {
        0 => Ok(stmts),
        1 => Err(errors.remove(0)),
        _ => Err(AsmError::Multiple { errors }),
    }
}

/// Tokenize and parse in one step.
///
/// # Errors
///
/// Returns a lexer error, or the errors described in [`parse`].
pub fn parse_str(source: &str) -> Result<Vec<Statement>, AsmError> {
    let tokens = crate::lexer::tokenize(source)?;
    parse(&tokens)
}

/// Parse exactly one operand from `tokens`.
///
/// `is_destination` is true for the second operand of a two-operand
/// instruction; there `@rN` means `0(rN)`.
///
/// # Errors
///
/// `AsmError::InvalidOperand` if the leading token cannot start an operand,
/// `AsmError::Syntax` for a malformed operand or trailing tokens.
pub fn parse_operand(tokens: &[Token<'_>], is_destination: bool) -> Result<ParsedOperand, AsmError> {
    let mut parser = Parser::new(tokens);
    let op = parser.parse_operand(is_destination)?;
    parser.expect_statement_end()?;
    Ok(op)
}

/// Normalize a `j`-prefixed mnemonic and parse its displacement from `rest`.
///
/// Returns `Ok(None)` if `name` does not start with `j`. Otherwise the
/// operand list starts with a synthetic `Token("jmp")` for an unconditional
/// jump, or `Token("j")` followed by the condition code as an immediate;
/// the displacement expression comes last. An optional leading `$` is
/// skipped.
///
/// # Errors
///
/// `AsmError::UnknownInstruction` for an unknown condition suffix,
/// `AsmError::InvalidJumpOffset` for a constant outside `-512..=511`,
/// `AsmError::Syntax` for a missing expression or trailing tokens.
pub fn normalize_jump(
    name: &str,
    span: Span,
    rest: &[Token<'_>],
) -> Result<Option<Vec<ParsedOperand>>, AsmError> {
    let mut parser = Parser::new(rest);
    parser.normalize_jump(&name.to_ascii_lowercase(), span)
}

static EOF_TOKEN: Token<'static> = Token {
    kind: TokenKind::Eof,
    text: alloc::borrow::Cow::Borrowed(""),
    span: Span {
        line: 0,
        col: 0,
        offset: 0,
        len: 0,
    },
};

struct Parser<'a> {
    tokens: &'a [Token<'a>],
    pos: usize,
    /// Constants defined so far (via `.equ` or `NAME = expr`), substituted
    /// into later expressions.
    constants: BTreeMap<String, i128>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            pos: 0,
            constants: BTreeMap::new(),
        }
    }

    #[inline]
    fn peek(&self) -> &Token<'a> {
        self.tokens.get(self.pos).unwrap_or(&EOF_TOKEN)
    }

    #[inline]
    fn advance(&mut self) -> &Token<'a> {
        let tok = self.tokens.get(self.pos).unwrap_or(&EOF_TOKEN);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len() || self.peek().kind == TokenKind::Eof
    }

    #[inline]
    fn is_statement_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
    }

    /// Span of the most recently consumed token.
    fn last_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or_else(|| self.peek().span, |t| t.span)
    }

    fn expect_statement_end(&mut self) -> Result<(), AsmError> {
        if self.is_statement_end() {
            Ok(())
        } else {
            let tok = self.peek();
            Err(AsmError::Syntax {
                msg: alloc::format!("unexpected token '{}'", tok.text),
                span: tok.span,
            })
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), AsmError> {
        let tok = self.advance();
        if tok.kind == TokenKind::Ident {
            Ok((tok.text.to_string(), tok.span))
        } else {
            Err(AsmError::Syntax {
                msg: alloc::format!("expected identifier, found '{}'", tok.text),
                span: tok.span,
            })
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Span, AsmError> {
        let tok = self.advance();
        if tok.kind == kind {
            Ok(tok.span)
        } else {
            Err(AsmError::Syntax {
                msg: alloc::format!("expected '{}', found '{}'", what, tok.text),
                span: tok.span,
            })
        }
    }

    #[inline]
    fn skip_newlines(&mut self) {
        while !self.at_end() && self.peek().kind == TokenKind::Newline {
            self.advance();
        }
    }

    fn skip_line(&mut self) {
        while !self.is_statement_end() {
            self.advance();
        }
    }

    fn parse_program(&mut self) -> (Vec<Statement>, Vec<AsmError>) {
        let mut stmts = Vec::with_capacity(self.tokens.len() / 3 + 1);
        let mut errors = Vec::new();
        self.skip_newlines();
        while !self.at_end() {
            match self.parse_statement() {
                Ok(Some(stmt)) => stmts.push(stmt),
                Ok(None) => {}
                Err(e) => {
                    errors.push(e);
                    self.skip_line();
                }
            }
            self.skip_newlines();
        }
        (stmts, errors)
    }

    fn parse_statement(&mut self) -> Result<Option<Statement>, AsmError> {
        let tok = self.peek().clone();

        match &tok.kind {
            TokenKind::Eof => Ok(None),
            TokenKind::Newline => {
                self.advance();
                Ok(None)
            }
            // A label may share its line with an instruction; the rest of
            // the line is parsed on the next call.
            TokenKind::LabelDef => {
                self.advance();
                Ok(Some(Statement::Label(tok.text.to_string(), tok.span)))
            }
            TokenKind::Directive => self.parse_directive(),
            TokenKind::Ident => self.parse_instruction(),
            _ => Err(AsmError::Syntax {
                msg: alloc::format!("unexpected token '{}'", tok.text),
                span: tok.span,
            }),
        }
    }

    // ── directives ─────────────────────────────────────────

    fn parse_directive(&mut self) -> Result<Option<Statement>, AsmError> {
        let tok = self.advance().clone();
        let mut dir_buf = [0u8; 16];
        let dir = to_lower_buf(&tok.text, &mut dir_buf);
        let span = tok.span;

        let stmt = match dir {
            ".byte" => self.parse_data_directive(DataSize::Byte, span)?,
            ".word" | ".short" => self.parse_data_directive(DataSize::Word, span)?,
            ".long" => self.parse_data_directive(DataSize::Long, span)?,
            ".equ" | ".set" => {
                let (name, _) = self.expect_ident()?;
                self.expect(TokenKind::Comma, ",")?;
                self.define_constant(name, span)?
            }
            ".align" | ".p2align" => {
                let (value, value_span) = self.parse_const_expr()?;
                if !(0..=15).contains(&value) {
                    return Err(AsmError::Syntax {
                        msg: alloc::format!("alignment power must be in 0..=15, got {}", value),
                        span: value_span,
                    });
                }
                Some(Statement::Align {
                    power: value as u32,
                    span,
                })
            }
            ".refsym" | ".global" | ".globl" => {
                let mut names = vec![self.expect_ident()?.0];
                while self.peek().kind == TokenKind::Comma {
                    self.advance();
                    names.push(self.expect_ident()?.0);
                }
                Some(Statement::Global(names, span))
            }
            // Section switches carry no layout meaning here.
            ".text" | ".section" => {
                self.skip_line();
                None
            }
            _ => {
                return Err(AsmError::Syntax {
                    msg: alloc::format!("unknown directive '{}'", tok.text),
                    span,
                })
            }
        };
        self.expect_statement_end()?;
        Ok(stmt)
    }

    fn parse_data_directive(
        &mut self,
        size: DataSize,
        span: Span,
    ) -> Result<Option<Statement>, AsmError> {
        let mut values = Vec::new();
        if self.is_statement_end() {
            return Err(AsmError::Syntax {
                msg: String::from("expected at least one value"),
                span,
            });
        }
        loop {
            values.push(self.parse_expr()?);
            if self.peek().kind != TokenKind::Comma {
                break;
            }
            self.advance();
        }
        Ok(Some(Statement::Data(DataDecl { size, values, span })))
    }

    fn define_constant(&mut self, name: String, span: Span) -> Result<Option<Statement>, AsmError> {
        let (value, _) = self.parse_const_expr()?;
        self.constants.insert(name.clone(), value);
        Ok(Some(Statement::Const(ConstDef { name, value, span })))
    }

    fn parse_const_expr(&mut self) -> Result<(i128, Span), AsmError> {
        let start = self.peek().span;
        let expr = self.parse_expr()?;
        let span = start.to(self.last_span());
        match expr.eval() {
            Some(v) => Ok((v, span)),
            None => Err(AsmError::Syntax {
                msg: alloc::format!("expected constant expression, found '{}'", expr),
                span,
            }),
        }
    }

    // ── expressions ────────────────────────────────────────

    /// Parse an expression with `+ -` over `*` over unary `- +`.
    fn parse_expr(&mut self) -> Result<Expr, AsmError> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek().kind {
                TokenKind::Plus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = fold(Expr::Add(Box::new(lhs), Box::new(rhs)));
                }
                TokenKind::Minus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = fold(Expr::Sub(Box::new(lhs), Box::new(rhs)));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_term(&mut self) -> Result<Expr, AsmError> {
        let mut lhs = self.parse_unary()?;
        while self.peek().kind == TokenKind::Star {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = fold(Expr::Mul(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, AsmError> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                Ok(fold(Expr::Neg(Box::new(self.parse_unary()?))))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, AsmError> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Num(*n))
            }
            TokenKind::Ident => {
                self.advance();
                match self.constants.get(&*tok.text) {
                    Some(&val) => Ok(Expr::Num(val)),
                    None => Ok(Expr::Label(tok.text.to_string())),
                }
            }
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::CloseParen, ")")?;
                Ok(inner)
            }
            _ => Err(AsmError::Syntax {
                msg: alloc::format!("expected expression, found '{}'", tok.text),
                span: tok.span,
            }),
        }
    }

    // ── instructions ───────────────────────────────────────

    fn parse_instruction(&mut self) -> Result<Option<Statement>, AsmError> {
        let tok = self.advance().clone();

        // `NAME = expr`
        if self.peek().kind == TokenKind::Equals {
            self.advance();
            let stmt = self.define_constant(tok.text.to_string(), tok.span)?;
            self.expect_statement_end()?;
            return Ok(stmt);
        }

        let mut mnemonic = tok.text.to_ascii_lowercase();
        // Word is the default width.
        if mnemonic.ends_with(".w") {
            mnemonic.truncate(mnemonic.len() - 2);
        }

        if let Some(mut ops) = self.normalize_jump(&mnemonic, tok.span)? {
            let head = ops.remove(0);
            let name = head.operand.as_token().unwrap_or("jmp").to_string();
            return Ok(Some(Statement::Instruction(Instruction {
                mnemonic: name,
                operands: ops,
                span: tok.span,
            })));
        }

        let mut operands = Vec::with_capacity(2);
        if !self.is_statement_end() {
            operands.push(self.parse_operand(false)?);
            if self.peek().kind == TokenKind::Comma {
                self.advance();
                operands.push(self.parse_operand(true)?);
            }
        }
        self.expect_statement_end()?;

        Ok(Some(Statement::Instruction(Instruction {
            mnemonic,
            operands,
            span: tok.span,
        })))
    }

    fn normalize_jump(
        &mut self,
        name: &str,
        span: Span,
    ) -> Result<Option<Vec<ParsedOperand>>, AsmError> {
        let Some(suffix) = name.strip_prefix('j') else {
            return Ok(None);
        };

        let mut ops = Vec::with_capacity(3);
        if suffix == "mp" {
            ops.push(ParsedOperand::new(Operand::Token(String::from("jmp")), span));
        } else {
            let cc = CondCode::from_suffix(suffix).ok_or_else(|| AsmError::UnknownInstruction {
                mnemonic: String::from(name),
                span,
            })?;
            ops.push(ParsedOperand::new(Operand::Token(String::from("j")), span));
            ops.push(ParsedOperand::new(
                Operand::Immediate(Expr::Num(i128::from(cc.code()))),
                span,
            ));
        }

        if self.peek().kind == TokenKind::Dollar {
            self.advance();
        }

        let start = self.peek().span;
        if self.is_statement_end() {
            return Err(AsmError::Syntax {
                msg: String::from("expected expression operand"),
                span: start,
            });
        }
        let target = self.parse_expr()?;
        let target_span = start.to(self.last_span());
        if let Some(v) = target.eval() {
            if !(JUMP_MIN..=JUMP_MAX).contains(&v) {
                return Err(AsmError::InvalidJumpOffset {
                    value: v,
                    span: target_span,
                });
            }
        }
        ops.push(ParsedOperand::new(Operand::Immediate(target), target_span));
        self.expect_statement_end()?;
        Ok(Some(ops))
    }

    // ── operands ───────────────────────────────────────────

    fn parse_operand(&mut self, is_destination: bool) -> Result<ParsedOperand, AsmError> {
        let tok = self.peek().clone();
        let operand = match &tok.kind {
            TokenKind::Ident => match Register::from_name(&tok.text) {
                Some(reg) => {
                    self.advance();
                    Operand::Register(reg)
                }
                None => self.parse_expr_operand()?,
            },
            TokenKind::Number(_) | TokenKind::Plus | TokenKind::Minus => {
                self.parse_expr_operand()?
            }
            TokenKind::Ampersand => {
                self.advance();
                Operand::Memory {
                    base: Register::Sr,
                    offset: self.parse_expr()?,
                }
            }
            TokenKind::At => {
                self.advance();
                let reg = self.expect_register(is_destination)?;
                if self.peek().kind == TokenKind::Plus {
                    self.advance();
                    Operand::PostIncrementRegister(reg)
                } else if is_destination {
                    Operand::Memory {
                        base: reg,
                        offset: Expr::Num(0),
                    }
                } else {
                    Operand::IndirectRegister(reg)
                }
            }
            TokenKind::Hash => {
                self.advance();
                Operand::Immediate(self.parse_expr()?)
            }
            _ => {
                return Err(AsmError::InvalidOperand {
                    index: usize::from(is_destination),
                    detail: alloc::format!(
                        "expected register, immediate or memory operand, found '{}'",
                        tok.text
                    ),
                    span: tok.span,
                })
            }
        };
        Ok(ParsedOperand::new(operand, tok.span.to(self.last_span())))
    }

    /// `expr` or `expr(rN)`.
    fn parse_expr_operand(&mut self) -> Result<Operand, AsmError> {
        let offset = self.parse_expr()?;
        if self.peek().kind != TokenKind::OpenParen {
            return Ok(Operand::Memory {
                base: Register::Pc,
                offset,
            });
        }
        self.advance();
        let base = self.expect_register(false)?;
        self.expect(TokenKind::CloseParen, ")")?;
        Ok(Operand::Memory { base, offset })
    }

    fn expect_register(&mut self, is_destination: bool) -> Result<Register, AsmError> {
        let tok = self.advance();
        let reg = if tok.kind == TokenKind::Ident {
            Register::from_name(&tok.text)
        } else {
            None
        };
        reg.ok_or_else(|| AsmError::InvalidOperand {
            index: usize::from(is_destination),
            detail: alloc::format!("expected register, found '{}'", tok.text),
            span: tok.span,
        })
    }
}

/// Fold a node whose children are all constants.
fn fold(expr: Expr) -> Expr {
    match expr.eval() {
        Some(v) => Expr::Num(v),
        None => expr,
    }
}
