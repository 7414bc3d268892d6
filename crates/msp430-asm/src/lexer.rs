//! Lexer for MSP430 assembly source text.
//!
//! The lexer tokenizes assembly source into a stream of [`Token`]s, each
//! carrying its [`Span`] so that error messages can point back to the exact
//! location in the original input.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;
use core::str;

use crate::error::{AsmError, Span};

/// A token produced by the lexer.
///
/// Token text is borrowed from the source string.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    /// Token classification.
    pub kind: TokenKind,
    /// Source text of the token.
    pub text: Cow<'src, str>,
    /// Source location.
    pub span: Span,
}

impl<'src> Token<'src> {
    /// Returns the token text as a `&str`.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The type of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Mnemonic, register name, or symbol reference. May contain `.`
    /// (`mov.b`, `add.w`).
    Ident,
    /// Integer literal (decimal, `0x`, `0b`, `0o`, `NNh`, or `'c'`).
    Number(i128),
    /// Directive (starts with `.`).
    Directive,
    /// Label definition (`name:`).
    LabelDef,
    /// `,`
    Comma,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `#` (immediate)
    Hash,
    /// `&` (absolute)
    Ampersand,
    /// `@` (indirect)
    At,
    /// `$`
    Dollar,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `=` (constant assignment)
    Equals,
    /// End of a source line.
    Newline,
    /// End of input.
    Eof,
}

fn punct(ch: u8) -> Option<(TokenKind, &'static str)> {
    let tok = match ch {
        b',' => (TokenKind::Comma, ","),
        b'+' => (TokenKind::Plus, "+"),
        b'-' => (TokenKind::Minus, "-"),
        b'*' => (TokenKind::Star, "*"),
        b'#' => (TokenKind::Hash, "#"),
        b'&' => (TokenKind::Ampersand, "&"),
        b'@' => (TokenKind::At, "@"),
        b'$' => (TokenKind::Dollar, "$"),
        b'(' => (TokenKind::OpenParen, "("),
        b')' => (TokenKind::CloseParen, ")"),
        b'=' => (TokenKind::Equals, "="),
        _ => return None,
    };
    Some(tok)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Tokenize assembly source text into a vector of tokens.
///
/// The lexer recognizes:
/// - Identifiers (mnemonics with `.b`/`.w` suffixes, registers, symbols)
/// - Numeric literals (decimal, hex `0x`/`NNh`, binary `0b`, octal `0o`)
/// - Character literals (`'A'`)
/// - Directives (`.word`, `.equ`, ...) and label definitions (`name:`)
/// - Punctuation: `, + - * # & @ $ ( ) =`
/// - Comments: `;` or `//` to end of line, `/* ... */` blocks
///
/// `-` is always its own token; negative literals are built by the parser.
///
/// # Errors
///
/// Returns `Err(AsmError::Syntax)` if the input contains an unrecognised
/// character or a malformed token.
pub fn tokenize<'s>(source: &'s str) -> Result<Vec<Token<'s>>, AsmError> {
    let mut tokens = Vec::with_capacity(source.len() / 3 + 1);
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut pos = 0;
    let mut line: u32 = 1;
    let mut col: u32 = 1;
    let mut line_start = 0usize;

    while pos < len {
        let ch = bytes[pos];

        if ch == b' ' || ch == b'\t' || ch == b'\r' {
            pos += 1;
            col += 1;
            continue;
        }

        if ch == b'\n' {
            tokens.push(Token {
                kind: TokenKind::Newline,
                text: Cow::Borrowed("\n"),
                span: Span::new(line, col, pos, 1),
            });
            pos += 1;
            line += 1;
            col = 1;
            line_start = pos;
            continue;
        }

        // Comment: ; or // to EOL
        if ch == b';' || (ch == b'/' && bytes.get(pos + 1) == Some(&b'/')) {
            while pos < len && bytes[pos] != b'\n' {
                pos += 1;
            }
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch == b'/' && bytes.get(pos + 1) == Some(&b'*') {
            let (start_line, start_col, start_pos) = (line, col, pos);
            pos += 2;
            col += 2;
            while pos + 1 < len && !(bytes[pos] == b'*' && bytes[pos + 1] == b'/') {
                if bytes[pos] == b'\n' {
                    line += 1;
                    col = 1;
                    line_start = pos + 1;
                } else {
                    col += 1;
                }
                pos += 1;
            }
            if pos + 1 >= len {
                return Err(AsmError::Syntax {
                    msg: String::from("unterminated block comment"),
                    span: Span::new(start_line, start_col, start_pos, 2),
                });
            }
            pos += 2;
            col += 2;
            continue;
        }

        if let Some((kind, text)) = punct(ch) {
            tokens.push(Token {
                kind,
                text: Cow::Borrowed(text),
                span: Span::new(line, col, pos, 1),
            });
            pos += 1;
            col += 1;
            continue;
        }

        // Directive, or a dot-prefixed local label definition
        if ch == b'.' {
            let start = pos;
            let start_col = col;
            pos += 1;
            while pos < len && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            let text = Cow::Borrowed(str::from_utf8(&bytes[start..pos]).unwrap_or(""));
            let kind = if pos < len && bytes[pos] == b':' {
                pos += 1;
                TokenKind::LabelDef
            } else {
                TokenKind::Directive
            };
            tokens.push(Token {
                kind,
                text,
                span: Span::new(line, start_col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch.is_ascii_digit() {
            let start = pos;
            let start_col = col;
            let value = parse_number_at(bytes, &mut pos, line, start_col)?;
            if pos < len && is_ident_byte(bytes[pos]) {
                return Err(AsmError::Syntax {
                    msg: alloc::format!(
                        "invalid digit '{}' in number",
                        bytes[pos] as char
                    ),
                    span: Span::new(line, (pos - line_start) as u32 + 1, pos, 1),
                });
            }
            tokens.push(Token {
                kind: TokenKind::Number(value),
                text: Cow::Borrowed(str::from_utf8(&bytes[start..pos]).unwrap_or("")),
                span: Span::new(line, start_col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        if ch == b'\'' {
            let start = pos;
            let value = match (bytes.get(pos + 1), bytes.get(pos + 2), bytes.get(pos + 3)) {
                (Some(b'\\'), Some(&esc), Some(b'\'')) => {
                    pos += 4;
                    match esc {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'0' => 0,
                        b'\\' | b'\'' => esc,
                        _ => {
                            return Err(AsmError::Syntax {
                                msg: String::from("unknown escape in character literal"),
                                span: Span::new(line, col, start, 4),
                            })
                        }
                    }
                }
                (Some(&c), Some(b'\''), _) if c != b'\\' && c != b'\n' => {
                    pos += 3;
                    c
                }
                _ => {
                    return Err(AsmError::Syntax {
                        msg: String::from("unterminated character literal"),
                        span: Span::new(line, col, start, 1),
                    })
                }
            };
            tokens.push(Token {
                kind: TokenKind::Number(i128::from(value)),
                text: Cow::Borrowed(str::from_utf8(&bytes[start..pos]).unwrap_or("")),
                span: Span::new(line, col, start, pos - start),
            });
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        // Identifier (mnemonic, register, symbol) or label definition
        if ch.is_ascii_alphabetic() || ch == b'_' {
            let start = pos;
            let start_col = col;
            while pos < len && is_ident_byte(bytes[pos]) {
                pos += 1;
            }
            let text = Cow::Borrowed(str::from_utf8(&bytes[start..pos]).unwrap_or(""));
            let token_len = pos - start;
            if pos < len && bytes[pos] == b':' {
                pos += 1;
                tokens.push(Token {
                    kind: TokenKind::LabelDef,
                    text,
                    span: Span::new(line, start_col, start, token_len),
                });
            } else {
                tokens.push(Token {
                    kind: TokenKind::Ident,
                    text,
                    span: Span::new(line, start_col, start, token_len),
                });
            }
            col = (pos - line_start) as u32 + 1;
            continue;
        }

        return Err(AsmError::Syntax {
            msg: alloc::format!("unexpected character '{}'", ch as char),
            span: Span::new(line, col, pos, 1),
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: Cow::Borrowed(""),
        span: Span::new(line, col, pos, 0),
    });

    Ok(tokens)
}

/// Parse a number starting at `pos` in `bytes`. Advances `pos` past the number.
#[inline]
fn parse_number_at(
    bytes: &[u8],
    pos: &mut usize,
    span_line: u32,
    span_col: u32,
) -> Result<i128, AsmError> {
    let start = *pos;
    let len = bytes.len();

    let radix_prefix = match (bytes.get(*pos), bytes.get(*pos + 1)) {
        (Some(b'0'), Some(b'x' | b'X')) => Some((16, "0x")),
        (Some(b'0'), Some(b'b' | b'B'))
            if matches!(bytes.get(*pos + 2), Some(b'0' | b'1')) =>
        {
            Some((2, "0b"))
        }
        (Some(b'0'), Some(b'o' | b'O')) => Some((8, "0o")),
        _ => None,
    };

    if let Some((radix, prefix)) = radix_prefix {
        *pos += 2;
        let num_start = *pos;
        while *pos < len && (bytes[*pos] as char).is_digit(radix) {
            *pos += 1;
        }
        let s = str::from_utf8(&bytes[num_start..*pos]).unwrap_or("");
        if s.is_empty() {
            return Err(AsmError::Syntax {
                msg: alloc::format!("expected digits after '{}'", prefix),
                span: Span::new(span_line, span_col, start, *pos - start),
            });
        }
        return i128::from_str_radix(s, radix).map_err(|_| AsmError::Syntax {
            msg: alloc::format!("invalid number '{}{}'", prefix, s),
            span: Span::new(span_line, span_col, start, *pos - start),
        });
    }

    // Decimal, or hex with an `h` suffix (0FFh)
    let mut end = *pos;
    while end < len && bytes[end].is_ascii_hexdigit() {
        end += 1;
    }
    if end < len && (bytes[end] == b'h' || bytes[end] == b'H') {
        let s = str::from_utf8(&bytes[start..end]).unwrap_or("0");
        *pos = end + 1;
        return i128::from_str_radix(s, 16).map_err(|_| AsmError::Syntax {
            msg: alloc::format!("invalid hex number '{}h'", s),
            span: Span::new(span_line, span_col, start, *pos - start),
        });
    }
    while *pos < len && bytes[*pos].is_ascii_digit() {
        *pos += 1;
    }
    let s = str::from_utf8(&bytes[start..*pos]).unwrap_or("0");
    s.parse::<i128>().map_err(|_| AsmError::Syntax {
        msg: alloc::format!("invalid number '{}'", s),
        span: Span::new(span_line, span_col, start, *pos - start),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn tok_kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_input() {
        assert_eq!(tok_kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn semicolon_comment() {
        assert_eq!(tok_kinds("; just a comment"), vec![TokenKind::Eof]);
        assert_eq!(
            tok_kinds("nop ; trailing"),
            vec![TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn slash_comments() {
        assert_eq!(tok_kinds("// line"), vec![TokenKind::Eof]);
        assert_eq!(
            tok_kinds("/* a\nb */ nop"),
            vec![TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        assert!(tokenize("/* never closed").is_err());
    }

    #[test]
    fn two_operand_instruction() {
        let toks = tokenize("mov.b #1, 2(r5)").unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Hash,
                TokenKind::Number(1),
                TokenKind::Comma,
                TokenKind::Number(2),
                TokenKind::OpenParen,
                TokenKind::Ident,
                TokenKind::CloseParen,
                TokenKind::Eof,
            ]
        );
        assert_eq!(toks[0].text(), "mov.b");
    }

    #[test]
    fn indirect_and_absolute() {
        assert_eq!(
            tok_kinds("@r4+, &0x200"),
            vec![
                TokenKind::At,
                TokenKind::Ident,
                TokenKind::Plus,
                TokenKind::Comma,
                TokenKind::Ampersand,
                TokenKind::Number(0x200),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn minus_is_never_folded() {
        assert_eq!(
            tok_kinds("#-1"),
            vec![
                TokenKind::Hash,
                TokenKind::Minus,
                TokenKind::Number(1),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn number_radixes() {
        assert_eq!(tok_kinds("0x1F")[0], TokenKind::Number(0x1F));
        assert_eq!(tok_kinds("0b101")[0], TokenKind::Number(5));
        assert_eq!(tok_kinds("0o17")[0], TokenKind::Number(15));
        assert_eq!(tok_kinds("0FFh")[0], TokenKind::Number(0xFF));
        assert_eq!(tok_kinds("1234")[0], TokenKind::Number(1234));
        assert_eq!(tok_kinds("'A'")[0], TokenKind::Number(65));
        assert_eq!(tok_kinds("'\\n'")[0], TokenKind::Number(10));
    }

    #[test]
    fn malformed_numbers() {
        assert!(tokenize("0x").is_err());
        assert!(tokenize("12ab").is_err());
    }

    #[test]
    fn label_and_directive() {
        let toks = tokenize("start: .word 1\n.Lloop:").unwrap();
        assert_eq!(toks[0].kind, TokenKind::LabelDef);
        assert_eq!(toks[0].text(), "start");
        assert_eq!(toks[1].kind, TokenKind::Directive);
        assert_eq!(toks[1].text(), ".word");
        assert_eq!(toks[4].kind, TokenKind::LabelDef);
        assert_eq!(toks[4].text(), ".Lloop");
    }

    #[test]
    fn jump_dollar() {
        assert_eq!(
            tok_kinds("jmp $+4"),
            vec![
                TokenKind::Ident,
                TokenKind::Dollar,
                TokenKind::Plus,
                TokenKind::Number(4),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn span_tracking() {
        let toks = tokenize("nop\n  add r4, r5").unwrap();
        let add = &toks[2];
        assert_eq!(add.text(), "add");
        assert_eq!(add.span.line, 2);
        assert_eq!(add.span.col, 3);
        assert_eq!(add.span.offset, 6);
        let r5 = &toks[5];
        assert_eq!(r5.span.col, 11);
    }

    #[test]
    fn unknown_character() {
        let err = tokenize("mov ~r4").unwrap_err();
        match err {
            AsmError::Syntax { span, .. } => assert_eq!(span.col, 5),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
