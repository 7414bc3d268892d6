//! Compile-time assembly proc-macros for [`msp430-asm`](https://crates.io/crates/msp430-asm).
//!
//! Provides the [`asm_bytes!`] macro that assembles MSP430 source text at
//! compile time, producing a `&'static [u8]` constant with zero runtime
//! overhead.
//!
//! # Usage
//!
//! ```rust,ignore
//! use msp430_asm_macros::asm_bytes;
//!
//! // Stop the watchdog
//! const STOP_WDT: &[u8] = asm_bytes!("mov #0x5a80, &0x0120");
//!
//! // Absolute references resolved against a load address
//! const RESET: &[u8] = asm_bytes!(0xC000, "start: mov #start, r4\njmp start");
//! ```

use proc_macro::TokenStream;

/// Assemble source text at compile time, producing a `&'static [u8]` byte slice.
///
/// # Syntax
///
/// ```rust,ignore
/// asm_bytes!("assembly source")
/// asm_bytes!(BASE_ADDRESS, "assembly source")
/// ```
///
/// # Examples
///
/// ```rust,ignore
/// use msp430_asm_macros::asm_bytes;
///
/// // Single instruction
/// const NOP: &[u8] = asm_bytes!("nop");
/// assert_eq!(NOP, &[0x03, 0x43]);
///
/// // Multi-instruction with labels
/// const CODE: &[u8] = asm_bytes!("
///     delay:
///         dec r15
///         jnz delay
///         ret
/// ");
///
/// // With base address
/// const BASED: &[u8] = asm_bytes!(0xC000, "here: br #here");
/// ```
///
/// # Compile-time errors
///
/// If the assembly source contains errors, the macro emits a compile-time error
/// with the full `AsmError` diagnostic message.
#[proc_macro]
pub fn asm_bytes(input: TokenStream) -> TokenStream {
    match asm_bytes_impl(input) {
        Ok(ts) => ts,
        Err(err) => err.into_compile_error(),
    }
}

/// Assemble source text at compile time, producing a fixed-size array `[u8; N]`.
///
/// Unlike [`asm_bytes!`] which returns `&'static [u8]`, this macro returns a
/// `[u8; N]` value that can be used where a fixed-size array is needed.
///
/// # Examples
///
/// ```rust,ignore
/// use msp430_asm_macros::asm_array;
///
/// const RET: [u8; 2] = asm_array!("ret");
/// ```
#[proc_macro]
pub fn asm_array(input: TokenStream) -> TokenStream {
    match asm_array_impl(input) {
        Ok(ts) => ts,
        Err(err) => err.into_compile_error(),
    }
}

// ─── Implementation ─────────────────────────────────────────────────────────

type Tokens = std::iter::Peekable<proc_macro::token_stream::IntoIter>;

struct MacroInput {
    base_addr: u64,
    source: String,
    /// Span of the source literal for error reporting.
    source_span: proc_macro::Span,
}

fn parse_input(input: TokenStream) -> Result<MacroInput, syn_free::Error> {
    let mut tokens = input.into_iter().peekable();

    // Optional base address (integer literal followed by comma)
    let base_addr = match tokens.next_if(is_integer_literal) {
        Some(tt) => {
            let addr = parse_integer_literal(&tt)?;
            expect_comma(&mut tokens)?;
            addr
        }
        None => 0,
    };
    let (source, source_span) = parse_string_literal(&mut tokens)?;

    // Ensure no trailing tokens (a single trailing comma is fine)
    if let Some(proc_macro::TokenTree::Punct(p)) = tokens.peek() {
        if p.as_char() == ',' {
            tokens.next();
        }
    }
    if let Some(tt) = tokens.next() {
        return Err(syn_free::Error::with_span(
            tt.span(),
            "unexpected extra tokens after source string",
        ));
    }

    Ok(MacroInput {
        base_addr,
        source,
        source_span,
    })
}

fn asm_bytes_impl(input: TokenStream) -> Result<TokenStream, syn_free::Error> {
    let mi = parse_input(input)?;
    let bytes = do_assemble(&mi)?;
    bytes_to_slice_expr(&bytes)
}

fn asm_array_impl(input: TokenStream) -> Result<TokenStream, syn_free::Error> {
    let mi = parse_input(input)?;
    let bytes = do_assemble(&mi)?;
    bytes_to_array_expr(&bytes)
}

fn do_assemble(mi: &MacroInput) -> Result<Vec<u8>, syn_free::Error> {
    msp430_asm::assemble_at(&mi.source, mi.base_addr)
        .map_err(|e| syn_free::Error::with_span(mi.source_span, &format!("assembly error: {e}")))
}

fn expect_comma(tokens: &mut Tokens) -> Result<(), syn_free::Error> {
    match tokens.next() {
        Some(proc_macro::TokenTree::Punct(p)) if p.as_char() == ',' => Ok(()),
        Some(other) => Err(syn_free::Error::with_span(other.span(), "expected `,`")),
        None => Err(syn_free::Error::new("expected `,`")),
    }
}

fn is_integer_literal(tt: &proc_macro::TokenTree) -> bool {
    matches!(tt, proc_macro::TokenTree::Literal(lit) if {
        lit.to_string().starts_with(|c: char| c.is_ascii_digit())
    })
}

fn parse_integer_literal(tt: &proc_macro::TokenTree) -> Result<u64, syn_free::Error> {
    let proc_macro::TokenTree::Literal(lit) = tt else {
        return Err(syn_free::Error::with_span(
            tt.span(),
            "expected integer literal",
        ));
    };
    let s = lit.to_string().replace('_', "");
    let (radix, body) = match s.get(..2) {
        Some("0x" | "0X") => (16, &s[2..]),
        Some("0o") => (8, &s[2..]),
        Some("0b") => (2, &s[2..]),
        _ => (10, s.as_str()),
    };
    // Integer suffixes such as `0xC000u16` are allowed.
    let body = body.split_once(['u', 'i']).map_or(body, |(digits, _)| digits);
    let val = u64::from_str_radix(body, radix);
    val.map_err(|_| syn_free::Error::with_span(tt.span(), "invalid integer literal"))
}

fn parse_string_literal(tokens: &mut Tokens) -> Result<(String, proc_macro::Span), syn_free::Error> {
    let tt = tokens
        .next()
        .ok_or_else(|| syn_free::Error::new("expected assembly source string"))?;
    let proc_macro::TokenTree::Literal(lit) = &tt else {
        return Err(syn_free::Error::with_span(
            tt.span(),
            "expected string literal",
        ));
    };
    let raw = lit.to_string();
    // Strip quotes: `"..."`, `r"..."` and `r#"..."#`
    let content = if raw.starts_with("r#\"") {
        raw.strip_prefix("r#\"")
            .and_then(|s| s.strip_suffix("\"#"))
            .ok_or_else(|| syn_free::Error::with_span(tt.span(), "malformed raw string"))?
    } else if raw.starts_with("r\"") {
        raw.strip_prefix("r\"")
            .and_then(|s| s.strip_suffix('"'))
            .ok_or_else(|| syn_free::Error::with_span(tt.span(), "malformed raw string"))?
    } else if raw.starts_with('"') {
        let inner = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .ok_or_else(|| syn_free::Error::with_span(tt.span(), "malformed string literal"))?;
        return Ok((unescape_string(inner), tt.span()));
    } else {
        return Err(syn_free::Error::with_span(
            tt.span(),
            "expected string literal",
        ));
    };
    Ok((content.to_string(), tt.span()))
}

fn unescape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            // Line continuation: skip the newline and leading whitespace.
            Some('\n') => {
                while chars.next_if(|c| c.is_whitespace()).is_some() {}
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn byte_list(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:#04X}u8"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_generated(code: &str) -> Result<TokenStream, syn_free::Error> {
    code.parse()
        .map_err(|_| syn_free::Error::new("internal error: generated code does not parse"))
}

fn bytes_to_slice_expr(bytes: &[u8]) -> Result<TokenStream, syn_free::Error> {
    let inner = byte_list(bytes);
    parse_generated(&format!("{{ const BYTES: &[u8] = &[{inner}]; BYTES }}"))
}

fn bytes_to_array_expr(bytes: &[u8]) -> Result<TokenStream, syn_free::Error> {
    let len = bytes.len();
    let inner = byte_list(bytes);
    parse_generated(&format!("{{ const BYTES: [u8; {len}] = [{inner}]; BYTES }}"))
}

// ─── Minimal syn-free error type ─────────────────────────────────────────────
// The macro input is simple enough to parse directly from
// `proc_macro::TokenStream`.

mod syn_free {
    use proc_macro::{Delimiter, Group, Ident, Literal, Punct, Spacing, Span, TokenStream, TokenTree};

    pub struct Error {
        message: String,
        span: Option<Span>,
    }

    impl Error {
        pub fn new(msg: &str) -> Self {
            Self {
                message: msg.to_string(),
                span: None,
            }
        }

        pub fn with_span(span: Span, msg: &str) -> Self {
            Self {
                message: msg.to_string(),
                span: Some(span),
            }
        }

        /// `compile_error!("message")`, built token by token so every token
        /// carries the error span.
        pub fn into_compile_error(self) -> TokenStream {
            let span = self.span.unwrap_or_else(Span::call_site);
            let with_span = |mut tt: TokenTree| {
                tt.set_span(span);
                tt
            };
            let mut msg = Literal::string(&self.message);
            msg.set_span(span);
            let args = Group::new(Delimiter::Parenthesis, TokenTree::Literal(msg).into());
            [
                with_span(Ident::new("compile_error", span).into()),
                with_span(Punct::new('!', Spacing::Alone).into()),
                with_span(args.into()),
            ]
            .into_iter()
            .collect()
        }
    }
}
