//! Token model and the scanner contract.
//!
//! The parser never lexes: it pulls [`Token`]s from a host-provided
//! implementation of [`Scan`], a rewindable token stream.  Token payloads
//! are already classified — register names arrive as [`Register`] values,
//! mnemonics as [`Opcode`]s, and so on — so the parser is purely a grammar
//! over token kinds.  Every token also carries its source text: a mnemonic
//! token can turn out to be a label (`mov: db 0`), and only the text
//! survives that reinterpretation.

use crate::error::Span;
use crate::insn::{Opcode, PrefixKind};
use crate::reg::Register;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A classified source token.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token {
    /// Token classification with payload.
    pub kind: TokenKind,
    /// The token's source text.
    pub text: String,
    /// Auxiliary flags set by the scanner.
    pub flags: TokenFlags,
    /// Position within the line buffer.
    pub span: Span,
}

impl Token {
    /// A bare token of the given kind with no text, flags, or span.
    #[must_use]
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            text: String::new(),
            flags: TokenFlags::NONE,
            span: Span::empty(),
        }
    }

    /// A token of the given kind carrying its source text.
    #[must_use]
    pub fn with_text(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            flags: TokenFlags::NONE,
            span: Span::empty(),
        }
    }

    /// The end-of-statement token.
    #[must_use]
    pub fn eos() -> Self {
        Self::new(TokenKind::Eos)
    }

    /// A punctuation token.
    #[must_use]
    pub fn punct(c: char) -> Self {
        let mut text = String::new();
        text.push(c);
        Self::with_text(TokenKind::Punct(c), text)
    }

    /// True if this token is the given punctuation character.
    #[inline]
    #[must_use]
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    /// True at end of statement.
    #[inline]
    #[must_use]
    pub fn is_eos(&self) -> bool {
        self.kind == TokenKind::Eos
    }

    /// A short description of the token for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        use alloc::format;
        match &self.kind {
            TokenKind::Eos => String::from("end of line"),
            TokenKind::Str(_) => String::from("string constant"),
            _ if !self.text.is_empty() => format!("`{}'", self.text),
            _ => String::from("invalid token"),
        }
    }
}

/// Token classification, with per-kind payloads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenKind {
    /// An identifier that is not a keyword: label or symbol reference.
    Id,
    /// An instruction mnemonic.
    Insn(Opcode),
    /// An instruction prefix (`lock`, `rep`, `o16`, `{evex}`, …).
    Prefix(PrefixKind),
    /// A register name.
    Reg(Register),
    /// A size or attribute keyword (`byte`, `strict`, `nosplit`, …).
    Size(SizeSpec),
    /// An opmask register used in decorator position: `{k3}`.
    OpMask(Register),
    /// A non-opmask decorator: `{z}`, `{1to8}`, `{rn-sae}`, …
    Decorator(Deco),
    /// A string literal (content bytes, quotes removed).
    Str(Vec<u8>),
    /// A string-transform function name (`__utf16__`, …).
    StrFunc(StrFunc),
    /// A floating-point literal; the text is the payload (conversion is a
    /// host service).
    Float,
    /// An integer literal.
    Num(i64),
    /// The `?` reserve marker in data declarations.
    QMark,
    /// A braced constant immediate: value plus auxiliary payload.
    BrcConst(i64, u32),
    /// The `times` repetition prefix.
    Times,
    /// The MASM `ptr` keyword.
    MasmPtr,
    /// The MASM `flat` keyword.
    MasmFlat,
    /// Single-character punctuation: `,` `:` `[` `]` `(` `)` `+` `-` `&` `%`.
    Punct(char),
    /// End of statement.
    Eos,
}

/// Scanner-set token flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenFlags(pub u8);

impl TokenFlags {
    /// No flags.
    pub const NONE: TokenFlags = TokenFlags(0);
    /// This token is the `DUP` keyword terminating an expression.
    pub const DUP: TokenFlags = TokenFlags(1 << 0);
    /// This token was wrapped in braces (`{evex}`-style prefixes).
    pub const BRC: TokenFlags = TokenFlags(1 << 1);

    /// True if the `DUP` flag is set.
    #[inline]
    #[must_use]
    pub const fn dup(self) -> bool {
        self.0 & Self::DUP.0 != 0
    }

    /// True if the brace flag is set.
    #[inline]
    #[must_use]
    pub const fn brc(self) -> bool {
        self.0 & Self::BRC.0 != 0
    }
}

/// Size and attribute keywords usable in operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum SizeSpec {
    Byte,
    Word,
    Dword,
    /// Alias for `dword` accepted for compatibility.
    Long,
    Qword,
    Tword,
    Oword,
    Yword,
    Zword,
    To,
    Strict,
    Far,
    Near,
    Short,
    /// `NOSPLIT` — keep `[eax*2]` unsplit.
    Nosplit,
    /// `REL` — RIP-relative addressing.
    Rel,
    /// `ABS` — absolute addressing.
    Abs,
}

impl SizeSpec {
    /// The size-class flag this keyword selects, if it is a plain size.
    #[must_use]
    pub fn size_flag(self) -> Option<crate::flags::OpFlags> {
        use crate::flags::OpFlags;
        match self {
            SizeSpec::Byte => Some(OpFlags::BITS8),
            SizeSpec::Word => Some(OpFlags::BITS16),
            SizeSpec::Dword | SizeSpec::Long => Some(OpFlags::BITS32),
            SizeSpec::Qword => Some(OpFlags::BITS64),
            SizeSpec::Tword => Some(OpFlags::BITS80),
            SizeSpec::Oword => Some(OpFlags::BITS128),
            SizeSpec::Yword => Some(OpFlags::BITS256),
            SizeSpec::Zword => Some(OpFlags::BITS512),
            _ => None,
        }
    }
}

/// Brace decorators other than opmask registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Deco {
    /// `{z}` zeroing-masking.
    Z,
    /// `{1to2}` broadcast.
    B1To2,
    /// `{1to4}` broadcast.
    B1To4,
    /// `{1to8}` broadcast.
    B1To8,
    /// `{1to16}` broadcast.
    B1To16,
    /// `{1to32}` broadcast.
    B1To32,
    /// `{rn-sae}` round-to-nearest.
    Rn,
    /// `{rd-sae}` round-down.
    Rd,
    /// `{ru-sae}` round-up.
    Ru,
    /// `{rz-sae}` round-toward-zero.
    Rz,
    /// `{sae}` suppress-all-exceptions.
    Sae,
}

impl Deco {
    /// The broadcast width index (0 = 1to2 … 4 = 1to32), if a broadcast.
    #[must_use]
    pub fn broadcast_index(self) -> Option<u8> {
        match self {
            Deco::B1To2 => Some(0),
            Deco::B1To4 => Some(1),
            Deco::B1To8 => Some(2),
            Deco::B1To16 => Some(3),
            Deco::B1To32 => Some(4),
            _ => None,
        }
    }
}

/// String-transform functions usable in data declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum StrFunc {
    Utf16,
    Utf16Le,
    Utf16Be,
    Utf32,
    Utf32Le,
    Utf32Be,
}

impl fmt::Display for StrFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrFunc::Utf16 => "__utf16__",
            StrFunc::Utf16Le => "__utf16le__",
            StrFunc::Utf16Be => "__utf16be__",
            StrFunc::Utf32 => "__utf32__",
            StrFunc::Utf32Le => "__utf32le__",
            StrFunc::Utf32Be => "__utf32be__",
        };
        write!(f, "{}", name)
    }
}

/// Opaque scanner position, returned by [`Scan::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState(pub usize);

/// The rewindable token stream the parser consumes.
///
/// `next` past the end of the line must keep returning [`Token::eos`].
/// `save`/`restore` bracket speculative scans (the parser peeks one token
/// ahead to recognize string contexts and signed floats); `pushback` undoes
/// a single `next`.
pub trait Scan {
    /// Advance and return the next token.
    fn next(&mut self) -> Token;
    /// Capture the current position.
    fn save(&self) -> ScanState;
    /// Rewind to a captured position.
    fn restore(&mut self, state: ScanState);
    /// Push one token back onto the stream.
    fn pushback(&mut self, tok: Token);
}
