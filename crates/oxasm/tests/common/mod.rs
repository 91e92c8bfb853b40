//! Test fixtures: a small tokenizer, a linear-expression evaluator, and a
//! recording host.  Together they stand in for the assembler driver the
//! parser is normally embedded in, so the integration tests can feed it
//! whole source lines.

#![allow(dead_code)] // each test binary uses a different fixture subset

use oxasm::expr::{Eval, EvalHints, ExprTerm, RoundMode, Segment};
use oxasm::host::{FloatFmt, Host};
use oxasm::insn::{FloatBytes, Insn, Opcode, PrefixKind};
use oxasm::parser::Cursor;
use oxasm::reg::Register;
use oxasm::token::{Deco, Scan, ScanState, SizeSpec, StrFunc, Token, TokenFlags, TokenKind};
use oxasm::{Diag, OpExtra, Severity};
use std::collections::HashMap;

// ── Tokenizer ───────────────────────────────────────────────────────────

fn keyword_size(word: &str) -> Option<SizeSpec> {
    Some(match word {
        "byte" => SizeSpec::Byte,
        "word" => SizeSpec::Word,
        "dword" => SizeSpec::Dword,
        "long" => SizeSpec::Long,
        "qword" => SizeSpec::Qword,
        "tword" => SizeSpec::Tword,
        "oword" => SizeSpec::Oword,
        "yword" => SizeSpec::Yword,
        "zword" => SizeSpec::Zword,
        "to" => SizeSpec::To,
        "strict" => SizeSpec::Strict,
        "far" => SizeSpec::Far,
        "near" => SizeSpec::Near,
        "short" => SizeSpec::Short,
        "nosplit" => SizeSpec::Nosplit,
        "rel" => SizeSpec::Rel,
        "abs" => SizeSpec::Abs,
        _ => return None,
    })
}

fn keyword_prefix(word: &str) -> Option<PrefixKind> {
    Some(match word {
        "lock" => PrefixKind::Lock,
        "rep" | "repz" => PrefixKind::Rep,
        "repe" => PrefixKind::Repe,
        "repne" | "repnz" => PrefixKind::Repne,
        "wait" => PrefixKind::Wait,
        "a16" => PrefixKind::A16,
        "a32" => PrefixKind::A32,
        "a64" => PrefixKind::A64,
        "o16" => PrefixKind::O16,
        "o32" => PrefixKind::O32,
        "o64" => PrefixKind::O64,
        "xacquire" => PrefixKind::Xacquire,
        "xrelease" => PrefixKind::Xrelease,
        "bnd" => PrefixKind::Bnd,
        _ => return None,
    })
}

fn keyword_insn(word: &str) -> Option<Opcode> {
    Some(match word {
        "db" => Opcode::Db,
        "dw" => Opcode::Dw,
        "dd" => Opcode::Dd,
        "dq" => Opcode::Dq,
        "dt" => Opcode::Dt,
        "do" => Opcode::Do,
        "dy" => Opcode::Dy,
        "dz" => Opcode::Dz,
        "resb" => Opcode::Resb,
        "resw" => Opcode::Resw,
        "resd" => Opcode::Resd,
        "resq" => Opcode::Resq,
        "rest" => Opcode::Rest,
        "reso" => Opcode::Reso,
        "resy" => Opcode::Resy,
        "resz" => Opcode::Resz,
        "incbin" => Opcode::Incbin,
        "equ" => Opcode::Equ,
        "jmp" => Opcode::Jmp,
        "call" => Opcode::Call,
        // A handful of table mnemonics, enough for the scenarios.
        "mov" => Opcode::Table(0),
        "lea" => Opcode::Table(1),
        "add" => Opcode::Table(2),
        "vaddps" => Opcode::Table(3),
        "bndstx" => Opcode::Table(4),
        "ccmpz" => Opcode::Table(5),
        "jo" => Opcode::Table(100),
        "jno" => Opcode::Table(101),
        "jz" => Opcode::Table(104),
        "jnz" => Opcode::Table(105),
        _ => return None,
    })
}

fn strfunc(word: &str) -> Option<StrFunc> {
    Some(match word {
        "__utf16__" => StrFunc::Utf16,
        "__utf16le__" => StrFunc::Utf16Le,
        "__utf16be__" => StrFunc::Utf16Be,
        "__utf32__" => StrFunc::Utf32,
        "__utf32le__" => StrFunc::Utf32Le,
        "__utf32be__" => StrFunc::Utf32Be,
        _ => return None,
    })
}

/// Classify the contents of a brace group.
fn brace_token(inner: &str) -> TokenKind {
    if let Some(rest) = inner.strip_prefix("dfv=") {
        let value = rest.parse::<i64>().unwrap_or(0);
        return TokenKind::BrcConst(value, 0);
    }
    match inner {
        "z" => TokenKind::Decorator(Deco::Z),
        "1to2" => TokenKind::Decorator(Deco::B1To2),
        "1to4" => TokenKind::Decorator(Deco::B1To4),
        "1to8" => TokenKind::Decorator(Deco::B1To8),
        "1to16" => TokenKind::Decorator(Deco::B1To16),
        "1to32" => TokenKind::Decorator(Deco::B1To32),
        "rn-sae" => TokenKind::Decorator(Deco::Rn),
        "rd-sae" => TokenKind::Decorator(Deco::Rd),
        "ru-sae" => TokenKind::Decorator(Deco::Ru),
        "rz-sae" => TokenKind::Decorator(Deco::Rz),
        "sae" => TokenKind::Decorator(Deco::Sae),
        "vex" => TokenKind::Prefix(PrefixKind::Vex),
        "vex3" => TokenKind::Prefix(PrefixKind::Vex3),
        "evex" => TokenKind::Prefix(PrefixKind::Evex),
        "rex" => TokenKind::Prefix(PrefixKind::Rex),
        "rex2" => TokenKind::Prefix(PrefixKind::Rex2),
        _ => match Register::from_name(inner) {
            Some(r) if r.is_opmask() => TokenKind::OpMask(r),
            _ => TokenKind::Id,
        },
    }
}

/// Tokenize one source line.
pub fn lex(line: &str) -> Vec<Token> {
    let mut toks: Vec<Token> = Vec::new();
    let bytes = line.as_bytes();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c == b' ' || c == b'\t' {
            pos += 1;
            continue;
        }
        if c == b';' {
            break;
        }

        // Brace groups: decorators, braced prefixes, braced constants.
        if c == b'{' {
            let end = line[pos..]
                .find('}')
                .map(|e| pos + e)
                .expect("unterminated brace in test input");
            let inner = &line[pos + 1..end];
            let mut tok = Token::with_text(brace_token(inner), inner);
            tok.flags = TokenFlags::BRC;
            toks.push(tok);
            pos = end + 1;
            continue;
        }

        // Strings.
        if c == b'\'' || c == b'"' {
            let quote = c as char;
            let end = line[pos + 1..]
                .find(quote)
                .map(|e| pos + 1 + e)
                .expect("unterminated string in test input");
            let content = &line[pos + 1..end];
            toks.push(Token::with_text(
                TokenKind::Str(content.as_bytes().to_vec()),
                content,
            ));
            pos = end + 1;
            continue;
        }

        // Numbers and floats.
        if c.is_ascii_digit() {
            let mut end = pos;
            let mut is_float = false;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric()
                    || bytes[end] == b'.'
                    || bytes[end] == b'_')
            {
                if bytes[end] == b'.' {
                    is_float = true;
                }
                end += 1;
            }
            let text = &line[pos..end];
            // `3 dup` style identifiers never begin with a digit, so a
            // digit run with a dot is always a float literal here.
            if is_float {
                toks.push(Token::with_text(TokenKind::Float, text));
            } else {
                let value = if let Some(hex) = text.strip_prefix("0x") {
                    i64::from_str_radix(hex, 16).expect("bad hex literal in test input")
                } else {
                    text.parse::<i64>().expect("bad integer literal in test input")
                };
                toks.push(Token::with_text(TokenKind::Num(value), text));
            }
            pos = end;
            continue;
        }

        // Identifiers and keywords.
        if c.is_ascii_alphabetic() || c == b'_' {
            let mut end = pos;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            let word = &line[pos..end];
            let lower = word.to_ascii_lowercase();
            let kind = if lower == "times" {
                TokenKind::Times
            } else if lower == "dup" {
                let mut tok = Token::with_text(TokenKind::Id, word);
                tok.flags = TokenFlags::DUP;
                toks.push(tok);
                pos = end;
                continue;
            } else if lower == "ptr" {
                TokenKind::MasmPtr
            } else if lower == "flat" {
                TokenKind::MasmFlat
            } else if let Some(func) = strfunc(&lower) {
                TokenKind::StrFunc(func)
            } else if let Some(spec) = keyword_size(&lower) {
                TokenKind::Size(spec)
            } else if let Some(p) = keyword_prefix(&lower) {
                TokenKind::Prefix(p)
            } else if let Some(op) = keyword_insn(&lower) {
                TokenKind::Insn(op)
            } else if let Some(r) = Register::from_name(&lower) {
                TokenKind::Reg(r)
            } else {
                TokenKind::Id
            };
            toks.push(Token::with_text(kind, word));
            pos = end;
            continue;
        }

        // `?` reserve marker.
        if c == b'?' {
            toks.push(Token::with_text(TokenKind::QMark, "?"));
            pos += 1;
            continue;
        }

        // Single-character punctuation.
        toks.push(Token::punct(c as char));
        pos += 1;
    }

    toks
}

// ── Scanner ─────────────────────────────────────────────────────────────

/// A rewindable scanner over pre-lexed tokens.
pub struct VecScanner {
    toks: Vec<Token>,
    pos: usize,
}

impl VecScanner {
    pub fn new(toks: Vec<Token>) -> Self {
        Self { toks, pos: 0 }
    }
}

impl Scan for VecScanner {
    fn next(&mut self) -> Token {
        let tok = self.toks.get(self.pos).cloned().unwrap_or_else(Token::eos);
        self.pos = self.pos.saturating_add(1);
        tok
    }

    fn save(&self) -> ScanState {
        ScanState(self.pos)
    }

    fn restore(&mut self, state: ScanState) {
        self.pos = state.0;
    }

    fn pushback(&mut self, _tok: Token) {
        self.pos = self.pos.saturating_sub(1);
    }
}

// ── Evaluator ───────────────────────────────────────────────────────────

/// A linear combination under construction.
#[derive(Default)]
struct Lin {
    constant: i64,
    regs: Vec<(Register, i64)>,
    segs: Vec<(Segment, i64)>,
    unknown: bool,
}

impl Lin {
    fn num(n: i64) -> Self {
        Lin {
            constant: n,
            ..Lin::default()
        }
    }

    fn add(&mut self, other: Lin, sign: i64) {
        self.constant += sign * other.constant;
        for (r, c) in other.regs {
            self.regs.push((r, sign * c));
        }
        for (s, c) in other.segs {
            self.segs.push((s, sign * c));
        }
        self.unknown |= other.unknown;
    }

    fn is_const(&self) -> bool {
        self.regs.is_empty() && self.segs.is_empty() && !self.unknown
    }

    fn scale(&mut self, k: i64) {
        self.constant *= k;
        for (_, c) in &mut self.regs {
            *c *= k;
        }
        for (_, c) in &mut self.segs {
            *c *= k;
        }
    }

    fn into_terms(self) -> Vec<ExprTerm> {
        if self.unknown {
            return vec![ExprTerm::Unknown];
        }
        let mut out = Vec::new();
        for (r, c) in self.regs {
            if c != 0 {
                out.push(ExprTerm::Reg(r, c));
            }
        }
        if self.constant != 0 || out.is_empty() && self.segs.is_empty() {
            out.push(ExprTerm::Simple(self.constant));
        }
        for (s, c) in self.segs {
            if c != 0 {
                out.push(ExprTerm::SegBase(s, c));
            }
        }
        out
    }
}

/// Symbol-table-backed evaluator for the fixture.
pub struct TestEval {
    pub symbols: HashMap<String, (Segment, i64)>,
}

impl TestEval {
    pub fn new() -> Self {
        Self {
            symbols: HashMap::new(),
        }
    }

    pub fn with_symbol(mut self, name: &str, seg: Segment, off: i64) -> Self {
        self.symbols.insert(name.to_string(), (seg, off));
        self
    }

    fn factor(
        &self,
        cursor: &mut Cursor<'_>,
        opflags: &mut Option<&mut OpExtra>,
    ) -> Option<Lin> {
        match cursor.tok.kind.clone() {
            TokenKind::Num(n) => {
                cursor.advance();
                Some(Lin::num(n))
            }
            TokenKind::Str(bytes) => {
                // Character constant: little-endian packing.
                let mut v: i64 = 0;
                for (i, b) in bytes.iter().take(8).enumerate() {
                    v |= i64::from(*b) << (8 * i);
                }
                cursor.advance();
                Some(Lin::num(v))
            }
            TokenKind::Reg(r) => {
                cursor.advance();
                Some(Lin {
                    regs: vec![(r, 1)],
                    ..Lin::default()
                })
            }
            TokenKind::Id => {
                let name = cursor.tok.text.clone();
                cursor.advance();
                match self.symbols.get(&name) {
                    Some((seg, off)) => Some(Lin {
                        constant: *off,
                        segs: vec![(*seg, 1)],
                        ..Lin::default()
                    }),
                    None => {
                        if let Some(extra) = opflags.as_mut() {
                            **extra |= OpExtra::FORWARD;
                        }
                        Some(Lin {
                            unknown: true,
                            ..Lin::default()
                        })
                    }
                }
            }
            TokenKind::Punct('(') => {
                cursor.advance();
                let inner = self.sum(cursor, opflags)?;
                if !cursor.tok.is_punct(')') {
                    return None;
                }
                cursor.advance();
                Some(inner)
            }
            TokenKind::Punct('-') => {
                cursor.advance();
                let mut inner = self.factor(cursor, opflags)?;
                inner.scale(-1);
                Some(inner)
            }
            TokenKind::Punct('+') => {
                cursor.advance();
                self.factor(cursor, opflags)
            }
            _ => None,
        }
    }

    fn term(&self, cursor: &mut Cursor<'_>, opflags: &mut Option<&mut OpExtra>) -> Option<Lin> {
        let mut left = self.factor(cursor, opflags)?;
        while cursor.tok.is_punct('*') {
            cursor.advance();
            let right = self.factor(cursor, opflags)?;
            if right.is_const() {
                left.scale(right.constant);
            } else if left.is_const() {
                let k = left.constant;
                left = right;
                left.scale(k);
            } else {
                return None;
            }
        }
        Some(left)
    }

    fn sum(&self, cursor: &mut Cursor<'_>, opflags: &mut Option<&mut OpExtra>) -> Option<Lin> {
        let mut acc = self.term(cursor, opflags)?;
        loop {
            if cursor.tok.flags.dup() {
                break;
            }
            let sign = if cursor.tok.is_punct('+') {
                1
            } else if cursor.tok.is_punct('-') {
                -1
            } else {
                break;
            };
            cursor.advance();
            let rhs = self.term(cursor, opflags)?;
            acc.add(rhs, sign);
        }
        Some(acc)
    }
}

fn round_mode(d: Deco) -> Option<RoundMode> {
    Some(match d {
        Deco::Rn => RoundMode::Rn,
        Deco::Rd => RoundMode::Rd,
        Deco::Ru => RoundMode::Ru,
        Deco::Rz => RoundMode::Rz,
        Deco::Sae => RoundMode::Sae,
        _ => return None,
    })
}

impl Eval for TestEval {
    fn evaluate(
        &self,
        cursor: &mut Cursor<'_>,
        mut opflags: Option<&mut OpExtra>,
        _critical: bool,
        _hints: Option<&mut EvalHints>,
    ) -> Option<Vec<ExprTerm>> {
        if let TokenKind::Decorator(d) = cursor.tok.kind {
            if let Some(mode) = round_mode(d) {
                cursor.advance();
                return Some(vec![ExprTerm::RdSae(mode)]);
            }
        }
        let lin = self.sum(cursor, &mut opflags)?;
        Some(lin.into_terms())
    }
}

// ── Host ────────────────────────────────────────────────────────────────

/// Records everything the parser asks for.
pub struct TestHost {
    pub diags: Vec<Diag>,
    pub labels: Vec<(String, Segment, u64)>,
    pub bits: u8,
    pub globalrel: bool,
    pub optimizing: i8,
    pub location: (Segment, u64),
    pub absolute: Option<Segment>,
    pub final_pass: bool,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            diags: Vec::new(),
            labels: Vec::new(),
            bits: 64,
            globalrel: false,
            optimizing: 0,
            location: (0, 0x1000),
            absolute: None,
            final_pass: true,
        }
    }

    pub fn errors(&self) -> Vec<&Diag> {
        self.diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diag> {
        self.diags
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }
}

impl Host for TestHost {
    fn define_label(&mut self, name: &str, segment: Segment, offset: u64) {
        self.labels.push((name.to_string(), segment, offset));
    }

    fn float_const(&mut self, text: &str, sign: i32, fmt: FloatFmt) -> Option<FloatBytes> {
        let value: f64 = text.parse().ok()?;
        let value = if sign < 0 { -value } else { value };
        match fmt {
            FloatFmt::F32 => Some(FloatBytes::new(&(value as f32).to_le_bytes())),
            FloatFmt::F64 => Some(FloatBytes::new(&value.to_le_bytes())),
            _ => None,
        }
    }

    fn string_transform(&mut self, func: StrFunc, data: &[u8]) -> Option<Vec<u8>> {
        let text = std::str::from_utf8(data).ok()?;
        let mut out = Vec::new();
        match func {
            StrFunc::Utf16 | StrFunc::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            StrFunc::Utf16Be => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
            StrFunc::Utf32 | StrFunc::Utf32Le => {
                for ch in text.chars() {
                    out.extend_from_slice(&(ch as u32).to_le_bytes());
                }
            }
            StrFunc::Utf32Be => {
                for ch in text.chars() {
                    out.extend_from_slice(&(ch as u32).to_be_bytes());
                }
            }
        }
        Some(out)
    }

    fn diag(&mut self, diag: Diag) {
        self.diags.push(diag);
    }

    fn bits(&self) -> u8 {
        self.bits
    }

    fn globalrel(&self) -> bool {
        self.globalrel
    }

    fn optimizing(&self) -> i8 {
        self.optimizing
    }

    fn location(&self) -> (Segment, u64) {
        self.location
    }

    fn in_absolute(&self) -> Option<Segment> {
        self.absolute
    }

    fn pass_final(&self) -> bool {
        self.final_pass
    }

    fn pass_stable(&self) -> bool {
        self.final_pass
    }
}

// ── Driver ──────────────────────────────────────────────────────────────

/// Parse one line with default fixtures.
pub fn parse(line: &str) -> (Insn, TestHost) {
    parse_with(line, TestEval::new(), TestHost::new())
}

/// Parse one line with explicit fixtures.
pub fn parse_with(line: &str, eval: TestEval, mut host: TestHost) -> (Insn, TestHost) {
    let mut scanner = VecScanner::new(lex(line));
    let mut insn = Insn::default();
    oxasm::parse_line(&mut scanner, &eval, &mut host, &mut insn);
    (insn, host)
}
