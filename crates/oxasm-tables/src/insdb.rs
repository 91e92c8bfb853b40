//! Instruction-database reader and pattern expander.
//!
//! The database is line-oriented: `MNEMONIC OPERANDS ENCODING FLAGS`,
//! `;` comments, blank lines ignored.  The encoding field is `ignore`, a
//! bracketed DSL string, or a C-style byte-escape string.  Before byte-code
//! compilation each line is expanded combinatorially: optional (`*`)
//! operands into all omission subsets, `?`-marked EVEX destinations into
//! present/absent forms, and `cc`/`scc` mnemonics into one pattern per
//! condition code.

use crate::condcodes::{cc_codes, scc_codes};
use std::collections::BTreeSet;
use std::fmt;

/// A fatal database error with source context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    /// Input file name.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// What went wrong.
    pub msg: String,
}

impl DbError {
    pub(crate) fn new(file: &str, line: u32, msg: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.msg)
    }
}

impl std::error::Error for DbError {}

/// The encoding field of a database line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// `ignore` — the mnemonic exists but assembles nowhere.
    Ignore,
    /// Raw bytes given as C-style escapes; no template compilation.
    Raw(Vec<u8>),
    /// The bracketed byte-code DSL, brackets stripped.
    Dsl(String),
}

/// One fully expanded instruction pattern, pre-compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Upper-case mnemonic, condition substituted.
    pub mnemonic: String,
    /// Operand field names, suffixes stripped.
    pub operands: Vec<String>,
    /// The encoding to compile.
    pub encoding: Encoding,
    /// Flag names from the FLAGS field plus auto-set ones.
    pub flags: BTreeSet<String>,
    /// Bit n set = original operand n was omitted by relaxed expansion.
    pub relax_mask: u32,
    /// Source line, for diagnostics.
    pub line: u32,
}

/// Parse and expand a whole database file.
pub fn parse_db(input: &str, file: &str) -> Result<Vec<Pattern>, DbError> {
    let mut out = Vec::new();
    for (idx, raw_line) in input.lines().enumerate() {
        let lineno = idx as u32 + 1;
        let line = match raw_line.find(';') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        if line.trim().is_empty() {
            continue;
        }
        expand_line(line, file, lineno, &mut out)?;
    }
    Ok(out)
}

/// Take one whitespace-delimited word off the front of `rest`.
fn take_word<'l>(
    rest: &mut &'l str,
    what: &str,
    file: &str,
    lineno: u32,
) -> Result<&'l str, DbError> {
    let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let (word, tail) = rest.split_at(word_end);
    if word.is_empty() {
        return Err(DbError::new(file, lineno, format!("missing {} field", what)));
    }
    *rest = tail.trim_start();
    Ok(word)
}

/// Split one line into its four fields, honoring the bracketed encoding.
fn split_fields<'l>(
    line: &'l str,
    file: &str,
    lineno: u32,
) -> Result<(&'l str, &'l str, &'l str, &'l str), DbError> {
    let mut rest = line.trim();

    let mnemonic = take_word(&mut rest, "mnemonic", file, lineno)?;
    let operands = take_word(&mut rest, "operand", file, lineno)?;

    let encoding = if rest.starts_with('[') {
        let close = rest
            .find(']')
            .ok_or_else(|| DbError::new(file, lineno, "unterminated [ in encoding field"))?;
        let (enc, tail) = rest.split_at(close + 1);
        rest = tail.trim_start();
        enc
    } else {
        take_word(&mut rest, "encoding", file, lineno)?
    };

    let flags = rest.trim();
    if flags.is_empty() {
        return Err(DbError::new(file, lineno, "missing flags field"));
    }
    Ok((mnemonic, operands, encoding, flags))
}

/// Decode a `\xHH` / `\OOO` escape string into raw bytes.
fn parse_escapes(s: &str, file: &str, lineno: u32) -> Result<Vec<u8>, DbError> {
    let mut out = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            return Err(DbError::new(
                file,
                lineno,
                format!("bad character {:?} in byte encoding", bytes[i] as char),
            ));
        }
        i += 1;
        if i >= bytes.len() {
            return Err(DbError::new(file, lineno, "trailing backslash in byte encoding"));
        }
        if bytes[i] == b'x' || bytes[i] == b'X' {
            let hex = s
                .get(i + 1..i + 3)
                .ok_or_else(|| DbError::new(file, lineno, "short \\x escape"))?;
            let v = u8::from_str_radix(hex, 16)
                .map_err(|_| DbError::new(file, lineno, format!("bad \\x escape `{}'", hex)))?;
            out.push(v);
            i += 3;
        } else {
            let mut v: u32 = 0;
            let mut digits = 0;
            while i < bytes.len() && digits < 3 && bytes[i].is_ascii_digit() && bytes[i] < b'8' {
                v = v * 8 + u32::from(bytes[i] - b'0');
                i += 1;
                digits += 1;
            }
            if digits == 0 {
                return Err(DbError::new(file, lineno, "bad escape in byte encoding"));
            }
            if v > 0xFF {
                return Err(DbError::new(file, lineno, "octal escape out of range"));
            }
            out.push(v as u8);
        }
    }
    Ok(out)
}

/// Expand one database line into `out`.
fn expand_line(line: &str, file: &str, lineno: u32, out: &mut Vec<Pattern>) -> Result<(), DbError> {
    let (mnemonic, operands_field, encoding_field, flags_field) =
        split_fields(line, file, lineno)?;

    let encoding = if encoding_field == "ignore" {
        Encoding::Ignore
    } else if let Some(dsl) = encoding_field
        .strip_prefix('[')
        .and_then(|e| e.strip_suffix(']'))
    {
        Encoding::Dsl(dsl.trim().to_string())
    } else {
        Encoding::Raw(parse_escapes(encoding_field, file, lineno)?)
    };

    let flags: BTreeSet<String> = flags_field
        .split(',')
        .filter(|f| !f.is_empty())
        .map(|f| f.trim().to_uppercase())
        .collect();
    crate::iflags::validate_flags(&flags, file, lineno)?;

    let operands: Vec<String> = if operands_field == "void" || operands_field == "ignore" {
        Vec::new()
    } else {
        operands_field.split(',').map(str::to_string).collect()
    };

    let base = Pattern {
        mnemonic: mnemonic.to_string(),
        operands,
        encoding,
        flags,
        relax_mask: 0,
        line: lineno,
    };

    // Conditional mnemonics fan out first, so the cc-substituted encodings
    // then go through relaxed expansion individually.
    let conditionals = expand_conditional(&base, file, lineno)?;
    for pat in conditionals {
        for pat in expand_nd(&pat) {
            expand_relaxed(&pat, file, lineno, out)?;
        }
    }
    Ok(())
}

/// `cc`/`scc` mnemonic expansion.
fn expand_conditional(
    base: &Pattern,
    file: &str,
    lineno: u32,
) -> Result<Vec<Pattern>, DbError> {
    let (is_scc, marker) = if base.mnemonic.contains("scc") {
        (true, "scc")
    } else if base.mnemonic.contains("cc") {
        (false, "cc")
    } else {
        return Ok(vec![base.clone()]);
    };

    let codes: Vec<&crate::condcodes::CondCode> = if is_scc {
        scc_codes().collect()
    } else {
        cc_codes().collect()
    };

    let mut out = Vec::with_capacity(codes.len());
    for code in codes {
        let mut pat = base.clone();
        pat.mnemonic = base
            .mnemonic
            .replacen(marker, &code.name.to_uppercase(), 1);
        if code.nd {
            pat.flags.insert("ND".to_string());
        }
        if let Encoding::Dsl(dsl) = &base.encoding {
            pat.encoding = Encoding::Dsl(substitute_cond(dsl, code.value, file, lineno)?);
        }
        out.push(pat);
    }
    Ok(out)
}

/// Rewrite `XX+c` literal tokens and `scc` fields for one condition value.
fn substitute_cond(dsl: &str, value: u8, file: &str, lineno: u32) -> Result<String, DbError> {
    let mut parts = Vec::new();
    for token in dsl.split_whitespace() {
        if let Some(hex) = token.strip_suffix("+c") {
            let byte = u8::from_str_radix(hex, 16).map_err(|_| {
                DbError::new(file, lineno, format!("bad conditional opcode `{}'", token))
            })?;
            parts.push(format!("{:02x}", byte ^ value));
        } else if token.contains(".scc") {
            parts.push(token.replacen(".scc", &format!(".scc{}", value), 1));
        } else {
            parts.push(token.to_string());
        }
    }
    Ok(parts.join(" "))
}

/// `?`-marked EVEX destination: present (`.nd1`) and absent (`.nd0`).
fn expand_nd(base: &Pattern) -> Vec<Pattern> {
    let Some(pos) = base.operands.iter().position(|o| o.ends_with('?')) else {
        return vec![base.clone()];
    };

    let mut with = base.clone();
    with.operands[pos] = base.operands[pos].trim_end_matches('?').to_string();
    let mut without = base.clone();
    without.operands.remove(pos);

    if let Encoding::Dsl(dsl) = &base.encoding {
        with.encoding = Encoding::Dsl(dsl.replacen(".ndx", ".nd1", 1));
        without.encoding = Encoding::Dsl(dsl.replacen(".ndx", ".nd0", 1));
    }
    vec![with, without]
}

/// `*`-marked optional operands: all 2^N omission subsets.
fn expand_relaxed(
    base: &Pattern,
    file: &str,
    lineno: u32,
    out: &mut Vec<Pattern>,
) -> Result<(), DbError> {
    let starred: Vec<usize> = base
        .operands
        .iter()
        .enumerate()
        .filter(|(_, o)| o.ends_with('*'))
        .map(|(i, _)| i)
        .collect();

    if starred.is_empty() {
        out.push(base.clone());
        return Ok(());
    }
    if starred.contains(&0) {
        return Err(DbError::new(file, lineno, "first operand may not be optional"));
    }
    if matches!(base.encoding, Encoding::Raw(_)) {
        return Err(DbError::new(
            file,
            lineno,
            "optional operands require a byte-code encoding",
        ));
    }

    for subset in 0u32..(1 << starred.len()) {
        let mut pat = base.clone();
        pat.operands = Vec::new();
        pat.relax_mask = 0;
        for (i, name) in base.operands.iter().enumerate() {
            let stripped = name.trim_end_matches('*');
            match starred.iter().position(|s| *s == i) {
                Some(bit) if subset & (1 << bit) != 0 => {
                    pat.relax_mask |= 1 << i;
                }
                _ => pat.operands.push(stripped.to_string()),
            }
        }
        out.push(pat);
    }
    Ok(())
}
