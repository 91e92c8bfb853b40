//! The byte-code compiler: encoding DSL → VM program.
//!
//! An encoding is `[operands: tuple: codes]` (tuple optional).  The
//! operand string assigns roles by position (`r` ModR/M.reg, `m`
//! ModR/M.rm, `v` VEX.vvvv, `i`/`j` immediates, `s` is4 register, `x`
//! MIB index, `-` implicit; a `+` makes the next role share its
//! predecessor's position).  The codes are whitespace-separated tokens
//! compiled into the octal vocabulary of [`oxasm::bytecode`].

use crate::insdb::{DbError, Encoding, Pattern};
use crate::opnames::operand_flags;
use oxasm::bytecode::{
    self as bc, EvexPayload, TupleType,
};
use oxasm::flags::{DecoFlags, OpFlags};
use std::collections::BTreeSet;

/// A fully compiled instruction pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    /// Upper-case mnemonic.
    pub mnemonic: String,
    /// Per-operand type and decorator masks.
    pub operands: Vec<(OpFlags, DecoFlags)>,
    /// The byte-code program, `BC_END`-terminated; `None` for `ignore`.
    pub bytes: Option<Vec<u8>>,
    /// Final flag set, synthesis applied.
    pub flags: BTreeSet<String>,
    /// Omitted-operand bits from relaxed expansion.
    pub relax_mask: u32,
    /// Source line.
    pub line: u32,
}

/// Operand-role positions from the DSL operand string.
#[derive(Debug, Clone, Copy, Default)]
struct OpPos {
    r: Option<u8>,
    m: Option<u8>,
    v: Option<u8>,
    i: Option<u8>,
    j: Option<u8>,
    s: Option<u8>,
    x: Option<u8>,
}

/// Compile every expanded pattern.
pub fn compile_all(patterns: &[Pattern], file: &str) -> Result<Vec<Compiled>, DbError> {
    patterns.iter().map(|p| compile(p, file)).collect()
}

/// Compile one pattern.
pub fn compile(pat: &Pattern, file: &str) -> Result<Compiled, DbError> {
    let mut operands = Vec::with_capacity(pat.operands.len());
    for name in &pat.operands {
        let resolved = operand_flags(name).ok_or_else(|| {
            DbError::new(file, pat.line, format!("unknown operand type `{}'", name))
        })?;
        operands.push(resolved);
    }
    // Relax-derived subsets legitimately drop below the operand counts
    // the size-match flags were written against.
    if pat.relax_mask == 0 {
        crate::iflags::validate_sizes(&pat.flags, operands.len(), file, pat.line)?;
    }

    let mut flags = pat.flags.clone();
    let (bytes, legacy_map) = match &pat.encoding {
        Encoding::Ignore => (None, 0),
        Encoding::Raw(raw) => {
            // Escape-string encodings are already byte-code programs.
            let mut b = raw.clone();
            if b.last() != Some(&bc::BC_END) {
                b.push(bc::BC_END);
            }
            (Some(b), 0)
        }
        Encoding::Dsl(dsl) => {
            let (bytes, map) = compile_dsl(dsl, pat.relax_mask, &mut flags, file, pat.line)?;
            (Some(bytes), map)
        }
    };

    crate::iflags::apply_implications(&mut flags, legacy_map);

    Ok(Compiled {
        mnemonic: pat.mnemonic.clone(),
        operands,
        bytes,
        flags,
        relax_mask: pat.relax_mask,
        line: pat.line,
    })
}

/// Parse the role string, applying relax-mask position shifts.
fn parse_oppos(ops: &str, relax_mask: u32, file: &str, line: u32) -> Result<OpPos, DbError> {
    let mut pos = OpPos::default();
    let mut next: u8 = 0;
    let mut share = false;

    let adjust = |p: u8| -> u8 {
        if relax_mask & (1 << p) != 0 {
            // The role's own operand was omitted: it aliases the
            // destination (the VEX.nds convention for relaxed forms).
            return 0;
        }
        p - (relax_mask & ((1u32 << p) - 1)).count_ones() as u8
    };

    for c in ops.chars() {
        if c == '+' {
            share = true;
            continue;
        }
        let p = if share {
            next.checked_sub(1)
                .ok_or_else(|| DbError::new(file, line, "leading + in operand string"))?
        } else {
            let p = next;
            next += 1;
            p
        };
        share = false;

        let slot = match c {
            '-' => continue,
            'r' => &mut pos.r,
            'm' => &mut pos.m,
            'v' => &mut pos.v,
            'i' => &mut pos.i,
            'j' => &mut pos.j,
            's' => &mut pos.s,
            'x' => &mut pos.x,
            _ => {
                return Err(DbError::new(
                    file,
                    line,
                    format!("unknown operand role `{}'", c),
                ))
            }
        };
        if slot.is_some() {
            return Err(DbError::new(
                file,
                line,
                format!("duplicate operand role `{}'", c),
            ));
        }
        *slot = Some(adjust(p));
    }
    Ok(pos)
}

/// Compiler state for one encoding.
struct Emitter<'e> {
    out: Vec<u8>,
    lits: Vec<u8>,
    /// Legacy prefixes may still be emitted.
    prefix_ok: bool,
    /// The first two literal bytes, for legacy-map classification.
    lit_trace: Vec<u8>,
    /// A REX2 prefix was emitted and awaits its map code.
    rex2_map_pending: bool,
    imm_used: u8,
    oppos: OpPos,
    file: &'e str,
    line: u32,
}

impl<'e> Emitter<'e> {
    fn err(&self, msg: impl Into<String>) -> DbError {
        DbError::new(self.file, self.line, msg)
    }

    /// Flush the pending literal run as `BC_LIT` codes.
    fn flush(&mut self) {
        let mut rest = 0;
        while rest < self.lits.len() {
            let n = (self.lits.len() - rest).min(bc::BC_LIT_MAX);
            self.out.push(bc::BC_LIT + (n - 1) as u8);
            self.out.extend_from_slice(&self.lits[rest..rest + n]);
            rest += n;
        }
        self.lits.clear();
    }

    /// Emit a standalone code (flushes literals first).
    fn put(&mut self, code: u8) {
        self.flush();
        self.out.push(code);
    }

    /// Emit a literal opcode byte.
    fn literal(&mut self, byte: u8) {
        if self.lit_trace.len() < 2 {
            self.lit_trace.push(byte);
        }
        if self.prefix_ok {
            if self.rex2_map_pending {
                self.flush();
                if byte == 0x0F {
                    self.out.push(bc::BC_LEGACY_MAP + 1);
                    self.rex2_map_pending = false;
                    return;
                }
                self.out.push(bc::BC_LEGACY_MAP);
                self.rex2_map_pending = false;
            }
            // The first opcode byte ends the prefix zone and gets its own
            // literal run, so the disassembly walker can peel prefixes.
            self.lits.push(byte);
            self.flush();
            self.prefix_ok = false;
        } else {
            self.lits.push(byte);
        }
    }

    fn need(&self, role: Option<u8>, what: char) -> Result<u8, DbError> {
        role.ok_or_else(|| self.err(format!("encoding needs an `{}' operand", what)))
    }

    /// The next immediate-slot operand: role `i`, then role `j`.
    fn next_imm(&mut self) -> Result<u8, DbError> {
        let pos = match self.imm_used {
            0 => self.need(self.oppos.i, 'i')?,
            1 => self.need(self.oppos.j, 'j')?,
            _ => return Err(self.err("too many immediate slots")),
        };
        self.imm_used += 1;
        if pos > 3 {
            return Err(self.err("immediate operand position out of range"));
        }
        Ok(pos)
    }
}

/// Compile the codes field; returns the program and the legacy map.
fn compile_dsl(
    dsl: &str,
    relax_mask: u32,
    flags: &mut BTreeSet<String>,
    file: &str,
    line: u32,
) -> Result<(Vec<u8>, u8), DbError> {
    let parts: Vec<&str> = dsl.split(':').collect();
    let (ops_str, tuple_str, codes_str) = match parts.as_slice() {
        [codes] => ("", "", *codes),
        [ops, codes] => (ops.trim(), "", *codes),
        [ops, tuple, codes] => (ops.trim(), tuple.trim(), *codes),
        _ => return Err(DbError::new(file, line, "too many `:' in encoding")),
    };

    let oppos = parse_oppos(ops_str, relax_mask, file, line)?;
    let tuple = if tuple_str.is_empty() {
        TupleType::None
    } else {
        TupleType::from_name(tuple_str)
            .ok_or_else(|| DbError::new(file, line, format!("undefined tuple type `{}'", tuple_str)))?
    };

    let mut e = Emitter {
        out: Vec::new(),
        lits: Vec::new(),
        prefix_ok: true,
        lit_trace: Vec::new(),
        rex2_map_pending: false,
        imm_used: 0,
        oppos,
        file,
        line,
    };

    for token in codes_str.split_whitespace() {
        compile_token(token, &mut e, tuple, flags)?;
    }

    e.flush();
    if e.rex2_map_pending {
        e.out.push(bc::BC_LEGACY_MAP);
    }
    e.out.push(bc::BC_END);

    let legacy_map = match e.lit_trace.as_slice() {
        [0x0F, 0x38] => 2,
        [0x0F, 0x3A] => 3,
        [0x0F, ..] => 1,
        _ => 0,
    };
    Ok((e.out, legacy_map))
}

/// Compile one whitespace-delimited token.
fn compile_token(
    token: &str,
    e: &mut Emitter<'_>,
    tuple: TupleType,
    flags: &mut BTreeSet<String>,
) -> Result<(), DbError> {
    match token {
        // Operand- and address-size controls.
        "o16" => e.put(bc::BC_O16),
        "o32" => e.put(bc::BC_O32),
        "odf" => e.put(bc::BC_ODF),
        "o64" => e.put(bc::BC_O64),
        "o64nw" => e.put(bc::BC_O64_NW),
        "rex.w" => e.put(bc::BC_REX_W),
        "a16" => e.put(bc::BC_A16),
        "a32" => e.put(bc::BC_A32),
        "a64" => e.put(bc::BC_A64),
        "adf" => e.put(bc::BC_ADF),
        "norexb" => e.put(bc::BC_NOREX_B),
        "norexx" => e.put(bc::BC_NOREX_X),
        "norexr" => e.put(bc::BC_NOREX_R),
        "norexw" => e.put(bc::BC_NOREX_W),

        // Prefix mandates and assorted controls.
        "f2i" => e.put(bc::BC_F2I),
        "f3i" => e.put(bc::BC_F3I),
        "nof3" => e.put(bc::BC_NOF3),
        "mustrep" => e.put(bc::BC_MUSTREP),
        "mustrepne" => e.put(bc::BC_MUSTREPNE),
        "hle" => e.put(bc::BC_HLE),
        "hlenl" => e.put(bc::BC_HLE_NL),
        "hlexr" => e.put(bc::BC_HLE_XR),
        "wait" => e.put(bc::BC_WAIT),
        "nohi" => e.put(bc::BC_NOHI),
        "np" => e.put(bc::BC_NP),
        "jcc8" => e.put(bc::BC_JCC8),
        "jmp8" => e.put(bc::BC_JMP8),
        "jlen" => e.put(bc::BC_JLEN),
        "resb" => e.put(bc::BC_RESB),
        "vsibx" => e.put(bc::BC_VSIB_X),
        "vsiby" => e.put(bc::BC_VSIB_Y),
        "vsibz" => e.put(bc::BC_VSIB_Z),

        "rex2" | "rex2!" => {
            if !e.prefix_ok {
                return Err(e.err("rex2 must precede the opcode"));
            }
            e.put(bc::BC_REX2 | u8::from(token == "rex2!"));
            e.rex2_map_pending = true;
            flags.insert("REX2".to_string());
        }

        // ModR/M with both slots from operands.
        "/r" => {
            e.flush();
            let mut r = e.need(e.oppos.r, 'r')?;
            let mut m = e.need(e.oppos.m, 'm')?;
            if r > 3 {
                e.out.push(bc::BC_HIGH_REG);
                r -= 4;
            }
            if m > 3 {
                e.out.push(bc::BC_HIGH_RM);
                m -= 4;
            }
            e.out.push(bc::modrm(m, r));
            e.prefix_ok = false;
        }

        // is4 forms.
        "/is4" => {
            let s = e.need(e.oppos.s, 's')?;
            let i = e.need(e.oppos.i, 'i')?;
            e.put(bc::BC_IS4);
            e.out.push((s << 4) | (i & 0x0F));
            e.prefix_ok = false;
        }
        "is4" => {
            let s = e.need(e.oppos.s, 's')?;
            e.put(bc::BC_IS4_IMPL + (s & 3));
            e.prefix_ok = false;
        }

        // Immediate slots.
        "ib" => imm(e, bc::BC_IB)?,
        "ib,u" => imm(e, bc::BC_IB_U)?,
        "ib,s" => imm(e, bc::BC_IB_S)?,
        "iw" => imm(e, bc::BC_IW)?,
        "iwd" => imm(e, bc::BC_IWD)?,
        "id" => imm(e, bc::BC_ID)?,
        "id,s" => imm(e, bc::BC_ID_S)?,
        "iq" => imm(e, bc::BC_IQ)?,
        "iwdq" => imm(e, bc::BC_IWDQ)?,
        "rel8" => imm(e, bc::BC_REL8)?,
        "rel16" => imm(e, bc::BC_REL16)?,
        "rel" => imm(e, bc::BC_REL)?,
        "rel32" => imm(e, bc::BC_REL32)?,
        "seg" => {
            // The selector half of a far pointer shares the offset's
            // operand.
            let pos = e.need(e.oppos.i, 'i')?;
            if pos > 3 {
                return Err(e.err("immediate operand position out of range"));
            }
            e.put(bc::BC_SEG + pos);
            e.prefix_ok = false;
        }

        _ => return compile_complex_token(token, e, tuple, flags),
    }
    Ok(())
}

fn imm(e: &mut Emitter<'_>, base: u8) -> Result<(), DbError> {
    let pos = e.next_imm()?;
    e.put(base + pos);
    e.prefix_ok = false;
    Ok(())
}

/// Tokens needing structural parsing: hex literals, `XX+r` forms,
/// `/digit`, fixed ModR/M, `/is4=N`, and VEX/XOP/EVEX descriptors.
fn compile_complex_token(
    token: &str,
    e: &mut Emitter<'_>,
    tuple: TupleType,
    flags: &mut BTreeSet<String>,
) -> Result<(), DbError> {
    // /0../7 — ModR/M with an opcode extension.
    if let Some(d) = token.strip_prefix('/') {
        if d.len() == 1 && d.as_bytes()[0].is_ascii_digit() && d.as_bytes()[0] < b'8' {
            e.flush();
            let mut m = e.need(e.oppos.m, 'm')?;
            if m > 3 {
                e.out.push(bc::BC_HIGH_RM);
                m -= 4;
            }
            e.out.push(bc::rm_ext(m, d.as_bytes()[0] - b'0'));
            e.prefix_ok = false;
            return Ok(());
        }

        // /is4=N — is4 with an immediate constant.
        if let Some(n) = d.strip_prefix("is4=") {
            let n: u8 = n
                .parse()
                .map_err(|_| e.err(format!("bad is4 constant `{}'", token)))?;
            if n > 15 {
                return Err(e.err("is4 constant out of range"));
            }
            let s = e.need(e.oppos.s, 's')?;
            e.put(bc::BC_IS4_CONST);
            e.out.push((s << 4) | n);
            e.prefix_ok = false;
            return Ok(());
        }

        // /MrRN — a fixed ModR/M byte: mod M, reg R, rm N.
        let b = d.as_bytes();
        if b.len() == 4 && b[1] == b'r' {
            let digit = |c: u8, max: u8| -> Result<u8, DbError> {
                let v = c.wrapping_sub(b'0');
                if c.is_ascii_digit() && v <= max {
                    Ok(v)
                } else {
                    Err(e.err(format!("bad fixed ModR/M `{}'", token)))
                }
            };
            let md = digit(b[0], 3)?;
            let reg = digit(b[2], 7)?;
            let rm = digit(b[3], 7)?;
            e.put(bc::BC_MODRM_FIXED);
            e.out.push((md << 6) | (reg << 3) | rm);
            e.prefix_ok = false;
            return Ok(());
        }

        return Err(e.err(format!("unknown token `{}' in encoding", token)));
    }

    // XX+r / XX+r1 — register-in-opcode forms.
    if let Some(hex) = token.strip_suffix("+r") {
        let byte = parse_hex_byte(hex).ok_or_else(|| {
            e.err(format!("unknown token `{}' in encoding", token))
        })?;
        e.flush();
        let mut pos = e.need(e.oppos.r, 'r')?;
        if pos > 3 {
            e.out.push(bc::BC_HIGH_REG);
            pos -= 4;
        }
        e.out.push(bc::BC_REG_OPC + pos);
        e.out.push(byte);
        e.prefix_ok = false;
        return Ok(());
    }
    if let Some(hex) = token.strip_suffix("+r1") {
        let byte = parse_hex_byte(hex).ok_or_else(|| {
            e.err(format!("unknown token `{}' in encoding", token))
        })?;
        e.flush();
        let pos = e.need(e.oppos.r, 'r')?;
        if pos > 3 {
            return Err(e.err("register-pair operand position out of range"));
        }
        e.out.push(bc::BC_REG_PAIR + pos);
        e.out.push(byte);
        e.prefix_ok = false;
        return Ok(());
    }

    // VEX/XOP/EVEX descriptors.
    if token.starts_with("vex.") || token.starts_with("xop.") || token.starts_with("evex.") {
        return compile_vector_prefix(token, e, tuple, flags);
    }

    // Plain hex literal; 66/F2/F3 in the prefix zone are prefix mandates.
    if let Some(byte) = parse_hex_byte(token) {
        if e.prefix_ok {
            match byte {
                0x66 => {
                    e.put(bc::BC_P66);
                    return Ok(());
                }
                0xF2 => {
                    e.put(bc::BC_PF2);
                    return Ok(());
                }
                0xF3 => {
                    e.put(bc::BC_PF3);
                    return Ok(());
                }
                _ => {}
            }
        }
        e.literal(byte);
        return Ok(());
    }

    Err(e.err(format!("unknown token `{}' in encoding", token)))
}

fn parse_hex_byte(s: &str) -> Option<u8> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        u8::from_str_radix(s, 16).ok()
    } else {
        None
    }
}

/// One `vex.* / xop.* / evex.*` descriptor.
fn compile_vector_prefix(
    token: &str,
    e: &mut Emitter<'_>,
    tuple: TupleType,
    flags: &mut BTreeSet<String>,
) -> Result<(), DbError> {
    let mut fields = token.split('.');
    let head = fields.next().unwrap_or("");
    let is_evex = head == "evex";
    let is_xop = head == "xop";

    let mut map: Option<u8> = None;
    let mut pp: u8 = 0;
    let mut w: Option<u8> = None;
    let mut length: Option<u8> = None;
    let mut wig = false;
    let mut ww = false;
    let mut lig = false;
    let mut nd = false;
    let mut nf = false;
    let mut dfv = false;
    let mut scc: Option<u8> = None;

    for field in fields {
        match field {
            "nds" | "ndd" | "dds" => {}
            "128" | "l0" | "lz" => length = Some(0),
            "256" | "l1" => length = Some(1),
            "512" | "l2" => {
                if !is_evex {
                    return Err(e.err("512-bit length requires EVEX"));
                }
                length = Some(2);
            }
            "lig" => lig = true,
            "66" => pp = 1,
            "f3" => pp = 2,
            "f2" => pp = 3,
            "np" => pp = 0,
            "0f" => map = Some(1),
            "0f38" => map = Some(2),
            "0f3a" => map = Some(3),
            "w0" => w = Some(0),
            "w1" => w = Some(1),
            "wig" => wig = true,
            "ww" => ww = true,
            "nd0" | "ndx" => nd = false,
            "nd1" => nd = true,
            "nf" | "nf1" => nf = true,
            "nf0" => nf = false,
            "dfv" => dfv = true,
            _ => {
                if let Some(m) = field.strip_prefix('m').and_then(|m| m.parse::<u8>().ok()) {
                    map = Some(m);
                } else if let Some(m) =
                    field.strip_prefix("map").and_then(|m| m.parse::<u8>().ok())
                {
                    map = Some(m);
                } else if let Some(v) =
                    field.strip_prefix("scc").and_then(|v| v.parse::<u8>().ok())
                {
                    if v > 15 {
                        return Err(e.err("scc value out of range"));
                    }
                    scc = Some(v);
                } else {
                    return Err(e.err(format!(
                        "unknown field `{}' in prefix token `{}'",
                        field, token
                    )));
                }
            }
        }
    }

    let map = map.ok_or_else(|| e.err(format!("missing opcode map in `{}'", token)))?;
    if is_evex {
        if map > 7 {
            return Err(e.err("EVEX opcode map out of range (0-7)"));
        }
    } else if is_xop {
        if map < 8 {
            return Err(e.err("XOP opcode map out of range (8-)"));
        }
    } else if !(1..=3).contains(&map) {
        return Err(e.err("VEX opcode map out of range (1-3)"));
    }

    if scc.is_some() && nf {
        return Err(e.err("scc cannot be combined with nf"));
    }
    if e.oppos.v.is_some() && (dfv || scc.is_some()) {
        return Err(e.err("explicit vvvv operand cannot be combined with dfv or scc"));
    }

    // Unspecified W or length is inferred as ignored.
    if w.is_none() && !ww {
        wig = true;
    }
    if length.is_none() {
        lig = true;
    }
    if wig {
        flags.insert("WIG".to_string());
    }
    if ww {
        flags.insert("WW".to_string());
    }
    if lig {
        flags.insert("LIG".to_string());
    }

    let w = w.unwrap_or(0);
    e.flush();

    if is_evex {
        flags.insert("EVEX".to_string());
        if nd || nf || dfv || scc.is_some() {
            flags.insert("APX".to_string());
        }
        if nf {
            flags.insert("NF".to_string());
        }
        if dfv {
            flags.insert("DFV".to_string());
        }
        let code = match e.oppos.v {
            Some(v) => bc::BC_EVEX + (v & 3),
            None => bc::BC_EVEX_NOV,
        };
        e.out.push(code);
        let payload = EvexPayload {
            map,
            pp,
            w,
            length: if lig { 3 } else { length.unwrap_or(0) },
            dfv: 0,
            scc: scc.unwrap_or(0),
            nf,
            nd,
            tuple: tuple as u8,
        };
        e.out.extend_from_slice(&payload.pack());
    } else {
        flags.insert("VEX".to_string());
        let class = u8::from(is_xop);
        let code = match e.oppos.v {
            Some(v) => bc::BC_VEX + (v & 3),
            None => bc::BC_VEX_NOV,
        };
        e.out.push(code);
        let l = if lig { 2 } else { length.unwrap_or(0) };
        e.out
            .extend_from_slice(&bc::vex_payload(class, map, w, l, pp));
    }

    e.prefix_ok = false;
    Ok(())
}
