//! The source-line parser.
//!
//! [`parse_line`] drives a small state machine over the host's token
//! stream: label phase, `TIMES`/prefix phase, mnemonic, then either the
//! data-declaration path (see [`crate::extops`]) or the comma-separated
//! operand list with size overrides, memory references, segment overrides,
//! MIB compounds and EVEX decorators.
//!
//! Errors are best-effort: each is reported through the host sink, then
//! the parser skips to the next comma and keeps going.  Only a hard
//! evaluator failure abandons the line, leaving `opcode == Opcode::None`.

use crate::error::{Diag, WarnClass};
use crate::expr::{
    is_just_unknown, is_reloc, is_self_relative, is_simple, reloc_seg, reloc_value, reloc_wrt,
    EaHint, Eval, EvalHints, ExprTerm, RoundMode,
};
use crate::extops;
use crate::flags::{imm_flags, DecoFlags, EaFlags, OpExtra, OpFlags};
use crate::host::Host;
use crate::insn::{Insn, Opcode, Operand, PrefixKind, PrefixSlot, PutPrefix, MAX_OPERANDS};
use crate::mref::{mref_set_optype, parse_mref};
use crate::token::{Deco, Scan, ScanState, SizeSpec, Token, TokenKind};
use alloc::string::String;
use alloc::vec::Vec;

/// The shared read head over the scanner: the current token plus the
/// stream it came from.  The evaluator and the parser hand this back and
/// forth, exactly like a shared lookahead slot.
pub struct Cursor<'a> {
    scan: &'a mut dyn Scan,
    /// The current token.
    pub tok: Token,
}

impl<'a> Cursor<'a> {
    /// Wrap a scanner and read the first token.
    pub fn new(scan: &'a mut dyn Scan) -> Self {
        let tok = scan.next();
        Self { scan, tok }
    }

    /// Advance to the next token.
    pub fn advance(&mut self) -> &Token {
        self.tok = self.scan.next();
        &self.tok
    }

    /// Push the current token back and replace it with `tok`.
    pub fn replace(&mut self, tok: Token) {
        let old = core::mem::replace(&mut self.tok, tok);
        self.scan.pushback(old);
    }

    /// Push the current token back; the next [`advance`](Self::advance)
    /// re-reads it.
    pub fn pushback(&mut self) {
        self.scan.pushback(self.tok.clone());
    }

    /// Capture stream position and current token for a speculative scan.
    #[must_use]
    pub fn checkpoint(&self) -> (ScanState, Token) {
        (self.scan.save(), self.tok.clone())
    }

    /// Undo to a checkpoint.
    pub fn rewind(&mut self, state: (ScanState, Token)) {
        self.scan.restore(state.0);
        self.tok = state.1;
    }

    /// Peek at the token after the current one without consuming it.
    pub fn peek_next(&mut self) -> Token {
        let save = self.scan.save();
        let tok = self.scan.next();
        self.scan.restore(save);
        tok
    }
}

/// Everything a parse needs: the cursor, the evaluator, and the host.
pub(crate) struct Pctx<'a> {
    pub(crate) cur: Cursor<'a>,
    pub(crate) eval: &'a dyn Eval,
    pub(crate) host: &'a mut dyn Host,
}

impl<'a> Pctx<'a> {
    pub(crate) fn error(&mut self, msg: impl Into<String>) {
        let span = self.cur.tok.span;
        self.host.diag(Diag::error(msg, span));
    }

    pub(crate) fn warn(&mut self, class: WarnClass, msg: impl Into<String>) {
        let span = self.cur.tok.span;
        self.host.diag(Diag::warn(class, msg, span));
    }

    /// Evaluate one expression starting at the current token.
    pub(crate) fn evaluate(
        &mut self,
        opflags: Option<&mut OpExtra>,
        critical: bool,
        hints: Option<&mut EvalHints>,
    ) -> Option<Vec<ExprTerm>> {
        self.eval.evaluate(&mut self.cur, opflags, critical, hints)
    }
}

/// Parse one pre-processed source line into `result`.
///
/// The record is reset first.  On a hard failure `result.opcode` is
/// [`Opcode::None`]; everything else is best-effort populated.
pub fn parse_line(scan: &mut dyn Scan, eval: &dyn Eval, host: &mut dyn Host, result: &mut Insn) {
    let start = scan.save();
    let mut ctx = Pctx {
        cur: Cursor::new(scan),
        eval,
        host,
    };
    if parse(&mut ctx, start, result).is_none() {
        result.opcode = Opcode::None;
    }
}

/// The state machine proper.  `None` means hard failure.
#[allow(clippy::cognitive_complexity)]
fn parse(ctx: &mut Pctx<'_>, start: ScanState, result: &mut Insn) -> Option<()> {
    let mut insn_is_label = false;

    'restart: loop {
        let mut first = true;

        result.reset();

        // ── Label phase ─────────────────────────────────────────────────
        if matches!(ctx.cur.tok.kind, TokenKind::Id) || insn_is_label {
            first = false;
            result.label = Some(ctx.cur.tok.text.clone());
            ctx.cur.advance();
            if ctx.cur.tok.is_punct(':') {
                ctx.cur.advance();
            } else if ctx.cur.tok.is_eos() {
                ctx.warn(
                    WarnClass::LabelOrphan,
                    "label alone on a line without a colon might be in error",
                );
            }
            if !matches!(ctx.cur.tok.kind, TokenKind::Insn(Opcode::Equ)) {
                // An enclosing ABSOLUTE section supplies the segment; it is
                // unsettled whether it always should (see DESIGN.md), so the
                // long-standing behavior is kept.
                let (loc_seg, loc_off) = ctx.host.location();
                let seg = ctx.host.in_absolute().unwrap_or(loc_seg);
                let label = result.label.clone().unwrap_or_default();
                ctx.host.define_label(&label, seg, loc_off);
            }
        }

        // ── TIMES and prefix phase ──────────────────────────────────────
        let mut have_prefixes = false;
        loop {
            match ctx.cur.tok.kind {
                TokenKind::Times => {
                    ctx.cur.advance();
                    let stable = ctx.host.pass_stable();
                    let value = ctx.evaluate(None, stable, None)?;
                    if let [ExprTerm::Simple(n)] = value.as_slice() {
                        result.times = *n;
                        if *n < 0 {
                            if ctx.host.pass_final() {
                                ctx.error(alloc::format!("TIMES value {} is negative", n));
                            }
                            result.times = 0;
                        }
                    } else {
                        ctx.error("non-constant argument supplied to TIMES");
                        result.times = 1;
                    }
                }
                TokenKind::Prefix(p) => {
                    add_prefix(ctx, result, p);
                    have_prefixes = true;
                    ctx.cur.advance();
                }
                TokenKind::Reg(r) if r.is_sreg() => {
                    add_prefix(ctx, result, PrefixKind::Seg(r));
                    have_prefixes = true;
                    ctx.cur.advance();
                }
                _ => break,
            }
            first = false;
        }

        // ── Opcode phase ────────────────────────────────────────────────
        let opcode = match ctx.cur.tok.kind {
            TokenKind::Insn(op) => op,
            _ => {
                if ctx.cur.tok.is_eos() {
                    if have_prefixes {
                        // Prefixes with no instruction: synthesize RESB 0.
                        // TIMES combines with this, so the record is kept.
                        result.opcode = Opcode::Resb;
                        result.operands = 1;
                        result.oprs[0].ty =
                            imm_flags(0, OpFlags::IMMEDIATE, ctx.host.optimizing());
                        result.oprs[0].offset = 0;
                    }
                } else if !first {
                    ctx.error("instruction expected");
                } else if result.label.is_none() {
                    ctx.error("label or instruction expected at start of line");
                }
                return Some(());
            }
        };
        result.opcode = opcode;

        // INCBIN needs correct values on the first pass, so expressions are
        // evaluated critically even before symbols settle.
        let critical = ctx.host.pass_final() || opcode == Opcode::Incbin;

        // ── Data-declaration branch ─────────────────────────────────────
        if opcode.is_db_family() || opcode == Opcode::Incbin {
            ctx.cur.advance();
            if first && ctx.cur.tok.is_punct(':') {
                // `db:` — the mnemonic was really a label.
                insn_is_label = true;
                restart(ctx, start);
                continue 'restart;
            }
            let elem = opcode.db_bytes().unwrap_or(1);
            let (eops, oper_num) = extops::parse_eops(ctx, critical, elem)?;
            result.eops = eops;

            if opcode == Opcode::Incbin {
                validate_incbin(ctx, result)?;
                return Some(());
            }

            result.operands = oper_num;
            if oper_num == 0 {
                ctx.warn(WarnClass::DbEmpty, "no operand for data declaration");
            }
            return Some(());
        }

        // ── Standard operand phase ──────────────────────────────────────
        let far_jmp_ok = matches!(opcode, Opcode::Jmp | Opcode::Call);
        let mut opnum = 0usize;

        while opnum < MAX_OPERANDS {
            result.oprs[opnum] = Operand::default();

            ctx.cur.advance();
            if first && ctx.cur.tok.is_punct(':') {
                insn_is_label = true;
                restart(ctx, start);
                continue 'restart;
            }
            first = false;

            if opnum == 0 {
                // Braced prefix tokens like {evex} are allowed between the
                // mnemonic and the first operand.
                loop {
                    if !ctx.cur.tok.flags.brc() {
                        break;
                    }
                    let p = match ctx.cur.tok.kind {
                        TokenKind::Prefix(p) => p,
                        TokenKind::Reg(r) if r.is_sreg() => PrefixKind::Seg(r),
                        _ => break,
                    };
                    add_prefix(ctx, result, p);
                    ctx.cur.advance();
                }
            }

            if ctx.cur.tok.is_eos() {
                break;
            }

            // Naked braced-constant immediate: terminates the operand
            // without requiring a comma.
            if let TokenKind::BrcConst(v, aux) = ctx.cur.tok.kind {
                let opt = ctx.host.optimizing();
                let op = &mut result.oprs[opnum];
                op.ty = imm_flags(v, OpFlags::IMMEDIATE, opt);
                op.offset = v;
                op.iflag = aux;
                ctx.cur.advance();
                if !ctx.cur.tok.is_punct(',') {
                    ctx.cur.pushback();
                }
                opnum += 1;
                continue;
            }

            let mut mref = false;
            let mut bracket: i32 = 0;
            let mut setsize = false;
            let mut brace_flags = DecoFlags::NONE;

            // Size and attribute specifiers; only the first size wins.
            while let TokenKind::Size(spec) = ctx.cur.tok.kind {
                let op = &mut result.oprs[opnum];
                match spec {
                    SizeSpec::To => op.ty |= OpFlags::TO,
                    SizeSpec::Strict => op.ty |= OpFlags::STRICT,
                    SizeSpec::Far => op.ty |= OpFlags::FAR,
                    SizeSpec::Near => op.ty |= OpFlags::NEAR,
                    SizeSpec::Short => op.ty |= OpFlags::SHORT,
                    _ => match spec.size_flag() {
                        Some(size) => {
                            if !setsize {
                                op.ty |= size;
                            }
                            setsize = true;
                        }
                        None => ctx.error("invalid operand size specification"),
                    },
                }
                ctx.cur.advance();
            }

            // Memory-reference opener.
            if ctx.cur.tok.is_punct('[')
                || ctx.cur.tok.is_punct('&')
                || ctx.cur.tok.kind == TokenKind::MasmPtr
            {
                mref = true;
                if ctx.cur.tok.is_punct('[') {
                    bracket += 1;
                }
                ctx.cur.advance();
            }

            let loc_seg = ctx.host.location().0;
            let mut hints = EvalHints::default();

            let value = loop {
                if mref {
                    absorb_mref_tokens(ctx, result, opnum, &mut bracket);
                }

                let mut opflags = result.oprs[opnum].extra;
                let v = ctx.evaluate(Some(&mut opflags), critical, Some(&mut hints));
                result.oprs[opnum].extra = opflags;
                let v = v?;
                if result.oprs[opnum].extra.intersects(OpExtra::FORWARD) {
                    result.forw_ref = true;
                }

                if ctx.cur.tok.is_punct('[') && bracket == 0 {
                    // `disp[regs]` syntax: fold what we have, then re-enter
                    // the bracketed phase.
                    mref = true;
                    if let Err(e) = parse_mref(&mut result.oprs[opnum], &v, loc_seg) {
                        ctx.error(alloc::format!("{}", e));
                    }
                    continue;
                }

                if ctx.cur.tok.is_punct(':') && (mref || !far_jmp_ok) {
                    // Segment override.
                    mref = true;
                    match v.as_slice() {
                        [ExprTerm::Reg(r, 1)] if r.is_sreg() => {
                            if result.prefix(PrefixSlot::Seg).is_some() {
                                ctx.error("instruction has conflicting segment overrides");
                            } else {
                                result.prefixes[PrefixSlot::Seg as usize] =
                                    Some(PrefixKind::Seg(*r));
                                if r.is_fsgs() {
                                    result.oprs[opnum].eaflags |= EaFlags::FSGS;
                                }
                            }
                        }
                        _ => ctx.error("invalid segment override"),
                    }
                    ctx.cur.advance();
                    continue;
                }

                break v;
            };

            // Compound (mib) reference: [base+offset,index*scale].
            let mut mib = false;
            if mref && bracket > 0 && ctx.cur.tok.is_punct(',') {
                if let Err(e) = parse_mref(&mut result.oprs[opnum], &value, loc_seg) {
                    ctx.error(alloc::format!("{}", e));
                    return None;
                }

                ctx.cur.advance();
                let mut opflags = result.oprs[opnum].extra;
                let v2 = ctx.evaluate(Some(&mut opflags), critical, Some(&mut hints));
                result.oprs[opnum].extra = opflags;
                let v2 = v2?;

                let mut o2 = Operand::default();
                if let Err(e) = parse_mref(&mut o2, &v2, loc_seg) {
                    ctx.error(alloc::format!("{}", e));
                    return None;
                }

                if o2.basereg.is_some() && o2.indexreg.is_none() {
                    o2.indexreg = o2.basereg;
                    o2.scale = 1;
                    o2.basereg = None;
                }

                let op = &mut result.oprs[opnum];
                if op.indexreg.is_some()
                    || o2.basereg.is_some()
                    || o2.offset != 0
                    || o2.segment.is_some()
                    || o2.wrt.is_some()
                {
                    ctx.error("invalid mib expression");
                    return None;
                }

                op.indexreg = o2.indexreg;
                op.scale = o2.scale;

                if op.basereg.is_some() {
                    op.hintbase = op.basereg;
                    op.hint = EaHint::MakeBase;
                } else if op.indexreg.is_some() {
                    op.hintbase = op.indexreg;
                    op.hint = EaHint::NotBase;
                } else {
                    op.hintbase = None;
                    op.hint = EaHint::NoHint;
                }

                mib = true;
            }

            // ── Terminator validation ───────────────────────────────────
            let mut recover = false;
            if mref {
                if bracket == 1 {
                    if ctx.cur.tok.is_punct(']') {
                        bracket -= 1;
                        ctx.cur.advance();
                    } else {
                        ctx.error("expecting ] at end of memory operand");
                        recover = true;
                    }
                } else if bracket > 1 {
                    ctx.error("excess brackets in memory operand");
                    recover = true;
                }

                if matches!(
                    ctx.cur.tok.kind,
                    TokenKind::Decorator(_) | TokenKind::OpMask(_)
                ) {
                    recover = parse_decorators(ctx, &mut brace_flags);
                }
                if !recover && !ctx.cur.tok.is_eos() && !ctx.cur.tok.is_punct(',') {
                    let what = ctx.cur.tok.describe();
                    ctx.error(alloc::format!(
                        "comma, decorator or end of line expected, got {}",
                        what
                    ));
                    recover = true;
                }
            } else {
                // Immediate (or register) operand.
                match ctx.cur.tok.kind {
                    TokenKind::Eos | TokenKind::Punct(',') => {}
                    TokenKind::Punct(':') => {
                        result.oprs[opnum].ty |= OpFlags::COLON;
                    }
                    TokenKind::Decorator(_) | TokenKind::OpMask(_) => {
                        recover = parse_decorators(ctx, &mut brace_flags);
                    }
                    _ => {
                        ctx.error(
                            "comma, colon, decorator or end of line expected after operand",
                        );
                        recover = true;
                    }
                }
            }
            if recover {
                while !ctx.cur.tok.is_eos() && !ctx.cur.tok.is_punct(',') {
                    ctx.cur.advance();
                }
            }

            // ── Classification ──────────────────────────────────────────
            result.oprs[opnum].decoflags |= brace_flags;

            if mref {
                if !mib {
                    if let Err(e) = parse_mref(&mut result.oprs[opnum], &value, loc_seg) {
                        ctx.error(alloc::format!("{}", e));
                        return None;
                    }
                    result.oprs[opnum].hintbase = hints.base;
                    result.oprs[opnum].hint = hints.kind;
                }
                let bits = ctx.host.bits();
                let globalrel = ctx.host.globalrel();
                mref_set_optype(&mut result.oprs[opnum], bits, globalrel);
            } else if result.oprs[opnum].ty.intersects(OpFlags::FAR) && !far_jmp_ok {
                ctx.error("invalid use of FAR operand specifier");
            } else if is_just_unknown(&value) {
                let opt = ctx.host.optimizing();
                let op = &mut result.oprs[opnum];
                op.ty |= OpFlags::IMMEDIATE;
                op.extra |= OpExtra::UNKNOWN;
                op.offset = 0;
                if opt >= 0 && !op.ty.intersects(OpFlags::STRICT) {
                    // Be optimistic about the encoding until it is known.
                    op.ty |= OpFlags::UNITY
                        | OpFlags::SBYTEWORD
                        | OpFlags::SBYTEDWORD
                        | OpFlags::UDWORD
                        | OpFlags::SDWORD;
                }
            } else if is_reloc(&value) {
                let opt = ctx.host.optimizing();
                let n = reloc_value(&value);
                let op = &mut result.oprs[opnum];
                op.ty |= OpFlags::IMMEDIATE;
                op.offset = n;
                op.segment = reloc_seg(&value);
                op.wrt = reloc_wrt(&value);
                if is_self_relative(&value) {
                    op.extra |= OpExtra::RELATIVE;
                }
                if is_simple(&value) {
                    op.ty = imm_flags(n, op.ty, opt);
                }
            } else if let Some(ExprTerm::RdSae(mode)) = value.first().copied() {
                // A rounding/SAE decorator in operand position belongs to
                // the previous operand.
                if opnum == 0 {
                    ctx.error("invalid decorator");
                    return None;
                }
                opnum -= 1;
                let op = &mut result.oprs[opnum];
                op.decoflags |= if mode == RoundMode::Sae {
                    DecoFlags::SAE
                } else {
                    DecoFlags::ER
                };
                result.evex_rm = Some(mode);
            } else {
                classify_register(ctx, result, opnum, &value, brace_flags)?;
            }

            if result.oprs[opnum]
                .decoflags
                .intersects(DecoFlags::BRDCAST_MASK | DecoFlags::ER | DecoFlags::SAE)
            {
                result.evex_brerop = Some(opnum);
            }
            opnum += 1;
        }

        result.operands = opnum;
        for op in &mut result.oprs[opnum..] {
            op.ty = OpFlags::NONE;
        }

        return Some(());
    }
}

/// Rewind the whole line for a restart after `mnemonic:` turned the
/// supposed opcode into a label.
fn restart(ctx: &mut Pctx<'_>, start: ScanState) {
    ctx.cur.rewind((start, Token::eos()));
    ctx.cur.advance();
}

/// Install a prefix, diagnosing redundancy and conflicts.
fn add_prefix(ctx: &mut Pctx<'_>, result: &mut Insn, prefix: PrefixKind) {
    match result.put_prefix(prefix) {
        PutPrefix::Stored => {}
        PutPrefix::Redundant => ctx.warn(
            WarnClass::PrefixRedundant,
            "instruction has redundant prefixes",
        ),
        PutPrefix::Conflict => ctx.error("instruction has conflicting prefixes"),
    }
}

/// Absorb size overrides, nested `[`, `FLAT:` and a bare comma inside a
/// memory reference, leaving the cursor on the expression start.
fn absorb_mref_tokens(ctx: &mut Pctx<'_>, result: &mut Insn, opnum: usize, bracket: &mut i32) {
    loop {
        let mut advance = true;
        match ctx.cur.tok.kind {
            TokenKind::Size(spec) => process_size_override(ctx, result, opnum, spec),
            TokenKind::Prefix(p) => process_asize_prefix(ctx, result, p),
            TokenKind::Punct('[') => *bracket += 1,
            TokenKind::Punct(',') => {
                // An empty first half of a mib reference: rewind the comma
                // and synthesize a zero for the evaluator.
                ctx.cur.replace(Token::new(TokenKind::Num(0)));
                return;
            }
            TokenKind::MasmFlat => {
                ctx.cur.advance();
                if ctx.cur.tok.is_punct(':') {
                    ctx.cur.advance();
                } else {
                    ctx.error("unknown use of FLAT in MASM emulation");
                }
                return;
            }
            _ => {
                advance = false;
            }
        }
        if !advance {
            return;
        }
        ctx.cur.advance();
    }
}

/// Size overrides inside an effective address change the displacement,
/// not the operand.
fn process_size_override(ctx: &mut Pctx<'_>, result: &mut Insn, opnum: usize, spec: SizeSpec) {
    let op = &mut result.oprs[opnum];
    match spec {
        SizeSpec::Nosplit => op.eaflags |= EaFlags::TIMESTWO,
        SizeSpec::Rel => op.eaflags |= EaFlags::REL,
        SizeSpec::Abs => op.eaflags |= EaFlags::ABS,
        SizeSpec::Byte => {
            op.disp_size = 8;
            op.eaflags |= EaFlags::BYTEOFFS;
        }
        SizeSpec::Word => {
            op.disp_size = 16;
            op.eaflags |= EaFlags::WORDOFFS;
        }
        SizeSpec::Dword | SizeSpec::Long => {
            op.disp_size = 32;
            op.eaflags |= EaFlags::WORDOFFS;
        }
        SizeSpec::Qword => {
            op.disp_size = 64;
            op.eaflags |= EaFlags::WORDOFFS;
        }
        _ => ctx.error("invalid size specification in effective address"),
    }
}

/// An address-size prefix may appear inside the brackets.
fn process_asize_prefix(ctx: &mut Pctx<'_>, result: &mut Insn, prefix: PrefixKind) {
    match prefix {
        PrefixKind::A16 | PrefixKind::A32 | PrefixKind::A64 => {
            match result.prefix(PrefixSlot::ASize) {
                Some(existing) if existing != prefix => {
                    ctx.error("conflicting address size specifications");
                }
                _ => {
                    result.prefixes[PrefixSlot::ASize as usize] = Some(prefix);
                }
            }
        }
        _ => ctx.error("invalid size specification in effective address"),
    }
}

/// Parse a run of `{k1}` / `{z}` / `{1toN}` decorators after an operand.
/// Returns `true` when recovery is needed.
fn parse_decorators(ctx: &mut Pctx<'_>, deco: &mut DecoFlags) -> bool {
    loop {
        match ctx.cur.tok.kind {
            TokenKind::OpMask(k) => {
                if !(*deco & DecoFlags::OPMASK_MASK).is_empty() {
                    let prev = deco.opmask_value();
                    ctx.error(alloc::format!("opmask k{} is already set", prev));
                    *deco = deco.without(DecoFlags::OPMASK_MASK);
                }
                *deco |= DecoFlags::opmask(k.number());
            }
            TokenKind::Decorator(d) => match d {
                Deco::Z => *deco |= DecoFlags::Z,
                _ => match d.broadcast_index() {
                    Some(idx) => {
                        *deco |= DecoFlags::BRDCAST_MASK | DecoFlags::brnum(idx);
                    }
                    None => {
                        let what = ctx.cur.tok.describe();
                        ctx.error(alloc::format!("{} is not an expected decorator", what));
                    }
                },
            },
            TokenKind::Punct(',') | TokenKind::Eos => return false,
            _ => {
                ctx.error("only a series of valid decorators expected");
                return true;
            }
        }
        ctx.cur.advance();
    }
}

/// The register-operand classification tail: coefficient checks, register
/// sets, and explicit-size/implicit-size reconciliation.
fn classify_register(
    ctx: &mut Pctx<'_>,
    result: &mut Insn,
    opnum: usize,
    value: &[ExprTerm],
    brace_flags: DecoFlags,
) -> Option<()> {
    let reg = match value.first() {
        Some(ExprTerm::Reg(r, 1)) => *r,
        _ => {
            ctx.error("invalid operand type");
            return None;
        }
    };

    // Beyond the register itself, only a `+N` register-set marker is
    // allowed.
    let mut regset_size: u64 = 0;
    for term in &value[1..] {
        match *term {
            ExprTerm::Simple(0) | ExprTerm::Reg(_, 0) | ExprTerm::SegBase(_, 0) => {}
            ExprTerm::Simple(n) if regset_size == 0 => {
                regset_size = n as u64 + 1;
            }
            _ => {
                ctx.error("invalid operand type");
                return None;
            }
        }
    }

    if regset_size & regset_size.wrapping_sub(1) != 0
        || regset_size >= 1 << OpFlags::REGSET_BITS
    {
        if ctx.host.pass_final() {
            ctx.error("invalid register set size");
        }
        regset_size = 0;
    }

    let op = &mut result.oprs[opnum];

    // An explicit size override was collected into ty; keep it aside to
    // compare against the register's own size.  TO survives (FPU forms).
    let rs = if !op.ty.without(OpFlags::TO).is_empty() {
        op.ty & OpFlags::SIZE_MASK
    } else {
        OpFlags::NONE
    };

    op.ty &= OpFlags::TO;
    op.ty |= OpFlags::REGISTER | reg.flags();
    op.ty |= OpFlags((regset_size >> 1) << OpFlags::REGSET_SHIFT);
    op.decoflags |= brace_flags;
    op.basereg = Some(reg);

    if !rs.is_empty() {
        let opsize = reg.flags() & OpFlags::SIZE_MASK;
        if opsize.is_empty() {
            // Size-polymorphic registers (opmask) accept an explicit size.
            op.ty |= rs;
        } else if opsize != rs {
            ctx.warn(
                WarnClass::RegSize,
                "invalid register size specification ignored",
            );
        }
    }

    Some(())
}

/// INCBIN arity: one string, then up to two numeric operands.
fn validate_incbin(ctx: &mut Pctx<'_>, result: &mut Insn) -> Option<()> {
    let eops = &result.eops;
    let msg = if !matches!(
        eops.first().map(|e| &e.kind),
        Some(crate::insn::ExtOpKind::String(_))
    ) {
        "`incbin' expects a file name"
    } else if eops.len() >= 2
        && !matches!(eops[1].kind, crate::insn::ExtOpKind::Number { .. })
    {
        "`incbin': second parameter is non-numeric"
    } else if eops.len() >= 3
        && !matches!(eops[2].kind, crate::insn::ExtOpKind::Number { .. })
    {
        "`incbin': third parameter is non-numeric"
    } else if eops.len() > 3 {
        "`incbin': more than three parameters"
    } else {
        return Some(());
    };
    ctx.error(msg);
    None
}
