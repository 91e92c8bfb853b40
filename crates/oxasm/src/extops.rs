//! Extended-operand parsing for the `DB` family and `INCBIN`.
//!
//! Data declarations take a comma-separated list of items: `?` reserve
//! markers, strings, string-transform calls, floats, numeric expressions,
//! and `DUP`-replicated parenthesized sub-lists.  The result is a tree of
//! [`ExtOp`] nodes; single-element sub-lists are flattened into their
//! parent and adjacent reserves coalesce.

use crate::expr::{ExprTerm, Segment};
use crate::host::float_fmt;
use crate::insn::{ExtOp, ExtOpKind};
use crate::parser::{Cursor, Pctx};
use crate::token::{SizeSpec, TokenKind};
use alloc::format;
use alloc::vec::Vec;

impl SizeSpec {
    /// Element width in bytes, for the size keywords usable as element
    /// overrides in data declarations.
    #[must_use]
    pub fn elem_bytes(self) -> Option<u32> {
        match self {
            SizeSpec::Byte => Some(1),
            SizeSpec::Word => Some(2),
            SizeSpec::Dword | SizeSpec::Long => Some(4),
            SizeSpec::Qword => Some(8),
            SizeSpec::Tword => Some(10),
            SizeSpec::Oword => Some(16),
            SizeSpec::Yword => Some(32),
            SizeSpec::Zword => Some(64),
            _ => None,
        }
    }
}

/// A string literal only counts as string *data* when the next token ends
/// the expression; otherwise it is a character constant inside one.
fn end_expression_next(cur: &mut Cursor<'_>) -> bool {
    let next = cur.peek_next();
    matches!(
        next.kind,
        TokenKind::Punct(',') | TokenKind::Punct(')') | TokenKind::Eos
    )
}

/// Parse a comma-separated extended-operand list.
///
/// `elem` is the element size implied by the directive (`db` = 1, …).
/// Returns the finished list and the number of items parsed (counting
/// discarded and coalesced ones).  `None` is a hard failure.
pub(crate) fn parse_eops(
    ctx: &mut Pctx<'_>,
    critical: bool,
    elem: u32,
) -> Option<(Vec<ExtOp>, usize)> {
    let mut out: Vec<ExtOp> = Vec::new();
    let mut oper_num = 0usize;
    let mut eop: Option<ExtOp> = None;
    let mut do_subexpr = false;

    loop {
        // `)` ends a sub-list; the parent verifies and consumes it.
        if ctx.cur.tok.is_eos() || ctx.cur.tok.is_punct(')') {
            break;
        }

        if eop.is_none() {
            eop = Some(ExtOp::new(elem));
            do_subexpr = false;
        }
        let e = eop.as_mut().expect("node just created");

        let mut skip;
        // Whether a `)` at the item boundary ends the whole list (it does
        // not when this item carried its own parenthesized construct).
        let mut endparen = true;
        let mut sign = 1i32;

        match ctx.cur.tok.kind.clone() {
            TokenKind::QMark => {
                e.kind = ExtOpKind::Reserve;
                skip = true;
            }

            TokenKind::Punct('(') if do_subexpr => {
                ctx.cur.advance();
                let (sub, _) = parse_eops(ctx, critical, e.elem)?;

                if sub.is_empty() {
                    e.kind = ExtOpKind::Nothing;
                } else if sub.len() == 1 {
                    // Single-element sub-list: flatten into this node,
                    // multiplying the replication counts.
                    let mut inner = sub.into_iter().next().expect("length checked");
                    if inner.elem == 0 {
                        inner.elem = e.elem;
                    }
                    inner.dup *= e.dup;
                    *e = inner;
                } else {
                    e.kind = ExtOpKind::SubList(sub);
                }

                if !ctx.cur.tok.is_punct(')') {
                    let what = ctx.cur.tok.describe();
                    ctx.error(format!("expected `)' after subexpression, got {}", what));
                    return None;
                }
                endparen = false;
                skip = true;
            }

            TokenKind::Punct('%') => {
                // %(...) — explicit sub-expression marker.
                do_subexpr = true;
                ctx.cur.advance();
                continue;
            }

            TokenKind::Size(spec) if spec.elem_bytes().is_some() => {
                // Element size override; applies to the following (...)
                // and its children.
                e.elem = spec.elem_bytes().expect("guard checked");
                do_subexpr = true;
                ctx.cur.advance();
                continue;
            }

            TokenKind::Str(data) if end_expression_next(&mut ctx.cur) => {
                e.kind = ExtOpKind::String(data);
                skip = true;
            }

            TokenKind::StrFunc(func) => {
                let funcname = ctx.cur.tok.text.clone();
                let mut parens = false;
                ctx.cur.advance();
                if ctx.cur.tok.is_punct('(') {
                    parens = true;
                    endparen = false;
                    ctx.cur.advance();
                }
                if let TokenKind::Str(data) = ctx.cur.tok.kind.clone() {
                    match ctx.host.string_transform(func, &data) {
                        Some(bytes) => e.kind = ExtOpKind::OwnedString(bytes),
                        None => {
                            ctx.error(format!("invalid input string to {}", funcname));
                            e.kind = ExtOpKind::Nothing;
                        }
                    }
                } else {
                    let what = ctx.cur.tok.describe();
                    ctx.error(format!(
                        "{} must be followed by a string constant, got {}",
                        funcname, what
                    ));
                    e.kind = ExtOpKind::Nothing;
                }
                if parens && !ctx.cur.tok.is_eos() && !ctx.cur.tok.is_punct(')') {
                    ctx.cur.advance();
                    if !ctx.cur.tok.is_punct(')') {
                        ctx.error(format!("unterminated {} function", funcname));
                    }
                }
                skip = !ctx.cur.tok.is_punct(',');
            }

            TokenKind::Punct(c @ ('+' | '-')) => {
                let checkpoint = ctx.cur.checkpoint();
                sign = if c == '-' { -1 } else { 1 };
                ctx.cur.advance();
                if matches!(ctx.cur.tok.kind, TokenKind::Float) {
                    parse_float(ctx, e, sign);
                    skip = true;
                } else {
                    ctx.cur.rewind(checkpoint);
                    match parse_expression(ctx, e, critical)? {
                        ExprStep::DupContinue => {
                            do_subexpr = true;
                            ctx.cur.advance();
                            continue;
                        }
                        ExprStep::Done => skip = false,
                    }
                }
            }

            TokenKind::Float => {
                parse_float(ctx, e, sign);
                skip = true;
            }

            _ => match parse_expression(ctx, e, critical)? {
                ExprStep::DupContinue => {
                    do_subexpr = true;
                    ctx.cur.advance();
                    continue;
                }
                ExprStep::Done => skip = false,
            },
        }

        // Commit or discard the finished node.
        let finished = eop.take().expect("node exists");
        if finished.dup == 0 || matches!(finished.kind, ExtOpKind::Nothing) {
            // Dropped: replicating nothing (or by zero) is a no-op.
        } else if let (Some(prev), ExtOpKind::Reserve) = (out.last_mut(), &finished.kind) {
            if matches!(prev.kind, ExtOpKind::Reserve) && prev.elem == finished.elem {
                prev.dup += finished.dup;
            } else {
                out.push(finished);
            }
        } else {
            out.push(finished);
        }
        oper_num += 1;

        if skip {
            ctx.cur.advance();
        }

        if ctx.cur.tok.is_eos() || (endparen && ctx.cur.tok.is_punct(')')) {
            break;
        }
        if !ctx.cur.tok.is_punct(',') {
            let what = ctx.cur.tok.describe();
            ctx.error(format!("comma expected after operand, got {}", what));
            return None;
        }
        ctx.cur.advance();
    }

    Some((out, oper_num))
}

/// What an expression item asked the main loop to do next.
enum ExprStep {
    /// The value was a `DUP` count; keep parsing this node.
    DupContinue,
    /// The node is classified; run the common tail.
    Done,
}

/// A float constant, converted through the host into an inline buffer.
fn parse_float(ctx: &mut Pctx<'_>, e: &mut ExtOp, sign: i32) {
    let text = ctx.cur.tok.text.clone();
    match float_fmt(e.elem) {
        None => {
            ctx.error(format!(
                "no {}-bit floating-point format supported",
                e.elem * 8
            ));
            e.kind = ExtOpKind::Nothing;
        }
        Some(fmt) => match ctx.host.float_const(&text, sign, fmt) {
            Some(bytes) if !bytes.is_empty() => e.kind = ExtOpKind::Float(bytes),
            _ => e.kind = ExtOpKind::Nothing,
        },
    }
}

/// Anything else is an expression; a trailing scanner-flagged `DUP` turns
/// it into a replication count instead of a value.
fn parse_expression(ctx: &mut Pctx<'_>, e: &mut ExtOp, critical: bool) -> Option<ExprStep> {
    let value = ctx.evaluate(None, critical, None)?;

    if ctx.cur.tok.flags.dup() {
        let n = match value.as_slice() {
            [ExprTerm::Simple(n)] => *n,
            _ => {
                ctx.error("non-constant argument supplied to DUP");
                return None;
            }
        };
        if n < 0 {
            ctx.error("negative argument supplied to DUP");
            return None;
        }
        e.dup *= n as u64;
        return Some(ExprStep::DupContinue);
    }

    let myseg = ctx.host.location().0;
    if value_to_extop(&value, e, myseg).is_err() {
        ctx.error("expression is not simple or relocatable");
    }
    Some(ExprStep::Done)
}

/// Reduce an expression vector to a numeric node: simple terms accumulate
/// into the offset, one `WRT` and one base segment are accepted, and a
/// `-$` self-reference marks the node relative.  Registers or anything
/// else unrepresentable is an error.
fn value_to_extop(vect: &[ExprTerm], e: &mut ExtOp, myseg: Segment) -> Result<(), ()> {
    let mut offset = 0i64;
    let mut segment: Option<Segment> = None;
    let mut wrt: Option<Segment> = None;
    let mut relative = false;

    for term in vect {
        match *term {
            // Zero terms are safe to ignore.
            ExprTerm::Simple(0) | ExprTerm::Reg(_, 0) | ExprTerm::SegBase(_, 0) => {}
            ExprTerm::Reg(..) | ExprTerm::RdSae(_) => return Err(()),
            ExprTerm::Unknown => {
                // Leave a zero number to be resolved on a later pass.
                e.kind = ExtOpKind::Number {
                    offset: 0,
                    segment: None,
                    wrt: None,
                    relative: false,
                };
                return Ok(());
            }
            ExprTerm::Simple(v) => offset = offset.wrapping_add(v),
            ExprTerm::Wrt(seg) if wrt.is_none() && !relative => wrt = Some(seg),
            ExprTerm::SegBase(seg, -1) if seg == myseg && !relative => relative = true,
            ExprTerm::SegBase(seg, 1) if segment.is_none() => segment = Some(seg),
            _ => return Err(()),
        }
    }

    e.kind = ExtOpKind::Number {
        offset,
        segment,
        wrt,
        relative,
    };
    Ok(())
}
