//! Evaluated expression vectors and the evaluator contract.
//!
//! The expression evaluator is a host service.  It consumes tokens from the
//! shared cursor and returns a *flattened linear combination*: a vector of
//! [`ExprTerm`]s, each a register with a coefficient, a constant, a segment
//! base with a coefficient, a `WRT` target, an unresolvable marker, or a
//! rounding decorator.  The parser classifies operands purely from the
//! shape of that vector.

use crate::flags::OpExtra;
use crate::parser::Cursor;
use crate::reg::Register;
use alloc::vec::Vec;

/// A segment identifier, as issued by the host's label machinery.
pub type Segment = i32;

/// One term of an evaluated expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprTerm {
    /// A register scaled by a coefficient (`4*ecx` → `Reg(Ecx, 4)`).
    Reg(Register, i64),
    /// A constant contribution.
    Simple(i64),
    /// The value involves symbols not yet resolvable.
    Unknown,
    /// A `WRT` term naming a segment.
    Wrt(Segment),
    /// A segment base scaled by a coefficient; a label `foo` evaluates to
    /// `Simple(offset) + SegBase(seg_of_foo, 1)`, and `foo - $` contributes
    /// `SegBase(current, -1)`.
    SegBase(Segment, i64),
    /// A rounding or SAE decorator appearing in operand position.
    RdSae(RoundMode),
}

/// EVEX rounding / exception-suppression modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoundMode {
    /// `{rn-sae}` — round to nearest.
    Rn,
    /// `{rd-sae}` — round down.
    Rd,
    /// `{ru-sae}` — round up.
    Ru,
    /// `{rz-sae}` — round toward zero.
    Rz,
    /// `{sae}` — suppress all exceptions, no rounding override.
    Sae,
}

/// Effective-address shape hints produced by the evaluator or MIB parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EaHint {
    /// No preference.
    #[default]
    NoHint,
    /// Prefer the hinted register as the base.
    MakeBase,
    /// The hinted register must not be the base.
    NotBase,
}

/// Hints out-parameter for [`Eval::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvalHints {
    /// The register the hint applies to.
    pub base: Option<Register>,
    /// The kind of hint.
    pub kind: EaHint,
}

/// The expression evaluator contract.
///
/// On entry the cursor holds the first token of the expression; on return
/// it holds the first token *past* it.  `None` signals a hard evaluator
/// failure (already diagnosed by the host); the parser abandons the line.
pub trait Eval {
    /// Evaluate one expression from the token stream.
    fn evaluate(
        &self,
        cursor: &mut Cursor<'_>,
        opflags: Option<&mut OpExtra>,
        critical: bool,
        hints: Option<&mut EvalHints>,
    ) -> Option<Vec<ExprTerm>>;
}

/// True for a vector that is exactly one known constant.
#[must_use]
pub fn is_simple(e: &[ExprTerm]) -> bool {
    matches!(e, [ExprTerm::Simple(_)])
}

/// True for a vector that is exactly the unresolvable marker.
#[must_use]
pub fn is_just_unknown(e: &[ExprTerm]) -> bool {
    matches!(e, [ExprTerm::Unknown])
}

/// True for a vector with no register, unknown, or decorator content:
/// a constant, optionally plus one segment base and/or a `WRT` term.
#[must_use]
pub fn is_reloc(e: &[ExprTerm]) -> bool {
    let mut segs = 0;
    let mut wrts = 0;
    for term in e {
        match term {
            ExprTerm::Simple(_) => {}
            ExprTerm::SegBase(_, coef) => {
                if *coef == 1 {
                    segs += 1;
                } else if *coef != -1 {
                    return false;
                }
            }
            ExprTerm::Wrt(_) => wrts += 1,
            _ => return false,
        }
    }
    segs <= 1 && wrts <= 1
}

/// True when the vector contains a self-relative segment-base term.
#[must_use]
pub fn is_self_relative(e: &[ExprTerm]) -> bool {
    e.iter()
        .any(|t| matches!(t, ExprTerm::SegBase(_, -1)))
}

/// The constant part of a relocatable vector.
#[must_use]
pub fn reloc_value(e: &[ExprTerm]) -> i64 {
    e.iter()
        .map(|t| match t {
            ExprTerm::Simple(v) => *v,
            _ => 0,
        })
        .sum()
}

/// The segment of a relocatable vector, if any base segment is present.
#[must_use]
pub fn reloc_seg(e: &[ExprTerm]) -> Option<Segment> {
    e.iter().find_map(|t| match t {
        ExprTerm::SegBase(seg, 1) => Some(*seg),
        _ => None,
    })
}

/// The `WRT` target of a relocatable vector, if present.
#[must_use]
pub fn reloc_wrt(e: &[ExprTerm]) -> Option<Segment> {
    e.iter().find_map(|t| match t {
        ExprTerm::Wrt(seg) => Some(*seg),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_predicates() {
        assert!(is_simple(&[ExprTerm::Simple(5)]));
        assert!(!is_simple(&[ExprTerm::Simple(5), ExprTerm::Wrt(2)]));
        assert!(is_just_unknown(&[ExprTerm::Unknown]));
        assert!(!is_just_unknown(&[ExprTerm::Simple(0)]));
    }

    #[test]
    fn reloc_shapes() {
        let label = [ExprTerm::Simple(0x40), ExprTerm::SegBase(3, 1)];
        assert!(is_reloc(&label));
        assert_eq!(reloc_value(&label), 0x40);
        assert_eq!(reloc_seg(&label), Some(3));
        assert_eq!(reloc_wrt(&label), None);

        let self_rel = [
            ExprTerm::Simple(8),
            ExprTerm::SegBase(1, 1),
            ExprTerm::SegBase(0, -1),
        ];
        assert!(is_reloc(&self_rel));
        assert!(is_self_relative(&self_rel));

        let with_reg = [ExprTerm::Reg(Register::Eax, 1)];
        assert!(!is_reloc(&with_reg));
    }

    #[test]
    fn double_segment_is_not_reloc() {
        let e = [ExprTerm::SegBase(1, 1), ExprTerm::SegBase(2, 1)];
        assert!(!is_reloc(&e));
    }
}
