//! Effective-address resolution.
//!
//! [`parse_mref`] folds an evaluated expression vector into the base /
//! index / scale / displacement slots of an operand; [`mref_set_optype`]
//! then derives the memory role bits (plain, absolute offset, RIP-relative,
//! vector-indexed).

use crate::expr::{ExprTerm, Segment};
use crate::flags::{EaFlags, OpExtra, OpFlags};
use crate::insn::Operand;
use core::fmt;

/// Why an expression vector cannot be an effective address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrefError {
    /// Two registers were forced into the index slot.
    TwoIndexRegisters,
    /// A non-GPR register can only be an index.
    ImpossibleRegister,
    /// More registers than base and index slots.
    TooManyRegisters,
    /// More than one segment-base term.
    MultipleBaseSegments,
    /// A segment base scaled by anything but 1 (or −1 self-reference).
    ImpossibleSegMultiplier,
    /// A term the address forms cannot express.
    BadSubexpression,
}

impl fmt::Display for MrefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MrefError::TwoIndexRegisters => "invalid effective address: two index registers",
            MrefError::ImpossibleRegister => "invalid effective address: impossible register",
            MrefError::TooManyRegisters => "invalid effective address: too many registers",
            MrefError::MultipleBaseSegments => {
                "invalid effective address: multiple base segments"
            }
            MrefError::ImpossibleSegMultiplier => {
                "invalid effective address: impossible segment base multiplier"
            }
            MrefError::BadSubexpression => {
                "invalid effective address: bad subexpression type"
            }
        };
        write!(f, "{}", msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MrefError {}

/// Fold an expression vector into the operand's address slots.
///
/// A GPR with coefficient 1 takes the base slot while it is free; every
/// other register lands in the index slot with its coefficient as scale.
/// On error the operand is left unchanged apart from flag bits already
/// accumulated.
pub fn parse_mref(
    op: &mut Operand,
    e: &[ExprTerm],
    location_seg: Segment,
) -> Result<(), MrefError> {
    let mut b = op.basereg;
    let mut i = op.indexreg;
    let mut s = op.scale;
    let mut o = op.offset;

    for term in e {
        match *term {
            ExprTerm::Reg(r, coef) => {
                let is_gpr = r.is_gpr();
                if is_gpr && coef == 1 && b.is_none() {
                    b = Some(r);
                } else if i.is_none() {
                    i = Some(r);
                    s = coef;
                } else if b.is_none() {
                    return Err(MrefError::TwoIndexRegisters);
                } else if !is_gpr {
                    return Err(MrefError::ImpossibleRegister);
                } else {
                    return Err(MrefError::TooManyRegisters);
                }
            }
            ExprTerm::Unknown => {
                op.extra |= OpExtra::UNKNOWN;
            }
            ExprTerm::Simple(v) => {
                o = o.wrapping_add(v);
            }
            ExprTerm::Wrt(seg) => {
                op.wrt = Some(seg);
            }
            ExprTerm::SegBase(seg, coef) => {
                if coef == 1 {
                    if op.segment.is_some() {
                        return Err(MrefError::MultipleBaseSegments);
                    }
                    op.segment = Some(seg);
                } else if coef == -1
                    && seg == location_seg
                    && !op.extra.intersects(OpExtra::RELATIVE)
                {
                    op.extra |= OpExtra::RELATIVE;
                } else {
                    return Err(MrefError::ImpossibleSegMultiplier);
                }
            }
            ExprTerm::RdSae(_) => return Err(MrefError::BadSubexpression),
        }
    }

    op.basereg = b;
    op.indexreg = i;
    op.scale = s;
    op.offset = o;
    Ok(())
}

/// Attach the memory-role bits once the address slots are final.
///
/// A register-free reference is a bare offset: RIP-relative in 64-bit mode
/// when `DEFAULT REL` (outside FS/GS overrides) or an explicit `REL` asks
/// for it, absolute otherwise.  A vector index upgrades the reference to
/// the matching VSIB role.
pub fn mref_set_optype(op: &mut Operand, bits: u8, globalrel: bool) {
    op.ty |= OpFlags::MEMORY_ANY;

    if op.basereg.is_none() && (op.indexreg.is_none() || op.scale == 0) {
        let is_rel = bits == 64
            && !op.eaflags.intersects(EaFlags::ABS)
            && ((globalrel && !op.eaflags.intersects(EaFlags::FSGS))
                || op.eaflags.intersects(EaFlags::REL));

        if is_rel {
            op.ty |= OpFlags::IP_REL;
            op.extra |= OpExtra::RELATIVE;
        } else {
            op.ty |= OpFlags::MEM_OFFS;
        }
    }

    if let Some(index) = op.indexreg {
        let iclass = index.flags();
        if OpFlags::is_class(OpFlags::REG_XMMREG, iclass) {
            op.ty |= OpFlags::XMEM;
        } else if OpFlags::is_class(OpFlags::REG_YMMREG, iclass) {
            op.ty |= OpFlags::YMEM;
        } else if OpFlags::is_class(OpFlags::REG_ZMMREG, iclass) {
            op.ty |= OpFlags::ZMEM;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::Register;

    fn mref(e: &[ExprTerm]) -> Result<Operand, MrefError> {
        let mut op = Operand::default();
        parse_mref(&mut op, e, 0).map(|()| op)
    }

    #[test]
    fn base_index_scale_disp() {
        let op = mref(&[
            ExprTerm::Reg(Register::Ebx, 1),
            ExprTerm::Reg(Register::Ecx, 4),
            ExprTerm::Simple(0x10),
        ])
        .unwrap();
        assert_eq!(op.basereg, Some(Register::Ebx));
        assert_eq!(op.indexreg, Some(Register::Ecx));
        assert_eq!(op.scale, 4);
        assert_eq!(op.offset, 0x10);
    }

    #[test]
    fn scaled_gpr_before_plain_gpr() {
        // [4*ecx+ebx]: ecx cannot be base, so it takes the index slot
        // and ebx still lands in base.
        let op = mref(&[
            ExprTerm::Reg(Register::Ecx, 4),
            ExprTerm::Reg(Register::Ebx, 1),
        ])
        .unwrap();
        assert_eq!(op.basereg, Some(Register::Ebx));
        assert_eq!(op.indexreg, Some(Register::Ecx));
        assert_eq!(op.scale, 4);
    }

    #[test]
    fn three_registers_rejected() {
        let err = mref(&[
            ExprTerm::Reg(Register::Rax, 1),
            ExprTerm::Reg(Register::Rbx, 1),
            ExprTerm::Reg(Register::Rcx, 1),
        ])
        .unwrap_err();
        assert_eq!(err, MrefError::TooManyRegisters);
    }

    #[test]
    fn two_scaled_registers_rejected() {
        let err = mref(&[
            ExprTerm::Reg(Register::Rax, 2),
            ExprTerm::Reg(Register::Rbx, 2),
        ])
        .unwrap_err();
        assert_eq!(err, MrefError::TwoIndexRegisters);
    }

    #[test]
    fn non_gpr_takes_index_slot() {
        let op = mref(&[
            ExprTerm::Reg(Register::Xmm3, 1),
            ExprTerm::Reg(Register::Rax, 1),
        ])
        .unwrap();
        assert_eq!(op.basereg, Some(Register::Rax));
        assert_eq!(op.indexreg, Some(Register::Xmm3));
        assert_eq!(op.scale, 1);
    }

    #[test]
    fn segment_bases() {
        let op = mref(&[ExprTerm::Simple(4), ExprTerm::SegBase(7, 1)]).unwrap();
        assert_eq!(op.segment, Some(7));

        let err = mref(&[ExprTerm::SegBase(7, 1), ExprTerm::SegBase(8, 1)]).unwrap_err();
        assert_eq!(err, MrefError::MultipleBaseSegments);

        let err = mref(&[ExprTerm::SegBase(7, 2)]).unwrap_err();
        assert_eq!(err, MrefError::ImpossibleSegMultiplier);
    }

    #[test]
    fn self_relative_marker() {
        let op = mref(&[ExprTerm::Simple(16), ExprTerm::SegBase(0, -1)]).unwrap();
        assert!(op.extra.intersects(OpExtra::RELATIVE));
    }

    #[test]
    fn optype_mem_offs_vs_ip_rel() {
        let mut op = Operand::default();
        mref_set_optype(&mut op, 32, false);
        assert!(OpFlags::is_class(OpFlags::MEM_OFFS, op.ty));

        let mut op = Operand::default();
        op.eaflags |= EaFlags::REL;
        mref_set_optype(&mut op, 64, false);
        assert!(OpFlags::is_class(OpFlags::IP_REL, op.ty));
        assert!(op.extra.intersects(OpExtra::RELATIVE));

        // DEFAULT REL is overridden by an FS/GS segment override.
        let mut op = Operand::default();
        op.eaflags |= EaFlags::FSGS;
        mref_set_optype(&mut op, 64, true);
        assert!(OpFlags::is_class(OpFlags::MEM_OFFS, op.ty));
    }

    #[test]
    fn optype_vector_index() {
        let mut op = Operand::default();
        op.basereg = Some(Register::Rax);
        op.indexreg = Some(Register::Zmm4);
        op.scale = 1;
        mref_set_optype(&mut op, 64, false);
        assert!(OpFlags::is_class(OpFlags::ZMEM, op.ty));
        assert!(!OpFlags::is_class(OpFlags::MEM_OFFS, op.ty));
    }
}
