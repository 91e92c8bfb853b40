//! The instruction record — the parser's output.
//!
//! A record is zeroed at parse start, filled in during parsing, and handed
//! to the assembler backend.  Extended operands (the `DB` family) live in a
//! tree owned by the record; dropping the record releases everything.

use crate::expr::{RoundMode, Segment};
use crate::flags::{DecoFlags, EaFlags, OpExtra, OpFlags};
use crate::expr::EaHint;
use crate::reg::Register;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Maximum number of operands an instruction can carry.
pub const MAX_OPERANDS: usize = 5;

/// Instruction opcode as far as the parser is concerned.
///
/// The parser needs structural knowledge of the data-declaration family,
/// `INCBIN`, `EQU` and the far-jump mnemonics; every table-defined mnemonic
/// is carried opaquely by its index in the generated template tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Opcode {
    /// No opcode: blank line, lone label, or catastrophic parse failure.
    None,
    Db,
    Dw,
    Dd,
    Dq,
    Dt,
    Do,
    Dy,
    Dz,
    Resb,
    Resw,
    Resd,
    Resq,
    Rest,
    Reso,
    Resy,
    Resz,
    Incbin,
    Equ,
    Jmp,
    Call,
    /// A mnemonic defined by the instruction tables, by index.
    Table(u16),
}

impl Opcode {
    /// True for the `Dx` and `RESx` data-declaration families.
    #[must_use]
    pub fn is_db_family(self) -> bool {
        self.db_bytes().is_some()
    }

    /// Element size in bytes for data-declaration opcodes.
    #[must_use]
    pub fn db_bytes(self) -> Option<u32> {
        match self {
            Opcode::Db | Opcode::Resb => Some(1),
            Opcode::Dw | Opcode::Resw => Some(2),
            Opcode::Dd | Opcode::Resd => Some(4),
            Opcode::Dq | Opcode::Resq => Some(8),
            Opcode::Dt | Opcode::Rest => Some(10),
            Opcode::Do | Opcode::Reso => Some(16),
            Opcode::Dy | Opcode::Resy => Some(32),
            Opcode::Dz | Opcode::Resz => Some(64),
            _ => None,
        }
    }
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::None
    }
}

/// An instruction prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum PrefixKind {
    Lock,
    Rep,
    Repe,
    Repne,
    Wait,
    A16,
    A32,
    A64,
    O16,
    O32,
    O64,
    Xacquire,
    Xrelease,
    Bnd,
    NoBnd,
    /// `{vex}` — prefer a VEX encoding.
    Vex,
    /// `{vex3}` — force the three-byte VEX form.
    Vex3,
    /// `{evex}` — prefer an EVEX encoding.
    Evex,
    /// `{rex}` — force a classic REX prefix.
    Rex,
    /// `{rex2}` — force a REX2 prefix.
    Rex2,
    /// A segment-override prefix.
    Seg(Register),
}

impl PrefixKind {
    /// The slot this prefix occupies in the record.
    #[must_use]
    pub fn slot(self) -> PrefixSlot {
        match self {
            PrefixKind::Wait => PrefixSlot::Wait,
            PrefixKind::Lock
            | PrefixKind::Rep
            | PrefixKind::Repe
            | PrefixKind::Repne
            | PrefixKind::Xacquire
            | PrefixKind::Xrelease
            | PrefixKind::Bnd
            | PrefixKind::NoBnd => PrefixSlot::LockRep,
            PrefixKind::Seg(_) => PrefixSlot::Seg,
            PrefixKind::O16 | PrefixKind::O32 | PrefixKind::O64 => PrefixSlot::OSize,
            PrefixKind::A16 | PrefixKind::A32 | PrefixKind::A64 => PrefixSlot::ASize,
            PrefixKind::Vex | PrefixKind::Vex3 | PrefixKind::Evex => PrefixSlot::VexClass,
            PrefixKind::Rex | PrefixKind::Rex2 => PrefixSlot::Rex,
        }
    }
}

/// Prefix slots: at most one prefix of each kind per instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum PrefixSlot {
    Wait = 0,
    LockRep,
    Seg,
    OSize,
    ASize,
    VexClass,
    Rex,
}

impl PrefixSlot {
    /// Number of slots.
    pub const COUNT: usize = 7;
}

/// Outcome of installing a prefix into its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutPrefix {
    /// The slot was empty.
    Stored,
    /// The identical prefix was already present.
    Redundant,
    /// A different prefix of the same slot was already present.
    Conflict,
}

/// One parsed operand.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Operand {
    /// Size/role/class/modifier description.
    pub ty: OpFlags,
    /// Evaluation-state flags (forward reference, unknown, self-relative).
    pub extra: OpExtra,
    /// Base register of a memory reference, or the register itself.
    pub basereg: Option<Register>,
    /// Index register of a memory reference.
    pub indexreg: Option<Register>,
    /// Index scale factor.
    pub scale: i64,
    /// Displacement or immediate value.
    pub offset: i64,
    /// Relocation segment.
    pub segment: Option<Segment>,
    /// `WRT` segment.
    pub wrt: Option<Segment>,
    /// Displacement size override in bits (0 = none).
    pub disp_size: u8,
    /// Effective-address flags.
    pub eaflags: EaFlags,
    /// Decorator flags (opmask, zeroing, broadcast, SAE/ER).
    pub decoflags: DecoFlags,
    /// Effective-address shape hint register.
    pub hintbase: Option<Register>,
    /// Effective-address shape hint kind.
    pub hint: EaHint,
    /// Auxiliary payload of a braced-constant immediate.
    pub iflag: u32,
}

/// Inline buffer for a converted floating-point constant (up to 16 bytes).
#[derive(Clone, Copy)]
pub struct FloatBytes {
    buf: [u8; 16],
    len: u8,
}

impl FloatBytes {
    /// Wrap up to 16 bytes.  Longer input is truncated.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        let len = bytes.len().min(16);
        let mut buf = [0u8; 16];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            buf,
            len: len as u8,
        }
    }

    /// The converted bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True when empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for FloatBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for FloatBytes {}

impl fmt::Debug for FloatBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice().iter()).finish()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FloatBytes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.as_slice())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for FloatBytes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v: Vec<u8> = Vec::deserialize(deserializer)?;
        if v.len() > 16 {
            return Err(serde::de::Error::custom("float constant exceeds 16 bytes"));
        }
        Ok(FloatBytes::new(&v))
    }
}

/// One extended operand of a data-declaration directive.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtOp {
    /// Replication count; 0 is a valid no-op and the node is discarded.
    pub dup: u64,
    /// Element size in bytes.
    pub elem: u32,
    /// The payload.
    pub kind: ExtOpKind,
}

/// Extended-operand payloads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtOpKind {
    /// Placeholder for a discarded or not-yet-classified node.
    Nothing,
    /// A numeric (possibly relocatable) value.
    Number {
        /// Constant part.
        offset: i64,
        /// Relocation segment.
        segment: Option<Segment>,
        /// `WRT` segment.
        wrt: Option<Segment>,
        /// Self-relative (`foo - $`).
        relative: bool,
    },
    /// A string borrowed from the scanner's line buffer.
    String(Vec<u8>),
    /// A string produced by a transform function; owned by the node.
    OwnedString(Vec<u8>),
    /// A converted floating-point constant.
    Float(FloatBytes),
    /// Reserve `dup` × `elem` bytes without emitting data.
    Reserve,
    /// A replicated sub-expression list (`DUP`).
    SubList(Vec<ExtOp>),
}

impl ExtOp {
    /// A fresh node with the given element size, before classification.
    #[must_use]
    pub fn new(elem: u32) -> Self {
        Self {
            dup: 1,
            elem,
            kind: ExtOpKind::Nothing,
        }
    }
}

/// A parsed source line.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Insn {
    /// Label defined on this line, if any.
    pub label: Option<String>,
    /// The mnemonic; [`Opcode::None`] for blank lines and failures.
    pub opcode: Opcode,
    /// One prefix per slot.
    pub prefixes: [Option<PrefixKind>; PrefixSlot::COUNT],
    /// `TIMES` multiplier (1 when absent).
    pub times: i64,
    /// Number of live entries in `oprs`.
    pub operands: usize,
    /// The operand array.
    pub oprs: [Operand; MAX_OPERANDS],
    /// Extended operands of a data-declaration directive.
    pub eops: Vec<ExtOp>,
    /// EVEX rounding mode attached via an operand-position decorator.
    pub evex_rm: Option<RoundMode>,
    /// Index of the operand carrying broadcast/ER/SAE decorators.
    pub evex_brerop: Option<usize>,
    /// True if any operand involves a forward reference.
    pub forw_ref: bool,
}

impl Default for Insn {
    fn default() -> Self {
        Self {
            label: None,
            opcode: Opcode::None,
            prefixes: [None; PrefixSlot::COUNT],
            times: 1,
            operands: 0,
            oprs: Default::default(),
            eops: Vec::new(),
            evex_rm: None,
            evex_brerop: None,
            forw_ref: false,
        }
    }
}

impl Insn {
    /// Reset the record to its parse-start state.
    pub fn reset(&mut self) {
        *self = Insn::default();
    }

    /// Install a prefix into its slot, reporting collisions.
    pub fn put_prefix(&mut self, prefix: PrefixKind) -> PutPrefix {
        let slot = prefix.slot() as usize;
        let outcome = match self.prefixes[slot] {
            None => PutPrefix::Stored,
            Some(existing) if existing == prefix => PutPrefix::Redundant,
            Some(_) => PutPrefix::Conflict,
        };
        self.prefixes[slot] = Some(prefix);
        outcome
    }

    /// The prefix stored in the given slot.
    #[must_use]
    pub fn prefix(&self, slot: PrefixSlot) -> Option<PrefixKind> {
        self.prefixes[slot as usize]
    }
}
