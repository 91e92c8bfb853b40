//! x86/x86-64 register enumeration.
//!
//! Each register knows its [`OpFlags`] description (class and implied size)
//! and its hardware encoding number.  Discriminants are laid out in blocks
//! of 32 so the register number falls out of the discriminant.

use crate::flags::OpFlags;
use core::fmt;

/// Every register the parser can see in an operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
#[allow(missing_docs)] // the variants are self-describing register names
pub enum Register {
    // -- 8-bit general-purpose (REX-encodable low bytes) --
    Al = 0,
    Cl,
    Dl,
    Bl,
    Spl,
    Bpl,
    Sil,
    Dil,
    R8b,
    R9b,
    R10b,
    R11b,
    R12b,
    R13b,
    R14b,
    R15b,
    // -- 8-bit high-byte registers (no REX) --
    Ah = 16,
    Ch,
    Dh,
    Bh,
    // -- 16-bit general-purpose --
    Ax = 32,
    Cx,
    Dx,
    Bx,
    Sp,
    Bp,
    Si,
    Di,
    R8w,
    R9w,
    R10w,
    R11w,
    R12w,
    R13w,
    R14w,
    R15w,
    // -- 32-bit general-purpose --
    Eax = 64,
    Ecx,
    Edx,
    Ebx,
    Esp,
    Ebp,
    Esi,
    Edi,
    R8d,
    R9d,
    R10d,
    R11d,
    R12d,
    R13d,
    R14d,
    R15d,
    // -- 64-bit general-purpose --
    Rax = 96,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    // -- Segment registers --
    Es = 128,
    Cs,
    Ss,
    Ds,
    Fs,
    Gs,
    // -- x87 stack registers --
    St0 = 136,
    St1,
    St2,
    St3,
    St4,
    St5,
    St6,
    St7,
    // -- MMX registers --
    Mm0 = 144,
    Mm1,
    Mm2,
    Mm3,
    Mm4,
    Mm5,
    Mm6,
    Mm7,
    // -- SSE registers (XMM16–31 are EVEX-only) --
    Xmm0 = 160,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
    Xmm16,
    Xmm17,
    Xmm18,
    Xmm19,
    Xmm20,
    Xmm21,
    Xmm22,
    Xmm23,
    Xmm24,
    Xmm25,
    Xmm26,
    Xmm27,
    Xmm28,
    Xmm29,
    Xmm30,
    Xmm31,
    // -- AVX registers --
    Ymm0 = 192,
    Ymm1,
    Ymm2,
    Ymm3,
    Ymm4,
    Ymm5,
    Ymm6,
    Ymm7,
    Ymm8,
    Ymm9,
    Ymm10,
    Ymm11,
    Ymm12,
    Ymm13,
    Ymm14,
    Ymm15,
    Ymm16,
    Ymm17,
    Ymm18,
    Ymm19,
    Ymm20,
    Ymm21,
    Ymm22,
    Ymm23,
    Ymm24,
    Ymm25,
    Ymm26,
    Ymm27,
    Ymm28,
    Ymm29,
    Ymm30,
    Ymm31,
    // -- AVX-512 registers --
    Zmm0 = 224,
    Zmm1,
    Zmm2,
    Zmm3,
    Zmm4,
    Zmm5,
    Zmm6,
    Zmm7,
    Zmm8,
    Zmm9,
    Zmm10,
    Zmm11,
    Zmm12,
    Zmm13,
    Zmm14,
    Zmm15,
    Zmm16,
    Zmm17,
    Zmm18,
    Zmm19,
    Zmm20,
    Zmm21,
    Zmm22,
    Zmm23,
    Zmm24,
    Zmm25,
    Zmm26,
    Zmm27,
    Zmm28,
    Zmm29,
    Zmm30,
    Zmm31,
    // -- Opmask registers --
    K0 = 256,
    K1,
    K2,
    K3,
    K4,
    K5,
    K6,
    K7,
    // -- MPX bound registers --
    Bnd0 = 264,
    Bnd1,
    Bnd2,
    Bnd3,
    // -- Control registers --
    Cr0 = 272,
    Cr1,
    Cr2,
    Cr3,
    Cr4,
    Cr5,
    Cr6,
    Cr7,
    Cr8,
    // -- Debug registers --
    Dr0 = 288,
    Dr1,
    Dr2,
    Dr3,
    Dr4,
    Dr5,
    Dr6,
    Dr7,
    // -- Test registers (obsolete, still parseable) --
    Tr0 = 296,
    Tr1,
    Tr2,
    Tr3,
    Tr4,
    Tr5,
    Tr6,
    Tr7,
    // -- AMX tile registers --
    Tmm0 = 304,
    Tmm1,
    Tmm2,
    Tmm3,
    Tmm4,
    Tmm5,
    Tmm6,
    Tmm7,
}

const GPR8_NAMES: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];
const GPR8H_NAMES: [&str; 4] = ["ah", "ch", "dh", "bh"];
const GPR16_NAMES: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w",
    "r14w", "r15w",
];
const GPR32_NAMES: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d",
    "r13d", "r14d", "r15d",
];
const GPR64_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
const SREG_NAMES: [&str; 6] = ["es", "cs", "ss", "ds", "fs", "gs"];

impl Register {
    /// The hardware register number (what goes into ModR/M / REX / EVEX).
    #[must_use]
    pub fn number(self) -> u8 {
        let d = self as u16;
        match d {
            16..=19 => (d - 16 + 4) as u8, // AH..BH share numbers with SPL..DIL
            _ => (d & 31) as u8,
        }
    }

    /// The class-and-size description of this register.
    #[must_use]
    pub fn flags(self) -> OpFlags {
        use Register::*;
        let class_size = match self as u16 {
            0..=31 => OpFlags::REG_GPR | OpFlags::BITS8,
            32..=63 => OpFlags::REG_GPR | OpFlags::BITS16,
            64..=95 => OpFlags::REG_GPR | OpFlags::BITS32,
            96..=127 => OpFlags::REG_GPR | OpFlags::BITS64,
            128..=135 => OpFlags::REG_SREG | OpFlags::BITS16,
            136..=143 => OpFlags::REG_FPUREG | OpFlags::BITS80,
            144..=159 => OpFlags::REG_MMXREG | OpFlags::BITS64,
            160..=191 => OpFlags::REG_XMMREG | OpFlags::BITS128,
            192..=223 => OpFlags::REG_YMMREG | OpFlags::BITS256,
            224..=255 => OpFlags::REG_ZMMREG | OpFlags::BITS512,
            // Opmask registers are size-polymorphic; no implied size bits.
            256..=263 => OpFlags::REG_OPMASK,
            264..=271 => OpFlags::REG_BNDREG | OpFlags::BITS128,
            272..=287 => OpFlags::REG_CREG,
            288..=295 => OpFlags::REG_DREG,
            296..=303 => OpFlags::REG_TREG,
            _ => OpFlags::REG_TMMREG,
        };
        let special = match self {
            Al | Ax | Eax | Rax => OpFlags::REG_ACCUM,
            Cl | Cx | Ecx | Rcx => OpFlags::REG_COUNT,
            Dx => OpFlags::REG_DX,
            St0 | Xmm0 => OpFlags::REG_FIRST,
            _ => OpFlags::NONE,
        };
        class_size | special
    }

    /// True for general-purpose registers of any width.
    #[inline]
    #[must_use]
    pub fn is_gpr(self) -> bool {
        (self as u16) < 128
    }

    /// True for segment registers.
    #[inline]
    #[must_use]
    pub fn is_sreg(self) -> bool {
        matches!(
            self,
            Register::Es | Register::Cs | Register::Ss | Register::Ds | Register::Fs | Register::Gs
        )
    }

    /// True for FS and GS, the flat-model segment overrides.
    #[inline]
    #[must_use]
    pub fn is_fsgs(self) -> bool {
        matches!(self, Register::Fs | Register::Gs)
    }

    /// True for opmask registers K0–K7.
    #[inline]
    #[must_use]
    pub fn is_opmask(self) -> bool {
        matches!(self as u16, 256..=263)
    }

    /// Look up a register by its lower-case name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Register> {
        fn scan(names: &[&str], base: u16, name: &str) -> Option<Register> {
            names
                .iter()
                .position(|n| *n == name)
                .and_then(|i| Register::from_discriminant(base + i as u16))
        }

        fn numbered(prefix: &str, count: u16, base: u16, name: &str) -> Option<Register> {
            let rest = name.strip_prefix(prefix)?;
            let n: u16 = rest.parse().ok()?;
            if rest.len() > 2 || (rest.len() == 2 && rest.starts_with('0')) || n >= count {
                return None;
            }
            Register::from_discriminant(base + n)
        }

        scan(&GPR8_NAMES, 0, name)
            .or_else(|| scan(&GPR8H_NAMES, 16, name))
            .or_else(|| scan(&GPR16_NAMES, 32, name))
            .or_else(|| scan(&GPR32_NAMES, 64, name))
            .or_else(|| scan(&GPR64_NAMES, 96, name))
            .or_else(|| scan(&SREG_NAMES, 128, name))
            .or_else(|| numbered("st", 8, 136, name))
            .or_else(|| numbered("mm", 8, 144, name))
            .or_else(|| numbered("xmm", 32, 160, name))
            .or_else(|| numbered("ymm", 32, 192, name))
            .or_else(|| numbered("zmm", 32, 224, name))
            .or_else(|| numbered("k", 8, 256, name))
            .or_else(|| numbered("bnd", 4, 264, name))
            .or_else(|| numbered("cr", 9, 272, name))
            .or_else(|| numbered("dr", 8, 288, name))
            .or_else(|| numbered("tr", 8, 296, name))
            .or_else(|| numbered("tmm", 8, 304, name))
    }

    fn from_discriminant(d: u16) -> Option<Register> {
        ALL_REGISTERS
            .iter()
            .copied()
            .find(|r| *r as u16 == d)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = *self as u16;
        match d {
            0..=15 => write!(f, "{}", GPR8_NAMES[d as usize]),
            16..=19 => write!(f, "{}", GPR8H_NAMES[(d - 16) as usize]),
            32..=47 => write!(f, "{}", GPR16_NAMES[(d - 32) as usize]),
            64..=79 => write!(f, "{}", GPR32_NAMES[(d - 64) as usize]),
            96..=111 => write!(f, "{}", GPR64_NAMES[(d - 96) as usize]),
            128..=133 => write!(f, "{}", SREG_NAMES[(d - 128) as usize]),
            136..=143 => write!(f, "st{}", d - 136),
            144..=151 => write!(f, "mm{}", d - 144),
            160..=191 => write!(f, "xmm{}", d - 160),
            192..=223 => write!(f, "ymm{}", d - 192),
            224..=255 => write!(f, "zmm{}", d - 224),
            256..=263 => write!(f, "k{}", d - 256),
            264..=267 => write!(f, "bnd{}", d - 264),
            272..=280 => write!(f, "cr{}", d - 272),
            288..=295 => write!(f, "dr{}", d - 288),
            296..=303 => write!(f, "tr{}", d - 296),
            _ => write!(f, "tmm{}", d - 304),
        }
    }
}

/// Every register, in discriminant order.
pub const ALL_REGISTERS: [Register; 231] = {
    use Register::*;
    [
        Al, Cl, Dl, Bl, Spl, Bpl, Sil, Dil, R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b, Ah, Ch,
        Dh, Bh, Ax, Cx, Dx, Bx, Sp, Bp, Si, Di, R8w, R9w, R10w, R11w, R12w, R13w, R14w, R15w, Eax,
        Ecx, Edx, Ebx, Esp, Ebp, Esi, Edi, R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d, Rax, Rcx,
        Rdx, Rbx, Rsp, Rbp, Rsi, Rdi, R8, R9, R10, R11, R12, R13, R14, R15, Es, Cs, Ss, Ds, Fs,
        Gs, St0, St1, St2, St3, St4, St5, St6, St7, Mm0, Mm1, Mm2, Mm3, Mm4, Mm5, Mm6, Mm7, Xmm0,
        Xmm1, Xmm2, Xmm3, Xmm4, Xmm5, Xmm6, Xmm7, Xmm8, Xmm9, Xmm10, Xmm11, Xmm12, Xmm13, Xmm14,
        Xmm15, Xmm16, Xmm17, Xmm18, Xmm19, Xmm20, Xmm21, Xmm22, Xmm23, Xmm24, Xmm25, Xmm26, Xmm27,
        Xmm28, Xmm29, Xmm30, Xmm31, Ymm0, Ymm1, Ymm2, Ymm3, Ymm4, Ymm5, Ymm6, Ymm7, Ymm8, Ymm9,
        Ymm10, Ymm11, Ymm12, Ymm13, Ymm14, Ymm15, Ymm16, Ymm17, Ymm18, Ymm19, Ymm20, Ymm21, Ymm22,
        Ymm23, Ymm24, Ymm25, Ymm26, Ymm27, Ymm28, Ymm29, Ymm30, Ymm31, Zmm0, Zmm1, Zmm2, Zmm3,
        Zmm4, Zmm5, Zmm6, Zmm7, Zmm8, Zmm9, Zmm10, Zmm11, Zmm12, Zmm13, Zmm14, Zmm15, Zmm16,
        Zmm17, Zmm18, Zmm19, Zmm20, Zmm21, Zmm22, Zmm23, Zmm24, Zmm25, Zmm26, Zmm27, Zmm28, Zmm29,
        Zmm30, Zmm31, K0, K1, K2, K3, K4, K5, K6, K7, Bnd0, Bnd1, Bnd2, Bnd3, Cr0, Cr1, Cr2, Cr3,
        Cr4, Cr5, Cr6, Cr7, Cr8, Dr0, Dr1, Dr2, Dr3, Dr4, Dr5, Dr6, Dr7, Tr0, Tr1, Tr2, Tr3, Tr4,
        Tr5, Tr6, Tr7, Tmm0, Tmm1, Tmm2, Tmm3, Tmm4, Tmm5, Tmm6, Tmm7,
    ]
};
