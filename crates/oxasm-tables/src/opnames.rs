//! Operand field names: the `OPERANDS` column vocabulary.
//!
//! Each comma-separated operand is a base name plus `|`-separated
//! modifiers; both resolve to the shared [`OpFlags`]/[`DecoFlags`]
//! vocabulary so the emitted templates match what the parser produces.

use oxasm::flags::{DecoFlags, OpFlags};

/// Resolve one operand field name into its flag masks.
pub fn operand_flags(name: &str) -> Option<(OpFlags, DecoFlags)> {
    let mut parts = name.split('|');
    let base = parts.next()?;
    let mut ty = base_flags(base)?;
    let mut deco = DecoFlags::NONE;

    for modifier in parts {
        match modifier {
            "near" => ty |= OpFlags::NEAR,
            "far" => ty |= OpFlags::FAR,
            "short" => ty |= OpFlags::SHORT,
            "to" => ty |= OpFlags::TO,
            "colon" => ty |= OpFlags::COLON,
            "strict" => ty |= OpFlags::STRICT,
            "mask" => deco |= DecoFlags::OPMASK_MASK,
            "z" => deco |= DecoFlags::Z,
            "b16" => deco |= DecoFlags::BRDCAST_MASK | DecoFlags::brnum(1),
            "b32" => deco |= DecoFlags::BRDCAST_MASK | DecoFlags::brnum(2),
            "b64" => deco |= DecoFlags::BRDCAST_MASK | DecoFlags::brnum(3),
            "er" => deco |= DecoFlags::ER,
            "sae" => deco |= DecoFlags::SAE,
            _ => return None,
        }
    }
    Some((ty, deco))
}

fn base_flags(base: &str) -> Option<OpFlags> {
    use OpFlags as F;
    Some(match base {
        "void" | "ignore" => F::NONE,

        // Immediates.
        "imm" => F::IMMEDIATE,
        "imm8" => F::IMMEDIATE | F::BITS8,
        "imm16" => F::IMMEDIATE | F::BITS16,
        "imm32" => F::IMMEDIATE | F::BITS32,
        "imm64" => F::IMMEDIATE | F::BITS64,
        "unity" => F::IMMEDIATE | F::UNITY,
        "sbyteword" => F::IMMEDIATE | F::BITS16 | F::SBYTEWORD,
        "sbytedword" => F::IMMEDIATE | F::BITS32 | F::SBYTEDWORD,
        "udword" => F::IMMEDIATE | F::BITS64 | F::UDWORD,
        "sdword" => F::IMMEDIATE | F::BITS64 | F::SDWORD,

        // General-purpose registers and their r/m unions.
        "reg8" => F::REG_GPR | F::BITS8,
        "reg16" => F::REG_GPR | F::BITS16,
        "reg32" => F::REG_GPR | F::BITS32,
        "reg64" => F::REG_GPR | F::BITS64,
        "rm8" => F::REG_GPR | F::MEMORY_ANY | F::BITS8,
        "rm16" => F::REG_GPR | F::MEMORY_ANY | F::BITS16,
        "rm32" => F::REG_GPR | F::MEMORY_ANY | F::BITS32,
        "rm64" => F::REG_GPR | F::MEMORY_ANY | F::BITS64,

        // Specific registers.
        "reg_al" => F::REG_GPR | F::BITS8 | F::REG_ACCUM,
        "reg_ax" => F::REG_GPR | F::BITS16 | F::REG_ACCUM,
        "reg_eax" => F::REG_GPR | F::BITS32 | F::REG_ACCUM,
        "reg_rax" => F::REG_GPR | F::BITS64 | F::REG_ACCUM,
        "reg_cl" => F::REG_GPR | F::BITS8 | F::REG_COUNT,
        "reg_cx" => F::REG_GPR | F::BITS16 | F::REG_COUNT,
        "reg_ecx" => F::REG_GPR | F::BITS32 | F::REG_COUNT,
        "reg_rcx" => F::REG_GPR | F::BITS64 | F::REG_COUNT,
        "reg_dx" => F::REG_GPR | F::BITS16 | F::REG_DX,

        // Segment, control, debug, test registers.
        "reg_sreg" => F::REG_SREG | F::BITS16,
        "reg_cs" | "reg_ds" | "reg_es" | "reg_fs" | "reg_gs" | "reg_ss" => {
            F::REG_SREG | F::BITS16
        }
        "reg_creg" => F::REG_CREG,
        "reg_dreg" => F::REG_DREG,
        "reg_treg" => F::REG_TREG,

        // x87, MMX.
        "fpureg" => F::REG_FPUREG,
        "fpu0" => F::REG_FPUREG | F::REG_FIRST,
        "mmxreg" => F::REG_MMXREG | F::BITS64,
        "mmxrm" | "mmxrm64" => F::REG_MMXREG | F::MEMORY_ANY | F::BITS64,

        // SSE/AVX/AVX-512 vector registers and r/m unions.
        "xmmreg" => F::REG_XMMREG | F::BITS128,
        "xmm0" => F::REG_XMMREG | F::BITS128 | F::REG_FIRST,
        "xmmrm" => F::REG_XMMREG | F::MEMORY_ANY | F::BITS128,
        "xmmrm8" => F::REG_XMMREG | F::MEMORY_ANY | F::BITS8,
        "xmmrm16" => F::REG_XMMREG | F::MEMORY_ANY | F::BITS16,
        "xmmrm32" => F::REG_XMMREG | F::MEMORY_ANY | F::BITS32,
        "xmmrm64" => F::REG_XMMREG | F::MEMORY_ANY | F::BITS64,
        "xmmrm128" => F::REG_XMMREG | F::MEMORY_ANY | F::BITS128,
        "ymmreg" => F::REG_YMMREG | F::BITS256,
        "ymmrm" | "ymmrm256" => F::REG_YMMREG | F::MEMORY_ANY | F::BITS256,
        "zmmreg" => F::REG_ZMMREG | F::BITS512,
        "zmmrm" | "zmmrm512" => F::REG_ZMMREG | F::MEMORY_ANY | F::BITS512,

        // Opmask, bound, tile registers.
        "kreg" => F::REG_OPMASK,
        "krm8" => F::REG_OPMASK | F::MEMORY_ANY | F::BITS8,
        "krm16" => F::REG_OPMASK | F::MEMORY_ANY | F::BITS16,
        "krm32" => F::REG_OPMASK | F::MEMORY_ANY | F::BITS32,
        "krm64" => F::REG_OPMASK | F::MEMORY_ANY | F::BITS64,
        "bndreg" => F::REG_BNDREG,
        "tmmreg" => F::REG_TMMREG,

        // Memory.
        "mem" | "memory" => F::MEMORY_ANY,
        "mem8" => F::MEMORY_ANY | F::BITS8,
        "mem16" => F::MEMORY_ANY | F::BITS16,
        "mem32" => F::MEMORY_ANY | F::BITS32,
        "mem64" => F::MEMORY_ANY | F::BITS64,
        "mem80" => F::MEMORY_ANY | F::BITS80,
        "mem128" => F::MEMORY_ANY | F::BITS128,
        "mem256" => F::MEMORY_ANY | F::BITS256,
        "mem512" => F::MEMORY_ANY | F::BITS512,
        "mem_offs" | "memory_offs" => F::MEM_OFFS,

        // VSIB memory.
        "xmem32" => F::XMEM | F::BITS32,
        "xmem64" => F::XMEM | F::BITS64,
        "ymem32" => F::YMEM | F::BITS32,
        "ymem64" => F::YMEM | F::BITS64,
        "zmem32" => F::ZMEM | F::BITS32,
        "zmem64" => F::ZMEM | F::BITS64,

        _ => return None,
    })
}
