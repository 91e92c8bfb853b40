//! C-source emitters for the generated tables.
//!
//! Every writer produces one self-contained artifact as a `String`; the
//! binary decides where the bytes go.  All artifacts open with the same
//! do-not-edit banner naming the database they came from.

use crate::dindex::VEX_CLASSES;
use crate::iflags::{flag_words, KNOWN_FLAGS};
use crate::Generator;
use std::fmt::Write;

fn banner(out: &mut String, file: &str, what: &str) {
    let _ = writeln!(out, "/* {} */", what);
    let _ = writeln!(
        out,
        "/* Automatically generated from {} by oxasm-tables; do not edit. */",
        file
    );
    let _ = writeln!(out);
}

/// `-b`: the interned byte-code pool.
pub fn emit_bytecodes(gen: &Generator, file: &str) -> String {
    let mut out = String::new();
    banner(&mut out, file, "Instruction encoding byte-code pool");
    let _ = writeln!(out, "#include \"insns.h\"");
    let _ = writeln!(out);

    let bytes = gen.pool.as_bytes();
    let _ = writeln!(out, "const uint8_t nasm_bytecodes[{}] = {{", bytes.len());
    for chunk in bytes.chunks(12) {
        let row: Vec<String> = chunk.iter().map(|b| format!("0{:03o}", b)).collect();
        let _ = writeln!(out, "    {},", row.join(", "));
    }
    let _ = writeln!(out, "}};");
    out
}

/// One template row.
fn template_row(gen: &Generator, idx: usize) -> String {
    let pat = &gen.patterns[idx];
    let mut opd = Vec::new();
    let mut deco = Vec::new();
    for i in 0..oxasm::insn::MAX_OPERANDS {
        match pat.operands.get(i) {
            Some((ty, dc)) => {
                opd.push(format!("UINT64_C(0x{:012x})", ty.bits()));
                deco.push(format!("0x{:x}", dc.0));
            }
            None => {
                opd.push("0".to_string());
                deco.push("0".to_string());
            }
        }
    }
    let code = match &pat.bytes {
        Some(bytes) => {
            let off = gen
                .pool
                .offset_of(bytes)
                .expect("every compiled program is interned");
            format!("nasm_bytecodes+{}", off)
        }
        None => "NULL".to_string(),
    };
    format!(
        "{{I_{}, {}, {{{}}}, {{{}}}, {}, {}}}",
        pat.mnemonic,
        pat.operands.len(),
        opd.join(","),
        deco.join(","),
        code,
        gen.flag_refs[idx]
    )
}

/// `-a`: per-mnemonic template tables plus the master index.
pub fn emit_templates(gen: &Generator, file: &str) -> String {
    let mut out = String::new();
    banner(&mut out, file, "Instruction template tables");
    let _ = writeln!(out, "#include \"insns.h\"");
    let _ = writeln!(out);

    for mnemonic in &gen.mnemonics {
        let _ = writeln!(out, "static const struct itemplate instrux_{}[] = {{", mnemonic);
        for (idx, pat) in gen.patterns.iter().enumerate() {
            if &pat.mnemonic == mnemonic && pat.bytes.is_some() {
                let _ = writeln!(out, "    {},", template_row(gen, idx));
            }
        }
        let _ = writeln!(out, "    ITEMPLATE_END");
        let _ = writeln!(out, "}};");
        let _ = writeln!(out);
    }

    let _ = writeln!(
        out,
        "const struct itemplate * const nasm_instructions[{}] = {{",
        gen.mnemonics.len()
    );
    for mnemonic in &gen.mnemonics {
        let _ = writeln!(out, "    instrux_{},", mnemonic);
    }
    let _ = writeln!(out, "}};");
    out
}

fn table_ident(key: &str) -> String {
    if key.is_empty() {
        "itable".to_string()
    } else {
        format!("itable_{}", key)
    }
}

/// `-d`: the flat template array, dispatch tables, and the vector-prefix
/// class index.
pub fn emit_disasm(gen: &Generator, file: &str) -> String {
    let mut out = String::new();
    banner(&mut out, file, "Disassembly decision tables");
    let _ = writeln!(out, "#include \"insns.h\"");
    let _ = writeln!(out);
    let _ = writeln!(out, "struct disasm_table {{");
    let _ = writeln!(out, "    const struct itemplate * const *tmpl;");
    let _ = writeln!(out, "    int ntemplates;");
    let _ = writeln!(out, "    const struct disasm_table *subtable;");
    let _ = writeln!(out, "}};");
    let _ = writeln!(out);

    // The flat array keeps pattern indices stable, so the per-cell lists
    // can reference it by offset.
    let _ = writeln!(
        out,
        "static const struct itemplate instrux[{}] = {{",
        gen.patterns.len()
    );
    for idx in 0..gen.patterns.len() {
        let _ = writeln!(out, "    {},", template_row(gen, idx));
    }
    let _ = writeln!(out, "}};");
    let _ = writeln!(out);

    // Forward declarations: the root table references its children.
    for key in gen.index.tables.keys() {
        let _ = writeln!(
            out,
            "static const struct disasm_table {}[256];",
            table_ident(key)
        );
    }
    let _ = writeln!(out);

    // Per-cell template lists.
    for (key, table) in &gen.index.tables {
        for (byte, templates) in table.iter().enumerate() {
            if templates.is_empty() {
                continue;
            }
            let refs: Vec<String> = templates.iter().map(|t| format!("instrux+{}", t)).collect();
            let _ = writeln!(
                out,
                "static const struct itemplate * const {}_{:02X}[] = {{ {} }};",
                table_ident(key),
                byte,
                refs.join(", ")
            );
        }
    }
    let _ = writeln!(out);

    // Dispatch tables.
    for (key, table) in &gen.index.tables {
        let ident = table_ident(key);
        let _ = writeln!(out, "static const struct disasm_table {}[256] = {{", ident);
        for (byte, templates) in table.iter().enumerate() {
            let cell = if let Some(child) = gen
                .index
                .prefix_cells
                .get(&(key.clone(), byte as u8))
            {
                format!("{{ NULL, 0, {} }}", table_ident(child))
            } else if templates.is_empty() {
                "{ NULL, 0, NULL }".to_string()
            } else {
                format!(
                    "{{ {}_{:02X}, {}, NULL }}",
                    ident,
                    byte,
                    templates.len()
                )
            };
            let _ = writeln!(out, "    /* {:02X} */ {},", byte, cell);
        }
        let _ = writeln!(out, "}};");
        let _ = writeln!(out);
    }

    // The 3-D vector-prefix index.
    let _ = writeln!(
        out,
        "const struct disasm_table * const itable_vex[{}][32][4] = {{",
        VEX_CLASSES
    );
    for class in &gen.index.vex_tables {
        let _ = writeln!(out, "    {{");
        for maps in class {
            let cells: Vec<String> = maps
                .iter()
                .map(|c| match c {
                    Some(key) => table_ident(key),
                    None => "NULL".to_string(),
                })
                .collect();
            let _ = writeln!(out, "        {{ {} }},", cells.join(", "));
        }
        let _ = writeln!(out, "    }},");
    }
    let _ = writeln!(out, "}};");
    out
}

/// Worst-case emitted length of one byte-code program.
fn encoded_len(bytes: &[u8]) -> usize {
    use oxasm::bytecode as bc;
    let mut n = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            bc::BC_END => break,
            c if (bc::BC_LIT..bc::BC_LIT + bc::BC_LIT_MAX as u8).contains(&c) => {
                let run = (c - bc::BC_LIT + 1) as usize;
                n += run;
                i += 1 + run;
            }
            c if (bc::BC_REG_OPC..bc::BC_REG_OPC + 4).contains(&c)
                || (bc::BC_REG_PAIR..bc::BC_REG_PAIR + 4).contains(&c) =>
            {
                n += 1;
                i += 2;
            }
            c if (bc::BC_MODRM..=bc::BC_MODRM + 0o33).contains(&c)
                || (bc::BC_RM_EXT..=bc::BC_RM_EXT + 0o37).contains(&c) =>
            {
                // ModR/M + SIB + dword displacement.
                n += 6;
                i += 1;
            }
            bc::BC_MODRM_FIXED | bc::BC_IS4 | bc::BC_IS4_CONST => {
                n += 1;
                i += 2;
            }
            c if (bc::BC_IB_S..=bc::BC_IB_U + 3).contains(&c) => {
                n += 1;
                i += 1;
            }
            c if (bc::BC_IW..=bc::BC_IW + 3).contains(&c)
                || (bc::BC_REL16..=bc::BC_REL16 + 3).contains(&c)
                || (bc::BC_SEG..=bc::BC_SEG + 3).contains(&c) =>
            {
                n += 2;
                i += 1;
            }
            c if (bc::BC_IWD..=bc::BC_IWD + 3).contains(&c)
                || (bc::BC_ID..=bc::BC_ID_S + 3).contains(&c)
                || (bc::BC_REL..=bc::BC_REL32 + 3).contains(&c) =>
            {
                n += 4;
                i += 1;
            }
            c if (bc::BC_IQ..=bc::BC_IWDQ + 3).contains(&c) => {
                n += 8;
                i += 1;
            }
            c if (bc::BC_REL8..=bc::BC_REL8 + 3).contains(&c)
                || (bc::BC_IS4_IMPL..=bc::BC_IS4_IMPL + 3).contains(&c) =>
            {
                n += 1;
                i += 1;
            }
            c if (bc::BC_VEX..=bc::BC_VEX_NOV).contains(&c) => {
                n += 3;
                i += 3;
            }
            c if (bc::BC_EVEX..=bc::BC_EVEX_NOV).contains(&c) => {
                n += 4;
                i += 6;
            }
            c if c == bc::BC_REX2 || c == bc::BC_REX2 + 1 => {
                n += 2;
                i += 1;
            }
            _ => {
                // Size overrides and prefix mandates cost one byte each.
                n += 1;
                i += 1;
            }
        }
    }
    n
}

/// `-i`: the opcode enumeration header.
pub fn emit_opcode_enum(gen: &Generator, file: &str) -> String {
    let mut out = String::new();
    banner(&mut out, file, "Instruction opcode enumeration");
    let _ = writeln!(out, "#ifndef NASM_INSNSI_H");
    let _ = writeln!(out, "#define NASM_INSNSI_H");
    let _ = writeln!(out);
    let _ = writeln!(out, "enum opcode {{");
    for mnemonic in &gen.mnemonics {
        let _ = writeln!(out, "    I_{},", mnemonic);
    }
    let _ = writeln!(out, "    I_none = -1");
    let _ = writeln!(out, "}};");
    let _ = writeln!(out);

    let max_len = gen
        .patterns
        .iter()
        .filter_map(|p| p.bytes.as_deref())
        .map(encoded_len)
        .max()
        .unwrap_or(0);
    let _ = writeln!(out, "#define MAX_INSLEN {}", max_len);
    let _ = writeln!(out, "#define NASM_VEX_CLASSES {}", VEX_CLASSES);
    let _ = writeln!(out, "#define NO_DECORATOR {{0, 0, 0, 0, 0}}");
    let _ = writeln!(out);
    let _ = writeln!(out, "#endif /* NASM_INSNSI_H */");
    out
}

/// `-n`: the mnemonic name strings.
pub fn emit_names(gen: &Generator, file: &str) -> String {
    let mut out = String::new();
    banner(&mut out, file, "Instruction name strings");
    let _ = writeln!(out, "#include \"insns.h\"");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "const char * const nasm_insn_names[{}] = {{",
        gen.mnemonics.len()
    );
    for mnemonic in &gen.mnemonics {
        let _ = writeln!(out, "    \"{}\",", mnemonic.to_lowercase());
    }
    let _ = writeln!(out, "}};");
    out
}

/// `-fh`: the flag-bit enumeration and bitmask type.
pub fn emit_flag_header(file: &str) -> String {
    let mut out = String::new();
    banner(&mut out, file, "Instruction flag enumeration");
    let _ = writeln!(out, "#ifndef NASM_IFLAG_H");
    let _ = writeln!(out, "#define NASM_IFLAG_H");
    let _ = writeln!(out);
    let _ = writeln!(out, "enum insn_flag_bit {{");
    for flag in KNOWN_FLAGS {
        let _ = writeln!(out, "    IF_{},", flag);
    }
    let _ = writeln!(out, "    IF_FLAG_COUNT");
    let _ = writeln!(out, "}};");
    let _ = writeln!(out);
    let _ = writeln!(out, "#define IF_FIELD_COUNT {}", flag_words());
    let _ = writeln!(
        out,
        "typedef struct {{ uint32_t field[IF_FIELD_COUNT]; }} iflag_t;"
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "extern const iflag_t insns_flags[];");
    let _ = writeln!(out);
    let _ = writeln!(out, "#endif /* NASM_IFLAG_H */");
    out
}

/// `-fc`: the unique flag-combination table.
pub fn emit_flag_init(gen: &Generator, file: &str) -> String {
    let mut out = String::new();
    banner(&mut out, file, "Instruction flag combinations");
    let _ = writeln!(out, "#include \"iflag.h\"");
    let _ = writeln!(out);
    let combos = gen.flags.combos();
    let _ = writeln!(out, "const iflag_t insns_flags[{}] = {{", combos.len());
    for (idx, words) in combos.iter().enumerate() {
        let cells: Vec<String> = words
            .iter()
            .map(|w| format!("UINT32_C(0x{:08x})", w))
            .collect();
        let _ = writeln!(out, "    /* {:3} */ {{{{{}}}}},", idx, cells.join(", "));
    }
    let _ = writeln!(out, "}};");
    out
}
