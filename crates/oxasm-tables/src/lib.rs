//! # oxasm-tables — instruction-table generator
//!
//! Reads the line-oriented instruction database and produces the static
//! tables the assembler and disassembler are built from:
//!
//! - the interned byte-code pool (`-b`),
//! - per-mnemonic template tables (`-a`),
//! - the disassembly decision tables (`-d`),
//! - the opcode enumeration (`-i`) and name strings (`-n`),
//! - the instruction-flag enumeration and combination table (`--fh`, `--fc`).
//!
//! The library surface is pure — database text in, artifact text out — so
//! the whole pipeline is testable without touching the filesystem.  The
//! byte-code and operand-flag vocabularies come from the `oxasm` crate,
//! which is the only thing the generator and the parser share.

pub mod compile;
pub mod condcodes;
pub mod dindex;
pub mod emit;
pub mod iflags;
pub mod insdb;
pub mod opnames;
pub mod pool;

use compile::Compiled;
use dindex::DisasmIndex;
use iflags::FlagPool;
use insdb::DbError;
use pool::BytecodePool;

/// Everything derived from one instruction database.
#[derive(Debug)]
pub struct Generator {
    /// All compiled patterns, in database order.
    pub patterns: Vec<Compiled>,
    /// Distinct mnemonics, in first-appearance order.
    pub mnemonics: Vec<String>,
    /// The interned byte-code pool.
    pub pool: BytecodePool,
    /// Unique flag combinations.
    pub flags: FlagPool,
    /// Per-pattern index into [`FlagPool::combos`].
    pub flag_refs: Vec<usize>,
    /// The disassembly dispatch structure.
    pub index: DisasmIndex,
}

/// Run the whole pipeline over one database file's contents.
pub fn generate(input: &str, file: &str) -> Result<Generator, DbError> {
    let patterns = insdb::parse_db(input, file)?;
    let patterns = compile::compile_all(&patterns, file)?;

    let mut mnemonics: Vec<String> = Vec::new();
    for pat in &patterns {
        if !mnemonics.contains(&pat.mnemonic) {
            mnemonics.push(pat.mnemonic.clone());
        }
    }
    log::debug!(
        "{}: {} patterns, {} mnemonics",
        file,
        patterns.len(),
        mnemonics.len()
    );

    let pool = BytecodePool::build(patterns.iter().filter_map(|p| p.bytes.clone()));
    let mut flags = FlagPool::new();
    let flag_refs: Vec<usize> = patterns.iter().map(|p| flags.intern(&p.flags)).collect();
    let index = dindex::build(&patterns, file)?;

    Ok(Generator {
        patterns,
        mnemonics,
        pool,
        flags,
        flag_refs,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_end_to_end() {
        let gen = generate(
            "ADD rm32,imm32 [mi: o32 81 /0 id] 386,SM\nADD rm32,sbytedword [mi: o32 83 /0 ib,s] 386,SM\n",
            "t.dat",
        )
        .unwrap();
        assert_eq!(gen.patterns.len(), 2);
        assert_eq!(gen.mnemonics, vec!["ADD"]);
        // Both programs are interned and addressable.
        for pat in &gen.patterns {
            let bytes = pat.bytes.as_deref().unwrap();
            let off = gen.pool.offset_of(bytes).unwrap();
            assert_eq!(&gen.pool.as_bytes()[off..off + bytes.len()], bytes);
        }
    }

    #[test]
    fn build_errors_carry_context() {
        let err = generate("ADD rm32,banana [mi: 81 /0 id] 386\n", "insns.dat").unwrap_err();
        assert_eq!(err.file, "insns.dat");
        assert_eq!(err.line, 1);
    }
}
