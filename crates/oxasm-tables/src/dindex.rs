//! Disassembly index construction.
//!
//! For every non-ND pattern the builder walks the byte-code program from
//! the front to find the instruction's possible starting bytes, peeling
//! known prefix classes off literal runs and synthesizing table keys for
//! VEX/XOP/EVEX-prefixed encodings.  Each starting byte enrolls the
//! pattern in a 256-entry dispatch table keyed by prefix class; a cell
//! can hold either template references or a link to a deeper prefix
//! table, never both.

use crate::compile::Compiled;
use crate::insdb::DbError;
use oxasm::bytecode as bc;
use std::collections::BTreeMap;

/// Number of vector-prefix classes (VEX, XOP, EVEX).
pub const VEX_CLASSES: usize = 3;

/// Known multi-byte legacy prefix classes, longest first.
const PREFIX_CLASSES: &[(&[u8], &str)] = &[
    (&[0x0F, 0x24], "0F24"),
    (&[0x0F, 0x25], "0F25"),
    (&[0x0F, 0x38], "0F38"),
    (&[0x0F, 0x3A], "0F3A"),
    (&[0x0F, 0x7A], "0F7A"),
    (&[0x0F, 0xA6], "0FA6"),
    (&[0x0F, 0xA7], "0FA7"),
    (&[0x0F], "0F"),
];

/// The finished index.
#[derive(Debug, Default)]
pub struct DisasmIndex {
    /// Dispatch tables: key (`""` = root, `"0F38"`, `"vex013"`, …) to 256
    /// buckets of template indices.
    pub tables: BTreeMap<String, Vec<Vec<usize>>>,
    /// Cells that link to a deeper table: (table key, byte) → child key.
    pub prefix_cells: BTreeMap<(String, u8), String>,
    /// `[class][map][pp]` → vector-prefix table key.
    pub vex_tables: Vec<Vec<[Option<String>; 4]>>,
}

impl DisasmIndex {
    fn table(&mut self, key: &str) -> &mut Vec<Vec<usize>> {
        self.tables
            .entry(key.to_string())
            .or_insert_with(|| vec![Vec::new(); 256])
    }
}

/// What the start-sequence walk found for one pattern.
struct StartSeq {
    /// Leading literal bytes (prefix classes not yet stripped).
    lits: Vec<u8>,
    /// Vector-prefix key components, when the encoding starts with one.
    vex: Option<(u8, u8, u8)>,
    /// How many opcodes the final byte fans out to (`+r` forms).
    fanout: u8,
}

/// Walk a byte-code program for its starting bytes.  `None` means the
/// pattern contributes nothing (no discernible first byte).
fn start_seq(bytes: &[u8]) -> Option<StartSeq> {
    let mut lits: Vec<u8> = Vec::new();
    let mut vex: Option<(u8, u8, u8)> = None;
    let mut fanout = 1u8;
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        #[allow(unreachable_patterns)] // see the late 0260-range arm below
        match c {
            // Zero terminator: bail out with whatever was collected.
            bc::BC_END => break,

            c if (bc::BC_LIT..bc::BC_LIT + bc::BC_LIT_MAX as u8).contains(&c) => {
                let n = (c - bc::BC_LIT + 1) as usize;
                lits.extend_from_slice(bytes.get(i + 1..i + 1 + n)?);
                i += 1 + n;
                if lits.len() >= 3 {
                    break;
                }
            }

            c if (bc::BC_REG_OPC..bc::BC_REG_OPC + 4).contains(&c) => {
                lits.push(*bytes.get(i + 1)?);
                fanout = 8;
                i += 2;
                break;
            }

            c if (bc::BC_REG_PAIR..bc::BC_REG_PAIR + 4).contains(&c) => {
                lits.push(*bytes.get(i + 1)?);
                fanout = 2;
                i += 2;
                break;
            }

            c if (bc::BC_EVEX..bc::BC_EVEX + 4).contains(&c) || c == bc::BC_EVEX_NOV => {
                let payload = bytes.get(i + 1..i + 6)?;
                vex = Some((2, payload[0] & 0x0F, payload[1] & 3));
                i += 6;
            }

            c if (bc::BC_VEX..bc::BC_VEX + 4).contains(&c) || c == bc::BC_VEX_NOV => {
                let payload = bytes.get(i + 1..i + 3)?;
                vex = Some((payload[0] >> 6, payload[0] & 0x1F, payload[1] & 3));
                i += 3;
            }

            // Kept from the original walk: a second test for the
            // 0260..0270 range below the EVEX arm.  The arm above always
            // matches first, so this one is unreachable; preserved so the
            // walk structure matches its ancestry.
            c if (bc::BC_VEX..=bc::BC_VEX_NOV).contains(&c) => {
                let payload = bytes.get(i + 1..i + 3)?;
                vex = Some((payload[0] >> 6, payload[0] & 0x1F, payload[1] & 3));
                i += 3;
            }

            // is4 forms carry one payload byte; skip them.
            bc::BC_IS4 | bc::BC_IS4_CONST | bc::BC_MODRM_FIXED => i += 2,
            c if (bc::BC_IS4_IMPL..bc::BC_IS4_IMPL + 4).contains(&c) => i += 1,

            // REX2 and its map marker.
            c if c == bc::BC_REX2 || c == bc::BC_REX2 + 1 => i += 1,
            c if (bc::BC_LEGACY_MAP..bc::BC_LEGACY_MAP + 4).contains(&c) => {
                if c == bc::BC_LEGACY_MAP + 1 {
                    lits.push(0x0F);
                }
                i += 1;
            }

            // Size, REX-suppression, prefix-mandate and jump controls
            // contribute no opcode bytes.
            c if (0o310..=0o352).contains(&c) => i += 1,
            c if (0o360..=0o376).contains(&c) => i += 1,

            // ModR/M or an immediate slot: the opcode bytes are over.
            _ => break,
        }
    }

    if lits.is_empty() {
        return None;
    }
    Some(StartSeq { lits, vex, fanout })
}

/// Build the index over all compiled patterns.
pub fn build(patterns: &[Compiled], file: &str) -> Result<DisasmIndex, DbError> {
    let mut index = DisasmIndex {
        vex_tables: vec![vec![[None, None, None, None]; 32]; VEX_CLASSES],
        ..DisasmIndex::default()
    };
    index.table("");

    for (tidx, pat) in patterns.iter().enumerate() {
        if pat.flags.contains("ND") {
            continue;
        }
        let Some(bytes) = pat.bytes.as_deref() else {
            continue;
        };
        let Some(seq) = start_seq(bytes) else {
            log::debug!("no start sequence for {} (line {})", pat.mnemonic, pat.line);
            continue;
        };

        let mut lits = seq.lits;
        let key = if let Some((class, map, pp)) = seq.vex {
            if class as usize >= VEX_CLASSES {
                return Err(DbError::new(
                    file,
                    pat.line,
                    format!("vector prefix class {} out of range", class),
                ));
            }
            let name = ["vex", "xop", "evex"][class as usize];
            let key = format!("{}{:02X}{:X}", name, map, pp);
            index.vex_tables[class as usize][map as usize & 31][pp as usize & 3] =
                Some(key.clone());
            key
        } else {
            // Peel the longest known prefix class, marking each hop.
            let mut key = String::new();
            loop {
                let hit = PREFIX_CLASSES
                    .iter()
                    .copied()
                    .find(|(seq, _)| lits.len() > seq.len() && lits.starts_with(seq));
                let Some((pseq, pname)) = hit else { break };
                mark_prefix_chain(&mut index, &key, pseq, pname, pat, file)?;
                lits.drain(..pseq.len());
                key = (*pname).to_string();
            }
            key
        };

        let first = lits[0];
        for n in 0..seq.fanout {
            let byte = first.wrapping_add(n);
            if index.prefix_cells.contains_key(&(key.clone(), byte)) {
                return Err(DbError::new(
                    file,
                    pat.line,
                    format!(
                        "{}: opcode {:02X}h in table {:?} is already a prefix",
                        pat.mnemonic, byte, key
                    ),
                ));
            }
            index.table(&key)[byte as usize].push(tidx);
        }
    }

    Ok(index)
}

/// Mark the cells along a legacy prefix as table links, diagnosing
/// collisions with instruction entries.
fn mark_prefix_chain(
    index: &mut DisasmIndex,
    parent: &str,
    pseq: &[u8],
    pname: &str,
    pat: &Compiled,
    file: &str,
) -> Result<(), DbError> {
    // The chain hops through the one-byte 0F table for two-byte classes.
    let mut from = parent.to_string();
    let mut consumed: Vec<u8> = Vec::new();
    for &byte in pseq {
        consumed.push(byte);
        let to = PREFIX_CLASSES
            .iter()
            .find(|(s, _)| *s == consumed.as_slice())
            .map(|(_, n)| (*n).to_string())
            .unwrap_or_else(|| pname.to_string());

        if !index.table(&from)[byte as usize].is_empty() {
            return Err(DbError::new(
                file,
                pat.line,
                format!(
                    "{}: prefix byte {:02X}h in table {:?} already holds instructions",
                    pat.mnemonic, byte, from
                ),
            ));
        }
        index
            .prefix_cells
            .insert((from.clone(), byte), to.clone());
        index.table(&to);
        from = to;
    }
    Ok(())
}
