//! The x86 condition-code table driving `cc`/`scc` mnemonic expansion.

/// One condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondCode {
    /// Name substituted into the mnemonic (`jcc` → `jz`, …).
    pub name: &'static str,
    /// The 4-bit condition value.
    pub value: u8,
    /// Only meaningful in SCC (EVEX source-condition) position; the cc
    /// nibble values 10 and 11 mean "always false"/"always true" there.
    pub scc_only: bool,
    /// Only encodable in classic cc position (parity conditions, which
    /// SCC space reassigns to F/T).
    pub cc_only: bool,
    /// A disassembly-suppressed alias: any pattern generated from it
    /// carries the `ND` flag.
    pub nd: bool,
}

const fn cc(name: &'static str, value: u8) -> CondCode {
    CondCode {
        name,
        value,
        scc_only: false,
        cc_only: false,
        nd: false,
    }
}

const fn cc_only(name: &'static str, value: u8) -> CondCode {
    CondCode {
        name,
        value,
        scc_only: false,
        cc_only: true,
        nd: false,
    }
}

const fn scc_nd(name: &'static str, value: u8) -> CondCode {
    CondCode {
        name,
        value,
        scc_only: true,
        cc_only: false,
        nd: true,
    }
}

/// The full condition table.  `cc` expansion uses every entry that is not
/// SCC-only (16 patterns); `scc` expansion additionally drops the parity
/// family and the disassembly-only aliases (14 patterns).
pub const COND_CODES: [CondCode; 18] = [
    cc("o", 0),
    cc("no", 1),
    cc("c", 2),
    cc("nc", 3),
    cc("z", 4),
    cc("nz", 5),
    cc("na", 6),
    cc("a", 7),
    cc("s", 8),
    cc("ns", 9),
    cc_only("pe", 10),
    cc_only("po", 11),
    cc("l", 12),
    cc("nl", 13),
    cc("ng", 14),
    cc("g", 15),
    scc_nd("f", 10),
    scc_nd("t", 11),
];

/// Alias names accepted when *recognizing* a condition (the disassembler
/// prints the primary name).
pub const COND_ALIASES: [(&str, &str); 14] = [
    ("b", "c"),
    ("nae", "c"),
    ("ae", "nc"),
    ("nb", "nc"),
    ("e", "z"),
    ("ne", "nz"),
    ("be", "na"),
    ("nbe", "a"),
    ("p", "pe"),
    ("np", "po"),
    ("nge", "l"),
    ("ge", "nl"),
    ("le", "ng"),
    ("nle", "g"),
];

/// The entries used by a `cc`-form expansion.
pub fn cc_codes() -> impl Iterator<Item = &'static CondCode> {
    COND_CODES.iter().filter(|c| !c.scc_only)
}

/// The entries used by an `scc`-form expansion.
pub fn scc_codes() -> impl Iterator<Item = &'static CondCode> {
    COND_CODES.iter().filter(|c| !c.cc_only && !c.nd)
}
