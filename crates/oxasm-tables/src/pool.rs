//! Byte-code pool interning.
//!
//! All compiled programs live in one flat array.  Sequences are placed
//! longest-first; any sequence that is a suffix of an already placed one
//! shares its tail instead of being appended.  Templates then reference
//! programs by offset into the pool.

use std::collections::BTreeMap;

/// The interned pool and the offset of every distinct sequence.
#[derive(Debug, Default)]
pub struct BytecodePool {
    pool: Vec<u8>,
    offsets: BTreeMap<Vec<u8>, usize>,
    /// Placement order, longest first, for suffix scanning.
    placed: Vec<(Vec<u8>, usize)>,
}

impl BytecodePool {
    /// Intern every sequence, sharing suffixes.
    pub fn build<I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut unique: Vec<Vec<u8>> = sequences.into_iter().collect();
        unique.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        unique.dedup();

        let mut pool = BytecodePool::default();
        for seq in unique {
            if pool.offsets.contains_key(&seq) {
                continue;
            }
            let shared = pool
                .placed
                .iter()
                .find(|(placed, _)| placed.ends_with(&seq))
                .map(|(placed, off)| off + placed.len() - seq.len());
            let offset = match shared {
                Some(off) => off,
                None => {
                    let off = pool.pool.len();
                    pool.pool.extend_from_slice(&seq);
                    pool.placed.push((seq.clone(), off));
                    off
                }
            };
            pool.offsets.insert(seq, offset);
        }
        pool
    }

    /// The flat pool bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pool
    }

    /// Offset of an interned sequence.
    pub fn offset_of(&self, seq: &[u8]) -> Option<usize> {
        self.offsets.get(seq).copied()
    }

    /// Number of distinct interned sequences.
    pub fn distinct(&self) -> usize {
        self.offsets.len()
    }
}
