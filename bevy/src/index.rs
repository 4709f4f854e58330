//! Bevy index blobs: cumulative `u32` end offsets plus a sentinel.
//!
//! Entry `i` is the end of chunk `i`'s compressed bytes inside the bevy, so
//! chunk `i` occupies `[index[i-1], index[i])` with `index[-1] == 0`. The
//! array is written little-endian and terminated by `0xFFFFFFFF`.

use crate::error::BevyError;
use crate::Result;

/// Index terminator.
pub const SENTINEL: u32 = u32::MAX;

/// Parsed offsets of one bevy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BevyIndex {
    ends: Vec<u32>,
}

impl BevyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the end offset of the next chunk.
    pub fn push(&mut self, end: u32) {
        self.ends.push(end);
    }

    /// Number of chunks described.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Total compressed bytes of the bevy.
    pub fn compressed_len(&self) -> u32 {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Compressed byte range `[start, end)` of chunk `i` within the bevy.
    pub fn chunk_range(&self, i: usize) -> Option<(u32, u32)> {
        let end = *self.ends.get(i)?;
        let start = if i == 0 { 0 } else { self.ends[i - 1] };
        Some((start, end))
    }

    /// Serialize to the on-disk form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.ends.len() + 1) * 4);
        for e in &self.ends {
            out.extend_from_slice(&e.to_le_bytes());
        }
        out.extend_from_slice(&SENTINEL.to_le_bytes());
        out
    }

    /// Parse an index blob named `name`.
    pub fn decode(name: &str, buf: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| BevyError::CorruptIndex {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if buf.len() % 4 != 0 {
            return Err(corrupt("length is not a multiple of 4"));
        }
        let mut words = buf
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
        let Some(last) = words.next_back() else {
            return Err(BevyError::MissingSentinel(name.to_string()));
        };
        if last != SENTINEL {
            return Err(BevyError::MissingSentinel(name.to_string()));
        }
        let mut ends = Vec::with_capacity(buf.len() / 4 - 1);
        let mut prev = 0u32;
        for e in words {
            if e == SENTINEL {
                return Err(corrupt("sentinel before end of index"));
            }
            if e < prev {
                return Err(corrupt("offsets are not cumulative"));
            }
            ends.push(e);
            prev = e;
        }
        Ok(Self { ends })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout_is_bit_exact() {
        let mut idx = BevyIndex::new();
        idx.push(10);
        idx.push(25);
        let bytes = idx.encode();
        assert_eq!(
            bytes,
            vec![10, 0, 0, 0, 25, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(BevyIndex::decode("x", &bytes).unwrap(), idx);
    }

    #[test]
    fn chunk_ranges() {
        let mut idx = BevyIndex::new();
        for e in [7, 7, 30] {
            idx.push(e);
        }
        assert_eq!(idx.chunk_range(0), Some((0, 7)));
        assert_eq!(idx.chunk_range(1), Some((7, 7)));
        assert_eq!(idx.chunk_range(2), Some((7, 30)));
        assert_eq!(idx.chunk_range(3), None);
        assert_eq!(idx.compressed_len(), 30);
    }

    #[test]
    fn rejects_missing_sentinel() {
        let err = BevyIndex::decode("b.idx", &[1, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, BevyError::MissingSentinel(n) if n == "b.idx"));
        let err = BevyIndex::decode("b.idx", &[]).unwrap_err();
        assert!(matches!(err, BevyError::MissingSentinel(_)));
    }

    #[test]
    fn rejects_ragged_and_decreasing() {
        assert!(matches!(
            BevyIndex::decode("i", &[1, 0, 0]),
            Err(BevyError::CorruptIndex { .. })
        ));
        let mut bytes = Vec::new();
        for v in [9u32, 4, SENTINEL] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            BevyIndex::decode("i", &bytes),
            Err(BevyError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn empty_index_is_just_the_sentinel() {
        let idx = BevyIndex::decode("e", &SENTINEL.to_le_bytes()).unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.encode(), SENTINEL.to_le_bytes().to_vec());
    }
}
