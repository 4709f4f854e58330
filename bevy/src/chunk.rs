//! Per-chunk compression.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::BevyError;
use crate::params::Compression;
use crate::Result;

/// Compress one logical chunk.
pub fn compress_chunk(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::Deflate => {
            let mut enc = ZlibEncoder::new(
                Vec::with_capacity(data.len() / 2 + 16),
                flate2::Compression::default(),
            );
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        Compression::Stored => Ok(data.to_vec()),
    }
}

/// Inflate chunk `chunk` into at most `limit` bytes.
///
/// The output is sized for the worst case (a full chunk). A chunk that
/// inflates past `limit` means the recorded parameters do not describe the
/// stream, and is reported as [`BevyError::ChunkOverflow`].
pub fn decompress_chunk(
    chunk: u64,
    compressed: &[u8],
    compression: Compression,
    limit: usize,
) -> Result<Vec<u8>> {
    match compression {
        Compression::Deflate => {
            let mut out = Vec::with_capacity(limit);
            ZlibDecoder::new(compressed)
                .take(limit as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|e| BevyError::Decompress {
                    chunk,
                    reason: e.to_string(),
                })?;
            if out.len() > limit {
                return Err(BevyError::ChunkOverflow { chunk, limit });
            }
            Ok(out)
        }
        Compression::Stored => {
            if compressed.len() > limit {
                return Err(BevyError::ChunkOverflow { chunk, limit });
            }
            Ok(compressed.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_roundtrip_and_shrinks_repetitive_data() {
        let data = vec![0xABu8; 4096];
        let c = compress_chunk(&data, Compression::Deflate).unwrap();
        assert!(c.len() < data.len());
        assert_eq!(
            decompress_chunk(0, &c, Compression::Deflate, 4096).unwrap(),
            data
        );
    }

    #[test]
    fn overflow_is_fatal() {
        let data = vec![1u8; 100];
        let c = compress_chunk(&data, Compression::Deflate).unwrap();
        let err = decompress_chunk(3, &c, Compression::Deflate, 99).unwrap_err();
        assert!(matches!(err, BevyError::ChunkOverflow { chunk: 3, limit: 99 }));
        let err = decompress_chunk(3, &data, Compression::Stored, 50).unwrap_err();
        assert!(matches!(err, BevyError::ChunkOverflow { .. }));
    }

    #[test]
    fn garbage_fails_to_inflate() {
        let err = decompress_chunk(1, b"not zlib at all", Compression::Deflate, 64).unwrap_err();
        assert!(matches!(err, BevyError::Decompress { chunk: 1, .. }));
    }
}
