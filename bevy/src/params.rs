//! Per-stream chunking and compression parameters.

use serde::{Deserialize, Serialize};

use crate::error::BevyError;
use crate::Result;

/// Default logical chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: u32 = 32 * 1024;
/// Default number of chunks packed into one bevy.
pub const DEFAULT_CHUNKS_PER_SEGMENT: u32 = 2048;

/// Per-chunk compression scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// zlib-wrapped DEFLATE, one stream per chunk.
    #[default]
    Deflate,
    /// Chunks are stored as-is.
    Stored,
}

impl Compression {
    const DEFLATE_URI: &'static str = "https://www.ietf.org/rfc/rfc1950.txt";
    const STORED_URI: &'static str = "http://aff4.org/Schema#NullCompressor";

    /// URI recorded as the stream's `compressionMethod`.
    pub fn uri(&self) -> &'static str {
        match self {
            Compression::Deflate => Self::DEFLATE_URI,
            Compression::Stored => Self::STORED_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::DEFLATE_URI => Some(Compression::Deflate),
            Self::STORED_URI => Some(Compression::Stored),
            _ => None,
        }
    }
}

/// The three persisted parameters of a bevy-encoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    pub chunk_size: u32,
    pub chunks_per_segment: u32,
    pub compression: Compression,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunks_per_segment: DEFAULT_CHUNKS_PER_SEGMENT,
            compression: Compression::Deflate,
        }
    }
}

impl StreamParams {
    pub fn new(chunk_size: u32, chunks_per_segment: u32, compression: Compression) -> Self {
        Self {
            chunk_size,
            chunks_per_segment,
            compression,
        }
    }

    /// Uncompressed bytes covered by one full bevy.
    pub fn bevy_span(&self) -> u64 {
        self.chunk_size as u64 * self.chunks_per_segment as u64
    }

    /// Reject parameters a reader could not address.
    ///
    /// Index entries are `u32` offsets into the bevy blob, so a full bevy of
    /// worst-case (slightly expanded) chunks must stay below the sentinel.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(BevyError::InvalidParams("chunk_size must be non-zero"));
        }
        if self.chunks_per_segment == 0 {
            return Err(BevyError::InvalidParams(
                "chunks_per_segment must be non-zero",
            ));
        }
        let worst_chunk = self.chunk_size as u64 + (self.chunk_size as u64 >> 10) + 64;
        if worst_chunk * self.chunks_per_segment as u64 >= u32::MAX as u64 {
            return Err(BevyError::InvalidParams(
                "bevy does not fit in 32-bit index offsets",
            ));
        }
        Ok(())
    }
}
