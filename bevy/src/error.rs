//! Errors raised while writing or reading bevy-encoded streams.

use thiserror::Error;

/// Errors that can arise when persisting or decoding a stream.
#[derive(Debug, Error)]
pub enum BevyError {
    /// Underlying I/O error from the blob store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The store has no entry with this name.
    #[error("no such blob: {0}")]
    MissingBlob(String),
    /// A bevy index blob did not end with the `0xFFFFFFFF` sentinel.
    #[error("bevy index {0} is not sentinel terminated")]
    MissingSentinel(String),
    /// A bevy index blob failed a structural check.
    #[error("corrupt bevy index {name}: {reason}")]
    CorruptIndex { name: String, reason: String },
    /// The compressed bytes of a chunk could not be inflated.
    #[error("decompression of chunk {chunk} failed: {reason}")]
    Decompress { chunk: u64, reason: String },
    /// A chunk inflated to more bytes than the stream's chunk size.
    #[error("chunk {chunk} inflates past {limit} bytes")]
    ChunkOverflow { chunk: u64, limit: usize },
    /// A chunk inflated to fewer bytes than its position in the stream requires.
    #[error("chunk {chunk} holds {got} bytes, expected {expected}")]
    ShortChunk {
        chunk: u64,
        expected: usize,
        got: usize,
    },
    /// Stream parameters that cannot describe a valid stream.
    #[error("invalid stream parameters: {0}")]
    InvalidParams(&'static str),
    /// Another writer holds the store.
    #[error("store {0} is locked by another writer")]
    Locked(String),
}
