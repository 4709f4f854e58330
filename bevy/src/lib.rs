//! aff4-bevy: chunked, independently compressed stream storage.
//!
//! A stream is cut into fixed-size chunks. Each chunk is compressed on its
//! own and `chunks_per_segment` of them are packed into one *bevy* blob,
//! next to an index blob of cumulative `u32` end offsets terminated by
//! `0xFFFFFFFF`. Any chunk can therefore be fetched and inflated without
//! touching its neighbours.
//!
//! Quick start: write a stream into an in-memory store
//!
//! ```no_run
//! use aff4_bevy::{BevyReader, BevyWriter, DigestMethod, MemoryStore, StreamParams};
//!
//! let store = MemoryStore::new();
//! let params = StreamParams::default();
//! let mut w = BevyWriter::new(&store, "aff4://stream", params, DigestMethod::Md5).unwrap();
//! w.write(b"hello world").unwrap();
//! let summary = w.close().unwrap();
//!
//! let mut r = BevyReader::new(&store, "aff4://stream", params, summary.size).unwrap();
//! let mut buf = [0u8; 5];
//! r.read_at(6, &mut buf).unwrap();
//! assert_eq!(&buf, b"world");
//! ```
//!
//! Blob persistence goes through the [`BlobStore`] contract; the archive
//! format behind it is irrelevant to this crate.

pub mod chunk;
pub mod digest;
pub mod error;
pub mod index;
pub mod params;
pub mod reader;
pub mod store;
pub mod writer;

pub use digest::{DigestMethod, StreamHasher};
pub use error::BevyError;
pub use index::BevyIndex;
pub use params::{Compression, StreamParams};
pub use reader::{BevyReader, ReadOutcome, ReaderStats};
pub use store::{BlobSink, BlobSource, BlobStore, DirectoryStore, MemoryStore};
pub use writer::{bevy_name, index_name, BevySegments, BevyWriter, StreamSummary};

/// Crate‑level result type using the bevy error.
pub type Result<T> = std::result::Result<T, BevyError>;
