//! Bevy writer: chunk, compress, index and persist a byte stream.
//!
//! Bytes accumulate into a chunk buffer. Each full chunk is compressed on
//! its own and appended to the current bevy, recording the cumulative end
//! offset in the bevy index. When `chunks_per_segment` chunks have been
//! packed, the bevy blob and its index blob are persisted as
//! `{urn}/{n:08}` and `{urn}/{n:08}.idx`.

use std::io;

use log::debug;

use crate::chunk::compress_chunk;
use crate::digest::{DigestMethod, StreamHasher};
use crate::error::BevyError;
use crate::index::BevyIndex;
use crate::params::StreamParams;
use crate::store::BlobStore;
use crate::Result;

/// Blob name of bevy `n` of stream `urn`.
pub fn bevy_name(urn: &str, n: u64) -> String {
    format!("{urn}/{n:08}")
}

/// Blob name of the index of bevy `n` of stream `urn`.
pub fn index_name(urn: &str, n: u64) -> String {
    format!("{urn}/{n:08}.idx")
}

/// A bevy that has been persisted to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BevySegments {
    pub number: u64,
    pub bevy: String,
    pub index: String,
    pub chunks: usize,
    pub compressed_len: u64,
}

/// Result of closing a [`BevyWriter`].
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub urn: String,
    pub params: StreamParams,
    /// Total logical length in bytes.
    pub size: u64,
    pub chunks: u64,
    /// Bevies persisted since the last [`BevyWriter::take_persisted`].
    pub bevies: Vec<BevySegments>,
    pub digest_method: DigestMethod,
    /// Lowercase hex content digest.
    pub digest: String,
}

/// Incremental writer for one bevy-encoded stream.
#[derive(Debug)]
pub struct BevyWriter<'s, S: BlobStore + ?Sized> {
    store: &'s S,
    urn: String,
    params: StreamParams,
    chunk: Vec<u8>,
    bevy: Vec<u8>,
    index: BevyIndex,
    bevy_number: u64,
    chunks: u64,
    size: u64,
    hasher: StreamHasher,
    persisted: Vec<BevySegments>,
}

impl<'s, S: BlobStore + ?Sized> BevyWriter<'s, S> {
    /// Create a writer for stream `urn`, validating `params`.
    pub fn new(
        store: &'s S,
        urn: impl Into<String>,
        params: StreamParams,
        digest: DigestMethod,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            store,
            urn: urn.into(),
            params,
            chunk: Vec::with_capacity(params.chunk_size as usize),
            bevy: Vec::new(),
            index: BevyIndex::new(),
            bevy_number: 0,
            chunks: 0,
            size: 0,
            hasher: digest.hasher(),
            persisted: Vec::new(),
        })
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub fn params(&self) -> StreamParams {
        self.params
    }

    /// Bytes written so far; also the stream's current write position.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append `data` to the stream.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.hasher.update(data);
        let chunk_size = self.params.chunk_size as usize;
        let mut rest = data;
        while !rest.is_empty() {
            let take = (chunk_size - self.chunk.len()).min(rest.len());
            self.chunk.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.chunk.len() == chunk_size {
                self.flush_chunk()?;
            }
        }
        self.size += data.len() as u64;
        Ok(data.len())
    }

    /// Persist the chunks completed so far.
    ///
    /// The in-progress bevy is written under its final name and overwritten
    /// when more chunks arrive. A trailing partial chunk stays buffered: it
    /// only becomes a chunk at [`BevyWriter::close`], so chunk boundaries
    /// stay at multiples of the chunk size.
    pub fn flush(&mut self) -> Result<()> {
        if self.index.is_empty() {
            return Ok(());
        }
        self.persist_current()?;
        Ok(())
    }

    /// Hand over the bevies persisted since the last call.
    pub fn take_persisted(&mut self) -> Vec<BevySegments> {
        std::mem::take(&mut self.persisted)
    }

    /// Flush the final (possibly short) chunk and bevy and finalize the digest.
    pub fn close(mut self) -> Result<StreamSummary> {
        self.flush_chunk()?;
        self.finish_bevy()?;
        debug!(
            "Closed stream {} ({} bytes, {} chunks, {} bevies)",
            self.urn, self.size, self.chunks, self.bevy_number
        );
        Ok(StreamSummary {
            urn: self.urn,
            params: self.params,
            size: self.size,
            chunks: self.chunks,
            bevies: self.persisted,
            digest_method: self.hasher.method(),
            digest: self.hasher.finalize_hex(),
        })
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let compressed = compress_chunk(&self.chunk, self.params.compression)?;
        self.bevy.extend_from_slice(&compressed);
        let end = u32::try_from(self.bevy.len())
            .ok()
            .filter(|e| *e != crate::index::SENTINEL)
            .ok_or(BevyError::InvalidParams(
                "bevy exceeds 32-bit index offsets",
            ))?;
        self.index.push(end);
        self.chunk.clear();
        self.chunks += 1;
        if self.index.len() == self.params.chunks_per_segment as usize {
            self.finish_bevy()?;
        }
        Ok(())
    }

    fn persist_current(&self) -> Result<BevySegments> {
        let bevy = bevy_name(&self.urn, self.bevy_number);
        let index = index_name(&self.urn, self.bevy_number);
        self.store.put(&bevy, &self.bevy, false)?;
        self.store.put(&index, &self.index.encode(), false)?;
        Ok(BevySegments {
            number: self.bevy_number,
            bevy,
            index,
            chunks: self.index.len(),
            compressed_len: self.bevy.len() as u64,
        })
    }

    fn finish_bevy(&mut self) -> Result<()> {
        if self.index.is_empty() {
            return Ok(());
        }
        let segments = self.persist_current()?;
        debug!(
            "Persisted bevy {} ({} chunks, {} bytes)",
            segments.bevy, segments.chunks, segments.compressed_len
        );
        self.persisted.push(segments);
        self.bevy.clear();
        self.index = BevyIndex::new();
        self.bevy_number += 1;
        Ok(())
    }
}

impl<S: BlobStore + ?Sized> io::Write for BevyWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BevyWriter::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        BevyWriter::flush(self).map_err(io::Error::other)
    }
}
