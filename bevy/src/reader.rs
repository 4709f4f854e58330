//! Random-access reader for bevy-encoded streams.
//!
//! A logical offset maps to `chunk = offset / chunk_size`, then to
//! `bevy = chunk / chunks_per_segment` and `chunk % chunks_per_segment`
//! within it. The index of the current bevy and the last inflated chunk are
//! cached per reader, so a seek into a new bevy costs one index fetch and a
//! read only inflates the chunks it touches.
//!
//! Basic example
//!
//! ```no_run
//! use aff4_bevy::{BevyReader, MemoryStore, ReadOutcome, StreamParams};
//!
//! let store = MemoryStore::new();
//! let mut r = BevyReader::new(&store, "aff4://stream", StreamParams::default(), 1 << 20).unwrap();
//! let mut buf = vec![0u8; 4096];
//! match r.read_at(65536, &mut buf).unwrap() {
//!     ReadOutcome::Data(n) => println!("read {n} bytes"),
//!     ReadOutcome::EndOfStream => println!("past the end"),
//! }
//! ```

use std::io::{self, Read, Seek, SeekFrom};

use log::debug;

use crate::chunk::decompress_chunk;
use crate::error::BevyError;
use crate::index::BevyIndex;
use crate::params::StreamParams;
use crate::store::BlobStore;
use crate::writer::{bevy_name, index_name};
use crate::Result;

/// Outcome of a positioned read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were copied; fewer than requested only at the end of the stream.
    Data(usize),
    /// The offset is at or past the end of the stream.
    EndOfStream,
}

/// Work counters for one reader instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub index_fetches: u64,
    pub chunks_decompressed: u64,
}

/// Reader over one stream. Not meant to be shared between threads; open one per thread.
#[derive(Debug)]
pub struct BevyReader<'s, S: BlobStore + ?Sized> {
    store: &'s S,
    urn: String,
    params: StreamParams,
    size: u64,
    position: u64,
    index: Option<(u64, BevyIndex)>,
    chunk: Option<(u64, Vec<u8>)>,
    stats: ReaderStats,
}

impl<'s, S: BlobStore + ?Sized> BevyReader<'s, S> {
    /// Open stream `urn` of `size` bytes written with `params`.
    pub fn new(
        store: &'s S,
        urn: impl Into<String>,
        params: StreamParams,
        size: u64,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            store,
            urn: urn.into(),
            params,
            size,
            position: 0,
            index: None,
            chunk: None,
            stats: ReaderStats::default(),
        })
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn params(&self) -> StreamParams {
        self.params
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the read pointer. Positions past the end are allowed and read as end of stream.
    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    /// Read at the current position and advance it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let outcome = self.read_at(self.position, buf)?;
        if let ReadOutcome::Data(n) = outcome {
            self.position += n as u64;
        }
        Ok(outcome)
    }

    /// Fill `buf` from `offset`, spanning as many chunks as needed.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        if offset >= self.size {
            return Ok(ReadOutcome::EndOfStream);
        }
        let want = (buf.len() as u64).min(self.size - offset) as usize;
        let chunk_size = self.params.chunk_size as u64;
        let mut done = 0usize;
        while done < want {
            let pos = offset + done as u64;
            let chunk_id = pos / chunk_size;
            let within = (pos % chunk_size) as usize;
            let data = self.chunk_data(chunk_id)?;
            let n = (data.len() - within).min(want - done);
            buf[done..done + n].copy_from_slice(&data[within..within + n]);
            done += n;
        }
        Ok(ReadOutcome::Data(want))
    }

    /// Inflate chunk `chunk_id` directly, without reading anything before it.
    pub fn read_chunk(&mut self, chunk_id: u64) -> Result<Vec<u8>> {
        Ok(self.chunk_data(chunk_id)?.to_vec())
    }

    /// Read from the current position to the end of the stream.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.size.saturating_sub(self.position) as usize];
        if !out.is_empty() {
            self.read(&mut out)?;
        }
        Ok(out)
    }

    /// Expected inflated length of `chunk_id`; only the last chunk may be short.
    fn expected_len(&self, chunk_id: u64) -> usize {
        let chunk_size = self.params.chunk_size as u64;
        let start = chunk_id * chunk_size;
        self.size.saturating_sub(start).min(chunk_size) as usize
    }

    fn chunk_data(&mut self, chunk_id: u64) -> Result<&[u8]> {
        let cached = matches!(&self.chunk, Some((id, _)) if *id == chunk_id);
        if !cached {
            let data = self.load_chunk(chunk_id)?;
            self.chunk = Some((chunk_id, data));
        }
        match &self.chunk {
            Some((_, data)) => Ok(data.as_slice()),
            None => Err(BevyError::ShortChunk {
                chunk: chunk_id,
                expected: self.expected_len(chunk_id),
                got: 0,
            }),
        }
    }

    fn load_chunk(&mut self, chunk_id: u64) -> Result<Vec<u8>> {
        let cps = self.params.chunks_per_segment as u64;
        let bevy = chunk_id / cps;
        let within = (chunk_id % cps) as usize;
        self.load_index(bevy)?;
        let index_blob = index_name(&self.urn, bevy);
        let (start, end) = self
            .index
            .as_ref()
            .and_then(|(_, idx)| idx.chunk_range(within))
            .ok_or_else(|| BevyError::CorruptIndex {
                name: index_blob,
                reason: format!("no entry for chunk {within}"),
            })?;
        let compressed = self.store.read_range(
            &bevy_name(&self.urn, bevy),
            start as u64,
            (end - start) as usize,
        )?;
        let data = decompress_chunk(
            chunk_id,
            &compressed,
            self.params.compression,
            self.params.chunk_size as usize,
        )?;
        self.stats.chunks_decompressed += 1;
        let expected = self.expected_len(chunk_id);
        if data.len() != expected {
            return Err(BevyError::ShortChunk {
                chunk: chunk_id,
                expected,
                got: data.len(),
            });
        }
        Ok(data)
    }

    fn load_index(&mut self, bevy: u64) -> Result<()> {
        if matches!(&self.index, Some((n, _)) if *n == bevy) {
            return Ok(());
        }
        let name = index_name(&self.urn, bevy);
        debug!("Fetching bevy index {}", name);
        let raw = self.store.get(&name)?;
        let index = BevyIndex::decode(&name, &raw)?;
        self.stats.index_fetches += 1;
        self.index = Some((bevy, index));
        Ok(())
    }
}

impl<S: BlobStore + ?Sized> Read for BevyReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match BevyReader::read(self, buf).map_err(io::Error::other)? {
            ReadOutcome::Data(n) => Ok(n),
            ReadOutcome::EndOfStream => Ok(0),
        }
    }
}

impl<S: BlobStore + ?Sized> Seek for BevyReader<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.size.checked_add_signed(d),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.position = target;
        Ok(target)
    }
}
