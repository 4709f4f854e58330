//! Image streams: bevy-encoded byte streams registered in the metadata graph.
//!
//! [`ImageStreamWriter`] drives a [`BevyWriter`] and records, as it goes,
//! which segments the volume contains. The stream's own facts (type, size,
//! chunking parameters, compression and content hash) are only added on
//! [`ImageStreamWriter::close`]; a writer dropped without closing leaves
//! orphaned segments but no stream.

use std::io::{self, Read, Seek, SeekFrom};

use aff4_bevy::{
    BevyReader, BevyWriter, BlobStore, DigestMethod, ReadOutcome, ReaderStats, StreamParams,
};
use log::info;

use crate::consts::{
    CHUNKS_IN_SEGMENT, CHUNK_SIZE, COMPRESSION_METHOD, CONTAINS, HASH, IMAGE_STREAM, SIZE,
    STORED, TYPE,
};
use crate::quadstore::QuadStore;
use crate::term::Object;
use crate::Result;

/// Positioned reads over any stream in a container.
///
/// `Data(n)` is short only at the end of the stream.
pub trait RandomRead {
    fn urn(&self) -> &str;

    fn size(&self) -> u64;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Up to `len` bytes from `offset`; empty at or past the end.
    fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        match self.read_at(offset, &mut buf)? {
            ReadOutcome::Data(n) => buf.truncate(n),
            ReadOutcome::EndOfStream => buf.clear(),
        }
        Ok(buf)
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let size = self.size() as usize;
        self.read_range(0, size)
    }
}

/// What the graph records about a closed image stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStreamInfo {
    pub urn: String,
    pub size: u64,
    pub params: StreamParams,
    pub digest_method: DigestMethod,
    /// Lowercase hex.
    pub digest: String,
}

pub struct ImageStreamWriter<'c, S: BlobStore + ?Sized> {
    bevy: BevyWriter<'c, S>,
    graph: &'c mut QuadStore,
    volume: String,
}

impl<'c, S: BlobStore + ?Sized> ImageStreamWriter<'c, S> {
    pub(crate) fn new(
        store: &'c S,
        graph: &'c mut QuadStore,
        volume: &str,
        urn: String,
        params: StreamParams,
        digest: DigestMethod,
    ) -> Result<Self> {
        Ok(Self {
            bevy: BevyWriter::new(store, urn, params, digest)?,
            graph,
            volume: volume.to_string(),
        })
    }

    pub fn urn(&self) -> &str {
        self.bevy.urn()
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.bevy.size()
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = self.bevy.write(data)?;
        self.record_segments();
        Ok(n)
    }

    /// Persist completed chunks; see [`BevyWriter::flush`].
    pub fn flush(&mut self) -> Result<()> {
        self.bevy.flush()?;
        self.record_segments();
        Ok(())
    }

    pub fn close(self) -> Result<ImageStreamInfo> {
        let (_, info) = self.finish()?;
        Ok(info)
    }

    fn record_segments(&mut self) {
        for seg in self.bevy.take_persisted() {
            let volume = self.volume.as_str();
            self.graph
                .insert(volume, volume, CONTAINS, Object::resource(seg.bevy));
            self.graph
                .insert(volume, volume, CONTAINS, Object::resource(seg.index));
        }
    }

    /// Close the stream and hand the graph borrow back to the caller.
    pub(crate) fn finish(self) -> Result<(&'c mut QuadStore, ImageStreamInfo)> {
        let ImageStreamWriter {
            bevy,
            graph,
            volume,
        } = self;
        let summary = bevy.close()?;
        let v = volume.as_str();
        for seg in summary.bevies {
            graph.insert(v, v, CONTAINS, Object::resource(seg.bevy));
            graph.insert(v, v, CONTAINS, Object::resource(seg.index));
        }
        let urn = summary.urn.as_str();
        let params = summary.params;
        graph.insert(v, urn, TYPE, Object::resource(IMAGE_STREAM));
        graph.insert(v, urn, STORED, Object::resource(v));
        graph.insert(v, v, CONTAINS, Object::resource(urn));
        graph.insert(v, urn, SIZE, Object::long(summary.size));
        graph.insert(v, urn, CHUNK_SIZE, Object::int(params.chunk_size));
        graph.insert(
            v,
            urn,
            CHUNKS_IN_SEGMENT,
            Object::int(params.chunks_per_segment),
        );
        graph.insert(
            v,
            urn,
            COMPRESSION_METHOD,
            Object::resource(params.compression.uri()),
        );
        graph.insert(
            v,
            urn,
            HASH,
            Object::typed(summary.digest.clone(), summary.digest_method.uri()),
        );
        info!(
            "Closed image stream {} ({} bytes, {} chunks)",
            urn, summary.size, summary.chunks
        );
        let info = ImageStreamInfo {
            urn: summary.urn,
            size: summary.size,
            params,
            digest_method: summary.digest_method,
            digest: summary.digest,
        };
        Ok((graph, info))
    }
}

impl<S: BlobStore + ?Sized> io::Write for ImageStreamWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ImageStreamWriter::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        ImageStreamWriter::flush(self).map_err(io::Error::other)
    }
}

/// Random-access reader over a closed image stream.
pub struct ImageStreamReader<'c, S: BlobStore + ?Sized> {
    bevy: BevyReader<'c, S>,
    info: ImageStreamInfo,
}

impl<'c, S: BlobStore + ?Sized> ImageStreamReader<'c, S> {
    pub(crate) fn new(store: &'c S, info: ImageStreamInfo) -> Result<Self> {
        Ok(Self {
            bevy: BevyReader::new(store, info.urn.clone(), info.params, info.size)?,
            info,
        })
    }

    pub fn info(&self) -> &ImageStreamInfo {
        &self.info
    }

    pub fn stats(&self) -> ReaderStats {
        self.bevy.stats()
    }

    /// Inflate one chunk without touching the others.
    pub fn read_chunk(&mut self, chunk_id: u64) -> Result<Vec<u8>> {
        Ok(self.bevy.read_chunk(chunk_id)?)
    }
}

impl<S: BlobStore + ?Sized> RandomRead for ImageStreamReader<'_, S> {
    fn urn(&self) -> &str {
        &self.info.urn
    }

    fn size(&self) -> u64 {
        self.info.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        Ok(self.bevy.read_at(offset, buf)?)
    }
}

impl<S: BlobStore + ?Sized> Read for ImageStreamReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.bevy, buf)
    }
}

impl<S: BlobStore + ?Sized> Seek for ImageStreamReader<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(&mut self.bevy, pos)
    }
}
