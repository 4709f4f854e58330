//! Content verification: stream digests, digests of byte ranges, and a
//! whole-container report that also covers warrants.

use aff4_bevy::{BlobStore, DigestMethod, ReadOutcome};
use log::{info, warn};

use crate::container::Container;
use crate::provenance::{verify_all_warrants, WarrantReport};
use crate::stream::RandomRead;
use crate::Result;

const READ_BLOCK: usize = 1 << 20;

/// Outcome of re-hashing one image stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVerification {
    pub urn: String,
    pub method: Option<DigestMethod>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// Set when the stream could not be read or described.
    pub error: Option<String>,
}

impl StreamVerification {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.actual.is_some() && self.actual == self.expected
    }
}

/// Recompute the content digest of image stream `urn` and compare it to the
/// recorded one.
pub fn verify_stream<S: BlobStore>(
    container: &Container<S>,
    urn: &str,
) -> Result<StreamVerification> {
    let info = container.image_stream_info(urn)?;
    let mut reader = container.open_image_stream(urn)?;
    let mut hasher = info.digest_method.hasher();
    let mut buf = vec![0u8; READ_BLOCK];
    let mut offset = 0u64;
    while let ReadOutcome::Data(n) = reader.read_at(offset, &mut buf)? {
        hasher.update(&buf[..n]);
        offset += n as u64;
    }
    let actual = hasher.finalize_hex();
    if actual != info.digest {
        warn!(
            "Digest mismatch for {}: expected {}, got {}",
            urn, info.digest, actual
        );
    }
    Ok(StreamVerification {
        urn: urn.to_string(),
        method: Some(info.digest_method),
        expected: Some(info.digest),
        actual: Some(actual),
        error: None,
    })
}

/// An expected digest for `[offset, offset + length)` of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeCheck {
    pub offset: u64,
    pub length: u64,
    pub method: DigestMethod,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResult {
    pub check: RangeCheck,
    pub actual: String,
}

impl RangeResult {
    pub fn matches(&self) -> bool {
        self.actual.eq_ignore_ascii_case(&self.check.expected)
    }
}

/// Check many ranges of one stream in a single forward pass.
///
/// Ranges are sorted by offset and may overlap; bytes between ranges are
/// skipped, not read. Results come back in offset order. A range running
/// past the end of the stream is hashed over the bytes that exist.
pub fn verify_ranges(
    reader: &mut dyn RandomRead,
    checks: Vec<RangeCheck>,
) -> Result<Vec<RangeResult>> {
    let mut pending = checks;
    pending.sort_by_key(|c| (c.offset, c.length));
    let size = reader.size();
    let mut results: Vec<Option<RangeResult>> = vec![None; pending.len()];
    let mut active: Vec<(usize, aff4_bevy::StreamHasher)> = Vec::new();
    let mut next = 0usize;
    let mut pos = 0u64;
    let mut buf = vec![0u8; READ_BLOCK];

    loop {
        // Activate every range starting at or before `pos`.
        while next < pending.len() && pending[next].offset <= pos {
            active.push((next, pending[next].method.hasher()));
            next += 1;
        }
        // Retire ranges that are complete (or cannot grow any further).
        active.retain(|(i, hasher)| {
            let c = &pending[*i];
            let end = c.offset.saturating_add(c.length).min(size);
            if pos >= end {
                results[*i] = Some(RangeResult {
                    check: c.clone(),
                    actual: hasher.clone().finalize_hex(),
                });
                false
            } else {
                true
            }
        });
        if active.is_empty() {
            if next >= pending.len() {
                break;
            }
            pos = pending[next].offset;
            continue;
        }
        if pos >= size {
            break;
        }
        // Read up to the nearest boundary so no range sees bytes outside itself.
        let mut limit = pos + buf.len() as u64;
        if next < pending.len() {
            limit = limit.min(pending[next].offset);
        }
        for (i, _) in &active {
            let c = &pending[*i];
            limit = limit.min(c.offset.saturating_add(c.length));
        }
        let len = (limit - pos) as usize;
        let n = match reader.read_at(pos, &mut buf[..len])? {
            ReadOutcome::Data(n) => n,
            ReadOutcome::EndOfStream => break,
        };
        for (_, hasher) in active.iter_mut() {
            hasher.update(&buf[..n]);
        }
        pos += n as u64;
    }
    Ok(results.into_iter().flatten().collect())
}

/// Everything [`verify_container`] checked.
#[derive(Debug, Clone)]
pub struct ContainerReport {
    pub streams: Vec<StreamVerification>,
    pub warrants: Vec<WarrantReport>,
}

impl ContainerReport {
    pub fn is_ok(&self) -> bool {
        self.streams.iter().all(StreamVerification::is_ok)
            && self.warrants.iter().all(WarrantReport::is_valid)
    }
}

/// Verify every image stream and every warrant. Individual failures are
/// recorded in the report; nothing short-circuits.
pub fn verify_container<S: BlobStore>(container: &Container<S>) -> ContainerReport {
    let streams: Vec<StreamVerification> = container
        .image_streams()
        .into_iter()
        .map(|urn| {
            verify_stream(container, &urn).unwrap_or_else(|e| {
                warn!("Could not verify {}: {}", urn, e);
                StreamVerification {
                    urn,
                    method: None,
                    expected: None,
                    actual: None,
                    error: Some(e.to_string()),
                }
            })
        })
        .collect();
    let warrants = verify_all_warrants(container);
    let report = ContainerReport { streams, warrants };
    info!(
        "Verified {} streams and {} warrants: {}",
        report.streams.len(),
        report.warrants.len(),
        if report.is_ok() { "ok" } else { "FAILED" }
    );
    report
}
