//! BPS ("beat") patch encoder and decoder
//!
//! Layout:
//! - `"BPS1"` magic
//! - varint source size, target size, metadata size, then the metadata
//! - actions, each a varint `((length - 1) << 2) | kind`; copies are
//!   followed by a signed relative offset
//! - CRC-32 of source, target and of the patch so far (little-endian)

use std::collections::HashMap;

use tracing::debug;

use super::crc32::{crc32, read_crc, write_crc};
use super::varint::{read_signed_varint, read_varint, write_signed_varint, write_varint};
use crate::common::{ChecksumTarget, PatchError, Result};

pub const BPS_MAGIC: &[u8; 4] = b"BPS1";

/// Three trailing CRC-32 values
const TRAILER_LEN: usize = 12;

/// Bytes hashed per source index entry; also the shortest copy worth encoding
const WINDOW: usize = 4;

/// One decoded BPS action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpsAction<'a> {
    /// Copy `length` bytes from the source at the current output offset
    SourceRead { length: usize },
    /// Copy literal bytes stored in the patch
    TargetRead { data: &'a [u8] },
    /// Copy from the source at the source cursor moved by `delta`
    SourceCopy { length: usize, delta: i64 },
    /// Copy from already produced output at the target cursor moved by `delta`
    TargetCopy { length: usize, delta: i64 },
}

impl BpsAction<'_> {
    /// The two-bit action kind stored in the descriptor
    pub fn kind(&self) -> u64 {
        match self {
            BpsAction::SourceRead { .. } => 0,
            BpsAction::TargetRead { .. } => 1,
            BpsAction::SourceCopy { .. } => 2,
            BpsAction::TargetCopy { .. } => 3,
        }
    }

    /// Number of output bytes the action produces
    pub fn length(&self) -> usize {
        match self {
            BpsAction::SourceRead { length }
            | BpsAction::SourceCopy { length, .. }
            | BpsAction::TargetCopy { length, .. } => *length,
            BpsAction::TargetRead { data } => data.len(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_varint(out, ((self.length() as u64 - 1) << 2) | self.kind());
        match self {
            BpsAction::SourceRead { .. } => {}
            BpsAction::TargetRead { data } => out.extend_from_slice(data),
            BpsAction::SourceCopy { delta, .. } | BpsAction::TargetCopy { delta, .. } => {
                write_signed_varint(out, *delta);
            }
        }
    }
}

/// Encoder tuning
#[derive(Debug, Clone)]
pub struct BpsOptions {
    /// Shortest source match emitted as SourceRead/SourceCopy (at least 4)
    pub min_match: usize,
    /// Source positions remembered per 4-byte window when searching for copies
    pub max_candidates: usize,
}

impl Default for BpsOptions {
    fn default() -> Self {
        Self {
            min_match: WINDOW,
            max_candidates: 32,
        }
    }
}

/// A parsed BPS patch borrowing from the patch bytes
#[derive(Debug, Clone)]
pub struct BpsPatch<'a> {
    pub source_size: usize,
    pub target_size: usize,
    pub metadata: &'a [u8],
    pub actions: Vec<BpsAction<'a>>,
    pub source_crc: u32,
    pub target_crc: u32,
    pub patch_crc: u32,
}

impl<'a> BpsPatch<'a> {
    /// Parse and checksum-verify a patch without applying it
    pub fn parse(patch: &'a [u8]) -> Result<Self> {
        if patch.len() < BPS_MAGIC.len() + TRAILER_LEN || !patch.starts_with(BPS_MAGIC) {
            return Err(PatchError::format("BPS", "missing 'BPS1' header"));
        }

        let body_end = patch.len() - TRAILER_LEN;
        let source_crc = read_crc(patch, body_end).unwrap_or_default();
        let target_crc = read_crc(patch, body_end + 4).unwrap_or_default();
        let patch_crc = read_crc(patch, body_end + 8).unwrap_or_default();

        // Checked before decoding so a corrupted action stream is reported as
        // a checksum failure instead of whatever the garbage decodes to.
        let actual = crc32(&patch[..body_end + 8]);
        if actual != patch_crc {
            return Err(PatchError::checksum(ChecksumTarget::Patch, patch_crc, actual));
        }

        let mut input = &patch[BPS_MAGIC.len()..body_end];
        let source_size = read_size(&mut input)?;
        let target_size = read_size(&mut input)?;
        let metadata_size = read_size(&mut input)?;
        if metadata_size > input.len() {
            return Err(PatchError::format("BPS", "metadata extends past end of patch"));
        }
        let (metadata, mut input) = input.split_at(metadata_size);

        let mut actions = Vec::new();
        let mut produced = 0usize;
        while !input.is_empty() {
            let descriptor = read_varint(&mut input)?;
            let length = usize::try_from((descriptor >> 2) + 1)
                .map_err(|_| PatchError::format("BPS", "action length out of range"))?;

            let action = match descriptor & 3 {
                0 => BpsAction::SourceRead { length },
                1 => {
                    if length > input.len() {
                        return Err(PatchError::format("BPS", "TargetRead runs past end of patch"));
                    }
                    let (data, rest) = input.split_at(length);
                    input = rest;
                    BpsAction::TargetRead { data }
                }
                2 => BpsAction::SourceCopy {
                    length,
                    delta: read_signed_varint(&mut input)?,
                },
                _ => BpsAction::TargetCopy {
                    length,
                    delta: read_signed_varint(&mut input)?,
                },
            };

            produced = produced
                .checked_add(length)
                .filter(|&total| total <= target_size)
                .ok_or_else(|| PatchError::format("BPS", "actions overrun the target size"))?;
            actions.push(action);
        }

        Ok(Self {
            source_size,
            target_size,
            metadata,
            actions,
            source_crc,
            target_crc,
            patch_crc,
        })
    }

    /// Metadata as text, when present and valid UTF-8
    pub fn metadata_str(&self) -> Option<&'a str> {
        if self.metadata.is_empty() {
            return None;
        }
        std::str::from_utf8(self.metadata).ok()
    }

    /// Reconstruct the target from `source`
    pub fn apply(&self, source: &[u8]) -> Result<Vec<u8>> {
        if source.len() != self.source_size {
            return Err(PatchError::SizeMismatch {
                what: "source",
                expected: self.source_size,
                actual: source.len(),
            });
        }

        let actual = crc32(source);
        if actual != self.source_crc {
            return Err(PatchError::checksum(ChecksumTarget::Source, self.source_crc, actual));
        }

        // Declared sizes are untrusted; only literal and source bytes are known to exist.
        let literal: usize = self
            .actions
            .iter()
            .map(|action| match action {
                BpsAction::TargetRead { data } => data.len(),
                _ => 0,
            })
            .sum();
        let mut target: Vec<u8> = Vec::with_capacity(self.target_size.min(source.len() + literal));
        let mut source_cursor: usize = 0;
        let mut target_cursor: usize = 0;

        for action in &self.actions {
            match *action {
                BpsAction::SourceRead { length } => {
                    let data = source_slice(source, target.len(), length)
                        .ok_or_else(|| PatchError::format("BPS", "SourceRead past end of source"))?;
                    target.extend_from_slice(data);
                }
                BpsAction::TargetRead { data } => target.extend_from_slice(data),
                BpsAction::SourceCopy { length, delta } => {
                    source_cursor = move_cursor(source_cursor, delta, "SourceCopy")?;
                    let data = source_slice(source, source_cursor, length)
                        .ok_or_else(|| PatchError::format("BPS", "SourceCopy past end of source"))?;
                    target.extend_from_slice(data);
                    source_cursor += length;
                }
                BpsAction::TargetCopy { length, delta } => {
                    target_cursor = move_cursor(target_cursor, delta, "TargetCopy")?;
                    if target_cursor >= target.len() {
                        return Err(PatchError::format("BPS", "TargetCopy reads unwritten output"));
                    }
                    target
                        .try_reserve(length)
                        .map_err(|_| PatchError::format("BPS", "TargetCopy length too large"))?;
                    // Byte at a time: the copy may overlap the bytes it produces.
                    for _ in 0..length {
                        let byte = target[target_cursor];
                        target.push(byte);
                        target_cursor += 1;
                    }
                }
            }
        }

        if target.len() != self.target_size {
            return Err(PatchError::SizeMismatch {
                what: "target",
                expected: self.target_size,
                actual: target.len(),
            });
        }

        let actual = crc32(&target);
        if actual != self.target_crc {
            return Err(PatchError::checksum(ChecksumTarget::Target, self.target_crc, actual));
        }

        Ok(target)
    }
}

fn read_size(input: &mut &[u8]) -> Result<usize> {
    usize::try_from(read_varint(input)?)
        .map_err(|_| PatchError::format("BPS", "size does not fit in memory"))
}

fn source_slice(source: &[u8], start: usize, length: usize) -> Option<&[u8]> {
    source.get(start..start.checked_add(length)?)
}

fn move_cursor(cursor: usize, delta: i64, action: &str) -> Result<usize> {
    isize::try_from(delta)
        .ok()
        .and_then(|delta| cursor.checked_add_signed(delta))
        .ok_or_else(|| PatchError::format("BPS", format!("{action} cursor moved out of range")))
}

/// Apply a BPS patch to `source`
pub fn apply(source: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    BpsPatch::parse(patch)?.apply(source)
}

/// Create a BPS patch turning `source` into `target`
pub fn create(source: &[u8], target: &[u8]) -> Vec<u8> {
    create_with_options(source, target, &BpsOptions::default())
}

pub fn create_with_options(source: &[u8], target: &[u8], options: &BpsOptions) -> Vec<u8> {
    let patch = BpsEncoder::new(source, target, options).encode();
    debug!(
        source_len = source.len(),
        target_len = target.len(),
        patch_len = patch.len(),
        "created BPS patch"
    );
    patch
}

/// Greedy action selector
///
/// At each output position: a same-offset SourceRead of at least `min_match`
/// bytes wins; otherwise the longest SourceCopy found through the window
/// index; otherwise literal TargetRead bytes up to the next position where
/// either kind of match becomes available.
struct BpsEncoder<'a> {
    source: &'a [u8],
    target: &'a [u8],
    min_match: usize,
    index: HashMap<[u8; WINDOW], Vec<usize>>,
    source_cursor: usize,
}

impl<'a> BpsEncoder<'a> {
    fn new(source: &'a [u8], target: &'a [u8], options: &BpsOptions) -> Self {
        let max_candidates = options.max_candidates.max(1);
        let mut index: HashMap<[u8; WINDOW], Vec<usize>> = HashMap::new();
        for (offset, window) in source.windows(WINDOW).enumerate() {
            let key = [window[0], window[1], window[2], window[3]];
            let bucket = index.entry(key).or_default();
            if bucket.len() < max_candidates {
                bucket.push(offset);
            }
        }

        Self {
            source,
            target,
            min_match: options.min_match.max(WINDOW),
            index,
            source_cursor: 0,
        }
    }

    fn encode(mut self) -> Vec<u8> {
        let mut patch = Vec::with_capacity(self.target.len() / 4 + 32);
        patch.extend_from_slice(BPS_MAGIC);
        write_varint(&mut patch, self.source.len() as u64);
        write_varint(&mut patch, self.target.len() as u64);
        write_varint(&mut patch, 0);

        let mut offset = 0;
        while offset < self.target.len() {
            let action = self.next_action(offset);
            action.write(&mut patch);
            offset += action.length();
        }

        write_crc(&mut patch, crc32(self.source));
        write_crc(&mut patch, crc32(self.target));
        let patch_crc = crc32(&patch);
        write_crc(&mut patch, patch_crc);
        patch
    }

    fn next_action(&mut self, offset: usize) -> BpsAction<'a> {
        let read_len = self.source_read_len(offset, usize::MAX);
        if read_len >= self.min_match {
            return BpsAction::SourceRead { length: read_len };
        }

        if let Some((copy_offset, length)) = self.best_source_copy(offset) {
            let delta = copy_offset as i64 - self.source_cursor as i64;
            self.source_cursor = copy_offset + length;
            return BpsAction::SourceCopy { length, delta };
        }

        let target = self.target;
        let mut end = offset + 1;
        while end < target.len() && !self.match_available(end) {
            end += 1;
        }
        BpsAction::TargetRead {
            data: &target[offset..end],
        }
    }

    fn source_read_len(&self, offset: usize, limit: usize) -> usize {
        match self.source.get(offset..) {
            Some(source) => common_prefix(source, &self.target[offset..], limit),
            None => 0,
        }
    }

    /// Longest source match for the target bytes at `offset`
    ///
    /// Ties go to the candidate closest to the source cursor, which keeps the
    /// encoded relative offset short.
    fn best_source_copy(&self, offset: usize) -> Option<(usize, usize)> {
        let candidates = self.candidates(offset)?;
        let target = &self.target[offset..];

        let mut best: Option<(usize, usize)> = None;
        for &candidate in candidates {
            let length = common_prefix(&self.source[candidate..], target, usize::MAX);
            if length < self.min_match {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_offset, best_len)) => {
                    length > best_len
                        || (length == best_len
                            && candidate.abs_diff(self.source_cursor)
                                < best_offset.abs_diff(self.source_cursor))
                }
            };
            if better {
                best = Some((candidate, length));
            }
        }
        best
    }

    fn match_available(&self, offset: usize) -> bool {
        if self.source_read_len(offset, self.min_match) >= self.min_match {
            return true;
        }
        let target = &self.target[offset..];
        self.candidates(offset).is_some_and(|candidates| {
            candidates
                .iter()
                .any(|&c| common_prefix(&self.source[c..], target, self.min_match) >= self.min_match)
        })
    }

    fn candidates(&self, offset: usize) -> Option<&[usize]> {
        let window = self.target.get(offset..offset + WINDOW)?;
        self.index
            .get(&[window[0], window[1], window[2], window[3]])
            .map(Vec::as_slice)
    }
}

fn common_prefix(a: &[u8], b: &[u8], limit: usize) -> usize {
    a.iter()
        .zip(b)
        .take(limit)
        .take_while(|(x, y)| x == y)
        .count()
}
