//! IPS patch encoder and decoder
//!
//! `"PATCH"`, then records of a 24-bit big-endian offset and a 16-bit size
//! followed by that many bytes. A size of zero marks an RLE record holding a
//! 16-bit run length and one fill byte. `"EOF"` ends the record list and may
//! be followed by a 24-bit length the output is truncated to.

use tracing::debug;

use super::regions::find_changed_regions;
use crate::common::{PatchError, Result};

pub const IPS_MAGIC: &[u8; 5] = b"PATCH";
pub const IPS_EOF: &[u8; 3] = b"EOF";

/// Highest offset a record can address
pub const IPS_MAX_OFFSET: usize = 0xFF_FFFF;

/// Largest payload a single record can carry
pub const IPS_MAX_RECORD: usize = 0xFFFF;

/// Offset that would read back as the `"EOF"` marker
const EOF_OFFSET: usize = 0x45_4F46;

/// Shortest run worth an RLE record
const MIN_RLE_RUN: usize = 3;

/// One IPS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpsRecord<'a> {
    Literal { offset: usize, data: &'a [u8] },
    Rle { offset: usize, length: usize, value: u8 },
}

impl IpsRecord<'_> {
    pub fn offset(&self) -> usize {
        match self {
            IpsRecord::Literal { offset, .. } | IpsRecord::Rle { offset, .. } => *offset,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            IpsRecord::Literal { data, .. } => data.len(),
            IpsRecord::Rle { length, .. } => *length,
        }
    }

    /// One past the last byte the record writes
    pub fn end(&self) -> usize {
        self.offset() + self.length()
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_u24(out, self.offset());
        match self {
            IpsRecord::Literal { data, .. } => {
                write_u16(out, data.len());
                out.extend_from_slice(data);
            }
            IpsRecord::Rle { length, value, .. } => {
                write_u16(out, 0);
                write_u16(out, *length);
                out.push(*value);
            }
        }
    }
}

/// Encoder tuning
#[derive(Debug, Clone)]
pub struct IpsOptions {
    /// Emit runs of one repeated byte as RLE records
    pub rle: bool,
    /// Append the truncation extension when `modified` is shorter
    pub truncate: bool,
}

impl Default for IpsOptions {
    fn default() -> Self {
        Self {
            rle: true,
            truncate: false,
        }
    }
}

/// A parsed IPS patch borrowing from the patch bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpsPatch<'a> {
    pub records: Vec<IpsRecord<'a>>,
    pub truncate_to: Option<usize>,
}

impl<'a> IpsPatch<'a> {
    pub fn parse(patch: &'a [u8]) -> Result<Self> {
        let Some(mut input) = patch.strip_prefix(IPS_MAGIC.as_slice()) else {
            return Err(PatchError::format("IPS", "missing 'PATCH' header"));
        };

        let mut records = Vec::new();
        loop {
            let marker = take(&mut input, 3, "record offset")?;
            if marker == IPS_EOF {
                break;
            }
            let offset = be_value(marker);

            let size = be_value(take(&mut input, 2, "record size")?);
            if size == 0 {
                let length = be_value(take(&mut input, 2, "RLE length")?);
                let value = take(&mut input, 1, "RLE value")?[0];
                records.push(IpsRecord::Rle {
                    offset,
                    length,
                    value,
                });
            } else {
                let data = take(&mut input, size, "record payload")?;
                records.push(IpsRecord::Literal { offset, data });
            }
        }

        let truncate_to = match input.len() {
            0 => None,
            3 => Some(be_value(input)),
            n => {
                return Err(PatchError::format(
                    "IPS",
                    format!("{n} unexpected bytes after EOF marker"),
                ));
            }
        };

        Ok(Self {
            records,
            truncate_to,
        })
    }

    /// Size of the output when applied to a source of `source_len` bytes
    pub fn output_len(&self, source_len: usize) -> usize {
        if let Some(len) = self.truncate_to {
            return len;
        }
        self.records
            .iter()
            .map(IpsRecord::end)
            .fold(source_len, usize::max)
    }

    pub fn apply(&self, source: &[u8]) -> Result<Vec<u8>> {
        let grown = self
            .records
            .iter()
            .map(IpsRecord::end)
            .fold(source.len(), usize::max);

        let mut target = source.to_vec();
        target.resize(grown, 0);

        for record in &self.records {
            match record {
                IpsRecord::Literal { offset, data } => {
                    target[*offset..*offset + data.len()].copy_from_slice(data);
                }
                IpsRecord::Rle {
                    offset,
                    length,
                    value,
                } => target[*offset..*offset + *length].fill(*value),
            }
        }

        if let Some(len) = self.truncate_to {
            target.resize(len, 0);
        }

        Ok(target)
    }
}

fn take<'a>(input: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    if input.len() < len {
        return Err(PatchError::format("IPS", format!("truncated {what}")));
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(head)
}

fn be_value(bytes: &[u8]) -> usize {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | usize::from(b))
}

fn write_u24(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&[(value >> 16) as u8, (value >> 8) as u8, value as u8]);
}

fn write_u16(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&[(value >> 8) as u8, value as u8]);
}

/// Fail fast when `modified` cannot be addressed by 24-bit offsets
pub fn check_size_limit(modified: &[u8]) -> Result<()> {
    if modified.len() > IPS_MAX_OFFSET {
        return Err(PatchError::SizeLimit {
            size: modified.len(),
            limit: IPS_MAX_OFFSET,
        });
    }
    Ok(())
}

/// Apply an IPS patch to `source`
pub fn apply(source: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    IpsPatch::parse(patch)?.apply(source)
}

/// Create an IPS patch turning `original` into `modified`
///
/// A `modified` shorter than `original` only round-trips with
/// [`IpsOptions::truncate`]; without it the source tail is kept.
pub fn create(original: &[u8], modified: &[u8]) -> Result<Vec<u8>> {
    create_with_options(original, modified, &IpsOptions::default())
}

pub fn create_with_options(original: &[u8], modified: &[u8], options: &IpsOptions) -> Result<Vec<u8>> {
    check_size_limit(modified)?;

    let regions = find_changed_regions(original, modified);
    let mut patch = IPS_MAGIC.to_vec();
    let mut records = 0usize;

    for region in &regions {
        if region.offset > IPS_MAX_OFFSET {
            return Err(PatchError::SizeLimit {
                size: region.end(),
                limit: IPS_MAX_OFFSET,
            });
        }

        let mut offset = region.offset;
        let end = region.end();

        while offset < end {
            if offset == EOF_OFFSET {
                // Start one byte early; the extra byte rewrites its current value.
                offset -= 1;
            }
            let chunk_len = (end - offset).min(IPS_MAX_RECORD);
            let chunk = &modified[offset..offset + chunk_len];
            record_for(offset, chunk, options.rle).write(&mut patch);
            records += 1;
            offset += chunk_len;
        }
    }

    patch.extend_from_slice(IPS_EOF);
    if options.truncate && modified.len() < original.len() {
        write_u24(&mut patch, modified.len());
    }

    debug!(
        regions = regions.len(),
        records,
        patch_len = patch.len(),
        "created IPS patch"
    );
    Ok(patch)
}

fn record_for(offset: usize, chunk: &[u8], rle: bool) -> IpsRecord<'_> {
    let is_run = chunk.len() >= MIN_RLE_RUN && chunk.iter().all(|&b| b == chunk[0]);
    if rle && is_run {
        IpsRecord::Rle {
            offset,
            length: chunk.len(),
            value: chunk[0],
        }
    } else {
        IpsRecord::Literal { offset, data: chunk }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(original: &[u8], modified: &[u8]) {
        let patch = create(original, modified).unwrap();
        assert_eq!(apply(original, &patch).unwrap(), modified);
    }

    #[test]
    fn test_round_trip_growing_and_equal_sizes() {
        round_trip(&[], &[]);
        round_trip(&[], &[1, 2, 3]);
        round_trip(&[5], &[6]);
        round_trip(&[1, 2, 3], &[1, 2, 3, 4, 5]);
        round_trip(&[0; 32], &[0xFF; 40]);
        round_trip(&[1, 2, 3, 4, 5, 6, 7, 8], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_identity_patch_is_empty() {
        let data = vec![0x42u8; 100];
        let patch = create(&data, &data).unwrap();
        assert_eq!(patch, b"PATCHEOF".to_vec());
        assert_eq!(apply(&data, &patch).unwrap(), data);
    }

    #[test]
    fn test_literal_record_layout() {
        let patch = create(&[0, 0, 0, 0], &[0, 0xAB, 0xCD, 0]).unwrap();
        assert_eq!(
            patch,
            vec![
                b'P', b'A', b'T', b'C', b'H', 0x00, 0x00, 0x01, 0x00, 0x02, 0xAB, 0xCD, b'E', b'O',
                b'F'
            ]
        );
    }

    #[test]
    fn test_rle_record_layout() {
        let original = vec![0u8; 0x210];
        let mut modified = original.clone();
        modified[0x200..0x210].fill(0xAA);
        let patch = create(&original, &modified).unwrap();
        assert_eq!(
            &patch[5..13],
            &[0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x10, 0xAA]
        );

        let parsed = IpsPatch::parse(&patch).unwrap();
        assert_eq!(
            parsed.records,
            vec![IpsRecord::Rle {
                offset: 0x200,
                length: 16,
                value: 0xAA
            }]
        );
    }

    #[test]
    fn test_rle_can_be_disabled() {
        let options = IpsOptions {
            rle: false,
            ..IpsOptions::default()
        };
        let patch = create_with_options(&[0; 8], &[9; 8], &options).unwrap();
        let parsed = IpsPatch::parse(&patch).unwrap();
        assert!(matches!(parsed.records[0], IpsRecord::Literal { .. }));
        assert_eq!(parsed.apply(&[0; 8]).unwrap(), vec![9; 8]);
    }

    #[test]
    fn test_long_region_is_split() {
        let original = vec![0u8; 0x20000];
        let modified: Vec<u8> = (0..0x20000).map(|i| (i % 251 + 1) as u8).collect();
        let patch = create(&original, &modified).unwrap();
        let parsed = IpsPatch::parse(&patch).unwrap();

        assert_eq!(parsed.records.len(), 3);
        assert!(parsed.records.iter().all(|r| r.length() <= IPS_MAX_RECORD));
        assert_eq!(parsed.apply(&original).unwrap(), modified);
    }

    #[test]
    fn test_size_limit_rejected_up_front() {
        let original = vec![0u8; 16];
        let modified = vec![1u8; IPS_MAX_OFFSET + 1];
        match create(&original, &modified) {
            Err(PatchError::SizeLimit { size, limit }) => {
                assert_eq!(size, 0x100_0000);
                assert_eq!(limit, IPS_MAX_OFFSET);
            }
            other => panic!("expected size limit error, got {other:?}"),
        }
    }

    #[test]
    fn test_eof_offset_is_avoided() {
        let original = vec![0u8; EOF_OFFSET + 8];
        let mut modified = original.clone();
        modified[EOF_OFFSET] = 1;
        modified[EOF_OFFSET + 1] = 2;

        let patch = create(&original, &modified).unwrap();
        let parsed = IpsPatch::parse(&patch).unwrap();
        assert_eq!(parsed.records[0].offset(), EOF_OFFSET - 1);
        assert_eq!(parsed.apply(&original).unwrap(), modified);
    }

    #[test]
    fn test_truncation_extension() {
        let original = [1u8, 2, 3, 4, 5, 6];
        let modified = [1u8, 9, 3];

        // Without the extension the removed tail survives.
        let plain = create(&original, &modified).unwrap();
        assert_eq!(apply(&original, &plain).unwrap(), vec![1, 9, 3, 4, 5, 6]);

        let options = IpsOptions {
            truncate: true,
            ..IpsOptions::default()
        };
        let patch = create_with_options(&original, &modified, &options).unwrap();
        let parsed = IpsPatch::parse(&patch).unwrap();
        assert_eq!(parsed.truncate_to, Some(3));
        assert_eq!(parsed.output_len(original.len()), 3);
        assert_eq!(parsed.apply(&original).unwrap(), modified.to_vec());
    }

    #[test]
    fn test_apply_grows_target() {
        let mut patch = IPS_MAGIC.to_vec();
        IpsRecord::Literal {
            offset: 10,
            data: &[7, 8],
        }
        .write(&mut patch);
        patch.extend_from_slice(IPS_EOF);

        let output = apply(&[1, 2], &patch).unwrap();
        assert_eq!(output.len(), 12);
        assert_eq!(&output[..2], &[1, 2]);
        assert_eq!(&output[10..], &[7, 8]);
    }

    #[test]
    fn test_malformed_patches() {
        assert!(matches!(apply(&[], b"PATCX"), Err(PatchError::Format { .. })));
        assert!(matches!(apply(&[], b"PATCH"), Err(PatchError::Format { .. })));
        assert!(matches!(apply(&[], b"PATCH\x00\x00\x01\x00\x04\xAA"), Err(PatchError::Format { .. })));
        assert!(matches!(apply(&[], b"PATCHEOF\x00"), Err(PatchError::Format { .. })));
    }
}
