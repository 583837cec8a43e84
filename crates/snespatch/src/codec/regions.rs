//! Changed-region detection between two ROM images

/// One contiguous span where two buffers differ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRegion {
    pub offset: usize,
    pub length: usize,
}

impl PatchRegion {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// One past the last byte of the region
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Summary of what a patch between two buffers would touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPreview {
    pub changed_bytes: usize,
    pub num_regions: usize,
    pub regions: Vec<PatchRegion>,
}

/// Find every maximal run where `modified` differs from `original`
///
/// Scans the common prefix length, then reports bytes appended past the end
/// of `original` as one trailing region. Bytes removed by a shorter
/// `modified` are not reported.
pub fn find_changed_regions(original: &[u8], modified: &[u8]) -> Vec<PatchRegion> {
    let mut regions = Vec::new();
    let min_len = original.len().min(modified.len());
    let mut i = 0;

    while i < min_len {
        while i < min_len && original[i] == modified[i] {
            i += 1;
        }

        if i < min_len {
            let start = i;
            while i < min_len && original[i] != modified[i] {
                i += 1;
            }
            regions.push(PatchRegion::new(start, i - start));
        }
    }

    if modified.len() > original.len() {
        regions.push(PatchRegion::new(
            original.len(),
            modified.len() - original.len(),
        ));
    }

    regions
}

/// Count changed bytes and regions for display before exporting a patch
pub fn patch_preview(original: &[u8], modified: &[u8]) -> PatchPreview {
    if original.is_empty() || modified.is_empty() {
        return PatchPreview::default();
    }

    let regions = find_changed_regions(original, modified);
    PatchPreview {
        changed_bytes: regions.iter().map(|r| r.length).sum(),
        num_regions: regions.len(),
        regions,
    }
}
