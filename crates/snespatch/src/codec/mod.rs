//! Binary patch codecs
//!
//! Two formats are supported:
//! 1. BPS, a copy/insert delta with CRC-32 verification
//! 2. IPS, offset/payload records with an optional truncation trailer
//!
//! Both sides work on borrowed byte slices and return owned buffers.

pub mod bps;
pub mod crc32;
pub mod ips;
pub mod regions;
pub mod varint;

use std::fmt;
use std::path::Path;

use tracing::info;

use crate::common::{PatchError, Result};

pub use bps::{BpsAction, BpsOptions, BpsPatch};
pub use ips::{IpsOptions, IpsPatch, IpsRecord};
pub use regions::{find_changed_regions, patch_preview, PatchPreview, PatchRegion};

/// Patch container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchFormat {
    Bps,
    Ips,
}

impl PatchFormat {
    /// Identify a patch by its magic bytes
    pub fn detect(patch: &[u8]) -> Option<Self> {
        if patch.starts_with(bps::BPS_MAGIC) {
            Some(PatchFormat::Bps)
        } else if patch.starts_with(ips::IPS_MAGIC) {
            Some(PatchFormat::Ips)
        } else {
            None
        }
    }

    /// Pick a format from a file name's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("bps") {
            Some(PatchFormat::Bps)
        } else if ext.eq_ignore_ascii_case("ips") {
            Some(PatchFormat::Ips)
        } else {
            None
        }
    }

    /// Conventional file extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            PatchFormat::Bps => "bps",
            PatchFormat::Ips => "ips",
        }
    }
}

impl fmt::Display for PatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchFormat::Bps => write!(f, "BPS"),
            PatchFormat::Ips => write!(f, "IPS"),
        }
    }
}

/// Diff `original` against `modified` in the given format
pub fn create_patch(format: PatchFormat, original: &[u8], modified: &[u8]) -> Result<Vec<u8>> {
    match format {
        PatchFormat::Bps => Ok(bps::create(original, modified)),
        PatchFormat::Ips => ips::create(original, modified),
    }
}

/// Apply `patch` to `source`, detecting the format when none is given
pub fn apply_patch(format: Option<PatchFormat>, source: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let format = match format.or_else(|| PatchFormat::detect(patch)) {
        Some(format) => format,
        None => return Err(PatchError::format("patch", "unrecognized patch header")),
    };

    match format {
        PatchFormat::Bps => bps::apply(source, patch),
        PatchFormat::Ips => ips::apply(source, patch),
    }
}

/// Generate a patch and write it to `path`
pub fn export_patch(
    format: PatchFormat,
    original: &[u8],
    modified: &[u8],
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();

    if original.is_empty() || modified.is_empty() {
        return Err(PatchError::invalid_argument("ROM data cannot be empty"));
    }
    if path.as_os_str().is_empty() {
        return Err(PatchError::invalid_argument("output path cannot be empty"));
    }
    if format == PatchFormat::Ips {
        ips::check_size_limit(modified)?;
    }

    let patch = create_patch(format, original, modified)?;
    std::fs::write(path, &patch)?;

    info!(
        %format,
        path = %path.display(),
        bytes = patch.len(),
        "exported patch"
    );
    Ok(())
}
