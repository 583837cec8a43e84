//! End-to-end tests for the BPS and IPS codecs

use pretty_assertions::assert_eq;
use snespatch::codec::{bps, ips, patch_preview, IpsOptions, PatchFormat, PatchRegion};
use snespatch::{apply_patch, create_patch, export_patch, ChecksumTarget, PatchError};

/// A 64 KiB ROM-like buffer with some structure
fn sample_rom() -> Vec<u8> {
    (0..0x1_0000u32).map(|i| ((i * 7) ^ (i >> 5)) as u8).collect()
}

fn hack(rom: &[u8]) -> Vec<u8> {
    let mut modified = rom.to_vec();
    modified[0x7FC0..0x7FD5].copy_from_slice(b"SNESPATCH TEST ROM   ");
    modified[0x8000..0x8010].fill(0xEA);
    modified.copy_within(0x100..0x400, 0x9000);
    modified.extend_from_slice(&[0x5A; 0x200]);
    modified
}

#[test]
fn test_bps_round_trip() {
    let original = sample_rom();
    let modified = hack(&original);

    let patch = create_patch(PatchFormat::Bps, &original, &modified).unwrap();
    assert!(patch.starts_with(b"BPS1"));
    assert!(patch.len() < modified.len() / 4);
    assert_eq!(apply_patch(None, &original, &patch).unwrap(), modified);
}

#[test]
fn test_ips_round_trip() {
    let original = sample_rom();
    let modified = hack(&original);

    let patch = create_patch(PatchFormat::Ips, &original, &modified).unwrap();
    assert!(patch.starts_with(b"PATCH"));
    assert!(patch.ends_with(b"EOF"));
    assert_eq!(apply_patch(None, &original, &patch).unwrap(), modified);
}

#[test]
fn test_identity_patches() {
    let rom = sample_rom();
    for format in [PatchFormat::Bps, PatchFormat::Ips] {
        let patch = create_patch(format, &rom, &rom).unwrap();
        assert_eq!(apply_patch(Some(format), &rom, &patch).unwrap(), rom, "{format}");
    }
    assert_eq!(create_patch(PatchFormat::Ips, &rom, &rom).unwrap(), b"PATCHEOF");
}

#[test]
fn test_bps_rejects_wrong_source() {
    let original = sample_rom();
    let modified = hack(&original);
    let patch = bps::create(&original, &modified);

    let mut wrong = original.clone();
    wrong[0x20] ^= 0xFF;
    let err = bps::apply(&wrong, &patch).unwrap_err();
    assert!(matches!(
        err,
        PatchError::Checksum {
            target: ChecksumTarget::Source,
            ..
        }
    ));
}

#[test]
fn test_bps_rejects_corrupt_patch() {
    let original = sample_rom();
    let modified = hack(&original);
    let mut patch = bps::create(&original, &modified);
    let mid = patch.len() / 2;
    patch[mid] ^= 0x01;

    let err = bps::apply(&original, &patch).unwrap_err();
    assert!(matches!(
        err,
        PatchError::Checksum {
            target: ChecksumTarget::Patch,
            ..
        }
    ));
    assert!(err.is_data_loss());
}

#[test]
fn test_ips_truncation_extension() {
    let original = sample_rom();
    let mut modified = original[..0x8000].to_vec();
    modified[0x10] = 0x42;

    let options = IpsOptions {
        truncate: true,
        ..IpsOptions::default()
    };
    let patch = ips::create_with_options(&original, &modified, &options).unwrap();
    assert_eq!(ips::apply(&original, &patch).unwrap(), modified);

    // without the extension the tail of the source survives
    let plain = ips::create(&original, &modified).unwrap();
    let applied = ips::apply(&original, &plain).unwrap();
    assert_eq!(applied.len(), original.len());
    assert_eq!(applied[0x10], 0x42);
}

#[test]
fn test_ips_size_limit() {
    let original = vec![0u8; 16];
    let modified = vec![1u8; 0x100_0000];
    let err = create_patch(PatchFormat::Ips, &original, &modified).unwrap_err();
    assert!(matches!(err, PatchError::SizeLimit { .. }));
}

#[test]
fn test_preview_scenario() {
    let original = vec![0u8; 1024];
    let mut modified = original.clone();
    modified[0x100..0x103].copy_from_slice(&[0xFF, 0xEE, 0xDD]);
    modified[0x200..0x210].fill(0xAA);

    let preview = patch_preview(&original, &modified);
    assert_eq!(preview.changed_bytes, 19);
    assert_eq!(preview.num_regions, 2);
    assert_eq!(
        preview.regions,
        vec![PatchRegion::new(0x100, 3), PatchRegion::new(0x200, 16)]
    );

    for format in [PatchFormat::Bps, PatchFormat::Ips] {
        let patch = create_patch(format, &original, &modified).unwrap();
        assert_eq!(apply_patch(None, &original, &patch).unwrap(), modified);
    }
}

#[test]
fn test_export_patch_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let original = sample_rom();
    let modified = hack(&original);

    for format in [PatchFormat::Bps, PatchFormat::Ips] {
        let path = dir.path().join(format!("hack.{}", format.extension()));
        export_patch(format, &original, &modified, &path).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(PatchFormat::from_path(&path), Some(format));
        assert_eq!(PatchFormat::detect(&written), Some(format));
        assert_eq!(apply_patch(Some(format), &original, &written).unwrap(), modified);
    }
}

#[test]
fn test_export_patch_validates_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.bps");

    let err = export_patch(PatchFormat::Bps, &[], &[1], &path).unwrap_err();
    assert!(matches!(err, PatchError::InvalidArgument(_)));
    let err = export_patch(PatchFormat::Bps, &[1], &[2], "").unwrap_err();
    assert!(matches!(err, PatchError::InvalidArgument(_)));
    assert!(!path.exists());
}
