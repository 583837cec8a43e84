//! CRC-32 used by the BPS trailer
//!
//! Reflected polynomial 0xEDB88320 with all-ones init and final xor, the same
//! checksum zip and every BPS tool computes.

/// CRC-32 of a whole buffer
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Incremental CRC-32 over several slices
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Append a checksum in little-endian byte order
pub fn write_crc(out: &mut Vec<u8>, crc: u32) {
    out.extend_from_slice(&crc.to_le_bytes());
}

/// Read a little-endian checksum at `offset`
pub fn read_crc(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
