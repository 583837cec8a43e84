//! SNES address to ROM offset mapping

use std::fmt;

/// Cartridge memory map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mapper {
    /// 32 KiB banks at $8000-$FFFF
    #[default]
    LoRom,
    /// 64 KiB banks, linear from $C00000
    HiRom,
    /// Addresses are file offsets
    NoRom,
}

impl Mapper {
    /// ROM file offset of a SNES address, `None` when it maps to RAM or I/O
    pub fn snes_to_pc(self, addr: u32) -> Option<usize> {
        let addr = addr & 0xFF_FFFF;
        match self {
            Mapper::LoRom => {
                if is_wram(addr) || addr & 0x40_8000 == 0 {
                    return None;
                }
                Some((((addr & 0x7F_0000) >> 1) | (addr & 0x7FFF)) as usize)
            }
            Mapper::HiRom => {
                if is_wram(addr) || addr & 0x40_8000 == 0 {
                    return None;
                }
                Some((addr & 0x3F_FFFF) as usize)
            }
            Mapper::NoRom => Some(addr as usize),
        }
    }

    /// Canonical SNES address of a ROM file offset
    pub fn pc_to_snes(self, pc: usize) -> Option<u32> {
        let pc = u32::try_from(pc).ok()?;
        match self {
            Mapper::LoRom if pc < 0x40_0000 => {
                let snes = ((pc << 1) & 0x7F_0000) | (pc & 0x7FFF) | 0x8000;
                // Banks $7E-$7F are RAM; use the upper mirror
                Some(if is_wram(snes) { snes | 0x80_0000 } else { snes })
            }
            Mapper::HiRom if pc < 0x40_0000 => Some(pc | 0xC0_0000),
            Mapper::NoRom if pc <= 0xFF_FFFF => Some(pc),
            _ => None,
        }
    }

    /// Address `len` bytes after `addr`, skipping unmapped bank halves
    pub fn advance(self, addr: u32, len: usize) -> u32 {
        if self == Mapper::LoRom {
            let next = self
                .snes_to_pc(addr)
                .and_then(|pc| self.pc_to_snes(pc + len));
            if let Some(next) = next {
                return next | (addr & 0x80_0000);
            }
        }
        addr.wrapping_add(u32::try_from(len).unwrap_or(u32::MAX)) & 0xFF_FFFF
    }
}

fn is_wram(addr: u32) -> bool {
    addr & 0xFE_0000 == 0x7E_0000
}

impl fmt::Display for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mapper::LoRom => write!(f, "lorom"),
            Mapper::HiRom => write!(f, "hirom"),
            Mapper::NoRom => write!(f, "norom"),
        }
    }
}
