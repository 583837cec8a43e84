//! Boundary between the integration layer and an assembler implementation
//!
//! The integration layer only talks to assemblers through [`AsarLibrary`], so a
//! native Asar binding, the built-in [`ScriptAssembler`](super::ScriptAssembler)
//! or a test double can sit behind it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::common::PatchError;

/// Label recorded by the last assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelData {
    pub name: String,
    pub location: u32,
}

/// Define recorded by the last assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineData {
    pub name: String,
    pub contents: String,
}

/// One error or warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorData {
    /// Message without location
    pub message: String,
    /// Message prefixed with file and line, ready to print
    pub full: String,
}

/// A contiguous range of ROM bytes the assembler wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenBlock {
    pub pc_offset: usize,
    pub snes_offset: u32,
    pub num_bytes: usize,
}

impl WrittenBlock {
    pub fn end(&self) -> usize {
        self.pc_offset + self.num_bytes
    }
}

/// Where the main assembly source comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    File(PathBuf),
    /// In-memory source; relative includes resolve against `base_dir`
    Text {
        name: String,
        text: String,
        base_dir: PathBuf,
    },
}

impl ScriptSource {
    pub fn display_name(&self) -> String {
        match self {
            ScriptSource::File(path) => path.display().to_string(),
            ScriptSource::Text { name, .. } => name.clone(),
        }
    }
}

/// Everything an assembler needs for one patch run besides the ROM
#[derive(Debug, Clone)]
pub struct PatchRequest<'a> {
    pub source: &'a ScriptSource,
    pub include_paths: &'a [PathBuf],
    pub defines: &'a [(String, String)],
}

/// Symbol file layouts an assembler can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolsFormat {
    /// `[labels]` section with `BB:AAAA name` lines
    Wla,
    /// `BBAAAAAA name` lines
    NoCash,
}

impl FromStr for SymbolsFormat {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wla" => Ok(SymbolsFormat::Wla),
            "nocash" => Ok(SymbolsFormat::NoCash),
            other => Err(PatchError::invalid_argument(format!(
                "unknown symbols format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SymbolsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolsFormat::Wla => write!(f, "wla"),
            SymbolsFormat::NoCash => write!(f, "nocash"),
        }
    }
}

/// Operations the integration layer needs from an assembler
///
/// Mirrors the Asar DLL API: state from the most recent `patch` call is kept
/// inside the implementation until `reset` or the next `patch`.
pub trait AsarLibrary {
    /// Version as `major * 10000 + minor * 100 + patch`
    fn version(&self) -> u32;

    /// API version as `major * 100 + minor`
    fn api_version(&self) -> u32;

    /// Clear all state left by a previous patch
    fn reset(&mut self) -> bool;

    /// Largest ROM the assembler can write into
    fn max_rom_size(&self) -> usize;

    /// Assemble `request` into `rom`
    ///
    /// `rom.len()` is the buffer capacity; `rom_len` holds the current ROM
    /// size on entry and the possibly grown size on return. Returns whether
    /// assembly succeeded; diagnostics are available from `errors` and
    /// `warnings` either way.
    fn patch(&mut self, request: &PatchRequest<'_>, rom: &mut [u8], rom_len: &mut usize) -> bool;

    fn labels(&self) -> Vec<LabelData>;

    fn defines(&self) -> Vec<DefineData>;

    fn errors(&self) -> Vec<ErrorData>;

    fn warnings(&self) -> Vec<ErrorData>;

    fn written_blocks(&self) -> Vec<WrittenBlock>;

    /// Address of a label from the last assembly
    fn label_value(&self, name: &str) -> Option<u32>;

    fn symbols_file(&self, format: SymbolsFormat) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_format_parse() {
        assert_eq!("wla".parse::<SymbolsFormat>().unwrap(), SymbolsFormat::Wla);
        assert_eq!("NoCash".parse::<SymbolsFormat>().unwrap(), SymbolsFormat::NoCash);
        assert!("sym".parse::<SymbolsFormat>().is_err());
        assert_eq!(SymbolsFormat::NoCash.to_string(), "nocash");
    }

    #[test]
    fn test_written_block_end() {
        let block = WrittenBlock {
            pc_offset: 0x100,
            snes_offset: 0x00_8100,
            num_bytes: 3,
        };
        assert_eq!(block.end(), 0x103);
    }
}
