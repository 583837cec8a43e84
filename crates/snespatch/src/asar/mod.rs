//! Assembler integration layer
//!
//! [`AsarIntegration`] owns an [`AsarLibrary`] and turns its call-by-call
//! API into one `patch_rom` operation that returns a [`PatchResult`].
//! The library is reset before every run, so results never leak between
//! patches.

pub mod library;
pub mod opcodes;
pub mod script;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::common::{PatchError, Result};
use library::{PatchRequest, ScriptSource};

pub use library::{AsarLibrary, DefineData, ErrorData, LabelData, SymbolsFormat, WrittenBlock};
pub use script::ScriptAssembler;

/// Oldest library API the integration layer can drive, 3.3
pub const MIN_API_VERSION: u32 = 303;

/// Whether a symbol came from a label or a define
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Label,
    Define,
}

/// A label or define harvested from an assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    /// SNES address for labels, zero for defines
    pub location: u32,
    pub kind: SymbolKind,
    /// Define contents; `None` for labels
    pub value: Option<String>,
}

impl SymbolInfo {
    fn from_label(label: LabelData) -> Self {
        Self {
            name: label.name,
            location: label.location,
            kind: SymbolKind::Label,
            value: None,
        }
    }

    fn from_define(define: DefineData) -> Self {
        Self {
            name: define.name,
            location: 0,
            kind: SymbolKind::Define,
            value: Some(define.contents),
        }
    }
}

/// Outcome of one assembly run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchResult {
    pub success: bool,
    /// Located error messages, as `file:line:col: error[code]: message`
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Labels then defines; empty when assembly failed
    pub symbols: Vec<SymbolInfo>,
    pub written_blocks: Vec<WrittenBlock>,
    pub rom_size_before: usize,
    pub rom_size_after: usize,
}

/// Per-run assembler inputs
#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Extra directories searched by `incsrc` and `incbin`
    pub include_paths: Vec<PathBuf>,
    /// `(name, value)` pairs defined before the script runs
    pub defines: Vec<(String, String)>,
}

impl PatchOptions {
    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }
}

/// Integration-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsarConfig {
    /// Size of the blank ROM used by [`AsarIntegration::extract_symbols`]
    pub extraction_rom_size: usize,
}

impl Default for AsarConfig {
    fn default() -> Self {
        Self {
            extraction_rom_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initialized,
}

/// Drives an assembler library over a ROM buffer
///
/// Holds the library by value and takes `&mut self` for every operation that
/// touches it, so one instance serves one patch session.
#[derive(Debug)]
pub struct AsarIntegration<L: AsarLibrary = ScriptAssembler> {
    library: L,
    config: AsarConfig,
    state: State,
}

impl Default for AsarIntegration<ScriptAssembler> {
    fn default() -> Self {
        Self::new(ScriptAssembler::new())
    }
}

impl<L: AsarLibrary> AsarIntegration<L> {
    pub fn new(library: L) -> Self {
        Self::with_config(library, AsarConfig::default())
    }

    pub fn with_config(library: L, config: AsarConfig) -> Self {
        Self {
            library,
            config,
            state: State::Uninitialized,
        }
    }

    pub fn config(&self) -> &AsarConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state == State::Initialized
    }

    /// Check the library's API version and reset it
    ///
    /// Calling this on an initialized instance is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let found = self.library.api_version();
        if found < MIN_API_VERSION {
            warn!(found, required = MIN_API_VERSION, "assembler API too old");
            return Err(PatchError::IncompatibleVersion {
                found,
                required: MIN_API_VERSION,
            });
        }

        self.reset_library()?;
        self.state = State::Initialized;
        info!(version = %self.version(), api = %self.api_version(), "assembler initialized");
        Ok(())
    }

    /// Clear the library's state from the last run
    pub fn reset(&mut self) -> Result<()> {
        if self.is_initialized() {
            self.reset_library()?;
        }
        Ok(())
    }

    /// Library version as `major.minor.patch`
    pub fn version(&self) -> String {
        let v = self.library.version();
        format!("{}.{}.{}", v / 10000, (v % 10000) / 100, v % 100)
    }

    /// Library API version as `major.minor`
    pub fn api_version(&self) -> String {
        let v = self.library.api_version();
        format!("{}.{}", v / 100, v % 100)
    }

    /// Assemble `patch_file` into `rom`
    ///
    /// On success `rom` is replaced with the patched image, which may have
    /// grown. On failure `rom` is left untouched and the diagnostics are in
    /// the returned result.
    pub fn patch_rom(
        &mut self,
        patch_file: impl AsRef<Path>,
        rom: &mut Vec<u8>,
        options: &PatchOptions,
    ) -> Result<PatchResult> {
        self.ensure_initialized()?;
        let patch_file = patch_file.as_ref();
        if patch_file.as_os_str().is_empty() {
            return Err(PatchError::invalid_argument("patch file path is empty"));
        }

        let source = ScriptSource::File(patch_file.to_path_buf());
        self.run(&source, rom, options)
    }

    /// Assemble in-memory script text into `rom`
    ///
    /// Relative `incsrc`/`incbin` paths resolve against `base_dir`.
    pub fn patch_rom_from_str(
        &mut self,
        source: &str,
        base_dir: impl AsRef<Path>,
        rom: &mut Vec<u8>,
        options: &PatchOptions,
    ) -> Result<PatchResult> {
        self.ensure_initialized()?;
        let source = ScriptSource::Text {
            name: "<patch>".to_string(),
            text: source.to_string(),
            base_dir: base_dir.as_ref().to_path_buf(),
        };
        self.run(&source, rom, options)
    }

    /// Assemble `patch_file` against a blank ROM and return its symbols
    pub fn extract_symbols(
        &mut self,
        patch_file: impl AsRef<Path>,
        options: &PatchOptions,
    ) -> Result<Vec<SymbolInfo>> {
        let mut scratch = vec![0u8; self.config.extraction_rom_size];
        let result = self.patch_rom(patch_file, &mut scratch, options)?;
        if !result.success {
            return Err(PatchError::assembler(result.errors.join("\n")));
        }
        Ok(result.symbols)
    }

    /// Address of a label from the last successful run
    pub fn symbol_value(&self, name: &str) -> Result<u32> {
        self.ensure_initialized()?;
        self.library
            .label_value(name)
            .ok_or_else(|| PatchError::SymbolNotFound(name.to_string()))
    }

    pub fn labels(&self) -> Vec<LabelData> {
        if self.is_initialized() {
            self.library.labels()
        } else {
            Vec::new()
        }
    }

    pub fn defines(&self) -> Vec<DefineData> {
        if self.is_initialized() {
            self.library.defines()
        } else {
            Vec::new()
        }
    }

    pub fn written_blocks(&self) -> Vec<WrittenBlock> {
        if self.is_initialized() {
            self.library.written_blocks()
        } else {
            Vec::new()
        }
    }

    /// Look up a label or define by name
    ///
    /// Labels win when both share a name.
    pub fn find_symbol(&self, name: &str) -> Option<SymbolInfo> {
        let label = self
            .labels()
            .into_iter()
            .find(|label| label.name == name)
            .map(SymbolInfo::from_label);
        label.or_else(|| {
            self.defines()
                .into_iter()
                .find(|define| define.name == name)
                .map(SymbolInfo::from_define)
        })
    }

    /// Every label placed at `address`
    pub fn symbols_at_address(&self, address: u32) -> Vec<SymbolInfo> {
        self.labels()
            .into_iter()
            .filter(|label| label.location == address)
            .map(SymbolInfo::from_label)
            .collect()
    }

    /// Render the last run's labels as a symbol file
    pub fn symbols_file(&self, format: SymbolsFormat) -> Result<String> {
        self.ensure_initialized()?;
        self.library
            .symbols_file(format)
            .ok_or_else(|| PatchError::assembler(format!("{format} symbol file unavailable")))
    }

    fn reset_library(&mut self) -> Result<()> {
        if self.library.reset() {
            Ok(())
        } else {
            Err(PatchError::assembler("failed to reset assembler"))
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(PatchError::NotInitialized)
        }
    }

    fn run(&mut self, source: &ScriptSource, rom: &mut Vec<u8>, options: &PatchOptions) -> Result<PatchResult> {
        self.reset_library()?;

        let rom_size_before = rom.len();
        let capacity = self.library.max_rom_size().max(rom_size_before);
        let mut working = Vec::with_capacity(capacity);
        working.extend_from_slice(rom);
        working.resize(capacity, 0);

        let request = PatchRequest {
            source,
            include_paths: &options.include_paths,
            defines: &options.defines,
        };
        let mut rom_size_after = rom_size_before;
        let success = self.library.patch(&request, &mut working, &mut rom_size_after);
        if rom_size_after > capacity {
            return Err(PatchError::assembler(format!(
                "assembler reported a {rom_size_after} byte ROM in a {capacity} byte buffer"
            )));
        }

        let mut result = PatchResult {
            success,
            errors: self.library.errors().into_iter().map(|e| e.full).collect(),
            warnings: self.library.warnings().into_iter().map(|w| w.full).collect(),
            rom_size_before,
            rom_size_after: rom_size_before,
            ..PatchResult::default()
        };

        if success {
            result.symbols = self
                .library
                .labels()
                .into_iter()
                .map(SymbolInfo::from_label)
                .chain(self.library.defines().into_iter().map(SymbolInfo::from_define))
                .collect();
            result.written_blocks = self.library.written_blocks();
            result.rom_size_after = rom_size_after;

            working.truncate(rom_size_after);
            *rom = working;
            info!(
                source = %source.display_name(),
                blocks = result.written_blocks.len(),
                size = rom_size_after,
                "patch applied"
            );
        } else {
            debug!(
                source = %source.display_name(),
                errors = result.errors.len(),
                "patch failed"
            );
        }

        Ok(result)
    }
}

impl<L: AsarLibrary> Drop for AsarIntegration<L> {
    fn drop(&mut self) {
        if self.reset().is_err() {
            warn!("assembler reset failed on drop");
        }
    }
}
