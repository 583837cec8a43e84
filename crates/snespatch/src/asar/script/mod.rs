//! Built-in patch script assembler
//!
//! Implements [`AsarLibrary`] for the subset of Asar syntax most ROM patches
//! use:
//! - `org`, `lorom`/`hirom`/`norom` and labels
//! - `db`/`dw`/`dl`/`dd`, `incbin`, `warn`, `error`
//! - every 65816 instruction, with `.b`/`.w`/`.l` width hints
//!
//! Macros, conditionals and namespaces are not supported.

mod assembler;
mod error;
mod expr;
mod lexer;
mod mapper;
mod parser;
mod preprocessor;
mod token;

use std::fmt::Write;

use tracing::debug;

use super::library::{
    AsarLibrary, DefineData, ErrorData, LabelData, PatchRequest, SymbolsFormat, WrittenBlock,
};
use crate::common::{DiagnosticReporter, DiagnosticStyle};
use assembler::Assembler;
use error::Located;
use preprocessor::Preprocessor;

/// Version reported to callers, 1.9.1
pub const SCRIPT_ASSEMBLER_VERSION: u32 = 10901;
/// API level matching Asar 3.3
pub const SCRIPT_ASSEMBLER_API_VERSION: u32 = 303;
/// Largest ROM the assembler writes into, 16 MiB
pub const MAX_ROM_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct ScriptAssembler {
    labels: Vec<LabelData>,
    defines: Vec<DefineData>,
    errors: Vec<ErrorData>,
    warnings: Vec<ErrorData>,
    written_blocks: Vec<WrittenBlock>,
}

impl ScriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn error_data(reporter: &DiagnosticReporter, located: &Located, warning: bool) -> ErrorData {
    let diagnostic = if warning {
        located.to_warning()
    } else {
        located.to_error()
    };
    ErrorData {
        message: located.message.clone(),
        full: reporter.render(&diagnostic, DiagnosticStyle::Short),
    }
}

impl AsarLibrary for ScriptAssembler {
    fn version(&self) -> u32 {
        SCRIPT_ASSEMBLER_VERSION
    }

    fn api_version(&self) -> u32 {
        SCRIPT_ASSEMBLER_API_VERSION
    }

    fn reset(&mut self) -> bool {
        *self = Self::default();
        true
    }

    fn max_rom_size(&self) -> usize {
        MAX_ROM_SIZE
    }

    fn patch(&mut self, request: &PatchRequest<'_>, rom: &mut [u8], rom_len: &mut usize) -> bool {
        self.reset();

        let mut reporter = DiagnosticReporter::new();
        let preprocessed =
            Preprocessor::new(&mut reporter, request.include_paths, request.defines).run(request.source);
        let output = Assembler::new(request.include_paths).assemble(&preprocessed, rom, rom_len);

        self.errors = output
            .errors
            .iter()
            .map(|located| error_data(&reporter, located, false))
            .collect();
        self.warnings = output
            .warnings
            .iter()
            .map(|located| error_data(&reporter, located, true))
            .collect();
        self.defines = preprocessed.defines;

        if output.success {
            self.labels = output.labels;
            self.written_blocks = output.written_blocks;
        }

        debug!(
            source = %request.source.display_name(),
            success = output.success,
            errors = self.errors.len(),
            warnings = self.warnings.len(),
            "script assembled"
        );
        output.success
    }

    fn labels(&self) -> Vec<LabelData> {
        self.labels.clone()
    }

    fn defines(&self) -> Vec<DefineData> {
        self.defines.clone()
    }

    fn errors(&self) -> Vec<ErrorData> {
        self.errors.clone()
    }

    fn warnings(&self) -> Vec<ErrorData> {
        self.warnings.clone()
    }

    fn written_blocks(&self) -> Vec<WrittenBlock> {
        self.written_blocks.clone()
    }

    fn label_value(&self, name: &str) -> Option<u32> {
        self.labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.location)
    }

    fn symbols_file(&self, format: SymbolsFormat) -> Option<String> {
        let mut labels: Vec<&LabelData> = self.labels.iter().collect();
        labels.sort_by_key(|label| label.location);

        let mut out = String::new();
        match format {
            SymbolsFormat::Wla => {
                out.push_str("[labels]\n");
                for label in labels {
                    let _ = writeln!(
                        out,
                        "{:02X}:{:04X} {}",
                        label.location >> 16,
                        label.location & 0xFFFF,
                        label.name
                    );
                }
            }
            SymbolsFormat::NoCash => {
                for label in labels {
                    let _ = writeln!(out, "{:08X} {}", label.location, label.name);
                }
            }
        }
        Some(out)
    }
}
