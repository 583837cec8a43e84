//! snespatch - patch codec and assembler integration for SNES ROM hacking
//!
//! This library diffs and applies binary ROM patches and drives a 65816
//! assembler over ROM images.
//!
//! ## Architecture
//!
//! The crate is organized into:
//! - **Codec** (`codec/`): BPS and IPS patch creation and application
//! - **Asar** (`asar/`): Assembler integration layer, its library boundary and a
//!   built-in script assembler
//! - **Common** (`common/`): Shared infrastructure (errors, spans, diagnostics)

pub mod common;
pub mod codec;
pub mod asar;

// Re-exports for convenience
pub use common::{ChecksumTarget, PatchError, Result};
pub use codec::{apply_patch, create_patch, export_patch, PatchFormat};
pub use asar::{AsarIntegration, PatchOptions, PatchResult, ScriptAssembler, SymbolInfo, SymbolKind};
