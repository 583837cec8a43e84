//! Common infrastructure shared by the codec and the assembler layer

mod diagnostic;
mod error;
mod span;

pub use diagnostic::{DiagnosticReporter, DiagnosticStyle};
pub use error::{ChecksumTarget, PatchError, Result};
pub use span::Span;
