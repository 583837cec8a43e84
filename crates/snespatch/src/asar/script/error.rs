//! Script diagnostics

use codespan_reporting::diagnostic::{Diagnostic, Label};

use crate::common::Span;

/// Error category, each with its own diagnostic code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    Lexer,
    Parser,
    Define,
    Include,
    Symbol,
    Range,
    Address,
    Mode,
    User,
}

impl ScriptErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ScriptErrorKind::Lexer => "E1001",
            ScriptErrorKind::Parser => "E1002",
            ScriptErrorKind::Define => "E2001",
            ScriptErrorKind::Include => "E2002",
            ScriptErrorKind::Symbol => "E3001",
            ScriptErrorKind::Range => "E3002",
            ScriptErrorKind::Address => "E3003",
            ScriptErrorKind::Mode => "E3004",
            ScriptErrorKind::User => "E4001",
        }
    }
}

/// Error with a byte span into the line being processed
///
/// Spans are line-relative until [`ScriptError::locate`] pins them to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    pub span: Span,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Lexer, message, span)
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Parser, message, span)
    }

    pub fn symbol(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Symbol, message, span)
    }

    pub fn range(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Range, message, span)
    }

    pub fn address(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Address, message, span)
    }

    pub fn mode(message: impl Into<String>, span: Span) -> Self {
        Self::new(ScriptErrorKind::Mode, message, span)
    }

    /// Attach a file so the error can be rendered
    pub fn locate(self, location: Location) -> Located {
        Located {
            file_id: location.file_id,
            span: location.pin(self.span),
            kind: self.kind,
            message: self.message,
        }
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// Where a line of preprocessed text lives in its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file_id: usize,
    /// Byte range of the line within the file
    pub line: Span,
}

impl Location {
    /// Map a line-relative span to file offsets, clamped to the line
    pub fn pin(self, span: Span) -> Span {
        let clamp = |offset: usize| (self.line.start + offset).min(self.line.end);
        Span::new(clamp(span.start), clamp(span.end))
    }
}

/// An error or warning tied to a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub file_id: usize,
    pub span: Span,
    pub kind: ScriptErrorKind,
    pub message: String,
}

impl Located {
    pub fn to_error(&self) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_code(self.kind.code())
            .with_message(&self.message)
            .with_labels(vec![Label::primary(self.file_id, self.span.range())])
    }

    pub fn to_warning(&self) -> Diagnostic<usize> {
        Diagnostic::warning()
            .with_code(self.kind.code().replacen('E', "W", 1))
            .with_message(&self.message)
            .with_labels(vec![Label::primary(self.file_id, self.span.range())])
    }
}
