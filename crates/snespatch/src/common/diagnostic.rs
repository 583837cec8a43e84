//! Diagnostic rendering for patch script errors and warnings

use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::NoColor;

/// Layout used when rendering a diagnostic to text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticStyle {
    /// One line: `file:line:col: error[code]: message`
    #[default]
    Short,
    /// Multi-line report with the offending source snippet
    Rich,
}

/// Source registry that renders diagnostics to plain strings
///
/// The assembler hands rendered strings across its boundary, so nothing is
/// written to a terminal here; callers decide where messages go.
pub struct DiagnosticReporter {
    files: SimpleFiles<String, String>,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>, source: impl Into<String>) -> usize {
        self.files.add(name.into(), source.into())
    }

    /// Name the file was registered under
    pub fn file_name(&self, file_id: usize) -> Option<&str> {
        self.files.get(file_id).ok().map(|file| file.name().as_str())
    }

    pub fn render(&self, diagnostic: &Diagnostic<usize>, style: DiagnosticStyle) -> String {
        let config = term::Config {
            display_style: match style {
                DiagnosticStyle::Short => term::DisplayStyle::Short,
                DiagnosticStyle::Rich => term::DisplayStyle::Rich,
            },
            ..term::Config::default()
        };

        let mut writer = NoColor::new(Vec::new());
        if term::emit(&mut writer, &config, &self.files, diagnostic).is_err() {
            return diagnostic.message.clone();
        }

        String::from_utf8_lossy(&writer.into_inner()).trim_end().to_string()
    }
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new()
    }
}
