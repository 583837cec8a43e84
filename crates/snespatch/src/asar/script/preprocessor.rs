//! Patch script preprocessor
//!
//! Runs before parsing and handles:
//! - `;` comments
//! - `!name = value` defines and `!name` substitution
//! - `incsrc "file"`, searched next to the including file and then in the
//!   include paths
//!
//! Every file read is registered with the [`DiagnosticReporter`] so later
//! errors can point back into it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{Located, Location, ScriptError, ScriptErrorKind};
use crate::asar::library::{DefineData, ScriptSource};
use crate::common::{DiagnosticReporter, Span};

const MAX_INCLUDE_DEPTH: usize = 64;
const MAX_DEFINE_PASSES: usize = 32;

/// One line of source ready for parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    pub location: Location,
}

/// Output of a preprocessing run
#[derive(Debug, Default)]
pub struct Preprocessed {
    pub lines: Vec<SourceLine>,
    pub defines: Vec<DefineData>,
    /// Directory of each registered file, keyed by file id
    pub dirs: HashMap<usize, PathBuf>,
    pub errors: Vec<Located>,
}

impl Preprocessed {
    pub fn dir_of(&self, file_id: usize) -> &Path {
        self.dirs.get(&file_id).map_or(Path::new("."), PathBuf::as_path)
    }
}

pub struct Preprocessor<'a> {
    reporter: &'a mut DiagnosticReporter,
    include_paths: &'a [PathBuf],
    defines: HashMap<String, String>,
    define_order: Vec<String>,
    /// Files currently being expanded, for cycle detection
    include_stack: Vec<PathBuf>,
    output: Preprocessed,
}

impl<'a> Preprocessor<'a> {
    pub fn new(
        reporter: &'a mut DiagnosticReporter,
        include_paths: &'a [PathBuf],
        defines: &[(String, String)],
    ) -> Self {
        let mut preprocessor = Self {
            reporter,
            include_paths,
            defines: HashMap::new(),
            define_order: Vec::new(),
            include_stack: Vec::new(),
            output: Preprocessed::default(),
        };
        for (name, value) in defines {
            preprocessor.set_define(name.trim_start_matches('!'), value.clone());
        }
        preprocessor
    }

    pub fn run(mut self, source: &ScriptSource) -> Preprocessed {
        match source {
            ScriptSource::File(path) => match fs::read_to_string(path) {
                Ok(text) => {
                    let dir = parent_dir(path);
                    self.process_file(path.display().to_string(), text, dir, canonical(path));
                }
                Err(err) => {
                    let name = path.display().to_string();
                    let file_id = self.reporter.add_file(name.clone(), String::new());
                    self.output.errors.push(Located {
                        file_id,
                        span: Span::default(),
                        kind: ScriptErrorKind::Include,
                        message: format!("could not open '{name}': {err}"),
                    });
                }
            },
            ScriptSource::Text {
                name,
                text,
                base_dir,
            } => self.process_file(name.clone(), text.clone(), base_dir.clone(), None),
        }

        self.output.defines = self
            .define_order
            .iter()
            .filter_map(|name| {
                self.defines.get(name).map(|contents| DefineData {
                    name: name.clone(),
                    contents: contents.clone(),
                })
            })
            .collect();
        self.output
    }

    fn set_define(&mut self, name: &str, value: String) {
        if self.defines.insert(name.to_string(), value).is_none() {
            self.define_order.push(name.to_string());
        }
    }

    fn process_file(&mut self, name: String, text: String, dir: PathBuf, canonical: Option<PathBuf>) {
        let file_id = self.reporter.add_file(name, text.clone());
        self.output.dirs.insert(file_id, dir.clone());
        if let Some(path) = &canonical {
            self.include_stack.push(path.clone());
        }

        let mut start = 0;
        for raw in text.split('\n') {
            let end = start + raw.len();
            let location = Location {
                file_id,
                line: Span::new(start, end),
            };
            start = end + 1;

            let line = strip_comment(raw.strip_suffix('\r').unwrap_or(raw));
            if line.trim().is_empty() {
                continue;
            }
            if let Err(err) = self.process_line(line, location, &dir) {
                self.output.errors.push(err.locate(location));
            }
        }

        if canonical.is_some() {
            self.include_stack.pop();
        }
    }

    fn process_line(&mut self, line: &str, location: Location, dir: &Path) -> Result<(), ScriptError> {
        if let Some((name, value)) = parse_define(line) {
            let value = self.substitute(value)?;
            self.set_define(name, unquote(value.trim()).to_string());
            return Ok(());
        }

        let text = self.substitute(line)?;
        let trimmed = text.trim_start();
        let is_incsrc = trimmed
            .get(..6)
            .is_some_and(|word| word.eq_ignore_ascii_case("incsrc"))
            && trimmed[6..].starts_with([' ', '\t']);

        if is_incsrc {
            let target = unquote(trimmed[6..].trim());
            return self.include(target, dir, Span::new(0, line.len()));
        }

        self.output.lines.push(SourceLine { text, location });
        Ok(())
    }

    fn include(&mut self, target: &str, dir: &Path, span: Span) -> Result<(), ScriptError> {
        let Some(path) = resolve_path(target, dir, self.include_paths) else {
            return Err(ScriptError::new(
                ScriptErrorKind::Include,
                format!("file '{target}' not found"),
                span,
            ));
        };

        if self.include_stack.len() >= MAX_INCLUDE_DEPTH {
            return Err(ScriptError::new(
                ScriptErrorKind::Include,
                "include depth limit reached",
                span,
            ));
        }

        let canonical = canonical(&path);
        if canonical
            .as_ref()
            .is_some_and(|path| self.include_stack.contains(path))
        {
            return Err(ScriptError::new(
                ScriptErrorKind::Include,
                format!("'{target}' includes itself"),
                span,
            ));
        }

        let text = fs::read_to_string(&path).map_err(|err| {
            ScriptError::new(
                ScriptErrorKind::Include,
                format!("could not read '{}': {err}", path.display()),
                span,
            )
        })?;

        self.process_file(path.display().to_string(), text, parent_dir(&path), canonical);
        Ok(())
    }

    /// Replace every `!name` with its value until none remain
    fn substitute(&self, line: &str) -> Result<String, ScriptError> {
        let mut text = line.to_string();

        for _ in 0..MAX_DEFINE_PASSES {
            let Some(bang) = find_define_use(&text) else {
                return Ok(text);
            };

            let mut result = String::with_capacity(text.len());
            let mut rest = text.as_str();
            let mut offset = 0;
            let mut next = Some(bang);

            while let Some(pos) = next {
                let name_len = define_name_len(&rest[pos + 1..]);
                let name = &rest[pos + 1..pos + 1 + name_len];
                let Some(value) = self.defines.get(name) else {
                    return Err(ScriptError::new(
                        ScriptErrorKind::Define,
                        format!("define '!{name}' not found"),
                        Span::new(offset + pos, offset + pos + 1 + name_len),
                    ));
                };

                result.push_str(&rest[..pos]);
                result.push_str(value);
                offset += pos + 1 + name_len;
                rest = &rest[pos + 1 + name_len..];
                next = find_define_use(rest);
            }

            result.push_str(rest);
            text = result;
        }

        Err(ScriptError::new(
            ScriptErrorKind::Define,
            "define expansion does not terminate",
            Span::new(0, line.len()),
        ))
    }
}

/// Search `dir` first, then each include path
pub fn resolve_path(name: &str, dir: &Path, include_paths: &[PathBuf]) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    std::iter::once(dir)
        .chain(include_paths.iter().map(PathBuf::as_path))
        .map(|base| base.join(candidate))
        .find(|path| path.is_file())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn canonical(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok()
}

/// Drop a `;` comment that is not inside a string
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

fn is_define_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn define_name_len(text: &str) -> usize {
    text.find(|c| !is_define_char(c)).unwrap_or(text.len())
}

/// Position of the next `!` that starts a define name
fn find_define_use(text: &str) -> Option<usize> {
    text.char_indices()
        .find(|&(i, c)| c == '!' && text[i + 1..].starts_with(is_define_char))
        .map(|(i, _)| i)
}

/// Split `!name = value` into its parts
fn parse_define(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix('!')?;
    let name_len = define_name_len(rest);
    if name_len == 0 {
        return None;
    }
    let (name, after) = rest.split_at(name_len);
    let value = after.trim_start().strip_prefix('=')?;
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run_text(text: &str, defines: &[(String, String)]) -> Preprocessed {
        let mut reporter = DiagnosticReporter::new();
        let source = ScriptSource::Text {
            name: "patch.asm".into(),
            text: text.into(),
            base_dir: PathBuf::from("."),
        };
        Preprocessor::new(&mut reporter, &[], defines).run(&source)
    }

    fn texts(output: &Preprocessed) -> Vec<&str> {
        output.lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let output = run_text("; header\n\n  nop ; trailing\ndb \"a;b\"\n", &[]);
        assert_eq!(texts(&output), vec!["  nop ", "db \"a;b\""]);
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_define_substitution() {
        let output = run_text("!base = $7E0000\n!addr = !base+2\nlda !addr\n", &[]);
        assert_eq!(texts(&output), vec!["lda $7E0000+2"]);
        assert_eq!(
            output.defines,
            vec![
                DefineData {
                    name: "base".into(),
                    contents: "$7E0000".into()
                },
                DefineData {
                    name: "addr".into(),
                    contents: "$7E0000+2".into()
                },
            ]
        );
    }

    #[test]
    fn test_caller_defines_and_quotes() {
        let defines = vec![("!speed".to_string(), "$04".to_string())];
        let output = run_text("!name = \"hero\"\nlda #!speed\ndb \"!name\"\n", &defines);
        assert_eq!(texts(&output), vec!["lda #$04", "db \"hero\""]);
    }

    #[test]
    fn test_undefined_define_points_at_use() {
        let output = run_text("nop\nlda !missing\n", &[]);
        assert_eq!(output.errors.len(), 1);
        let err = &output.errors[0];
        assert_eq!(err.kind, ScriptErrorKind::Define);
        assert_eq!(err.span, Span::new(8, 16));
    }

    #[test]
    fn test_recursive_define_is_reported() {
        let output = run_text("!a = !a\nlda !a\n", &[]);
        assert!(output.errors.iter().any(|e| e.kind == ScriptErrorKind::Define));
    }

    #[test]
    fn test_line_locations() {
        let output = run_text("nop\r\n  rts\n", &[]);
        assert_eq!(output.lines[1].location.line, Span::new(5, 10));
    }

    #[test]
    fn test_incsrc() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sub.asm"), "!value = $42\nlda #!value\n").unwrap();
        let main = dir.path().join("main.asm");
        fs::write(&main, "incsrc \"sub.asm\"\nrts\n").unwrap();

        let mut reporter = DiagnosticReporter::new();
        let output = Preprocessor::new(&mut reporter, &[], &[]).run(&ScriptSource::File(main));
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert_eq!(texts(&output), vec!["lda #$42", "rts"]);
        assert_ne!(output.lines[0].location.file_id, output.lines[1].location.file_id);
    }

    #[test]
    fn test_incsrc_search_paths_and_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir(&lib).unwrap();
        fs::write(lib.join("shared.asm"), "nop\n").unwrap();
        fs::write(dir.path().join("loop.asm"), "incsrc loop.asm\n").unwrap();

        let main = dir.path().join("main.asm");
        fs::write(&main, "incsrc shared.asm\nincsrc loop.asm\nincsrc nowhere.asm\n").unwrap();

        let mut reporter = DiagnosticReporter::new();
        let include_paths = vec![lib];
        let output = Preprocessor::new(&mut reporter, &include_paths, &[]).run(&ScriptSource::File(main));

        assert_eq!(texts(&output), vec!["nop"]);
        assert_eq!(output.errors.len(), 2);
        assert!(output.errors.iter().all(|e| e.kind == ScriptErrorKind::Include));
    }

    #[test]
    fn test_missing_main_file() {
        let mut reporter = DiagnosticReporter::new();
        let source = ScriptSource::File(PathBuf::from("/definitely/not/here.asm"));
        let output = Preprocessor::new(&mut reporter, &[], &[]).run(&source);
        assert_eq!(output.errors.len(), 1);
        assert!(output.lines.is_empty());
    }
}
