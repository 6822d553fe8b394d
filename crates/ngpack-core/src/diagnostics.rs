use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::span::{line_and_column, Span};

/// Diagnostic severity as reported by the type checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Suggestion,
    Message,
}

/// Which compiler produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSource {
    TypeScript,
    /// Framework compiler; codes carry the `-99` prefix
    Framework,
}

/// File a diagnostic points into. The text is shared with the source file so
/// locations can be rendered without another read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticFile {
    pub path: PathBuf,
    pub text: Arc<str>,
}

impl DiagnosticFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Secondary location attached to a diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedInformation {
    pub message: String,
    pub file: Option<DiagnosticFile>,
    pub span: Option<Span>,
}

/// A compiler diagnostic. File-scoped diagnostics carry a file and span;
/// program-scoped ones (options, configuration) carry neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub source: DiagnosticSource,
    pub code: i64,
    pub message: String,
    pub file: Option<DiagnosticFile>,
    pub span: Option<Span>,
    pub related: Vec<RelatedInformation>,
}

impl Diagnostic {
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Error,
            source: DiagnosticSource::TypeScript,
            code,
            message: message.into(),
            file: None,
            span: None,
            related: Vec::new(),
        }
    }

    pub fn warning(code: i64, message: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Warning,
            ..Self::error(code, message)
        }
    }

    /// Attach a location inside `file`
    pub fn at(mut self, file: DiagnosticFile, span: Span) -> Self {
        self.file = Some(file);
        self.span = Some(span);
        self
    }

    pub fn from_framework(mut self) -> Self {
        self.source = DiagnosticSource::Framework;
        self
    }

    pub fn with_related(mut self, related: RelatedInformation) -> Self {
        self.related.push(related);
        self
    }

    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// `TS2322` or `NG8001`; framework codes drop their `-99` prefix
    pub fn code_label(&self) -> String {
        match self.source {
            DiagnosticSource::TypeScript => format!("TS{}", self.code),
            DiagnosticSource::Framework => {
                let code = self.code.to_string();
                let trimmed = code.strip_prefix("-99").unwrap_or(&code);
                format!("NG{}", trimmed)
            }
        }
    }
}

/// Sink for diagnostics produced during a build
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn has_errors(&self) -> bool;
    fn error_count(&self) -> usize;
    fn warning_count(&self) -> usize;
    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

/// Collects all diagnostics without printing
pub struct CollectingDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, category: DiagnosticCategory) -> usize {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|d| d.category == category)
            .count()
    }
}

impl Default for CollectingDiagnosticHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn error_count(&self) -> usize {
        self.count(DiagnosticCategory::Error)
    }

    fn warning_count(&self) -> usize {
        self.count(DiagnosticCategory::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

// ============================================================================
// Bundler-facing messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: PathBuf,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub length: Option<usize>,
    pub line_text: Option<String>,
}

impl Location {
    /// A location naming only the file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: path.into(),
            line: None,
            column: None,
            length: None,
            line_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub text: String,
    pub location: Option<Location>,
}

impl Note {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }
}

/// Error or warning record handed to the bundler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub text: String,
    pub location: Option<Location>,
    pub notes: Vec<Note>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }
}

fn convert_location(file: &DiagnosticFile, span: Option<Span>) -> Location {
    let mut location = Location {
        file: file.path.clone(),
        line: None,
        column: None,
        length: span.map(|s| s.len()),
        line_text: None,
    };

    if let Some(span) = span {
        let (line, column, line_text) = line_and_column(&file.text, span.start);
        location.line = Some(line);
        location.column = Some(column);
        location.line_text = Some(line_text);
    }

    location
}

/// Convert a compiler diagnostic into a bundler message. The text is prefixed
/// with the diagnostic code; related information becomes notes.
pub fn convert_diagnostic(diagnostic: &Diagnostic) -> Message {
    let text = format!("{}: {}", diagnostic.code_label(), diagnostic.message);
    let location = diagnostic
        .file
        .as_ref()
        .map(|file| convert_location(file, diagnostic.span));

    let notes = diagnostic
        .related
        .iter()
        .map(|info| Note {
            text: info.message.clone(),
            location: info
                .file
                .as_ref()
                .map(|file| convert_location(file, info.span)),
        })
        .collect();

    Message {
        text,
        location,
        notes,
    }
}

/// Diagnostic handler that sorts converted messages into errors and warnings
#[derive(Default)]
pub struct MessageCollector {
    errors: Mutex<Vec<Message>>,
    warnings: Mutex<Vec<Message>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl MessageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the collector, returning `(errors, warnings)`
    pub fn into_messages(self) -> (Vec<Message>, Vec<Message>) {
        (
            self.errors
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            self.warnings
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl DiagnosticHandler for MessageCollector {
    fn report(&self, diagnostic: Diagnostic) {
        let message = convert_diagnostic(&diagnostic);
        let target = if diagnostic.is_error() {
            &self.errors
        } else {
            &self.warnings
        };
        target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn error_count(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn warning_count(&self) -> usize {
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
