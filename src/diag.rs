//! Diagnostics: severities, the per-compile error log, and source-context
//! rendering.
//!
//! Parse errors are recoverable; the parser reports and then resynchronizes,
//! so the log accumulates every diagnostic for the compile and the driver
//! decides the exit status at the end.

use crate::style::Paint;
use crate::token::{SourceLoc, Span};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// Nitpicks: unreferenced parameters and the like.
    Pedantic,
    Warning,
    Error,
    /// Internal or unrecoverable condition; compilation stops.
    Fatal,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Pedantic => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    fn styled_label(self) -> String {
        let paint = match self {
            Severity::Pedantic => Paint::Note,
            Severity::Warning => Paint::Warning,
            Severity::Error | Severity::Fatal => Paint::Error,
        };
        paint.wrap(self.label())
    }
}

/// One source file registered with the compiler. The text is owned here for
/// the whole compile so diagnostics can quote it at report time.
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// File-descriptor table; `SourceLoc.file` indexes it.
#[derive(Default)]
pub struct FileTable {
    files: Vec<SourceFile>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, text: String) -> u16 {
        self.files.push(SourceFile {
            name: name.to_string(),
            text,
        });
        (self.files.len() - 1) as u16
    }

    pub fn get(&self, id: u16) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }

    pub fn name(&self, id: u16) -> &str {
        self.files
            .get(id as usize)
            .map(|f| f.name.as_str())
            .unwrap_or("<unknown>")
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: SourceLoc,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    /// Render `file(line): severity: message` with the offending source line
    /// and a caret underline beneath it.
    pub fn display_with_source(&self, file_name: &str, source: &str) -> String {
        let header = format!(
            "{}({}): {}: {}",
            file_name,
            self.loc.line,
            self.severity.styled_label(),
            self.message
        );

        let (line_start, line_content) = match self.find_context(source) {
            Some(ctx) => ctx,
            None => return header,
        };
        let col = self.span.start.saturating_sub(line_start);
        let len = (self.span.end.saturating_sub(self.span.start)).max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len.min(line_content.len().saturating_sub(col).max(1))));

        let line_num_str = Paint::Gutter.wrap(&format!("{:4}", self.loc.line));
        let pipe = Paint::Gutter.wrap("|");

        format!(
            "{}\n{} {} {}\n     {} {}",
            header,
            line_num_str,
            pipe,
            line_content,
            pipe,
            Paint::Underline.wrap(&underline)
        )
    }

    fn find_context<'a>(&self, source: &'a str) -> Option<(usize, &'a str)> {
        if self.span.start > source.len() {
            return None;
        }
        let line_start = source[..self.span.start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = source[line_start..]
            .find('\n')
            .map(|off| line_start + off)
            .unwrap_or(source.len());
        Some((line_start, &source[line_start..line_end]))
    }
}

/// Per-severity totals, exposed by `--dump-symbols` and the end-of-compile
/// summary line.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DiagCounts {
    pub pedantic: usize,
    pub warnings: usize,
    pub errors: usize,
    pub fatals: usize,
}

/// Accumulates diagnostics for one compilation.
pub struct ErrorLog {
    diags: Vec<Diagnostic>,
    counts: DiagCounts,
    /// When set, error-severity reports past the cap are counted but not
    /// stored. Default is unbounded.
    max_errors: Option<usize>,
    /// Pedantic diagnostics are suppressed unless the driver asks for them.
    pedantic_enabled: bool,
}

impl ErrorLog {
    pub fn new() -> Self {
        ErrorLog {
            diags: Vec::new(),
            counts: DiagCounts::default(),
            max_errors: None,
            pedantic_enabled: false,
        }
    }

    pub fn with_max_errors(mut self, cap: usize) -> Self {
        self.max_errors = Some(cap);
        self
    }

    pub fn set_pedantic(&mut self, on: bool) {
        self.pedantic_enabled = on;
    }

    pub fn report(&mut self, severity: Severity, loc: SourceLoc, span: Span, message: String) {
        match severity {
            Severity::Pedantic => {
                if !self.pedantic_enabled {
                    return;
                }
                self.counts.pedantic += 1;
            }
            Severity::Warning => self.counts.warnings += 1,
            Severity::Error => self.counts.errors += 1,
            Severity::Fatal => self.counts.fatals += 1,
        }
        if severity >= Severity::Error {
            if let Some(cap) = self.max_errors {
                if self.counts.errors + self.counts.fatals > cap {
                    return;
                }
            }
        }
        self.diags.push(Diagnostic {
            severity,
            loc,
            span,
            message,
        });
    }

    pub fn pedantic(&mut self, loc: SourceLoc, span: Span, message: String) {
        self.report(Severity::Pedantic, loc, span, message);
    }

    pub fn warning(&mut self, loc: SourceLoc, span: Span, message: String) {
        self.report(Severity::Warning, loc, span, message);
    }

    pub fn error(&mut self, loc: SourceLoc, span: Span, message: String) {
        self.report(Severity::Error, loc, span, message);
    }

    pub fn fatal(&mut self, loc: SourceLoc, span: Span, message: String) {
        self.report(Severity::Fatal, loc, span, message);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn counts(&self) -> DiagCounts {
        self.counts
    }

    pub fn error_count(&self) -> usize {
        self.counts.errors + self.counts.fatals
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() != 0
    }

    pub fn has_fatal(&self) -> bool {
        self.counts.fatals != 0
    }

    /// Process exit status: 0 clean, 1 any error, 2 fatal.
    pub fn exit_code(&self) -> i32 {
        if self.counts.fatals != 0 {
            2
        } else if self.counts.errors != 0 {
            1
        } else {
            0
        }
    }

    /// Render every stored diagnostic against the file table, followed by
    /// the summary line.
    pub fn render(&self, files: &FileTable) -> String {
        let mut out = String::new();
        for d in &self.diags {
            let (name, text) = match files.get(d.loc.file) {
                Some(f) => (f.name.as_str(), f.text.as_str()),
                None => ("<unknown>", ""),
            };
            out.push_str(&d.display_with_source(name, text));
            out.push('\n');
        }
        out.push_str(&format!(
            "{} error(s), {} warning(s)\n",
            self.counts.errors + self.counts.fatals,
            self.counts.warnings
        ));
        out
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLoc {
        SourceLoc::new(0, 1)
    }

    #[test]
    fn counts_track_severities() {
        let mut log = ErrorLog::new();
        log.warning(loc(), Span::new(0, 1), "w".into());
        log.error(loc(), Span::new(0, 1), "e1".into());
        log.error(loc(), Span::new(0, 1), "e2".into());
        assert_eq!(log.counts().warnings, 1);
        assert_eq!(log.error_count(), 2);
        assert!(log.has_errors());
        assert!(!log.has_fatal());
    }

    #[test]
    fn exit_code_reflects_worst_severity() {
        let mut log = ErrorLog::new();
        assert_eq!(log.exit_code(), 0);
        log.warning(loc(), Span::default(), "w".into());
        assert_eq!(log.exit_code(), 0);
        log.error(loc(), Span::default(), "e".into());
        assert_eq!(log.exit_code(), 1);
        log.fatal(loc(), Span::default(), "f".into());
        assert_eq!(log.exit_code(), 2);
    }

    #[test]
    fn pedantic_suppressed_by_default() {
        let mut log = ErrorLog::new();
        log.pedantic(loc(), Span::default(), "p".into());
        assert_eq!(log.counts().pedantic, 0);
        assert!(log.diagnostics().is_empty());

        log.set_pedantic(true);
        log.pedantic(loc(), Span::default(), "p".into());
        assert_eq!(log.counts().pedantic, 1);
        assert_eq!(log.diagnostics().len(), 1);
    }

    #[test]
    fn max_errors_caps_storage_not_count() {
        let mut log = ErrorLog::new().with_max_errors(2);
        for i in 0..5 {
            log.error(loc(), Span::default(), format!("e{}", i));
        }
        assert_eq!(log.error_count(), 5);
        assert_eq!(log.diagnostics().len(), 2);
    }

    #[test]
    fn display_shows_line_and_underline() {
        let source = "bigCave: Room\n    norht = cavePassage\n;";
        let start = source.find("norht").unwrap();
        let d = Diagnostic {
            severity: Severity::Error,
            loc: SourceLoc::new(0, 2),
            span: Span::new(start, start + 5),
            message: "undefined symbol \"norht\"".to_string(),
        };
        let display = d.display_with_source("cave.t", source);
        assert!(display.contains("cave.t(2)"), "bad header: {}", display);
        assert!(display.contains("norht"), "missing source line: {}", display);
        assert!(display.contains("^^^^^"), "missing underline: {}", display);
    }

    #[test]
    fn render_includes_summary_line() {
        let mut files = FileTable::new();
        files.add("x.t", "local a;\n".to_string());
        let mut log = ErrorLog::new();
        log.error(SourceLoc::new(0, 1), Span::new(0, 5), "boom".into());
        let text = log.render(&files);
        assert!(text.contains("1 error(s)"), "{}", text);
    }
}
