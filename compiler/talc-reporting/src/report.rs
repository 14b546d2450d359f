//! The `Report` value: a diagnostic, built with a small fluent API, that
//! every error kind in [`crate::errors`] converts into by hand. Modelled
//! directly on the teacher's own report builder.

use std::fmt;

use talc_source::FileRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Error,
    Warning,
    Info,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Error => write!(f, "error"),
            ReportKind::Warning => write!(f, "warning"),
            ReportKind::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportNoteKind {
    Help,
    Note,
}

#[derive(Debug, Clone)]
pub struct ReportNote {
    pub kind: ReportNoteKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ReportCodeBlock {
    pub range: FileRange,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ReportElement {
    CodeBlock(ReportCodeBlock),
    Note(ReportNote),
}

/// A single diagnostic, ready to be rendered by an (out-of-scope) pretty
/// printer. Accumulated in a [`crate::errors::ReportSink`].
#[derive(Debug, Clone)]
pub struct Report {
    pub kind: ReportKind,
    pub title: String,
    pub error_code: Option<&'static str>,
    pub contents: Vec<ReportElement>,
}

impl Report {
    pub fn new(kind: ReportKind, title: impl Into<String>) -> Self {
        Self { kind, title: title.into(), error_code: None, contents: Vec::new() }
    }

    pub fn code(mut self, code: &'static str) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn add_span(mut self, range: FileRange) -> Self {
        self.contents.push(ReportElement::CodeBlock(ReportCodeBlock { range, label: None }));
        self
    }

    pub fn add_labelled_span(mut self, range: FileRange, label: impl Into<String>) -> Self {
        self.contents
            .push(ReportElement::CodeBlock(ReportCodeBlock { range, label: Some(label.into()) }));
        self
    }

    pub fn add_help(mut self, message: impl Into<String>) -> Self {
        self.contents
            .push(ReportElement::Note(ReportNote { kind: ReportNoteKind::Help, message: message.into() }));
        self
    }

    pub fn add_note(mut self, message: impl Into<String>) -> Self {
        self.contents
            .push(ReportElement::Note(ReportNote { kind: ReportNoteKind::Note, message: message.into() }));
        self
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code {
            Some(code) => writeln!(f, "{}[{}]: {}", self.kind, code, self.title)?,
            None => writeln!(f, "{}: {}", self.kind, self.title)?,
        }
        for element in &self.contents {
            match element {
                ReportElement::CodeBlock(block) => {
                    if let Some(label) = &block.label {
                        writeln!(f, "  --> {} ({label})", block.range)?;
                    } else {
                        writeln!(f, "  --> {}", block.range)?;
                    }
                }
                ReportElement::Note(note) => {
                    let prefix = match note.kind {
                        ReportNoteKind::Help => "help",
                        ReportNoteKind::Note => "note",
                    };
                    writeln!(f, "  = {prefix}: {}", note.message)?;
                }
            }
        }
        Ok(())
    }
}
