//! Diagnostics sink
//!
//! Lowering reports problems it can recover from here and keeps going;
//! the driver decides what to do with the accumulated list.

use crate::ast::SourceLoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::Error => write!(f, "error"),
            DiagnosticKind::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub loc: SourceLoc,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}:{}: {}",
            self.kind, self.loc.line, self.loc.start_col, self.message
        )
    }
}

/// Collects diagnostics during a pass
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, loc: SourceLoc, message: impl Into<String>) {
        self.items.push(Diagnostic {
            kind: DiagnosticKind::Error,
            loc,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, loc: SourceLoc, message: impl Into<String>) {
        self.items.push(Diagnostic {
            kind: DiagnosticKind::Warning,
            loc,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|d| d.kind == DiagnosticKind::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
