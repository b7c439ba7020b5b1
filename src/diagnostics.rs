//! The diagnostic bag: an append-only record of compile-time and runtime
//! errors, carrying a code, a source location, and a human message (§4.2).

use std::fmt;

/// A position in source text, used to anchor both compile-time and
/// runtime diagnostics back to the originating line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Diagnostic codes, non-exhaustive per §4.2. `UnexpectedEndOfStream` is
/// singled out by the incremental driver as meaning "give me more lines".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    UnexpectedEndOfStream,
    UnexpectedToken,
    UndefinedAssemblyLabel,
    UnexpectedEmptyStack,
    DivisionByZero,
    UnassignedVariable,
    UnsupportedOperand,
    DuplicateLabel,
    UnknownOpcode,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::UnexpectedEndOfStream => "UnexpectedEndOfStream",
            DiagnosticCode::UnexpectedToken => "UnexpectedToken",
            DiagnosticCode::UndefinedAssemblyLabel => "UndefinedAssemblyLabel",
            DiagnosticCode::UnexpectedEmptyStack => "UnexpectedEmptyStack",
            DiagnosticCode::DivisionByZero => "DivisionByZero",
            DiagnosticCode::UnassignedVariable => "UnassignedVariable",
            DiagnosticCode::UnsupportedOperand => "UnsupportedOperand",
            DiagnosticCode::DuplicateLabel => "DuplicateLabel",
            DiagnosticCode::UnknownOpcode => "UnknownOpcode",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded error: its code, the source range it applies to, and a
/// message meant for a terminal reader.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, location: Option<SourceLocation>, message: impl Into<String>) -> Self {
        Self {
            code,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{} ({}): {}", self.code, loc, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Append-only collection of diagnostics. Nothing in the compiler or
/// runtime unwinds on error — a failed operation appends here and the
/// caller decides whether to keep going (§7).
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("diagnostic: {diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn last(&self) -> Option<&Diagnostic> {
        self.diagnostics.last()
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }

    /// True only when the single, most recent diagnostic is
    /// `UnexpectedEndOfStream` — the incremental driver's "need more
    /// lines" signal. Any other fatal diagnostic means the fragment is
    /// wrong, not merely incomplete.
    pub fn is_incomplete_input(&self) -> bool {
        matches!(
            self.diagnostics.last(),
            Some(d) if d.code == DiagnosticCode::UnexpectedEndOfStream
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_input_signal_requires_last_diagnostic_to_match() {
        let mut bag = DiagnosticBag::new();
        assert!(!bag.is_incomplete_input());

        bag.push(Diagnostic::new(
            DiagnosticCode::UnexpectedToken,
            None,
            "bad token",
        ));
        assert!(!bag.is_incomplete_input());

        bag.push(Diagnostic::new(
            DiagnosticCode::UnexpectedEndOfStream,
            None,
            "more input needed",
        ));
        assert!(bag.is_incomplete_input());
    }
}
