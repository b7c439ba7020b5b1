//! The label table: an append-only, insertion-ordered map from label name
//! to instruction index (§3, §4.6). Programs rarely carry more than a few
//! hundred labels, so a linear scan over a `Vec` is simpler and plenty
//! fast — the same tradeoff small assemblers in this codebase's lineage
//! make for their symbol tables.
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLocation};

#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    entries: Vec<(String, usize)>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, i)| *i)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Records `name` at `index`. Duplicate definitions are a compile
    /// error (§4.5b) rather than a silent overwrite, since the instruction
    /// array is append-only and an old label must keep resolving to its
    /// original instruction.
    pub fn define(&mut self, name: &str, index: usize, bag: &mut DiagnosticBag) {
        if self.contains(name) {
            bag.push(Diagnostic::new(
                DiagnosticCode::DuplicateLabel,
                None,
                format!("label '{name}' is already defined"),
            ));
            return;
        }
        self.entries.push((name.to_string(), index));
    }

    /// Resolves a branch target, appending `UndefinedAssemblyLabel` if the
    /// label has never been defined.
    pub fn resolve(
        &self,
        name: &str,
        location: Option<SourceLocation>,
        bag: &mut DiagnosticBag,
    ) -> Option<usize> {
        match self.get(name) {
            Some(index) => Some(index),
            None => {
                bag.push(Diagnostic::new(
                    DiagnosticCode::UndefinedAssemblyLabel,
                    location,
                    format!("Undefined assembly label, {name}"),
                ));
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates definitions in insertion order, for `assemblyInTextFormat`.
    pub fn entries_for_display(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, idx)| (name.as_str(), *idx))
    }

    /// Discards definitions made after `len`, used to roll back a failed
    /// incremental compile attempt.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_defined_label() {
        let mut bag = DiagnosticBag::new();
        let mut table = LabelTable::new();
        table.define("top", 3, &mut bag);
        assert!(bag.is_empty());
        assert_eq!(table.resolve("top", None, &mut bag), Some(3));
    }

    #[test]
    fn undefined_label_reports_diagnostic() {
        let mut bag = DiagnosticBag::new();
        let table = LabelTable::new();
        assert_eq!(table.resolve("abc", None, &mut bag), None);
        assert_eq!(bag.last().unwrap().code, DiagnosticCode::UndefinedAssemblyLabel);
    }

    #[test]
    fn duplicate_definition_reports_diagnostic_and_keeps_original() {
        let mut bag = DiagnosticBag::new();
        let mut table = LabelTable::new();
        table.define("top", 1, &mut bag);
        table.define("top", 99, &mut bag);
        assert_eq!(bag.last().unwrap().code, DiagnosticCode::DuplicateLabel);
        assert_eq!(table.resolve("top", None, &mut bag), Some(1));
    }
}
