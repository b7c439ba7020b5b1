//! Coordinates compile-and-append-then-run cycles for a REPL (§4.7):
//! reports whether a fragment is incomplete (needs more lines) versus
//! wrong, and surfaces the fragment's resulting value on clean
//! termination.

use crate::runtime::engine::{Engine, RuntimeErrorInfo};

/// The outcome of feeding one fragment to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentOutcome {
    /// The fragment compiled and ran; `value` is the popped top of stack
    /// if the run terminated with something left on it.
    Completed { value: Option<String> },
    /// Only `UnexpectedEndOfStream` was reported — accumulate more lines
    /// and retry with the combined buffer.
    NeedsMoreInput,
    /// A genuine compile error; the fragment is wrong, not incomplete.
    CompileError(Vec<String>),
    /// The fragment compiled but failed at runtime.
    RuntimeError(RuntimeErrorInfo),
}

/// Buffers fragments across `NeedsMoreInput` results and drives a single
/// [`Engine`] incrementally.
pub struct IncrementalDriver {
    buffer: String,
}

impl IncrementalDriver {
    pub fn new() -> Self {
        Self { buffer: String::new() }
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Feeds one more line of source into the driver. `engine` persists
    /// across calls so memory, registers, and the stack carry over
    /// between fragments.
    pub fn feed(&mut self, engine: &mut Engine, line: &str) -> FragmentOutcome {
        let candidate = if self.buffer.is_empty() {
            line.to_string()
        } else {
            format!("{}\n{}", self.buffer, line)
        };

        if engine.compile(&candidate, true) {
            self.buffer.clear();
            if !engine.run(true) {
                let info = engine.error_info().expect("run() reported failure without a diagnostic");
                return FragmentOutcome::RuntimeError(info);
            }
            let value = engine.stack_pop().map(|v| v.to_display_string());
            return FragmentOutcome::Completed { value };
        }

        if engine.diagnostics().is_incomplete_input() {
            self.buffer = candidate;
            return FragmentOutcome::NeedsMoreInput;
        }

        self.buffer.clear();
        let messages = engine.diagnostics().iter().map(|d| d.to_string()).collect();
        FragmentOutcome::CompileError(messages)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for IncrementalDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_a_well_formed_single_line_fragment() {
        let mut engine = Engine::new("repl");
        let mut driver = IncrementalDriver::new();
        let outcome = driver.feed(&mut engine, "1 + 2");
        assert_eq!(outcome, FragmentOutcome::Completed { value: Some("3".to_string()) });
        assert!(!driver.has_pending());
    }

    #[test]
    fn asks_for_more_input_on_an_unterminated_string() {
        let mut engine = Engine::new("repl");
        let mut driver = IncrementalDriver::new();
        let outcome = driver.feed(&mut engine, "x = \"unterminated");
        assert_eq!(outcome, FragmentOutcome::NeedsMoreInput);
        assert!(driver.has_pending());
    }

    #[test]
    fn accumulates_a_multi_line_if_block_across_fragments() {
        let mut engine = Engine::new("repl");
        let mut driver = IncrementalDriver::new();
        assert_eq!(driver.feed(&mut engine, "If 1 = 1 Then"), FragmentOutcome::NeedsMoreInput);
        assert_eq!(driver.feed(&mut engine, "x = 5"), FragmentOutcome::NeedsMoreInput);
        let outcome = driver.feed(&mut engine, "EndIf");
        assert_eq!(outcome, FragmentOutcome::Completed { value: None });
        assert!(!driver.has_pending());
    }

    #[test]
    fn state_carries_over_between_fragments() {
        let mut engine = Engine::new("repl");
        let mut driver = IncrementalDriver::new();
        driver.feed(&mut engine, "x = 10");
        let outcome = driver.feed(&mut engine, "x + 1");
        assert_eq!(outcome, FragmentOutcome::Completed { value: Some("11".to_string()) });
    }

    #[test]
    fn runtime_error_is_reported_and_state_is_preserved_for_next_fragment() {
        let mut engine = Engine::new("repl");
        let mut driver = IncrementalDriver::new();
        driver.feed(&mut engine, "x = 10");
        let outcome = driver.feed(&mut engine, "x / 0");
        assert!(matches!(outcome, FragmentOutcome::RuntimeError(_)));
        // engine keeps x for the next fragment despite the error
        let outcome = driver.feed(&mut engine, "x");
        assert_eq!(outcome, FragmentOutcome::Completed { value: Some("10".to_string()) });
    }
}
