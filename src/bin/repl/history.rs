//! Command history for the REPL: lets the user step back through
//! previously entered fragments with the arrow keys.

use std::collections::VecDeque;

/// Tracks previously entered REPL lines, with newest at the front.
#[derive(Debug)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    max_size: usize,
    current_position: Option<usize>,
    working_command: String,
}

impl CommandHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
            current_position: None,
            working_command: String::new(),
        }
    }

    /// Records a line. Empty lines and an exact repeat of the most
    /// recent entry are ignored; oldest entries drop once over capacity.
    pub fn add(&mut self, command: String) {
        self.current_position = None;
        self.working_command.clear();

        if command.trim().is_empty() {
            return;
        }
        if let Some(last) = self.entries.front() {
            if last == &command {
                return;
            }
        }

        self.entries.push_front(command);
        while self.entries.len() > self.max_size {
            self.entries.pop_back();
        }
    }

    pub fn start_navigation(&mut self, working_command: String) {
        if self.current_position.is_none() {
            self.working_command = working_command;
            self.current_position = None;
        }
    }

    pub fn previous(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        match self.current_position {
            None => {
                self.current_position = Some(0);
                self.entries.front().map(|s| s.as_str())
            }
            Some(pos) => {
                if pos + 1 < self.entries.len() {
                    self.current_position = Some(pos + 1);
                    self.entries.get(pos + 1).map(|s| s.as_str())
                } else {
                    None
                }
            }
        }
    }

    pub fn next(&mut self) -> Option<&str> {
        match self.current_position {
            None => None,
            Some(0) => {
                self.current_position = None;
                Some(&self.working_command)
            }
            Some(pos) => {
                self.current_position = Some(pos - 1);
                self.entries.get(pos - 1).map(|s| s.as_str())
            }
        }
    }

    pub fn cancel_navigation(&mut self) -> &str {
        self.current_position = None;
        &self.working_command
    }

    pub fn is_navigating(&self) -> bool {
        self.current_position.is_some()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots entries oldest-first, for the `list` REPL command.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_empty_and_consecutive_duplicate_commands() {
        let mut history = CommandHistory::new(100);
        history.add("".to_string());
        history.add("x = 1".to_string());
        history.add("x = 1".to_string());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn enforces_size_limit_by_dropping_oldest() {
        let mut history = CommandHistory::new(3);
        for i in 0..5 {
            history.add(format!("line {i}"));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.lines(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn navigation_walks_back_then_returns_to_working_command() {
        let mut history = CommandHistory::new(100);
        history.add("first".to_string());
        history.add("second".to_string());
        history.start_navigation("working".to_string());

        assert_eq!(history.previous(), Some("second"));
        assert_eq!(history.previous(), Some("first"));
        assert!(history.previous().is_none());

        assert_eq!(history.next(), Some("second"));
        assert_eq!(history.next(), Some("working"));
        assert!(history.next().is_none());
    }
}
