//! Command-line argument parsing and the small pieces of configuration
//! derived from it (§6.2, §4.9).

use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "repl")]
use clap::Parser;

/// Command-line arguments for the `isb` binary.
#[cfg(feature = "repl")]
#[derive(Parser, Debug)]
#[command(name = "isb")]
#[command(about = "Interactive Small Basic: compiler and stack-machine runtime", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Source file to run or compile. `.bas` is BASIC source, `.asm` is
    /// assembly text. Omit to start the REPL.
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Emit assembly without running it (source input only).
    #[arg(short = 'c', long = "compile")]
    pub compile: bool,

    /// Assembly output path; stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Raise the log level to debug for the duration of the run.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Disable ANSI coloring of REPL output.
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Number of REPL fragments retained for `list`.
    #[arg(long = "history-limit", default_value_t = 1000)]
    pub history_limit: usize,
}

/// Which grammar a source file should be parsed with, chosen by
/// extension (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Basic,
    Assembly,
}

/// Error produced when an input file's extension is neither `.bas` nor
/// `.asm`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownInputKind {
    path: String,
}

impl fmt::Display for UnknownInputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot tell source kind from file extension: {}", self.path)
    }
}

impl std::error::Error for UnknownInputKind {}

/// Determines whether `path` should be compiled as BASIC or parsed as
/// assembly text.
pub fn input_kind(path: &Path) -> Result<InputKind, UnknownInputKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("bas") => Ok(InputKind::Basic),
        Some("asm") => Ok(InputKind::Assembly),
        _ => Err(UnknownInputKind { path: path.display().to_string() }),
    }
}

/// A REPL meta-command, tolerant of case and trailing `()` (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    List,
    Clear,
}

/// Recognizes a line as a meta-command rather than BASIC source.
pub fn parse_repl_command(line: &str) -> Option<ReplCommand> {
    let trimmed = line.trim().trim_end_matches("()").trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "quit" => Some(ReplCommand::Quit),
        "list" => Some(ReplCommand::List),
        "clear" => Some(ReplCommand::Clear),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_kind_dispatches_on_extension() {
        assert_eq!(input_kind(Path::new("prog.bas")).unwrap(), InputKind::Basic);
        assert_eq!(input_kind(Path::new("prog.asm")).unwrap(), InputKind::Assembly);
        assert!(input_kind(Path::new("prog.txt")).is_err());
    }

    #[test]
    fn repl_commands_are_case_insensitive_and_tolerate_parens() {
        assert_eq!(parse_repl_command("quit"), Some(ReplCommand::Quit));
        assert_eq!(parse_repl_command("QUIT()"), Some(ReplCommand::Quit));
        assert_eq!(parse_repl_command("List"), Some(ReplCommand::List));
        assert_eq!(parse_repl_command("clear ()"), Some(ReplCommand::Clear));
        assert_eq!(parse_repl_command("x = 1"), None);
    }
}
