use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    tty::IsTty,
    ExecutableCommand,
};

use isb::cli::{input_kind, parse_repl_command, Cli, InputKind, ReplCommand};
use isb::incremental::{FragmentOutcome, IncrementalDriver};
use isb::runtime::Engine;

mod repl;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.input {
        Some(path) => run_file(&cli, path),
        None => run_repl(&cli),
    }
}

fn run_file(cli: &Cli, path: &std::path::Path) -> ExitCode {
    let kind = match input_kind(path) {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cannot read {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut engine = Engine::new(path.display().to_string());
    let compiled = match kind {
        InputKind::Basic => engine.compile(&source, false),
        InputKind::Assembly => engine.parse_assembly(&source, false),
    };

    if !compiled {
        for d in engine.diagnostics().iter() {
            eprintln!("{d}");
        }
        return ExitCode::FAILURE;
    }

    if cli.compile {
        let text = engine.assembly_in_text_format();
        return match &cli.output {
            Some(out_path) => match fs::write(out_path, text) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("cannot write {}: {}", out_path.display(), e);
                    ExitCode::FAILURE
                }
            },
            None => {
                print!("{text}");
                ExitCode::SUCCESS
            }
        };
    }

    if engine.run(true) {
        ExitCode::SUCCESS
    } else {
        if let Some(info) = engine.error_info() {
            eprintln!("{info}");
        }
        ExitCode::FAILURE
    }
}

fn run_repl(cli: &Cli) -> ExitCode {
    let use_color = !cli.no_color && io::stdout().is_tty();
    let mut engine = Engine::new("repl");
    let mut driver = IncrementalDriver::new();
    let mut history = repl::CommandHistory::new(cli.history_limit);

    println!("Interactive Small Basic");
    println!("quit to exit, list to show history, clear to reset the engine\n");

    loop {
        let prompt = if driver.has_pending() { "> " } else { "] " };
        let line = match repl::read_line_with_history(prompt, &mut history) {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                println!();
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("input error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        if !driver.has_pending() {
            if let Some(cmd) = parse_repl_command(&line) {
                match cmd {
                    ReplCommand::Quit => return ExitCode::SUCCESS,
                    ReplCommand::List => {
                        for entry in history.lines() {
                            println!("{entry}");
                        }
                        continue;
                    }
                    ReplCommand::Clear => {
                        engine.reset();
                        driver.reset();
                        println!("engine reset");
                        continue;
                    }
                }
            }
        }

        history.add(line.clone());

        match driver.feed(&mut engine, &line) {
            FragmentOutcome::NeedsMoreInput => {}
            FragmentOutcome::Completed { value: Some(v) } => print_ok(use_color, &v),
            FragmentOutcome::Completed { value: None } => {}
            FragmentOutcome::CompileError(messages) => {
                for m in messages {
                    print_err(use_color, &m);
                }
            }
            FragmentOutcome::RuntimeError(info) => print_err(use_color, &info.to_string()),
        }
    }
}

fn print_ok(use_color: bool, message: &str) {
    if use_color {
        let mut stdout = io::stdout();
        let _ = stdout.execute(SetForegroundColor(Color::Green));
        let _ = stdout.execute(Print("\u{25cf} "));
        let _ = stdout.execute(ResetColor);
        let _ = stdout.flush();
    }
    println!("{message}");
}

fn print_err(use_color: bool, message: &str) {
    if use_color {
        let mut stdout = io::stdout();
        let _ = stdout.execute(SetForegroundColor(Color::Red));
        let _ = stdout.execute(Print("\u{25cf} "));
        let _ = stdout.execute(ResetColor);
        let _ = stdout.flush();
        println!("{message}");
    } else {
        eprintln!("{message}");
    }
}
