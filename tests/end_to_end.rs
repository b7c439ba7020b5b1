use isb::incremental::{FragmentOutcome, IncrementalDriver};
use isb::runtime::Engine;

fn run_source(source: &str) -> Engine {
    let mut engine = Engine::new("test");
    assert!(engine.compile(source, false), "compile failed: {:?}", engine.diagnostics().iter().collect::<Vec<_>>());
    assert!(engine.run(true), "run failed: {:?}", engine.error_info());
    engine
}

#[test]
fn fibonacci_sequence_via_array() {
    let engine = run_source(
        "Fib[0] = 0\nFib[1] = 1\nFor i = 2 To 10\nFib[i] = Fib[i-1] + Fib[i-2]\nEndFor\nFib[10]",
    );
    assert_eq!(engine.stack_top().unwrap().to_display_string(), "55");
}

#[test]
fn for_loop_with_negative_step_counts_down() {
    let engine = run_source("total = 0\nFor i = 5 To 1 Step -1\ntotal = total + i\nEndFor\ntotal");
    assert_eq!(engine.stack_top().unwrap().to_display_string(), "15");
}

#[test]
fn while_loop_accumulates() {
    let engine = run_source("n = 0\nWhile n < 5\nn = n + 1\nEndWhile\nn");
    assert_eq!(engine.stack_top().unwrap().to_display_string(), "5");
}

#[test]
fn sub_call_executes_body_and_skips_it_in_sequential_flow() {
    let engine = run_source("calls = 0\nGreet()\nGreet()\nSub Greet\ncalls = calls + 1\nEndSub\ncalls");
    assert_eq!(engine.stack_top().unwrap().to_display_string(), "2");
}

#[test]
fn nested_array_indices_round_trip() {
    let engine = run_source(r#"grid[1][2] = "x"
grid[1][2]"#);
    assert_eq!(engine.stack_top().unwrap().to_display_string(), "x");
}

#[test]
fn unassigned_array_slot_reads_as_empty_string_without_error() {
    let engine = run_source(r#"board["a"]["b"]"#);
    assert!(!engine.has_error());
    assert_eq!(engine.stack_top().unwrap().to_display_string(), "");
}

#[test]
fn compile_then_assemble_then_reparse_preserves_behavior() {
    let mut first = Engine::new("a");
    assert!(first.compile("x = 3\ny = x * x\ny", false));
    assert!(first.run(true));
    let expected = first.stack_top().unwrap().to_display_string();
    let assembly = first.assembly_in_text_format();

    let mut second = Engine::new("b");
    assert!(second.parse_assembly(&assembly, false));
    assert!(second.run(true));
    assert_eq!(second.stack_top().unwrap().to_display_string(), expected);
}

#[test]
fn division_by_zero_reports_runtime_error_with_source_line() {
    let mut engine = Engine::new("test");
    assert!(engine.compile("a = 1\nb = 0\na / b", false));
    assert!(!engine.run(true));
    let info = engine.error_info().unwrap();
    assert_eq!(info.message, "Division by zero.");
    assert_eq!(info.source_line, "a / b");
}

#[test]
fn undefined_assembly_label_is_reported_with_exact_message() {
    let mut engine = Engine::new("test");
    assert!(engine.parse_assembly("br nowhere", false));
    assert!(!engine.run(true));
    assert_eq!(engine.error_info().unwrap().message, "Undefined assembly label, nowhere");
}

#[test]
fn malformed_source_reports_compile_diagnostics_and_appends_nothing() {
    let mut engine = Engine::new("test");
    assert!(!engine.compile("x = = 1", false));
    assert_eq!(engine.instruction_count(), 0);
}

#[test]
fn repl_accumulates_a_multi_fragment_if_block_then_runs_it() {
    let mut engine = Engine::new("repl");
    let mut driver = IncrementalDriver::new();

    assert_eq!(driver.feed(&mut engine, "If 3 > 1 Then"), FragmentOutcome::NeedsMoreInput);
    assert_eq!(driver.feed(&mut engine, "flag = 1"), FragmentOutcome::NeedsMoreInput);
    assert_eq!(driver.feed(&mut engine, "EndIf"), FragmentOutcome::Completed { value: None });

    let outcome = driver.feed(&mut engine, "flag");
    assert_eq!(outcome, FragmentOutcome::Completed { value: Some("1".to_string()) });
}

#[test]
fn repl_survives_a_failed_fragment_and_retries_from_clean_state() {
    let mut engine = Engine::new("repl");
    let mut driver = IncrementalDriver::new();

    driver.feed(&mut engine, "x = 1");
    let before = engine.instruction_count();

    match driver.feed(&mut engine, "x = = 2") {
        FragmentOutcome::CompileError(_) => {}
        other => panic!("expected a compile error, got {other:?}"),
    }
    assert_eq!(engine.instruction_count(), before, "failed fragment must not append instructions");

    let outcome = driver.feed(&mut engine, "x");
    assert_eq!(outcome, FragmentOutcome::Completed { value: Some("1".to_string()) });
}
