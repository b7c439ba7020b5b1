//! The runtime engine (§4.6, §6.1): owns the instruction array, value
//! stack, register bank, named memory, and label table, and drives
//! execution by dispatching on the opcode at the instruction pointer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use bigdecimal::{BigDecimal, Zero};

use crate::compiler::{ast, assembler, lexer::Lexer, lowerer, parser, LabelSeed};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLocation};
use crate::runtime::instruction::{Instruction, Opcode};
use crate::runtime::labels::LabelTable;
use crate::value::Value;

/// Case-insensitive named memory (§3): reading an unset name yields the
/// empty string rather than an error.
#[derive(Debug, Default)]
struct Memory {
    slots: HashMap<String, Value>,
}

impl Memory {
    fn key(name: &str) -> String {
        name.to_ascii_uppercase()
    }

    fn get(&self, name: &str) -> Value {
        self.slots.get(&Self::key(name)).cloned().unwrap_or_else(Value::empty_string)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.slots.insert(Self::key(name), value);
    }
}

/// Coarse execution state, derived from the engine's instructions/IP/bag
/// rather than tracked independently, so it can never drift out of sync
/// (§4.6: Fresh → Ready → Running → Terminated/Errored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Fresh,
    Ready,
    Terminated,
    Errored,
}

/// A formatted runtime error, ready for a terminal (§6.4): `Runtime
/// error: <message> (<line>: <source-line-text>)`.
#[derive(Debug, Clone)]
pub struct RuntimeErrorInfo {
    pub message: String,
    pub line: usize,
    pub source_line: String,
}

impl fmt::Display for RuntimeErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime error: {} ({}: {})", self.message, self.line, self.source_line)
    }
}

/// Owns every piece of mutable VM state for one program (§3: "Execution
/// state"). A single engine is never shared across threads (§5).
pub struct Engine {
    name: String,
    instructions: Vec<Instruction>,
    labels: LabelTable,
    label_seed: LabelSeed,
    stack: Vec<Value>,
    registers: Vec<Value>,
    memory: Memory,
    /// Separate from the value stack so a `Call`/`Ret` pair can never be
    /// corrupted by a sub's own stack traffic (§4.6 open question: the
    /// spec describes `call`/`ret` as push/pop without naming which
    /// stack; using a dedicated return-address stack avoids mixing
    /// control-flow addresses into expression values).
    call_stack: Vec<usize>,
    ip: usize,
    bag: DiagnosticBag,
    source_lines: Vec<String>,
}

impl Engine {
    pub fn new(program_name: impl Into<String>) -> Self {
        Self {
            name: program_name.into(),
            instructions: Vec::new(),
            labels: LabelTable::new(),
            label_seed: LabelSeed::new(),
            stack: Vec::new(),
            registers: Vec::new(),
            memory: Memory::default(),
            call_stack: Vec::new(),
            ip: 0,
            bag: DiagnosticBag::new(),
            source_lines: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clears every piece of state: instructions, stack, registers,
    /// memory, labels, diagnostics, and IP (§6.1).
    pub fn reset(&mut self) {
        self.instructions.clear();
        self.labels = LabelTable::new();
        self.label_seed = LabelSeed::new();
        self.stack.clear();
        self.registers.clear();
        self.memory = Memory::default();
        self.call_stack.clear();
        self.ip = 0;
        self.bag.clear();
        self.source_lines.clear();
    }

    /// Parses and lowers BASIC source. If `incremental` is false, the
    /// engine resets first; otherwise the new instructions are appended
    /// and the IP is positioned at the first of them, ready to resume
    /// (§4.6, §4.7, §9). A failed attempt (including "needs more lines")
    /// rolls back anything it appended, since the REPL resends the whole
    /// accumulated fragment on the next attempt — without the rollback,
    /// each retry would duplicate the previous attempt's instructions.
    /// Returns true when no diagnostic was produced.
    pub fn compile(&mut self, source: &str, incremental: bool) -> bool {
        if !incremental {
            self.reset();
        }
        self.bag.clear();

        let run_start = self.instructions.len();
        let labels_mark = self.labels.len();
        let lines_mark = self.source_lines.len();
        self.source_lines.extend(source.lines().map(str::to_string));

        let tokens = Lexer::new(source).tokenize(&mut self.bag);
        log::trace!("lex complete: {} tokens", tokens.len());
        let program: ast::Program = parser::parse(&tokens, &mut self.bag);
        log::trace!("parse complete: {} statements", program.statements.len());
        lowerer::lower_program(
            &program,
            &mut self.instructions,
            &mut self.labels,
            &mut self.label_seed,
            &mut self.bag,
        );

        if self.bag.is_empty() {
            self.ip = run_start;
            true
        } else {
            self.instructions.truncate(run_start);
            self.labels.truncate(labels_mark);
            self.source_lines.truncate(lines_mark);
            false
        }
    }

    /// Parses raw assembly text (§4.5b), the round-trippable path. Same
    /// rollback-on-failure behavior as [`Engine::compile`].
    pub fn parse_assembly(&mut self, text: &str, incremental: bool) -> bool {
        if !incremental {
            self.reset();
        }
        self.bag.clear();

        let run_start = self.instructions.len();
        let labels_mark = self.labels.len();
        let lines_mark = self.source_lines.len();
        self.source_lines.extend(text.lines().map(str::to_string));
        assembler::parse_assembly(text, &mut self.instructions, &mut self.labels, &mut self.bag);

        if self.bag.is_empty() {
            self.ip = run_start;
            true
        } else {
            self.instructions.truncate(run_start);
            self.labels.truncate(labels_mark);
            self.source_lines.truncate(lines_mark);
            false
        }
    }

    /// Executes from the current IP until it reaches the end of the
    /// instruction array or (if `stop_on_error`) a runtime error is
    /// appended. Returns true if execution reached the end cleanly.
    pub fn run(&mut self, stop_on_error: bool) -> bool {
        let mut had_error = false;
        while self.ip < self.instructions.len() {
            log::trace!("dispatch ip={} opcode={:?}", self.ip, self.instructions[self.ip].opcode);
            if self.step().is_err() {
                had_error = true;
                log::warn!("runtime error at ip={}", self.ip);
                if stop_on_error {
                    return false;
                }
                // Non-fatal mode: skip past the failed instruction so a
                // bad branch target can't spin forever.
                self.ip += 1;
            }
        }
        !had_error
    }

    fn location(&self) -> Option<SourceLocation> {
        self.instructions.get(self.ip).and_then(|i| i.location)
    }

    fn fail(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        let location = self.location();
        self.bag.push(Diagnostic::new(code, location, message));
    }

    fn pop(&mut self) -> Result<Value, ()> {
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => {
                self.fail(DiagnosticCode::UnexpectedEmptyStack, "the stack is empty");
                Err(())
            }
        }
    }

    fn push_bool(&mut self, value: bool) {
        self.stack.push(Value::Number(if value { BigDecimal::from(1) } else { BigDecimal::from(0) }));
    }

    fn register_index(&mut self, instr: &Instruction) -> Result<usize, ()> {
        match instr.operand1.as_deref().and_then(|s| s.parse::<usize>().ok()) {
            Some(idx) => Ok(idx),
            None => {
                self.fail(DiagnosticCode::UnsupportedOperand, "expected a register index");
                Err(())
            }
        }
    }

    /// Executes exactly one instruction, advancing `self.ip` (either by
    /// one, or to a branch target). Returns `Err` if a diagnostic was
    /// appended.
    fn step(&mut self) -> Result<(), ()> {
        let instr = self.instructions[self.ip].clone();
        match instr.opcode {
            Opcode::Nop => {
                self.ip += 1;
                Ok(())
            }
            Opcode::Push => {
                let n = instr
                    .numeric_operand
                    .clone()
                    .or_else(|| instr.operand1.as_deref().and_then(crate::runtime::instruction::parse_decimal_operand))
                    .unwrap_or_else(BigDecimal::zero);
                self.stack.push(Value::Number(n));
                self.ip += 1;
                Ok(())
            }
            Opcode::Pushs => {
                self.stack.push(Value::String(instr.operand1.clone().unwrap_or_default()));
                self.ip += 1;
                Ok(())
            }
            Opcode::Store => {
                let v = self.pop()?;
                let name = instr.operand1.clone().unwrap_or_default();
                self.memory.set(&name, v);
                self.ip += 1;
                Ok(())
            }
            Opcode::Load => {
                let name = instr.operand1.clone().unwrap_or_default();
                self.stack.push(self.memory.get(&name));
                self.ip += 1;
                Ok(())
            }
            Opcode::StoreArr => {
                let value = self.pop()?;
                let keys = self.pop_keys(&instr)?;
                let name = instr.operand1.clone().unwrap_or_default();
                let mut root = self.memory.get(&name);
                root.write_path(&keys, value);
                self.memory.set(&name, root);
                self.ip += 1;
                Ok(())
            }
            Opcode::LoadArr => {
                let keys = self.pop_keys(&instr)?;
                let name = instr.operand1.clone().unwrap_or_default();
                let root = self.memory.get(&name);
                self.stack.push(root.read_path(&keys));
                self.ip += 1;
                Ok(())
            }
            Opcode::Set => {
                let idx = self.register_index(&instr)?;
                let v = self.pop()?;
                if self.registers.len() <= idx {
                    self.registers.resize(idx + 1, Value::empty_string());
                }
                self.registers[idx] = v;
                self.ip += 1;
                Ok(())
            }
            Opcode::Get => {
                let idx = self.register_index(&instr)?;
                let v = self.registers.get(idx).cloned().unwrap_or_else(Value::empty_string);
                self.stack.push(v);
                self.ip += 1;
                Ok(())
            }
            Opcode::Add => self.numeric_binop(|a, b| a + b),
            Opcode::Sub => self.numeric_binop(|a, b| a - b),
            Opcode::Mul => self.numeric_binop(|a, b| a * b),
            Opcode::Div => self.divide(false),
            Opcode::Mod => self.divide(true),
            Opcode::Eq => self.compare_binop(|o| o == Ordering::Equal),
            Opcode::Ne => self.compare_binop(|o| o != Ordering::Equal),
            Opcode::Lt => self.compare_binop(|o| o == Ordering::Less),
            Opcode::Le => self.compare_binop(|o| o != Ordering::Greater),
            Opcode::Gt => self.compare_binop(|o| o == Ordering::Greater),
            Opcode::Ge => self.compare_binop(|o| o != Ordering::Less),
            Opcode::And => self.logical_binop(|a, b| a && b),
            Opcode::Or => self.logical_binop(|a, b| a || b),
            Opcode::Neg => {
                let a = self.pop()?;
                self.stack.push(Value::Number(-a.to_number()));
                self.ip += 1;
                Ok(())
            }
            Opcode::Not => {
                let a = self.pop()?;
                self.push_bool(!a.to_bool());
                self.ip += 1;
                Ok(())
            }
            Opcode::Br => {
                let target = instr.operand1.clone().unwrap_or_default();
                match self.labels.resolve(&target, instr.location, &mut self.bag) {
                    Some(idx) => {
                        self.ip = idx;
                        Ok(())
                    }
                    None => Err(()),
                }
            }
            Opcode::BrIf => {
                let v = self.pop()?;
                let target = if v.to_bool() {
                    instr.operand1.clone().unwrap_or_default()
                } else {
                    instr.operand2.clone().unwrap_or_default()
                };
                match self.labels.resolve(&target, instr.location, &mut self.bag) {
                    Some(idx) => {
                        self.ip = idx;
                        Ok(())
                    }
                    None => Err(()),
                }
            }
            Opcode::Call => {
                let target = instr.operand1.clone().unwrap_or_default();
                match self.labels.resolve(&target, instr.location, &mut self.bag) {
                    Some(idx) => {
                        self.call_stack.push(self.ip + 1);
                        self.ip = idx;
                        Ok(())
                    }
                    None => Err(()),
                }
            }
            Opcode::Ret => match self.call_stack.pop() {
                Some(addr) => {
                    self.ip = addr;
                    Ok(())
                }
                None => {
                    self.fail(DiagnosticCode::UnexpectedEmptyStack, "ret with no matching call");
                    Err(())
                }
            },
        }
    }

    /// Pops `operand2` keys off the value stack. The deepest index was
    /// pushed last, so it's popped first; reversing gives the natural
    /// outer-to-inner path order expected by `Value::read_path`/`write_path`
    /// (§4.6).
    fn pop_keys(&mut self, instr: &Instruction) -> Result<Vec<String>, ()> {
        let n = instr.key_count().unwrap_or(0);
        let mut keys = Vec::with_capacity(n);
        for _ in 0..n {
            keys.push(self.pop()?.to_key());
        }
        keys.reverse();
        Ok(keys)
    }

    fn numeric_binop(&mut self, f: impl Fn(&BigDecimal, &BigDecimal) -> BigDecimal) -> Result<(), ()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.stack.push(Value::Number(f(&a.to_number(), &b.to_number())));
        self.ip += 1;
        Ok(())
    }

    fn divide(&mut self, is_mod: bool) -> Result<(), ()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let divisor = b.to_number();
        if divisor.is_zero() {
            self.fail(DiagnosticCode::DivisionByZero, "Division by zero.");
            return Err(());
        }
        let dividend = a.to_number();
        let result = if is_mod {
            dividend % divisor
        } else {
            (dividend / divisor).with_scale(crate::value::DECIMAL_SCALE)
        };
        self.stack.push(Value::Number(result));
        self.ip += 1;
        Ok(())
    }

    fn compare_binop(&mut self, f: impl Fn(Ordering) -> bool) -> Result<(), ()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = f(a.compare(&b));
        self.push_bool(result);
        self.ip += 1;
        Ok(())
    }

    fn logical_binop(&mut self, f: impl Fn(bool, bool) -> bool) -> Result<(), ()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = f(a.to_bool(), b.to_bool());
        self.push_bool(result);
        self.ip += 1;
        Ok(())
    }

    // --- Read-only accessors (§6.1) ---

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn stack_count(&self) -> usize {
        self.stack.len()
    }

    pub fn stack_top(&self) -> Option<&Value> {
        self.stack.last()
    }

    pub fn stack_pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn has_error(&self) -> bool {
        !self.bag.is_empty()
    }

    pub fn error_info(&self) -> Option<RuntimeErrorInfo> {
        let diagnostic = self.bag.last()?;
        let (line, source_line) = match diagnostic.location {
            Some(loc) => {
                let idx = loc.line.saturating_sub(1);
                (idx, self.source_lines.get(idx).cloned().unwrap_or_default())
            }
            None => (0, String::new()),
        };
        Some(RuntimeErrorInfo {
            message: diagnostic.message.clone(),
            line,
            source_line,
        })
    }

    pub fn diagnostics(&self) -> &DiagnosticBag {
        &self.bag
    }

    pub fn code_lines(&self) -> &[String] {
        &self.source_lines
    }

    pub fn assembly_in_text_format(&self) -> String {
        assembler::emit_assembly(&self.instructions, &self.labels)
    }

    pub fn state(&self) -> EngineState {
        if self.has_error() {
            EngineState::Errored
        } else if self.instructions.is_empty() {
            EngineState::Fresh
        } else if self.ip >= self.instructions.len() {
            EngineState::Terminated
        } else {
            EngineState::Ready
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_push_single_value() {
        let mut engine = Engine::new("t");
        assert!(engine.parse_assembly("push 3.14", false));
        assert!(engine.run(true));
        assert_eq!(engine.ip(), 1);
        assert_eq!(engine.stack_count(), 1);
        assert_eq!(engine.stack_top().unwrap().to_display_string(), "3.14");
    }

    #[test]
    fn assembly_arithmetic_chain() {
        let mut engine = Engine::new("t");
        assert!(engine.parse_assembly(
            "push 120\npush 20\npush 30\npush 40\npush 50\nadd\nsub\nmul\ndiv",
            false
        ));
        assert!(engine.run(true));
        assert_eq!(engine.ip(), 9);
        assert!(!engine.has_error());
        assert_eq!(engine.stack_top().unwrap().to_display_string(), "-0.1");
    }

    #[test]
    fn basic_fibonacci_to_twenty() {
        let mut engine = Engine::new("t");
        let source = "Fib[0] = 0\nFib[1] = 1\nFor i = 2 To 20\nFib[i] = Fib[i-1] + Fib[i-2]\nEndFor\nFib[20]";
        assert!(engine.compile(source, false));
        assert!(engine.run(true));
        assert!(!engine.has_error());
        assert_eq!(engine.stack_top().unwrap().to_display_string(), "6765");
    }

    #[test]
    fn basic_primality_test_on_1000117() {
        let mut engine = Engine::new("t");
        let source = "n = 1000117\nisPrime = 1\nFor i = 2 To n - 1\nIf n Mod i = 0 Then\nisPrime = 0\nEndIf\nEndFor\nisPrime";
        assert!(engine.compile(source, false));
        assert!(engine.run(true));
        assert!(!engine.has_error());
        assert!(engine.stack_top().unwrap().to_bool());
    }

    #[test]
    fn undefined_branch_label_is_a_runtime_error() {
        let mut engine = Engine::new("t");
        assert!(engine.parse_assembly("br abc", false));
        assert!(!engine.run(true));
        let info = engine.error_info().unwrap();
        assert_eq!(info.message, "Undefined assembly label, abc");
        assert_eq!(info.line, 0);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut engine = Engine::new("t");
        assert!(engine.parse_assembly("push 3\npush 0\ndiv", false));
        assert!(!engine.run(true));
        assert_eq!(engine.ip(), 2);
        let info = engine.error_info().unwrap();
        assert_eq!(info.message, "Division by zero.");
    }

    #[test]
    fn unset_array_key_reads_as_empty_string() {
        let mut engine = Engine::new("t");
        assert!(engine.compile(r#"a["unknown"]"#, false));
        assert!(engine.run(true));
        assert!(!engine.has_error());
        assert_eq!(engine.stack_top().unwrap().to_display_string(), "");
    }

    #[test]
    fn incremental_fragments_match_single_compile() {
        let mut staged = Engine::new("t");
        assert!(staged.compile("x = 1", true));
        assert!(staged.run(true));
        assert!(staged.compile("x = x + 1", true));
        assert!(staged.run(true));
        assert!(staged.compile("x", true));
        assert!(staged.run(true));

        let mut whole = Engine::new("t");
        assert!(whole.compile("x = 1\nx = x + 1\nx", false));
        assert!(whole.run(true));

        assert_eq!(
            staged.stack_top().unwrap().to_display_string(),
            whole.stack_top().unwrap().to_display_string()
        );
    }

    #[test]
    fn reset_clears_every_piece_of_state() {
        let mut engine = Engine::new("t");
        engine.compile("x = 1", false);
        engine.run(true);
        engine.reset();
        assert_eq!(engine.instruction_count(), 0);
        assert_eq!(engine.stack_count(), 0);
        assert_eq!(engine.ip(), 0);
        assert!(!engine.has_error());
        assert_eq!(engine.state(), EngineState::Fresh);
    }
}
