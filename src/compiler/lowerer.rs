//! Lowers the syntax tree to the linear instruction stream (§4.5a).
//!
//! Appends to an existing instruction array and label table rather than
//! building its own, so incremental compilation can keep splicing new
//! instructions onto a live engine without disturbing earlier indices
//! (§9: the instruction array and label table are append-only).

use std::collections::HashSet;

use super::ast::{BinOp, Expr, LValue, Program, Statement, StatementKind, UnaryOp};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLocation};
use crate::runtime::instruction::{Instruction, Opcode};
use crate::runtime::labels::LabelTable;

/// Monotonic label-name generator shared across compiles of the same
/// engine, so fragment N+1 never reuses a label fragment N already
/// emitted (§9).
pub struct LabelSeed(usize);

impl LabelSeed {
    pub fn new() -> Self {
        Self(0)
    }

    fn fresh(&mut self, tag: &str) -> String {
        let label = format!("_{tag}{}", self.0);
        self.0 += 1;
        label
    }
}

impl Default for LabelSeed {
    fn default() -> Self {
        Self::new()
    }
}

pub fn lower_program(
    program: &Program,
    instructions: &mut Vec<Instruction>,
    labels: &mut LabelTable,
    seed: &mut LabelSeed,
    bag: &mut DiagnosticBag,
) {
    let subs = collect_sub_names(program);
    let mut lowerer = Lowerer {
        instructions,
        labels,
        seed,
        bag,
        subs: &subs,
        reg_scratch: 0,
        current_line: 0,
    };
    lowerer.lower_statements(&program.statements);
    log::debug!("lowering complete: {} instructions emitted", lowerer.instructions.len());
}

fn collect_sub_names(program: &Program) -> HashSet<String> {
    program
        .statements
        .iter()
        .filter_map(|s| match &s.kind {
            StatementKind::SubDef { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

struct Lowerer<'a> {
    instructions: &'a mut Vec<Instruction>,
    labels: &'a mut LabelTable,
    seed: &'a mut LabelSeed,
    bag: &'a mut DiagnosticBag,
    subs: &'a HashSet<String>,
    /// Hidden register scratch counter for `For` loop bookkeeping. Reset
    /// per compile call: loops never run concurrently, so reusing indices
    /// across unrelated loops within one lowering pass is safe.
    reg_scratch: usize,
    /// Line of the statement currently being lowered, stamped onto every
    /// instruction emitted for it that doesn't already carry a location
    /// (§6.4: a runtime error reports the line and source text it came
    /// from).
    current_line: usize,
}

impl<'a> Lowerer<'a> {
    fn emit(&mut self, mut instruction: Instruction) {
        if instruction.location.is_none() {
            instruction.location = Some(SourceLocation::new(self.current_line, 1));
        }
        self.instructions.push(instruction);
    }

    fn define_label(&mut self, name: &str) {
        let index = self.instructions.len();
        self.labels.define(name, index, self.bag);
    }

    fn fresh_register(&mut self) -> usize {
        let r = self.reg_scratch;
        self.reg_scratch += 1;
        r
    }

    fn lower_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.lower_statement(statement);
        }
    }

    fn lower_statement(&mut self, statement: &Statement) {
        self.current_line = statement.line;
        match &statement.kind {
            StatementKind::Assignment { target, value } => self.lower_assignment(target, value),
            StatementKind::If { branches, else_branch } => self.lower_if(branches, else_branch),
            StatementKind::For { variable, start, end, step, body } => {
                self.lower_for(variable, start, end, step.as_ref(), body)
            }
            StatementKind::While { condition, body } => self.lower_while(condition, body),
            StatementKind::SubDef { name, body } => self.lower_sub(name, body),
            StatementKind::GoTo(target) => self.emit(Instruction::new(Opcode::Br).with_operand1(target.clone())),
            StatementKind::Label(name) => self.define_label(name),
            StatementKind::Call { name, args } => self.lower_call(name, args),
            StatementKind::Expr(expr) => self.lower_expr(expr),
        }
    }

    fn lower_assignment(&mut self, target: &LValue, value: &Expr) {
        match target {
            LValue::Identifier(name) => {
                self.lower_expr(value);
                self.emit(Instruction::new(Opcode::Store).with_operand1(name.clone()));
            }
            LValue::Indexed { name, keys } => {
                for key in keys {
                    self.lower_expr(key);
                }
                self.lower_expr(value);
                self.emit(
                    Instruction::new(Opcode::StoreArr)
                        .with_operand1(name.clone())
                        .with_operand2(keys.len().to_string()),
                );
            }
        }
    }

    /// `If`/`ElseIf`/`Else` lower to a chain of `br_if` pairs converging
    /// at one post-label (§4.5a).
    fn lower_if(&mut self, branches: &[(Expr, Vec<Statement>)], else_branch: &Option<Vec<Statement>>) {
        let end_label = self.seed.fresh("endif");
        let mut pending_check: Option<String> = None;

        for (i, (cond, body)) in branches.iter().enumerate() {
            if let Some(label) = pending_check.take() {
                self.define_label(&label);
            }
            self.lower_expr(cond);

            let then_label = self.seed.fresh("then");
            let is_last = i == branches.len() - 1;
            let false_label = if is_last {
                if else_branch.is_some() {
                    self.seed.fresh("else")
                } else {
                    end_label.clone()
                }
            } else {
                self.seed.fresh("elif")
            };

            self.emit(
                Instruction::new(Opcode::BrIf)
                    .with_operand1(then_label.clone())
                    .with_operand2(false_label.clone()),
            );
            self.define_label(&then_label);
            self.lower_statements(body);
            self.emit(Instruction::new(Opcode::Br).with_operand1(end_label.clone()));

            if !is_last || else_branch.is_some() {
                pending_check = Some(false_label);
            }
        }

        if let Some(label) = pending_check.take() {
            self.define_label(&label);
        }
        if let Some(else_body) = else_branch {
            self.lower_statements(else_body);
        }
        self.define_label(&end_label);
    }

    /// `For i = s To e Step k`: hidden registers hold the precomputed end
    /// and step so the loop body can't perturb them; the continuation
    /// test covers both step directions since `k` need not be a compile-
    /// time constant (§4.5a: "a negative step reverses the comparison
    /// sense").
    fn lower_for(
        &mut self,
        variable: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Statement],
    ) {
        let end_reg = self.fresh_register();
        let step_reg = self.fresh_register();

        self.lower_expr(end);
        self.emit(Instruction::new(Opcode::Set).with_operand1(end_reg.to_string()));

        match step {
            Some(step_expr) => self.lower_expr(step_expr),
            None => self.emit(Instruction::push_number(1.into(), None)),
        }
        self.emit(Instruction::new(Opcode::Set).with_operand1(step_reg.to_string()));

        self.lower_expr(start);
        self.emit(Instruction::new(Opcode::Store).with_operand1(variable.to_string()));

        let top_label = self.seed.fresh("for");
        let body_label = self.seed.fresh("forbody");
        let done_label = self.seed.fresh("fordone");
        self.define_label(&top_label);

        // (var <= end AND step >= 0) OR (var >= end AND step < 0)
        self.emit(Instruction::new(Opcode::Load).with_operand1(variable.to_string()));
        self.emit(Instruction::new(Opcode::Get).with_operand1(end_reg.to_string()));
        self.emit(Instruction::new(Opcode::Le));
        self.emit(Instruction::new(Opcode::Get).with_operand1(step_reg.to_string()));
        self.emit(Instruction::push_number(0.into(), None));
        self.emit(Instruction::new(Opcode::Ge));
        self.emit(Instruction::new(Opcode::And));

        self.emit(Instruction::new(Opcode::Load).with_operand1(variable.to_string()));
        self.emit(Instruction::new(Opcode::Get).with_operand1(end_reg.to_string()));
        self.emit(Instruction::new(Opcode::Ge));
        self.emit(Instruction::new(Opcode::Get).with_operand1(step_reg.to_string()));
        self.emit(Instruction::push_number(0.into(), None));
        self.emit(Instruction::new(Opcode::Lt));
        self.emit(Instruction::new(Opcode::And));

        self.emit(Instruction::new(Opcode::Or));
        self.emit(
            Instruction::new(Opcode::BrIf)
                .with_operand1(body_label.clone())
                .with_operand2(done_label.clone()),
        );

        self.define_label(&body_label);
        self.lower_statements(body);
        self.emit(Instruction::new(Opcode::Load).with_operand1(variable.to_string()));
        self.emit(Instruction::new(Opcode::Get).with_operand1(step_reg.to_string()));
        self.emit(Instruction::new(Opcode::Add));
        self.emit(Instruction::new(Opcode::Store).with_operand1(variable.to_string()));
        self.emit(Instruction::new(Opcode::Br).with_operand1(top_label));
        self.define_label(&done_label);
    }

    fn lower_while(&mut self, condition: &Expr, body: &[Statement]) {
        let top_label = self.seed.fresh("while");
        let body_label = self.seed.fresh("whilebody");
        let done_label = self.seed.fresh("whiledone");

        self.define_label(&top_label);
        self.lower_expr(condition);
        self.emit(
            Instruction::new(Opcode::BrIf)
                .with_operand1(body_label.clone())
                .with_operand2(done_label.clone()),
        );
        self.define_label(&body_label);
        self.lower_statements(body);
        self.emit(Instruction::new(Opcode::Br).with_operand1(top_label));
        self.define_label(&done_label);
    }

    /// A `Sub` compiles inline but must not fall through into its own
    /// body during ordinary top-to-bottom execution, so it's wrapped in a
    /// jump around itself. The sub's own name is its entry label; `call`
    /// targets it directly (§4.5a).
    fn lower_sub(&mut self, name: &str, body: &[Statement]) {
        let skip_label = self.seed.fresh("subskip");
        self.emit(Instruction::new(Opcode::Br).with_operand1(skip_label.clone()));
        self.define_label(name);
        self.lower_statements(body);
        self.emit(Instruction::new(Opcode::Ret));
        self.define_label(&skip_label);
    }

    /// Calls are only recognized when they target a `Sub` defined in this
    /// compilation; there is no library of built-in functions, so any
    /// other target is an `UnsupportedOperand` diagnostic (§4.5a).
    fn lower_call(&mut self, name: &str, _args: &[Expr]) {
        if self.subs.contains(name) {
            self.emit(Instruction::new(Opcode::Call).with_operand1(name.to_string()));
        } else {
            self.bag.push(Diagnostic::new(
                DiagnosticCode::UnsupportedOperand,
                None,
                format!("'{name}' is not a recognized sub or library call"),
            ));
        }
    }

    fn lower_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(n) => self.emit(Instruction::push_number(n.clone(), None)),
            Expr::Str(s) => self.emit(Instruction::push_string(s.clone(), None)),
            Expr::Identifier(name) => {
                self.emit(Instruction::new(Opcode::Load).with_operand1(name.clone()))
            }
            Expr::Indexed { name, keys } => {
                for key in keys {
                    self.lower_expr(key);
                }
                self.emit(
                    Instruction::new(Opcode::LoadArr)
                        .with_operand1(name.clone())
                        .with_operand2(keys.len().to_string()),
                );
            }
            Expr::Unary(UnaryOp::Negate, operand) => {
                self.lower_expr(operand);
                self.emit(Instruction::new(Opcode::Neg));
            }
            Expr::Binary(op, lhs, rhs) => {
                self.lower_expr(lhs);
                self.lower_expr(rhs);
                self.emit(Instruction::new(binop_opcode(*op)));
            }
            Expr::Call { name, args } => {
                self.lower_call(name, args);
                // No return-value calling convention is defined; a call
                // used in expression position evaluates to empty string.
                self.emit(Instruction::push_string(String::new(), None));
            }
        }
    }
}

fn binop_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::Eq => Opcode::Eq,
        BinOp::Ne => Opcode::Ne,
        BinOp::Lt => Opcode::Lt,
        BinOp::Le => Opcode::Le,
        BinOp::Gt => Opcode::Gt,
        BinOp::Ge => Opcode::Ge,
        BinOp::And => Opcode::And,
        BinOp::Or => Opcode::Or,
    }
}
