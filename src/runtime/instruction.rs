//! The linear instruction stream (§3, §6.3): one record per step, with up
//! to two string operands and an optional pre-parsed numeric operand.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::diagnostics::SourceLocation;

/// The complete opcode set (§6.3). Mnemonics are the authoritative textual
/// form used by the assembler and by `assemblyInTextFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    Push,
    Pushs,
    Store,
    Load,
    StoreArr,
    LoadArr,
    Set,
    Get,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Neg,
    Not,
    Br,
    BrIf,
    Call,
    Ret,
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Push => "push",
            Opcode::Pushs => "pushs",
            Opcode::Store => "store",
            Opcode::Load => "load",
            Opcode::StoreArr => "store_arr",
            Opcode::LoadArr => "load_arr",
            Opcode::Set => "set",
            Opcode::Get => "get",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::Gt => "gt",
            Opcode::Ge => "ge",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::Br => "br",
            Opcode::BrIf => "br_if",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "nop" => Opcode::Nop,
            "push" => Opcode::Push,
            "pushs" => Opcode::Pushs,
            "store" => Opcode::Store,
            "load" => Opcode::Load,
            "store_arr" => Opcode::StoreArr,
            "load_arr" => Opcode::LoadArr,
            "set" => Opcode::Set,
            "get" => Opcode::Get,
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "mul" => Opcode::Mul,
            "div" => Opcode::Div,
            "mod" => Opcode::Mod,
            "eq" => Opcode::Eq,
            "ne" => Opcode::Ne,
            "lt" => Opcode::Lt,
            "le" => Opcode::Le,
            "gt" => Opcode::Gt,
            "ge" => Opcode::Ge,
            "and" => Opcode::And,
            "or" => Opcode::Or,
            "neg" => Opcode::Neg,
            "not" => Opcode::Not,
            "br" => Opcode::Br,
            "br_if" => Opcode::BrIf,
            "call" => Opcode::Call,
            "ret" => Opcode::Ret,
            _ => return None,
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// One record of the bytecode stream. `operand1`/`operand2` hold the
/// textual operands (label names, memory/register names, or the raw
/// decimal/string text); `numeric_operand` is a pre-parsed cache of
/// `operand1` for the opcodes that carry a decimal literal, kept in sync
/// by whichever producer built the instruction. The textual form remains
/// authoritative for round-tripping (§6.3).
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand1: Option<String>,
    pub operand2: Option<String>,
    pub numeric_operand: Option<BigDecimal>,
    pub location: Option<SourceLocation>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand1: None,
            operand2: None,
            numeric_operand: None,
            location: None,
        }
    }

    pub fn with_operand1(mut self, operand: impl Into<String>) -> Self {
        self.operand1 = Some(operand.into());
        self
    }

    pub fn with_operand2(mut self, operand: impl Into<String>) -> Self {
        self.operand2 = Some(operand.into());
        self
    }

    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn push_number(value: BigDecimal, location: Option<SourceLocation>) -> Self {
        let mut instr = Instruction::new(Opcode::Push)
            .with_operand1(value.to_string())
            .with_location(location);
        instr.numeric_operand = Some(value);
        instr
    }

    pub fn push_string(value: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Instruction::new(Opcode::Pushs)
            .with_operand1(value.into())
            .with_location(location)
    }

    /// The key count carried by `store_arr`/`load_arr` as `operand2`.
    pub fn key_count(&self) -> Option<usize> {
        self.operand2.as_ref().and_then(|s| s.parse().ok())
    }

    /// Renders this instruction back to its assembly-text line, used by
    /// `assemblyInTextFormat` and by round-trip tests.
    pub fn to_text(&self) -> String {
        let mut line = self.opcode.mnemonic().to_string();
        if let Some(op1) = &self.operand1 {
            line.push(' ');
            if matches!(self.opcode, Opcode::Pushs) {
                line.push_str(&quote(op1));
            } else {
                line.push_str(op1);
            }
        }
        if let Some(op2) = &self.operand2 {
            line.push(' ');
            line.push_str(op2);
        }
        line
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

pub fn parse_decimal_operand(s: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_push_instruction() {
        let instr = Instruction::push_number("3.14".parse().unwrap(), None);
        assert_eq!(instr.to_text(), "push 3.14");
    }

    #[test]
    fn quotes_and_escapes_string_operands() {
        let instr = Instruction::push_string("a\"b\\c", None);
        assert_eq!(instr.to_text(), r#"pushs "a\"b\\c""#);
    }

    #[test]
    fn store_arr_carries_key_count_as_operand2() {
        let instr = Instruction::new(Opcode::StoreArr)
            .with_operand1("a")
            .with_operand2("2");
        assert_eq!(instr.key_count(), Some(2));
        assert_eq!(instr.to_text(), "store_arr a 2");
    }
}
