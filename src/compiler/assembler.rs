//! The independent assembly-text path (§4.5b, §6.3): parses `name:` label
//! lines and `opcode [operand1 [operand2]]` lines directly into the same
//! instruction stream the lowerer produces, and re-emits that stream as
//! text for round-tripping.

use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLocation};
use crate::runtime::instruction::{Instruction, Opcode};
use crate::runtime::labels::LabelTable;

/// Parses `text` and appends the resulting instructions to `instructions`,
/// defining labels in `labels` at their instruction index. Blank lines and
/// `;` comments are ignored. Unknown opcodes and duplicate labels are
/// compile errors (§4.5b).
pub fn parse_assembly(
    text: &str,
    instructions: &mut Vec<Instruction>,
    labels: &mut LabelTable,
    bag: &mut DiagnosticBag,
) {
    for (line_index, raw_line) in text.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_suffix(':') {
            let name = name.trim();
            labels.define(name, instructions.len(), bag);
            continue;
        }

        match parse_instruction_line(line, line_no) {
            Ok(instr) => instructions.push(instr),
            Err(message) => bag.push(Diagnostic::new(
                DiagnosticCode::UnknownOpcode,
                Some(SourceLocation::new(line_no, 1)),
                message,
            )),
        }
    }
    log::debug!("assembly parse complete: {} instructions total", instructions.len());
}

/// Finds the comment-starting `;`, ignoring any that fall inside a
/// double-quoted operand (so a lowered `pushs "a;b"` round-trips intact).
/// Tracks `\"`/`\\` escapes the same way `parse_operand` does, so the two
/// stay in sync on what counts as "inside a string".
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ';' => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn parse_instruction_line(line: &str, line_no: usize) -> Result<Instruction, String> {
    let mut rest = line.trim_start();
    let mnemonic_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let mnemonic = &rest[..mnemonic_end];
    rest = rest[mnemonic_end..].trim_start();

    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| format!("unknown opcode '{mnemonic}' at line {line_no}"))?;

    let (operand1, rest) = parse_operand(rest)?;
    let (operand2, _rest) = parse_operand(rest)?;

    let mut instr = Instruction::new(opcode)
        .with_location(Some(SourceLocation::new(line_no, 1)));
    if let Some(op1) = operand1 {
        if matches!(opcode, Opcode::Push) {
            instr.numeric_operand = BigDecimal::from_str(&op1).ok();
        }
        instr = instr.with_operand1(op1);
    }
    if let Some(op2) = operand2 {
        instr = instr.with_operand2(op2);
    }
    Ok(instr)
}

/// Parses a single operand: either a double-quoted string (with `\"`/`\\`
/// escapes) or a bare token up to the next whitespace. Returns the
/// operand and whatever source remains.
fn parse_operand(rest: &str) -> Result<(Option<String>, &str), String> {
    let rest = rest.trim_start();
    if rest.is_empty() {
        return Ok((None, rest));
    }

    if let Some(unquoted) = rest.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = unquoted.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            match c {
                '"' => return Ok((Some(value), &unquoted[idx + 1..])),
                '\\' => match chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return Err("unterminated string operand".to_string()),
                },
                other => value.push(other),
            }
        }
        return Err("unterminated string operand".to_string());
    }

    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Ok((Some(rest[..end].to_string()), &rest[end..]))
}

/// Re-emits the instruction stream as assembly text, interleaving label
/// definitions at the instruction index they point to. Used for
/// `assemblyInTextFormat` and round-trip tests.
pub fn emit_assembly(instructions: &[Instruction], labels: &LabelTable) -> String {
    let mut labels_by_index: Vec<(usize, &str)> = labels
        .entries_for_display()
        .map(|(name, idx)| (idx, name))
        .collect();
    labels_by_index.sort_by_key(|(idx, _)| *idx);

    let mut out = String::new();
    let mut label_cursor = 0;
    for (index, instr) in instructions.iter().enumerate() {
        while label_cursor < labels_by_index.len() && labels_by_index[label_cursor].0 == index {
            out.push_str(labels_by_index[label_cursor].1);
            out.push_str(":\n");
            label_cursor += 1;
        }
        out.push_str(&instr.to_text());
        out.push('\n');
    }
    while label_cursor < labels_by_index.len() {
        out.push_str(labels_by_index[label_cursor].1);
        out.push_str(":\n");
        label_cursor += 1;
    }
    out
}
