//! Recursive-descent parser: tokens to [`Program`] (§4.4).
//!
//! Malformed input appends a diagnostic and the parser recovers at the next
//! statement boundary (a newline) rather than aborting the whole parse, so
//! later statements still get a chance to compile.

use super::ast::{BinOp, Expr, LValue, Program, Statement, StatementKind, UnaryOp};
use super::token::{Token, TokenKind};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLocation};

pub fn parse(tokens: &[Token], bag: &mut DiagnosticBag) -> Program {
    let mut parser = Parser { tokens, pos: 0, bag };
    let statements = parser.parse_statements(&[TokenKind::Eof]);
    Program { statements }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    bag: &'t mut DiagnosticBag,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !matches!(tok.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let tok = self.peek();
        let code = if matches!(tok.kind, TokenKind::Eof) {
            DiagnosticCode::UnexpectedEndOfStream
        } else {
            DiagnosticCode::UnexpectedToken
        };
        self.bag.push(Diagnostic::new(
            code,
            Some(SourceLocation::new(tok.line, tok.column)),
            message,
        ));
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            let found = self.peek_kind().clone();
            self.error(format!("expected {context}, found {found}"));
            false
        }
    }

    /// Skips blank statement separators (newlines, and stray colons).
    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Colon) {
            self.advance();
        }
    }

    /// Recovers from a parse error by skipping to the next statement
    /// boundary so later statements still get parsed.
    fn recover(&mut self) {
        while !self.at_eof() && !matches!(self.peek_kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn at_block_end(&self, terminators: &[TokenKind]) -> bool {
        terminators
            .iter()
            .any(|t| std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(t))
    }

    fn parse_statements(&mut self, terminators: &[TokenKind]) -> Vec<Statement> {
        let mut statements = Vec::new();
        self.skip_separators();
        while !self.at_eof() && !self.at_block_end(terminators) {
            let before = self.pos;
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            if self.pos == before {
                // Parser made no progress; force it forward to avoid looping.
                self.recover();
            }
            self.skip_separators();
        }
        statements
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        let line = self.peek().line;
        let kind = match self.peek_kind().clone() {
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Sub => self.parse_sub(),
            TokenKind::GoTo => {
                self.advance();
                match self.peek_kind().clone() {
                    TokenKind::Identifier(name) => {
                        self.advance();
                        Some(StatementKind::GoTo(name))
                    }
                    _ => {
                        self.error("expected a label name after GoTo");
                        self.recover();
                        None
                    }
                }
            }
            TokenKind::Identifier(name) => self.parse_identifier_led_statement(name),
            _ => {
                let found = self.peek_kind().clone();
                self.error(format!("unexpected {found} at start of statement"));
                self.recover();
                None
            }
        }?;
        Some(Statement { kind, line })
    }

    /// Disambiguates a leading identifier between a label definition
    /// (`name:`), a sub/function call, an indexed or plain assignment, and
    /// a bare expression statement (§9 open question: assignment vs.
    /// equality is resolved purely by statement position).
    fn parse_identifier_led_statement(&mut self, name: String) -> Option<StatementKind> {
        // Label definition: `name:` alone, followed only by a statement
        // separator.
        if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Colon)) {
            self.advance(); // identifier
            self.advance(); // colon
            return Some(StatementKind::Label(name));
        }

        self.advance(); // identifier

        if self.eat(&TokenKind::LBracket) {
            let keys = self.parse_index_keys();
            if self.eat(&TokenKind::Equal) {
                let value = self.parse_expression();
                return Some(StatementKind::Assignment {
                    target: LValue::Indexed { name, keys },
                    value,
                });
            }
            // Not an assignment: a bare indexed read used as a statement
            // (mirrors the plain-identifier fallback below).
            return Some(StatementKind::Expr(Expr::Indexed { name, keys }));
        }

        if self.eat(&TokenKind::Equal) {
            let value = self.parse_expression();
            return Some(StatementKind::Assignment {
                target: LValue::Identifier(name),
                value,
            });
        }

        if self.eat(&TokenKind::LParen) {
            let args = self.parse_call_args();
            return Some(StatementKind::Call { name, args });
        }

        // Bare identifier (or an expression continuing from it): treat as
        // an expression statement whose value the incremental driver can
        // surface (§4.7).
        let expr = self.parse_expression_tail(Expr::Identifier(name));
        Some(StatementKind::Expr(expr))
    }

    fn parse_index_keys(&mut self) -> Vec<Expr> {
        // First `[...]` group, then any immediately-following `[...]`
        // groups for multi-dimensional access (`a[i][j]`).
        let mut keys = vec![self.parse_expression()];
        self.expect(&TokenKind::RBracket, "']'");
        while self.eat(&TokenKind::LBracket) {
            keys.push(self.parse_expression());
            self.expect(&TokenKind::RBracket, "']'");
        }
        keys
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            args.push(self.parse_expression());
            while self.eat(&TokenKind::Comma) {
                args.push(self.parse_expression());
            }
        }
        self.expect(&TokenKind::RParen, "')'");
        args
    }

    fn parse_if(&mut self) -> Option<StatementKind> {
        self.advance(); // If
        let mut branches = Vec::new();
        let cond = self.parse_expression();
        self.expect(&TokenKind::Then, "'Then'");
        let body = self.parse_statements(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf]);
        branches.push((cond, body));

        while matches!(self.peek_kind(), TokenKind::ElseIf) {
            self.advance();
            let cond = self.parse_expression();
            self.expect(&TokenKind::Then, "'Then'");
            let body =
                self.parse_statements(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf]);
            branches.push((cond, body));
        }

        let else_branch = if self.eat(&TokenKind::Else) {
            Some(self.parse_statements(&[TokenKind::EndIf]))
        } else {
            None
        };

        self.expect(&TokenKind::EndIf, "'EndIf'");
        Some(StatementKind::If {
            branches,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Option<StatementKind> {
        self.advance(); // For
        let variable = match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                name
            }
            _ => {
                self.error("expected loop variable name after For");
                self.recover();
                return None;
            }
        };
        self.expect(&TokenKind::Equal, "'=' after For variable");
        let start = self.parse_expression();
        self.expect(&TokenKind::To, "'To'");
        let end = self.parse_expression();
        let step = if self.eat(&TokenKind::Step) {
            Some(self.parse_expression())
        } else {
            None
        };
        let body = self.parse_statements(&[TokenKind::EndFor]);
        self.expect(&TokenKind::EndFor, "'EndFor'");
        Some(StatementKind::For {
            variable,
            start,
            end,
            step,
            body,
        })
    }

    fn parse_while(&mut self) -> Option<StatementKind> {
        self.advance(); // While
        let condition = self.parse_expression();
        let body = self.parse_statements(&[TokenKind::EndWhile]);
        self.expect(&TokenKind::EndWhile, "'EndWhile'");
        Some(StatementKind::While { condition, body })
    }

    fn parse_sub(&mut self) -> Option<StatementKind> {
        self.advance(); // Sub
        let name = match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                name
            }
            _ => {
                self.error("expected a name after Sub");
                self.recover();
                return None;
            }
        };
        let body = self.parse_statements(&[TokenKind::EndSub]);
        self.expect(&TokenKind::EndSub, "'EndSub'");
        Some(StatementKind::SubDef { name, body })
    }

    // --- Expressions, lowest to highest precedence: Or/And < comparisons
    // < additive < multiplicative < unary < primary (§4.4). ---

    fn parse_expression(&mut self) -> Expr {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Expr {
        let mut left = self.parse_and();
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and();
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        left
    }

    fn parse_and(&mut self) -> Expr {
        let mut left = self.parse_comparison();
        while self.eat(&TokenKind::And) {
            let right = self.parse_comparison();
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        left
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut left = self.parse_additive();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equal => BinOp::Eq,
                TokenKind::NotEqual => BinOp::Ne,
                TokenKind::Less => BinOp::Lt,
                TokenKind::LessEqual => BinOp::Le,
                TokenKind::Greater => BinOp::Gt,
                TokenKind::GreaterEqual => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive();
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        left
    }

    fn parse_additive(&mut self) -> Expr {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative();
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        left
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut left = self.parse_unary();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary();
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        left
    }

    fn parse_unary(&mut self) -> Expr {
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary();
            Expr::Unary(UnaryOp::Negate, Box::new(operand))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Expr::Number(n)
            }
            TokenKind::Str(s) => {
                self.advance();
                Expr::Str(s)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression();
                self.expect(&TokenKind::RParen, "')'");
                inner
            }
            TokenKind::Identifier(name) => {
                self.advance();
                self.parse_expression_tail(Expr::Identifier(name))
            }
            other => {
                self.error(format!("unexpected {other} in expression"));
                Expr::Str(String::new())
            }
        }
    }

    /// Once an identifier has been consumed, decide whether it's a bare
    /// name, an indexed access, or a call — shared between statement- and
    /// expression-position parsing.
    fn parse_expression_tail(&mut self, base: Expr) -> Expr {
        let name = match &base {
            Expr::Identifier(name) => name.clone(),
            _ => return base,
        };

        if self.eat(&TokenKind::LBracket) {
            let keys = self.parse_index_keys();
            return Expr::Indexed { name, keys };
        }

        if self.eat(&TokenKind::LParen) {
            let args = self.parse_call_args();
            return Expr::Call { name, args };
        }

        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;

    fn parse_source(src: &str) -> (Program, DiagnosticBag) {
        let mut bag = DiagnosticBag::new();
        let tokens = Lexer::new(src).tokenize(&mut bag);
        let program = parse(&tokens, &mut bag);
        (program, bag)
    }

    #[test]
    fn parses_simple_assignment() {
        let (program, bag) = parse_source("x = 1 + 2");
        assert!(bag.is_empty());
        assert_eq!(program.statements.len(), 1);
        assert!(matches!(
            &program.statements[0].kind,
            StatementKind::Assignment { target: LValue::Identifier(n), .. } if n == "x"
        ));
    }

    #[test]
    fn disambiguates_equality_from_assignment_by_position() {
        let (program, bag) = parse_source("If a = 1 Then\nb = 2\nEndIf");
        assert!(bag.is_empty());
        match &program.statements[0].kind {
            StatementKind::If { branches, .. } => {
                assert!(matches!(branches[0].0, Expr::Binary(BinOp::Eq, _, _)));
                assert!(matches!(
                    branches[0].1[0].kind,
                    StatementKind::Assignment { target: LValue::Identifier(_), .. }
                ));
            }
            other => panic!("expected If statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_indexed_assignment_and_nested_index() {
        let (program, bag) = parse_source("a[0][1] = 5");
        assert!(bag.is_empty());
        match &program.statements[0].kind {
            StatementKind::Assignment {
                target: LValue::Indexed { name, keys },
                ..
            } => {
                assert_eq!(name, "a");
                assert_eq!(keys.len(), 2);
            }
            other => panic!("expected indexed assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_for_loop_with_step() {
        let (program, bag) = parse_source("For i = 2 To 20 Step 1\nx = i\nEndFor");
        assert!(bag.is_empty());
        assert!(matches!(&program.statements[0].kind, StatementKind::For { .. }));
    }

    #[test]
    fn malformed_input_recovers_at_next_statement() {
        let (program, bag) = parse_source("x = \ny = 2");
        assert!(!bag.is_empty());
        // second statement still parses despite the first being broken
        assert!(program.statements.iter().any(|s| matches!(
            &s.kind,
            StatementKind::Assignment { target: LValue::Identifier(n), .. } if n == "y"
        )));
    }

    #[test]
    fn bare_indexed_read_statement_does_not_require_assignment() {
        let (program, bag) = parse_source(r#"a["unknown"]"#);
        assert!(bag.is_empty());
        assert!(matches!(&program.statements[0].kind, StatementKind::Expr(Expr::Indexed { .. })));
    }

    #[test]
    fn precedence_is_comparisons_below_additive_below_multiplicative() {
        let (program, _) = parse_source("x = 1 + 2 * 3 = 7");
        match &program.statements[0].kind {
            StatementKind::Assignment { value, .. } => {
                assert!(matches!(value, Expr::Binary(BinOp::Eq, _, _)));
            }
            _ => panic!("expected assignment"),
        }
    }
}
