//! Turns BASIC source text into a stream of [`Token`]s with line/column
//! spans (§4.3).

use std::str::FromStr;

use bigdecimal::BigDecimal;

use super::token::{keyword, Token, TokenKind};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticBag, SourceLocation};

/// Character-at-a-time cursor over the source, tracking line/column as it
/// advances. Mirrors the cursor/lexer split used by small assemblers in
/// this codebase's lineage, generalized to BASIC's richer grammar.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => {}
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Lexes the entire source into tokens, terminated by an `Eof` token.
    /// Appends a diagnostic to `bag` for each malformed token but keeps
    /// going so the parser can still recover at statement boundaries.
    pub fn tokenize(mut self, bag: &mut DiagnosticBag) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();

            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, line, column));
                break;
            };

            if c == '\n' {
                self.bump();
                tokens.push(Token::new(TokenKind::Newline, line, column));
                continue;
            }

            let kind = if c == '"' {
                match self.lex_string() {
                    Ok(s) => TokenKind::Str(s),
                    Err(()) => {
                        bag.push(Diagnostic::new(
                            DiagnosticCode::UnexpectedEndOfStream,
                            Some(SourceLocation::new(line, column)),
                            "unterminated string literal",
                        ));
                        tokens.push(Token::new(TokenKind::Eof, line, column));
                        break;
                    }
                }
            } else if c.is_ascii_digit() {
                self.lex_number()
            } else if c.is_alphabetic() || c == '_' {
                self.lex_word()
            } else {
                self.bump();
                match self.lex_punctuation(c) {
                    Some(kind) => kind,
                    None => {
                        bag.push(Diagnostic::new(
                            DiagnosticCode::UnexpectedToken,
                            Some(SourceLocation::new(line, column)),
                            format!("unexpected character '{c}'"),
                        ));
                        continue;
                    }
                }
            };

            tokens.push(Token::new(kind, line, column));
        }

        tokens
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c == ' ' || c == '\t' || c == '\r' => {
                    self.bump();
                }
                Some('\'') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self) -> Result<String, ()> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some(other) => {
                        s.push('\\');
                        s.push(other);
                    }
                    None => return Err(()),
                },
                Some(c) => s.push(c),
                None => return Err(()),
            }
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            // Only consume the dot as a decimal point if a digit follows;
            // otherwise it's the statement-separator '.' punctuation.
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some(c) if c.is_ascii_digit()) {
                text.push('.');
                self.bump();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }

        let value = BigDecimal::from_str(&text).unwrap_or_default();
        TokenKind::Number(value)
    }

    fn lex_word(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        keyword(&text).unwrap_or(TokenKind::Identifier(text))
    }

    fn lex_punctuation(&mut self, c: char) -> Option<TokenKind> {
        match c {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            '.' => Some(TokenKind::Dot),
            ':' => Some(TokenKind::Colon),
            '=' => Some(TokenKind::Equal),
            '<' => {
                if self.peek() == Some('>') {
                    self.bump();
                    Some(TokenKind::NotEqual)
                } else if self.peek() == Some('=') {
                    self.bump();
                    Some(TokenKind::LessEqual)
                } else {
                    Some(TokenKind::Less)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Some(TokenKind::GreaterEqual)
                } else {
                    Some(TokenKind::Greater)
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        let mut bag = DiagnosticBag::new();
        Lexer::new(src)
            .tokenize(&mut bag)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_assignment() {
        let tokens = lex("x = 3.14");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Equal,
                TokenKind::Number("3.14".parse().unwrap()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_relational_operators() {
        let tokens = lex("a <> b <= c >= d");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::NotEqual,
                TokenKind::Identifier("b".into()),
                TokenKind::LessEqual,
                TokenKind::Identifier("c".into()),
                TokenKind::GreaterEqual,
                TokenKind::Identifier("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = lex("iF tHeN");
        assert_eq!(tokens, vec![TokenKind::If, TokenKind::Then, TokenKind::Eof]);
    }

    #[test]
    fn string_escapes() {
        let mut bag = DiagnosticBag::new();
        let tokens = Lexer::new(r#""a\"b\\c""#).tokenize(&mut bag);
        assert_eq!(tokens[0].kind, TokenKind::Str("a\"b\\c".to_string()));
    }

    #[test]
    fn unterminated_string_reports_end_of_stream() {
        let mut bag = DiagnosticBag::new();
        Lexer::new("\"unterminated").tokenize(&mut bag);
        assert!(bag.is_incomplete_input());
    }

    #[test]
    fn line_comment_is_skipped() {
        let tokens = lex("x = 1 ' this is a comment\ny = 2");
        assert!(tokens
            .iter()
            .all(|t| !matches!(t, TokenKind::Identifier(s) if s == "this")));
    }
}
