use std::{iter::Peekable, str::CharIndices};

use crate::token::{Span, Token, TokenKind};

pub mod error;

pub use error::LexError;

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    eof_reached: bool,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            eof_reached: false,
            line: 1,
            column: 1,
        }
    }

    /// Produces the next token. A malformed lexeme is consumed and reported,
    /// so the caller can keep scanning after an error.
    pub fn next_token(&mut self) -> Result<Token<'a>, LexError> {
        self.skip_whitespace_and_comments();

        let (start_idx, ch) = match self.chars.peek() {
            Some(&(idx, c)) => (idx, c),
            None => {
                self.eof_reached = true;
                let index = self.input.len();
                return Ok(Token::new(
                    TokenKind::EOF,
                    Span {
                        start: index,
                        end: index,
                        line: self.line,
                        column: self.column,
                    },
                ));
            }
        };

        let line = self.line;
        let column = self.column;
        let single = match ch {
            '\n' => Some(TokenKind::Newline),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            '^' => Some(TokenKind::Caret),
            ':' => Some(TokenKind::Colon),
            ';' => Some(TokenKind::Semicolon),
            ',' => Some(TokenKind::Comma),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            _ => None,
        };
        if let Some(kind) = single {
            self.advance_char();
            return Ok(self.token(kind, start_idx, line, column));
        }

        match ch {
            '=' | '<' | '>' | '!' => {
                self.advance_char();
                let followed_by_equal = self.eat('=');
                let kind = match (ch, followed_by_equal) {
                    ('=', false) => TokenKind::Assign,
                    ('=', true) => TokenKind::EqualEqual,
                    ('<', false) => TokenKind::Less,
                    ('<', true) => TokenKind::LessEqual,
                    ('>', false) => TokenKind::Greater,
                    ('>', true) => TokenKind::GreaterEqual,
                    ('!', true) => TokenKind::NotEqual,
                    _ => {
                        return Err(LexError::UnexpectedCharacter {
                            character: '!',
                            line,
                            column,
                        });
                    }
                };
                Ok(self.token(kind, start_idx, line, column))
            }
            '"' => self.read_string(start_idx, line, column),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier(start_idx, line, column)),
            c if c.is_ascii_digit() => self.read_number(start_idx, line, column),
            _ => {
                self.advance_char();
                Err(LexError::UnexpectedCharacter {
                    character: ch,
                    line,
                    column,
                })
            }
        }
    }

    fn token(&mut self, kind: TokenKind<'a>, start: usize, line: usize, column: usize) -> Token<'a> {
        Token::new(
            kind,
            Span {
                start,
                end: self.current_index(),
                line,
                column,
            },
        )
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance_char();
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let input = self.input;
        let end_idx = self.current_index();
        let ident = &input[start..end_idx];
        let kind = TokenKind::keyword(ident).unwrap_or(TokenKind::Identifier(ident));
        self.token(kind, start, line, column)
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> Result<Token<'a>, LexError> {
        self.consume_digits();

        let mut is_float = false;
        let mut lookahead = self.chars.clone();
        if let Some((_, '.')) = lookahead.next()
            && matches!(lookahead.peek(), Some((_, c)) if c.is_ascii_digit())
        {
            is_float = true;
            self.advance_char();
            self.consume_digits();
        }

        let input = self.input;
        let end_idx = self.current_index();
        let literal = &input[start..end_idx];
        let invalid = || LexError::InvalidNumberLiteral {
            literal: literal.to_string(),
            line,
            column,
        };
        let kind = if is_float {
            TokenKind::Float(literal.parse::<f64>().map_err(|_| invalid())?)
        } else {
            TokenKind::Integer(literal.parse::<i64>().map_err(|_| invalid())?)
        };
        Ok(self.token(kind, start, line, column))
    }

    fn consume_digits(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, start: usize, line: usize, column: usize) -> Result<Token<'a>, LexError> {
        self.advance_char(); // opening quote
        let content_start = start + 1;
        while let Some(&(idx, c)) = self.chars.peek() {
            match c {
                '"' => {
                    self.advance_char();
                    let input = self.input;
                    let contents = &input[content_start..idx];
                    return Ok(self.token(TokenKind::String(contents), start, line, column));
                }
                '\\' => {
                    self.advance_char();
                    if matches!(self.chars.peek(), Some((_, '\n')) | None) {
                        break;
                    }
                    self.advance_char();
                }
                '\n' => break,
                _ => {
                    self.advance_char();
                }
            }
        }
        Err(LexError::UnterminatedString { line, column })
    }

    fn eat(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.advance_char();
            true
        } else {
            false
        }
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof_reached {
            return None;
        }
        Some(self.next_token())
    }
}

/// Scans the whole input. Lexical errors are collected instead of stopping
/// the scan; the token stream always ends with `EOF`.
pub fn tokenize(input: &str) -> (Vec<Token<'_>>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for item in Lexer::new(input) {
        match item {
            Ok(token) => tokens.push(token),
            Err(error) => errors.push(error),
        }
    }
    (tokens, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            function int add(int a, int b):
                return a + b   # sum
            end
        "};
        let expected_tokens = vec![
            TokenKind::Function,
            TokenKind::Int,
            TokenKind::Identifier("add"),
            TokenKind::LParen,
            TokenKind::Int,
            TokenKind::Identifier("a"),
            TokenKind::Comma,
            TokenKind::Int,
            TokenKind::Identifier("b"),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Return,
            TokenKind::Identifier("a"),
            TokenKind::Plus,
            TokenKind::Identifier("b"),
            TokenKind::Newline,
            TokenKind::End,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected_tokens);
    }

    #[test]
    fn scans_numbers_and_comparison_operators() {
        assert_eq!(
            kinds("x <= 2.5 != 3 == y >= 1"),
            vec![
                TokenKind::Identifier("x"),
                TokenKind::LessEqual,
                TokenKind::Float(2.5),
                TokenKind::NotEqual,
                TokenKind::Integer(3),
                TokenKind::EqualEqual,
                TokenKind::Identifier("y"),
                TokenKind::GreaterEqual,
                TokenKind::Integer(1),
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let (tokens, _) = tokenize("int x = 1\n  print x");
        let print = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Print)
            .expect("print token");
        assert_eq!((print.span.line, print.span.column), (2, 3));
    }

    #[test]
    fn keeps_scanning_after_invalid_character() {
        let (tokens, errors) = tokenize("x = 1 @ 2\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("Unexpected character '@'"));
        assert!(tokens.iter().any(|token| token.kind == TokenKind::Integer(2)));
    }

    #[test]
    fn errors_on_integer_overflow() {
        let (_, errors) = tokenize("int n = 99999999999999999999999999\n");
        assert!(matches!(errors[0], LexError::InvalidNumberLiteral { .. }));
    }

    #[test]
    fn reports_unterminated_string() {
        let (tokens, errors) = tokenize("print \"abc\nprint 1");
        assert_eq!(errors, vec![LexError::UnterminatedString { line: 1, column: 7 }]);
        assert_eq!(tokens.last().map(|token| token.kind), Some(TokenKind::EOF));
    }
}
