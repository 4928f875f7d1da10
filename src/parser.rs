use crate::ast::{
    BinaryOperator, Expr, ExprKind, FunctionDecl, Name, Param, Program, Stmt, StmtKind, Target,
    UnaryOperator,
};
use crate::diagnostics::Diagnostics;
use crate::token::{Span, Token, TokenKind};
use crate::types::Type;

pub mod error;

pub use error::{ParseResult, SyntaxError};

pub struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
    diagnostics: Diagnostics,
}

impl<'t, 'a> Parser<'t, 'a> {
    pub fn new(tokens: &'t [Token<'a>]) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn parse_program(mut self) -> (Program, Diagnostics) {
        let mut statements = Vec::new();
        loop {
            self.consume_newlines();
            if self.check(TokenKind::EOF) {
                break;
            }
            if let Some(statement) = self.parse_statement_recovering() {
                statements.push(statement);
            }
        }
        (Program { statements }, self.diagnostics)
    }

    /// Parses one statement; on failure records the error, skips to the next
    /// statement boundary and returns `None`.
    fn parse_statement_recovering(&mut self) -> Option<Stmt> {
        let start = self.pos;
        match self.parse_statement() {
            Ok(statement) => Some(statement),
            Err(error) => {
                self.diagnostics.push(error.into());
                self.synchronize(start);
                None
            }
        }
    }

    fn synchronize(&mut self, start: usize) {
        if self.pos == start {
            self.advance();
        }
        loop {
            match self.kind() {
                TokenKind::EOF | TokenKind::End | TokenKind::Else => return,
                TokenKind::Newline => {
                    self.advance();
                    return;
                }
                kind if kind.starts_statement() => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_block(&mut self, allow_else: bool) -> Vec<Stmt> {
        let mut statements = Vec::new();
        loop {
            self.consume_newlines();
            match self.kind() {
                TokenKind::EOF | TokenKind::End => break,
                TokenKind::Else if allow_else => break,
                _ => {}
            }
            if let Some(statement) = self.parse_statement_recovering() {
                statements.push(statement);
            }
        }
        statements
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.span();
        let kind = match self.kind() {
            kind if kind.is_type_keyword() => self.parse_var_decl()?,
            TokenKind::Function => StmtKind::FunctionDecl(self.parse_function_decl()?),
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expression()?;
                let body = self.parse_body()?;
                StmtKind::While { condition, body }
            }
            TokenKind::Repeat => {
                self.advance();
                let count = self.parse_expression()?;
                self.expect(TokenKind::Times, "'times'")?;
                let body = self.parse_body()?;
                StmtKind::Repeat { count, body }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expression()?))
                }
            }
            TokenKind::Print => {
                self.advance();
                let mut values = vec![self.parse_expression()?];
                while self.eat(TokenKind::Comma) {
                    values.push(self.parse_expression()?);
                }
                StmtKind::Print(values)
            }
            TokenKind::Input => {
                self.advance();
                let (name, _) = self.expect_identifier()?;
                StmtKind::Input(Name::new(name))
            }
            TokenKind::Identifier(_) => self.parse_simple_statement()?,
            _ => return Err(self.error("statement")),
        };
        self.expect_statement_end()?;
        Ok(Stmt::new(kind, span.line, span.column))
    }

    fn parse_var_decl(&mut self) -> ParseResult<StmtKind> {
        let declared = self.parse_type()?;
        let (name, name_span) = self.expect_identifier()?;
        if !self.eat(TokenKind::Assign) {
            return Err(SyntaxError::MissingInitializer {
                name: name.to_string(),
                line: name_span.line,
                column: name_span.column,
            });
        }
        let init = self.parse_expression()?;
        Ok(StmtKind::VarDecl {
            name: Name::new(name),
            declared,
            init,
        })
    }

    /// Assignment or call statement, both starting with an identifier.
    fn parse_simple_statement(&mut self) -> ParseResult<StmtKind> {
        if matches!(self.peek_kind(1), TokenKind::LParen) {
            let call = self.parse_postfix()?;
            return Ok(StmtKind::Expr(call));
        }

        let (name, _) = self.expect_identifier()?;
        let mut row = None;
        let mut col = None;
        if self.eat(TokenKind::LBracket) {
            row = Some(self.parse_expression()?);
            self.expect(TokenKind::RBracket, "']'")?;
            if self.eat(TokenKind::LBracket) {
                col = Some(self.parse_expression()?);
                self.expect(TokenKind::RBracket, "']'")?;
            }
        }
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_expression()?;
        Ok(StmtKind::Assign {
            target: Target {
                name: Name::new(name),
                row,
                col,
            },
            value,
        })
    }

    fn parse_function_decl(&mut self) -> ParseResult<FunctionDecl> {
        self.expect(TokenKind::Function, "'function'")?;
        let return_type = self.parse_type()?;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let span = self.span();
                let ty = self.parse_type()?;
                let (param, _) = self.expect_identifier()?;
                params.push(Param {
                    name: Name::new(param),
                    ty,
                    line: span.line,
                    column: span.column,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_body()?;

        Ok(FunctionDecl {
            name: name.to_string(),
            return_type,
            params,
            body,
        })
    }

    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        self.expect(TokenKind::If, "'if'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let then_body = self.parse_block(true);
        let else_body = if self.eat(TokenKind::Else) {
            self.expect(TokenKind::Colon, "':'")?;
            Some(self.parse_block(false))
        } else {
            None
        };
        self.expect(TokenKind::End, "'end'")?;
        Ok(StmtKind::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> ParseResult<StmtKind> {
        self.expect(TokenKind::For, "'for'")?;

        let init_span = self.span();
        let init = if self.kind().is_type_keyword() {
            self.parse_var_decl()?
        } else if matches!(self.kind(), TokenKind::Identifier(_)) {
            self.parse_simple_statement()?
        } else {
            return Err(self.error("loop initializer"));
        };
        self.expect(TokenKind::Semicolon, "';'")?;

        let condition = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';'")?;

        let update_span = self.span();
        if !matches!(self.kind(), TokenKind::Identifier(_)) {
            return Err(self.error("loop update"));
        }
        let update = self.parse_simple_statement()?;
        let body = self.parse_body()?;

        Ok(StmtKind::For {
            init: Box::new(Stmt::new(init, init_span.line, init_span.column)),
            condition,
            update: Box::new(Stmt::new(update, update_span.line, update_span.column)),
            body,
        })
    }

    /// `: <statements> end`
    fn parse_body(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block(false);
        self.expect(TokenKind::End, "'end'")?;
        Ok(body)
    }

    fn parse_type(&mut self) -> ParseResult<Type> {
        let ty = match self.kind() {
            TokenKind::Int | TokenKind::Long => Type::Int,
            TokenKind::FloatType => Type::Float,
            TokenKind::StringType => Type::Str,
            TokenKind::Boolean => Type::Bool,
            TokenKind::Array => Type::Array(Box::new(Type::Unknown)),
            TokenKind::Matrix => Type::Matrix(None),
            TokenKind::Void => Type::Void,
            _ => return Err(self.error("type")),
        };
        self.advance();
        Ok(ty)
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let span = self.advance_span();
            let right = self.parse_and()?;
            expr = binary(BinaryOperator::Or, expr, right, span);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_equality()?;
        while self.check(TokenKind::And) {
            let span = self.advance_span();
            let right = self.parse_equality()?;
            expr = binary(BinaryOperator::And, expr, right, span);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_relational()?;
        loop {
            let op = match self.kind() {
                TokenKind::EqualEqual => BinaryOperator::Eq,
                TokenKind::NotEqual => BinaryOperator::Ne,
                _ => break,
            };
            let span = self.advance_span();
            let right = self.parse_relational()?;
            expr = binary(op, expr, right, span);
        }
        Ok(expr)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Less => BinaryOperator::Lt,
                TokenKind::LessEqual => BinaryOperator::Le,
                TokenKind::Greater => BinaryOperator::Gt,
                TokenKind::GreaterEqual => BinaryOperator::Ge,
                _ => break,
            };
            let span = self.advance_span();
            let right = self.parse_additive()?;
            expr = binary(op, expr, right, span);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            let span = self.advance_span();
            let right = self.parse_multiplicative()?;
            expr = binary(op, expr, right, span);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_exponent()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            let span = self.advance_span();
            let right = self.parse_exponent()?;
            expr = binary(op, expr, right, span);
        }
        Ok(expr)
    }

    /// Right-associative `^`. `m ^ t` (a bare `t`) is the transpose.
    fn parse_exponent(&mut self) -> ParseResult<Expr> {
        let mut base = self.parse_unary()?;
        while self.check(TokenKind::Caret) {
            let span = self.advance_span();
            if self.at_transpose_marker() {
                self.advance();
                base = Expr::new(
                    ExprKind::Unary {
                        op: UnaryOperator::Transpose,
                        operand: Box::new(base),
                    },
                    span.line,
                    span.column,
                );
                continue;
            }
            let exponent = self.parse_exponent()?;
            return Ok(binary(BinaryOperator::Pow, base, exponent, span));
        }
        Ok(base)
    }

    fn at_transpose_marker(&self) -> bool {
        matches!(self.kind(), TokenKind::Identifier("t"))
            && !matches!(self.peek_kind(1), TokenKind::LParen | TokenKind::LBracket)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.kind() {
            TokenKind::Minus => UnaryOperator::Neg,
            TokenKind::Not => UnaryOperator::Not,
            _ => return self.parse_postfix(),
        };
        let span = self.advance_span();
        let operand = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span.line,
            span.column,
        ))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.check(TokenKind::LBracket) {
            let span = self.advance_span();
            let row = self.parse_expression()?;
            self.expect(TokenKind::RBracket, "']'")?;
            let col = if self.eat(TokenKind::LBracket) {
                let col = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                Some(Box::new(col))
            } else {
                None
            };
            expr = Expr::new(
                ExprKind::Index {
                    base: Box::new(expr),
                    row: Box::new(row),
                    col,
                },
                span.line,
                span.column,
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.span();
        let kind = match self.kind() {
            TokenKind::Integer(value) => {
                self.advance();
                ExprKind::Integer(value)
            }
            TokenKind::Float(value) => {
                self.advance();
                ExprKind::Float(value)
            }
            TokenKind::String(raw) => {
                self.advance();
                ExprKind::String(unescape(raw, span)?)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Boolean(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Boolean(false)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.eat(TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    ExprKind::Call {
                        name: name.to_string(),
                        args,
                    }
                } else {
                    ExprKind::Identifier(Name::new(name))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                self.advance();
                self.parse_array_literal()?
            }
            _ => return Err(self.error("expression")),
        };
        Ok(Expr::new(kind, span.line, span.column))
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    /// Elements after the opening `[`. Line breaks are allowed between elements.
    fn parse_array_literal(&mut self) -> ParseResult<ExprKind> {
        let mut elements = Vec::new();
        self.consume_newlines();
        if !self.check(TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expression()?);
                self.consume_newlines();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                self.consume_newlines();
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;

        let is_matrix = !elements.is_empty()
            && elements
                .iter()
                .all(|element| matches!(element.kind, ExprKind::ArrayLiteral(_)));
        if !is_matrix {
            return Ok(ExprKind::ArrayLiteral(elements));
        }
        let rows = elements
            .into_iter()
            .map(|row| match row.kind {
                ExprKind::ArrayLiteral(values) => values,
                _ => Vec::new(),
            })
            .collect();
        Ok(ExprKind::MatrixLiteral(rows))
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::EOF | TokenKind::End | TokenKind::Else
        )
    }

    fn expect_statement_end(&mut self) -> ParseResult<()> {
        if self.eat(TokenKind::Newline) || self.at_statement_end() {
            Ok(())
        } else {
            Err(self.error("end of line"))
        }
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.eat(TokenKind::Newline) {
            consumed = true;
        }
        consumed
    }

    fn expect_identifier(&mut self) -> ParseResult<(&'a str, Span)> {
        if let TokenKind::Identifier(name) = self.kind() {
            let span = self.advance_span();
            Ok((name, span))
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect(&mut self, kind: TokenKind<'static>, expected: &str) -> ParseResult<Span> {
        if self.check(kind) {
            Ok(self.advance_span())
        } else {
            Err(self.error(expected))
        }
    }

    fn eat(&mut self, kind: TokenKind<'static>) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind<'static>) -> bool {
        self.kind() == kind
    }

    fn kind(&self) -> TokenKind<'a> {
        self.peek_kind(0)
    }

    fn peek_kind(&self, offset: usize) -> TokenKind<'a> {
        self.tokens
            .get(self.pos + offset)
            .map(|token| token.kind)
            .unwrap_or(TokenKind::EOF)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(Token::span)
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn advance_span(&mut self) -> Span {
        let span = self.span();
        self.advance();
        span
    }

    fn error(&self, expected: &str) -> SyntaxError {
        let span = self.span();
        SyntaxError::Unexpected {
            expected: expected.to_string(),
            found: self.kind().to_string(),
            line: span.line,
            column: span.column,
        }
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span.line,
        span.column,
    )
}

fn unescape(raw: &str, span: Span) -> ParseResult<String> {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('"') => text.push('"'),
            Some('\\') => text.push('\\'),
            other => {
                return Err(SyntaxError::InvalidEscape {
                    character: other.unwrap_or(' '),
                    line: span.line,
                    column: span.column,
                });
            }
        }
    }
    Ok(text)
}

pub fn parse(tokens: &[Token<'_>]) -> (Program, Diagnostics) {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;

    fn parse_source(source: &str) -> (Program, Diagnostics) {
        let (tokens, errors) = tokenize(source);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        parse(&tokens)
    }

    fn parse_ok(source: &str) -> Program {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        program
    }

    fn int(value: i64, line: usize, column: usize) -> Expr {
        Expr::new(ExprKind::Integer(value), line, column)
    }

    fn ident(name: &str, line: usize, column: usize) -> Expr {
        Expr::new(ExprKind::Identifier(Name::new(name)), line, column)
    }

    #[test]
    fn parses_simple_program() {
        let program = parse_ok(indoc! {"
            int x = 2
            print x + 3 * 4
        "});

        let expected = Program {
            statements: vec![
                Stmt::new(
                    StmtKind::VarDecl {
                        name: Name::new("x"),
                        declared: Type::Int,
                        init: int(2, 1, 9),
                    },
                    1,
                    1,
                ),
                Stmt::new(
                    StmtKind::Print(vec![binary(
                        BinaryOperator::Add,
                        ident("x", 2, 7),
                        binary(
                            BinaryOperator::Mul,
                            int(3, 2, 11),
                            int(4, 2, 15),
                            Span {
                                start: 0,
                                end: 0,
                                line: 2,
                                column: 13,
                            },
                        ),
                        Span {
                            start: 0,
                            end: 0,
                            line: 2,
                            column: 9,
                        },
                    )]),
                    2,
                    1,
                ),
            ],
        };

        assert_eq!(program, expected);
    }

    #[test]
    fn exponent_is_right_associative() {
        let program = parse_ok("print 2 ^ 3 ^ 2\n");
        let StmtKind::Print(values) = &program.statements[0].kind else {
            panic!("expected print");
        };
        let ExprKind::Binary { op, left, right } = &values[0].kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOperator::Pow);
        assert!(matches!(left.kind, ExprKind::Integer(2)));
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOperator::Pow,
                ..
            }
        ));
    }

    #[test]
    fn parses_transpose_and_matrix_literal() {
        let program = parse_ok("matrix m = [[1, 2], [3, 4]] ^ t\n");
        let StmtKind::VarDecl { init, .. } = &program.statements[0].kind else {
            panic!("expected declaration");
        };
        let ExprKind::Unary { op, operand } = &init.kind else {
            panic!("expected unary");
        };
        assert_eq!(*op, UnaryOperator::Transpose);
        assert!(matches!(&operand.kind, ExprKind::MatrixLiteral(rows) if rows.len() == 2));
    }

    #[test]
    fn parses_control_flow_blocks() {
        let program = parse_ok(indoc! {"
            function int twice(int n):
                return n * 2
            end
            for int i = 0; i < 3; i = i + 1:
                if i == 1:
                    continue
                else:
                    print twice(i)
                end
            end
            repeat 2 times:
                print \"hi\"
            end
        "});
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(program.statements[0].kind, StmtKind::FunctionDecl(_)));
        let StmtKind::For { init, update, body, .. } = &program.statements[1].kind else {
            panic!("expected for");
        };
        assert!(matches!(init.kind, StmtKind::VarDecl { .. }));
        assert!(matches!(update.kind, StmtKind::Assign { .. }));
        assert!(matches!(
            body[0].kind,
            StmtKind::If {
                else_body: Some(_),
                ..
            }
        ));
        assert!(matches!(program.statements[2].kind, StmtKind::Repeat { .. }));
    }

    #[test]
    fn parses_indexed_assignment() {
        let program = parse_ok("m[0][1] = 5\n");
        let StmtKind::Assign { target, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(target.name.name, "m");
        assert!(target.row.is_some() && target.col.is_some());
    }

    #[test]
    fn collects_every_syntax_error() {
        let (program, diagnostics) = parse_source(indoc! {"
            int x =
            int y
            print 1
            x = = 3
        "});
        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.clone()).collect();
        assert_eq!(
            messages,
            vec![
                "Expected expression, found end of line".to_string(),
                "Variable 'y' must be initialized when declared".to_string(),
                "Expected expression, found '='".to_string(),
            ]
        );
        assert_eq!(program.statements.len(), 1);
        assert_eq!(diagnostics.iter().map(|d| d.line).collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn reports_missing_end() {
        let (_, diagnostics) = parse_source("while true:\nprint 1\n");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.iter().all(|d| d.message == "Expected 'end', found end of input"));
    }
}
