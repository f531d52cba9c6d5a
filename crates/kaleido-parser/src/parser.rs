//! Parser for the Kaleido language
//!
//! Recursive descent over the token stream. Precedence, loosest first:
//! assignment, `or`, `and`, `not`, comparison, additive,
//! multiplicative, unary minus, primary. `if`, `var` and `for` are
//! primaries whose trailing expression extends as far right as possible.
//!
//! Top-level items are separated by `;`. After a syntax error the parser
//! skips to the next `;` and carries on, so one bad declaration does not
//! hide the diagnostics of the rest of the file.

use crate::ast::*;
use kaleido_error::{Diagnostic, Diagnostics, ErrorCode, Span};
use kaleido_lexer::{Token, TokenKind};
use tracing::debug;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Diagnostics,
}

/// Marker for "a diagnostic has already been recorded".
type ParseResult<T> = Result<T, ()>;

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !tokens.last().map_or(false, Token::is_eof) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, Span::point(end.end, end.file_id)));
        }
        Self {
            tokens,
            pos: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    // =========================================
    // Helpers
    // =========================================

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + 1).min(last)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().is(kind)
    }

    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> ParseResult<Span> {
        if self.check(kind) {
            Ok(self.advance().span)
        } else {
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, message);
            Err(())
        }
    }

    fn error_at_current(&mut self, code: ErrorCode, message: &str) {
        let token = self.peek();
        let diagnostic = Diagnostic::error(message)
            .with_code(code)
            .with_label(token.span, format!("found `{}`", token.kind));
        self.diagnostics.push(diagnostic);
    }

    /// Skips past the next `;` (or to the end of input).
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.advance().is(&TokenKind::Semicolon) {
                return;
            }
        }
    }

    // =========================================
    // Top level
    // =========================================

    pub fn parse(&mut self) -> Ast {
        let mut items = Vec::new();

        while !self.is_at_end() {
            if self.match_token(&TokenKind::Semicolon) {
                continue;
            }
            match self.parse_top_level() {
                Ok(item) => {
                    debug!(kind = item.kind_name(), "parsed top-level item");
                    items.push(item);
                    if self.is_at_end() {
                        break;
                    }
                    if self
                        .expect(&TokenKind::Semicolon, "expected `;` after declaration")
                        .is_err()
                    {
                        self.synchronize();
                    }
                }
                Err(()) => self.synchronize(),
            }
        }

        Ast::Sequence(items)
    }

    fn parse_top_level(&mut self) -> ParseResult<Ast> {
        match self.peek().kind {
            TokenKind::Def => self.parse_definition(),
            TokenKind::Extern => {
                self.advance();
                Ok(Ast::Prototype(self.parse_prototype()?))
            }
            TokenKind::Global => self.parse_global(),
            _ => {
                self.error_at_current(
                    ErrorCode::EXPECTED_DECLARATION,
                    "expected `def`, `extern` or `global`",
                );
                Err(())
            }
        }
    }

    /// `def name(params) [:] body`
    fn parse_definition(&mut self) -> ParseResult<Ast> {
        let start = self.advance().span;
        let proto = self.parse_prototype()?;
        self.match_token(&TokenKind::Colon);
        let body = self.parse_expression()?;
        let span = start.to(self.previous().span);
        Ok(Ast::Function(FunctionDef {
            proto,
            body: Box::new(body),
            span,
        }))
    }

    /// `name(a, b, ...)`
    fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let start = self.peek().span;
        let name = self.parse_identifier("expected function name")?;
        self.expect(&TokenKind::LParen, "expected `(` after function name")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_identifier("expected parameter name")?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(&TokenKind::RParen, "expected `)` after parameters")?;

        Ok(Prototype {
            name,
            params,
            span: start.to(end),
        })
    }

    /// `global name`
    fn parse_global(&mut self) -> ParseResult<Ast> {
        let start = self.advance().span;
        let name = self.parse_identifier("expected global variable name")?;
        Ok(Ast::GlobalVar(GlobalVar {
            name,
            span: start.to(self.previous().span),
        }))
    }

    // =========================================
    // Expressions
    // =========================================

    fn parse_expression(&mut self) -> ParseResult<Ast> {
        self.parse_assignment()
    }

    /// `x = value` | `++x` | or-expression
    fn parse_assignment(&mut self) -> ParseResult<Ast> {
        if self.match_token(&TokenKind::PlusPlus) {
            let name = self.parse_identifier("expected variable name after `++`")?;
            return Ok(Ast::Assignment(Assignment {
                name,
                kind: AssignKind::Increment,
            }));
        }

        if let TokenKind::Ident(name) = &self.peek().kind {
            if self.peek_next().is(&TokenKind::Eq) {
                let name = name.clone();
                self.advance();
                self.advance();
                let value = self.parse_assignment()?;
                return Ok(Ast::Assignment(Assignment {
                    name,
                    kind: AssignKind::Set(Box::new(value)),
                }));
            }
        }

        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Ast> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Ast::Logical {
                op: LogicalOp::Or,
                lhs: Some(Box::new(left)),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Ast> {
        let mut left = self.parse_not()?;
        while self.match_token(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Ast::Logical {
                op: LogicalOp::And,
                lhs: Some(Box::new(left)),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Ast> {
        if self.match_token(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Ast::Logical {
                op: LogicalOp::Not,
                lhs: None,
                rhs: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Ast> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::EqEq => BinaryOp::Eq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Ast> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Ast> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    /// Unary minus has no left operand.
    fn parse_unary(&mut self) -> ParseResult<Ast> {
        if self.match_token(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Ast::Binary {
                op: BinaryOp::Sub,
                lhs: None,
                rhs: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Ast> {
        match &self.peek().kind {
            TokenKind::Number(value) => {
                let value = *value;
                self.advance();
                Ok(Ast::Number(value))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                if self.match_token(&TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    Ok(Ast::Call { callee: name, args })
                } else {
                    Ok(Ast::Variable(name))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "expected `)` to close parenthesized expression")?;
                Ok(inner)
            }
            TokenKind::LBrace => self.parse_statements(),
            TokenKind::If => self.parse_if(),
            TokenKind::Var => self.parse_var_block(),
            TokenKind::For => self.parse_for(),
            _ => {
                self.error_at_current(ErrorCode::EXPECTED_EXPRESSION, "expected expression");
                Err(())
            }
        }
    }

    /// Arguments after the opening `(`
    fn parse_arguments(&mut self) -> ParseResult<Vec<Ast>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    /// `{ e1; e2; ...; en }`
    fn parse_statements(&mut self) -> ParseResult<Ast> {
        self.advance();
        let mut exprs = vec![self.parse_expression()?];
        while self.match_token(&TokenKind::Semicolon) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            exprs.push(self.parse_expression()?);
        }
        self.expect(&TokenKind::RBrace, "expected `}` to close block")?;
        Ast::statements(exprs).ok_or(())
    }

    /// `if cond then a else b`
    fn parse_if(&mut self) -> ParseResult<Ast> {
        self.advance();
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::Then, "expected `then` after condition")?;
        let then = self.parse_expression()?;
        self.expect(&TokenKind::Else, "expected `else` branch")?;
        let otherwise = self.parse_expression()?;
        Ok(Ast::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// `var a = 1, b = 2 in body`
    fn parse_var_block(&mut self) -> ParseResult<Ast> {
        self.advance();
        let mut bindings = vec![self.parse_binding()?];
        while self.match_token(&TokenKind::Comma) {
            bindings.push(self.parse_binding()?);
        }
        self.expect(&TokenKind::In, "expected `in` after bindings")?;
        let body = self.parse_expression()?;
        Ok(Ast::Block {
            bindings,
            body: Box::new(body),
        })
    }

    fn parse_binding(&mut self) -> ParseResult<VarBinding> {
        let name = self.parse_identifier("expected variable name")?;
        self.expect(&TokenKind::Eq, "expected `=` in binding")?;
        let init = self.parse_expression()?;
        Ok(VarBinding {
            name,
            init: Box::new(init),
        })
    }

    /// `for var i = e, cond, step in body` or `for i = e, cond, step in body`
    fn parse_for(&mut self) -> ParseResult<Ast> {
        self.advance();
        let init = if self.match_token(&TokenKind::Var) {
            ForInit::Binding(self.parse_binding()?)
        } else {
            let VarBinding { name, init } = self.parse_binding()?;
            ForInit::Assign(Assignment {
                name,
                kind: AssignKind::Set(init),
            })
        };
        self.expect(&TokenKind::Comma, "expected `,` after loop initializer")?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::Comma, "expected `,` after loop condition")?;
        let step = self.parse_expression()?;
        self.expect(&TokenKind::In, "expected `in` before loop body")?;
        let body = self.parse_expression()?;
        Ok(Ast::For(ForLoop {
            init,
            cond: Box::new(cond),
            step: Box::new(step),
            body: Box::new(body),
        }))
    }

    fn parse_identifier(&mut self, message: &str) -> ParseResult<String> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            self.error_at_current(ErrorCode::EXPECTED_IDENTIFIER, message);
            Err(())
        }
    }
}

fn binary(op: BinaryOp, lhs: Ast, rhs: Ast) -> Ast {
    Ast::Binary {
        op,
        lhs: Some(Box::new(lhs)),
        rhs: Box::new(rhs),
    }
}

/// Parses a whole token stream into an `Ast::Sequence`
pub fn parse(tokens: Vec<Token>) -> (Ast, Diagnostics) {
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    (program, parser.take_diagnostics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaleido_lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn parse_source(source: &str) -> (Vec<Ast>, Diagnostics) {
        let mut lexer = Lexer::new(source, 0);
        let (program, diagnostics) = parse(lexer.tokenize());
        match program {
            Ast::Sequence(items) => (items, diagnostics),
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    fn render(source: &str) -> String {
        let (items, diagnostics) = parse_source(source);
        assert!(!diagnostics.has_errors(), "diagnostics: {:?}", diagnostics);
        Ast::Sequence(items).to_string()
    }

    #[test]
    fn test_parse_declarations() {
        let (items, diagnostics) = parse_source("extern sin(x); global g; def f(x, y): x + y * 2;");
        assert!(!diagnostics.has_errors());
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], Ast::Prototype(p) if p.name == "sin" && p.params == ["x"]));
        assert!(matches!(&items[1], Ast::GlobalVar(g) if g.name == "g"));
        match &items[2] {
            Ast::Function(def) => {
                assert_eq!(def.proto.name, "f");
                assert_eq!(def.proto.params, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(def.body.to_string(), "(+ x (* y 2))");
                assert_eq!(def.span.start.column, 26);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            render("def f(a, b) not a < b + 1 and b == -a or a"),
            "(def f (a b) (or (and (not (< a (+ b 1))) (== b (- a))) a))"
        );
    }

    #[test]
    fn test_control_flow_forms() {
        assert_eq!(
            render("def f(x) var y = 1, z = y in if x < y then z else { x = 2; ++x }"),
            "(def f (x) (var ((y 1) (z y)) (if (< x y) z (seq (= x 2) (++ x)))))"
        );
        assert_eq!(
            render("def g(n) for var i = 0, i < n, ++i in printd(i)"),
            "(def g (n) (for var (i 0) (< i n) (++ i) (call printd i)))"
        );
        assert_eq!(
            render("def h(i) for i = 1, i < 3, i = i + 1 in i"),
            "(def h (i) (for (= i 1) (< i 3) (= i (+ i 1)) i))"
        );
    }

    #[test]
    fn test_assignment_is_right_associative() {
        assert_eq!(render("def f(a, b) a = b = 3"), "(def f (a b) (= a (= b 3)))");
    }

    #[test]
    fn test_recovers_at_next_semicolon() {
        let (items, diagnostics) = parse_source("def f(x) x +; def g() 1; 42; extern h()");
        assert_eq!(diagnostics.error_count(), 2);
        let names: Vec<_> = items.iter().filter_map(Ast::lex_val).collect();
        assert_eq!(
            names,
            vec![LexVal::Ident("g".into()), LexVal::Ident("h".into())]
        );
        let codes: Vec<_> = diagnostics.iter().filter_map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![ErrorCode::EXPECTED_EXPRESSION, ErrorCode::EXPECTED_DECLARATION]
        );
    }

    #[test]
    fn test_missing_else_is_an_error() {
        let (items, diagnostics) = parse_source("def f(x) if x then 1;");
        assert!(items.is_empty());
        assert!(diagnostics.has_errors());
    }
}
