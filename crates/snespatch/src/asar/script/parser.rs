//! Statement parser for one preprocessed line

use super::error::{ScriptError, ScriptResult};
use super::expr::{BinaryOp, Expr, ExprKind};
use super::lexer::tokenize;
use super::mapper::Mapper;
use super::token::{Token, TokenKind};
use crate::asar::opcodes;
use crate::common::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Label { name: String, span: Span },
    /// `name = expr`, a label with an explicit value
    Assign { name: String, value: Expr, span: Span },
    Org(Expr),
    Mapper(Mapper),
    Data { width: u8, items: Vec<DataItem> },
    Incbin { path: String, span: Span },
    Warn { message: String, span: Span },
    Error { message: String, span: Span },
    Instruction(Instruction),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataItem {
    Expr(Expr),
    Text { text: String, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: String,
    /// Operand width forced with `.b`, `.w` or `.l`
    pub hint: Option<u8>,
    pub operand: Operand,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Accumulator,
    Immediate(Expr),
    Address { expr: Expr, shape: Shape },
    BlockMove { src: Expr, dst: Expr },
}

/// Syntactic form of a memory operand, before its width is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `addr`
    Direct,
    /// `addr,x`
    IndexedX,
    /// `addr,y`
    IndexedY,
    /// `sr,s`
    Stack,
    /// `(addr)`
    Indirect,
    /// `(addr,x)`
    IndexedIndirect,
    /// `(addr),y`
    IndirectIndexed,
    /// `(sr,s),y`
    StackIndirectIndexed,
    /// `[addr]`
    IndirectLong,
    /// `[addr],y`
    IndirectLongIndexed,
}

/// Parse one line into zero or more statements
pub fn parse_line(line: &str) -> ScriptResult<Vec<Statement>> {
    let mut parser = Parser::new(tokenize(line)?);
    let mut statements = Vec::new();

    while !parser.at_eol() {
        statements.push(parser.parse_statement()?);
    }

    Ok(statements)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, ahead: usize) -> &TokenKind {
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eol(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eol)
    }

    fn check(&self, expected: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(expected)
    }

    fn expect(&mut self, expected: TokenKind) -> ScriptResult<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            let token = self.current();
            Err(ScriptError::parser(
                format!("expected {}, found {}", expected, token.kind),
                token.span,
            ))
        }
    }

    fn expect_end(&self) -> ScriptResult<()> {
        if self.at_eol() {
            Ok(())
        } else {
            let token = self.current();
            Err(ScriptError::parser(
                format!("unexpected {} after statement", token.kind),
                token.span,
            ))
        }
    }

    fn expect_string(&mut self, what: &str) -> ScriptResult<(String, Span)> {
        let token = self.advance();
        match token.kind {
            TokenKind::String(text) => Ok((text, token.span)),
            other => Err(ScriptError::parser(
                format!("expected quoted {what}, found {other}"),
                token.span,
            )),
        }
    }

    fn parse_statement(&mut self) -> ScriptResult<Statement> {
        let token = self.advance();
        let TokenKind::Identifier(word) = token.kind else {
            return Err(ScriptError::parser(
                format!("expected command or label, found {}", token.kind),
                token.span,
            ));
        };

        if self.check(&TokenKind::Colon) {
            self.advance();
            return Ok(Statement::Label {
                name: word,
                span: token.span,
            });
        }

        if self.check(&TokenKind::Equals) {
            self.advance();
            let value = self.parse_expr()?;
            self.expect_end()?;
            return Ok(Statement::Assign {
                name: word,
                span: token.span.merge(value.span),
                value,
            });
        }

        let statement = match word.to_ascii_lowercase().as_str() {
            "org" => Statement::Org(self.parse_expr()?),
            "lorom" => Statement::Mapper(Mapper::LoRom),
            "hirom" => Statement::Mapper(Mapper::HiRom),
            "norom" => Statement::Mapper(Mapper::NoRom),
            "db" => self.parse_data(1)?,
            "dw" => self.parse_data(2)?,
            "dl" => self.parse_data(3)?,
            "dd" => self.parse_data(4)?,
            "incbin" => {
                let (path, span) = self.expect_string("file name")?;
                Statement::Incbin { path, span }
            }
            "warn" => {
                let (message, span) = self.expect_string("message")?;
                Statement::Warn {
                    message,
                    span: token.span.merge(span),
                }
            }
            "error" => {
                let (message, span) = self.expect_string("message")?;
                Statement::Error {
                    message,
                    span: token.span.merge(span),
                }
            }
            _ if opcodes::is_mnemonic(&word) => self.parse_instruction(word, token.span)?,
            _ => {
                return Err(ScriptError::parser(
                    format!("unknown command '{word}'"),
                    token.span,
                ));
            }
        };

        self.expect_end()?;
        Ok(statement)
    }

    fn parse_data(&mut self, width: u8) -> ScriptResult<Statement> {
        let mut items = Vec::new();
        loop {
            if let TokenKind::String(text) = &self.current().kind {
                let text = text.clone();
                let span = self.advance().span;
                items.push(DataItem::Text { text, span });
            } else {
                items.push(DataItem::Expr(self.parse_expr()?));
            }

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(Statement::Data { width, items })
    }

    fn parse_instruction(&mut self, mnemonic: String, start: Span) -> ScriptResult<Statement> {
        let mut hint = None;
        if self.check(&TokenKind::Dot) {
            self.advance();
            let token = self.advance();
            hint = match &token.kind {
                kind if kind.is_word("b") => Some(1),
                kind if kind.is_word("w") => Some(2),
                kind if kind.is_word("l") => Some(3),
                other => {
                    return Err(ScriptError::parser(
                        format!("invalid width suffix {other}, expected b, w or l"),
                        token.span,
                    ));
                }
            };
        }

        let operand = self.parse_operand()?;
        let span = start.merge(self.tokens[self.pos.saturating_sub(1)].span);
        Ok(Statement::Instruction(Instruction {
            mnemonic,
            hint,
            operand,
            span,
        }))
    }

    fn parse_operand(&mut self) -> ScriptResult<Operand> {
        if self.at_eol() {
            return Ok(Operand::None);
        }

        if self.current().kind.is_word("a") && matches!(self.peek_kind(1), TokenKind::Eol) {
            self.advance();
            return Ok(Operand::Accumulator);
        }

        match self.current().kind.clone() {
            TokenKind::Hash => {
                self.advance();
                Ok(Operand::Immediate(self.parse_expr()?))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                let shape = if self.check(&TokenKind::Comma) {
                    self.advance();
                    let index = self.advance();
                    if index.kind.is_word("x") {
                        self.expect(TokenKind::RParen)?;
                        Shape::IndexedIndirect
                    } else if index.kind.is_word("s") {
                        self.expect(TokenKind::RParen)?;
                        self.expect_index("y")?;
                        Shape::StackIndirectIndexed
                    } else {
                        return Err(ScriptError::parser(
                            format!("expected x or s, found {}", index.kind),
                            index.span,
                        ));
                    }
                } else {
                    self.expect(TokenKind::RParen)?;
                    if self.check(&TokenKind::Comma) {
                        self.expect_index("y")?;
                        Shape::IndirectIndexed
                    } else {
                        Shape::Indirect
                    }
                };
                Ok(Operand::Address { expr, shape })
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                let shape = if self.check(&TokenKind::Comma) {
                    self.expect_index("y")?;
                    Shape::IndirectLongIndexed
                } else {
                    Shape::IndirectLong
                };
                Ok(Operand::Address { expr, shape })
            }
            _ => {
                let expr = self.parse_expr()?;
                if !self.check(&TokenKind::Comma) {
                    return Ok(Operand::Address {
                        expr,
                        shape: Shape::Direct,
                    });
                }
                self.advance();

                let index = &self.current().kind;
                let is_register = matches!(self.peek_kind(1), TokenKind::Eol);
                let shape = if is_register && index.is_word("x") {
                    Shape::IndexedX
                } else if is_register && index.is_word("y") {
                    Shape::IndexedY
                } else if is_register && index.is_word("s") {
                    Shape::Stack
                } else {
                    let dst = self.parse_expr()?;
                    return Ok(Operand::BlockMove { src: expr, dst });
                };
                self.advance();
                Ok(Operand::Address { expr, shape })
            }
        }
    }

    /// Consume `,reg`
    fn expect_index(&mut self, register: &str) -> ScriptResult<()> {
        self.expect(TokenKind::Comma)?;
        let token = self.advance();
        if token.kind.is_word(register) {
            Ok(())
        } else {
            Err(ScriptError::parser(
                format!("expected index register {register}, found {}", token.kind),
                token.span,
            ))
        }
    }

    fn parse_expr(&mut self) -> ScriptResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> ScriptResult<Expr> {
        let mut lhs = self.parse_unary()?;

        while let Some(precedence) = self.current().kind.binary_precedence() {
            if precedence <= min_precedence {
                break;
            }
            let op = match self.advance().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Amp => BinaryOp::And,
                TokenKind::Pipe => BinaryOp::Or,
                TokenKind::LtLt => BinaryOp::Shl,
                _ => BinaryOp::Shr,
            };
            let rhs = self.parse_binary(precedence)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ScriptResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::new(ExprKind::Number(n), token.span)),
            TokenKind::Identifier(name) => Ok(Expr::new(ExprKind::Symbol(name), token.span)),
            TokenKind::Minus => {
                let operand = self.parse_unary()?;
                let span = token.span.merge(operand.span);
                Ok(Expr::new(ExprKind::Neg(Box::new(operand)), span))
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let close = self.expect(TokenKind::RParen)?;
                Ok(Expr::new(inner.kind, token.span.merge(close.span)))
            }
            other => Err(ScriptError::parser(
                format!("expected expression, found {other}"),
                token.span,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asar::script::error::ScriptErrorKind;
    use crate::asar::script::token::Number;
    use pretty_assertions::assert_eq;

    fn single(line: &str) -> Statement {
        let mut statements = parse_line(line).unwrap();
        assert_eq!(statements.len(), 1, "{line}");
        statements.remove(0)
    }

    fn operand(line: &str) -> Operand {
        match single(line) {
            Statement::Instruction(inst) => inst.operand,
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    fn shape(line: &str) -> Shape {
        match operand(line) {
            Operand::Address { shape, .. } => shape,
            other => panic!("expected address operand, got {other:?}"),
        }
    }

    #[test]
    fn test_label_then_instruction() {
        let statements = parse_line("main: rts").unwrap();
        assert_eq!(statements.len(), 2);
        assert!(matches!(&statements[0], Statement::Label { name, .. } if name == "main"));
        assert!(matches!(&statements[1], Statement::Instruction(i) if i.mnemonic == "rts"));
    }

    #[test]
    fn test_directives() {
        assert!(matches!(single("org $008000"), Statement::Org(_)));
        assert_eq!(single("hirom"), Statement::Mapper(Mapper::HiRom));
        assert!(matches!(single("incbin \"gfx.bin\""), Statement::Incbin { path, .. } if path == "gfx.bin"));
        assert!(matches!(single("warn \"careful\""), Statement::Warn { message, .. } if message == "careful"));
        assert!(matches!(single("speed = 3"), Statement::Assign { name, .. } if name == "speed"));
    }

    #[test]
    fn test_data_items() {
        let Statement::Data { width, items } = single("dw $1234, \"AB\", label+1") else {
            panic!("expected data");
        };
        assert_eq!(width, 2);
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[1], DataItem::Text { text, .. } if text == "AB"));
    }

    #[test]
    fn test_width_hint() {
        let Statement::Instruction(inst) = single("lda.l $12") else {
            panic!("expected instruction");
        };
        assert_eq!(inst.hint, Some(3));
        assert!(parse_line("lda.q $12").is_err());
    }

    #[test]
    fn test_operand_shapes() {
        assert_eq!(operand("nop"), Operand::None);
        assert_eq!(operand("inc a"), Operand::Accumulator);
        assert!(matches!(operand("lda #$01"), Operand::Immediate(_)));
        assert_eq!(shape("lda $10"), Shape::Direct);
        assert_eq!(shape("lda $10,x"), Shape::IndexedX);
        assert_eq!(shape("ldx $10,Y"), Shape::IndexedY);
        assert_eq!(shape("lda $03,s"), Shape::Stack);
        assert_eq!(shape("lda ($10)"), Shape::Indirect);
        assert_eq!(shape("lda ($10,x)"), Shape::IndexedIndirect);
        assert_eq!(shape("lda ($10),y"), Shape::IndirectIndexed);
        assert_eq!(shape("lda ($03,s),y"), Shape::StackIndirectIndexed);
        assert_eq!(shape("lda [$10]"), Shape::IndirectLong);
        assert_eq!(shape("lda [$10],y"), Shape::IndirectLongIndexed);
        assert!(matches!(operand("mvn $7E,$7F"), Operand::BlockMove { .. }));
    }

    #[test]
    fn test_label_named_like_register_is_address() {
        assert_eq!(shape("lda abc"), Shape::Direct);
    }

    #[test]
    fn test_precedence() {
        let Operand::Immediate(expr) = operand("lda #1+2*3") else {
            panic!("expected immediate");
        };
        let ExprKind::Binary { op, rhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_parenthesized_subexpression() {
        let Operand::Address { expr, .. } = operand("lda $10+($02*2)") else {
            panic!("expected address");
        };
        assert_eq!(expr.eval(&Default::default()).unwrap(), 0x14);
    }

    #[test]
    fn test_errors() {
        let err = parse_line("bogus $10").unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::Parser);
        assert_eq!(err.span, Span::new(0, 5));

        assert!(parse_line("lda ($10").is_err());
        assert!(parse_line("lda #").is_err());
        assert!(parse_line("lda $10 $20").is_err());
    }

    #[test]
    fn test_negative_literal() {
        let Operand::Immediate(expr) = operand("lda #-1") else {
            panic!("expected immediate");
        };
        assert!(matches!(expr.kind, ExprKind::Neg(_)));
        assert!(matches!(
            operand("lda #$01"),
            Operand::Immediate(Expr { kind: ExprKind::Number(Number { value: 1, width: 1 }), .. })
        ));
    }
}
