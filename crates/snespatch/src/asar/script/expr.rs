//! Operand expressions

use std::collections::HashMap;

use super::error::{ScriptError, ScriptResult};
use super::token::Number;
use crate::common::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Shl,
    Shr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(Number),
    Symbol(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Operand width implied by the spelling of the expression
    ///
    /// Literals use their digit count; symbols count as two bytes.
    pub fn natural_width(&self) -> u8 {
        match &self.kind {
            ExprKind::Number(n) => n.width,
            ExprKind::Symbol(_) => 2,
            ExprKind::Neg(inner) => inner.natural_width(),
            ExprKind::Binary { lhs, rhs, .. } => lhs.natural_width().max(rhs.natural_width()),
        }
    }

    pub fn eval(&self, symbols: &HashMap<String, u32>) -> ScriptResult<i64> {
        match &self.kind {
            ExprKind::Number(n) => Ok(i64::from(n.value)),
            ExprKind::Symbol(name) => symbols
                .get(name)
                .map(|&value| i64::from(value))
                .ok_or_else(|| ScriptError::symbol(format!("label '{name}' not found"), self.span)),
            ExprKind::Neg(inner) => Ok(inner.eval(symbols)?.wrapping_neg()),
            ExprKind::Binary { op, lhs, rhs } => {
                let a = lhs.eval(symbols)?;
                let b = rhs.eval(symbols)?;
                match op {
                    BinaryOp::Add => Ok(a.wrapping_add(b)),
                    BinaryOp::Sub => Ok(a.wrapping_sub(b)),
                    BinaryOp::Mul => Ok(a.wrapping_mul(b)),
                    BinaryOp::Div => {
                        if b == 0 {
                            Err(ScriptError::range("division by zero", rhs.span))
                        } else {
                            Ok(a.wrapping_div(b))
                        }
                    }
                    BinaryOp::And => Ok(a & b),
                    BinaryOp::Or => Ok(a | b),
                    BinaryOp::Shl => Ok(a.wrapping_shl(shift_amount(b, rhs.span)?)),
                    BinaryOp::Shr => Ok(a.wrapping_shr(shift_amount(b, rhs.span)?)),
                }
            }
        }
    }
}

fn shift_amount(value: i64, span: Span) -> ScriptResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|&n| n < 64)
        .ok_or_else(|| ScriptError::range(format!("invalid shift amount {value}"), span))
}
