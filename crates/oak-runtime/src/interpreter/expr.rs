use oak_common::ast::{unescape, AssignOp, BinaryOp, Expr, ExprKind, IncrementOp, Literal, UnaryOp};
use oak_common::Span;
use tracing::trace;

use super::Interpreter;
use crate::error::{EvalErrorKind, Result};
use crate::value::{Kind, Value};

impl Interpreter {
    pub(crate) fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        trace!(at = %expr.span, "evaluate");
        let span = &expr.span;
        match &expr.kind {
            ExprKind::Literal(lit) => literal_value(lit).map_err(|e| e.at(span)),
            ExprKind::Binary { op, left, right } => self.evaluate_binary(*op, left, right, span),
            ExprKind::Unary { op, operand } => {
                let value = self.evaluate_literal(operand)?;
                apply_unary(*op, value).map_err(|e| e.at(span))
            }
            ExprKind::Grouping(inner) => self.evaluate(inner),
            ExprKind::Variable(name) => self
                .env
                .get(name)
                .map(|binding| binding.value.clone())
                .map_err(|e| e.at(span)),
            ExprKind::Assign { name, op, value } => self.assign(name, *op, value, span),
            ExprKind::Increment { name, op } => self.increment(name, *op, span),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.evaluate_condition(cond)? {
                    self.evaluate(then_expr)
                } else {
                    self.evaluate(else_expr)
                }
            }
            ExprKind::ArrayLiteral(items) => self.array_literal(items, span),
            ExprKind::Index { array, index } => self.index(array, index, span),
            ExprKind::IndexAssign {
                array,
                index,
                op,
                value,
            } => self.index_assign(array, index, *op, value, span),
            ExprKind::IndexOf { array, value } => self.index_of(array, value, span),
            ExprKind::Length { array } => {
                let (_, items) = self.array_items(array, span)?;
                Ok(Value::Int(i32::try_from(items.len()).unwrap_or(i32::MAX)))
            }
            ExprKind::Join { array } => {
                let (_, items) = self.array_items(array, span)?;
                let text: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                Ok(Value::Str(text.join(",")))
            }
            ExprKind::Call { callee, args } => self.call(callee, args, span),
        }
    }

    /// Evaluate an expression whose result must be a literal (not a function).
    pub(crate) fn evaluate_literal(&mut self, expr: &Expr) -> Result<Value> {
        let value = self.evaluate(expr)?;
        match value {
            Value::Function(f) => Err(EvalErrorKind::NotLiteral(format!("function '{}'", f.name()))
                .at(&expr.span)),
            value => Ok(value),
        }
    }

    /// Evaluate a condition; anything but a bool is a type mismatch.
    pub(crate) fn evaluate_condition(&mut self, expr: &Expr) -> Result<bool> {
        match self.evaluate_literal(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalErrorKind::TypeMismatch {
                expected: Kind::Bool.to_string(),
                found: other.kind().to_string(),
            }
            .at(&expr.span)),
        }
    }

    fn evaluate_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: &Span) -> Result<Value> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs = self.evaluate_condition(left)?;
            // short-circuit
            if (op == BinaryOp::And && !lhs) || (op == BinaryOp::Or && lhs) {
                return Ok(Value::Bool(lhs));
            }
            return Ok(Value::Bool(self.evaluate_condition(right)?));
        }

        let lhs = self.evaluate_literal(left)?;
        let rhs = self.evaluate_literal(right)?;
        lhs.binary(op, &rhs).map_err(|e| e.at(span))
    }

    fn assign(&mut self, name: &str, op: AssignOp, value: &Expr, span: &Span) -> Result<Value> {
        let rhs = self.evaluate_literal(value)?;
        let binding = self.env.get_mut(name).map_err(|e| e.at(span))?;

        let combined = match op.binary_op() {
            Some(bin) => binding.value.binary(bin, &rhs).map_err(|e| e.at(span))?,
            None => rhs,
        };

        match combined.coerce_to(&binding.kind) {
            Ok(v) => {
                binding.value = v.clone();
                Ok(v)
            }
            Err(err) => {
                binding.value = Value::Null;
                Err(err.at(span))
            }
        }
    }

    fn increment(&mut self, name: &str, op: IncrementOp, span: &Span) -> Result<Value> {
        let binding = self.env.get_mut(name).map_err(|e| e.at(span))?;
        let updated = match binding.value {
            Value::Int(n) => Value::Int(n.wrapping_add(op.delta())),
            Value::Float(n) => Value::Float(n + f64::from(op.delta())),
            ref other => {
                return Err(EvalErrorKind::InvalidOperand {
                    op: op.symbol().to_string(),
                    operand: other.kind().to_string(),
                }
                .at(span))
            }
        };
        binding.value = updated.clone();
        Ok(updated)
    }
}

/// Int literals must fit the 32-bit word both back ends compute with.
pub(crate) fn literal_value(lit: &Literal) -> std::result::Result<Value, EvalErrorKind> {
    Ok(match lit {
        Literal::Int(n) => {
            Value::Int(i32::try_from(*n).map_err(|_| EvalErrorKind::IntegerOutOfRange(*n))?)
        }
        Literal::Float(n) => Value::Float(*n),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Char(c) => Value::Char(*c),
        Literal::Str(raw) => Value::Str(unescape(raw)),
    })
}

fn apply_unary(op: UnaryOp, value: Value) -> std::result::Result<Value, EvalErrorKind> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, other) => Err(EvalErrorKind::InvalidOperand {
            op: op.to_string(),
            operand: other.kind().to_string(),
        }),
    }
}
