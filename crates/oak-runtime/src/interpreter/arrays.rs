use oak_common::ast::{AssignOp, Expr, ExprKind, VectorDecl, VectorInit};
use oak_common::Span;
use tracing::debug;

use super::Interpreter;
use crate::error::{EvalErrorKind, Result};
use crate::value::{Kind, Value};

impl Interpreter {
    pub(crate) fn declare_vector(&mut self, decl: &VectorDecl, span: &Span) -> Result<()> {
        let Some(scalar) = Kind::from_type_name(decl.elem_ty) else {
            return Err(EvalErrorKind::TypeMismatch {
                expected: "an array element type".to_string(),
                found: decl.elem_ty.to_string(),
            }
            .at(span));
        };
        let dims = decl.dims.max(1);
        let kind = Kind::array_of(scalar.clone(), dims);
        debug!(name = %decl.name, kind = %kind, "declare array");

        let checked = match &decl.init {
            VectorInit::Values(items) => self.build_array(&scalar, dims, items),
            VectorInit::Sized(size) => self.sized_array(&scalar, dims, size),
            VectorInit::CopyOf(source) => self.copy_array(&kind, source, span),
        };

        match checked {
            Ok(value) => self.bind(&decl.name, kind, Ok(value), span),
            Err(err) if err.kind.is_array_check() => self.bind(&decl.name, kind, Err(err.kind), span),
            Err(err) => Err(err),
        }
    }

    /// Build an array of `dims` dimensions from an explicit element list.
    fn build_array(&mut self, scalar: &Kind, dims: u32, items: &[Expr]) -> Result<Value> {
        let elem = Kind::array_of(scalar.clone(), dims - 1);
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let value = match (&item.kind, dims) {
                (ExprKind::ArrayLiteral(inner), d) if d > 1 => {
                    self.build_array(scalar, d - 1, inner)?
                }
                _ => {
                    let value = self.evaluate_literal(item)?;
                    element_of(value, &elem).map_err(|e| e.at(&item.span))?
                }
            };
            values.push(value);
        }
        Ok(Value::Array { elem, items: values })
    }

    /// Zero-filled array of the evaluated size, bounded by `max_array_length`.
    fn sized_array(&mut self, scalar: &Kind, dims: u32, size: &Expr) -> Result<Value> {
        let requested = match self.evaluate_literal(size)? {
            Value::Int(n) if n >= 0 => n,
            other => {
                return Err(EvalErrorKind::TypeMismatch {
                    expected: "a non-negative int size".to_string(),
                    found: other.to_string(),
                }
                .at(&size.span))
            }
        };
        let max = self.config.max_array_length;
        let too_large = || EvalErrorKind::ArrayTooLarge {
            len: i64::from(requested),
            max,
        };
        let len = usize::try_from(requested)
            .ok()
            .filter(|&len| len <= max)
            .ok_or_else(|| too_large().at(&size.span))?;

        let elem = Kind::array_of(scalar.clone(), dims - 1);
        let mut items = Vec::new();
        items
            .try_reserve_exact(len)
            .map_err(|_| too_large().at(&size.span))?;
        items.resize(len, elem.zero_value());
        Ok(Value::Array { elem, items })
    }

    fn copy_array(&mut self, kind: &Kind, source: &str, span: &Span) -> Result<Value> {
        let binding = self.env.get(source).map_err(|e| e.at(span))?;
        match &binding.value {
            Value::Array { .. } if &binding.value.kind() == kind => Ok(binding.value.clone()),
            Value::Array { .. } => Err(EvalErrorKind::ArrayTypeMismatch {
                expected: kind.to_string(),
                found: binding.value.kind().to_string(),
            }
            .at(span)),
            _ => Err(EvalErrorKind::NotAnArray(source.to_string()).at(span)),
        }
    }

    /// A nested `{...}` used as a plain expression: its element kind is the
    /// kind of the first element, and every other element must agree.
    pub(crate) fn array_literal(&mut self, items: &[Expr], span: &Span) -> Result<Value> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(self.evaluate_literal(item)?);
        }
        let elem = match values.first() {
            Some(first) => first.kind(),
            None => {
                return Err(EvalErrorKind::ArrayTypeMismatch {
                    expected: "at least one element".to_string(),
                    found: "an empty list".to_string(),
                }
                .at(span))
            }
        };
        if let Some(odd) = values.iter().find(|v| v.kind() != elem) {
            return Err(EvalErrorKind::ArrayTypeMismatch {
                expected: elem.to_string(),
                found: odd.kind().to_string(),
            }
            .at(span));
        }
        Ok(Value::Array { elem, items: values })
    }

    /// Element kind and a snapshot of the items of the array bound to `name`.
    pub(crate) fn array_items(&self, name: &str, span: &Span) -> Result<(Kind, Vec<Value>)> {
        let binding = self.env.get(name).map_err(|e| e.at(span))?;
        match &binding.value {
            Value::Array { elem, items } => Ok((elem.clone(), items.clone())),
            _ => Err(EvalErrorKind::NotAnArray(name.to_string()).at(span)),
        }
    }

    fn evaluate_index(&mut self, index: &Expr) -> Result<i64> {
        match self.evaluate_literal(index)? {
            Value::Int(n) => Ok(i64::from(n)),
            other => Err(EvalErrorKind::TypeMismatch {
                expected: Kind::Int.to_string(),
                found: other.kind().to_string(),
            }
            .at(&index.span)),
        }
    }

    pub(crate) fn index(&mut self, array: &str, index: &Expr, span: &Span) -> Result<Value> {
        let i = self.evaluate_index(index)?;
        let binding = self.env.get(array).map_err(|e| e.at(span))?;
        let Value::Array { items, .. } = &binding.value else {
            return Err(EvalErrorKind::NotAnArray(array.to_string()).at(span));
        };
        checked_slot(i, items.len())
            .map(|slot| items[slot].clone())
            .map_err(|e| e.at(span))
    }

    pub(crate) fn index_assign(
        &mut self,
        array: &str,
        index: &Expr,
        op: AssignOp,
        value: &Expr,
        span: &Span,
    ) -> Result<Value> {
        let i = self.evaluate_index(index)?;
        let rhs = self.evaluate_literal(value)?;
        let binding = self.env.get_mut(array).map_err(|e| e.at(span))?;
        let Value::Array { elem, items } = &mut binding.value else {
            return Err(EvalErrorKind::NotAnArray(array.to_string()).at(span));
        };
        let slot = checked_slot(i, items.len()).map_err(|e| e.at(span))?;

        let combined = match op.binary_op() {
            Some(bin) => items[slot].binary(bin, &rhs).map_err(|e| e.at(span))?,
            None => rhs,
        };
        let stored = element_of(combined, elem).map_err(|e| e.at(span))?;
        items[slot] = stored.clone();
        Ok(stored)
    }

    /// Position of the first element loosely equal to `value`, or -1.
    pub(crate) fn index_of(&mut self, array: &str, value: &Expr, span: &Span) -> Result<Value> {
        let needle = self.evaluate_literal(value)?;
        let (_, items) = self.array_items(array, span)?;
        let position = items
            .iter()
            .position(|item| item.loose_eq(&needle) == Some(true))
            .and_then(|p| i32::try_from(p).ok())
            .unwrap_or(-1);
        Ok(Value::Int(position))
    }
}

/// Coerce a value into an array slot of kind `elem`.
fn element_of(value: Value, elem: &Kind) -> std::result::Result<Value, EvalErrorKind> {
    let found = value.kind();
    value
        .coerce_to(elem)
        .map_err(|_| EvalErrorKind::ArrayTypeMismatch {
            expected: elem.to_string(),
            found: found.to_string(),
        })
}

fn checked_slot(index: i64, len: usize) -> std::result::Result<usize, EvalErrorKind> {
    if index < 0 || index as usize >= len {
        return Err(EvalErrorKind::IndexOutOfBounds { index, len });
    }
    Ok(index as usize)
}

impl EvalErrorKind {
    /// Failures that leave the declared array binding poisoned.
    fn is_array_check(&self) -> bool {
        matches!(
            self,
            EvalErrorKind::ArrayTypeMismatch { .. }
                | EvalErrorKind::TypeMismatch { .. }
                | EvalErrorKind::ArrayTooLarge { .. }
        )
    }
}
