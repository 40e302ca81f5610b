use std::fmt;
use std::rc::Rc;

use oak_common::ast::{BinaryOp, TypeName};

use crate::error::EvalErrorKind;
use crate::function::Callable;

/// The static kind of a value, as recorded on a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Int,
    Float,
    Bool,
    Char,
    String,
    Array(Box<Kind>),
    /// The poisoned value left behind by a failed declaration or assignment.
    Null,
    Function,
}

impl Kind {
    /// The kind a scalar type annotation declares. `var` and `void` have none.
    pub fn from_type_name(ty: TypeName) -> Option<Kind> {
        match ty {
            TypeName::Int => Some(Kind::Int),
            TypeName::Float => Some(Kind::Float),
            TypeName::Bool => Some(Kind::Bool),
            TypeName::Char => Some(Kind::Char),
            TypeName::String => Some(Kind::String),
            TypeName::Var | TypeName::Void => None,
        }
    }

    /// The kind of an array annotation with `dims` pairs of brackets.
    pub fn array_of(elem: Kind, dims: u32) -> Kind {
        (0..dims).fold(elem, |inner, _| Kind::Array(Box::new(inner)))
    }

    /// The zero value a declaration without initializer receives.
    pub fn zero_value(&self) -> Value {
        match self {
            Kind::Int => Value::Int(0),
            Kind::Float => Value::Float(0.0),
            Kind::Bool => Value::Bool(false),
            Kind::Char => Value::Char('\0'),
            Kind::String => Value::Str(String::new()),
            Kind::Array(elem) => Value::Array {
                elem: (**elem).clone(),
                items: Vec::new(),
            },
            Kind::Null | Kind::Function => Value::Null,
        }
    }

    /// Innermost element kind of a (possibly nested) array kind.
    pub fn scalar(&self) -> &Kind {
        match self {
            Kind::Array(inner) => inner.scalar(),
            other => other,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Int => write!(f, "int"),
            Kind::Float => write!(f, "float"),
            Kind::Bool => write!(f, "bool"),
            Kind::Char => write!(f, "char"),
            Kind::String => write!(f, "string"),
            Kind::Array(elem) => write!(f, "{}[]", elem),
            Kind::Null => write!(f, "null"),
            Kind::Function => write!(f, "function"),
        }
    }
}

/// A runtime value produced by evaluating an expression.
#[derive(Debug, Clone)]
pub enum Value {
    /// 32-bit two's complement, wrapping on overflow like the generated code.
    Int(i32),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
    /// Arrays own their elements; copying an array copies every element.
    Array { elem: Kind, items: Vec<Value> },
    Null,
    Function(Rc<Callable>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Bool(_) => Kind::Bool,
            Value::Char(_) => Kind::Char,
            Value::Str(_) => Kind::String,
            Value::Array { elem, .. } => Kind::Array(Box::new(elem.clone())),
            Value::Null => Kind::Null,
            Value::Function(_) => Kind::Function,
        }
    }

    pub fn is_literal(&self) -> bool {
        !matches!(self, Value::Function(_))
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(n) => Some(Number::Float(*n)),
            _ => None,
        }
    }

    /// Text operand for `+` concatenation: strings and single characters.
    fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Char(c) => Some(c.to_string()),
            _ => None,
        }
    }

    /// Coerce a value to the declared `kind`, or report what was found.
    ///
    /// Ints widen to float and a one-character string narrows to char; every
    /// other pairing must match exactly.
    pub fn coerce_to(self, kind: &Kind) -> Result<Value, EvalErrorKind> {
        match (kind, self) {
            (Kind::Int, v @ Value::Int(_)) => Ok(v),
            (Kind::Float, Value::Int(n)) => Ok(Value::Float(f64::from(n))),
            (Kind::Float, v @ Value::Float(_)) => Ok(v),
            (Kind::Bool, v @ Value::Bool(_)) => Ok(v),
            (Kind::String, v @ Value::Str(_)) => Ok(v),
            (Kind::Char, v @ Value::Char(_)) => Ok(v),
            (Kind::Char, Value::Str(s)) if s.chars().count() == 1 => match s.chars().next() {
                Some(c) => Ok(Value::Char(c)),
                None => Err(EvalErrorKind::TypeMismatch {
                    expected: kind.to_string(),
                    found: Kind::String.to_string(),
                }),
            },
            (Kind::Array(expected), Value::Array { elem, items }) if elem == **expected => {
                Ok(Value::Array { elem, items })
            }
            (_, other) => Err(EvalErrorKind::TypeMismatch {
                expected: kind.to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    /// The loose equality used by `==`, `switch` and `indexOf`.
    pub fn loose_eq(&self, other: &Value) -> Option<bool> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Some(a.to_f64() == b.to_f64() && a.same_int(&b));
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a == b),
            (Value::Char(a), Value::Char(b)) => Some(a == b),
            _ => match (self.as_text(), other.as_text()) {
                (Some(a), Some(b)) => Some(a == b),
                _ => None,
            },
        }
    }

    /// Apply a non-logical binary operator to two evaluated operands.
    pub fn binary(&self, op: BinaryOp, other: &Value) -> Result<Value, EvalErrorKind> {
        let invalid = || EvalErrorKind::InvalidOperands {
            op: op.symbol().to_string(),
            left: self.kind().to_string(),
            right: other.kind().to_string(),
        };

        match op {
            BinaryOp::Add => {
                if let (Some(a), Some(b)) = (self.as_text(), other.as_text()) {
                    return Ok(Value::Str(a + &b));
                }
                let (a, b) = self.numbers(other).ok_or_else(invalid)?;
                Ok(Number::arith(op, a, b)?.into())
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let (a, b) = self.numbers(other).ok_or_else(invalid)?;
                Ok(Number::arith(op, a, b)?.into())
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => {
                let ordering = match (self, other) {
                    (Value::Char(a), Value::Char(b)) => a.partial_cmp(b),
                    _ => {
                        let (a, b) = self.numbers(other).ok_or_else(invalid)?;
                        a.to_f64().partial_cmp(&b.to_f64())
                    }
                };
                let result = match ordering {
                    Some(ord) => match op {
                        BinaryOp::Lt => ord.is_lt(),
                        BinaryOp::Gt => ord.is_gt(),
                        BinaryOp::Lte => ord.is_le(),
                        _ => ord.is_ge(),
                    },
                    // NaN compares false
                    None => false,
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::Eq => self.loose_eq(other).map(Value::Bool).ok_or_else(invalid),
            BinaryOp::Neq => self
                .loose_eq(other)
                .map(|eq| Value::Bool(!eq))
                .ok_or_else(invalid),
            BinaryOp::And | BinaryOp::Or => match (self, other) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinaryOp::And {
                    *a && *b
                } else {
                    *a || *b
                })),
                _ => Err(invalid()),
            },
        }
    }

    fn numbers(&self, other: &Value) -> Option<(Number, Number)> {
        Some((self.as_number()?, other.as_number()?))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Array { elem: ea, items: a },
                Value::Array { elem: eb, items: b },
            ) => ea == eb && a == b,
            (Value::Null, Value::Null) => true,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array { items, .. } => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Null => write!(f, "null"),
            Value::Function(callable) => write!(f, "<fn {}>", callable.name()),
        }
    }
}

/// Numeric operand after int/float classification.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i32),
    Float(f64),
}

impl Number {
    fn to_f64(self) -> f64 {
        match self {
            Number::Int(n) => f64::from(n),
            Number::Float(n) => n,
        }
    }

    /// Guards int/int equality against precision loss in the f64 comparison.
    fn same_int(&self, other: &Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => true,
        }
    }

    fn arith(op: BinaryOp, a: Number, b: Number) -> Result<Number, EvalErrorKind> {
        match (a, b) {
            (Number::Int(a), Number::Int(b)) => {
                let result = match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div | BinaryOp::Mod if b == 0 => {
                        return Err(EvalErrorKind::DivisionByZero)
                    }
                    BinaryOp::Div => a.wrapping_div(b),
                    _ => a.wrapping_rem(b),
                };
                Ok(Number::Int(result))
            }
            (a, b) => {
                let (a, b) = (a.to_f64(), b.to_f64());
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                };
                Ok(Number::Float(result))
            }
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(n) => Value::Int(n),
            Number::Float(n) => Value::Float(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_promote() {
        let sum = Value::Int(3).binary(BinaryOp::Add, &Value::Float(2.5)).unwrap();
        assert_eq!(sum, Value::Float(5.5));
        let eq = sum.binary(BinaryOp::Eq, &Value::Float(5.5)).unwrap();
        assert_eq!(eq, Value::Bool(true));
    }

    #[test]
    fn integer_division_truncates() {
        assert_eq!(
            Value::Int(7).binary(BinaryOp::Div, &Value::Int(2)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            Value::Int(-7).binary(BinaryOp::Mod, &Value::Int(2)).unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn integer_division_by_zero() {
        let err = Value::Int(1).binary(BinaryOp::Div, &Value::Int(0)).unwrap_err();
        assert_eq!(err, EvalErrorKind::DivisionByZero);
        let err = Value::Int(1).binary(BinaryOp::Mod, &Value::Int(0)).unwrap_err();
        assert_eq!(err, EvalErrorKind::DivisionByZero);
    }

    #[test]
    fn float_remainder_truncates() {
        assert_eq!(
            Value::Float(7.5).binary(BinaryOp::Mod, &Value::Int(2)).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn string_and_char_concatenate() {
        let s = Value::Str("ab".into())
            .binary(BinaryOp::Add, &Value::Char('c'))
            .unwrap();
        assert_eq!(s, Value::Str("abc".into()));
    }

    #[test]
    fn strings_only_support_equality() {
        let a = Value::Str("x".into());
        let b = Value::Str("x".into());
        assert_eq!(a.binary(BinaryOp::Eq, &b).unwrap(), Value::Bool(true));
        assert!(matches!(
            a.binary(BinaryOp::Lt, &b),
            Err(EvalErrorKind::InvalidOperands { .. })
        ));
    }

    #[test]
    fn chars_compare_by_code_point() {
        let r = Value::Char('a').binary(BinaryOp::Lt, &Value::Char('b')).unwrap();
        assert_eq!(r, Value::Bool(true));
    }

    #[test]
    fn bools_reject_arithmetic_and_ordering() {
        let t = Value::Bool(true);
        assert!(t.binary(BinaryOp::Add, &t).is_err());
        assert!(t.binary(BinaryOp::Gt, &t).is_err());
        assert_eq!(t.binary(BinaryOp::Neq, &t).unwrap(), Value::Bool(false));
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(Value::Int(2).coerce_to(&Kind::Float).unwrap(), Value::Float(2.0));
        assert_eq!(
            Value::Str("z".into()).coerce_to(&Kind::Char).unwrap(),
            Value::Char('z')
        );
        assert!(Value::Str("zz".into()).coerce_to(&Kind::Char).is_err());
        assert!(Value::Float(1.0).coerce_to(&Kind::Int).is_err());
        assert_eq!(
            Value::Bool(true).coerce_to(&Kind::String).unwrap_err(),
            EvalErrorKind::TypeMismatch {
                expected: "string".into(),
                found: "bool".into()
            }
        );
    }

    #[test]
    fn display_formats() {
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        let nested = Value::Array {
            elem: Kind::Array(Box::new(Kind::Int)),
            items: vec![
                Value::Array {
                    elem: Kind::Int,
                    items: vec![Value::Int(1), Value::Int(2)],
                },
                Value::Array {
                    elem: Kind::Int,
                    items: vec![Value::Int(3)],
                },
            ],
        };
        assert_eq!(nested.to_string(), "[[1, 2], [3]]");
        assert_eq!(nested.kind().to_string(), "int[][]");
    }

    #[test]
    fn array_kind_from_dims() {
        assert_eq!(
            Kind::array_of(Kind::Char, 2),
            Kind::Array(Box::new(Kind::Array(Box::new(Kind::Char))))
        );
        assert_eq!(Kind::array_of(Kind::Char, 2).scalar(), &Kind::Char);
    }
}
