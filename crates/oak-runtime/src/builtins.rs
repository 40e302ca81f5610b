use crate::error::EvalErrorKind;
use crate::function::NativeFunction;
use crate::value::{Kind, Value};

/// Embedded functions bound in the global scope of every evaluation.
pub const NATIVES: &[NativeFunction] = &[
    NativeFunction {
        name: "parseInt",
        arity: 1,
        call: parse_int,
    },
    NativeFunction {
        name: "parsefloat",
        arity: 1,
        call: parse_float,
    },
    NativeFunction {
        name: "toString",
        arity: 1,
        call: to_string,
    },
    NativeFunction {
        name: "toLowerCase",
        arity: 1,
        call: to_lower_case,
    },
    NativeFunction {
        name: "toUpperCase",
        arity: 1,
        call: to_upper_case,
    },
    NativeFunction {
        name: "typeof",
        arity: 1,
        call: type_of,
    },
];

fn string_arg(args: &[Value]) -> Result<&str, EvalErrorKind> {
    match args.first() {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(EvalErrorKind::TypeMismatch {
            expected: Kind::String.to_string(),
            found: other.kind().to_string(),
        }),
        None => Err(EvalErrorKind::TypeMismatch {
            expected: Kind::String.to_string(),
            found: "nothing".to_string(),
        }),
    }
}

/// `parseInt("42")`; a decimal string truncates toward zero.
///
/// Text outside the 32-bit int range is rejected rather than wrapped.
fn parse_int(args: &[Value]) -> Result<Value, EvalErrorKind> {
    let text = string_arg(args)?.trim();
    if let Ok(n) = text.parse::<i32>() {
        return Ok(Value::Int(n));
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => {
            let truncated = f.trunc();
            if truncated < f64::from(i32::MIN) || truncated > f64::from(i32::MAX) {
                return Err(EvalErrorKind::InvalidNumber(text.to_string()));
            }
            Ok(Value::Int(truncated as i32))
        }
        _ => Err(EvalErrorKind::InvalidNumber(text.to_string())),
    }
}

fn parse_float(args: &[Value]) -> Result<Value, EvalErrorKind> {
    let text = string_arg(args)?.trim();
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| EvalErrorKind::InvalidNumber(text.to_string()))
}

fn to_string(args: &[Value]) -> Result<Value, EvalErrorKind> {
    match args.first() {
        Some(Value::Function(f)) => Err(EvalErrorKind::NotLiteral(f.name().to_string())),
        Some(value) => Ok(Value::Str(value.to_string())),
        None => Ok(Value::Str(String::new())),
    }
}

fn to_lower_case(args: &[Value]) -> Result<Value, EvalErrorKind> {
    Ok(Value::Str(string_arg(args)?.to_ascii_lowercase()))
}

fn to_upper_case(args: &[Value]) -> Result<Value, EvalErrorKind> {
    Ok(Value::Str(string_arg(args)?.to_ascii_uppercase()))
}

fn type_of(args: &[Value]) -> Result<Value, EvalErrorKind> {
    let kind = args.first().map(Value::kind).unwrap_or(Kind::Null);
    Ok(Value::Str(kind.to_string()))
}
