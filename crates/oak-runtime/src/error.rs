use oak_common::{Diagnostic, Span};
use thiserror::Error;

/// What went wrong while evaluating a node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("variable '{0}' is not declared")]
    Undeclared(String),

    #[error("'{0}' is already declared in this scope")]
    AlreadyDeclared(String),

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("array type mismatch: expected {expected} elements, found {found}")]
    ArrayTypeMismatch { expected: String, found: String },

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("expected literal, found {0}")]
    NotLiteral(String),

    #[error("'{0}' is not an array")]
    NotAnArray(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid operands for '{op}': {left} and {right}")]
    InvalidOperands {
        op: String,
        left: String,
        right: String,
    },

    #[error("invalid operand for '{op}': {operand}")]
    InvalidOperand { op: String, operand: String },

    #[error("break outside of a loop or switch")]
    BreakOutsideLoop,

    #[error("continue outside of a loop")]
    ContinueOutsideLoop,

    #[error("return outside of a function")]
    ReturnOutsideFunction,

    #[error("function '{0}' finished without returning a value")]
    MissingReturn(String),

    #[error("max call depth exceeded ({0})")]
    StackOverflow(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("integer literal {0} does not fit in 32 bits")]
    IntegerOutOfRange(i64),

    #[error("array of {len} elements exceeds the limit of {max}")]
    ArrayTooLarge { len: i64, max: usize },
}

impl EvalErrorKind {
    pub fn at(self, span: &Span) -> EvalError {
        EvalError {
            kind: self,
            span: span.clone(),
        }
    }
}

/// An evaluation failure anchored at the node that raised it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Span,
}

impl EvalError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::evaluation(self.kind.to_string(), self.span.clone());
        match &self.kind {
            EvalErrorKind::Undeclared(name) => {
                diag.with_suggestion(format!("declare '{}' before using it", name))
            }
            EvalErrorKind::DivisionByZero => {
                diag.with_suggestion("check the divisor before dividing")
            }
            EvalErrorKind::ArrayTooLarge { .. } => {
                diag.with_suggestion("raise [evaluator] max_array_length in Oak.toml")
            }
            _ => diag,
        }
    }
}

impl From<EvalError> for Diagnostic {
    fn from(err: EvalError) -> Self {
        err.to_diagnostic()
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
