use oak_common::{Diagnostic, Span};
use thiserror::Error;

/// Why generation stopped. Every variant is fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenErrorKind {
    #[error("unresolved variable '{0}'")]
    UnresolvedVariable(String),

    #[error("unknown builtin '{0}'")]
    UnknownBuiltin(String),

    #[error("unsupported operator '{op}' for {operand}")]
    UnsupportedOperator { op: String, operand: String },

    #[error("not supported by the code generator: {0}")]
    Unsupported(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("'{0}' is already declared in this scope")]
    Redeclared(String),

    #[error("break outside of a loop or switch")]
    BreakOutsideLoop,

    #[error("continue outside of a loop")]
    ContinueOutsideLoop,

    #[error("'{0}' is not an array")]
    NotAnArray(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("shadow stack underflow")]
    StackUnderflow,

    #[error("integer literal {0} does not fit in 32 bits")]
    IntegerOutOfRange(i64),
}

impl CodegenErrorKind {
    pub fn at(self, span: &Span) -> CodegenError {
        CodegenError {
            kind: self,
            span: span.clone(),
        }
    }

    pub(crate) fn mismatch(expected: impl ToString, found: impl ToString) -> Self {
        CodegenErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// A generation failure anchored at the node being lowered.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}")]
pub struct CodegenError {
    pub kind: CodegenErrorKind,
    pub span: Span,
}

impl CodegenError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::generation(self.kind.to_string(), self.span.clone());
        match &self.kind {
            CodegenErrorKind::Unsupported(_) => {
                diag.with_suggestion("run the program with the evaluator instead")
            }
            CodegenErrorKind::UnresolvedVariable(name) => {
                diag.with_suggestion(format!("declare '{}' before using it", name))
            }
            _ => diag,
        }
    }
}

impl From<CodegenError> for Diagnostic {
    fn from(err: CodegenError) -> Self {
        err.to_diagnostic()
    }
}

pub type Result<T> = std::result::Result<T, CodegenError>;
