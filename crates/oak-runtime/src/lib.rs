pub mod builtins;
pub mod environment;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod value;

use oak_common::ast::Program;
use oak_common::manifest::EvaluatorConfig;
use oak_common::Diagnostic;

pub use environment::Environment;
pub use error::{EvalError, EvalErrorKind};
pub use interpreter::{Flow, Interpreter};
pub use value::{Kind, Value};

/// Result of evaluating a program: everything it printed plus the
/// diagnostics of the statements that failed.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Printed lines joined by `\n`.
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Evaluation {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Evaluate a program with the default configuration.
pub fn evaluate(program: &Program) -> Evaluation {
    Interpreter::new().run(program)
}

pub fn evaluate_with_config(program: &Program, config: EvaluatorConfig) -> Evaluation {
    Interpreter::with_config(config).run(program)
}
