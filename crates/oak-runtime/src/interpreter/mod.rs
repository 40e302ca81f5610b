//! Tree-walking evaluator.
//!
//! Statements return a [`Flow`] signal instead of unwinding: `break`,
//! `continue` and `return` travel up the call chain as values until the
//! construct that owns them consumes the signal.

mod arrays;
mod calls;
mod control;
mod expr;

use oak_common::ast::{Program, Stmt, StmtKind, TypeName, VarDecl};
use oak_common::manifest::EvaluatorConfig;
use oak_common::{DiagnosticBag, Span};
use tracing::{debug, trace, warn};

use crate::environment::Environment;
use crate::error::{EvalErrorKind, Result};
use crate::value::{Kind, Value};
use crate::Evaluation;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break(Span),
    Continue(Span),
    /// `return` with its value; `None` for a bare `return;`.
    Return(Option<Value>, Span),
}

/// Evaluation context. All mutable state of one run lives here.
pub struct Interpreter {
    env: Environment,
    lines: Vec<String>,
    print_handler: Option<Box<dyn FnMut(&str)>>,
    config: EvaluatorConfig,
    call_depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(EvaluatorConfig::default())
    }

    pub fn with_config(config: EvaluatorConfig) -> Self {
        let mut interpreter = Self {
            env: Environment::new(),
            lines: Vec::new(),
            print_handler: None,
            config,
            call_depth: 0,
        };
        interpreter.install_natives();
        interpreter
    }

    /// Receive each printed line as soon as it is produced.
    pub fn set_print_handler(&mut self, handler: impl FnMut(&str) + 'static) {
        self.print_handler = Some(Box::new(handler));
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Everything printed so far, lines joined by `\n`.
    pub fn output(&self) -> String {
        self.lines.join("\n")
    }

    /// Evaluate every top-level statement of `program`.
    ///
    /// A failing statement is recorded as a diagnostic and evaluation moves
    /// on to the next one, unless `abort_on_error` is configured.
    #[tracing::instrument(skip_all, fields(statements = program.statements.len()))]
    pub fn run(&mut self, program: &Program) -> Evaluation {
        let mut diagnostics = DiagnosticBag::new();

        for stmt in &program.statements {
            let error = match self.execute(stmt) {
                Ok(Flow::Normal) => None,
                Ok(Flow::Break(span)) => Some(EvalErrorKind::BreakOutsideLoop.at(&span)),
                Ok(Flow::Continue(span)) => Some(EvalErrorKind::ContinueOutsideLoop.at(&span)),
                Ok(Flow::Return(_, span)) => Some(EvalErrorKind::ReturnOutsideFunction.at(&span)),
                Err(err) => Some(err),
            };

            if let Some(err) = error {
                warn!(error = %err.kind, at = %err.span, "statement failed");
                diagnostics.report(err.to_diagnostic());
                if self.config.abort_on_error {
                    debug!("aborting after first error");
                    break;
                }
            }
        }

        Evaluation {
            output: self.output(),
            diagnostics: diagnostics.into_diagnostics(),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    pub(crate) fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        trace!(at = %stmt.span, "execute");
        match &stmt.kind {
            StmtKind::VarDecl(decl) => {
                self.declare_variable(decl, &stmt.span)?;
                Ok(Flow::Normal)
            }
            StmtKind::VectorDecl(decl) => {
                self.declare_vector(decl, &stmt.span)?;
                Ok(Flow::Normal)
            }
            StmtKind::FuncDecl(decl) => {
                self.declare_function(decl, &stmt.span)?;
                Ok(Flow::Normal)
            }
            StmtKind::Expr(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::Print(args) => {
                self.print(args)?;
                Ok(Flow::Normal)
            }
            StmtKind::Block(stmts) => self.execute_block(stmts),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.execute_if(cond, then_branch, else_branch.as_deref()),
            StmtKind::While { cond, body } => self.execute_while(cond, body),
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => self.execute_for(init.as_deref(), cond.as_ref(), update.as_ref(), body),
            StmtKind::ForEach {
                elem_ty,
                name,
                iterable,
                body,
            } => self.execute_for_each(*elem_ty, name, iterable, body, &stmt.span),
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => self.execute_switch(scrutinee, cases, default.as_deref()),
            StmtKind::Break => Ok(Flow::Break(stmt.span.clone())),
            StmtKind::Continue => Ok(Flow::Continue(stmt.span.clone())),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.evaluate_literal(expr)?),
                    None => None,
                };
                Ok(Flow::Return(value, stmt.span.clone()))
            }
        }
    }

    /// Run `f` inside a fresh scope, popping it on every exit path.
    pub(crate) fn in_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.env.push_scope();
        let result = f(self);
        self.env.pop_scope();
        result
    }

    fn declare_variable(&mut self, decl: &VarDecl, span: &Span) -> Result<()> {
        let value = match &decl.init {
            Some(init) => Some(self.evaluate(init)?),
            None => None,
        };

        let (kind, checked) = match decl.ty {
            TypeName::Var => match value {
                Some(value) if value.is_literal() && value != Value::Null => {
                    (value.kind(), Ok(value))
                }
                other => {
                    let found = other
                        .map(|v| v.kind().to_string())
                        .unwrap_or_else(|| "no initializer".to_string());
                    (
                        Kind::Null,
                        Err(EvalErrorKind::TypeMismatch {
                            expected: "a literal value".to_string(),
                            found,
                        }),
                    )
                }
            },
            TypeName::Void => (
                Kind::Null,
                Err(EvalErrorKind::TypeMismatch {
                    expected: "a variable type".to_string(),
                    found: TypeName::Void.to_string(),
                }),
            ),
            ty => {
                let kind = Kind::from_type_name(ty).unwrap_or(Kind::Null);
                let checked = match value {
                    Some(value) => value.coerce_to(&kind),
                    None => Ok(kind.zero_value()),
                };
                (kind, checked)
            }
        };

        self.bind(&decl.name, kind, checked, span)
    }

    /// Bind `name` to a checked value, or poison it with `null` when the
    /// check failed and report the failure.
    pub(crate) fn bind(
        &mut self,
        name: &str,
        kind: Kind,
        checked: std::result::Result<Value, EvalErrorKind>,
        span: &Span,
    ) -> Result<()> {
        match checked {
            Ok(value) => self
                .env
                .declare(name, kind, value)
                .map_err(|e| e.at(span)),
            Err(err) => {
                debug!(name, "poisoning binding");
                self.env
                    .declare(name, kind, Value::Null)
                    .map_err(|e| e.at(span))?;
                Err(err.at(span))
            }
        }
    }

    fn print(&mut self, args: &[oak_common::Expr]) -> Result<()> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(self.evaluate(arg)?.to_string());
        }
        let line = parts.join(" ");
        if let Some(handler) = self.print_handler.as_mut() {
            handler(&line);
        }
        self.lines.push(line);
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
