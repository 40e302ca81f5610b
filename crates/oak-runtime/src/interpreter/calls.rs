use std::rc::Rc;

use oak_common::ast::{Expr, ExprKind, FuncDecl, Param, TypeName};
use oak_common::Span;
use tracing::{debug, trace};

use super::{Flow, Interpreter};
use crate::builtins::NATIVES;
use crate::error::{EvalErrorKind, Result};
use crate::function::{Callable, UserFunction};
use crate::value::{Kind, Value};

impl Interpreter {
    /// Bind every embedded function in the global scope.
    pub(crate) fn install_natives(&mut self) {
        for native in NATIVES {
            let value = Value::Function(Rc::new(Callable::Native(*native)));
            // The global scope is empty at this point.
            let _ = self.env.declare(native.name, Kind::Function, value);
        }
    }

    pub(crate) fn declare_function(&mut self, decl: &FuncDecl, span: &Span) -> Result<()> {
        debug!(name = %decl.name, params = decl.params.len(), "declare function");
        let closure = self.env.capture();
        let function = Callable::User(UserFunction {
            decl: decl.clone(),
            closure,
        });
        self.env
            .declare(&decl.name, Kind::Function, Value::Function(Rc::new(function)))
            .map_err(|e| e.at(span))
    }

    pub(crate) fn call(&mut self, callee: &Expr, args: &[Expr], span: &Span) -> Result<Value> {
        let target = self.evaluate(callee)?;
        let callable = match target {
            Value::Function(callable) => callable,
            other => {
                let name = match &callee.kind {
                    ExprKind::Variable(name) => name.clone(),
                    _ => other.kind().to_string(),
                };
                return Err(EvalErrorKind::NotCallable(name).at(span));
            }
        };

        if callable.arity() != args.len() {
            return Err(EvalErrorKind::ArityMismatch {
                name: callable.name().to_string(),
                expected: callable.arity(),
                found: args.len(),
            }
            .at(span));
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate_literal(arg)?);
        }

        trace!(name = callable.name(), "call");
        match &*callable {
            Callable::Native(native) => (native.call)(&values).map_err(|e| e.at(span)),
            Callable::User(function) => self.call_user(function, values, span),
        }
    }

    fn call_user(&mut self, function: &UserFunction, args: Vec<Value>, span: &Span) -> Result<Value> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(EvalErrorKind::StackOverflow(self.config.max_call_depth).at(span));
        }

        let mut bound = Vec::with_capacity(args.len());
        for (param, arg) in function.decl.params.iter().zip(args) {
            let kind = param_kind(param, &arg);
            let value = arg.coerce_to(&kind).map_err(|e| e.at(span))?;
            bound.push((param.name.as_str(), kind, value));
        }

        let caller = self.env.enter_call(function.closure);
        self.call_depth += 1;
        let result = self.run_body(function, bound, span);
        self.call_depth -= 1;
        self.env.leave_call(caller);
        result
    }

    fn run_body(
        &mut self,
        function: &UserFunction,
        bound: Vec<(&str, Kind, Value)>,
        span: &Span,
    ) -> Result<Value> {
        for (name, kind, value) in bound {
            self.env.declare(name, kind, value).map_err(|e| e.at(span))?;
        }

        let decl = &function.decl;
        let returned = match self.execute_sequence(&decl.body)? {
            Flow::Normal => None,
            Flow::Return(value, ret_span) => Some((value, ret_span)),
            Flow::Break(at) => return Err(EvalErrorKind::BreakOutsideLoop.at(&at)),
            Flow::Continue(at) => return Err(EvalErrorKind::ContinueOutsideLoop.at(&at)),
        };

        match (decl.return_ty, returned) {
            (TypeName::Void, None) | (TypeName::Void, Some((None, _))) => Ok(Value::Null),
            (TypeName::Void, Some((Some(value), at))) => Err(EvalErrorKind::TypeMismatch {
                expected: TypeName::Void.to_string(),
                found: value.kind().to_string(),
            }
            .at(&at)),
            (_, None) => Err(EvalErrorKind::MissingReturn(decl.name.clone()).at(span)),
            (_, Some((None, at))) => Err(EvalErrorKind::MissingReturn(decl.name.clone()).at(&at)),
            (TypeName::Var, Some((Some(value), _))) => Ok(value),
            (ty, Some((Some(value), at))) => {
                let kind = Kind::from_type_name(ty).unwrap_or(Kind::Null);
                value.coerce_to(&kind).map_err(|e| e.at(&at))
            }
        }
    }
}

/// The kind a parameter accepts; `var` parameters take the argument's kind.
fn param_kind(param: &Param, arg: &Value) -> Kind {
    match Kind::from_type_name(param.ty) {
        Some(scalar) => Kind::array_of(scalar, param.dims),
        None => arg.kind(),
    }
}
