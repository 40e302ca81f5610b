use oak_common::ast::FuncDecl;

use crate::environment::ScopeId;
use crate::error::EvalErrorKind;
use crate::value::Value;

/// Signature of an embedded function implemented in Rust.
pub type NativeFn = fn(&[Value]) -> Result<Value, EvalErrorKind>;

/// Something a call expression can invoke.
#[derive(Debug)]
pub enum Callable {
    User(UserFunction),
    Native(NativeFunction),
}

/// A function declared in the program, closed over its declaring scope.
#[derive(Debug)]
pub struct UserFunction {
    pub decl: FuncDecl,
    pub closure: ScopeId,
}

/// An embedded function installed in the global scope.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub call: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::User(f) => &f.decl.name,
            Callable::Native(f) => f.name,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Callable::User(f) => f.decl.params.len(),
            Callable::Native(f) => f.arity,
        }
    }
}
