pub mod ast;
pub mod errors;
pub mod logging;
pub mod manifest;
pub mod report;
pub mod span;

pub use ast::{Expr, ExprKind, Program, Stmt, StmtKind, TypeName};
pub use errors::{Diagnostic, DiagnosticBag, Stage};
pub use span::{Position, Span};
