//! Constructors for building syntax trees in code.
//!
//! Nodes built here carry [`Span::dummy`]. Hosts that parse real source text
//! produce spans themselves (usually by deserializing JSON).

use crate::span::Span;

use super::nodes::*;
use super::types::TypeName;

pub fn program(statements: Vec<Stmt>) -> Program {
    Program { statements }
}

fn expr(kind: ExprKind) -> Expr {
    Expr {
        kind,
        span: Span::dummy(),
    }
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt {
        kind,
        span: Span::dummy(),
    }
}

// ---- expressions ----

pub fn int(value: i64) -> Expr {
    expr(ExprKind::Literal(Literal::Int(value)))
}

pub fn float(value: f64) -> Expr {
    expr(ExprKind::Literal(Literal::Float(value)))
}

pub fn boolean(value: bool) -> Expr {
    expr(ExprKind::Literal(Literal::Bool(value)))
}

pub fn ch(value: char) -> Expr {
    expr(ExprKind::Literal(Literal::Char(value)))
}

/// A string literal; `raw` is the text between the quotes, escapes unprocessed.
pub fn string(raw: &str) -> Expr {
    expr(ExprKind::Literal(Literal::Str(raw.to_string())))
}

pub fn var(name: &str) -> Expr {
    expr(ExprKind::Variable(name.to_string()))
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        operand: Box::new(operand),
    })
}

pub fn group(inner: Expr) -> Expr {
    expr(ExprKind::Grouping(Box::new(inner)))
}

pub fn assign(name: &str, value: Expr) -> Expr {
    assign_op(name, AssignOp::Assign, value)
}

pub fn assign_op(name: &str, op: AssignOp, value: Expr) -> Expr {
    expr(ExprKind::Assign {
        name: name.to_string(),
        op,
        value: Box::new(value),
    })
}

pub fn inc(name: &str) -> Expr {
    expr(ExprKind::Increment {
        name: name.to_string(),
        op: IncrementOp::Inc,
    })
}

pub fn dec(name: &str) -> Expr {
    expr(ExprKind::Increment {
        name: name.to_string(),
        op: IncrementOp::Dec,
    })
}

pub fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
    expr(ExprKind::Ternary {
        cond: Box::new(cond),
        then_expr: Box::new(then_expr),
        else_expr: Box::new(else_expr),
    })
}

pub fn array_lit(items: Vec<Expr>) -> Expr {
    expr(ExprKind::ArrayLiteral(items))
}

pub fn index(array: &str, index: Expr) -> Expr {
    expr(ExprKind::Index {
        array: array.to_string(),
        index: Box::new(index),
    })
}

pub fn index_assign(array: &str, index: Expr, op: AssignOp, value: Expr) -> Expr {
    expr(ExprKind::IndexAssign {
        array: array.to_string(),
        index: Box::new(index),
        op,
        value: Box::new(value),
    })
}

pub fn index_of(array: &str, value: Expr) -> Expr {
    expr(ExprKind::IndexOf {
        array: array.to_string(),
        value: Box::new(value),
    })
}

pub fn length(array: &str) -> Expr {
    expr(ExprKind::Length {
        array: array.to_string(),
    })
}

pub fn join(array: &str) -> Expr {
    expr(ExprKind::Join {
        array: array.to_string(),
    })
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        callee: Box::new(var(name)),
        args,
    })
}

// ---- statements ----

pub fn decl(ty: TypeName, name: &str, init: Expr) -> Stmt {
    stmt(StmtKind::VarDecl(VarDecl {
        ty,
        name: name.to_string(),
        init: Some(init),
    }))
}

/// A declaration without initializer, bound to the type's zero value.
pub fn decl_default(ty: TypeName, name: &str) -> Stmt {
    stmt(StmtKind::VarDecl(VarDecl {
        ty,
        name: name.to_string(),
        init: None,
    }))
}

pub fn vector(elem_ty: TypeName, name: &str, values: Vec<Expr>) -> Stmt {
    vector_decl(elem_ty, 1, name, VectorInit::Values(values))
}

pub fn vector_sized(elem_ty: TypeName, name: &str, size: Expr) -> Stmt {
    vector_decl(elem_ty, 1, name, VectorInit::Sized(size))
}

pub fn vector_copy(elem_ty: TypeName, name: &str, source: &str) -> Stmt {
    vector_decl(elem_ty, 1, name, VectorInit::CopyOf(source.to_string()))
}

pub fn vector_decl(elem_ty: TypeName, dims: u32, name: &str, init: VectorInit) -> Stmt {
    stmt(StmtKind::VectorDecl(VectorDecl {
        elem_ty,
        dims,
        name: name.to_string(),
        init,
    }))
}

pub fn param(ty: TypeName, name: &str) -> Param {
    Param {
        ty,
        dims: 0,
        name: name.to_string(),
    }
}

pub fn array_param(ty: TypeName, name: &str) -> Param {
    Param {
        ty,
        dims: 1,
        name: name.to_string(),
    }
}

pub fn func(return_ty: TypeName, name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::FuncDecl(FuncDecl {
        return_ty,
        name: name.to_string(),
        params,
        body,
    }))
}

pub fn expr_stmt(e: Expr) -> Stmt {
    stmt(StmtKind::Expr(e))
}

pub fn print(args: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Print(args))
}

pub fn block(statements: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(statements))
}

pub fn if_(cond: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
    })
}

pub fn while_(cond: Expr, body: Stmt) -> Stmt {
    stmt(StmtKind::While {
        cond,
        body: Box::new(body),
    })
}

pub fn for_(init: Option<Stmt>, cond: Option<Expr>, update: Option<Expr>, body: Stmt) -> Stmt {
    stmt(StmtKind::For {
        init: init.map(Box::new),
        cond,
        update,
        body: Box::new(body),
    })
}

pub fn for_each(elem_ty: TypeName, name: &str, iterable: &str, body: Stmt) -> Stmt {
    stmt(StmtKind::ForEach {
        elem_ty,
        name: name.to_string(),
        iterable: iterable.to_string(),
        body: Box::new(body),
    })
}

pub fn case(value: Expr, body: Vec<Stmt>) -> SwitchCase {
    SwitchCase {
        value,
        body,
        span: Span::dummy(),
    }
}

pub fn switch(scrutinee: Expr, cases: Vec<SwitchCase>, default: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::Switch {
        scrutinee,
        cases,
        default,
    })
}

pub fn break_() -> Stmt {
    stmt(StmtKind::Break)
}

pub fn continue_() -> Stmt {
    stmt(StmtKind::Continue)
}

pub fn ret(value: Option<Expr>) -> Stmt {
    stmt(StmtKind::Return(value))
}
