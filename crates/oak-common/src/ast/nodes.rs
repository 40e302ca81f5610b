use serde::{Deserialize, Serialize};

use crate::span::Span;

use super::types::TypeName;

// ============================================================================
// Program (top-level)
// ============================================================================

/// A parsed Oak program: the top-level statements in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    /// `int x = 5;` / `var y = "s";` / `float z;`
    VarDecl(VarDecl),
    /// `int[] v = {1, 2};` / `new int[5]` / `int[] w = v;`
    VectorDecl(VectorDecl),
    /// `int add(int a, int b) { ... }`
    FuncDecl(FuncDecl),
    /// An expression evaluated for its side effects.
    Expr(Expr),
    /// `System.out.println(a, b, ...)`
    Print(Vec<Expr>),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        #[serde(default)]
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    /// `for (init; cond; update) body`; every header part may be absent.
    For {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (int x : values) body`
    ForEach {
        elem_ty: TypeName,
        name: String,
        iterable: String,
        body: Box<Stmt>,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        default: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub ty: TypeName,
    pub name: String,
    #[serde(default)]
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDecl {
    pub elem_ty: TypeName,
    /// Number of `[]` pairs in the declaration.
    #[serde(default = "one")]
    pub dims: u32,
    pub name: String,
    pub init: VectorInit,
}

fn one() -> u32 {
    1
}

/// The three ways an array can be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorInit {
    /// `{a, b, c}`
    Values(Vec<Expr>),
    /// `new int[n]`, filled with the element type's zero value.
    Sized(Expr),
    /// `= other`, an element-wise copy of another array variable.
    CopyOf(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub return_ty: TypeName,
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub ty: TypeName,
    /// Array dimensions; 0 for scalars.
    #[serde(default)]
    pub dims: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `( expr )`
    Grouping(Box<Expr>),
    Variable(String),
    Assign {
        name: String,
        op: AssignOp,
        value: Box<Expr>,
    },
    /// `x++` / `x--`
    Increment {
        name: String,
        op: IncrementOp,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// A nested `{...}` inside an array initializer.
    ArrayLiteral(Vec<Expr>),
    /// `v[i]`
    Index {
        array: String,
        index: Box<Expr>,
    },
    /// `v[i] = e`, `v[i] += e`
    IndexAssign {
        array: String,
        index: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
    },
    /// `v.indexOf(e)`
    IndexOf {
        array: String,
        value: Box<Expr>,
    },
    /// `v.length`
    Length { array: String },
    /// `v.join()`
    Join { array: String },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    /// Raw source text between the quotes; escapes are not yet processed.
    Str(String),
}

/// The category a binary operator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryClass {
    Arithmetic,
    Relational,
    Equality,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl BinaryOp {
    pub fn class(self) -> BinaryClass {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                BinaryClass::Arithmetic
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => BinaryClass::Relational,
            BinaryOp::Eq | BinaryOp::Neq => BinaryClass::Equality,
            BinaryOp::And | BinaryOp::Or => BinaryClass::Logical,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "!")]
    Not,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    AddAssign,
    #[serde(rename = "-=")]
    SubAssign,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies, if any.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncrementOp {
    #[serde(rename = "++")]
    Inc,
    #[serde(rename = "--")]
    Dec,
}

impl IncrementOp {
    pub fn delta(self) -> i32 {
        match self {
            IncrementOp::Inc => 1,
            IncrementOp::Dec => -1,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            IncrementOp::Inc => "++",
            IncrementOp::Dec => "--",
        }
    }
}

/// Process the escape sequences of a raw string literal.
///
/// Recognizes `\n`, `\t`, `\"` and `\\`; any other backslash is kept as is.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
