use serde::{Deserialize, Serialize};

/// A type as written in a declaration: `int x`, `float[] v`, `void f()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeName {
    Int,
    Float,
    Bool,
    Char,
    String,
    /// Inferred from the initializer.
    Var,
    /// Only valid as a function return type.
    Void,
}

impl TypeName {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeName::Int => "int",
            TypeName::Float => "float",
            TypeName::Bool => "bool",
            TypeName::Char => "char",
            TypeName::String => "string",
            TypeName::Var => "var",
            TypeName::Void => "void",
        }
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
