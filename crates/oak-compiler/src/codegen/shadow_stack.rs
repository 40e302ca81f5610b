//! Compile-time mirror of the runtime stack.
//!
//! Every word the emitted code pushes has a [`Descriptor`] here, pushed and
//! popped in lockstep. A variable is just a named descriptor; its address is
//! the sum of the sizes of everything above it, found by scanning from the
//! top.

use std::fmt;

use oak_common::TypeName;

use super::error::CodegenErrorKind;

/// Bytes per stack slot and per array element.
pub const WORD: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    Char,
    Str,
}

impl ScalarKind {
    /// `None` for `var` and `void`.
    pub fn from_type_name(ty: TypeName) -> Option<ScalarKind> {
        match ty {
            TypeName::Int => Some(ScalarKind::Int),
            TypeName::Float => Some(ScalarKind::Float),
            TypeName::Bool => Some(ScalarKind::Bool),
            TypeName::Char => Some(ScalarKind::Char),
            TypeName::String => Some(ScalarKind::Str),
            TypeName::Var | TypeName::Void => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Bool => "bool",
            ScalarKind::Char => "char",
            ScalarKind::Str => "string",
        }
    }

    /// Element kind code understood by `printArray`, `arrayJoin` and `arrayIndexOf`.
    pub fn runtime_code(self) -> i64 {
        match self {
            ScalarKind::Int => 1,
            ScalarKind::Float => 2,
            ScalarKind::Bool => 3,
            ScalarKind::Char => 4,
            ScalarKind::Str => 5,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a stack slot holds. Array slots hold the address of element 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar(ScalarKind),
    Array(ScalarKind),
}

impl ValueKind {
    pub const INT: ValueKind = ValueKind::Scalar(ScalarKind::Int);
    pub const FLOAT: ValueKind = ValueKind::Scalar(ScalarKind::Float);
    pub const BOOL: ValueKind = ValueKind::Scalar(ScalarKind::Bool);
    pub const CHAR: ValueKind = ValueKind::Scalar(ScalarKind::Char);
    pub const STR: ValueKind = ValueKind::Scalar(ScalarKind::Str);

    pub fn scalar(self) -> Option<ScalarKind> {
        match self {
            ValueKind::Scalar(s) => Some(s),
            ValueKind::Array(_) => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::INT | ValueKind::FLOAT)
    }

    /// Strings and chars; both take part in concatenation.
    pub fn is_text(self) -> bool {
        matches!(self, ValueKind::STR | ValueKind::CHAR)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Scalar(s) => write!(f, "{}", s),
            ValueKind::Array(s) => write!(f, "{}[]", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub kind: ValueKind,
    pub size: i64,
    /// Scope depth the slot was pushed at.
    pub depth: usize,
    pub name: Option<String>,
    /// Element count, for arrays whose length is known at emission time.
    pub length: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ShadowStack {
    slots: Vec<Descriptor>,
    depth: usize,
}

impl ShadowStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ValueKind) {
        self.push_with_length(kind, None);
    }

    pub fn push_with_length(&mut self, kind: ValueKind, length: Option<usize>) {
        self.slots.push(Descriptor {
            kind,
            size: WORD,
            depth: self.depth,
            name: None,
            length,
        });
    }

    pub fn pop(&mut self) -> Result<Descriptor, CodegenErrorKind> {
        self.slots.pop().ok_or(CodegenErrorKind::StackUnderflow)
    }

    pub fn peek(&self) -> Option<&Descriptor> {
        self.slots.last()
    }

    /// The descriptor `n` slots below the top (`0` is the top).
    pub fn peek_at(&self, n: usize) -> Option<&Descriptor> {
        self.slots.len().checked_sub(n + 1).map(|i| &self.slots[i])
    }

    pub fn peek_at_mut(&mut self, n: usize) -> Option<&mut Descriptor> {
        let i = self.slots.len().checked_sub(n + 1)?;
        self.slots.get_mut(i)
    }

    /// Name the newest slot, turning it into a variable.
    pub fn tag_top(&mut self, name: &str) -> Result<(), CodegenErrorKind> {
        let top = self.slots.last_mut().ok_or(CodegenErrorKind::StackUnderflow)?;
        top.name = Some(name.to_string());
        Ok(())
    }

    /// Byte offset from `sp` and descriptor of the innermost slot named `name`.
    pub fn resolve(&self, name: &str) -> Option<(i64, &Descriptor)> {
        let mut offset = 0;
        for slot in self.slots.iter().rev() {
            if slot.name.as_deref() == Some(name) {
                return Some((offset, slot));
            }
            offset += slot.size;
        }
        None
    }

    pub fn declared_in_current_scope(&self, name: &str) -> bool {
        self.slots
            .iter()
            .rev()
            .take_while(|slot| slot.depth == self.depth)
            .any(|slot| slot.name.as_deref() == Some(name))
    }

    pub fn open_scope(&mut self) {
        self.depth += 1;
    }

    /// Drop every slot of the current scope and return how many bytes the
    /// caller must release from `sp`.
    pub fn close_scope(&mut self) -> i64 {
        let mut bytes = 0;
        while let Some(slot) = self.slots.last() {
            if slot.depth != self.depth {
                break;
            }
            bytes += slot.size;
            self.slots.pop();
        }
        self.depth = self.depth.saturating_sub(1);
        bytes
    }

    /// Current stack size in bytes, the "level" of this program point.
    pub fn total_bytes(&self) -> i64 {
        self.slots.iter().map(|s| s.size).sum()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
