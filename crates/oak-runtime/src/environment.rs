use std::collections::HashMap;

use crate::error::EvalErrorKind;
use crate::value::{Kind, Value};

/// Index of a scope in the environment arena.
pub type ScopeId = usize;

/// A name bound in a scope: its declared kind and current value.
#[derive(Debug, Clone)]
pub struct Binding {
    pub kind: Kind,
    pub value: Value,
}

#[derive(Debug, Default)]
struct Scope {
    bindings: HashMap<String, Binding>,
    parent: Option<ScopeId>,
}

// ============================================================================
// Environment
// ============================================================================

/// Chained lexical scopes stored in an arena.
///
/// Scopes are pushed on block entry and popped on exit. A scope captured by a
/// closure is pinned: popping past it leaves it in the arena so the function
/// body can still resolve names through it.
#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
    current: ScopeId,
    /// Scopes below this index are never reclaimed.
    pinned: usize,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            current: 0,
            pinned: 1,
        }
    }

    pub fn global(&self) -> ScopeId {
        0
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Number of scopes between the current one and the global scope.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self.current;
        while let Some(parent) = self.scopes[scope].parent {
            depth += 1;
            scope = parent;
        }
        depth
    }

    /// Enter a new scope nested in the current one.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope {
            bindings: HashMap::new(),
            parent: Some(self.current),
        });
        self.current = self.scopes.len() - 1;
    }

    /// Leave the current scope, returning to its parent.
    pub fn pop_scope(&mut self) {
        let idx = self.current;
        let Some(parent) = self.scopes[idx].parent else {
            return;
        };
        self.current = parent;
        if idx >= self.pinned && idx == self.scopes.len() - 1 {
            self.scopes.truncate(idx);
        }
    }

    /// Keep every scope up to and including the current one alive and return
    /// the current scope's id.
    pub fn capture(&mut self) -> ScopeId {
        self.pinned = self.pinned.max(self.current + 1);
        self.current
    }

    /// Enter a call frame: a fresh scope whose parent is `closure`.
    /// Returns the scope to restore with [`Environment::leave_call`].
    pub fn enter_call(&mut self, closure: ScopeId) -> ScopeId {
        let caller = self.current;
        self.scopes.push(Scope {
            bindings: HashMap::new(),
            parent: Some(closure),
        });
        self.current = self.scopes.len() - 1;
        caller
    }

    pub fn leave_call(&mut self, caller: ScopeId) {
        let idx = self.current;
        self.current = caller;
        if idx >= self.pinned && idx == self.scopes.len() - 1 {
            self.scopes.truncate(idx);
        }
    }

    /// Bind `name` in the current scope.
    pub fn declare(&mut self, name: &str, kind: Kind, value: Value) -> Result<(), EvalErrorKind> {
        let scope = &mut self.scopes[self.current];
        if scope.bindings.contains_key(name) {
            return Err(EvalErrorKind::AlreadyDeclared(name.to_string()));
        }
        scope
            .bindings
            .insert(name.to_string(), Binding { kind, value });
        Ok(())
    }

    /// Resolve `name`, walking outward from the current scope.
    pub fn get(&self, name: &str) -> Result<&Binding, EvalErrorKind> {
        let id = self.resolve(name)?;
        self.scopes[id]
            .bindings
            .get(name)
            .ok_or_else(|| EvalErrorKind::Undeclared(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Binding, EvalErrorKind> {
        let id = self.resolve(name)?;
        self.scopes[id]
            .bindings
            .get_mut(name)
            .ok_or_else(|| EvalErrorKind::Undeclared(name.to_string()))
    }

    /// Bindings of the global scope, sorted by name.
    pub fn globals(&self) -> Vec<(&str, &Binding)> {
        let mut globals: Vec<_> = self.scopes[self.global()]
            .bindings
            .iter()
            .map(|(name, binding)| (name.as_str(), binding))
            .collect();
        globals.sort_by_key(|(name, _)| *name);
        globals
    }

    fn resolve(&self, name: &str) -> Result<ScopeId, EvalErrorKind> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            if self.scopes[id].bindings.contains_key(name) {
                return Ok(id);
            }
            scope = self.scopes[id].parent;
        }
        Err(EvalErrorKind::Undeclared(name.to_string()))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
