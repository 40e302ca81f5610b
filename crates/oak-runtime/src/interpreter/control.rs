use oak_common::ast::{BinaryOp, Expr, Stmt, StmtKind, SwitchCase, TypeName};
use oak_common::Span;
use tracing::debug;

use super::{Flow, Interpreter};
use crate::error::{EvalErrorKind, Result};
use crate::value::{Kind, Value};

impl Interpreter {
    /// Run a statement list in a new scope, stopping at the first signal.
    pub(crate) fn execute_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        self.in_scope(|this| this.execute_sequence(stmts))
    }

    /// Run a statement list in the current scope.
    pub(crate) fn execute_sequence(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            match self.execute(stmt)? {
                Flow::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(Flow::Normal)
    }

    /// Run the body of a loop or branch. A body that is not a block still
    /// gets its own scope.
    fn execute_body(&mut self, body: &Stmt) -> Result<Flow> {
        match &body.kind {
            StmtKind::Block(stmts) => self.execute_block(stmts),
            _ => self.in_scope(|this| this.execute(body)),
        }
    }

    pub(crate) fn execute_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<Flow> {
        if self.evaluate_condition(cond)? {
            self.execute_body(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.execute_body(else_branch)
        } else {
            Ok(Flow::Normal)
        }
    }

    pub(crate) fn execute_while(&mut self, cond: &Expr, body: &Stmt) -> Result<Flow> {
        debug!("while");
        while self.evaluate_condition(cond)? {
            match self.execute_body(body)? {
                Flow::Break(_) => break,
                Flow::Continue(_) | Flow::Normal => {}
                ret @ Flow::Return(..) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    /// `for (init; cond; update) body` runs as `init; while (cond) { body; update }`
    /// where `continue` still reaches the update.
    pub(crate) fn execute_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Flow> {
        debug!("for");
        self.in_scope(|this| {
            if let Some(init) = init {
                this.execute(init)?;
            }
            loop {
                if let Some(cond) = cond {
                    if !this.evaluate_condition(cond)? {
                        break;
                    }
                }
                match this.execute_body(body)? {
                    Flow::Break(_) => break,
                    Flow::Continue(_) | Flow::Normal => {}
                    ret @ Flow::Return(..) => return Ok(ret),
                }
                if let Some(update) = update {
                    this.evaluate(update)?;
                }
            }
            Ok(Flow::Normal)
        })
    }

    pub(crate) fn execute_for_each(
        &mut self,
        elem_ty: TypeName,
        name: &str,
        iterable: &str,
        body: &Stmt,
        span: &Span,
    ) -> Result<Flow> {
        debug!(iterable, "for-each");
        let (elem, items) = self.array_items(iterable, span)?;

        if elem_ty != TypeName::Var && Kind::from_type_name(elem_ty).as_ref() != Some(&elem) {
            return Err(EvalErrorKind::TypeMismatch {
                expected: elem.to_string(),
                found: elem_ty.to_string(),
            }
            .at(span));
        }

        for item in items {
            let flow = self.in_scope(|this| {
                this.env
                    .declare(name, elem.clone(), item)
                    .map_err(|e| e.at(span))?;
                this.execute_body(body)
            })?;
            match flow {
                Flow::Break(_) => break,
                Flow::Continue(_) | Flow::Normal => {}
                ret @ Flow::Return(..) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    /// Cases are compared in order with `==`. Execution starts at the first
    /// match and falls through every later case and then `default`.
    pub(crate) fn execute_switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
    ) -> Result<Flow> {
        let subject = self.evaluate_literal(scrutinee)?;

        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            let value = self.evaluate_literal(&case.value)?;
            let matched = subject
                .binary(BinaryOp::Eq, &value)
                .map_err(|e| e.at(&case.span))?;
            if matched == Value::Bool(true) {
                start = Some(i);
                break;
            }
        }
        debug!(matched = ?start, "switch");

        let bodies: Vec<&[Stmt]> = match start {
            Some(i) => cases[i..].iter().map(|c| c.body.as_slice()).collect(),
            None => Vec::new(),
        };

        for body in bodies.into_iter().chain(default) {
            match self.execute_block(body)? {
                Flow::Normal => {}
                Flow::Break(_) => return Ok(Flow::Normal),
                signal => return Ok(signal),
            }
        }
        Ok(Flow::Normal)
    }
}

#[cfg(test)]
mod tests {
    use oak_common::ast::build::*;
    use oak_common::ast::{AssignOp, BinaryOp, TypeName};

    use crate::interpreter::Interpreter;

    fn output(statements: Vec<oak_common::Stmt>) -> String {
        let eval = Interpreter::new().run(&program(statements));
        assert!(eval.diagnostics.is_empty(), "{:?}", eval.diagnostics);
        eval.output
    }

    fn lt(name: &str, n: i64) -> oak_common::Expr {
        binary(BinaryOp::Lt, var(name), int(n))
    }

    #[test]
    fn for_continue_still_runs_update() {
        let out = output(vec![for_(
            Some(decl(TypeName::Int, "i", int(0))),
            Some(lt("i", 4)),
            Some(inc("i")),
            block(vec![
                if_(
                    binary(BinaryOp::Eq, var("i"), int(1)),
                    continue_(),
                    None,
                ),
                print(vec![var("i")]),
            ]),
        )]);
        assert_eq!(out, "0\n2\n3");
    }

    #[test]
    fn break_exits_innermost_loop_only() {
        let out = output(vec![
            decl(TypeName::Int, "i", int(0)),
            while_(
                lt("i", 2),
                block(vec![
                    decl(TypeName::Int, "j", int(0)),
                    while_(
                        boolean(true),
                        block(vec![
                            if_(binary(BinaryOp::Eq, var("j"), int(2)), break_(), None),
                            expr_stmt(inc("j")),
                        ]),
                    ),
                    print(vec![var("i"), var("j")]),
                    expr_stmt(inc("i")),
                ]),
            ),
        ]);
        assert_eq!(out, "0 2\n1 2");
    }

    #[test]
    fn scopes_are_balanced_after_early_exits() {
        let mut interp = Interpreter::new();
        let eval = interp.run(&program(vec![
            for_(
                Some(decl(TypeName::Int, "i", int(0))),
                Some(lt("i", 3)),
                Some(inc("i")),
                block(vec![
                    decl(TypeName::Int, "tmp", var("i")),
                    if_(lt("i", 1), continue_(), Some(break_())),
                ]),
            ),
            decl(TypeName::Int, "tmp", int(9)),
        ]));
        assert!(eval.diagnostics.is_empty(), "{:?}", eval.diagnostics);
        assert_eq!(interp.environment().depth(), 0);
        assert!(interp.environment().get("i").is_err());
    }

    #[test]
    fn switch_falls_through_without_break() {
        let out = output(vec![
            decl(TypeName::Int, "x", int(2)),
            switch(
                var("x"),
                vec![
                    case(int(1), vec![print(vec![string("one")])]),
                    case(int(2), vec![print(vec![string("two")])]),
                    case(int(3), vec![print(vec![string("three")]), break_()]),
                    case(int(4), vec![print(vec![string("four")])]),
                ],
                Some(vec![print(vec![string("default")])]),
            ),
        ]);
        assert_eq!(out, "two\nthree");
    }

    #[test]
    fn switch_without_match_runs_default() {
        let out = output(vec![switch(
            string("z"),
            vec![case(string("a"), vec![print(vec![int(1)])])],
            Some(vec![print(vec![int(0)])]),
        )]);
        assert_eq!(out, "0");
    }

    #[test]
    fn switch_cases_get_their_own_scope() {
        let out = output(vec![switch(
            int(1),
            vec![
                case(int(1), vec![decl(TypeName::Int, "y", int(1))]),
                case(int(2), vec![decl(TypeName::Int, "y", int(2)), print(vec![var("y")])]),
            ],
            None,
        )]);
        assert_eq!(out, "2");
    }

    #[test]
    fn continue_inside_switch_reaches_loop() {
        let out = output(vec![for_(
            Some(decl(TypeName::Int, "i", int(0))),
            Some(lt("i", 3)),
            Some(assign_op("i", AssignOp::AddAssign, int(1))),
            block(vec![
                switch(var("i"), vec![case(int(1), vec![continue_()])], None),
                print(vec![var("i")]),
            ]),
        )]);
        assert_eq!(out, "0\n2");
    }

    #[test]
    fn for_each_visits_every_element() {
        let out = output(vec![
            vector(TypeName::Int, "v", vec![int(1), int(2), int(3)]),
            for_each(
                TypeName::Int,
                "x",
                "v",
                block(vec![
                    if_(binary(BinaryOp::Eq, var("x"), int(2)), continue_(), None),
                    print(vec![var("x")]),
                ]),
            ),
        ]);
        assert_eq!(out, "1\n3");
    }

    #[test]
    fn for_each_checks_element_type() {
        let eval = Interpreter::new().run(&program(vec![
            vector(TypeName::Int, "v", vec![int(1)]),
            for_each(TypeName::String, "s", "v", block(vec![])),
        ]));
        assert_eq!(eval.diagnostics.len(), 1);
    }
}
