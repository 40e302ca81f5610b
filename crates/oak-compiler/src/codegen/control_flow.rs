//! Lowering of structured control flow into labels and branches.

use oak_common::ast::{Expr, ExprKind, Literal, Stmt, StmtKind, SwitchCase, TypeName, UnaryOp};
use oak_common::Span;
use tracing::debug;

use super::asm::{Label, Register};
use super::emitter::{int_word, CodeGenerator};
use super::error::{CodegenErrorKind, Result};
use super::shadow_stack::{ScalarKind, ValueKind, WORD};

use Register::*;

/// Where `break` or `continue` jumps, and the stack level (in bytes) the
/// code at that label expects.
#[derive(Debug, Clone, PartialEq)]
pub struct JumpTarget {
    pub label: Label,
    pub level: i64,
}

/// Break and continue targets; the innermost is on top.
#[derive(Debug, Default)]
pub struct ControlStack {
    breaks: Vec<JumpTarget>,
    continues: Vec<JumpTarget>,
}

impl ControlStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_break(&mut self, target: JumpTarget) {
        self.breaks.push(target);
    }

    pub fn pop_break(&mut self) -> Option<JumpTarget> {
        self.breaks.pop()
    }

    pub fn push_continue(&mut self, target: JumpTarget) {
        self.continues.push(target);
    }

    pub fn pop_continue(&mut self) -> Option<JumpTarget> {
        self.continues.pop()
    }

    pub fn innermost_break(&self) -> Option<&JumpTarget> {
        self.breaks.last()
    }

    pub fn innermost_continue(&self) -> Option<&JumpTarget> {
        self.continues.last()
    }

    pub fn is_empty(&self) -> bool {
        self.breaks.is_empty() && self.continues.is_empty()
    }
}

impl CodeGenerator {
    pub(crate) fn lower_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.stack.open_scope();
        for stmt in stmts {
            self.lower_stmt(stmt)?;
        }
        self.close_scope();
        Ok(())
    }

    fn close_scope(&mut self) {
        let bytes = self.stack.close_scope();
        self.asm.release(bytes);
    }

    /// Bodies that are not blocks still get their own scope.
    fn lower_body(&mut self, body: &Stmt) -> Result<()> {
        match &body.kind {
            StmtKind::Block(stmts) => self.lower_block(stmts),
            _ => {
                self.stack.open_scope();
                self.lower_stmt(body)?;
                self.close_scope();
                Ok(())
            }
        }
    }

    fn lower_loop_body(&mut self, body: &Stmt, exit: &Label, next: &Label, level: i64) -> Result<()> {
        self.control.push_break(JumpTarget {
            label: exit.clone(),
            level,
        });
        self.control.push_continue(JumpTarget {
            label: next.clone(),
            level,
        });
        let result = self.lower_body(body);
        self.control.pop_continue();
        self.control.pop_break();
        result
    }

    pub(crate) fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<()> {
        let end = self.new_label();
        self.lower_condition(cond)?;
        match else_branch {
            Some(else_branch) => {
                let otherwise = self.new_label();
                self.asm.beqz(T0, &otherwise);
                self.lower_body(then_branch)?;
                self.asm.j(&end);
                self.asm.label(&otherwise);
                self.lower_body(else_branch)?;
            }
            None => {
                self.asm.beqz(T0, &end);
                self.lower_body(then_branch)?;
            }
        }
        self.asm.label(&end);
        Ok(())
    }

    pub(crate) fn lower_while(&mut self, cond: &Expr, body: &Stmt) -> Result<()> {
        let start = self.new_label();
        let end = self.new_label();
        debug!(start = %start, "while");

        self.asm.label(&start);
        self.lower_condition(cond)?;
        self.asm.beqz(T0, &end);
        let level = self.stack.total_bytes();
        self.lower_loop_body(body, &end, &start, level)?;
        self.asm.j(&start);
        self.asm.label(&end);
        Ok(())
    }

    /// `continue` lands on its own label just before the update, so the
    /// update always runs before the condition is tested again.
    pub(crate) fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> Result<()> {
        let start = self.new_label();
        let next = self.new_label();
        let end = self.new_label();
        debug!(start = %start, "for");

        self.stack.open_scope();
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }
        self.asm.label(&start);
        if let Some(cond) = cond {
            self.lower_condition(cond)?;
            self.asm.beqz(T0, &end);
        }
        let level = self.stack.total_bytes();
        self.lower_loop_body(body, &end, &next, level)?;
        self.asm.label(&next);
        if let Some(update) = update {
            self.lower_expr(update)?;
            self.discard(&update.span)?;
        }
        self.asm.j(&start);
        self.asm.label(&end);
        self.close_scope();
        Ok(())
    }

    /// A counted loop over hidden `#base` / `#idx` slots. The element lives
    /// in an inner scope that is released before the index advances.
    pub(crate) fn lower_for_each(
        &mut self,
        elem_ty: TypeName,
        name: &str,
        iterable: &str,
        body: &Stmt,
        span: &Span,
    ) -> Result<()> {
        let elem = self.array_elem(iterable, span)?;
        if elem_ty != TypeName::Var && ScalarKind::from_type_name(elem_ty) != Some(elem) {
            return Err(CodegenErrorKind::mismatch(elem, elem_ty).at(span));
        }
        let start = self.new_label();
        let next = self.new_label();
        let end = self.new_label();
        debug!(iterable, start = %start, "for-each");

        self.stack.open_scope();
        self.load_variable(iterable, span)?;
        self.stack.tag_top("#base").map_err(|e| e.at(span))?;
        self.asm.li(T0, 0);
        self.push_value(T0, ValueKind::INT);
        self.stack.tag_top("#idx").map_err(|e| e.at(span))?;
        let level = self.stack.total_bytes();

        self.asm.label(&start);
        self.asm.lw(T0, 0, Sp);
        self.asm.lw(T1, WORD, Sp);
        self.asm.lw(T2, -WORD, T1);
        self.asm.bge(T0, T2, &end);
        self.asm.slli(T0, T0, 2);
        self.asm.add(T0, T1, T0);
        self.asm.lw(T0, 0, T0);

        self.stack.open_scope();
        self.push_value(T0, ValueKind::Scalar(elem));
        self.stack.tag_top(name).map_err(|e| e.at(span))?;
        self.lower_loop_body(body, &end, &next, level)?;
        self.close_scope();

        self.asm.label(&next);
        self.asm.lw(T0, 0, Sp);
        self.asm.addi(T0, T0, 1);
        self.asm.sw(T0, 0, Sp);
        self.asm.j(&start);
        self.asm.label(&end);
        self.close_scope();
        Ok(())
    }

    /// All comparisons run up front against immediates (or through
    /// `strEquals` for strings); case bodies follow in source order and fall
    /// through into the next one.
    pub(crate) fn lower_switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
    ) -> Result<()> {
        let span = &scrutinee.span;
        let kind = self.lower_expr(scrutinee)?;
        let end = self.new_label();
        let labels: Vec<Label> = cases.iter().map(|_| self.new_label()).collect();
        let default_label = default.map(|_| self.new_label());
        debug!(cases = cases.len(), kind = %kind, "switch");

        match kind {
            ValueKind::Scalar(ScalarKind::Str) => {
                self.pop_value(S1, span)?;
                for (case, label) in cases.iter().zip(&labels) {
                    if !matches!(case.value.kind, ExprKind::Literal(Literal::Str(_))) {
                        return Err(case_error(kind, &case.value.span));
                    }
                    self.lower_expr(&case.value)?;
                    self.pop_value(A1, &case.value.span)?;
                    self.asm.mv(A0, S1);
                    self.call_builtin("strEquals", &case.value.span)?;
                    self.asm.bnez(A0, label);
                }
            }
            ValueKind::Scalar(ScalarKind::Int | ScalarKind::Char | ScalarKind::Bool) => {
                self.pop_value(T0, span)?;
                for (case, label) in cases.iter().zip(&labels) {
                    let imm = case_immediate(&case.value, kind)?;
                    self.asm.li(T1, imm);
                    self.asm.beq(T0, T1, label);
                }
            }
            other => {
                return Err(CodegenErrorKind::Unsupported(format!("switch over {}", other)).at(span))
            }
        }
        self.asm.j(default_label.as_ref().unwrap_or(&end));

        let level = self.stack.total_bytes();
        self.control.push_break(JumpTarget {
            label: end.clone(),
            level,
        });
        let result = self.lower_switch_bodies(cases, &labels, default.zip(default_label.as_ref()));
        self.control.pop_break();
        result?;
        self.asm.label(&end);
        Ok(())
    }

    fn lower_switch_bodies(
        &mut self,
        cases: &[SwitchCase],
        labels: &[Label],
        default: Option<(&[Stmt], &Label)>,
    ) -> Result<()> {
        for (case, label) in cases.iter().zip(labels) {
            self.asm.label(label);
            self.lower_block(&case.body)?;
        }
        if let Some((body, label)) = default {
            self.asm.label(label);
            self.lower_block(body)?;
        }
        Ok(())
    }

    pub(crate) fn lower_break(&mut self, span: &Span) -> Result<()> {
        let target = self
            .control
            .innermost_break()
            .cloned()
            .ok_or_else(|| CodegenErrorKind::BreakOutsideLoop.at(span))?;
        self.jump_to(&target);
        Ok(())
    }

    pub(crate) fn lower_continue(&mut self, span: &Span) -> Result<()> {
        let target = self
            .control
            .innermost_continue()
            .cloned()
            .ok_or_else(|| CodegenErrorKind::ContinueOutsideLoop.at(span))?;
        self.jump_to(&target);
        Ok(())
    }

    /// Release whatever was pushed since the target was set up, then jump.
    /// The shadow stack is left alone: the code after the jump is still
    /// inside those scopes.
    fn jump_to(&mut self, target: &JumpTarget) {
        let excess = self.stack.total_bytes() - target.level;
        self.asm.release(excess);
        self.asm.j(&target.label);
    }
}

fn case_error(kind: ValueKind, span: &Span) -> super::error::CodegenError {
    CodegenErrorKind::Unsupported(format!("case values of a {} switch must be {} literals", kind, kind))
        .at(span)
}

/// The compile-time value of a case label.
fn case_immediate(expr: &Expr, kind: ValueKind) -> Result<i64> {
    let value = match (&expr.kind, kind) {
        (ExprKind::Grouping(inner), _) => return case_immediate(inner, kind),
        (ExprKind::Literal(Literal::Int(n)), ValueKind::INT) => Some(int_word(*n, &expr.span)?),
        (
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            },
            ValueKind::INT,
        ) => match &operand.kind {
            ExprKind::Literal(Literal::Int(n)) => Some(-int_word(*n, &operand.span)?),
            _ => None,
        },
        (ExprKind::Literal(Literal::Char(c)), ValueKind::CHAR) => Some(i64::from(u32::from(*c))),
        (ExprKind::Literal(Literal::Bool(b)), ValueKind::BOOL) => Some(i64::from(*b)),
        _ => None,
    };
    value.ok_or_else(|| case_error(kind, &expr.span))
}

#[cfg(test)]
mod tests {
    use oak_common::ast::build::*;
    use oak_common::ast::{BinaryOp, TypeName};

    use super::*;
    use crate::codegen::asm::Instruction;

    fn lower(statements: Vec<Stmt>) -> CodeGenerator {
        let mut gen = CodeGenerator::new();
        gen.lower_program(&program(statements)).unwrap();
        gen
    }

    fn text(gen: &CodeGenerator) -> Vec<String> {
        gen.assembler()
            .instructions()
            .iter()
            .filter(|i| !matches!(i, Instruction::Comment(_)))
            .map(|i| i.to_string().trim().to_string())
            .collect()
    }

    fn index_of(lines: &[String], line: &str) -> usize {
        lines
            .iter()
            .position(|l| l == line)
            .unwrap_or_else(|| panic!("missing {:?} in {:#?}", line, lines))
    }

    fn lt(name: &str, n: i64) -> Expr {
        binary(BinaryOp::Lt, var(name), int(n))
    }

    #[test]
    fn continue_lands_before_the_update() {
        // for (int i = 0; i < 3; i++) { continue; }
        let gen = lower(vec![for_(
            Some(decl(TypeName::Int, "i", int(0))),
            Some(lt("i", 3)),
            Some(inc("i")),
            block(vec![continue_()]),
        )]);
        let lines = text(&gen);
        // labels: L0 start, L1 continue, L2 end
        let jump = index_of(&lines, "j L1");
        let cont = index_of(&lines, "L1:");
        let update = lines[cont + 1..]
            .iter()
            .position(|l| l == "addi t0, t0, 1")
            .map(|p| p + cont + 1)
            .unwrap();
        let back = index_of(&lines, "j L0");
        assert!(jump < cont && cont < update && update < back);
        assert!(index_of(&lines, "L2:") > back);
    }

    #[test]
    fn break_releases_slots_opened_inside_the_loop() {
        // while (true) { int a = 1; { int b = 2; break; } }
        let gen = lower(vec![while_(
            boolean(true),
            block(vec![
                decl(TypeName::Int, "a", int(1)),
                block(vec![decl(TypeName::Int, "b", int(2)), break_()]),
            ]),
        )]);
        let lines = text(&gen);
        let jump = index_of(&lines, "j L1");
        assert_eq!(lines[jump - 1], "addi sp, sp, 8");
        assert_eq!(gen.shadow_stack().len(), 0);
        assert_eq!(gen.shadow_stack().depth(), 0);
    }

    #[test]
    fn nested_loops_target_the_innermost() {
        let gen = lower(vec![while_(
            boolean(true),
            block(vec![while_(boolean(false), block(vec![break_()])), break_()]),
        )]);
        let lines = text(&gen);
        // outer: L0 / L1, inner: L2 / L3
        assert!(lines.contains(&"j L3".to_string()));
        assert!(lines.contains(&"j L1".to_string()));
        assert!(gen.control.is_empty());
    }

    #[test]
    fn for_scope_is_balanced_after_early_exits() {
        let gen = lower(vec![
            for_(
                Some(decl(TypeName::Int, "i", int(0))),
                Some(lt("i", 3)),
                Some(inc("i")),
                block(vec![
                    decl(TypeName::Int, "tmp", var("i")),
                    if_(lt("i", 1), continue_(), Some(break_())),
                ]),
            ),
            decl(TypeName::Int, "after", int(9)),
        ]);
        let stack = gen.shadow_stack();
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.len(), 1);
        assert!(stack.resolve("i").is_none());
        assert_eq!(stack.resolve("after").unwrap().0, 0);
        let lines = text(&gen);
        // `continue` and `break` both drop `tmp` before jumping
        assert!(lines.iter().filter(|l| *l == "addi sp, sp, 4").count() >= 2);
    }

    #[test]
    fn for_each_releases_the_element_before_advancing() {
        let gen = lower(vec![
            vector(TypeName::Int, "v", vec![int(1), int(2)]),
            for_each(
                TypeName::Int,
                "x",
                "v",
                block(vec![if_(
                    binary(BinaryOp::Eq, var("x"), int(1)),
                    continue_(),
                    None,
                )]),
            ),
        ]);
        assert_eq!(gen.shadow_stack().len(), 1);
        assert_eq!(gen.shadow_stack().depth(), 0);
        let lines = text(&gen);
        assert!(lines.contains(&"bge t0, t2, L2".to_string()));
        assert!(lines.contains(&"addi sp, sp, 8".to_string()));
    }

    #[test]
    fn for_each_checks_the_element_type() {
        let mut gen = CodeGenerator::new();
        let err = gen
            .lower_program(&program(vec![
                vector(TypeName::Int, "v", vec![int(1)]),
                for_each(TypeName::String, "s", "v", block(vec![])),
            ]))
            .unwrap_err();
        assert!(matches!(err.kind, CodegenErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn switch_dispatches_then_falls_through() {
        let gen = lower(vec![switch(
            int(2),
            vec![
                case(int(1), vec![print(vec![string("one")])]),
                case(int(2), vec![print(vec![string("two")])]),
                case(int(3), vec![print(vec![string("three")]), break_()]),
            ],
            Some(vec![print(vec![string("default")])]),
        )]);
        let lines = text(&gen);
        // end L0, cases L1..L3, default L4
        let dispatch = index_of(&lines, "beq t0, t1, L3");
        let to_default = index_of(&lines, "j L4");
        let two = index_of(&lines, "L2:");
        let three = index_of(&lines, "L3:");
        assert!(dispatch < to_default && to_default < two);
        assert!(!lines[two..three].iter().any(|l| l.starts_with("j ")));
        assert!(lines[three..].contains(&"j L0".to_string()));
    }

    #[test]
    fn string_switch_compares_with_str_equals() {
        let gen = lower(vec![switch(
            string("b"),
            vec![case(string("a"), vec![]), case(string("b"), vec![])],
            None,
        )]);
        let lines = text(&gen);
        assert_eq!(lines.iter().filter(|l| *l == "jal strEquals").count(), 2);
        assert!(lines.contains(&"mv a0, s1".to_string()));
        assert!(lines.contains(&"j L0".to_string()));
    }

    #[test]
    fn switch_case_must_match_scrutinee_kind() {
        let mut gen = CodeGenerator::new();
        let err = gen
            .lower_program(&program(vec![switch(
                ch('a'),
                vec![case(int(1), vec![])],
                None,
            )]))
            .unwrap_err();
        assert!(matches!(err.kind, CodegenErrorKind::Unsupported(_)));
    }

    #[test]
    fn oversized_case_label_is_rejected() {
        let mut gen = CodeGenerator::new();
        let err = gen
            .lower_program(&program(vec![switch(
                int(1),
                vec![case(int(3_000_000_000), vec![])],
                None,
            )]))
            .unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::IntegerOutOfRange(3_000_000_000));
    }

    #[test]
    fn break_outside_loop_is_fatal() {
        let mut gen = CodeGenerator::new();
        let err = gen.lower_program(&program(vec![break_()])).unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::BreakOutsideLoop);

        let mut gen = CodeGenerator::new();
        let err = gen
            .lower_program(&program(vec![switch(int(1), vec![case(int(1), vec![continue_()])], None)]))
            .unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::ContinueOutsideLoop);
    }

    #[test]
    fn if_else_layout() {
        let gen = lower(vec![if_(
            boolean(true),
            print(vec![int(1)]),
            Some(print(vec![int(2)])),
        )]);
        let lines = text(&gen);
        // end L0, else L1
        let branch = index_of(&lines, "beqz t0, L1");
        let skip = index_of(&lines, "j L0");
        let otherwise = index_of(&lines, "L1:");
        let end = index_of(&lines, "L0:");
        assert!(branch < skip && skip < otherwise && otherwise < end);
        assert!(lines.iter().all(|l| l != "ret"));
    }
}
