use oak_common::ast::{
    unescape, AssignOp, BinaryClass, BinaryOp, Expr, ExprKind, IncrementOp, Literal, Program,
    Stmt, StmtKind, UnaryOp, VarDecl,
};
use oak_common::manifest::GeneratorConfig;
use oak_common::{Span, TypeName};
use tracing::{debug, trace};

use super::asm::{Assembler, FRegister, Label, Opcode, Register};
use super::builtins::BuiltinSet;
use super::control_flow::ControlStack;
use super::data::DataSection;
use super::error::{CodegenErrorKind, Result};
use super::shadow_stack::{Descriptor, ScalarKind, ShadowStack, ValueKind, WORD};
use super::Assembly;

use FRegister::*;
use Register::*;

/// Embedded functions the generator can lower; every other call is rejected.
const EMBEDDED: &[&str] = &[
    "parseInt",
    "parsefloat",
    "toString",
    "toLowerCase",
    "toUpperCase",
    "typeof",
];

// ============================================================================
// Code Generator
// ============================================================================

/// Lowers a syntax tree to RISC-V assembly.
///
/// Every value is computed onto the machine stack; `stack` mirrors each push
/// and pop so variables resolve to `sp`-relative offsets.
pub struct CodeGenerator {
    pub(crate) asm: Assembler,
    pub(crate) stack: ShadowStack,
    pub(crate) control: ControlStack,
    pub(crate) builtins: BuiltinSet,
    pub(crate) data: DataSection,
    pub(crate) config: GeneratorConfig,
    label_counter: usize,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::with_config(GeneratorConfig::default())
    }

    pub fn with_config(config: GeneratorConfig) -> Self {
        Self {
            asm: Assembler::new(config.comments),
            stack: ShadowStack::new(),
            control: ControlStack::new(),
            builtins: BuiltinSet::new(),
            data: DataSection::new(),
            config,
            label_counter: 0,
        }
    }

    /// Lower a whole program and assemble the final output.
    #[tracing::instrument(skip_all)]
    pub fn generate(mut self, program: &Program) -> Result<Assembly> {
        self.lower_program(program)?;
        self.finish()
    }

    /// Lower every top-level statement, stopping at the first error.
    pub fn lower_program(&mut self, program: &Program) -> Result<()> {
        debug!(statements = program.statements.len(), "lowering program");
        for stmt in &program.statements {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    /// Release the remaining top-level slots and append the used builtins.
    pub fn finish(mut self) -> Result<Assembly> {
        let remaining = self.stack.total_bytes();
        self.asm.release(remaining);
        let runtime = self
            .builtins
            .materialize(self.config.comments)
            .map_err(|e| e.at(&Span::dummy()))?;
        debug!(
            instructions = self.asm.len(),
            builtins = self.builtins.used().len(),
            "generation finished"
        );
        Ok(Assembly {
            data: self.data,
            instructions: self.asm.into_instructions(),
            runtime,
            used_builtins: self.builtins.used().to_vec(),
        })
    }

    pub fn shadow_stack(&self) -> &ShadowStack {
        &self.stack
    }

    pub fn assembler(&self) -> &Assembler {
        &self.asm
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    pub(crate) fn new_label(&mut self) -> Label {
        let label = Label::new(format!("L{}", self.label_counter));
        self.label_counter += 1;
        label
    }

    pub(crate) fn call_builtin(&mut self, name: &str, span: &Span) -> Result<()> {
        let routine = self.builtins.request(name).map_err(|e| e.at(span))?;
        self.asm.jal(routine);
        Ok(())
    }

    pub(crate) fn push_value(&mut self, reg: Register, kind: ValueKind) {
        self.asm.push(reg);
        self.stack.push(kind);
    }

    pub(crate) fn pop_value(&mut self, reg: Register, span: &Span) -> Result<Descriptor> {
        let desc = self.stack.pop().map_err(|e| e.at(span))?;
        self.asm.pop(reg);
        Ok(desc)
    }

    /// Drop the top slot without reading it.
    pub(crate) fn discard(&mut self, span: &Span) -> Result<()> {
        let desc = self.stack.pop().map_err(|e| e.at(span))?;
        self.asm.release(desc.size);
        Ok(())
    }

    pub(crate) fn resolve(&self, name: &str, span: &Span) -> Result<(i64, Descriptor)> {
        self.stack
            .resolve(name)
            .map(|(offset, desc)| (offset, desc.clone()))
            .ok_or_else(|| CodegenErrorKind::UnresolvedVariable(name.to_string()).at(span))
    }

    fn kind_at(&self, n: usize, span: &Span) -> Result<ValueKind> {
        self.stack
            .peek_at(n)
            .map(|d| d.kind)
            .ok_or_else(|| CodegenErrorKind::StackUnderflow.at(span))
    }

    /// Push the address of a fresh heap copy of `text`.
    pub(crate) fn push_string(&mut self, text: &str) {
        self.asm.comment(format!("string {:?}", text));
        self.asm.mv(T0, Register::HP);
        self.push_value(T0, ValueKind::STR);
        for word in pack_words(text) {
            self.asm.li(T1, word);
            self.asm.sw(T1, 0, Register::HP);
            self.asm.addi(Register::HP, Register::HP, WORD);
        }
    }

    /// Push the zero value of `kind`: 0, 0.0, false, '\0' or "".
    pub(crate) fn push_zero(&mut self, kind: ScalarKind) {
        self.load_zero(T0, kind);
        self.push_value(T0, ValueKind::Scalar(kind));
    }

    pub(crate) fn load_zero(&mut self, reg: Register, kind: ScalarKind) {
        match kind {
            ScalarKind::Str => self.asm.la(reg, "str_empty"),
            _ => self.asm.li(reg, 0),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        trace!(at = %stmt.span, "lower statement");
        let span = &stmt.span;
        match &stmt.kind {
            StmtKind::VarDecl(decl) => self.lower_var_decl(decl, span),
            StmtKind::VectorDecl(decl) => self.lower_vector_decl(decl, span),
            StmtKind::FuncDecl(decl) => Err(CodegenErrorKind::Unsupported(format!(
                "function '{}': user-defined functions run only in the evaluator",
                decl.name
            ))
            .at(span)),
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
                self.discard(span)
            }
            StmtKind::Print(args) => self.lower_print(args, span),
            StmtKind::Block(stmts) => self.lower_block(stmts),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref()),
            StmtKind::While { cond, body } => self.lower_while(cond, body),
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => self.lower_for(init.as_deref(), cond.as_ref(), update.as_ref(), body),
            StmtKind::ForEach {
                elem_ty,
                name,
                iterable,
                body,
            } => self.lower_for_each(*elem_ty, name, iterable, body, span),
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => self.lower_switch(scrutinee, cases, default.as_deref()),
            StmtKind::Break => self.lower_break(span),
            StmtKind::Continue => self.lower_continue(span),
            StmtKind::Return(_) => Err(CodegenErrorKind::Unsupported(
                "return: user-defined functions run only in the evaluator".to_string(),
            )
            .at(span)),
        }
    }

    fn lower_var_decl(&mut self, decl: &VarDecl, span: &Span) -> Result<()> {
        if self.stack.declared_in_current_scope(&decl.name) {
            return Err(CodegenErrorKind::Redeclared(decl.name.clone()).at(span));
        }
        debug!(name = %decl.name, ty = %decl.ty, "declare");

        match (ScalarKind::from_type_name(decl.ty), &decl.init) {
            (Some(kind), Some(init)) => self.lower_as(init, ValueKind::Scalar(kind))?,
            (Some(kind), None) => self.push_zero(kind),
            (None, Some(init)) if decl.ty == TypeName::Var => {
                let kind = self.lower_expr(init)?;
                if let ValueKind::Array(_) = kind {
                    return Err(CodegenErrorKind::Unsupported(
                        "array values in scalar declarations".to_string(),
                    )
                    .at(span));
                }
            }
            (None, init) => {
                let found = if init.is_some() { "a value" } else { "no initializer" };
                return Err(CodegenErrorKind::mismatch(decl.ty, found).at(span));
            }
        }
        self.stack.tag_top(&decl.name).map_err(|e| e.at(span))
    }

    fn lower_print(&mut self, args: &[Expr], span: &Span) -> Result<()> {
        self.asm.comment("print");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.asm.li(A0, b' ' as i64);
                self.asm.syscall(11);
            }
            let kind = self.lower_expr(arg)?;
            self.print_top(kind, span)?;
        }
        self.asm.li(A0, b'\n' as i64);
        self.asm.syscall(11);
        Ok(())
    }

    fn print_top(&mut self, kind: ValueKind, span: &Span) -> Result<()> {
        match kind {
            ValueKind::Scalar(ScalarKind::Int) => {
                self.pop_value(A0, span)?;
                self.asm.syscall(1);
            }
            ValueKind::Scalar(ScalarKind::Float) => {
                self.pop_value(T0, span)?;
                self.asm.fmv_w_x(Fa0, T0);
                self.asm.syscall(2);
            }
            ValueKind::Scalar(ScalarKind::Str) => {
                self.pop_value(A0, span)?;
                self.asm.syscall(4);
            }
            ValueKind::Scalar(ScalarKind::Char) => {
                self.pop_value(A0, span)?;
                self.asm.syscall(11);
            }
            ValueKind::Scalar(ScalarKind::Bool) => {
                let chosen = self.new_label();
                self.pop_value(T0, span)?;
                self.asm.la(A0, "str_true");
                self.asm.bnez(T0, &chosen);
                self.asm.la(A0, "str_false");
                self.asm.label(&chosen);
                self.asm.syscall(4);
            }
            ValueKind::Array(elem) => {
                self.pop_value(A0, span)?;
                self.asm.li(A1, elem.runtime_code());
                self.call_builtin("printArray", span)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Emit code leaving the value of `expr` on top of the stack.
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<ValueKind> {
        trace!(at = %expr.span, "lower expression");
        let span = &expr.span;
        match &expr.kind {
            ExprKind::Literal(lit) => self.lower_literal(lit, span),
            ExprKind::Binary { op, left, right } => {
                if op.class() == BinaryClass::Logical {
                    return self.lower_logical(*op, left, right);
                }
                self.lower_expr(left)?;
                self.lower_expr(right)?;
                self.apply_binary(*op, span)
            }
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, span),
            ExprKind::Grouping(inner) => self.lower_expr(inner),
            ExprKind::Variable(name) => self.load_variable(name, span),
            ExprKind::Assign { name, op, value } => self.lower_assign(name, *op, value, span),
            ExprKind::Increment { name, op } => self.lower_increment(name, *op, span),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.lower_ternary(cond, then_expr, else_expr),
            ExprKind::ArrayLiteral(_) => Err(CodegenErrorKind::Unsupported(
                "array literals outside an array declaration".to_string(),
            )
            .at(span)),
            ExprKind::Index { array, index } => self.lower_index(array, index, span),
            ExprKind::IndexAssign {
                array,
                index,
                op,
                value,
            } => self.lower_index_assign(array, index, *op, value, span),
            ExprKind::IndexOf { array, value } => self.lower_index_of(array, value, span),
            ExprKind::Length { array } => self.lower_length(array, span),
            ExprKind::Join { array } => self.lower_join(array, span),
            ExprKind::Call { callee, args } => self.lower_call(callee, args, span),
        }
    }

    fn lower_literal(&mut self, lit: &Literal, span: &Span) -> Result<ValueKind> {
        let (word, kind) = match lit {
            Literal::Int(n) => (int_word(*n, span)?, ValueKind::INT),
            Literal::Float(n) => {
                self.asm.comment(format!("float {}", n));
                (float_bits(*n), ValueKind::FLOAT)
            }
            Literal::Bool(b) => (i64::from(*b), ValueKind::BOOL),
            Literal::Char(c) => (i64::from(u32::from(*c)), ValueKind::CHAR),
            Literal::Str(raw) => {
                self.push_string(&unescape(raw));
                return Ok(ValueKind::STR);
            }
        };
        self.asm.li(T0, word);
        self.push_value(T0, kind);
        Ok(kind)
    }

    /// Push a copy of variable `name`.
    pub(crate) fn load_variable(&mut self, name: &str, span: &Span) -> Result<ValueKind> {
        let (offset, desc) = self.resolve(name, span)?;
        self.asm.lw(T0, offset, Sp);
        self.asm.push(T0);
        self.stack.push_with_length(desc.kind, desc.length);
        Ok(desc.kind)
    }

    /// Evaluate a condition into `t0`; anything but a bool is a type mismatch.
    pub(crate) fn lower_condition(&mut self, expr: &Expr) -> Result<()> {
        let kind = self.lower_expr(expr)?;
        if kind != ValueKind::BOOL {
            return Err(CodegenErrorKind::mismatch(ValueKind::BOOL, kind).at(&expr.span));
        }
        self.pop_value(T0, &expr.span)?;
        Ok(())
    }

    /// Lower `expr` as a value of `target`. Ints widen to float; a
    /// one-character string literal is accepted as a char.
    pub(crate) fn lower_as(&mut self, expr: &Expr, target: ValueKind) -> Result<()> {
        if target == ValueKind::CHAR {
            if let Some(c) = single_char_literal(expr) {
                self.asm.li(T0, i64::from(u32::from(c)));
                self.push_value(T0, ValueKind::CHAR);
                return Ok(());
            }
        }
        let found = self.lower_expr(expr)?;
        self.convert_top(found, target, &expr.span)
    }

    pub(crate) fn convert_top(&mut self, found: ValueKind, target: ValueKind, span: &Span) -> Result<()> {
        if found == target {
            Ok(())
        } else if found == ValueKind::INT && target == ValueKind::FLOAT {
            self.promote_slot(0);
            Ok(())
        } else {
            Err(CodegenErrorKind::mismatch(target, found).at(span))
        }
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    /// Combine the two topmost slots (left below right) with `op`.
    pub(crate) fn apply_binary(&mut self, op: BinaryOp, span: &Span) -> Result<ValueKind> {
        let right = self.kind_at(0, span)?;
        let left = self.kind_at(1, span)?;
        let unsupported = || {
            CodegenErrorKind::UnsupportedOperator {
                op: op.symbol().to_string(),
                operand: format!("{} and {}", left, right),
            }
            .at(span)
        };

        match op.class() {
            BinaryClass::Arithmetic => {
                if op == BinaryOp::Add && left.is_text() && right.is_text() {
                    self.concat(left, right, span)
                } else if left.is_numeric() && right.is_numeric() {
                    if self.promote_operands(left, right) {
                        self.float_arith(op, span)?;
                        Ok(ValueKind::FLOAT)
                    } else {
                        self.int_arith(op, span)?;
                        Ok(ValueKind::INT)
                    }
                } else {
                    Err(unsupported())
                }
            }
            BinaryClass::Relational => {
                if left == ValueKind::CHAR && right == ValueKind::CHAR {
                    self.int_compare(op, span)
                } else if left.is_numeric() && right.is_numeric() {
                    self.numeric_compare(op, left, right, span)
                } else {
                    Err(unsupported())
                }
            }
            BinaryClass::Equality => match (left, right) {
                (ValueKind::CHAR, ValueKind::CHAR) | (ValueKind::BOOL, ValueKind::BOOL) => {
                    self.int_compare(op, span)
                }
                _ if left.is_text() && right.is_text() => self.string_equality(op, left, right, span),
                _ if left.is_numeric() && right.is_numeric() => {
                    self.numeric_compare(op, left, right, span)
                }
                _ => Err(unsupported()),
            },
            BinaryClass::Logical => Err(unsupported()),
        }
    }

    /// Convert the slot `n` words below the top from int to float in place.
    fn promote_slot(&mut self, n: usize) {
        let offset = n as i64 * WORD;
        self.asm.comment("int -> float");
        self.asm.lw(T0, offset, Sp);
        self.asm.fcvt_s_w(Ft0, T0);
        self.asm.fmv_x_w(T0, Ft0);
        self.asm.sw(T0, offset, Sp);
        if let Some(desc) = self.stack.peek_at_mut(n) {
            desc.kind = ValueKind::FLOAT;
        }
    }

    /// Promote the int side of a mixed pair; true when the operation must
    /// run in floating point.
    fn promote_operands(&mut self, left: ValueKind, right: ValueKind) -> bool {
        match (left, right) {
            (ValueKind::INT, ValueKind::INT) => false,
            (ValueKind::INT, _) => {
                self.promote_slot(1);
                true
            }
            (_, ValueKind::INT) => {
                self.promote_slot(0);
                true
            }
            _ => true,
        }
    }

    fn pop_floats(&mut self, span: &Span) -> Result<()> {
        self.pop_value(T1, span)?;
        self.pop_value(T0, span)?;
        self.asm.fmv_w_x(Ft1, T1);
        self.asm.fmv_w_x(Ft0, T0);
        Ok(())
    }

    fn int_arith(&mut self, op: BinaryOp, span: &Span) -> Result<()> {
        self.pop_value(T1, span)?;
        self.pop_value(T0, span)?;
        match op {
            BinaryOp::Add => self.asm.add(T0, T0, T1),
            BinaryOp::Sub => self.asm.sub(T0, T0, T1),
            BinaryOp::Mul => self.asm.mul(T0, T0, T1),
            _ => {
                self.asm.mv(A0, T1);
                self.call_builtin("checkDivZero", span)?;
                if op == BinaryOp::Div {
                    self.asm.div(T0, T0, T1);
                } else {
                    self.asm.rem(T0, T0, T1);
                }
            }
        }
        self.push_value(T0, ValueKind::INT);
        Ok(())
    }

    fn float_arith(&mut self, op: BinaryOp, span: &Span) -> Result<()> {
        self.pop_floats(span)?;
        match op {
            BinaryOp::Add => self.asm.fop(Opcode::FaddS, Ft0, Ft0, Ft1),
            BinaryOp::Sub => self.asm.fop(Opcode::FsubS, Ft0, Ft0, Ft1),
            BinaryOp::Mul => self.asm.fop(Opcode::FmulS, Ft0, Ft0, Ft1),
            BinaryOp::Div => self.asm.fop(Opcode::FdivS, Ft0, Ft0, Ft1),
            _ => {
                self.asm.comment("a % b = a - trunc(a / b) * b");
                self.asm.fop(Opcode::FdivS, Ft2, Ft0, Ft1);
                self.asm.fcvt_w_s(T2, Ft2);
                self.asm.fcvt_s_w(Ft2, T2);
                self.asm.fop(Opcode::FmulS, Ft2, Ft2, Ft1);
                self.asm.fop(Opcode::FsubS, Ft0, Ft0, Ft2);
            }
        }
        self.asm.fmv_x_w(T0, Ft0);
        self.push_value(T0, ValueKind::FLOAT);
        Ok(())
    }

    fn numeric_compare(
        &mut self,
        op: BinaryOp,
        left: ValueKind,
        right: ValueKind,
        span: &Span,
    ) -> Result<ValueKind> {
        if !self.promote_operands(left, right) {
            return self.int_compare(op, span);
        }
        self.pop_floats(span)?;
        match op {
            BinaryOp::Lt => self.asm.fcmp(Opcode::FltS, T0, Ft0, Ft1),
            BinaryOp::Gt => self.asm.fcmp(Opcode::FltS, T0, Ft1, Ft0),
            BinaryOp::Lte => self.asm.fcmp(Opcode::FleS, T0, Ft0, Ft1),
            BinaryOp::Gte => self.asm.fcmp(Opcode::FleS, T0, Ft1, Ft0),
            BinaryOp::Eq => self.asm.fcmp(Opcode::FeqS, T0, Ft0, Ft1),
            _ => {
                self.asm.fcmp(Opcode::FeqS, T0, Ft0, Ft1);
                self.asm.xori(T0, T0, 1);
            }
        }
        self.push_value(T0, ValueKind::BOOL);
        Ok(ValueKind::BOOL)
    }

    fn int_compare(&mut self, op: BinaryOp, span: &Span) -> Result<ValueKind> {
        self.pop_value(T1, span)?;
        self.pop_value(T0, span)?;
        match op {
            BinaryOp::Lt => self.asm.slt(T0, T0, T1),
            BinaryOp::Gt => self.asm.slt(T0, T1, T0),
            BinaryOp::Lte => {
                self.asm.slt(T0, T1, T0);
                self.asm.xori(T0, T0, 1);
            }
            BinaryOp::Gte => {
                self.asm.slt(T0, T0, T1);
                self.asm.xori(T0, T0, 1);
            }
            BinaryOp::Eq => {
                self.asm.xor(T0, T0, T1);
                self.asm.seqz(T0, T0);
            }
            _ => {
                self.asm.xor(T0, T0, T1);
                self.asm.snez(T0, T0);
            }
        }
        self.push_value(T0, ValueKind::BOOL);
        Ok(ValueKind::BOOL)
    }

    /// Turn char operands into one-character strings in place.
    fn text_operands(&mut self, left: ValueKind, right: ValueKind, span: &Span) -> Result<()> {
        for (n, kind) in [(1, left), (0, right)] {
            if kind == ValueKind::CHAR {
                let offset = n as i64 * WORD;
                self.asm.lw(A0, offset, Sp);
                self.call_builtin("charToString", span)?;
                self.asm.sw(A0, offset, Sp);
                if let Some(desc) = self.stack.peek_at_mut(n) {
                    desc.kind = ValueKind::STR;
                }
            }
        }
        Ok(())
    }

    fn concat(&mut self, left: ValueKind, right: ValueKind, span: &Span) -> Result<ValueKind> {
        self.text_operands(left, right, span)?;
        self.pop_value(A1, span)?;
        self.pop_value(A0, span)?;
        self.call_builtin("concatString", span)?;
        self.push_value(A0, ValueKind::STR);
        Ok(ValueKind::STR)
    }

    fn string_equality(
        &mut self,
        op: BinaryOp,
        left: ValueKind,
        right: ValueKind,
        span: &Span,
    ) -> Result<ValueKind> {
        self.text_operands(left, right, span)?;
        self.pop_value(A1, span)?;
        self.pop_value(A0, span)?;
        self.call_builtin("strEquals", span)?;
        if op == BinaryOp::Neq {
            self.asm.xori(A0, A0, 1);
        }
        self.push_value(A0, ValueKind::BOOL);
        Ok(ValueKind::BOOL)
    }

    /// `&&` and `||` as branch chains; the right side runs only when needed.
    fn lower_logical(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<ValueKind> {
        let decided = self.new_label();
        let end = self.new_label();
        let is_and = op == BinaryOp::And;

        for operand in [left, right] {
            self.lower_condition(operand)?;
            if is_and {
                self.asm.beqz(T0, &decided);
            } else {
                self.asm.bnez(T0, &decided);
            }
        }
        self.asm.li(T0, i64::from(is_and));
        self.asm.j(&end);
        self.asm.label(&decided);
        self.asm.li(T0, i64::from(!is_and));
        self.asm.label(&end);
        self.push_value(T0, ValueKind::BOOL);
        Ok(ValueKind::BOOL)
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, span: &Span) -> Result<ValueKind> {
        let kind = self.lower_expr(operand)?;
        match (op, kind) {
            (UnaryOp::Neg, ValueKind::INT) => {
                self.pop_value(T0, span)?;
                self.asm.neg(T0, T0);
            }
            (UnaryOp::Neg, ValueKind::FLOAT) => {
                self.pop_value(T0, span)?;
                self.asm.fmv_w_x(Ft0, T0);
                self.asm.fneg(Ft0, Ft0);
                self.asm.fmv_x_w(T0, Ft0);
            }
            (UnaryOp::Not, ValueKind::BOOL) => {
                self.pop_value(T0, span)?;
                self.asm.xori(T0, T0, 1);
            }
            _ => {
                return Err(CodegenErrorKind::UnsupportedOperator {
                    op: op.to_string(),
                    operand: kind.to_string(),
                }
                .at(span))
            }
        }
        self.push_value(T0, kind);
        Ok(kind)
    }

    // ------------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------------

    fn lower_assign(&mut self, name: &str, op: AssignOp, value: &Expr, span: &Span) -> Result<ValueKind> {
        let (_, target) = self.resolve(name, span)?;
        if let ValueKind::Array(_) = target.kind {
            return Err(CodegenErrorKind::Unsupported("whole-array assignment".to_string()).at(span));
        }

        match op.binary_op() {
            None => self.lower_as(value, target.kind)?,
            Some(bin) => {
                self.load_variable(name, span)?;
                self.lower_expr(value)?;
                let result = self.apply_binary(bin, span)?;
                self.convert_top(result, target.kind, span)?;
            }
        }
        self.store_top(name, span)?;
        Ok(target.kind)
    }

    /// Copy the top slot into variable `name`, leaving it on the stack as
    /// the value of the assignment.
    fn store_top(&mut self, name: &str, span: &Span) -> Result<()> {
        let (offset, _) = self.resolve(name, span)?;
        self.asm.lw(T0, 0, Sp);
        self.asm.sw(T0, offset, Sp);
        Ok(())
    }

    fn lower_increment(&mut self, name: &str, op: IncrementOp, span: &Span) -> Result<ValueKind> {
        let (offset, desc) = self.resolve(name, span)?;
        match desc.kind {
            ValueKind::INT => {
                self.asm.lw(T0, offset, Sp);
                self.asm.addi(T0, T0, i64::from(op.delta()));
            }
            ValueKind::FLOAT => {
                self.asm.lw(T0, offset, Sp);
                self.asm.fmv_w_x(Ft0, T0);
                self.asm.li(T1, i64::from(op.delta()));
                self.asm.fcvt_s_w(Ft1, T1);
                self.asm.fop(Opcode::FaddS, Ft0, Ft0, Ft1);
                self.asm.fmv_x_w(T0, Ft0);
            }
            other => {
                return Err(CodegenErrorKind::UnsupportedOperator {
                    op: op.symbol().to_string(),
                    operand: other.to_string(),
                }
                .at(span))
            }
        }
        self.asm.sw(T0, offset, Sp);
        self.push_value(T0, desc.kind);
        Ok(desc.kind)
    }

    /// Both arms push exactly one word, so the descriptor of the first is
    /// dropped before the second is lowered.
    fn lower_ternary(&mut self, cond: &Expr, then_expr: &Expr, else_expr: &Expr) -> Result<ValueKind> {
        let otherwise = self.new_label();
        let end = self.new_label();

        self.lower_condition(cond)?;
        self.asm.beqz(T0, &otherwise);
        let then_kind = self.lower_expr(then_expr)?;
        self.stack.pop().map_err(|e| e.at(&then_expr.span))?;
        self.asm.j(&end);
        self.asm.label(&otherwise);
        let else_kind = self.lower_expr(else_expr)?;
        if else_kind != then_kind {
            return Err(CodegenErrorKind::mismatch(then_kind, else_kind).at(&else_expr.span));
        }
        self.asm.label(&end);
        Ok(then_kind)
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], span: &Span) -> Result<ValueKind> {
        let name = match &callee.kind {
            ExprKind::Variable(name) if EMBEDDED.contains(&name.as_str()) => name.as_str(),
            ExprKind::Variable(name) => {
                return Err(CodegenErrorKind::Unsupported(format!(
                    "call to '{}': user-defined functions run only in the evaluator",
                    name
                ))
                .at(span))
            }
            _ => {
                return Err(
                    CodegenErrorKind::Unsupported("calls through computed values".to_string()).at(span),
                )
            }
        };
        if args.len() != 1 {
            return Err(CodegenErrorKind::ArityMismatch {
                name: name.to_string(),
                expected: 1,
                found: args.len(),
            }
            .at(span));
        }

        let arg = &args[0];
        let kind = self.lower_expr(arg)?;
        debug!(name, arg = %kind, "embedded call");
        match name {
            "typeof" => {
                self.discard(span)?;
                self.push_string(&kind.to_string());
                Ok(ValueKind::STR)
            }
            "toString" => {
                let routine = match kind {
                    ValueKind::Scalar(ScalarKind::Int) => "intToString",
                    ValueKind::Scalar(ScalarKind::Float) => "floatToString",
                    ValueKind::Scalar(ScalarKind::Bool) => "boolToString",
                    ValueKind::Scalar(ScalarKind::Char) => "charToString",
                    ValueKind::Scalar(ScalarKind::Str) => return Ok(ValueKind::STR),
                    ValueKind::Array(_) => {
                        return Err(CodegenErrorKind::Unsupported(
                            "toString of an array".to_string(),
                        )
                        .at(span))
                    }
                };
                self.call_unary_builtin(routine, ValueKind::STR, span)
            }
            _ => {
                if kind != ValueKind::STR {
                    return Err(CodegenErrorKind::mismatch(ValueKind::STR, kind).at(&arg.span));
                }
                let (routine, result) = match name {
                    "parseInt" => ("parseInt", ValueKind::INT),
                    "parsefloat" => ("parseFloat", ValueKind::FLOAT),
                    other => (other, ValueKind::STR),
                };
                self.call_unary_builtin(routine, result, span)
            }
        }
    }

    /// Pop the argument into `a0`, call, push the `a0` result.
    fn call_unary_builtin(&mut self, routine: &str, result: ValueKind, span: &Span) -> Result<ValueKind> {
        self.pop_value(A0, span)?;
        self.call_builtin(routine, span)?;
        self.push_value(A0, result);
        Ok(result)
    }
}

/// Little-endian words of `text` plus a NUL terminator, zero padded.
pub(crate) fn pack_words(text: &str) -> Vec<i64> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect()
}

/// The single-precision bit pattern of `value`.
pub(crate) fn float_bits(value: f64) -> i64 {
    i64::from((value as f32).to_bits() as i32)
}

fn single_char_literal(expr: &Expr) -> Option<char> {
    match &expr.kind {
        ExprKind::Literal(Literal::Str(raw)) => {
            let text = unescape(raw);
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
        ExprKind::Grouping(inner) => single_char_literal(inner),
        _ => None,
    }
}

/// An int literal as a machine word; ints are 32 bits wide.
pub(crate) fn int_word(n: i64, span: &Span) -> Result<i64> {
    match i32::try_from(n) {
        Ok(_) => Ok(n),
        Err(_) => Err(CodegenErrorKind::IntegerOutOfRange(n).at(span)),
    }
}
