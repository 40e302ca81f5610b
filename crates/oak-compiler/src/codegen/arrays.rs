//! Array declarations and element access.
//!
//! An array is a length word followed by its elements; the variable's slot
//! holds the address of element 0. Arrays whose length is known here live in
//! static `arr_N` regions, the rest are carved from the heap.

use oak_common::ast::{AssignOp, Expr, ExprKind, Literal, VectorDecl, VectorInit};
use oak_common::{Span, TypeName};
use tracing::debug;

use super::asm::Register;
use super::emitter::{int_word, CodeGenerator};
use super::error::{CodegenErrorKind, Result};
use super::shadow_stack::{ScalarKind, ValueKind, WORD};

use Register::*;

impl CodeGenerator {
    pub(crate) fn lower_vector_decl(&mut self, decl: &VectorDecl, span: &Span) -> Result<()> {
        if self.stack.declared_in_current_scope(&decl.name) {
            return Err(CodegenErrorKind::Redeclared(decl.name.clone()).at(span));
        }
        if decl.dims != 1 {
            return Err(CodegenErrorKind::Unsupported(format!(
                "'{}': multi-dimensional arrays",
                decl.name
            ))
            .at(span));
        }
        let declared = ScalarKind::from_type_name(decl.elem_ty);
        if declared.is_none() && decl.elem_ty != TypeName::Var {
            return Err(CodegenErrorKind::mismatch("an element type", decl.elem_ty).at(span));
        }
        debug!(name = %decl.name, "array declaration");

        match &decl.init {
            VectorInit::Values(items) => self.array_from_values(declared, items, span)?,
            VectorInit::Sized(length) => {
                let elem = declared
                    .ok_or_else(|| CodegenErrorKind::mismatch("an element type", "var").at(span))?;
                self.sized_array(elem, length, span)?;
            }
            VectorInit::CopyOf(source) => self.copied_array(declared, source, span)?,
        }
        self.stack.tag_top(&decl.name).map_err(|e| e.at(span))
    }

    /// Elements are evaluated onto the stack first, then stored into the
    /// region last to first. With `var` the first element fixes the kind.
    fn array_from_values(
        &mut self,
        declared: Option<ScalarKind>,
        items: &[Expr],
        span: &Span,
    ) -> Result<()> {
        let mut elem = declared;
        for item in items {
            if matches!(item.kind, ExprKind::ArrayLiteral(_)) {
                return Err(CodegenErrorKind::Unsupported("nested arrays".to_string()).at(&item.span));
            }
            match elem {
                Some(kind) => self.lower_as(item, ValueKind::Scalar(kind))?,
                None => {
                    let kind = self.lower_expr(item)?;
                    elem = Some(kind.scalar().ok_or_else(|| {
                        CodegenErrorKind::Unsupported("nested arrays".to_string()).at(&item.span)
                    })?);
                }
            }
        }
        let elem = elem
            .ok_or_else(|| CodegenErrorKind::mismatch("an element type", "an empty list").at(span))?;

        let label = self.data.allocate_array(items.len());
        self.asm.la(T0, &label);
        self.asm.addi(T0, T0, WORD);
        for i in (0..items.len()).rev() {
            self.pop_value(T1, span)?;
            self.asm.sw(T1, i as i64 * WORD, T0);
        }
        self.push_array(elem, Some(items.len()));
        Ok(())
    }

    fn sized_array(&mut self, elem: ScalarKind, length: &Expr, span: &Span) -> Result<()> {
        match literal_length(length) {
            Some(n) if n < 0 => Err(CodegenErrorKind::Unsupported(format!(
                "negative array length {}",
                n
            ))
            .at(&length.span)),
            Some(n) => {
                int_word(n, &length.span)?;
                let n = n as usize;
                let label = self.data.allocate_array(n);
                self.asm.la(T0, &label);
                self.asm.addi(T0, T0, WORD);
                self.load_zero(T1, elem);
                if self.unrolled(n) {
                    for i in 0..n {
                        self.asm.sw(T1, i as i64 * WORD, T0);
                    }
                } else {
                    self.asm.li(T2, n as i64);
                    self.fill_loop();
                }
                self.push_array(elem, Some(n));
                Ok(())
            }
            None => {
                self.lower_as(length, ValueKind::INT)?;
                self.pop_value(T2, span)?;
                self.heap_array();
                self.load_zero(T1, elem);
                self.fill_loop();
                self.push_array(elem, None);
                Ok(())
            }
        }
    }

    fn copied_array(&mut self, declared: Option<ScalarKind>, source: &str, span: &Span) -> Result<()> {
        let elem = self.array_elem(source, span)?;
        if let Some(kind) = declared {
            if kind != elem {
                return Err(CodegenErrorKind::mismatch(
                    ValueKind::Array(kind),
                    ValueKind::Array(elem),
                )
                .at(span));
            }
        }
        let (offset, desc) = self.resolve(source, span)?;
        self.asm.lw(T1, offset, Sp);
        match desc.length {
            Some(n) => {
                let label = self.data.allocate_array(n);
                self.asm.la(T0, &label);
                self.asm.addi(T0, T0, WORD);
                if self.unrolled(n) {
                    for i in 0..n {
                        let at = i as i64 * WORD;
                        self.asm.lw(T2, at, T1);
                        self.asm.sw(T2, at, T0);
                    }
                } else {
                    self.asm.li(T2, n as i64);
                    self.copy_loop();
                }
                self.push_array(elem, Some(n));
            }
            None => {
                self.asm.lw(T2, -WORD, T1);
                self.heap_array();
                self.copy_loop();
                self.push_array(elem, None);
            }
        }
        Ok(())
    }

    fn unrolled(&self, length: usize) -> bool {
        length <= self.config.unroll_limit as usize
    }

    fn push_array(&mut self, elem: ScalarKind, length: Option<usize>) {
        self.asm.push(T0);
        self.stack.push_with_length(ValueKind::Array(elem), length);
    }

    /// `t2` = length; leaves element 0 of a fresh heap region in `t0` with
    /// the header written. Clobbers `t3`.
    fn heap_array(&mut self) {
        self.asm.sw(T2, 0, Register::HP);
        self.asm.addi(T0, Register::HP, WORD);
        self.asm.slli(T3, T2, 2);
        self.asm.add(Register::HP, T0, T3);
    }

    /// Store `t1` into `t2` words starting at `t0`.
    fn fill_loop(&mut self) {
        let top = self.new_label();
        let done = self.new_label();
        self.asm.mv(T3, T0);
        self.asm.li(T4, 0);
        self.asm.label(&top);
        self.asm.bge(T4, T2, &done);
        self.asm.sw(T1, 0, T3);
        self.asm.addi(T3, T3, WORD);
        self.asm.addi(T4, T4, 1);
        self.asm.j(&top);
        self.asm.label(&done);
    }

    /// Copy `t2` words from `t1` to `t0`.
    fn copy_loop(&mut self) {
        let top = self.new_label();
        let done = self.new_label();
        self.asm.li(T4, 0);
        self.asm.label(&top);
        self.asm.bge(T4, T2, &done);
        self.asm.slli(T3, T4, 2);
        self.asm.add(T5, T1, T3);
        self.asm.lw(T5, 0, T5);
        self.asm.add(T3, T0, T3);
        self.asm.sw(T5, 0, T3);
        self.asm.addi(T4, T4, 1);
        self.asm.j(&top);
        self.asm.label(&done);
    }

    // ------------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------------

    pub(crate) fn array_elem(&self, name: &str, span: &Span) -> Result<ScalarKind> {
        let (_, desc) = self.resolve(name, span)?;
        match desc.kind {
            ValueKind::Array(elem) => Ok(elem),
            ValueKind::Scalar(_) => Err(CodegenErrorKind::NotAnArray(name.to_string()).at(span)),
        }
    }

    /// Bounds-check the index in `t0` and turn it into the element's
    /// address. Uses `t1`, `a0` and `a1`.
    fn element_address(&mut self, array: &str, span: &Span) -> Result<()> {
        let (offset, _) = self.resolve(array, span)?;
        self.asm.lw(T1, offset, Sp);
        self.asm.mv(A0, T0);
        self.asm.lw(A1, -WORD, T1);
        self.call_builtin("checkBounds", span)?;
        self.asm.slli(T0, T0, 2);
        self.asm.add(T0, T1, T0);
        Ok(())
    }

    pub(crate) fn lower_index(&mut self, array: &str, index: &Expr, span: &Span) -> Result<ValueKind> {
        let elem = self.array_elem(array, span)?;
        self.lower_as(index, ValueKind::INT)?;
        self.pop_value(T0, span)?;
        self.element_address(array, span)?;
        self.asm.lw(T0, 0, T0);
        self.push_value(T0, ValueKind::Scalar(elem));
        Ok(ValueKind::Scalar(elem))
    }

    /// Leaves the stored value on the stack.
    pub(crate) fn lower_index_assign(
        &mut self,
        array: &str,
        index: &Expr,
        op: AssignOp,
        value: &Expr,
        span: &Span,
    ) -> Result<ValueKind> {
        let target = ValueKind::Scalar(self.array_elem(array, span)?);
        self.lower_as(index, ValueKind::INT)?;
        match op.binary_op() {
            None => self.lower_as(value, target)?,
            Some(bin) => {
                self.asm.lw(T0, 0, Sp);
                self.element_address(array, span)?;
                self.asm.lw(T0, 0, T0);
                self.push_value(T0, target);
                self.lower_expr(value)?;
                let result = self.apply_binary(bin, span)?;
                self.convert_top(result, target, span)?;
            }
        }
        // [index, value]
        self.asm.lw(T2, 0, Sp);
        self.asm.lw(T0, WORD, Sp);
        self.element_address(array, span)?;
        self.asm.sw(T2, 0, T0);
        self.asm.sw(T2, WORD, Sp);
        self.discard(span)?;
        if let Some(top) = self.stack.peek_at_mut(0) {
            top.kind = target;
        }
        Ok(target)
    }

    pub(crate) fn lower_index_of(&mut self, array: &str, value: &Expr, span: &Span) -> Result<ValueKind> {
        let elem = self.array_elem(array, span)?;
        self.lower_as(value, ValueKind::Scalar(elem))?;
        self.pop_value(A1, span)?;
        let (offset, _) = self.resolve(array, span)?;
        self.asm.lw(A0, offset, Sp);
        self.asm.li(A2, elem.runtime_code());
        self.call_builtin("arrayIndexOf", span)?;
        self.push_value(A0, ValueKind::INT);
        Ok(ValueKind::INT)
    }

    pub(crate) fn lower_length(&mut self, array: &str, span: &Span) -> Result<ValueKind> {
        self.array_elem(array, span)?;
        let (offset, _) = self.resolve(array, span)?;
        self.asm.lw(T0, offset, Sp);
        self.asm.lw(T0, -WORD, T0);
        self.push_value(T0, ValueKind::INT);
        Ok(ValueKind::INT)
    }

    pub(crate) fn lower_join(&mut self, array: &str, span: &Span) -> Result<ValueKind> {
        let elem = self.array_elem(array, span)?;
        let (offset, _) = self.resolve(array, span)?;
        self.asm.lw(A0, offset, Sp);
        self.asm.li(A1, elem.runtime_code());
        self.call_builtin("arrayJoin", span)?;
        self.push_value(A0, ValueKind::STR);
        Ok(ValueKind::STR)
    }
}

/// An integer literal length, seen through grouping.
fn literal_length(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(n)) => Some(*n),
        ExprKind::Grouping(inner) => literal_length(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use oak_common::ast::build::*;
    use oak_common::ast::{AssignOp, TypeName};
    use oak_common::manifest::GeneratorConfig;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::codegen::asm::Instruction;

    fn lower_with(config: GeneratorConfig, statements: Vec<oak_common::Stmt>) -> CodeGenerator {
        let mut gen = CodeGenerator::with_config(config);
        gen.lower_program(&program(statements)).unwrap();
        gen
    }

    fn lower(statements: Vec<oak_common::Stmt>) -> CodeGenerator {
        lower_with(GeneratorConfig::default(), statements)
    }

    fn lines(gen: &CodeGenerator) -> Vec<String> {
        gen.assembler()
            .instructions()
            .iter()
            .filter(|i| !matches!(i, Instruction::Comment(_)))
            .map(|i| i.to_string().trim().to_string())
            .collect()
    }

    fn lower_err(statements: Vec<oak_common::Stmt>) -> CodegenErrorKind {
        let mut gen = CodeGenerator::new();
        gen.lower_program(&program(statements)).unwrap_err().kind
    }

    #[test]
    fn value_list_fills_a_static_region() {
        let gen = lower(vec![vector(TypeName::Int, "v", vec![int(7), int(8), int(9)])]);
        assert_eq!(gen.data.arrays()[0].length, 3);
        let text = lines(&gen);
        assert!(text.contains(&"la t0, arr_0".to_string()));
        assert!(text.contains(&"sw t1, 8(t0)".to_string()));
        assert!(text.contains(&"sw t1, 0(t0)".to_string()));
        let (_, desc) = gen.shadow_stack().resolve("v").unwrap();
        assert_eq!(desc.kind, ValueKind::Array(ScalarKind::Int));
        assert_eq!(desc.length, Some(3));
        assert_eq!(gen.shadow_stack().len(), 1);
    }

    #[test]
    fn var_infers_the_element_kind() {
        let gen = lower(vec![vector(TypeName::Var, "v", vec![string("a"), string("b")])]);
        let (_, desc) = gen.shadow_stack().resolve("v").unwrap();
        assert_eq!(desc.kind, ValueKind::Array(ScalarKind::Str));

        assert!(matches!(
            lower_err(vec![vector(TypeName::Var, "e", vec![])]),
            CodegenErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn float_array_widens_int_elements() {
        let gen = lower(vec![vector(TypeName::Float, "f", vec![int(1), float(2.5)])]);
        assert!(gen
            .assembler()
            .instructions()
            .iter()
            .any(|i| i.opcode() == Some(crate::codegen::asm::Opcode::FcvtSW)));
    }

    #[test]
    fn literal_sized_array_is_unrolled_up_to_the_limit() {
        let gen = lower(vec![vector_sized(TypeName::Int, "small", int(3))]);
        let text = lines(&gen);
        assert_eq!(text.iter().filter(|l| l.starts_with("sw t1,")).count(), 3);
        assert!(!text.iter().any(|l| l.starts_with("bge")));

        let config = GeneratorConfig {
            unroll_limit: 2,
            ..GeneratorConfig::default()
        };
        let gen = lower_with(config, vec![vector_sized(TypeName::Int, "big", int(3))]);
        let text = lines(&gen);
        assert!(text.contains(&"li t2, 3".to_string()));
        assert!(text.contains(&"bge t4, t2, L1".to_string()));
    }

    #[test]
    fn computed_length_comes_from_the_heap() {
        let gen = lower(vec![
            decl(TypeName::Int, "n", int(4)),
            vector_sized(TypeName::String, "names", var("n")),
        ]);
        let text = lines(&gen);
        assert!(text.contains(&"sw t2, 0(t6)".to_string()));
        assert!(text.contains(&"la t1, str_empty".to_string()));
        assert!(gen.data.arrays().is_empty());
        assert_eq!(gen.shadow_stack().resolve("names").unwrap().1.length, None);
    }

    #[test]
    fn copy_of_known_length_is_static() {
        let gen = lower(vec![
            vector(TypeName::Char, "a", vec![ch('x'), ch('y')]),
            vector_copy(TypeName::Char, "b", "a"),
        ]);
        assert_eq!(gen.data.arrays().len(), 2);
        let text = lines(&gen);
        assert!(text.contains(&"lw t2, 4(t1)".to_string()));
        assert!(text.contains(&"sw t2, 4(t0)".to_string()));
        assert_eq!(gen.shadow_stack().resolve("b").unwrap().1.length, Some(2));
    }

    #[test]
    fn copy_checks_source_and_kind() {
        assert_eq!(
            lower_err(vec![
                decl(TypeName::Int, "x", int(1)),
                vector_copy(TypeName::Int, "y", "x"),
            ]),
            CodegenErrorKind::NotAnArray("x".to_string())
        );
        assert!(matches!(
            lower_err(vec![
                vector(TypeName::Int, "a", vec![int(1)]),
                vector_copy(TypeName::Float, "b", "a"),
            ]),
            CodegenErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn multi_dimensional_and_nested_arrays_are_unsupported() {
        let decl = vector_decl(TypeName::Int, 2, "m", VectorInit::Values(vec![]));
        assert!(matches!(lower_err(vec![decl]), CodegenErrorKind::Unsupported(_)));
        assert!(matches!(
            lower_err(vec![vector(TypeName::Int, "n", vec![array_lit(vec![int(1)])])]),
            CodegenErrorKind::Unsupported(_)
        ));
    }

    #[test]
    fn indexing_is_bounds_checked() {
        let gen = lower(vec![
            vector(TypeName::Int, "v", vec![int(1), int(2)]),
            print(vec![index("v", int(1))]),
        ]);
        let text = lines(&gen);
        let check = text.iter().position(|l| l == "jal checkBounds").unwrap();
        assert_eq!(text[check - 1], "lw a1, -4(t1)");
        assert_eq!(text[check + 1], "slli t0, t0, 2");
        assert!(gen.builtins.contains("checkBounds"));
    }

    #[test]
    fn index_assignment_leaves_the_value() {
        let gen = lower(vec![
            vector(TypeName::Int, "v", vec![int(1), int(2)]),
            expr_stmt(index_assign("v", int(0), AssignOp::AddAssign, int(5))),
        ]);
        assert_eq!(gen.shadow_stack().len(), 1);
        let text = lines(&gen);
        assert_eq!(text.iter().filter(|l| *l == "jal checkBounds").count(), 2);
        assert!(text.contains(&"sw t2, 0(t0)".to_string()));
    }

    #[test]
    fn index_of_length_and_join() {
        let gen = lower(vec![
            vector(TypeName::Bool, "flags", vec![boolean(true)]),
            print(vec![index_of("flags", boolean(true))]),
            print(vec![length("flags")]),
            print(vec![join("flags")]),
        ]);
        let text = lines(&gen);
        assert!(text.contains(&"li a2, 3".to_string()));
        assert!(text.contains(&"lw t0, -4(t0)".to_string()));
        assert!(text.contains(&"li a1, 3".to_string()));
        assert!(gen.builtins.contains("arrayIndexOf"));
        assert!(gen.builtins.contains("arrayJoin"));
        assert!(gen.builtins.contains("strEquals"));
    }

    #[test]
    fn scalar_is_not_an_array() {
        assert_eq!(
            lower_err(vec![
                decl(TypeName::Int, "x", int(1)),
                print(vec![length("x")]),
            ]),
            CodegenErrorKind::NotAnArray("x".to_string())
        );
    }
}
