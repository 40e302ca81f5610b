//! Generator tests over whole programs: output layout, stack discipline
//! and which runtime routines end up in the file.

use oak_common::ast::build::*;
use oak_common::ast::{AssignOp, BinaryOp, Program, TypeName};
use oak_common::manifest::GeneratorConfig;
use oak_common::Stage;
use oak_compiler::codegen::Instruction;
use oak_compiler::{generate, generate_with_config, Assembly, CodeGenerator, CodegenErrorKind};
use pretty_assertions::assert_eq;

fn gen_ok(statements: Vec<oak_common::Stmt>) -> Assembly {
    generate(&program(statements)).unwrap_or_else(|e| panic!("generation failed: {}", e.kind))
}

fn gen_err(statements: Vec<oak_common::Stmt>) -> CodegenErrorKind {
    generate(&program(statements)).unwrap_err().kind
}

/// Net `sp` adjustment of straight-line main code.
fn net_sp(asm: &Assembly) -> i64 {
    asm.instructions
        .iter()
        .map(Instruction::to_string)
        .filter_map(|line| {
            line.trim()
                .strip_prefix("addi sp, sp, ")
                .and_then(|n| n.parse::<i64>().ok())
        })
        .sum()
}

fn main_lines(asm: &Assembly) -> Vec<String> {
    asm.instructions
        .iter()
        .filter(|i| !matches!(i, Instruction::Comment(_)))
        .map(|i| i.to_string().trim().to_string())
        .collect()
}

// =========================================================================
// Layout
// =========================================================================

#[test]
fn file_layout_data_text_exit_runtime() {
    let asm = gen_ok(vec![print(vec![binary(BinaryOp::Div, int(6), int(3))])]);
    let text = asm.to_string();

    assert!(text.starts_with(".data\n"));
    let heap = text.find("heap:").unwrap();
    let main = text.find(".text\n.globl main\nmain:\n    la t6, heap\n").unwrap();
    let exit = text.find("    li a7, 10\n    ecall\n").unwrap();
    let routine = text.find("checkDivZero:").unwrap();
    assert!(heap < main && main < exit && exit < routine);
}

#[test]
fn builtins_are_emitted_only_when_used() {
    let asm = gen_ok(vec![
        decl(TypeName::Int, "x", int(5)),
        print(vec![var("x")]),
    ]);
    assert!(asm.used_builtins.is_empty());
    assert!(asm.runtime.is_empty());
    assert!(!asm.to_string().contains("strEquals:"));
}

#[test]
fn each_builtin_is_emitted_once() {
    let asm = gen_ok(vec![
        print(vec![binary(BinaryOp::Div, int(8), int(2))]),
        print(vec![binary(BinaryOp::Mod, int(8), int(3))]),
        print(vec![binary(BinaryOp::Add, string("a"), string("b"))]),
    ]);
    assert_eq!(asm.used_builtins, vec!["checkDivZero", "concatString"]);
    let text = asm.to_string();
    assert_eq!(text.matches("checkDivZero:").count(), 1);
    assert_eq!(text.matches("jal checkDivZero").count(), 2);
}

#[test]
fn join_pulls_in_its_helpers() {
    let asm = gen_ok(vec![
        vector(TypeName::Float, "v", vec![float(1.5), int(2)]),
        print(vec![join("v")]),
    ]);
    assert!(asm.uses("arrayJoin"));
    assert!(asm.uses("concatString"));
    assert!(asm.uses("floatToString"));
    assert!(asm.to_string().contains("arr_0: .word 2\n    .space 8\n"));
}

#[test]
fn comments_can_be_disabled() {
    let statements = vec![
        decl(TypeName::Float, "f", int(1)),
        print(vec![string("hi")]),
    ];
    let quiet = GeneratorConfig {
        comments: false,
        ..GeneratorConfig::default()
    };
    let asm = generate_with_config(&program(statements.clone()), quiet).unwrap();
    assert!(!asm.to_string().lines().any(|l| l.trim_start().starts_with('#')));

    let verbose = generate(&program(statements)).unwrap();
    assert!(verbose.to_string().lines().any(|l| l.trim_start().starts_with('#')));
}

// =========================================================================
// Stack discipline
// =========================================================================

#[test]
fn straight_line_code_leaves_sp_where_it_started() {
    let asm = gen_ok(vec![
        decl(TypeName::Int, "a", int(2)),
        decl(TypeName::Float, "b", binary(BinaryOp::Mul, var("a"), float(1.5))),
        decl(TypeName::String, "s", binary(BinaryOp::Add, string("x"), ch('y'))),
        expr_stmt(assign_op("a", AssignOp::AddAssign, int(3))),
        block(vec![decl(TypeName::Bool, "t", boolean(true)), print(vec![var("t")])]),
        print(vec![var("a"), var("b"), var("s")]),
    ]);
    assert_eq!(net_sp(&asm), 0);
}

#[test]
fn shadow_stack_is_balanced_after_loops_with_early_exits() {
    let mut gen = CodeGenerator::new();
    gen.lower_program(&program(vec![
        decl(TypeName::Int, "total", int(0)),
        for_(
            Some(decl(TypeName::Int, "i", int(0))),
            Some(binary(BinaryOp::Lt, var("i"), int(10))),
            Some(inc("i")),
            block(vec![
                decl(TypeName::Int, "sq", binary(BinaryOp::Mul, var("i"), var("i"))),
                if_(
                    binary(BinaryOp::Gt, var("sq"), int(20)),
                    break_(),
                    None,
                ),
                if_(
                    binary(BinaryOp::Eq, binary(BinaryOp::Mod, var("i"), int(2)), int(0)),
                    continue_(),
                    None,
                ),
                expr_stmt(assign_op("total", AssignOp::AddAssign, var("sq"))),
            ]),
        ),
        while_(
            binary(BinaryOp::Gt, var("total"), int(0)),
            block(vec![
                decl(TypeName::Int, "step", int(1)),
                expr_stmt(assign_op("total", AssignOp::SubAssign, var("step"))),
            ]),
        ),
    ]))
    .unwrap();

    let stack = gen.shadow_stack();
    assert_eq!(stack.depth(), 0);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.resolve("total").unwrap().0, 0);
}

#[test]
fn early_exit_releases_exactly_the_inner_slots() {
    let asm = gen_ok(vec![while_(
        boolean(true),
        block(vec![
            decl(TypeName::Int, "a", int(1)),
            decl(TypeName::Int, "b", int(2)),
            decl(TypeName::Int, "c", int(3)),
            break_(),
        ]),
    )]);
    let lines = main_lines(&asm);
    let jump = lines.iter().position(|l| l == "j L1").unwrap();
    assert_eq!(lines[jump - 1], "addi sp, sp, 12");
}

// =========================================================================
// Arrays
// =========================================================================

#[test]
fn every_index_is_bounds_checked() {
    let asm = gen_ok(vec![
        vector(TypeName::Int, "v", vec![int(1), int(2), int(3)]),
        expr_stmt(index_assign("v", int(0), AssignOp::Assign, int(9))),
        print(vec![index("v", int(2))]),
        for_each(TypeName::Int, "x", "v", print(vec![var("x")])),
    ]);
    assert_eq!(asm.to_string().matches("jal checkBounds").count(), 2);
    assert!(asm.uses("checkBounds"));
}

// =========================================================================
// Errors
// =========================================================================

#[test]
fn user_functions_are_rejected_with_a_clear_error() {
    let err = generate(&program(vec![
        func(TypeName::Int, "twice", vec![param(TypeName::Int, "n")], vec![ret(Some(
            binary(BinaryOp::Mul, var("n"), int(2)),
        ))]),
    ]))
    .unwrap_err();
    assert!(matches!(err.kind, CodegenErrorKind::Unsupported(_)));
    let diag = err.to_diagnostic();
    assert_eq!(diag.stage, Stage::Generation);

    assert!(matches!(
        gen_err(vec![print(vec![call("twice", vec![int(2)])])]),
        CodegenErrorKind::Unsupported(_)
    ));
}

#[test]
fn generation_stops_at_the_first_error() {
    let err = gen_err(vec![
        print(vec![var("missing")]),
        break_(),
    ]);
    assert_eq!(err, CodegenErrorKind::UnresolvedVariable("missing".to_string()));
}

#[test]
fn embedded_calls_use_runtime_routines() {
    let asm = gen_ok(vec![
        decl(TypeName::Int, "n", call("parseInt", vec![string("42")])),
        decl(TypeName::String, "s", call("toString", vec![var("n")])),
        print(vec![call("toUpperCase", vec![var("s")]), call("typeof", vec![var("n")])]),
    ]);
    assert_eq!(asm.used_builtins, vec!["parseInt", "intToString", "toUpperCase"]);
}

#[test]
fn program_from_json() {
    let json = r#"{
        "statements": [
            { "kind": { "var_decl": {
                "ty": "char", "name": "c",
                "init": { "kind": { "literal": { "char": "b" } } } } } },
            { "kind": { "switch": {
                "scrutinee": { "kind": { "variable": "c" } },
                "cases": [
                    { "value": { "kind": { "literal": { "char": "a" } } },
                      "body": [ { "kind": { "print": [ { "kind": { "literal": { "int": 1 } } } ] } } ] },
                    { "value": { "kind": { "literal": { "char": "b" } } },
                      "body": [ { "kind": "break" } ] }
                ],
                "default": null
            } } }
        ]
    }"#;
    let program: Program = serde_json::from_str(json).unwrap();
    let asm = generate(&program).unwrap();
    let lines = main_lines(&asm);
    assert!(lines.contains(&"li t1, 98".to_string()));
    assert!(lines.contains(&"beq t0, t1, L2".to_string()));
    assert_eq!(net_sp(&asm), 0);
}
