//! End-to-end tests: build or deserialize a tree, evaluate it, check the output.

use oak_common::ast::build::*;
use oak_common::ast::{AssignOp, BinaryOp, Program, TypeName, VectorInit};
use oak_common::manifest::EvaluatorConfig;
use oak_runtime::{evaluate, evaluate_with_config, Evaluation, Interpreter, Kind, Value};
use pretty_assertions::assert_eq;

fn run_ok(statements: Vec<oak_common::Stmt>) -> String {
    let eval = evaluate(&program(statements));
    assert!(
        !eval.has_errors(),
        "unexpected diagnostics: {:?}",
        eval.diagnostics
    );
    eval.output
}

// =========================================================================
// Example scenarios
// =========================================================================

#[test]
fn e2e_integer_sum() {
    let out = run_ok(vec![
        decl(TypeName::Int, "x", int(5)),
        decl(TypeName::Int, "y", int(3)),
        print(vec![binary(BinaryOp::Add, var("x"), var("y"))]),
    ]);
    assert_eq!(out, "8");
}

#[test]
fn e2e_string_concatenation() {
    let out = run_ok(vec![
        decl(
            TypeName::String,
            "s",
            binary(BinaryOp::Add, string("he"), string("llo")),
        ),
        print(vec![var("s")]),
    ]);
    assert_eq!(out, "hello");
}

#[test]
fn e2e_float_stays_float() {
    let mut interp = Interpreter::new();
    let eval = interp.run(&program(vec![
        decl(TypeName::Float, "f", int(1)),
        expr_stmt(assign("f", binary(BinaryOp::Add, var("f"), float(1.5)))),
        print(vec![var("f")]),
    ]));
    assert!(!eval.has_errors(), "{:?}", eval.diagnostics);
    assert_eq!(eval.output, "2.5");
    let binding = interp.environment().get("f").unwrap();
    assert_eq!(binding.kind, Kind::Float);
    assert_eq!(binding.value, Value::Float(2.5));
}

#[test]
fn e2e_mixed_arithmetic_promotes() {
    let out = run_ok(vec![print(vec![binary(
        BinaryOp::Eq,
        binary(BinaryOp::Add, int(3), float(2.5)),
        float(5.5),
    )])]);
    assert_eq!(out, "true");
}

// =========================================================================
// Tree from JSON
// =========================================================================

#[test]
fn e2e_program_from_json() {
    let json = r#"{
        "statements": [
            { "kind": { "vector_decl": {
                "elem_ty": "int", "name": "v",
                "init": { "values": [
                    { "kind": { "literal": { "int": 3 } } },
                    { "kind": { "literal": { "int": 1 } } },
                    { "kind": { "literal": { "int": 2 } } }
                ] } } } },
            { "kind": { "for_each": {
                "elem_ty": "var", "name": "n", "iterable": "v",
                "body": { "kind": { "print": [
                    { "kind": { "binary": {
                        "op": "*",
                        "left": { "kind": { "variable": "n" } },
                        "right": { "kind": { "literal": { "int": 10 } } }
                    } } }
                ] } }
            } } },
            { "kind": { "print": [
                { "kind": { "join": { "array": "v" } } },
                { "kind": { "length": { "array": "v" } } }
            ] } }
        ]
    }"#;
    let program: Program = serde_json::from_str(json).unwrap();
    let eval = evaluate(&program);
    assert!(!eval.has_errors(), "{:?}", eval.diagnostics);
    assert_eq!(eval.output, "30\n10\n20\n3,1,2 3");
}

#[test]
fn e2e_diagnostic_points_at_source() {
    let json = r#"{
        "statements": [
            { "kind": { "print": [ { "kind": { "variable": "ghost" },
              "span": { "file": "main.oak",
                        "start": { "line": 2, "column": 7, "offset": 12 },
                        "end": { "line": 2, "column": 12, "offset": 17 } } } ] } },
            { "kind": { "print": [ { "kind": { "literal": { "str": "after" } } } ] } }
        ]
    }"#;
    let program: Program = serde_json::from_str(json).unwrap();
    let eval = evaluate(&program);
    assert_eq!(eval.diagnostics.len(), 1);
    let diag = &eval.diagnostics[0];
    assert_eq!(diag.message, "variable 'ghost' is not declared");
    assert_eq!(diag.span.to_string(), "main.oak:2:7");
    assert_eq!(eval.output, "after");
}

// =========================================================================
// Control flow
// =========================================================================

#[test]
fn e2e_nested_loops_continue_and_break() {
    // prints pairs (i, j) with j < i, skipping j == 1, stopping the inner loop at 3
    let out = run_ok(vec![for_(
        Some(decl(TypeName::Int, "i", int(0))),
        Some(binary(BinaryOp::Lt, var("i"), int(5))),
        Some(inc("i")),
        block(vec![for_(
            Some(decl(TypeName::Int, "j", int(0))),
            Some(binary(BinaryOp::Lt, var("j"), var("i"))),
            Some(inc("j")),
            block(vec![
                if_(binary(BinaryOp::Eq, var("j"), int(1)), continue_(), None),
                if_(binary(BinaryOp::Eq, var("j"), int(3)), break_(), None),
                print(vec![var("i"), var("j")]),
            ]),
        )]),
    )]);
    assert_eq!(out, "1 0\n2 0\n3 0\n3 2\n4 0\n4 2");
}

#[test]
fn e2e_while_with_compound_assignment() {
    let out = run_ok(vec![
        decl(TypeName::Int, "n", int(10)),
        decl(TypeName::Int, "steps", int(0)),
        while_(
            binary(BinaryOp::Gt, var("n"), int(0)),
            block(vec![
                expr_stmt(assign_op("n", AssignOp::SubAssign, int(3))),
                expr_stmt(inc("steps")),
            ]),
        ),
        print(vec![var("n"), var("steps")]),
    ]);
    assert_eq!(out, "-2 4");
}

#[test]
fn e2e_string_switch_with_default() {
    let out = run_ok(vec![
        decl(TypeName::String, "cmd", string("stop")),
        switch(
            var("cmd"),
            vec![
                case(string("go"), vec![print(vec![string("going")]), break_()]),
                case(string("stop"), vec![print(vec![string("stopping")])]),
            ],
            Some(vec![print(vec![string("done")])]),
        ),
    ]);
    assert_eq!(out, "stopping\ndone");
}

#[test]
fn e2e_environment_depth_restored_after_every_exit() {
    let mut interp = Interpreter::new();
    let eval = interp.run(&program(vec![
        func(
            TypeName::Int,
            "find",
            vec![param(TypeName::Int, "target")],
            vec![
                vector(TypeName::Int, "xs", vec![int(4), int(8), int(15)]),
                for_each(
                    TypeName::Int,
                    "x",
                    "xs",
                    block(vec![if_(
                        binary(BinaryOp::Eq, var("x"), var("target")),
                        block(vec![ret(Some(var("x")))]),
                        None,
                    )]),
                ),
                ret(Some(int(-1))),
            ],
        ),
        print(vec![call("find", vec![int(8)]), call("find", vec![int(3)])]),
        while_(boolean(true), block(vec![block(vec![break_()])])),
    ]));
    assert!(!eval.has_errors(), "{:?}", eval.diagnostics);
    assert_eq!(eval.output, "8 -1");
    assert_eq!(interp.environment().depth(), 0);
}

// =========================================================================
// Arrays
// =========================================================================

#[test]
fn e2e_array_copy_independence() {
    let out = run_ok(vec![
        vector(TypeName::String, "a", vec![string("x"), string("y")]),
        vector_copy(TypeName::String, "b", "a"),
        expr_stmt(index_assign("a", int(1), AssignOp::Assign, string("z"))),
        print(vec![var("a"), var("b")]),
    ]);
    assert_eq!(out, "[x, z] [x, y]");
}

#[test]
fn e2e_printed_nested_array_reparses() {
    let eval = evaluate(&program(vec![
        vector_decl(
            TypeName::Int,
            2,
            "m",
            VectorInit::Values(vec![
                array_lit(vec![int(1), int(2), int(3)]),
                array_lit(vec![int(4)]),
                array_lit(vec![]),
            ]),
        ),
        print(vec![var("m")]),
    ]));
    assert!(!eval.has_errors(), "{:?}", eval.diagnostics);
    assert_eq!(eval.output, "[[1, 2, 3], [4], []]");

    let reparsed: Vec<Vec<i64>> = serde_json::from_str(&eval.output).unwrap();
    assert_eq!(reparsed, vec![vec![1, 2, 3], vec![4], vec![]]);
}

// =========================================================================
// Diagnostics and recovery
// =========================================================================

#[test]
fn e2e_errors_do_not_stop_later_statements() {
    let eval: Evaluation = evaluate(&program(vec![
        print(vec![binary(BinaryOp::Div, int(1), int(0))]),
        decl(TypeName::Bool, "flag", int(1)),
        print(vec![string("still running")]),
    ]));
    assert_eq!(eval.diagnostics.len(), 2);
    assert_eq!(eval.diagnostics[0].message, "division by zero");
    assert_eq!(
        eval.diagnostics[1].message,
        "type mismatch: expected bool, found int"
    );
    assert_eq!(eval.output, "still running");
}

#[test]
fn e2e_abort_on_error_config() {
    let config = EvaluatorConfig {
        abort_on_error: true,
        ..EvaluatorConfig::default()
    };
    let eval = evaluate_with_config(
        &program(vec![
            print(vec![string("before")]),
            expr_stmt(call("nope", vec![])),
            print(vec![string("after")]),
        ]),
        config,
    );
    assert_eq!(eval.diagnostics.len(), 1);
    assert_eq!(eval.output, "before");
}

#[test]
fn e2e_huge_sized_array_is_a_recoverable_error() {
    let mut interpreter = Interpreter::new();
    let eval = interpreter.run(&program(vec![
        vector_sized(TypeName::Int, "a", int(2_000_000_000)),
        print(vec![string("after")]),
    ]));
    assert_eq!(eval.output, "after");
    assert_eq!(eval.diagnostics.len(), 1);
    assert_eq!(
        eval.diagnostics[0].message,
        "array of 2000000000 elements exceeds the limit of 16777216"
    );
    let poisoned = interpreter.environment().get("a").unwrap();
    assert!(matches!(poisoned.value, Value::Null));
}

#[test]
fn e2e_array_limit_comes_from_config() {
    let config = EvaluatorConfig {
        max_array_length: 4,
        ..EvaluatorConfig::default()
    };
    let eval = evaluate_with_config(
        &program(vec![
            vector_sized(TypeName::Int, "ok", int(4)),
            vector_sized(TypeName::Int, "big", int(5)),
            print(vec![length("ok")]),
        ]),
        config,
    );
    assert_eq!(eval.diagnostics.len(), 1);
    assert_eq!(eval.output, "4");
}

#[test]
fn e2e_ints_are_32_bit_and_wrap() {
    let out = run_ok(vec![
        decl(TypeName::Int, "max", int(i64::from(i32::MAX))),
        print(vec![binary(BinaryOp::Add, var("max"), int(1))]),
        print(vec![binary(BinaryOp::Mul, int(65536), int(65536))]),
    ]);
    assert_eq!(out, "-2147483648\n0");
}

#[test]
fn e2e_out_of_range_int_literal_is_reported() {
    let eval = evaluate(&program(vec![
        decl(TypeName::Int, "x", int(1 << 32)),
        vector_sized(TypeName::Int, "a", int(4_611_686_018_427_387_904)),
        print(vec![string("after")]),
    ]));
    assert_eq!(eval.output, "after");
    assert_eq!(eval.diagnostics.len(), 2);
    assert_eq!(
        eval.diagnostics[0].message,
        "integer literal 4294967296 does not fit in 32 bits"
    );
}
