//! Full-stack tests: source AST through the compiler, the binary module
//! format and the interpreter.

use kore_bytecode::Module;
use kore_compiler::ast::{self, BinOp, Expr, ExprKind, IfArm, SourceLoc, Stmt, Type};
use kore_compiler::Compiler;
use kore_vm::{FaultKind, Value, Vm, VmError, VmState};

fn loc() -> SourceLoc {
    SourceLoc::default()
}

fn i32_lit(v: i32) -> Expr {
    Expr::new(ExprKind::I32(v), Type::I32, loc())
}

fn i64_lit(v: i64) -> Expr {
    Expr::new(ExprKind::I64(v), Type::I64, loc())
}

fn var(name: &str, ty: Type) -> Expr {
    Expr::new(ExprKind::Var(name.to_owned()), ty, loc())
}

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        name: name.to_owned(),
        value,
        loc: loc(),
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
        loc(),
    )
}

fn call(callee: &str, args: Vec<Expr>, ty: Type) -> Expr {
    Expr::new(
        ExprKind::Call {
            callee: callee.to_owned(),
            args,
        },
        ty,
        loc(),
    )
}

fn compile_and_run(source: &ast::Module) -> Vm {
    let mut compiler = Compiler::new();
    let module = compiler.compile(source).unwrap();
    assert!(!compiler.has_errors(), "{:?}", compiler.diagnostics());

    // Push the module through the wire format so the loader is exercised
    let bytes = module.write_bytes();
    let loaded = Module::load_bytes(&bytes, source.path.clone()).unwrap();

    let mut vm = Vm::new();
    vm.run(&loaded).unwrap();
    assert_eq!(vm.state(), VmState::Halted);
    vm
}

fn module_with(statements: Vec<Stmt>) -> ast::Module {
    ast::Module {
        name: "test".to_owned(),
        path: "test.ko".to_owned(),
        statements,
        ..ast::Module::default()
    }
}

#[test]
fn global_holds_the_sum() {
    // a = 1 + 2
    let vm = compile_and_run(&module_with(vec![assign(
        "a",
        binary(BinOp::Add, i32_lit(1), i32_lit(2), Type::I32),
    )]));
    assert_eq!(vm.global(0), Some(&Value::I32(3)));
}

#[test]
fn if_else_picks_the_right_arm() {
    // a = 10; if a < 5 { b = 1 } else if a < 20 { b = 2 } else { b = 3 }
    let arms = vec![
        IfArm {
            cond: binary(BinOp::Lt, var("a", Type::I32), i32_lit(5), Type::Bool),
            body: vec![assign("b", i32_lit(1))],
        },
        IfArm {
            cond: binary(BinOp::Lt, var("a", Type::I32), i32_lit(20), Type::Bool),
            body: vec![assign("b", i32_lit(2))],
        },
    ];
    let vm = compile_and_run(&module_with(vec![
        assign("a", i32_lit(10)),
        assign("b", i32_lit(0)),
        Stmt::If {
            arms,
            else_body: vec![assign("b", i32_lit(3))],
            loc: loc(),
        },
    ]));
    // slot 0 = a, slot 1 = b
    assert_eq!(vm.global(1), Some(&Value::I32(2)));
}

#[test]
fn function_call_round_trip() {
    // fn double(x: i64) -> i64 { return x + x }
    // a = double(21)
    let double = ast::Function {
        name: "double".to_owned(),
        exported: true,
        loc: loc(),
        params: vec![ast::Param {
            name: "x".to_owned(),
            ty: Type::I64,
        }],
        return_ty: Type::I64,
        body: vec![Stmt::Return {
            value: Some(binary(
                BinOp::Add,
                var("x", Type::I64),
                var("x", Type::I64),
                Type::I64,
            )),
            loc: loc(),
        }],
    };
    let source = ast::Module {
        name: "test".to_owned(),
        path: "test.ko".to_owned(),
        functions: vec![double],
        statements: vec![assign("a", call("double", vec![i64_lit(21)], Type::I64))],
    };
    let vm = compile_and_run(&source);
    assert_eq!(vm.global(0), Some(&Value::I64(42)));
}

#[test]
fn nested_calls_preserve_caller_registers() {
    // fn add1(x: i32) -> i32 { return x + 1 }
    // fn add2(x: i32) -> i32 { return add1(add1(x)) }
    // a = add2(40)
    let add1 = ast::Function {
        name: "add1".to_owned(),
        exported: false,
        loc: loc(),
        params: vec![ast::Param {
            name: "x".to_owned(),
            ty: Type::I32,
        }],
        return_ty: Type::I32,
        body: vec![Stmt::Return {
            value: Some(binary(
                BinOp::Add,
                var("x", Type::I32),
                i32_lit(1),
                Type::I32,
            )),
            loc: loc(),
        }],
    };
    let add2 = ast::Function {
        name: "add2".to_owned(),
        exported: false,
        loc: loc(),
        params: vec![ast::Param {
            name: "x".to_owned(),
            ty: Type::I32,
        }],
        return_ty: Type::I32,
        body: vec![Stmt::Return {
            value: Some(call(
                "add1",
                vec![call("add1", vec![var("x", Type::I32)], Type::I32)],
                Type::I32,
            )),
            loc: loc(),
        }],
    };
    let source = ast::Module {
        name: "test".to_owned(),
        path: "test.ko".to_owned(),
        functions: vec![add1, add2],
        statements: vec![assign("a", call("add2", vec![i32_lit(40)], Type::I32))],
    };
    let vm = compile_and_run(&source);
    assert_eq!(vm.global(0), Some(&Value::I32(42)));
}

#[test]
fn print_builtin_reaches_the_output() {
    let vm = compile_and_run(&module_with(vec![Stmt::Expr(call(
        "print",
        vec![binary(BinOp::Mul, i32_lit(6), i32_lit(7), Type::I32)],
        Type::Unit,
    ))]));
    assert_eq!(vm.output(), ["42"]);
}

#[test]
fn len_builtin_measures_arrays() {
    // arr = [_; 5]; n = len(arr)
    let arr_ty = Type::Array(Box::new(Type::I32));
    let vm = compile_and_run(&module_with(vec![
        assign(
            "arr",
            Expr::new(
                ExprKind::ArrayAlloc {
                    len: Box::new(i32_lit(5)),
                },
                arr_ty.clone(),
                loc(),
            ),
        ),
        assign("n", call("len", vec![var("arr", arr_ty)], Type::I32)),
    ]));
    assert_eq!(vm.global(1), Some(&Value::I32(5)));
}

#[test]
fn comparison_chain_feeds_branches() {
    // a = 7; b = 0; if a == 7 { b = a * 2 }
    let vm = compile_and_run(&module_with(vec![
        assign("a", i32_lit(7)),
        assign("b", i32_lit(0)),
        Stmt::If {
            arms: vec![IfArm {
                cond: binary(BinOp::Eq, var("a", Type::I32), i32_lit(7), Type::Bool),
                body: vec![assign(
                    "b",
                    binary(BinOp::Mul, var("a", Type::I32), i32_lit(2), Type::I32),
                )],
            }],
            else_body: vec![],
            loc: loc(),
        },
    ]));
    assert_eq!(vm.global(1), Some(&Value::I32(14)));
}

#[test]
fn division_by_zero_faults_the_machine() {
    let source = module_with(vec![assign(
        "a",
        binary(BinOp::Div, i32_lit(1), i32_lit(0), Type::I32),
    )]);
    let mut compiler = Compiler::new();
    let module = compiler.compile(&source).unwrap();

    let mut vm = Vm::new();
    let err = vm.run(&module).unwrap_err();
    assert_eq!(vm.state(), VmState::Faulted);
    match err {
        VmError::Fault { fault, function, .. } => {
            assert_eq!(fault, FaultKind::DivisionByZero);
            assert_eq!(function, "main");
        }
        other => panic!("expected fault, got {:?}", other),
    }
}

#[test]
fn faulted_vm_reports_trace_through_calls() {
    // fn boom() -> i32 { return 1 / 0 }
    // a = boom()
    let boom = ast::Function {
        name: "boom".to_owned(),
        exported: false,
        loc: loc(),
        params: vec![],
        return_ty: Type::I32,
        body: vec![Stmt::Return {
            value: Some(binary(BinOp::Div, i32_lit(1), i32_lit(0), Type::I32)),
            loc: loc(),
        }],
    };
    let source = ast::Module {
        name: "test".to_owned(),
        path: "test.ko".to_owned(),
        functions: vec![boom],
        statements: vec![assign("a", call("boom", vec![], Type::I32))],
    };
    let mut compiler = Compiler::new();
    let module = compiler.compile(&source).unwrap();

    let mut vm = Vm::new();
    let err = vm.run(&module).unwrap_err();
    match err {
        VmError::Fault { function, trace, .. } => {
            assert_eq!(function, "boom");
            assert_eq!(trace.len(), 2);
            assert!(trace[0].starts_with("boom"));
            assert!(trace[1].starts_with("main"));
        }
        other => panic!("expected fault, got {:?}", other),
    }
}
