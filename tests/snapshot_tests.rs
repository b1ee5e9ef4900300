use insta::assert_snapshot;
use php_front::ast::sexpr::SExprFormatter;
use php_front::ast::{StmtId, StmtKind};
use php_front::{parse, Features, Parse};

fn first_stmt(result: &Parse) -> StmtId {
    match &result.ast.stmt(result.root).kind {
        StmtKind::GlobalCode { stmts } => stmts[0],
        other => panic!("root is {other:?}"),
    }
}

fn sexpr_of(source: &str) -> String {
    let result = parse(source.as_bytes(), Features::default());
    assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
    let stmt = first_stmt(&result);
    SExprFormatter::new(&result.ast).format(stmt)
}

#[test]
fn echo_with_arithmetic() {
    assert_snapshot!(sexpr_of("<?php echo 1 + 2 * 3;"), @"(echo (+ (int 1) (* (int 2) (int 3))))");
}

#[test]
fn assignment_of_a_string() {
    assert_snapshot!(sexpr_of("<?php $x = 'hi';"), @r#"(assign (var $x) (string "hi"))"#);
}

#[test]
fn call_with_arguments() {
    assert_snapshot!(sexpr_of("<?php f(1, $y);"), @"(call f (int 1) (var $y))");
}

#[test]
fn unary_and_comparison() {
    assert_snapshot!(sexpr_of("<?php !$a == $b;"), @"(== (not (var $a)) (var $b))");
}
