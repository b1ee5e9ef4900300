use php_front::ast::StmtKind;
use php_front::{parse, Features, Parse};

fn parse_src(source: &str) -> Parse {
    parse(source.as_bytes(), Features::default())
}

fn top_stmt_kinds(result: &Parse) -> Vec<&StmtKind> {
    match &result.ast.stmt(result.root).kind {
        StmtKind::GlobalCode { stmts } => {
            stmts.iter().map(|&s| &result.ast.stmt(s).kind).collect()
        }
        other => panic!("root is {other:?}"),
    }
}

#[test]
fn missing_semicolon_recovers_at_the_next_boundary() {
    let result = parse_src(
        "<?php
    echo 1
    echo 2;
    echo 3;
    ",
    );
    assert!(!result.ok());
    let kinds = top_stmt_kinds(&result);
    // The first echo survives, recovery resynchronizes, and the last
    // statement is parsed normally.
    assert!(matches!(kinds[0], StmtKind::Echo { .. }));
    assert!(matches!(kinds.last().unwrap(), StmtKind::Echo { .. }));
}

#[test]
fn stray_close_brace_is_reported_not_fatal() {
    let result = parse_src(
        "<?php
    if (true) {
        echo 1;
    }
    }
    echo 2;
    ",
    );
    assert!(!result.ok());
    let kinds = top_stmt_kinds(&result);
    assert!(matches!(kinds[0], StmtKind::If { .. }));
    assert!(matches!(kinds.last().unwrap(), StmtKind::Echo { .. }));
}

#[test]
fn missing_close_brace_yields_partial_tree() {
    let result = parse_src(
        "<?php
    if (true) {
        echo 1;
    ",
    );
    assert!(!result.ok());
    let kinds = top_stmt_kinds(&result);
    assert_eq!(kinds.len(), 1);
    assert!(matches!(kinds[0], StmtKind::If { .. }));
}

#[test]
fn unterminated_class_body_yields_partial_tree() {
    let result = parse_src(
        "<?php
    class Foo {
        public $a;
    ",
    );
    assert!(!result.ok());
    let kinds = top_stmt_kinds(&result);
    assert!(matches!(kinds[0], StmtKind::Class { .. }));
}

#[test]
fn garbage_expression_still_returns_a_tree() {
    let result = parse_src("<?php $x = ; echo 1;");
    assert!(!result.ok());
    let kinds = top_stmt_kinds(&result);
    assert!(!kinds.is_empty());
    assert!(matches!(kinds.last().unwrap(), StmtKind::Echo { .. }));
}

#[test]
fn lexical_error_token_surfaces_as_a_parse_error() {
    let result = parse_src("<?php \x01 echo 1;");
    assert!(!result.ok());
    let kinds = top_stmt_kinds(&result);
    assert!(matches!(kinds.last().unwrap(), StmtKind::Echo { .. }));
}
