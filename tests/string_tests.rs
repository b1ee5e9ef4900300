use php_front::ast::{ExprKind, StmtKind, StrLit};
use php_front::diag::DiagnosticCode;
use php_front::lexer::token::{LiteralFormat, TokenKind, TokenValue};
use php_front::lexer::Lexer;
use php_front::{parse, Features, Parse};

fn first_string(result: &Parse) -> &StrLit {
    let StmtKind::GlobalCode { stmts } = &result.ast.stmt(result.root).kind else {
        panic!("root is not global code");
    };
    for &stmt in stmts {
        if let StmtKind::Expr { expr } = &result.ast.stmt(stmt).kind {
            let mut expr = *expr;
            if let ExprKind::Assign { value, .. } = &result.ast.expr(expr).kind {
                expr = *value;
            }
            if let ExprKind::Str { value, .. } = &result.ast.expr(expr).kind {
                return value;
            }
        }
    }
    panic!("no string literal found");
}

fn text(value: &str) -> StrLit {
    StrLit::Text(value.to_string())
}

#[test]
fn single_quoted_knows_two_escapes() {
    let result = parse(br"<?php 'a\'b\\c\nd';", Features::default());
    assert_eq!(first_string(&result), &text("a'b\\c\\nd"));
}

#[test]
fn single_quoted_round_trip_without_escapes() {
    // Any body free of backslashes and quotes decodes to itself.
    for body in ["abc def", "tabs\tstay", "unicode \u{1F600}"] {
        let source = format!("<?php '{body}';");
        let result = parse(source.as_bytes(), Features::default());
        assert_eq!(first_string(&result), &text(body));
    }
}

#[test]
fn double_quoted_escapes() {
    let result = parse(br#"<?php "a\n\t\"\$ \101\x41";"#, Features::default());
    assert_eq!(first_string(&result), &text("a\n\t\"$ AA"));
}

#[test]
fn unknown_escapes_stay_verbatim() {
    let result = parse(br#"<?php "\q\w";"#, Features::default());
    assert_eq!(first_string(&result), &text("\\q\\w"));
}

#[test]
fn unicode_escape_decodes() {
    let result = parse(br#"<?php "\u{48}\u{69}";"#, Features::default());
    assert_eq!(first_string(&result), &text("Hi"));
}

#[test]
fn surrogate_code_point_is_reported_and_kept_verbatim() {
    let result = parse(br#"<?php "\u{D800}";"#, Features::default());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::InvalidCodePoint));
    assert_eq!(first_string(&result), &text("\\u{D800}"));
}

#[test]
fn named_escape_with_junk_uses_name_code() {
    let result = parse(br#"<?php "\U{GRIN}";"#, Features::default());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::InvalidCodePointName));
}

#[test]
fn heredoc_processes_escapes_nowdoc_does_not() {
    let heredoc = parse(b"<?php $s = <<<EOT\na\\tb\nEOT;\n", Features::default());
    assert_eq!(first_string(&heredoc), &text("a\tb\n"));

    let nowdoc = parse(b"<?php $s = <<<'EOT'\na\\tb\nEOT;\n", Features::default());
    assert_eq!(first_string(&nowdoc), &text("a\\tb\n"));
}

#[test]
fn heredoc_quote_needs_no_escape() {
    let result = parse(b"<?php $s = <<<EOT\nsay \\\"hi\\\"\nEOT;\n", Features::default());
    assert_eq!(first_string(&result), &text("say \\\"hi\\\"\n"));
}

#[test]
fn binary_prefix_forces_bytes() {
    let result = parse(b"<?php b'abc';", Features::default());
    assert_eq!(first_string(&result), &StrLit::Bytes(b"abc".to_vec()));
}

#[test]
fn high_bytes_switch_to_byte_string() {
    let mut source = b"<?php \"a".to_vec();
    source.push(0xFF);
    source.extend_from_slice(b"b\";");
    let result = parse(&source, Features::default());
    assert_eq!(
        first_string(&result),
        &StrLit::Bytes(vec![b'a', 0xFF, b'b'])
    );
}

#[test]
fn plain_double_quoted_string_is_one_token() {
    let mut lexer = Lexer::new(b"<?php \"plain\";");
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::ConstantEncapsedString {
            assert_eq!(token.value, TokenValue::Text("plain".to_string()));
            assert_eq!(token.format, LiteralFormat::DoubleQuoted);
            break;
        }
        assert_ne!(token.kind, TokenKind::End);
    }
}

#[test]
fn backquote_body_becomes_shell_exec_parts() {
    let result = parse(b"<?php `ls $dir`;", Features::default());
    let StmtKind::GlobalCode { stmts } = &result.ast.stmt(result.root).kind else {
        panic!("root is not global code");
    };
    let StmtKind::Expr { expr } = &result.ast.stmt(stmts[0]).kind else {
        panic!("expected expression statement");
    };
    let ExprKind::ShellExec { parts } = &result.ast.expr(*expr).kind else {
        panic!("expected shell exec");
    };
    assert_eq!(parts.len(), 2);
    assert!(matches!(
        result.ast.expr(parts[0]).kind,
        ExprKind::Str { .. }
    ));
    assert!(matches!(
        result.ast.expr(parts[1]).kind,
        ExprKind::Variable { .. }
    ));
}
