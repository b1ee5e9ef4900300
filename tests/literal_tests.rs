use php_front::ast::{ExprKind, StmtKind};
use php_front::diag::{DiagnosticCode, Severity};
use php_front::lexer::token::{LiteralFormat, TokenKind, TokenValue};
use php_front::lexer::Lexer;
use php_front::{parse, Features, Parse};

fn parse_ok(source: &str) -> Parse {
    let result = parse(source.as_bytes(), Features::default());
    assert!(
        result.diagnostics.iter().all(|d| d.severity != Severity::Error),
        "unexpected errors: {:?}",
        result.diagnostics
    );
    result
}

fn first_expr(result: &Parse) -> &ExprKind {
    let StmtKind::GlobalCode { stmts } = &result.ast.stmt(result.root).kind else {
        panic!("root is not global code");
    };
    let StmtKind::Expr { expr } = &result.ast.stmt(stmts[0]).kind else {
        panic!("first statement is not an expression");
    };
    &result.ast.expr(*expr).kind
}

fn literal_tokens(source: &str) -> Vec<(TokenKind, TokenValue, LiteralFormat)> {
    let mut lexer = Lexer::new(source.as_bytes());
    let mut out = Vec::new();
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::End {
            break;
        }
        if matches!(token.kind, TokenKind::LNumber | TokenKind::DNumber) {
            out.push((token.kind, token.value, token.format));
        }
    }
    out
}

#[test]
fn one_past_int_max_promotes_with_warning() {
    let result = parse(b"<?php 9223372036854775808;", Features::default());
    let warning = result
        .diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::TooBigIntegerConversion)
        .expect("promotion warning");
    assert_eq!(warning.severity, Severity::Warning);

    match first_expr(&result) {
        ExprKind::Double { value, format } => {
            assert!((*value - 9.223372036854776e18).abs() < 1e4);
            assert_eq!(*format, LiteralFormat::Decimal);
        }
        other => panic!("expected a float literal, got {other:?}"),
    }
}

#[test]
fn int_max_stays_integral() {
    let result = parse_ok("<?php 9223372036854775807;");
    match first_expr(&result) {
        ExprKind::Int { value, .. } => assert_eq!(*value, i64::MAX),
        other => panic!("expected an int literal, got {other:?}"),
    }
    assert!(result.diagnostics.is_empty());
}

#[test]
fn sixteen_significant_hex_digits_decide_by_leading_digit() {
    let toks = literal_tokens("<?php 0x7FFFFFFFFFFFFFFF; 0x8000000000000000; 0x00FF;");
    assert_eq!(toks[0].0, TokenKind::LNumber);
    assert_eq!(toks[0].1, TokenValue::Int(i64::MAX));
    assert_eq!(toks[1].0, TokenKind::DNumber);
    assert_eq!(toks[2].1, TokenValue::Int(255));
}

#[test]
fn literal_formats_are_recorded() {
    let toks = literal_tokens("<?php 42; 0b101; 077; 0x1A; 1.5; 1e3; 1E3;");
    let formats: Vec<_> = toks.iter().map(|t| t.2).collect();
    assert_eq!(
        formats,
        vec![
            LiteralFormat::Decimal,
            LiteralFormat::Binary,
            LiteralFormat::Octal,
            LiteralFormat::Hex,
            LiteralFormat::FloatingPoint,
            LiteralFormat::ExpSmall,
            LiteralFormat::ExpBig,
        ]
    );
    assert_eq!(toks[1].1, TokenValue::Int(5));
    assert_eq!(toks[2].1, TokenValue::Int(63));
    assert_eq!(toks[3].1, TokenValue::Int(26));
}

#[test]
fn digit_separators_decode_like_plain_spellings() {
    let plain = literal_tokens("<?php 1000000; 0xFF_FF;");
    assert_eq!(plain[0].1, TokenValue::Int(1_000_000));
    assert_eq!(plain[1].1, TokenValue::Int(0xFFFF));
    let spaced = literal_tokens("<?php 1_000_000;");
    assert_eq!(spaced[0].1, plain[0].1);
}

#[test]
fn decimal_literal_reprints_identically() {
    let source = "<?php 12345;";
    let result = parse_ok(source);
    match first_expr(&result) {
        ExprKind::Int { value, format } => {
            assert_eq!(*format, LiteralFormat::Decimal);
            assert_eq!(value.to_string(), "12345");
        }
        other => panic!("expected an int literal, got {other:?}"),
    }
}

#[test]
fn numeric_string_offset_keeps_text_on_overflow() {
    let mut lexer = Lexer::new(b"<?php \"$a[99999999999999999999]\";");
    let mut value = None;
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::NumString {
            value = Some(token.value);
        }
        if token.kind == TokenKind::End {
            break;
        }
    }
    assert_eq!(
        value,
        Some(TokenValue::Text("99999999999999999999".to_string()))
    );

    let mut lexer = Lexer::new(b"<?php \"$a[123]\";");
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::NumString {
            assert_eq!(token.value, TokenValue::Int(123));
            break;
        }
        assert_ne!(token.kind, TokenKind::End);
    }
}

#[test]
fn exponent_needs_digits() {
    // `1e` is an integer followed by a name, not a malformed float.
    let mut lexer = Lexer::new(b"<?php 1e;");
    let mut kinds = Vec::new();
    loop {
        let token = lexer.next_token();
        if token.kind.is_trivia() {
            continue;
        }
        kinds.push(token.kind);
        if token.kind == TokenKind::End {
            break;
        }
    }
    assert_eq!(
        kinds,
        vec![
            TokenKind::OpenTag,
            TokenKind::LNumber,
            TokenKind::Identifier,
            TokenKind::SemiColon,
            TokenKind::End,
        ]
    );
}
