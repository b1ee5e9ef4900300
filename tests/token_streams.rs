use php_front::lexer::token::{Token, TokenKind, TokenValue};
use php_front::lexer::{LexState, Lexer};
use php_front::Features;

fn tokens(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source.as_bytes());
    let mut out = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::End;
        if !token.kind.is_trivia() {
            out.push(token);
        }
        if done {
            break;
        }
    }
    out
}

fn kinds(source: &str) -> Vec<TokenKind> {
    tokens(source).into_iter().map(|t| t.kind).collect()
}

fn text(value: &str) -> TokenValue {
    TokenValue::Text(value.to_string())
}

#[test]
fn inline_html_around_script() {
    let toks = tokens("Hello <?php $x = 1; ?> World");
    let expected = [
        TokenKind::InlineHtml,
        TokenKind::OpenTag,
        TokenKind::Variable,
        TokenKind::Eq,
        TokenKind::LNumber,
        TokenKind::SemiColon,
        TokenKind::CloseTag,
        TokenKind::InlineHtml,
        TokenKind::End,
    ];
    assert_eq!(
        toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
        expected.to_vec()
    );
    assert_eq!(toks[0].value, text("Hello "));
    assert_eq!(toks[2].value, text("x"));
    assert_eq!(toks[4].value, TokenValue::Int(1));
    assert_eq!(toks[7].value, text(" World"));
}

#[test]
fn interpolated_string_token_stream() {
    let toks = tokens("<?php \"a$x b\";");
    let expected = [
        TokenKind::OpenTag,
        TokenKind::DoubleQuote,
        TokenKind::EncapsedAndWhitespace,
        TokenKind::Variable,
        TokenKind::EncapsedAndWhitespace,
        TokenKind::DoubleQuote,
        TokenKind::SemiColon,
        TokenKind::End,
    ];
    assert_eq!(
        toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
        expected.to_vec()
    );
    assert_eq!(toks[2].value, text("a"));
    assert_eq!(toks[3].value, text("x"));
    assert_eq!(toks[4].value, text(" b"));
}

#[test]
fn heredoc_token_stream() {
    let toks = tokens("<?php $s = <<<EOT\nline1\nEOT;\n");
    let expected = [
        TokenKind::OpenTag,
        TokenKind::Variable,
        TokenKind::Eq,
        TokenKind::StartHeredoc,
        TokenKind::EncapsedAndWhitespace,
        TokenKind::EndHeredoc,
        TokenKind::SemiColon,
        TokenKind::End,
    ];
    assert_eq!(
        toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
        expected.to_vec()
    );
    assert_eq!(toks[4].value, text("line1\n"));
    assert_eq!(toks[5].value, text("EOT"));
}

#[test]
fn heredoc_label_inside_a_line_does_not_terminate() {
    let toks = tokens("<?php $s = <<<EOT\nhas EOT inside\nxEOT\nEOT;\n");
    let body: Vec<_> = toks
        .iter()
        .filter(|t| t.kind == TokenKind::EncapsedAndWhitespace)
        .collect();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0].value, text("has EOT inside\nxEOT\n"));
    assert!(toks.iter().any(|t| t.kind == TokenKind::EndHeredoc));
}

#[test]
fn close_tag_swallows_one_trailing_newline() {
    let with = kinds("<?php echo 1; ?>\n");
    let without = kinds("<?php echo 1; ?>");
    let expected = vec![
        TokenKind::OpenTag,
        TokenKind::Echo,
        TokenKind::LNumber,
        TokenKind::SemiColon,
        TokenKind::CloseTag,
        TokenKind::End,
    ];
    assert_eq!(with, expected);
    assert_eq!(without, expected);
}

#[test]
fn keyword_after_arrow_is_a_plain_name() {
    let toks = tokens("<?php $o->list;");
    let expected = [
        TokenKind::OpenTag,
        TokenKind::Variable,
        TokenKind::Arrow,
        TokenKind::Identifier,
        TokenKind::SemiColon,
        TokenKind::End,
    ];
    assert_eq!(
        toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
        expected.to_vec()
    );
    assert_eq!(toks[3].value, text("list"));
}

#[test]
fn dollar_brace_produces_string_varname() {
    let toks = tokens("<?php \"${name}\";");
    let expected = [
        TokenKind::OpenTag,
        TokenKind::DoubleQuote,
        TokenKind::DollarOpenCurlyBraces,
        TokenKind::StringVarname,
        TokenKind::CloseBrace,
        TokenKind::DoubleQuote,
        TokenKind::SemiColon,
        TokenKind::End,
    ];
    assert_eq!(
        toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
        expected.to_vec()
    );
    assert_eq!(toks[3].value, text("name"));
}

#[test]
fn short_open_tags_are_a_feature() {
    let off = kinds("<? echo 1;");
    assert_eq!(off, vec![TokenKind::InlineHtml, TokenKind::End]);

    let mut lexer = Lexer::with_features(
        b"<? echo 1;",
        Features {
            short_open_tags: true,
        },
    );
    let mut on = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::End;
        if !token.kind.is_trivia() {
            on.push(token.kind);
        }
        if done {
            break;
        }
    }
    assert_eq!(
        on,
        vec![
            TokenKind::OpenTag,
            TokenKind::Echo,
            TokenKind::LNumber,
            TokenKind::SemiColon,
            TokenKind::End,
        ]
    );
}

#[test]
fn open_tag_is_case_insensitive() {
    assert_eq!(
        kinds("<?PHP echo 1;"),
        vec![
            TokenKind::OpenTag,
            TokenKind::Echo,
            TokenKind::LNumber,
            TokenKind::SemiColon,
            TokenKind::End,
        ]
    );
}

#[test]
fn yield_from_is_one_token() {
    let toks = kinds("<?php yield from $gen;");
    assert_eq!(
        toks,
        vec![
            TokenKind::OpenTag,
            TokenKind::YieldFrom,
            TokenKind::Variable,
            TokenKind::SemiColon,
            TokenKind::End,
        ]
    );
    assert!(kinds("<?php yield $v;").contains(&TokenKind::Yield));
}

#[test]
fn halt_compiler_walks_to_raw_data() {
    let toks = kinds("<?php __halt_compiler();raw data");
    assert_eq!(
        toks,
        vec![
            TokenKind::OpenTag,
            TokenKind::HaltCompiler,
            TokenKind::OpenParen,
            TokenKind::CloseParen,
            TokenKind::SemiColon,
            TokenKind::InlineHtml,
            TokenKind::End,
        ]
    );
}

#[test]
fn offsets_are_monotonic_and_state_balances() {
    let source = "<?php function f($a) { return \"x$a\" . <<<EOT\nbody\nEOT; } ?>";
    let mut lexer = Lexer::new(source.as_bytes());
    let mut last_start = 0;
    loop {
        let token = lexer.next_token();
        assert!(token.span.start >= last_start);
        last_start = token.span.start;
        assert!(lexer.buffer_invariants_hold());
        if token.kind == TokenKind::End {
            break;
        }
    }
    assert_eq!(lexer.state_stack_depth(), 0);
    assert!(matches!(lexer.state(), LexState::Initial));
}

#[test]
fn token_protocol_exposes_value_and_position() {
    let mut lexer = Lexer::new(b"<?php $abc;");
    loop {
        let kind = lexer.get_next_token();
        if kind == TokenKind::Variable {
            assert_eq!(lexer.token_value(), &text("abc"));
            assert_eq!(lexer.token_position().start, 6);
            break;
        }
        assert_ne!(kind, TokenKind::End, "variable token not reached");
    }
}

#[test]
fn fragments_reparse_with_state_and_bias() {
    let mut lexer = Lexer::new(b"$x + 1")
        .with_initial_state(LexState::Scripting)
        .with_position_bias(100);
    let first = lexer.next_token();
    assert_eq!(first.kind, TokenKind::Variable);
    assert_eq!(first.span.start, 100);
    assert_eq!(first.span.end, 102);
    let kinds: Vec<_> = std::iter::from_fn(|| Some(lexer.next_token().kind))
        .take_while(|&k| k != TokenKind::End)
        .filter(|k| !k.is_trivia())
        .collect();
    assert_eq!(kinds, vec![TokenKind::Plus, TokenKind::LNumber]);
}

#[test]
fn token_observer_sees_raw_text() {
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = seen.clone();
    let mut lexer = Lexer::new(b"<?php $a;");
    lexer.set_observer(Box::new(move |kind, raw| {
        sink.borrow_mut().push((kind, raw.to_vec()));
    }));
    while lexer.next_token().kind != TokenKind::End {}
    let seen = seen.borrow();
    assert!(seen
        .iter()
        .any(|(kind, raw)| *kind == TokenKind::Variable && raw == b"$a"));
}
