use php_front::lexer::token::{Token, TokenKind};
use php_front::lexer::Lexer;
use php_front::source::{CharSource, SliceSource};
use php_front::{parse, parse_reader, Features};

/// Source that drips bytes a few at a time, forcing the buffer window to
/// compact and grow mid-token.
struct Chunked<'a> {
    inner: SliceSource<'a>,
    chunk: usize,
}

impl<'a> CharSource for Chunked<'a> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.chunk.min(buf.len());
        self.inner.read(&mut buf[..n])
    }
}

const SOURCE: &str = r#"before <?php
function f($a) {
    $s = "interp $a and {$a['k']}" . <<<EOT
a long heredoc body line
EOT;
    return $s . 'tail';
}
?> after"#;

#[test]
fn chunked_reads_produce_the_same_tokens() {
    let mut direct = Lexer::new(SOURCE.as_bytes());
    let mut chunked = Lexer::from_source(
        Chunked {
            inner: SliceSource::new(SOURCE.as_bytes()),
            chunk: 3,
        },
        Features::default(),
    );

    loop {
        let a: Token = direct.next_token();
        let b: Token = chunked.next_token();
        assert_eq!(a, b);
        assert!(chunked.buffer_invariants_hold());
        if a.kind == TokenKind::End {
            break;
        }
    }
}

#[test]
fn reader_parse_matches_slice_parse() {
    let from_slice = parse(SOURCE.as_bytes(), Features::default());
    let from_reader = parse_reader(
        Chunked {
            inner: SliceSource::new(SOURCE.as_bytes()),
            chunk: 2,
        },
        Features::default(),
    );
    assert!(from_slice.ok() && from_reader.ok());
    assert_eq!(
        format!("{:?}", from_slice.ast.stmt(from_slice.root)),
        format!("{:?}", from_reader.ast.stmt(from_reader.root))
    );
    assert_eq!(from_slice.diagnostics, from_reader.diagnostics);
}
