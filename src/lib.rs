//! A PHP 7 front end: multi-state lexer, recursive-descent parser and an
//! indexed syntax tree with spans, parent links and per-node property
//! bags.

pub mod ast;
pub mod diag;
pub mod lexer;
pub mod line_index;
pub mod parser;
pub mod source;
pub mod span;

pub use parser::{Parse, Parser};
pub use span::Span;

/// Host-selectable language options.
#[derive(Debug, Clone, Copy, Default)]
pub struct Features {
    /// Recognize `<?` as an open tag.
    pub short_open_tags: bool,
}

/// Parses a byte slice into a tree plus diagnostics.
pub fn parse(source: &[u8], features: Features) -> Parse {
    let lexer = lexer::Lexer::with_features(source, features);
    Parser::new(lexer).parse_program()
}

/// Parses from a pull-based character source through the buffer manager.
pub fn parse_reader<S: source::CharSource>(reader: S, features: Features) -> Parse {
    let lexer = lexer::Lexer::from_source(reader, features);
    Parser::from_lexer(lexer).parse_program()
}
