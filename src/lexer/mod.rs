pub mod token;

pub(crate) mod decode;

use tracing::trace;

use crate::diag::{Diagnostic, DiagnosticCode, DiagnosticSink, Diagnostics};
use crate::source::{Buffer, CharSource, SliceSource, EOF_CHAR};
use crate::span::Span;
use crate::Features;

use decode::EscapeMode;
use token::{keyword, LiteralFormat, Token, TokenKind, TokenValue};

/// Scanner states that persist across `next_token` calls. Heredoc flavours
/// carry the active label.
#[derive(Debug, Clone, PartialEq)]
pub enum LexState {
    Initial,
    Scripting,
    DoubleQuotes,
    Backquote,
    Heredoc(Vec<u8>),
    Nowdoc(Vec<u8>),
    EndHeredoc(Vec<u8>),
    LookingForProperty,
    LookingForVarname,
    VarOffset,
    Halt1,
    Halt2,
    Halt3,
}

/// Observer invoked after each produced token with its kind and raw text.
pub type TokenObserver = Box<dyn FnMut(TokenKind, &[u8])>;

pub struct Lexer<S: CharSource> {
    buf: Buffer<S>,
    state: LexState,
    stack: Vec<LexState>,
    features: Features,
    bias: usize,
    at_bol: bool,
    doc_comment: Option<String>,
    diags: Diagnostics,
    observer: Option<TokenObserver>,
    last_kind: TokenKind,
    last_span: Span,
    last_value: TokenValue,
    fused: bool,
}

impl<'src> Lexer<SliceSource<'src>> {
    pub fn new(input: &'src [u8]) -> Self {
        Self::from_source(SliceSource::new(input), Features::default())
    }

    pub fn with_features(input: &'src [u8], features: Features) -> Self {
        Self::from_source(SliceSource::new(input), features)
    }
}

impl<S: CharSource> Lexer<S> {
    pub fn from_source(src: S, features: Features) -> Self {
        Self {
            buf: Buffer::new(src),
            state: LexState::Initial,
            stack: Vec::new(),
            features,
            bias: 0,
            at_bol: true,
            doc_comment: None,
            diags: Diagnostics::new(),
            observer: None,
            last_kind: TokenKind::End,
            last_span: Span::INVALID,
            last_value: TokenValue::None,
            fused: false,
        }
    }

    /// Overrides the starting lexical state, for reparsing fragments.
    pub fn with_initial_state(mut self, state: LexState) -> Self {
        self.state = state;
        self
    }

    /// Adds a fixed offset to every produced span, for reparsing fragments.
    pub fn with_position_bias(mut self, bias: usize) -> Self {
        self.bias = bias;
        self
    }

    pub fn set_observer(&mut self, observer: TokenObserver) {
        self.observer = Some(observer);
    }

    pub fn state(&self) -> &LexState {
        &self.state
    }

    pub fn state_stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn buffer_invariants_hold(&self) -> bool {
        self.buf.invariants_hold()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    pub fn drain_diagnostics(&mut self, out: &mut Vec<Diagnostic>) {
        self.diags.drain_into(out);
    }

    /// Doc-comment text pending attachment to the next declaration.
    pub fn take_doc_comment(&mut self) -> Option<String> {
        self.doc_comment.take()
    }

    // Token protocol for hosts that tokenize without parsing.

    pub fn get_next_token(&mut self) -> TokenKind {
        let token = self.next_token();
        token.kind
    }

    pub fn token_kind(&self) -> TokenKind {
        self.last_kind
    }

    pub fn token_value(&self) -> &TokenValue {
        &self.last_value
    }

    pub fn token_position(&self) -> Span {
        self.last_span
    }

    pub fn next_token(&mut self) -> Token {
        self.buf.start_token();
        let token = self.dispatch();

        let text_last = {
            let text = self.buf.text();
            text.last().copied()
        };
        if let Some(last) = text_last {
            self.at_bol = last == b'\n';
        }

        trace!("token {:?} at {:?}", token.kind, token.span);
        if let Some(observer) = self.observer.as_mut() {
            observer(token.kind, self.buf.text());
        }
        self.last_kind = token.kind;
        self.last_span = token.span;
        self.last_value = token.value.clone();
        debug_assert!(self.buf.invariants_hold());
        token
    }

    fn dispatch(&mut self) -> Token {
        match self.state.clone() {
            LexState::Initial => self.scan_initial(),
            LexState::Scripting => self.scan_scripting(),
            LexState::DoubleQuotes => self.scan_interpolated(b'"'),
            LexState::Backquote => self.scan_interpolated(b'`'),
            LexState::Heredoc(label) => self.scan_heredoc(&label, true),
            LexState::Nowdoc(label) => self.scan_heredoc(&label, false),
            LexState::EndHeredoc(label) => self.scan_end_heredoc(&label),
            LexState::LookingForProperty => self.scan_property_name(),
            LexState::LookingForVarname => self.scan_varname(),
            LexState::VarOffset => self.scan_var_offset(),
            LexState::Halt1 | LexState::Halt2 | LexState::Halt3 => self.scan_halt(),
        }
    }

    // State plumbing.

    fn push_state(&mut self, new: LexState) {
        let old = std::mem::replace(&mut self.state, new);
        self.stack.push(old);
    }

    fn pop_state(&mut self) -> bool {
        match self.stack.pop() {
            Some(state) => {
                self.state = state;
                true
            }
            None => false,
        }
    }

    // Character helpers.

    fn peek(&mut self, n: usize) -> u16 {
        self.buf.peek(n)
    }

    fn at(&mut self, n: usize, b: u8) -> bool {
        self.buf.peek(n) == b as u16
    }

    fn bump(&mut self) -> u16 {
        self.buf.advance()
    }

    fn is_ident_start(c: u16) -> bool {
        (c >= b'a' as u16 && c <= b'z' as u16)
            || (c >= b'A' as u16 && c <= b'Z' as u16)
            || c == b'_' as u16
            || (c >= 0x80 && c <= 0xFF)
    }

    fn is_ident_char(c: u16) -> bool {
        Self::is_ident_start(c) || (c >= b'0' as u16 && c <= b'9' as u16)
    }

    fn is_digit(c: u16) -> bool {
        c >= b'0' as u16 && c <= b'9' as u16
    }

    fn is_ws(c: u16) -> bool {
        c == b' ' as u16 || c == b'\t' as u16 || c == b'\r' as u16 || c == b'\n' as u16
    }

    fn read_ident_chars(&mut self) {
        while Self::is_ident_char(self.peek(0)) {
            self.bump();
        }
    }

    // Token construction.

    fn span_here(&mut self) -> Span {
        self.buf.mark_token_end();
        Span::new(
            self.bias + self.buf.token_start(),
            self.bias + self.buf.token_end(),
        )
    }

    fn token(&mut self, kind: TokenKind) -> Token {
        let span = self.span_here();
        Token::new(kind, span)
    }

    fn token_with(&mut self, kind: TokenKind, value: TokenValue) -> Token {
        let span = self.span_here();
        Token {
            kind,
            span,
            value,
            format: LiteralFormat::None,
        }
    }

    fn literal_token(
        &mut self,
        kind: TokenKind,
        value: TokenValue,
        format: LiteralFormat,
    ) -> Token {
        let span = self.span_here();
        Token {
            kind,
            span,
            value,
            format,
        }
    }

    fn lex_error(&mut self, message: &str) -> Token {
        let span = self.span_here();
        self.diags
            .error(span, DiagnosticCode::LexicalError, message);
        Token::new(TokenKind::Error, span)
    }

    // INITIAL: inline HTML until an open tag.

    fn scan_initial(&mut self) -> Token {
        let mut consumed = false;
        loop {
            let c = self.peek(0);
            if c == EOF_CHAR {
                if consumed {
                    let value = TokenValue::from_raw({
                        self.buf.mark_token_end();
                        self.buf.text()
                    });
                    return self.token_with(TokenKind::InlineHtml, value);
                }
                return self.token(TokenKind::End);
            }

            if c == b'<' as u16 && self.at(1, b'?') {
                if consumed {
                    let value = TokenValue::from_raw({
                        self.buf.mark_token_end();
                        self.buf.text()
                    });
                    return self.token_with(TokenKind::InlineHtml, value);
                }

                self.bump();
                self.bump();

                let is_php = (self.peek(0) | 0x20) == b'p' as u16
                    && (self.peek(1) | 0x20) == b'h' as u16
                    && (self.peek(2) | 0x20) == b'p' as u16
                    && (Self::is_ws(self.peek(3)) || self.peek(3) == EOF_CHAR);
                if is_php {
                    self.bump();
                    self.bump();
                    self.bump();
                    self.consume_tag_whitespace();
                    self.state = LexState::Scripting;
                    return self.token(TokenKind::OpenTag);
                }
                if self.at(0, b'=') {
                    self.bump();
                    self.state = LexState::Scripting;
                    return self.token(TokenKind::OpenTagEcho);
                }
                if self.features.short_open_tags {
                    self.state = LexState::Scripting;
                    return self.token(TokenKind::OpenTag);
                }
                // A bare `<?` with short tags disabled stays HTML.
                consumed = true;
                continue;
            }

            self.bump();
            consumed = true;
        }
    }

    /// An open tag swallows a single following whitespace character, with
    /// `\r\n` counting as one.
    fn consume_tag_whitespace(&mut self) {
        match self.peek(0) {
            c if c == b'\r' as u16 => {
                self.bump();
                if self.at(0, b'\n') {
                    self.bump();
                }
            }
            c if c == b'\n' as u16 || c == b' ' as u16 || c == b'\t' as u16 => {
                self.bump();
            }
            _ => {}
        }
    }

    // ST_IN_SCRIPTING.

    fn scan_scripting(&mut self) -> Token {
        let c = self.peek(0);
        if c == EOF_CHAR {
            return self.token(TokenKind::End);
        }
        if Self::is_ws(c) {
            return self.scan_whitespace_run();
        }
        let c = self.bump() as u8;

        match c {
            b'?' => {
                if self.at(0, b'>') {
                    self.bump();
                    self.consume_close_tag_newline();
                    self.state = LexState::Initial;
                    return self.token(TokenKind::CloseTag);
                }
                if self.at(0, b'?') {
                    self.bump();
                    if self.at(0, b'=') {
                        self.bump();
                        return self.token(TokenKind::CoalesceEq);
                    }
                    return self.token(TokenKind::Coalesce);
                }
                self.token(TokenKind::Question)
            }
            b'#' => self.scan_line_comment(),
            b'/' => {
                if self.at(0, b'/') {
                    self.bump();
                    self.scan_line_comment()
                } else if self.at(0, b'*') {
                    self.bump();
                    self.scan_block_comment()
                } else if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::DivEq)
                } else {
                    self.token(TokenKind::Slash)
                }
            }
            b'$' => {
                if Self::is_ident_start(self.peek(0)) {
                    self.read_ident_chars();
                    let name = {
                        self.buf.mark_token_end();
                        TokenValue::from_raw(&self.buf.text()[1..])
                    };
                    self.token_with(TokenKind::Variable, name)
                } else {
                    self.token(TokenKind::Dollar)
                }
            }
            b'\'' => self.scan_single_quoted(false),
            b'"' => self.probe_double_quoted(false),
            b'`' => {
                self.push_state(LexState::Backquote);
                self.token(TokenKind::Backtick)
            }
            b'\\' => self.token(TokenKind::NsSeparator),
            b';' => self.token(TokenKind::SemiColon),
            b',' => self.token(TokenKind::Comma),
            b'@' => self.token(TokenKind::At),
            b'~' => self.token(TokenKind::BitNot),
            b':' => {
                if self.at(0, b':') {
                    self.bump();
                    self.token(TokenKind::DoubleColon)
                } else {
                    self.token(TokenKind::Colon)
                }
            }
            b'{' => {
                self.push_state(LexState::Scripting);
                self.token(TokenKind::OpenBrace)
            }
            b'}' => {
                if !self.pop_state() {
                    return self.lex_error("unmatched '}'");
                }
                self.doc_comment = None;
                self.token(TokenKind::CloseBrace)
            }
            b'(' => self.scan_open_paren_or_cast(),
            b')' => self.token(TokenKind::CloseParen),
            b'[' => self.token(TokenKind::OpenBracket),
            b']' => self.token(TokenKind::CloseBracket),
            b'+' => {
                if self.at(0, b'+') {
                    self.bump();
                    self.token(TokenKind::Inc)
                } else if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::PlusEq)
                } else {
                    self.token(TokenKind::Plus)
                }
            }
            b'-' => {
                if self.at(0, b'>') {
                    self.bump();
                    self.push_state(LexState::LookingForProperty);
                    self.token(TokenKind::Arrow)
                } else if self.at(0, b'-') {
                    self.bump();
                    self.token(TokenKind::Dec)
                } else if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::MinusEq)
                } else {
                    self.token(TokenKind::Minus)
                }
            }
            b'*' => {
                if self.at(0, b'*') {
                    self.bump();
                    if self.at(0, b'=') {
                        self.bump();
                        self.token(TokenKind::PowEq)
                    } else {
                        self.token(TokenKind::Pow)
                    }
                } else if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::MulEq)
                } else {
                    self.token(TokenKind::Asterisk)
                }
            }
            b'%' => {
                if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::ModEq)
                } else {
                    self.token(TokenKind::Percent)
                }
            }
            b'.' => {
                if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::ConcatEq)
                } else if self.at(0, b'.') && self.at(1, b'.') {
                    self.bump();
                    self.bump();
                    self.token(TokenKind::Ellipsis)
                } else if Self::is_digit(self.peek(0)) {
                    self.scan_number(b'.')
                } else {
                    self.token(TokenKind::Dot)
                }
            }
            b'=' => {
                if self.at(0, b'=') {
                    self.bump();
                    if self.at(0, b'=') {
                        self.bump();
                        self.token(TokenKind::EqEqEq)
                    } else {
                        self.token(TokenKind::EqEq)
                    }
                } else if self.at(0, b'>') {
                    self.bump();
                    self.token(TokenKind::DoubleArrow)
                } else {
                    self.token(TokenKind::Eq)
                }
            }
            b'!' => {
                if self.at(0, b'=') {
                    self.bump();
                    if self.at(0, b'=') {
                        self.bump();
                        self.token(TokenKind::BangEqEq)
                    } else {
                        self.token(TokenKind::BangEq)
                    }
                } else {
                    self.token(TokenKind::Bang)
                }
            }
            b'<' => {
                if self.at(0, b'<') && self.at(1, b'<') {
                    self.bump();
                    self.bump();
                    self.scan_heredoc_start()
                } else if self.at(0, b'=') {
                    self.bump();
                    if self.at(0, b'>') {
                        self.bump();
                        self.token(TokenKind::Spaceship)
                    } else {
                        self.token(TokenKind::LtEq)
                    }
                } else if self.at(0, b'<') {
                    self.bump();
                    if self.at(0, b'=') {
                        self.bump();
                        self.token(TokenKind::SlEq)
                    } else {
                        self.token(TokenKind::Sl)
                    }
                } else if self.at(0, b'>') {
                    self.bump();
                    self.token(TokenKind::BangEq)
                } else {
                    self.token(TokenKind::Lt)
                }
            }
            b'>' => {
                if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::GtEq)
                } else if self.at(0, b'>') {
                    self.bump();
                    if self.at(0, b'=') {
                        self.bump();
                        self.token(TokenKind::SrEq)
                    } else {
                        self.token(TokenKind::Sr)
                    }
                } else {
                    self.token(TokenKind::Gt)
                }
            }
            b'&' => {
                if self.at(0, b'&') {
                    self.bump();
                    self.token(TokenKind::AmpersandAmpersand)
                } else if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::AndEq)
                } else {
                    self.token(TokenKind::Ampersand)
                }
            }
            b'|' => {
                if self.at(0, b'|') {
                    self.bump();
                    self.token(TokenKind::PipePipe)
                } else if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::OrEq)
                } else {
                    self.token(TokenKind::Pipe)
                }
            }
            b'^' => {
                if self.at(0, b'=') {
                    self.bump();
                    self.token(TokenKind::XorEq)
                } else {
                    self.token(TokenKind::Caret)
                }
            }
            c if c.is_ascii_digit() => self.scan_number(c),
            c if c.is_ascii_alphabetic() || c == b'_' || c >= 0x80 => {
                self.scan_identifier_or_keyword(c)
            }
            _ => self.lex_error("unexpected character"),
        }
    }

    fn consume_close_tag_newline(&mut self) {
        if self.at(0, b'\r') {
            self.bump();
            if self.at(0, b'\n') {
                self.bump();
            }
        } else if self.at(0, b'\n') {
            self.bump();
        }
    }

    fn scan_whitespace_run(&mut self) -> Token {
        while Self::is_ws(self.peek(0)) {
            self.bump();
        }
        self.token(TokenKind::Whitespace)
    }

    /// One-line comment. The newline is left to the following whitespace
    /// token; a close tag also ends the comment without being consumed.
    fn scan_line_comment(&mut self) -> Token {
        loop {
            let c = self.peek(0);
            if c == EOF_CHAR || c == b'\n' as u16 || c == b'\r' as u16 {
                break;
            }
            if c == b'?' as u16 && self.at(1, b'>') {
                break;
            }
            self.bump();
        }
        self.token(TokenKind::Comment)
    }

    fn scan_block_comment(&mut self) -> Token {
        let is_doc = self.at(0, b'*') && !self.at(1, b'/');
        loop {
            let c = self.bump();
            if c == EOF_CHAR {
                return self.lex_error("unterminated comment");
            }
            if c == b'*' as u16 && self.at(0, b'/') {
                self.bump();
                break;
            }
        }
        if is_doc {
            let text = {
                self.buf.mark_token_end();
                String::from_utf8_lossy(self.buf.text()).into_owned()
            };
            self.doc_comment = Some(text);
            self.token(TokenKind::DocComment)
        } else {
            self.token(TokenKind::Comment)
        }
    }

    fn scan_open_paren_or_cast(&mut self) -> Token {
        let save = self.buf.lookahead_pos();
        while self.at(0, b' ') || self.at(0, b'\t') {
            self.bump();
        }
        let mut word = Vec::new();
        while Self::is_ident_char(self.peek(0)) {
            word.push(self.bump() as u8);
        }
        while self.at(0, b' ') || self.at(0, b'\t') {
            self.bump();
        }
        if !word.is_empty() && self.at(0, b')') {
            let kind = match word.to_ascii_lowercase().as_slice() {
                b"int" | b"integer" => Some(TokenKind::IntCast),
                b"bool" | b"boolean" => Some(TokenKind::BoolCast),
                b"float" | b"double" | b"real" => Some(TokenKind::FloatCast),
                b"string" => Some(TokenKind::StringCast),
                b"binary" => Some(TokenKind::BinaryCast),
                b"array" => Some(TokenKind::ArrayCast),
                b"object" => Some(TokenKind::ObjectCast),
                b"unset" => Some(TokenKind::UnsetCast),
                _ => None,
            };
            if let Some(kind) = kind {
                self.bump();
                return self.token(kind);
            }
        }
        self.buf.set_lookahead(save);
        self.token(TokenKind::OpenParen)
    }

    fn scan_identifier_or_keyword(&mut self, first: u8) -> Token {
        if (first == b'b' || first == b'B') && (self.at(0, b'\'') || self.at(0, b'"')) {
            let quote = self.bump() as u8;
            return if quote == b'\'' {
                self.scan_single_quoted(true)
            } else {
                self.probe_double_quoted(true)
            };
        }

        self.read_ident_chars();
        let lower = {
            self.buf.mark_token_end();
            self.buf.text().to_ascii_lowercase()
        };

        match keyword(&lower) {
            Some(TokenKind::Yield) => {
                // `yield from` is one token, whitespace included.
                let save = self.buf.lookahead_pos();
                let mut saw_ws = false;
                while Self::is_ws(self.peek(0)) {
                    self.bump();
                    saw_ws = true;
                }
                let is_from = saw_ws
                    && (self.peek(0) | 0x20) == b'f' as u16
                    && (self.peek(1) | 0x20) == b'r' as u16
                    && (self.peek(2) | 0x20) == b'o' as u16
                    && (self.peek(3) | 0x20) == b'm' as u16
                    && !Self::is_ident_char(self.peek(4));
                if is_from {
                    self.buf.advance_n(4);
                    self.token(TokenKind::YieldFrom)
                } else {
                    self.buf.set_lookahead(save);
                    self.token(TokenKind::Yield)
                }
            }
            Some(TokenKind::HaltCompiler) => {
                self.state = LexState::Halt1;
                self.token(TokenKind::HaltCompiler)
            }
            Some(kind) => {
                // Keywords keep their spelling; member names may reuse it.
                let text = {
                    self.buf.mark_token_end();
                    TokenValue::from_raw(self.buf.text())
                };
                self.token_with(kind, text)
            }
            None => {
                let name = {
                    self.buf.mark_token_end();
                    TokenValue::from_raw(self.buf.text())
                };
                self.token_with(TokenKind::Identifier, name)
            }
        }
    }

    fn scan_number(&mut self, first: u8) -> Token {
        let mut is_real = first == b'.';

        if first == b'0' && (self.peek(0) | 0x20) == b'x' as u16 {
            let next = self.peek(1);
            if hex_digit(next) {
                self.bump();
                while hex_digit(self.peek(0)) || self.at(0, b'_') {
                    self.bump();
                }
                return self.finish_integer();
            }
        }
        if first == b'0' && (self.peek(0) | 0x20) == b'b' as u16 {
            let next = self.peek(1);
            if next == b'0' as u16 || next == b'1' as u16 {
                self.bump();
                while self.at(0, b'0') || self.at(0, b'1') || self.at(0, b'_') {
                    self.bump();
                }
                return self.finish_integer();
            }
        }

        while Self::is_digit(self.peek(0)) || self.at(0, b'_') {
            self.bump();
        }

        if !is_real && self.at(0, b'.') && !self.at(1, b'.') {
            is_real = true;
            self.bump();
            while Self::is_digit(self.peek(0)) || self.at(0, b'_') {
                self.bump();
            }
        } else if is_real {
            while Self::is_digit(self.peek(0)) || self.at(0, b'_') {
                self.bump();
            }
        }

        let e = self.peek(0) | 0x20;
        if e == b'e' as u16 {
            let after_sign = if self.at(1, b'+') || self.at(1, b'-') { 2 } else { 1 };
            if Self::is_digit(self.peek(after_sign)) {
                is_real = true;
                self.buf.advance_n(after_sign);
                while Self::is_digit(self.peek(0)) || self.at(0, b'_') {
                    self.bump();
                }
            }
        }

        if is_real {
            let (value, format) = {
                self.buf.mark_token_end();
                decode::decode_real(self.buf.text())
            };
            self.literal_token(TokenKind::DNumber, TokenValue::Double(value), format)
        } else {
            self.finish_integer()
        }
    }

    fn finish_integer(&mut self) -> Token {
        self.buf.mark_token_end();
        let span = Span::new(
            self.bias + self.buf.token_start(),
            self.bias + self.buf.token_end(),
        );
        let raw = self.buf.text().to_vec();
        let (value, format) = decode::decode_integer(&raw, span, &mut self.diags);
        let kind = match value {
            TokenValue::Int(_) => TokenKind::LNumber,
            _ => TokenKind::DNumber,
        };
        self.literal_token(kind, value, format)
    }

    fn scan_single_quoted(&mut self, binary: bool) -> Token {
        let body_start = self.buf.lookahead_pos();
        loop {
            let c = self.bump();
            if c == EOF_CHAR {
                return self.lex_error("unterminated string literal");
            }
            if c == b'\\' as u16 {
                if self.peek(0) != EOF_CHAR {
                    self.bump();
                }
                continue;
            }
            if c == b'\'' as u16 {
                break;
            }
        }
        let inner = self
            .buf
            .slice(body_start, self.buf.lookahead_pos() - 1)
            .to_vec();
        let value = decode::decode_single_quoted(&inner, binary);
        self.literal_token(
            TokenKind::ConstantEncapsedString,
            value,
            LiteralFormat::SingleQuoted,
        )
    }

    /// Scans ahead in a double-quoted body. Without interpolation the whole
    /// literal is one token; otherwise the scanner rewinds to just past the
    /// opening quote and hands over to the interpolation state.
    fn probe_double_quoted(&mut self, binary: bool) -> Token {
        let body_start = self.buf.lookahead_pos();
        loop {
            let c = self.bump();
            if c == EOF_CHAR {
                return self.lex_error("unterminated string literal");
            }
            if c == b'\\' as u16 {
                if self.peek(0) != EOF_CHAR {
                    self.bump();
                }
                continue;
            }
            if c == b'"' as u16 {
                let end = self.buf.lookahead_pos() - 1;
                let inner = self.buf.slice(body_start, end).to_vec();
                let span = Span::new(
                    self.bias + self.buf.token_start(),
                    self.bias + self.buf.lookahead_pos(),
                );
                let value = decode::decode_escaped(
                    &inner,
                    EscapeMode::Double,
                    binary,
                    span,
                    &mut self.diags,
                );
                return self.literal_token(
                    TokenKind::ConstantEncapsedString,
                    value,
                    LiteralFormat::DoubleQuoted,
                );
            }
            let interpolates = (c == b'$' as u16
                && (Self::is_ident_start(self.peek(0)) || self.at(0, b'{')))
                || (c == b'{' as u16 && self.at(0, b'$'));
            if interpolates {
                self.buf.set_lookahead(body_start);
                self.push_state(LexState::DoubleQuotes);
                return self.token(TokenKind::DoubleQuote);
            }
        }
    }

    // ST_DOUBLE_QUOTES / ST_BACKQUOTE.

    fn scan_interpolated(&mut self, quote: u8) -> Token {
        let c = self.peek(0);
        if c == EOF_CHAR {
            self.stack.clear();
            self.state = LexState::Scripting;
            return self.lex_error("unterminated string literal");
        }

        if c == quote as u16 {
            self.bump();
            self.pop_state();
            let kind = if quote == b'"' {
                TokenKind::DoubleQuote
            } else {
                TokenKind::Backtick
            };
            return self.token(kind);
        }

        if let Some(token) = self.scan_interpolation_point() {
            return token;
        }

        // Literal chunk up to the next interpolation point or the close.
        loop {
            let c = self.peek(0);
            if c == EOF_CHAR || c == quote as u16 {
                break;
            }
            if c == b'$' as u16
                && (Self::is_ident_start(self.peek(1)) || self.at(1, b'{'))
            {
                break;
            }
            if c == b'{' as u16 && self.at(1, b'$') {
                break;
            }
            if c == b'\\' as u16 {
                self.bump();
                if self.peek(0) != EOF_CHAR {
                    self.bump();
                }
                continue;
            }
            self.bump();
        }

        let mode = if quote == b'"' {
            EscapeMode::Double
        } else {
            EscapeMode::Backquote
        };
        self.finish_encapsed_chunk(mode)
    }

    /// `$name`, `${`, and `{$` inside any interpolated context. Returns
    /// `None` when the cursor is not on an interpolation point.
    fn scan_interpolation_point(&mut self) -> Option<Token> {
        let c = self.peek(0);

        if c == b'$' as u16 && Self::is_ident_start(self.peek(1)) {
            self.bump();
            self.read_ident_chars();
            let name = {
                self.buf.mark_token_end();
                TokenValue::from_raw(&self.buf.text()[1..])
            };
            if self.at(0, b'[') {
                self.push_state(LexState::VarOffset);
            } else if self.at(0, b'-') && self.at(1, b'>') && Self::is_ident_start(self.peek(2)) {
                self.push_state(LexState::LookingForProperty);
            }
            return Some(self.token_with(TokenKind::Variable, name));
        }

        if c == b'$' as u16 && self.at(1, b'{') {
            self.bump();
            self.bump();
            self.push_state(LexState::LookingForVarname);
            return Some(self.token(TokenKind::DollarOpenCurlyBraces));
        }

        if c == b'{' as u16 && self.at(1, b'$') {
            self.bump();
            self.push_state(LexState::Scripting);
            return Some(self.token(TokenKind::CurlyOpen));
        }

        None
    }

    fn finish_encapsed_chunk(&mut self, mode: EscapeMode) -> Token {
        self.buf.mark_token_end();
        let span = Span::new(
            self.bias + self.buf.token_start(),
            self.bias + self.buf.token_end(),
        );
        let raw = self.buf.text().to_vec();
        let value = decode::decode_escaped(&raw, mode, false, span, &mut self.diags);
        self.literal_token(TokenKind::EncapsedAndWhitespace, value, LiteralFormat::None)
    }

    // Heredoc and nowdoc.

    fn scan_heredoc_start(&mut self) -> Token {
        while self.at(0, b' ') || self.at(0, b'\t') {
            self.bump();
        }

        let quote = self.peek(0);
        let is_nowdoc = quote == b'\'' as u16;
        let is_quoted = is_nowdoc || quote == b'"' as u16;
        if is_quoted {
            self.bump();
        }

        if !Self::is_ident_start(self.peek(0)) {
            return self.lex_error("missing heredoc label");
        }
        let label_start = self.buf.lookahead_pos();
        self.read_ident_chars();
        let label = self.buf.slice(label_start, self.buf.lookahead_pos()).to_vec();

        if is_quoted {
            if self.peek(0) == quote {
                self.bump();
            } else {
                return self.lex_error("unterminated heredoc label");
            }
        }

        if self.at(0, b'\r') {
            self.bump();
            if self.at(0, b'\n') {
                self.bump();
            }
        } else if self.at(0, b'\n') {
            self.bump();
        } else {
            return self.lex_error("newline expected after heredoc label");
        }

        let value = TokenValue::from_raw(&label);
        if is_nowdoc {
            self.push_state(LexState::Nowdoc(label));
        } else {
            self.push_state(LexState::Heredoc(label));
        }
        self.token_with(TokenKind::StartHeredoc, value)
    }

    /// True when the line starting at `lookahead + offset` is the closing
    /// label line: the label at column zero, an optional `;`, then a line
    /// break or the end of input.
    fn heredoc_end_ahead(&mut self, label: &[u8], offset: usize) -> bool {
        for (i, &b) in label.iter().enumerate() {
            if self.peek(offset + i) != b as u16 {
                return false;
            }
        }
        let mut k = offset + label.len();
        if self.peek(k) == b';' as u16 {
            k += 1;
        }
        let c = self.peek(k);
        c == b'\r' as u16 || c == b'\n' as u16 || c == EOF_CHAR
    }

    fn scan_heredoc(&mut self, label: &[u8], interpolate: bool) -> Token {
        if self.peek(0) == EOF_CHAR {
            self.stack.clear();
            self.state = LexState::Scripting;
            return self.lex_error("unterminated heredoc");
        }

        if self.at_bol && self.heredoc_end_ahead(label, 0) {
            self.state = LexState::EndHeredoc(label.to_vec());
            return self.scan_end_heredoc(label);
        }

        if interpolate {
            if let Some(token) = self.scan_interpolation_point() {
                return token;
            }
        }

        loop {
            let c = self.peek(0);
            if c == EOF_CHAR {
                break;
            }
            if interpolate {
                if c == b'$' as u16
                    && (Self::is_ident_start(self.peek(1)) || self.at(1, b'{'))
                {
                    break;
                }
                if c == b'{' as u16 && self.at(1, b'$') {
                    break;
                }
                if c == b'\\' as u16
                    && self.peek(1) != EOF_CHAR
                    && !self.at(1, b'\n')
                    && !self.at(1, b'\r')
                {
                    self.bump();
                    self.bump();
                    continue;
                }
            }
            self.bump();
            if c == b'\n' as u16 && self.heredoc_end_ahead(label, 0) {
                break;
            }
        }

        if interpolate {
            self.finish_encapsed_chunk(EscapeMode::Heredoc)
        } else {
            let value = {
                self.buf.mark_token_end();
                TokenValue::from_raw(self.buf.text())
            };
            self.token_with(TokenKind::EncapsedAndWhitespace, value)
        }
    }

    fn scan_end_heredoc(&mut self, label: &[u8]) -> Token {
        self.buf.advance_n(label.len());
        self.pop_state();
        let value = TokenValue::from_raw(label);
        self.token_with(TokenKind::EndHeredoc, value)
    }

    // ST_LOOKING_FOR_PROPERTY.

    fn scan_property_name(&mut self) -> Token {
        let c = self.peek(0);
        if Self::is_ws(c) {
            return self.scan_whitespace_run();
        }
        if c == b'-' as u16 && self.at(1, b'>') {
            self.bump();
            self.bump();
            return self.token(TokenKind::Arrow);
        }
        if Self::is_ident_start(c) {
            self.read_ident_chars();
            self.pop_state();
            let name = {
                self.buf.mark_token_end();
                TokenValue::from_raw(self.buf.text())
            };
            return self.token_with(TokenKind::Identifier, name);
        }
        // Not a property name after all; resume where we were.
        self.pop_state();
        self.dispatch()
    }

    // ST_LOOKING_FOR_VARNAME.

    fn scan_varname(&mut self) -> Token {
        if Self::is_ident_start(self.peek(0)) {
            let mut len = 1;
            while Self::is_ident_char(self.peek(len)) {
                len += 1;
            }
            let after = self.peek(len);
            if after == b'}' as u16 || after == b'[' as u16 {
                self.buf.advance_n(len);
                self.state = LexState::Scripting;
                let name = {
                    self.buf.mark_token_end();
                    TokenValue::from_raw(self.buf.text())
                };
                return self.token_with(TokenKind::StringVarname, name);
            }
        }
        // A full expression follows instead of a simple name.
        self.state = LexState::Scripting;
        self.dispatch()
    }

    // ST_VAR_OFFSET.

    fn scan_var_offset(&mut self) -> Token {
        let c = self.peek(0);
        match c {
            EOF_CHAR => {
                self.pop_state();
                self.dispatch()
            }
            c if c == b']' as u16 => {
                self.bump();
                self.pop_state();
                self.token(TokenKind::CloseBracket)
            }
            c if c == b'[' as u16 => {
                self.bump();
                self.token(TokenKind::OpenBracket)
            }
            c if c == b'-' as u16 => {
                self.bump();
                self.token(TokenKind::Minus)
            }
            c if Self::is_digit(c) => {
                while Self::is_digit(self.peek(0)) {
                    self.bump();
                }
                let value = {
                    self.buf.mark_token_end();
                    decode::decode_num_string(self.buf.text())
                };
                self.token_with(TokenKind::NumString, value)
            }
            c if c == b'$' as u16 && Self::is_ident_start(self.peek(1)) => {
                self.bump();
                self.read_ident_chars();
                let name = {
                    self.buf.mark_token_end();
                    TokenValue::from_raw(&self.buf.text()[1..])
                };
                self.token_with(TokenKind::Variable, name)
            }
            c if Self::is_ident_start(c) => {
                self.read_ident_chars();
                let name = {
                    self.buf.mark_token_end();
                    TokenValue::from_raw(self.buf.text())
                };
                self.token_with(TokenKind::Identifier, name)
            }
            _ => {
                self.bump();
                self.lex_error("unexpected character in variable offset")
            }
        }
    }

    // ST_HALT_COMPILER1..3: `(`, `)`, `;`, with trivia in between.

    fn scan_halt(&mut self) -> Token {
        let c = self.peek(0);
        if c == EOF_CHAR {
            return self.token(TokenKind::End);
        }
        if Self::is_ws(c) {
            return self.scan_whitespace_run();
        }
        if c == b'#' as u16 {
            self.bump();
            return self.scan_line_comment();
        }
        if c == b'/' as u16 && self.at(1, b'/') {
            self.bump();
            self.bump();
            return self.scan_line_comment();
        }
        if c == b'/' as u16 && self.at(1, b'*') {
            self.bump();
            self.bump();
            return self.scan_block_comment();
        }

        match (self.state.clone(), c) {
            (LexState::Halt1, c) if c == b'(' as u16 => {
                self.bump();
                self.state = LexState::Halt2;
                self.token(TokenKind::OpenParen)
            }
            (LexState::Halt2, c) if c == b')' as u16 => {
                self.bump();
                self.state = LexState::Halt3;
                self.token(TokenKind::CloseParen)
            }
            (LexState::Halt3, c) if c == b';' as u16 => {
                self.bump();
                self.stack.clear();
                self.state = LexState::Initial;
                self.token(TokenKind::SemiColon)
            }
            (LexState::Halt3, c) if c == b'?' as u16 && self.at(1, b'>') => {
                self.bump();
                self.bump();
                self.consume_close_tag_newline();
                self.stack.clear();
                self.state = LexState::Initial;
                self.token(TokenKind::CloseTag)
            }
            _ => {
                self.bump();
                self.lex_error("unexpected token in __halt_compiler")
            }
        }
    }
}

fn hex_digit(c: u16) -> bool {
    (c >= b'0' as u16 && c <= b'9' as u16)
        || (c >= b'a' as u16 && c <= b'f' as u16)
        || (c >= b'A' as u16 && c <= b'F' as u16)
}

impl<S: CharSource> Iterator for Lexer<S> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.fused {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::End {
            self.fused = true;
        }
        Some(token)
    }
}
