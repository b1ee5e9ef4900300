mod expr;

use tracing::debug;

use crate::ast::builder::AstBuilder;
use crate::ast::{
    Ast, CatchClause, ConstEntry, DeclareDirective, MemberId, MemberKind, Modifier, NameForm,
    NodeRef, Param, PropertyEntry, QName, StaticVar, StmtId, StmtKind, SwitchCase,
    TraitAdaptation, TraitMethodRef, TypeKind, TypeRefId, UseItem, UseKind, DOC_COMMENT_PROP,
    HALT_OFFSET_PROP,
};
use crate::diag::{Diagnostic, DiagnosticCode, Severity};
use crate::lexer::token::{Token, TokenKind, TokenValue};
use crate::lexer::Lexer;
use crate::source::{CharSource, SliceSource};
use crate::span::Span;

/// Result of a parse: the tree, its root, and everything that went wrong.
/// A parse always returns; on failure the tree is partial and at least one
/// error diagnostic is present.
#[derive(Debug)]
pub struct Parse {
    pub ast: Ast,
    pub root: StmtId,
    pub diagnostics: Vec<Diagnostic>,
}

impl Parse {
    pub fn ok(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

pub struct Parser<S: CharSource> {
    lexer: Lexer<S>,
    pub(crate) builder: AstBuilder,
    pub(crate) current: Token,
    pub(crate) next: Token,
    pub(crate) last_end: usize,
    pub(crate) diags: Vec<Diagnostic>,
    current_doc: Option<String>,
    next_doc: Option<String>,
    depth: u32,
    halted: bool,
}

impl<'src> Parser<SliceSource<'src>> {
    pub fn new(lexer: Lexer<SliceSource<'src>>) -> Self {
        Self::from_lexer(lexer)
    }
}

impl<S: CharSource> Parser<S> {
    pub fn from_lexer(lexer: Lexer<S>) -> Self {
        let mut parser = Self {
            lexer,
            builder: AstBuilder::new(),
            current: Token::new(TokenKind::End, Span::default()),
            next: Token::new(TokenKind::End, Span::default()),
            last_end: 0,
            diags: Vec::new(),
            current_doc: None,
            next_doc: None,
            depth: 0,
            halted: false,
        };
        parser.bump();
        parser.bump();
        parser.last_end = 0;
        parser
    }

    /// Advances past the current token, skipping trivia and collecting
    /// lexer diagnostics in order.
    pub(crate) fn bump(&mut self) {
        self.last_end = self.current.span.end;
        self.current = std::mem::replace(
            &mut self.next,
            Token::new(TokenKind::End, Span::default()),
        );
        self.current_doc = self.next_doc.take();

        let mut doc = None;
        loop {
            let token = self.lexer.next_token();
            self.lexer.drain_diagnostics(&mut self.diags);
            if token.kind.is_trivia() {
                if token.kind == TokenKind::DocComment {
                    doc = self.lexer.take_doc_comment();
                }
                continue;
            }
            self.next = token;
            self.next_doc = doc;
            break;
        }
    }

    /// Takes the text payload of the current token.
    pub(crate) fn take_text(&mut self) -> String {
        match std::mem::take(&mut self.current.value) {
            TokenValue::Text(s) => s,
            TokenValue::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
            _ => String::new(),
        }
    }

    pub(crate) fn error_unexpected(&mut self, expected: &str) {
        let message = format!(
            "syntax error, unexpected {} expecting {}",
            self.current.kind.name(),
            expected
        );
        self.diags.push(Diagnostic {
            severity: Severity::Error,
            code: DiagnosticCode::UnexpectedToken,
            span: self.current.span,
            message,
        });
    }

    pub(crate) fn syntax_error(&mut self, message: &str) {
        self.diags.push(Diagnostic {
            severity: Severity::Error,
            code: DiagnosticCode::SyntaxError,
            span: self.current.span,
            message: message.to_string(),
        });
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> bool {
        if self.current.kind == kind {
            self.bump();
            true
        } else {
            self.error_unexpected(kind.name());
            false
        }
    }

    /// A statement terminator is `;`, a close tag, `}` or end of input.
    pub(crate) fn expect_semicolon(&mut self) {
        match self.current.kind {
            TokenKind::SemiColon => self.bump(),
            TokenKind::CloseTag => self.bump(),
            TokenKind::End | TokenKind::CloseBrace => {}
            _ => {
                self.error_unexpected("';'");
                self.sync_statement();
            }
        }
    }

    /// Panic-mode recovery: discard tokens up to a statement boundary.
    fn sync_statement(&mut self) {
        debug!("recovering: discarding tokens to a statement boundary");
        while !matches!(
            self.current.kind,
            TokenKind::SemiColon | TokenKind::CloseBrace | TokenKind::CloseTag | TokenKind::End
        ) {
            self.bump();
        }
        if self.current.kind == TokenKind::SemiColon {
            self.bump();
        }
    }

    /// Open and close tags are statement-list trivia.
    fn skip_tags(&mut self) {
        while matches!(self.current.kind, TokenKind::OpenTag | TokenKind::CloseTag) {
            self.bump();
        }
    }

    pub(crate) fn alloc_stmt(&mut self, kind: StmtKind, start: usize) -> StmtId {
        let span = Span::new(start, self.last_end.max(start));
        self.builder.stmt(kind, span)
    }

    // --- Program ---------------------------------------------------------

    pub fn parse_program(mut self) -> Parse {
        let mut stmts = Vec::new();
        loop {
            self.skip_tags();
            if self.halted || self.current.kind == TokenKind::End {
                break;
            }
            stmts.push(self.parse_stmt());
        }

        let mut span = Span::INVALID;
        for &s in &stmts {
            span = span.combine(self.builder.stmt_span(s));
        }
        if !span.is_valid() {
            span = Span::default();
        }
        let root = self.builder.stmt(StmtKind::GlobalCode { stmts }, span);

        debug_assert!(self.lexer.buffer_invariants_hold());
        Parse {
            ast: self.builder.finish(),
            root,
            diagnostics: self.diags,
        }
    }

    // --- Statements ------------------------------------------------------

    pub(crate) fn parse_stmt(&mut self) -> StmtId {
        let doc = self.current_doc.take();
        let id = self.parse_stmt_inner();
        if let Some(doc) = doc {
            let is_decl = matches!(
                self.builder.ast().stmt(id).kind,
                StmtKind::Function { .. }
                    | StmtKind::Class { .. }
                    | StmtKind::Interface { .. }
                    | StmtKind::Trait { .. }
                    | StmtKind::ConstDecl { .. }
            );
            if is_decl {
                self.builder
                    .props_mut(NodeRef::Stmt(id))
                    .set(DOC_COMMENT_PROP, doc);
            }
        }
        id
    }

    fn parse_stmt_inner(&mut self) -> StmtId {
        if self.current.kind == TokenKind::Identifier && self.next.kind == TokenKind::Colon {
            let start = self.current.span.start;
            let name = self.take_text();
            self.bump();
            self.bump();
            return self.alloc_stmt(StmtKind::Label { name }, start);
        }

        match self.current.kind {
            TokenKind::SemiColon => {
                let span = self.current.span;
                self.bump();
                self.builder.stmt(StmtKind::Nop, span)
            }
            TokenKind::InlineHtml => {
                let start = self.current.span.start;
                let text = match std::mem::take(&mut self.current.value) {
                    TokenValue::Text(s) => s.into_bytes(),
                    TokenValue::Bytes(b) => b,
                    _ => Vec::new(),
                };
                self.bump();
                self.alloc_stmt(StmtKind::InlineHtml { text }, start)
            }
            TokenKind::OpenBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => self.parse_break_continue(true),
            TokenKind::Continue => self.parse_break_continue(false),
            TokenKind::Return => self.parse_return(),
            TokenKind::Goto => self.parse_goto(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Global => self.parse_global(),
            TokenKind::Echo | TokenKind::OpenTagEcho => self.parse_echo(),
            TokenKind::Unset => self.parse_unset(),
            TokenKind::Declare => self.parse_declare(),
            TokenKind::Namespace if self.next.kind != TokenKind::NsSeparator => {
                self.parse_namespace()
            }
            TokenKind::Use => self.parse_use(),
            TokenKind::Const => self.parse_const_decl(),
            TokenKind::Function => self.parse_function_stmt(),
            TokenKind::Abstract | TokenKind::Final => self.parse_class_with_modifiers(),
            TokenKind::Class => {
                let start = self.current.span.start;
                self.parse_class_decl(Vec::new(), start)
            }
            TokenKind::Interface => self.parse_interface(),
            TokenKind::Trait => self.parse_trait(),
            TokenKind::HaltCompiler => self.parse_halt_compiler(),
            TokenKind::Static if self.next.kind == TokenKind::Variable => {
                self.parse_static_vars()
            }
            TokenKind::Error => {
                let start = self.current.span.start;
                self.error_unexpected("statement");
                self.bump();
                self.alloc_stmt(StmtKind::Error, start)
            }
            _ => {
                let start = self.current.span.start;
                let expr = self.parse_expr(0);
                self.expect_semicolon();
                self.alloc_stmt(StmtKind::Expr { expr }, start)
            }
        }
    }

    fn parse_embedded_stmt(&mut self) -> StmtId {
        self.depth += 1;
        let id = self.parse_stmt();
        self.depth -= 1;
        id
    }

    pub(crate) fn parse_block(&mut self) -> StmtId {
        let start = self.current.span.start;
        if !self.expect(TokenKind::OpenBrace) {
            return self.alloc_stmt(StmtKind::Error, start);
        }
        self.depth += 1;
        let mut stmts = Vec::new();
        loop {
            self.skip_tags();
            if self.halted
                || matches!(self.current.kind, TokenKind::CloseBrace | TokenKind::End)
            {
                break;
            }
            stmts.push(self.parse_stmt());
        }
        self.depth -= 1;
        self.expect(TokenKind::CloseBrace);
        self.alloc_stmt(StmtKind::Block { stmts }, start)
    }

    /// Alternative-syntax body: statements up to one of `terminators`,
    /// wrapped in a block.
    fn parse_alt_body(&mut self, terminators: &[TokenKind]) -> StmtId {
        let start = self.current.span.start;
        self.depth += 1;
        let mut stmts = Vec::new();
        loop {
            self.skip_tags();
            if self.halted
                || self.current.kind == TokenKind::End
                || terminators.contains(&self.current.kind)
            {
                break;
            }
            stmts.push(self.parse_stmt());
        }
        self.depth -= 1;
        self.alloc_stmt(StmtKind::Block { stmts }, start)
    }

    fn parse_if(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        self.parse_if_rest(start)
    }

    fn parse_if_rest(&mut self, start: usize) -> StmtId {
        self.expect(TokenKind::OpenParen);
        let cond = self.parse_expr(0);
        self.expect(TokenKind::CloseParen);

        if self.current.kind == TokenKind::Colon {
            self.bump();
            let then = self.parse_alt_body(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf]);
            let else_ = match self.current.kind {
                TokenKind::ElseIf => {
                    let s = self.current.span.start;
                    self.bump();
                    Some(self.parse_if_rest(s))
                }
                TokenKind::Else => {
                    self.bump();
                    self.expect(TokenKind::Colon);
                    let body = self.parse_alt_body(&[TokenKind::EndIf]);
                    if self.current.kind == TokenKind::EndIf {
                        self.bump();
                        self.expect_semicolon();
                    } else {
                        self.error_unexpected("'endif'");
                    }
                    Some(body)
                }
                TokenKind::EndIf => {
                    self.bump();
                    self.expect_semicolon();
                    None
                }
                _ => {
                    self.error_unexpected("'endif'");
                    None
                }
            };
            return self.alloc_stmt(StmtKind::If { cond, then, else_ }, start);
        }

        let then = self.parse_embedded_stmt();
        let else_ = match self.current.kind {
            TokenKind::ElseIf => {
                let s = self.current.span.start;
                self.bump();
                Some(self.parse_if_rest(s))
            }
            TokenKind::Else => {
                self.bump();
                // The else binds to the innermost if.
                Some(self.parse_embedded_stmt())
            }
            _ => None,
        };
        self.alloc_stmt(StmtKind::If { cond, then, else_ }, start)
    }

    fn parse_while(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen);
        let cond = self.parse_expr(0);
        self.expect(TokenKind::CloseParen);

        let body = if self.current.kind == TokenKind::Colon {
            self.bump();
            let body = self.parse_alt_body(&[TokenKind::EndWhile]);
            if self.expect(TokenKind::EndWhile) {
                self.expect_semicolon();
            }
            body
        } else {
            self.parse_embedded_stmt()
        };
        self.alloc_stmt(StmtKind::While { cond, body }, start)
    }

    fn parse_do_while(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let body = self.parse_embedded_stmt();
        self.expect(TokenKind::While);
        self.expect(TokenKind::OpenParen);
        let cond = self.parse_expr(0);
        self.expect(TokenKind::CloseParen);
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::DoWhile { body, cond }, start)
    }

    fn parse_expr_list_until(&mut self, terminator: TokenKind) -> Vec<crate::ast::ExprId> {
        let mut exprs = Vec::new();
        if self.current.kind != terminator && self.current.kind != TokenKind::End {
            exprs.push(self.parse_expr(0));
            while self.current.kind == TokenKind::Comma {
                self.bump();
                exprs.push(self.parse_expr(0));
            }
        }
        exprs
    }

    fn parse_for(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen);
        let init = self.parse_expr_list_until(TokenKind::SemiColon);
        self.expect(TokenKind::SemiColon);
        let cond = self.parse_expr_list_until(TokenKind::SemiColon);
        self.expect(TokenKind::SemiColon);
        let step = self.parse_expr_list_until(TokenKind::CloseParen);
        self.expect(TokenKind::CloseParen);

        let body = if self.current.kind == TokenKind::Colon {
            self.bump();
            let body = self.parse_alt_body(&[TokenKind::EndFor]);
            if self.expect(TokenKind::EndFor) {
                self.expect_semicolon();
            }
            body
        } else {
            self.parse_embedded_stmt()
        };
        self.alloc_stmt(
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
            start,
        )
    }

    fn parse_foreach(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen);
        let expr = self.parse_expr(0);
        self.expect(TokenKind::As);

        let mut by_ref = false;
        if self.current.kind == TokenKind::Ampersand {
            by_ref = true;
            self.bump();
        }
        let first = self.parse_expr(0);

        let (key, by_ref, value) = if self.current.kind == TokenKind::DoubleArrow {
            self.bump();
            let mut value_ref = false;
            if self.current.kind == TokenKind::Ampersand {
                value_ref = true;
                self.bump();
            }
            let value = self.parse_expr(0);
            (Some(first), value_ref, value)
        } else {
            (None, by_ref, first)
        };
        self.expect(TokenKind::CloseParen);

        let body = if self.current.kind == TokenKind::Colon {
            self.bump();
            let body = self.parse_alt_body(&[TokenKind::EndForeach]);
            if self.expect(TokenKind::EndForeach) {
                self.expect_semicolon();
            }
            body
        } else {
            self.parse_embedded_stmt()
        };
        self.alloc_stmt(
            StmtKind::Foreach {
                expr,
                key,
                by_ref,
                value,
                body,
            },
            start,
        )
    }

    fn parse_switch(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen);
        let cond = self.parse_expr(0);
        self.expect(TokenKind::CloseParen);

        let alt = self.current.kind == TokenKind::Colon;
        if alt {
            self.bump();
        } else {
            self.expect(TokenKind::OpenBrace);
        }

        self.depth += 1;
        let mut cases = Vec::new();
        loop {
            self.skip_tags();
            match self.current.kind {
                TokenKind::Case => {
                    let case_start = self.current.span.start;
                    self.bump();
                    let case_cond = self.parse_expr(0);
                    if matches!(self.current.kind, TokenKind::Colon | TokenKind::SemiColon) {
                        self.bump();
                    } else {
                        self.error_unexpected("':'");
                    }
                    let body = self.parse_case_body();
                    cases.push(SwitchCase {
                        cond: Some(case_cond),
                        body,
                        span: Span::new(case_start, self.last_end.max(case_start)),
                    });
                }
                TokenKind::Default => {
                    let case_start = self.current.span.start;
                    self.bump();
                    if matches!(self.current.kind, TokenKind::Colon | TokenKind::SemiColon) {
                        self.bump();
                    } else {
                        self.error_unexpected("':'");
                    }
                    let body = self.parse_case_body();
                    cases.push(SwitchCase {
                        cond: None,
                        body,
                        span: Span::new(case_start, self.last_end.max(case_start)),
                    });
                }
                TokenKind::CloseBrace | TokenKind::EndSwitch | TokenKind::End => break,
                _ => {
                    self.error_unexpected("'case'");
                    self.bump();
                }
            }
        }
        self.depth -= 1;

        if alt {
            if self.expect(TokenKind::EndSwitch) {
                self.expect_semicolon();
            }
        } else {
            self.expect(TokenKind::CloseBrace);
        }
        self.alloc_stmt(StmtKind::Switch { cond, cases }, start)
    }

    fn parse_case_body(&mut self) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        loop {
            self.skip_tags();
            if self.halted
                || matches!(
                    self.current.kind,
                    TokenKind::Case
                        | TokenKind::Default
                        | TokenKind::CloseBrace
                        | TokenKind::EndSwitch
                        | TokenKind::End
                )
            {
                break;
            }
            stmts.push(self.parse_stmt());
        }
        stmts
    }

    fn parse_break_continue(&mut self, is_break: bool) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let level = if matches!(
            self.current.kind,
            TokenKind::SemiColon | TokenKind::CloseTag | TokenKind::End | TokenKind::CloseBrace
        ) {
            None
        } else {
            Some(self.parse_expr(0))
        };
        self.expect_semicolon();
        let kind = if is_break {
            StmtKind::Break { level }
        } else {
            StmtKind::Continue { level }
        };
        self.alloc_stmt(kind, start)
    }

    fn parse_return(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let expr = if matches!(
            self.current.kind,
            TokenKind::SemiColon | TokenKind::CloseTag | TokenKind::End | TokenKind::CloseBrace
        ) {
            None
        } else {
            Some(self.parse_expr(0))
        };
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::Return { expr }, start)
    }

    fn parse_goto(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let label = if self.current.kind == TokenKind::Identifier {
            let label = self.take_text();
            self.bump();
            label
        } else {
            self.error_unexpected("label");
            String::new()
        };
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::Goto { label }, start)
    }

    fn parse_throw(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let expr = self.parse_expr(0);
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::Throw { expr }, start)
    }

    fn parse_try(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let body = self.parse_block();

        let mut catches = Vec::new();
        while self.current.kind == TokenKind::Catch {
            let catch_start = self.current.span.start;
            self.bump();
            self.expect(TokenKind::OpenParen);
            let mut types = vec![self.parse_qname()];
            while self.current.kind == TokenKind::Pipe {
                self.bump();
                types.push(self.parse_qname());
            }
            let var = if self.current.kind == TokenKind::Variable {
                let var = self.take_text();
                self.bump();
                var
            } else {
                self.error_unexpected("variable");
                String::new()
            };
            self.expect(TokenKind::CloseParen);
            let catch_body = self.parse_block();
            catches.push(CatchClause {
                types,
                var,
                body: catch_body,
                span: Span::new(catch_start, self.last_end.max(catch_start)),
            });
        }

        let finally = if self.current.kind == TokenKind::Finally {
            self.bump();
            Some(self.parse_block())
        } else {
            None
        };

        if catches.is_empty() && finally.is_none() {
            self.syntax_error("cannot use try without catch or finally");
        }
        self.alloc_stmt(
            StmtKind::Try {
                body,
                catches,
                finally,
            },
            start,
        )
    }

    fn parse_global(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let mut vars = vec![self.parse_expr(0)];
        while self.current.kind == TokenKind::Comma {
            self.bump();
            vars.push(self.parse_expr(0));
        }
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::Global { vars }, start)
    }

    fn parse_static_vars(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let mut vars = Vec::new();
        loop {
            if self.current.kind != TokenKind::Variable {
                self.error_unexpected("variable");
                break;
            }
            let var_start = self.current.span.start;
            let name = self.take_text();
            self.bump();
            let default = if self.current.kind == TokenKind::Eq {
                self.bump();
                Some(self.parse_expr(0))
            } else {
                None
            };
            vars.push(StaticVar {
                name,
                default,
                span: Span::new(var_start, self.last_end.max(var_start)),
            });
            if self.current.kind == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::StaticVars { vars }, start)
    }

    fn parse_echo(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let mut exprs = vec![self.parse_expr(0)];
        while self.current.kind == TokenKind::Comma {
            self.bump();
            exprs.push(self.parse_expr(0));
        }
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::Echo { exprs }, start)
    }

    fn parse_unset(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen);
        let vars = self.parse_expr_list_until(TokenKind::CloseParen);
        self.expect(TokenKind::CloseParen);
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::Unset { vars }, start)
    }

    fn parse_declare(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        self.expect(TokenKind::OpenParen);
        let mut directives = Vec::new();
        loop {
            if self.current.kind != TokenKind::Identifier {
                self.error_unexpected("directive name");
                break;
            }
            let dir_start = self.current.span.start;
            let name = self.take_text();
            self.bump();
            self.expect(TokenKind::Eq);
            let value = self.parse_expr(0);
            directives.push(DeclareDirective {
                name,
                value,
                span: Span::new(dir_start, self.last_end.max(dir_start)),
            });
            if self.current.kind == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(TokenKind::CloseParen);

        let body = match self.current.kind {
            TokenKind::SemiColon | TokenKind::CloseTag => {
                self.expect_semicolon();
                None
            }
            TokenKind::OpenBrace => Some(self.parse_block()),
            _ => Some(self.parse_embedded_stmt()),
        };
        self.alloc_stmt(StmtKind::Declare { directives, body }, start)
    }

    fn parse_namespace(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let name = if self.current.kind == TokenKind::Identifier {
            Some(self.parse_qname())
        } else {
            None
        };

        if self.current.kind == TokenKind::OpenBrace {
            self.bump();
            let mut stmts = Vec::new();
            loop {
                self.skip_tags();
                if self.halted
                    || matches!(self.current.kind, TokenKind::CloseBrace | TokenKind::End)
                {
                    break;
                }
                stmts.push(self.parse_stmt());
            }
            self.expect(TokenKind::CloseBrace);
            self.alloc_stmt(
                StmtKind::Namespace {
                    name,
                    braced: true,
                    stmts,
                },
                start,
            )
        } else {
            self.expect_semicolon();
            let mut stmts = Vec::new();
            loop {
                self.skip_tags();
                if self.halted
                    || matches!(self.current.kind, TokenKind::Namespace | TokenKind::End)
                {
                    break;
                }
                stmts.push(self.parse_stmt());
            }
            self.alloc_stmt(
                StmtKind::Namespace {
                    name,
                    braced: false,
                    stmts,
                },
                start,
            )
        }
    }

    fn parse_use(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();

        let kind = match self.current.kind {
            TokenKind::Function => {
                self.bump();
                UseKind::Function
            }
            TokenKind::Const => {
                self.bump();
                UseKind::Const
            }
            _ => UseKind::Normal,
        };

        let first = self.parse_qname();

        if self.current.kind == TokenKind::NsSeparator && self.next.kind == TokenKind::OpenBrace {
            self.bump();
            self.bump();
            let mut items = Vec::new();
            loop {
                if matches!(self.current.kind, TokenKind::CloseBrace | TokenKind::End) {
                    break;
                }
                let item_kind = match self.current.kind {
                    TokenKind::Function => {
                        self.bump();
                        UseKind::Function
                    }
                    TokenKind::Const => {
                        self.bump();
                        UseKind::Const
                    }
                    _ => kind,
                };
                let item_start = self.current.span.start;
                let name = self.parse_qname();
                let alias = self.parse_use_alias();
                items.push(UseItem {
                    kind: item_kind,
                    name,
                    alias,
                    span: Span::new(item_start, self.last_end.max(item_start)),
                });
                if self.current.kind == TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::CloseBrace);
            self.expect_semicolon();
            return self.alloc_stmt(
                StmtKind::Use {
                    kind,
                    prefix: Some(first),
                    items,
                },
                start,
            );
        }

        let mut items = Vec::new();
        let first_start = first.span.start;
        let alias = self.parse_use_alias();
        items.push(UseItem {
            kind,
            name: first,
            alias,
            span: Span::new(first_start, self.last_end.max(first_start)),
        });
        while self.current.kind == TokenKind::Comma {
            self.bump();
            let item_start = self.current.span.start;
            let name = self.parse_qname();
            let alias = self.parse_use_alias();
            items.push(UseItem {
                kind,
                name,
                alias,
                span: Span::new(item_start, self.last_end.max(item_start)),
            });
        }
        self.expect_semicolon();
        self.alloc_stmt(
            StmtKind::Use {
                kind,
                prefix: None,
                items,
            },
            start,
        )
    }

    fn parse_use_alias(&mut self) -> Option<String> {
        if self.current.kind == TokenKind::As {
            self.bump();
            if self.current.kind == TokenKind::Identifier {
                let alias = self.take_text();
                self.bump();
                Some(alias)
            } else {
                self.error_unexpected("identifier");
                None
            }
        } else {
            None
        }
    }

    fn parse_const_decl(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let mut consts = Vec::new();
        loop {
            if self.current.kind != TokenKind::Identifier {
                self.error_unexpected("constant name");
                break;
            }
            let entry_start = self.current.span.start;
            let name = self.take_text();
            self.bump();
            self.expect(TokenKind::Eq);
            let value = self.parse_expr(0);
            consts.push(ConstEntry {
                name,
                value,
                span: Span::new(entry_start, self.last_end.max(entry_start)),
            });
            if self.current.kind == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_semicolon();
        self.alloc_stmt(StmtKind::ConstDecl { consts }, start)
    }

    fn parse_function_stmt(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let by_ref = if self.current.kind == TokenKind::Ampersand {
            self.bump();
            true
        } else {
            false
        };

        if self.current.kind == TokenKind::Identifier {
            let name = self.take_text();
            self.bump();
            let params = self.parse_params();
            let return_type = self.parse_return_type();
            let body = self.parse_block();
            self.alloc_stmt(
                StmtKind::Function {
                    by_ref,
                    name,
                    params,
                    return_type,
                    body,
                },
                start,
            )
        } else {
            // An anonymous function in statement position.
            let expr = self.parse_closure_rest(false, by_ref, start);
            self.expect_semicolon();
            self.alloc_stmt(StmtKind::Expr { expr }, start)
        }
    }

    pub(crate) fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if !self.expect(TokenKind::OpenParen) {
            return params;
        }
        while !matches!(self.current.kind, TokenKind::CloseParen | TokenKind::End) {
            let param_start = self.current.span.start;
            let ty = if self.at_type_start() {
                Some(self.parse_type())
            } else {
                None
            };
            let by_ref = if self.current.kind == TokenKind::Ampersand {
                self.bump();
                true
            } else {
                false
            };
            let variadic = if self.current.kind == TokenKind::Ellipsis {
                self.bump();
                true
            } else {
                false
            };
            if self.current.kind != TokenKind::Variable {
                self.error_unexpected("parameter");
                break;
            }
            let name = self.take_text();
            self.bump();
            let default = if self.current.kind == TokenKind::Eq {
                self.bump();
                Some(self.parse_expr(0))
            } else {
                None
            };
            params.push(Param {
                by_ref,
                variadic,
                ty,
                name,
                default,
                span: Span::new(param_start, self.last_end.max(param_start)),
            });
            if self.current.kind == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(TokenKind::CloseParen);
        params
    }

    fn at_type_start(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Question
                | TokenKind::Identifier
                | TokenKind::NsSeparator
                | TokenKind::Namespace
                | TokenKind::Array
                | TokenKind::Callable
        )
    }

    pub(crate) fn parse_type(&mut self) -> TypeRefId {
        let start = self.current.span.start;
        match self.current.kind {
            TokenKind::Question => {
                self.bump();
                let inner = self.parse_type();
                self.builder.type_ref(
                    TypeKind::Nullable { inner },
                    Span::new(start, self.last_end.max(start)),
                )
            }
            TokenKind::Array => {
                self.bump();
                self.builder
                    .type_ref(TypeKind::Array, Span::new(start, self.last_end))
            }
            TokenKind::Callable => {
                self.bump();
                self.builder
                    .type_ref(TypeKind::Callable, Span::new(start, self.last_end))
            }
            _ => {
                let name = self.parse_qname();
                self.builder.type_ref(
                    TypeKind::Named { name },
                    Span::new(start, self.last_end.max(start)),
                )
            }
        }
    }

    pub(crate) fn parse_return_type(&mut self) -> Option<TypeRefId> {
        if self.current.kind == TokenKind::Colon {
            self.bump();
            Some(self.parse_type())
        } else {
            None
        }
    }

    // --- Classes ---------------------------------------------------------

    fn parse_class_with_modifiers(&mut self) -> StmtId {
        let start = self.current.span.start;
        let mut modifiers = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Abstract => modifiers.push(Modifier::Abstract),
                TokenKind::Final => modifiers.push(Modifier::Final),
                _ => break,
            }
            self.bump();
        }
        if self.current.kind == TokenKind::Class {
            self.parse_class_decl(modifiers, start)
        } else {
            self.error_unexpected("'class'");
            self.sync_statement();
            self.alloc_stmt(StmtKind::Error, start)
        }
    }

    fn parse_class_decl(&mut self, modifiers: Vec<Modifier>, start: usize) -> StmtId {
        self.bump();
        let name = if self.current.kind == TokenKind::Identifier {
            let name = self.take_text();
            self.bump();
            Some(name)
        } else {
            self.error_unexpected("class name");
            None
        };
        let extends = if self.current.kind == TokenKind::Extends {
            self.bump();
            Some(self.parse_qname())
        } else {
            None
        };
        let implements = if self.current.kind == TokenKind::Implements {
            self.bump();
            self.parse_qname_list()
        } else {
            Vec::new()
        };
        let members = self.parse_class_body();
        self.alloc_stmt(
            StmtKind::Class {
                name,
                modifiers,
                anonymous: false,
                extends,
                implements,
                members,
            },
            start,
        )
    }

    fn parse_interface(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let name = if self.current.kind == TokenKind::Identifier {
            let name = self.take_text();
            self.bump();
            name
        } else {
            self.error_unexpected("interface name");
            String::new()
        };
        let extends = if self.current.kind == TokenKind::Extends {
            self.bump();
            self.parse_qname_list()
        } else {
            Vec::new()
        };
        let members = self.parse_class_body();
        self.alloc_stmt(
            StmtKind::Interface {
                name,
                extends,
                members,
            },
            start,
        )
    }

    fn parse_trait(&mut self) -> StmtId {
        let start = self.current.span.start;
        self.bump();
        let name = if self.current.kind == TokenKind::Identifier {
            let name = self.take_text();
            self.bump();
            name
        } else {
            self.error_unexpected("trait name");
            String::new()
        };
        let members = self.parse_class_body();
        self.alloc_stmt(StmtKind::Trait { name, members }, start)
    }

    pub(crate) fn parse_class_body(&mut self) -> Vec<MemberId> {
        let mut members = Vec::new();
        if !self.expect(TokenKind::OpenBrace) {
            return members;
        }
        self.depth += 1;
        loop {
            self.skip_tags();
            if matches!(self.current.kind, TokenKind::CloseBrace | TokenKind::End) {
                break;
            }
            let doc = self.current_doc.take();
            let member = self.parse_member();
            if let Some(doc) = doc {
                self.builder
                    .props_mut(NodeRef::Member(member))
                    .set(DOC_COMMENT_PROP, doc);
            }
            members.push(member);
        }
        self.depth -= 1;
        self.expect(TokenKind::CloseBrace);
        members
    }

    fn parse_member(&mut self) -> MemberId {
        let start = self.current.span.start;

        if self.current.kind == TokenKind::Use {
            return self.parse_trait_use(start);
        }

        let mut modifiers = Vec::new();
        loop {
            let modifier = match self.current.kind {
                TokenKind::Public | TokenKind::Var => Modifier::Public,
                TokenKind::Protected => Modifier::Protected,
                TokenKind::Private => Modifier::Private,
                TokenKind::Static => Modifier::Static,
                TokenKind::Abstract => Modifier::Abstract,
                TokenKind::Final => Modifier::Final,
                _ => break,
            };
            modifiers.push(modifier);
            self.bump();
        }

        match self.current.kind {
            TokenKind::Function => {
                self.bump();
                let by_ref = if self.current.kind == TokenKind::Ampersand {
                    self.bump();
                    true
                } else {
                    false
                };
                let name = self.member_name();
                let params = self.parse_params();
                let return_type = self.parse_return_type();
                let body = if self.current.kind == TokenKind::SemiColon {
                    self.bump();
                    None
                } else {
                    Some(self.parse_block())
                };
                let span = Span::new(start, self.last_end.max(start));
                self.builder.member(
                    MemberKind::Method {
                        modifiers,
                        by_ref,
                        name,
                        params,
                        return_type,
                        body,
                    },
                    span,
                )
            }
            TokenKind::Const => {
                self.bump();
                let mut entries = Vec::new();
                loop {
                    let entry_start = self.current.span.start;
                    let name = self.member_name();
                    self.expect(TokenKind::Eq);
                    let value = self.parse_expr(0);
                    entries.push(ConstEntry {
                        name,
                        value,
                        span: Span::new(entry_start, self.last_end.max(entry_start)),
                    });
                    if self.current.kind == TokenKind::Comma {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.expect_semicolon();
                let span = Span::new(start, self.last_end.max(start));
                self.builder
                    .member(MemberKind::ClassConst { modifiers, entries }, span)
            }
            TokenKind::Variable => self.parse_property(modifiers, None, start),
            _ if self.at_type_start() && !modifiers.is_empty() => {
                let ty = self.parse_type();
                if self.current.kind == TokenKind::Variable {
                    self.parse_property(modifiers, Some(ty), start)
                } else {
                    self.error_unexpected("property name");
                    self.bump();
                    let span = Span::new(start, self.last_end.max(start));
                    self.builder.member(MemberKind::Error, span)
                }
            }
            _ => {
                self.error_unexpected("class member");
                self.bump();
                let span = Span::new(start, self.last_end.max(start));
                self.builder.member(MemberKind::Error, span)
            }
        }
    }

    fn parse_property(
        &mut self,
        modifiers: Vec<Modifier>,
        ty: Option<TypeRefId>,
        start: usize,
    ) -> MemberId {
        let mut entries = Vec::new();
        loop {
            if self.current.kind != TokenKind::Variable {
                self.error_unexpected("property name");
                break;
            }
            let entry_start = self.current.span.start;
            let name = self.take_text();
            self.bump();
            let default = if self.current.kind == TokenKind::Eq {
                self.bump();
                Some(self.parse_expr(0))
            } else {
                None
            };
            entries.push(PropertyEntry {
                name,
                default,
                span: Span::new(entry_start, self.last_end.max(entry_start)),
            });
            if self.current.kind == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_semicolon();
        let span = Span::new(start, self.last_end.max(start));
        self.builder.member(
            MemberKind::Property {
                modifiers,
                ty,
                entries,
            },
            span,
        )
    }

    fn parse_trait_use(&mut self, start: usize) -> MemberId {
        self.bump();
        let traits = self.parse_qname_list();

        let mut adaptations = Vec::new();
        if self.current.kind == TokenKind::OpenBrace {
            self.bump();
            loop {
                if matches!(self.current.kind, TokenKind::CloseBrace | TokenKind::End) {
                    break;
                }
                let adapt_start = self.current.span.start;
                let first = self.parse_qname();
                let method = if self.current.kind == TokenKind::DoubleColon {
                    self.bump();
                    let method = self.member_name();
                    TraitMethodRef {
                        trait_name: Some(first),
                        method,
                        span: Span::new(adapt_start, self.last_end.max(adapt_start)),
                    }
                } else {
                    let span = first.span;
                    TraitMethodRef {
                        trait_name: None,
                        method: first.last().to_string(),
                        span,
                    }
                };

                match self.current.kind {
                    TokenKind::Insteadof => {
                        self.bump();
                        let insteadof = self.parse_qname_list();
                        self.expect_semicolon();
                        adaptations.push(TraitAdaptation::Precedence {
                            method,
                            insteadof,
                            span: Span::new(adapt_start, self.last_end.max(adapt_start)),
                        });
                    }
                    TokenKind::As => {
                        self.bump();
                        let visibility = match self.current.kind {
                            TokenKind::Public => Some(Modifier::Public),
                            TokenKind::Protected => Some(Modifier::Protected),
                            TokenKind::Private => Some(Modifier::Private),
                            _ => None,
                        };
                        if visibility.is_some() {
                            self.bump();
                        }
                        let alias = if self.current.kind == TokenKind::Identifier
                            || self.current.kind.is_semi_reserved()
                        {
                            Some(self.member_name())
                        } else {
                            None
                        };
                        self.expect_semicolon();
                        adaptations.push(TraitAdaptation::Alias {
                            method,
                            visibility,
                            alias,
                            span: Span::new(adapt_start, self.last_end.max(adapt_start)),
                        });
                    }
                    _ => {
                        self.error_unexpected("'insteadof' or 'as'");
                        self.bump();
                    }
                }
            }
            self.expect(TokenKind::CloseBrace);
        } else {
            self.expect_semicolon();
        }

        let span = Span::new(start, self.last_end.max(start));
        self.builder
            .member(MemberKind::TraitUse { traits, adaptations }, span)
    }

    /// A member name may reuse most keywords.
    pub(crate) fn member_name(&mut self) -> String {
        if self.current.kind == TokenKind::Identifier || self.current.kind.is_semi_reserved() {
            let name = self.take_text();
            self.bump();
            name
        } else {
            self.error_unexpected("member name");
            String::new()
        }
    }

    // --- Names -----------------------------------------------------------

    pub(crate) fn parse_qname(&mut self) -> QName {
        let start = self.current.span.start;
        let mut parts = Vec::new();
        let mut form = NameForm::Unqualified;

        if self.current.kind == TokenKind::NsSeparator {
            form = NameForm::FullyQualified;
            self.bump();
        } else if self.current.kind == TokenKind::Namespace
            && self.next.kind == TokenKind::NsSeparator
        {
            form = NameForm::Relative;
            self.bump();
            self.bump();
        }

        loop {
            if self.current.kind == TokenKind::Identifier {
                parts.push(self.take_text());
                self.bump();
            } else {
                self.error_unexpected("identifier");
                break;
            }
            if self.current.kind == TokenKind::NsSeparator
                && self.next.kind == TokenKind::Identifier
            {
                if form == NameForm::Unqualified {
                    form = NameForm::Qualified;
                }
                self.bump();
            } else {
                break;
            }
        }

        QName {
            parts,
            form,
            span: Span::new(start, self.last_end.max(start)),
        }
    }

    fn parse_qname_list(&mut self) -> Vec<QName> {
        let mut names = vec![self.parse_qname()];
        while self.current.kind == TokenKind::Comma {
            self.bump();
            names.push(self.parse_qname());
        }
        names
    }

    // --- __halt_compiler -------------------------------------------------

    fn parse_halt_compiler(&mut self) -> StmtId {
        let start = self.current.span.start;
        if self.depth > 0 {
            self.syntax_error("__halt_compiler() can only be used from the outermost scope");
            self.bump();
            self.sync_statement();
            return self.alloc_stmt(StmtKind::Error, start);
        }
        self.bump();
        self.expect(TokenKind::OpenParen);
        self.expect(TokenKind::CloseParen);
        match self.current.kind {
            TokenKind::SemiColon | TokenKind::CloseTag => self.bump(),
            _ => self.error_unexpected("';'"),
        }
        self.halted = true;
        let id = self.alloc_stmt(StmtKind::HaltCompiler, start);
        let offset = self.last_end;
        self.builder
            .props_mut(NodeRef::Stmt(id))
            .set(HALT_OFFSET_PROP, offset);
        id
    }
}
