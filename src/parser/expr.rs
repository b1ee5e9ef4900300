//! Expressions: binding-power driven, with the PHP precedence ladder in
//! one table and postfix forms handled after each primary.

use crate::ast::{
    Arg, ArrayItem, BinaryOp, Callee, CastKind, ClassRef, ClosureUse, ExprId, ExprKind,
    IncludeKind, MagicConstKind, NameForm, NewTarget, QName, StmtKind, StrLit, UnaryOp,
};
use crate::lexer::token::{LiteralFormat, TokenKind, TokenValue};
use crate::source::CharSource;
use crate::span::Span;

use super::Parser;

const INCLUDE_BP: u8 = 5;
const PRINT_BP: u8 = 32;
const YIELD_BP: u8 = 34;
const ASSIGN_BP: u8 = 35;
const TERNARY_BP: u8 = 40;
const NOT_BP: u8 = 160;
const INSTANCEOF_BP: u8 = 170;
const UNARY_BP: u8 = 180;

fn infix_binding_power(kind: TokenKind) -> Option<(BinaryOp, u8, u8)> {
    use TokenKind::*;
    Some(match kind {
        LogicalOr => (BinaryOp::LogicalOr, 10, 11),
        LogicalXor => (BinaryOp::LogicalXor, 20, 21),
        LogicalAnd => (BinaryOp::LogicalAnd, 30, 31),
        Coalesce => (BinaryOp::Coalesce, 51, 50),
        PipePipe => (BinaryOp::Or, 60, 61),
        AmpersandAmpersand => (BinaryOp::And, 70, 71),
        Pipe => (BinaryOp::BitOr, 80, 81),
        Caret => (BinaryOp::BitXor, 90, 91),
        Ampersand => (BinaryOp::BitAnd, 100, 101),
        EqEq => (BinaryOp::Equal, 110, 111),
        BangEq => (BinaryOp::NotEqual, 110, 111),
        EqEqEq => (BinaryOp::Identical, 110, 111),
        BangEqEq => (BinaryOp::NotIdentical, 110, 111),
        Lt => (BinaryOp::Less, 120, 121),
        LtEq => (BinaryOp::LessEq, 120, 121),
        Gt => (BinaryOp::Greater, 120, 121),
        GtEq => (BinaryOp::GreaterEq, 120, 121),
        Spaceship => (BinaryOp::Spaceship, 120, 121),
        Sl => (BinaryOp::Shl, 130, 131),
        Sr => (BinaryOp::Shr, 130, 131),
        Plus => (BinaryOp::Add, 140, 141),
        Minus => (BinaryOp::Sub, 140, 141),
        Dot => (BinaryOp::Concat, 140, 141),
        Asterisk => (BinaryOp::Mul, 150, 151),
        Slash => (BinaryOp::Div, 150, 151),
        Percent => (BinaryOp::Mod, 150, 151),
        Pow => (BinaryOp::Pow, 191, 190),
        _ => return None,
    })
}

fn assign_op(kind: TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    Some(match kind {
        PlusEq => BinaryOp::Add,
        MinusEq => BinaryOp::Sub,
        MulEq => BinaryOp::Mul,
        DivEq => BinaryOp::Div,
        ConcatEq => BinaryOp::Concat,
        ModEq => BinaryOp::Mod,
        AndEq => BinaryOp::BitAnd,
        OrEq => BinaryOp::BitOr,
        XorEq => BinaryOp::BitXor,
        SlEq => BinaryOp::Shl,
        SrEq => BinaryOp::Shr,
        PowEq => BinaryOp::Pow,
        CoalesceEq => BinaryOp::Coalesce,
        _ => return None,
    })
}

fn strlit(value: TokenValue) -> StrLit {
    match value {
        TokenValue::Text(s) => StrLit::Text(s),
        TokenValue::Bytes(b) => StrLit::Bytes(b),
        _ => StrLit::Text(String::new()),
    }
}

impl<S: CharSource> Parser<S> {
    pub(crate) fn parse_expr(&mut self, min_bp: u8) -> ExprId {
        let mut left = self.parse_prefix();

        loop {
            match self.current.kind {
                TokenKind::Question => {
                    if TERNARY_BP < min_bp {
                        break;
                    }
                    self.bump();
                    let then = if self.current.kind != TokenKind::Colon {
                        Some(self.parse_expr(0))
                    } else {
                        None
                    };
                    self.expect(TokenKind::Colon);
                    let else_ = self.parse_expr(TERNARY_BP + 1);
                    let span = self
                        .builder
                        .expr_span(left)
                        .combine(self.builder.expr_span(else_));
                    left = self.builder.expr(
                        ExprKind::Ternary {
                            cond: left,
                            then,
                            else_,
                        },
                        span,
                    );
                }
                TokenKind::Eq => {
                    if ASSIGN_BP < min_bp {
                        break;
                    }
                    self.bump();
                    if self.current.kind == TokenKind::Ampersand {
                        self.bump();
                        let value = self.parse_expr(ASSIGN_BP - 1);
                        let span = self
                            .builder
                            .expr_span(left)
                            .combine(self.builder.expr_span(value));
                        left = self.builder.expr(
                            ExprKind::AssignRef {
                                target: left,
                                value,
                            },
                            span,
                        );
                    } else {
                        let value = self.parse_expr(ASSIGN_BP - 1);
                        let span = self
                            .builder
                            .expr_span(left)
                            .combine(self.builder.expr_span(value));
                        left = self.builder.expr(
                            ExprKind::Assign {
                                target: left,
                                value,
                            },
                            span,
                        );
                    }
                }
                kind if assign_op(kind).is_some() => {
                    if ASSIGN_BP < min_bp {
                        break;
                    }
                    let op = assign_op(kind).unwrap();
                    self.bump();
                    let value = self.parse_expr(ASSIGN_BP - 1);
                    let span = self
                        .builder
                        .expr_span(left)
                        .combine(self.builder.expr_span(value));
                    left = self.builder.expr(
                        ExprKind::AssignOp {
                            op,
                            target: left,
                            value,
                        },
                        span,
                    );
                }
                TokenKind::InstanceOf => {
                    if INSTANCEOF_BP < min_bp {
                        break;
                    }
                    self.bump();
                    let (class, class_span) = self.parse_class_ref();
                    let span = self.builder.expr_span(left).combine(class_span);
                    left = self
                        .builder
                        .expr(ExprKind::Instanceof { expr: left, class }, span);
                }
                kind => {
                    let Some((op, l_bp, r_bp)) = infix_binding_power(kind) else {
                        break;
                    };
                    if l_bp < min_bp {
                        break;
                    }
                    self.bump();
                    let rhs = self.parse_expr(r_bp);
                    let span = self
                        .builder
                        .expr_span(left)
                        .combine(self.builder.expr_span(rhs));
                    left = self
                        .builder
                        .expr(ExprKind::Binary { op, lhs: left, rhs }, span);
                }
            }
        }

        left
    }

    fn parse_prefix(&mut self) -> ExprId {
        let start = self.current.span.start;
        let left = match self.current.kind {
            TokenKind::LNumber => {
                let value = match std::mem::take(&mut self.current.value) {
                    TokenValue::Int(v) => v,
                    _ => 0,
                };
                let format = self.current.format;
                let span = self.current.span;
                self.bump();
                self.builder.expr(ExprKind::Int { value, format }, span)
            }
            TokenKind::DNumber => {
                let value = match std::mem::take(&mut self.current.value) {
                    TokenValue::Double(v) => v,
                    TokenValue::Int(v) => v as f64,
                    _ => 0.0,
                };
                let format = self.current.format;
                let span = self.current.span;
                self.bump();
                self.builder.expr(ExprKind::Double { value, format }, span)
            }
            TokenKind::ConstantEncapsedString => {
                let value = strlit(std::mem::take(&mut self.current.value));
                let format = self.current.format;
                let span = self.current.span;
                self.bump();
                self.builder.expr(ExprKind::Str { value, format }, span)
            }
            TokenKind::DoubleQuote => self.parse_encaps(TokenKind::DoubleQuote, start),
            TokenKind::Backtick => self.parse_encaps(TokenKind::Backtick, start),
            TokenKind::StartHeredoc => self.parse_heredoc_expr(start),
            TokenKind::Variable => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                self.builder.expr(ExprKind::Variable { name }, span)
            }
            TokenKind::Dollar => self.parse_dollar_var(start),
            TokenKind::Plus => self.parse_unary(UnaryOp::Plus, UNARY_BP, start),
            TokenKind::Minus => self.parse_unary(UnaryOp::Minus, UNARY_BP, start),
            TokenKind::Bang => self.parse_unary(UnaryOp::Not, NOT_BP, start),
            TokenKind::BitNot => self.parse_unary(UnaryOp::BitNot, UNARY_BP, start),
            TokenKind::Inc | TokenKind::Dec => {
                let inc = self.current.kind == TokenKind::Inc;
                self.bump();
                let var = self.parse_expr(UNARY_BP);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(
                    ExprKind::IncDec {
                        prefix: true,
                        inc,
                        var,
                    },
                    span,
                )
            }
            TokenKind::IntCast
            | TokenKind::FloatCast
            | TokenKind::StringCast
            | TokenKind::BinaryCast
            | TokenKind::ArrayCast
            | TokenKind::ObjectCast
            | TokenKind::BoolCast
            | TokenKind::UnsetCast => {
                let kind = match self.current.kind {
                    TokenKind::IntCast => CastKind::Int,
                    TokenKind::FloatCast => CastKind::Double,
                    TokenKind::StringCast => CastKind::String,
                    TokenKind::BinaryCast => CastKind::Binary,
                    TokenKind::ArrayCast => CastKind::Array,
                    TokenKind::ObjectCast => CastKind::Object,
                    TokenKind::BoolCast => CastKind::Bool,
                    _ => CastKind::Unset,
                };
                self.bump();
                let expr = self.parse_expr(UNARY_BP);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Cast { kind, expr }, span)
            }
            TokenKind::At => {
                self.bump();
                let expr = self.parse_expr(UNARY_BP);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::ErrorSuppress { expr }, span)
            }
            TokenKind::Print => {
                self.bump();
                let expr = self.parse_expr(PRINT_BP);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Print { expr }, span)
            }
            TokenKind::Yield => self.parse_yield(start),
            TokenKind::YieldFrom => {
                self.bump();
                let expr = self.parse_expr(YIELD_BP);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::YieldFrom { expr }, span)
            }
            TokenKind::Include
            | TokenKind::IncludeOnce
            | TokenKind::Require
            | TokenKind::RequireOnce => {
                let kind = match self.current.kind {
                    TokenKind::Include => IncludeKind::Include,
                    TokenKind::IncludeOnce => IncludeKind::IncludeOnce,
                    TokenKind::Require => IncludeKind::Require,
                    _ => IncludeKind::RequireOnce,
                };
                self.bump();
                let expr = self.parse_expr(INCLUDE_BP);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Include { kind, expr }, span)
            }
            TokenKind::Eval => {
                self.bump();
                self.expect(TokenKind::OpenParen);
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseParen);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Eval { expr }, span)
            }
            TokenKind::Exit => {
                self.bump();
                let expr = if self.current.kind == TokenKind::OpenParen {
                    self.bump();
                    let inner = if self.current.kind == TokenKind::CloseParen {
                        None
                    } else {
                        Some(self.parse_expr(0))
                    };
                    self.expect(TokenKind::CloseParen);
                    inner
                } else {
                    None
                };
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Exit { expr }, span)
            }
            TokenKind::Isset => {
                self.bump();
                self.expect(TokenKind::OpenParen);
                let mut vars = vec![self.parse_expr(0)];
                while self.current.kind == TokenKind::Comma {
                    self.bump();
                    vars.push(self.parse_expr(0));
                }
                self.expect(TokenKind::CloseParen);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Isset { vars }, span)
            }
            TokenKind::Empty => {
                self.bump();
                self.expect(TokenKind::OpenParen);
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseParen);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Empty { expr }, span)
            }
            TokenKind::List => {
                self.bump();
                self.expect(TokenKind::OpenParen);
                let items = self.parse_array_items(TokenKind::CloseParen);
                self.expect(TokenKind::CloseParen);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(
                    ExprKind::List {
                        items,
                        bracketed: false,
                    },
                    span,
                )
            }
            TokenKind::Array => {
                self.bump();
                self.expect(TokenKind::OpenParen);
                let items = self.parse_array_items(TokenKind::CloseParen);
                self.expect(TokenKind::CloseParen);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(
                    ExprKind::Array {
                        items,
                        bracketed: false,
                    },
                    span,
                )
            }
            TokenKind::OpenBracket => {
                self.bump();
                let items = self.parse_array_items(TokenKind::CloseBracket);
                self.expect(TokenKind::CloseBracket);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(
                    ExprKind::Array {
                        items,
                        bracketed: true,
                    },
                    span,
                )
            }
            TokenKind::OpenParen => {
                self.bump();
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseParen);
                expr
            }
            TokenKind::Function => {
                self.bump();
                let by_ref = if self.current.kind == TokenKind::Ampersand {
                    self.bump();
                    true
                } else {
                    false
                };
                if self.current.kind == TokenKind::Identifier {
                    // Recovery: a named function does not belong here.
                    self.error_unexpected("'('");
                    self.bump();
                }
                self.parse_closure_rest(false, by_ref, start)
            }
            TokenKind::Fn => self.parse_arrow_rest(false, start),
            TokenKind::Static => self.parse_static_prefix(start),
            TokenKind::New => self.parse_new(start),
            TokenKind::Clone => {
                self.bump();
                let expr = self.parse_expr(UNARY_BP);
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(ExprKind::Clone { expr }, span)
            }
            TokenKind::Line
            | TokenKind::File
            | TokenKind::Dir
            | TokenKind::ClassC
            | TokenKind::TraitC
            | TokenKind::MethodC
            | TokenKind::FuncC
            | TokenKind::NsC => {
                let kind = match self.current.kind {
                    TokenKind::Line => MagicConstKind::Line,
                    TokenKind::File => MagicConstKind::File,
                    TokenKind::Dir => MagicConstKind::Dir,
                    TokenKind::ClassC => MagicConstKind::Class,
                    TokenKind::TraitC => MagicConstKind::Trait,
                    TokenKind::MethodC => MagicConstKind::Method,
                    TokenKind::FuncC => MagicConstKind::Function,
                    _ => MagicConstKind::Namespace,
                };
                let span = self.current.span;
                self.bump();
                self.builder.expr(ExprKind::MagicConst { kind }, span)
            }
            TokenKind::Identifier | TokenKind::NsSeparator | TokenKind::Namespace => {
                self.parse_name_expr(start)
            }
            TokenKind::Error => {
                let span = self.current.span;
                self.bump();
                self.builder.expr(ExprKind::Error, span)
            }
            _ => {
                self.error_unexpected("expression");
                self.builder.expr(ExprKind::Error, self.current.span)
            }
        };
        self.parse_postfix(left)
    }

    fn parse_unary(&mut self, op: UnaryOp, bp: u8, start: usize) -> ExprId {
        self.bump();
        let expr = self.parse_expr(bp);
        let span = Span::new(start, self.last_end.max(start));
        self.builder.expr(ExprKind::Unary { op, expr }, span)
    }

    fn parse_postfix(&mut self, mut left: ExprId) -> ExprId {
        loop {
            match self.current.kind {
                TokenKind::OpenBracket => {
                    self.bump();
                    let dim = if self.current.kind == TokenKind::CloseBracket {
                        None
                    } else {
                        Some(self.parse_expr(0))
                    };
                    self.expect(TokenKind::CloseBracket);
                    let span =
                        Span::new(self.builder.expr_span(left).start, self.last_end);
                    left = self
                        .builder
                        .expr(ExprKind::ArrayDim { array: left, dim }, span);
                }
                TokenKind::Arrow => {
                    self.bump();
                    let prop = self.parse_member_prop();
                    let span =
                        Span::new(self.builder.expr_span(left).start, self.last_end);
                    if self.current.kind == TokenKind::OpenParen {
                        let args = self.parse_args();
                        let span =
                            Span::new(self.builder.expr_span(left).start, self.last_end);
                        left = self.builder.expr(
                            ExprKind::MethodCall {
                                target: left,
                                method: prop,
                                args,
                            },
                            span,
                        );
                    } else {
                        left = self.builder.expr(
                            ExprKind::PropFetch {
                                target: left,
                                prop,
                            },
                            span,
                        );
                    }
                }
                TokenKind::DoubleColon => {
                    let start = self.builder.expr_span(left).start;
                    left = self.parse_static_op(ClassRef::Expr(left), start);
                }
                TokenKind::OpenParen => {
                    let start = self.builder.expr_span(left).start;
                    let args = self.parse_args();
                    let span = Span::new(start, self.last_end);
                    left = self.builder.expr(
                        ExprKind::Call {
                            callee: Callee::Expr(left),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Inc | TokenKind::Dec => {
                    let inc = self.current.kind == TokenKind::Inc;
                    let start = self.builder.expr_span(left).start;
                    self.bump();
                    let span = Span::new(start, self.last_end);
                    left = self.builder.expr(
                        ExprKind::IncDec {
                            prefix: false,
                            inc,
                            var: left,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        left
    }

    fn parse_member_prop(&mut self) -> ExprId {
        match self.current.kind {
            TokenKind::Identifier => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                self.builder.expr(ExprKind::Identifier { name }, span)
            }
            TokenKind::Variable => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                self.builder.expr(ExprKind::Variable { name }, span)
            }
            TokenKind::OpenBrace => {
                self.bump();
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseBrace);
                expr
            }
            TokenKind::Dollar => {
                let start = self.current.span.start;
                self.parse_dollar_var(start)
            }
            _ => {
                self.error_unexpected("property name");
                self.builder.expr(ExprKind::Error, self.current.span)
            }
        }
    }

    fn parse_dollar_var(&mut self, start: usize) -> ExprId {
        self.bump();
        match self.current.kind {
            TokenKind::Variable => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                let inner = self.builder.expr(ExprKind::Variable { name }, span);
                let outer = Span::new(start, span.end);
                self.builder.expr(ExprKind::VarVar { expr: inner }, outer)
            }
            TokenKind::Dollar => {
                let inner_start = self.current.span.start;
                let inner = self.parse_dollar_var(inner_start);
                let span = Span::new(start, self.last_end);
                self.builder.expr(ExprKind::VarVar { expr: inner }, span)
            }
            TokenKind::OpenBrace => {
                self.bump();
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseBrace);
                let span = Span::new(start, self.last_end);
                self.builder.expr(ExprKind::VarVar { expr }, span)
            }
            _ => {
                self.error_unexpected("variable name");
                self.builder.expr(ExprKind::Error, self.current.span)
            }
        }
    }

    fn parse_static_prefix(&mut self, start: usize) -> ExprId {
        match self.next.kind {
            TokenKind::Function => {
                self.bump();
                self.bump();
                let by_ref = if self.current.kind == TokenKind::Ampersand {
                    self.bump();
                    true
                } else {
                    false
                };
                self.parse_closure_rest(true, by_ref, start)
            }
            TokenKind::Fn => {
                self.bump();
                self.parse_arrow_rest(true, start)
            }
            _ => {
                let span = self.current.span;
                self.bump();
                let name = QName {
                    parts: vec!["static".to_string()],
                    form: NameForm::Unqualified,
                    span,
                };
                if self.current.kind == TokenKind::DoubleColon {
                    self.parse_static_op(ClassRef::Name(name), start)
                } else {
                    self.error_unexpected("'::'");
                    self.builder.expr(ExprKind::Error, span)
                }
            }
        }
    }

    fn parse_name_expr(&mut self, start: usize) -> ExprId {
        let name = self.parse_qname();
        match self.current.kind {
            TokenKind::OpenParen => {
                let args = self.parse_args();
                let span = Span::new(start, self.last_end.max(start));
                self.builder.expr(
                    ExprKind::Call {
                        callee: Callee::Name(name),
                        args,
                    },
                    span,
                )
            }
            TokenKind::DoubleColon => self.parse_static_op(ClassRef::Name(name), start),
            _ => {
                let span = name.span;
                if name.is_unqualified("true") {
                    self.builder.expr(ExprKind::Bool { value: true }, span)
                } else if name.is_unqualified("false") {
                    self.builder.expr(ExprKind::Bool { value: false }, span)
                } else if name.is_unqualified("null") {
                    self.builder.expr(ExprKind::Null, span)
                } else {
                    self.builder.expr(ExprKind::ConstFetch { name }, span)
                }
            }
        }
    }

    fn parse_static_op(&mut self, class: ClassRef, start: usize) -> ExprId {
        self.bump();
        match self.current.kind {
            TokenKind::Variable => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                let prop = self.builder.expr(ExprKind::Variable { name }, span);
                if self.current.kind == TokenKind::OpenParen {
                    let args = self.parse_args();
                    let span = Span::new(start, self.last_end);
                    self.builder.expr(
                        ExprKind::StaticCall {
                            class,
                            method: prop,
                            args,
                        },
                        span,
                    )
                } else {
                    let span = Span::new(start, self.last_end);
                    self.builder
                        .expr(ExprKind::StaticPropFetch { class, prop }, span)
                }
            }
            TokenKind::Dollar => {
                let dollar_start = self.current.span.start;
                let prop = self.parse_dollar_var(dollar_start);
                if self.current.kind == TokenKind::OpenParen {
                    let args = self.parse_args();
                    let span = Span::new(start, self.last_end);
                    self.builder.expr(
                        ExprKind::StaticCall {
                            class,
                            method: prop,
                            args,
                        },
                        span,
                    )
                } else {
                    let span = Span::new(start, self.last_end);
                    self.builder
                        .expr(ExprKind::StaticPropFetch { class, prop }, span)
                }
            }
            TokenKind::OpenBrace => {
                self.bump();
                let method = self.parse_expr(0);
                self.expect(TokenKind::CloseBrace);
                if self.current.kind == TokenKind::OpenParen {
                    let args = self.parse_args();
                    let span = Span::new(start, self.last_end);
                    self.builder.expr(
                        ExprKind::StaticCall {
                            class,
                            method,
                            args,
                        },
                        span,
                    )
                } else {
                    let span = Span::new(start, self.last_end);
                    self.builder
                        .expr(ExprKind::StaticPropFetch { class, prop: method }, span)
                }
            }
            kind if kind == TokenKind::Identifier || kind.is_semi_reserved() => {
                let span = self.current.span;
                let name = self.member_name();
                if self.current.kind == TokenKind::OpenParen {
                    let method = self.builder.expr(ExprKind::Identifier { name }, span);
                    let args = self.parse_args();
                    let span = Span::new(start, self.last_end);
                    self.builder.expr(
                        ExprKind::StaticCall {
                            class,
                            method,
                            args,
                        },
                        span,
                    )
                } else {
                    let span = Span::new(start, self.last_end);
                    self.builder
                        .expr(ExprKind::ClassConstFetch { class, name }, span)
                }
            }
            _ => {
                self.error_unexpected("class member");
                self.builder.expr(ExprKind::Error, self.current.span)
            }
        }
    }

    pub(crate) fn parse_class_ref(&mut self) -> (ClassRef, Span) {
        match self.current.kind {
            TokenKind::Identifier | TokenKind::NsSeparator | TokenKind::Namespace => {
                let name = self.parse_qname();
                let span = name.span;
                (ClassRef::Name(name), span)
            }
            TokenKind::Static => {
                let span = self.current.span;
                self.bump();
                (
                    ClassRef::Name(QName {
                        parts: vec!["static".to_string()],
                        form: NameForm::Unqualified,
                        span,
                    }),
                    span,
                )
            }
            _ => {
                let expr = self.parse_class_ref_expr();
                let span = self.builder.expr_span(expr);
                (ClassRef::Expr(expr), span)
            }
        }
    }

    /// Variable chain usable as a class reference: no call parentheses,
    /// those belong to the surrounding `new`.
    fn parse_class_ref_expr(&mut self) -> ExprId {
        let start = self.current.span.start;
        let mut expr = match self.current.kind {
            TokenKind::Variable => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                self.builder.expr(ExprKind::Variable { name }, span)
            }
            TokenKind::Dollar => self.parse_dollar_var(start),
            _ => {
                self.error_unexpected("class reference");
                return self.builder.expr(ExprKind::Error, self.current.span);
            }
        };
        loop {
            match self.current.kind {
                TokenKind::Arrow => {
                    self.bump();
                    let prop = self.parse_member_prop();
                    let span = Span::new(start, self.last_end);
                    expr = self.builder.expr(
                        ExprKind::PropFetch {
                            target: expr,
                            prop,
                        },
                        span,
                    );
                }
                TokenKind::OpenBracket => {
                    self.bump();
                    let dim = if self.current.kind == TokenKind::CloseBracket {
                        None
                    } else {
                        Some(self.parse_expr(0))
                    };
                    self.expect(TokenKind::CloseBracket);
                    let span = Span::new(start, self.last_end);
                    expr = self
                        .builder
                        .expr(ExprKind::ArrayDim { array: expr, dim }, span);
                }
                TokenKind::DoubleColon if self.next.kind == TokenKind::Variable => {
                    self.bump();
                    let span = self.current.span;
                    let name = self.take_text();
                    self.bump();
                    let prop = self.builder.expr(ExprKind::Variable { name }, span);
                    let outer = Span::new(start, self.last_end);
                    expr = self.builder.expr(
                        ExprKind::StaticPropFetch {
                            class: ClassRef::Expr(expr),
                            prop,
                        },
                        outer,
                    );
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_new(&mut self, start: usize) -> ExprId {
        self.bump();
        if self.current.kind == TokenKind::Class {
            let class_start = self.current.span.start;
            self.bump();
            let args = if self.current.kind == TokenKind::OpenParen {
                self.parse_args()
            } else {
                Vec::new()
            };
            let extends = if self.current.kind == TokenKind::Extends {
                self.bump();
                Some(self.parse_qname())
            } else {
                None
            };
            let implements = if self.current.kind == TokenKind::Implements {
                self.bump();
                let mut names = vec![self.parse_qname()];
                while self.current.kind == TokenKind::Comma {
                    self.bump();
                    names.push(self.parse_qname());
                }
                names
            } else {
                Vec::new()
            };
            let members = self.parse_class_body();
            let class = self.alloc_stmt(
                StmtKind::Class {
                    name: None,
                    modifiers: Vec::new(),
                    anonymous: true,
                    extends,
                    implements,
                    members,
                },
                class_start,
            );
            let span = Span::new(start, self.last_end.max(start));
            return self.builder.expr(
                ExprKind::New {
                    class: NewTarget::Anonymous(class),
                    args,
                },
                span,
            );
        }

        let (class, _) = self.parse_class_ref();
        let args = if self.current.kind == TokenKind::OpenParen {
            self.parse_args()
        } else {
            Vec::new()
        };
        let span = Span::new(start, self.last_end.max(start));
        self.builder.expr(
            ExprKind::New {
                class: NewTarget::Class(class),
                args,
            },
            span,
        )
    }

    fn parse_yield(&mut self, start: usize) -> ExprId {
        self.bump();
        let no_value = matches!(
            self.current.kind,
            TokenKind::SemiColon
                | TokenKind::CloseParen
                | TokenKind::CloseBracket
                | TokenKind::CloseBrace
                | TokenKind::Comma
                | TokenKind::CloseTag
                | TokenKind::End
                | TokenKind::Colon
        );
        if no_value {
            let span = Span::new(start, self.last_end.max(start));
            return self.builder.expr(
                ExprKind::Yield {
                    key: None,
                    value: None,
                },
                span,
            );
        }
        let first = self.parse_expr(YIELD_BP);
        if self.current.kind == TokenKind::DoubleArrow {
            self.bump();
            let value = self.parse_expr(YIELD_BP);
            let span = Span::new(start, self.last_end.max(start));
            self.builder.expr(
                ExprKind::Yield {
                    key: Some(first),
                    value: Some(value),
                },
                span,
            )
        } else {
            let span = Span::new(start, self.last_end.max(start));
            self.builder.expr(
                ExprKind::Yield {
                    key: None,
                    value: Some(first),
                },
                span,
            )
        }
    }

    pub(crate) fn parse_args(&mut self) -> Vec<Arg> {
        let mut args = Vec::new();
        if !self.expect(TokenKind::OpenParen) {
            return args;
        }
        while !matches!(self.current.kind, TokenKind::CloseParen | TokenKind::End) {
            let start = self.current.span.start;
            let unpack = if self.current.kind == TokenKind::Ellipsis {
                self.bump();
                true
            } else {
                false
            };
            let value = self.parse_expr(0);
            args.push(Arg {
                value,
                unpack,
                span: Span::new(start, self.last_end.max(start)),
            });
            if self.current.kind == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(TokenKind::CloseParen);
        args
    }

    fn parse_array_items(&mut self, terminator: TokenKind) -> Vec<ArrayItem> {
        let mut items = Vec::new();
        while self.current.kind != terminator && self.current.kind != TokenKind::End {
            let start = self.current.span.start;
            if self.current.kind == TokenKind::Comma {
                // Hole in a destructuring list.
                items.push(ArrayItem {
                    key: None,
                    value: None,
                    by_ref: false,
                    unpack: false,
                    span: self.current.span,
                });
                self.bump();
                continue;
            }
            let unpack = if self.current.kind == TokenKind::Ellipsis {
                self.bump();
                true
            } else {
                false
            };
            let by_ref = if self.current.kind == TokenKind::Ampersand {
                self.bump();
                true
            } else {
                false
            };
            let first = self.parse_expr(0);
            let item = if self.current.kind == TokenKind::DoubleArrow {
                self.bump();
                let value_ref = if self.current.kind == TokenKind::Ampersand {
                    self.bump();
                    true
                } else {
                    false
                };
                let value = self.parse_expr(0);
                ArrayItem {
                    key: Some(first),
                    value: Some(value),
                    by_ref: value_ref,
                    unpack,
                    span: Span::new(start, self.last_end.max(start)),
                }
            } else {
                ArrayItem {
                    key: None,
                    value: Some(first),
                    by_ref,
                    unpack,
                    span: Span::new(start, self.last_end.max(start)),
                }
            };
            items.push(item);
            if self.current.kind == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        items
    }

    pub(crate) fn parse_closure_rest(
        &mut self,
        is_static: bool,
        by_ref: bool,
        start: usize,
    ) -> ExprId {
        let params = self.parse_params();
        let mut uses = Vec::new();
        if self.current.kind == TokenKind::Use {
            self.bump();
            if self.expect(TokenKind::OpenParen) {
                while !matches!(self.current.kind, TokenKind::CloseParen | TokenKind::End) {
                    let use_by_ref = if self.current.kind == TokenKind::Ampersand {
                        self.bump();
                        true
                    } else {
                        false
                    };
                    if self.current.kind != TokenKind::Variable {
                        self.error_unexpected("variable");
                        break;
                    }
                    let span = self.current.span;
                    let name = self.take_text();
                    self.bump();
                    uses.push(ClosureUse {
                        name,
                        by_ref: use_by_ref,
                        span,
                    });
                    if self.current.kind == TokenKind::Comma {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::CloseParen);
            }
        }
        let return_type = self.parse_return_type();
        let body = self.parse_block();
        let span = Span::new(start, self.last_end.max(start));
        self.builder.expr(
            ExprKind::Closure {
                is_static,
                by_ref,
                params,
                uses,
                return_type,
                body,
            },
            span,
        )
    }

    fn parse_arrow_rest(&mut self, is_static: bool, start: usize) -> ExprId {
        self.bump();
        let by_ref = if self.current.kind == TokenKind::Ampersand {
            self.bump();
            true
        } else {
            false
        };
        let params = self.parse_params();
        let return_type = self.parse_return_type();
        self.expect(TokenKind::DoubleArrow);
        let body = self.parse_expr(0);
        let span = Span::new(start, self.last_end.max(start));
        self.builder.expr(
            ExprKind::ArrowFn {
                is_static,
                by_ref,
                params,
                return_type,
                body,
            },
            span,
        )
    }

    // --- Interpolated strings -------------------------------------------

    fn parse_encaps(&mut self, end: TokenKind, start: usize) -> ExprId {
        self.bump();
        let mut parts = Vec::new();
        while self.current.kind != end && self.current.kind != TokenKind::End {
            parts.push(self.parse_encaps_part());
        }
        if self.current.kind == end {
            self.bump();
        } else {
            self.error_unexpected(end.name());
        }
        let span = Span::new(start, self.last_end.max(start));
        if end == TokenKind::Backtick {
            self.builder.expr(ExprKind::ShellExec { parts }, span)
        } else {
            self.builder
                .expr(ExprKind::InterpolatedString { parts }, span)
        }
    }

    fn parse_heredoc_expr(&mut self, start: usize) -> ExprId {
        self.bump();
        let mut parts = Vec::new();
        while !matches!(self.current.kind, TokenKind::EndHeredoc | TokenKind::End) {
            parts.push(self.parse_encaps_part());
        }
        if self.current.kind == TokenKind::EndHeredoc {
            self.bump();
        } else {
            self.error_unexpected("heredoc end label");
        }
        let span = Span::new(start, self.last_end.max(start));

        if parts.is_empty() {
            return self.builder.expr(
                ExprKind::Str {
                    value: StrLit::Text(String::new()),
                    format: LiteralFormat::None,
                },
                span,
            );
        }
        if parts.len() == 1
            && matches!(self.builder.ast().expr(parts[0]).kind, ExprKind::Str { .. })
        {
            // A body without interpolation is a plain string.
            return parts[0];
        }
        self.builder
            .expr(ExprKind::InterpolatedString { parts }, span)
    }

    fn parse_encaps_part(&mut self) -> ExprId {
        match self.current.kind {
            TokenKind::EncapsedAndWhitespace => {
                let span = self.current.span;
                let value = strlit(std::mem::take(&mut self.current.value));
                self.bump();
                self.builder.expr(
                    ExprKind::Str {
                        value,
                        format: LiteralFormat::None,
                    },
                    span,
                )
            }
            TokenKind::Variable => {
                let vspan = self.current.span;
                let name = self.take_text();
                self.bump();
                let mut expr = self.builder.expr(ExprKind::Variable { name }, vspan);
                if self.current.kind == TokenKind::OpenBracket {
                    self.bump();
                    let dim = self.parse_encaps_offset();
                    self.expect(TokenKind::CloseBracket);
                    let span = Span::new(vspan.start, self.last_end);
                    expr = self.builder.expr(
                        ExprKind::ArrayDim {
                            array: expr,
                            dim: Some(dim),
                        },
                        span,
                    );
                } else if self.current.kind == TokenKind::Arrow {
                    self.bump();
                    if self.current.kind == TokenKind::Identifier {
                        let pspan = self.current.span;
                        let pname = self.take_text();
                        self.bump();
                        let prop = self
                            .builder
                            .expr(ExprKind::Identifier { name: pname }, pspan);
                        let span = Span::new(vspan.start, self.last_end);
                        expr = self.builder.expr(
                            ExprKind::PropFetch { target: expr, prop },
                            span,
                        );
                    } else {
                        self.error_unexpected("property name");
                    }
                }
                expr
            }
            TokenKind::CurlyOpen => {
                self.bump();
                let expr = self.parse_expr(0);
                self.expect(TokenKind::CloseBrace);
                expr
            }
            TokenKind::DollarOpenCurlyBraces => {
                let start = self.current.span.start;
                self.bump();
                if self.current.kind == TokenKind::StringVarname {
                    let vspan = self.current.span;
                    let name = self.take_text();
                    self.bump();
                    let mut expr = self.builder.expr(ExprKind::Variable { name }, vspan);
                    if self.current.kind == TokenKind::OpenBracket {
                        self.bump();
                        let dim = self.parse_expr(0);
                        self.expect(TokenKind::CloseBracket);
                        let span = Span::new(start, self.last_end);
                        expr = self.builder.expr(
                            ExprKind::ArrayDim {
                                array: expr,
                                dim: Some(dim),
                            },
                            span,
                        );
                    }
                    self.expect(TokenKind::CloseBrace);
                    expr
                } else {
                    let inner = self.parse_expr(0);
                    self.expect(TokenKind::CloseBrace);
                    let span = Span::new(start, self.last_end);
                    self.builder.expr(ExprKind::VarVar { expr: inner }, span)
                }
            }
            _ => {
                self.error_unexpected("string content");
                let span = self.current.span;
                self.bump();
                self.builder.expr(ExprKind::Error, span)
            }
        }
    }

    fn parse_encaps_offset(&mut self) -> ExprId {
        match self.current.kind {
            TokenKind::NumString => {
                let span = self.current.span;
                let kind = match std::mem::take(&mut self.current.value) {
                    TokenValue::Int(v) => ExprKind::Int {
                        value: v,
                        format: LiteralFormat::Decimal,
                    },
                    TokenValue::Text(s) => ExprKind::Str {
                        value: StrLit::Text(s),
                        format: LiteralFormat::None,
                    },
                    _ => ExprKind::Error,
                };
                self.bump();
                self.builder.expr(kind, span)
            }
            TokenKind::Minus => {
                let start = self.current.span.start;
                self.bump();
                if self.current.kind == TokenKind::NumString {
                    let span = Span::new(start, self.current.span.end);
                    let kind = match std::mem::take(&mut self.current.value) {
                        TokenValue::Int(v) => ExprKind::Int {
                            value: -v,
                            format: LiteralFormat::Decimal,
                        },
                        TokenValue::Text(s) => ExprKind::Str {
                            value: StrLit::Text(format!("-{s}")),
                            format: LiteralFormat::None,
                        },
                        _ => ExprKind::Error,
                    };
                    self.bump();
                    self.builder.expr(kind, span)
                } else {
                    self.error_unexpected("numeric offset");
                    self.builder.expr(ExprKind::Error, self.current.span)
                }
            }
            TokenKind::Variable => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                self.builder.expr(ExprKind::Variable { name }, span)
            }
            TokenKind::Identifier => {
                let span = self.current.span;
                let name = self.take_text();
                self.bump();
                self.builder.expr(
                    ExprKind::Str {
                        value: StrLit::Text(name),
                        format: LiteralFormat::None,
                    },
                    span,
                )
            }
            _ => {
                self.error_unexpected("string offset");
                let span = self.current.span;
                self.bump();
                self.builder.expr(ExprKind::Error, span)
            }
        }
    }
}
