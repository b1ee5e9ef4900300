pub mod builder;
pub mod sexpr;
pub mod visitor;

use std::any::{Any, TypeId};

use crate::lexer::token::LiteralFormat;
use crate::span::Span;

/// Property bag key on the function-node bag holding the preceding
/// doc-comment text as a `String`.
pub const DOC_COMMENT_PROP: &str = "doc_comment";

/// Property bag key on a `HaltCompiler` node holding the byte offset
/// (`usize`) where compilation halted.
pub const HALT_OFFSET_PROP: &str = "halt_offset";

macro_rules! node_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

node_id!(StmtId);
node_id!(ExprId);
node_id!(MemberId);
node_id!(TypeRefId);

/// Weak reference to any node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Stmt(StmtId),
    Expr(ExprId),
    Member(MemberId),
    Type(TypeRefId),
}

#[derive(Debug)]
pub struct Node<K> {
    pub kind: K,
    pub span: Span,
    pub(crate) parent: Option<NodeRef>,
    pub(crate) props: PropertyBag,
}

impl<K> Node<K> {
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    pub fn props(&self) -> &PropertyBag {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut PropertyBag {
        &mut self.props
    }
}

/// The tree. Nodes live in per-family tables addressed by typed ids;
/// parents are ids as well, so back-pointers never own anything.
#[derive(Debug, Default)]
pub struct Ast {
    pub(crate) stmts: Vec<Node<StmtKind>>,
    pub(crate) exprs: Vec<Node<ExprKind>>,
    pub(crate) members: Vec<Node<MemberKind>>,
    pub(crate) types: Vec<Node<TypeKind>>,
}

impl Ast {
    pub fn stmt(&self, id: StmtId) -> &Node<StmtKind> {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Node<StmtKind> {
        &mut self.stmts[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &Node<ExprKind> {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Node<ExprKind> {
        &mut self.exprs[id.index()]
    }

    pub fn member(&self, id: MemberId) -> &Node<MemberKind> {
        &self.members[id.index()]
    }

    pub fn member_mut(&mut self, id: MemberId) -> &mut Node<MemberKind> {
        &mut self.members[id.index()]
    }

    pub fn type_ref(&self, id: TypeRefId) -> &Node<TypeKind> {
        &self.types[id.index()]
    }

    pub fn type_ref_mut(&mut self, id: TypeRefId) -> &mut Node<TypeKind> {
        &mut self.types[id.index()]
    }

    pub fn span_of(&self, r: NodeRef) -> Span {
        match r {
            NodeRef::Stmt(id) => self.stmt(id).span,
            NodeRef::Expr(id) => self.expr(id).span,
            NodeRef::Member(id) => self.member(id).span,
            NodeRef::Type(id) => self.type_ref(id).span,
        }
    }

    pub fn parent_of(&self, r: NodeRef) -> Option<NodeRef> {
        match r {
            NodeRef::Stmt(id) => self.stmt(id).parent,
            NodeRef::Expr(id) => self.expr(id).parent,
            NodeRef::Member(id) => self.member(id).parent,
            NodeRef::Type(id) => self.type_ref(id).parent,
        }
    }

    pub fn props_of_mut(&mut self, r: NodeRef) -> &mut PropertyBag {
        match r {
            NodeRef::Stmt(id) => &mut self.stmt_mut(id).props,
            NodeRef::Expr(id) => &mut self.expr_mut(id).props,
            NodeRef::Member(id) => &mut self.member_mut(id).props,
            NodeRef::Type(id) => &mut self.type_ref_mut(id).props,
        }
    }

    pub fn children(&self, r: NodeRef) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut push = |child: NodeRef| out.push(child);
        match r {
            NodeRef::Stmt(id) => stmt_children(&self.stmt(id).kind, &mut push),
            NodeRef::Expr(id) => expr_children(&self.expr(id).kind, &mut push),
            NodeRef::Member(id) => member_children(&self.member(id).kind, &mut push),
            NodeRef::Type(id) => type_children(&self.type_ref(id).kind, &mut push),
        }
        out
    }
}

// --- Names and shared pieces -------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameForm {
    Unqualified,
    Qualified,
    FullyQualified,
    Relative,
}

/// A possibly namespaced name, as written.
#[derive(Debug, Clone, PartialEq)]
pub struct QName {
    pub parts: Vec<String>,
    pub form: NameForm,
    pub span: Span,
}

impl QName {
    pub fn last(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }

    /// Case-insensitive match against an unqualified name.
    pub fn is_unqualified(&self, name: &str) -> bool {
        self.form == NameForm::Unqualified
            && self.parts.len() == 1
            && self.parts[0].eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Public,
    Protected,
    Private,
    Static,
    Abstract,
    Final,
}

/// String literal payload: text when the bytes decode as UTF-8, raw
/// bytes otherwise (or when the literal is forced binary).
#[derive(Debug, Clone, PartialEq)]
pub enum StrLit {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub by_ref: bool,
    pub variadic: bool,
    pub ty: Option<TypeRefId>,
    pub name: String,
    pub default: Option<ExprId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: ExprId,
    pub unpack: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<ExprId>,
    pub value: Option<ExprId>,
    pub by_ref: bool,
    pub unpack: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureUse {
    pub name: String,
    pub by_ref: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub cond: Option<ExprId>,
    pub body: Vec<StmtId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub types: Vec<QName>,
    pub var: String,
    pub body: StmtId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticVar {
    pub name: String,
    pub default: Option<ExprId>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseKind {
    Normal,
    Function,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseItem {
    pub kind: UseKind,
    pub name: QName,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclareDirective {
    pub name: String,
    pub value: ExprId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub name: String,
    pub default: Option<ExprId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstEntry {
    pub name: String,
    pub value: ExprId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitMethodRef {
    pub trait_name: Option<QName>,
    pub method: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraitAdaptation {
    Precedence {
        method: TraitMethodRef,
        insteadof: Vec<QName>,
        span: Span,
    },
    Alias {
        method: TraitMethodRef,
        visibility: Option<Modifier>,
        alias: Option<String>,
        span: Span,
    },
}

// --- Statements --------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// The root of a parsed source unit.
    GlobalCode { stmts: Vec<StmtId> },
    Block { stmts: Vec<StmtId> },
    Nop,
    InlineHtml { text: Vec<u8> },
    Expr { expr: ExprId },
    Echo { exprs: Vec<ExprId> },
    If {
        cond: ExprId,
        then: StmtId,
        else_: Option<StmtId>,
    },
    While { cond: ExprId, body: StmtId },
    DoWhile { body: StmtId, cond: ExprId },
    For {
        init: Vec<ExprId>,
        cond: Vec<ExprId>,
        step: Vec<ExprId>,
        body: StmtId,
    },
    Foreach {
        expr: ExprId,
        key: Option<ExprId>,
        by_ref: bool,
        value: ExprId,
        body: StmtId,
    },
    Switch { cond: ExprId, cases: Vec<SwitchCase> },
    Break { level: Option<ExprId> },
    Continue { level: Option<ExprId> },
    Return { expr: Option<ExprId> },
    Goto { label: String },
    Label { name: String },
    Throw { expr: ExprId },
    Try {
        body: StmtId,
        catches: Vec<CatchClause>,
        finally: Option<StmtId>,
    },
    Global { vars: Vec<ExprId> },
    StaticVars { vars: Vec<StaticVar> },
    Unset { vars: Vec<ExprId> },
    Declare {
        directives: Vec<DeclareDirective>,
        body: Option<StmtId>,
    },
    Namespace {
        name: Option<QName>,
        braced: bool,
        stmts: Vec<StmtId>,
    },
    Use {
        kind: UseKind,
        prefix: Option<QName>,
        items: Vec<UseItem>,
    },
    ConstDecl { consts: Vec<ConstEntry> },
    Function {
        by_ref: bool,
        name: String,
        params: Vec<Param>,
        return_type: Option<TypeRefId>,
        body: StmtId,
    },
    Class {
        name: Option<String>,
        modifiers: Vec<Modifier>,
        anonymous: bool,
        extends: Option<QName>,
        implements: Vec<QName>,
        members: Vec<MemberId>,
    },
    Interface {
        name: String,
        extends: Vec<QName>,
        members: Vec<MemberId>,
    },
    Trait {
        name: String,
        members: Vec<MemberId>,
    },
    HaltCompiler,
    Error,
}

// --- Class members -----------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    Property {
        modifiers: Vec<Modifier>,
        ty: Option<TypeRefId>,
        entries: Vec<PropertyEntry>,
    },
    ClassConst {
        modifiers: Vec<Modifier>,
        entries: Vec<ConstEntry>,
    },
    Method {
        modifiers: Vec<Modifier>,
        by_ref: bool,
        name: String,
        params: Vec<Param>,
        return_type: Option<TypeRefId>,
        body: Option<StmtId>,
    },
    TraitUse {
        traits: Vec<QName>,
        adaptations: Vec<TraitAdaptation>,
    },
    Error,
}

// --- Types -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Named { name: QName },
    Array,
    Callable,
    Nullable { inner: TypeRefId },
}

// --- Expressions -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Spaceship,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Int,
    Double,
    String,
    Binary,
    Array,
    Object,
    Bool,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Include,
    IncludeOnce,
    Require,
    RequireOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicConstKind {
    Line,
    File,
    Dir,
    Class,
    Trait,
    Method,
    Function,
    Namespace,
}

/// Call target: a bare name or a computed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Name(QName),
    Expr(ExprId),
}

/// Class position in `new`, `instanceof` and static accesses.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassRef {
    Name(QName),
    Expr(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewTarget {
    Class(ClassRef),
    /// `new class(...) { ... }`; the statement is the anonymous class
    /// declaration.
    Anonymous(StmtId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int { value: i64, format: LiteralFormat },
    Double { value: f64, format: LiteralFormat },
    Str { value: StrLit, format: LiteralFormat },
    Bool { value: bool },
    Null,
    MagicConst { kind: MagicConstKind },
    Variable { name: String },
    VarVar { expr: ExprId },
    Identifier { name: String },
    ConstFetch { name: QName },
    ClassConstFetch { class: ClassRef, name: String },
    StaticPropFetch { class: ClassRef, prop: ExprId },
    PropFetch { target: ExprId, prop: ExprId },
    ArrayDim {
        array: ExprId,
        dim: Option<ExprId>,
    },
    Call { callee: Callee, args: Vec<Arg> },
    MethodCall {
        target: ExprId,
        method: ExprId,
        args: Vec<Arg>,
    },
    StaticCall {
        class: ClassRef,
        method: ExprId,
        args: Vec<Arg>,
    },
    New { class: NewTarget, args: Vec<Arg> },
    Clone { expr: ExprId },
    Instanceof { expr: ExprId, class: ClassRef },
    Array {
        items: Vec<ArrayItem>,
        bracketed: bool,
    },
    List {
        items: Vec<ArrayItem>,
        bracketed: bool,
    },
    Closure {
        is_static: bool,
        by_ref: bool,
        params: Vec<Param>,
        uses: Vec<ClosureUse>,
        return_type: Option<TypeRefId>,
        body: StmtId,
    },
    ArrowFn {
        is_static: bool,
        by_ref: bool,
        params: Vec<Param>,
        return_type: Option<TypeRefId>,
        body: ExprId,
    },
    Assign { target: ExprId, value: ExprId },
    AssignRef { target: ExprId, value: ExprId },
    AssignOp {
        op: BinaryOp,
        target: ExprId,
        value: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary { op: UnaryOp, expr: ExprId },
    IncDec {
        prefix: bool,
        inc: bool,
        var: ExprId,
    },
    Cast { kind: CastKind, expr: ExprId },
    ErrorSuppress { expr: ExprId },
    Ternary {
        cond: ExprId,
        then: Option<ExprId>,
        else_: ExprId,
    },
    Isset { vars: Vec<ExprId> },
    Empty { expr: ExprId },
    Exit { expr: Option<ExprId> },
    Print { expr: ExprId },
    Include { kind: IncludeKind, expr: ExprId },
    Eval { expr: ExprId },
    Yield {
        key: Option<ExprId>,
        value: Option<ExprId>,
    },
    YieldFrom { expr: ExprId },
    InterpolatedString { parts: Vec<ExprId> },
    ShellExec { parts: Vec<ExprId> },
    Error,
}

// --- Child enumeration --------------------------------------------------
//
// One place knows the shape of every node; the builder wires parents with
// it and the visitor walks with it.

fn args_children(args: &[Arg], f: &mut dyn FnMut(NodeRef)) {
    for arg in args {
        f(NodeRef::Expr(arg.value));
    }
}

fn items_children(items: &[ArrayItem], f: &mut dyn FnMut(NodeRef)) {
    for item in items {
        if let Some(key) = item.key {
            f(NodeRef::Expr(key));
        }
        if let Some(value) = item.value {
            f(NodeRef::Expr(value));
        }
    }
}

fn params_children(params: &[Param], f: &mut dyn FnMut(NodeRef)) {
    for param in params {
        if let Some(ty) = param.ty {
            f(NodeRef::Type(ty));
        }
        if let Some(default) = param.default {
            f(NodeRef::Expr(default));
        }
    }
}

fn class_ref_children(class: &ClassRef, f: &mut dyn FnMut(NodeRef)) {
    if let ClassRef::Expr(expr) = class {
        f(NodeRef::Expr(*expr));
    }
}

pub(crate) fn stmt_children(kind: &StmtKind, f: &mut dyn FnMut(NodeRef)) {
    use StmtKind::*;
    match kind {
        GlobalCode { stmts } | Block { stmts } => {
            for &s in stmts {
                f(NodeRef::Stmt(s));
            }
        }
        Nop | InlineHtml { .. } | Goto { .. } | Label { .. } | HaltCompiler | Error => {}
        Expr { expr } | Throw { expr } => f(NodeRef::Expr(*expr)),
        Echo { exprs } | Global { vars: exprs } | Unset { vars: exprs } => {
            for &e in exprs {
                f(NodeRef::Expr(e));
            }
        }
        If { cond, then, else_ } => {
            f(NodeRef::Expr(*cond));
            f(NodeRef::Stmt(*then));
            if let Some(e) = else_ {
                f(NodeRef::Stmt(*e));
            }
        }
        While { cond, body } => {
            f(NodeRef::Expr(*cond));
            f(NodeRef::Stmt(*body));
        }
        DoWhile { body, cond } => {
            f(NodeRef::Stmt(*body));
            f(NodeRef::Expr(*cond));
        }
        For {
            init,
            cond,
            step,
            body,
        } => {
            for &e in init.iter().chain(cond).chain(step) {
                f(NodeRef::Expr(e));
            }
            f(NodeRef::Stmt(*body));
        }
        Foreach {
            expr,
            key,
            value,
            body,
            ..
        } => {
            f(NodeRef::Expr(*expr));
            if let Some(k) = key {
                f(NodeRef::Expr(*k));
            }
            f(NodeRef::Expr(*value));
            f(NodeRef::Stmt(*body));
        }
        Switch { cond, cases } => {
            f(NodeRef::Expr(*cond));
            for case in cases {
                if let Some(c) = case.cond {
                    f(NodeRef::Expr(c));
                }
                for &s in &case.body {
                    f(NodeRef::Stmt(s));
                }
            }
        }
        Break { level } | Continue { level } => {
            if let Some(l) = level {
                f(NodeRef::Expr(*l));
            }
        }
        Return { expr } => {
            if let Some(e) = expr {
                f(NodeRef::Expr(*e));
            }
        }
        Try {
            body,
            catches,
            finally,
        } => {
            f(NodeRef::Stmt(*body));
            for catch in catches {
                f(NodeRef::Stmt(catch.body));
            }
            if let Some(fin) = finally {
                f(NodeRef::Stmt(*fin));
            }
        }
        StaticVars { vars } => {
            for var in vars {
                if let Some(d) = var.default {
                    f(NodeRef::Expr(d));
                }
            }
        }
        Declare { directives, body } => {
            for d in directives {
                f(NodeRef::Expr(d.value));
            }
            if let Some(b) = body {
                f(NodeRef::Stmt(*b));
            }
        }
        Namespace { stmts, .. } => {
            for &s in stmts {
                f(NodeRef::Stmt(s));
            }
        }
        Use { .. } => {}
        ConstDecl { consts } => {
            for c in consts {
                f(NodeRef::Expr(c.value));
            }
        }
        Function {
            params,
            return_type,
            body,
            ..
        } => {
            params_children(params, f);
            if let Some(t) = return_type {
                f(NodeRef::Type(*t));
            }
            f(NodeRef::Stmt(*body));
        }
        Class { members, .. } | Interface { members, .. } | Trait { members, .. } => {
            for &m in members {
                f(NodeRef::Member(m));
            }
        }
    }
}

pub(crate) fn member_children(kind: &MemberKind, f: &mut dyn FnMut(NodeRef)) {
    use MemberKind::*;
    match kind {
        Property { ty, entries, .. } => {
            if let Some(t) = ty {
                f(NodeRef::Type(*t));
            }
            for entry in entries {
                if let Some(d) = entry.default {
                    f(NodeRef::Expr(d));
                }
            }
        }
        ClassConst { entries, .. } => {
            for entry in entries {
                f(NodeRef::Expr(entry.value));
            }
        }
        Method {
            params,
            return_type,
            body,
            ..
        } => {
            params_children(params, f);
            if let Some(t) = return_type {
                f(NodeRef::Type(*t));
            }
            if let Some(b) = body {
                f(NodeRef::Stmt(*b));
            }
        }
        TraitUse { .. } | Error => {}
    }
}

pub(crate) fn type_children(kind: &TypeKind, f: &mut dyn FnMut(NodeRef)) {
    if let TypeKind::Nullable { inner } = kind {
        f(NodeRef::Type(*inner));
    }
}

pub(crate) fn expr_children(kind: &ExprKind, f: &mut dyn FnMut(NodeRef)) {
    use ExprKind::*;
    match kind {
        Int { .. } | Double { .. } | Str { .. } | Bool { .. } | Null | MagicConst { .. }
        | Variable { .. } | Identifier { .. } | ConstFetch { .. } | Error => {}
        VarVar { expr }
        | Clone { expr }
        | Unary { expr, .. }
        | Cast { expr, .. }
        | ErrorSuppress { expr }
        | Empty { expr }
        | Print { expr }
        | Include { expr, .. }
        | Eval { expr }
        | YieldFrom { expr } => f(NodeRef::Expr(*expr)),
        ClassConstFetch { class, .. } => class_ref_children(class, f),
        StaticPropFetch { class, prop } => {
            class_ref_children(class, f);
            f(NodeRef::Expr(*prop));
        }
        PropFetch { target, prop } => {
            f(NodeRef::Expr(*target));
            f(NodeRef::Expr(*prop));
        }
        ArrayDim { array, dim } => {
            f(NodeRef::Expr(*array));
            if let Some(d) = dim {
                f(NodeRef::Expr(*d));
            }
        }
        Call { callee, args } => {
            if let Callee::Expr(e) = callee {
                f(NodeRef::Expr(*e));
            }
            args_children(args, f);
        }
        MethodCall {
            target,
            method,
            args,
        } => {
            f(NodeRef::Expr(*target));
            f(NodeRef::Expr(*method));
            args_children(args, f);
        }
        StaticCall {
            class,
            method,
            args,
        } => {
            class_ref_children(class, f);
            f(NodeRef::Expr(*method));
            args_children(args, f);
        }
        New { class, args } => {
            match class {
                NewTarget::Class(c) => class_ref_children(c, f),
                NewTarget::Anonymous(s) => f(NodeRef::Stmt(*s)),
            }
            args_children(args, f);
        }
        Instanceof { expr, class } => {
            f(NodeRef::Expr(*expr));
            class_ref_children(class, f);
        }
        Array { items, .. } | List { items, .. } => items_children(items, f),
        Closure {
            params,
            return_type,
            body,
            ..
        } => {
            params_children(params, f);
            if let Some(t) = return_type {
                f(NodeRef::Type(*t));
            }
            f(NodeRef::Stmt(*body));
        }
        ArrowFn {
            params,
            return_type,
            body,
            ..
        } => {
            params_children(params, f);
            if let Some(t) = return_type {
                f(NodeRef::Type(*t));
            }
            f(NodeRef::Expr(*body));
        }
        Assign { target, value }
        | AssignRef { target, value }
        | AssignOp { target, value, .. } => {
            f(NodeRef::Expr(*target));
            f(NodeRef::Expr(*value));
        }
        Binary { lhs, rhs, .. } => {
            f(NodeRef::Expr(*lhs));
            f(NodeRef::Expr(*rhs));
        }
        IncDec { var, .. } => f(NodeRef::Expr(*var)),
        Ternary { cond, then, else_ } => {
            f(NodeRef::Expr(*cond));
            if let Some(t) = then {
                f(NodeRef::Expr(*t));
            }
            f(NodeRef::Expr(*else_));
        }
        Isset { vars } => {
            for &v in vars {
                f(NodeRef::Expr(v));
            }
        }
        Exit { expr } => {
            if let Some(e) = expr {
                f(NodeRef::Expr(*e));
            }
        }
        Yield { key, value } => {
            if let Some(k) = key {
                f(NodeRef::Expr(*k));
            }
            if let Some(v) = value {
                f(NodeRef::Expr(*v));
            }
        }
        InterpolatedString { parts } | ShellExec { parts } => {
            for &p in parts {
                f(NodeRef::Expr(p));
            }
        }
    }
}

// --- Property bag -------------------------------------------------------

/// Key of a property bag entry: a caller-chosen name or a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKey {
    Name(&'static str),
    Type(TypeId),
}

/// Open-ended key to value store attached to every node. Keys are unique;
/// an empty bag allocates nothing.
#[derive(Default)]
pub struct PropertyBag {
    entries: Vec<(PropKey, Box<dyn Any>)>,
}

impl std::fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyBag")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: PropKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }

    pub fn set<T: Any>(&mut self, name: &'static str, value: T) {
        let key = PropKey::Name(name);
        match self.position(key) {
            Some(i) => self.entries[i].1 = Box::new(value),
            None => self.entries.push((key, Box::new(value))),
        }
    }

    pub fn get<T: Any>(&self, name: &'static str) -> Option<&T> {
        self.position(PropKey::Name(name))
            .and_then(|i| self.entries[i].1.downcast_ref())
    }

    pub fn remove(&mut self, name: &'static str) -> bool {
        match self.position(PropKey::Name(name)) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Type-keyed slot: at most one value per type.
    pub fn set_typed<T: Any>(&mut self, value: T) {
        let key = PropKey::Type(TypeId::of::<T>());
        match self.position(key) {
            Some(i) => self.entries[i].1 = Box::new(value),
            None => self.entries.push((key, Box::new(value))),
        }
    }

    pub fn get_typed<T: Any>(&self) -> Option<&T> {
        self.position(PropKey::Type(TypeId::of::<T>()))
            .and_then(|i| self.entries[i].1.downcast_ref())
    }

    pub fn remove_typed<T: Any>(&mut self) -> bool {
        match self.position(PropKey::Type(TypeId::of::<T>())) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_name_keys_are_unique() {
        let mut bag = PropertyBag::new();
        assert!(bag.is_empty());
        bag.set("n", 1u32);
        bag.set("n", 2u32);
        assert_eq!(bag.get::<u32>("n"), Some(&2));
        assert!(bag.remove("n"));
        assert!(!bag.remove("n"));
    }

    #[test]
    fn bag_type_keys_do_not_collide_with_names() {
        let mut bag = PropertyBag::new();
        bag.set("s", String::from("named"));
        bag.set_typed(String::from("typed"));
        assert_eq!(bag.get::<String>("s").map(String::as_str), Some("named"));
        assert_eq!(bag.get_typed::<String>().map(String::as_str), Some("typed"));
        assert!(bag.remove_typed::<String>());
        assert_eq!(bag.get::<String>("s").map(String::as_str), Some("named"));
    }
}
