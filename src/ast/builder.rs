//! The only way nodes come to exist. The builder allocates into the
//! tree's tables, validates spans, and wires each child's parent link to
//! the node under construction.

use crate::span::Span;

use super::{
    expr_children, member_children, stmt_children, type_children, Ast, ExprId, ExprKind,
    MemberId, MemberKind, Node, NodeRef, PropertyBag, StmtId, StmtKind, TypeKind, TypeRefId,
};

#[derive(Default)]
pub struct AstBuilder {
    ast: Ast,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Ast {
        self.ast
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn expr_span(&self, id: ExprId) -> Span {
        self.ast.expr(id).span
    }

    pub fn stmt_span(&self, id: StmtId) -> Span {
        self.ast.stmt(id).span
    }

    pub fn props_mut(&mut self, r: NodeRef) -> &mut PropertyBag {
        self.ast.props_of_mut(r)
    }

    pub fn stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        debug_assert!(span.is_valid());
        let mut kids = Vec::new();
        stmt_children(&kind, &mut |r| kids.push(r));
        let id = StmtId(self.ast.stmts.len() as u32);
        self.ast.stmts.push(Node {
            kind,
            span,
            parent: None,
            props: PropertyBag::new(),
        });
        self.adopt(NodeRef::Stmt(id), &kids);
        id
    }

    pub fn expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        debug_assert!(span.is_valid());
        let mut kids = Vec::new();
        expr_children(&kind, &mut |r| kids.push(r));
        let id = ExprId(self.ast.exprs.len() as u32);
        self.ast.exprs.push(Node {
            kind,
            span,
            parent: None,
            props: PropertyBag::new(),
        });
        self.adopt(NodeRef::Expr(id), &kids);
        id
    }

    pub fn member(&mut self, kind: MemberKind, span: Span) -> MemberId {
        debug_assert!(span.is_valid());
        let mut kids = Vec::new();
        member_children(&kind, &mut |r| kids.push(r));
        let id = MemberId(self.ast.members.len() as u32);
        self.ast.members.push(Node {
            kind,
            span,
            parent: None,
            props: PropertyBag::new(),
        });
        self.adopt(NodeRef::Member(id), &kids);
        id
    }

    pub fn type_ref(&mut self, kind: TypeKind, span: Span) -> TypeRefId {
        debug_assert!(span.is_valid());
        let mut kids = Vec::new();
        type_children(&kind, &mut |r| kids.push(r));
        let id = TypeRefId(self.ast.types.len() as u32);
        self.ast.types.push(Node {
            kind,
            span,
            parent: None,
            props: PropertyBag::new(),
        });
        self.adopt(NodeRef::Type(id), &kids);
        id
    }

    fn adopt(&mut self, parent: NodeRef, kids: &[NodeRef]) {
        for &child in kids {
            let slot = match child {
                NodeRef::Stmt(id) => &mut self.ast.stmts[id.index()].parent,
                NodeRef::Expr(id) => &mut self.ast.exprs[id.index()].parent,
                NodeRef::Member(id) => &mut self.ast.members[id.index()].parent,
                NodeRef::Type(id) => &mut self.ast.types[id.index()].parent,
            };
            debug_assert!(slot.is_none(), "node attached to a second parent");
            *slot = Some(parent);
        }
    }
}
