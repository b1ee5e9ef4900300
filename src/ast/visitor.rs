//! Tree traversal. Override the hooks you care about and delegate the
//! rest to the matching `walk_*` function.

use super::{
    expr_children, member_children, stmt_children, type_children, Ast, ExprId, MemberId,
    NodeRef, StmtId, TypeRefId,
};

pub trait Visitor {
    fn visit_stmt(&mut self, ast: &Ast, id: StmtId) {
        walk_stmt(self, ast, id);
    }

    fn visit_expr(&mut self, ast: &Ast, id: ExprId) {
        walk_expr(self, ast, id);
    }

    fn visit_member(&mut self, ast: &Ast, id: MemberId) {
        walk_member(self, ast, id);
    }

    fn visit_type(&mut self, ast: &Ast, id: TypeRefId) {
        walk_type(self, ast, id);
    }
}

/// Dispatches `node` to the handler matching its variant family.
pub fn visit<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, node: NodeRef) {
    match node {
        NodeRef::Stmt(id) => v.visit_stmt(ast, id),
        NodeRef::Expr(id) => v.visit_expr(ast, id),
        NodeRef::Member(id) => v.visit_member(ast, id),
        NodeRef::Type(id) => v.visit_type(ast, id),
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, id: StmtId) {
    stmt_children(&ast.stmt(id).kind, &mut |r| visit(v, ast, r));
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, id: ExprId) {
    expr_children(&ast.expr(id).kind, &mut |r| visit(v, ast, r));
}

pub fn walk_member<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, id: MemberId) {
    member_children(&ast.member(id).kind, &mut |r| visit(v, ast, r));
}

pub fn walk_type<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, id: TypeRefId) {
    type_children(&ast.type_ref(id).kind, &mut |r| visit(v, ast, r));
}
