//! Compact s-expression dump of a tree, used by the CLI and tests.

use super::{
    Ast, BinaryOp, Callee, ExprId, ExprKind, StmtId, StmtKind, StrLit, UnaryOp,
};

pub struct SExprFormatter<'ast> {
    ast: &'ast Ast,
    output: String,
    indent: usize,
}

impl<'ast> SExprFormatter<'ast> {
    pub fn new(ast: &'ast Ast) -> Self {
        Self {
            ast,
            output: String::new(),
            indent: 0,
        }
    }

    pub fn format(mut self, root: StmtId) -> String {
        self.stmt(root);
        self.output
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn newline(&mut self) {
        self.output.push('\n');
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
    }

    fn stmt_list(&mut self, head: &str, stmts: &[StmtId]) {
        self.write("(");
        self.write(head);
        self.indent += 1;
        for &s in stmts {
            self.newline();
            self.stmt(s);
        }
        self.indent -= 1;
        self.write(")");
    }

    fn stmt(&mut self, id: StmtId) {
        let kind = &self.ast.stmt(id).kind;
        match kind {
            StmtKind::GlobalCode { stmts } => {
                let stmts = stmts.clone();
                self.stmt_list("program", &stmts);
            }
            StmtKind::Block { stmts } => {
                let stmts = stmts.clone();
                self.stmt_list("block", &stmts);
            }
            StmtKind::Nop => self.write("(nop)"),
            StmtKind::InlineHtml { .. } => self.write("(inline-html)"),
            StmtKind::Expr { expr } => {
                let expr = *expr;
                self.expr(expr);
            }
            StmtKind::Echo { exprs } => {
                let exprs = exprs.clone();
                self.write("(echo");
                for e in exprs {
                    self.write(" ");
                    self.expr(e);
                }
                self.write(")");
            }
            StmtKind::If { cond, then, else_ } => {
                let (cond, then, else_) = (*cond, *then, *else_);
                self.write("(if ");
                self.expr(cond);
                self.indent += 1;
                self.newline();
                self.write("(then ");
                self.stmt(then);
                self.write(")");
                if let Some(else_) = else_ {
                    self.newline();
                    self.write("(else ");
                    self.stmt(else_);
                    self.write(")");
                }
                self.indent -= 1;
                self.write(")");
            }
            StmtKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                self.write("(while ");
                self.expr(cond);
                self.write(" ");
                self.stmt(body);
                self.write(")");
            }
            StmtKind::Return { expr } => {
                let expr = *expr;
                self.write("(return");
                if let Some(e) = expr {
                    self.write(" ");
                    self.expr(e);
                }
                self.write(")");
            }
            StmtKind::Function { name, body, .. } => {
                let name = name.clone();
                let body = *body;
                self.write("(function ");
                self.write(&name);
                self.write(" ");
                self.stmt(body);
                self.write(")");
            }
            StmtKind::HaltCompiler => self.write("(halt-compiler)"),
            StmtKind::Error => self.write("(error)"),
            _ => self.write("(stmt)"),
        }
    }

    fn expr(&mut self, id: ExprId) {
        let kind = &self.ast.expr(id).kind;
        match kind {
            ExprKind::Int { value, .. } => {
                let text = value.to_string();
                self.write("(int ");
                self.write(&text);
                self.write(")");
            }
            ExprKind::Double { value, .. } => {
                let text = format!("{value:?}");
                self.write("(float ");
                self.write(&text);
                self.write(")");
            }
            ExprKind::Str { value, .. } => {
                let text = match value {
                    StrLit::Text(s) => s.clone(),
                    StrLit::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
                };
                self.write("(string \"");
                self.write(&text);
                self.write("\")");
            }
            ExprKind::Bool { value } => {
                self.write(if *value { "(true)" } else { "(false)" });
            }
            ExprKind::Null => self.write("(null)"),
            ExprKind::Variable { name } => {
                let name = name.clone();
                self.write("(var $");
                self.write(&name);
                self.write(")");
            }
            ExprKind::Identifier { name } => {
                let name = name.clone();
                self.write("(name ");
                self.write(&name);
                self.write(")");
            }
            ExprKind::ConstFetch { name } => {
                let name = name.parts.join("\\");
                self.write("(const ");
                self.write(&name);
                self.write(")");
            }
            ExprKind::Assign { target, value } => {
                let (target, value) = (*target, *value);
                self.write("(assign ");
                self.expr(target);
                self.write(" ");
                self.expr(value);
                self.write(")");
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                self.write("(");
                self.write(binary_op_symbol(op));
                self.write(" ");
                self.expr(lhs);
                self.write(" ");
                self.expr(rhs);
                self.write(")");
            }
            ExprKind::Unary { op, expr } => {
                let (op, expr) = (*op, *expr);
                self.write("(");
                self.write(match op {
                    UnaryOp::Plus => "u+",
                    UnaryOp::Minus => "u-",
                    UnaryOp::Not => "not",
                    UnaryOp::BitNot => "bnot",
                });
                self.write(" ");
                self.expr(expr);
                self.write(")");
            }
            ExprKind::Call { callee, args } => {
                let callee = callee.clone();
                let args: Vec<_> = args.iter().map(|a| a.value).collect();
                self.write("(call ");
                match callee {
                    Callee::Name(name) => self.write(&name.parts.join("\\")),
                    Callee::Expr(e) => self.expr(e),
                }
                for a in args {
                    self.write(" ");
                    self.expr(a);
                }
                self.write(")");
            }
            ExprKind::InterpolatedString { parts } => {
                let parts = parts.clone();
                self.write("(interp");
                for p in parts {
                    self.write(" ");
                    self.expr(p);
                }
                self.write(")");
            }
            ExprKind::Error => self.write("(error)"),
            _ => self.write("(expr)"),
        }
    }
}

fn binary_op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Concat => ".",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::LogicalAnd => "and",
        BinaryOp::LogicalOr => "or",
        BinaryOp::LogicalXor => "xor",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::Identical => "===",
        BinaryOp::NotIdentical => "!==",
        BinaryOp::Less => "<",
        BinaryOp::LessEq => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterEq => ">=",
        BinaryOp::Spaceship => "<=>",
        BinaryOp::Coalesce => "??",
    }
}
