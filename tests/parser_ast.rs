use php_front::ast::{
    Ast, BinaryOp, ExprKind, MemberKind, Modifier, NewTarget, NodeRef, StmtKind, TypeKind,
    UnaryOp, UseKind, DOC_COMMENT_PROP, HALT_OFFSET_PROP,
};
use php_front::{parse, Features, Parse};

fn parse_clean(source: &str) -> Parse {
    let result = parse(source.as_bytes(), Features::default());
    assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
    result
}

fn top_stmts(result: &Parse) -> Vec<php_front::ast::StmtId> {
    match &result.ast.stmt(result.root).kind {
        StmtKind::GlobalCode { stmts } => stmts.clone(),
        other => panic!("root is {other:?}"),
    }
}

fn check_tree(ast: &Ast, node: NodeRef) {
    for child in ast.children(node) {
        assert_eq!(ast.parent_of(child), Some(node), "broken parent link");
        assert!(
            ast.span_of(node).contains(ast.span_of(child)),
            "child span {:?} escapes parent span {:?}",
            ast.span_of(child),
            ast.span_of(node)
        );
        check_tree(ast, child);
    }
}

#[test]
fn spans_cover_children_and_parents_point_back() {
    let source = r#"<?php
namespace App;

use Foo\Bar as Baz;
use function Foo\{strlen, strrev as rev};

/** Frobs widgets. */
final class Widget extends Base implements A, B {
    use Mixin {
        Mixin::run as protected launch;
    }

    const LIMIT = 10, NAME = 'w';
    private static ?int $count = 0, $extra;

    public function frob(int $n, callable $f = null, ...$rest): ?Widget {
        $total = $n <=> 2 ** 3 ** 2;
        foreach ($rest as $k => &$v) {
            $total += $v ?? 0;
        }
        while ($total > 0) {
            $total--;
        }
        $s = "count: {$this->count} [$n]" . <<<EOT
tail $n
EOT;
        $fn = static function () use (&$total): int {
            return $total;
        };
        $short = fn($x) => $x + 1;
        try {
            throw new \RuntimeException("bad");
        } catch (TypeError | ValueError $e) {
            goto done;
        } finally {
            $obj = new class(1) extends Base {
                public function id() { return 1; }
            };
        }
        done:
        switch ($n) {
            case 1:
                return null;
            default:
                break 1;
        }
        return $this;
    }
}

function listify(array $items) {
    list($a, , $b) = $items;
    [$c, $d] = [1, 2];
    return isset($a, $b) ? [$a => $b, ...$items] : (clone $GLOBALS['x'])->y;
}
"#;
    let result = parse_clean(source);
    check_tree(&result.ast, NodeRef::Stmt(result.root));
    assert!(result.ast.parent_of(NodeRef::Stmt(result.root)).is_none());
}

#[test]
fn inline_html_program_has_three_statements() {
    let result = parse_clean("Hello <?php $x = 1; ?> World");
    let stmts = top_stmts(&result);
    assert_eq!(stmts.len(), 3);
    assert!(matches!(
        result.ast.stmt(stmts[0]).kind,
        StmtKind::InlineHtml { .. }
    ));
    let StmtKind::Expr { expr } = result.ast.stmt(stmts[1]).kind else {
        panic!("middle statement should be an expression");
    };
    assert!(matches!(
        result.ast.expr(expr).kind,
        ExprKind::Assign { .. }
    ));
    assert!(matches!(
        result.ast.stmt(stmts[2]).kind,
        StmtKind::InlineHtml { .. }
    ));
}

#[test]
fn interpolation_builds_an_encaps_list() {
    let result = parse_clean("<?php \"a$x b\";");
    let stmts = top_stmts(&result);
    let StmtKind::Expr { expr } = result.ast.stmt(stmts[0]).kind else {
        panic!("expected expression statement");
    };
    let ExprKind::InterpolatedString { parts } = &result.ast.expr(expr).kind else {
        panic!("expected interpolated string");
    };
    assert_eq!(parts.len(), 3);
    assert!(matches!(result.ast.expr(parts[0]).kind, ExprKind::Str { .. }));
    match &result.ast.expr(parts[1]).kind {
        ExprKind::Variable { name } => assert_eq!(name, "x"),
        other => panic!("expected a variable, got {other:?}"),
    }
    assert!(matches!(result.ast.expr(parts[2]).kind, ExprKind::Str { .. }));
}

#[test]
fn dangling_else_binds_to_the_inner_if() {
    let result = parse_clean("<?php if ($a) if ($b) c(); else d();");
    let stmts = top_stmts(&result);
    let StmtKind::If { then, else_, .. } = result.ast.stmt(stmts[0]).kind else {
        panic!("expected if");
    };
    assert!(else_.is_none(), "else bound to the outer if");
    let StmtKind::If { else_: inner_else, .. } = result.ast.stmt(then).kind else {
        panic!("inner statement should be the nested if");
    };
    assert!(inner_else.is_some(), "else lost from the inner if");
}

#[test]
fn precedence_shapes() {
    let result = parse_clean("<?php 1 + 2 * 3;");
    let stmts = top_stmts(&result);
    let StmtKind::Expr { expr } = result.ast.stmt(stmts[0]).kind else {
        panic!();
    };
    let ExprKind::Binary { op, rhs, .. } = &result.ast.expr(expr).kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(
        result.ast.expr(*rhs).kind,
        ExprKind::Binary {
            op: BinaryOp::Mul,
            ..
        }
    ));

    // ** is right associative and binds tighter than unary minus.
    let result = parse_clean("<?php -2 ** 3 ** 2;");
    let stmts = top_stmts(&result);
    let StmtKind::Expr { expr } = result.ast.stmt(stmts[0]).kind else {
        panic!();
    };
    let ExprKind::Unary { op, expr: inner } = &result.ast.expr(expr).kind else {
        panic!("expected unary minus at the top");
    };
    assert_eq!(*op, UnaryOp::Minus);
    let ExprKind::Binary { op, rhs, .. } = &result.ast.expr(*inner).kind else {
        panic!("expected pow");
    };
    assert_eq!(*op, BinaryOp::Pow);
    assert!(matches!(
        result.ast.expr(*rhs).kind,
        ExprKind::Binary {
            op: BinaryOp::Pow,
            ..
        }
    ));

    // Assignment chains to the right.
    let result = parse_clean("<?php $a = $b = 1;");
    let stmts = top_stmts(&result);
    let StmtKind::Expr { expr } = result.ast.stmt(stmts[0]).kind else {
        panic!();
    };
    let ExprKind::Assign { value, .. } = &result.ast.expr(expr).kind else {
        panic!("expected assignment");
    };
    assert!(matches!(
        result.ast.expr(*value).kind,
        ExprKind::Assign { .. }
    ));

    // The short ternary chains to the left.
    let result = parse_clean("<?php 1 ?: 2 ?: 3;");
    let stmts = top_stmts(&result);
    let StmtKind::Expr { expr } = result.ast.stmt(stmts[0]).kind else {
        panic!();
    };
    let ExprKind::Ternary { cond, then, .. } = &result.ast.expr(expr).kind else {
        panic!("expected ternary");
    };
    assert!(then.is_none());
    assert!(matches!(
        result.ast.expr(*cond).kind,
        ExprKind::Ternary { .. }
    ));
}

#[test]
fn doc_comment_attaches_to_the_next_declaration() {
    let result = parse_clean("<?php /** the doc */ function f() {}");
    let stmts = top_stmts(&result);
    let doc = result
        .ast
        .stmt(stmts[0])
        .props()
        .get::<String>(DOC_COMMENT_PROP)
        .expect("doc comment attached");
    assert_eq!(doc, "/** the doc */");

    // An intervening statement clears the pending doc block.
    let result = parse_clean("<?php /** lost */ $x = 1; function g() {}");
    let stmts = top_stmts(&result);
    assert!(result
        .ast
        .stmt(stmts[1])
        .props()
        .get::<String>(DOC_COMMENT_PROP)
        .is_none());
}

#[test]
fn doc_comment_attaches_to_methods() {
    let result = parse_clean("<?php class C { /** m doc */ public function m() {} }");
    let stmts = top_stmts(&result);
    let StmtKind::Class { members, .. } = &result.ast.stmt(stmts[0]).kind else {
        panic!("expected class");
    };
    let doc = result
        .ast
        .member(members[0])
        .props()
        .get::<String>(DOC_COMMENT_PROP)
        .expect("method doc");
    assert_eq!(doc, "/** m doc */");
}

#[test]
fn use_statements_in_all_four_flavours() {
    let source = r"<?php
use A\B;
use function strlen as len;
use const PHP_EOL;
use X\Y\{Z, function f, const C};
";
    let result = parse_clean(source);
    let stmts = top_stmts(&result);

    let StmtKind::Use { kind, prefix, items } = &result.ast.stmt(stmts[0]).kind else {
        panic!();
    };
    assert_eq!(*kind, UseKind::Normal);
    assert!(prefix.is_none());
    assert_eq!(items[0].name.parts, vec!["A", "B"]);

    let StmtKind::Use { kind, items, .. } = &result.ast.stmt(stmts[1]).kind else {
        panic!();
    };
    assert_eq!(*kind, UseKind::Function);
    assert_eq!(items[0].alias.as_deref(), Some("len"));

    let StmtKind::Use { kind, .. } = &result.ast.stmt(stmts[2]).kind else {
        panic!();
    };
    assert_eq!(*kind, UseKind::Const);

    let StmtKind::Use { prefix, items, .. } = &result.ast.stmt(stmts[3]).kind else {
        panic!();
    };
    assert_eq!(prefix.as_ref().unwrap().parts, vec!["X", "Y"]);
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].kind, UseKind::Function);
    assert_eq!(items[2].kind, UseKind::Const);
}

#[test]
fn class_members_come_out_typed() {
    let source = r"<?php
abstract class C {
    const A = 1;
    public ?int $n = 0;
    abstract protected function f(): array;
}
";
    let result = parse_clean(source);
    let stmts = top_stmts(&result);
    let StmtKind::Class { modifiers, members, .. } = &result.ast.stmt(stmts[0]).kind else {
        panic!("expected class");
    };
    assert_eq!(modifiers, &vec![Modifier::Abstract]);
    assert_eq!(members.len(), 3);
    assert!(matches!(
        result.ast.member(members[0]).kind,
        MemberKind::ClassConst { .. }
    ));
    let MemberKind::Property { ty, entries, .. } = &result.ast.member(members[1]).kind else {
        panic!("expected property");
    };
    let ty = (*ty).expect("property type");
    assert!(matches!(
        result.ast.type_ref(ty).kind,
        TypeKind::Nullable { .. }
    ));
    assert_eq!(entries[0].name, "n");
    let MemberKind::Method {
        modifiers,
        body,
        return_type,
        ..
    } = &result.ast.member(members[2]).kind
    else {
        panic!("expected method");
    };
    assert!(modifiers.contains(&Modifier::Abstract));
    assert!(body.is_none());
    let rt = (*return_type).expect("return type");
    assert!(matches!(result.ast.type_ref(rt).kind, TypeKind::Array));
}

#[test]
fn anonymous_class_is_a_declaration_under_new() {
    let result = parse_clean("<?php $o = new class(1) { public function id() {} };");
    let stmts = top_stmts(&result);
    let StmtKind::Expr { expr } = result.ast.stmt(stmts[0]).kind else {
        panic!();
    };
    let ExprKind::Assign { value, .. } = &result.ast.expr(expr).kind else {
        panic!();
    };
    let ExprKind::New { class, args } = &result.ast.expr(*value).kind else {
        panic!("expected new");
    };
    assert_eq!(args.len(), 1);
    let NewTarget::Anonymous(class) = class else {
        panic!("expected anonymous class");
    };
    let StmtKind::Class { anonymous, name, .. } = &result.ast.stmt(*class).kind else {
        panic!();
    };
    assert!(*anonymous);
    assert!(name.is_none());
}

#[test]
fn property_bags_are_open_to_hosts() {
    let mut result = parse_clean("<?php $x = 1;");
    let root = result.root;
    let props = result.ast.stmt_mut(root).props_mut();
    props.set("note", 7u32);
    props.set_typed(true);
    assert_eq!(result.ast.stmt(root).props().get::<u32>("note"), Some(&7));
    assert_eq!(result.ast.stmt(root).props().get_typed::<bool>(), Some(&true));
    assert!(result.ast.stmt_mut(root).props_mut().remove("note"));
    assert!(result.ast.stmt(root).props().get::<u32>("note").is_none());
}

#[test]
fn halt_compiler_stops_the_parse() {
    let result = parse(
        b"<?php $a = 1; __halt_compiler(); this is ### not : php",
        Features::default(),
    );
    assert!(result.ok(), "diagnostics: {:?}", result.diagnostics);
    let stmts = top_stmts(&result);
    assert_eq!(stmts.len(), 2);
    let halt = stmts[1];
    assert!(matches!(
        result.ast.stmt(halt).kind,
        StmtKind::HaltCompiler
    ));
    let offset = result
        .ast
        .stmt(halt)
        .props()
        .get::<usize>(HALT_OFFSET_PROP)
        .expect("halt offset recorded");
    assert_eq!(*offset, "<?php $a = 1; __halt_compiler();".len());
}

#[test]
fn halt_compiler_is_rejected_in_nested_scope() {
    let result = parse(b"<?php function f() { __halt_compiler(); }", Features::default());
    assert!(!result.ok());
}

#[test]
fn short_open_tag_feature_reaches_the_parser() {
    let off = parse(b"<? echo 1;", Features::default());
    let stmts = top_stmts(&off);
    assert!(matches!(
        off.ast.stmt(stmts[0]).kind,
        StmtKind::InlineHtml { .. }
    ));

    let on = parse(
        b"<? echo 1;",
        Features {
            short_open_tags: true,
        },
    );
    let stmts = top_stmts(&on);
    assert!(matches!(on.ast.stmt(stmts[0]).kind, StmtKind::Echo { .. }));
}
