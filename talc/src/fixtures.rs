//! Hand-built demonstration programs (§4.9: parsing a real `.talc` file is
//! out of scope for this repository — there is no parser crate). Each
//! fixture builds its own top-level [`ScopeId`] directly out of
//! `talc-ast` nodes, the same way `talc-check`'s own unit tests construct
//! fixtures, just assembled into a whole small program instead of one
//! expression.

use std::rc::Rc;

use talc_ast::{BinOp, Expr, ExprNode, FunctionParameter, Node, Stmt, StmtNode, Tags, UnOp};
use talc_check::CompilerContext;
use talc_source::{FileRange, Identifier};
use talc_tir::ScopeId;

fn expr(e: Expr) -> ExprNode {
    Node::new(e, FileRange::synthetic())
}

fn stmt(s: Stmt) -> StmtNode {
    Node::new(s, FileRange::synthetic())
}

fn id(name: &str) -> Identifier {
    Identifier::synthetic(name)
}

fn named(name: &str) -> ExprNode {
    expr(Expr::NamedReference(id(name)))
}

fn ty_i32() -> ExprNode {
    named("i32")
}

fn simple_param(name: &str, ty: ExprNode) -> FunctionParameter {
    FunctionParameter { name: id(name), is_polymorphic_determiner: false, ty: Some(ty), polymorphic_determiner: None }
}

/// `fn add(a: i32, b: i32) -> i32 { return a + b; }` plus a `main` that
/// calls it — exercises an ordinary function call and constant-free
/// arithmetic lowering.
fn add(ctx: &mut CompilerContext) -> ScopeId {
    let top = ctx.scopes.new_scope(None, None, true);

    let add_fn = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("add"),
        parameters: vec![simple_param("a", ty_i32()), simple_param("b", ty_i32())],
        return_types: vec![ty_i32()],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement {
            values: vec![expr(Expr::BinaryOperation { op: BinOp::Add, left: named("a"), right: named("b") })],
        })]),
    }));
    ctx.scopes.add_declaration(top, add_fn);

    let main_fn = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("main"),
        parameters: vec![],
        return_types: vec![ty_i32()],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement {
            values: vec![expr(Expr::FunctionCall { expression: named("add"), arguments: vec![expr(Expr::IntegerLiteral(2)), expr(Expr::IntegerLiteral(3))] })],
        })]),
    }));
    ctx.scopes.add_declaration(top, main_fn);

    top
}

/// `static_variable count: i32 = 0;` plus a reader function — exercises
/// `GenerateStaticVariable` and a `StaticVariableReference` read.
fn counter(ctx: &mut CompilerContext) -> ScopeId {
    let top = ctx.scopes.new_scope(None, None, true);

    let count_var = Rc::new(stmt(Stmt::VariableDeclaration {
        name: id("count"),
        ty: Some(ty_i32()),
        initializer: Some(expr(Expr::IntegerLiteral(0))),
        tags: Tags::default(),
    }));
    ctx.scopes.add_declaration(top, count_var);

    let get_count = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("get_count"),
        parameters: vec![],
        return_types: vec![ty_i32()],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement { values: vec![named("count")] })]),
    }));
    ctx.scopes.add_declaration(top, get_count);

    top
}

/// `fn abs(x: i32) -> i32 tags extern("c");` — a bodiless `extern`
/// declaration, exercising the `is_external` entry-seed bypass (no
/// `TypeFunctionBody`/`GenerateFunction` job is ever submitted for it).
fn extern_abs(ctx: &mut CompilerContext) -> ScopeId {
    let top = ctx.scopes.new_scope(None, None, true);

    let abs_fn = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("abs"),
        parameters: vec![simple_param("x", ty_i32())],
        return_types: vec![ty_i32()],
        tags: Tags { extern_libraries: Some(vec!["c".into()]), no_mangle: false, call_conv: None },
        body: None,
    }));
    ctx.scopes.add_declaration(top, abs_fn);

    let main_fn = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("main"),
        parameters: vec![],
        return_types: vec![ty_i32()],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement {
            values: vec![expr(Expr::FunctionCall { expression: named("abs"), arguments: vec![expr(Expr::UnaryOperation { op: UnOp::Negate, expression: expr(Expr::IntegerLiteral(5)) })] })],
        })]),
    }));
    ctx.scopes.add_declaration(top, main_fn);

    top
}

/// Every fixture name this binary knows, for `--fixture`'s help text and
/// error message.
pub const NAMES: &[&str] = &["add", "counter", "extern_abs"];

/// Build the named fixture's top-level scope inside `ctx`. Returns `None`
/// for an unrecognised name (the caller turns that into a CLI error).
pub fn build(ctx: &mut CompilerContext, name: &str) -> Option<ScopeId> {
    match name {
        "add" => Some(add(ctx)),
        "counter" => Some(counter(ctx)),
        "extern_abs" => Some(extern_abs(ctx)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talc_target::ArchitectureSizes;

    #[test]
    fn every_named_fixture_builds_and_is_findable_by_build() {
        let mut ctx = CompilerContext::new(ArchitectureSizes::default());
        for name in NAMES {
            let top = build(&mut ctx, name).unwrap_or_else(|| panic!("fixture `{name}` failed to build"));
            assert!(!ctx.scopes.get(top).declarations.is_empty());
        }
    }

    #[test]
    fn unknown_fixture_name_returns_none() {
        let mut ctx = CompilerContext::new(ArchitectureSizes::default());
        assert!(build(&mut ctx, "does_not_exist").is_none());
    }
}
