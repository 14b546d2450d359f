//! End-to-end scenario coverage (§4.9): each test builds a hand-written
//! `talc-ast` fixture for one documented scenario, runs it through
//! `talc_pipeline::compile`, and asserts the literal instruction sequence
//! the scenario calls for, the same way `talc-pipeline`'s own unit tests
//! build fixtures but kept in a dedicated integration suite since these
//! exercise the generator end to end rather than one pipeline seeding
//! detail. S3 in particular is the regression guard for the in-register
//! slice indexing fix: without it, an indexed slice parameter would get
//! spilled through `AllocateLocal`/`Store` before its pointer field was
//! ever read.

use std::rc::Rc;

use talc_ast::{BinOp, Expr, ExprNode, FunctionParameter, Node, Stmt, StmtNode, Tags};
use talc_check::CompilerContext;
use talc_ir::{InstructionKind, IrType, RuntimeStaticKind};
use talc_pipeline::{compile, CompilerSettings};
use talc_source::{FileRange, Identifier};
use talc_target::ArchitectureSizes;
use talc_types::IntegerSize;

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

fn simple_param(name: &str, ty: ExprNode) -> FunctionParameter {
    FunctionParameter { name: id(name), is_polymorphic_determiner: false, ty: Some(ty), polymorphic_determiner: None }
}

fn new_ctx() -> CompilerContext {
    CompilerContext::new(ArchitectureSizes::default())
}

/// S1: a polymorphic identity function instantiated at a single call site.
/// The literal argument is wrapped in a `Cast` to `i32` so the
/// instantiation's determiner binds to a concrete integer type rather
/// than the literal's own `UndeterminedInteger` type.
#[test]
fn s1_polymorphic_identity_lowers_to_a_bare_return_of_its_parameter() {
    let mut ctx = new_ctx();
    let top = ctx.scopes.new_scope(None, None, true);

    let identity = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("identity"),
        parameters: vec![FunctionParameter {
            name: id("value"),
            is_polymorphic_determiner: true,
            ty: None,
            polymorphic_determiner: Some(id("T")),
        }],
        return_types: vec![named("T")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement { values: vec![named("value")] })]),
    }));
    ctx.scopes.add_declaration(top, identity);

    let main = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("main"),
        parameters: vec![],
        return_types: vec![named("i32")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement {
            values: vec![expr(Expr::FunctionCall {
                expression: named("identity"),
                arguments: vec![expr(Expr::Cast { expression: expr(Expr::IntegerLiteral(42)), ty: named("i32") })],
            })],
        })]),
    }));
    ctx.scopes.add_declaration(top, main);

    let settings = CompilerSettings::default();
    let output = compile(&mut ctx, &settings, top);
    assert!(!ctx.sink.has_errors());
    let output = output.expect("expected a successful compilation");

    // The polymorphic declaration itself never reaches `GenerateFunction`
    // (it is a type-only marker); only its one instantiation and `main` do.
    assert_eq!(output.statics.len(), 2);

    let instantiation = output
        .statics
        .iter()
        .find_map(|s| match &s.kind {
            RuntimeStaticKind::Function(f) if f.parameters == vec![IrType::Integer(IntegerSize::Bit32)] => Some(f),
            _ => None,
        })
        .expect("expected a generated instantiation of `identity` taking a single i32");

    assert_eq!(instantiation.blocks.len(), 1);
    let instructions = &instantiation.blocks[talc_ir::BasicBlockId::from_raw(0)].instructions;
    assert_eq!(instructions.len(), 1, "identity<i32> should lower to nothing but its own return: {instructions:?}");
    match &instructions[0].kind {
        InstructionKind::Return { value: Some(register) } => assert_eq!(register.index(), 0, "the parameter is always bound to register 0"),
        other => panic!("expected Return(param0), found {other:?}"),
    }
}

/// S2: a true `static_if` splices its body into the enclosing scope; a
/// false one is discarded entirely, so only one `foo` ever reaches
/// resolution (two same-named declarations would otherwise collide).
#[test]
fn s2_static_if_splices_the_true_branch_and_discards_the_false_one() {
    let mut ctx = new_ctx();
    let top = ctx.scopes.new_scope(None, None, true);

    let foo_true = stmt(Stmt::FunctionDeclaration {
        name: id("foo"),
        parameters: vec![],
        return_types: vec![named("i32")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement { values: vec![expr(Expr::IntegerLiteral(1))] })]),
    });
    let static_if_true = Rc::new(stmt(Stmt::StaticIf { condition: expr(Expr::BooleanLiteral(true)), body: vec![foo_true] }));
    ctx.scopes.add_declaration(top, static_if_true);

    let bar_false = stmt(Stmt::FunctionDeclaration {
        name: id("bar"),
        parameters: vec![],
        return_types: vec![named("i32")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement { values: vec![expr(Expr::IntegerLiteral(0))] })]),
    });
    let static_if_false = Rc::new(stmt(Stmt::StaticIf { condition: expr(Expr::BooleanLiteral(false)), body: vec![bar_false] }));
    ctx.scopes.add_declaration(top, static_if_false);

    let main = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("main"),
        parameters: vec![],
        return_types: vec![named("i32")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement { values: vec![expr(Expr::FunctionCall { expression: named("foo"), arguments: vec![] })] })]),
    }));
    ctx.scopes.add_declaration(top, main);

    let settings = CompilerSettings::default();
    let output = compile(&mut ctx, &settings, top);
    assert!(!ctx.sink.has_errors());
    let output = output.expect("expected a successful compilation");

    assert_eq!(output.statics.len(), 2, "the false branch's `bar` must never be generated");
    let foo = output.statics.iter().find(|s| &*s.name == "foo").expect("expected `foo` spliced in from the true static_if branch");
    assert!(matches!(foo.kind, RuntimeStaticKind::Function(_)));
    assert!(output.statics.iter().all(|s| &*s.name != "bar"), "the false static_if branch must be discarded entirely");
}

/// S3 regression guard for the in-register slice spill fix: a slice
/// passed as a function parameter must read its data pointer straight
/// out of its own register (`ReadStructMember`) with no `AllocateLocal`/
/// `Store` spill in between.
#[test]
fn s3_indexing_an_in_register_slice_parameter_never_spills_it() {
    let mut ctx = new_ctx();
    let top = ctx.scopes.new_scope(None, None, true);

    let slice_ty = expr(Expr::ArrayType { element: named("i32"), length: None });
    let take = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("take"),
        parameters: vec![simple_param("s", slice_ty)],
        return_types: vec![named("i32")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement {
            values: vec![expr(Expr::IndexReference { expression: named("s"), index: expr(Expr::IntegerLiteral(1)) })],
        })]),
    }));
    ctx.scopes.add_declaration(top, take);

    let static_array_ty = expr(Expr::ArrayType { element: named("i32"), length: Some(expr(Expr::IntegerLiteral(3))) });
    let a = Rc::new(stmt(Stmt::VariableDeclaration {
        name: id("a"),
        ty: Some(static_array_ty),
        initializer: Some(expr(Expr::ArrayLiteral {
            elements: vec![expr(Expr::IntegerLiteral(10)), expr(Expr::IntegerLiteral(20)), expr(Expr::IntegerLiteral(30))],
        })),
        tags: Tags::default(),
    }));
    ctx.scopes.add_declaration(top, a);

    let main = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("main"),
        parameters: vec![],
        return_types: vec![named("i32")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement {
            values: vec![expr(Expr::FunctionCall { expression: named("take"), arguments: vec![named("a")] })],
        })]),
    }));
    ctx.scopes.add_declaration(top, main);

    let settings = CompilerSettings::default();
    let output = compile(&mut ctx, &settings, top);
    assert!(!ctx.sink.has_errors());
    let output = output.expect("expected a successful compilation");

    let take_fn = output
        .statics
        .iter()
        .find_map(|s| match &s.kind {
            RuntimeStaticKind::Function(f) if f.parameters.len() == 1 && matches!(f.parameters[0], IrType::Struct { .. }) => Some(f),
            _ => None,
        })
        .expect("expected the generated `take` function, taking one slice parameter");

    assert_eq!(take_fn.blocks.len(), 1);
    let instructions = &take_fn.blocks[talc_ir::BasicBlockId::from_raw(0)].instructions;
    assert!(
        !instructions.iter().any(|i| matches!(i.kind, InstructionKind::AllocateLocal { .. } | InstructionKind::Store { .. })),
        "indexing an in-register slice parameter must never spill it: {instructions:?}"
    );

    let read_member_pos = instructions
        .iter()
        .position(|i| matches!(&i.kind, InstructionKind::ReadStructMember { member_index: 1, .. }))
        .expect("expected a ReadStructMember(1, s) reading the slice's data pointer directly");
    let pointer_index_pos = instructions
        .iter()
        .position(|i| matches!(i.kind, InstructionKind::PointerIndex { .. }))
        .expect("expected a PointerIndex using that pointer");
    assert!(read_member_pos < pointer_index_pos, "the pointer must be read before it is indexed: {instructions:?}");
}

/// S4: a union's two members alias the same storage; assigning through
/// one member and reading back through the other reuses the same pointer
/// register with no offset computation in between.
#[test]
fn s4_union_member_write_and_read_share_the_same_pointer() {
    let mut ctx = new_ctx();
    let top = ctx.scopes.new_scope(None, None, true);

    let u_def = Rc::new(stmt(Stmt::StructDefinition {
        name: id("U"),
        is_union: true,
        parameters: vec![],
        members: vec![(id("i"), named("i32")), (id("f"), named("f32"))],
    }));
    ctx.scopes.add_declaration(top, u_def);

    let main = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("main"),
        parameters: vec![],
        return_types: vec![named("f32")],
        tags: Tags::default(),
        body: Some(vec![
            stmt(Stmt::VariableDeclaration { name: id("u"), ty: Some(named("U")), initializer: None, tags: Tags::default() }),
            stmt(Stmt::Assignment {
                target: expr(Expr::MemberReference { expression: named("u"), name: id("i") }),
                value: expr(Expr::IntegerLiteral(0x3f800000)),
            }),
            stmt(Stmt::ReturnStatement { values: vec![expr(Expr::MemberReference { expression: named("u"), name: id("f") })] }),
        ]),
    }));
    ctx.scopes.add_declaration(top, main);

    let settings = CompilerSettings::default();
    let output = compile(&mut ctx, &settings, top);
    assert!(!ctx.sink.has_errors());
    let output = output.expect("expected a successful compilation");

    let RuntimeStaticKind::Function(main_fn) = &output
        .statics
        .iter()
        .find(|s| &*s.name == "main")
        .expect("expected a generated `main`")
        .kind
    else {
        panic!("expected `main` to be a function static");
    };
    assert_eq!(main_fn.blocks.len(), 1);
    let instructions = &main_fn.blocks[talc_ir::BasicBlockId::from_raw(0)].instructions;

    let alloc = instructions.iter().find_map(|i| match &i.kind {
        InstructionKind::AllocateLocal { destination, .. } => Some(*destination),
        _ => None,
    });
    let alloc = alloc.expect("expected one AllocateLocal for `u`");

    let store = instructions
        .iter()
        .find_map(|i| match &i.kind {
            InstructionKind::Store { destination, .. } => Some(*destination),
            _ => None,
        })
        .expect("expected a Store writing through `u.i`");
    assert_eq!(store, alloc, "a union member write must target the same pointer the union itself was allocated at");

    let load = instructions
        .iter()
        .find_map(|i| match &i.kind {
            InstructionKind::Load { source, .. } => Some(*source),
            _ => None,
        })
        .expect("expected a Load reading back `u.f`");
    assert_eq!(load, alloc, "a union member read must source the same pointer, with no offset in between");

    assert!(
        !instructions.iter().any(|i| matches!(i.kind, InstructionKind::StructMemberPointer { .. })),
        "a union has no member layout to compute an offset into: {instructions:?}"
    );
}

/// S5: a multi-return function assembles its results into a struct at
/// `return`; the caller destructures that struct back out member by
/// member.
#[test]
fn s5_multi_return_assembles_and_destructures_through_a_struct() {
    let mut ctx = new_ctx();
    let top = ctx.scopes.new_scope(None, None, true);

    let pair = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("pair"),
        parameters: vec![],
        return_types: vec![named("i32"), named("i32")],
        tags: Tags::default(),
        body: Some(vec![stmt(Stmt::ReturnStatement { values: vec![expr(Expr::IntegerLiteral(1)), expr(Expr::IntegerLiteral(2))] })]),
    }));
    ctx.scopes.add_declaration(top, pair);

    let main = Rc::new(stmt(Stmt::FunctionDeclaration {
        name: id("main"),
        parameters: vec![],
        return_types: vec![named("i32")],
        tags: Tags::default(),
        body: Some(vec![
            stmt(Stmt::MultiVariableDeclaration {
                names: vec![id("a"), id("b")],
                initializer: expr(Expr::FunctionCall { expression: named("pair"), arguments: vec![] }),
            }),
            stmt(Stmt::ReturnStatement { values: vec![expr(Expr::BinaryOperation { op: BinOp::Add, left: named("a"), right: named("b") })] }),
        ]),
    }));
    ctx.scopes.add_declaration(top, main);

    let settings = CompilerSettings::default();
    let output = compile(&mut ctx, &settings, top);
    assert!(!ctx.sink.has_errors());
    let output = output.expect("expected a successful compilation");

    let RuntimeStaticKind::Function(pair_fn) = &output.statics.iter().find(|s| &*s.name == "pair").expect("expected a generated `pair`").kind else {
        panic!("expected `pair` to be a function static");
    };
    assert_eq!(pair_fn.return_type, Some(IrType::struct_of([IrType::Integer(IntegerSize::Bit32), IrType::Integer(IntegerSize::Bit32)])));
    let pair_instructions = &pair_fn.blocks[talc_ir::BasicBlockId::from_raw(0)].instructions;
    assert!(matches!(pair_instructions.last().map(|i| &i.kind), Some(InstructionKind::Return { value: Some(_) })));
    assert!(pair_instructions.iter().any(|i| matches!(&i.kind, InstructionKind::AssembleStruct { members, .. } if members.len() == 2)));

    let RuntimeStaticKind::Function(main_fn) = &output.statics.iter().find(|s| &*s.name == "main").expect("expected a generated `main`").kind else {
        panic!("expected `main` to be a function static");
    };
    let main_instructions = &main_fn.blocks[talc_ir::BasicBlockId::from_raw(0)].instructions;
    let member_reads: Vec<usize> = main_instructions
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::ReadStructMember { member_index, .. } => Some(*member_index),
            _ => None,
        })
        .collect();
    assert_eq!(member_reads, vec![0, 1], "expected the call's result struct destructured member 0 then member 1, in order");
}

/// S6: two constants that only resolve through each other can never reach
/// a fixpoint; the pipeline reports a cycle rather than looping forever.
#[test]
fn s6_mutually_referencing_constants_are_reported_as_a_cycle() {
    let mut ctx = new_ctx();
    let top = ctx.scopes.new_scope(None, None, true);

    let a = Rc::new(stmt(Stmt::ConstantDefinition { name: id("a"), expression: named("b") }));
    let b = Rc::new(stmt(Stmt::ConstantDefinition { name: id("b"), expression: named("a") }));
    ctx.scopes.add_declaration(top, a);
    ctx.scopes.add_declaration(top, b);

    let settings = CompilerSettings::default();
    let output = compile(&mut ctx, &settings, top);
    assert!(output.is_none());
    assert!(ctx.sink.has_errors());
}
