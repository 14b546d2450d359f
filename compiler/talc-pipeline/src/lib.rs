//! The entry-seed pipeline (§4.9): turns a populated top-level scope into
//! a [`CompilationOutput`], driving both `talc-check`'s and `talc-lower`'s
//! jobs to fixpoint in two phases (DESIGN.md "two-phase entry seed") and
//! converting any leftover `Waiting` jobs into [`CycleError`]s (P3/S6).

pub mod settings;

use std::rc::Rc;

use index_vec::IndexVec;
use talc_ast::{Stmt, StmtNode, Tags};
use talc_check::{resolve_name, Builtins, CompilerContext, JobDriver, JobId, JobKind, JobOutput, JobResult, JobState, Resolution, Scheduler};
use talc_ir::{CompilationOutput, FunctionStatic, IrType, RuntimeStatic, RuntimeStaticKind, StaticVariableStatic};
use talc_lower::{to_ir_type, LowerDriver, LowerShared};
use talc_reporting::CycleError;
use talc_source::FileRange;
use talc_tir::ScopeId;
use talc_types::TypeKind;
use talc_utils::{fx_map, FnvHashMap};

pub use settings::{CompilerSettings, OptimisationLevel};

/// Drives every `JobKind` `talc-check::check::run` understands and
/// nothing else. Used for Phase 1, before any `GenerateFunction`/
/// `GenerateStaticVariable` job can possibly exist yet.
struct SignatureDriver<'a> {
    builtins: &'a Builtins,
}

impl<'a> JobDriver for SignatureDriver<'a> {
    fn run(&mut self, ctx: &mut CompilerContext, scheduler: &mut Scheduler, kind: &JobKind) -> JobResult<JobOutput> {
        talc_check::check::run(ctx, scheduler, self.builtins, kind)
    }
}

/// Run the full pipeline against an already-populated top-level scope.
/// Returns `None` if any error was recorded along the way (check
/// `ctx.sink` for the reports); `settings` is consulted only for logging
/// today (`dump_*`/`emit_errors` are the `talc` binary's concern — see
/// its own use of these flags).
pub fn compile(ctx: &mut CompilerContext, settings: &CompilerSettings, top_level: ScopeId) -> Option<CompilationOutput> {
    log::debug!("entry-seed pipeline starting (target {})", settings.target_triple);
    let builtins = ctx.builtins();
    let mut scheduler = Scheduler::new();

    seed_phase_one(ctx, &mut scheduler, top_level);
    let waiting = {
        let mut driver = SignatureDriver { builtins: &builtins };
        scheduler.run_to_fixpoint(ctx, &mut driver)
    };
    report_cycles(ctx, &scheduler, waiting);

    let mut shared = LowerShared::new();
    seed_phase_two(ctx, &mut scheduler, &builtins, &mut shared, top_level);
    let waiting = {
        let mut driver = LowerDriver::new(&builtins, &mut shared);
        scheduler.run_to_fixpoint(ctx, &mut driver)
    };
    report_cycles(ctx, &scheduler, waiting);

    if ctx.sink.has_errors() {
        return None;
    }
    Some(CompilationOutput { statics: shared.generated, external_libraries: shared.external_libraries, sizes: ctx.sizes })
}

/// Phase 1 (DESIGN.md): submit `ResolveDeclaration` for every ordinary
/// declaration and `TypeStaticIf` for every top-level `static_if`, then
/// let the caller run to fixpoint. A `static_if` whose condition turns
/// out true splices its body into `top_level` as a side effect of
/// `type_static_if`, which is why Phase 2 re-reads the declaration list
/// from scratch instead of reusing this one.
fn seed_phase_one(ctx: &mut CompilerContext, scheduler: &mut Scheduler, top_level: ScopeId) {
    for decl in ctx.scopes.get(top_level).declarations.clone() {
        match decl.body() {
            Stmt::StaticIf { .. } => {
                scheduler.submit(JobKind::TypeStaticIf { scope: top_level, statement: decl.clone() });
            }
            Stmt::FunctionDeclaration { name, .. }
            | Stmt::ConstantDefinition { name, .. }
            | Stmt::StructDefinition { name, .. }
            | Stmt::EnumDefinition { name, .. }
            | Stmt::VariableDeclaration { name, .. } => {
                scheduler.submit_resolve(top_level, name.as_str().into());
            }
            // `Import` has no job kind of its own (§4.2: import resolution
            // is folded into `ResolveDeclaration`'s own step for the
            // declaration that names the imported module); any other
            // statement shape reaching the top level is not a legal
            // top-level statement and is ignored rather than panicking,
            // since a malformed declaration list is the parser's concern
            // (out of scope here), not this driver's.
            _ => {}
        }
    }
}

/// Phase 2 (DESIGN.md): re-scan the (possibly `static_if`-grown)
/// declaration list and seed body-typing/generation jobs for every
/// non-polymorphic function/static variable, special-casing `extern`-
/// tagged declarations (§3 `RuntimeStatic`, the `is_external` decision).
fn seed_phase_two(ctx: &mut CompilerContext, scheduler: &mut Scheduler, builtins: &Builtins, shared: &mut LowerShared, top_level: ScopeId) {
    for decl in ctx.scopes.get(top_level).declarations.clone() {
        match decl.body() {
            Stmt::FunctionDeclaration { name, tags, .. } => {
                let name: Rc<str> = name.as_str().into();
                seed_function(ctx, scheduler, builtins, shared, top_level, &decl, &name, tags);
            }
            Stmt::VariableDeclaration { name, tags, .. } => {
                let name: Rc<str> = name.as_str().into();
                seed_static_variable(ctx, scheduler, builtins, shared, top_level, &decl, &name, tags);
            }
            _ => {}
        }
    }
}

fn seed_function(ctx: &mut CompilerContext, scheduler: &mut Scheduler, builtins: &Builtins, shared: &mut LowerShared, scope: ScopeId, decl: &Rc<StmtNode>, name: &Rc<str>, tags: &Tags) {
    let ty = match resolve_name(ctx, scheduler, builtins, scope, name) {
        Ok(Resolution::Constant { ty, .. }) => ty,
        Ok(Resolution::Variable { .. }) => unreachable!("a function declaration's own name always resolves to a constant"),
        // Phase 1 already recorded whatever error stopped this signature
        // from resolving; nothing left to generate for it.
        Err(_) => return,
    };
    // A polymorphic function's signature resolves to the bare
    // `PolymorphicFunction` marker type (§4.5) — it is instantiated per
    // call site via `Scheduler::submit_polymorph`, never eagerly here.
    if matches!(ctx.types.get(ty), TypeKind::PolymorphicFunction) {
        return;
    }
    if tags.extern_libraries.is_some() {
        seed_external_function(ctx, shared, scope, decl, name, ty, tags);
        return;
    }
    shared.name_for_declaration(decl, scope, name, tags.no_mangle);
    let body_job = scheduler.submit(JobKind::TypeFunctionBody { declaration: decl.clone(), scope });
    shared.register_body_job(decl, scope, body_job);
    scheduler.submit(JobKind::GenerateFunction { declaration: decl.clone(), scope });
}

/// Builds an extern function's `RuntimeStatic` directly from its resolved
/// signature, bypassing `TypeFunctionBody`/`GenerateFunction` entirely —
/// there is no body to type-check or lower (DESIGN.md's `is_external`
/// decision).
fn seed_external_function(ctx: &mut CompilerContext, shared: &mut LowerShared, scope: ScopeId, decl: &Rc<StmtNode>, name: &Rc<str>, ty: talc_types::TypeId, tags: &Tags) {
    let (parameters, returns, calling_convention) = match ctx.types.get(ty).clone() {
        TypeKind::Function { parameters, returns, calling_convention } => (parameters, returns, calling_convention),
        other => unreachable!("a function's own type must be TypeKind::Function: {other:?}"),
    };
    let ir_parameters: Vec<IrType> = parameters.iter().map(|&t| to_ir_type(&ctx.types, &ctx.sizes, t)).collect();
    let has_return = !returns.is_empty();
    let return_type = if !has_return {
        None
    } else if returns.len() == 1 {
        Some(to_ir_type(&ctx.types, &ctx.sizes, returns[0]))
    } else {
        Some(IrType::struct_of(returns.iter().map(|&t| to_ir_type(&ctx.types, &ctx.sizes, t)).collect::<Vec<_>>()))
    };
    let libraries = tags.extern_libraries.clone().unwrap_or_default();
    let emitted_name = shared.name_for_declaration(decl, scope, name, true);
    shared.record_external_libraries(&libraries);
    shared.generated.push(RuntimeStatic {
        name: emitted_name,
        is_no_mangle: true,
        path: None,
        range: decl.range,
        kind: RuntimeStaticKind::Function(FunctionStatic {
            parameters: ir_parameters,
            has_return,
            return_type,
            is_external: true,
            blocks: IndexVec::new(),
            external_libraries: libraries,
            calling_convention,
            debug_scopes: Vec::new(),
        }),
    });
}

fn seed_static_variable(ctx: &mut CompilerContext, scheduler: &mut Scheduler, builtins: &Builtins, shared: &mut LowerShared, scope: ScopeId, decl: &Rc<StmtNode>, name: &Rc<str>, tags: &Tags) {
    let ty = match resolve_name(ctx, scheduler, builtins, scope, name) {
        Ok(Resolution::Variable { ty }) => ty,
        Ok(Resolution::Constant { .. }) => unreachable!("a variable declaration's own name always resolves to a runtime variable"),
        Err(_) => return,
    };
    if tags.extern_libraries.is_some() {
        let ir_ty = to_ir_type(&ctx.types, &ctx.sizes, ty);
        let libraries = tags.extern_libraries.clone().unwrap_or_default();
        let emitted_name = shared.name_for_declaration(decl, scope, name, true);
        shared.record_external_libraries(&libraries);
        shared.generated.push(RuntimeStatic {
            name: emitted_name,
            is_no_mangle: true,
            path: None,
            range: decl.range,
            kind: RuntimeStaticKind::StaticVariable(StaticVariableStatic { ty: ir_ty, is_external: true, external_libraries: libraries, initial_value: None }),
        });
        return;
    }
    // Static variable names are never mangled (DESIGN.md): reserve the
    // bare name in the shared mangler so a later function can't collide
    // with it, but don't register it under `name_for_declaration` — the
    // typed tree carries this exact name through to `GenerateStaticVariable`
    // on its own (`TypedStaticVariable::name`).
    shared.mangler.reserve_no_mangle(name);
    let body_job = scheduler.submit(JobKind::TypeStaticVariable { scope, declaration: decl.clone() });
    shared.register_body_job(decl, scope, body_job);
    scheduler.submit(JobKind::GenerateStaticVariable { scope, declaration: decl.clone() });
}

/// Converts every still-`Waiting` job left after a fixpoint run into one
/// `CycleError` per connected cluster (P3/S6), grouping via union-find
/// over the `Waiting(dep)` edges among the waiting set itself.
fn report_cycles(ctx: &mut CompilerContext, scheduler: &Scheduler, waiting: Vec<JobId>) {
    if waiting.is_empty() {
        return;
    }
    let index_of: FnvHashMap<JobId, usize> = waiting.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut parent: Vec<usize> = (0..waiting.len()).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    for (i, &id) in waiting.iter().enumerate() {
        if let JobState::Waiting(dep) = scheduler.state(id) {
            if let Some(&j) = index_of.get(&dep) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut clusters: FnvHashMap<usize, Vec<JobId>> = fx_map();
    for (i, &id) in waiting.iter().enumerate() {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(id);
    }

    for ids in clusters.into_values() {
        let involved = ids.iter().map(|&id| describe_job(ctx, scheduler, id)).collect();
        ctx.sink.add_error(CycleError { involved });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talc_ast::{Expr, ExprNode, FunctionParameter, Node};
    use talc_check::CompilerContext;
    use talc_source::Identifier;
    use talc_target::ArchitectureSizes;

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

    fn param(name: &str) -> FunctionParameter {
        FunctionParameter { name: id(name), is_polymorphic_determiner: false, ty: Some(named("i32")), polymorphic_determiner: None }
    }

    fn new_ctx() -> CompilerContext {
        CompilerContext::new(ArchitectureSizes::default())
    }

    #[test]
    fn compiles_two_ordinary_functions_with_a_call() {
        let mut ctx = new_ctx();
        let top = ctx.scopes.new_scope(None, None, true);

        let add = Rc::new(stmt(Stmt::FunctionDeclaration {
            name: id("add"),
            parameters: vec![param("a"), param("b")],
            return_types: vec![named("i32")],
            tags: Tags::default(),
            body: Some(vec![stmt(Stmt::ReturnStatement {
                values: vec![expr(Expr::BinaryOperation { op: talc_ast::BinOp::Add, left: named("a"), right: named("b") })],
            })]),
        }));
        ctx.scopes.add_declaration(top, add);

        let main = Rc::new(stmt(Stmt::FunctionDeclaration {
            name: id("main"),
            parameters: vec![],
            return_types: vec![named("i32")],
            tags: Tags::default(),
            body: Some(vec![stmt(Stmt::ReturnStatement {
                values: vec![expr(Expr::FunctionCall { expression: named("add"), arguments: vec![expr(Expr::IntegerLiteral(2)), expr(Expr::IntegerLiteral(3))] })],
            })]),
        }));
        ctx.scopes.add_declaration(top, main);

        let settings = CompilerSettings::default();
        let output = compile(&mut ctx, &settings, top).expect("expected a successful compilation");
        assert!(!ctx.sink.has_errors());
        assert_eq!(output.statics.len(), 2);
        assert!(output.statics.iter().any(|s| matches!(&s.kind, RuntimeStaticKind::Function(_))));
    }

    #[test]
    fn extern_function_never_reaches_generate_function() {
        let mut ctx = new_ctx();
        let top = ctx.scopes.new_scope(None, None, true);

        let abs_fn = Rc::new(stmt(Stmt::FunctionDeclaration {
            name: id("abs"),
            parameters: vec![param("x")],
            return_types: vec![named("i32")],
            tags: Tags { extern_libraries: Some(vec!["c".into()]), no_mangle: false, call_conv: None },
            body: None,
        }));
        ctx.scopes.add_declaration(top, abs_fn);

        let settings = CompilerSettings::default();
        let output = compile(&mut ctx, &settings, top).expect("expected a successful compilation");
        assert_eq!(output.statics.len(), 1);
        let RuntimeStaticKind::Function(f) = &output.statics[0].kind else {
            panic!("expected a generated function static");
        };
        assert!(f.is_external);
        assert!(f.blocks.is_empty());
        assert_eq!(output.external_libraries.len(), 1);
        assert_eq!(&*output.external_libraries[0], "c");
    }

    #[test]
    fn static_variable_is_generated_with_its_bare_declared_name() {
        let mut ctx = new_ctx();
        let top = ctx.scopes.new_scope(None, None, true);

        let count = Rc::new(stmt(Stmt::VariableDeclaration {
            name: id("count"),
            ty: Some(named("i32")),
            initializer: Some(expr(Expr::IntegerLiteral(0))),
            tags: Tags::default(),
        }));
        ctx.scopes.add_declaration(top, count);

        let settings = CompilerSettings::default();
        let output = compile(&mut ctx, &settings, top).expect("expected a successful compilation");
        let statics: Vec<_> = output.statics.iter().filter(|s| matches!(s.kind, RuntimeStaticKind::StaticVariable(_))).collect();
        assert_eq!(statics.len(), 1);
        assert_eq!(&*statics[0].name, "count");
    }

    #[test]
    fn mutually_referencing_constants_are_reported_as_a_cycle() {
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
}

fn describe_job(ctx: &CompilerContext, scheduler: &Scheduler, id: JobId) -> (String, FileRange) {
    match scheduler.kind(id) {
        JobKind::ParseFile { path } => (path.to_string(), FileRange::synthetic()),
        JobKind::ResolveDeclaration { scope, name } => {
            let range = ctx.scopes.get(*scope).find_declaration(name).map(|d| d.range).unwrap_or_else(FileRange::synthetic);
            (name.to_string(), range)
        }
        JobKind::TypeStaticIf { statement, .. } => ("static_if".to_string(), statement.range),
        JobKind::TypeFunctionBody { declaration, .. } | JobKind::GenerateFunction { declaration, .. } | JobKind::TypePolymorphicFunction { declaration, .. } => {
            let name = match declaration.body() {
                Stmt::FunctionDeclaration { name, .. } => name.as_str().to_string(),
                _ => "<function>".to_string(),
            };
            (name, declaration.range)
        }
        JobKind::TypeStaticVariable { declaration, .. } | JobKind::GenerateStaticVariable { declaration, .. } => {
            let name = match declaration.body() {
                Stmt::VariableDeclaration { name, .. } => name.as_str().to_string(),
                _ => "<static variable>".to_string(),
            };
            (name, declaration.range)
        }
    }
}
