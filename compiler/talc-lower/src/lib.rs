//! The HLIR generator (§4.6): turns the typed tree `talc-check` produces
//! into the `RuntimeStatic` list `talc-pipeline` hands to the (out of
//! scope) C emitter. [`LowerDriver`] is the `JobDriver` that drives
//! `GenerateFunction`/`GenerateStaticVariable` to completion; every other
//! `JobKind` it delegates straight through to `talc_check::check::run`, so
//! a single `Scheduler::run_to_fixpoint` loop can service both crates'
//! jobs without `talc-pipeline` needing to dispatch between them itself.

pub mod asm;
pub mod builder;
pub mod expr;
pub mod function;
pub mod shared;
pub mod stmt;
pub mod ty;

use talc_check::{Builtins, CompilerContext, JobDriver, JobKind, JobOutput, JobResult, JobState, Scheduler, TypeError};
use talc_ir::{RuntimeStatic, RuntimeStaticKind};

pub use builder::{Builder, LocalSlot, Lowered, LoopTargets};
pub use expr::{AssignTarget, FnLower};
pub use function::{lower_function, lower_static_variable};
pub use shared::{LowerShared, NameMangler};
pub use ty::{address_integer_size, to_ir_type};

/// The `JobDriver` this crate contributes (§4.6, §4.1): wraps
/// `talc_check::check::run` for every kind except `GenerateFunction`/
/// `GenerateStaticVariable`, which it drives itself by looking up the
/// originating `TypeFunctionBody`/`TypeStaticVariable` job recorded in
/// `LowerShared` (the entry-seed pipeline registers it before submitting
/// the `Generate*` job) and suspending on it until it is `Done`.
pub struct LowerDriver<'a> {
    pub builtins: &'a Builtins,
    pub shared: &'a mut LowerShared,
}

impl<'a> LowerDriver<'a> {
    pub fn new(builtins: &'a Builtins, shared: &'a mut LowerShared) -> Self {
        Self { builtins, shared }
    }

    fn generate_function(&mut self, ctx: &mut CompilerContext, scheduler: &mut Scheduler, declaration: &std::rc::Rc<talc_ast::StmtNode>, scope: talc_tir::ScopeId) -> JobResult<JobOutput> {
        let body_job = self
            .shared
            .body_job(declaration, scope)
            .expect("the entry-seed pipeline registers a TypeFunctionBody job before submitting the matching GenerateFunction job");
        match scheduler.state(body_job) {
            JobState::Done => {
                let typed_function = match scheduler.output(body_job) {
                    Some(JobOutput::TypedFunction(f)) => f.clone(),
                    other => unreachable!("a Done TypeFunctionBody job always produces JobOutput::TypedFunction: {other:?}"),
                };
                let name = self
                    .shared
                    .direct_name(declaration, scope)
                    .expect("the entry-seed pipeline assigns a direct name before submitting TypeFunctionBody");
                let static_fn = function::lower_function(ctx, scheduler, self.builtins, self.shared, &typed_function, name.clone());
                self.shared.record_external_libraries(&typed_function.external_libraries);
                self.shared.generated.push(RuntimeStatic {
                    name,
                    is_no_mangle: typed_function.is_no_mangle,
                    path: None,
                    range: typed_function.range,
                    kind: RuntimeStaticKind::Function(static_fn),
                });
                Ok(JobOutput::Unit)
            }
            // The TypeFunctionBody job already recorded its own diagnostic;
            // nothing further to generate for it.
            JobState::Failed => Ok(JobOutput::Unit),
            JobState::Queued | JobState::Waiting(_) => Err(TypeError::Suspend(body_job)),
        }
    }

    fn generate_static_variable(&mut self, ctx: &mut CompilerContext, scheduler: &mut Scheduler, scope: talc_tir::ScopeId, declaration: &std::rc::Rc<talc_ast::StmtNode>) -> JobResult<JobOutput> {
        let body_job = self
            .shared
            .body_job(declaration, scope)
            .expect("the entry-seed pipeline registers a TypeStaticVariable job before submitting the matching GenerateStaticVariable job");
        match scheduler.state(body_job) {
            JobState::Done => {
                let typed_variable = match scheduler.output(body_job) {
                    Some(JobOutput::TypedStaticVariable(v)) => v.clone(),
                    other => unreachable!("a Done TypeStaticVariable job always produces JobOutput::TypedStaticVariable: {other:?}"),
                };
                let static_var = function::lower_static_variable(ctx, scheduler, self.builtins, self.shared, &typed_variable);
                self.shared.record_external_libraries(&typed_variable.external_libraries);
                self.shared.generated.push(RuntimeStatic {
                    name: typed_variable.name.clone(),
                    is_no_mangle: typed_variable.is_no_mangle,
                    path: None,
                    range: typed_variable.range,
                    kind: RuntimeStaticKind::StaticVariable(static_var),
                });
                Ok(JobOutput::Unit)
            }
            JobState::Failed => Ok(JobOutput::Unit),
            JobState::Queued | JobState::Waiting(_) => Err(TypeError::Suspend(body_job)),
        }
    }
}

impl<'a> JobDriver for LowerDriver<'a> {
    fn run(&mut self, ctx: &mut CompilerContext, scheduler: &mut Scheduler, kind: &JobKind) -> JobResult<JobOutput> {
        match kind {
            JobKind::GenerateFunction { declaration, scope } => self.generate_function(ctx, scheduler, declaration, *scope),
            JobKind::GenerateStaticVariable { scope, declaration } => self.generate_static_variable(ctx, scheduler, *scope, declaration),
            other => talc_check::check::run(ctx, scheduler, self.builtins, other),
        }
    }
}
