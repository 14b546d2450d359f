//! The cooperative job scheduler (§4.1). Jobs never block on an OS thread:
//! a job's step function either finishes, fails, or returns `Waiting(dep)`
//! via [`TypeError::Suspend`], propagated with `?` through every helper
//! that can suspend. The scheduler re-runs a waiting job's step function
//! from scratch once its dependency is `Done` (§9: "the reference
//! re-walks; both are acceptable") — memoisation of the expensive
//! sub-resolutions (declaration lookup, polymorph instantiation) keeps
//! re-walking cheap.

use std::collections::VecDeque;
use std::rc::Rc;

use index_vec::{define_index_type, IndexVec};
use talc_reporting::CoreError;
use talc_tir::ScopeId;
use talc_types::TypeId;
use talc_utils::FnvHashMap;

define_index_type! {
    /// Stable handle to a scheduled job. Never invalidated or reused.
    pub struct JobId = u32;
}

/// What a job is waiting to produce; carries enough identity for
/// memoisation (§4.1 "Memoisation").
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Stubbed (§4.1 item 1): this repository receives already-parsed
    /// `ConstantScope`s, so no job ever actually runs this kind, but it is
    /// represented so the scheduler's fairness/cycle machinery is
    /// exercised uniformly against the same `JobId` space as real jobs.
    ParseFile { path: Rc<str> },
    ResolveDeclaration { scope: ScopeId, name: Rc<str> },
    TypeStaticIf { scope: ScopeId, statement: Rc<talc_ast::StmtNode> },
    TypeFunctionBody { declaration: Rc<talc_ast::StmtNode>, scope: ScopeId },
    TypeStaticVariable { scope: ScopeId, declaration: Rc<talc_ast::StmtNode> },
    TypePolymorphicFunction {
        declaration: Rc<talc_ast::StmtNode>,
        scope: ScopeId,
        argument_types: Vec<TypeId>,
        argument_constants: Vec<Option<talc_tir::ConstId>>,
    },
    GenerateFunction { declaration: Rc<talc_ast::StmtNode>, scope: ScopeId },
    GenerateStaticVariable { scope: ScopeId, declaration: Rc<talc_ast::StmtNode> },
}

impl JobKind {
    /// Short, stable label for logging (`log::trace!` job-transition lines).
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::ParseFile { .. } => "ParseFile",
            JobKind::ResolveDeclaration { .. } => "ResolveDeclaration",
            JobKind::TypeStaticIf { .. } => "TypeStaticIf",
            JobKind::TypeFunctionBody { .. } => "TypeFunctionBody",
            JobKind::TypeStaticVariable { .. } => "TypeStaticVariable",
            JobKind::TypePolymorphicFunction { .. } => "TypePolymorphicFunction",
            JobKind::GenerateFunction { .. } => "GenerateFunction",
            JobKind::GenerateStaticVariable { .. } => "GenerateStaticVariable",
        }
    }
}

/// A job's produced value, once `Done`. Untyped at the scheduler layer
/// (each driver downcasts via the match arm it expects); kept as a single
/// closed sum rather than `Box<dyn Any>` so the scheduler stays free of
/// trait objects (§9, matching the teacher's preference for closed sums
/// over dynamic dispatch).
#[derive(Debug, Clone)]
pub enum JobOutput {
    Scope(ScopeId),
    TypedConstant { ty: TypeId, value: talc_tir::ValueKind },
    /// A fully type-checked function body, ready for `GenerateFunction`
    /// (§4.6) to lower. Produced by `TypeFunctionBody`/`TypePolymorphicFunction`.
    TypedFunction(Rc<talc_tir::TypedFunction>),
    /// Produced by `TypeStaticVariable`, consumed by `GenerateStaticVariable`.
    TypedStaticVariable(Rc<talc_tir::TypedStaticVariable>),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Waiting(JobId),
    Done,
    Failed,
}

pub struct JobRecord {
    pub kind: JobKind,
    pub state: JobState,
    pub output: Option<JobOutput>,
    /// Jobs that suspended on this one; woken (re-queued) once this job
    /// reaches `Done` or `Failed`.
    pub dependents: Vec<JobId>,
}

/// A job's step function returns this. `Suspend` is propagated with `?`
/// through every helper that can suspend (name resolution, constant
/// evaluation, polymorph instantiation), matching §9's "Coroutine /
/// delayed-result" design note.
pub enum TypeError {
    Suspend(JobId),
    Fatal(CoreError),
}

impl From<CoreError> for TypeError {
    fn from(e: CoreError) -> Self {
        TypeError::Fatal(e)
    }
}

pub type JobResult<T> = Result<T, TypeError>;

/// Drives job kinds to completion. Implemented by `talc-check`'s
/// top-level checker (in `check.rs`) and (indirectly, via
/// `GenerateFunction`/`GenerateStaticVariable`) by `talc-lower`.
pub trait JobDriver {
    fn run(&mut self, ctx: &mut crate::context::CompilerContext, scheduler: &mut Scheduler, kind: &JobKind) -> JobResult<JobOutput>;
}

/// FIFO job queue plus the memoisation tables named in §4.1.
pub struct Scheduler {
    jobs: IndexVec<JobId, JobRecord>,
    queue: VecDeque<JobId>,
    resolve_memo: FnvHashMap<(ScopeId, Rc<str>), JobId>,
    polymorph_memo: FnvHashMap<(usize, ScopeId, Vec<TypeId>, Vec<Option<talc_tir::ConstId>>), JobId>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: IndexVec::new(),
            queue: VecDeque::new(),
            resolve_memo: FnvHashMap::default(),
            polymorph_memo: FnvHashMap::default(),
        }
    }

    fn push_new(&mut self, kind: JobKind) -> JobId {
        let id = self.jobs.push(JobRecord { kind, state: JobState::Queued, output: None, dependents: Vec::new() });
        self.queue.push_back(id);
        id
    }

    /// Submit a non-memoised job kind (`TypeFunctionBody`, `TypeStaticIf`,
    /// `TypeStaticVariable`, `GenerateFunction`, `GenerateStaticVariable`,
    /// `ParseFile`).
    pub fn submit(&mut self, kind: JobKind) -> JobId {
        self.push_new(kind)
    }

    /// Submit a `ResolveDeclaration` job, deduplicated by `(scope, name)`
    /// (§4.1 "Memoisation").
    pub fn submit_resolve(&mut self, scope: ScopeId, name: Rc<str>) -> JobId {
        let key = (scope, name.clone());
        if let Some(existing) = self.resolve_memo.get(&key) {
            return *existing;
        }
        let id = self.push_new(JobKind::ResolveDeclaration { scope, name });
        self.resolve_memo.insert(key, id);
        id
    }

    /// Submit a `TypePolymorphicFunction` job, deduplicated by
    /// `(declaration, argument_type_tuple, argument_constant_tuple)`
    /// (§4.1, §4.5, P2).
    pub fn submit_polymorph(
        &mut self,
        declaration: Rc<talc_ast::StmtNode>,
        scope: ScopeId,
        argument_types: Vec<TypeId>,
        argument_constants: Vec<Option<talc_tir::ConstId>>,
    ) -> JobId {
        let key = (Rc::as_ptr(&declaration) as *const () as usize, scope, argument_types.clone(), argument_constants.clone());
        if let Some(existing) = self.polymorph_memo.get(&key) {
            return *existing;
        }
        let id = self.push_new(JobKind::TypePolymorphicFunction { declaration, scope, argument_types, argument_constants });
        self.polymorph_memo.insert(key, id);
        id
    }

    pub fn kind(&self, id: JobId) -> &JobKind {
        &self.jobs[id].kind
    }

    pub fn state(&self, id: JobId) -> JobState {
        self.jobs[id].state
    }

    pub fn output(&self, id: JobId) -> Option<&JobOutput> {
        self.jobs[id].output.as_ref()
    }

    /// Drive every queued/woken job to fixpoint (§4.1 "State machine").
    /// Returns the ids of jobs still `Waiting` once no progress is
    /// possible (empty on success) — the caller turns a non-empty result
    /// into a `CycleError` naming the involved declarations (P3, S6).
    pub fn run_to_fixpoint(&mut self, ctx: &mut crate::context::CompilerContext, driver: &mut dyn JobDriver) -> Vec<JobId> {
        while let Some(id) = self.queue.pop_front() {
            if matches!(self.jobs[id].state, JobState::Done | JobState::Failed) {
                continue;
            }
            log::trace!("job {:?} ({}) -> Running", id, self.jobs[id].kind.label());
            let kind = self.jobs[id].kind.clone();
            match driver.run(ctx, self, &kind) {
                Ok(output) => {
                    log::debug!("job {:?} ({}) -> Done", id, kind.label());
                    self.jobs[id].state = JobState::Done;
                    self.jobs[id].output = Some(output);
                    self.wake_dependents(id);
                }
                Err(TypeError::Suspend(dep)) => {
                    log::trace!("job {:?} ({}) -> Waiting on {:?}", id, kind.label(), dep);
                    self.jobs[id].state = JobState::Waiting(dep);
                    self.jobs[dep].dependents.push(id);
                    // If the dependency already finished between the
                    // suspend point and now (can happen since helpers
                    // re-check memoised state before suspending), requeue
                    // immediately instead of waiting for a wake that will
                    // never come.
                    if matches!(self.jobs[dep].state, JobState::Done | JobState::Failed) {
                        self.queue.push_back(id);
                    }
                }
                Err(TypeError::Fatal(error)) => {
                    log::debug!("job {:?} ({}) -> Failed: {}", id, kind.label(), error);
                    ctx.sink.add_error(error);
                    self.jobs[id].state = JobState::Failed;
                    self.wake_dependents(id);
                }
            }
        }
        self.jobs
            .iter_enumerated()
            .filter(|(_, record)| matches!(record.state, JobState::Waiting(_)))
            .map(|(id, _)| id)
            .collect()
    }

    fn wake_dependents(&mut self, id: JobId) {
        let dependents = std::mem::take(&mut self.jobs[id].dependents);
        for dependent in dependents {
            self.queue.push_back(dependent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilerContext;

    /// A trivial driver: job A always suspends on job B exactly once; job
    /// B finishes immediately. Exercises wake-on-dependency-done without
    /// needing real AST/type machinery.
    struct TwoJobDriver {
        b: Option<JobId>,
        a_suspended_once: bool,
    }

    impl JobDriver for TwoJobDriver {
        fn run(&mut self, _ctx: &mut CompilerContext, scheduler: &mut Scheduler, kind: &JobKind) -> JobResult<JobOutput> {
            match kind {
                JobKind::ParseFile { path } if path.as_ref() == "a" => {
                    if !self.a_suspended_once {
                        self.a_suspended_once = true;
                        let b = *self.b.get_or_insert_with(|| scheduler.submit(JobKind::ParseFile { path: "b".into() }));
                        return Err(TypeError::Suspend(b));
                    }
                    Ok(JobOutput::Unit)
                }
                JobKind::ParseFile { .. } => Ok(JobOutput::Unit),
                _ => Ok(JobOutput::Unit),
            }
        }
    }

    #[test]
    fn suspended_job_resumes_once_its_dependency_is_done() {
        let mut scheduler = Scheduler::new();
        let mut ctx = CompilerContext::default();
        let a = scheduler.submit(JobKind::ParseFile { path: "a".into() });
        let mut driver = TwoJobDriver { b: None, a_suspended_once: false };
        let waiting = scheduler.run_to_fixpoint(&mut ctx, &mut driver);
        assert!(waiting.is_empty());
        assert_eq!(scheduler.state(a), JobState::Done);
    }

    #[test]
    fn resolve_declaration_jobs_are_memoised_by_scope_and_name() {
        let mut scheduler = Scheduler::new();
        let mut scopes = talc_tir::ScopeStore::new();
        let scope = scopes.new_scope(None, None, false);
        let first = scheduler.submit_resolve(scope, "x".into());
        let second = scheduler.submit_resolve(scope, "x".into());
        assert_eq!(first, second);
    }

    #[test]
    fn a_job_that_never_resolves_its_dependency_is_reported_as_waiting() {
        let mut scheduler = Scheduler::new();
        let mut ctx = CompilerContext::default();
        struct AlwaysSuspendDriver {
            target: JobId,
        }
        impl JobDriver for AlwaysSuspendDriver {
            fn run(&mut self, _ctx: &mut CompilerContext, _scheduler: &mut Scheduler, _kind: &JobKind) -> JobResult<JobOutput> {
                Err(TypeError::Suspend(self.target))
            }
        }
        let a = scheduler.submit(JobKind::ParseFile { path: "a".into() });
        let mut driver = AlwaysSuspendDriver { target: a };
        let waiting = scheduler.run_to_fixpoint(&mut ctx, &mut driver);
        assert_eq!(waiting, vec![a]);
    }
}
