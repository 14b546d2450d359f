//! Scope & name resolution (§4.2): walk scopes outward from a starting
//! scope, consulting scope constants, then declarations (suspending on
//! `ResolveDeclaration` if the name is an unresolved declaration), then
//! imported file-module constants, then the builtins table last.

use std::rc::Rc;

use talc_reporting::{CoreError, NameResolutionError, NameResolutionReason};
use talc_tir::{ConstId, ScopeId};
use talc_types::TypeId;

use crate::builtins::Builtins;
use crate::context::CompilerContext;
use crate::job::{JobOutput, Scheduler, TypeError};

/// The result of a successful name lookup: either an already-known
/// constant, or a reference to a runtime global (a `static_variable`,
/// which has a type but no compile-time `ConstId` — it is not a
/// `ScopeConstant`, it is read through `StaticVariableReference` (§4.6)).
pub enum Resolution {
    Constant { ty: TypeId, value: ConstId },
    Variable { ty: TypeId },
}

/// Look up `name` starting at `scope`, walking outward per §4.2. Returns
/// `Err(TypeError::Suspend(job))` if the name names a declaration whose
/// `ResolveDeclaration` job has not finished yet; the caller's own job
/// step should propagate this with `?` and be re-run once `job` is
/// `Done` (§9 re-walk model).
pub fn resolve_name(
    ctx: &mut CompilerContext,
    scheduler: &mut Scheduler,
    builtins: &Builtins,
    scope: ScopeId,
    name: &Rc<str>,
) -> Result<Resolution, TypeError> {
    for candidate_scope in ctx.scopes.ancestry(scope).collect::<Vec<_>>() {
        if let Some(constant) = ctx.scopes.get(candidate_scope).find_scope_constant(name) {
            return Ok(Resolution::Constant { ty: constant.ty, value: constant.value });
        }
        if ctx.scopes.get(candidate_scope).find_declaration(name).is_some() {
            let job = scheduler.submit_resolve(candidate_scope, name.clone());
            return match scheduler.output(job).cloned() {
                Some(JobOutput::TypedConstant { ty, value }) => match value.as_const() {
                    Some(const_id) => Ok(Resolution::Constant { ty, value: const_id }),
                    // A global `static_variable`'s `ResolveDeclaration` job
                    // is `Done` but carries no `ConstId` (it is a runtime
                    // value, not a constant) — that is a resolved
                    // reference, not a still-pending one.
                    None => Ok(Resolution::Variable { ty }),
                },
                Some(_) | None => Err(TypeError::Suspend(job)),
            };
        }
        // Imported file-module constants: a declaration whose value is a
        // `FileModule` scope is searched by basename match (§4.2). Real
        // import resolution lives in `ResolveDeclaration`'s step function
        // (`check.rs`); here we only need to know whether the *name*
        // exists as an already-resolved re-export, which scope constants
        // above already cover once the import job has run.
    }
    if let Some((value, ty)) = builtins.lookup(name) {
        return Ok(Resolution::Constant { ty, value });
    }
    Err(TypeError::Fatal(CoreError::from(NameResolutionError {
        name: name.to_string(),
        range: talc_source::FileRange::synthetic(),
        reason: NameResolutionReason::Unknown,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use talc_tir::ConstStore;
    use talc_types::TypeStore;

    #[test]
    fn builtin_names_resolve_without_touching_any_scope() {
        let mut types = TypeStore::new();
        let mut consts = ConstStore::new();
        let builtins = Builtins::new(&mut types, &mut consts);
        let mut ctx = CompilerContext::new(Default::default());
        let mut scheduler = Scheduler::new();
        let top = ctx.scopes.new_scope(None, None, true);
        let result = resolve_name(&mut ctx, &mut scheduler, &builtins, top, &"i32".into());
        assert!(matches!(result, Ok(Resolution::Constant { .. })));
    }

    #[test]
    fn unbound_name_is_a_fatal_error_not_a_suspend() {
        let mut types = TypeStore::new();
        let mut consts = ConstStore::new();
        let builtins = Builtins::new(&mut types, &mut consts);
        let mut ctx = CompilerContext::new(Default::default());
        let mut scheduler = Scheduler::new();
        let top = ctx.scopes.new_scope(None, None, true);
        let result = resolve_name(&mut ctx, &mut scheduler, &builtins, top, &"does_not_exist".into());
        assert!(matches!(result, Err(TypeError::Fatal(_))));
    }
}
