//! State shared across every function/static-variable lowered in one
//! compilation (§4.6, §6): the name mangler, the direct-call and
//! polymorph-instantiation name registries, the accumulated external
//! library list, and the growing output list of [`RuntimeStatic`]s.
//! Threaded through as an explicit `&mut` parameter rather than owned by
//! any one `Builder`, since it outlives any single function's lowering.

use std::rc::Rc;

use talc_ast::StmtNode;
use talc_check::JobId;
use talc_ir::RuntimeStatic;
use talc_tir::ScopeId;
use talc_utils::{fx_map, fx_set, FnvHashMap, FnvHashSet};

/// Assigns each runtime-visible symbol a unique name. First use of a base
/// name is returned unmangled; a collision appends `_N` for the first
/// available `N`. `no_mangle`-tagged declarations bypass this entirely —
/// they keep exactly the name written in the source, with a logged warning
/// if that collides with a name already reserved.
pub struct NameMangler {
    assigned: FnvHashSet<String>,
}

impl NameMangler {
    pub fn new() -> Self {
        Self { assigned: fx_set() }
    }

    pub fn mangle(&mut self, base: &str) -> Rc<str> {
        if self.assigned.insert(base.to_string()) {
            return base.into();
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if self.assigned.insert(candidate.clone()) {
                return candidate.into();
            }
            suffix += 1;
        }
    }

    pub fn reserve_no_mangle(&mut self, name: &str) -> Rc<str> {
        if !self.assigned.insert(name.to_string()) {
            log::warn!("no_mangle symbol `{name}` collides with a name already reserved by an earlier declaration");
        }
        name.into()
    }
}

impl Default for NameMangler {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-function lowering state (§4.6 "Naming", §4.5 "Polymorph
/// instantiation naming"). `direct_function_names` and
/// `polymorph_registry` are populated lazily the first time a call site or
/// the entry-seed pipeline needs a name for a given declaration/instantiation
/// — never eagerly for declarations nothing ever calls.
pub struct LowerShared {
    pub mangler: NameMangler,
    /// Keyed by `(declaration pointer, defining scope)` — the same
    /// identity `FunctionConstant::identity()` computes, but derivable
    /// directly from a `TypeFunctionBody`/`ResolveDeclaration` job's own
    /// fields before any `FunctionConstant` exists.
    direct_function_names: FnvHashMap<(usize, ScopeId), Rc<str>>,
    /// Keyed by the `JobId` a `TypePolymorphicFunction` job was submitted
    /// under (P2: that `JobId` is itself memoised per determiner tuple, so
    /// this registry never assigns two names to the same instantiation).
    polymorph_registry: FnvHashMap<JobId, Rc<str>>,
    /// Keyed the same way as `direct_function_names`: the entry-seed
    /// pipeline records each direct declaration's `TypeFunctionBody`/
    /// `TypeStaticVariable` job id here *before* submitting the matching
    /// `GenerateFunction`/`GenerateStaticVariable` job, so `LowerDriver`
    /// can find the typed-body job to suspend on (`GenerateFunction`'s own
    /// `JobKind` carries only the raw declaration/scope, not a `JobId`).
    body_jobs: FnvHashMap<(usize, ScopeId), JobId>,
    pub external_libraries: Vec<Rc<str>>,
    pub generated: Vec<RuntimeStatic>,
    next_constant_id: u32,
}

impl LowerShared {
    pub fn new() -> Self {
        Self {
            mangler: NameMangler::new(),
            direct_function_names: fx_map(),
            polymorph_registry: fx_map(),
            body_jobs: fx_map(),
            external_libraries: Vec::new(),
            generated: Vec::new(),
            next_constant_id: 0,
        }
    }

    /// A fresh, globally unique name for a promoted static constant (P8):
    /// `.const.N`. Never collides with a mangled source identifier since
    /// `.` is not a valid identifier character in this language's grammar.
    pub fn fresh_constant_name(&mut self) -> Rc<str> {
        let name: Rc<str> = format!(".const.{}", self.next_constant_id).into();
        self.next_constant_id += 1;
        name
    }

    pub fn record_external_libraries(&mut self, libraries: &[Rc<str>]) {
        for lib in libraries {
            if !self.external_libraries.iter().any(|existing| existing == lib) {
                self.external_libraries.push(lib.clone());
            }
        }
    }

    /// Look up (or, if this is the first reference, assign) the emitted
    /// name for a direct (non-polymorphic) function or static variable
    /// declaration. Called eagerly by the entry-seed pipeline before a
    /// `TypeFunctionBody`/`TypeStaticVariable` job is submitted, and again
    /// by call-site lowering to recover the same name.
    pub fn name_for_declaration(&mut self, declaration: &Rc<StmtNode>, scope: ScopeId, base: &str, is_no_mangle: bool) -> Rc<str> {
        let key = (Rc::as_ptr(declaration) as *const () as usize, scope);
        if let Some(existing) = self.direct_function_names.get(&key) {
            return existing.clone();
        }
        let name = if is_no_mangle { self.mangler.reserve_no_mangle(base) } else { self.mangler.mangle(base) };
        self.direct_function_names.insert(key, name.clone());
        name
    }

    pub fn direct_name(&self, declaration: &Rc<StmtNode>, scope: ScopeId) -> Option<Rc<str>> {
        let key = (Rc::as_ptr(declaration) as *const () as usize, scope);
        self.direct_function_names.get(&key).cloned()
    }

    /// Look up (or lazily register) the mangled name for one polymorphic
    /// instantiation, identified by the `JobId` its `TypePolymorphicFunction`
    /// job was submitted under. The caller is responsible for inserting the
    /// registration *before* lowering the instantiation's body, so a
    /// self-recursive polymorphic call resolves to the name rather than
    /// re-triggering lowering.
    pub fn polymorph_name(&self, job: JobId) -> Option<Rc<str>> {
        self.polymorph_registry.get(&job).cloned()
    }

    pub fn register_polymorph_name(&mut self, job: JobId, base: &str) -> Rc<str> {
        let name = self.mangler.mangle(base);
        self.polymorph_registry.insert(job, name.clone());
        name
    }

    /// Record the `TypeFunctionBody`/`TypeStaticVariable` job id behind one
    /// direct declaration, keyed the same way as `name_for_declaration`.
    pub fn register_body_job(&mut self, declaration: &Rc<StmtNode>, scope: ScopeId, job: JobId) {
        let key = (Rc::as_ptr(declaration) as *const () as usize, scope);
        self.body_jobs.insert(key, job);
    }

    pub fn body_job(&self, declaration: &Rc<StmtNode>, scope: ScopeId) -> Option<JobId> {
        let key = (Rc::as_ptr(declaration) as *const () as usize, scope);
        self.body_jobs.get(&key).copied()
    }
}

impl Default for LowerShared {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_of_a_name_is_unmangled() {
        let mut mangler = NameMangler::new();
        assert_eq!(&*mangler.mangle("add"), "add");
    }

    #[test]
    fn a_colliding_name_gets_a_numeric_suffix() {
        let mut mangler = NameMangler::new();
        assert_eq!(&*mangler.mangle("add"), "add");
        assert_eq!(&*mangler.mangle("add"), "add_1");
        assert_eq!(&*mangler.mangle("add"), "add_2");
    }

    #[test]
    fn direct_function_names_are_memoised_by_declaration_identity_and_scope() {
        use talc_ast::{Expr, Node, Stmt};
        use talc_source::{FileRange, Identifier};
        use talc_tir::ScopeStore;

        let decl = Rc::new(Node::new(
            Stmt::ConstantDefinition { name: Identifier::synthetic("f"), expression: Node::new(Expr::IntegerLiteral(0), FileRange::synthetic()) },
            FileRange::synthetic(),
        ));
        let mut scopes = ScopeStore::new();
        let scope = scopes.new_scope(None, None, true);
        let mut shared = LowerShared::new();
        let first = shared.name_for_declaration(&decl, scope, "f", false);
        let second = shared.name_for_declaration(&decl, scope, "f", false);
        assert_eq!(first, second);
    }
}
