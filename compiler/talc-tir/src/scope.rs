//! The scope graph (§3, §4.2): a tree of lexical scopes, each owning an
//! ordered declaration list and a growing list of resolved
//! `ScopeConstant`s.

use std::rc::Rc;

use index_vec::{define_index_type, IndexVec};
use talc_ast::{Stmt, StmtNode};
use talc_source::SourcePath;
use talc_types::TypeId;

use crate::value::ConstId;

define_index_type! {
    pub struct ScopeId = u32;
}

/// A `(name, type, constant-value)` triple added to a scope as resolution
/// completes (§2 glossary).
#[derive(Debug, Clone)]
pub struct ScopeConstant {
    pub name: Rc<str>,
    pub ty: TypeId,
    pub value: ConstId,
}

/// A lexical scope: either a file's top-level scope (created up front from
/// the parser's declaration list) or a scope synthesised by the type
/// checker for a function body, polymorph instantiation, or a selected
/// `static_if` branch.
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub file_path: Option<SourcePath>,
    pub declarations: Vec<Rc<StmtNode>>,
    pub scope_constants: Vec<ScopeConstant>,
    pub is_top_level: bool,
}

impl Scope {
    fn declaration_name(stmt: &Stmt) -> Option<&str> {
        match stmt {
            Stmt::FunctionDeclaration { name, .. }
            | Stmt::ConstantDefinition { name, .. }
            | Stmt::StructDefinition { name, .. }
            | Stmt::EnumDefinition { name, .. }
            | Stmt::VariableDeclaration { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Find an unresolved declaration by name. Scans `declarations` in
    /// order; the first match wins (duplicates are flagged separately by
    /// the caller when it notices two declarations share a name).
    pub fn find_declaration(&self, name: &str) -> Option<Rc<StmtNode>> {
        self.declarations
            .iter()
            .find(|decl| Self::declaration_name(decl.body()) == Some(name))
            .cloned()
    }

    /// All declarations sharing `name`, used to detect duplicates.
    pub fn declarations_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Rc<StmtNode>> {
        self.declarations
            .iter()
            .filter(move |decl| Self::declaration_name(decl.body()) == Some(name))
    }

    pub fn find_scope_constant(&self, name: &str) -> Option<&ScopeConstant> {
        self.scope_constants.iter().find(|c| &*c.name == name)
    }
}

/// Owns every [`Scope`] created during compilation, append-only (§5: scope
/// constant lists and job tables grow monotonically).
#[derive(Debug, Default)]
pub struct ScopeStore {
    scopes: IndexVec<ScopeId, Scope>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_scope(
        &mut self,
        parent: Option<ScopeId>,
        file_path: Option<SourcePath>,
        is_top_level: bool,
    ) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            file_path,
            declarations: Vec::new(),
            scope_constants: Vec::new(),
            is_top_level,
        })
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    pub fn add_declaration(&mut self, scope: ScopeId, decl: Rc<StmtNode>) {
        self.scopes[scope].declarations.push(decl);
    }

    pub fn add_scope_constant(&mut self, scope: ScopeId, constant: ScopeConstant) {
        self.scopes[scope].scope_constants.push(constant);
    }

    /// Walk outward from `start`, yielding each scope id in order (innermost
    /// first), matching the invariant in §3: "a name resolves in the
    /// innermost scope where it is bound; unresolved names propagate
    /// outward".
    pub fn ancestry(&self, start: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(start), move |&id| self.scopes[id].parent)
    }
}

#[cfg(test)]
mod tests {
    use talc_source::FileRange;

    use super::*;

    fn decl(name: &str) -> Rc<StmtNode> {
        Rc::new(StmtNode::new(
            Stmt::ConstantDefinition {
                name: talc_source::Identifier::synthetic(name),
                expression: talc_ast::Node::new(talc_ast::Expr::IntegerLiteral(0), FileRange::synthetic()),
            },
            FileRange::synthetic(),
        ))
    }

    #[test]
    fn ancestry_walks_outward() {
        let mut store = ScopeStore::new();
        let top = store.new_scope(None, None, true);
        let nested = store.new_scope(Some(top), None, false);
        let chain: Vec<_> = store.ancestry(nested).collect();
        assert_eq!(chain, vec![nested, top]);
    }

    #[test]
    fn find_declaration_matches_by_name() {
        let mut store = ScopeStore::new();
        let top = store.new_scope(None, None, true);
        store.add_declaration(top, decl("x"));
        assert!(store.get(top).find_declaration("x").is_some());
        assert!(store.get(top).find_declaration("y").is_none());
    }

    #[test]
    fn duplicate_declarations_are_detectable() {
        let mut store = ScopeStore::new();
        let top = store.new_scope(None, None, true);
        store.add_declaration(top, decl("x"));
        store.add_declaration(top, decl("x"));
        assert_eq!(store.get(top).declarations_named("x").count(), 2);
    }
}
