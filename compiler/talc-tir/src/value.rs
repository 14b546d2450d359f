//! The constant-value model (§3: `AnyConstantValue`) and the `AnyValue`
//! lattice tag used by typed expressions to record whether they are a
//! compile-time constant, an anonymous runtime value, an assignable
//! (lvalue) runtime value, or an undetermined aggregate.

use std::rc::Rc;

use index_vec::{define_index_type, IndexVec};
use talc_ast::StmtNode;
use talc_types::{CallingConvention, TypeId};

use crate::scope::ScopeId;

define_index_type! {
    pub struct ConstId = u32;
}

/// A resolved, callable function: its declaration (by `Rc` identity — two
/// `FunctionConstant`s are the "same" function iff they point at the same
/// declaration node and were instantiated against the same scope), the
/// scope its body type-checks against, and its function type.
#[derive(Debug, Clone)]
pub struct FunctionConstant {
    pub declaration: Rc<StmtNode>,
    pub scope: ScopeId,
    pub ty: TypeId,
    pub calling_convention: CallingConvention,
}

impl FunctionConstant {
    /// Identity used for de-duplicating emitted `RuntimeStatic::Function`s
    /// (P2): same declaration pointer, same instantiation scope.
    pub fn identity(&self) -> (usize, ScopeId) {
        (Rc::as_ptr(&self.declaration) as *const () as usize, self.scope)
    }
}

/// The closed tagged sum of compile-time values (§3: `AnyConstantValue`).
#[derive(Debug, Clone)]
pub enum ConstantValue {
    Integer(u64),
    Float(f64),
    Boolean(bool),
    Void,
    Undef,
    Array { length: ConstId, pointer: ConstId },
    Aggregate { values: Vec<ConstId> },
    FileModule { scope: ScopeId },
    Type(TypeId),
    Function(FunctionConstant),
    PolymorphicFunction { declaration: Rc<StmtNode>, scope: ScopeId },
    BuiltinFunction(Rc<str>),
}

impl ConstantValue {
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            ConstantValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ConstantValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConstantValue::Integer(_) => "integer",
            ConstantValue::Float(_) => "float",
            ConstantValue::Boolean(_) => "boolean",
            ConstantValue::Void => "void",
            ConstantValue::Undef => "undef",
            ConstantValue::Array { .. } => "array",
            ConstantValue::Aggregate { .. } => "aggregate",
            ConstantValue::FileModule { .. } => "file module",
            ConstantValue::Type(_) => "type",
            ConstantValue::Function(_) => "function",
            ConstantValue::PolymorphicFunction { .. } => "polymorphic function",
            ConstantValue::BuiltinFunction(_) => "builtin function",
        }
    }
}

/// Append-only arena for [`ConstantValue`]s, mirroring [`crate::scope::ScopeStore`].
#[derive(Debug, Default)]
pub struct ConstStore {
    values: IndexVec<ConstId, ConstantValue>,
}

impl ConstStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, value: ConstantValue) -> ConstId {
        self.values.push(value)
    }

    pub fn get(&self, id: ConstId) -> &ConstantValue {
        &self.values[id]
    }
}

/// What kind of value a typed expression evaluates to (§3: `AnyValue`).
/// Distinct from the expression's *type*: a constant `i32` and a runtime
/// `i32` have the same `TypeId` but different `ValueKind`.
#[derive(Debug, Clone)]
pub enum ValueKind {
    /// A fully-evaluated compile-time constant.
    Constant(ConstId),
    /// A runtime value with no storage location (cannot appear as an
    /// assignment target).
    Anonymous,
    /// A runtime value with a storage location (an lvalue).
    Assignable,
    /// An aggregate literal (`{1, 2}`) whose member values are known but
    /// whose concrete struct/union type has not yet been committed to by
    /// coercion.
    UndeterminedAggregate,
}

impl ValueKind {
    pub fn is_constant(&self) -> bool {
        matches!(self, ValueKind::Constant(_))
    }

    pub fn is_assignable(&self) -> bool {
        matches!(self, ValueKind::Assignable)
    }

    pub fn as_const(&self) -> Option<ConstId> {
        match self {
            ValueKind::Constant(id) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_store_round_trips() {
        let mut store = ConstStore::new();
        let id = store.create(ConstantValue::Integer(42));
        assert_eq!(store.get(id).as_integer(), Some(42));
    }

    #[test]
    fn value_kind_distinguishes_constant_from_assignable() {
        let mut store = ConstStore::new();
        let id = store.create(ConstantValue::Boolean(true));
        let k1 = ValueKind::Constant(id);
        let k2 = ValueKind::Assignable;
        assert!(k1.is_constant());
        assert!(!k2.is_constant());
        assert!(k2.is_assignable());
    }
}
