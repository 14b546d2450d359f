//! The typed tree: the scope graph ([`scope`]), the constant-value model
//! ([`value`]), and typed expressions/statements ([`expr`]) that the job
//! scheduler (`talc-check`) produces and the HLIR generator (`talc-lower`)
//! consumes.

pub mod expr;
pub mod scope;
pub mod value;

pub use expr::{
    AsmBinding, StructLiteralMember, TypedElseIf, TypedExpr, TypedExprKind, TypedFunction, TypedStaticVariable, TypedStmt, TypedStmtKind, VariableRef,
};
pub use scope::{Scope, ScopeConstant, ScopeId, ScopeStore};
pub use value::{ConstId, ConstStore, ConstantValue, FunctionConstant, ValueKind};
