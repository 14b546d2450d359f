//! Polymorph instantiation (§4.5): a polymorphic function's determiners
//! (parameters marked `$name`) are bound to concrete types/constants for
//! a given call site, producing a fresh child scope and a
//! `TypeFunctionBody` job against it. Two instantiations with equal
//! determiner-tuples share the same body and emitted function (P2).

use std::rc::Rc;

use talc_ast::{FunctionParameter, Stmt};
use talc_reporting::{ConstantEvaluationError, ConstantEvaluationReason};
use talc_tir::scope::ScopeConstant;
use talc_tir::{ConstId, ConstantValue};
use talc_tir::ScopeId;
use talc_types::{TypeId, TypeKind};

use crate::context::CompilerContext;

/// Which of a function's parameters are determiners (`$name`), in
/// declaration order.
pub fn determiner_positions(parameters: &[FunctionParameter]) -> Vec<usize> {
    parameters
        .iter()
        .enumerate()
        .filter(|(_, parameter)| parameter.is_polymorphic_determiner)
        .map(|(index, _)| index)
        .collect()
}

/// Bind each determiner position to the caller-supplied constant,
/// producing the scope constants for the instantiation's child scope
/// (§4.5). A determiner comes in one of two shapes, distinguished by
/// whether its parameter carries an explicit type expression:
///
/// - **Type determiner** (`value: $T`, `parameter.ty` is `None`): the
///   determiner's *name* is bound to the argument's own type, as a
///   `Type`-valued constant — exactly like `i32` resolves to
///   `ConstantValue::Type(i32)` in the builtins table. The parameter
///   itself still occupies a normal runtime argument slot; its concrete
///   type is simply the caller's argument type directly (`type_function_body`
///   reads it from `argument_types`, not through this binding).
/// - **Value determiner** (`count: $N: usize`, `parameter.ty` is
///   `Some(_)`): the determiner's name is bound to the argument's
///   compile-time *value* (e.g. an array length used in a later `[N]T`
///   type expression). This requires the call-site argument to actually
///   be a constant (§4.5, §7 `ConstantEvaluationError`).
pub fn bind_determiners(
    ctx: &mut CompilerContext,
    parameters: &[FunctionParameter],
    argument_types: &[TypeId],
    argument_constants: &[Option<ConstId>],
) -> Result<Vec<ScopeConstant>, ConstantEvaluationError> {
    let mut bindings = Vec::new();
    for index in determiner_positions(parameters) {
        let name = parameters[index]
            .polymorphic_determiner
            .as_ref()
            .map(|identifier| identifier.as_str().into())
            .unwrap_or_else(|| parameters[index].name.as_str().into());
        let argument_type = argument_types.get(index).copied().ok_or_else(|| ConstantEvaluationError {
            range: talc_source::FileRange::synthetic(),
            reason: ConstantEvaluationReason::NonConstantPolymorphicArgument,
        })?;
        if parameters[index].ty.is_none() {
            let metatype = ctx.types.intern(TypeKind::Type);
            let value = ctx.consts.create(ConstantValue::Type(argument_type));
            bindings.push(ScopeConstant { name, ty: metatype, value });
        } else {
            let constant = argument_constants.get(index).copied().flatten().ok_or_else(|| ConstantEvaluationError {
                range: talc_source::FileRange::synthetic(),
                reason: ConstantEvaluationReason::NonConstantPolymorphicArgument,
            })?;
            bindings.push(ScopeConstant { name, ty: argument_type, value: constant });
        }
    }
    Ok(bindings)
}

/// Create the instantiation's child scope (§4.5: "synthesises a fresh
/// child scope binding `(determiner-name -> constant)`") and return its
/// id, ready for a `TypeFunctionBody` job to be enqueued against it.
pub fn instantiate_scope(
    ctx: &mut CompilerContext,
    parent: ScopeId,
    declaration: &Rc<talc_ast::StmtNode>,
    argument_types: &[TypeId],
    argument_constants: &[Option<ConstId>],
) -> Result<ScopeId, ConstantEvaluationError> {
    let parameters: &[FunctionParameter] = match declaration.body() {
        Stmt::FunctionDeclaration { parameters, .. } => parameters,
        other => unreachable!("instantiate_scope called on a non-function declaration: {other:?}"),
    };
    let bindings = bind_determiners(ctx, parameters, argument_types, argument_constants)?;
    let file_path = ctx.scopes.get(parent).file_path.clone();
    let child = ctx.scopes.new_scope(Some(parent), file_path, false);
    for binding in bindings {
        ctx.scopes.add_scope_constant(child, binding);
    }
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use talc_ast::{Identifier, Node};

    fn determiner_param(name: &str) -> FunctionParameter {
        FunctionParameter {
            name: Identifier::synthetic(name),
            is_polymorphic_determiner: true,
            ty: None,
            polymorphic_determiner: None,
        }
    }

    #[test]
    fn determiner_positions_finds_only_marked_parameters() {
        let params = vec![
            FunctionParameter { name: Identifier::synthetic("x"), is_polymorphic_determiner: false, ty: None, polymorphic_determiner: None },
            determiner_param("T"),
        ];
        assert_eq!(determiner_positions(&params), vec![1]);
    }

    #[test]
    fn binding_a_determiner_without_a_constant_argument_is_an_error() {
        let params = vec![determiner_param("T")];
        let mut ctx = CompilerContext::default();
        let result = bind_determiners(&mut ctx, &params, &[], &[None]);
        assert!(result.is_err());
    }

    #[test]
    fn type_determiner_binds_to_a_type_valued_constant() {
        let params = vec![determiner_param("T")];
        let mut ctx = CompilerContext::default();
        let argument_type = ctx.types.intern(talc_types::TypeKind::Boolean);
        let bindings = bind_determiners(&mut ctx, &params, &[argument_type], &[None]).unwrap();
        assert_eq!(bindings.len(), 1);
        match ctx.consts.get(bindings[0].value) {
            ConstantValue::Type(t) => assert_eq!(*t, argument_type),
            other => panic!("expected Type(_), got {other:?}"),
        }
    }

    #[test]
    fn value_determiner_binds_to_the_argument_constant() {
        let mut ctx = CompilerContext::default();
        let usize_ty = ctx.types.intern(talc_types::TypeKind::Integer {
            size: talc_types::IntegerSize::Bit64,
            signed: false,
        });
        let params = vec![FunctionParameter {
            name: Identifier::synthetic("N"),
            is_polymorphic_determiner: true,
            ty: Some(talc_ast::Node::new(talc_ast::Expr::NamedReference(Identifier::synthetic("usize")), talc_source::FileRange::synthetic())),
            polymorphic_determiner: None,
        }];
        let constant = ctx.consts.create(ConstantValue::Integer(4));
        let bindings = bind_determiners(&mut ctx, &params, &[usize_ty], &[Some(constant)]).unwrap();
        assert_eq!(bindings[0].value, constant);
        assert_eq!(bindings[0].ty, usize_ty);
    }
}
